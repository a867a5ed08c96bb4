// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use crate::{
    frame::{PcmBlock, YuvImage},
    types::Resolution,
};

/// Provides the substitute content for times at which no source is live:
/// a canonical black frame at the output resolution and silent PCM.
///
/// The black frame is allocated once and shared by reference for the whole
/// composition.
#[derive(Debug)]
pub struct Filler {
    black: YuvImage,
}

impl Filler {
    #[must_use]
    pub fn new(resolution: Resolution) -> Self {
        Self {
            black: YuvImage::black(resolution.width, resolution.height),
        }
    }

    #[must_use]
    pub fn black_frame(&self) -> &YuvImage {
        &self.black
    }

    #[must_use]
    pub fn silence(&self) -> PcmBlock {
        PcmBlock::zero()
    }
}
