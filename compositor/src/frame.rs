// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use crate::types::{Resolution, CHANNELS, SAMPLES_PER_BLOCK};

/// Planar I420 image (8-bit Y plane followed by quarter-size U and V planes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YuvImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl YuvImage {
    /// Create an image filled with black (Y = 0, U = V = 128).
    #[must_use]
    pub fn black(width: u32, height: u32) -> Self {
        debug_assert!(width % 2 == 0 && height % 2 == 0);
        let y_len = (width * height) as usize;
        let c_len = y_len / 4;
        let mut data = vec![0u8; y_len + 2 * c_len];
        data[y_len..].fill(128);
        Self {
            width,
            height,
            data,
        }
    }

    /// Wrap existing I420 plane data.
    ///
    /// Returns `None` when `data` does not match the plane sizes implied by
    /// the dimensions.
    #[must_use]
    pub fn from_data(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let y_len = (width * height) as usize;
        (data.len() == y_len + y_len / 2).then_some(Self {
            width,
            height,
            data,
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    #[must_use]
    pub fn y_plane(&self) -> &[u8] {
        &self.data[..self.y_len()]
    }

    #[must_use]
    pub fn u_plane(&self) -> &[u8] {
        &self.data[self.y_len()..self.y_len() + self.c_len()]
    }

    #[must_use]
    pub fn v_plane(&self) -> &[u8] {
        &self.data[self.y_len() + self.c_len()..]
    }

    /// All three planes as one contiguous slice.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Reset every pixel to black.
    pub fn fill_black(&mut self) {
        let y_len = self.y_len();
        self.data[..y_len].fill(0);
        self.data[y_len..].fill(128);
    }

    /// Mutable access to the Y, U and V planes at once.
    pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
        let y_len = self.y_len();
        let c_len = self.c_len();
        let (y, uv) = self.data.split_at_mut(y_len);
        let (u, v) = uv.split_at_mut(c_len);
        (y, u, v)
    }

    fn y_len(&self) -> usize {
        (self.width * self.height) as usize
    }

    fn c_len(&self) -> usize {
        self.y_len() / 4
    }
}

/// One block of interleaved stereo PCM, 20 ms at 48 kHz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmBlock {
    /// Interleaved left/right samples, `SAMPLES_PER_BLOCK * CHANNELS` long.
    pub samples: Vec<i16>,
}

impl PcmBlock {
    /// Silence.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            samples: vec![0; SAMPLES_PER_BLOCK * CHANNELS as usize],
        }
    }

    #[must_use]
    pub fn from_samples(samples: Vec<i16>) -> Self {
        debug_assert_eq!(samples.len(), SAMPLES_PER_BLOCK * CHANNELS as usize);
        Self { samples }
    }
}

/// One encoded frame on its way from a producer to the container.
///
/// The timestamp is expressed in ticks of the owning track's timescale.
/// Ownership moves across the queue; the muxer drops the frame after the
/// container accepted it.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub timestamp: u64,
    pub data: Vec<u8>,
    pub keyframe: bool,
}
