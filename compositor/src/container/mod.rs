// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Output container surface.
//!
//! The muxer loop only ever talks to [`ContainerWriter`]; the WebM and MP4
//! writers are the in-tree variants. Tracks are declared before the first
//! frame, frames arrive in non-decreasing timestamp order per kind, and
//! `finalize` closes the file. `clean_up` is the best-effort path after a
//! failed run.

pub mod mp4;
pub mod webm;

use serde::Deserialize;

use crate::{error::Result, frame::EncodedFrame, types::Timescale};

/// Output container format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    #[default]
    WebM,
    Mp4,
}

impl ContainerFormat {
    /// Default file extension, depending on whether a video track exists.
    #[must_use]
    pub fn extension(&self, audio_only: bool) -> &'static str {
        match (self, audio_only) {
            (ContainerFormat::WebM, false) => "webm",
            (ContainerFormat::WebM, true) => "weba",
            (ContainerFormat::Mp4, false) => "mp4",
            (ContainerFormat::Mp4, true) => "m4a",
        }
    }
}

/// MP4 writing strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mp4Muxer {
    /// `moov` written after the media data.
    #[default]
    Simple,
    /// `moov` first; media data staged in a temporary file.
    Faststart,
}

/// Parameters of the mixed Opus audio track.
#[derive(Debug, Clone, Copy)]
pub struct AudioTrackParams {
    pub timescale: Timescale,
    pub sample_rate: u32,
    pub channels: u32,
    /// Opus pre-skip as reported by the encoder, in samples at 48 kHz.
    pub pre_skip: u32,
}

/// Parameters of the composed video track.
#[derive(Debug, Clone)]
pub struct VideoTrackParams {
    pub timescale: Timescale,
    pub width: u32,
    pub height: u32,
    pub fourcc: &'static str,
    /// Codec configuration blob (AV1 config record, H.264 parameter sets).
    pub extra_data: Option<Vec<u8>>,
}

/// One multiplexed output file.
pub trait ContainerWriter: Send {
    /// Declare the audio track. Must come before the first frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Mux`] when tracks can no longer be
    /// declared.
    fn set_audio_track(&mut self, params: &AudioTrackParams) -> Result<()>;

    /// Declare the video track. Must come before the first frame.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Mux`] when tracks can no longer be
    /// declared.
    fn set_video_track(&mut self, params: &VideoTrackParams) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`crate::error::Error::Mux`] on out-of-order timestamps and
    /// [`crate::error::Error::Io`] on write failures.
    fn append_audio(&mut self, frame: EncodedFrame) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`crate::error::Error::Mux`] on out-of-order timestamps and
    /// [`crate::error::Error::Io`] on write failures.
    fn append_video(&mut self, frame: EncodedFrame) -> Result<()>;

    /// Write everything still pending and close the file.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Io`] on write failures.
    fn finalize(&mut self) -> Result<()>;

    /// Best-effort removal of partial output after a failure. Tolerates
    /// being called on an already closed writer.
    fn clean_up(&mut self);
}
