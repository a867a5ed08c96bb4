// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! H.264 encoding through OpenH264, enabled by the `openh264` feature.
//!
//! Frames are re-packed from Annex B into length-prefixed AVCC samples and
//! the parameter sets of the first keyframe become the track's decoder
//! configuration record.

use openh264::{
    encoder::{Encoder, EncoderConfig},
    formats::YUVSource,
    OpenH264API,
};

use crate::{
    codec::{VideoCodec, VideoEncoder, VideoEncoderConfig, VideoTimestamps},
    error::{Error, Result},
    frame::{EncodedFrame, YuvImage},
    queue::FrameSender,
};

struct YuvView<'a>(&'a YuvImage);

impl YUVSource for YuvView<'_> {
    fn dimensions(&self) -> (usize, usize) {
        (self.0.width() as usize, self.0.height() as usize)
    }

    fn strides(&self) -> (usize, usize, usize) {
        let w = self.0.width() as usize;
        (w, w / 2, w / 2)
    }

    fn y(&self) -> &[u8] {
        self.0.y_plane()
    }

    fn u(&self) -> &[u8] {
        self.0.u_plane()
    }

    fn v(&self) -> &[u8] {
        self.0.v_plane()
    }
}

/// Encodes the composed frames as H.264 through OpenH264.
pub struct OpenH264Encoder {
    encoder: Encoder,
    timestamps: VideoTimestamps,
    sender: FrameSender,
    extra_data: Option<Vec<u8>>,
}

impl std::fmt::Debug for OpenH264Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenH264Encoder").finish()
    }
}

impl OpenH264Encoder {
    /// # Errors
    ///
    /// Returns [`Error::Setup`] when the OpenH264 session cannot be
    /// created.
    pub fn new(config: &VideoEncoderConfig, sender: FrameSender) -> Result<Self> {
        let encoder_config =
            EncoderConfig::new().set_bitrate_bps(config.bitrate_kbps.saturating_mul(1000));
        let encoder = Encoder::with_api_config(OpenH264API::from_source(), encoder_config)
            .map_err(|e| Error::Setup(format!("unable to create the OpenH264 encoder: {e}")))?;
        Ok(Self {
            encoder,
            timestamps: VideoTimestamps::new(config.timescale, config.fps),
            sender,
            extra_data: None,
        })
    }
}

impl VideoEncoder for OpenH264Encoder {
    fn encode(&mut self, image: &YuvImage) -> Result<()> {
        let bitstream = self
            .encoder
            .encode(&YuvView(image))
            .map_err(|e| Error::Encode(format!("h264 encoding failed: {e}")))?;
        let annex_b = bitstream.to_vec();
        if annex_b.is_empty() {
            self.timestamps.next();
            return Ok(());
        }

        let nals = split_annex_b(&annex_b);
        let keyframe = nals.iter().any(|nal| nal.first().map(|b| b & 0x1F) == Some(5));
        if self.extra_data.is_none() {
            if let Some(record) = decoder_configuration(&nals) {
                self.extra_data = Some(record);
            }
        }

        let mut data = Vec::with_capacity(annex_b.len());
        for nal in &nals {
            data.extend_from_slice(&(nal.len() as u32).to_be_bytes());
            data.extend_from_slice(nal);
        }

        let frame = EncodedFrame {
            timestamp: self.timestamps.next(),
            data,
            keyframe,
        };
        if !self.sender.push(frame) {
            return Err(Error::Encode("the video queue is closed".to_string()));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn codec(&self) -> VideoCodec {
        VideoCodec::H264
    }

    fn extra_data(&self) -> Option<&[u8]> {
        self.extra_data.as_deref()
    }
}

/// Split an Annex B stream into raw NAL units.
fn split_annex_b(data: &[u8]) -> Vec<&[u8]> {
    let mut nals = Vec::new();
    let mut start = None;
    let mut i = 0;
    while i + 3 <= data.len() {
        let code_len = if data[i..].starts_with(&[0, 0, 0, 1]) {
            Some(4)
        } else if data[i..].starts_with(&[0, 0, 1]) {
            Some(3)
        } else {
            None
        };
        if let Some(code_len) = code_len {
            if let Some(s) = start {
                nals.push(&data[s..i]);
            }
            i += code_len;
            start = Some(i);
        } else {
            i += 1;
        }
    }
    if let Some(s) = start {
        nals.push(&data[s..]);
    }
    nals
}

/// AVC decoder configuration record from the stream's SPS and PPS.
fn decoder_configuration(nals: &[&[u8]]) -> Option<Vec<u8>> {
    let sps = nals.iter().find(|nal| nal.first().map(|b| b & 0x1F) == Some(7))?;
    let pps = nals.iter().find(|nal| nal.first().map(|b| b & 0x1F) == Some(8))?;
    if sps.len() < 4 {
        return None;
    }

    let mut record = Vec::with_capacity(11 + sps.len() + pps.len());
    record.push(1); // configuration version
    record.push(sps[1]); // profile
    record.push(sps[2]); // profile compatibility
    record.push(sps[3]); // level
    record.push(0xFF); // 4-byte NAL lengths
    record.push(0xE1); // one SPS
    record.extend_from_slice(&(sps.len() as u16).to_be_bytes());
    record.extend_from_slice(sps);
    record.push(1); // one PPS
    record.extend_from_slice(&(pps.len() as u16).to_be_bytes());
    record.extend_from_slice(pps);
    Some(record)
}
