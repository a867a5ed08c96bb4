// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Opus adapters backed by libopus, enabled by the `libopus` feature.

use std::{collections::VecDeque, path::Path};

use opus::{Application, Channels};

use crate::{
    codec::{AudioDecoder, AudioEncoder, AudioTimestamps},
    container::webm::{reader::TrackKind, WebmReader},
    error::{Error, Result},
    frame::{EncodedFrame, PcmBlock},
    queue::FrameSender,
    types::{Timescale, CHANNELS, SAMPLES_PER_BLOCK, SAMPLE_RATE},
};

/// Bitrate of the mixed output track.
const OPUS_BIT_RATE: i32 = 65_536;
/// Interleaved i16 capacity for one decoded packet (120 ms ceiling).
const DECODE_CAPACITY: usize = 5760 * CHANNELS as usize;

fn opus_error(context: &str, error: opus::Error) -> Error {
    Error::Encode(format!("{context}: {error}"))
}

/// Encodes the mixed PCM stream, one packet per 20 ms block.
pub struct OpusEncoder {
    encoder: opus::Encoder,
    timestamps: AudioTimestamps,
    sender: FrameSender,
    skip: u32,
}

impl std::fmt::Debug for OpusEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpusEncoder")
            .field("skip", &self.skip)
            .finish()
    }
}

impl OpusEncoder {
    /// # Errors
    ///
    /// Returns [`Error::Setup`] when libopus rejects the session.
    pub fn new(timescale: Timescale, sender: FrameSender) -> Result<Self> {
        let mut encoder = opus::Encoder::new(SAMPLE_RATE, Channels::Stereo, Application::Audio)
            .map_err(|e| Error::Setup(format!("unable to create the Opus encoder: {e}")))?;
        encoder
            .set_bitrate(opus::Bitrate::Bits(OPUS_BIT_RATE))
            .map_err(|e| Error::Setup(format!("unable to set the Opus bitrate: {e}")))?;
        let skip = encoder
            .get_lookahead()
            .map_err(|e| Error::Setup(format!("unable to query the Opus lookahead: {e}")))?
            .max(0) as u32;
        Ok(Self {
            encoder,
            timestamps: AudioTimestamps::new(timescale),
            sender,
            skip,
        })
    }
}

impl AudioEncoder for OpusEncoder {
    fn encode(&mut self, block: &PcmBlock) -> Result<()> {
        let data = self
            .encoder
            .encode_vec(&block.samples, 4000)
            .map_err(|e| opus_error("opus encoding failed", e))?;
        let frame = EncodedFrame {
            timestamp: self.timestamps.next(),
            data,
            keyframe: true,
        };
        if !self.sender.push(frame) {
            return Err(Error::Encode("the audio queue is closed".to_string()));
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn skip(&self) -> u32 {
        self.skip
    }
}

/// Decodes the Opus track of one WebM archive into 20 ms stereo blocks.
pub struct WebmOpusDecoder {
    reader: WebmReader,
    decoder: opus::Decoder,
    track: u64,
    /// Interleaved stereo samples waiting to be handed out.
    buffer: VecDeque<i16>,
    /// Samples (per channel) still to discard, from the codec delay.
    pre_skip: usize,
    eof: bool,
}

impl std::fmt::Debug for WebmOpusDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebmOpusDecoder")
            .field("track", &self.track)
            .field("eof", &self.eof)
            .finish()
    }
}

impl WebmOpusDecoder {
    /// # Errors
    ///
    /// Returns [`Error::Decode`] when the archive carries no Opus audio
    /// track.
    pub fn open(path: &Path) -> Result<Self> {
        let reader = WebmReader::open(path)?;
        let track = reader
            .track_of_kind(TrackKind::Audio)
            .filter(|t| t.codec_id == "A_OPUS")
            .ok_or_else(|| {
                Error::Decode(format!(
                    "'{}' does not contain an Opus audio track",
                    path.display()
                ))
            })?;
        let track_number = track.number;
        // Pre-skip from the OpusHead, falling back to the codec delay.
        let pre_skip = track
            .codec_private
            .as_deref()
            .filter(|head| head.len() >= 12 && head.starts_with(b"OpusHead"))
            .map(|head| u16::from_le_bytes([head[10], head[11]]) as usize)
            .unwrap_or_else(|| {
                (track.codec_delay * u64::from(SAMPLE_RATE) / 1_000_000_000) as usize
            });

        let decoder = opus::Decoder::new(SAMPLE_RATE, Channels::Stereo)
            .map_err(|e| Error::Setup(format!("unable to create the Opus decoder: {e}")))?;

        Ok(Self {
            reader,
            decoder,
            track: track_number,
            buffer: VecDeque::new(),
            pre_skip,
            eof: false,
        })
    }

    fn fill(&mut self) -> Result<()> {
        let mut pcm = vec![0i16; DECODE_CAPACITY];
        while self.buffer.len() < SAMPLES_PER_BLOCK * CHANNELS as usize && !self.eof {
            let Some(block) = self.reader.next_block()? else {
                self.eof = true;
                break;
            };
            if block.track != self.track {
                continue;
            }
            let samples = self
                .decoder
                .decode(&block.data, &mut pcm, false)
                .map_err(|e| Error::Decode(format!("opus decoding failed: {e}")))?;
            let mut decoded = &pcm[..samples * CHANNELS as usize];
            if self.pre_skip > 0 {
                let discard = self.pre_skip.min(samples);
                decoded = &decoded[discard * CHANNELS as usize..];
                self.pre_skip -= discard;
            }
            self.buffer.extend(decoded);
        }
        Ok(())
    }
}

impl AudioDecoder for WebmOpusDecoder {
    fn read_block(&mut self) -> Result<Option<PcmBlock>> {
        self.fill()?;

        let wanted = SAMPLES_PER_BLOCK * CHANNELS as usize;
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let mut samples = Vec::with_capacity(wanted);
        for _ in 0..wanted {
            samples.push(self.buffer.pop_front().unwrap_or(0));
        }
        Ok(Some(PcmBlock::from_samples(samples)))
    }
}
