// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Codec capability surfaces.
//!
//! The pipeline only ever talks to the four traits in this module; concrete
//! codecs are adapters behind cargo features. A missing codec library is a
//! startup warning and becomes an error only when that codec is actually
//! requested.

#[cfg(feature = "openh264")]
mod openh264;
#[cfg(feature = "libopus")]
mod opus;

#[cfg(feature = "openh264")]
pub use self::openh264::OpenH264Encoder;
#[cfg(feature = "libopus")]
pub use self::opus::{OpusEncoder, WebmOpusDecoder};

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    frame::{PcmBlock, YuvImage},
    queue::FrameSender,
    source::Source,
    types::{FrameRate, Resolution, Timescale, SAMPLES_PER_BLOCK, SAMPLE_RATE},
};

/// Output video codec selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Vp8,
    Vp9,
    Av1,
    H264,
}

impl VideoCodec {
    /// Container FourCC.
    #[must_use]
    pub fn fourcc(&self) -> &'static str {
        match self {
            VideoCodec::Vp8 => "VP80",
            VideoCodec::Vp9 => "VP90",
            VideoCodec::Av1 => "AV01",
            VideoCodec::H264 => "avc1",
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            VideoCodec::Vp8 => "vp8",
            VideoCodec::Vp9 => "vp9",
            VideoCodec::Av1 => "av1",
            VideoCodec::H264 => "h264",
        }
    }
}

/// Engine used for H.264 encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum H264Engine {
    #[default]
    OpenH264,
    OneVpl,
}

/// Produces the image shown for one video source.
///
/// `t` is media time within the source, nanoseconds from its first frame.
/// Implementations return the frame with the greatest decode timestamp not
/// after `t`, cache the currently decoded frame and advance lazily, and fall
/// back to a canonical black frame outside the decoded range.
pub trait VideoDecoder: Send {
    /// # Errors
    ///
    /// Returns [`Error::Decode`] on corrupted input.
    fn get_image(&mut self, t: u64) -> Result<&YuvImage>;
}

/// Produces the PCM stream of one audio source in 20 ms blocks.
pub trait AudioDecoder: Send {
    /// Next block, `None` at end of media.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] on corrupted input.
    fn read_block(&mut self) -> Result<Option<PcmBlock>>;
}

/// Encodes raw output frames, pushing encoded frames onto its queue.
///
/// Encoders own the producing end of the video queue and stamp frames
/// themselves (see [`VideoTimestamps`]).
pub trait VideoEncoder: Send {
    /// # Errors
    ///
    /// Returns [`Error::Encode`] when the codec rejects the frame.
    fn encode(&mut self, image: &YuvImage) -> Result<()>;

    /// Drain any delayed frames.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] when the codec fails to flush.
    fn flush(&mut self) -> Result<()>;

    fn codec(&self) -> VideoCodec;

    /// Codec configuration blob stored in the container (e.g. the AV1
    /// config record or the H.264 parameter sets).
    fn extra_data(&self) -> Option<&[u8]>;
}

/// Encodes mixed PCM blocks, pushing encoded frames onto its queue.
pub trait AudioEncoder: Send {
    /// # Errors
    ///
    /// Returns [`Error::Encode`] when the codec rejects the block.
    fn encode(&mut self, block: &PcmBlock) -> Result<()>;

    /// # Errors
    ///
    /// Returns [`Error::Encode`] when the codec fails to flush.
    fn flush(&mut self) -> Result<()>;

    /// Leading samples the decoder must discard, at 48 kHz. Passed to the
    /// container as codec delay.
    fn skip(&self) -> u32;
}

/// Stamps encoded video frames: frame `i` lands at
/// `i * timescale * den / num` ticks.
#[derive(Debug)]
pub struct VideoTimestamps {
    timescale: Timescale,
    fps: FrameRate,
    index: u64,
}

impl VideoTimestamps {
    #[must_use]
    pub fn new(timescale: Timescale, fps: FrameRate) -> Self {
        Self {
            timescale,
            fps,
            index: 0,
        }
    }

    pub fn next(&mut self) -> u64 {
        let t = u128::from(self.index) * u128::from(self.timescale.0) * u128::from(self.fps.den)
            / u128::from(self.fps.num);
        self.index += 1;
        t as u64
    }
}

/// Stamps encoded audio frames: block `i` lands at
/// `i * 960 * timescale / 48000` ticks.
#[derive(Debug)]
pub struct AudioTimestamps {
    timescale: Timescale,
    index: u64,
}

impl AudioTimestamps {
    #[must_use]
    pub fn new(timescale: Timescale) -> Self {
        Self {
            timescale,
            index: 0,
        }
    }

    pub fn next(&mut self) -> u64 {
        let t = u128::from(self.index)
            * (SAMPLES_PER_BLOCK as u128)
            * u128::from(self.timescale.0)
            / u128::from(SAMPLE_RATE);
        self.index += 1;
        t as u64
    }
}

/// Parameters for constructing a video encoder.
#[derive(Debug, Clone, Copy)]
pub struct VideoEncoderConfig {
    pub codec: VideoCodec,
    pub h264_engine: H264Engine,
    pub resolution: Resolution,
    pub bitrate_kbps: u32,
    pub fps: FrameRate,
    pub timescale: Timescale,
}

/// One codec engine this build knows about.
#[derive(Debug, Clone, Copy)]
pub struct EngineInfo {
    pub name: &'static str,
    pub codec: VideoCodec,
    pub available: bool,
}

/// All video encoder engines, available or not.
#[must_use]
pub fn video_engines() -> Vec<EngineInfo> {
    vec![
        EngineInfo {
            name: "libvpx",
            codec: VideoCodec::Vp8,
            available: false,
        },
        EngineInfo {
            name: "libvpx",
            codec: VideoCodec::Vp9,
            available: false,
        },
        EngineInfo {
            name: "svt-av1",
            codec: VideoCodec::Av1,
            available: false,
        },
        EngineInfo {
            name: "openh264",
            codec: VideoCodec::H264,
            available: cfg!(feature = "openh264"),
        },
        EngineInfo {
            name: "onevpl",
            codec: VideoCodec::H264,
            available: false,
        },
    ]
}

/// Log a warning for every engine that is missing from this build.
pub fn warn_missing_engines() {
    for engine in video_engines() {
        if !engine.available {
            warn!(
                "codec engine '{}' ({}) is not available in this build",
                engine.name,
                engine.codec.name()
            );
        }
    }
}

/// Construct the encoder for the requested output video codec.
///
/// # Errors
///
/// Returns [`Error::Setup`] when no engine for the codec is compiled in.
pub fn create_video_encoder(
    config: &VideoEncoderConfig,
    sender: FrameSender,
) -> Result<Box<dyn VideoEncoder>> {
    match (config.codec, config.h264_engine) {
        #[cfg(feature = "openh264")]
        (VideoCodec::H264, H264Engine::OpenH264) => {
            Ok(Box::new(OpenH264Encoder::new(config, sender)?))
        }
        _ => {
            // Appease the unused-variable lint in feature-less builds.
            let _ = sender;
            Err(Error::Setup(format!(
                "no encoder engine for video codec '{}' is available in this build",
                config.codec.name()
            )))
        }
    }
}

/// Construct the Opus encoder for the mixed audio track.
///
/// # Errors
///
/// Returns [`Error::Setup`] when the build carries no Opus support.
pub fn create_audio_encoder(
    timescale: Timescale,
    sender: FrameSender,
) -> Result<Box<dyn AudioEncoder>> {
    #[cfg(feature = "libopus")]
    {
        Ok(Box::new(OpusEncoder::new(timescale, sender)?))
    }
    #[cfg(not(feature = "libopus"))]
    {
        let _ = (timescale, sender);
        Err(Error::Setup(
            "opus support is not available in this build".to_string(),
        ))
    }
}

/// Construct the decoder reading one audio archive.
///
/// # Errors
///
/// Returns [`Error::Setup`] when the build carries no Opus support.
pub fn create_audio_decoder(source: &Source) -> Result<Box<dyn AudioDecoder>> {
    #[cfg(feature = "libopus")]
    {
        Ok(Box::new(WebmOpusDecoder::open(&source.path)?))
    }
    #[cfg(not(feature = "libopus"))]
    {
        Err(Error::Setup(format!(
            "cannot decode '{}': opus support is not available in this build",
            source.path.display()
        )))
    }
}

/// Construct the decoder reading one video archive.
///
/// Video input decoding needs a VP8/VP9 adapter that this build does not
/// carry; the trait is the seam for providing one.
///
/// # Errors
///
/// Always returns [`Error::Setup`] in this build.
pub fn create_video_decoder(source: &Source) -> Result<Box<dyn VideoDecoder>> {
    Err(Error::Setup(format!(
        "cannot decode '{}': no video decoder engine is available in this build",
        source.path.display()
    )))
}
