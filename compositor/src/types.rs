// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use crate::error::{Error, Result};

/// Nanoseconds per second; all session timestamps are u64 nanoseconds.
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Output audio sample rate. Input archives are resampled upstream, the
/// compositor itself only ever sees 48 kHz PCM.
pub const SAMPLE_RATE: u32 = 48_000;

/// Mixed output is always stereo.
pub const CHANNELS: u32 = 2;

/// Samples per mixed audio block (20 ms at 48 kHz).
pub const SAMPLES_PER_BLOCK: usize = 960;

/// Cartesian pixel position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    /// X position
    pub x: u32,
    /// Y position
    pub y: u32,
}

/// Cartesian pixel dimension
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resolution {
    /// horizontal dimension
    pub width: u32,
    /// vertical dimension
    pub height: u32,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl Resolution {
    /// Minimum for either dimension after rounding.
    pub const MIN: u32 = 16;

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse a `"<width>x<height>"` string as found in layout JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the string is not of the form
    /// `<digits>x<digits>`.
    pub fn parse(s: &str) -> Result<Self> {
        let Some((Ok(width), Ok(height))) = s.split_once('x').map(|(w, h)| (w.parse(), h.parse()))
        else {
            return Err(Error::Config(format!("invalid resolution: '{s}'")));
        };
        Ok(Self { width, height })
    }

    /// Round both dimensions down to a multiple of 4 and check the minimum.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a rounded dimension falls below
    /// [`Resolution::MIN`].
    pub fn rounded(self) -> Result<Self> {
        let rounded = Self {
            width: self.width & !3,
            height: self.height & !3,
        };
        if rounded.width < Self::MIN {
            return Err(Error::Config(format!(
                "width {} is too small (minimum {})",
                rounded.width,
                Self::MIN
            )));
        }
        if rounded.height < Self::MIN {
            return Err(Error::Config(format!(
                "height {} is too small (minimum {})",
                rounded.height,
                Self::MIN
            )));
        }
        Ok(rounded)
    }

    /// Number of pixels.
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Output video frame rate as a rational `num/den` frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u64,
    pub den: u64,
}

impl Default for FrameRate {
    fn default() -> Self {
        Self { num: 25, den: 1 }
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FrameRate {
    /// # Errors
    ///
    /// Returns [`Error::Config`] when either part is zero.
    pub fn new(num: u64, den: u64) -> Result<Self> {
        if num == 0 || den == 0 {
            return Err(Error::Config(format!(
                "invalid frame rate: {num}/{den}"
            )));
        }
        Ok(Self { num, den })
    }

    /// Parse `"<num>/<den>"` or a bare integer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on malformed input or a zero part.
    pub fn parse(s: &str) -> Result<Self> {
        let (num, den) = match s.split_once('/') {
            Some((n, d)) => (n.parse().ok(), d.parse().ok()),
            None => (s.parse().ok(), Some(1)),
        };
        match (num, den) {
            (Some(num), Some(den)) => Self::new(num, den),
            _ => Err(Error::Config(format!("invalid frame rate: '{s}'"))),
        }
    }

    /// Duration of one output frame in nanoseconds.
    #[must_use]
    pub fn frame_duration_ns(&self) -> u64 {
        NANOS_PER_SECOND * self.den / self.num
    }
}

/// Integer timescale of an output track (ticks per second).
///
/// WebM tracks run at nanosecond granularity, MP4 tracks commonly at
/// 48 000 (audio) or 16 000 (video) ticks per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timescale(pub u64);

impl Timescale {
    pub const NANOSECONDS: Self = Self(NANOS_PER_SECOND);
    pub const MP4_AUDIO: Self = Self(48_000);
    pub const MP4_VIDEO: Self = Self(16_000);

    /// Convert a session timestamp in nanoseconds into track ticks,
    /// rounding to nearest.
    #[must_use]
    pub fn ticks(&self, t_ns: u64) -> u64 {
        let t = u128::from(t_ns) * u128::from(self.0) + u128::from(NANOS_PER_SECOND / 2);
        (t / u128::from(NANOS_PER_SECOND)) as u64
    }
}

/// Ratio used by the muxer loop to compare video against audio timestamps
/// without leaving integer arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct TimescaleRatio {
    audio: u64,
    video: u64,
}

impl TimescaleRatio {
    #[must_use]
    pub fn new(audio: Timescale, video: Timescale) -> Self {
        Self {
            audio: audio.0,
            video: video.0,
        }
    }

    /// `true` when the video frame at `ts_video` must be appended before the
    /// audio frame at `ts_audio`.
    #[must_use]
    pub fn video_first(&self, ts_video: u64, ts_audio: u64) -> bool {
        u128::from(ts_video) * u128::from(self.audio)
            <= u128::from(ts_audio) * u128::from(self.video)
    }
}
