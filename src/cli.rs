// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use compositor::{
    codec::{H264Engine, VideoCodec},
    ComposerKind, ContainerFormat, FilterMode, Mp4Muxer,
};

/// Composes per-participant recording archives into a single WebM or MP4
/// file.
#[derive(Debug, Parser)]
#[command(name = "compose", version, about)]
pub struct Cli {
    /// Recording metadata JSON describing the session's archives.
    #[arg(short = 'f', long = "in-metadata-file", value_name = "PATH")]
    pub in_metadata_file: Option<PathBuf>,

    /// Layout JSON; replaces the implicit grid built from the metadata.
    #[arg(long, value_name = "PATH")]
    pub layout: Option<PathBuf>,

    /// Output file; defaults to the metadata path with the container's
    /// extension.
    #[arg(long, value_name = "PATH")]
    pub out_file: Option<PathBuf>,

    /// Output container. A layout's `format` field wins unless this is
    /// given explicitly.
    #[arg(long, value_enum, value_name = "FORMAT")]
    pub out_container: Option<OutContainer>,

    /// MP4 writing strategy.
    #[arg(long, value_enum, default_value_t = Mp4MuxerKind::Faststart)]
    pub mp4_muxer: Mp4MuxerKind,

    /// Staging directory for the faststart temp file; defaults to the
    /// output's directory.
    #[arg(long, value_name = "PATH")]
    pub mp4_temp_dir: Option<PathBuf>,

    /// Output video codec.
    #[arg(long, value_enum, default_value_t = OutVideoCodec::Vp8)]
    pub out_video_codec: OutVideoCodec,

    /// H.264 encoder engine.
    #[arg(long, value_enum, default_value_t = H264EncoderKind::OpenH264)]
    pub h264_encoder: H264EncoderKind,

    /// Video bitrate in kbps; 0 selects the automatic bitrate.
    #[arg(long, value_name = "KBPS", default_value_t = 0)]
    pub out_video_bit_rate: u32,

    /// Output frame rate, as `<num>/<den>` or a bare integer.
    #[arg(long, value_name = "FPS", default_value = "25/1")]
    pub out_video_frame_rate: String,

    /// Compose the audio track only.
    #[arg(long)]
    pub audio_only: bool,

    /// Recording metadata of a screen-capture session, composed as a
    /// full-frame region above the grid.
    #[arg(long, value_name = "PATH")]
    pub screen_capture_metadata: Option<PathBuf>,

    /// Only use the screen-capture archives with this connection id.
    #[arg(long, value_name = "ID")]
    pub screen_capture_connection_id: Option<String>,

    /// Frame composer driving the video producer.
    #[arg(long, value_enum, default_value_t = ComposerArg::Region)]
    pub video_composer: ComposerArg,

    /// Scaler filter mode.
    #[arg(long, value_enum, default_value_t = ScaleFilter::Box)]
    pub scale_filter: ScaleFilter,

    #[arg(long)]
    pub show_progress_bar: bool,

    /// Shortcut for `--log-level debug`.
    #[arg(long)]
    pub verbose: bool,

    /// error | warn | info | debug | trace
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Write a success report into this directory.
    #[arg(long, value_name = "DIR")]
    pub success_report_dir: Option<PathBuf>,

    /// Write a failure report into this directory.
    #[arg(long, value_name = "DIR")]
    pub failure_report_dir: Option<PathBuf>,

    /// List the available video codec engines and exit.
    #[arg(long)]
    pub video_codec_engines: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutContainer {
    Webm,
    Mp4,
}

impl From<OutContainer> for ContainerFormat {
    fn from(value: OutContainer) -> Self {
        match value {
            OutContainer::Webm => ContainerFormat::WebM,
            OutContainer::Mp4 => ContainerFormat::Mp4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mp4MuxerKind {
    Simple,
    Faststart,
}

impl From<Mp4MuxerKind> for Mp4Muxer {
    fn from(value: Mp4MuxerKind) -> Self {
        match value {
            Mp4MuxerKind::Simple => Mp4Muxer::Simple,
            Mp4MuxerKind::Faststart => Mp4Muxer::Faststart,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutVideoCodec {
    Vp8,
    Vp9,
    Av1,
    H264,
}

impl From<OutVideoCodec> for VideoCodec {
    fn from(value: OutVideoCodec) -> Self {
        match value {
            OutVideoCodec::Vp8 => VideoCodec::Vp8,
            OutVideoCodec::Vp9 => VideoCodec::Vp9,
            OutVideoCodec::Av1 => VideoCodec::Av1,
            OutVideoCodec::H264 => VideoCodec::H264,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum H264EncoderKind {
    #[value(name = "openh264")]
    OpenH264,
    #[value(name = "onevpl")]
    OneVpl,
}

impl From<H264EncoderKind> for H264Engine {
    fn from(value: H264EncoderKind) -> Self {
        match value {
            H264EncoderKind::OpenH264 => H264Engine::OpenH264,
            H264EncoderKind::OneVpl => H264Engine::OneVpl,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ComposerArg {
    Grid,
    ParallelGrid,
    Region,
}

impl From<ComposerArg> for ComposerKind {
    fn from(value: ComposerArg) -> Self {
        match value {
            ComposerArg::Grid => ComposerKind::Grid,
            ComposerArg::ParallelGrid => ComposerKind::ParallelGrid,
            ComposerArg::Region => ComposerKind::Region,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScaleFilter {
    Nearest,
    Bilinear,
    Box,
}

impl From<ScaleFilter> for FilterMode {
    fn from(value: ScaleFilter) -> Self {
        match value {
            ScaleFilter::Nearest => FilterMode::Nearest,
            ScaleFilter::Bilinear => FilterMode::Bilinear,
            ScaleFilter::Box => FilterMode::Box,
        }
    }
}

impl Cli {
    /// Effective log filter from `--log-level` and `--verbose`.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        if let Some(level) = &self.log_level {
            level
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}
