// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Wires a compiled layout into a running composition: decoders, encoders,
//! producers, container and the muxer loop.
//!
//! Setup happens entirely before the producer threads start; every error
//! until then is a configuration or setup error and aborts without touching
//! the output file beyond creating it.

use std::{collections::HashMap, path::PathBuf};

use crate::{
    codec::{
        create_audio_decoder, create_audio_encoder, create_video_decoder, create_video_encoder,
        H264Engine, VideoCodec, VideoEncoderConfig,
    },
    composer::{ComposerKind, VideoSources},
    container::{
        mp4::Mp4Writer, webm::WebmWriter, AudioTrackParams, ContainerFormat, ContainerWriter,
        Mp4Muxer, VideoTrackParams,
    },
    error::Result,
    filler::Filler,
    layout::CompiledLayout,
    muxer::Muxer,
    producer::{AudioProducer, AudioSource, VideoProducer},
    queue::frame_queue,
    report::{InputReport, OutputReport, Reporter},
    scaler::FilterMode,
    source::SourceKind,
    types::{FrameRate, Timescale, TimescaleRatio, NANOS_PER_SECOND, CHANNELS, SAMPLE_RATE},
};

/// Frames each queue may hold before its producer blocks.
const QUEUE_CAPACITY: usize = 512;

/// Everything the composition needs besides the compiled layout.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub out_path: PathBuf,
    pub format: ContainerFormat,
    pub mp4_muxer: Mp4Muxer,
    /// Staging directory for the faststart temp file; defaults to the
    /// output's directory.
    pub mp4_temp_dir: Option<PathBuf>,
    pub video_codec: VideoCodec,
    pub h264_engine: H264Engine,
    pub fps: FrameRate,
    pub audio_only: bool,
    pub composer: ComposerKind,
    pub filter: FilterMode,
    pub show_progress_bar: bool,
}

impl PipelineConfig {
    fn audio_timescale(&self) -> Timescale {
        match self.format {
            ContainerFormat::WebM => Timescale::NANOSECONDS,
            ContainerFormat::Mp4 => Timescale::MP4_AUDIO,
        }
    }

    fn video_timescale(&self) -> Timescale {
        match self.format {
            ContainerFormat::WebM => Timescale::NANOSECONDS,
            ContainerFormat::Mp4 => Timescale::MP4_VIDEO,
        }
    }
}

/// Compose the layout into the output file. Blocks until the muxer loop
/// finishes.
///
/// # Errors
///
/// Setup errors surface before any thread starts; afterwards the first
/// producer or container failure aborts the run with the partial output
/// removed.
pub fn run(
    layout: &CompiledLayout,
    config: &PipelineConfig,
    reporter: Option<&Reporter>,
) -> Result<()> {
    let has_video = !config.audio_only && layout.regions.iter().any(|r| !r.sequence.is_empty());

    // Audio chain.
    let (audio_sender, audio_receiver) = frame_queue(QUEUE_CAPACITY);
    let audio_encoder = create_audio_encoder(config.audio_timescale(), audio_sender)?;
    let pre_skip = audio_encoder.skip();

    let mut audio_sources = Vec::with_capacity(layout.audio_sources.len());
    for &id in &layout.audio_sources {
        let source = layout.catalog.get(id)?;
        let decoder = create_audio_decoder(source)?;
        if let Some(reporter) = reporter {
            reporter.add_input(InputReport {
                path: source.path.display().to_string(),
                connection_id: source.connection_id.clone(),
                codec: "opus".to_string(),
                duration_seconds: source.interval.duration() as f64 / NANOS_PER_SECOND as f64,
            });
        }
        audio_sources.push(AudioSource {
            id,
            interval: source.interval,
            decoder,
        });
    }

    // Video chain.
    let (video_sender, video_receiver) = frame_queue(QUEUE_CAPACITY);
    let video_producer = if has_video {
        let encoder = create_video_encoder(
            &VideoEncoderConfig {
                codec: config.video_codec,
                h264_engine: config.h264_engine,
                resolution: layout.resolution,
                bitrate_kbps: layout.bitrate_kbps,
                fps: config.fps,
                timescale: config.video_timescale(),
            },
            video_sender,
        )?;

        let mut decoders = HashMap::new();
        for region in &layout.regions {
            for entry in &region.sequence {
                if decoders.contains_key(&entry.source) {
                    continue;
                }
                let source = layout.catalog.get(entry.source)?;
                decoders.insert(entry.source, create_video_decoder(source)?);
                if let Some(reporter) = reporter {
                    reporter.add_input(InputReport {
                        path: source.path.display().to_string(),
                        connection_id: source.connection_id.clone(),
                        codec: "vp8".to_string(),
                        duration_seconds: source.interval.duration() as f64
                            / NANOS_PER_SECOND as f64,
                    });
                }
            }
        }

        Some(VideoProducer::new(
            layout,
            config.composer,
            config.filter,
            VideoSources::new(decoders),
            encoder,
            config.fps,
        )?)
    } else {
        None
    };

    // Container.
    let mut container: Box<dyn ContainerWriter> = match config.format {
        ContainerFormat::WebM => Box::new(WebmWriter::create(&config.out_path)?),
        ContainerFormat::Mp4 => Box::new(Mp4Writer::create(
            &config.out_path,
            config.mp4_muxer,
            config.mp4_temp_dir.as_deref(),
        )?),
    };
    container.set_audio_track(&AudioTrackParams {
        timescale: config.audio_timescale(),
        sample_rate: SAMPLE_RATE,
        channels: CHANNELS,
        pre_skip,
    })?;
    if video_producer.is_some() {
        container.set_video_track(&VideoTrackParams {
            timescale: config.video_timescale(),
            width: layout.resolution.width,
            height: layout.resolution.height,
            fourcc: config.video_codec.fourcc(),
            extra_data: None,
        })?;
    }

    // Producers and the muxer loop.
    let audio_handle = AudioProducer::new(
        audio_sources,
        audio_encoder,
        layout.audio_max_end_time,
        Filler::new(layout.resolution),
    )
    .spawn(audio_receiver);
    let video_handle = match video_producer {
        Some(producer) => producer.spawn(video_receiver),
        None => VideoProducer::none(video_receiver),
    };

    let progress_ticks = config
        .show_progress_bar
        .then(|| config.audio_timescale().ticks(layout.audio_max_end_time));
    let ratio = TimescaleRatio::new(config.audio_timescale(), config.video_timescale());
    Muxer::new(container, audio_handle, video_handle, ratio, progress_ticks).run()?;

    if let Some(reporter) = reporter {
        reporter.set_output(OutputReport {
            path: config.out_path.display().to_string(),
            container: match config.format {
                ContainerFormat::WebM => "webm".to_string(),
                ContainerFormat::Mp4 => "mp4".to_string(),
            },
            audio_codec: "opus".to_string(),
            video_codec: has_video.then(|| config.video_codec.name().to_string()),
            duration_seconds: layout.max_end_time as f64 / NANOS_PER_SECOND as f64,
        });
    }
    Ok(())
}

/// Decide the default output path for the given metadata path and
/// configuration.
#[must_use]
pub fn default_output_path(
    metadata_path: &std::path::Path,
    format: ContainerFormat,
    audio_only: bool,
) -> PathBuf {
    crate::source::default_output_path(metadata_path, format.extension(audio_only))
}

/// `true` when the layout schedules any source of the given kind.
#[must_use]
pub fn has_sources_of_kind(layout: &CompiledLayout, kind: SourceKind) -> bool {
    match kind {
        SourceKind::Audio => !layout.audio_sources.is_empty(),
        SourceKind::Video => layout.regions.iter().any(|r| !r.sequence.is_empty()),
    }
}
