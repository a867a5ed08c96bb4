// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

#![allow(clippy::module_name_repetitions)]

#[macro_use]
extern crate log;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use compositor::{
    codec::{video_engines, warn_missing_engines},
    pipeline::{self, PipelineConfig},
    ContainerFormat, FrameRate, Reporter, SourceKind,
};

use recording_compose::{cli::Cli, metadata, report};

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli.log_filter()),
    )
    .init();

    if cli.video_codec_engines {
        print_engines();
        return;
    }

    if let Err(error) = run(&cli) {
        error!("composing failed: {error:?}");
        std::process::exit(1);
    }
}

fn print_engines() {
    for engine in video_engines() {
        println!(
            "{:10} {:5} {}",
            engine.name,
            engine.codec.name(),
            if engine.available {
                "available"
            } else {
                "not available"
            }
        );
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut input = match (&cli.layout, &cli.in_metadata_file) {
        (Some(layout), _) => metadata::from_layout(layout)
            .with_context(|| format!("failed to load layout '{}'", layout.display()))?,
        (None, Some(metadata_path)) => metadata::from_session(metadata_path, cli.audio_only)
            .with_context(|| {
                format!("failed to load metadata '{}'", metadata_path.display())
            })?,
        (None, None) => bail!("either --layout or -f <metadata.json> is required"),
    };

    if let Some(screen_capture) = &cli.screen_capture_metadata {
        if cli.audio_only {
            warn!("ignoring the screen capture metadata in audio-only mode");
        } else {
            metadata::add_screen_capture(
                &mut input,
                screen_capture,
                cli.screen_capture_connection_id.as_deref(),
            )?;
        }
    }

    warn_missing_engines();

    let mut layout = compositor::layout::compile(&input.description, &input.catalog)
        .context("failed to compile the layout")?;
    if cli.out_video_bit_rate > 0 {
        layout.bitrate_kbps = cli.out_video_bit_rate;
    }

    let format = cli
        .out_container
        .map(ContainerFormat::from)
        .or(input.format)
        .unwrap_or_default();
    let audio_only =
        cli.audio_only || !pipeline::has_sources_of_kind(&layout, SourceKind::Video);
    let out_path: PathBuf = cli
        .out_file
        .clone()
        .unwrap_or_else(|| pipeline::default_output_path(&input.base_path, format, audio_only));
    info!("composing '{}' into '{}'", input.recording_id, out_path.display());

    let config = PipelineConfig {
        out_path,
        format,
        mp4_muxer: cli.mp4_muxer.into(),
        mp4_temp_dir: cli.mp4_temp_dir.clone(),
        video_codec: cli.out_video_codec.into(),
        h264_engine: cli.h264_encoder.into(),
        fps: FrameRate::parse(&cli.out_video_frame_rate)?,
        audio_only,
        composer: cli.video_composer.into(),
        filter: cli.scale_filter.into(),
        show_progress_bar: cli.show_progress_bar,
    };

    let wants_report = cli.success_report_dir.is_some() || cli.failure_report_dir.is_some();
    let reporter = wants_report.then(Reporter::new);

    match pipeline::run(&layout, &config, reporter.as_ref()) {
        Ok(()) => {
            if let (Some(dir), Some(reporter)) = (&cli.success_report_dir, &reporter) {
                report::write_success(dir, &input.recording_id, &reporter.snapshot())?;
            }
            Ok(())
        }
        Err(error) => {
            if let (Some(dir), Some(reporter)) = (&cli.failure_report_dir, &reporter) {
                report::write_failure(
                    dir,
                    &input.recording_id,
                    &reporter.snapshot(),
                    &error.to_string(),
                )?;
            }
            Err(error.into())
        }
    }
}
