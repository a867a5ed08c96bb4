// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! The muxer loop.
//!
//! Single consumer of both producer queues. Peeks the head of each queue and
//! always appends the frame with the smaller timestamp (video timestamps are
//! normalized through the timescale ratio first), so each track receives its
//! frames in order and the interleave delay stays bounded by one frame of
//! each kind plus one sleep cycle.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    container::ContainerWriter,
    error::{Error, Result},
    producer::ProducerHandle,
    types::TimescaleRatio,
};

/// Sleep while the audio queue has not caught up.
const AUDIO_POLL: Duration = Duration::from_millis(100);
/// Sleep while only video frames remain outstanding.
const VIDEO_POLL: Duration = Duration::from_millis(1000);

/// Interleaves both producer queues into the container.
pub struct Muxer {
    container: Box<dyn ContainerWriter>,
    audio: ProducerHandle,
    video: ProducerHandle,
    ratio: TimescaleRatio,
    progress: Option<ProgressBar>,
}

impl std::fmt::Debug for Muxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Muxer")
            .field("audio", &self.audio)
            .field("video", &self.video)
            .finish()
    }
}

impl Muxer {
    /// `progress_ticks` enables the progress bar, sized in audio track
    /// ticks.
    #[must_use]
    pub fn new(
        container: Box<dyn ContainerWriter>,
        audio: ProducerHandle,
        video: ProducerHandle,
        ratio: TimescaleRatio,
        progress_ticks: Option<u64>,
    ) -> Self {
        let progress = progress_ticks.map(|ticks| {
            let bar = ProgressBar::new(ticks);
            bar.set_style(
                ProgressStyle::with_template("{wide_bar} {percent}%")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar
        });
        Self {
            container,
            audio,
            video,
            ratio,
            progress,
        }
    }

    /// Drain both producers into the container and finalize it.
    ///
    /// # Errors
    ///
    /// Propagates the first producer or container error after best-effort
    /// cleanup of the partial output.
    pub fn run(mut self) -> Result<()> {
        // Let both producers prime their queues.
        std::thread::sleep(AUDIO_POLL);

        let mut video_done = false;

        loop {
            if self.audio.is_finished() && self.audio.queue_is_empty() {
                break;
            }

            let Some(ts_audio) = self.audio.peek_timestamp() else {
                trace!("audio queue is empty");
                std::thread::sleep(AUDIO_POLL);
                continue;
            };
            if let Some(progress) = &self.progress {
                progress.set_position(ts_audio);
            }

            if video_done {
                if let Err(error) = self.append_audio() {
                    return self.abort(error);
                }
                continue;
            }

            if self.video.is_finished() && self.video.queue_is_empty() {
                video_done = true;
                self.video.join();
                if let Some(error) = self.video.take_error() {
                    return self.abort(error);
                }
                debug!("video was processed");
                if let Err(error) = self.append_audio() {
                    return self.abort(error);
                }
                continue;
            }

            let Some(ts_video) = self.video.peek_timestamp() else {
                trace!("video queue is empty, audio at {ts_audio}");
                std::thread::sleep(VIDEO_POLL);
                continue;
            };

            let result = if self.ratio.video_first(ts_video, ts_audio) {
                self.append_video()
            } else {
                self.append_audio()
            };
            if let Err(error) = result {
                return self.abort(error);
            }
        }

        self.audio.join();
        if let Some(error) = self.audio.take_error() {
            return self.abort(error);
        }
        debug!("audio was processed");

        if !video_done {
            loop {
                if self.video.is_finished() && self.video.queue_is_empty() {
                    break;
                }
                if self.video.peek_timestamp().is_none() {
                    trace!("video queue is empty, audio done");
                    std::thread::sleep(VIDEO_POLL);
                    continue;
                }
                if let Err(error) = self.append_video() {
                    return self.abort(error);
                }
            }
            self.video.join();
            if let Some(error) = self.video.take_error() {
                return self.abort(error);
            }
            debug!("video was processed");
        }

        if let Err(error) = self.container.finalize() {
            return self.abort(error);
        }
        if let Some(progress) = &self.progress {
            progress.finish();
        }
        info!("muxing finished");
        Ok(())
    }

    fn append_audio(&mut self) -> Result<()> {
        let frame = self
            .audio
            .pop()
            .ok_or_else(|| Error::Logic("audio queue drained behind the peek".to_string()))?;
        self.container.append_audio(frame)
    }

    fn append_video(&mut self) -> Result<()> {
        let frame = self
            .video
            .pop()
            .ok_or_else(|| Error::Logic("video queue drained behind the peek".to_string()))?;
        self.container.append_video(frame)
    }

    /// Tear down after a failure: drop the queue receivers so blocked
    /// producers unblock and exit, remove the partial output, propagate.
    fn abort(mut self, error: Error) -> Result<()> {
        error!("muxing aborted: {error}");
        if let Some(progress) = self.progress.take() {
            progress.abandon();
        }
        self.container.clean_up();
        Err(error)
    }
}
