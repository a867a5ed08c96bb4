// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::sync::Arc;

use crate::{
    codec::VideoEncoder,
    composer::{ComposerKind, GridComposer, ParallelGridComposer, RegionComposer, VideoSources},
    error::Result,
    filler::Filler,
    frame::YuvImage,
    interval::Interval,
    layout::CompiledLayout,
    producer::{ProducerHandle, ProducerState},
    queue::FrameReceiver,
    scaler::FilterMode,
    source::SourceId,
    types::{FrameRate, NANOS_PER_SECOND},
};

/// Composes one output frame per tick and feeds it to the encoder.
///
/// Runs on its own thread from `t = 0` to `max_end_time` in steps of one
/// frame period; the encoder pushes the resulting frames onto the video
/// queue polled by the muxer.
pub struct VideoProducer {
    composer: ActiveComposer,
    sources: VideoSources,
    encoder: Box<dyn VideoEncoder>,
    fps: FrameRate,
    max_end_time: u64,
    filler: Filler,
    scratch: YuvImage,
}

enum ActiveComposer {
    Grid {
        composer: GridComposer,
        slots: Vec<(SourceId, Interval)>,
    },
    ParallelGrid {
        composer: ParallelGridComposer,
        slots: Vec<(SourceId, Interval)>,
    },
    Region(RegionComposer),
}

impl std::fmt::Debug for VideoProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoProducer")
            .field("fps", &self.fps)
            .field("max_end_time", &self.max_end_time)
            .finish()
    }
}

impl VideoProducer {
    /// Build the producer for a compiled layout.
    ///
    /// The grid composers flatten all regions' sources into one fixed grid
    /// (one slot per source); the region composer follows the compiled
    /// schedule cell by cell.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::Logic`] when the layout references an
    /// unknown source.
    pub fn new(
        layout: &CompiledLayout,
        kind: ComposerKind,
        filter: FilterMode,
        sources: VideoSources,
        encoder: Box<dyn VideoEncoder>,
        fps: FrameRate,
    ) -> Result<Self> {
        let composer = match kind {
            ComposerKind::Region => {
                ActiveComposer::Region(RegionComposer::new(&layout.regions, filter))
            }
            ComposerKind::Grid => {
                let slots = grid_slots(layout)?;
                ActiveComposer::Grid {
                    composer: GridComposer::new(layout.resolution, slots.len() as u32, 0, filter),
                    slots,
                }
            }
            ComposerKind::ParallelGrid => {
                let slots = grid_slots(layout)?;
                ActiveComposer::ParallelGrid {
                    composer: ParallelGridComposer::new(
                        layout.resolution,
                        slots.len() as u32,
                        0,
                        filter,
                    ),
                    slots,
                }
            }
        };

        let filler = Filler::new(layout.resolution);
        let scratch = filler.black_frame().clone();
        Ok(Self {
            composer,
            sources,
            encoder,
            fps,
            max_end_time: layout.max_end_time,
            filler,
            scratch,
        })
    }

    /// Start the composing thread.
    pub fn spawn(mut self, receiver: FrameReceiver) -> ProducerHandle {
        let state = Arc::new(ProducerState::default());
        let thread_state = state.clone();
        let thread = std::thread::Builder::new()
            .name("video-producer".into())
            .spawn(move || {
                match self.run() {
                    Ok(()) => thread_state.finish(),
                    Err(error) => thread_state.fail(error),
                }
                debug!("video producer exited");
            })
            .expect("failed to spawn the video producer thread");

        ProducerHandle::new(state, receiver, thread)
    }

    /// A producer standing in when the output has no video track: already
    /// finished, nothing queued. The muxer loop degenerates to a pure audio
    /// drain.
    #[must_use]
    pub fn none(receiver: FrameReceiver) -> ProducerHandle {
        let state = Arc::new(ProducerState::default());
        state.finish();
        let thread = std::thread::Builder::new()
            .name("no-video-producer".into())
            .spawn(|| {})
            .expect("failed to spawn the no-video thread");
        ProducerHandle::new(state, receiver, thread)
    }

    fn run(&mut self) -> Result<()> {
        let mut frame_index: u64 = 0;
        info!(
            "composing video up to {} ns at {} fps",
            self.max_end_time, self.fps
        );

        loop {
            // Derive each tick from the frame index so rounding never
            // accumulates.
            let t = (u128::from(frame_index) * u128::from(NANOS_PER_SECOND)
                * u128::from(self.fps.den)
                / u128::from(self.fps.num)) as u64;
            if t >= self.max_end_time {
                break;
            }

            self.scratch.clone_from(self.filler.black_frame());
            match &mut self.composer {
                ActiveComposer::Region(composer) => {
                    composer.compose_at(t, &mut self.scratch, &mut self.sources)?;
                }
                ActiveComposer::Grid { composer, slots } => {
                    let images = live_images(slots, &mut self.sources, t)?;
                    composer.compose(&mut self.scratch, &images);
                }
                ActiveComposer::ParallelGrid { composer, slots } => {
                    let images = live_images(slots, &mut self.sources, t)?;
                    composer.compose(&mut self.scratch, &images);
                }
            }

            self.encoder.encode(&self.scratch)?;
            frame_index += 1;
        }

        self.encoder.flush()
    }
}

/// All video sources of the layout in region and id order, one grid slot
/// each.
fn grid_slots(layout: &CompiledLayout) -> Result<Vec<(SourceId, Interval)>> {
    let mut slots = Vec::new();
    for region in &layout.regions {
        for entry in &region.sequence {
            if !slots.iter().any(|(id, _)| *id == entry.source) {
                slots.push((entry.source, layout.catalog.get(entry.source)?.interval));
            }
        }
    }
    Ok(slots)
}

/// Current image per grid slot; sources outside their live interval stay
/// black.
fn live_images<'a>(
    slots: &[(SourceId, Interval)],
    sources: &'a mut VideoSources,
    t: u64,
) -> Result<Vec<Option<&'a YuvImage>>> {
    let requests: Vec<(SourceId, Option<u64>)> = slots
        .iter()
        .map(|(id, interval)| (*id, interval.contains(t).then(|| t - interval.lo)))
        .collect();
    sources.images_at(&requests)
}
