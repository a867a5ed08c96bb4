// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::sync::Arc;

use crate::{
    codec::{AudioDecoder, AudioEncoder},
    error::Result,
    filler::Filler,
    frame::PcmBlock,
    interval::Interval,
    producer::{ProducerHandle, ProducerState},
    queue::FrameReceiver,
    source::SourceId,
    types::{CHANNELS, NANOS_PER_SECOND, SAMPLES_PER_BLOCK, SAMPLE_RATE},
};

/// One audio source as the mixer sees it: its live interval on the trimmed
/// timeline and the decoder delivering its PCM.
pub struct AudioSource {
    pub id: SourceId,
    pub interval: Interval,
    pub decoder: Box<dyn AudioDecoder>,
}

impl std::fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSource")
            .field("id", &self.id)
            .field("interval", &self.interval)
            .finish()
    }
}

/// Mixes all audio sources into one stream of encoded frames covering the
/// whole composed timeline.
///
/// Runs on its own thread; the returned handle is polled by the muxer.
pub struct AudioProducer {
    sources: Vec<AudioSourceState>,
    encoder: Box<dyn AudioEncoder>,
    /// End of the mixed timeline in trimmed session nanoseconds.
    max_end_time: u64,
    filler: Filler,
}

struct AudioSourceState {
    source: AudioSource,
    eof: bool,
}

impl std::fmt::Debug for AudioProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioProducer")
            .field("sources", &self.sources.len())
            .field("max_end_time", &self.max_end_time)
            .finish()
    }
}

impl AudioProducer {
    #[must_use]
    pub fn new(
        sources: Vec<AudioSource>,
        encoder: Box<dyn AudioEncoder>,
        max_end_time: u64,
        filler: Filler,
    ) -> Self {
        Self {
            sources: sources
                .into_iter()
                .map(|source| AudioSourceState { source, eof: false })
                .collect(),
            encoder,
            max_end_time,
            filler,
        }
    }

    /// Start the mixing thread.
    pub fn spawn(mut self, receiver: FrameReceiver) -> ProducerHandle {
        let state = Arc::new(ProducerState::default());
        let thread_state = state.clone();
        let thread = std::thread::Builder::new()
            .name("audio-producer".into())
            .spawn(move || {
                match self.run() {
                    Ok(()) => thread_state.finish(),
                    Err(error) => thread_state.fail(error),
                }
                debug!("audio producer exited");
            })
            .expect("failed to spawn the audio producer thread");

        ProducerHandle::new(state, receiver, thread)
    }

    fn run(&mut self) -> Result<()> {
        let block_duration = SAMPLES_PER_BLOCK as u64 * NANOS_PER_SECOND / u64::from(SAMPLE_RATE);
        let block_count = self.max_end_time.div_ceil(block_duration);
        info!(
            "mixing {} audio source(s) into {block_count} blocks",
            self.sources.len()
        );

        for block_index in 0..block_count {
            let center = block_index * block_duration + block_duration / 2;
            let block = self.mix_block(center)?;
            self.encoder.encode(&block)?;
        }

        self.encoder.flush()
    }

    /// Accumulate every live source into a 32-bit buffer, then saturate to
    /// 16 bit. Silence when nobody is present.
    fn mix_block(&mut self, center: u64) -> Result<PcmBlock> {
        let mut acc = [0i32; SAMPLES_PER_BLOCK * CHANNELS as usize];
        let mut mixed = false;

        for state in &mut self.sources {
            if state.eof || !state.source.interval.contains(center) {
                continue;
            }
            match state.source.decoder.read_block()? {
                Some(block) => {
                    for (acc, sample) in acc.iter_mut().zip(&block.samples) {
                        *acc += i32::from(*sample);
                    }
                    mixed = true;
                }
                None => {
                    debug!("audio source {} ended", state.source.id);
                    state.eof = true;
                }
            }
        }

        if !mixed {
            return Ok(self.filler.silence());
        }
        Ok(PcmBlock::from_samples(
            acc.iter()
                .map(|&s| s.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16)
                .collect(),
        ))
    }
}
