// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Producer threads and the handles the muxer loop polls.
//!
//! A producer is an owned worker plus a non-owning [`ProducerHandle`] for
//! status queries; the thread is joined exactly once by the muxer. On
//! failure a producer parks its error in the shared slot and marks itself
//! finished so the muxer notices on its next peek.

mod audio;
mod video;

pub use audio::*;
pub use video::*;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;

use crate::{error::Error, frame::EncodedFrame, queue::FrameReceiver};

/// State shared between a producer thread and its handle.
#[derive(Debug, Default)]
pub struct ProducerState {
    finished: AtomicBool,
    error: Mutex<Option<Error>>,
}

impl ProducerState {
    /// Mark the producer done; nothing further will be queued.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Park an error and mark the producer done.
    pub fn fail(&self, error: Error) {
        error!("producer failed: {error}");
        *self.error.lock() = Some(error);
        self.finish();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// The muxer's view of one producer.
#[derive(Debug)]
pub struct ProducerHandle {
    state: Arc<ProducerState>,
    receiver: FrameReceiver,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ProducerHandle {
    #[must_use]
    pub fn new(
        state: Arc<ProducerState>,
        receiver: FrameReceiver,
        thread: std::thread::JoinHandle<()>,
    ) -> Self {
        Self {
            state,
            receiver,
            thread: Some(thread),
        }
    }

    /// `true` once the producer stopped queueing frames (successfully or
    /// not).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    #[must_use]
    pub fn queue_is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    #[must_use]
    pub fn peek_timestamp(&self) -> Option<u64> {
        self.receiver.peek_timestamp()
    }

    #[must_use]
    pub fn pop(&self) -> Option<EncodedFrame> {
        self.receiver.pop()
    }

    /// Take the parked error, if the producer failed.
    #[must_use]
    pub fn take_error(&self) -> Option<Error> {
        self.state.error.lock().take()
    }

    /// Join the producer thread. Safe to call more than once; only the
    /// first call waits.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("producer thread panicked");
            }
        }
    }
}
