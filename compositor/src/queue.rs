// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Bounded single-producer/single-consumer frame queue.
//!
//! A producer thread pushes encoded frames, the muxer thread peeks the head
//! timestamp to decide the interleave order and pops once the container has
//! accepted the frame. Pushing blocks while the queue is full; the muxer's
//! sleep-poll rhythm is the only other backpressure in the pipeline.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use parking_lot::{Condvar, Mutex};

use crate::frame::EncodedFrame;

#[derive(Debug)]
struct Shared {
    queue: Mutex<Inner>,
    space: Condvar,
    capacity: usize,
}

#[derive(Debug, Default)]
struct Inner {
    frames: VecDeque<EncodedFrame>,
    receiver_alive: bool,
}

/// Create a queue holding at most `capacity` frames.
#[must_use]
pub fn frame_queue(capacity: usize) -> (FrameSender, FrameReceiver) {
    let shared = Arc::new(Shared {
        queue: Mutex::new(Inner {
            frames: VecDeque::with_capacity(capacity),
            receiver_alive: true,
        }),
        space: Condvar::new(),
        capacity,
    });
    (FrameSender(shared.clone()), FrameReceiver(shared))
}

/// Producer side; owned by exactly one encoder.
#[derive(Debug)]
pub struct FrameSender(Arc<Shared>);

impl FrameSender {
    /// Enqueue a frame, blocking while the queue is full.
    ///
    /// Returns `false` when the receiver is gone; the producer should stop
    /// encoding in that case.
    pub fn push(&self, frame: EncodedFrame) -> bool {
        let mut inner = self.0.queue.lock();
        while inner.frames.len() >= self.0.capacity {
            if !inner.receiver_alive {
                return false;
            }
            self.0
                .space
                .wait_for(&mut inner, Duration::from_millis(100));
        }
        if !inner.receiver_alive {
            return false;
        }
        inner.frames.push_back(frame);
        true
    }
}

/// Consumer side; owned by the muxer loop.
#[derive(Debug)]
pub struct FrameReceiver(Arc<Shared>);

impl FrameReceiver {
    /// Timestamp of the head frame without consuming it.
    #[must_use]
    pub fn peek_timestamp(&self) -> Option<u64> {
        self.0.queue.lock().frames.front().map(|f| f.timestamp)
    }

    /// Take the head frame.
    #[must_use]
    pub fn pop(&self) -> Option<EncodedFrame> {
        let frame = self.0.queue.lock().frames.pop_front();
        if frame.is_some() {
            self.0.space.notify_one();
        }
        frame
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.queue.lock().frames.is_empty()
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        self.0.queue.lock().receiver_alive = false;
        self.0.space.notify_one();
    }
}
