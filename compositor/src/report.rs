// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Collects what the success/failure reports need while a composition runs.
//!
//! One reporter is constructed in `main` when reporting is enabled and
//! passed down by reference; decoders and the pipeline feed it through a
//! shared lock. No process-wide state.

use parking_lot::Mutex;
use serde::Serialize;

/// One input archive as it was actually decoded.
#[derive(Debug, Clone, Serialize)]
pub struct InputReport {
    pub path: String,
    pub connection_id: String,
    pub codec: String,
    pub duration_seconds: f64,
}

/// A source changed its frame size mid-stream.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionChangeEvent {
    pub connection_id: String,
    pub timestamp_ns: u64,
    pub width: u32,
    pub height: u32,
}

/// What was produced.
#[derive(Debug, Clone, Serialize)]
pub struct OutputReport {
    pub path: String,
    pub container: String,
    pub audio_codec: String,
    pub video_codec: Option<String>,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportData {
    pub inputs: Vec<InputReport>,
    pub resolution_changes: Vec<ResolutionChangeEvent>,
    pub output: Option<OutputReport>,
}

/// Thread-safe report collector.
#[derive(Debug, Default)]
pub struct Reporter {
    data: Mutex<ReportData>,
}

impl Reporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_input(&self, input: InputReport) {
        self.data.lock().inputs.push(input);
    }

    pub fn add_resolution_change(&self, event: ResolutionChangeEvent) {
        self.data.lock().resolution_changes.push(event);
    }

    pub fn set_output(&self, output: OutputReport) {
        self.data.lock().output = Some(output);
    }

    #[must_use]
    pub fn snapshot(&self) -> ReportData {
        self.data.lock().clone()
    }
}
