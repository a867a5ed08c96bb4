// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    interval::Interval,
    types::NANOS_PER_SECOND,
};

/// Identifies one source within the catalog for the lifetime of a
/// composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub u64);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Audio,
    Video,
}

/// One participant archive entry as found in recording metadata: a media
/// file plus its session-relative start/stop offsets in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveItem {
    pub path: PathBuf,
    pub connection_id: String,
    pub start_time_offset: f64,
    pub stop_time_offset: f64,
}

impl ArchiveItem {
    /// Session-relative interval in integer nanoseconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for negative offsets or a stop that does
    /// not lie after the start.
    pub fn interval(&self) -> Result<Interval> {
        if self.start_time_offset < 0.0 || self.stop_time_offset < 0.0 {
            return Err(Error::Config(format!(
                "archive '{}' has a negative time offset",
                self.path.display()
            )));
        }
        let lo = (self.start_time_offset * NANOS_PER_SECOND as f64).round() as u64;
        let hi = (self.stop_time_offset * NANOS_PER_SECOND as f64).round() as u64;
        if lo >= hi {
            return Err(Error::Config(format!(
                "archive '{}' stops at {} before it starts at {}",
                self.path.display(),
                self.stop_time_offset,
                self.start_time_offset
            )));
        }
        Ok(Interval::new(lo, hi))
    }
}

/// One loaded source: an archive with its live interval on the session
/// timeline. Decoders are attached by the pipeline, not the catalog; each
/// decoder is touched only by the producer thread that owns it.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: SourceId,
    pub kind: SourceKind,
    pub connection_id: String,
    pub path: PathBuf,
    pub interval: Interval,
}

/// All sources of one composition, indexed by [`SourceId`].
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    entries: Vec<Source>,
}

impl SourceCatalog {
    /// Add an archive to the catalog and return its id.
    ///
    /// # Errors
    ///
    /// Fails when the archive's offsets are invalid.
    pub fn add(&mut self, kind: SourceKind, item: &ArchiveItem) -> Result<SourceId> {
        let id = SourceId(self.entries.len() as u64);
        self.entries.push(Source {
            id,
            kind,
            connection_id: item.connection_id.clone(),
            path: item.path.clone(),
            interval: item.interval()?,
        });
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns [`Error::Logic`] for an id the catalog never handed out.
    pub fn get(&self, id: SourceId) -> Result<&Source> {
        self.entries
            .get(id.0 as usize)
            .ok_or_else(|| Error::Logic(format!("unknown source {id}")))
    }

    pub fn get_mut(&mut self, id: SourceId) -> Result<&mut Source> {
        self.entries
            .get_mut(id.0 as usize)
            .ok_or_else(|| Error::Logic(format!("unknown source {id}")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sources of one kind, in id order.
    pub fn of_kind(&self, kind: SourceKind) -> impl Iterator<Item = &Source> {
        self.entries.iter().filter(move |s| s.kind == kind)
    }
}

/// Derive the default output path from the recording metadata path: same
/// stem, container extension.
#[must_use]
pub fn default_output_path(metadata_path: &Path, extension: &str) -> PathBuf {
    metadata_path.with_extension(extension)
}
