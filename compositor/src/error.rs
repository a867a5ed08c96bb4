// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use std::path::PathBuf;

/// Result type used throughout the compositor crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the composition pipeline.
///
/// `Config` and `Setup` errors occur before any producer thread starts.
/// `Decode`, `Encode` and `Mux` errors abort a running pipeline; composition
/// is all-or-nothing and never retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed layout or metadata, invalid enum value, resolution below
    /// minimum, missing required field.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Codec library unavailable, output file non-creatable, invalid
    /// faststart temp directory.
    #[error("setup failed: {0}")]
    Setup(String),

    /// Non-recoverable input handed to a decoder.
    #[error("decoding failed: {0}")]
    Decode(String),

    /// Encoder rejected a frame or an encoder session failed.
    #[error("encoding failed: {0}")]
    Encode(String),

    /// The container rejected a frame (out of order, size limit, ...).
    #[error("muxing failed: {0}")]
    Mux(String),

    /// Underlying file or OS error.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invariant violation; indicates a bug.
    #[error("internal error: {0}")]
    Logic(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
