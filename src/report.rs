// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Writes the success/failure report files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use compositor::report::ReportData;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Report<'a> {
    recording_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(flatten)]
    data: &'a ReportData,
    versions: Versions,
}

#[derive(Debug, Serialize)]
struct Versions {
    compose: &'static str,
    compositor: &'static str,
}

fn versions() -> Versions {
    Versions {
        compose: env!("CARGO_PKG_VERSION"),
        compositor: env!("CARGO_PKG_VERSION"),
    }
}

/// Write `<UTC>_<recording_id>_success.json` into `dir`.
pub fn write_success(dir: &Path, recording_id: &str, data: &ReportData) -> Result<PathBuf> {
    write(dir, recording_id, "success", data, None)
}

/// Write `<UTC>_<recording_id>_failure.json` into `dir`.
pub fn write_failure(
    dir: &Path,
    recording_id: &str,
    data: &ReportData,
    error: &str,
) -> Result<PathBuf> {
    write(dir, recording_id, "failure", data, Some(error))
}

fn write(
    dir: &Path,
    recording_id: &str,
    outcome: &str,
    data: &ReportData,
    error: Option<&str>,
) -> Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let path = dir.join(format!("{timestamp}_{recording_id}_{outcome}.json"));

    let report = Report {
        recording_id,
        error,
        data,
        versions: versions(),
    };
    let json = serde_json::to_string_pretty(&report).context("failed to serialize the report")?;
    std::fs::write(&path, json)
        .with_context(|| format!("failed to write the report to '{}'", path.display()))?;

    info!("wrote {outcome} report '{}'", path.display());
    Ok(path)
}
