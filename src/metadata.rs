// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Loads recording metadata and layout JSON and turns them into the
//! compositor's layout description plus the source catalog.
//!
//! Two kinds of input files exist: the session's recording metadata (given
//! with `-f`, one `archives` array for the whole session) and per-archive
//! metadata files referenced from a layout's source lists.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use compositor::{
    layout::{LayoutDescription, RegionDescription},
    ArchiveItem, ContainerFormat, Position, Resolution, Reuse, SourceCatalog, SourceKind,
};
use serde::Deserialize;

/// Cell size used when no layout is given and the grid is derived from the
/// session metadata.
const IMPLICIT_CELL_WIDTH: u32 = 320;
const IMPLICIT_CELL_HEIGHT: u32 = 240;

/// The z position a screen capture region is stacked at.
const SCREEN_CAPTURE_Z: i64 = 100;

/// Everything needed to start composing.
#[derive(Debug)]
pub struct ComposeInput {
    pub recording_id: String,
    pub description: LayoutDescription,
    pub catalog: SourceCatalog,
    /// Explicit container choice from the layout's `format` field.
    pub format: Option<ContainerFormat>,
    /// The path output naming defaults to.
    pub base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawSession {
    recording_id: String,
    #[serde(default)]
    #[allow(dead_code)]
    created_at: Option<String>,
    archives: Vec<RawArchive>,
}

#[derive(Debug, Deserialize)]
struct RawArchive {
    #[serde(alias = "filename", alias = "file_path")]
    path: Option<PathBuf>,
    connection_id: String,
    start_time_offset: f64,
    stop_time_offset: f64,
}

#[derive(Debug, Deserialize)]
struct RawLayout {
    #[serde(default)]
    format: Option<ContainerFormat>,
    #[serde(default)]
    bitrate: u32,
    resolution: String,
    #[serde(default = "default_trim")]
    trim: bool,
    #[serde(default)]
    audio_sources: Vec<PathBuf>,
    /// Reserved.
    #[serde(default)]
    #[allow(dead_code)]
    audio_sources_excluded: Vec<PathBuf>,
    #[serde(default)]
    video_layout: BTreeMap<String, RawRegion>,
}

fn default_trim() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawRegion {
    #[serde(default)]
    x_pos: u32,
    #[serde(default)]
    y_pos: u32,
    #[serde(default)]
    z_pos: i64,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    max_columns: u32,
    #[serde(default)]
    max_rows: u32,
    #[serde(default)]
    cells_excluded: Vec<u64>,
    #[serde(default)]
    reuse: Reuse,
    video_sources: Vec<PathBuf>,
    /// Reserved.
    #[serde(default)]
    #[allow(dead_code)]
    video_sources_excluded: Vec<PathBuf>,
}

/// Load the session metadata given with `-f`.
pub fn load_session(path: &Path) -> Result<(String, Vec<ArchiveItem>)> {
    let raw: RawSession = read_json(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let archives = raw
        .archives
        .into_iter()
        .map(|archive| archive_item(archive, base))
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("invalid archive list in '{}'", path.display()))?;

    if archives.is_empty() {
        bail!("'{}' lists no archives", path.display());
    }
    Ok((raw.recording_id, archives))
}

/// Load one per-archive metadata file referenced from a layout.
fn load_archive(path: &Path) -> Result<ArchiveItem> {
    let raw: RawArchive = read_json(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    archive_item(raw, base)
}

/// Resolve one raw archive entry: the media path defaults to the metadata
/// file's name with a `.webm` extension.
fn archive_item(raw: RawArchive, base: &Path) -> Result<ArchiveItem> {
    let path = raw
        .path
        .ok_or_else(|| anyhow::anyhow!("archive '{}' names no media file", raw.connection_id))?;
    let path = if path.is_relative() {
        base.join(path)
    } else {
        path
    };
    Ok(ArchiveItem {
        path,
        connection_id: raw.connection_id,
        start_time_offset: raw.start_time_offset,
        stop_time_offset: raw.stop_time_offset,
    })
}

/// Build the composition input from an explicit layout file.
pub fn from_layout(layout_path: &Path) -> Result<ComposeInput> {
    let raw: RawLayout = read_json(layout_path)?;
    let base = layout_path.parent().unwrap_or_else(|| Path::new("."));

    let mut catalog = SourceCatalog::default();
    let mut audio_sources = Vec::new();
    for source_path in &raw.audio_sources {
        let item = load_archive(&resolve(base, source_path))?;
        audio_sources.push(catalog.add(SourceKind::Audio, &item)?);
    }

    let mut regions = Vec::new();
    for (name, region) in raw.video_layout {
        let mut video_sources = Vec::new();
        for source_path in &region.video_sources {
            let item = load_archive(&resolve(base, source_path))?;
            video_sources.push(catalog.add(SourceKind::Video, &item)?);
        }
        regions.push(RegionDescription {
            name,
            position: Position {
                x: region.x_pos,
                y: region.y_pos,
            },
            z_index: region.z_pos,
            width: region.width,
            height: region.height,
            max_columns: region.max_columns,
            max_rows: region.max_rows,
            cells_excluded: region.cells_excluded,
            reuse: region.reuse,
            video_sources,
        });
    }

    let description = LayoutDescription {
        resolution: Resolution::parse(&raw.resolution)?,
        trim: raw.trim,
        bitrate_kbps: raw.bitrate,
        audio_sources,
        regions,
    };

    let recording_id = layout_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "layout".to_string());

    Ok(ComposeInput {
        recording_id,
        description,
        catalog,
        format: raw.format,
        base_path: layout_path.to_path_buf(),
    })
}

/// Build the implicit grid layout from the session metadata: every archive
/// contributes audio and video, cells are 320x240, the grid is squarish.
pub fn from_session(metadata_path: &Path, audio_only: bool) -> Result<ComposeInput> {
    let (recording_id, archives) = load_session(metadata_path)?;

    let mut catalog = SourceCatalog::default();
    let mut audio_sources = Vec::new();
    let mut video_sources = Vec::new();
    for item in &archives {
        audio_sources.push(catalog.add(SourceKind::Audio, item)?);
        if !audio_only {
            video_sources.push(catalog.add(SourceKind::Video, item)?);
        }
    }

    let grid = compositor::layout::calc_grid_dimension(0, 0, video_sources.len().max(1) as u32);
    let resolution = Resolution::new(
        grid.columns * IMPLICIT_CELL_WIDTH,
        grid.rows * IMPLICIT_CELL_HEIGHT,
    );

    let regions = if audio_only {
        Vec::new()
    } else {
        vec![RegionDescription {
            name: "grid".to_string(),
            position: Position::default(),
            z_index: 0,
            width: 0,
            height: 0,
            max_columns: 0,
            max_rows: 0,
            cells_excluded: Vec::new(),
            reuse: Reuse::ShowOldest,
            video_sources,
        }]
    };

    Ok(ComposeInput {
        recording_id,
        description: LayoutDescription {
            resolution,
            trim: true,
            bitrate_kbps: 0,
            audio_sources,
            regions,
        },
        catalog,
        format: None,
        base_path: metadata_path.to_path_buf(),
    })
}

/// Stack a screen-capture session as a full-frame region above everything
/// else.
pub fn add_screen_capture(
    input: &mut ComposeInput,
    metadata_path: &Path,
    connection_id: Option<&str>,
) -> Result<()> {
    let (_, archives) = load_session(metadata_path)?;

    let mut video_sources = Vec::new();
    for item in &archives {
        if connection_id.is_some_and(|id| id != item.connection_id) {
            continue;
        }
        video_sources.push(input.catalog.add(SourceKind::Video, item)?);
    }
    if video_sources.is_empty() {
        bail!(
            "'{}' contains no matching screen-capture archive",
            metadata_path.display()
        );
    }

    input.description.regions.push(RegionDescription {
        name: "screen-capture".to_string(),
        position: Position::default(),
        z_index: SCREEN_CAPTURE_Z,
        width: 0,
        height: 0,
        max_columns: 1,
        max_rows: 1,
        cells_excluded: Vec::new(),
        reuse: Reuse::ShowOldest,
        video_sources,
    });
    Ok(())
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse '{}'", path.display()))
}
