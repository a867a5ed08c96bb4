// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! The layout planner.
//!
//! Compiles a declarative layout description plus the loaded source catalog
//! into everything the producers need: per-region grids and cell geometry, a
//! schedule deciding which cell shows which source at every instant, the
//! global trim list, and the source catalog with all trims already applied.
//!
//! The planner runs to completion before any producer thread starts; its
//! outputs are immutable afterwards and safe to share by reference.

mod cell;
mod grid;
mod sequence;

pub use cell::*;
pub use grid::*;
pub use sequence::*;

use crate::{
    error::{Error, Result},
    interval::{overlap_intervals, overlap_trim_intervals, Interval, TrimIntervals},
    source::{SourceCatalog, SourceId},
    types::{Position, Resolution},
};

/// Smallest allowed region dimension.
const MIN_REGION_SIZE: u32 = 16;

/// Declarative description of the output composition, as read from layout
/// JSON (with archive paths already resolved into catalog ids).
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutDescription {
    pub resolution: Resolution,
    /// Collapse dead air out of the output timeline.
    pub trim: bool,
    /// 0 selects the automatic bitrate.
    pub bitrate_kbps: u32,
    pub audio_sources: Vec<SourceId>,
    pub regions: Vec<RegionDescription>,
}

/// One named region of the output frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionDescription {
    pub name: String,
    pub position: Position,
    pub z_index: i64,
    /// 0 extends the region to the right output edge.
    pub width: u32,
    /// 0 extends the region to the bottom output edge.
    pub height: u32,
    /// 0 = unconstrained.
    pub max_columns: u32,
    /// 0 = unconstrained.
    pub max_rows: u32,
    pub cells_excluded: Vec<u64>,
    pub reuse: Reuse,
    pub video_sources: Vec<SourceId>,
}

/// Planner output for one region, sorted into z-order within
/// [`CompiledLayout`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRegion {
    pub name: String,
    pub position: Position,
    pub z_index: i64,
    pub resolution: Resolution,
    pub grid: GridDimension,
    /// Row-major cell geometry, `grid.cell_count()` entries.
    pub cells: Vec<CellGeometry>,
    pub cells_excluded: Vec<u64>,
    /// Schedule entries with trim-adjusted intervals, sorted by start.
    pub sequence: Vec<ScheduledSource>,
    pub dropped: Vec<SourceId>,
}

/// A [`SequenceEntry`] after trim adjustment, enriched with the offset into
/// the source's media at which the appearance starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledSource {
    pub cell_index: usize,
    pub source: SourceId,
    /// Occupation interval on the trimmed output timeline.
    pub interval: Interval,
    /// Media time of the source at `interval.lo`. Non-zero when the source
    /// had to wait for its cell.
    pub media_offset: u64,
}

/// Everything the composition pipeline needs, produced once by
/// [`compile`].
#[derive(Debug, Clone)]
pub struct CompiledLayout {
    pub resolution: Resolution,
    pub bitrate_kbps: u32,
    /// The applied trim list, in pre-trim session time.
    pub trim_intervals: TrimIntervals,
    /// End of the composed timeline after trimming.
    pub max_end_time: u64,
    /// End of the mixed audio after trimming.
    pub audio_max_end_time: u64,
    /// Regions sorted by ascending z; lower z is drawn first.
    pub regions: Vec<CompiledRegion>,
    pub audio_sources: Vec<SourceId>,
    /// Catalog with all source intervals mapped onto the trimmed timeline.
    pub catalog: SourceCatalog,
}

/// Compile a layout description against the loaded catalog.
///
/// # Errors
///
/// Returns [`Error::Config`] for an invalid resolution or region geometry.
pub fn compile(description: &LayoutDescription, catalog: &SourceCatalog) -> Result<CompiledLayout> {
    let resolution = description.resolution.rounded()?;
    let bitrate_kbps = if description.bitrate_kbps == 0 {
        auto_bitrate_kbps(resolution)
    } else {
        description.bitrate_kbps
    };

    // Audio dead air: complement of the union over all audio sources.
    let audio_intervals = source_intervals(catalog, &description.audio_sources)?;
    let audio_overlap = overlap_intervals(&audio_intervals);

    let mut trim_lists = vec![audio_overlap.trim_intervals.clone()];
    let mut planned_regions = Vec::with_capacity(description.regions.len());
    for region in &description.regions {
        let planned = plan_region(region, resolution, catalog)?;
        trim_lists.push(planned.trim_intervals.clone());
        planned_regions.push(planned);
    }

    // A time is trimmable only when every subsystem marked it so.
    let mut trim_intervals = overlap_trim_intervals(&trim_lists);
    if !description.trim {
        // Trimming disabled: the output still starts at the first live
        // moment, later gaps stay.
        trim_intervals = trim_intervals.initial_only();
    }
    for interval in trim_intervals.as_slice() {
        debug!("trim interval: [{}, {})", interval.lo, interval.hi);
    }

    // Map every source onto the trimmed timeline.
    let mut catalog = catalog.clone();
    for id in catalog.iter().map(|s| s.id).collect::<Vec<_>>() {
        let source = catalog.get_mut(id)?;
        source.interval = trim_intervals.subtract_from_interval(source.interval);
    }

    let audio_max_end_time = trim_intervals.subtract_from_instant(audio_overlap.max_end_time);
    let mut max_end_time = audio_max_end_time;

    let mut regions = Vec::with_capacity(planned_regions.len());
    for planned in planned_regions {
        max_end_time =
            max_end_time.max(trim_intervals.subtract_from_instant(planned.max_source_end));
        regions.push(planned.compiled(&trim_intervals));
    }
    regions.sort_by_key(|r| r.z_index);

    info!(
        "layout compiled: {resolution}, {} region(s), {} trim interval(s), duration {} ns",
        regions.len(),
        trim_intervals.as_slice().len(),
        max_end_time
    );

    Ok(CompiledLayout {
        resolution,
        bitrate_kbps,
        trim_intervals,
        max_end_time,
        audio_max_end_time,
        regions,
        audio_sources: description.audio_sources.clone(),
        catalog,
    })
}

/// Automatic video bitrate in kbps for the given output resolution.
#[must_use]
pub fn auto_bitrate_kbps(resolution: Resolution) -> u32 {
    ((resolution.area() / 300) as u32).max(200)
}

fn source_intervals(catalog: &SourceCatalog, ids: &[SourceId]) -> Result<Vec<Interval>> {
    ids.iter().map(|&id| Ok(catalog.get(id)?.interval)).collect()
}

struct PlannedRegion {
    name: String,
    position: Position,
    z_index: i64,
    resolution: Resolution,
    grid: GridDimension,
    cells: Vec<CellGeometry>,
    cells_excluded: Vec<u64>,
    schedule: Schedule,
    /// Pre-trim source intervals, for the region's end time.
    max_source_end: u64,
    trim_intervals: TrimIntervals,
    /// Pre-trim source start per id, for media offsets.
    source_starts: Vec<(SourceId, u64)>,
}

impl PlannedRegion {
    fn compiled(&self, trims: &TrimIntervals) -> CompiledRegion {
        let sequence = self
            .schedule
            .entries
            .iter()
            .map(|entry| {
                let source_start = self
                    .source_starts
                    .iter()
                    .find(|(id, _)| *id == entry.source)
                    .map(|(_, start)| *start)
                    .unwrap_or(entry.interval.lo);
                ScheduledSource {
                    cell_index: entry.cell_index,
                    source: entry.source,
                    interval: trims.subtract_from_interval(entry.interval),
                    media_offset: entry.interval.lo - source_start,
                }
            })
            .collect();

        CompiledRegion {
            name: self.name.clone(),
            position: self.position,
            z_index: self.z_index,
            resolution: self.resolution,
            grid: self.grid,
            cells: self.cells.clone(),
            cells_excluded: self.cells_excluded.clone(),
            sequence,
            dropped: self.schedule.dropped.clone(),
        }
    }
}

fn plan_region(
    region: &RegionDescription,
    output: Resolution,
    catalog: &SourceCatalog,
) -> Result<PlannedRegion> {
    let resolution = region_resolution(region, output)?;
    // Even origin keeps every blit chroma-aligned.
    let position = Position {
        x: region.position.x & !1,
        y: region.position.y & !1,
    };

    let mut cells_excluded = region.cells_excluded.clone();
    cells_excluded.sort_unstable();
    cells_excluded.dedup();

    let slots = add_excluded_cells(region.video_sources.len() as u32, &cells_excluded);
    let grid = calc_grid_dimension(region.max_columns, region.max_rows, slots);
    let cells = grid_cell_geometry(resolution, grid);

    let sources: Vec<(SourceId, Interval)> = region
        .video_sources
        .iter()
        .map(|&id| Ok((id, catalog.get(id)?.interval)))
        .collect::<Result<_>>()?;
    let schedule = schedule_sources(region.reuse, &sources, grid.cell_count(), &cells_excluded);

    // Dead air analysis. Without reuse every source interval counts, even a
    // dropped one; with reuse only the scheduled appearances do.
    let analysed: Vec<Interval> = if region.reuse == Reuse::None {
        sources.iter().map(|(_, interval)| *interval).collect()
    } else {
        schedule.entries.iter().map(|e| e.interval).collect()
    };
    let mut overlap = overlap_intervals(&analysed);
    overlap.max_end_time = sources
        .iter()
        .map(|(_, i)| i.hi)
        .max()
        .unwrap_or(0)
        .max(overlap.max_end_time);

    debug!(
        "region '{}': grid {grid}, {} source(s), {} scheduled, {} dropped",
        region.name,
        sources.len(),
        schedule.entries.len(),
        schedule.dropped.len()
    );

    Ok(PlannedRegion {
        name: region.name.clone(),
        position,
        z_index: region.z_index,
        resolution,
        grid,
        cells,
        cells_excluded,
        schedule,
        max_source_end: overlap.max_end_time,
        trim_intervals: overlap.trim_intervals,
        source_starts: sources
            .iter()
            .map(|(id, interval)| (*id, interval.lo))
            .collect(),
    })
}

/// Resolve and validate a region's rectangle against the output frame.
fn region_resolution(region: &RegionDescription, output: Resolution) -> Result<Resolution> {
    if region.position.x >= output.width || region.position.y >= output.height {
        return Err(Error::Config(format!(
            "region '{}' starts at {},{} outside the {output} output frame",
            region.name, region.position.x, region.position.y
        )));
    }

    let width = if region.width == 0 {
        output.width - region.position.x
    } else {
        region.width
    } & !1;
    let height = if region.height == 0 {
        output.height - region.position.y
    } else {
        region.height
    } & !1;

    if width < MIN_REGION_SIZE || height < MIN_REGION_SIZE {
        return Err(Error::Config(format!(
            "region '{}' is too small: {width}x{height}",
            region.name
        )));
    }
    if region.position.x + width > output.width || region.position.y + height > output.height {
        return Err(Error::Config(format!(
            "region '{}' ({width}x{height} at {},{}) exceeds the {output} output frame",
            region.name, region.position.x, region.position.y
        )));
    }

    Ok(Resolution::new(width, height))
}

/// Row-major cell rectangles for a grid, remainder pixels spread over the
/// leading columns and rows.
#[must_use]
pub fn grid_cell_geometry(resolution: Resolution, grid: GridDimension) -> Vec<CellGeometry> {
    let columns = split_even(resolution.width, grid.columns);
    let rows = split_even(resolution.height, grid.rows);

    let mut cells = Vec::with_capacity(grid.cell_count());
    for &(y, height) in &rows {
        for &(x, width) in &columns {
            cells.push(CellGeometry {
                position: Position { x, y },
                resolution: Resolution::new(width, height),
            });
        }
    }
    cells
}
