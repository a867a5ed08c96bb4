// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Arranges scaled source images into the output frame.
//!
//! Three composers share the job of step 2 of the video tick: the plain
//! [`GridComposer`] draws one image per grid slot, [`ParallelGridComposer`]
//! does the same with the per-cell scaling fanned out over a worker pool,
//! and [`RegionComposer`] walks the compiled regions in z-order driving the
//! cell state machine.

use std::collections::HashMap;

use serde::Deserialize;

use crate::{
    codec::VideoDecoder,
    error::{Error, Result},
    frame::YuvImage,
    layout::{calc_grid_dimension, CellGeometry, CellState, CompiledRegion, ScheduledSource},
    scaler::{FilterMode, PreserveAspectScaler},
    source::SourceId,
    types::{Position, Resolution},
};

/// Which composer arranges the output frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComposerKind {
    Grid,
    ParallelGrid,
    #[default]
    Region,
}

/// Copy `src` into `dst` at pixel position `(x, y)`. Offsets must be even so
/// the chroma planes stay aligned; pixels falling outside `dst` are clipped.
pub fn blit(dst: &mut YuvImage, src: &YuvImage, x: u32, y: u32) {
    debug_assert!(x % 2 == 0 && y % 2 == 0);

    let dst_w = dst.width();
    let dst_h = dst.height();
    if x >= dst_w || y >= dst_h {
        return;
    }
    let copy_w = src.width().min(dst_w - x);
    let copy_h = src.height().min(dst_h - y);

    let (dy, du, dv) = dst.planes_mut();
    copy_rect(src.y_plane(), src.width(), dy, dst_w, x, y, copy_w, copy_h);
    copy_rect(
        src.u_plane(),
        src.width() / 2,
        du,
        dst_w / 2,
        x / 2,
        y / 2,
        copy_w / 2,
        copy_h / 2,
    );
    copy_rect(
        src.v_plane(),
        src.width() / 2,
        dv,
        dst_w / 2,
        x / 2,
        y / 2,
        copy_w / 2,
        copy_h / 2,
    );
}

#[allow(clippy::too_many_arguments)]
fn copy_rect(
    src: &[u8],
    src_stride: u32,
    dst: &mut [u8],
    dst_stride: u32,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
) {
    for row in 0..h {
        let src_offset = (row * src_stride) as usize;
        let dst_offset = ((y + row) * dst_stride + x) as usize;
        dst[dst_offset..dst_offset + w as usize]
            .copy_from_slice(&src[src_offset..src_offset + w as usize]);
    }
}

/// The decoders of all video sources, owned by the video producer thread.
pub struct VideoSources {
    decoders: HashMap<SourceId, Box<dyn VideoDecoder>>,
}

impl std::fmt::Debug for VideoSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSources")
            .field("sources", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl VideoSources {
    #[must_use]
    pub fn new(decoders: HashMap<SourceId, Box<dyn VideoDecoder>>) -> Self {
        Self { decoders }
    }

    /// Image of `source` at media time `t`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Logic`] for a source without a decoder and decoder
    /// errors verbatim.
    pub fn get_image(&mut self, source: SourceId, t: u64) -> Result<&YuvImage> {
        self.decoders
            .get_mut(&source)
            .ok_or_else(|| Error::Logic(format!("no decoder for video source {source}")))?
            .get_image(t)
    }

    /// Decode several sources in one pass, returning one image per request
    /// (`None` where the request carries no media time).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Logic`] for a source without a decoder and decoder
    /// errors verbatim.
    pub fn images_at(
        &mut self,
        requests: &[(SourceId, Option<u64>)],
    ) -> Result<Vec<Option<&YuvImage>>> {
        let mut decoded: HashMap<SourceId, &YuvImage> = HashMap::new();
        for (id, decoder) in &mut self.decoders {
            if let Some((_, Some(t))) = requests.iter().find(|(request_id, _)| request_id == id) {
                decoded.insert(*id, decoder.get_image(*t)?);
            }
        }

        requests
            .iter()
            .map(|(id, t)| match t {
                None => Ok(None),
                Some(_) => decoded
                    .get(id)
                    .copied()
                    .map(Some)
                    .ok_or_else(|| Error::Logic(format!("no decoder for video source {id}"))),
            })
            .collect()
    }
}

/// Fixed grid of scaled source images, one slot per source index.
#[derive(Debug)]
pub struct GridComposer {
    cells: Vec<(CellGeometry, PreserveAspectScaler)>,
}

impl GridComposer {
    #[must_use]
    pub fn new(
        resolution: Resolution,
        n_sources: u32,
        max_columns: u32,
        filter: FilterMode,
    ) -> Self {
        Self {
            cells: grid_cells(resolution, n_sources, max_columns, filter),
        }
    }

    /// Draw `images[i]` into cell `i`. `None` entries stay black.
    pub fn compose(&mut self, scratch: &mut YuvImage, images: &[Option<&YuvImage>]) {
        for ((geometry, scaler), image) in self.cells.iter_mut().zip(images) {
            if let Some(image) = image {
                let scaled = scaler.scale(image);
                blit(scratch, scaled, geometry.position.x, geometry.position.y);
            }
        }
    }
}

/// [`GridComposer`] with the scaling work spread over a bounded worker pool.
///
/// Each compose call is one fork-join barrier inside a single video tick.
#[derive(Debug)]
pub struct ParallelGridComposer {
    cells: Vec<(CellGeometry, PreserveAspectScaler)>,
    workers: usize,
}

impl ParallelGridComposer {
    #[must_use]
    pub fn new(
        resolution: Resolution,
        n_sources: u32,
        max_columns: u32,
        filter: FilterMode,
    ) -> Self {
        let cells = grid_cells(resolution, n_sources, max_columns, filter);
        let workers = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
            .min(cells.len().max(1));
        Self { cells, workers }
    }

    /// Draw `images[i]` into cell `i`. `None` entries stay black.
    pub fn compose(&mut self, scratch: &mut YuvImage, images: &[Option<&YuvImage>]) {
        let mut scaled: Vec<Option<YuvImage>> = (0..self.cells.len()).map(|_| None).collect();

        let mut tasks: Vec<(&mut PreserveAspectScaler, Option<&YuvImage>, &mut Option<YuvImage>)> =
            self.cells
                .iter_mut()
                .map(|(_, scaler)| scaler)
                .zip(images.iter().copied())
                .zip(scaled.iter_mut())
                .map(|((scaler, image), slot)| (scaler, image, slot))
                .collect();

        let chunk_size = tasks.len().div_ceil(self.workers).max(1);
        std::thread::scope(|scope| {
            for chunk in tasks.chunks_mut(chunk_size) {
                scope.spawn(move || {
                    for (scaler, image, slot) in chunk {
                        if let Some(image) = *image {
                            **slot = Some(scaler.scale(image).clone());
                        }
                    }
                });
            }
        });

        for ((geometry, _), image) in self.cells.iter().zip(&scaled) {
            if let Some(image) = image {
                blit(scratch, image, geometry.position.x, geometry.position.y);
            }
        }
    }
}

fn grid_cells(
    resolution: Resolution,
    n_sources: u32,
    max_columns: u32,
    filter: FilterMode,
) -> Vec<(CellGeometry, PreserveAspectScaler)> {
    let grid = calc_grid_dimension(max_columns, 0, n_sources);
    crate::layout::grid_cell_geometry(resolution, grid)
        .into_iter()
        .map(|geometry| {
            let scaler = PreserveAspectScaler::new(geometry.resolution, filter);
            (geometry, scaler)
        })
        .collect()
}

/// Walks the compiled regions in z-order, driving each region's cells.
#[derive(Debug)]
pub struct RegionComposer {
    regions: Vec<RegionState>,
}

#[derive(Debug)]
struct RegionState {
    name: String,
    position: Position,
    cells: Vec<RuntimeCell>,
    sequence: Vec<ScheduledSource>,
    /// First schedule entry not yet assigned.
    next_entry: usize,
}

#[derive(Debug)]
struct RuntimeCell {
    geometry: CellGeometry,
    state: CellState,
    /// Media mapping of the assignment held by `state`.
    entry: Option<ScheduledSource>,
    scaler: PreserveAspectScaler,
}

impl RegionComposer {
    /// Build the runtime state for regions already sorted by z.
    #[must_use]
    pub fn new(regions: &[CompiledRegion], filter: FilterMode) -> Self {
        let regions = regions
            .iter()
            .map(|region| RegionState {
                name: region.name.clone(),
                position: region.position,
                cells: region
                    .cells
                    .iter()
                    .enumerate()
                    .map(|(index, geometry)| RuntimeCell {
                        geometry: *geometry,
                        state: if region.cells_excluded.contains(&(index as u64)) {
                            CellState::Excluded
                        } else {
                            CellState::Idle
                        },
                        entry: None,
                        scaler: PreserveAspectScaler::new(geometry.resolution, filter),
                    })
                    .collect(),
                sequence: region.sequence.clone(),
                next_entry: 0,
            })
            .collect();
        Self { regions }
    }

    /// Compose the output frame for tick `t` into `scratch`.
    ///
    /// # Errors
    ///
    /// Propagates decoder failures.
    pub fn compose_at(
        &mut self,
        t: u64,
        scratch: &mut YuvImage,
        sources: &mut VideoSources,
    ) -> Result<()> {
        for region in &mut self.regions {
            region.advance(t)?;

            for cell in &mut region.cells {
                let Some(source) = cell.state.source() else {
                    continue;
                };
                let entry = cell
                    .entry
                    .filter(|entry| entry.source == source)
                    .ok_or_else(|| {
                        Error::Logic(format!("cell shows {source} without a schedule entry"))
                    })?;
                let media_t = entry.media_offset + (t - entry.interval.lo);
                let image = sources.get_image(source, media_t)?;
                let scaled = cell.scaler.scale(image);
                blit(
                    scratch,
                    scaled,
                    region.position.x + cell.geometry.position.x,
                    region.position.y + cell.geometry.position.y,
                );
            }
        }
        Ok(())
    }
}

impl RegionState {
    /// Release expired cells, then hand due schedule entries to their cells.
    fn advance(&mut self, t: u64) -> Result<()> {
        for cell in &mut self.cells {
            // Idle and excluded cells report u64::MAX and never expire.
            if t >= cell.state.end_time() {
                trace!("region '{}': cell freed at {t}", self.name);
                cell.state = cell.state.released(t);
                cell.entry = None;
            }
        }

        while let Some(entry) = self.sequence.get(self.next_entry) {
            if entry.interval.lo > t {
                break;
            }
            let entry = *entry;
            self.next_entry += 1;
            if entry.interval.hi <= t {
                // The whole appearance lies between two ticks.
                continue;
            }
            let cell = self
                .cells
                .get_mut(entry.cell_index)
                .ok_or_else(|| Error::Logic(format!("cell {} out of range", entry.cell_index)))?;
            cell.state = cell.state.with_source(entry.source, entry.interval.hi);
            cell.entry = Some(entry);
        }
        Ok(())
    }
}
