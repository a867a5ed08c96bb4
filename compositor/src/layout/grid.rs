// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

/// Grid dimensions of one region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GridDimension {
    pub columns: u32,
    pub rows: u32,
}

impl GridDimension {
    #[must_use]
    pub fn cell_count(&self) -> usize {
        (self.columns * self.rows) as usize
    }
}

impl std::fmt::Display for GridDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.columns, self.rows)
    }
}

/// Compute the grid for `number_of_sources` slots under the given column and
/// row constraints (0 = unconstrained).
///
/// Unconstrained regions get the smallest square `k * k >= n`. With one
/// dimension constrained, the other expands to fit. With both constrained
/// the grid is capped at `max_columns * max_rows`; sources that do not fit
/// are queued or dropped by the assignment step depending on the region's
/// reuse policy.
#[must_use]
pub fn calc_grid_dimension(
    max_columns: u32,
    max_rows: u32,
    number_of_sources: u32,
) -> GridDimension {
    let n = number_of_sources.max(1);

    match (max_columns, max_rows) {
        (0, 0) => {
            let mut k = 1;
            while k * k < n {
                k += 1;
            }
            GridDimension {
                columns: k,
                rows: k,
            }
        }
        (0, max_rows) => {
            let rows = max_rows.min(n);
            GridDimension {
                columns: n.div_ceil(rows),
                rows,
            }
        }
        (max_columns, 0) => {
            let columns = max_columns.min(n);
            GridDimension {
                columns,
                rows: n.div_ceil(columns),
            }
        }
        (max_columns, max_rows) => {
            let columns = max_columns.min(n);
            let rows = max_rows.min(n.div_ceil(columns));
            if columns * rows < n {
                warn!(
                    "grid {columns}x{rows} cannot hold {n} sources; the overflow will be queued or dropped"
                );
            }
            GridDimension { columns, rows }
        }
    }
}

/// Excluded cells consume grid slots without ever receiving a source, so the
/// grid has to be computed for a correspondingly larger source count: every
/// excluded index that lands inside the enlarged grid adds one slot.
///
/// `cells_excluded` must be sorted; indices beyond the enlarged grid are
/// ignored, and a region without sources stays empty.
#[must_use]
pub fn add_excluded_cells(number_of_sources: u32, cells_excluded: &[u64]) -> u32 {
    if number_of_sources == 0 {
        return 0;
    }
    let mut n = number_of_sources;
    for &index in cells_excluded {
        if index <= u64::from(n) {
            n += 1;
        } else {
            break;
        }
    }
    n
}

/// Split `total` pixels into `parts` even-sized spans, distributing the
/// remainder in 2-pixel units starting from the first span.
///
/// Returns the offset and size of each span; sizes stay even so chroma
/// planes remain aligned.
#[must_use]
pub fn split_even(total: u32, parts: u32) -> Vec<(u32, u32)> {
    let base = (total / parts) & !1;
    let mut extra = total - base * parts;

    let mut spans = Vec::with_capacity(parts as usize);
    let mut offset = 0;
    for _ in 0..parts {
        let mut size = base;
        if extra >= 2 {
            size += 2;
            extra -= 2;
        }
        spans.push((offset, size));
        offset += size;
    }
    spans
}
