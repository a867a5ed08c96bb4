// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use serde::Deserialize;

use crate::{interval::Interval, source::SourceId};

/// How a freed cell is matched to a newly entering source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reuse {
    /// Every cell is used at most once; sources beyond the cell count are
    /// dropped.
    None,
    /// Prefer the cell that has been free the longest.
    #[default]
    ShowOldest,
    /// Prefer the most recently freed cell.
    ShowNewest,
}

/// One scheduled appearance: `source` occupies `cell_index` for the whole of
/// `interval` on the session timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceEntry {
    pub cell_index: usize,
    pub source: SourceId,
    /// Live interval clipped to the cell's availability. A source that had
    /// to wait for its cell starts late; the waiting portion of its media is
    /// not shown.
    pub interval: Interval,
}

/// Result of scheduling one region's sources onto its cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    /// Sorted by `interval.lo`.
    pub entries: Vec<SequenceEntry>,
    /// Sources that never got a cell.
    pub dropped: Vec<SourceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanState {
    /// Never used so far; sorts before every vacated cell.
    Fresh,
    /// Vacated at the contained time.
    Vacated(u64),
    Used {
        end_time: u64,
    },
    Excluded,
}

impl PlanState {
    fn release(self, t: u64) -> PlanState {
        match self {
            PlanState::Used { end_time } if end_time <= t => PlanState::Vacated(end_time),
            other => other,
        }
    }

    /// Ordering key for idle candidates: time of last use.
    fn idle_time(self) -> Option<u64> {
        match self {
            PlanState::Fresh => Some(0),
            PlanState::Vacated(t) => Some(t),
            _ => None,
        }
    }
}

/// Schedule `sources` onto `cell_count` cells according to `reuse`.
///
/// Sources are processed in order of `(start, stop, id)`; cells expire
/// lazily as each source enters. With [`Reuse::None`] a source takes the
/// first never-used cell or is dropped. With the reuse policies an idle cell
/// is picked by `(vacate time, index)` (smallest for oldest, largest for
/// newest); when none is idle the source waits for the cell with the
/// earliest end time and its entry is clipped accordingly.
#[must_use]
pub fn schedule_sources(
    reuse: Reuse,
    sources: &[(SourceId, Interval)],
    cell_count: usize,
    cells_excluded: &[u64],
) -> Schedule {
    let mut cells = vec![PlanState::Fresh; cell_count];
    for &index in cells_excluded {
        if let Some(cell) = cells.get_mut(index as usize) {
            *cell = PlanState::Excluded;
        }
    }

    let mut sorted: Vec<(SourceId, Interval)> = sources.to_vec();
    sorted.sort_by_key(|(id, interval)| (interval.lo, interval.hi, *id));

    let mut schedule = Schedule::default();
    for (id, interval) in sorted {
        for cell in &mut cells {
            *cell = cell.release(interval.lo);
        }

        let picked: Option<(usize, Interval)> = match reuse {
            Reuse::None => cells
                .iter()
                .position(|c| *c == PlanState::Fresh)
                .map(|index| (index, interval)),
            Reuse::ShowOldest | Reuse::ShowNewest => {
                let idle_candidates = cells
                    .iter()
                    .enumerate()
                    .filter_map(|(index, c)| c.idle_time().map(|t| (t, index)));
                let idle = if reuse == Reuse::ShowOldest {
                    idle_candidates.min()
                } else {
                    idle_candidates.max()
                };
                match idle {
                    Some((_, index)) => Some((index, interval)),
                    None => {
                        // All cells busy: wait for the earliest-ending one.
                        cells
                            .iter()
                            .enumerate()
                            .filter_map(|(index, c)| match c {
                                PlanState::Used { end_time } => Some((*end_time, index)),
                                _ => None,
                            })
                            .min()
                            .and_then(|(end_time, index)| {
                                (end_time < interval.hi)
                                    .then(|| (index, Interval::new(end_time, interval.hi)))
                            })
                    }
                }
            }
        };

        match picked {
            Some((index, entry_interval)) => {
                cells[index] = PlanState::Used {
                    end_time: entry_interval.hi,
                };
                schedule.entries.push(SequenceEntry {
                    cell_index: index,
                    source: id,
                    interval: entry_interval,
                });
            }
            None => {
                warn!("source {id} does not fit into any cell and will not be shown");
                schedule.dropped.push(id);
            }
        }
    }

    schedule
        .entries
        .sort_by_key(|e| (e.interval.lo, e.cell_index));
    schedule
}
