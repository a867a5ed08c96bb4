// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use proptest::prelude::*;

use crate::{
    interval::Interval,
    layout::{
        add_excluded_cells, calc_grid_dimension, compile, schedule_sources, Reuse,
    },
    source::{SourceId, SourceKind},
    tests::testing,
    types::Resolution,
};

fn iv(lo_s: u64, hi_s: u64) -> Interval {
    Interval::new(testing::secs(lo_s), testing::secs(hi_s))
}

#[test]
fn unconstrained_grid_is_the_smallest_square() {
    assert_eq!(calc_grid_dimension(0, 0, 1).cell_count(), 1);
    let grid = calc_grid_dimension(0, 0, 5);
    assert_eq!((grid.columns, grid.rows), (3, 3));
    let grid = calc_grid_dimension(0, 0, 9);
    assert_eq!((grid.columns, grid.rows), (3, 3));
    let grid = calc_grid_dimension(0, 0, 10);
    assert_eq!((grid.columns, grid.rows), (4, 4));
}

#[test]
fn constrained_grid_expands_the_free_dimension() {
    let grid = calc_grid_dimension(2, 0, 5);
    assert_eq!((grid.columns, grid.rows), (2, 3));
    let grid = calc_grid_dimension(0, 2, 5);
    assert_eq!((grid.columns, grid.rows), (3, 2));
}

#[test]
fn fully_constrained_grid_is_capped() {
    let grid = calc_grid_dimension(1, 1, 2);
    assert_eq!((grid.columns, grid.rows), (1, 1));
    let grid = calc_grid_dimension(2, 2, 3);
    assert_eq!((grid.columns, grid.rows), (2, 2));
}

#[test]
fn excluded_cells_consume_slots() {
    assert_eq!(add_excluded_cells(3, &[0, 4]), 5);
    assert_eq!(add_excluded_cells(3, &[7]), 3);
    assert_eq!(add_excluded_cells(0, &[0]), 0);
}

#[test]
fn show_oldest_waits_for_the_busy_cell() {
    testing::init();

    let sources = [(SourceId(0), iv(0, 10)), (SourceId(1), iv(5, 15))];
    let schedule = schedule_sources(Reuse::ShowOldest, &sources, 1, &[]);

    assert!(schedule.dropped.is_empty());
    assert_eq!(schedule.entries.len(), 2);
    assert_eq!(schedule.entries[0].interval, iv(0, 10));
    // The later source waits; its overlap with the first one is not shown.
    assert_eq!(schedule.entries[1].interval, iv(10, 15));
    assert_eq!(schedule.entries[1].cell_index, 0);
}

#[test]
fn reuse_none_drops_the_overflow() {
    let sources = [
        (SourceId(0), iv(0, 10)),
        (SourceId(1), iv(12, 20)),
    ];
    let schedule = schedule_sources(Reuse::None, &sources, 1, &[]);
    assert_eq!(schedule.entries.len(), 1);
    assert_eq!(schedule.dropped, vec![SourceId(1)]);
}

#[test]
fn show_newest_prefers_the_recently_freed_cell() {
    let sources = [
        (SourceId(0), iv(0, 4)),
        (SourceId(1), iv(0, 6)),
        (SourceId(2), iv(7, 10)),
    ];
    let schedule = schedule_sources(Reuse::ShowNewest, &sources, 3, &[]);
    // At t = 7 both earlier cells are free; the one vacated at t = 6 is the
    // newest candidate and wins over the one vacated at t = 4 and the fresh
    // cell.
    let last = schedule.entries.iter().find(|e| e.source == SourceId(2));
    let first = schedule.entries.iter().find(|e| e.source == SourceId(1));
    assert_eq!(last.map(|e| e.cell_index), first.map(|e| e.cell_index));
}

#[test]
fn excluded_cells_are_never_assigned() {
    let sources = [
        (SourceId(0), iv(0, 10)),
        (SourceId(1), iv(0, 10)),
        (SourceId(2), iv(0, 10)),
    ];
    let schedule = schedule_sources(Reuse::None, &sources, 9, &[0, 4]);
    let cells: Vec<usize> = schedule.entries.iter().map(|e| e.cell_index).collect();
    assert_eq!(cells, vec![1, 2, 3]);
}

#[test]
fn gap_between_sources_becomes_the_trim_list() {
    testing::init();

    let (catalog, ids) = testing::catalog(&[
        ("a", 0.0, 5.0, SourceKind::Audio),
        ("b", 10.0, 15.0, SourceKind::Audio),
        ("a", 0.0, 5.0, SourceKind::Video),
        ("b", 10.0, 15.0, SourceKind::Video),
    ]);

    let layout = testing::compiled(
        &ids[..2],
        vec![testing::region(&ids[2..])],
        true,
        &catalog,
    );

    assert_eq!(
        layout.trim_intervals.as_slice(),
        &[Interval::new(testing::secs(5), testing::secs(10))]
    );
    assert_eq!(layout.max_end_time, testing::secs(10));
    assert_eq!(layout.audio_max_end_time, testing::secs(10));

    // The second source now starts where the first one stopped.
    let region = &layout.regions[0];
    assert_eq!(region.sequence[1].interval, iv(5, 10));
    assert_eq!(layout.catalog.get(ids[1]).unwrap().interval, iv(5, 10));
}

#[test]
fn trimming_disabled_keeps_only_the_leading_gap() {
    let (catalog, ids) = testing::catalog(&[
        ("a", 2.0, 5.0, SourceKind::Audio),
        ("b", 10.0, 15.0, SourceKind::Audio),
    ]);

    let layout = testing::compiled(&ids, Vec::new(), false, &catalog);

    // Only the prefix trim survives; the mid-session gap stays.
    assert_eq!(layout.trim_intervals.as_slice(), &[iv(0, 2)]);
    assert_eq!(layout.max_end_time, testing::secs(13));
    assert_eq!(layout.catalog.get(ids[0]).unwrap().interval, iv(0, 3));
    assert_eq!(layout.catalog.get(ids[1]).unwrap().interval, iv(8, 13));
}

#[test]
fn five_sources_get_a_three_by_three_grid() {
    let (catalog, ids) = testing::catalog(&[
        ("a", 0.0, 10.0, SourceKind::Video),
        ("b", 0.0, 10.0, SourceKind::Video),
        ("c", 0.0, 10.0, SourceKind::Video),
        ("d", 0.0, 10.0, SourceKind::Video),
        ("e", 0.0, 10.0, SourceKind::Video),
    ]);

    let layout = testing::compiled(&[], vec![testing::region(&ids)], true, &catalog);
    let region = &layout.regions[0];

    assert_eq!((region.grid.columns, region.grid.rows), (3, 3));
    assert_eq!(region.cells.len(), 9);

    let used: Vec<usize> = region.sequence.iter().map(|e| e.cell_index).collect();
    assert_eq!(used, vec![0, 1, 2, 3, 4]);

    // 640x480 split 3x3: remainder pixels land on the leading columns.
    let widths: Vec<u32> = region.cells[..3]
        .iter()
        .map(|c| c.resolution.width)
        .collect();
    assert_eq!(widths.iter().sum::<u32>(), 640);
    assert!(widths.iter().all(|w| w % 2 == 0));
}

#[test]
fn regions_are_sorted_by_z_index() {
    let (catalog, ids) = testing::catalog(&[
        ("a", 0.0, 10.0, SourceKind::Video),
        ("b", 0.0, 10.0, SourceKind::Video),
    ]);

    let mut top = testing::region(&ids[..1]);
    top.name = "top".to_string();
    top.z_index = 5;
    let mut bottom = testing::region(&ids[1..]);
    bottom.name = "bottom".to_string();
    bottom.z_index = -1;

    let layout = testing::compiled(&[], vec![top, bottom], true, &catalog);
    let names: Vec<&str> = layout.regions.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["bottom", "top"]);
}

#[test]
fn region_outside_the_frame_is_rejected() {
    let (catalog, ids) = testing::catalog(&[("a", 0.0, 10.0, SourceKind::Video)]);

    let mut region = testing::region(&ids);
    region.position.x = 700;
    let description = testing::layout_description(&[], vec![region], true);
    assert!(compile(&description, &catalog).is_err());
}

#[test]
fn tiny_resolutions_are_rejected() {
    let (catalog, _) = testing::catalog(&[]);
    let mut description = testing::layout_description(&[], Vec::new(), true);
    description.resolution = Resolution::new(12, 480);
    assert!(compile(&description, &catalog).is_err());
}

#[test]
fn resolution_rounds_down_to_multiples_of_four() {
    let (catalog, ids) = testing::catalog(&[("a", 0.0, 1.0, SourceKind::Audio)]);
    let mut description = testing::layout_description(&ids, Vec::new(), true);
    description.resolution = Resolution::new(643, 481);

    let layout = compile(&description, &catalog).unwrap();
    assert_eq!(layout.resolution, Resolution::new(640, 480));
    // Automatic bitrate: max(200, w * h / 300).
    assert_eq!(layout.bitrate_kbps, 1024);
}

proptest! {
    /// The grid always holds the requested sources, and the unconstrained
    /// square is minimal.
    #[test]
    fn grid_closure(n in 1u32..200) {
        let grid = calc_grid_dimension(0, 0, n);
        prop_assert!(grid.columns * grid.rows >= n);
        prop_assert_eq!(grid.columns, grid.rows);
        let k = grid.columns;
        prop_assert!((k - 1) * (k - 1) < n);
    }

    /// Scheduling never assigns two sources to one cell at the same time.
    #[test]
    fn schedule_never_overlaps_within_a_cell(
        raw in proptest::collection::vec((0u64..100, 1u64..50), 1..12),
        reuse in prop_oneof![Just(Reuse::None), Just(Reuse::ShowOldest), Just(Reuse::ShowNewest)],
        cells in 1usize..5,
    ) {
        let sources: Vec<(SourceId, Interval)> = raw
            .iter()
            .enumerate()
            .map(|(i, &(lo, len))| (SourceId(i as u64), Interval::new(lo, lo + len)))
            .collect();
        let schedule = schedule_sources(reuse, &sources, cells, &[]);

        for a in &schedule.entries {
            for b in &schedule.entries {
                if std::ptr::eq(a, b) || a.cell_index != b.cell_index {
                    continue;
                }
                prop_assert!(!a.interval.overlaps(&b.interval));
            }
        }
    }
}
