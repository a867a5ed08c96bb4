// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

use proptest::prelude::*;

use crate::{
    interval::{overlap_intervals, overlap_trim_intervals, Interval, TrimIntervals},
    tests::testing,
};

fn iv(lo: u64, hi: u64) -> Interval {
    Interval::new(lo, hi)
}

#[test]
fn complement_of_disjoint_sources() {
    testing::init();

    let result = overlap_intervals(&[iv(0, 5), iv(10, 15)]);
    assert_eq!(result.trim_intervals.as_slice(), &[iv(5, 10)]);
    assert_eq!(result.max_end_time, 15);
}

#[test]
fn complement_with_late_start() {
    let result = overlap_intervals(&[iv(3, 5)]);
    assert_eq!(result.trim_intervals.as_slice(), &[iv(0, 3)]);
    assert_eq!(result.max_end_time, 5);
}

#[test]
fn complement_of_overlapping_sources_is_empty() {
    let result = overlap_intervals(&[iv(0, 10), iv(5, 15)]);
    assert!(result.trim_intervals.is_empty());
    assert_eq!(result.max_end_time, 15);
}

#[test]
fn complement_of_nothing() {
    let result = overlap_intervals(&[]);
    assert!(result.trim_intervals.is_empty());
    assert_eq!(result.max_end_time, 0);
}

#[test]
fn adjacent_trims_merge() {
    let trims = TrimIntervals::from_sorted(vec![iv(0, 5), iv(5, 10), iv(12, 14)]);
    assert_eq!(trims.as_slice(), &[iv(0, 10), iv(12, 14)]);
}

#[test]
fn trim_upper_bound_is_exclusive() {
    let trims = TrimIntervals::from_sorted(vec![iv(5, 10)]);
    assert!(trims.contains(5));
    assert!(trims.contains(9));
    assert!(!trims.contains(10));
}

#[test]
fn intersection_requires_every_list() {
    let a = TrimIntervals::from_sorted(vec![iv(0, 10), iv(20, 30)]);
    let b = TrimIntervals::from_sorted(vec![iv(5, 25)]);
    let merged = overlap_trim_intervals(&[a, b]);
    assert_eq!(merged.as_slice(), &[iv(5, 10), iv(20, 25)]);
}

#[test]
fn intersection_with_empty_list_is_empty() {
    let a = TrimIntervals::from_sorted(vec![iv(0, 10)]);
    let merged = overlap_trim_intervals(&[a, TrimIntervals::default()]);
    assert!(merged.is_empty());
}

#[test]
fn initial_only_keeps_the_prefix_trim() {
    let trims = TrimIntervals::from_sorted(vec![iv(0, 4), iv(8, 9)]);
    assert_eq!(trims.initial_only().as_slice(), &[iv(0, 4)]);

    let no_prefix = TrimIntervals::from_sorted(vec![iv(2, 4)]);
    assert!(no_prefix.initial_only().is_empty());
}

#[test]
fn subtract_shifts_by_preceding_trims() {
    let trims = TrimIntervals::from_sorted(vec![iv(5, 10), iv(20, 22)]);
    assert_eq!(trims.subtract_from_instant(4), 4);
    assert_eq!(trims.subtract_from_instant(10), 5);
    assert_eq!(trims.subtract_from_instant(25), 18);
    assert_eq!(trims.subtract_from_interval(iv(10, 20)), iv(5, 15));
    assert_eq!(trims.subtract_from_interval(iv(22, 30)), iv(15, 23));
}

#[test]
fn clamp_and_shift() {
    assert_eq!(Interval::clamp(&iv(2, 8), iv(4, 20)), Some(iv(4, 8)));
    assert_eq!(Interval::clamp(&iv(2, 8), iv(8, 20)), None);
    assert_eq!(iv(10, 20).shift(4), iv(6, 16));
}

proptest! {
    /// `shift(shift(i, d), -d) == i` whenever `d <= i.lo`.
    #[test]
    fn shift_round_trips(lo in 0u64..1_000_000, len in 1u64..1_000_000, d in 0u64..1_000_000) {
        let d = d.min(lo);
        let interval = iv(lo, lo + len);
        let shifted = interval.shift(d);
        prop_assert_eq!(iv(shifted.lo + d, shifted.hi + d), interval);
    }

    /// The complement never overlaps a source interval, and every gap it
    /// reports really contains no source.
    #[test]
    fn complement_is_sound(raw in proptest::collection::vec((0u64..1000, 1u64..100), 0..8)) {
        let intervals: Vec<Interval> = raw.iter().map(|&(lo, len)| iv(lo, lo + len)).collect();
        let result = overlap_intervals(&intervals);

        for trim in result.trim_intervals.as_slice() {
            prop_assert!(trim.hi <= result.max_end_time);
            for interval in &intervals {
                prop_assert!(!trim.overlaps(interval));
            }
        }
    }

    /// Applying the trim list to the sources it was computed from leaves no
    /// further dead air: recomputing on the shifted intervals is a no-op.
    #[test]
    fn trimming_is_idempotent(raw in proptest::collection::vec((0u64..1000, 1u64..100), 1..8)) {
        let intervals: Vec<Interval> = raw.iter().map(|&(lo, len)| iv(lo, lo + len)).collect();
        let trims = overlap_intervals(&intervals).trim_intervals;

        let shifted: Vec<Interval> = intervals
            .iter()
            .map(|i| trims.subtract_from_interval(*i))
            .collect();
        let again = overlap_intervals(&shifted);
        prop_assert!(again.trim_intervals.is_empty());

        let unshifted: Vec<Interval> = shifted
            .iter()
            .map(|i| again.trim_intervals.subtract_from_interval(*i))
            .collect();
        prop_assert_eq!(unshifted, shifted);
    }
}
