// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! Half-open interval arithmetic over session timestamps.
//!
//! Everything in here works on `[lo, hi)` intervals of u64 nanoseconds.
//! Trim lists are the central currency: sorted, disjoint lists of intervals
//! during which no source is live, computed per subsystem and intersected
//! into the global list that is finally collapsed out of the timeline.

/// Half-open interval `[lo, hi)` in session nanoseconds.
///
/// Invariant: `lo < hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Interval {
    pub lo: u64,
    pub hi: u64,
}

impl Interval {
    #[must_use]
    pub fn new(lo: u64, hi: u64) -> Self {
        debug_assert!(lo < hi, "empty interval [{lo}, {hi})");
        Self { lo, hi }
    }

    #[must_use]
    pub fn contains(&self, t: u64) -> bool {
        self.lo <= t && t < self.hi
    }

    #[must_use]
    pub fn duration(&self) -> u64 {
        self.hi - self.lo
    }

    /// Intersection with `bounds`, `None` when empty.
    #[must_use]
    pub fn clamp(&self, bounds: Interval) -> Option<Interval> {
        let lo = self.lo.max(bounds.lo);
        let hi = self.hi.min(bounds.hi);
        (lo < hi).then(|| Interval::new(lo, hi))
    }

    /// Shift the interval left by `d` nanoseconds. Requires `d <= lo`.
    #[must_use]
    pub fn shift(&self, d: u64) -> Interval {
        debug_assert!(d <= self.lo, "shift {d} beyond interval start {}", self.lo);
        Interval::new(self.lo - d, self.hi - d)
    }

    #[must_use]
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.lo < other.hi && other.lo < self.hi
    }
}

/// Result of computing the dead-air complement of a set of source intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapResult {
    pub trim_intervals: TrimIntervals,
    /// Largest `hi` over the input intervals, 0 when the input is empty.
    pub max_end_time: u64,
}

/// Compute the sub-intervals of `[0, max_hi)` during which none of the given
/// intervals is live.
///
/// The result is the raw trim list of one subsystem; a time is only trimmed
/// globally once every subsystem independently marked it (see
/// [`overlap_trim_intervals`]).
#[must_use]
pub fn overlap_intervals(intervals: &[Interval]) -> OverlapResult {
    let max_end_time = intervals.iter().map(|i| i.hi).max().unwrap_or(0);

    let mut sorted: Vec<Interval> = intervals.to_vec();
    sorted.sort();

    let mut trims = Vec::new();
    let mut now = 0;
    for interval in sorted {
        if now < interval.lo {
            trims.push(Interval::new(now, interval.lo));
            now = interval.hi;
        } else {
            now = now.max(interval.hi);
        }
    }

    OverlapResult {
        trim_intervals: TrimIntervals::from_sorted(trims),
        max_end_time,
    }
}

/// Intersect trim lists pairwise across all subsystems.
///
/// A time survives into the result only when every input list contains it.
/// An empty `lists` yields an empty result (nothing is trimmable).
#[must_use]
pub fn overlap_trim_intervals(lists: &[TrimIntervals]) -> TrimIntervals {
    let Some((first, rest)) = lists.split_first() else {
        return TrimIntervals::default();
    };
    rest.iter()
        .fold(first.clone(), |acc, list| acc.intersect(list))
}

/// Sorted, disjoint list of trim intervals. Adjacent entries are merged
/// during construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrimIntervals(Vec<Interval>);

impl TrimIntervals {
    /// Build from an already sorted list of non-overlapping intervals,
    /// merging entries that touch.
    #[must_use]
    pub fn from_sorted(intervals: Vec<Interval>) -> Self {
        let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
        for interval in intervals {
            match merged.last_mut() {
                Some(last) if last.hi == interval.lo => last.hi = interval.hi,
                _ => merged.push(interval),
            }
        }
        Self(merged)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Interval] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `true` when `t` falls inside a trim. `t == trim.hi` is not trimmed.
    #[must_use]
    pub fn contains(&self, t: u64) -> bool {
        self.0.iter().any(|i| i.contains(t))
    }

    /// Pairwise intersection with another list.
    #[must_use]
    pub fn intersect(&self, other: &TrimIntervals) -> TrimIntervals {
        let mut result = Vec::new();
        for a in &self.0 {
            for b in &other.0 {
                let lo = a.lo.max(b.lo);
                let hi = a.hi.min(b.hi);
                if lo < hi {
                    result.push(Interval::new(lo, hi));
                }
            }
        }
        result.sort();
        Self::from_sorted(result)
    }

    /// Keep only a trim starting at the session origin, dropping all later
    /// entries. Used when trimming is disabled: the output still begins at
    /// the first moment any source is live.
    #[must_use]
    pub fn initial_only(&self) -> TrimIntervals {
        match self.0.first() {
            Some(first) if first.lo == 0 => Self(vec![*first]),
            _ => Self::default(),
        }
    }

    /// Total trimmed duration lying before `t` (entries overlapping `t` are
    /// clipped at `t`).
    #[must_use]
    pub fn trimmed_before(&self, t: u64) -> u64 {
        self.0
            .iter()
            .filter_map(|i| i.clamp(Interval { lo: 0, hi: t }))
            .map(|i| i.duration())
            .sum()
    }

    /// Map a session timestamp onto the trimmed timeline by removing all
    /// trimmed time before and within it.
    #[must_use]
    pub fn subtract_from_instant(&self, t: u64) -> u64 {
        t - self.trimmed_before(t)
    }

    /// Map an interval onto the trimmed timeline.
    ///
    /// Both endpoints are shifted left by the trimmed duration lying before
    /// them, so a trim falling inside the interval shortens it.
    #[must_use]
    pub fn subtract_from_interval(&self, interval: Interval) -> Interval {
        Interval::new(
            self.subtract_from_instant(interval.lo),
            self.subtract_from_instant(interval.hi),
        )
    }
}
