//! Period-bucketed decay series for gauge-weight accounting.
//!
//! Unlike [`DecayCurve`](crate::DecayCurve), this keeps one materialized
//! point per week so historical weights stay readable after the fact.
//! Mutation (votes) only ever touches the leading edge; past buckets are
//! immutable once written.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use tideway_core::constants::{next_period, MAX_CURVE_ITERATIONS, WEEK};
use tideway_core::types::{Amount, Period, Point, Timestamp};

/// A weekly series of decay points plus scheduled slope changes.
///
/// The `cursor` is the most recent materialized period. Advancing fills
/// every bucket from the cursor up to the period following `now` (votes
/// take effect one period ahead, so the leading edge always sits one
/// week into the future). Reads past the cursor are answered by a
/// read-only projection, so a series left un-advanced still reports
/// correct values — laziness costs compute, never correctness.
#[derive(
    Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct WeightSeries {
    points: BTreeMap<Period, Point>,
    changes: BTreeMap<Period, Amount>,
    cursor: Period,
}

impl WeightSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent materialized period. Zero when nothing has been
    /// recorded yet.
    pub fn cursor(&self) -> Period {
        self.cursor
    }

    /// Scheduled slope delta at `period`. Zero if none.
    pub fn scheduled_change_at(&self, period: Period) -> Amount {
        *self.changes.get(&period).unwrap_or(&0)
    }

    /// Add `delta` to the slope change scheduled at `period`.
    pub fn schedule_change(&mut self, period: Period, delta: Amount) {
        debug_assert_eq!(period % WEEK, 0, "slope changes are period-keyed");
        if delta == 0 {
            return;
        }
        *self.changes.entry(period).or_insert(0) += delta;
    }

    /// Remove `delta` from the slope change scheduled at `period`.
    pub fn unschedule_change(&mut self, period: Period, delta: Amount) {
        if let Some(existing) = self.changes.get_mut(&period) {
            *existing = existing.saturating_sub(delta);
            if *existing == 0 {
                self.changes.remove(&period);
            }
        }
    }

    /// Materialize buckets up to `next_period(now)` and return the point
    /// at the leading edge. Idempotent once caught up.
    pub fn advance(&mut self, now: Timestamp) -> Point {
        let target = next_period(now);
        if self.cursor == 0 {
            self.cursor = target;
            let pt = Point::zero(target);
            self.points.insert(target, pt);
            return pt;
        }
        if target <= self.cursor {
            return self.points[&self.cursor];
        }
        let mut pt = self.points[&self.cursor];
        let mut walked = 0usize;
        while self.cursor < target && walked < MAX_CURVE_ITERATIONS {
            self.cursor += WEEK;
            pt = Self::step(pt, self.cursor, self.scheduled_change_at(self.cursor));
            self.points.insert(self.cursor, pt);
            walked += 1;
        }
        trace!(periods = walked, cursor = self.cursor, "advanced weight series");
        pt
    }

    /// One weekly decay step into `period`.
    fn step(mut pt: Point, period: Period, d_slope: Amount) -> Point {
        let d_bias = pt.slope.saturating_mul(WEEK as u128);
        if pt.bias > d_bias {
            pt.bias -= d_bias;
            pt.slope = pt.slope.saturating_sub(d_slope);
        } else {
            pt.bias = 0;
            pt.slope = 0;
        }
        pt.ts = period;
        pt
    }

    /// The point at `period`.
    ///
    /// Materialized buckets are read directly; periods past the cursor
    /// are projected read-only. Periods before the first recorded bucket
    /// are zero.
    pub fn point_at(&self, period: Period) -> Point {
        if self.cursor == 0 {
            return Point::zero(period);
        }
        if period <= self.cursor {
            return self
                .points
                .get(&period)
                .copied()
                .unwrap_or_else(|| Point::zero(period));
        }
        let mut pt = self.points[&self.cursor];
        let mut at = self.cursor;
        let mut walked = 0usize;
        while at < period && walked < MAX_CURVE_ITERATIONS {
            at += WEEK;
            pt = Self::step(pt, at, self.scheduled_change_at(at));
            walked += 1;
        }
        pt
    }

    /// Bias at `period` (the series' decayed value).
    pub fn bias_at(&self, period: Period) -> Amount {
        self.point_at(period).bias
    }

    /// Add a vote's contribution to the bucket at `period`.
    ///
    /// The series must already be advanced to `period` (votes land on
    /// the leading edge).
    pub fn add_at(&mut self, period: Period, bias: Amount, slope: Amount) {
        debug_assert!(period <= self.cursor, "vote applied past the leading edge");
        let pt = self
            .points
            .entry(period)
            .or_insert_with(|| Point::zero(period));
        pt.bias = pt.bias.saturating_add(bias);
        pt.slope = pt.slope.saturating_add(slope);
    }

    /// Remove a previous vote's remaining contribution from the bucket
    /// at `period`, floored at zero.
    pub fn sub_at(&mut self, period: Period, bias: Amount, slope: Amount) {
        if let Some(pt) = self.points.get_mut(&period) {
            pt.bias = pt.bias.saturating_sub(bias);
            pt.slope = pt.slope.saturating_sub(slope);
        }
    }
}
