//! Second-precision decay curve with weekly scheduled slope changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use tideway_core::constants::{period_of, MAX_CURVE_ITERATIONS, WEEK};
use tideway_core::types::{Amount, Period, Point, Timestamp};

/// A live decaying value.
///
/// The point holds the bias/slope in force at `point.ts`; expiries of the
/// positions feeding the curve are pre-scheduled as negative slope deltas
/// in weekly buckets. [`advance`](DecayCurve::advance) walks those
/// buckets forward lazily — each bucket is consumed exactly once, work is
/// bounded per call, and calling "too often" is a no-op.
#[derive(
    Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct DecayCurve {
    point: Point,
    slope_changes: BTreeMap<Period, Amount>,
}

impl DecayCurve {
    /// An empty curve pinned to `ts`.
    pub fn new(ts: Timestamp) -> Self {
        Self {
            point: Point::zero(ts),
            slope_changes: BTreeMap::new(),
        }
    }

    /// Rebuild a curve from a point and its scheduled changes (used by
    /// ledger migration; the parts are installed verbatim).
    pub fn from_parts(point: Point, slope_changes: BTreeMap<Period, Amount>) -> Self {
        Self { point, slope_changes }
    }

    /// The current (possibly stale) point.
    pub fn point(&self) -> Point {
        self.point
    }

    /// Scheduled slope delta at `period`. Zero if none.
    pub fn slope_change_at(&self, period: Period) -> Amount {
        *self.slope_changes.get(&period).unwrap_or(&0)
    }

    /// All non-zero scheduled slope changes.
    pub fn slope_changes(&self) -> &BTreeMap<Period, Amount> {
        &self.slope_changes
    }

    /// Add `delta` to the slope change scheduled at `period`.
    ///
    /// Deltas from distinct positions sharing an expiry accumulate.
    pub fn schedule_change(&mut self, period: Period, delta: Amount) {
        debug_assert_eq!(period % WEEK, 0, "slope changes are period-keyed");
        if delta == 0 {
            return;
        }
        *self.slope_changes.entry(period).or_insert(0) += delta;
    }

    /// Remove `delta` from the slope change scheduled at `period`.
    ///
    /// Used when a position is replaced before its expiry: the old
    /// delta is subtracted before the replacement schedules its own.
    pub fn unschedule_change(&mut self, period: Period, delta: Amount) {
        if let Some(existing) = self.slope_changes.get_mut(&period) {
            *existing = existing.saturating_sub(delta);
            if *existing == 0 {
                self.slope_changes.remove(&period);
            }
        }
    }

    /// Increase the live point by a freshly issued position.
    ///
    /// The caller must have advanced the curve to `now` first so the new
    /// bias composes with fully decayed prior state.
    pub fn add(&mut self, bias: Amount, slope: Amount) {
        self.point.bias = self.point.bias.saturating_add(bias);
        self.point.slope = self.point.slope.saturating_add(slope);
    }

    /// Remove a position's remaining contribution from the live point.
    pub fn sub(&mut self, bias: Amount, slope: Amount) {
        self.point.bias = self.point.bias.saturating_sub(bias);
        self.point.slope = self.point.slope.saturating_sub(slope);
    }

    /// Walk the curve forward to `now`, consuming scheduled slope
    /// changes one weekly bucket at a time.
    ///
    /// Within one step the bias first decays by `slope * elapsed` using
    /// the slope in force during the elapsed stretch, then the change
    /// scheduled at the newly reached period is taken off the slope.
    /// Walks at most [`MAX_CURVE_ITERATIONS`] buckets; a curve left
    /// behind longer catches up across repeated calls.
    pub fn advance(&mut self, now: Timestamp) -> Point {
        if now <= self.point.ts {
            return self.point;
        }
        let start = self.point.ts;
        let mut ts = period_of(self.point.ts);
        for _ in 0..MAX_CURVE_ITERATIONS {
            ts += WEEK;
            let (target, d_slope) = if ts > now {
                (now, 0)
            } else {
                (ts, self.slope_change_at(ts))
            };
            let elapsed = (target - self.point.ts) as u128;
            self.point.bias = self
                .point
                .bias
                .saturating_sub(self.point.slope.saturating_mul(elapsed));
            // d_slope is zero when the step clamps mid-week, so the
            // subtraction is safe to apply before the break; a bucket
            // landed on exactly is consumed now, not re-read later.
            self.point.slope = self.point.slope.saturating_sub(d_slope);
            self.point.ts = target;
            if target == now {
                break;
            }
        }
        trace!(from = start, to = self.point.ts, "advanced decay curve");
        self.point
    }

    /// Project the curve's value at `at` without mutating it.
    ///
    /// For `at` at or before the live point, reads the point directly.
    pub fn value_at(&self, at: Timestamp) -> Amount {
        self.project_from(self.point, at)
    }

    /// Project an arbitrary historical point forward to `at` through
    /// this curve's scheduled changes. Read-only counterpart of
    /// [`advance`](Self::advance), used for checkpoint-based reads.
    pub fn project_from(&self, from: Point, at: Timestamp) -> Amount {
        if at <= from.ts {
            return from.value_at(at);
        }
        let mut pt = from;
        let mut ts = period_of(pt.ts);
        for _ in 0..MAX_CURVE_ITERATIONS {
            ts += WEEK;
            let (target, d_slope) = if ts > at {
                (at, 0)
            } else {
                (ts, self.slope_change_at(ts))
            };
            let elapsed = (target - pt.ts) as u128;
            pt.bias = pt.bias.saturating_sub(pt.slope.saturating_mul(elapsed));
            pt.slope = pt.slope.saturating_sub(d_slope);
            pt.ts = target;
            if target == at {
                break;
            }
        }
        pt.bias
    }
}
