//! The vote controller: per-account vote allocation across gauges and
//! lazy weight-series maintenance.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use tideway_core::constants::{
    next_period, period_of, MAX_BPS, MAX_VOTE_BATCH, UNIT, VOTE_COOLDOWN,
};
use tideway_core::error::VoteError;
use tideway_core::math::mul_div;
use tideway_core::traits::{GaugeWeightSource, VotingPowerOracle};
use tideway_core::types::{AccountId, Amount, BoardId, Period, Point, Timestamp, VotedSlope};
use tideway_curve::WeightSeries;

use crate::registry::{Board, GaugeRegistry};

/// The fully validated effect of one vote, computed before any state is
/// touched so a batch can reject as a whole.
struct VotePlan {
    gauge: AccountId,
    landing: Period,
    old: VotedSlope,
    new: VotedSlope,
    new_bias: Amount,
}

/// Gauge-weight vote accounting.
///
/// Each vote converts a slice of the caller's oracle slope into a
/// decaying contribution on one gauge's weekly series and the global
/// total, taking effect from the next period. Re-votes and removals
/// subtract the previous contribution first, so independent voters'
/// effects stay additive and order-insensitive.
pub struct VoteController {
    admin: AccountId,
    oracle: Arc<dyn VotingPowerOracle>,
    registry: GaugeRegistry,
    gauge_series: HashMap<AccountId, WeightSeries>,
    total_series: WeightSeries,
    user_slopes: HashMap<(AccountId, AccountId), VotedSlope>,
    user_power: HashMap<AccountId, u64>,
    last_vote: HashMap<(AccountId, AccountId), Timestamp>,
}

impl VoteController {
    pub fn new(admin: AccountId, oracle: Arc<dyn VotingPowerOracle>) -> Self {
        Self {
            admin,
            oracle,
            registry: GaugeRegistry::new(),
            gauge_series: HashMap::new(),
            total_series: WeightSeries::new(),
            user_slopes: HashMap::new(),
            user_power: HashMap::new(),
            last_vote: HashMap::new(),
        }
    }

    fn require_admin(&self, caller: &AccountId) -> Result<(), VoteError> {
        if *caller != self.admin {
            return Err(VoteError::PermissionDenied);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Registry (admin surface)
    // ------------------------------------------------------------------

    pub fn add_board(
        &mut self,
        caller: &AccountId,
        board: AccountId,
        distributor: AccountId,
    ) -> Result<BoardId, VoteError> {
        self.require_admin(caller)?;
        let id = self.registry.add_board(board, distributor)?;
        info!(%board, %distributor, id, "board listed");
        Ok(id)
    }

    pub fn update_distributor(
        &mut self,
        caller: &AccountId,
        board: BoardId,
        distributor: AccountId,
    ) -> Result<(), VoteError> {
        self.require_admin(caller)?;
        self.registry.update_distributor(board, distributor)
    }

    pub fn set_default_cap(&mut self, caller: &AccountId, cap: Amount) -> Result<(), VoteError> {
        self.require_admin(caller)?;
        self.registry.set_default_cap(cap)
    }

    pub fn add_gauge(
        &mut self,
        caller: &AccountId,
        gauge: AccountId,
        board: BoardId,
        cap: Option<Amount>,
    ) -> Result<(), VoteError> {
        self.require_admin(caller)?;
        self.registry.add_gauge(gauge, board, cap)?;
        self.gauge_series.insert(gauge, WeightSeries::new());
        info!(%gauge, board, "gauge listed");
        Ok(())
    }

    pub fn update_gauge_cap(
        &mut self,
        caller: &AccountId,
        gauge: AccountId,
        cap: Amount,
    ) -> Result<(), VoteError> {
        self.require_admin(caller)?;
        self.registry.update_gauge_cap(gauge, cap)
    }

    pub fn kill_gauge(&mut self, caller: &AccountId, gauge: AccountId) -> Result<(), VoteError> {
        self.require_admin(caller)?;
        self.registry.kill_gauge(gauge)?;
        info!(%gauge, "gauge killed");
        Ok(())
    }

    pub fn unkill_gauge(&mut self, caller: &AccountId, gauge: AccountId) -> Result<(), VoteError> {
        self.require_admin(caller)?;
        self.registry.unkill_gauge(gauge)
    }

    // ------------------------------------------------------------------
    // Voting
    // ------------------------------------------------------------------

    /// Allocate `power_bps` of the caller's voting power to `gauge`,
    /// replacing any previous allocation on that gauge. Zero removes the
    /// allocation outright.
    pub fn vote_for_gauge(
        &mut self,
        voter: AccountId,
        gauge: AccountId,
        power_bps: u64,
        now: Timestamp,
    ) -> Result<(), VoteError> {
        self.vote_for_many_gauges(voter, &[gauge], &[power_bps], now)
    }

    /// Batched voting: all entries validate against the final power
    /// total before anything is applied, so the call is atomic.
    pub fn vote_for_many_gauges(
        &mut self,
        voter: AccountId,
        gauges: &[AccountId],
        powers: &[u64],
        now: Timestamp,
    ) -> Result<(), VoteError> {
        if voter.is_zero() {
            return Err(VoteError::ZeroAccount);
        }
        if gauges.len() != powers.len() {
            return Err(VoteError::ArraySizeMismatch {
                gauges: gauges.len(),
                powers: powers.len(),
            });
        }
        if gauges.len() > MAX_VOTE_BATCH {
            return Err(VoteError::BatchTooLarge(gauges.len()));
        }

        let mut used = self.user_power.get(&voter).copied().unwrap_or(0);
        let mut plans: Vec<VotePlan> = Vec::with_capacity(gauges.len());
        for (gauge, power) in gauges.iter().zip(powers.iter()) {
            // A gauge repeated within one batch would trip the cooldown
            // under serial application; reject it the same way here.
            if plans.iter().any(|p| p.gauge == *gauge) {
                return Err(VoteError::CooldownActive(now + VOTE_COOLDOWN));
            }
            let (plan, new_used) = self.plan_vote(&voter, *gauge, *power, now, used)?;
            used = new_used;
            plans.push(plan);
        }
        for plan in plans {
            self.apply_vote(&voter, plan, now);
        }
        self.user_power.insert(voter, used);
        Ok(())
    }

    fn plan_vote(
        &self,
        voter: &AccountId,
        gauge: AccountId,
        power_bps: u64,
        now: Timestamp,
        used_power: u64,
    ) -> Result<(VotePlan, u64), VoteError> {
        if !self.registry.is_listed(&gauge) {
            return Err(VoteError::NotListed(gauge));
        }
        if power_bps > MAX_BPS {
            return Err(VoteError::PowerOutOfRange(power_bps));
        }
        if power_bps > 0 && self.registry.is_killed(&gauge) {
            return Err(VoteError::Killed(gauge));
        }
        if let Some(last) = self.last_vote.get(&(*voter, gauge)) {
            if last + VOTE_COOLDOWN > now {
                return Err(VoteError::CooldownActive(last + VOTE_COOLDOWN));
            }
        }

        let old = self
            .user_slopes
            .get(&(*voter, gauge))
            .copied()
            .unwrap_or_default();
        // Both terms are bounded by MAX_BPS, so plain u64 math is safe.
        let new_used = used_power.saturating_sub(old.power_bps) + power_bps;
        if new_used > MAX_BPS {
            return Err(VoteError::PowerExceeded { used: used_power, requested: power_bps });
        }

        let landing = next_period(now);
        let new = if power_bps > 0 {
            let point = self
                .oracle
                .user_point_at(voter, period_of(now))
                .ok_or(VoteError::NoVotingPower)?;
            let lock_end = self.oracle.lock_end(voter);
            if lock_end <= landing {
                return Err(VoteError::LockExpired(lock_end));
            }
            let slope = mul_div(point.slope, power_bps as u128, MAX_BPS as u128)?;
            VotedSlope { slope, power_bps, end: lock_end, caller: *voter }
        } else {
            VotedSlope { slope: 0, power_bps: 0, end: old.end, caller: *voter }
        };
        let new_bias = new.slope.saturating_mul((new.end.saturating_sub(landing)) as u128);

        Ok((VotePlan { gauge, landing, old, new, new_bias }, new_used))
    }

    fn apply_vote(&mut self, voter: &AccountId, plan: VotePlan, now: Timestamp) {
        let series = self
            .gauge_series
            .get_mut(&plan.gauge)
            .expect("listed gauge has a series");
        series.advance(now);
        self.total_series.advance(now);

        // Undo the previous allocation's remaining contribution before
        // applying the new one.
        if plan.old.end > plan.landing && plan.old.slope > 0 {
            let old_bias = plan.old.slope * (plan.old.end - plan.landing) as u128;
            series.sub_at(plan.landing, old_bias, plan.old.slope);
            series.unschedule_change(plan.old.end, plan.old.slope);
            self.total_series.sub_at(plan.landing, old_bias, plan.old.slope);
            self.total_series.unschedule_change(plan.old.end, plan.old.slope);
        }

        if plan.new.power_bps > 0 {
            series.add_at(plan.landing, plan.new_bias, plan.new.slope);
            series.schedule_change(plan.new.end, plan.new.slope);
            self.total_series.add_at(plan.landing, plan.new_bias, plan.new.slope);
            self.total_series.schedule_change(plan.new.end, plan.new.slope);
        }

        self.user_slopes.insert((*voter, plan.gauge), plan.new);
        self.last_vote.insert((*voter, plan.gauge), now);
        debug!(
            voter = %voter,
            gauge = %plan.gauge,
            power_bps = plan.new.power_bps,
            bias = plan.new_bias,
            landing = plan.landing,
            "vote recorded"
        );
    }

    // ------------------------------------------------------------------
    // Weight maintenance and reads
    // ------------------------------------------------------------------

    /// Advance a gauge's weight series to the present. Any caller may
    /// invoke this to unstick a stale series; it is a no-op once caught
    /// up, and reads stay correct either way.
    pub fn update_gauge_weight(
        &mut self,
        gauge: &AccountId,
        now: Timestamp,
    ) -> Result<Point, VoteError> {
        let series = self
            .gauge_series
            .get_mut(gauge)
            .ok_or(VoteError::NotListed(*gauge))?;
        Ok(series.advance(now))
    }

    /// Advance the global total series to the present.
    pub fn update_total_weight(&mut self, now: Timestamp) -> Point {
        self.total_series.advance(now)
    }

    /// Gauge weight point at `period` (projected if not materialized).
    pub fn gauge_point_at(&self, gauge: &AccountId, period: Period) -> Point {
        self.gauge_series
            .get(gauge)
            .map(|s| s.point_at(period))
            .unwrap_or_else(|| Point::zero(period))
    }

    /// Total weight point at `period` (projected if not materialized).
    pub fn total_point_at(&self, period: Period) -> Point {
        self.total_series.point_at(period)
    }

    /// `gauge / total` at `period`, 18-decimal scaled. Zero for
    /// unlisted or killed gauges, and when the total is zero.
    pub fn gauge_relative_weight_at(&self, gauge: &AccountId, period: Period) -> Amount {
        if !self.registry.is_listed(gauge) || self.registry.is_killed(gauge) {
            return 0;
        }
        let total = self.total_series.point_at(period).bias;
        if total == 0 {
            return 0;
        }
        let bias = self.gauge_point_at(gauge, period).bias;
        mul_div(bias, UNIT, total).unwrap_or(0)
    }

    /// Advance both series, then read the gauge's relative weight for
    /// the current period.
    pub fn gauge_relative_weight_write(
        &mut self,
        gauge: &AccountId,
        now: Timestamp,
    ) -> Result<Amount, VoteError> {
        self.update_gauge_weight(gauge, now)?;
        self.update_total_weight(now);
        Ok(self.gauge_relative_weight_at(gauge, period_of(now)))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn registry(&self) -> &GaugeRegistry {
        &self.registry
    }

    pub fn board(&self, id: BoardId) -> Option<&Board> {
        self.registry.board(id)
    }

    /// Total basis points the account has allocated across gauges.
    pub fn vote_user_power(&self, voter: &AccountId) -> u64 {
        self.user_power.get(voter).copied().unwrap_or(0)
    }

    /// The account's live allocation on one gauge.
    pub fn vote_user_slope(&self, voter: &AccountId, gauge: &AccountId) -> VotedSlope {
        self.user_slopes
            .get(&(*voter, *gauge))
            .copied()
            .unwrap_or_default()
    }

    /// When the account last voted on the gauge.
    pub fn last_user_vote(&self, voter: &AccountId, gauge: &AccountId) -> Timestamp {
        self.last_vote.get(&(*voter, *gauge)).copied().unwrap_or(0)
    }

    /// Scheduled slope change on a gauge's series at `period`.
    pub fn gauge_slope_change_at(&self, gauge: &AccountId, period: Period) -> Amount {
        self.gauge_series
            .get(gauge)
            .map(|s| s.scheduled_change_at(period))
            .unwrap_or(0)
    }

    /// Scheduled slope change on the total series at `period`.
    pub fn total_slope_change_at(&self, period: Period) -> Amount {
        self.total_series.scheduled_change_at(period)
    }
}

impl GaugeWeightSource for VoteController {
    fn is_listed(&self, gauge: &AccountId) -> bool {
        self.registry.is_listed(gauge)
    }

    fn relative_weight_at(&self, gauge: &AccountId, period: Period) -> Amount {
        self.gauge_relative_weight_at(gauge, period)
    }

    fn gauge_cap(&self, gauge: &AccountId) -> Amount {
        self.registry.cap_of(gauge)
    }
}
