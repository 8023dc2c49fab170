//! Trait interfaces between Tideway components.
//!
//! These traits define the contracts between crates and toward external
//! collaborators:
//! - [`VotingPowerOracle`] — decaying lock balances (external, consumed only)
//! - [`QuestBoard`] — quest registry (external, consumed only)
//! - [`BudgetSource`] — weekly budget supply (tideway-allocator ships the
//!   production `WeeklyBudget`)
//! - [`GaugeWeightSource`] — read-only gauge weights (tideway-votes implements)
//! - [`AdjustedBalanceSource`] — boost-adjusted balances (tideway-boost implements)
//! - [`LootSink`] — loot creation (tideway-vault implements)
//! - [`UndistributedSink`] — pending-budget returns (tideway-allocator implements)

use crate::error::VaultError;
use crate::types::{
    AccountId, Amount, BlockNumber, Budget, LootId, OraclePoint, Period, QuestId, Timestamp,
};

/// Read-only view of the external voting-power oracle.
///
/// The oracle owns the decaying lock balances; Tideway never mutates it.
pub trait VotingPowerOracle: Send + Sync {
    /// Current decaying lock balance of an account.
    fn balance_of(&self, account: &AccountId, now: Timestamp) -> Amount;

    /// The account's voting-power point in force at `ts`. Returns `None`
    /// if the account never held a lock covering `ts`.
    fn user_point_at(&self, account: &AccountId, ts: Timestamp) -> Option<OraclePoint>;

    /// Total locked power at a pinned block height.
    fn total_locked_at(&self, block: BlockNumber) -> Amount;

    /// When the account's lock expires. Zero if no lock.
    fn lock_end(&self, account: &AccountId) -> Timestamp;
}

/// Read-only view of the external quest registry.
pub trait QuestBoard: Send + Sync {
    /// The gauge a quest rewards. Returns `None` for unknown quests.
    fn quest_gauge(&self, quest: QuestId) -> Option<AccountId>;

    /// All quests active on a gauge during a period.
    fn quests_for_gauge(&self, gauge: &AccountId, period: Period) -> Vec<QuestId>;
}

/// Supplies the periodic token budget.
///
/// Pulled once per period by the allocator's period state machine.
pub trait BudgetSource: Send + Sync {
    /// Release the budget for `period`. Must return zero amounts on any
    /// repeated pull for the same (or an earlier) period.
    fn pull_budget(&mut self, period: Period) -> Budget;
}

/// Read-only gauge weight queries, implemented by the vote controller.
///
/// Historical reads must be correct regardless of how recently the
/// underlying curves were advanced; laziness is a compute-cost knob,
/// never a correctness one.
pub trait GaugeWeightSource: Send + Sync {
    /// Whether the gauge is registered (killed gauges still count as
    /// listed).
    fn is_listed(&self, gauge: &AccountId) -> bool;

    /// Gauge weight relative to the total at `period`, 18-decimal
    /// scaled. Zero for unlisted or killed gauges and when the total
    /// weight is zero.
    fn relative_weight_at(&self, gauge: &AccountId, period: Period) -> Amount;

    /// The cap applied to this gauge's relative weight.
    fn gauge_cap(&self, gauge: &AccountId) -> Amount;

    /// Relative weight clamped to the gauge's cap.
    ///
    /// Default implementation combines the two queries above.
    fn capped_relative_weight_at(&self, gauge: &AccountId, period: Period) -> Amount {
        self.relative_weight_at(gauge, period).min(self.gauge_cap(gauge))
    }
}

/// Boost-adjusted balance queries, implemented by the boost ledger.
pub trait AdjustedBalanceSource: Send + Sync {
    /// `raw_power - delegated + received` for the account, evaluated at
    /// the start of `period`.
    fn adjusted_balance_at(&self, account: &AccountId, period: Period) -> Amount;
}

/// Loot creation seam, implemented by the vesting vault.
///
/// `caller` must match the allocator account bound to the vault.
pub trait LootSink: Send + Sync {
    fn create_loot(
        &mut self,
        caller: &AccountId,
        user: &AccountId,
        start_ts: Timestamp,
        pal: Amount,
        extra: Amount,
    ) -> Result<LootId, VaultError>;
}

/// Receives budget that was computed but not distributed — slashed
/// vesting amounts and sub-maximum multiplier shortfalls. Implemented by
/// the allocator's pending-budget accumulator.
pub trait UndistributedSink: Send + Sync {
    fn notify_undistributed(&mut self, pal: Amount);
}
