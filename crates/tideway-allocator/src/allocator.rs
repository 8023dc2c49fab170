//! The reward allocator: a one-period-per-step state machine over the
//! weekly budget, quest finalization ingestion, and loot sizing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use tideway_core::constants::{
    next_period, period_of, BASE_MULTIPLIER, MAX_MULTIPLIER, UNIT, WEEK,
};
use tideway_core::error::AllocError;
use tideway_core::math::mul_div;
use tideway_core::traits::{
    AdjustedBalanceSource, BudgetSource, GaugeWeightSource, LootSink, QuestBoard,
    UndistributedSink, VotingPowerOracle,
};
use tideway_core::types::{
    AccountId, Amount, BlockNumber, Budget, LootId, Period, QuestAllocation, QuestId, Timestamp,
};

/// Key for everything recorded per (distributor, quest, period).
type QuestKey = (AccountId, QuestId, Period);

/// Outcome of a successful loot creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LootReceipt {
    pub id: LootId,
    pub pal_amount: Amount,
    pub extra_amount: Amount,
    /// The boost multiplier applied, 18-decimal scaled.
    pub multiplier: Amount,
}

/// Budget and reward-rate allocation across gauges and quests.
///
/// Reads gauge weights and adjusted balances through narrow read-only
/// capabilities; the vote controller and boost ledger are never mutated
/// from here. All period bookkeeping advances exactly one week per
/// [`update_period`](Self::update_period) call.
pub struct RewardAllocator {
    admin: AccountId,
    /// Identity presented to the vault when creating loot.
    account: AccountId,
    oracle: Arc<dyn VotingPowerOracle>,

    next_budget_period: Period,
    pending: Budget,
    period_budget: HashMap<Period, Budget>,
    /// Uncapped budget handed out per period (over-cap slices included;
    /// they are re-routed to pending at allocation time).
    allocated: HashMap<Period, Budget>,
    gauge_budgets: HashMap<(AccountId, Period), Budget>,
    gauge_allocated: HashSet<(AccountId, Period)>,
    block_checkpoints: HashMap<Period, BlockNumber>,

    distributors: Vec<AccountId>,
    allowed_distributors: HashSet<AccountId>,

    quest_allocations: HashMap<QuestKey, QuestAllocation>,
    /// Per-quest slice of the gauge budget, kept so an emergency fix can
    /// re-derive rates without consulting the board again.
    quest_budget_shares: HashMap<QuestKey, Budget>,
    total_quest_rewards: HashMap<QuestKey, Amount>,
    total_quest_set: HashSet<QuestKey>,
    user_quest_rewards: HashMap<(QuestKey, AccountId), Amount>,
    loot_created: HashSet<(QuestKey, AccountId)>,
}

impl RewardAllocator {
    /// `account` is the identity the vault knows this allocator by;
    /// `now` seeds the period state machine at the next boundary.
    pub fn new(
        admin: AccountId,
        account: AccountId,
        oracle: Arc<dyn VotingPowerOracle>,
        now: Timestamp,
    ) -> Self {
        Self {
            admin,
            account,
            oracle,
            next_budget_period: next_period(now),
            pending: Budget::ZERO,
            period_budget: HashMap::new(),
            allocated: HashMap::new(),
            gauge_budgets: HashMap::new(),
            gauge_allocated: HashSet::new(),
            block_checkpoints: HashMap::new(),
            distributors: Vec::new(),
            allowed_distributors: HashSet::new(),
            quest_allocations: HashMap::new(),
            quest_budget_shares: HashMap::new(),
            total_quest_rewards: HashMap::new(),
            total_quest_set: HashSet::new(),
            user_quest_rewards: HashMap::new(),
            loot_created: HashSet::new(),
        }
    }

    fn require_admin(&self, caller: &AccountId) -> Result<(), AllocError> {
        if *caller != self.admin {
            return Err(AllocError::PermissionDenied);
        }
        Ok(())
    }

    fn require_distributor(&self, caller: &AccountId) -> Result<(), AllocError> {
        if !self.allowed_distributors.contains(caller) {
            return Err(AllocError::UnknownDistributor(*caller));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Admin surface
    // ------------------------------------------------------------------

    pub fn add_distributor(
        &mut self,
        caller: &AccountId,
        distributor: AccountId,
    ) -> Result<(), AllocError> {
        self.require_admin(caller)?;
        if distributor.is_zero() {
            return Err(AllocError::ZeroAccount);
        }
        if !self.allowed_distributors.insert(distributor) {
            return Err(AllocError::DistributorAlreadyListed(distributor));
        }
        self.distributors.push(distributor);
        info!(%distributor, "distributor listed");
        Ok(())
    }

    /// Emergency override of a quest period's recorded total reward
    /// units after a distributor misreported. Re-derives the per-vote
    /// rates from the frozen budget share; loots already created against
    /// the old rates are untouched.
    pub fn fix_quest_period_total(
        &mut self,
        caller: &AccountId,
        distributor: AccountId,
        quest: QuestId,
        period: Period,
        new_total: Amount,
    ) -> Result<(), AllocError> {
        self.require_admin(caller)?;
        if new_total == 0 {
            return Err(AllocError::ZeroRewardUnits);
        }
        let key = (distributor, quest, period);
        if !self.total_quest_set.contains(&key) {
            return Err(AllocError::NotFinalized { quest, period });
        }
        let share = self
            .quest_budget_shares
            .get(&key)
            .copied()
            .unwrap_or_default();
        let allocation = Self::derive_rates(share, new_total)?;
        warn!(
            quest,
            period,
            old_total = self.total_quest_rewards.get(&key).copied().unwrap_or(0),
            new_total,
            "quest period total fixed by admin"
        );
        self.total_quest_rewards.insert(key, new_total);
        self.quest_allocations.insert(key, allocation);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Period state machine
    // ------------------------------------------------------------------

    /// Advance the budget period by exactly one week if due.
    ///
    /// Pulls the weekly budget, folds in the pending accumulator, rolls
    /// forward whatever the period two weeks back never allocated, and
    /// pins the block height whose total-locked snapshot governs later
    /// multiplier math. Returns `false` when not yet due.
    pub fn update_period(
        &mut self,
        now: Timestamp,
        block: BlockNumber,
        budget_source: &mut dyn BudgetSource,
    ) -> Result<bool, AllocError> {
        if now < self.next_budget_period {
            return Ok(false);
        }
        let period = self.next_budget_period;
        let mut budget = budget_source.pull_budget(period);
        budget = budget.saturating_add(std::mem::take(&mut self.pending));

        // Budget frozen two periods back that no gauge claimed rolls
        // forward rather than being burned.
        let past = period.saturating_sub(2 * WEEK);
        if let Some(past_budget) = self.period_budget.get(&past).copied() {
            let allocated = self.allocated.get(&past).copied().unwrap_or_default();
            let unallocated = past_budget.saturating_sub(allocated);
            if !unallocated.is_zero() {
                debug!(period = past, pal = unallocated.pal, "rolling forward unallocated budget");
                budget = budget.saturating_add(unallocated);
            }
        }

        self.period_budget.insert(period, budget);
        self.block_checkpoints.insert(period, block);
        self.next_budget_period = period + WEEK;
        info!(period, pal = budget.pal, extra = budget.extra, block, "budget period opened");
        Ok(true)
    }

    fn catch_up(
        &mut self,
        now: Timestamp,
        block: BlockNumber,
        budget_source: &mut dyn BudgetSource,
    ) -> Result<(), AllocError> {
        while self.update_period(now, block, budget_source)? {}
        Ok(())
    }

    // ------------------------------------------------------------------
    // Distributor ingestion
    // ------------------------------------------------------------------

    /// Called once by the distributor when a quest period closes and its
    /// claim set is fixed. Freezes the gauge's capped budget slice for
    /// the period (first quest on the gauge does the freezing) and
    /// derives the quest's per-vote reward rates.
    #[allow(clippy::too_many_arguments)]
    pub fn on_quest_period_finalized(
        &mut self,
        distributor: &AccountId,
        quest: QuestId,
        period: Period,
        total_reward_units: Amount,
        now: Timestamp,
        block: BlockNumber,
        board: &dyn QuestBoard,
        weights: &dyn GaugeWeightSource,
        budget_source: &mut dyn BudgetSource,
    ) -> Result<(), AllocError> {
        self.require_distributor(distributor)?;
        if total_reward_units == 0 {
            return Err(AllocError::ZeroRewardUnits);
        }
        if period % WEEK != 0 {
            return Err(AllocError::PeriodNotAligned(period));
        }
        if period > period_of(now) {
            return Err(AllocError::PeriodNotClosed(period));
        }
        let key = (*distributor, quest, period);
        if self.total_quest_set.contains(&key) {
            return Err(AllocError::AlreadyFinalized { quest, period });
        }
        let gauge = board
            .quest_gauge(quest)
            .ok_or(AllocError::UnknownQuest(quest))?;
        if !weights.is_listed(&gauge) {
            return Err(AllocError::GaugeNotListed(gauge));
        }

        self.catch_up(now, block, budget_source)?;
        self.allocate_gauge_budget(&gauge, period, weights)?;

        let quest_count = board.quests_for_gauge(&gauge, period).len().max(1) as u128;
        let gauge_budget = self
            .gauge_budgets
            .get(&(gauge, period))
            .copied()
            .unwrap_or_default();
        let share = Budget::new(gauge_budget.pal / quest_count, gauge_budget.extra / quest_count);
        let allocation = Self::derive_rates(share, total_reward_units)?;

        self.quest_budget_shares.insert(key, share);
        self.quest_allocations.insert(key, allocation);
        self.total_quest_rewards.insert(key, total_reward_units);
        self.total_quest_set.insert(key);
        info!(
            quest,
            period,
            total_reward_units,
            pal_per_vote = allocation.pal_per_vote,
            "quest period finalized"
        );
        Ok(())
    }

    /// Freeze `gauge`'s budget for `period` from its capped relative
    /// weight. Idempotent per (gauge, period): the first finalized quest
    /// on the gauge does the work.
    fn allocate_gauge_budget(
        &mut self,
        gauge: &AccountId,
        period: Period,
        weights: &dyn GaugeWeightSource,
    ) -> Result<(), AllocError> {
        if self.gauge_allocated.contains(&(*gauge, period)) {
            return Ok(());
        }
        let period_budget = self
            .period_budget
            .get(&period)
            .copied()
            .unwrap_or_default();
        let raw_weight = weights.relative_weight_at(gauge, period);
        let cap = weights.gauge_cap(gauge);
        let capped_weight = raw_weight.min(cap);

        let capped = Budget::new(
            mul_div(period_budget.pal, capped_weight, UNIT)?,
            mul_div(period_budget.extra, capped_weight, UNIT)?,
        );
        let uncapped = Budget::new(
            mul_div(period_budget.pal, raw_weight, UNIT)?,
            mul_div(period_budget.extra, raw_weight, UNIT)?,
        );
        let over_cap = uncapped.saturating_sub(capped);
        if !over_cap.is_zero() {
            debug!(%gauge, period, pal = over_cap.pal, "over-cap budget deferred to pending");
            self.pending = self.pending.saturating_add(over_cap);
        }

        // Allocation history records the uncapped share so the two-week
        // rollback never double-counts the over-cap slice already sent
        // to pending.
        let entry = self.allocated.entry(period).or_default();
        *entry = entry.saturating_add(uncapped);

        self.gauge_budgets.insert((*gauge, period), capped);
        self.gauge_allocated.insert((*gauge, period));
        info!(%gauge, period, pal = capped.pal, extra = capped.extra, "gauge budget frozen");
        Ok(())
    }

    /// `rate = share * UNIT / total_units * UNIT / MAX_MULTIPLIER`: the
    /// per-unit rate is pre-divided by the maximum multiplier so a
    /// maximally boosted participant earns exactly `share / total_units`
    /// per reward unit and everyone else proportionally less.
    fn derive_rates(share: Budget, total_units: Amount) -> Result<QuestAllocation, AllocError> {
        let pal_per_vote = mul_div(mul_div(share.pal, UNIT, total_units)?, UNIT, MAX_MULTIPLIER)?;
        let extra_per_vote =
            mul_div(mul_div(share.extra, UNIT, total_units)?, UNIT, MAX_MULTIPLIER)?;
        Ok(QuestAllocation { pal_per_vote, extra_per_vote })
    }

    /// Called by the distributor for each user claim it verifies.
    /// Exactly one delivery per (quest, period, user).
    pub fn on_user_claim(
        &mut self,
        distributor: &AccountId,
        quest: QuestId,
        period: Period,
        user: AccountId,
        reward_units: Amount,
    ) -> Result<(), AllocError> {
        self.require_distributor(distributor)?;
        if user.is_zero() {
            return Err(AllocError::ZeroAccount);
        }
        if reward_units == 0 {
            return Err(AllocError::ZeroRewardUnits);
        }
        let key = (*distributor, quest, period);
        if !self.total_quest_set.contains(&key) {
            return Err(AllocError::NotFinalized { quest, period });
        }
        if self.user_quest_rewards.contains_key(&(key, user)) {
            return Err(AllocError::ClaimAlreadyRecorded { quest, period });
        }
        self.user_quest_rewards.insert((key, user), reward_units);
        debug!(%user, quest, period, reward_units, "user claim recorded");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Loot creation
    // ------------------------------------------------------------------

    /// Size and create the user's Loot for one finalized quest period.
    ///
    /// `multiplier = clamp(user_share / reward_share * MAX, BASE, MAX)`
    /// where `user_share` is the user's boosted power over the pinned
    /// total and `reward_share` their reward units over the quest total.
    /// The shortfall against the maximum multiplier goes to pending.
    /// Permissionless; exactly one loot per (user, distributor, quest,
    /// period).
    pub fn create_loot(
        &mut self,
        user: AccountId,
        distributor: AccountId,
        quest: QuestId,
        period: Period,
        boost: &dyn AdjustedBalanceSource,
        vault: &mut dyn LootSink,
    ) -> Result<LootReceipt, AllocError> {
        let key = (distributor, quest, period);
        if !self.total_quest_set.contains(&key) {
            return Err(AllocError::NotFinalized { quest, period });
        }
        let Some(&user_units) = self.user_quest_rewards.get(&(key, user)) else {
            return Err(AllocError::NoClaimRecorded { quest, period });
        };
        if self.loot_created.contains(&(key, user)) {
            return Err(AllocError::LootAlreadyCreated { quest, period });
        }
        let allocation = self
            .quest_allocations
            .get(&key)
            .copied()
            .unwrap_or_default();
        let total_units = self.total_quest_rewards.get(&key).copied().unwrap_or(0);

        let multiplier = self.user_multiplier(&user, period, user_units, total_units, boost)?;

        let pal = mul_div(
            mul_div(allocation.pal_per_vote, multiplier, UNIT)?,
            user_units,
            UNIT,
        )?;
        let extra = mul_div(
            mul_div(allocation.extra_per_vote, multiplier, UNIT)?,
            user_units,
            UNIT,
        )?;

        // Whatever a sub-maximum multiplier left on the table is
        // deferred, never burned.
        let shortfall = MAX_MULTIPLIER - multiplier;
        if shortfall > 0 {
            let pal_short = mul_div(
                mul_div(allocation.pal_per_vote, shortfall, UNIT)?,
                user_units,
                UNIT,
            )?;
            let extra_short = mul_div(
                mul_div(allocation.extra_per_vote, shortfall, UNIT)?,
                user_units,
                UNIT,
            )?;
            self.pending = self
                .pending
                .saturating_add(Budget::new(pal_short, extra_short));
        }

        // Vesting starts one full period after the rewarded one.
        let start_ts = period + WEEK;
        let id = vault.create_loot(&self.account, &user, start_ts, pal, extra)?;
        self.loot_created.insert((key, user));
        info!(%user, quest, period, id, pal, extra, multiplier, "loot created");
        Ok(LootReceipt { id, pal_amount: pal, extra_amount: extra, multiplier })
    }

    fn user_multiplier(
        &self,
        user: &AccountId,
        period: Period,
        user_units: Amount,
        total_units: Amount,
        boost: &dyn AdjustedBalanceSource,
    ) -> Result<Amount, AllocError> {
        let block = self.block_checkpoints.get(&period).copied().unwrap_or(0);
        let total_power = self.oracle.total_locked_at(block);
        let user_power = boost.adjusted_balance_at(user, period);
        if total_power == 0 || user_power == 0 || total_units == 0 {
            return Ok(BASE_MULTIPLIER);
        }
        let user_share = mul_div(user_power, UNIT, total_power)?;
        let reward_share = mul_div(user_units, UNIT, total_units)?;
        if reward_share == 0 {
            return Ok(BASE_MULTIPLIER);
        }
        let ratio = mul_div(user_share, UNIT, reward_share)?;
        let multiplier = mul_div(ratio, MAX_MULTIPLIER, UNIT)?;
        Ok(multiplier.clamp(BASE_MULTIPLIER, MAX_MULTIPLIER))
    }

    // ------------------------------------------------------------------
    // Budget pushes
    // ------------------------------------------------------------------

    /// Accept budget pushed from outside the weekly pull (gauge-routed
    /// sends). Goes straight to pending and joins the next period.
    pub fn notify_new_budget(&mut self, pal: Amount, extra: Amount) {
        self.pending = self.pending.saturating_add(Budget::new(pal, extra));
        debug!(pal, extra, "budget pushed to pending");
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    pub fn next_budget_period(&self) -> Period {
        self.next_budget_period
    }

    pub fn pending_budget(&self) -> Budget {
        self.pending
    }

    pub fn period_budget(&self, period: Period) -> Budget {
        self.period_budget.get(&period).copied().unwrap_or_default()
    }

    /// Uncapped budget handed out for `period` so far.
    pub fn allocated_budget(&self, period: Period) -> Budget {
        self.allocated.get(&period).copied().unwrap_or_default()
    }

    pub fn gauge_budget(&self, gauge: &AccountId, period: Period) -> Budget {
        self.gauge_budgets
            .get(&(*gauge, period))
            .copied()
            .unwrap_or_default()
    }

    pub fn is_gauge_allocated(&self, gauge: &AccountId, period: Period) -> bool {
        self.gauge_allocated.contains(&(*gauge, period))
    }

    pub fn period_block_checkpoint(&self, period: Period) -> Option<BlockNumber> {
        self.block_checkpoints.get(&period).copied()
    }

    pub fn listed_distributors(&self) -> &[AccountId] {
        &self.distributors
    }

    pub fn is_distributor(&self, account: &AccountId) -> bool {
        self.allowed_distributors.contains(account)
    }

    pub fn quest_allocation(
        &self,
        distributor: &AccountId,
        quest: QuestId,
        period: Period,
    ) -> QuestAllocation {
        self.quest_allocations
            .get(&(*distributor, quest, period))
            .copied()
            .unwrap_or_default()
    }

    pub fn total_quest_period_rewards(
        &self,
        distributor: &AccountId,
        quest: QuestId,
        period: Period,
    ) -> Amount {
        self.total_quest_rewards
            .get(&(*distributor, quest, period))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_quest_period_set(
        &self,
        distributor: &AccountId,
        quest: QuestId,
        period: Period,
    ) -> bool {
        self.total_quest_set.contains(&(*distributor, quest, period))
    }

    pub fn user_quest_period_rewards(
        &self,
        distributor: &AccountId,
        quest: QuestId,
        period: Period,
        user: &AccountId,
    ) -> Amount {
        self.user_quest_rewards
            .get(&((*distributor, quest, period), *user))
            .copied()
            .unwrap_or(0)
    }
}

impl UndistributedSink for RewardAllocator {
    fn notify_undistributed(&mut self, pal: Amount) {
        self.pending.pal = self.pending.pal.saturating_add(pal);
        debug!(pal, "undistributed amount returned to pending");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::RwLock;
    use tideway_core::error::VaultError;
    use tideway_core::types::tokens;

    const T0: Timestamp = 4000 * WEEK;
    const ADMIN: AccountId = AccountId([0xAD; 32]);
    const SELF_ID: AccountId = AccountId([0x5E; 32]);

    fn acct(seed: u8) -> AccountId {
        AccountId([seed; 32])
    }

    // ------------------------------------------------------------------
    // Mocks
    // ------------------------------------------------------------------

    struct MockOracle {
        total_locked: RwLock<HashMap<BlockNumber, Amount>>,
    }

    impl MockOracle {
        fn new() -> Arc<Self> {
            Arc::new(Self { total_locked: RwLock::new(HashMap::new()) })
        }

        fn set_total_locked_at(&self, block: BlockNumber, amount: Amount) {
            self.total_locked.write().unwrap().insert(block, amount);
        }
    }

    impl VotingPowerOracle for MockOracle {
        fn balance_of(&self, _account: &AccountId, _now: Timestamp) -> Amount {
            0
        }

        fn user_point_at(
            &self,
            _account: &AccountId,
            _ts: Timestamp,
        ) -> Option<tideway_core::types::OraclePoint> {
            None
        }

        fn total_locked_at(&self, block: BlockNumber) -> Amount {
            *self.total_locked.read().unwrap().get(&block).unwrap_or(&0)
        }

        fn lock_end(&self, _account: &AccountId) -> Timestamp {
            0
        }
    }

    #[derive(Default)]
    struct MockBoard {
        quests: HashMap<QuestId, AccountId>,
        per_period: HashMap<(AccountId, Period), Vec<QuestId>>,
    }

    impl QuestBoard for MockBoard {
        fn quest_gauge(&self, quest: QuestId) -> Option<AccountId> {
            self.quests.get(&quest).copied()
        }

        fn quests_for_gauge(&self, gauge: &AccountId, period: Period) -> Vec<QuestId> {
            self.per_period
                .get(&(*gauge, period))
                .cloned()
                .unwrap_or_default()
        }
    }

    #[derive(Default)]
    struct MockWeights {
        weights: HashMap<(AccountId, Period), Amount>,
        caps: HashMap<AccountId, Amount>,
    }

    impl GaugeWeightSource for MockWeights {
        fn is_listed(&self, gauge: &AccountId) -> bool {
            self.caps.contains_key(gauge)
        }

        fn relative_weight_at(&self, gauge: &AccountId, period: Period) -> Amount {
            *self.weights.get(&(*gauge, period)).unwrap_or(&0)
        }

        fn gauge_cap(&self, gauge: &AccountId) -> Amount {
            *self.caps.get(gauge).unwrap_or(&0)
        }
    }

    #[derive(Default)]
    struct MockBoost {
        balances: HashMap<(AccountId, Period), Amount>,
    }

    impl AdjustedBalanceSource for MockBoost {
        fn adjusted_balance_at(&self, account: &AccountId, period: Period) -> Amount {
            *self.balances.get(&(*account, period)).unwrap_or(&0)
        }
    }

    /// Records created loots; ids are per-user indices like the real vault.
    #[derive(Default)]
    struct MockVault {
        created: Vec<(AccountId, Timestamp, Amount, Amount)>,
    }

    impl LootSink for MockVault {
        fn create_loot(
            &mut self,
            caller: &AccountId,
            user: &AccountId,
            start_ts: Timestamp,
            pal: Amount,
            extra: Amount,
        ) -> Result<LootId, VaultError> {
            if *caller != SELF_ID {
                return Err(VaultError::CallerNotAllowed);
            }
            self.created.push((*user, start_ts, pal, extra));
            Ok((self.created.len() - 1) as LootId)
        }
    }

    struct FixedBudget(Budget);

    impl BudgetSource for FixedBudget {
        fn pull_budget(&mut self, _period: Period) -> Budget {
            self.0
        }
    }

    // ------------------------------------------------------------------
    // Fixture: one distributor, one gauge at 15% weight, one finalized
    // quest with 2500 reward units over a 2150/0.005 weekly budget.
    // ------------------------------------------------------------------

    struct Fixture {
        alloc: RewardAllocator,
        oracle: Arc<MockOracle>,
        board: MockBoard,
        weights: MockWeights,
        budget: FixedBudget,
        distributor: AccountId,
        gauge: AccountId,
        period: Period,
    }

    const QUEST: QuestId = 1;
    const TOTAL_REWARDS: Amount = 2500 * UNIT;
    const GAUGE_WEIGHT: Amount = 15 * UNIT / 100;
    const PAL_WEEKLY: Amount = 2150 * UNIT;
    const EXTRA_WEEKLY: Amount = UNIT / 200; // 0.005

    fn fixture() -> Fixture {
        let oracle = MockOracle::new();
        let mut alloc = RewardAllocator::new(ADMIN, SELF_ID, oracle.clone(), T0);
        let distributor = acct(0xD1);
        let gauge = acct(0x61);
        alloc.add_distributor(&ADMIN, distributor).unwrap();

        let mut board = MockBoard::default();
        board.quests.insert(QUEST, gauge);

        let mut weights = MockWeights::default();
        weights.caps.insert(gauge, UNIT / 2);

        let mut budget = FixedBudget(Budget::new(PAL_WEEKLY, EXTRA_WEEKLY));

        // Open the first period; the next one is the quest period under
        // test, funded by the catch-up inside finalization.
        alloc.update_period(T0 + WEEK, 100, &mut budget).unwrap();
        let period = alloc.next_budget_period();
        weights.weights.insert((gauge, period), GAUGE_WEIGHT);
        board.per_period.insert((gauge, period), vec![QUEST]);

        Fixture { alloc, oracle, board, weights, budget, distributor, gauge, period }
    }

    fn finalize(fx: &mut Fixture) {
        let now = fx.period;
        fx.alloc
            .on_quest_period_finalized(
                &fx.distributor,
                QUEST,
                fx.period,
                TOTAL_REWARDS,
                now,
                200,
                &fx.board,
                &fx.weights,
                &mut fx.budget,
            )
            .unwrap();
    }

    // ------------------------------------------------------------------
    // Period state machine
    // ------------------------------------------------------------------

    #[test]
    fn new_allocator_starts_next_period() {
        let oracle = MockOracle::new();
        let alloc = RewardAllocator::new(ADMIN, SELF_ID, oracle, T0 + 1234);
        assert_eq!(alloc.next_budget_period(), next_period(T0 + 1234));
        assert!(alloc.pending_budget().is_zero());
    }

    #[test]
    fn update_period_advances_one_week_per_call() {
        let oracle = MockOracle::new();
        let mut alloc = RewardAllocator::new(ADMIN, SELF_ID, oracle, T0);
        let mut budget = FixedBudget(Budget::new(tokens(100), 0));

        // Not due yet.
        assert!(!alloc.update_period(T0, 1, &mut budget).unwrap());

        let p1 = alloc.next_budget_period();
        let now = T0 + 3 * WEEK;
        assert!(alloc.update_period(now, 7, &mut budget).unwrap());
        assert_eq!(alloc.next_budget_period(), p1 + WEEK);
        assert_eq!(alloc.period_budget(p1), Budget::new(tokens(100), 0));
        assert_eq!(alloc.period_block_checkpoint(p1), Some(7));

        // Catching up takes one call per missed week.
        assert!(alloc.update_period(now, 8, &mut budget).unwrap());
        assert!(alloc.update_period(now, 9, &mut budget).unwrap());
        assert!(!alloc.update_period(now, 10, &mut budget).unwrap());
        assert_eq!(alloc.next_budget_period(), next_period(now));
    }

    #[test]
    fn pending_budget_folds_into_next_period() {
        let oracle = MockOracle::new();
        let mut alloc = RewardAllocator::new(ADMIN, SELF_ID, oracle, T0);
        let mut budget = FixedBudget(Budget::new(tokens(100), tokens(1)));

        alloc.notify_new_budget(tokens(40), 0);
        assert_eq!(alloc.pending_budget(), Budget::new(tokens(40), 0));

        let p1 = alloc.next_budget_period();
        alloc.update_period(T0 + WEEK, 1, &mut budget).unwrap();
        assert_eq!(alloc.period_budget(p1), Budget::new(tokens(140), tokens(1)));
        assert!(alloc.pending_budget().is_zero());
    }

    #[test]
    fn unallocated_budget_rolls_forward_after_two_weeks() {
        let mut fx = fixture();
        finalize(&mut fx);

        let p1 = fx.period;
        let frozen = fx.alloc.period_budget(p1);
        let allocated = fx.alloc.allocated_budget(p1);
        assert!(!allocated.is_zero());
        let leftover = frozen.saturating_sub(allocated);

        // Advance two more periods; the leftover of p1 joins p1 + 2w.
        let now = p1 + 2 * WEEK;
        fx.alloc.update_period(now, 300, &mut fx.budget).unwrap();
        fx.alloc.update_period(now, 301, &mut fx.budget).unwrap();
        let target = p1 + 2 * WEEK;
        assert_eq!(
            fx.alloc.period_budget(target),
            Budget::new(PAL_WEEKLY, EXTRA_WEEKLY).saturating_add(leftover)
        );
    }

    // ------------------------------------------------------------------
    // Quest finalization
    // ------------------------------------------------------------------

    #[test]
    fn finalize_freezes_gauge_budget_by_weight() {
        let mut fx = fixture();
        finalize(&mut fx);

        let period_budget = fx.alloc.period_budget(fx.period);
        let expected = Budget::new(
            mul_div(period_budget.pal, GAUGE_WEIGHT, UNIT).unwrap(),
            mul_div(period_budget.extra, GAUGE_WEIGHT, UNIT).unwrap(),
        );
        assert_eq!(fx.alloc.gauge_budget(&fx.gauge, fx.period), expected);
        assert_eq!(fx.alloc.allocated_budget(fx.period), expected);
        assert!(fx.alloc.is_gauge_allocated(&fx.gauge, fx.period));
        assert!(fx.alloc.total_quest_period_set(&fx.distributor, QUEST, fx.period));
        assert_eq!(
            fx.alloc.total_quest_period_rewards(&fx.distributor, QUEST, fx.period),
            TOTAL_REWARDS
        );
    }

    #[test]
    fn finalize_clamps_to_cap_and_defers_excess() {
        let mut fx = fixture();
        // Raw weight 50% against a 25% cap.
        fx.weights.caps.insert(fx.gauge, UNIT / 4);
        fx.weights.weights.insert((fx.gauge, fx.period), UNIT / 2);
        finalize(&mut fx);

        let period_budget = fx.alloc.period_budget(fx.period);
        let capped = Budget::new(
            mul_div(period_budget.pal, UNIT / 4, UNIT).unwrap(),
            mul_div(period_budget.extra, UNIT / 4, UNIT).unwrap(),
        );
        let uncapped = Budget::new(
            mul_div(period_budget.pal, UNIT / 2, UNIT).unwrap(),
            mul_div(period_budget.extra, UNIT / 2, UNIT).unwrap(),
        );
        assert_eq!(fx.alloc.gauge_budget(&fx.gauge, fx.period), capped);
        // History carries the uncapped figure; the excess sits in pending.
        assert_eq!(fx.alloc.allocated_budget(fx.period), uncapped);
        assert_eq!(fx.alloc.pending_budget(), uncapped.saturating_sub(capped));
    }

    #[test]
    fn finalize_rejections() {
        let mut fx = fixture();
        let now = fx.period;

        // Unknown distributor.
        let err = fx.alloc.on_quest_period_finalized(
            &acct(0xEE), QUEST, fx.period, TOTAL_REWARDS, now, 200,
            &fx.board, &fx.weights, &mut fx.budget,
        );
        assert_eq!(err, Err(AllocError::UnknownDistributor(acct(0xEE))));

        // Zero rewards.
        let err = fx.alloc.on_quest_period_finalized(
            &fx.distributor, QUEST, fx.period, 0, now, 200,
            &fx.board, &fx.weights, &mut fx.budget,
        );
        assert_eq!(err, Err(AllocError::ZeroRewardUnits));

        // Unknown quest.
        let err = fx.alloc.on_quest_period_finalized(
            &fx.distributor, 52, fx.period, TOTAL_REWARDS, now, 200,
            &fx.board, &fx.weights, &mut fx.budget,
        );
        assert_eq!(err, Err(AllocError::UnknownQuest(52)));

        // Future (unclosed) period.
        let err = fx.alloc.on_quest_period_finalized(
            &fx.distributor, QUEST, fx.period + WEEK, TOTAL_REWARDS, now, 200,
            &fx.board, &fx.weights, &mut fx.budget,
        );
        assert_eq!(err, Err(AllocError::PeriodNotClosed(fx.period + WEEK)));

        // Misaligned period.
        let err = fx.alloc.on_quest_period_finalized(
            &fx.distributor, QUEST, fx.period + 5, TOTAL_REWARDS, now + WEEK, 200,
            &fx.board, &fx.weights, &mut fx.budget,
        );
        assert_eq!(err, Err(AllocError::PeriodNotAligned(fx.period + 5)));

        // Quest on an unlisted gauge.
        fx.board.quests.insert(9, acct(0x77));
        let err = fx.alloc.on_quest_period_finalized(
            &fx.distributor, 9, fx.period, TOTAL_REWARDS, now, 200,
            &fx.board, &fx.weights, &mut fx.budget,
        );
        assert_eq!(err, Err(AllocError::GaugeNotListed(acct(0x77))));

        // Double finalize.
        finalize(&mut fx);
        let err = fx.alloc.on_quest_period_finalized(
            &fx.distributor, QUEST, fx.period, TOTAL_REWARDS, now, 200,
            &fx.board, &fx.weights, &mut fx.budget,
        );
        assert_eq!(err, Err(AllocError::AlreadyFinalized { quest: QUEST, period: fx.period }));
    }

    #[test]
    fn rates_prescale_by_max_multiplier() {
        let mut fx = fixture();
        finalize(&mut fx);

        let gauge_budget = fx.alloc.gauge_budget(&fx.gauge, fx.period);
        let allocation = fx.alloc.quest_allocation(&fx.distributor, QUEST, fx.period);
        let expected_pal = mul_div(
            mul_div(gauge_budget.pal, UNIT, TOTAL_REWARDS).unwrap(),
            UNIT,
            MAX_MULTIPLIER,
        )
        .unwrap();
        assert_eq!(allocation.pal_per_vote, expected_pal);
        assert!(allocation.extra_per_vote > 0);
    }

    #[test]
    fn gauge_budget_splits_across_quests() {
        let mut fx = fixture();
        let quest2: QuestId = 2;
        fx.board.quests.insert(quest2, fx.gauge);
        fx.board
            .per_period
            .insert((fx.gauge, fx.period), vec![QUEST, quest2]);
        finalize(&mut fx);

        let gauge_budget = fx.alloc.gauge_budget(&fx.gauge, fx.period);
        let allocation = fx.alloc.quest_allocation(&fx.distributor, QUEST, fx.period);
        let expected_pal = mul_div(
            mul_div(gauge_budget.pal / 2, UNIT, TOTAL_REWARDS).unwrap(),
            UNIT,
            MAX_MULTIPLIER,
        )
        .unwrap();
        assert_eq!(allocation.pal_per_vote, expected_pal);
    }

    // ------------------------------------------------------------------
    // User claims
    // ------------------------------------------------------------------

    #[test]
    fn user_claim_recorded_once() {
        let mut fx = fixture();
        finalize(&mut fx);
        let user = acct(1);

        fx.alloc
            .on_user_claim(&fx.distributor, QUEST, fx.period, user, tokens(750))
            .unwrap();
        assert_eq!(
            fx.alloc.user_quest_period_rewards(&fx.distributor, QUEST, fx.period, &user),
            tokens(750)
        );

        // Re-delivery is rejected rather than accumulated.
        assert_eq!(
            fx.alloc.on_user_claim(&fx.distributor, QUEST, fx.period, user, tokens(10)),
            Err(AllocError::ClaimAlreadyRecorded { quest: QUEST, period: fx.period })
        );
    }

    #[test]
    fn user_claim_requires_finalized_period() {
        let mut fx = fixture();
        assert_eq!(
            fx.alloc.on_user_claim(&fx.distributor, QUEST, fx.period, acct(1), tokens(1)),
            Err(AllocError::NotFinalized { quest: QUEST, period: fx.period })
        );
    }

    // ------------------------------------------------------------------
    // Loot sizing
    // ------------------------------------------------------------------

    const TOTAL_LOCKED: Amount = 500_000 * UNIT;
    const CLAIM: Amount = 750 * UNIT;

    fn finalized_with_claim(fx: &mut Fixture) -> MockVault {
        finalize(fx);
        let block = fx.alloc.period_block_checkpoint(fx.period).unwrap();
        fx.oracle.set_total_locked_at(block, TOTAL_LOCKED);
        fx.alloc
            .on_user_claim(&fx.distributor, QUEST, fx.period, acct(1), CLAIM)
            .unwrap();
        MockVault::default()
    }

    #[test]
    fn loot_without_boost_gets_base_multiplier() {
        let mut fx = fixture();
        let mut vault = finalized_with_claim(&mut fx);
        let boost = MockBoost::default();

        let allocation = fx.alloc.quest_allocation(&fx.distributor, QUEST, fx.period);
        let prev_pending = fx.alloc.pending_budget();

        let receipt = fx
            .alloc
            .create_loot(acct(1), fx.distributor, QUEST, fx.period, &boost, &mut vault)
            .unwrap();

        assert_eq!(receipt.multiplier, BASE_MULTIPLIER);
        let expected_pal = mul_div(allocation.pal_per_vote, CLAIM, UNIT).unwrap();
        assert_eq!(receipt.pal_amount, expected_pal);

        // Vesting starts one period after the rewarded one.
        let (user, start_ts, pal, _extra) = vault.created[0];
        assert_eq!(user, acct(1));
        assert_eq!(start_ts, fx.period + WEEK);
        assert_eq!(pal, expected_pal);

        // Shortfall of (MAX - BASE) lands in pending.
        let short = mul_div(
            mul_div(allocation.pal_per_vote, MAX_MULTIPLIER - BASE_MULTIPLIER, UNIT).unwrap(),
            CLAIM,
            UNIT,
        )
        .unwrap();
        assert_eq!(fx.alloc.pending_budget().pal, prev_pending.pal + short);
    }

    #[test]
    fn loot_with_partial_boost_scales_multiplier() {
        let mut fx = fixture();
        let mut vault = finalized_with_claim(&mut fx);
        let mut boost = MockBoost::default();
        // user_share = 75k/500k = 0.15; reward_share = 750/2500 = 0.3;
        // ratio = 0.5 → multiplier = 2.5x.
        boost
            .balances
            .insert((acct(1), fx.period), 75_000 * UNIT);

        let receipt = fx
            .alloc
            .create_loot(acct(1), fx.distributor, QUEST, fx.period, &boost, &mut vault)
            .unwrap();
        assert_eq!(receipt.multiplier, 5 * UNIT / 2);

        let allocation = fx.alloc.quest_allocation(&fx.distributor, QUEST, fx.period);
        let expected_pal = mul_div(
            mul_div(allocation.pal_per_vote, receipt.multiplier, UNIT).unwrap(),
            CLAIM,
            UNIT,
        )
        .unwrap();
        assert_eq!(receipt.pal_amount, expected_pal);
    }

    #[test]
    fn loot_with_full_boost_caps_at_max_and_leaves_no_shortfall() {
        let mut fx = fixture();
        let mut vault = finalized_with_claim(&mut fx);
        let prev_pending = fx.alloc.pending_budget();
        let mut boost = MockBoost::default();
        // user_share = 150k/500k = 0.3 = reward_share → ratio 1 → 5x.
        boost
            .balances
            .insert((acct(1), fx.period), 150_000 * UNIT);

        let receipt = fx
            .alloc
            .create_loot(acct(1), fx.distributor, QUEST, fx.period, &boost, &mut vault)
            .unwrap();
        assert_eq!(receipt.multiplier, MAX_MULTIPLIER);
        assert_eq!(fx.alloc.pending_budget(), prev_pending);

        // Conservation: distributed + pending increase covers the full
        // max-rate share for this claim.
        let allocation = fx.alloc.quest_allocation(&fx.distributor, QUEST, fx.period);
        let max_share = mul_div(
            mul_div(allocation.pal_per_vote, MAX_MULTIPLIER, UNIT).unwrap(),
            CLAIM,
            UNIT,
        )
        .unwrap();
        assert_eq!(receipt.pal_amount, max_share);
    }

    #[test]
    fn loot_with_excess_boost_clamps_to_max() {
        let mut fx = fixture();
        let mut vault = finalized_with_claim(&mut fx);
        let mut boost = MockBoost::default();
        boost
            .balances
            .insert((acct(1), fx.period), 200_000 * UNIT);

        let receipt = fx
            .alloc
            .create_loot(acct(1), fx.distributor, QUEST, fx.period, &boost, &mut vault)
            .unwrap();
        assert_eq!(receipt.multiplier, MAX_MULTIPLIER);
    }

    #[test]
    fn conservation_distributed_plus_pending_equals_max_share() {
        let mut fx = fixture();
        let mut vault = finalized_with_claim(&mut fx);
        let mut boost = MockBoost::default();
        boost
            .balances
            .insert((acct(1), fx.period), 75_000 * UNIT);
        let prev_pending = fx.alloc.pending_budget().pal;

        let receipt = fx
            .alloc
            .create_loot(acct(1), fx.distributor, QUEST, fx.period, &boost, &mut vault)
            .unwrap();

        let allocation = fx.alloc.quest_allocation(&fx.distributor, QUEST, fx.period);
        let max_share = mul_div(
            mul_div(allocation.pal_per_vote, MAX_MULTIPLIER, UNIT).unwrap(),
            CLAIM,
            UNIT,
        )
        .unwrap();
        let pending_increase = fx.alloc.pending_budget().pal - prev_pending;
        assert_eq!(receipt.pal_amount + pending_increase, max_share);
    }

    #[test]
    fn loot_created_exactly_once_per_tuple() {
        let mut fx = fixture();
        let mut vault = finalized_with_claim(&mut fx);
        let boost = MockBoost::default();

        fx.alloc
            .create_loot(acct(1), fx.distributor, QUEST, fx.period, &boost, &mut vault)
            .unwrap();
        assert_eq!(
            fx.alloc.create_loot(acct(1), fx.distributor, QUEST, fx.period, &boost, &mut vault),
            Err(AllocError::LootAlreadyCreated { quest: QUEST, period: fx.period })
        );
    }

    #[test]
    fn loot_requires_recorded_claim() {
        let mut fx = fixture();
        finalize(&mut fx);
        let boost = MockBoost::default();
        let mut vault = MockVault::default();
        assert_eq!(
            fx.alloc.create_loot(acct(2), fx.distributor, QUEST, fx.period, &boost, &mut vault),
            Err(AllocError::NoClaimRecorded { quest: QUEST, period: fx.period })
        );
    }

    // ------------------------------------------------------------------
    // Admin fix and sinks
    // ------------------------------------------------------------------

    #[test]
    fn fix_quest_period_total_rederives_rates() {
        let mut fx = fixture();
        finalize(&mut fx);

        let gauge_budget = fx.alloc.gauge_budget(&fx.gauge, fx.period);
        let new_total = 5000 * UNIT;
        fx.alloc
            .fix_quest_period_total(&ADMIN, fx.distributor, QUEST, fx.period, new_total)
            .unwrap();

        assert_eq!(
            fx.alloc.total_quest_period_rewards(&fx.distributor, QUEST, fx.period),
            new_total
        );
        let allocation = fx.alloc.quest_allocation(&fx.distributor, QUEST, fx.period);
        let expected = mul_div(
            mul_div(gauge_budget.pal, UNIT, new_total).unwrap(),
            UNIT,
            MAX_MULTIPLIER,
        )
        .unwrap();
        assert_eq!(allocation.pal_per_vote, expected);

        // Only for finalized quests, only by the admin.
        assert_eq!(
            fx.alloc.fix_quest_period_total(&ADMIN, fx.distributor, 99, fx.period, new_total),
            Err(AllocError::NotFinalized { quest: 99, period: fx.period })
        );
        assert_eq!(
            fx.alloc.fix_quest_period_total(&acct(9), fx.distributor, QUEST, fx.period, new_total),
            Err(AllocError::PermissionDenied)
        );
    }

    #[test]
    fn undistributed_sink_feeds_pending() {
        let mut fx = fixture();
        let before = fx.alloc.pending_budget().pal;
        UndistributedSink::notify_undistributed(&mut fx.alloc, tokens(12));
        assert_eq!(fx.alloc.pending_budget().pal, before + tokens(12));
    }

    proptest::proptest! {
        /// A gauge's frozen budget never exceeds the period budget
        /// scaled by its cap, whatever the raw weight.
        #[test]
        fn gauge_budget_respects_cap(
            weight_pct in 0u128..=100,
            cap_pct in 1u128..=100,
        ) {
            let mut fx = fixture();
            fx.weights.caps.insert(fx.gauge, cap_pct * UNIT / 100);
            fx.weights
                .weights
                .insert((fx.gauge, fx.period), weight_pct * UNIT / 100);
            finalize(&mut fx);

            let period_budget = fx.alloc.period_budget(fx.period);
            let ceiling = mul_div(period_budget.pal, cap_pct * UNIT / 100, UNIT).unwrap();
            let frozen = fx.alloc.gauge_budget(&fx.gauge, fx.period);
            proptest::prop_assert!(frozen.pal <= ceiling);
            proptest::prop_assert!(frozen.pal <= period_budget.pal);
        }
    }

    #[test]
    fn distributor_listing() {
        let oracle = MockOracle::new();
        let mut alloc = RewardAllocator::new(ADMIN, SELF_ID, oracle, T0);
        let d = acct(0xD7);
        assert!(!alloc.is_distributor(&d));
        alloc.add_distributor(&ADMIN, d).unwrap();
        assert!(alloc.is_distributor(&d));
        assert_eq!(alloc.listed_distributors(), &[d]);
        assert_eq!(
            alloc.add_distributor(&ADMIN, d),
            Err(AllocError::DistributorAlreadyListed(d))
        );
        assert_eq!(
            alloc.add_distributor(&ADMIN, AccountId::ZERO),
            Err(AllocError::ZeroAccount)
        );
        assert_eq!(
            alloc.add_distributor(&acct(1), acct(2)),
            Err(AllocError::PermissionDenied)
        );
    }
}
