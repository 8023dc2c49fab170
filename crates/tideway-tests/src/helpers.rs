//! Test doubles for the external collaborators and a fully wired
//! protocol harness.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use tideway_allocator::{LootReceipt, RewardAllocator, WeeklyBudget};
use tideway_boost::BoostLedger;
use tideway_core::constants::WEEK;
use tideway_core::error::TidewayError;
use tideway_core::traits::{QuestBoard, VotingPowerOracle};
use tideway_core::types::{
    AccountId, Amount, BlockNumber, LootId, OraclePoint, Period, QuestId, Timestamp,
};
use tideway_vault::{ClaimReceipt, VestingVault};
use tideway_votes::VoteController;

pub const ADMIN: AccountId = AccountId([0xAD; 32]);
pub const ALLOCATOR_ID: AccountId = AccountId([0x5E; 32]);
pub const VESTING: u64 = 2 * WEEK;

/// Account id from a seed byte.
pub fn acct(seed: u8) -> AccountId {
    AccountId([seed; 32])
}

/// Settable voting-power oracle: per-account lock points and per-block
/// total-locked snapshots.
#[derive(Default)]
pub struct TestOracle {
    points: RwLock<HashMap<AccountId, OraclePoint>>,
    total_locked: RwLock<HashMap<BlockNumber, Amount>>,
}

impl TestOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install a lock of `amount` decaying over 104 weeks, expiring at
    /// `lock_end`.
    pub fn set_locker(&self, account: AccountId, amount: Amount, lock_end: Timestamp) {
        let slope = amount / (104 * WEEK) as u128;
        self.points.write().insert(
            account,
            OraclePoint {
                bias: slope * (104 * WEEK) as u128,
                slope,
                end_timestamp: lock_end,
                block_number: 0,
            },
        );
    }

    pub fn set_total_locked_at(&self, block: BlockNumber, amount: Amount) {
        self.total_locked.write().insert(block, amount);
    }
}

impl VotingPowerOracle for TestOracle {
    fn balance_of(&self, account: &AccountId, _now: Timestamp) -> Amount {
        self.points.read().get(account).map(|p| p.bias).unwrap_or(0)
    }

    fn user_point_at(&self, account: &AccountId, _ts: Timestamp) -> Option<OraclePoint> {
        self.points.read().get(account).copied()
    }

    fn total_locked_at(&self, block: BlockNumber) -> Amount {
        *self.total_locked.read().get(&block).unwrap_or(&0)
    }

    fn lock_end(&self, account: &AccountId) -> Timestamp {
        self.points
            .read()
            .get(account)
            .map(|p| p.end_timestamp)
            .unwrap_or(0)
    }
}

/// Settable quest registry.
#[derive(Default)]
pub struct TestBoard {
    quests: RwLock<HashMap<QuestId, AccountId>>,
    per_period: RwLock<HashMap<(AccountId, Period), Vec<QuestId>>>,
}

impl TestBoard {
    pub fn add_quest(&self, quest: QuestId, gauge: AccountId) {
        self.quests.write().insert(quest, gauge);
    }

    pub fn set_quests_for_period(&self, gauge: AccountId, period: Period, quests: Vec<QuestId>) {
        self.per_period.write().insert((gauge, period), quests);
    }
}

impl QuestBoard for TestBoard {
    fn quest_gauge(&self, quest: QuestId) -> Option<AccountId> {
        self.quests.read().get(&quest).copied()
    }

    fn quests_for_gauge(&self, gauge: &AccountId, period: Period) -> Vec<QuestId> {
        self.per_period
            .read()
            .get(&(*gauge, period))
            .cloned()
            .unwrap_or_default()
    }
}

/// All components wired the way a host would run them: one shared
/// oracle, the allocator reading the controller and ledger read-only,
/// the vault bound to the allocator's identity, and slashes routed back
/// into the pending budget.
pub struct Protocol {
    pub oracle: Arc<TestOracle>,
    pub board: TestBoard,
    pub boost: BoostLedger,
    pub votes: VoteController,
    pub alloc: RewardAllocator,
    pub vault: VestingVault,
    pub budget: WeeklyBudget,
}

impl Protocol {
    /// A protocol with the given weekly budget amounts, started at `now`.
    pub fn new(now: Timestamp, pal_weekly: Amount, extra_weekly: Amount) -> Self {
        let oracle = TestOracle::new();
        let boost = BoostLedger::new(oracle.clone());
        let votes = VoteController::new(ADMIN, oracle.clone());
        let alloc = RewardAllocator::new(ADMIN, ALLOCATOR_ID, oracle.clone(), now);
        let mut vault = VestingVault::new(ADMIN, VESTING).expect("valid vesting duration");
        vault
            .set_initial_allocator(&ADMIN, ALLOCATOR_ID)
            .expect("fresh vault");
        let budget = WeeklyBudget::new(
            ADMIN,
            pal_weekly,
            extra_weekly,
            pal_weekly * 10,
            extra_weekly.max(1) * 10,
        )
        .expect("weekly under limit");
        Self {
            oracle,
            board: TestBoard::default(),
            boost,
            votes,
            alloc,
            vault,
            budget,
        }
    }

    pub fn update_period(&mut self, now: Timestamp, block: BlockNumber) -> Result<bool, TidewayError> {
        Ok(self.alloc.update_period(now, block, &mut self.budget)?)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn finalize_quest(
        &mut self,
        distributor: AccountId,
        quest: QuestId,
        period: Period,
        total_units: Amount,
        now: Timestamp,
        block: BlockNumber,
    ) -> Result<(), TidewayError> {
        self.alloc.on_quest_period_finalized(
            &distributor,
            quest,
            period,
            total_units,
            now,
            block,
            &self.board,
            &self.votes,
            &mut self.budget,
        )?;
        Ok(())
    }

    pub fn record_claim(
        &mut self,
        distributor: AccountId,
        quest: QuestId,
        period: Period,
        user: AccountId,
        units: Amount,
    ) -> Result<(), TidewayError> {
        self.alloc
            .on_user_claim(&distributor, quest, period, user, units)?;
        Ok(())
    }

    pub fn create_loot(
        &mut self,
        user: AccountId,
        distributor: AccountId,
        quest: QuestId,
        period: Period,
    ) -> Result<LootReceipt, TidewayError> {
        Ok(self.alloc.create_loot(
            user,
            distributor,
            quest,
            period,
            &self.boost,
            &mut self.vault,
        )?)
    }

    /// Claim a loot, folding any slashed PAL back into the allocator's
    /// pending budget.
    pub fn claim_loot(
        &mut self,
        user: AccountId,
        id: LootId,
        now: Timestamp,
    ) -> Result<ClaimReceipt, TidewayError> {
        Ok(self.vault.claim_loot(&user, id, now, &mut self.alloc)?)
    }
}
