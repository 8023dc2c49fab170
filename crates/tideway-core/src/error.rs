//! Error types for the Tideway protocol.
use thiserror::Error;

use crate::types::{AccountId, Amount, BoardId, LootId, Period, QuestId, Timestamp};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    #[error("arithmetic overflow")] Overflow,
    #[error("division by zero")] DivisionByZero,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoostError {
    #[error("zero account")] ZeroAccount,
    #[error("zero amount")] ZeroAmount,
    #[error("cannot delegate to self")] SelfDelegation,
    #[error("end time not period-aligned: {0}")] EndNotAligned(Timestamp),
    #[error("end time not in the future: {0}")] EndNotFuture(Timestamp),
    #[error("delegation outlives the lock: end {end}, lock end {lock_end}")] EndPastLock { end: Timestamp, lock_end: Timestamp },
    #[error("delegation too long: {0}")] DurationTooLong(Timestamp),
    #[error("insufficient delegable balance: have {have}, need {need}")] InsufficientBalance { have: Amount, need: Amount },
    #[error(transparent)] Math(#[from] MathError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoteError {
    #[error("permission denied")] PermissionDenied,
    #[error("zero account")] ZeroAccount,
    #[error("board not listed: {0}")] UnknownBoard(BoardId),
    #[error("board already listed: {0}")] BoardAlreadyListed(AccountId),
    #[error("gauge not listed: {0}")] NotListed(AccountId),
    #[error("gauge already listed: {0}")] AlreadyListed(AccountId),
    #[error("gauge killed: {0}")] Killed(AccountId),
    #[error("gauge not killed: {0}")] NotKilled(AccountId),
    #[error("invalid gauge cap: {0}")] InvalidCap(Amount),
    #[error("distributor already bound: {0}")] DistributorAlreadyBound(AccountId),
    #[error("lock expired at {0}")] LockExpired(Timestamp),
    #[error("no voting power point for account")] NoVotingPower,
    #[error("voting power out of range: {0}")] PowerOutOfRange(u64),
    #[error("voting power exceeded: used {used}, requested {requested}")] PowerExceeded { used: u64, requested: u64 },
    #[error("vote cooldown active until {0}")] CooldownActive(Timestamp),
    #[error("array size mismatch: {gauges} gauges, {powers} powers")] ArraySizeMismatch { gauges: usize, powers: usize },
    #[error("vote batch too large: {0}")] BatchTooLarge(usize),
    #[error(transparent)] Math(#[from] MathError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    #[error("permission denied")] PermissionDenied,
    #[error("zero account")] ZeroAccount,
    #[error("distributor not listed: {0}")] UnknownDistributor(AccountId),
    #[error("distributor already listed: {0}")] DistributorAlreadyListed(AccountId),
    #[error("unknown quest: {0}")] UnknownQuest(QuestId),
    #[error("gauge not listed: {0}")] GaugeNotListed(AccountId),
    #[error("period not aligned: {0}")] PeriodNotAligned(Period),
    #[error("period not closed: {0}")] PeriodNotClosed(Period),
    #[error("quest period already finalized: quest {quest} at {period}")] AlreadyFinalized { quest: QuestId, period: Period },
    #[error("quest period not finalized: quest {quest} at {period}")] NotFinalized { quest: QuestId, period: Period },
    #[error("zero total reward units")] ZeroRewardUnits,
    #[error("claim already recorded: quest {quest} at {period}")] ClaimAlreadyRecorded { quest: QuestId, period: Period },
    #[error("no claim recorded: quest {quest} at {period}")] NoClaimRecorded { quest: QuestId, period: Period },
    #[error("loot already created: quest {quest} at {period}")] LootAlreadyCreated { quest: QuestId, period: Period },
    #[error("weekly budget over limit: {amount} > {limit}")] BudgetOverLimit { amount: Amount, limit: Amount },
    #[error(transparent)] Math(#[from] MathError),
    #[error(transparent)] Vault(#[from] VaultError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("permission denied")] PermissionDenied,
    #[error("caller is not the allocator")] CallerNotAllowed,
    #[error("allocator already set")] AllocatorAlreadySet,
    #[error("invalid loot id: {0}")] InvalidId(LootId),
    #[error("loot already claimed: {0}")] AlreadyClaimed(LootId),
    #[error("vesting not started: starts at {0}")] VestingNotStarted(Timestamp),
    #[error("invalid parameter")] InvalidParameter,
    #[error("same account")] SameAccount,
    #[error(transparent)] Math(#[from] MathError),
}

#[derive(Error, Debug)]
pub enum TidewayError {
    #[error(transparent)] Math(#[from] MathError),
    #[error(transparent)] Boost(#[from] BoostError),
    #[error(transparent)] Vote(#[from] VoteError),
    #[error(transparent)] Alloc(#[from] AllocError),
    #[error(transparent)] Vault(#[from] VaultError),
}
