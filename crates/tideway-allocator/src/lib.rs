//! # tideway-allocator
//! The reward allocator: pulls the weekly token budget, splits it across
//! gauges by capped relative vote weight, derives per-quest reward
//! rates, and sizes each participant's vesting Loot by their boost
//! multiplier. Budget that goes undistributed — over-cap slices,
//! sub-maximum multipliers, early-claim slashes — is never burned, only
//! deferred into the next period through the pending accumulator.

pub mod allocator;
pub mod budget;

pub use allocator::{LootReceipt, RewardAllocator};
pub use budget::WeeklyBudget;
