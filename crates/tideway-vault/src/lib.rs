//! # tideway-vault
//! Custody of Loot records: created once by the bound allocator,
//! claimable after a vesting window. Claiming early forfeits a linear
//! share of the PAL amount back to the pending budget; the extra token
//! always pays in full.

pub mod vault;

pub use vault::{ClaimReceipt, VestingVault};
