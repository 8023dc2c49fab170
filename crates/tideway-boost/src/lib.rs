//! # tideway-boost
//! Time-bounded delegation of voting weight between accounts.
//!
//! A delegation carries one decaying [`Point`](tideway_core::types::Point)
//! that simultaneously raises the delegator's "delegated" curve and the
//! delegate's "received" curve, with equal-magnitude slope changes
//! scheduled at expiry on both. Every mutation appends a nonce-indexed
//! checkpoint, which also powers historical reads and migration between
//! ledger instances.

pub mod ledger;

pub use ledger::{BoostLedger, Direction};
