//! # tideway-curve
//! The linear-decay primitive shared by boost delegation, gauge voting
//! and budget allocation: a value that decays from a bias at a per-second
//! slope, with future decay events pre-scheduled into weekly buckets and
//! applied lazily, one bucket at a time.
//!
//! Two flavors cover the protocol's needs:
//! - [`DecayCurve`] — second-precision, tracks a single live point;
//!   backs the boost ledger.
//! - [`WeightSeries`] — period-bucketed, materializes one point per week
//!   for historical weight reads; backs the vote controller.

pub mod decay;
pub mod weight;

pub use decay::DecayCurve;
pub use weight::WeightSeries;
