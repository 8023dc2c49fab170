//! # tideway-votes
//! Gauge-weight voting over decaying voting power.
//!
//! Accounts split their oracle-reported voting power across gauges in
//! basis points. Each vote contributes a decaying slope to the gauge's
//! weekly weight series and to the global total; budget allocation later
//! reads `gauge / total` per period, clamped by per-gauge caps. Votes
//! always land on the next period, and every re-vote removes the
//! previous allocation before applying the new one.

pub mod controller;
pub mod registry;

pub use controller::VoteController;
pub use registry::{Board, GaugeRegistry};
