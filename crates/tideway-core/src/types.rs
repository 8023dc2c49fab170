//! Core protocol types: accounts, decay points, budgets, vote slopes and
//! vesting loot records.
//!
//! All amounts are 18-decimal fixed point `u128` base units. Timestamps
//! are Unix seconds supplied by the host; periods are week-aligned
//! timestamps.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::UNIT;

/// Token amount in 18-decimal base units.
pub type Amount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Week-aligned timestamp bucket.
pub type Period = u64;

/// Host block height, used to pin total-locked-power snapshots.
pub type BlockNumber = u64;

/// Identifier of a reward quest, assigned by the external board.
pub type QuestId = u64;

/// Identifier of a registered board.
pub type BoardId = u64;

/// Index of a loot record within one user's list.
pub type LootId = u64;

/// An opaque 32-byte account identifier supplied by the host.
///
/// Used for users, gauges, boards and distributors alike.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    /// The zero account. Never a valid actor; rejected as input.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Create an AccountId from a byte array.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if this is the zero account.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl From<[u8; 32]> for AccountId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for AccountId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A linear-decay point: `value(t) = max(0, bias - slope * (t - ts))`.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Point {
    /// Magnitude at `ts`.
    pub bias: Amount,
    /// Per-second decay rate.
    pub slope: Amount,
    /// Timestamp the bias/slope pair is pinned to.
    pub ts: Timestamp,
}

impl Point {
    /// A zero point pinned to `ts`.
    pub fn zero(ts: Timestamp) -> Self {
        Self { bias: 0, slope: 0, ts }
    }

    /// Project the decayed value at `at`, floored at zero.
    ///
    /// Does not account for scheduled slope changes between `ts` and
    /// `at`; curve types apply those during advancement.
    pub fn value_at(&self, at: Timestamp) -> Amount {
        if at <= self.ts {
            return self.bias;
        }
        let elapsed = (at - self.ts) as u128;
        self.bias.saturating_sub(self.slope.saturating_mul(elapsed))
    }
}

/// A voting-power point read from the external oracle.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct OraclePoint {
    pub bias: Amount,
    pub slope: Amount,
    /// When the underlying lock expires.
    pub end_timestamp: Timestamp,
    /// Block the point was recorded at.
    pub block_number: BlockNumber,
}

/// An immutable checkpoint of a boost curve, nonce-indexed per account
/// and per direction (delegated / received).
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Checkpoint {
    /// Monotonically increasing index within one account's log.
    pub nonce: u64,
    /// Curve state at the time the checkpoint was written.
    pub point: Point,
    /// Timestamp the checkpoint was written at.
    pub date: Timestamp,
}

/// Paired PAL / extra-token amounts.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Budget {
    pub pal: Amount,
    pub extra: Amount,
}

impl Budget {
    pub const ZERO: Self = Self { pal: 0, extra: 0 };

    pub fn new(pal: Amount, extra: Amount) -> Self {
        Self { pal, extra }
    }

    pub fn is_zero(&self) -> bool {
        self.pal == 0 && self.extra == 0
    }

    /// Component-wise saturating addition.
    pub fn saturating_add(self, other: Self) -> Self {
        Self {
            pal: self.pal.saturating_add(other.pal),
            extra: self.extra.saturating_add(other.extra),
        }
    }

    /// Component-wise saturating subtraction.
    pub fn saturating_sub(self, other: Self) -> Self {
        Self {
            pal: self.pal.saturating_sub(other.pal),
            extra: self.extra.saturating_sub(other.extra),
        }
    }
}

/// One account's live vote allocation on one gauge.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct VotedSlope {
    /// Slope contributed to the gauge curve.
    pub slope: Amount,
    /// Basis points of the voter's power allocated here.
    pub power_bps: u64,
    /// When the vote's underlying lock expires.
    pub end: Timestamp,
    /// Account that submitted the vote.
    pub caller: AccountId,
}

/// Per-vote reward rates for one (distributor, quest, period), frozen
/// when the quest period is finalized.
///
/// Rates are pre-divided by [`MAX_MULTIPLIER`](crate::constants::MAX_MULTIPLIER)
/// so that scaling by a participant's multiplier never exceeds the
/// gauge's frozen budget share.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct QuestAllocation {
    pub pal_per_vote: Amount,
    pub extra_per_vote: Amount,
}

/// A sized, time-vesting reward record for one user.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Loot {
    /// Index within the user's loot list.
    pub id: LootId,
    pub pal_amount: Amount,
    pub extra_amount: Amount,
    /// When vesting starts.
    pub start_ts: Timestamp,
    pub claimed: bool,
}

/// A loot record with its vesting end resolved against the vault's
/// current vesting duration.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LootData {
    pub id: LootId,
    pub pal_amount: Amount,
    pub extra_amount: Amount,
    pub start_ts: Timestamp,
    pub end_ts: Timestamp,
    pub claimed: bool,
}

/// Convert whole tokens into 18-decimal base units.
///
/// # Examples
///
/// ```
/// use tideway_core::types::tokens;
/// use tideway_core::constants::UNIT;
/// assert_eq!(tokens(5), 5 * UNIT);
/// ```
pub const fn tokens(n: u128) -> Amount {
    n * UNIT
}
