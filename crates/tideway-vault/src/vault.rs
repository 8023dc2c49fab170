//! The vesting vault.

use std::collections::HashMap;

use tracing::{debug, info};

use tideway_core::constants::MIN_VESTING_DURATION;
use tideway_core::error::VaultError;
use tideway_core::math::mul_div;
use tideway_core::traits::{LootSink, UndistributedSink};
use tideway_core::types::{AccountId, Amount, Loot, LootData, LootId, Timestamp};

/// What a claim paid out, and what it forfeited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub id: LootId,
    pub pal_paid: Amount,
    pub extra_paid: Amount,
    /// PAL withheld for claiming before the vesting end, already routed
    /// to the undistributed sink.
    pub pal_slashed: Amount,
}

/// Per-user Loot records with time-locked claims.
///
/// Loot ids are indices into the owner's list. Records are immutable
/// once created except for the `claimed` flag. The vesting end of an
/// unclaimed loot follows the vault's *current* duration.
#[derive(Debug)]
pub struct VestingVault {
    admin: AccountId,
    allocator: Option<AccountId>,
    vesting_duration: u64,
    loots: HashMap<AccountId, Vec<Loot>>,
}

impl VestingVault {
    pub fn new(admin: AccountId, vesting_duration: u64) -> Result<Self, VaultError> {
        if admin.is_zero() {
            return Err(VaultError::InvalidParameter);
        }
        if vesting_duration < MIN_VESTING_DURATION {
            return Err(VaultError::InvalidParameter);
        }
        Ok(Self {
            admin,
            allocator: None,
            vesting_duration,
            loots: HashMap::new(),
        })
    }

    fn require_admin(&self, caller: &AccountId) -> Result<(), VaultError> {
        if *caller != self.admin {
            return Err(VaultError::PermissionDenied);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Admin surface
    // ------------------------------------------------------------------

    /// One-shot binding of the allocator allowed to create loot.
    pub fn set_initial_allocator(
        &mut self,
        caller: &AccountId,
        allocator: AccountId,
    ) -> Result<(), VaultError> {
        self.require_admin(caller)?;
        if self.allocator.is_some() {
            return Err(VaultError::AllocatorAlreadySet);
        }
        if allocator.is_zero() {
            return Err(VaultError::InvalidParameter);
        }
        self.allocator = Some(allocator);
        info!(%allocator, "loot allocator bound");
        Ok(())
    }

    /// Replace the bound allocator.
    pub fn update_allocator(
        &mut self,
        caller: &AccountId,
        allocator: AccountId,
    ) -> Result<(), VaultError> {
        self.require_admin(caller)?;
        if allocator.is_zero() {
            return Err(VaultError::InvalidParameter);
        }
        if self.allocator == Some(allocator) {
            return Err(VaultError::SameAccount);
        }
        info!(old = ?self.allocator, new = %allocator, "loot allocator updated");
        self.allocator = Some(allocator);
        Ok(())
    }

    pub fn update_vesting_duration(
        &mut self,
        caller: &AccountId,
        duration: u64,
    ) -> Result<(), VaultError> {
        self.require_admin(caller)?;
        if duration < MIN_VESTING_DURATION {
            return Err(VaultError::InvalidParameter);
        }
        info!(old = self.vesting_duration, new = duration, "vesting duration updated");
        self.vesting_duration = duration;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Claims
    // ------------------------------------------------------------------

    /// Claim one loot for `owner`.
    ///
    /// At or after the vesting end the full amounts pay out. Earlier,
    /// `slashed = pal * (end - now) / duration` is withheld and pushed
    /// into `sink`; the extra token is never slashed. Claiming is
    /// permanent.
    pub fn claim_loot(
        &mut self,
        owner: &AccountId,
        id: LootId,
        now: Timestamp,
        sink: &mut dyn UndistributedSink,
    ) -> Result<ClaimReceipt, VaultError> {
        let duration = self.vesting_duration;
        let loot = self
            .loots
            .get_mut(owner)
            .and_then(|list| list.get_mut(id as usize))
            .ok_or(VaultError::InvalidId(id))?;
        if loot.claimed {
            return Err(VaultError::AlreadyClaimed(id));
        }
        if now < loot.start_ts {
            return Err(VaultError::VestingNotStarted(loot.start_ts));
        }
        let end_ts = loot.start_ts + duration;
        let slashed = if now >= end_ts {
            0
        } else {
            mul_div(loot.pal_amount, (end_ts - now) as u128, duration as u128)?
        };
        loot.claimed = true;
        let receipt = ClaimReceipt {
            id,
            pal_paid: loot.pal_amount - slashed,
            extra_paid: loot.extra_amount,
            pal_slashed: slashed,
        };
        if slashed > 0 {
            sink.notify_undistributed(slashed);
        }
        info!(
            %owner,
            id,
            pal = receipt.pal_paid,
            extra = receipt.extra_paid,
            slashed,
            "loot claimed"
        );
        Ok(receipt)
    }

    /// Claim several loots at once; the first failure aborts the batch.
    pub fn claim_many(
        &mut self,
        owner: &AccountId,
        ids: &[LootId],
        now: Timestamp,
        sink: &mut dyn UndistributedSink,
    ) -> Result<Vec<ClaimReceipt>, VaultError> {
        // Validate up front so a bad id mid-list cannot leave a partial
        // batch behind.
        let list = self.loots.get(owner).map(Vec::as_slice).unwrap_or(&[]);
        for &id in ids {
            let loot = list.get(id as usize).ok_or(VaultError::InvalidId(id))?;
            if loot.claimed {
                return Err(VaultError::AlreadyClaimed(id));
            }
            if now < loot.start_ts {
                return Err(VaultError::VestingNotStarted(loot.start_ts));
            }
        }
        ids.iter()
            .map(|&id| self.claim_loot(owner, id, now, sink))
            .collect()
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub fn vesting_duration(&self) -> u64 {
        self.vesting_duration
    }

    pub fn allocator(&self) -> Option<AccountId> {
        self.allocator
    }

    fn to_data(&self, loot: &Loot) -> LootData {
        LootData {
            id: loot.id,
            pal_amount: loot.pal_amount,
            extra_amount: loot.extra_amount,
            start_ts: loot.start_ts,
            end_ts: loot.start_ts + self.vesting_duration,
            claimed: loot.claimed,
        }
    }

    /// One loot with its vesting end resolved.
    pub fn loot_data(&self, owner: &AccountId, id: LootId) -> Result<LootData, VaultError> {
        self.loots
            .get(owner)
            .and_then(|list| list.get(id as usize))
            .map(|l| self.to_data(l))
            .ok_or(VaultError::InvalidId(id))
    }

    /// Every loot ever created for the owner.
    pub fn all_loots(&self, owner: &AccountId) -> Vec<LootData> {
        self.loots
            .get(owner)
            .map(|list| list.iter().map(|l| self.to_data(l)).collect())
            .unwrap_or_default()
    }

    /// Unclaimed loots only.
    pub fn active_loots(&self, owner: &AccountId) -> Vec<LootData> {
        self.loots
            .get(owner)
            .map(|list| {
                list.iter()
                    .filter(|l| !l.claimed)
                    .map(|l| self.to_data(l))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn all_loot_ids(&self, owner: &AccountId) -> Vec<LootId> {
        self.loots
            .get(owner)
            .map(|list| list.iter().map(|l| l.id).collect())
            .unwrap_or_default()
    }

    pub fn active_loot_ids(&self, owner: &AccountId) -> Vec<LootId> {
        self.loots
            .get(owner)
            .map(|list| list.iter().filter(|l| !l.claimed).map(|l| l.id).collect())
            .unwrap_or_default()
    }
}

impl LootSink for VestingVault {
    fn create_loot(
        &mut self,
        caller: &AccountId,
        user: &AccountId,
        start_ts: Timestamp,
        pal: Amount,
        extra: Amount,
    ) -> Result<LootId, VaultError> {
        if self.allocator != Some(*caller) {
            return Err(VaultError::CallerNotAllowed);
        }
        if user.is_zero() {
            return Err(VaultError::InvalidParameter);
        }
        let list = self.loots.entry(*user).or_default();
        let id = list.len() as LootId;
        list.push(Loot {
            id,
            pal_amount: pal,
            extra_amount: extra,
            start_ts,
            claimed: false,
        });
        debug!(%user, id, pal, extra, start_ts, "loot recorded");
        Ok(id)
    }
}
