//! The weekly budget source: fixed per-token amounts released at most
//! once per period, with admin-settable amounts bounded by limits.

use tracing::{debug, info};

use tideway_core::error::AllocError;
use tideway_core::traits::BudgetSource;
use tideway_core::types::{AccountId, Amount, Budget, Period};

/// Production [`BudgetSource`]: releases `pal_weekly` / `extra_weekly`
/// once per period. The safety limits bound how far an admin can raise
/// the weekly amounts in one step.
#[derive(Debug)]
pub struct WeeklyBudget {
    admin: AccountId,
    pal_weekly: Amount,
    extra_weekly: Amount,
    pal_limit: Amount,
    extra_limit: Amount,
    last_pulled: Period,
}

impl WeeklyBudget {
    pub fn new(
        admin: AccountId,
        pal_weekly: Amount,
        extra_weekly: Amount,
        pal_limit: Amount,
        extra_limit: Amount,
    ) -> Result<Self, AllocError> {
        if admin.is_zero() {
            return Err(AllocError::ZeroAccount);
        }
        if pal_weekly > pal_limit {
            return Err(AllocError::BudgetOverLimit { amount: pal_weekly, limit: pal_limit });
        }
        if extra_weekly > extra_limit {
            return Err(AllocError::BudgetOverLimit { amount: extra_weekly, limit: extra_limit });
        }
        Ok(Self {
            admin,
            pal_weekly,
            extra_weekly,
            pal_limit,
            extra_limit,
            last_pulled: 0,
        })
    }

    fn require_admin(&self, caller: &AccountId) -> Result<(), AllocError> {
        if *caller != self.admin {
            return Err(AllocError::PermissionDenied);
        }
        Ok(())
    }

    pub fn pal_weekly_budget(&self) -> Amount {
        self.pal_weekly
    }

    pub fn extra_weekly_budget(&self) -> Amount {
        self.extra_weekly
    }

    pub fn update_pal_weekly_budget(
        &mut self,
        caller: &AccountId,
        amount: Amount,
    ) -> Result<(), AllocError> {
        self.require_admin(caller)?;
        if amount > self.pal_limit {
            return Err(AllocError::BudgetOverLimit { amount, limit: self.pal_limit });
        }
        info!(old = self.pal_weekly, new = amount, "pal weekly budget updated");
        self.pal_weekly = amount;
        Ok(())
    }

    pub fn update_extra_weekly_budget(
        &mut self,
        caller: &AccountId,
        amount: Amount,
    ) -> Result<(), AllocError> {
        self.require_admin(caller)?;
        if amount > self.extra_limit {
            return Err(AllocError::BudgetOverLimit { amount, limit: self.extra_limit });
        }
        info!(old = self.extra_weekly, new = amount, "extra weekly budget updated");
        self.extra_weekly = amount;
        Ok(())
    }

    pub fn set_pal_weekly_limit(
        &mut self,
        caller: &AccountId,
        limit: Amount,
    ) -> Result<(), AllocError> {
        self.require_admin(caller)?;
        self.pal_limit = limit;
        Ok(())
    }

    pub fn set_extra_weekly_limit(
        &mut self,
        caller: &AccountId,
        limit: Amount,
    ) -> Result<(), AllocError> {
        self.require_admin(caller)?;
        self.extra_limit = limit;
        Ok(())
    }
}

impl BudgetSource for WeeklyBudget {
    fn pull_budget(&mut self, period: Period) -> Budget {
        if period <= self.last_pulled {
            debug!(period, "budget already pulled for period");
            return Budget::ZERO;
        }
        self.last_pulled = period;
        Budget::new(self.pal_weekly, self.extra_weekly)
    }
}
