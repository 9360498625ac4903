//! Account types for credcheck.
//!
//! An account holds a durable regular balance plus, while an unlimited
//! subscription is active, a daily allowance that resets at every UTC midnight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ledger::{available_daily_credits, ConsumptionPlan};
use crate::reset::next_utc_midnight;
use crate::UserId;

/// A credit account for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The user ID.
    pub user_id: UserId,

    /// Durable, non-expiring credits.
    pub regular_balance: i64,

    /// Whether an unlimited subscription is active.
    pub is_unlimited: bool,

    /// Subscription state; all neutral while `is_unlimited` is false.
    pub unlimited: UnlimitedSettings,

    /// Free-form notes visible to admins only.
    #[serde(default)]
    pub admin_notes: String,

    /// Optimistic-concurrency revision, bumped by the store on every save.
    pub version: u64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Unlimited subscription sub-state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlimitedSettings {
    /// Cap on credits usable per UTC day.
    pub daily_credits: i64,

    /// Credits consumed from the daily pool since the last reset.
    pub daily_credits_used_today: i64,

    /// Reset boundaries left before the subscription expires.
    pub subscription_days_remaining: i64,

    /// When the current subscription was granted.
    pub subscription_start_date: Option<DateTime<Utc>>,

    /// Next UTC midnight at which daily usage resets.
    pub credits_reset_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            regular_balance: 0,
            is_unlimited: false,
            unlimited: UnlimitedSettings::default(),
            admin_notes: String::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Debit the account according to a consumption plan.
    ///
    /// The plan must have been produced by
    /// [`plan_consumption`](crate::ledger::plan_consumption) against this
    /// account's current state.
    pub fn apply_consumption(&mut self, plan: &ConsumptionPlan) {
        self.unlimited.daily_credits_used_today += plan.daily_portion;
        self.regular_balance -= plan.regular_portion;
        self.assert_invariants();
    }

    /// Credit back a previously applied consumption.
    ///
    /// Daily usage is floored at zero: a reset may already have cleared it.
    pub fn apply_refund(&mut self, daily_portion: i64, regular_portion: i64) {
        self.unlimited.daily_credits_used_today =
            (self.unlimited.daily_credits_used_today - daily_portion).max(0);
        self.regular_balance += regular_portion;
        self.assert_invariants();
    }

    /// Replace the admin notes. Returns whether they changed.
    pub fn set_admin_notes(&mut self, notes: &str) -> bool {
        if self.admin_notes == notes {
            return false;
        }
        self.admin_notes = notes.to_string();
        true
    }

    /// Add regular credits (redemptions, admin grants).
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] if `amount` is not positive.
    pub fn credit_regular(&mut self, amount: i64) -> Result<()> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "credit amount must be positive, got {amount}"
            )));
        }
        self.regular_balance += amount;
        Ok(())
    }

    /// Start an unlimited subscription.
    ///
    /// Replaces any existing subscription. The first reset boundary is the next
    /// UTC midnight after `now`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] if either value is not positive.
    pub fn grant_unlimited(
        &mut self,
        daily_credits: i64,
        subscription_days: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if daily_credits <= 0 || subscription_days <= 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "daily credits and subscription days must be positive, got {daily_credits} and {subscription_days}"
            )));
        }
        self.is_unlimited = true;
        self.unlimited = UnlimitedSettings {
            daily_credits,
            daily_credits_used_today: 0,
            subscription_days_remaining: subscription_days,
            subscription_start_date: Some(now),
            credits_reset_at: Some(next_utc_midnight(now)),
        };
        Ok(())
    }

    /// Adjust an active subscription. Non-positive values leave the field as is.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotUnlimited`] if no subscription is active.
    pub fn update_unlimited(
        &mut self,
        daily_credits: Option<i64>,
        subscription_days: Option<i64>,
    ) -> Result<()> {
        if !self.is_unlimited {
            return Err(LedgerError::NotUnlimited);
        }
        if let Some(daily) = daily_credits.filter(|d| *d > 0) {
            self.unlimited.daily_credits = daily;
            self.unlimited.daily_credits_used_today =
                self.unlimited.daily_credits_used_today.min(daily);
        }
        if let Some(days) = subscription_days.filter(|d| *d > 0) {
            self.unlimited.subscription_days_remaining = days;
        }
        self.assert_invariants();
        Ok(())
    }

    /// End the subscription and neutralise every unlimited field.
    pub fn revert_to_normal(&mut self) {
        self.is_unlimited = false;
        self.unlimited = UnlimitedSettings::default();
    }

    /// Overwrite today's daily usage with a value recomputed from orders.
    ///
    /// Clamped into `0..=daily_credits`. No-op for non-unlimited accounts.
    pub fn reconcile_daily_usage(&mut self, used_today: i64) {
        if !self.is_unlimited {
            return;
        }
        self.unlimited.daily_credits_used_today =
            used_today.clamp(0, self.unlimited.daily_credits.max(0));
    }

    /// Record a modification time.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Read model of the account's spendable credits.
    #[must_use]
    pub fn credit_summary(&self) -> CreditSummary {
        let daily = self.is_unlimited.then(|| DailyAllowance {
            daily_credits: self.unlimited.daily_credits,
            used_today: self.unlimited.daily_credits_used_today,
            available: available_daily_credits(self),
            credits_reset_at: self.unlimited.credits_reset_at,
            subscription_days_remaining: self.unlimited.subscription_days_remaining,
        });
        CreditSummary {
            regular_balance: self.regular_balance,
            is_unlimited: self.is_unlimited,
            daily,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.regular_balance >= 0,
            "Invariant violated: regular balance went negative: {}",
            self.regular_balance
        );
        debug_assert!(
            self.unlimited.daily_credits_used_today >= 0,
            "Invariant violated: daily usage went negative: {}",
            self.unlimited.daily_credits_used_today
        );
        debug_assert!(
            self.is_unlimited || self.unlimited == UnlimitedSettings::default(),
            "Invariant violated: stale unlimited settings on a normal account"
        );
    }
}

/// Spendable credits of an account at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditSummary {
    /// Regular balance.
    pub regular_balance: i64,
    /// Whether an unlimited subscription is active.
    pub is_unlimited: bool,
    /// Daily allowance, present only while unlimited.
    pub daily: Option<DailyAllowance>,
}

/// Daily allowance of an unlimited subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyAllowance {
    /// Cap per UTC day.
    pub daily_credits: i64,
    /// Used since the last reset.
    pub used_today: i64,
    /// Still spendable today.
    pub available: i64,
    /// Next reset boundary.
    pub credits_reset_at: Option<DateTime<Utc>>,
    /// Reset boundaries left.
    pub subscription_days_remaining: i64,
}
