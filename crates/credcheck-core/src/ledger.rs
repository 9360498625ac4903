//! Ledger primitives.
//!
//! Pure functions that decide how a price is split between an account's daily
//! pool and its regular balance. Nothing here mutates state; the resulting
//! [`ConsumptionPlan`] is applied by [`Account::apply_consumption`] and recorded
//! on the order so that refunds can reverse it exactly.

use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::error::{LedgerError, Result};

/// Daily credits the account can still spend before the next reset boundary.
///
/// Always `0` for accounts without an unlimited subscription. Callers must run
/// the daily reset engine first so that yesterday's usage is not counted.
#[must_use]
pub fn available_daily_credits(account: &Account) -> i64 {
    if !account.is_unlimited {
        return 0;
    }
    (account.unlimited.daily_credits - account.unlimited.daily_credits_used_today).max(0)
}

/// How a price is split between the daily pool and the regular balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionPlan {
    /// Credits taken from the daily pool.
    pub daily_portion: i64,
    /// Credits taken from the regular balance.
    pub regular_portion: i64,
}

impl ConsumptionPlan {
    /// Total credits consumed.
    #[must_use]
    pub const fn total(&self) -> i64 {
        self.daily_portion + self.regular_portion
    }

    /// Payment source tag for this split.
    #[must_use]
    pub const fn payment_source(&self) -> PaymentSource {
        PaymentSource::from_split(self.daily_portion, self.regular_portion)
    }
}

/// Compute how `price` would be paid from `account`.
///
/// The daily pool is always drained first: it expires at the next reset while
/// regular credits do not.
///
/// # Errors
///
/// - [`LedgerError::InvalidAmount`] if `price` is not positive.
/// - [`LedgerError::InsufficientCredits`] if the regular balance cannot cover
///   what the daily pool leaves over. No partial plan is produced.
pub fn plan_consumption(account: &Account, price: i64) -> Result<ConsumptionPlan> {
    if price <= 0 {
        return Err(LedgerError::InvalidAmount(format!(
            "price must be positive, got {price}"
        )));
    }

    let daily_portion = price.min(available_daily_credits(account));
    let regular_portion = price - daily_portion;

    if regular_portion > account.regular_balance {
        return Err(LedgerError::InsufficientCredits {
            available: daily_portion + account.regular_balance.max(0),
            required: price,
        });
    }

    Ok(ConsumptionPlan {
        daily_portion,
        regular_portion,
    })
}

/// Which pool(s) paid for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentSource {
    /// Paid entirely from the daily pool.
    Daily,
    /// Paid entirely from the regular balance.
    Regular,
    /// Split across both pools.
    Mixed,
}

impl PaymentSource {
    /// Derive the tag from a daily/regular split.
    #[must_use]
    pub const fn from_split(daily_portion: i64, regular_portion: i64) -> Self {
        match (daily_portion > 0, regular_portion > 0) {
            (true, true) => Self::Mixed,
            (true, false) => Self::Daily,
            (false, _) => Self::Regular,
        }
    }
}
