//! Daily reset engine.
//!
//! Advances an account's unlimited window to `now`. Every missed UTC midnight is
//! applied exactly once: usage is zeroed, the boundary moves forward one day and
//! one subscription day is consumed. A dormant account observed after several
//! days therefore loses exactly as many subscription days as a daily-active one.
//!
//! The routine is idempotent, so it runs both before every balance read or
//! consumption decision and from the scheduled sweep.

use chrono::{DateTime, NaiveTime, Utc};

use crate::account::Account;

/// 00:00:00 UTC of the day after `t`. Always strictly after `t`.
#[must_use]
pub fn next_utc_midnight(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive()
        .succ_opt()
        .map_or(DateTime::<Utc>::MAX_UTC, |day| {
            day.and_time(NaiveTime::MIN).and_utc()
        })
}

/// 00:00:00 UTC of the day containing `t`.
#[must_use]
pub fn start_of_utc_day(t: DateTime<Utc>) -> DateTime<Utc> {
    t.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// What a reset pass did to an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetOutcome {
    /// Number of reset boundaries crossed.
    pub resets_applied: u32,
    /// The subscription ran out and the account was reverted to normal.
    pub expired: bool,
    /// A missing reset boundary was initialised.
    pub initialized: bool,
}

impl ResetOutcome {
    /// Whether the account was modified and needs persisting.
    #[must_use]
    pub const fn changed(&self) -> bool {
        self.resets_applied > 0 || self.expired || self.initialized
    }
}

/// Bring the account's unlimited window up to `now`.
pub fn apply_daily_reset(account: &mut Account, now: DateTime<Utc>) -> ResetOutcome {
    let mut outcome = ResetOutcome::default();
    if !account.is_unlimited {
        return outcome;
    }

    let mut reset_at = match account.unlimited.credits_reset_at {
        Some(reset_at) => reset_at,
        None => {
            let reset_at = next_utc_midnight(now);
            account.unlimited.credits_reset_at = Some(reset_at);
            outcome.initialized = true;
            reset_at
        }
    };

    while account.is_unlimited && now > reset_at {
        reset_at = next_utc_midnight(reset_at);
        account.unlimited.daily_credits_used_today = 0;
        account.unlimited.credits_reset_at = Some(reset_at);
        account.unlimited.subscription_days_remaining -= 1;
        outcome.resets_applied += 1;

        if account.unlimited.subscription_days_remaining <= 0 {
            account.revert_to_normal();
            outcome.expired = true;
            break;
        }
    }

    outcome
}
