//! The daily sweep over unlimited accounts.

use serde::Serialize;

use super::Ledger;
use crate::error::Result;

/// Totals of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Unlimited accounts visited.
    pub processed: u32,
    /// Day boundaries applied across all accounts.
    pub resets_applied: u32,
    /// Subscriptions that ran out.
    pub expired: u32,
    /// Accounts that could not be updated.
    pub failed: u32,
}

impl Ledger {
    /// Apply due daily resets to every unlimited account.
    ///
    /// Runs the same routine as balance reads, so calling it more than once
    /// a day, or not at all, is harmless. A failure on one account is logged
    /// and counted.
    ///
    /// # Errors
    ///
    /// Returns an error only if the accounts cannot be listed.
    pub async fn run_daily_reset(&self) -> Result<SweepReport> {
        let accounts = self.store.find_accounts(&|account| account.is_unlimited)?;
        let mut report = SweepReport::default();

        for account in accounts {
            report.processed += 1;
            match self.update_account(&account.user_id, |_, _| Ok(false)).await {
                Ok((_, outcome)) => {
                    report.resets_applied += outcome.resets_applied;
                    if outcome.expired {
                        report.expired += 1;
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(
                        user_id = %account.user_id,
                        error = %err,
                        "Daily reset failed for account"
                    );
                }
            }
        }

        tracing::info!(
            processed = report.processed,
            resets_applied = report.resets_applied,
            expired = report.expired,
            failed = report.failed,
            "Daily reset sweep finished"
        );
        Ok(report)
    }
}
