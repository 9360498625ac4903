//! Credit ledger orchestration.
//!
//! [`Ledger`] composes the pure domain rules from `credcheck-core` with a
//! [`Store`], a [`StorageProvider`] and a [`Clock`]. Every account write is a
//! read-reset-mutate-save cycle guarded by the store's version check; a lost
//! race is retried from a fresh read with bounded backoff.
//!
//! Operations are grouped by concern:
//!
//! - `accounts`: registration, balance reads, admin grants
//! - `orders`: order creation with compensation, completion, failure refunds
//! - `redemption`: code redemption and code management
//! - `reset`: the daily sweep over unlimited accounts

mod accounts;
mod orders;
mod redemption;
mod reset;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use credcheck_core::{apply_daily_reset, Account, Clock, CompletionPolicy, ResetOutcome, UserId};
use credcheck_store::{entity, Store};

use crate::error::{Result, ServiceError};
use crate::retry::Backoff;
use crate::storage::StorageProvider;

pub use accounts::{AccountOverview, SubscriberDay};
pub use orders::{OrderRequest, Upload};
pub use redemption::Redemption;
pub use reset::SweepReport;

/// Tunables of the ledger.
#[derive(Debug, Clone)]
pub struct LedgerOptions {
    /// Storage folder for user submissions.
    pub upload_folder: String,
    /// Storage folder for admin result files.
    pub results_folder: String,
    /// Upper bound for a single upload.
    pub upload_timeout: Duration,
    /// Retries after a version conflict before giving up.
    pub max_conflict_retries: u32,
    /// First backoff delay; doubles on each retry.
    pub retry_base_delay: Duration,
    /// What an order needs before it can be completed.
    pub completion_policy: CompletionPolicy,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            upload_folder: "credcheck-uploads".into(),
            results_folder: "credcheck-results".into(),
            upload_timeout: Duration::from_secs(60),
            max_conflict_retries: 5,
            retry_base_delay: Duration::from_millis(10),
            completion_policy: CompletionPolicy::AnyReport,
        }
    }
}

/// The credit ledger service.
pub struct Ledger {
    store: Arc<dyn Store>,
    storage: Arc<dyn StorageProvider>,
    clock: Arc<dyn Clock>,
    options: LedgerOptions,
}

impl Ledger {
    /// Create a ledger over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        storage: Arc<dyn StorageProvider>,
        clock: Arc<dyn Clock>,
        options: LedgerOptions,
    ) -> Self {
        Self {
            store,
            storage,
            clock,
            options,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Current options.
    #[must_use]
    pub const fn options(&self) -> &LedgerOptions {
        &self.options
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(self.options.max_conflict_retries, self.options.retry_base_delay)
    }

    fn load_account(&self, user_id: &UserId) -> Result<Account> {
        self.store
            .get_account(user_id)?
            .ok_or(ServiceError::AccountNotFound(*user_id))
    }

    /// Read an account, bring its daily window up to date, let `mutate`
    /// change it, and save it.
    ///
    /// `mutate` returns whether it changed anything. If neither the reset nor
    /// `mutate` did, nothing is written. A business error from `mutate`
    /// aborts without writing. Version conflicts restart from a fresh read.
    async fn update_account<F>(&self, user_id: &UserId, mut mutate: F) -> Result<(Account, ResetOutcome)>
    where
        F: FnMut(&mut Account, DateTime<Utc>) -> Result<bool>,
    {
        let mut backoff = self.backoff();
        loop {
            let now = self.now();
            let mut account = self.load_account(user_id)?;
            let outcome = apply_daily_reset(&mut account, now);
            if outcome.expired {
                tracing::info!(user_id = %user_id, "Unlimited subscription expired");
            }

            let mutated = mutate(&mut account, now)?;
            if !outcome.changed() && !mutated {
                return Ok((account, outcome));
            }

            account.touch(now);
            match self.store.save_account(&account) {
                Ok(saved) => return Ok((saved, outcome)),
                Err(err) if err.is_conflict() => {
                    if !backoff.wait().await {
                        return Err(ServiceError::ConflictRetriesExhausted {
                            entity: entity::ACCOUNT,
                            id: user_id.to_string(),
                            attempts: backoff.attempts(),
                        });
                    }
                    tracing::warn!(
                        user_id = %user_id,
                        attempt = backoff.attempts(),
                        "Account write conflicted, retrying"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
