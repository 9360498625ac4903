//! Redemption of single-use codes.

use serde::Serialize;

use credcheck_core::{generate_code, normalize_code, Account, LedgerError, RedemptionCode, UserId};
use credcheck_store::StoreError;

use super::Ledger;
use crate::error::{Result, ServiceError};

/// Attempts at finding an unused generated code.
const GENERATE_ATTEMPTS: u32 = 5;

/// The outcome of a successful redemption.
#[derive(Debug, Clone, Serialize)]
pub struct Redemption {
    /// The claimed code.
    pub code: RedemptionCode,
    /// The credited account.
    pub account: Account,
}

impl Ledger {
    /// Redeem a code for regular credits.
    ///
    /// The code is claimed before the account is credited. If the credit
    /// cannot be written afterwards, the code stays used and the loss is
    /// logged; a code is never redeemable twice.
    ///
    /// # Errors
    ///
    /// - `CodeNotFound` for an empty or unknown code.
    /// - [`ServiceError::AccountNotFound`] if the user has no account.
    /// - `AlreadyUsed` if the code was redeemed before, including by a
    ///   concurrent request.
    pub async fn redeem(&self, user_id: &UserId, raw_code: &str) -> Result<Redemption> {
        let code = normalize_code(raw_code);
        if code.is_empty() {
            return Err(LedgerError::CodeNotFound { code }.into());
        }
        self.load_account(user_id)?;

        match self.store.find_code(&code)? {
            None => return Err(LedgerError::CodeNotFound { code }.into()),
            Some(found) if found.is_used => return Err(LedgerError::AlreadyUsed { code }.into()),
            Some(_) => {}
        }

        let claimed = match self.store.claim_code_if_unused(&code, user_id, self.now()) {
            Ok(claimed) => claimed,
            Err(StoreError::AlreadyUsed { code }) => {
                return Err(LedgerError::AlreadyUsed { code }.into())
            }
            Err(StoreError::NotFound { .. }) => {
                return Err(LedgerError::CodeNotFound { code }.into())
            }
            Err(err) => return Err(err.into()),
        };

        let credited = self
            .update_account(user_id, |account, _| {
                account.credit_regular(claimed.credit_value)?;
                Ok(true)
            })
            .await;

        match credited {
            Ok((account, _)) => {
                tracing::info!(
                    user_id = %user_id,
                    code = %claimed.code,
                    credit_value = claimed.credit_value,
                    balance = account.regular_balance,
                    "Code redeemed"
                );
                Ok(Redemption {
                    code: claimed,
                    account,
                })
            }
            Err(err) => {
                tracing::error!(
                    user_id = %user_id,
                    code = %claimed.code,
                    credit_value = claimed.credit_value,
                    error = %err,
                    "Code claimed but credit not applied, manual reconciliation required"
                );
                Err(err)
            }
        }
    }

    /// Create a code. Without an explicit code a random one is generated.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if `credit_value` is not positive.
    /// - `StoreError::AlreadyExists` for an explicit code that exists.
    pub fn create_code(&self, code: Option<&str>, credit_value: i64) -> Result<RedemptionCode> {
        if let Some(code) = code {
            let created = RedemptionCode::new(code, credit_value, self.now())?;
            self.store.create_code(&created)?;
            tracing::info!(code = %created.code, credit_value = credit_value, "Code created");
            return Ok(created);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let created = RedemptionCode::new(&generate_code(), credit_value, self.now())?;
            match self.store.create_code(&created) {
                Ok(()) => {
                    tracing::info!(
                        code = %created.code,
                        credit_value = credit_value,
                        "Code generated"
                    );
                    return Ok(created);
                }
                Err(StoreError::AlreadyExists { .. }) if attempt < GENERATE_ATTEMPTS => {
                    tracing::debug!(attempt = attempt, "Generated code collided, retrying");
                }
                Err(err) => return Err(ServiceError::Store(err)),
            }
        }
    }

    /// Codes, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn list_codes(&self, limit: usize) -> Result<Vec<RedemptionCode>> {
        Ok(self.store.list_codes(limit)?)
    }
}
