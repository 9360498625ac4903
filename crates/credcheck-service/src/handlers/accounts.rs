//! Account and balance handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use credcheck_core::{Account, CreditSummary, DailyAllowance};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Unlimited subscription details.
#[derive(Debug, Serialize)]
pub struct UnlimitedResponse {
    /// Daily cap.
    pub daily_credits: i64,
    /// Used since the last reset.
    pub daily_credits_used_today: i64,
    /// Reset boundaries left.
    pub subscription_days_remaining: i64,
    /// When the subscription started.
    pub subscription_start_date: Option<String>,
    /// Next reset boundary.
    pub credits_reset_at: Option<String>,
}

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Regular balance.
    pub regular_balance: i64,
    /// Whether an unlimited subscription is active.
    pub is_unlimited: bool,
    /// Subscription details, only while unlimited.
    pub unlimited: Option<UnlimitedResponse>,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        let unlimited = account.is_unlimited.then(|| UnlimitedResponse {
            daily_credits: account.unlimited.daily_credits,
            daily_credits_used_today: account.unlimited.daily_credits_used_today,
            subscription_days_remaining: account.unlimited.subscription_days_remaining,
            subscription_start_date: account
                .unlimited
                .subscription_start_date
                .map(|t| t.to_rfc3339()),
            credits_reset_at: account.unlimited.credits_reset_at.map(|t| t.to_rfc3339()),
        });
        Self {
            user_id: account.user_id.to_string(),
            regular_balance: account.regular_balance,
            is_unlimited: account.is_unlimited,
            unlimited,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Register the caller's account.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.ledger.register_account(auth.user_id)?;
    Ok(Json(AccountResponse::from(&account)))
}

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Regular balance.
    pub regular_balance: i64,
    /// Whether an unlimited subscription is active.
    pub is_unlimited: bool,
    /// Today's allowance, only while unlimited.
    pub daily: Option<DailyAllowance>,
    /// Credits spendable right now across both pools.
    pub total_available: i64,
}

impl From<CreditSummary> for BalanceResponse {
    fn from(summary: CreditSummary) -> Self {
        let daily_available = summary.daily.as_ref().map_or(0, |d| d.available);
        Self {
            regular_balance: summary.regular_balance,
            is_unlimited: summary.is_unlimited,
            total_available: summary.regular_balance + daily_available,
            daily: summary.daily,
        }
    }
}

/// Get the caller's spendable credits.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let summary = state.ledger.balance(&auth.user_id).await?;
    Ok(Json(summary.into()))
}
