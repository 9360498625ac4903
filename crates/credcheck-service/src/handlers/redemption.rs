//! Code redemption handler.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Redeem request.
#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    /// The code as typed by the user.
    pub code: String,
}

/// Redeem response.
#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    /// The normalized code.
    pub code: String,
    /// Credits added to the regular balance.
    pub credits_added: i64,
    /// Regular balance afterwards.
    pub regular_balance: i64,
}

/// Redeem a code for regular credits.
pub async fn redeem_code(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>, ApiError> {
    let redemption = state.ledger.redeem(&auth.user_id, &body.code).await?;

    Ok(Json(RedeemResponse {
        code: redemption.code.code,
        credits_added: redemption.code.credit_value,
        regular_balance: redemption.account.regular_balance,
    }))
}
