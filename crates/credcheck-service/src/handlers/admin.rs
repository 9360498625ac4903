//! Admin handlers: order fulfilment, codes, items and account adjustments.
//!
//! Every handler requires [`AdminAuth`]; the admin ID is recorded in logs.

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use credcheck_core::{Account, ArtifactKind, OrderId, RedemptionCode, UserId};

use super::accounts::AccountResponse;
use super::orders::{ItemResponse, ListOrdersResponse, OrderResponse};
use super::{parse_id, read_upload, PageQuery};
use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::ledger::{AccountOverview, SubscriberDay, SweepReport};
use crate::state::AppState;

// ============================================================================
// Orders
// ============================================================================

/// Recent orders of all users.
pub async fn list_recent_orders(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListOrdersResponse>, ApiError> {
    let limit = query.limit_or(200, 500);
    let orders = state.ledger.recent_orders(limit + 1)?;

    let has_more = orders.len() > limit;
    let orders = orders.iter().take(limit).map(OrderResponse::from).collect();

    Ok(Json(ListOrdersResponse { orders, has_more }))
}

/// Attach result files from a multipart form with `ai_report` and/or
/// `similarity_report` fields.
pub async fn upload_artifacts(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(order_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&order_id)?;

    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match ArtifactKind::from_field(&name) {
            Some(kind) => files.push((kind, read_upload(field).await?)),
            None => tracing::debug!(field = %name, "Ignoring unknown artifact field"),
        }
    }

    let order = state.ledger.attach_artifacts(&order_id, files).await?;
    tracing::info!(admin_id = %admin.admin_id, order_id = %order_id, "Artifacts uploaded");
    Ok(Json(OrderResponse::from(&order)))
}

/// Complete a pending order.
pub async fn complete_order(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(order_id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&order_id)?;
    let order = state.ledger.complete_order(&order_id).await?;
    tracing::info!(admin_id = %admin.admin_id, order_id = %order_id, "Order completed by admin");
    Ok(Json(OrderResponse::from(&order)))
}

/// Fail order request.
#[derive(Debug, Deserialize)]
pub struct FailOrderRequest {
    /// Shown to the user.
    pub reason: String,
}

/// Fail a pending order and refund it.
pub async fn fail_order(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(order_id): Path<String>,
    Json(body): Json<FailOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_id(&order_id)?;
    let order = state.ledger.fail_order(&order_id, &body.reason).await?;
    tracing::info!(admin_id = %admin.admin_id, order_id = %order_id, "Order failed by admin");
    Ok(Json(OrderResponse::from(&order)))
}

// ============================================================================
// Redemption codes
// ============================================================================

/// Code response.
#[derive(Debug, Serialize)]
pub struct CodeResponse {
    /// The code.
    pub code: String,
    /// Credits granted on redemption.
    pub credit_value: i64,
    /// Whether the code was redeemed.
    pub is_used: bool,
    /// Who redeemed it.
    pub used_by: Option<String>,
    /// When it was redeemed.
    pub used_at: Option<String>,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&RedemptionCode> for CodeResponse {
    fn from(code: &RedemptionCode) -> Self {
        Self {
            code: code.code.clone(),
            credit_value: code.credit_value,
            is_used: code.is_used,
            used_by: code.used_by.map(|u| u.to_string()),
            used_at: code.used_at.map(|t| t.to_rfc3339()),
            created_at: code.created_at.to_rfc3339(),
        }
    }
}

/// List codes, newest first.
pub async fn list_codes(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<CodeResponse>>, ApiError> {
    let codes = state.ledger.list_codes(query.limit_or(100, 500))?;
    Ok(Json(codes.iter().map(CodeResponse::from).collect()))
}

/// Create code request.
#[derive(Debug, Deserialize)]
pub struct CreateCodeRequest {
    /// Explicit code. Generated when absent.
    pub code: Option<String>,
    /// Credits granted on redemption.
    pub credit_value: i64,
}

/// Create a redemption code.
pub async fn create_code(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<CreateCodeRequest>,
) -> Result<Json<CodeResponse>, ApiError> {
    let code = state
        .ledger
        .create_code(body.code.as_deref(), body.credit_value)?;
    tracing::info!(admin_id = %admin.admin_id, code = %code.code, "Code created by admin");
    Ok(Json(CodeResponse::from(&code)))
}

// ============================================================================
// Items
// ============================================================================

/// Create item request.
#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    /// Title.
    pub title: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Price in credits.
    pub price: i64,
}

/// Add an item to the catalogue.
pub async fn create_item(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Json(body): Json<CreateItemRequest>,
) -> Result<Json<ItemResponse>, ApiError> {
    let item = state
        .ledger
        .create_item(&body.title, &body.description, body.price)?;
    Ok(Json(ItemResponse::from(&item)))
}

// ============================================================================
// Accounts
// ============================================================================

/// An account with fields only admins see.
#[derive(Debug, Serialize)]
pub struct AdminAccountResponse {
    /// The account as users see it.
    #[serde(flatten)]
    pub account: AccountResponse,
    /// Private admin notes.
    pub admin_notes: String,
}

impl From<&Account> for AdminAccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            account: AccountResponse::from(account),
            admin_notes: account.admin_notes.clone(),
        }
    }
}

/// Account with order history.
#[derive(Debug, Serialize)]
pub struct AccountOverviewResponse {
    /// The account.
    pub account: AdminAccountResponse,
    /// All orders, newest first.
    pub orders: Vec<OrderResponse>,
    /// Number of orders.
    pub total_orders: usize,
    /// Number of completed orders.
    pub completed_orders: usize,
}

impl From<&AccountOverview> for AccountOverviewResponse {
    fn from(view: &AccountOverview) -> Self {
        Self {
            account: AdminAccountResponse::from(&view.account),
            orders: view.orders.iter().map(OrderResponse::from).collect(),
            total_orders: view.total_orders,
            completed_orders: view.completed_orders,
        }
    }
}

/// Look up one account with its orders.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(user_id): Path<String>,
) -> Result<Json<AccountOverviewResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id)?;
    let view = state.ledger.admin_account_view(&user_id).await?;
    Ok(Json(AccountOverviewResponse::from(&view)))
}

/// Admin notes request.
#[derive(Debug, Deserialize)]
pub struct AdminNotesRequest {
    /// New notes. Absent clears them.
    #[serde(default)]
    pub notes: String,
}

/// Replace an account's admin notes.
pub async fn set_admin_notes(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(user_id): Path<String>,
    Json(body): Json<AdminNotesRequest>,
) -> Result<Json<AdminAccountResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id)?;
    let account = state.ledger.set_admin_notes(&user_id, &body.notes).await?;
    tracing::info!(admin_id = %admin.admin_id, user_id = %user_id, "Admin notes set");
    Ok(Json(AdminAccountResponse::from(&account)))
}

/// Active unlimited subscribers, most days remaining first.
pub async fn list_unlimited_accounts(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
) -> Result<Json<Vec<AdminAccountResponse>>, ApiError> {
    let accounts = state.ledger.unlimited_accounts()?;
    Ok(Json(accounts.iter().map(AdminAccountResponse::from).collect()))
}

/// A subscriber's day: recounted usage and today's orders.
#[derive(Debug, Serialize)]
pub struct SubscriberDayResponse {
    /// The account.
    pub account: AdminAccountResponse,
    /// Daily credits spent by today's non-failed orders.
    pub daily_credits_used_today: i64,
    /// Daily credits left.
    pub daily_credits_available: i64,
    /// Today's orders, newest first.
    pub today_orders: Vec<OrderResponse>,
}

impl From<&SubscriberDay> for SubscriberDayResponse {
    fn from(day: &SubscriberDay) -> Self {
        Self {
            account: AdminAccountResponse::from(&day.account),
            daily_credits_used_today: day.daily_credits_used_today,
            daily_credits_available: day.daily_credits_available,
            today_orders: day.today_orders.iter().map(OrderResponse::from).collect(),
        }
    }
}

/// One subscriber's current day.
pub async fn get_unlimited(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Path(user_id): Path<String>,
) -> Result<Json<SubscriberDayResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id)?;
    let day = state.ledger.unlimited_account_view(&user_id).await?;
    Ok(Json(SubscriberDayResponse::from(&day)))
}

/// Grant credits request.
#[derive(Debug, Deserialize)]
pub struct GrantCreditsRequest {
    /// Regular credits to add.
    pub amount: i64,
}

/// Grant regular credits to a user.
pub async fn grant_credits(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(user_id): Path<String>,
    Json(body): Json<GrantCreditsRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id)?;
    let account = state.ledger.grant_credits(&user_id, body.amount).await?;
    tracing::info!(
        admin_id = %admin.admin_id,
        user_id = %user_id,
        amount = body.amount,
        "Credits granted by admin"
    );
    Ok(Json(AccountResponse::from(&account)))
}

/// Grant unlimited request.
#[derive(Debug, Deserialize)]
pub struct GrantUnlimitedRequest {
    /// Daily cap.
    pub daily_credits: i64,
    /// Subscription length in days.
    pub subscription_days: i64,
}

/// Start an unlimited subscription.
pub async fn grant_unlimited(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(user_id): Path<String>,
    Json(body): Json<GrantUnlimitedRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id)?;
    let account = state
        .ledger
        .grant_unlimited(&user_id, body.daily_credits, body.subscription_days)
        .await?;
    tracing::info!(admin_id = %admin.admin_id, user_id = %user_id, "Unlimited granted by admin");
    Ok(Json(AccountResponse::from(&account)))
}

/// Update unlimited request. Absent or non-positive values are left alone.
#[derive(Debug, Deserialize)]
pub struct UpdateUnlimitedRequest {
    /// New daily cap.
    pub daily_credits: Option<i64>,
    /// New remaining days.
    pub subscription_days: Option<i64>,
}

/// Adjust an active unlimited subscription.
pub async fn update_unlimited(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(user_id): Path<String>,
    Json(body): Json<UpdateUnlimitedRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id)?;
    let account = state
        .ledger
        .update_unlimited(&user_id, body.daily_credits, body.subscription_days)
        .await?;
    tracing::info!(admin_id = %admin.admin_id, user_id = %user_id, "Unlimited updated by admin");
    Ok(Json(AccountResponse::from(&account)))
}

/// End an unlimited subscription.
pub async fn revert_unlimited(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(user_id): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let user_id: UserId = parse_id(&user_id)?;
    let account = state.ledger.revert_unlimited(&user_id).await?;
    tracing::info!(admin_id = %admin.admin_id, user_id = %user_id, "Unlimited reverted by admin");
    Ok(Json(AccountResponse::from(&account)))
}

// ============================================================================
// Maintenance
// ============================================================================

/// Run the daily reset sweep. Called by an external scheduler.
pub async fn run_daily_reset(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
) -> Result<Json<SweepReport>, ApiError> {
    tracing::info!(admin_id = %admin.admin_id, "Daily reset sweep requested");
    let report = state.ledger.run_daily_reset().await?;
    Ok(Json(report))
}
