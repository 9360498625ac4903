//! Item catalogue and order handlers for users.

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use credcheck_core::{FileRef, Item, ItemId, Order, PaymentSource};

use super::{parse_id, read_upload, PageQuery};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::ledger::OrderRequest;
use crate::state::AppState;

/// Item response.
#[derive(Debug, Serialize)]
pub struct ItemResponse {
    /// Item ID.
    pub id: String,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Price in credits.
    pub price: i64,
    /// Whether the item can be ordered.
    pub is_active: bool,
}

impl From<&Item> for ItemResponse {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.to_string(),
            title: item.title.clone(),
            description: item.description.clone(),
            price: item.price,
            is_active: item.is_active,
        }
    }
}

/// List items that can be ordered.
pub async fn list_items(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
) -> Result<Json<Vec<ItemResponse>>, ApiError> {
    let items = state.ledger.active_items()?;
    Ok(Json(items.iter().map(ItemResponse::from).collect()))
}

/// A stored file.
#[derive(Debug, Serialize)]
pub struct FileResponse {
    /// File name as stored.
    pub filename: String,
    /// Public URL.
    pub url: String,
    /// Upload timestamp.
    pub uploaded_at: String,
}

impl From<&FileRef> for FileResponse {
    fn from(file: &FileRef) -> Self {
        Self {
            filename: file.filename.clone(),
            url: file.url.clone(),
            uploaded_at: file.uploaded_at.to_rfc3339(),
        }
    }
}

/// Order response.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    /// Order ID.
    pub id: String,
    /// Paying user.
    pub user_id: String,
    /// Purchased item.
    pub item_id: String,
    /// `pending`, `completed` or `failed`.
    pub status: String,
    /// Price paid.
    pub total_cost: i64,
    /// Part paid from the daily pool.
    pub daily_credits_used: i64,
    /// Part paid from the regular balance.
    pub regular_checks_used: i64,
    /// Which pool(s) paid.
    pub payment_source: PaymentSource,
    /// The submitted document.
    pub user_file: FileResponse,
    /// AI-detection report, once attached.
    pub ai_report: Option<FileResponse>,
    /// Similarity report, once attached.
    pub similarity_report: Option<FileResponse>,
    /// Why the order failed.
    pub failure_reason: Option<String>,
    /// Credits returned on failure.
    pub refund_amount: i64,
    /// Completion timestamp.
    pub completed_at: Option<String>,
    /// Refund timestamp.
    pub refunded_at: Option<String>,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            user_id: order.user_id.to_string(),
            item_id: order.item_id.to_string(),
            status: order.status.to_string(),
            total_cost: order.total_cost,
            daily_credits_used: order.daily_credits_used,
            regular_checks_used: order.regular_checks_used,
            payment_source: order.payment_source,
            user_file: FileResponse::from(&order.user_artifact),
            ai_report: order.admin_artifacts.ai_report.as_ref().map(FileResponse::from),
            similarity_report: order
                .admin_artifacts
                .similarity_report
                .as_ref()
                .map(FileResponse::from),
            failure_reason: order.failure_reason.clone(),
            refund_amount: order.refund_amount,
            completed_at: order.completed_at.map(|t| t.to_rfc3339()),
            refunded_at: order.refunded_at.map(|t| t.to_rfc3339()),
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

/// Create an order from a multipart form with `item_id`, `file` and an
/// optional `idempotency_key`. The `Idempotency-Key` header is accepted too.
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<OrderResponse>, ApiError> {
    let mut item_id: Option<ItemId> = None;
    let mut upload = None;
    let mut idempotency_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "item_id" => item_id = Some(parse_id(field.text().await?.trim())?),
            "idempotency_key" => idempotency_key = Some(field.text().await?),
            "file" => upload = Some(read_upload(field).await?),
            other => tracing::debug!(field = %other, "Ignoring unknown order field"),
        }
    }

    let item_id = item_id.ok_or_else(|| ApiError::BadRequest("item_id is required".into()))?;
    let upload = upload.ok_or_else(|| ApiError::BadRequest("file is required".into()))?;

    let order = state
        .ledger
        .create_order(OrderRequest {
            user_id: auth.user_id,
            item_id,
            upload,
            idempotency_key,
        })
        .await?;

    Ok(Json(OrderResponse::from(&order)))
}

/// List orders response.
#[derive(Debug, Serialize)]
pub struct ListOrdersResponse {
    /// Orders (newest first).
    pub orders: Vec<OrderResponse>,
    /// Whether there are more orders.
    pub has_more: bool,
}

/// List the caller's orders.
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ListOrdersResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit_or(20, 100);
    let orders = state
        .ledger
        .user_orders(&auth.user_id, limit + 1, query.offset)?;

    let has_more = orders.len() > limit;
    let orders = orders.iter().take(limit).map(OrderResponse::from).collect();

    Ok(Json(ListOrdersResponse { orders, has_more }))
}

/// Get one of the caller's orders.
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(order_id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .ledger
        .user_order(&auth.user_id, &parse_id(&order_id)?)?;
    Ok(Json(OrderResponse::from(&order)))
}
