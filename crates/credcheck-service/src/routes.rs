//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, admin, health, orders, redemption};
use crate::state::AppState;

/// Maximum concurrent requests for user API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Maximum concurrent requests for admin endpoints.
const ADMIN_MAX_CONCURRENT_REQUESTS: usize = 10;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `GET /files/*` - Locally stored files (only without Cloudinary)
///
/// ## User (JWT auth)
/// - `POST /v1/accounts` - Register account
/// - `GET /v1/credits/balance` - Spendable credits
/// - `POST /v1/credits/redeem` - Redeem a code
/// - `GET /v1/items` - Orderable items
/// - `POST /v1/orders` - Create order (multipart)
/// - `GET /v1/orders`, `GET /v1/orders/:id` - Own orders
///
/// ## Admin (API key auth)
/// - `GET /v1/admin/orders` - Recent orders
/// - `POST /v1/admin/orders/:id/artifacts` - Attach result files (multipart)
/// - `POST /v1/admin/orders/:id/complete` - Complete order
/// - `POST /v1/admin/orders/:id/fail` - Fail and refund order
/// - `GET|POST /v1/admin/codes` - List / create redemption codes
/// - `POST /v1/admin/items` - Create item
/// - `POST /v1/admin/accounts/:id/credits` - Grant regular credits
/// - `POST|PUT|DELETE /v1/admin/accounts/:id/unlimited` - Manage unlimited
/// - `POST /v1/admin/daily-reset` - Daily reset sweep
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;
    let local_files = state
        .config
        .cloudinary
        .is_none()
        .then(|| state.config.storage_dir.clone());

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let admin_routes = Router::new()
        .route("/orders", get(admin::list_recent_orders))
        .route("/orders/:id/artifacts", post(admin::upload_artifacts))
        .route("/orders/:id/complete", post(admin::complete_order))
        .route("/orders/:id/fail", post(admin::fail_order))
        .route("/codes", get(admin::list_codes).post(admin::create_code))
        .route("/items", post(admin::create_item))
        .route("/accounts/unlimited", get(admin::list_unlimited_accounts))
        .route("/accounts/:id", get(admin::get_account))
        .route("/accounts/:id/notes", put(admin::set_admin_notes))
        .route("/accounts/:id/credits", post(admin::grant_credits))
        .route(
            "/accounts/:id/unlimited",
            get(admin::get_unlimited)
                .post(admin::grant_unlimited)
                .put(admin::update_unlimited)
                .delete(admin::revert_unlimited),
        )
        .route("/daily-reset", post(admin::run_daily_reset))
        .layer(ConcurrencyLimitLayer::new(ADMIN_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        .route("/accounts", post(accounts::create_account))
        .route("/credits/balance", get(accounts::get_balance))
        .route("/credits/redeem", post(redemption::redeem_code))
        .route("/items", get(orders::list_items))
        .route("/orders", get(orders::list_orders).post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .nest("/admin", admin_routes);

    let mut router = Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes);

    if let Some(dir) = local_files {
        router = router.nest_service("/files", ServeDir::new(dir));
    }

    router
        // Global middleware. Uploads are bounded by max_body_bytes, not
        // axum's 2MB extractor default.
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
