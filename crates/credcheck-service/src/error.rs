//! Service and API error types.
//!
//! [`ServiceError`] is what the ledger returns. [`ApiError`] is what handlers
//! return; it renders as `{"error": {"code", "message", "details"?}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use credcheck_core::{ItemId, LedgerError, OrderId, UserId};
use credcheck_store::StoreError;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Errors raised by the ledger service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A business rule rejected the operation. Nothing was changed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The storage backend failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The user has no account.
    #[error("account not found: {0}")]
    AccountNotFound(UserId),

    /// The user already has an account.
    #[error("account already exists: {0}")]
    AccountAlreadyExists(UserId),

    /// No such order (or not visible to the caller).
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// No such item, or the item is inactive.
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    /// The storage provider failed or timed out. Nothing was changed.
    #[error("upload failed: {0}")]
    UploadFailed(String),

    /// Concurrent writers kept winning.
    #[error("{entity} {id} is being modified concurrently, gave up after {attempts} attempts")]
    ConflictRetriesExhausted {
        /// Record kind.
        entity: &'static str,
        /// Record key.
        id: String,
        /// Attempts made.
        attempts: u32,
    },

    /// Undoing a half-created order failed. Needs manual reconciliation.
    #[error("compensation failed for order {order_id}: {reason}")]
    CompensationFailed {
        /// The order being undone.
        order_id: OrderId,
        /// What went wrong.
        reason: String,
    },

    /// The order is failed but its credits could not be returned. Needs
    /// manual reconciliation.
    #[error("refund for order {order_id} could not be applied: {reason}")]
    RefundFailed {
        /// The failed order.
        order_id: OrderId,
        /// What went wrong.
        reason: String,
    },
}

impl ServiceError {
    /// Whether this is an optimistic-concurrency conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_conflict())
    }
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists or concurrent modification.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The order cannot make the requested transition.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The redemption code was used before.
    #[error("already used: {0}")]
    AlreadyUsed(String),

    /// Insufficient credits.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Spendable credits.
        available: i64,
        /// Price.
        required: i64,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// The file storage provider failed.
    #[error("upload failed: {0}")]
    UploadFailed(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InvalidTransition(msg) => (
                StatusCode::CONFLICT,
                "invalid_transition",
                msg.clone(),
                None,
            ),
            Self::AlreadyUsed(msg) => (StatusCode::CONFLICT, "already_used", msg.clone(), None),
            Self::InsufficientCredits {
                available,
                required,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_credits",
                self.to_string(),
                Some(serde_json::json!({
                    "available": available,
                    "required": required
                })),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::UploadFailed(msg) => {
                tracing::warn!(error = %msg, "File upload failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "upload_failed",
                    "The file could not be stored, please retry".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCredits {
                available,
                required,
            } => Self::InsufficientCredits {
                available,
                required,
            },
            LedgerError::InvalidTransition { .. } => Self::InvalidTransition(err.to_string()),
            LedgerError::AlreadyUsed { .. } => Self::AlreadyUsed(err.to_string()),
            LedgerError::CodeNotFound { .. } => Self::NotFound(err.to_string()),
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidFailureReason { .. }
            | LedgerError::MissingArtifact(_)
            | LedgerError::NotUnlimited
            | LedgerError::InvalidId(_) => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            StoreError::AlreadyExists { .. } | StoreError::Conflict { .. } => {
                Self::Conflict(err.to_string())
            }
            StoreError::AlreadyUsed { .. } => Self::AlreadyUsed(err.to_string()),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Ledger(err) => err.into(),
            ServiceError::Store(err) => err.into(),
            ServiceError::AccountNotFound(_)
            | ServiceError::OrderNotFound(_)
            | ServiceError::ItemNotFound(_) => Self::NotFound(err.to_string()),
            ServiceError::AccountAlreadyExists(_) | ServiceError::ConflictRetriesExhausted { .. } => {
                Self::Conflict(err.to_string())
            }
            ServiceError::UploadFailed(msg) => Self::UploadFailed(msg),
            ServiceError::CompensationFailed { .. } | ServiceError::RefundFailed { .. } => {
                Self::Internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credcheck_core::OrderStatus;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn business_errors_map_to_client_statuses() {
        assert_eq!(
            status_of(LedgerError::InsufficientCredits {
                available: 1,
                required: 3
            }),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_of(LedgerError::InvalidTransition {
                from: OrderStatus::Completed,
                action: "fail"
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(LedgerError::InvalidFailureReason { min_len: 3 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ServiceError::AccountNotFound(UserId::generate())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ServiceError::UploadFailed("timeout".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn infrastructure_errors_hide_details() {
        assert_eq!(
            status_of(StoreError::Database("disk full".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ServiceError::RefundFailed {
                order_id: OrderId::generate_at(chrono::Utc::now()),
                reason: "conflict".into()
            }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn only_store_conflicts_are_retryable() {
        let conflict = ServiceError::Store(StoreError::Conflict {
            entity: "account",
            id: "x".into(),
        });
        assert!(conflict.is_conflict());
        assert!(!ServiceError::UploadFailed("x".into()).is_conflict());
    }
}
