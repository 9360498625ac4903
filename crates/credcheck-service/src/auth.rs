//! Authentication extractors.
//!
//! This module provides extractors for:
//! - `AuthUser` - End-user authentication via HS256 JWT
//! - `AdminAuth` - Administrator authentication via API key

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use credcheck_core::UserId;

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

/// An authenticated user extracted from a bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user ID.
    pub user_id: UserId,
}

/// JWT claims accepted for user requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Expiration time.
    pub exp: i64,
    /// Issued at.
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Validate a bearer token and return its user.
///
/// # Errors
///
/// Returns [`ApiError::Unauthorized`] if the signature, expiry or subject is
/// invalid.
pub fn verify_token(token: &str, secret: &str) -> Result<UserId, ApiError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<JwtClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            ApiError::Unauthorized
        })?;

    data.claims
        .sub
        .parse::<UserId>()
        .map_err(|_| ApiError::Unauthorized)
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let secret = state
            .config
            .jwt_secret
            .as_deref()
            .ok_or(ApiError::Unauthorized)?;

        let user_id = verify_token(token, secret)?;
        Ok(Self { user_id })
    }
}

/// An authenticated administrator.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Admin identifier for audit logs, from `X-Admin-Id`.
    pub admin_id: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get("x-admin-key")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let expected_key = state
            .config
            .admin_api_key
            .as_deref()
            .ok_or(ApiError::Unauthorized)?;

        if !constant_time_eq(api_key, expected_key) {
            tracing::warn!("Rejected admin request with invalid key");
            return Err(ApiError::Unauthorized);
        }

        let admin_id = parts
            .headers
            .get("x-admin-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self { admin_id })
    }
}
