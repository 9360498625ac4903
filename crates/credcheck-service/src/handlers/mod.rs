//! API handlers.

pub mod accounts;
pub mod admin;
pub mod health;
pub mod orders;
pub mod redemption;

use std::str::FromStr;

use axum::extract::multipart::{Field, MultipartError};
use serde::Deserialize;

use credcheck_core::IdError;

use crate::error::ApiError;
use crate::ledger::Upload;

/// Parse a path identifier, answering 400 on garbage.
fn parse_id<T>(raw: &str) -> Result<T, ApiError>
where
    T: FromStr<Err = IdError>,
{
    raw.parse()
        .map_err(|e: IdError| ApiError::BadRequest(format!("{e}: {raw}")))
}

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Maximum number of entries to return.
    pub limit: Option<usize>,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

impl PageQuery {
    fn limit_or(&self, default: usize, max: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, max)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self::BadRequest(format!("invalid multipart body: {err}"))
    }
}

/// Read a multipart file field into an [`Upload`].
async fn read_upload(field: Field<'_>) -> Result<Upload, ApiError> {
    let filename = field
        .file_name()
        .map(str::to_string)
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("file field has no file name".into()))?;
    let bytes = field.bytes().await?.to_vec();
    if bytes.is_empty() {
        return Err(ApiError::BadRequest(format!("{filename} is empty")));
    }
    Ok(Upload { filename, bytes })
}
