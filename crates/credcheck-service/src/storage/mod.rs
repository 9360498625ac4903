//! File storage providers.
//!
//! Orders carry references to files kept by an external provider: the user's
//! submitted document and the admin's result reports. The ledger only sees the
//! [`StorageProvider`] trait; `CloudinaryStorage` and `LocalStorage` are the
//! shipped adapters.

pub mod cloudinary;
pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use cloudinary::{CloudinaryConfig, CloudinaryStorage};
pub use local::LocalStorage;

/// Where an uploaded file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Provider-specific identifier (e.g. Cloudinary public ID).
    pub identifier: String,
    /// Public URL of the file.
    pub url: String,
}

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Local I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the upload.
    #[error("storage provider error: {status} - {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The file name or folder cannot be stored safely.
    #[error("invalid file name: {0}")]
    InvalidName(String),
}

/// An external file store.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Store `bytes` as `suggested_name` inside `folder`.
    async fn upload(
        &self,
        bytes: Vec<u8>,
        suggested_name: &str,
        folder: &str,
    ) -> Result<StoredObject, StorageError>;
}

/// Insert a `_YYYYMMDD_HHMMSS` UTC stamp before the file extension.
///
/// Only the final path component of `original` is kept, and characters other
/// than ASCII alphanumerics, `-`, `_` and `.` become `_`.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use credcheck_service::storage::timestamped_filename;
///
/// let at = Utc.with_ymd_and_hms(2026, 3, 9, 7, 5, 1).unwrap();
/// assert_eq!(timestamped_filename("essay.final.docx", at), "essay.final_20260309_070501.docx");
/// assert_eq!(timestamped_filename("README", at), "README_20260309_070501");
/// ```
#[must_use]
pub fn timestamped_filename(original: &str, at: DateTime<Utc>) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    let base: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stamp = at.format("%Y%m%d_%H%M%S");

    match base.rfind('.') {
        Some(dot) if dot > 0 => format!("{}_{stamp}{}", &base[..dot], &base[dot..]),
        _ if base.is_empty() => format!("upload_{stamp}"),
        _ => format!("{base}_{stamp}"),
    }
}
