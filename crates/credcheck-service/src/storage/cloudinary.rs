//! Cloudinary upload client.
//!
//! Uses the signed upload API. The account's signature algorithm must be set
//! to SHA-256.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use super::{StorageError, StorageProvider, StoredObject};
use crate::crypto::cloudinary_signature;

/// Default Cloudinary API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";

/// Cloudinary credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudinaryConfig {
    /// Cloud name.
    pub cloud_name: String,
    /// API key.
    pub api_key: String,
    /// API secret used to sign uploads.
    pub api_secret: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct CloudinaryErrorResponse {
    error: CloudinaryErrorBody,
}

#[derive(Debug, Deserialize)]
struct CloudinaryErrorBody {
    message: String,
}

/// Cloudinary-backed [`StorageProvider`].
#[derive(Debug, Clone)]
pub struct CloudinaryStorage {
    client: Client,
    base_url: String,
    config: CloudinaryConfig,
}

impl CloudinaryStorage {
    /// Create a client for the public Cloudinary API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: CloudinaryConfig) -> Result<Self, StorageError> {
        Self::with_base_url(config, DEFAULT_API_BASE)
    }

    /// Create a client against a custom endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base_url(
        config: CloudinaryConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            config,
        })
    }
}

#[async_trait]
impl StorageProvider for CloudinaryStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        suggested_name: &str,
        folder: &str,
    ) -> Result<StoredObject, StorageError> {
        let url = format!(
            "{}/v1_1/{}/auto/upload",
            self.base_url, self.config.cloud_name
        );
        let timestamp = chrono::Utc::now().timestamp().to_string();

        let params = [
            ("access_mode", "public"),
            ("folder", folder),
            ("overwrite", "false"),
            ("public_id", suggested_name),
            ("timestamp", timestamp.as_str()),
            ("type", "upload"),
        ];
        let signature = cloudinary_signature(&params, &self.config.api_secret);

        let mut form = Form::new()
            .part("file", Part::bytes(bytes).file_name(suggested_name.to_string()))
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature);
        for (name, value) in params {
            if !value.is_empty() {
                form = form.text(name, value.to_string());
            }
        }

        tracing::debug!(folder = %folder, public_id = %suggested_name, "Uploading to Cloudinary");

        let response = self.client.post(&url).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<CloudinaryErrorResponse>(&body)
                .map_or(body, |e| e.error.message);
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let uploaded: UploadResponse = response.json().await?;
        tracing::info!(public_id = %uploaded.public_id, "File uploaded to Cloudinary");

        Ok(StoredObject {
            identifier: uploaded.public_id,
            url: uploaded.secure_url,
        })
    }
}
