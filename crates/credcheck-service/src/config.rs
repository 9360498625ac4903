//! Service configuration.

use std::path::Path;
use std::time::Duration;

use credcheck_core::CompletionPolicy;

use crate::ledger::LedgerOptions;
use crate::storage::CloudinaryConfig;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/credcheck").
    pub data_dir: String,

    /// HS256 secret for user tokens. Without it every user request is rejected.
    pub jwt_secret: Option<String>,

    /// Admin API key. Without it every admin request is rejected.
    pub admin_api_key: Option<String>,

    /// Cloudinary credentials. Local storage is used when absent.
    pub cloudinary: Option<CloudinaryConfig>,

    /// Root directory for local file storage (default: "/data/credcheck-files").
    pub storage_dir: String,

    /// Base URL local files are served from.
    pub public_files_url: String,

    /// Folder for user submissions.
    pub upload_folder: String,

    /// Folder for admin result files.
    pub results_folder: String,

    /// Upload timeout in seconds.
    pub upload_timeout_seconds: u64,

    /// Retries after an optimistic-concurrency conflict.
    pub max_conflict_retries: u32,

    /// What an order needs before completion.
    pub completion_policy: CompletionPolicy,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            jwt_secret: std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok().filter(|s| !s.is_empty()),
            cloudinary: load_cloudinary_secrets(),
            storage_dir: std::env::var("STORAGE_DIR").unwrap_or(defaults.storage_dir),
            public_files_url: std::env::var("PUBLIC_FILES_URL")
                .unwrap_or(defaults.public_files_url),
            upload_folder: std::env::var("UPLOAD_FOLDER").unwrap_or(defaults.upload_folder),
            results_folder: std::env::var("RESULTS_FOLDER").unwrap_or(defaults.results_folder),
            upload_timeout_seconds: parse_env("UPLOAD_TIMEOUT_SECONDS")
                .unwrap_or(defaults.upload_timeout_seconds),
            max_conflict_retries: parse_env("MAX_CONFLICT_RETRIES")
                .unwrap_or(defaults.max_conflict_retries),
            completion_policy: std::env::var("COMPLETION_POLICY")
                .ok()
                .and_then(|s| {
                    s.parse()
                        .map_err(|e: String| tracing::warn!(error = %e, "Ignoring COMPLETION_POLICY"))
                        .ok()
                })
                .unwrap_or(defaults.completion_policy),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: parse_env("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: parse_env("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
        }
    }

    /// Ledger tunables derived from this configuration.
    #[must_use]
    pub fn ledger_options(&self) -> LedgerOptions {
        LedgerOptions {
            upload_folder: self.upload_folder.clone(),
            results_folder: self.results_folder.clone(),
            upload_timeout: Duration::from_secs(self.upload_timeout_seconds),
            max_conflict_retries: self.max_conflict_retries,
            completion_policy: self.completion_policy,
            ..LedgerOptions::default()
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Load Cloudinary credentials from file or environment.
fn load_cloudinary_secrets() -> Option<CloudinaryConfig> {
    let secret_paths = [
        ".secrets/cloudinary.json",
        "credcheck/.secrets/cloudinary.json",
        "../.secrets/cloudinary.json",
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<CloudinaryConfig>(path) {
            tracing::info!(path = %path, "Loaded Cloudinary secrets from file");
            return Some(secrets);
        }
    }

    tracing::debug!("Cloudinary secrets file not found, using environment variables");
    Some(CloudinaryConfig {
        cloud_name: std::env::var("CLOUDINARY_CLOUD_NAME").ok()?,
        api_key: std::env::var("CLOUDINARY_API_KEY").ok()?,
        api_secret: std::env::var("CLOUDINARY_API_SECRET").ok()?,
    })
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/credcheck".into(),
            jwt_secret: None,
            admin_api_key: None,
            cloudinary: None,
            storage_dir: "/data/credcheck-files".into(),
            public_files_url: "http://localhost:8080/files".into(),
            upload_folder: "credcheck-uploads".into(),
            results_folder: "credcheck-results".into(),
            upload_timeout_seconds: 60,
            max_conflict_retries: 5,
            completion_policy: CompletionPolicy::AnyReport,
            cors_origins: vec!["*".into()],
            max_body_bytes: 20 * 1024 * 1024, // 20MB
            request_timeout_seconds: 120,
        }
    }
}
