//! Application state.

use std::sync::Arc;

use credcheck_core::{Clock, SystemClock};
use credcheck_store::Store;

use crate::config::ServiceConfig;
use crate::ledger::Ledger;
use crate::storage::{CloudinaryStorage, LocalStorage, StorageError, StorageProvider};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The credit ledger.
    pub ledger: Arc<Ledger>,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create state over explicit collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        storage: Arc<dyn StorageProvider>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Self {
        if config.jwt_secret.is_none() {
            tracing::warn!("JWT_SECRET not configured - user requests will be rejected");
        }
        if config.admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not configured - admin requests will be rejected");
        }

        let ledger = Ledger::new(store, storage, clock, config.ledger_options());
        Self {
            ledger: Arc::new(ledger),
            config,
        }
    }

    /// Create state for production: the system clock and the storage
    /// provider selected by the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Cloudinary client cannot be built.
    pub fn from_config(store: Arc<dyn Store>, config: ServiceConfig) -> Result<Self, StorageError> {
        let storage: Arc<dyn StorageProvider> = match &config.cloudinary {
            Some(cloudinary) => {
                tracing::info!(cloud_name = %cloudinary.cloud_name, "Cloudinary storage enabled");
                Arc::new(CloudinaryStorage::new(cloudinary.clone())?)
            }
            None => {
                tracing::warn!(
                    storage_dir = %config.storage_dir,
                    "Cloudinary not configured - storing files locally"
                );
                Arc::new(LocalStorage::new(
                    config.storage_dir.clone(),
                    config.public_files_url.clone(),
                ))
            }
        };

        Ok(Self::new(store, storage, Arc::new(SystemClock), config))
    }
}
