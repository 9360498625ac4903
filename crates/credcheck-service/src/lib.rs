//! Credcheck order fulfilment service.
//!
//! This crate wires the domain rules of `credcheck-core` and the persistence
//! of `credcheck-store` into a running service:
//!
//! - [`Ledger`]: order creation with compensation, completion, failure
//!   refunds, code redemption, admin account actions and the daily sweep
//! - [`storage`]: the file storage contract with Cloudinary and local adapters
//! - an axum HTTP API ([`create_router`])
//!
//! # Authentication
//!
//! The service supports two authentication methods:
//!
//! 1. **User JWTs** - HS256 bearer tokens whose `sub` is the user's UUID
//! 2. **Admin API key** - the `X-Admin-Key` header, with an optional
//!    `X-Admin-Id` recorded in logs

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers over the synchronous store are still async

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod ledger;
mod retry;
pub mod routes;
pub mod state;
pub mod storage;

pub use config::ServiceConfig;
pub use error::{ApiError, ServiceError};
pub use ledger::{
    AccountOverview, Ledger, LedgerOptions, OrderRequest, Redemption, SubscriberDay, SweepReport,
    Upload,
};
pub use routes::create_router;
pub use state::AppState;
pub use storage::{StorageError, StorageProvider, StoredObject};
