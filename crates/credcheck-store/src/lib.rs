//! Storage layer for credcheck.
//!
//! This crate defines the persistence contracts for accounts, orders,
//! redemption codes and items, and ships two backends:
//!
//! - [`MemoryStore`]: `HashMap`/`BTreeMap` tables behind a `parking_lot::RwLock`.
//! - `RocksStore` (feature `rocksdb-backend`): `RocksDB` with column families
//!   and CBOR-encoded values.
//!
//! # Optimistic concurrency
//!
//! Accounts and orders carry a `version`. `create_*` stores version `1`.
//! `save_*` succeeds only if the stored version equals the one on the record
//! being saved; it then stores `version + 1` and returns the stored record.
//! A stale write fails with [`StoreError::Conflict`] and changes nothing, so
//! callers re-read and retry.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use credcheck_core::{Account, UserId};
//! use credcheck_store::{AccountStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let account = store.create_account(&Account::new(UserId::generate(), Utc::now())).unwrap();
//!
//! let mut update = account.clone();
//! update.regular_balance = 10;
//! let saved = store.save_account(&update).unwrap();
//! assert_eq!(saved.version, account.version + 1);
//!
//! // Saving the old revision again is rejected.
//! assert!(store.save_account(&update).unwrap_err().is_conflict());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use credcheck_core::{Account, Item, ItemId, Order, OrderId, RedemptionCode, UserId};

/// Record kind names used in [`StoreError`] values.
pub mod entity {
    /// Accounts.
    pub const ACCOUNT: &str = "account";
    /// Orders.
    pub const ORDER: &str = "order";
    /// Orders looked up through their idempotency key.
    pub const IDEMPOTENCY_KEY: &str = "idempotency key";
    /// Redemption codes.
    pub const REDEMPTION_CODE: &str = "redemption code";
    /// Items.
    pub const ITEM: &str = "item";
}

/// Account persistence.
pub trait AccountStore: Send + Sync {
    /// Insert a new account. The stored copy (version `1`) is returned.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the user already has an account.
    fn create_account(&self, account: &Account) -> Result<Account>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// Replace an account if its version is current.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::Conflict` if the stored version differs.
    fn save_account(&self, account: &Account) -> Result<Account>;

    /// All accounts matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_accounts(&self, predicate: &dyn Fn(&Account) -> bool) -> Result<Vec<Account>>;
}

/// Order persistence.
pub trait OrderStore: Send + Sync {
    /// Insert a new order. The stored copy (version `1`) is returned.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the ID is taken or the user
    /// already has an order with the same idempotency key.
    fn create_order(&self, order: &Order) -> Result<Order>;

    /// Get an order by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>>;

    /// Replace an order if its version is current.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the order doesn't exist.
    /// - `StoreError::Conflict` if the stored version differs.
    fn save_order(&self, order: &Order) -> Result<Order>;

    /// Remove an order and its index entries.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the order doesn't exist.
    fn delete_order(&self, order_id: &OrderId) -> Result<()>;

    /// A user's orders created at or after `since`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_orders_by_user_since(&self, user_id: &UserId, since: DateTime<Utc>)
        -> Result<Vec<Order>>;

    /// The user's order created with `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_order_by_idempotency_key(&self, user_id: &UserId, key: &str) -> Result<Option<Order>>;

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_orders_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>>;

    /// The most recent orders across all users, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_recent_orders(&self, limit: usize) -> Result<Vec<Order>>;
}

/// Redemption code persistence.
pub trait RedemptionStore: Send + Sync {
    /// Insert a new code.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the code exists.
    fn create_code(&self, code: &RedemptionCode) -> Result<()>;

    /// Look up a normalized code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_code(&self, code: &str) -> Result<Option<RedemptionCode>>;

    /// Atomically mark a code used. Exactly one caller wins a race.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the code doesn't exist.
    /// - `StoreError::AlreadyUsed` if it was claimed before.
    fn claim_code_if_unused(
        &self,
        code: &str,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<RedemptionCode>;

    /// Codes, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_codes(&self, limit: usize) -> Result<Vec<RedemptionCode>>;
}

/// Item catalogue persistence.
pub trait ItemStore: Send + Sync {
    /// Insert or replace an item.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_item(&self, item: &Item) -> Result<()>;

    /// Get an item by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_item(&self, item_id: &ItemId) -> Result<Option<Item>>;

    /// All items, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_items(&self) -> Result<Vec<Item>>;
}

/// Everything the service needs from a backend.
pub trait Store: AccountStore + OrderStore + RedemptionStore + ItemStore {}

impl<T> Store for T where T: AccountStore + OrderStore + RedemptionStore + ItemStore {}
