//! Common test utilities for credcheck integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};

use credcheck_core::{
    Account, Item, ItemId, ManualClock, Order, OrderId, RedemptionCode, UserId,
};
use credcheck_service::auth::JwtClaims;
use credcheck_service::{
    create_router, AppState, Ledger, LedgerOptions, OrderRequest, ServiceConfig, StorageError,
    StorageProvider, StoredObject, Upload,
};
use credcheck_store::{
    AccountStore, ItemStore, MemoryStore, OrderStore, RedemptionStore, Result as StoreResult,
    Store, StoreError,
};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const ADMIN_KEY: &str = "test-admin-key";

/// 2026-05-04 10:00:00 UTC.
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
}

// ============================================================================
// Storage
// ============================================================================

/// How a [`ScriptedStorage`] answers uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Ok,
    Fail,
    Hang,
}

/// A storage provider that records uploads and answers as scripted.
pub struct ScriptedStorage {
    mode: Mutex<StorageMode>,
    uploads: Mutex<Vec<(String, String)>>,
}

impl ScriptedStorage {
    pub fn new(mode: StorageMode) -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(mode),
            uploads: Mutex::new(Vec::new()),
        })
    }

    pub fn set_mode(&self, mode: StorageMode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// `(folder, name)` of every attempted upload.
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageProvider for ScriptedStorage {
    async fn upload(
        &self,
        _bytes: Vec<u8>,
        suggested_name: &str,
        folder: &str,
    ) -> Result<StoredObject, StorageError> {
        self.uploads
            .lock()
            .unwrap()
            .push((folder.to_string(), suggested_name.to_string()));
        let mode = *self.mode.lock().unwrap();
        match mode {
            StorageMode::Ok => Ok(StoredObject {
                identifier: format!("{folder}/{suggested_name}"),
                url: format!("https://files.test/{folder}/{suggested_name}"),
            }),
            StorageMode::Fail => Err(StorageError::Rejected {
                status: 503,
                message: "storage unavailable".into(),
            }),
            StorageMode::Hang => std::future::pending().await,
        }
    }
}

// ============================================================================
// Fault-injecting store
// ============================================================================

/// A failure injected into the next `save_account` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Rejected as stale; nothing written.
    Conflict,
    /// Written, but the caller is told it failed.
    LostAck,
    /// Like `LostAck`, and another writer adds one regular credit before
    /// the caller gets the error back. Account saves only.
    LostAckThenForeignWrite,
    /// Not written; the caller is told it failed.
    Error,
}

/// Wraps a [`MemoryStore`] and injects faults into account and order saves.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    account_faults: Mutex<VecDeque<Fault>>,
    order_faults: Mutex<VecDeque<Fault>>,
    account_saves: AtomicUsize,
}

impl FaultyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next_account_save(&self, fault: Fault) {
        self.account_faults.lock().unwrap().push_back(fault);
    }

    pub fn fail_next_order_save(&self, fault: Fault) {
        self.order_faults.lock().unwrap().push_back(fault);
    }

    /// Calls to `save_account`, including failed ones.
    pub fn account_saves(&self) -> usize {
        self.account_saves.load(Ordering::SeqCst)
    }

    fn apply<T>(
        fault: Option<Fault>,
        entity: &'static str,
        id: String,
        write: impl FnOnce() -> StoreResult<T>,
    ) -> StoreResult<T> {
        match fault {
            None => write(),
            Some(Fault::Conflict) => Err(StoreError::Conflict { entity, id }),
            Some(Fault::Error) => Err(StoreError::Database("injected write failure".into())),
            Some(Fault::LostAck | Fault::LostAckThenForeignWrite) => {
                write()?;
                Err(StoreError::Database("injected lost acknowledgement".into()))
            }
        }
    }
}

impl AccountStore for FaultyStore {
    fn create_account(&self, account: &Account) -> StoreResult<Account> {
        self.inner.create_account(account)
    }

    fn get_account(&self, user_id: &UserId) -> StoreResult<Option<Account>> {
        self.inner.get_account(user_id)
    }

    fn save_account(&self, account: &Account) -> StoreResult<Account> {
        self.account_saves.fetch_add(1, Ordering::SeqCst);
        let fault = self.account_faults.lock().unwrap().pop_front();
        if fault == Some(Fault::LostAckThenForeignWrite) {
            let mut foreign = self.inner.save_account(account)?;
            foreign.regular_balance += 1;
            self.inner.save_account(&foreign)?;
            return Err(StoreError::Database("injected lost acknowledgement".into()));
        }
        Self::apply(fault, "account", account.user_id.to_string(), || {
            self.inner.save_account(account)
        })
    }

    fn find_accounts(&self, predicate: &dyn Fn(&Account) -> bool) -> StoreResult<Vec<Account>> {
        self.inner.find_accounts(predicate)
    }
}

impl OrderStore for FaultyStore {
    fn create_order(&self, order: &Order) -> StoreResult<Order> {
        self.inner.create_order(order)
    }

    fn get_order(&self, order_id: &OrderId) -> StoreResult<Option<Order>> {
        self.inner.get_order(order_id)
    }

    fn save_order(&self, order: &Order) -> StoreResult<Order> {
        let fault = self.order_faults.lock().unwrap().pop_front();
        Self::apply(fault, "order", order.id.to_string(), || {
            self.inner.save_order(order)
        })
    }

    fn delete_order(&self, order_id: &OrderId) -> StoreResult<()> {
        self.inner.delete_order(order_id)
    }

    fn list_orders_by_user_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Order>> {
        self.inner.list_orders_by_user_since(user_id, since)
    }

    fn find_order_by_idempotency_key(
        &self,
        user_id: &UserId,
        key: &str,
    ) -> StoreResult<Option<Order>> {
        self.inner.find_order_by_idempotency_key(user_id, key)
    }

    fn list_orders_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> StoreResult<Vec<Order>> {
        self.inner.list_orders_by_user(user_id, limit, offset)
    }

    fn list_recent_orders(&self, limit: usize) -> StoreResult<Vec<Order>> {
        self.inner.list_recent_orders(limit)
    }
}

impl RedemptionStore for FaultyStore {
    fn create_code(&self, code: &RedemptionCode) -> StoreResult<()> {
        self.inner.create_code(code)
    }

    fn find_code(&self, code: &str) -> StoreResult<Option<RedemptionCode>> {
        self.inner.find_code(code)
    }

    fn claim_code_if_unused(
        &self,
        code: &str,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<RedemptionCode> {
        self.inner.claim_code_if_unused(code, user_id, now)
    }

    fn list_codes(&self, limit: usize) -> StoreResult<Vec<RedemptionCode>> {
        self.inner.list_codes(limit)
    }
}

impl ItemStore for FaultyStore {
    fn put_item(&self, item: &Item) -> StoreResult<()> {
        self.inner.put_item(item)
    }

    fn get_item(&self, item_id: &ItemId) -> StoreResult<Option<Item>> {
        self.inner.get_item(item_id)
    }

    fn list_items(&self) -> StoreResult<Vec<Item>> {
        self.inner.list_items()
    }
}

// ============================================================================
// Ledger fixture
// ============================================================================

/// A ledger over a fault-injecting in-memory store, scripted storage and a
/// manual clock.
pub struct LedgerFixture {
    pub ledger: Ledger,
    pub store: Arc<FaultyStore>,
    pub storage: Arc<ScriptedStorage>,
    pub clock: Arc<ManualClock>,
}

impl LedgerFixture {
    pub fn new() -> Self {
        Self::with_options(test_options())
    }

    pub fn with_options(options: LedgerOptions) -> Self {
        let store = FaultyStore::new();
        let storage = ScriptedStorage::new(StorageMode::Ok);
        let clock = Arc::new(ManualClock::new(start_time()));
        let ledger = Ledger::new(
            store.clone() as Arc<dyn Store>,
            storage.clone() as Arc<dyn StorageProvider>,
            clock.clone(),
            options,
        );
        Self {
            ledger,
            store,
            storage,
            clock,
        }
    }

    /// Register a user with `regular` credits.
    pub async fn user_with_credits(&self, regular: i64) -> UserId {
        let user_id = UserId::generate();
        self.ledger.register_account(user_id).unwrap();
        if regular > 0 {
            self.ledger.grant_credits(&user_id, regular).await.unwrap();
        }
        user_id
    }

    /// Register an unlimited user.
    pub async fn unlimited_user(&self, regular: i64, daily_credits: i64, days: i64) -> UserId {
        let user_id = self.user_with_credits(regular).await;
        self.ledger
            .grant_unlimited(&user_id, daily_credits, days)
            .await
            .unwrap();
        user_id
    }

    pub fn item(&self, price: i64) -> ItemId {
        self.ledger.create_item("Turnitin check", "", price).unwrap().id
    }

    pub fn account(&self, user_id: &UserId) -> Account {
        self.store.inner.get_account(user_id).unwrap().unwrap()
    }

    pub fn request(&self, user_id: UserId, item_id: ItemId) -> OrderRequest {
        OrderRequest {
            user_id,
            item_id,
            upload: upload("essay.docx"),
            idempotency_key: None,
        }
    }
}

/// Fast, deterministic ledger options.
pub fn test_options() -> LedgerOptions {
    LedgerOptions {
        upload_timeout: Duration::from_millis(200),
        retry_base_delay: Duration::from_millis(1),
        ..LedgerOptions::default()
    }
}

pub fn upload(filename: &str) -> Upload {
    Upload {
        filename: filename.to_string(),
        bytes: b"document body".to_vec(),
    }
}

// ============================================================================
// HTTP harness
// ============================================================================

/// Test harness containing everything needed for HTTP tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Shared state, for arranging data directly through the ledger.
    pub state: AppState,
    /// The clock the service reads.
    pub clock: Arc<ManualClock>,
    /// Uploads seen by the service.
    pub storage: Arc<ScriptedStorage>,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

impl TestHarness {
    /// Create a new test harness with a fresh in-memory store.
    pub fn new() -> Self {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let storage = ScriptedStorage::new(StorageMode::Ok);
        let clock = Arc::new(ManualClock::new(start_time()));

        let config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            jwt_secret: Some(JWT_SECRET.into()),
            admin_api_key: Some(ADMIN_KEY.into()),
            upload_timeout_seconds: 1,
            ..ServiceConfig::default()
        };

        let state = AppState::new(store, storage.clone(), clock.clone(), config);
        let router: Router = create_router(state.clone());

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            state,
            clock,
            storage,
            test_user_id: UserId::generate(),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.state.ledger
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> String {
        bearer_for(&self.test_user_id)
    }

    /// Register the test user and give them credits.
    pub async fn funded_user(&self, regular: i64) {
        self.ledger().register_account(self.test_user_id).unwrap();
        if regular > 0 {
            self.ledger()
                .grant_credits(&self.test_user_id, regular)
                .await
                .unwrap();
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A valid bearer header for `user_id`.
pub fn bearer_for(user_id: &UserId) -> String {
    let claims = JwtClaims {
        sub: user_id.to_string(),
        exp: Utc::now().timestamp() + 3600,
        iat: Some(Utc::now().timestamp()),
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign token");
    format!("Bearer {token}")
}
