//! `RocksDB` storage implementation.
//!
//! Values are CBOR-encoded. Reads go straight to the database. Every write
//! that depends on what is currently stored (version checks, uniqueness,
//! claims) runs under `write_lock`, and multi-key updates are committed in a
//! single `WriteBatch`.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use credcheck_core::{Account, Item, ItemId, Order, OrderId, RedemptionCode, UserId};

use crate::entity;
use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{AccountStore, ItemStore, OrderStore, RedemptionStore};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

fn db_err(e: rocksdb::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(db_err)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(db_err)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_value<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db
            .put_cf(&cf, key, Self::serialize(value)?)
            .map_err(db_err)
    }

    fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(cf_name)?;
        Ok(self.db.get_cf(&cf, key).map_err(db_err)?.is_some())
    }

    fn scan_all<T: serde::de::DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .iterator_cf(&cf, IteratorMode::Start)
            .map(|item| {
                let (_, value) = item.map_err(db_err)?;
                Self::deserialize(&value)
            })
            .collect()
    }

    /// Order IDs of a user from the index, oldest first, starting at `from`.
    fn user_order_ids(&self, user_id: &UserId, from: Option<OrderId>) -> Result<Vec<OrderId>> {
        let cf_by_user = self.cf(cf::ORDERS_BY_USER)?;
        let prefix = keys::user_orders_prefix(user_id);
        let start = from.map_or_else(|| prefix.clone(), |id| keys::user_order_key(user_id, &id));

        let mut ids = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf_by_user, IteratorMode::From(&start, Direction::Forward))
        {
            let (key, _) = item.map_err(db_err)?;
            if !key.starts_with(&prefix) {
                break;
            }
            if let Some(id) = keys::order_id_from_user_key(&key) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn load_orders(&self, ids: impl IntoIterator<Item = OrderId>) -> Result<Vec<Order>> {
        let mut orders = Vec::new();
        for id in ids {
            if let Some(order) = self.get_order(&id)? {
                orders.push(order);
            }
        }
        Ok(orders)
    }
}

impl AccountStore for RocksStore {
    fn create_account(&self, account: &Account) -> Result<Account> {
        let _guard = self.write_lock.lock();
        let key = keys::account_key(&account.user_id);
        if self.exists(cf::ACCOUNTS, &key)? {
            return Err(StoreError::already_exists(entity::ACCOUNT, account.user_id));
        }
        let mut stored = account.clone();
        stored.version = 1;
        self.put_value(cf::ACCOUNTS, &key, &stored)?;
        Ok(stored)
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        self.get_value(cf::ACCOUNTS, &keys::account_key(user_id))
    }

    fn save_account(&self, account: &Account) -> Result<Account> {
        let _guard = self.write_lock.lock();
        let current = self
            .get_account(&account.user_id)?
            .ok_or_else(|| StoreError::not_found(entity::ACCOUNT, account.user_id))?;
        if current.version != account.version {
            return Err(StoreError::conflict(entity::ACCOUNT, account.user_id));
        }
        let mut stored = account.clone();
        stored.version += 1;
        self.put_value(cf::ACCOUNTS, &keys::account_key(&stored.user_id), &stored)?;
        Ok(stored)
    }

    fn find_accounts(&self, predicate: &dyn Fn(&Account) -> bool) -> Result<Vec<Account>> {
        Ok(self
            .scan_all::<Account>(cf::ACCOUNTS)?
            .into_iter()
            .filter(|account| predicate(account))
            .collect())
    }
}

impl OrderStore for RocksStore {
    fn create_order(&self, order: &Order) -> Result<Order> {
        let _guard = self.write_lock.lock();
        let cf_orders = self.cf(cf::ORDERS)?;
        let cf_by_user = self.cf(cf::ORDERS_BY_USER)?;
        let cf_idem = self.cf(cf::ORDER_IDEMPOTENCY)?;

        let order_key = keys::order_key(&order.id);
        if self.exists(cf::ORDERS, &order_key)? {
            return Err(StoreError::already_exists(entity::ORDER, order.id));
        }

        let mut stored = order.clone();
        stored.version = 1;

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_orders, &order_key, Self::serialize(&stored)?);
        batch.put_cf(
            &cf_by_user,
            keys::user_order_key(&order.user_id, &order.id),
            [],
        );
        if let Some(key) = &order.idempotency_key {
            let idem_key = keys::idempotency_key(&order.user_id, key);
            if self.exists(cf::ORDER_IDEMPOTENCY, &idem_key)? {
                return Err(StoreError::already_exists(entity::IDEMPOTENCY_KEY, key));
            }
            batch.put_cf(&cf_idem, idem_key, order.id.to_bytes());
        }

        self.db.write(batch).map_err(db_err)?;
        Ok(stored)
    }

    fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>> {
        self.get_value(cf::ORDERS, &keys::order_key(order_id))
    }

    fn save_order(&self, order: &Order) -> Result<Order> {
        let _guard = self.write_lock.lock();
        let current = self
            .get_order(&order.id)?
            .ok_or_else(|| StoreError::not_found(entity::ORDER, order.id))?;
        if current.version != order.version {
            return Err(StoreError::conflict(entity::ORDER, order.id));
        }
        let mut stored = order.clone();
        stored.version += 1;
        self.put_value(cf::ORDERS, &keys::order_key(&stored.id), &stored)?;
        Ok(stored)
    }

    fn delete_order(&self, order_id: &OrderId) -> Result<()> {
        let _guard = self.write_lock.lock();
        let order = self
            .get_order(order_id)?
            .ok_or_else(|| StoreError::not_found(entity::ORDER, order_id))?;

        let cf_orders = self.cf(cf::ORDERS)?;
        let cf_by_user = self.cf(cf::ORDERS_BY_USER)?;
        let cf_idem = self.cf(cf::ORDER_IDEMPOTENCY)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&cf_orders, keys::order_key(order_id));
        batch.delete_cf(&cf_by_user, keys::user_order_key(&order.user_id, order_id));
        if let Some(key) = &order.idempotency_key {
            batch.delete_cf(&cf_idem, keys::idempotency_key(&order.user_id, key));
        }
        self.db.write(batch).map_err(db_err)
    }

    fn list_orders_by_user_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let ids = self.user_order_ids(user_id, Some(OrderId::lower_bound(since)))?;
        Ok(self
            .load_orders(ids)?
            .into_iter()
            .filter(|order| order.created_at >= since)
            .collect())
    }

    fn find_order_by_idempotency_key(&self, user_id: &UserId, key: &str) -> Result<Option<Order>> {
        let cf_idem = self.cf(cf::ORDER_IDEMPOTENCY)?;
        let Some(bytes) = self
            .db
            .get_cf(&cf_idem, keys::idempotency_key(user_id, key))
            .map_err(db_err)?
        else {
            return Ok(None);
        };
        let bytes: [u8; 16] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Serialization("malformed idempotency index entry".into()))?;
        self.get_order(&OrderId::from_bytes(bytes))
    }

    fn list_orders_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>> {
        let mut ids = self.user_order_ids(user_id, None)?;
        ids.reverse();
        self.load_orders(ids.into_iter().skip(offset).take(limit))
    }

    fn list_recent_orders(&self, limit: usize) -> Result<Vec<Order>> {
        let cf_orders = self.cf(cf::ORDERS)?;
        self.db
            .iterator_cf(&cf_orders, IteratorMode::End)
            .take(limit)
            .map(|item| {
                let (_, value) = item.map_err(db_err)?;
                Self::deserialize(&value)
            })
            .collect()
    }
}

impl RedemptionStore for RocksStore {
    fn create_code(&self, code: &RedemptionCode) -> Result<()> {
        let _guard = self.write_lock.lock();
        let key = keys::code_key(&code.code);
        if self.exists(cf::CODES, &key)? {
            return Err(StoreError::already_exists(entity::REDEMPTION_CODE, &code.code));
        }
        self.put_value(cf::CODES, &key, code)
    }

    fn find_code(&self, code: &str) -> Result<Option<RedemptionCode>> {
        self.get_value(cf::CODES, &keys::code_key(code))
    }

    fn claim_code_if_unused(
        &self,
        code: &str,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<RedemptionCode> {
        let _guard = self.write_lock.lock();
        let mut stored = self
            .find_code(code)?
            .ok_or_else(|| StoreError::not_found(entity::REDEMPTION_CODE, code))?;
        stored
            .claim(*user_id, now)
            .map_err(|_| StoreError::AlreadyUsed {
                code: code.to_string(),
            })?;
        self.put_value(cf::CODES, &keys::code_key(code), &stored)?;
        Ok(stored)
    }

    fn list_codes(&self, limit: usize) -> Result<Vec<RedemptionCode>> {
        let mut codes = self.scan_all::<RedemptionCode>(cf::CODES)?;
        codes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.code.cmp(&b.code)));
        codes.truncate(limit);
        Ok(codes)
    }
}

impl ItemStore for RocksStore {
    fn put_item(&self, item: &Item) -> Result<()> {
        self.put_value(cf::ITEMS, &keys::item_key(&item.id), item)
    }

    fn get_item(&self, item_id: &ItemId) -> Result<Option<Item>> {
        self.get_value(cf::ITEMS, &keys::item_key(item_id))
    }

    fn list_items(&self) -> Result<Vec<Item>> {
        let mut items = self.scan_all::<Item>(cf::ITEMS)?;
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.title.cmp(&b.title)));
        Ok(items)
    }
}
