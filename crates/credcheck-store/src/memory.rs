//! In-memory storage implementation.
//!
//! All tables live behind a single `RwLock`, so every trait method is atomic
//! with respect to every other one.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use credcheck_core::{Account, Item, ItemId, Order, OrderId, RedemptionCode, UserId};

use crate::entity;
use crate::error::{Result, StoreError};
use crate::{AccountStore, ItemStore, OrderStore, RedemptionStore};

#[derive(Default)]
struct Tables {
    accounts: HashMap<UserId, Account>,
    orders: BTreeMap<OrderId, Order>,
    idempotency: HashMap<(UserId, String), OrderId>,
    codes: HashMap<String, RedemptionCode>,
    items: HashMap<ItemId, Item>,
}

/// Volatile storage backend.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountStore for MemoryStore {
    fn create_account(&self, account: &Account) -> Result<Account> {
        let mut tables = self.tables.write();
        if tables.accounts.contains_key(&account.user_id) {
            return Err(StoreError::already_exists(entity::ACCOUNT, account.user_id));
        }
        let mut stored = account.clone();
        stored.version = 1;
        tables.accounts.insert(stored.user_id, stored.clone());
        Ok(stored)
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        Ok(self.tables.read().accounts.get(user_id).cloned())
    }

    fn save_account(&self, account: &Account) -> Result<Account> {
        let mut tables = self.tables.write();
        let current = tables
            .accounts
            .get_mut(&account.user_id)
            .ok_or_else(|| StoreError::not_found(entity::ACCOUNT, account.user_id))?;
        if current.version != account.version {
            return Err(StoreError::conflict(entity::ACCOUNT, account.user_id));
        }
        let mut stored = account.clone();
        stored.version += 1;
        *current = stored.clone();
        Ok(stored)
    }

    fn find_accounts(&self, predicate: &dyn Fn(&Account) -> bool) -> Result<Vec<Account>> {
        Ok(self
            .tables
            .read()
            .accounts
            .values()
            .filter(|account| predicate(account))
            .cloned()
            .collect())
    }
}

impl OrderStore for MemoryStore {
    fn create_order(&self, order: &Order) -> Result<Order> {
        let mut tables = self.tables.write();
        if tables.orders.contains_key(&order.id) {
            return Err(StoreError::already_exists(entity::ORDER, order.id));
        }
        if let Some(key) = &order.idempotency_key {
            let index_key = (order.user_id, key.clone());
            if tables.idempotency.contains_key(&index_key) {
                return Err(StoreError::already_exists(entity::IDEMPOTENCY_KEY, key));
            }
            tables.idempotency.insert(index_key, order.id);
        }
        let mut stored = order.clone();
        stored.version = 1;
        tables.orders.insert(stored.id, stored.clone());
        Ok(stored)
    }

    fn get_order(&self, order_id: &OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().orders.get(order_id).cloned())
    }

    fn save_order(&self, order: &Order) -> Result<Order> {
        let mut tables = self.tables.write();
        let current = tables
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| StoreError::not_found(entity::ORDER, order.id))?;
        if current.version != order.version {
            return Err(StoreError::conflict(entity::ORDER, order.id));
        }
        let mut stored = order.clone();
        stored.version += 1;
        *current = stored.clone();
        Ok(stored)
    }

    fn delete_order(&self, order_id: &OrderId) -> Result<()> {
        let mut tables = self.tables.write();
        let order = tables
            .orders
            .remove(order_id)
            .ok_or_else(|| StoreError::not_found(entity::ORDER, order_id))?;
        if let Some(key) = order.idempotency_key {
            tables.idempotency.remove(&(order.user_id, key));
        }
        Ok(())
    }

    fn list_orders_by_user_since(
        &self,
        user_id: &UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        Ok(self
            .tables
            .read()
            .orders
            .range(OrderId::lower_bound(since)..)
            .map(|(_, order)| order)
            .filter(|order| order.user_id == *user_id && order.created_at >= since)
            .cloned()
            .collect())
    }

    fn find_order_by_idempotency_key(&self, user_id: &UserId, key: &str) -> Result<Option<Order>> {
        let tables = self.tables.read();
        Ok(tables
            .idempotency
            .get(&(*user_id, key.to_string()))
            .and_then(|order_id| tables.orders.get(order_id))
            .cloned())
    }

    fn list_orders_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>> {
        Ok(self
            .tables
            .read()
            .orders
            .values()
            .rev()
            .filter(|order| order.user_id == *user_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn list_recent_orders(&self, limit: usize) -> Result<Vec<Order>> {
        Ok(self
            .tables
            .read()
            .orders
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

impl RedemptionStore for MemoryStore {
    fn create_code(&self, code: &RedemptionCode) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.codes.contains_key(&code.code) {
            return Err(StoreError::already_exists(entity::REDEMPTION_CODE, &code.code));
        }
        tables.codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    fn find_code(&self, code: &str) -> Result<Option<RedemptionCode>> {
        Ok(self.tables.read().codes.get(code).cloned())
    }

    fn claim_code_if_unused(
        &self,
        code: &str,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<RedemptionCode> {
        let mut tables = self.tables.write();
        let stored = tables
            .codes
            .get_mut(code)
            .ok_or_else(|| StoreError::not_found(entity::REDEMPTION_CODE, code))?;
        stored
            .claim(*user_id, now)
            .map_err(|_| StoreError::AlreadyUsed {
                code: code.to_string(),
            })?;
        Ok(stored.clone())
    }

    fn list_codes(&self, limit: usize) -> Result<Vec<RedemptionCode>> {
        let mut codes: Vec<_> = self.tables.read().codes.values().cloned().collect();
        codes.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.code.cmp(&b.code)));
        codes.truncate(limit);
        Ok(codes)
    }
}

impl ItemStore for MemoryStore {
    fn put_item(&self, item: &Item) -> Result<()> {
        self.tables.write().items.insert(item.id, item.clone());
        Ok(())
    }

    fn get_item(&self, item_id: &ItemId) -> Result<Option<Item>> {
        Ok(self.tables.read().items.get(item_id).cloned())
    }

    fn list_items(&self) -> Result<Vec<Item>> {
        let mut items: Vec<_> = self.tables.read().items.values().cloned().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.title.cmp(&b.title)));
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use credcheck_core::{ConsumptionPlan, FileRef};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 2, 8, 0, 0).unwrap()
    }

    fn order_at(user_id: UserId, at: DateTime<Utc>, key: Option<&str>) -> Order {
        let plan = ConsumptionPlan {
            daily_portion: 1,
            regular_portion: 1,
        };
        let file = FileRef {
            identifier: "orders/doc.pdf".into(),
            url: "https://files.example/orders/doc.pdf".into(),
            filename: "doc.pdf".into(),
            uploaded_at: at,
        };
        Order::pending(
            user_id,
            ItemId::generate(),
            &plan,
            file,
            key.map(str::to_string),
            at,
        )
    }

    #[test]
    fn account_versions_are_checked() {
        let store = MemoryStore::new();
        let user_id = UserId::generate();
        let created = store.create_account(&Account::new(user_id, t0())).unwrap();
        assert_eq!(created.version, 1);

        assert!(matches!(
            store.create_account(&Account::new(user_id, t0())),
            Err(StoreError::AlreadyExists { .. })
        ));

        let mut first = created.clone();
        first.regular_balance = 5;
        let saved = store.save_account(&first).unwrap();
        assert_eq!(saved.version, 2);

        let mut stale = created;
        stale.regular_balance = 99;
        assert!(store.save_account(&stale).unwrap_err().is_conflict());
        assert_eq!(store.get_account(&user_id).unwrap().unwrap().regular_balance, 5);
    }

    #[test]
    fn save_missing_account_is_not_found() {
        let store = MemoryStore::new();
        let result = store.save_account(&Account::new(UserId::generate(), t0()));
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn find_accounts_filters() {
        let store = MemoryStore::new();
        let mut unlimited = Account::new(UserId::generate(), t0());
        unlimited.grant_unlimited(5, 10, t0()).unwrap();
        store.create_account(&unlimited).unwrap();
        store.create_account(&Account::new(UserId::generate(), t0())).unwrap();

        let found = store.find_accounts(&|a| a.is_unlimited).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_id, unlimited.user_id);
    }

    #[test]
    fn idempotency_key_is_unique_per_user() {
        let store = MemoryStore::new();
        let user = UserId::generate();
        let first = store.create_order(&order_at(user, t0(), Some("k1"))).unwrap();

        let dup = store.create_order(&order_at(user, t0() + Duration::seconds(1), Some("k1")));
        assert!(matches!(dup, Err(StoreError::AlreadyExists { .. })));

        // Another user may reuse the key.
        store
            .create_order(&order_at(UserId::generate(), t0(), Some("k1")))
            .unwrap();

        let found = store.find_order_by_idempotency_key(&user, "k1").unwrap().unwrap();
        assert_eq!(found.id, first.id);

        store.delete_order(&first.id).unwrap();
        assert!(store.find_order_by_idempotency_key(&user, "k1").unwrap().is_none());
        assert!(store.get_order(&first.id).unwrap().is_none());
        assert!(matches!(
            store.delete_order(&first.id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn order_versions_are_checked() {
        let store = MemoryStore::new();
        let created = store
            .create_order(&order_at(UserId::generate(), t0(), None))
            .unwrap();

        let mut failed = created.clone();
        failed.fail("duplicate upload", t0()).unwrap();
        store.save_order(&failed).unwrap();

        let mut completed = created;
        completed.status = credcheck_core::OrderStatus::Completed;
        assert!(store.save_order(&completed).unwrap_err().is_conflict());
    }

    #[test]
    fn orders_list_newest_first_with_paging() {
        let store = MemoryStore::new();
        let user = UserId::generate();
        let ids: Vec<_> = (0..3)
            .map(|i| {
                store
                    .create_order(&order_at(user, t0() + Duration::minutes(i), None))
                    .unwrap()
                    .id
            })
            .collect();
        store
            .create_order(&order_at(UserId::generate(), t0(), None))
            .unwrap();

        let page = store.list_orders_by_user(&user, 2, 0).unwrap();
        assert_eq!(page.iter().map(|o| o.id).collect::<Vec<_>>(), vec![ids[2], ids[1]]);
        let page = store.list_orders_by_user(&user, 2, 2).unwrap();
        assert_eq!(page.iter().map(|o| o.id).collect::<Vec<_>>(), vec![ids[0]]);

        assert_eq!(store.list_recent_orders(10).unwrap().len(), 4);
        assert_eq!(store.list_recent_orders(1).unwrap()[0].id, ids[2]);
    }

    #[test]
    fn orders_since_is_a_time_range() {
        let store = MemoryStore::new();
        let user = UserId::generate();
        store
            .create_order(&order_at(user, t0() - Duration::hours(9), None))
            .unwrap();
        let today = store.create_order(&order_at(user, t0(), None)).unwrap();

        let since = credcheck_core::start_of_utc_day(t0());
        let orders = store.list_orders_by_user_since(&user, since).unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, today.id);
    }

    #[test]
    fn codes_are_claimed_once() {
        let store = MemoryStore::new();
        let code = RedemptionCode::new("SPRING", 10, t0()).unwrap();
        store.create_code(&code).unwrap();
        assert!(matches!(
            store.create_code(&code),
            Err(StoreError::AlreadyExists { .. })
        ));

        let user = UserId::generate();
        let claimed = store.claim_code_if_unused("SPRING", &user, t0()).unwrap();
        assert!(claimed.is_used);
        assert_eq!(claimed.used_by, Some(user));

        assert!(matches!(
            store.claim_code_if_unused("SPRING", &UserId::generate(), t0()),
            Err(StoreError::AlreadyUsed { .. })
        ));
        assert!(matches!(
            store.claim_code_if_unused("MISSING", &user, t0()),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn codes_list_newest_first() {
        let store = MemoryStore::new();
        for (i, name) in ["A1", "B2", "C3"].iter().enumerate() {
            let at = t0() + Duration::minutes(i64::try_from(i).unwrap());
            store.create_code(&RedemptionCode::new(name, 1, at).unwrap()).unwrap();
        }
        let codes = store.list_codes(2).unwrap();
        assert_eq!(
            codes.iter().map(|c| c.code.as_str()).collect::<Vec<_>>(),
            vec!["C3", "B2"]
        );
    }

    #[test]
    fn items_round_trip() {
        let store = MemoryStore::new();
        let item = Item::new("Similarity check", "", 2, t0()).unwrap();
        store.put_item(&item).unwrap();
        assert_eq!(store.get_item(&item.id).unwrap(), Some(item.clone()));
        assert_eq!(store.list_items().unwrap(), vec![item]);
    }
}
