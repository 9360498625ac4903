//! Column families of the `RocksDB` backend.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Accounts, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Orders, keyed by `order_id` (ULID).
    pub const ORDERS: &str = "orders";

    /// Index: orders by user, keyed by `user_id || order_id`.
    /// Value is empty (index only).
    pub const ORDERS_BY_USER: &str = "orders_by_user";

    /// Unique index: `user_id || idempotency_key` to `order_id`.
    pub const ORDER_IDEMPOTENCY: &str = "order_idempotency";

    /// Redemption codes, keyed by normalized code.
    pub const CODES: &str = "codes";

    /// Items, keyed by `item_id`.
    pub const ITEMS: &str = "items";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::ORDERS,
        cf::ORDERS_BY_USER,
        cf::ORDER_IDEMPOTENCY,
        cf::CODES,
        cf::ITEMS,
    ]
}
