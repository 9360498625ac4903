//! Key encoding utilities for `RocksDB`.

use credcheck_core::{ItemId, OrderId, UserId};

/// Account key: the 16 UUID bytes.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Order key: the 16 ULID bytes.
#[must_use]
pub fn order_key(order_id: &OrderId) -> Vec<u8> {
    order_id.to_bytes().to_vec()
}

/// Create a user-order index key.
///
/// Format: `user_id (16 bytes) || order_id (16 bytes)`
///
/// Since ULIDs are time-ordered, a user's orders are sorted by creation time.
#[must_use]
pub fn user_order_key(user_id: &UserId, order_id: &OrderId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&order_id.to_bytes());
    key
}

/// Prefix for iterating all orders of a user.
#[must_use]
pub fn user_orders_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the order ID from a user-order index key.
///
/// Returns `None` if the key is shorter than 32 bytes.
#[must_use]
pub fn order_id_from_user_key(key: &[u8]) -> Option<OrderId> {
    let bytes: [u8; 16] = key.get(16..32)?.try_into().ok()?;
    Some(OrderId::from_bytes(bytes))
}

/// Idempotency index key.
///
/// Format: `user_id (16 bytes) || key (UTF-8)`
#[must_use]
pub fn idempotency_key(user_id: &UserId, key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + key.len());
    out.extend_from_slice(user_id.as_bytes());
    out.extend_from_slice(key.as_bytes());
    out
}

/// Redemption code key.
#[must_use]
pub fn code_key(code: &str) -> Vec<u8> {
    code.as_bytes().to_vec()
}

/// Item key: the 16 UUID bytes.
#[must_use]
pub fn item_key(item_id: &ItemId) -> Vec<u8> {
    item_id.as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn user_order_key_format() {
        let user_id = UserId::generate();
        let order_id = OrderId::generate_at(Utc::now());
        let key = user_order_key(&user_id, &order_id);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], user_id.as_bytes());
        assert_eq!(order_id_from_user_key(&key), Some(order_id));
    }

    #[test]
    fn short_index_key_is_rejected() {
        assert_eq!(order_id_from_user_key(&[0u8; 20]), None);
    }

    #[test]
    fn idempotency_keys_are_scoped_by_user() {
        let a = UserId::generate();
        let b = UserId::generate();
        assert_ne!(idempotency_key(&a, "k"), idempotency_key(&b, "k"));
        assert!(idempotency_key(&a, "k").starts_with(a.as_bytes()));
    }
}
