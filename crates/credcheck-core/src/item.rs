//! Purchasable check products.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ItemId;

/// A check product users can order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Item ID.
    pub id: ItemId,
    /// Display title.
    pub title: String,
    /// Optional longer description.
    #[serde(default)]
    pub description: String,
    /// Price in credits, copied onto each order.
    pub price: i64,
    /// Inactive items cannot be ordered.
    pub is_active: bool,
    /// When the item was created.
    pub created_at: DateTime<Utc>,
}

impl Item {
    /// Create an active item.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] if `price` is not positive or the
    /// title is blank.
    pub fn new(
        title: &str,
        description: &str,
        price: i64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let title = title.trim();
        if title.is_empty() {
            return Err(LedgerError::InvalidAmount("item title must not be empty".into()));
        }
        if price <= 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "item price must be positive, got {price}"
            )));
        }
        Ok(Self {
            id: ItemId::generate(),
            title: title.to_string(),
            description: description.trim().to_string(),
            price,
            is_active: true,
            created_at: now,
        })
    }
}
