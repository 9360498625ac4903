//! Error types for credcheck storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Record kind.
        entity: &'static str,
        /// Record key.
        id: String,
    },

    /// The stored version differs from the one the caller read.
    #[error("version conflict on {entity} {id}")]
    Conflict {
        /// Record kind.
        entity: &'static str,
        /// Record key.
        id: String,
    },

    /// A record with the same key (or unique index value) exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Record kind.
        entity: &'static str,
        /// Conflicting key.
        id: String,
    },

    /// The redemption code was claimed before.
    #[error("redemption code already used: {code}")]
    AlreadyUsed {
        /// The normalized code.
        code: String,
    },
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn conflict(entity: &'static str, id: impl ToString) -> Self {
        Self::Conflict {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn already_exists(entity: &'static str, id: impl ToString) -> Self {
        Self::AlreadyExists {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether this is an optimistic-concurrency conflict worth retrying.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
