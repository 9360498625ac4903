//! Error types for credcheck domain rules.

use crate::ids::IdError;
use crate::order::OrderStatus;

/// Result type for credcheck domain operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Business-rule violations raised by the domain model.
///
/// None of these leave state half-mutated: every operation that returns one
/// checks its preconditions before touching the account or order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The combined daily and regular pools cannot cover the price.
    #[error("insufficient credits: available={available}, required={required}")]
    InsufficientCredits {
        /// Credits that could be spent right now (daily + regular).
        available: i64,
        /// Price of the requested order.
        required: i64,
    },

    /// An order action was attempted from a state that does not allow it.
    #[error("cannot {action} order in status {from}")]
    InvalidTransition {
        /// Current status of the order.
        from: OrderStatus,
        /// The rejected action.
        action: &'static str,
    },

    /// The redemption code has already been claimed.
    #[error("redemption code already used: {code}")]
    AlreadyUsed {
        /// The normalized code.
        code: String,
    },

    /// No redemption code matches.
    #[error("redemption code not found: {code}")]
    CodeNotFound {
        /// The normalized code.
        code: String,
    },

    /// An amount, price or count was zero or negative.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// The failure reason given by an admin is too short.
    #[error("failure reason must be at least {min_len} characters")]
    InvalidFailureReason {
        /// Minimum accepted length after trimming.
        min_len: usize,
    },

    /// A required artifact is missing.
    #[error("missing artifact: {0}")]
    MissingArtifact(String),

    /// The account has no active unlimited subscription.
    #[error("account has no active unlimited subscription")]
    NotUnlimited,

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
