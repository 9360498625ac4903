//! Core types and rules for credcheck.
//!
//! This crate provides the pure domain model of the credcheck platform:
//!
//! - **Identifiers**: `UserId`, `ItemId`, `OrderId`
//! - **Accounts**: `Account`, `UnlimitedSettings`, `CreditSummary`
//! - **Ledger**: `plan_consumption`, `ConsumptionPlan`, `PaymentSource`
//! - **Daily reset**: `apply_daily_reset`, `ResetOutcome`
//! - **Orders**: `Order`, `OrderStatus`, `FileRef`, `CompletionPolicy`
//! - **Redemption**: `RedemptionCode`, `generate_code`
//! - **Time**: `Clock`, `SystemClock`, `ManualClock`
//!
//! # Credit pools
//!
//! An account spends from two pools:
//!
//! - **Daily credits** exist only while an unlimited subscription is active.
//!   Usage resets at every UTC midnight; unused credits do not carry over.
//! - **Regular credits** never expire.
//!
//! The daily pool is always drained first. Each order records the split so a
//! failure refunds exactly what was taken. Amounts are integer credits (`i64`).
//!
//! Nothing in this crate performs I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod clock;
pub mod error;
pub mod ids;
pub mod item;
pub mod ledger;
pub mod order;
pub mod redemption;
pub mod reset;

pub use account::{Account, CreditSummary, DailyAllowance, UnlimitedSettings};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{LedgerError, Result};
pub use ids::{IdError, ItemId, OrderId, UserId};
pub use item::Item;
pub use ledger::{available_daily_credits, plan_consumption, ConsumptionPlan, PaymentSource};
pub use order::{
    AdminArtifacts, ArtifactKind, CompletionPolicy, FileRef, Order, OrderStatus, Refund,
    MIN_FAILURE_REASON_LEN,
};
pub use redemption::{generate_code, normalize_code, RedemptionCode, CODE_ALPHABET};
pub use reset::{apply_daily_reset, next_utc_midnight, start_of_utc_day, ResetOutcome};
