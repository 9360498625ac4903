//! Account registration, balance reads and admin adjustments.

use credcheck_core::{
    apply_daily_reset, start_of_utc_day, Account, CreditSummary, LedgerError, Order, OrderStatus,
    UserId,
};
use credcheck_store::StoreError;

use super::Ledger;
use crate::error::{Result, ServiceError};

/// An account with its full order history.
#[derive(Debug, Clone)]
pub struct AccountOverview {
    /// The account, daily resets applied.
    pub account: Account,
    /// Every order of the user, newest first.
    pub orders: Vec<Order>,
    /// Number of orders.
    pub total_orders: usize,
    /// Number of completed orders.
    pub completed_orders: usize,
}

/// An unlimited subscriber's current UTC day.
#[derive(Debug, Clone)]
pub struct SubscriberDay {
    /// The account, daily resets applied.
    pub account: Account,
    /// Orders created since the start of the UTC day, newest first.
    pub today_orders: Vec<Order>,
    /// Daily credits spent by today's non-failed orders.
    pub daily_credits_used_today: i64,
    /// Daily credits left, by the same count.
    pub daily_credits_available: i64,
}

impl Ledger {
    /// Register an account with a zero balance.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::AccountAlreadyExists`] for a second registration.
    pub fn register_account(&self, user_id: UserId) -> Result<Account> {
        let account = Account::new(user_id, self.now());
        match self.store.create_account(&account) {
            Ok(account) => {
                tracing::info!(user_id = %user_id, "Account created");
                Ok(account)
            }
            Err(StoreError::AlreadyExists { .. }) => Err(ServiceError::AccountAlreadyExists(user_id)),
            Err(err) => Err(err.into()),
        }
    }

    /// The account after applying any due daily resets.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::AccountNotFound`] if the user has no account.
    pub async fn account(&self, user_id: &UserId) -> Result<Account> {
        let (account, _) = self.update_account(user_id, |_, _| Ok(false)).await?;
        Ok(account)
    }

    /// Spendable credits. Runs the daily reset and persists it if it fired.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::AccountNotFound`] if the user has no account.
    pub async fn balance(&self, user_id: &UserId) -> Result<CreditSummary> {
        Ok(self.account(user_id).await?.credit_summary())
    }

    /// Admin grant of regular credits.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::AccountNotFound`] if the user has no account.
    /// - `InvalidAmount` if `amount` is not positive.
    pub async fn grant_credits(&self, user_id: &UserId, amount: i64) -> Result<Account> {
        let (account, _) = self
            .update_account(user_id, |account, _| {
                account.credit_regular(amount)?;
                Ok(true)
            })
            .await?;
        tracing::info!(
            user_id = %user_id,
            amount = amount,
            balance = account.regular_balance,
            "Regular credits granted"
        );
        Ok(account)
    }

    /// Start (or replace) an unlimited subscription.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::AccountNotFound`] if the user has no account.
    /// - `InvalidAmount` if either value is not positive.
    pub async fn grant_unlimited(
        &self,
        user_id: &UserId,
        daily_credits: i64,
        subscription_days: i64,
    ) -> Result<Account> {
        let (account, _) = self
            .update_account(user_id, |account, now| {
                account.grant_unlimited(daily_credits, subscription_days, now)?;
                Ok(true)
            })
            .await?;
        tracing::info!(
            user_id = %user_id,
            daily_credits = daily_credits,
            subscription_days = subscription_days,
            "Unlimited subscription granted"
        );
        Ok(account)
    }

    /// Adjust an active subscription. Non-positive values are ignored.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::AccountNotFound`] if the user has no account.
    /// - `NotUnlimited` if no subscription is active (including one that
    ///   expired at the reset run just before).
    pub async fn update_unlimited(
        &self,
        user_id: &UserId,
        daily_credits: Option<i64>,
        subscription_days: Option<i64>,
    ) -> Result<Account> {
        let (account, _) = self
            .update_account(user_id, |account, _| {
                account.update_unlimited(daily_credits, subscription_days)?;
                Ok(true)
            })
            .await?;
        tracing::info!(
            user_id = %user_id,
            daily_credits = ?daily_credits,
            subscription_days = ?subscription_days,
            "Unlimited subscription updated"
        );
        Ok(account)
    }

    /// End an unlimited subscription now. A no-op on normal accounts.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::AccountNotFound`] if the user has no account.
    pub async fn revert_unlimited(&self, user_id: &UserId) -> Result<Account> {
        let (account, _) = self
            .update_account(user_id, |account, _| {
                if !account.is_unlimited {
                    return Ok(false);
                }
                account.revert_to_normal();
                Ok(true)
            })
            .await?;
        tracing::info!(user_id = %user_id, "Account reverted to normal");
        Ok(account)
    }

    /// Replace the admin notes on an account.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::AccountNotFound`] if the user has no account.
    pub async fn set_admin_notes(&self, user_id: &UserId, notes: &str) -> Result<Account> {
        let (account, _) = self
            .update_account(user_id, |account, _| Ok(account.set_admin_notes(notes)))
            .await?;
        tracing::info!(user_id = %user_id, "Admin notes updated");
        Ok(account)
    }

    /// An account together with its orders and order counts.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::AccountNotFound`] if the user has no account.
    pub async fn admin_account_view(&self, user_id: &UserId) -> Result<AccountOverview> {
        let account = self.account(user_id).await?;
        let orders = self.store.list_orders_by_user(user_id, usize::MAX, 0)?;
        let completed_orders = orders
            .iter()
            .filter(|order| order.status == OrderStatus::Completed)
            .count();
        Ok(AccountOverview {
            account,
            total_orders: orders.len(),
            completed_orders,
            orders,
        })
    }

    /// Active unlimited subscribers, most days remaining first.
    ///
    /// Due resets are applied to the returned copies only; subscriptions that
    /// have run out by now are left out. Persisting is the sweep's job.
    ///
    /// # Errors
    ///
    /// Returns a store error if the accounts cannot be read.
    pub fn unlimited_accounts(&self) -> Result<Vec<Account>> {
        let now = self.now();
        let mut accounts: Vec<Account> = self
            .store
            .find_accounts(&|account| account.is_unlimited)?
            .into_iter()
            .filter_map(|mut account| {
                apply_daily_reset(&mut account, now);
                account.is_unlimited.then_some(account)
            })
            .collect();
        accounts.sort_by(|a, b| {
            b.unlimited
                .subscription_days_remaining
                .cmp(&a.unlimited.subscription_days_remaining)
        });
        Ok(accounts)
    }

    /// An unlimited subscriber's day so far. Daily usage is recounted from
    /// today's non-failed orders rather than read from the account.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::AccountNotFound`] if the user has no account.
    /// - `NotUnlimited` if no subscription is active.
    pub async fn unlimited_account_view(&self, user_id: &UserId) -> Result<SubscriberDay> {
        let account = self.account(user_id).await?;
        if !account.is_unlimited {
            return Err(LedgerError::NotUnlimited.into());
        }

        let now = self.now();
        let mut today_orders = self
            .store
            .list_orders_by_user_since(user_id, start_of_utc_day(now))?;
        today_orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let used = self.daily_usage_today(user_id, now)?;

        Ok(SubscriberDay {
            daily_credits_available: (account.unlimited.daily_credits - used).max(0),
            daily_credits_used_today: used,
            account,
            today_orders,
        })
    }
}
