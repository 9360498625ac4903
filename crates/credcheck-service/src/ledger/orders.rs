//! Order lifecycle: creation with compensation, completion, failure refunds.
//!
//! Creation touches two records (the order and the account) that the store
//! cannot update together. The order is written first, then the account
//! debit. If the debit does not land, the order is removed again; if the
//! store cannot say whether it landed, the account is read back and a debit
//! that did land is reversed. A read-back that can't tell is escalated for
//! manual reconciliation.

use chrono::{DateTime, Utc};

use credcheck_core::{
    apply_daily_reset, plan_consumption, start_of_utc_day, Account, ArtifactKind, ConsumptionPlan,
    FileRef, Item, ItemId, LedgerError, Order, OrderId, OrderStatus, UserId,
};
use credcheck_store::{entity, StoreError};

use super::Ledger;
use crate::error::{Result, ServiceError};
use crate::storage::timestamped_filename;

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Original file name as sent by the client.
    pub filename: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// A request to buy one check.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    /// The paying user.
    pub user_id: UserId,
    /// The item to buy. Its current price is charged.
    pub item_id: ItemId,
    /// The document to check.
    pub upload: Upload,
    /// Makes the request safe to repeat.
    pub idempotency_key: Option<String>,
}

impl Ledger {
    /// Create a pending order and debit its price.
    ///
    /// Repeating a request with the same idempotency key returns the first
    /// order without uploading or debiting again.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::ItemNotFound`] if the item is missing or inactive.
    /// - [`ServiceError::AccountNotFound`] if the user has no account.
    /// - `InsufficientCredits` if the account cannot pay. Nothing is uploaded.
    /// - [`ServiceError::UploadFailed`] if storing the file fails or times out.
    /// - [`ServiceError::CompensationFailed`] if a half-created order could not
    ///   be undone.
    pub async fn create_order(&self, request: OrderRequest) -> Result<Order> {
        let user_id = request.user_id;
        let key = request
            .idempotency_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);

        if let Some(key) = &key {
            if let Some(existing) = self.store.find_order_by_idempotency_key(&user_id, key)? {
                tracing::info!(
                    user_id = %user_id,
                    order_id = %existing.id,
                    "Idempotent replay of order creation"
                );
                return Ok(existing);
            }
        }

        let item = self.active_item(&request.item_id)?;

        // Fail fast before uploading anything.
        let mut account = self.load_account(&user_id)?;
        apply_daily_reset(&mut account, self.now());
        plan_consumption(&account, item.price)?;

        let user_artifact = self
            .upload(request.upload, &self.options.upload_folder)
            .await?;

        let mut backoff = self.backoff();
        loop {
            let now = self.now();
            let mut account = self.load_account(&user_id)?;
            apply_daily_reset(&mut account, now);
            let plan = plan_consumption(&account, item.price)?;

            let pending = Order::pending(
                user_id,
                item.id,
                &plan,
                user_artifact.clone(),
                key.clone(),
                now,
            );
            let order = match (self.store.create_order(&pending), key.as_deref()) {
                (Ok(order), _) => order,
                // A concurrent request with the same key won.
                (Err(StoreError::AlreadyExists { .. }), Some(key)) => {
                    return self
                        .store
                        .find_order_by_idempotency_key(&user_id, key)?
                        .ok_or_else(|| {
                            ServiceError::Store(StoreError::Conflict {
                                entity: entity::IDEMPOTENCY_KEY,
                                id: key.to_string(),
                            })
                        });
                }
                (Err(err), _) => return Err(err.into()),
            };

            account.apply_consumption(&plan);
            account.touch(now);
            match self.store.save_account(&account) {
                Ok(_) => {
                    tracing::info!(
                        user_id = %user_id,
                        order_id = %order.id,
                        total_cost = order.total_cost,
                        daily_portion = plan.daily_portion,
                        regular_portion = plan.regular_portion,
                        "Order created"
                    );
                    return Ok(order);
                }
                Err(err) => {
                    let conflict = err.is_conflict();
                    self.undo_order_creation(&order, &account, &plan, conflict)?;
                    if !conflict {
                        return Err(err.into());
                    }
                    if !backoff.wait().await {
                        return Err(ServiceError::ConflictRetriesExhausted {
                            entity: entity::ACCOUNT,
                            id: user_id.to_string(),
                            attempts: backoff.attempts(),
                        });
                    }
                    tracing::warn!(
                        user_id = %user_id,
                        attempt = backoff.attempts(),
                        "Order debit conflicted, retrying"
                    );
                }
            }
        }
    }

    /// Remove an order whose debit failed, and reverse the debit if it landed
    /// after all.
    ///
    /// `debit_rejected` is true when the store reported that it did not apply
    /// the write (a version conflict); otherwise the outcome is unknown and
    /// the account is read back.
    fn undo_order_creation(
        &self,
        order: &Order,
        attempted: &Account,
        plan: &ConsumptionPlan,
        debit_rejected: bool,
    ) -> Result<()> {
        let compensation_failed = |reason: String| {
            tracing::error!(
                user_id = %order.user_id,
                order_id = %order.id,
                daily_portion = plan.daily_portion,
                regular_portion = plan.regular_portion,
                reason = %reason,
                "Order compensation failed, manual reconciliation required"
            );
            ServiceError::CompensationFailed {
                order_id: order.id,
                reason,
            }
        };

        match self.store.delete_order(&order.id) {
            Ok(()) | Err(StoreError::NotFound { .. }) => {}
            Err(err) => return Err(compensation_failed(format!("order not deleted: {err}"))),
        }
        if debit_rejected {
            return Ok(());
        }

        let stored = self
            .store
            .get_account(&order.user_id)
            .map_err(|err| compensation_failed(format!("account read-back failed: {err}")))?
            .ok_or_else(|| compensation_failed("account disappeared".into()))?;

        // The save checks `attempted.version` and stores the next one, so the
        // version alone says whether the debit landed. Anything else means
        // another writer got in between and the outcome can't be told apart.
        if stored.version == attempted.version {
            tracing::warn!(
                user_id = %order.user_id,
                order_id = %order.id,
                "Order debit did not land, order removed"
            );
            return Ok(());
        }
        if stored.version != attempted.version + 1 || !same_balances(&stored, attempted) {
            return Err(compensation_failed(format!(
                "debit outcome unknown: account moved from version {} to {}",
                attempted.version, stored.version
            )));
        }

        let mut reversed = stored;
        reversed.apply_refund(plan.daily_portion, plan.regular_portion);
        self.store
            .save_account(&reversed)
            .map_err(|err| compensation_failed(format!("debit reversal failed: {err}")))?;
        tracing::warn!(
            user_id = %order.user_id,
            order_id = %order.id,
            "Order debit landed without acknowledgement, reversed"
        );
        Ok(())
    }

    /// Attach admin result files to a pending order.
    ///
    /// # Errors
    ///
    /// - `MissingArtifact` if `files` is empty.
    /// - [`ServiceError::OrderNotFound`] if the order doesn't exist.
    /// - `InvalidTransition` unless the order is pending.
    /// - [`ServiceError::UploadFailed`] if storing a file fails.
    pub async fn attach_artifacts(
        &self,
        order_id: &OrderId,
        files: Vec<(ArtifactKind, Upload)>,
    ) -> Result<Order> {
        if files.is_empty() {
            return Err(LedgerError::MissingArtifact(
                "at least one result file is required".into(),
            )
            .into());
        }
        self.load_order(order_id)?
            .ensure_pending("attach artifacts to")?;

        let mut stored = Vec::with_capacity(files.len());
        for (kind, upload) in files {
            let file = self.upload(upload, &self.options.results_folder).await?;
            stored.push((kind, file));
        }

        let order = self
            .update_order(order_id, |order, now| {
                for (kind, file) in &stored {
                    order.attach_admin_artifact(*kind, file.clone(), now)?;
                }
                Ok(())
            })
            .await?;
        tracing::info!(
            order_id = %order_id,
            artifacts = order.admin_artifacts.count(),
            "Admin artifacts attached"
        );
        Ok(order)
    }

    /// Mark a pending order completed.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::OrderNotFound`] if the order doesn't exist.
    /// - `InvalidTransition` unless the order is pending.
    /// - `MissingArtifact` if the completion policy is not met.
    pub async fn complete_order(&self, order_id: &OrderId) -> Result<Order> {
        let policy = self.options.completion_policy;
        let order = self
            .update_order(order_id, |order, now| Ok(order.complete(policy, now)?))
            .await?;
        tracing::info!(order_id = %order_id, user_id = %order.user_id, "Order completed");
        Ok(order)
    }

    /// Fail a pending order and return its credits to the payer.
    ///
    /// The status change is committed first so that a concurrent completion
    /// or failure loses cleanly. The refund returns exactly the split recorded
    /// on the order; on unlimited accounts today's daily usage is then
    /// recomputed from the user's non-failed orders of the current UTC day.
    ///
    /// # Errors
    ///
    /// - `InvalidFailureReason` if the trimmed reason is too short.
    /// - [`ServiceError::OrderNotFound`] if the order doesn't exist.
    /// - [`ServiceError::AccountNotFound`] if the payer has no account.
    /// - `InvalidTransition` unless the order is pending.
    /// - [`ServiceError::RefundFailed`] if the order was failed but the
    ///   credits could not be returned.
    pub async fn fail_order(&self, order_id: &OrderId, reason: &str) -> Result<Order> {
        let payer = self.load_order(order_id)?.user_id;
        self.load_account(&payer)?;

        let mut refund = None;
        let order = self
            .update_order(order_id, |order, now| {
                refund = Some(order.fail(reason, now)?);
                Ok(())
            })
            .await?;
        let Some(refund) = refund else {
            return Err(ServiceError::OrderNotFound(*order_id));
        };
        tracing::info!(
            order_id = %order_id,
            user_id = %order.user_id,
            refund_amount = order.refund_amount,
            "Order failed"
        );

        let refunded = self
            .update_account(&order.user_id, |account, now| {
                account.apply_refund(refund.daily_portion, refund.regular_portion);
                if account.is_unlimited {
                    account.reconcile_daily_usage(self.daily_usage_today(&order.user_id, now)?);
                }
                Ok(true)
            })
            .await;

        match refunded {
            Ok((account, _)) => {
                tracing::info!(
                    order_id = %order_id,
                    user_id = %order.user_id,
                    regular_balance = account.regular_balance,
                    daily_used = account.unlimited.daily_credits_used_today,
                    "Order refunded"
                );
                Ok(order)
            }
            Err(err) => {
                tracing::error!(
                    order_id = %order_id,
                    user_id = %order.user_id,
                    daily_portion = refund.daily_portion,
                    regular_portion = refund.regular_portion,
                    error = %err,
                    "Refund not applied, manual reconciliation required"
                );
                Err(ServiceError::RefundFailed {
                    order_id: *order_id,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// An order, visible only to the user who placed it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::OrderNotFound`] if the order doesn't exist or
    /// belongs to someone else.
    pub fn user_order(&self, user_id: &UserId, order_id: &OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)?
            .filter(|order| order.user_id == *user_id)
            .ok_or(ServiceError::OrderNotFound(*order_id))
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn user_orders(&self, user_id: &UserId, limit: usize, offset: usize) -> Result<Vec<Order>> {
        Ok(self.store.list_orders_by_user(user_id, limit, offset)?)
    }

    /// Recent orders of all users, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn recent_orders(&self, limit: usize) -> Result<Vec<Order>> {
        Ok(self.store.list_recent_orders(limit)?)
    }

    /// Add an item to the catalogue.
    ///
    /// # Errors
    ///
    /// Returns `InvalidAmount` for a blank title or non-positive price.
    pub fn create_item(&self, title: &str, description: &str, price: i64) -> Result<Item> {
        let item = Item::new(title, description, price, self.now())?;
        self.store.put_item(&item)?;
        tracing::info!(item_id = %item.id, price = item.price, "Item created");
        Ok(item)
    }

    /// Items that can be ordered.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn active_items(&self) -> Result<Vec<Item>> {
        Ok(self
            .store
            .list_items()?
            .into_iter()
            .filter(|item| item.is_active)
            .collect())
    }

    fn active_item(&self, item_id: &ItemId) -> Result<Item> {
        self.store
            .get_item(item_id)?
            .filter(|item| item.is_active)
            .ok_or(ServiceError::ItemNotFound(*item_id))
    }

    fn load_order(&self, order_id: &OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)?
            .ok_or(ServiceError::OrderNotFound(*order_id))
    }

    /// Daily credits spent by the user's non-failed orders since the start of
    /// the UTC day containing `now`.
    pub(super) fn daily_usage_today(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .store
            .list_orders_by_user_since(user_id, start_of_utc_day(now))?
            .iter()
            .filter(|order| order.status != OrderStatus::Failed)
            .map(|order| order.daily_credits_used)
            .sum())
    }

    /// Read-mutate-save an order with conflict retry.
    async fn update_order<F>(&self, order_id: &OrderId, mut mutate: F) -> Result<Order>
    where
        F: FnMut(&mut Order, DateTime<Utc>) -> Result<()>,
    {
        let mut backoff = self.backoff();
        loop {
            let mut order = self.load_order(order_id)?;
            mutate(&mut order, self.now())?;
            match self.store.save_order(&order) {
                Ok(saved) => return Ok(saved),
                Err(err) if err.is_conflict() => {
                    if !backoff.wait().await {
                        return Err(ServiceError::ConflictRetriesExhausted {
                            entity: entity::ORDER,
                            id: order_id.to_string(),
                            attempts: backoff.attempts(),
                        });
                    }
                    tracing::warn!(
                        order_id = %order_id,
                        attempt = backoff.attempts(),
                        "Order write conflicted, retrying"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Store a file under a timestamped name, bounded by the upload timeout.
    async fn upload(&self, upload: Upload, folder: &str) -> Result<FileRef> {
        let now = self.now();
        let filename = timestamped_filename(&upload.filename, now);
        let size = upload.bytes.len();

        let stored = tokio::time::timeout(
            self.options.upload_timeout,
            self.storage.upload(upload.bytes, &filename, folder),
        )
        .await
        .map_err(|_| {
            ServiceError::UploadFailed(format!(
                "upload timed out after {}s",
                self.options.upload_timeout.as_secs_f64()
            ))
        })?
        .map_err(|err| ServiceError::UploadFailed(err.to_string()))?;

        tracing::debug!(
            identifier = %stored.identifier,
            size = size,
            "File stored"
        );
        Ok(FileRef {
            identifier: stored.identifier,
            url: stored.url,
            filename,
            uploaded_at: now,
        })
    }
}

fn same_balances(stored: &Account, attempted: &Account) -> bool {
    stored.regular_balance == attempted.regular_balance
        && stored.is_unlimited == attempted.is_unlimited
        && stored.unlimited == attempted.unlimited
}
