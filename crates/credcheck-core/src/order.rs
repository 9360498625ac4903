//! Order types and lifecycle.
//!
//! ```text
//! pending ──complete──► completed
//!    │
//!    └──────fail──────► failed (refund recorded)
//! ```
//!
//! Both end states are terminal. The cost split captured at creation is never
//! recomputed: a failure refunds exactly `daily_credits_used` and
//! `regular_checks_used`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::ledger::{ConsumptionPlan, PaymentSource};
use crate::{ItemId, OrderId, UserId};

/// Minimum length of an admin failure reason, after trimming.
pub const MIN_FAILURE_REASON_LEN: usize = 3;

/// A stored file attached to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    /// Storage provider identifier (e.g. `orders/report_20260101_120000.pdf`).
    pub identifier: String,
    /// Public URL of the file.
    pub url: String,
    /// File name as stored.
    pub filename: String,
    /// When the file was uploaded.
    pub uploaded_at: DateTime<Utc>,
}

/// Result files an admin can attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// AI-detection report.
    AiReport,
    /// Similarity (plagiarism) report.
    SimilarityReport,
}

impl ArtifactKind {
    /// All kinds, in display order.
    pub const ALL: [Self; 2] = [Self::AiReport, Self::SimilarityReport];

    /// Field name used in forms and JSON.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AiReport => "ai_report",
            Self::SimilarityReport => "similarity_report",
        }
    }

    /// Parse a form field name.
    #[must_use]
    pub fn from_field(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

/// Admin-uploaded result files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminArtifacts {
    /// AI-detection report.
    pub ai_report: Option<FileRef>,
    /// Similarity report.
    pub similarity_report: Option<FileRef>,
}

impl AdminArtifacts {
    /// The slot for `kind`.
    #[must_use]
    pub const fn get(&self, kind: ArtifactKind) -> Option<&FileRef> {
        match kind {
            ArtifactKind::AiReport => self.ai_report.as_ref(),
            ArtifactKind::SimilarityReport => self.similarity_report.as_ref(),
        }
    }

    fn set(&mut self, kind: ArtifactKind, file: FileRef) {
        match kind {
            ArtifactKind::AiReport => self.ai_report = Some(file),
            ArtifactKind::SimilarityReport => self.similarity_report = Some(file),
        }
    }

    /// Number of attached reports.
    #[must_use]
    pub fn count(&self) -> usize {
        ArtifactKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind).is_some())
            .count()
    }
}

/// What must be attached before an order can be completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// At least one admin report.
    #[default]
    AnyReport,
    /// Both the AI and the similarity report.
    AllReports,
}

impl CompletionPolicy {
    fn check(self, artifacts: &AdminArtifacts) -> Result<()> {
        match self {
            Self::AnyReport if artifacts.count() == 0 => Err(LedgerError::MissingArtifact(
                "at least one report is required to complete an order".into(),
            )),
            Self::AllReports => ArtifactKind::ALL
                .into_iter()
                .find(|kind| artifacts.get(*kind).is_none())
                .map_or(Ok(()), |kind| {
                    Err(LedgerError::MissingArtifact(format!(
                        "{} is required to complete an order",
                        kind.as_str()
                    )))
                }),
            Self::AnyReport => Ok(()),
        }
    }
}

impl std::str::FromStr for CompletionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "any_report" => Ok(Self::AnyReport),
            "all_reports" => Ok(Self::AllReports),
            other => Err(format!("unknown completion policy: {other}")),
        }
    }
}

/// Status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Waiting for an admin.
    Pending,
    /// Results delivered.
    Completed,
    /// Rejected and refunded.
    Failed,
}

impl OrderStatus {
    /// Whether no further transition is allowed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purchase of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order ID (ULID, time-ordered).
    pub id: OrderId,
    /// The paying user.
    pub user_id: UserId,
    /// The purchased item.
    pub item_id: ItemId,
    /// Price at the time of purchase.
    pub total_cost: i64,
    /// Part of `total_cost` paid from the daily pool.
    pub daily_credits_used: i64,
    /// Part of `total_cost` paid from the regular balance.
    pub regular_checks_used: i64,
    /// Which pool(s) paid.
    pub payment_source: PaymentSource,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// The user's submitted document.
    pub user_artifact: FileRef,
    /// Admin result files.
    pub admin_artifacts: AdminArtifacts,
    /// Client-supplied key that makes creation replay-safe.
    pub idempotency_key: Option<String>,
    /// Set on completion.
    pub completed_at: Option<DateTime<Utc>>,
    /// Set on failure.
    pub failure_reason: Option<String>,
    /// Credits returned on failure.
    pub refund_amount: i64,
    /// Set on failure.
    pub refunded_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency revision, bumped by the store on every save.
    pub version: u64,
    /// When the order was created.
    pub created_at: DateTime<Utc>,
    /// When the order was last updated.
    pub updated_at: DateTime<Utc>,
}

/// The credits an order returns when it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refund {
    /// Credits returned to the daily pool.
    pub daily_portion: i64,
    /// Credits returned to the regular balance.
    pub regular_portion: i64,
}

impl Refund {
    /// Total credits returned.
    #[must_use]
    pub const fn total(&self) -> i64 {
        self.daily_portion + self.regular_portion
    }
}

impl Order {
    /// Create a pending order paid according to `plan`.
    #[must_use]
    pub fn pending(
        user_id: UserId,
        item_id: ItemId,
        plan: &ConsumptionPlan,
        user_artifact: FileRef,
        idempotency_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::generate_at(now),
            user_id,
            item_id,
            total_cost: plan.total(),
            daily_credits_used: plan.daily_portion,
            regular_checks_used: plan.regular_portion,
            payment_source: plan.payment_source(),
            status: OrderStatus::Pending,
            user_artifact,
            admin_artifacts: AdminArtifacts::default(),
            idempotency_key,
            completed_at: None,
            failure_reason: None,
            refund_amount: 0,
            refunded_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The split recorded at creation.
    #[must_use]
    pub const fn consumption(&self) -> ConsumptionPlan {
        ConsumptionPlan {
            daily_portion: self.daily_credits_used,
            regular_portion: self.regular_checks_used,
        }
    }

    /// Reject `action` unless the order is still pending.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTransition`] for terminal orders.
    pub fn ensure_pending(&self, action: &'static str) -> Result<()> {
        if self.status == OrderStatus::Pending {
            Ok(())
        } else {
            Err(LedgerError::InvalidTransition {
                from: self.status,
                action,
            })
        }
    }

    /// Attach an admin result file. Replaces an earlier file of the same kind.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTransition`] unless the order is pending.
    pub fn attach_admin_artifact(
        &mut self,
        kind: ArtifactKind,
        file: FileRef,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_pending("attach artifacts to")?;
        self.admin_artifacts.set(kind, file);
        self.updated_at = now;
        Ok(())
    }

    /// Mark the order completed.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidTransition`] unless the order is pending.
    /// - [`LedgerError::MissingArtifact`] if `policy` is not satisfied.
    pub fn complete(&mut self, policy: CompletionPolicy, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending("complete")?;
        policy.check(&self.admin_artifacts)?;
        self.status = OrderStatus::Completed;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Mark the order failed and return the credits to give back.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidFailureReason`] if the trimmed reason is too short.
    /// - [`LedgerError::InvalidTransition`] unless the order is pending.
    pub fn fail(&mut self, reason: &str, now: DateTime<Utc>) -> Result<Refund> {
        self.ensure_pending("fail")?;
        let reason = reason.trim();
        if reason.chars().count() < MIN_FAILURE_REASON_LEN {
            return Err(LedgerError::InvalidFailureReason {
                min_len: MIN_FAILURE_REASON_LEN,
            });
        }

        let refund = Refund {
            daily_portion: self.daily_credits_used,
            regular_portion: self.regular_checks_used,
        };
        self.status = OrderStatus::Failed;
        self.failure_reason = Some(reason.to_string());
        self.refund_amount = refund.total();
        self.refunded_at = Some(now);
        self.updated_at = now;
        Ok(refund)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 14, 9, 0, 0).unwrap()
    }

    fn file(name: &str) -> FileRef {
        FileRef {
            identifier: format!("orders/{name}"),
            url: format!("https://files.example/orders/{name}"),
            filename: name.to_string(),
            uploaded_at: now(),
        }
    }

    fn mixed_order() -> Order {
        let plan = ConsumptionPlan {
            daily_portion: 3,
            regular_portion: 2,
        };
        Order::pending(
            UserId::generate(),
            ItemId::generate(),
            &plan,
            file("essay.docx"),
            None,
            now(),
        )
    }

    #[test]
    fn pending_order_records_split() {
        let order = mixed_order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_cost, 5);
        assert_eq!(order.daily_credits_used + order.regular_checks_used, order.total_cost);
        assert_eq!(order.payment_source, PaymentSource::Mixed);
    }

    #[test]
    fn fail_returns_recorded_split() {
        let mut order = mixed_order();
        let refund = order.fail("  unreadable file  ", now()).unwrap();

        assert_eq!(
            refund,
            Refund {
                daily_portion: 3,
                regular_portion: 2
            }
        );
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(order.failure_reason.as_deref(), Some("unreadable file"));
        assert_eq!(order.refund_amount, 5);
        assert_eq!(order.refunded_at, Some(now()));
        assert_eq!(order.daily_credits_used + order.regular_checks_used, order.total_cost);
    }

    #[test]
    fn fail_twice_is_invalid_transition() {
        let mut order = mixed_order();
        order.fail("bad scan", now()).unwrap();
        for reason in ["bad scan", "x"] {
            let err = order.fail(reason, now()).unwrap_err();
            assert_eq!(
                err,
                LedgerError::InvalidTransition {
                    from: OrderStatus::Failed,
                    action: "fail"
                }
            );
        }
        assert_eq!(order.refund_amount, 5);
        assert_eq!(order.failure_reason.as_deref(), Some("bad scan"));
    }

    #[test]
    fn short_reason_is_rejected_without_mutation() {
        let mut order = mixed_order();
        let before = order.clone();
        assert_eq!(
            order.fail(" ab ", now()),
            Err(LedgerError::InvalidFailureReason { min_len: 3 })
        );
        assert_eq!(order, before);
    }

    #[test]
    fn complete_requires_a_report() {
        let mut order = mixed_order();
        assert!(matches!(
            order.complete(CompletionPolicy::AnyReport, now()),
            Err(LedgerError::MissingArtifact(_))
        ));

        order
            .attach_admin_artifact(ArtifactKind::AiReport, file("ai.pdf"), now())
            .unwrap();
        order.complete(CompletionPolicy::AnyReport, now()).unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.completed_at, Some(now()));
    }

    #[test]
    fn strict_policy_requires_every_report() {
        let mut order = mixed_order();
        order
            .attach_admin_artifact(ArtifactKind::AiReport, file("ai.pdf"), now())
            .unwrap();
        let err = order.complete(CompletionPolicy::AllReports, now()).unwrap_err();
        assert_eq!(
            err,
            LedgerError::MissingArtifact("similarity_report is required to complete an order".into())
        );

        order
            .attach_admin_artifact(ArtifactKind::SimilarityReport, file("sim.pdf"), now())
            .unwrap();
        order.complete(CompletionPolicy::AllReports, now()).unwrap();
    }

    #[test]
    fn terminal_orders_reject_every_action() {
        let mut order = mixed_order();
        order
            .attach_admin_artifact(ArtifactKind::AiReport, file("ai.pdf"), now())
            .unwrap();
        order.complete(CompletionPolicy::AnyReport, now()).unwrap();

        assert!(order.fail("too late", now()).is_err());
        assert!(order.complete(CompletionPolicy::AnyReport, now()).is_err());
        assert!(order
            .attach_admin_artifact(ArtifactKind::SimilarityReport, file("s.pdf"), now())
            .is_err());
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.refund_amount, 0);
    }

    #[test]
    fn artifact_kind_field_names() {
        assert_eq!(ArtifactKind::from_field("ai_report"), Some(ArtifactKind::AiReport));
        assert_eq!(
            ArtifactKind::from_field("similarity_report"),
            Some(ArtifactKind::SimilarityReport)
        );
        assert_eq!(ArtifactKind::from_field("file"), None);
        assert_eq!(
            serde_json::to_string(&OrderStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
