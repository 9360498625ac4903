//! Daily reset and unlimited subscription integration tests.

mod common;

use chrono::{Duration, TimeZone, Utc};

use common::{Fault, LedgerFixture};
use credcheck_core::{LedgerError, UnlimitedSettings};
use credcheck_service::{ServiceError, SweepReport};

#[tokio::test]
async fn balance_read_catches_up_missed_days() {
    let fx = LedgerFixture::new();
    let user = fx.unlimited_user(0, 10, 5).await;
    fx.ledger.create_order(fx.request(user, fx.item(4))).await.unwrap();

    // Three boundaries passed: 05-05, 05-06 and 05-07.
    fx.clock.advance(Duration::days(3));
    let summary = fx.ledger.balance(&user).await.unwrap();

    let daily = summary.daily.unwrap();
    assert_eq!(daily.used_today, 0);
    assert_eq!(daily.available, 10);
    assert_eq!(daily.subscription_days_remaining, 2);
    assert_eq!(
        daily.credits_reset_at,
        Some(Utc.with_ymd_and_hms(2026, 5, 8, 0, 0, 0).unwrap())
    );

    // The reset was persisted.
    let stored = fx.account(&user);
    assert_eq!(stored.unlimited.subscription_days_remaining, 2);
    assert_eq!(stored.unlimited.daily_credits_used_today, 0);
}

#[tokio::test]
async fn repeated_reads_do_not_reset_twice() {
    let fx = LedgerFixture::new();
    let user = fx.unlimited_user(0, 10, 5).await;
    fx.clock.advance(Duration::days(1));

    fx.ledger.balance(&user).await.unwrap();
    let version = fx.account(&user).version;
    let summary = fx.ledger.balance(&user).await.unwrap();

    assert_eq!(summary.daily.unwrap().subscription_days_remaining, 4);
    assert_eq!(fx.account(&user).version, version);
}

#[tokio::test]
async fn last_day_expires_the_subscription() {
    let fx = LedgerFixture::new();
    let user = fx.unlimited_user(7, 10, 1).await;

    fx.clock.advance(Duration::days(1));
    let summary = fx.ledger.balance(&user).await.unwrap();

    assert!(!summary.is_unlimited);
    assert!(summary.daily.is_none());
    assert_eq!(summary.regular_balance, 7);
    let stored = fx.account(&user);
    assert!(!stored.is_unlimited);
    assert_eq!(stored.unlimited, UnlimitedSettings::default());
}

#[tokio::test]
async fn sweep_resets_every_unlimited_account() {
    let fx = LedgerFixture::new();
    let short = fx.unlimited_user(0, 5, 1).await;
    let long = fx.unlimited_user(0, 5, 10).await;
    let normal = fx.user_with_credits(3).await;
    fx.clock.advance(Duration::days(2));

    let report = fx.ledger.run_daily_reset().await.unwrap();

    assert_eq!(
        report,
        SweepReport {
            processed: 2,
            resets_applied: 3,
            expired: 1,
            failed: 0,
        }
    );
    assert!(!fx.account(&short).is_unlimited);
    assert_eq!(fx.account(&long).unlimited.subscription_days_remaining, 8);
    assert_eq!(fx.account(&normal).regular_balance, 3);

    // Running again the same day changes nothing.
    let again = fx.ledger.run_daily_reset().await.unwrap();
    assert_eq!(again.processed, 1);
    assert_eq!(again.resets_applied, 0);
}

#[tokio::test]
async fn sweep_counts_failures_and_continues() {
    let fx = LedgerFixture::new();
    fx.unlimited_user(0, 5, 10).await;
    fx.unlimited_user(0, 5, 10).await;
    fx.clock.advance(Duration::days(1));
    fx.store.fail_next_account_save(Fault::Error);

    let report = fx.ledger.run_daily_reset().await.unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.resets_applied, 1);
}

#[tokio::test]
async fn unlimited_can_be_updated_and_reverted() {
    let fx = LedgerFixture::new();
    let user = fx.unlimited_user(2, 10, 30).await;
    fx.ledger.create_order(fx.request(user, fx.item(6))).await.unwrap();

    let updated = fx
        .ledger
        .update_unlimited(&user, Some(4), Some(0))
        .await
        .unwrap();
    assert_eq!(updated.unlimited.daily_credits, 4);
    assert_eq!(updated.unlimited.daily_credits_used_today, 4);
    assert_eq!(updated.unlimited.subscription_days_remaining, 30);

    let reverted = fx.ledger.revert_unlimited(&user).await.unwrap();
    assert!(!reverted.is_unlimited);
    assert_eq!(reverted.regular_balance, 2);

    let err = fx
        .ledger
        .update_unlimited(&user, Some(5), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Ledger(LedgerError::NotUnlimited)));
}

#[tokio::test]
async fn grants_validate_amounts() {
    let fx = LedgerFixture::new();
    let user = fx.user_with_credits(0).await;

    assert!(matches!(
        fx.ledger.grant_credits(&user, 0).await,
        Err(ServiceError::Ledger(LedgerError::InvalidAmount(_)))
    ));
    assert!(matches!(
        fx.ledger.grant_unlimited(&user, 5, -1).await,
        Err(ServiceError::Ledger(LedgerError::InvalidAmount(_)))
    ));
    assert!(matches!(
        fx.ledger.register_account(user),
        Err(ServiceError::AccountAlreadyExists(_))
    ));
}
