//! LINE receipt after a completed purchase.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use bakery_points_core::{PaymentMethod, VirtualCardProductId};
use bakery_points_integration_tests::{FakeSdk, Upstream};
use bakery_points_storefront::liff::LiffSdk;
use bakery_points_storefront::services::{
    NotificationFlow, NotificationStatus, PurchaseFlow, PurchaseOutcome, PurchaseRequest,
    SessionContext,
};
use bakery_points_storefront::storage::MemoryStore;

fn upstream_with_purchase() -> Upstream {
    let upstream = Upstream::start();
    upstream.mock_customer("U1", 42);
    upstream.mock_catalog();
    upstream.mock_history(42);
    upstream.mock_balance(42, 2450);
    upstream.mock_purchase("U1", 7, Duration::ZERO);
    upstream
}

async fn purchase_with(upstream: &Upstream, sdk: Arc<FakeSdk>) -> PurchaseOutcome {
    let backend = upstream.backend_client();
    let session = SessionContext::new(upstream.points_liff(), backend.clone(), Arc::new(MemoryStore::new()));
    session.start(Some(sdk)).await;
    PurchaseFlow::new(backend, 5)
        .purchase(
            &session,
            PurchaseRequest {
                product_id: VirtualCardProductId::new(7),
                payment_method: PaymentMethod::LinePay,
                confirmed: true,
                user_agent: "Mozilla/5.0 Line/14.5.0".to_string(),
                notes: String::new(),
            },
        )
        .await
}

#[tokio::test]
async fn test_send_failure_leaves_purchase_completed() {
    let upstream = upstream_with_purchase();
    let sdk = Arc::new(FakeSdk::logged_in("U1").in_client().failing_send());

    let outcome = purchase_with(&upstream, sdk.clone()).await;
    let PurchaseOutcome::Completed {
        receipt: Some(receipt),
        ..
    } = &outcome
    else {
        panic!("expected a completed purchase with a receipt, got {outcome:?}");
    };

    let flow = Arc::new(NotificationFlow::new(Duration::ZERO, Duration::from_millis(10)));
    let status = flow
        .spawn(sdk.clone() as Arc<dyn LiffSdk>, receipt.messages())
        .await
        .unwrap();

    assert!(matches!(status, NotificationStatus::Failed { .. }));
    assert!(outcome.is_completed());
    assert_eq!(sdk.sends(), 1);
    assert_eq!(sdk.closes(), 0);
}

#[tokio::test]
async fn test_receipt_is_sent_then_window_closes() {
    let upstream = upstream_with_purchase();
    let sdk = Arc::new(FakeSdk::logged_in("U1").in_client());

    let outcome = purchase_with(&upstream, sdk.clone()).await;
    let PurchaseOutcome::Completed {
        receipt: Some(receipt),
        ..
    } = outcome
    else {
        panic!("expected a completed purchase with a receipt, got {outcome:?}");
    };
    assert_eq!(receipt.balance, Some(2450));
    assert_eq!(receipt.points_added, 1100);

    let flow = NotificationFlow::new(Duration::from_secs(1), Duration::from_millis(10));
    let mut updates = flow.subscribe();
    let status = flow.run(sdk.clone(), receipt.messages()).await;

    assert_eq!(status, NotificationStatus::Sent);
    assert_eq!(*updates.borrow_and_update(), NotificationStatus::Sent);
    assert_eq!(sdk.sends(), 1);
    assert_eq!(sdk.closes(), 1);
}

#[tokio::test]
async fn test_cancel_during_countdown_sends_nothing() {
    let upstream = upstream_with_purchase();
    let sdk = Arc::new(FakeSdk::logged_in("U1").in_client());

    let outcome = purchase_with(&upstream, sdk.clone()).await;
    let PurchaseOutcome::Completed {
        receipt: Some(receipt),
        ..
    } = outcome
    else {
        panic!("expected a completed purchase with a receipt, got {outcome:?}");
    };

    let flow = Arc::new(NotificationFlow::new(Duration::from_secs(3), Duration::from_millis(10)));
    let handle = flow.spawn(sdk.clone(), receipt.messages());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(matches!(
        flow.status(),
        NotificationStatus::CountingDown { remaining_secs: 3 }
    ));

    flow.cancel();

    assert_eq!(handle.await.unwrap(), NotificationStatus::Cancelled);
    assert_eq!(sdk.sends(), 0);
}

#[tokio::test]
async fn test_outside_line_client_nothing_is_sent() {
    let upstream = upstream_with_purchase();
    let sdk = Arc::new(FakeSdk::logged_in("U1"));

    let outcome = purchase_with(&upstream, sdk.clone()).await;
    let PurchaseOutcome::Completed {
        receipt: Some(receipt),
        ..
    } = outcome
    else {
        panic!("expected a completed purchase with a receipt, got {outcome:?}");
    };

    let status = NotificationFlow::new(Duration::ZERO, Duration::ZERO)
        .run(sdk.clone(), receipt.messages())
        .await;

    assert_eq!(status, NotificationStatus::Idle);
    assert_eq!(sdk.sends(), 0);
}
