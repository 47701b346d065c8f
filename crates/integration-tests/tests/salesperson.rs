//! Salesperson authentication against a mocked GSA endpoint.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use serde_json::json;

use bakery_points_integration_tests::{FakeSdk, Upstream, line_user};
use bakery_points_storefront::models::storage_keys;
use bakery_points_storefront::services::{
    GsaClient, SalespersonAuth, SalespersonAuthErrorKind, SessionContext,
};
use bakery_points_storefront::storage::{LocalStore, MemoryStore};

fn auth(upstream: &Upstream, store: Arc<MemoryStore>) -> SalespersonAuth {
    let gsa = GsaClient::new(&upstream.config().gsa).unwrap();
    SalespersonAuth::new(Arc::new(gsa), store)
}

#[tokio::test]
async fn test_forbidden_is_no_permission() {
    let upstream = Upstream::start();
    let gsa = upstream.mock_gsa(403, json!({"message": "forbidden"}));
    let store = Arc::new(MemoryStore::new());
    let auth = auth(&upstream, Arc::clone(&store));

    let result = auth.authenticate(&line_user("U1")).await;

    assert_eq!(result.unwrap_err(), SalespersonAuthErrorKind::NoPermission);
    assert!(!auth.is_authenticated());
    assert_eq!(auth.error(), Some(SalespersonAuthErrorKind::NoPermission));
    assert_eq!(auth.snapshot().error_message, Some("您沒有業務員權限"));
    assert!(store.get_item(storage_keys::SALESPERSON_INFO).await.unwrap().is_none());
    gsa.assert_calls(1);
}

#[tokio::test]
async fn test_status_categories() {
    for (status, expected) in [
        (400, SalespersonAuthErrorKind::InvalidUser),
        (404, SalespersonAuthErrorKind::InvalidUser),
        (401, SalespersonAuthErrorKind::NoPermission),
        (502, SalespersonAuthErrorKind::ServerError),
        (418, SalespersonAuthErrorKind::Generic),
    ] {
        let upstream = Upstream::start();
        upstream.mock_gsa(status, json!({}));
        let auth = auth(&upstream, Arc::new(MemoryStore::new()));

        assert_eq!(
            auth.authenticate(&line_user("U1")).await.unwrap_err(),
            expected,
            "status {status}"
        );
    }
}

#[tokio::test]
async fn test_invalid_user_flag_is_no_permission() {
    let upstream = Upstream::start();
    upstream.mock_gsa(200, json!({"userId": "U1", "isValid": false}));
    let auth = auth(&upstream, Arc::new(MemoryStore::new()));

    let result = auth.authenticate(&line_user("U1")).await;

    assert_eq!(result.unwrap_err(), SalespersonAuthErrorKind::NoPermission);
    assert!(!auth.is_authenticated());
}

#[tokio::test]
async fn test_session_ready_exchanges_once_and_caches() {
    let upstream = Upstream::start();
    upstream.mock_customer("U1", 42);
    let gsa = upstream.mock_gsa(
        200,
        json!({"userId": "U1", "isValid": true, "storeId": "S-017", "storeValue": "taipei-main"}),
    );
    let store = Arc::new(MemoryStore::new());
    let session = SessionContext::new(
        upstream.points_liff(),
        upstream.backend_client(),
        Arc::clone(&store) as Arc<dyn LocalStore>,
    );
    session.start(Some(Arc::new(FakeSdk::logged_in("U1")))).await;

    let auth = auth(&upstream, Arc::clone(&store));
    let credential = auth.on_session_ready(&session).await.unwrap();
    assert_eq!(credential.store_id, "S-017");
    assert!(auth.on_session_ready(&session).await.is_some());
    gsa.assert_calls(1);

    let headers = auth.auth_headers().unwrap();
    assert_eq!(headers.get("x-store-id").unwrap(), "S-017");
    assert_eq!(headers.get("x-store-value").unwrap(), "taipei-main");

    // A reloaded page restores the credential without another exchange.
    let reloaded = SalespersonAuth::new(
        Arc::new(GsaClient::new(&upstream.config().gsa).unwrap()),
        store,
    );
    assert_eq!(reloaded.restore(&line_user("U1")).await.unwrap().store_id, "S-017");
    assert!(reloaded.is_authenticated());
    gsa.assert_calls(1);
}

#[tokio::test]
async fn test_credential_cached_for_another_user_is_exchanged_again() {
    let upstream = Upstream::start();
    upstream.mock_customer("U1", 42);
    let gsa = upstream.mock_gsa(
        200,
        json!({"userId": "U1", "isValid": true, "storeId": "S-017", "storeValue": "taipei-main"}),
    );
    let store = Arc::new(MemoryStore::with_items([(
        storage_keys::SALESPERSON_INFO,
        r#"{"storeId": "S-900", "storeValue": "other-store", "userId": "UA"}"#,
    )]));
    let session = SessionContext::new(
        upstream.points_liff(),
        upstream.backend_client(),
        Arc::clone(&store) as Arc<dyn LocalStore>,
    );
    session.start(Some(Arc::new(FakeSdk::logged_in("U1")))).await;

    let auth = auth(&upstream, Arc::clone(&store));
    let credential = auth.on_session_ready(&session).await.unwrap();

    assert_eq!(credential.user_id, line_user("U1"));
    assert_eq!(credential.store_id, "S-017");
    assert_eq!(auth.snapshot().store_id.as_deref(), Some("S-017"));
    gsa.assert_calls(1);
}

#[tokio::test]
async fn test_cached_credential_ignored_while_logged_out() {
    let upstream = Upstream::start();
    let gsa = upstream.mock_gsa(200, json!({"isValid": true}));
    let store = Arc::new(MemoryStore::with_items([(
        storage_keys::SALESPERSON_INFO,
        r#"{"storeId": "S-017", "storeValue": "taipei-main", "userId": "U1"}"#,
    )]));
    let session = SessionContext::new(upstream.points_liff(), upstream.backend_client(), store.clone());
    session.start(Some(Arc::new(FakeSdk::logged_out()))).await;

    let auth = auth(&upstream, store);

    assert!(auth.on_session_ready(&session).await.is_none());
    assert!(!auth.snapshot().is_authenticated);
    gsa.assert_calls(0);
}

#[tokio::test]
async fn test_logged_out_session_skips_exchange() {
    let upstream = Upstream::start();
    let gsa = upstream.mock_gsa(200, json!({"isValid": true}));
    let store = Arc::new(MemoryStore::new());
    let session = SessionContext::new(upstream.points_liff(), upstream.backend_client(), store.clone());
    session.start(Some(Arc::new(FakeSdk::logged_out()))).await;

    let auth = auth(&upstream, store);

    assert!(auth.on_session_ready(&session).await.is_none());
    assert!(auth.error().is_none());
    gsa.assert_calls(0);
}

#[tokio::test]
async fn test_logout_inside_line_closes_window() {
    let upstream = Upstream::start();
    upstream.mock_gsa(
        200,
        json!({"userId": "U1", "isValid": true, "storeId": "S-017", "storeValue": "taipei-main"}),
    );
    let store = Arc::new(MemoryStore::new());
    let auth = auth(&upstream, Arc::clone(&store));
    auth.authenticate(&line_user("U1")).await.unwrap();

    let sdk = FakeSdk::logged_in("U1").in_client();
    auth.logout(Some(&sdk)).await;

    assert!(!auth.is_authenticated());
    assert_eq!(sdk.closes(), 1);
    assert!(store.get_item(storage_keys::SALESPERSON_INFO).await.unwrap().is_none());
}
