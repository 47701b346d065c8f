//! Integration tests for Bakery Points.
//!
//! Every outbound service is an `httpmock` server and the browser-side LIFF
//! SDK is replaced by [`FakeSdk`], so the suite runs without network access.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bakery-points-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `purchase_flow` - in-flight exclusion, call ordering, balance refresh, login gating
//! - `session_bootstrap` - single SDK init, degraded mode with cached data
//! - `notification` - LINE receipt failures after a completed purchase
//! - `salesperson` - GSA exchange and error categories
//! - `storefront_http` - the HTTP surface through the full router

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use httpmock::prelude::*;
use serde_json::json;
use url::Url;

use bakery_points_core::{LineUserId, UserId};
use bakery_points_storefront::backend::{
    BackendApi, BackendClient, BackendError, CustomerLookup, PurchaseAck, PurchaseSubmission,
};
use bakery_points_storefront::config::{
    BackendConfig, GsaConfig, LineConfig, PointsConfig, StorefrontConfig,
};
use bakery_points_storefront::liff::LiffInitConfig;
use bakery_points_storefront::models::{
    CustomerRecord, PointsBalance, PointsTransaction, PurchaseRecord, VirtualCardProduct,
};

mod fake_sdk;

pub use fake_sdk::FakeSdk;

/// LIFF id of the points storefront in every test.
pub const LIFF_ID: &str = "1657000000-AbCdEf12";

/// LIFF id of the sales portal in every test.
pub const SALES_LIFF_ID: &str = "1657000000-SaLeS001";

/// Parse a LINE user id that is known to be valid.
#[must_use]
pub fn line_user(id: &str) -> LineUserId {
    LineUserId::parse(id).expect("valid LINE user id")
}

/// Mock servers standing in for the backend, GSA and the LINE platform.
pub struct Upstream {
    pub backend: MockServer,
    pub gsa: MockServer,
    pub line: MockServer,
}

impl Default for Upstream {
    fn default() -> Self {
        Self::start()
    }
}

impl Upstream {
    /// Start the three mock servers.
    #[must_use]
    pub fn start() -> Self {
        Self {
            backend: MockServer::start(),
            gsa: MockServer::start(),
            line: MockServer::start(),
        }
    }

    /// Storefront configuration pointing at the mock servers.
    ///
    /// The notification countdown is one second and the close delay 50ms so
    /// flows finish quickly.
    #[must_use]
    pub fn config(&self) -> StorefrontConfig {
        let timeout = Duration::from_secs(5);
        StorefrontConfig {
            host: [127, 0, 0, 1].into(),
            port: 3000,
            base_url: "http://127.0.0.1:3000".to_string(),
            backend: BackendConfig {
                base_url: Url::parse(&self.backend.base_url()).expect("mock backend url"),
                timeout,
            },
            gsa: GsaConfig {
                validation_url: Url::parse(&self.gsa.url("/gsa/validate")).expect("mock GSA url"),
                timeout,
            },
            line: LineConfig {
                liff_id: LIFF_ID.to_string(),
                sales_liff_id: SALES_LIFF_ID.to_string(),
                channel_access_token: Some("channel-token-for-tests".to_string().into()),
                login_on_external_browser: true,
                api_base_url: Url::parse(&self.line.base_url()).expect("mock LINE url"),
            },
            points: PointsConfig {
                history_limit: 5,
                notification_countdown: Duration::from_secs(1),
                close_delay: Duration::from_millis(50),
            },
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    /// LIFF init options of the points storefront.
    #[must_use]
    pub fn points_liff(&self) -> LiffInitConfig {
        LiffInitConfig {
            liff_id: LIFF_ID.to_string(),
            with_login_on_external_browser: true,
        }
    }

    /// A real backend client talking to the mock backend.
    #[must_use]
    pub fn backend_client(&self) -> Arc<BackendClient> {
        Arc::new(BackendClient::new(&self.config().backend).expect("backend client"))
    }

    /// `POST /api/customer/line/customer` answering with customer `user_id`.
    pub fn mock_customer(&self, line_id: &str, user_id: i64) -> httpmock::Mock<'_> {
        self.backend.mock(|when, then| {
            when.method(POST)
                .path("/api/customer/line/customer")
                .body_includes(format!("\"lineId\":\"{line_id}\""));
            then.status(200).json_body(json!({
                "data": {"id": user_id, "name": "王小明", "lineId": line_id}
            }));
        })
    }

    /// `POST /api/customer/line/customer` answering with no customer.
    pub fn mock_unknown_customer(&self) -> httpmock::Mock<'_> {
        self.backend.mock(|when, then| {
            when.method(POST).path("/api/customer/line/customer");
            then.status(200).json_body(json!({"data": null}));
        })
    }

    /// `GET /api/points/virtual-cards` with an active card 7 and an inactive card 8.
    pub fn mock_catalog(&self) -> httpmock::Mock<'_> {
        self.backend.mock(|when, then| {
            when.method(GET).path("/api/points/virtual-cards");
            then.status(200).json_body(json!({
                "success": true,
                "data": [
                    {
                        "id": 7,
                        "name": "千元點數卡",
                        "description": "加贈 10% 點數",
                        "price": 1000,
                        "pointsValue": 1100,
                        "status": "active"
                    },
                    {
                        "id": 8,
                        "name": "五百元點數卡",
                        "price": 500,
                        "pointsValue": 520,
                        "status": "inactive"
                    }
                ]
            }));
        })
    }

    /// `GET /api/points/balance/{user_id}` reporting `points`.
    pub fn mock_balance(&self, user_id: i64, points: i64) -> httpmock::Mock<'_> {
        self.backend.mock(|when, then| {
            when.method(GET)
                .path(format!("/api/points/balance/{user_id}"));
            then.status(200).json_body(json!({
                "success": true,
                "data": {"availablePoints": points}
            }));
        })
    }

    /// `GET /api/points/virtual-cards/purchases/{user_id}` with one row.
    pub fn mock_history(&self, user_id: i64) -> httpmock::Mock<'_> {
        self.backend.mock(|when, then| {
            when.method(GET)
                .path(format!("/api/points/virtual-cards/purchases/{user_id}"));
            then.status(200).json_body(json!({
                "success": true,
                "data": [{
                    "id": 301,
                    "virtualCardProductId": 7,
                    "productName": "千元點數卡",
                    "amount": 1000,
                    "pointsAdded": 1100,
                    "paymentMethod": "line_pay",
                    "status": "completed",
                    "createdAt": "2026-10-01T09:30:00Z"
                }]
            }));
        })
    }

    /// `POST /api/points/virtual-cards/purchase` accepting card `product_id`
    /// for `line_id`, answering after `delay`.
    pub fn mock_purchase(
        &self,
        line_id: &str,
        product_id: i64,
        delay: Duration,
    ) -> httpmock::Mock<'_> {
        self.backend.mock(|when, then| {
            when.method(POST)
                .path("/api/points/virtual-cards/purchase")
                .body_includes(format!("\"lineUserId\":\"{line_id}\""))
                .body_includes(format!("\"virtualCardProductId\":{product_id}"));
            then.status(200)
                .delay(delay)
                .json_body(json!({
                    "success": true,
                    "message": "購買成功",
                    "data": {"orderNumber": "VC-20261017-0001"}
                }));
        })
    }

    /// `POST /api/points/virtual-cards/purchase` rejecting with `message`.
    pub fn mock_purchase_rejected(&self, message: &str) -> httpmock::Mock<'_> {
        self.backend.mock(|when, then| {
            when.method(POST).path("/api/points/virtual-cards/purchase");
            then.status(200)
                .json_body(json!({"success": false, "message": message}));
        })
    }

    /// LINE token verification and profile lookup for `token` owned by `user_id`.
    pub fn mock_line_login(&self, token: &str, user_id: &str) -> (httpmock::Mock<'_>, httpmock::Mock<'_>) {
        let verify = self.line.mock(|when, then| {
            when.method(GET)
                .path("/oauth2/v2.1/verify")
                .query_param("access_token", token);
            then.status(200).json_body(json!({
                "scope": "profile openid",
                "client_id": "1657000000",
                "expires_in": 2_591_659
            }));
        });
        let profile = self.line.mock(|when, then| {
            when.method(GET)
                .path("/v2/profile")
                .header("authorization", format!("Bearer {token}"));
            then.status(200).json_body(json!({
                "userId": user_id,
                "displayName": "小明"
            }));
        });
        (verify, profile)
    }

    /// GSA validation answering `status` with `body`.
    pub fn mock_gsa(&self, status: u16, body: serde_json::Value) -> httpmock::Mock<'_> {
        self.gsa.mock(|when, then| {
            when.method(POST).path("/gsa/validate");
            then.status(status).json_body(body);
        })
    }
}

/// Backend decorator that records the order of calls.
pub struct RecordingBackend {
    inner: Arc<dyn BackendApi>,
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingBackend {
    #[must_use]
    pub fn new(inner: Arc<dyn BackendApi>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Calls made so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, call: &'static str) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }
}

#[async_trait]
impl BackendApi for RecordingBackend {
    async fn resolve_customer(
        &self,
        lookup: &CustomerLookup,
    ) -> Result<Option<CustomerRecord>, BackendError> {
        self.record("resolve_customer");
        self.inner.resolve_customer(lookup).await
    }

    async fn points_balance(&self, user_id: UserId) -> Result<PointsBalance, BackendError> {
        self.record("points_balance");
        self.inner.points_balance(user_id).await
    }

    async fn virtual_cards(&self) -> Result<Vec<VirtualCardProduct>, BackendError> {
        self.record("virtual_cards");
        self.inner.virtual_cards().await
    }

    async fn purchase_virtual_card(
        &self,
        submission: &PurchaseSubmission,
    ) -> Result<PurchaseAck, BackendError> {
        self.record("purchase_virtual_card");
        self.inner.purchase_virtual_card(submission).await
    }

    async fn purchase_history(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<PurchaseRecord>, BackendError> {
        self.record("purchase_history");
        self.inner.purchase_history(user_id, limit).await
    }

    async fn transactions(
        &self,
        line_user_id: &LineUserId,
        limit: u32,
    ) -> Result<Vec<PointsTransaction>, BackendError> {
        self.record("transactions");
        self.inner.transactions(line_user_id, limit).await
    }
}
