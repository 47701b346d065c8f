//! Session / profile context.
//!
//! One `SessionContext` is built per page. It owns the LIFF bootstrap guard,
//! tracks the login state machine, and keeps the LINE profile and customer
//! record (plus their local storage copies) in step with it.
//!
//! ```text
//! Uninitialized ──start/on_script_loaded──▶ Initializing ──▶ ReadyLoggedOut
//!                                                  │      └──▶ ReadyLoggedIn
//!                                                  └──▶ Error (cached data only)
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use bakery_points_core::{LineUserId, UserId};

use crate::backend::{BackendApi, BackendError, CustomerLookup};
use crate::liff::bootstrap::BootstrapSource;
use crate::liff::{LiffBootstrap, LiffError, LiffInitConfig, LiffSdk};
use crate::models::{CustomerRecord, LineProfile, storage_keys};
use crate::storage::{CachedRecord, LocalStore};

/// Shown when an action needs a logged-in user.
pub const LOGIN_REQUIRED_MESSAGE: &str = "請先登入 LINE 帳號";

/// Login state of the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "camelCase")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    ReadyLoggedOut,
    ReadyLoggedIn,
    Error(String),
}

/// Why an identity could not be resolved.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No logged-in LINE user.
    #[error("not logged in")]
    NotLoggedIn,

    /// The backend has no customer for the LINE user.
    #[error("no customer for LINE user {0}")]
    CustomerNotFound(LineUserId),

    /// The backend lookup failed.
    #[error("customer lookup failed: {0}")]
    Backend(#[from] BackendError),
}

impl IdentityError {
    /// Message shown to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotLoggedIn => LOGIN_REQUIRED_MESSAGE.to_string(),
            Self::CustomerNotFound(_) => "找不到會員資料，請重新登入".to_string(),
            Self::Backend(e) => e.user_message(),
        }
    }
}

/// LINE user and internal user id, confirmed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    pub line_user_id: LineUserId,
    pub user_id: UserId,
    pub display_name: String,
}

/// Serializable view of the session for pages and JSON responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub is_logged_in: bool,
    pub is_in_client: bool,
    pub profile: Option<LineProfile>,
    pub customer: Option<CustomerRecord>,
    pub customer_error: Option<String>,
}

#[derive(Debug)]
struct SessionData {
    state: SessionState,
    profile: Option<LineProfile>,
    customer: Option<CustomerRecord>,
    customer_error: Option<String>,
}

/// Page-wide source of truth for login state and identity.
pub struct SessionContext {
    bootstrap: LiffBootstrap,
    backend: Arc<dyn BackendApi>,
    profile_cache: CachedRecord<LineProfile>,
    customer_cache: CachedRecord<CustomerRecord>,
    data: Mutex<SessionData>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("bootstrap", &self.bootstrap)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionContext {
    #[must_use]
    pub fn new(
        config: LiffInitConfig,
        backend: Arc<dyn BackendApi>,
        store: Arc<dyn LocalStore>,
    ) -> Self {
        Self {
            bootstrap: LiffBootstrap::new(config),
            backend,
            profile_cache: CachedRecord::new(Arc::clone(&store), storage_keys::LIFF_USER_PROFILE),
            customer_cache: CachedRecord::new(store, storage_keys::CUSTOMER_DATA),
            data: Mutex::new(SessionData {
                state: SessionState::Uninitialized,
                profile: None,
                customer: None,
                customer_error: None,
            }),
        }
    }

    fn data(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initialize through the handle supplied with the page, if any.
    ///
    /// Without a handle the session stays `Uninitialized` until
    /// [`on_script_loaded`](Self::on_script_loaded) is called.
    #[instrument(skip_all)]
    pub async fn start(&self, primary: Option<Arc<dyn LiffSdk>>) -> SessionState {
        if self.bootstrap.is_initialized() {
            return self.state();
        }
        let Some(sdk) = primary else {
            return self.state();
        };
        self.begin_init();
        let result = self.bootstrap.initialize_primary(sdk).await;
        self.finish_init(result).await
    }

    /// Initialize through the fallback handle once the SDK script has loaded.
    ///
    /// A no-op when the primary path already succeeded.
    #[instrument(skip_all)]
    pub async fn on_script_loaded(&self, fallback: Arc<dyn LiffSdk>) -> SessionState {
        if self.bootstrap.is_initialized() {
            return self.state();
        }
        self.begin_init();
        let result = self.bootstrap.initialize_fallback(fallback).await;
        self.finish_init(result).await
    }

    /// Enter `Initializing` unless another path already initialized the SDK.
    fn begin_init(&self) {
        let mut data = self.data();
        if !self.bootstrap.is_initialized() {
            data.state = SessionState::Initializing;
        }
    }

    async fn finish_init(&self, result: Result<Arc<dyn LiffSdk>, LiffError>) -> SessionState {
        // The other path initialized the SDK and already settled the state.
        if result.is_ok()
            && matches!(
                self.state(),
                SessionState::ReadyLoggedIn | SessionState::ReadyLoggedOut
            )
        {
            return self.state();
        }
        match result {
            Ok(sdk) if sdk.is_logged_in() => self.enter_logged_in(sdk.as_ref()).await,
            Ok(_) => self.set_state(SessionState::ReadyLoggedOut),
            Err(e) => self.degrade(&e).await,
        }
        self.state()
    }

    /// Fall back to whatever a previous page cached.
    async fn degrade(&self, error: &LiffError) {
        warn!(error = %error, "LIFF unavailable, using cached data");
        let profile = self.profile_cache.get_cached().await;
        let customer = self.customer_cache.get_cached().await;
        let mut data = self.data();
        data.state = SessionState::Error(error.to_string());
        data.profile = profile;
        data.customer = customer;
    }

    async fn enter_logged_in(&self, sdk: &dyn LiffSdk) {
        let profile = match sdk.get_profile().await {
            Ok(profile) => profile,
            Err(e) => {
                self.degrade(&e).await;
                return;
            }
        };
        if let Err(e) = self.profile_cache.store(&profile).await {
            warn!(error = %e, "Failed to cache LINE profile");
        }

        {
            let mut data = self.data();
            data.state = SessionState::ReadyLoggedIn;
            data.profile = Some(profile.clone());
        }
        info!(line_user_id = %profile.user_id, "LINE user logged in");

        self.sync_customer(&profile).await;
    }

    /// Resolve the customer record and persist it. Failures are recorded as a
    /// message; the login state is kept.
    async fn sync_customer(&self, profile: &LineProfile) {
        let lookup = CustomerLookup {
            line_id: profile.user_id.clone(),
            display_name: Some(profile.display_name.clone()),
            name: None,
        };
        let result = self
            .customer_cache
            .refresh_from_server(|| self.backend.resolve_customer(&lookup))
            .await;

        match result {
            Ok(Some(customer)) => {
                let mut data = self.data();
                data.customer = Some(customer);
                data.customer_error = None;
            }
            Ok(None) => {
                let mut data = self.data();
                data.customer = None;
                data.customer_error =
                    Some(IdentityError::CustomerNotFound(profile.user_id.clone()).user_message());
            }
            Err(e) => {
                warn!(error = %e, "Customer lookup failed");
                let cached = self.customer_cache.get_cached().await;
                let mut data = self.data();
                data.customer = cached;
                data.customer_error = Some(e.user_message());
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        self.data().state = state;
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.data().state.clone()
    }

    /// Whether the user is logged in. `false` in every other state.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.data().state == SessionState::ReadyLoggedIn
    }

    /// The LINE profile (live or cached).
    #[must_use]
    pub fn profile(&self) -> Option<LineProfile> {
        self.data().profile.clone()
    }

    /// The customer record (live or cached).
    #[must_use]
    pub fn customer(&self) -> Option<CustomerRecord> {
        self.data().customer.clone()
    }

    /// Message from the last failed customer lookup.
    #[must_use]
    pub fn customer_error(&self) -> Option<String> {
        self.data().customer_error.clone()
    }

    /// The initialized SDK handle.
    #[must_use]
    pub fn sdk(&self) -> Option<Arc<dyn LiffSdk>> {
        self.bootstrap.sdk()
    }

    /// Which path initialized the SDK.
    #[must_use]
    pub fn bootstrap_source(&self) -> Option<BootstrapSource> {
        self.bootstrap.source()
    }

    /// Ask the SDK to log in, then re-check the login state.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` before bootstrap, or the SDK's error.
    #[instrument(skip(self))]
    pub async fn login(&self) -> Result<SessionState, LiffError> {
        let sdk = self.sdk().ok_or(LiffError::NotInitialized)?;
        if sdk.is_logged_in() {
            if !self.is_logged_in() {
                self.enter_logged_in(sdk.as_ref()).await;
            }
        } else {
            sdk.login().await?;
        }
        Ok(self.state())
    }

    /// Log out and clear cached identity.
    ///
    /// # Errors
    ///
    /// Returns the SDK's logout error. Cached data is cleared regardless.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), LiffError> {
        let result = match self.sdk() {
            Some(sdk) => sdk.logout().await,
            None => Ok(()),
        };

        self.customer_cache.invalidate().await;
        self.profile_cache.invalidate().await;
        {
            let mut data = self.data();
            data.state = SessionState::ReadyLoggedOut;
            data.profile = None;
            data.customer = None;
            data.customer_error = None;
        }
        info!("LINE user logged out");
        result
    }

    /// Re-confirm the user's identity with the backend.
    ///
    /// The cached customer record is never trusted on its own: the backend is
    /// asked again and the cache refreshed with its answer.
    ///
    /// # Errors
    ///
    /// Returns `NotLoggedIn` without touching the network when there is no
    /// logged-in profile.
    #[instrument(skip(self))]
    pub async fn resolve_identity(&self) -> Result<ResolvedIdentity, IdentityError> {
        let profile = match (self.is_logged_in(), self.profile()) {
            (true, Some(profile)) => profile,
            _ => return Err(IdentityError::NotLoggedIn),
        };

        let lookup = CustomerLookup {
            line_id: profile.user_id.clone(),
            display_name: Some(profile.display_name.clone()),
            name: None,
        };
        let customer = self
            .customer_cache
            .refresh_from_server(|| self.backend.resolve_customer(&lookup))
            .await?
            .ok_or_else(|| IdentityError::CustomerNotFound(profile.user_id.clone()))?;

        {
            let mut data = self.data();
            data.customer = Some(customer.clone());
            data.customer_error = None;
        }

        Ok(ResolvedIdentity {
            line_user_id: profile.user_id,
            user_id: customer.id,
            display_name: profile.display_name,
        })
    }

    /// Serializable view of the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let is_in_client = self.sdk().is_some_and(|sdk| sdk.is_in_client());
        let data = self.data();
        SessionSnapshot {
            state: data.state.clone(),
            is_logged_in: data.state == SessionState::ReadyLoggedIn,
            is_in_client,
            profile: data.profile.clone(),
            customer: data.customer.clone(),
            customer_error: data.customer_error.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::backend::{PurchaseAck, PurchaseSubmission};
    use crate::liff::LineMessage;
    use crate::models::{PointsBalance, PointsTransaction, PurchaseRecord, VirtualCardProduct};
    use crate::storage::MemoryStore;

    /// SDK double with a fixed login outcome.
    pub(crate) struct StubSdk {
        pub logged_in: bool,
        pub fail_init: bool,
        pub inits: AtomicUsize,
    }

    impl StubSdk {
        pub(crate) fn logged_in() -> Self {
            Self {
                logged_in: true,
                fail_init: false,
                inits: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LiffSdk for StubSdk {
        async fn init(&self, _config: &LiffInitConfig) -> Result<(), LiffError> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            if self.fail_init {
                Err(LiffError::Init("sdk blocked".to_string()))
            } else {
                Ok(())
            }
        }
        fn is_ready(&self) -> bool {
            self.inits.load(Ordering::SeqCst) > 0 && !self.fail_init
        }
        fn is_logged_in(&self) -> bool {
            self.is_ready() && self.logged_in
        }
        fn is_in_client(&self) -> bool {
            true
        }
        async fn login(&self) -> Result<(), LiffError> {
            Ok(())
        }
        async fn logout(&self) -> Result<(), LiffError> {
            Ok(())
        }
        async fn get_profile(&self) -> Result<LineProfile, LiffError> {
            Ok(LineProfile {
                user_id: LineUserId::parse("U1").unwrap(),
                display_name: "小明".to_string(),
                picture_url: None,
                status_message: None,
                email: None,
            })
        }
        async fn send_messages(&self, _messages: &[LineMessage]) -> Result<(), LiffError> {
            Ok(())
        }
        async fn close_window(&self) -> Result<(), LiffError> {
            Ok(())
        }
    }

    /// Backend double that only knows how to resolve customers.
    pub(crate) struct CustomerBackend {
        pub customer: Option<CustomerRecord>,
        pub fail: bool,
        pub lookups: AtomicUsize,
    }

    pub(crate) fn customer(id: i64) -> CustomerRecord {
        CustomerRecord {
            id: UserId::new(id),
            email: None,
            name: Some("王小明".to_string()),
            phone: None,
            address: None,
            line_id: Some("U1".to_string()),
            created_at: None,
            updated_at: None,
        }
    }

    #[async_trait]
    impl BackendApi for CustomerBackend {
        async fn resolve_customer(
            &self,
            _lookup: &CustomerLookup,
        ) -> Result<Option<CustomerRecord>, BackendError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(BackendError::Api {
                    status: 503,
                    message: None,
                });
            }
            Ok(self.customer.clone())
        }
        async fn points_balance(&self, _user_id: UserId) -> Result<PointsBalance, BackendError> {
            Err(BackendError::MissingData)
        }
        async fn virtual_cards(&self) -> Result<Vec<VirtualCardProduct>, BackendError> {
            Ok(Vec::new())
        }
        async fn purchase_virtual_card(
            &self,
            _submission: &PurchaseSubmission,
        ) -> Result<PurchaseAck, BackendError> {
            Err(BackendError::MissingData)
        }
        async fn purchase_history(
            &self,
            _user_id: UserId,
            _limit: u32,
        ) -> Result<Vec<PurchaseRecord>, BackendError> {
            Ok(Vec::new())
        }
        async fn transactions(
            &self,
            _line_user_id: &LineUserId,
            _limit: u32,
        ) -> Result<Vec<PointsTransaction>, BackendError> {
            Ok(Vec::new())
        }
    }

    fn init_config() -> LiffInitConfig {
        LiffInitConfig {
            liff_id: "1657000000-AbCdEf12".to_string(),
            with_login_on_external_browser: true,
        }
    }

    fn context(backend: CustomerBackend, store: Arc<MemoryStore>) -> SessionContext {
        SessionContext::new(init_config(), Arc::new(backend), store)
    }

    fn backend(customer: Option<CustomerRecord>, fail: bool) -> CustomerBackend {
        CustomerBackend {
            customer,
            fail,
            lookups: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_login_resolves_and_caches_customer() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(backend(Some(customer(42)), false), Arc::clone(&store));

        let state = ctx.start(Some(Arc::new(StubSdk::logged_in()))).await;
        assert_eq!(state, SessionState::ReadyLoggedIn);
        assert_eq!(ctx.customer().map(|c| c.id), Some(UserId::new(42)));
        assert!(store.get_item(storage_keys::CUSTOMER_DATA).await.unwrap().is_some());
        assert!(store.get_item(storage_keys::LIFF_USER_PROFILE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_customer_failure_keeps_login() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(backend(None, true), store);

        let state = ctx.start(Some(Arc::new(StubSdk::logged_in()))).await;
        assert_eq!(state, SessionState::ReadyLoggedIn);
        assert!(ctx.is_logged_in());
        assert_eq!(ctx.customer(), None);
        assert!(ctx.customer_error().is_some());
    }

    #[tokio::test]
    async fn test_without_primary_stays_uninitialized() {
        let ctx = context(backend(None, false), Arc::new(MemoryStore::new()));
        assert_eq!(ctx.start(None).await, SessionState::Uninitialized);
        assert!(!ctx.is_logged_in());

        let state = ctx.on_script_loaded(Arc::new(StubSdk::logged_in())).await;
        assert_eq!(state, SessionState::ReadyLoggedIn);
    }

    #[tokio::test]
    async fn test_logged_out_sdk() {
        let ctx = context(backend(None, false), Arc::new(MemoryStore::new()));
        let sdk = StubSdk {
            logged_in: false,
            ..StubSdk::logged_in()
        };
        assert_eq!(ctx.start(Some(Arc::new(sdk))).await, SessionState::ReadyLoggedOut);
        assert!(matches!(
            ctx.resolve_identity().await,
            Err(IdentityError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn test_logout_clears_cache() {
        let store = Arc::new(MemoryStore::new());
        let ctx = context(backend(Some(customer(42)), false), Arc::clone(&store));
        ctx.start(Some(Arc::new(StubSdk::logged_in()))).await;

        ctx.logout().await.unwrap();
        assert_eq!(ctx.state(), SessionState::ReadyLoggedOut);
        assert_eq!(ctx.customer(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_resolve_identity_requeries_backend() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(backend(Some(customer(42)), false));
        let ctx = SessionContext::new(
            init_config(),
            Arc::clone(&backend) as Arc<dyn BackendApi>,
            store,
        );
        ctx.start(Some(Arc::new(StubSdk::logged_in()))).await;

        let identity = ctx.resolve_identity().await.unwrap();
        assert_eq!(identity.user_id, UserId::new(42));
        assert_eq!(identity.line_user_id.as_str(), "U1");
        assert_eq!(backend.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resolve_identity_customer_missing() {
        let ctx = context(backend(None, false), Arc::new(MemoryStore::new()));
        ctx.start(Some(Arc::new(StubSdk::logged_in()))).await;
        assert!(matches!(
            ctx.resolve_identity().await,
            Err(IdentityError::CustomerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_settled_state_is_not_reset_to_initializing() {
        let backend = Arc::new(backend(Some(customer(42)), false));
        let ctx = SessionContext::new(
            init_config(),
            Arc::clone(&backend) as Arc<dyn BackendApi>,
            Arc::new(MemoryStore::new()),
        );
        ctx.start(Some(Arc::new(StubSdk::logged_in()))).await;

        ctx.begin_init();
        assert_eq!(ctx.state(), SessionState::ReadyLoggedIn);

        // A late path that gets the already active handle leaves state and
        // customer lookups alone.
        let active = ctx.sdk().unwrap();
        assert_eq!(ctx.finish_init(Ok(active)).await, SessionState::ReadyLoggedIn);
        assert_eq!(backend.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_attempt_can_be_retried() {
        let ctx = context(backend(None, false), Arc::new(MemoryStore::new()));
        let failing = StubSdk {
            fail_init: true,
            ..StubSdk::logged_in()
        };
        assert!(matches!(
            ctx.start(Some(Arc::new(failing))).await,
            SessionState::Error(_)
        ));

        ctx.begin_init();
        assert_eq!(ctx.state(), SessionState::Initializing);
    }

    #[test]
    fn test_state_wire_format() {
        assert_eq!(
            serde_json::to_value(SessionState::ReadyLoggedIn).unwrap(),
            serde_json::json!({"status": "readyLoggedIn"})
        );
        assert_eq!(
            serde_json::to_value(SessionState::Error("boom".to_string())).unwrap(),
            serde_json::json!({"status": "error", "message": "boom"})
        );
    }
}
