//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::backend::{BackendApi, BackendClient, BackendError};
use crate::config::StorefrontConfig;
use crate::liff::{LiffError, LiffInitConfig, LineApiClient};
use crate::services::{GsaApi, GsaClient, GsaError, NotificationFlow, PurchaseFlow};

/// How long an idle page keeps its purchase and notification flows.
const FLOW_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// Upper bound on concurrently tracked pages.
const MAX_TRACKED_PAGES: u64 = 10_000;

/// Error creating the outbound API clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientInitError {
    #[error("backend client: {0}")]
    Backend(#[from] BackendError),
    #[error("GSA client: {0}")]
    Gsa(#[from] GsaError),
    #[error("LINE client: {0}")]
    Line(#[from] LiffError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the API clients, configuration and the per-page flow registries.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    backend: Arc<dyn BackendApi>,
    gsa: Arc<dyn GsaApi>,
    line: LineApiClient,
    purchase_flows: Cache<String, Arc<PurchaseFlow>>,
    notifications: Cache<String, Arc<NotificationFlow>>,
}

impl AppState {
    /// Create the application state with production clients.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, ClientInitError> {
        let backend = Arc::new(BackendClient::new(&config.backend)?);
        let gsa = Arc::new(GsaClient::new(&config.gsa)?);
        let line = LineApiClient::new(&config.line, config.backend.timeout)?;
        Ok(Self::with_clients(config, backend, gsa, line))
    }

    /// Create the application state around the given clients.
    #[must_use]
    pub fn with_clients(
        config: StorefrontConfig,
        backend: Arc<dyn BackendApi>,
        gsa: Arc<dyn GsaApi>,
        line: LineApiClient,
    ) -> Self {
        let purchase_flows = Cache::builder()
            .max_capacity(MAX_TRACKED_PAGES)
            .time_to_idle(FLOW_IDLE_TTL)
            .build();
        let notifications = Cache::builder()
            .max_capacity(MAX_TRACKED_PAGES)
            .time_to_idle(FLOW_IDLE_TTL)
            .build();

        Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                gsa,
                line,
                purchase_flows,
                notifications,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get the backend API client.
    #[must_use]
    pub fn backend(&self) -> Arc<dyn BackendApi> {
        Arc::clone(&self.inner.backend)
    }

    /// Get the GSA validation client.
    #[must_use]
    pub fn gsa(&self) -> Arc<dyn GsaApi> {
        Arc::clone(&self.inner.gsa)
    }

    /// Get the LINE platform client.
    #[must_use]
    pub fn line(&self) -> &LineApiClient {
        &self.inner.line
    }

    /// LIFF init options for the points storefront.
    #[must_use]
    pub fn points_liff(&self) -> LiffInitConfig {
        let line = &self.inner.config.line;
        LiffInitConfig {
            liff_id: line.liff_id.clone(),
            with_login_on_external_browser: line.login_on_external_browser,
        }
    }

    /// LIFF init options for the sales portal.
    #[must_use]
    pub fn sales_liff(&self) -> LiffInitConfig {
        let line = &self.inner.config.line;
        LiffInitConfig {
            liff_id: line.sales_liff_id.clone(),
            with_login_on_external_browser: line.login_on_external_browser,
        }
    }

    /// The purchase flow of a page, created on first use.
    pub async fn purchase_flow(&self, page_key: &str) -> Arc<PurchaseFlow> {
        let backend = self.backend();
        let history_limit = self.inner.config.points.history_limit;
        self.inner
            .purchase_flows
            .get_with(page_key.to_string(), async move {
                Arc::new(PurchaseFlow::new(backend, history_limit))
            })
            .await
    }

    /// Start tracking a new notification for a page, cancelling any previous one.
    pub async fn replace_notification(&self, page_key: &str) -> Arc<NotificationFlow> {
        let flow = Arc::new(NotificationFlow::from_config(&self.inner.config.points));
        if let Some(previous) = self.inner.notifications.get(page_key).await {
            previous.cancel();
        }
        self.inner
            .notifications
            .insert(page_key.to_string(), Arc::clone(&flow))
            .await;
        flow
    }

    /// The notification currently tracked for a page.
    pub async fn notification(&self, page_key: &str) -> Option<Arc<NotificationFlow>> {
        self.inner.notifications.get(page_key).await
    }

    /// Cancel and forget a page's notification.
    pub async fn cancel_notification(&self, page_key: &str) -> Option<Arc<NotificationFlow>> {
        let flow = self.inner.notifications.remove(page_key).await?;
        flow.cancel();
        Some(flow)
    }
}
