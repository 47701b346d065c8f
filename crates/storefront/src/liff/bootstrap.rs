//! One-shot LIFF initialization guard.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{LiffError, LiffInitConfig, LiffSdk};

/// Which path produced the active SDK handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BootstrapSource {
    /// The handle supplied with the page request.
    Primary,
    /// The handle rebuilt after the SDK script finished loading.
    Fallback,
}

/// Initializes at most one SDK handle.
///
/// The first handle whose `init` succeeds becomes the active one. Later
/// attempts, from either path, return the active handle without calling
/// `init` again. A failed attempt leaves the guard empty so the other path can
/// still try.
pub struct LiffBootstrap {
    config: LiffInitConfig,
    active: OnceCell<(Arc<dyn LiffSdk>, BootstrapSource)>,
}

impl std::fmt::Debug for LiffBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiffBootstrap")
            .field("liff_id", &self.config.liff_id)
            .field("source", &self.source())
            .finish_non_exhaustive()
    }
}

impl LiffBootstrap {
    #[must_use]
    pub fn new(config: LiffInitConfig) -> Self {
        Self {
            config,
            active: OnceCell::new(),
        }
    }

    /// Options handed to `init`.
    #[must_use]
    pub const fn config(&self) -> &LiffInitConfig {
        &self.config
    }

    /// Initialize through the handle supplied with the page.
    ///
    /// # Errors
    ///
    /// Returns the SDK's `init` error.
    pub async fn initialize_primary(
        &self,
        sdk: Arc<dyn LiffSdk>,
    ) -> Result<Arc<dyn LiffSdk>, LiffError> {
        self.initialize(sdk, BootstrapSource::Primary).await
    }

    /// Initialize through the fallback handle.
    ///
    /// Does nothing and returns the active handle if one is already set.
    ///
    /// # Errors
    ///
    /// Returns the SDK's `init` error.
    pub async fn initialize_fallback(
        &self,
        sdk: Arc<dyn LiffSdk>,
    ) -> Result<Arc<dyn LiffSdk>, LiffError> {
        if let Some((active, source)) = self.active.get() {
            debug!(?source, "Skipping fallback init, SDK already initialized");
            return Ok(Arc::clone(active));
        }
        self.initialize(sdk, BootstrapSource::Fallback).await
    }

    async fn initialize(
        &self,
        sdk: Arc<dyn LiffSdk>,
        source: BootstrapSource,
    ) -> Result<Arc<dyn LiffSdk>, LiffError> {
        let (active, _) = self
            .active
            .get_or_try_init(|| async {
                if sdk.is_ready() {
                    debug!(?source, "SDK already reports ready, skipping init");
                } else {
                    sdk.init(&self.config).await.inspect_err(|e| {
                        warn!(?source, error = %e, "LIFF init failed");
                    })?;
                }
                info!(?source, logged_in = sdk.is_logged_in(), "LIFF ready");
                Ok::<_, LiffError>((sdk, source))
            })
            .await?;
        Ok(Arc::clone(active))
    }

    /// The active handle, if initialization has succeeded.
    #[must_use]
    pub fn sdk(&self) -> Option<Arc<dyn LiffSdk>> {
        self.active.get().map(|(sdk, _)| Arc::clone(sdk))
    }

    /// Which path produced the active handle.
    #[must_use]
    pub fn source(&self) -> Option<BootstrapSource> {
        self.active.get().map(|(_, source)| *source)
    }

    /// Whether a handle has been initialized.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.active.initialized()
    }
}
