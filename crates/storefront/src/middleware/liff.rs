//! LIFF page extractors.
//!
//! The browser-side LIFF SDK sends its access token as
//! `Authorization: Bearer <token>`. Each request rebuilds the page's
//! [`SessionContext`]:
//!
//! 1. the bearer token, if present, backs the primary SDK handle;
//! 2. if that is missing or fails, the token remembered in the session
//!    (`liffAccessToken`) backs the fallback handle;
//! 3. a successful primary login replaces the remembered token, a verified
//!    logout forgets it.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn handler(page: LiffPage) -> impl IntoResponse {
//!     Json(page.context.snapshot())
//! }
//! ```

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use secrecy::{ExposeSecret, SecretString};
use tower_sessions::Session;
use tracing::{debug, warn};

use crate::error::{AppError, set_sentry_user};
use crate::liff::bootstrap::BootstrapSource;
use crate::liff::{ClientDirective, LiffInitConfig, LiffSdk, LineApiSdk};
use crate::models::storage_keys;
use crate::services::{SessionContext, SessionState};
use crate::state::AppState;
use crate::storage::LocalStore;

/// A request from the points storefront LIFF app.
pub struct LiffPage {
    pub session: Session,
    pub store: Arc<dyn LocalStore>,
    pub context: Arc<SessionContext>,
    pub user_agent: String,
}

/// A request from the sales portal LIFF app.
pub struct SalesPage(pub LiffPage);

impl std::fmt::Debug for LiffPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiffPage")
            .field("session_id", &self.session.id())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl LiffPage {
    /// Stable key of this browser, used to find its purchase and notification flows.
    ///
    /// # Errors
    ///
    /// Returns an error if a fresh session cannot be saved.
    pub async fn page_key(&self) -> Result<String, AppError> {
        page_key(&self.session).await
    }

    /// Actions the browser-side SDK must perform.
    #[must_use]
    pub fn directives(&self) -> Vec<ClientDirective> {
        self.context
            .sdk()
            .map(|sdk| sdk.take_directives())
            .unwrap_or_default()
    }

    /// Whether the page runs inside the LINE in-app browser.
    #[must_use]
    pub fn is_in_client(&self) -> bool {
        LineApiSdk::is_line_user_agent(&self.user_agent)
    }
}

impl FromRequestParts<AppState> for LiffPage {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        open_page(parts, state, state.points_liff()).await
    }
}

impl FromRequestParts<AppState> for SalesPage {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        open_page(parts, state, state.sales_liff()).await.map(Self)
    }
}

/// Stable key of a browser session, saving the session first if it is new.
///
/// # Errors
///
/// Returns an error if the session cannot be saved.
pub async fn page_key(session: &Session) -> Result<String, AppError> {
    if let Some(id) = session.id() {
        return Ok(id.to_string());
    }
    session.save().await?;
    session
        .id()
        .map(|id| id.to_string())
        .ok_or_else(|| AppError::Internal("session has no id after save".to_string()))
}

/// The bearer token of a request, if any.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<SecretString> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| SecretString::from(token.to_string()))
}

async fn open_page(
    parts: &mut Parts,
    state: &AppState,
    liff: LiffInitConfig,
) -> Result<LiffPage, AppError> {
    let session = Session::from_request_parts(parts, state)
        .await
        .map_err(|(_, message)| AppError::Internal(message.to_string()))?;
    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let in_client = LineApiSdk::is_line_user_agent(&user_agent);

    let store: Arc<dyn LocalStore> = Arc::new(session.clone());
    let context = Arc::new(SessionContext::new(liff, state.backend(), Arc::clone(&store)));

    let bearer = bearer_token(&parts.headers);
    let primary = bearer.clone().map(|token| {
        Arc::new(LineApiSdk::new(state.line().clone(), Some(token), in_client)) as Arc<dyn LiffSdk>
    });
    context.start(primary).await;

    if context.sdk().is_none() {
        let remembered = match store.get_item(storage_keys::LIFF_ACCESS_TOKEN).await {
            Ok(token) => token.map(SecretString::from),
            Err(e) => {
                warn!(error = %e, "Failed to read remembered LIFF token");
                None
            }
        };
        debug!(remembered = remembered.is_some(), "Initializing fallback LIFF handle");
        let fallback = Arc::new(LineApiSdk::new(state.line().clone(), remembered, in_client));
        context.on_script_loaded(fallback).await;
    }

    remember_token(store.as_ref(), &context, bearer).await;

    if let Some(profile) = context.profile().filter(|_| context.is_logged_in()) {
        set_sentry_user(&profile.user_id, Some(&profile.display_name));
    }

    Ok(LiffPage {
        session,
        store,
        context,
        user_agent,
    })
}

async fn remember_token(
    store: &dyn LocalStore,
    context: &SessionContext,
    bearer: Option<SecretString>,
) {
    let result = match (context.state(), context.bootstrap_source(), bearer) {
        (SessionState::ReadyLoggedIn, Some(BootstrapSource::Primary), Some(token)) => {
            store
                .set_item(
                    storage_keys::LIFF_ACCESS_TOKEN,
                    token.expose_secret().to_string(),
                )
                .await
        }
        (SessionState::ReadyLoggedOut, ..) => {
            store.remove_item(storage_keys::LIFF_ACCESS_TOKEN).await
        }
        _ => Ok(()),
    };
    if let Err(e) = result {
        warn!(error = %e, "Failed to update remembered LIFF token");
    }
}
