//! Session route handlers.
//!
//! The page calls `POST /api/session` after the browser-side LIFF SDK has
//! loaded, with its access token as a bearer token. Every response carries
//! the session snapshot and the SDK directives the page must carry out.

use axum::{Json, extract::State};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::error::{Result, add_breadcrumb, clear_sentry_user};
use crate::middleware::LiffPage;
use crate::models::storage_keys;
use crate::routes::WithDirectives;
use crate::services::SessionSnapshot;
use crate::state::AppState;
use crate::storage::LocalStore;

/// Session snapshot plus the LIFF app it belongs to.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub liff_id: String,
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
}

fn view(state: &AppState, page: &LiffPage) -> Json<WithDirectives<SessionView>> {
    Json(WithDirectives::new(
        SessionView {
            liff_id: state.config().line.liff_id.clone(),
            snapshot: page.context.snapshot(),
        },
        page.directives(),
    ))
}

/// Report the session state.
#[instrument(skip_all)]
pub async fn show(State(state): State<AppState>, page: LiffPage) -> Json<WithDirectives<SessionView>> {
    view(&state, &page)
}

/// Start the LINE login.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    page: LiffPage,
) -> Result<Json<WithDirectives<SessionView>>> {
    page.context.login().await?;
    add_breadcrumb("session", "Login requested", None);
    Ok(view(&state, &page))
}

/// Log out and forget the cached identity.
#[instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, page: LiffPage) -> Json<WithDirectives<SessionView>> {
    if let Err(e) = page.context.logout().await {
        warn!(error = %e, "LIFF logout failed, cached identity cleared anyway");
    }
    if let Err(e) = page
        .store
        .remove_item(storage_keys::LIFF_ACCESS_TOKEN)
        .await
    {
        warn!(error = %e, "Failed to forget LIFF token");
    }
    if let Ok(key) = page.page_key().await {
        state.cancel_notification(&key).await;
    }
    clear_sentry_user();
    add_breadcrumb("session", "Logged out", None);
    view(&state, &page)
}
