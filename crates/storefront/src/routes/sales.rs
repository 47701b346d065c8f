//! Sales portal handlers.
//!
//! The sales portal is a separate LIFF app. Its LINE login is exchanged with
//! GSA for a store credential, cached in the session as `salespersonInfo`.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::instrument;

use crate::error::{Result, add_breadcrumb};
use crate::middleware::SalesPage;
use crate::routes::WithDirectives;
use crate::services::{SalespersonAuth, SalespersonAuthErrorKind, SessionState};
use crate::state::AppState;

const fn error_status(kind: SalespersonAuthErrorKind) -> StatusCode {
    match kind {
        SalespersonAuthErrorKind::InvalidUser => StatusCode::UNAUTHORIZED,
        SalespersonAuthErrorKind::NoPermission => StatusCode::FORBIDDEN,
        SalespersonAuthErrorKind::ServerError | SalespersonAuthErrorKind::Generic => {
            StatusCode::BAD_GATEWAY
        }
    }
}

fn salesperson(state: &AppState, page: &SalesPage) -> SalespersonAuth {
    SalespersonAuth::new(state.gsa(), page.0.store.clone())
}

/// Authenticate the logged-in LINE user as a salesperson.
///
/// A credential cached for the same LINE user is reused; otherwise the LINE
/// user id is exchanged with GSA.
#[instrument(skip_all)]
pub async fn authenticate(State(state): State<AppState>, page: SalesPage) -> Result<Response> {
    let auth = salesperson(&state, &page);
    let credential = auth.on_session_ready(&page.0.context).await;

    let status = match (credential, auth.error()) {
        (Some(credential), _) => {
            add_breadcrumb(
                "sales",
                "Salesperson authenticated",
                Some(&[("store_id", credential.store_id.as_str())]),
            );
            StatusCode::OK
        }
        (None, Some(kind)) => error_status(kind),
        (None, None) => match page.0.context.state() {
            SessionState::Error(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::UNAUTHORIZED,
        },
    };

    let body = WithDirectives::new(auth.snapshot(), page.0.directives());
    Ok((status, Json(body)).into_response())
}

/// The cached salesperson credential of the logged-in LINE user, without
/// contacting GSA.
#[instrument(skip_all)]
pub async fn me(State(state): State<AppState>, page: SalesPage) -> Response {
    let auth = salesperson(&state, &page);
    let context = &page.0.context;
    let restored = match context.profile().filter(|_| context.is_logged_in()) {
        Some(profile) => auth.restore(&profile.user_id).await,
        None => None,
    };
    let status = if restored.is_some() {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };
    (status, Json(auth.snapshot())).into_response()
}

/// Forget the salesperson credential and, inside LINE, close the window.
#[instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, page: SalesPage) -> Response {
    let auth = salesperson(&state, &page);
    let sdk = page.0.context.sdk();
    auth.logout(sdk.as_deref()).await;
    add_breadcrumb("sales", "Salesperson logged out", None);

    Json(WithDirectives::new(auth.snapshot(), page.0.directives())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(SalespersonAuthErrorKind::NoPermission),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            error_status(SalespersonAuthErrorKind::InvalidUser),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            error_status(SalespersonAuthErrorKind::ServerError),
            StatusCode::BAD_GATEWAY
        );
    }
}
