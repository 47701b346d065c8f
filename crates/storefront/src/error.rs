//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::backend::BackendError;
use crate::liff::LiffError;
use crate::services::{CartServiceError, ConfirmationError, IdentityError};
use crate::storage::StorageError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Backend REST API call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// The LINE user could not be resolved.
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// LIFF / LINE platform operation failed.
    #[error("LIFF error: {0}")]
    Liff(#[from] LiffError),

    /// Session storage failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Cart operation was rejected.
    #[error("Cart error: {0}")]
    Cart(#[from] CartServiceError),

    /// Confirmation page parameters were invalid.
    #[error("Confirmation error: {0}")]
    Confirmation(#[from] ConfirmationError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::Storage(StorageError::Session(err))
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Backend(_) | Self::Identity(IdentityError::Backend(_)) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Identity(_) | Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Liff(err) => match err {
                LiffError::NotInitialized | LiffError::NotLoggedIn => StatusCode::UNAUTHORIZED,
                LiffError::NotInClient | LiffError::InvalidMessages(_) => StatusCode::BAD_REQUEST,
                LiffError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
                LiffError::Init(_)
                | LiffError::Http(_)
                | LiffError::Api { .. }
                | LiffError::Parse(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Cart(CartServiceError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Cart(_) | Self::Confirmation(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Message safe to show to the client.
    fn client_message(&self) -> String {
        match self {
            Self::Storage(_) | Self::Internal(_) | Self::Cart(CartServiceError::Storage(_)) => {
                "Internal server error".to_string()
            }
            Self::Backend(err) => err.user_message(),
            Self::Identity(err) => err.user_message(),
            Self::Liff(LiffError::NotInitialized | LiffError::NotLoggedIn) => {
                crate::services::session::LOGIN_REQUIRED_MESSAGE.to_string()
            }
            Self::Liff(_) => "LINE 服務暫時無法使用".to_string(),
            Self::Cart(err) => err.to_string(),
            Self::Confirmation(err) => err.to_string(),
            Self::NotFound(msg) | Self::Unauthorized(msg) | Self::BadRequest(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let body = Json(json!({
            "success": false,
            "message": self.client_message(),
        }));
        (status, body).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a LINE user id.
///
/// Call this once the LINE session is logged in to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, display_name: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            username: display_name.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("points", "Purchased virtual card", Some(&[("product_id", "3")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
