//! LIFF (LINE Front-end Framework) integration.
//!
//! # Architecture
//!
//! - [`LiffSdk`] is the SDK surface the flows depend on:
//!   `init / is_logged_in / is_in_client / login / logout / get_profile /
//!   send_messages / close_window`.
//! - [`LineApiSdk`] is the production implementation. The browser-side SDK
//!   hands its access token to the storefront; `LineApiSdk` verifies it with
//!   the LINE platform, fetches the profile and pushes messages server-side.
//!   Actions only the browser can perform are queued as [`ClientDirective`]s.
//! - [`LiffBootstrap`] guards initialization so that at most one SDK handle is
//!   ever initialized per page, whichever of the primary or fallback path
//!   gets there first.

pub mod bootstrap;
pub mod line_api;
pub mod messages;

pub use bootstrap::LiffBootstrap;
pub use line_api::{LineApiClient, LineApiSdk};
pub use messages::{LineMessage, PurchaseReceipt};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::LineProfile;

/// Errors reported by a [`LiffSdk`].
#[derive(Debug, Error)]
pub enum LiffError {
    /// An operation was attempted before `init` succeeded.
    #[error("LIFF SDK is not initialized")]
    NotInitialized,

    /// `init` failed.
    #[error("LIFF init failed: {0}")]
    Init(String),

    /// The operation requires a logged-in user.
    #[error("user is not logged in")]
    NotLoggedIn,

    /// The operation is only available inside the LINE app.
    #[error("not running inside the LINE client")]
    NotInClient,

    /// A required server-side setting is missing.
    #[error("LINE integration not configured: {0}")]
    NotConfigured(&'static str),

    /// Messages violate the platform's limits.
    #[error("invalid messages: {0}")]
    InvalidMessages(String),

    /// HTTP request to the LINE platform failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The LINE platform answered with an error.
    #[error("LINE API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Options passed to [`LiffSdk::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiffInitConfig {
    pub liff_id: String,
    pub with_login_on_external_browser: bool,
}

/// An action the page must perform with the browser-side SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientDirective {
    Login,
    Logout,
    CloseWindow,
}

/// The LIFF SDK surface.
#[async_trait]
pub trait LiffSdk: Send + Sync {
    /// Initialize the SDK for a LIFF app.
    async fn init(&self, config: &LiffInitConfig) -> Result<(), LiffError>;

    /// Whether `init` has already completed successfully.
    fn is_ready(&self) -> bool;

    /// Whether the user is logged in. `false` before `init`.
    fn is_logged_in(&self) -> bool;

    /// Whether the page runs inside the LINE in-app browser.
    fn is_in_client(&self) -> bool;

    /// Start the LINE login flow.
    async fn login(&self) -> Result<(), LiffError>;

    /// Log the user out.
    async fn logout(&self) -> Result<(), LiffError>;

    /// The logged-in user's LINE profile.
    async fn get_profile(&self) -> Result<LineProfile, LiffError>;

    /// Send messages to the chat the LIFF app was opened from.
    async fn send_messages(&self, messages: &[LineMessage]) -> Result<(), LiffError>;

    /// Close the LIFF window.
    async fn close_window(&self) -> Result<(), LiffError>;

    /// Drain the actions queued for the browser.
    fn take_directives(&self) -> Vec<ClientDirective> {
        Vec::new()
    }
}
