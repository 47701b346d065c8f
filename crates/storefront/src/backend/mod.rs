//! Bakery backend REST API client.
//!
//! # Architecture
//!
//! - The backend owns customers, the points ledger and the virtual card
//!   catalog; the storefront never computes balances itself.
//! - [`BackendApi`] is the seam the flows depend on; [`BackendClient`] is the
//!   `reqwest` implementation.
//! - Responses use a `{success, data, message}` envelope. Non-2xx statuses and
//!   `success: false` payloads both become [`BackendError`]s whose
//!   [`BackendError::user_message`] is the backend's own message when present.
//!
//! # Example
//!
//! ```rust,ignore
//! use bakery_points_storefront::backend::{BackendApi, BackendClient};
//!
//! let client = BackendClient::new(&config.backend)?;
//! let cards = client.virtual_cards().await?;
//! let balance = client.points_balance(customer.id).await?;
//! ```

mod client;
pub mod types;

pub use client::BackendClient;
pub use types::{CustomerLookup, PurchaseAck, PurchaseSubmission};

use async_trait::async_trait;
use thiserror::Error;

use bakery_points_core::{LineUserId, UserId};

use crate::models::{
    CustomerRecord, PointsBalance, PointsTransaction, PurchaseRecord, VirtualCardProduct,
};

/// Fallback shown to users when the backend gave no message.
pub const GENERIC_ERROR_MESSAGE: &str = "系統忙碌中，請稍後再試";

/// Errors that can occur when interacting with the backend API.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status.
    #[error("API error: {status} - {}", .message.as_deref().unwrap_or("(no message)"))]
    Api {
        status: u16,
        message: Option<String>,
    },

    /// API answered `success: false`.
    #[error("Request rejected: {}", .0.as_deref().unwrap_or("(no message)"))]
    Rejected(Option<String>),

    /// Response body could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Response did not carry the expected `data`.
    #[error("Response missing data")]
    MissingData,

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl BackendError {
    /// The message to show the user: the backend's own text, else a generic fallback.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api {
                message: Some(message),
                ..
            }
            | Self::Rejected(Some(message))
                if !message.trim().is_empty() =>
            {
                message.clone()
            }
            _ => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }

    /// HTTP status reported by the backend, if the request got that far.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Operations the storefront needs from the backend.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Look up (or create) the customer keyed by a LINE user id.
    ///
    /// Returns `None` when the backend answers `{data: null}`.
    async fn resolve_customer(
        &self,
        lookup: &CustomerLookup,
    ) -> Result<Option<CustomerRecord>, BackendError>;

    /// Current points balance of an internal user.
    async fn points_balance(&self, user_id: UserId) -> Result<PointsBalance, BackendError>;

    /// Virtual card catalog.
    async fn virtual_cards(&self) -> Result<Vec<VirtualCardProduct>, BackendError>;

    /// Submit a virtual card purchase.
    async fn purchase_virtual_card(
        &self,
        submission: &PurchaseSubmission,
    ) -> Result<PurchaseAck, BackendError>;

    /// Most recent virtual card purchases of an internal user.
    async fn purchase_history(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<PurchaseRecord>, BackendError>;

    /// Most recent points ledger entries of a LINE user.
    async fn transactions(
        &self,
        line_user_id: &LineUserId,
        limit: u32,
    ) -> Result<Vec<PointsTransaction>, BackendError>;
}
