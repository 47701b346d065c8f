//! Request and response bodies of the backend REST API.

use serde::{Deserialize, Serialize};

use bakery_points_core::{LineUserId, PaymentMethod, VirtualCardProductId};

use super::BackendError;

/// Standard `{success, data, message}` response envelope.
///
/// The customer endpoint omits `success`, so it defaults to `true`.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

const fn default_success() -> bool {
    true
}

impl<T> Envelope<T> {
    /// Unwrap the payload, turning `success: false` into [`BackendError::Rejected`].
    pub fn into_data(self) -> Result<Option<T>, BackendError> {
        if !self.success {
            return Err(BackendError::Rejected(self.message.or(self.error)));
        }
        Ok(self.data)
    }

    /// Unwrap a payload that must be present.
    pub fn into_required(self) -> Result<T, BackendError> {
        self.into_data()?.ok_or(BackendError::MissingData)
    }
}

/// Body of `POST /api/customer/line/customer`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerLookup {
    pub line_id: LineUserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Body of `POST /api/points/virtual-cards/purchase`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseSubmission {
    pub line_user_id: LineUserId,
    pub virtual_card_product_id: VirtualCardProductId,
    pub payment_method: PaymentMethod,
    pub user_agent: String,
    pub notes: String,
}

/// Acknowledgement of an accepted purchase.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PurchaseAck {
    /// Message returned by the backend, if any.
    pub message: Option<String>,
    /// Order number, when the backend reports one.
    pub order_number: Option<String>,
}

/// Optional payload of a purchase response.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PurchasePayload {
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

impl PurchasePayload {
    pub fn order_number(self) -> Option<String> {
        self.order_number.or_else(|| {
            self.id.and_then(|id| match id {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        })
    }
}
