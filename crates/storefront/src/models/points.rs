//! Points, virtual card and purchase types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bakery_points_core::{
    PaymentMethod, Price, PurchaseId, TransactionId, TransactionKind, VirtualCardProductId,
    VirtualCardStatus,
};

/// A purchasable points card from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualCardProduct {
    pub id: VirtualCardProductId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Price charged for the card.
    pub price: Price,
    /// Points credited on purchase.
    pub points_value: i64,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub status: VirtualCardStatus,
}

impl VirtualCardProduct {
    /// Whether the card can currently be bought.
    #[must_use]
    pub const fn is_purchasable(&self) -> bool {
        self.status.is_purchasable()
    }
}

/// Points balance of a user. Always read from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PointsBalance {
    pub available_points: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_earned: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_spent: Option<i64>,
}

/// A completed virtual card purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub id: PurchaseId,
    #[serde(default)]
    pub virtual_card_product_id: Option<VirtualCardProductId>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub amount: Option<Price>,
    #[serde(default)]
    pub points_added: Option<i64>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A points ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsTransaction {
    pub id: TransactionId,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    /// Signed point delta.
    pub points: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}
