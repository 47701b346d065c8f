//! Status enums for various entities.

use serde::{Deserialize, Serialize};

/// Catalog status of a virtual card product.
///
/// Unknown values from the backend deserialize to [`VirtualCardStatus::Unknown`]
/// and are treated as not purchasable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VirtualCardStatus {
    #[default]
    Active,
    Inactive,
    #[serde(other)]
    Unknown,
}

impl VirtualCardStatus {
    /// Whether a product with this status may be purchased.
    #[must_use]
    pub const fn is_purchasable(self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Payment method submitted with a purchase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    LinePay,
    CreditCard,
    BankTransfer,
    Cash,
}

impl PaymentMethod {
    /// Every method, in the order they are offered.
    pub const ALL: [Self; 4] = [Self::LinePay, Self::CreditCard, Self::BankTransfer, Self::Cash];

    /// Wire value, as used in request bodies and query parameters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LinePay => "line_pay",
            Self::CreditCard => "credit_card",
            Self::BankTransfer => "bank_transfer",
            Self::Cash => "cash",
        }
    }

    /// Human-readable label shown on confirmation pages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::LinePay => "LINE Pay",
            Self::CreditCard => "信用卡",
            Self::BankTransfer => "銀行轉帳",
            Self::Cash => "現金",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "line_pay" => Ok(Self::LinePay),
            "credit_card" => Ok(Self::CreditCard),
            "bank_transfer" => Ok(Self::BankTransfer),
            "cash" => Ok(Self::Cash),
            _ => Err(format!("invalid payment method: {s}")),
        }
    }
}

/// Kind of a points ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Earn,
    Redeem,
    Purchase,
    Refund,
    Adjustment,
    Expire,
    #[serde(other)]
    Other,
}
