//! Checkout confirmation page contract.
//!
//! The checkout redirects to `/checkout/confirmation` with the totals as plain
//! query parameters instead of having the page re-fetch them. The page is
//! informational only, so anything it cannot parse is shown as an invalid
//! page rather than guessed.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use bakery_points_core::{PaymentMethod, Price};

/// Path of the confirmation page.
pub const CONFIRMATION_PATH: &str = "/checkout/confirmation";

/// What was bought.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationKind {
    VirtualCard,
    Order,
}

impl ConfirmationKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::VirtualCard => "virtual_card",
            Self::Order => "order",
        }
    }
}

impl FromStr for ConfirmationKind {
    type Err = ConfirmationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "virtual_card" => Ok(Self::VirtualCard),
            "order" => Ok(Self::Order),
            other => Err(ConfirmationError::Invalid {
                field: "type",
                value: other.to_string(),
            }),
        }
    }
}

/// Why the query could not be turned into [`ConfirmationParams`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfirmationError {
    #[error("missing parameter: {0}")]
    Missing(&'static str),

    #[error("invalid parameter {field}: {value:?}")]
    Invalid { field: &'static str, value: String },
}

/// Totals carried to the confirmation page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationParams {
    pub kind: ConfirmationKind,
    pub total_amount: Price,
    pub total_points: i64,
    pub item_count: u32,
    pub payment_method: Option<PaymentMethod>,
    pub order_number: Option<String>,
}

impl ConfirmationParams {
    /// Encode as a query string.
    #[must_use]
    pub fn to_query(&self) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("type", self.kind.as_str())
            .append_pair("totalAmount", &self.total_amount.amount().normalize().to_string())
            .append_pair("totalPoints", &self.total_points.to_string())
            .append_pair("itemCount", &self.item_count.to_string());
        if let Some(method) = self.payment_method {
            query.append_pair("paymentMethod", method.as_str());
        }
        if let Some(order_number) = &self.order_number {
            query.append_pair("orderNumber", order_number);
        }
        query.finish()
    }

    /// Path and query of the confirmation page for these totals.
    #[must_use]
    pub fn redirect_path(&self) -> String {
        format!("{CONFIRMATION_PATH}?{}", self.to_query())
    }

    /// Parse the page's query parameters.
    ///
    /// `type` and `totalAmount` are always required; `totalPoints` is required
    /// for virtual cards. Optional parameters that are present must still be
    /// valid.
    ///
    /// # Errors
    ///
    /// Returns the first missing or invalid parameter.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, ConfirmationError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut raw = RawParams::default();
        for (key, value) in pairs {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key {
                "type" => raw.kind = Some(value),
                "totalAmount" => raw.total_amount = Some(value),
                "totalPoints" => raw.total_points = Some(value),
                "itemCount" => raw.item_count = Some(value),
                "paymentMethod" => raw.payment_method = Some(value),
                "orderNumber" => raw.order_number = Some(value),
                _ => {}
            }
        }

        let kind: ConfirmationKind = raw.kind.ok_or(ConfirmationError::Missing("type"))?.parse()?;

        let total_amount = raw
            .total_amount
            .ok_or(ConfirmationError::Missing("totalAmount"))
            .and_then(|v| parse_field::<Decimal>("totalAmount", v))
            .and_then(|amount| {
                if amount.is_sign_negative() {
                    Err(invalid("totalAmount", &amount.to_string()))
                } else {
                    Ok(Price::new(amount))
                }
            })?;

        let total_points = match (raw.total_points, kind) {
            (Some(v), _) => parse_field::<i64>("totalPoints", v)?,
            (None, ConfirmationKind::VirtualCard) => {
                return Err(ConfirmationError::Missing("totalPoints"));
            }
            (None, ConfirmationKind::Order) => 0,
        };
        if total_points < 0 {
            return Err(invalid("totalPoints", &total_points.to_string()));
        }

        let item_count = raw
            .item_count
            .map(|v| parse_field::<u32>("itemCount", v))
            .transpose()?
            .unwrap_or(0);

        let payment_method = raw
            .payment_method
            .map(|v| v.parse::<PaymentMethod>().map_err(|_| invalid("paymentMethod", v)))
            .transpose()?;

        Ok(Self {
            kind,
            total_amount,
            total_points,
            item_count,
            payment_method,
            order_number: raw.order_number.map(str::to_string),
        })
    }
}

#[derive(Default)]
struct RawParams<'a> {
    kind: Option<&'a str>,
    total_amount: Option<&'a str>,
    total_points: Option<&'a str>,
    item_count: Option<&'a str>,
    payment_method: Option<&'a str>,
    order_number: Option<&'a str>,
}

fn invalid(field: &'static str, value: &str) -> ConfirmationError {
    ConfirmationError::Invalid {
        field,
        value: value.to_string(),
    }
}

fn parse_field<T: FromStr>(field: &'static str, value: &str) -> Result<T, ConfirmationError> {
    value.parse().map_err(|_| invalid(field, value))
}
