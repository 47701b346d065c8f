//! Type-safe price representation using decimal arithmetic.
//!
//! All storefront amounts are New Taiwan Dollars. The backend sends prices
//! either as JSON numbers or as numeric strings; both deserialize into
//! [`Price`].

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Mul};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price in New Taiwan Dollars.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// A zero price.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create a price from a whole-dollar amount.
    #[must_use]
    pub fn from_dollars(amount: i64) -> Self {
        Self(Decimal::from(amount))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Format for display, e.g. `NT$1,200`.
    ///
    /// Whole amounts are shown without decimals.
    #[must_use]
    pub fn display(&self) -> String {
        let rounded = self.0.round_dp(2).normalize();
        let text = rounded.abs().to_string();
        let (whole, frac) = text
            .split_once('.')
            .map_or((text.as_str(), None), |(w, f)| (w, Some(f)));
        let grouped = group_thousands(whole);
        let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
            "-"
        } else {
            ""
        };
        match frac {
            Some(frac) => format!("{sign}NT${grouped}.{frac}"),
            None => format!("{sign}NT${grouped}"),
        }
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Mul<u32> for Price {
    type Output = Self;

    fn mul(self, rhs: u32) -> Self::Output {
        Self(self.0 * Decimal::from(rhs))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_groups_thousands() {
        assert_eq!(Price::from_dollars(1200).display(), "NT$1,200");
        assert_eq!(Price::from_dollars(999).display(), "NT$999");
        assert_eq!(Price::from_dollars(1_000_000).display(), "NT$1,000,000");
    }

    #[test]
    fn test_display_keeps_cents() {
        let price = Price::new(Decimal::new(150_050, 2));
        assert_eq!(price.display(), "NT$1,500.5");
    }

    #[test]
    fn test_deserialize_number_and_string() {
        let from_number: Price = serde_json::from_str("500").unwrap();
        let from_string: Price = serde_json::from_str("\"500.00\"").unwrap();
        assert_eq!(from_number, from_string);
    }

    #[test]
    fn test_arithmetic() {
        let total: Price = [Price::from_dollars(100) * 2, Price::from_dollars(50)]
            .into_iter()
            .sum();
        assert_eq!(total, Price::from_dollars(250));
    }
}
