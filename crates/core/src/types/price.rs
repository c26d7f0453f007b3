//! Type-safe price representation using decimal arithmetic.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dinars, not fils).
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::ZERO, currency_code)
    }

    /// Format for display, e.g. `"28.50 BHD"`.
    #[must_use]
    pub fn display(&self) -> String {
        format!("{:.2} {}", self.amount, self.currency_code.code())
    }
}

/// ISO 4217 currency codes accepted by the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    BHD,
    USD,
    EUR,
    GBP,
    SAR,
    AED,
}

impl CurrencyCode {
    /// The three-letter code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::BHD => "BHD",
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::SAR => "SAR",
            Self::AED => "AED",
        }
    }

    /// Parse a code case-insensitively; unknown codes yield `None`.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "BHD" => Some(Self::BHD),
            "USD" => Some(Self::USD),
            "EUR" => Some(Self::EUR),
            "GBP" => Some(Self::GBP),
            "SAR" => Some(Self::SAR),
            "AED" => Some(Self::AED),
            _ => None,
        }
    }
}

/// Flat shipping fee charged on any non-empty order (3.500 BHD).
pub const FLAT_SHIPPING: Decimal = Decimal::from_parts(35, 0, 0, false, 1);

/// Subtotal, shipping and total for a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub subtotal: Price,
    pub shipping: Price,
    pub total: Price,
}

impl OrderSummary {
    /// Build a summary from a subtotal; shipping applies only when the
    /// subtotal is positive. The total saturates at `Decimal::MAX`.
    #[must_use]
    pub fn from_subtotal(subtotal: Decimal, currency_code: CurrencyCode) -> Self {
        let shipping = if subtotal > Decimal::ZERO {
            FLAT_SHIPPING
        } else {
            Decimal::ZERO
        };
        Self {
            subtotal: Price::new(subtotal, currency_code),
            shipping: Price::new(shipping, currency_code),
            total: Price::new(subtotal.saturating_add(shipping), currency_code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_shipping_value() {
        assert_eq!(FLAT_SHIPPING, Decimal::new(35, 1));
    }

    #[test]
    fn test_summary_empty_has_no_shipping() {
        let summary = OrderSummary::from_subtotal(Decimal::ZERO, CurrencyCode::BHD);
        assert_eq!(summary.shipping.amount, Decimal::ZERO);
        assert_eq!(summary.total.amount, Decimal::ZERO);
    }

    #[test]
    fn test_summary_adds_shipping() {
        let summary = OrderSummary::from_subtotal(Decimal::new(50, 0), CurrencyCode::BHD);
        assert_eq!(summary.total.amount, Decimal::new(535, 1));
        assert_eq!(summary.total.display(), "53.50 BHD");
    }

    #[test]
    fn test_summary_total_saturates() {
        let summary = OrderSummary::from_subtotal(Decimal::MAX, CurrencyCode::BHD);
        assert_eq!(summary.shipping.amount, FLAT_SHIPPING);
        assert_eq!(summary.total.amount, Decimal::MAX);
    }

    #[test]
    fn test_currency_parse() {
        assert_eq!(CurrencyCode::parse("bhd"), Some(CurrencyCode::BHD));
        assert_eq!(CurrencyCode::parse("XYZ"), None);
    }
}
