//! Cart lines and the persisted cart document.
//!
//! [`CartLines`] is the in-memory cart: an ordered list of [`CartItem`]
//! unique by perfume id, where every quantity is at least one. All mutation
//! goes through its methods so the invariants cannot be broken from outside.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::id::PerfumeId;
use super::perfume::Perfume;
use super::price::{CurrencyCode, OrderSummary};

/// Collection holding one cart document per identity key.
pub const CARTS_COLLECTION: &str = "carts";

/// A perfume snapshot with a positive quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartItem {
    pub perfume: Perfume,
    pub quantity: u32,
}

impl CartItem {
    /// Price of this line (`price * quantity`), saturating at `Decimal::MAX`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.perfume.price.saturating_mul(Decimal::from(self.quantity))
    }
}

/// Clamp a requested quantity to a non-negative integer.
///
/// Fractions truncate toward zero; negatives, NaN and infinities below zero
/// become zero; values beyond `u32::MAX` saturate.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // range-checked before the cast
pub fn clamp_quantity(requested: f64) -> u32 {
    if requested.is_nan() || requested <= 0.0 {
        return 0;
    }
    let truncated = requested.trunc();
    if truncated >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        truncated as u32
    }
}

/// Ordered cart lines, unique by perfume id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CartLines {
    items: Vec<CartItem>,
}

impl CartLines {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Current lines in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct perfumes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Sum of all quantities.
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }

    /// Sum of all line totals, saturating at `Decimal::MAX`.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items
            .iter()
            .map(CartItem::line_total)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    /// Subtotal, shipping and total in the given currency.
    #[must_use]
    pub fn summary(&self, currency: CurrencyCode) -> OrderSummary {
        OrderSummary::from_subtotal(self.subtotal(), currency)
    }

    /// Quantity for a perfume, if it is in the cart.
    #[must_use]
    pub fn quantity_of(&self, id: &PerfumeId) -> Option<u32> {
        self.position(id).and_then(|i| self.items.get(i)).map(|item| item.quantity)
    }

    fn position(&self, id: &PerfumeId) -> Option<usize> {
        self.items.iter().position(|item| &item.perfume.id == id)
    }

    /// Add one unit of `perfume`, keeping the position of an existing line.
    pub fn add(&mut self, perfume: Perfume) {
        match self.position(&perfume.id).and_then(|i| self.items.get_mut(i)) {
            Some(item) => item.quantity = item.quantity.saturating_add(1),
            None => self.items.push(CartItem {
                perfume,
                quantity: 1,
            }),
        }
    }

    /// Remove the line for `id`. Returns whether a line was removed.
    pub fn remove(&mut self, id: &PerfumeId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| &item.perfume.id != id);
        self.items.len() != before
    }

    /// Add one unit to an existing line. Returns whether the line exists.
    pub fn increase(&mut self, id: &PerfumeId) -> bool {
        match self.position(id).and_then(|i| self.items.get_mut(i)) {
            Some(item) => {
                item.quantity = item.quantity.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Take one unit off an existing line, removing it when it reaches zero.
    /// Returns whether the line existed.
    pub fn decrease(&mut self, id: &PerfumeId) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let emptied = match self.items.get_mut(index) {
            Some(item) if item.quantity > 1 => {
                item.quantity -= 1;
                false
            }
            Some(_) => true,
            None => return false,
        };
        if emptied {
            self.items.remove(index);
        }
        true
    }

    /// Replace the quantity of an existing line; zero removes it.
    /// Returns whether the line existed.
    pub fn set_quantity(&mut self, id: &PerfumeId, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove(id);
        }
        match self.position(id).and_then(|i| self.items.get_mut(i)) {
            Some(item) => {
                item.quantity = quantity;
                true
            }
            None => false,
        }
    }

    /// Rebuild lines from a stored `items` array.
    ///
    /// Perfumes are normalized; a quantity that is not a number defaults to
    /// one, fractions truncate, and lines left below one are dropped. Lines
    /// without a perfume id are dropped and repeated ids are merged into the
    /// first occurrence.
    #[must_use]
    pub fn from_stored(items: &[Value]) -> Self {
        let mut lines = Self::new();
        for raw in items {
            let perfume = Perfume::normalize(raw.get("perfume").unwrap_or(&Value::Null));
            if perfume.id.is_empty() {
                continue;
            }
            let quantity = match raw.get("quantity").and_then(Value::as_f64) {
                Some(q) => clamp_quantity(q),
                None => 1,
            };
            if quantity == 0 {
                continue;
            }
            match lines
                .position(&perfume.id)
                .and_then(|i| lines.items.get_mut(i))
            {
                Some(existing) => {
                    existing.quantity = existing.quantity.saturating_add(quantity);
                }
                None => lines.items.push(CartItem { perfume, quantity }),
            }
        }
        lines
    }

    /// The `items` array as written to the store: perfume and quantity only.
    #[must_use]
    pub fn to_stored(&self) -> Value {
        Value::Array(
            self.items
                .iter()
                .map(|item| {
                    json!({
                        "perfume": item.perfume.to_value(),
                        "quantity": item.quantity,
                    })
                })
                .collect(),
        )
    }
}

/// Checkout contact fields stored next to the cart items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutContact {
    pub email: String,
    pub shipping_address: String,
}

/// A cart document as read from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartDocument {
    pub lines: CartLines,
    /// Milliseconds since the Unix epoch of the last cart write.
    pub updated_at: Option<i64>,
    pub checkout: Option<CheckoutContact>,
    pub checkout_updated_at: Option<i64>,
}

impl CartDocument {
    /// Normalize a raw stored document. Non-object input is an empty cart.
    #[must_use]
    pub fn from_value(raw: &Value) -> Self {
        let empty = Map::new();
        let obj = raw.as_object().unwrap_or(&empty);
        let lines = obj
            .get("items")
            .and_then(Value::as_array)
            .map_or_else(CartLines::new, |items| CartLines::from_stored(items));
        let checkout = obj.get("checkout").filter(|v| v.is_object()).map(|v| {
            CheckoutContact {
                email: v.get("email").and_then(Value::as_str).unwrap_or_default().to_string(),
                shipping_address: v
                    .get("shippingAddress")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }
        });

        Self {
            lines,
            updated_at: obj.get("updatedAt").and_then(Value::as_i64),
            checkout,
            checkout_updated_at: obj.get("checkoutUpdatedAt").and_then(Value::as_i64),
        }
    }

    /// Merge payload for an items write.
    #[must_use]
    pub fn items_patch(lines: &CartLines, updated_at: i64) -> Value {
        json!({
            "items": lines.to_stored(),
            "updatedAt": updated_at,
        })
    }

    /// Merge payload for a checkout contact write. Fields are trimmed.
    #[must_use]
    pub fn checkout_patch(contact: &CheckoutContact, updated_at: i64) -> Value {
        json!({
            "checkout": {
                "email": contact.email.trim(),
                "shippingAddress": contact.shipping_address.trim(),
            },
            "checkoutUpdatedAt": updated_at,
        })
    }
}
