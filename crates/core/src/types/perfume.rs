//! Perfume catalog record and its normalization.
//!
//! Documents in the store are loosely typed and frequently partial. Every
//! boundary (catalog read, cart load, cart save) goes through
//! [`Perfume::normalize`], so a `Perfume` value always carries every field:
//! missing strings become `""`, missing lists become empty, a missing or
//! invalid price becomes zero. `stockText` and `currency` fall back to the
//! catalog defaults instead of the empty string.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::id::PerfumeId;

/// Collection holding the catalog.
pub const PERFUMES_COLLECTION: &str = "perfumes";

/// Stock label shown when a record does not carry one.
pub const DEFAULT_STOCK_TEXT: &str = "In Stock";

/// Currency assumed when a record does not carry one.
pub const DEFAULT_CURRENCY: &str = "BHD";

/// A perfume as sold in the catalog.
///
/// Deserializing always normalizes, so `serde_json::from_value::<Perfume>`
/// accepts any JSON object (and even non-objects, which become an empty
/// record).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Perfume {
    pub id: PerfumeId,
    pub name: String,
    pub brand: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub image_url: String,
    /// Top, heart and base notes at indices 0, 1 and 2.
    pub notes: Vec<String>,
    pub tagline: String,
    pub quote: String,
    pub stock_text: String,
    pub currency: String,
    pub volume: String,
    pub longevity: String,
    pub best_season: String,
    pub best_time: String,
    pub occasions: Vec<String>,
    pub perfect_for: Vec<String>,
}

impl Perfume {
    /// Normalize a raw record.
    #[must_use]
    pub fn normalize(raw: &Value) -> Self {
        let empty = Map::new();
        let obj = raw.as_object().unwrap_or(&empty);

        Self {
            id: PerfumeId::new(string_field(obj, "id")),
            name: string_field(obj, "name"),
            brand: string_field(obj, "brand"),
            description: string_field(obj, "description"),
            price: price_field(obj.get("price")),
            image_url: string_field(obj, "imageUrl"),
            notes: string_list(obj, "notes"),
            tagline: string_field(obj, "tagline"),
            quote: string_field(obj, "quote"),
            stock_text: string_or(obj, "stockText", DEFAULT_STOCK_TEXT),
            currency: string_or(obj, "currency", DEFAULT_CURRENCY),
            volume: string_field(obj, "volume"),
            longevity: string_field(obj, "longevity"),
            best_season: string_field(obj, "bestSeason"),
            best_time: string_field(obj, "bestTime"),
            occasions: string_list(obj, "occasions"),
            perfect_for: string_list(obj, "perfectFor"),
        }
    }

    /// Normalize a catalog document whose id lives outside the body.
    ///
    /// The document id wins over any `id` field stored inside the body.
    #[must_use]
    pub fn from_document(doc_id: &str, raw: &Value) -> Self {
        let mut perfume = Self::normalize(raw);
        perfume.id = PerfumeId::new(doc_id);
        perfume
    }

    /// Normalized JSON form, used for every write to the store.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Notes split into their top, heart and base tiers.
    #[must_use]
    pub fn note_tiers(&self) -> NoteTiers {
        let tier = |i: usize| self.notes.get(i).map_or_else(Vec::new, |s| split_notes(s));
        NoteTiers {
            top: tier(0),
            heart: tier(1),
            base: tier(2),
        }
    }
}

impl<'de> Deserialize<'de> for Perfume {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(Self::normalize(&raw))
    }
}

/// Notes grouped by tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NoteTiers {
    pub top: Vec<String>,
    pub heart: Vec<String>,
    pub base: Vec<String>,
}

/// Split a comma-separated note string, dropping quote marks and empty
/// entries.
#[must_use]
pub fn split_notes(raw: &str) -> Vec<String> {
    raw.replace(['"', '\u{201c}', '\u{201d}'], "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// =============================================================================
// Field helpers
// =============================================================================

pub(crate) fn string_field(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn string_or(obj: &Map<String, Value>, key: &str, default: &str) -> String {
    let value = string_field(obj, key);
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value
    }
}

pub(crate) fn string_list(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    }
}

/// Accepts JSON numbers and numeric strings; anything else, and any negative
/// amount, becomes zero.
fn price_field(value: Option<&Value>) -> Decimal {
    let parsed = match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Some(Value::String(s)) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    };
    parsed
        .filter(|d| !d.is_sign_negative())
        .map_or(Decimal::ZERO, |d| d.normalize())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn contains_null(value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Array(items) => items.iter().any(contains_null),
            Value::Object(map) => map.values().any(contains_null),
            _ => false,
        }
    }

    #[test]
    fn test_normalize_partial_record() {
        let perfume = Perfume::normalize(&json!({"id": "p1", "price": 25}));
        assert_eq!(perfume.id.as_str(), "p1");
        assert_eq!(perfume.price, Decimal::new(25, 0));
        assert_eq!(perfume.name, "");
        assert!(perfume.notes.is_empty());
        assert_eq!(perfume.stock_text, DEFAULT_STOCK_TEXT);
        assert_eq!(perfume.currency, DEFAULT_CURRENCY);
    }

    #[test]
    fn test_normalized_record_serializes_without_absent_fields() {
        let perfume = Perfume::normalize(&json!({
            "id": "p1",
            "name": null,
            "notes": ["bergamot", 3, null],
            "occasions": "not-a-list",
        }));
        let value = perfume.to_value();
        assert!(!contains_null(&value));

        let obj = value.as_object().unwrap();
        for key in [
            "id", "name", "brand", "description", "price", "imageUrl", "notes", "tagline",
            "quote", "stockText", "currency", "volume", "longevity", "bestSeason", "bestTime",
            "occasions", "perfectFor",
        ] {
            assert!(obj.contains_key(key), "missing {key}");
        }
        assert_eq!(obj["notes"], json!(["bergamot"]));
        assert_eq!(obj["occasions"], json!([]));
    }

    #[test]
    fn test_price_variants() {
        assert_eq!(price_field(Some(&json!(12.5))), Decimal::new(125, 1));
        assert_eq!(price_field(Some(&json!("7.25"))), Decimal::new(725, 2));
        assert_eq!(price_field(Some(&json!(-3))), Decimal::ZERO);
        assert_eq!(price_field(Some(&json!("abc"))), Decimal::ZERO);
        assert_eq!(price_field(None), Decimal::ZERO);
    }

    #[test]
    fn test_price_serializes_as_number() {
        let perfume = Perfume::normalize(&json!({"id": "p1", "price": 25.5}));
        assert_eq!(perfume.to_value()["price"], json!(25.5));
    }

    #[test]
    fn test_deserialize_normalizes() {
        let perfume: Perfume = serde_json::from_value(json!({"id": "x", "brand": "AQS"})).unwrap();
        assert_eq!(perfume.brand, "AQS");
        assert_eq!(perfume.image_url, "");

        let from_garbage: Perfume = serde_json::from_value(json!(42)).unwrap();
        assert!(from_garbage.id.is_empty());
    }

    #[test]
    fn test_from_document_prefers_document_id() {
        let perfume = Perfume::from_document("doc-1", &json!({"id": "stale", "name": "Oud"}));
        assert_eq!(perfume.id.as_str(), "doc-1");
        assert_eq!(perfume.name, "Oud");
    }

    #[test]
    fn test_note_tiers() {
        let perfume = Perfume::normalize(&json!({
            "notes": ["\"Bergamot, Pink Pepper\"", "Rose,, Jasmine ", "\u{201c}Oud\u{201d}"]
        }));
        let tiers = perfume.note_tiers();
        assert_eq!(tiers.top, vec!["Bergamot", "Pink Pepper"]);
        assert_eq!(tiers.heart, vec!["Rose", "Jasmine"]);
        assert_eq!(tiers.base, vec!["Oud"]);
    }

    #[test]
    fn test_note_tiers_missing() {
        let tiers = Perfume::normalize(&json!({})).note_tiers();
        assert_eq!(tiers, NoteTiers::default());
    }
}
