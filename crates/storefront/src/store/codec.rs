//! Firestore REST value encoding.
//!
//! Firestore wraps every value in a single-key object naming its type
//! (`{"stringValue": "x"}`, `{"mapValue": {"fields": {...}}}`). Integers
//! travel as decimal strings.

use serde_json::{Map, Number, Value, json};

use super::{Document, StoreError};

/// Wrap a plain JSON value.
pub fn encode(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                json!({ "integerValue": n.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or(0.0) })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Encode the fields of a document body.
pub fn encode_fields(map: &Map<String, Value>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), encode(v)))
            .collect(),
    )
}

/// Unwrap a typed value.
pub fn decode(value: &Value) -> Result<Value, StoreError> {
    let Some((kind, inner)) = value.as_object().and_then(|o| o.iter().next()) else {
        return Err(StoreError::InvalidDocument(format!(
            "expected a typed value, got {value}"
        )));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => Ok(Value::Bool(inner.as_bool().unwrap_or(false))),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed
                .map(|n| Value::Number(n.into()))
                .ok_or_else(|| StoreError::InvalidDocument(format!("bad integerValue {inner}")))
        }
        "doubleValue" => Ok(inner
            .as_f64()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number)),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => {
            Ok(Value::String(inner.as_str().unwrap_or_default().to_string()))
        }
        "geoPointValue" => Ok(inner.clone()),
        "arrayValue" => inner
            .get("values")
            .and_then(Value::as_array)
            .map_or_else(|| Ok(Vec::new()), |values| values.iter().map(decode).collect())
            .map(Value::Array),
        "mapValue" => inner
            .get("fields")
            .map_or_else(|| Ok(Value::Object(Map::new())), decode_fields),
        other => Err(StoreError::InvalidDocument(format!(
            "unsupported value type {other}"
        ))),
    }
}

/// Decode a `fields` object into a plain JSON object.
pub fn decode_fields(fields: &Value) -> Result<Value, StoreError> {
    let Some(map) = fields.as_object() else {
        return Ok(Value::Object(Map::new()));
    };
    map.iter()
        .map(|(k, v)| decode(v).map(|decoded| (k.clone(), decoded)))
        .collect::<Result<Map<_, _>, _>>()
        .map(Value::Object)
}

/// Decode a REST document resource (`{name, fields, ...}`).
pub fn decode_document(doc: &Value) -> Result<Document, StoreError> {
    let name = doc
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidDocument("document without a name".into()))?;
    let id = name.rsplit('/').next().unwrap_or(name).to_string();
    let fields = doc.get("fields").map_or_else(
        || Ok(Value::Object(Map::new())),
        decode_fields,
    )?;
    Ok(Document { id, fields })
}

/// Quote a top-level field name for use in a field path.
pub fn field_path(name: &str) -> String {
    let mut chars = name.chars();
    let simple = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_cart_document() {
        let encoded = encode(&json!({
            "items": [{"perfume": {"id": "p1", "price": 12.5}, "quantity": 2}],
            "updatedAt": 1_700_000_000_000_i64,
        }));
        let fields = &encoded["mapValue"]["fields"];
        assert_eq!(fields["updatedAt"], json!({"integerValue": "1700000000000"}));
        let item = &fields["items"]["arrayValue"]["values"][0]["mapValue"]["fields"];
        assert_eq!(item["quantity"], json!({"integerValue": "2"}));
        assert_eq!(
            item["perfume"]["mapValue"]["fields"]["price"],
            json!({"doubleValue": 12.5})
        );
    }

    #[test]
    fn test_decode_document() {
        let doc = decode_document(&json!({
            "name": "projects/p/databases/(default)/documents/news_posts/launch",
            "fields": {
                "title": {"stringValue": "Launch"},
                "publishedAt": {"timestampValue": "2025-03-01T10:00:00Z"},
                "tags": {"arrayValue": {}},
                "views": {"integerValue": "42"},
                "quote": {"mapValue": {"fields": {"by": {"stringValue": "Founder"}}}},
                "draft": {"nullValue": null},
            },
            "createTime": "2025-03-01T10:00:00Z",
        }))
        .unwrap();
        assert_eq!(doc.id, "launch");
        assert_eq!(
            doc.fields,
            json!({
                "title": "Launch",
                "publishedAt": "2025-03-01T10:00:00Z",
                "tags": [],
                "views": 42,
                "quote": {"by": "Founder"},
                "draft": null,
            })
        );
    }

    #[test]
    fn test_decode_rejects_unknown_kind() {
        assert!(decode(&json!({"mysteryValue": 1})).is_err());
        assert!(decode(&json!("plain")).is_err());
    }

    #[test]
    fn test_field_path_quoting() {
        assert_eq!(field_path("items"), "items");
        assert_eq!(field_path("checkoutUpdatedAt"), "checkoutUpdatedAt");
        assert_eq!(field_path("a@b.com"), "`a@b.com`");
        assert_eq!(field_path("9lives"), "`9lives`");
    }
}
