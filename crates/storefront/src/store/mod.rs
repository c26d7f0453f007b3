//! Remote document store.
//!
//! # Architecture
//!
//! - Keyed JSON documents grouped in collections (`carts/{identityKey}`,
//!   `perfumes/{id}`, `news_posts/{id}`, `newsletter_subscribers/{email}`)
//! - Merge writes are field-level upserts: writing `items` never erases
//!   `checkout` and vice versa
//! - Absent (`null`) object fields are stripped before every write; the
//!   remote store rejects undefined values
//!
//! # Backends
//!
//! - [`FirestoreStore`] - Firestore REST API (production)
//! - [`MemoryStore`] - in-process map with failure injection (tests, local dev)
//!
//! Services are generic over [`DocumentStore`]; the binary picks a backend at
//! startup through [`AnyStore`].

mod codec;
mod firestore;
mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

use std::cmp::Ordering;
use std::future::Future;

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that can occur when talking to the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("store returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Rate limited by the store.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A document did not have the expected shape.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The store is unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited(_) | Self::Unavailable(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 408,
            Self::Parse(_) | Self::InvalidDocument(_) => false,
        }
    }
}

/// A document returned by a collection scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document id (last path segment).
    pub id: String,
    /// Document body as a JSON object.
    pub fields: Value,
}

/// Sort direction for a collection scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordering for a collection scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

impl OrderBy {
    /// Newest first on `field`.
    #[must_use]
    pub fn descending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Descending,
        }
    }
}

/// Keyed document storage.
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetch `collection/id`; `Ok(None)` when it does not exist.
    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Upsert the top-level fields of `fields` into `collection/id`, leaving
    /// other fields untouched.
    fn merge(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Read every document in `collection`, optionally ordered. Ordered scans
    /// skip documents that lack the order field.
    fn scan(
        &self,
        collection: &str,
        order: Option<&OrderBy>,
    ) -> impl Future<Output = Result<Vec<Document>, StoreError>> + Send;
}

/// Backend chosen at startup.
#[derive(Clone)]
pub enum AnyStore {
    Firestore(FirestoreStore),
    Memory(MemoryStore),
}

impl DocumentStore for AnyStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        match self {
            Self::Firestore(store) => store.get(collection, id).await,
            Self::Memory(store) => store.get(collection, id).await,
        }
    }

    async fn merge(&self, collection: &str, id: &str, fields: Value) -> Result<(), StoreError> {
        match self {
            Self::Firestore(store) => store.merge(collection, id, fields).await,
            Self::Memory(store) => store.merge(collection, id, fields).await,
        }
    }

    async fn scan(
        &self,
        collection: &str,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Document>, StoreError> {
        match self {
            Self::Firestore(store) => store.scan(collection, order).await,
            Self::Memory(store) => store.scan(collection, order).await,
        }
    }
}

/// Remove `null` object fields at every depth.
///
/// Array elements are kept in place (their own object fields are still
/// stripped) so positions do not shift.
#[must_use]
pub fn strip_absent(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_absent(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_absent).collect()),
        other => other,
    }
}

/// Order two field values the way the store does: numbers before strings,
/// numbers numerically, strings lexically.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(_), _) => Ordering::Less,
        (_, Value::Number(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
