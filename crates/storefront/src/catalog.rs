//! Perfume catalog.
//!
//! Reads `perfumes/*` and normalizes every record with its document id.
//! Results are cached with `moka` for 5 minutes; failed reads are not cached.

use std::sync::Arc;
use std::time::Duration;

use aqs_core::{PERFUMES_COLLECTION, Perfume, PerfumeId};
use moka::future::Cache;
use tracing::{debug, instrument};

use crate::store::{DocumentStore, StoreError};

/// Listing error shown in place of the products.
pub const LIST_ERROR: &str = "Failed to load products.";

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    All,
    One(PerfumeId),
}

#[derive(Debug, Clone)]
enum CacheValue {
    All(Arc<Vec<Perfume>>),
    One(Option<Box<Perfume>>),
}

/// Cached catalog reader.
pub struct Catalog<S> {
    inner: Arc<CatalogInner<S>>,
}

struct CatalogInner<S> {
    store: S,
    cache: Cache<CacheKey, CacheValue>,
}

impl<S> Clone for Catalog<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: DocumentStore> Catalog<S> {
    #[must_use]
    pub fn new(store: S) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        Self {
            inner: Arc::new(CatalogInner { store, cache }),
        }
    }

    /// Every perfume, in document id order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the collection cannot be read.
    #[instrument(skip(self))]
    pub async fn list_perfumes(&self) -> Result<Arc<Vec<Perfume>>, StoreError> {
        if let Some(CacheValue::All(perfumes)) = self.inner.cache.get(&CacheKey::All).await {
            debug!("Catalog cache hit");
            return Ok(perfumes);
        }

        let docs = self.inner.store.scan(PERFUMES_COLLECTION, None).await?;
        let perfumes: Arc<Vec<Perfume>> = Arc::new(
            docs.iter()
                .map(|doc| Perfume::from_document(&doc.id, &doc.fields))
                .collect(),
        );
        debug!(count = perfumes.len(), "Loaded catalog");
        self.inner
            .cache
            .insert(CacheKey::All, CacheValue::All(Arc::clone(&perfumes)))
            .await;
        Ok(perfumes)
    }

    /// One perfume by id; `Ok(None)` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the document cannot be read.
    #[instrument(skip_all, fields(perfume_id = %id))]
    pub async fn get_perfume(&self, id: &PerfumeId) -> Result<Option<Perfume>, StoreError> {
        let key = CacheKey::One(id.clone());
        if let Some(CacheValue::One(perfume)) = self.inner.cache.get(&key).await {
            return Ok(perfume.map(|p| *p));
        }

        let perfume = self
            .inner
            .store
            .get(PERFUMES_COLLECTION, id.as_str())
            .await?
            .map(|raw| Perfume::from_document(id.as_str(), &raw));
        self.inner
            .cache
            .insert(key, CacheValue::One(perfume.clone().map(Box::new)))
            .await;
        Ok(perfume)
    }

    /// Drop every cached entry (after seeding).
    pub fn invalidate(&self) {
        self.inner.cache.invalidate_all();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_list_normalizes_with_document_ids() {
        let store = MemoryStore::new();
        store.insert(PERFUMES_COLLECTION, "b", json!({"name": "Amber", "price": "12.5"}));
        store.insert(PERFUMES_COLLECTION, "a", json!({"id": "ignored", "price": -3}));
        let catalog = Catalog::new(store);

        let perfumes = catalog.list_perfumes().await.unwrap();
        let ids: Vec<_> = perfumes.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(perfumes[0].price, rust_decimal::Decimal::ZERO);
        assert_eq!(perfumes[1].stock_text, "In Stock");
        assert_eq!(perfumes[1].currency, "BHD");
    }

    #[tokio::test]
    async fn test_list_is_cached() {
        let store = MemoryStore::new();
        store.insert(PERFUMES_COLLECTION, "a", json!({}));
        let catalog = Catalog::new(store.clone());
        assert_eq!(catalog.list_perfumes().await.unwrap().len(), 1);

        store.insert(PERFUMES_COLLECTION, "b", json!({}));
        assert_eq!(catalog.list_perfumes().await.unwrap().len(), 1);

        catalog.invalidate();
        assert_eq!(catalog.list_perfumes().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_perfume() {
        let store = MemoryStore::new();
        store.insert(PERFUMES_COLLECTION, "oud", json!({"name": "Oud", "notes": ["Saffron, Rose"]}));
        let catalog = Catalog::new(store.clone());

        let oud = catalog.get_perfume(&PerfumeId::new("oud")).await.unwrap().unwrap();
        assert_eq!(oud.name, "Oud");
        assert_eq!(oud.note_tiers().top, vec!["Saffron", "Rose"]);
        assert!(catalog.get_perfume(&PerfumeId::new("nope")).await.unwrap().is_none());
        assert_eq!(store.read_count(PERFUMES_COLLECTION, "oud"), 1);
        let _ = catalog.get_perfume(&PerfumeId::new("oud")).await.unwrap();
        assert_eq!(store.read_count(PERFUMES_COLLECTION, "oud"), 1);
    }

    #[tokio::test]
    async fn test_failed_read_is_not_cached() {
        let store = MemoryStore::new();
        store.fail_reads(true);
        let catalog = Catalog::new(store.clone());
        assert!(catalog.list_perfumes().await.is_err());
        store.fail_reads(false);
        assert!(catalog.list_perfumes().await.is_ok());
    }
}
