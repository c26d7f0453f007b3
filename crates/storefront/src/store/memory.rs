//! In-process document store.
//!
//! Used as the local development backend (`STORE_BACKEND=memory`) and as the
//! test double for the remote store. Besides plain storage it counts reads
//! per document, records every write, tracks concurrent writes per document,
//! and can be told to fail or slow down. The serving backend is built with
//! [`MemoryStore::without_history`] so read counts and write records stay
//! empty.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;

use super::{Direction, Document, DocumentStore, OrderBy, StoreError, compare_values, strip_absent};

type Key = (String, String);

/// A recorded merge write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub collection: String,
    pub id: String,
    pub fields: Value,
}

/// In-memory [`DocumentStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    docs: Mutex<HashMap<Key, Value>>,
    reads: Mutex<HashMap<Key, usize>>,
    writes: Mutex<Vec<WriteRecord>>,
    in_flight: Mutex<HashMap<Key, usize>>,
    max_in_flight: Mutex<HashMap<Key, usize>>,
    history: AtomicBool,
    fail_reads: AtomicBool,
    failing_writes: AtomicU32,
    read_delay: Mutex<Option<Duration>>,
    write_delay: Mutex<Option<Duration>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn key(collection: &str, id: &str) -> Key {
    (collection.to_string(), id.to_string())
}

impl MemoryStore {
    /// Create an empty store that records reads and writes.
    #[must_use]
    pub fn new() -> Self {
        let store = Self::default();
        store.inner.history.store(true, Ordering::SeqCst);
        store
    }

    /// Create an empty store that keeps documents only.
    #[must_use]
    pub fn without_history() -> Self {
        Self::default()
    }

    /// Replace a document outright (seeding; not counted as a write).
    pub fn insert(&self, collection: &str, id: &str, doc: Value) {
        lock(&self.inner.docs).insert(key(collection, id), doc);
    }

    /// Current content of a document.
    #[must_use]
    pub fn document(&self, collection: &str, id: &str) -> Option<Value> {
        lock(&self.inner.docs).get(&key(collection, id)).cloned()
    }

    /// Number of `get` calls made for a document.
    #[must_use]
    pub fn read_count(&self, collection: &str, id: &str) -> usize {
        lock(&self.inner.reads)
            .get(&key(collection, id))
            .copied()
            .unwrap_or(0)
    }

    /// Every successful merge write, in completion order.
    #[must_use]
    pub fn writes(&self) -> Vec<WriteRecord> {
        lock(&self.inner.writes).clone()
    }

    /// Successful writes to one document.
    #[must_use]
    pub fn writes_to(&self, collection: &str, id: &str) -> Vec<Value> {
        lock(&self.inner.writes)
            .iter()
            .filter(|w| w.collection == collection && w.id == id)
            .map(|w| w.fields.clone())
            .collect()
    }

    /// Highest number of writes that were in flight at once for a document.
    #[must_use]
    pub fn max_concurrent_writes(&self, collection: &str, id: &str) -> usize {
        lock(&self.inner.max_in_flight)
            .get(&key(collection, id))
            .copied()
            .unwrap_or(0)
    }

    /// Make every read fail until switched off.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make the next `count` writes fail.
    pub fn fail_next_writes(&self, count: u32) {
        self.inner.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Delay every read by `delay`. The document is read when the call
    /// starts, so a write landing during the delay is not seen.
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *lock(&self.inner.read_delay) = delay;
    }

    /// Delay every write by `delay` before it is applied.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        *lock(&self.inner.write_delay) = delay;
    }

    fn records_history(&self) -> bool {
        self.inner.history.load(Ordering::SeqCst)
    }

    fn take_write_failure(&self) -> bool {
        self.inner
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn enter_write(&self, k: &Key) {
        let mut in_flight = lock(&self.inner.in_flight);
        let current = in_flight.entry(k.clone()).or_insert(0);
        *current += 1;
        let mut max = lock(&self.inner.max_in_flight);
        let peak = max.entry(k.clone()).or_insert(0);
        *peak = (*peak).max(*current);
    }

    fn exit_write(&self, k: &Key) {
        if let Some(current) = lock(&self.inner.in_flight).get_mut(k) {
            *current = current.saturating_sub(1);
        }
    }
}

impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let k = key(collection, id);
        if self.records_history() {
            *lock(&self.inner.reads).entry(k.clone()).or_insert(0) += 1;
        }
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        let doc = lock(&self.inner.docs).get(&k).cloned();
        let delay = *lock(&self.inner.read_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(doc)
    }

    async fn merge(&self, collection: &str, id: &str, fields: Value) -> Result<(), StoreError> {
        let Value::Object(patch) = strip_absent(fields) else {
            return Err(StoreError::InvalidDocument(
                "merge payload must be an object".into(),
            ));
        };
        let k = key(collection, id);
        self.enter_write(&k);

        let delay = *lock(&self.inner.write_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.take_write_failure() {
            Err(StoreError::Unavailable("injected write failure".into()))
        } else {
            let mut docs = lock(&self.inner.docs);
            let doc = docs
                .entry(k.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if !doc.is_object() {
                *doc = Value::Object(serde_json::Map::new());
            }
            if let Value::Object(existing) = doc {
                for (field, value) in &patch {
                    existing.insert(field.clone(), value.clone());
                }
            }
            if self.records_history() {
                lock(&self.inner.writes).push(WriteRecord {
                    collection: collection.to_string(),
                    id: id.to_string(),
                    fields: Value::Object(patch),
                });
            }
            Ok(())
        };

        self.exit_write(&k);
        result
    }

    async fn scan(
        &self,
        collection: &str,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Document>, StoreError> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        let mut docs: Vec<Document> = lock(&self.inner.docs)
            .iter()
            .filter(|((c, _), _)| c == collection)
            .map(|((_, id), fields)| Document {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect();

        match order {
            Some(order) => {
                docs.retain(|d| d.fields.get(&order.field).is_some_and(|v| !v.is_null()));
                docs.sort_by(|a, b| {
                    let ord = compare_values(&a.fields[&order.field], &b.fields[&order.field]);
                    match order.direction {
                        Direction::Ascending => ord,
                        Direction::Descending => ord.reverse(),
                    }
                });
            }
            None => docs.sort_by(|a, b| a.id.cmp(&b.id)),
        }
        Ok(docs)
    }
}
