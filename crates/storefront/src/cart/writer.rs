//! Single-flight cart write queue.
//!
//! At most one write is in flight per identity key. A state enqueued while a
//! write is running replaces any state still waiting, so only the newest
//! state is written next. Transient failures are retried with exponential
//! backoff; when the attempts run out the queue reports [`SaveStatus::Unsaved`]
//! until a later write succeeds.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use aqs_core::{CARTS_COLLECTION, IdentityKey};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::config::CartSyncConfig;
use crate::store::{DocumentStore, StoreError};

/// Persistence state shown next to the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SaveStatus {
    /// Every write has reached the store.
    Saved,
    /// Writes are pending or in flight.
    Saving,
    /// The latest write for some key failed after all attempts.
    Unsaved { error: String },
}

/// Attempts and backoff for a single write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1_u32 << attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(factor)
    }
}

impl From<&CartSyncConfig> for RetryPolicy {
    fn from(config: &CartSyncConfig) -> Self {
        Self {
            max_attempts: config.save_max_attempts.max(1),
            base_delay: config.save_backoff,
        }
    }
}

#[derive(Default)]
struct Slot {
    pending: Option<Value>,
}

#[derive(Default)]
struct Queue {
    slots: HashMap<IdentityKey, Slot>,
    /// Keys whose latest write failed.
    errors: BTreeMap<IdentityKey, String>,
}

struct WriterInner<S> {
    store: S,
    policy: RetryPolicy,
    queue: Mutex<Queue>,
    status: watch::Sender<SaveStatus>,
}

/// Cart write queue shared by one shopper's cart.
pub struct CartWriter<S> {
    inner: Arc<WriterInner<S>>,
}

impl<S> Clone for CartWriter<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: DocumentStore> CartWriter<S> {
    #[must_use]
    pub fn new(store: S, policy: RetryPolicy) -> Self {
        let (status, _rx) = watch::channel(SaveStatus::Saved);
        Self {
            inner: Arc::new(WriterInner {
                store,
                policy,
                queue: Mutex::new(Queue::default()),
                status,
            }),
        }
    }

    /// Queue `patch` for `carts/{key}` without waiting for it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn enqueue(&self, key: &IdentityKey, patch: Value) {
        let start = {
            let mut queue = self.lock();
            let idle = !queue.slots.contains_key(key);
            queue.slots.entry(key.clone()).or_default().pending = Some(patch);
            self.inner.status.send_replace(SaveStatus::Saving);
            idle
        };

        if start {
            let writer = self.clone();
            let key = key.clone();
            tokio::spawn(async move { writer.drain(key).await });
        }
    }

    /// Current persistence state.
    #[must_use]
    pub fn status(&self) -> SaveStatus {
        self.inner.status.borrow().clone()
    }

    /// Subscribe to persistence state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SaveStatus> {
        self.inner.status.subscribe()
    }

    /// Wait until no write is pending or in flight.
    pub async fn flush(&self) {
        let mut rx = self.inner.status.subscribe();
        // The sender lives as long as `self`, so this only ends on a match.
        let _ = rx.wait_for(|status| *status != SaveStatus::Saving).await;
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.inner.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the next waiting state for `key`, or retire the slot.
    fn next(&self, key: &IdentityKey) -> Option<Value> {
        let mut queue = self.lock();
        let next = queue.slots.get_mut(key).and_then(|slot| slot.pending.take());
        if next.is_none() {
            queue.slots.remove(key);
            if queue.slots.is_empty() {
                let status = queue
                    .errors
                    .values()
                    .next()
                    .cloned()
                    .map_or(SaveStatus::Saved, |error| SaveStatus::Unsaved { error });
                self.inner.status.send_replace(status);
            }
        }
        next
    }

    fn has_newer(&self, key: &IdentityKey) -> bool {
        self.lock()
            .slots
            .get(key)
            .is_some_and(|slot| slot.pending.is_some())
    }

    fn record(&self, key: &IdentityKey, result: Option<&StoreError>) {
        let mut queue = self.lock();
        match result {
            Some(e) => {
                queue.errors.insert(key.clone(), e.to_string());
            }
            None => {
                queue.errors.remove(key);
            }
        }
    }

    async fn drain(self, key: IdentityKey) {
        while let Some(patch) = self.next(&key) {
            match self.write_with_retry(&key, patch).await {
                Ok(()) => self.record(&key, None),
                Err(e) => self.record(&key, Some(&e)),
            }
        }
    }

    async fn write_with_retry(&self, key: &IdentityKey, patch: Value) -> Result<(), StoreError> {
        let policy = self.inner.policy;
        let mut attempt = 1;
        loop {
            match self
                .inner
                .store
                .merge(CARTS_COLLECTION, key.as_str(), patch.clone())
                .await
            {
                Ok(()) => {
                    debug!(identity = %key, attempt, "Cart saved");
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                    if self.has_newer(key) {
                        debug!(identity = %key, "Newer cart state queued, dropping retry");
                        return Ok(());
                    }
                    let mut delay = policy.delay_for(attempt);
                    if let StoreError::RateLimited(seconds) = &e {
                        delay = delay.max(Duration::from_secs(*seconds));
                    }
                    warn!(
                        identity = %key,
                        attempt,
                        error = %e,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Cart save failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(identity = %key, attempt, error = %e, "Cart save failed");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::MemoryStore;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let p = policy(5);
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_and_supersede() {
        let store = MemoryStore::new();
        store.set_write_delay(Some(Duration::from_millis(50)));
        let writer = CartWriter::new(store.clone(), policy(3));
        let key = IdentityKey::from_raw("guest_g1");

        writer.enqueue(&key, json!({ "items": [], "updatedAt": 1 }));
        tokio::time::sleep(Duration::from_millis(10)).await;
        for n in 2..=5 {
            writer.enqueue(&key, json!({ "items": [], "updatedAt": n }));
        }
        assert_eq!(writer.status(), SaveStatus::Saving);
        writer.flush().await;

        let writes = store.writes_to(CARTS_COLLECTION, "guest_g1");
        assert_eq!(writes.len(), 2);
        assert_eq!(writes.last().unwrap()["updatedAt"], 5);
        assert_eq!(store.max_concurrent_writes(CARTS_COLLECTION, "guest_g1"), 1);
        assert_eq!(writer.status(), SaveStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures() {
        let store = MemoryStore::new();
        store.fail_next_writes(2);
        let writer = CartWriter::new(store.clone(), policy(3));
        let key = IdentityKey::from_raw("guest_g1");

        writer.enqueue(&key, json!({ "items": [] }));
        writer.flush().await;

        assert_eq!(store.writes_to(CARTS_COLLECTION, "guest_g1").len(), 1);
        assert_eq!(writer.status(), SaveStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsaved_after_attempts_run_out_then_recovers() {
        let store = MemoryStore::new();
        store.fail_next_writes(3);
        let writer = CartWriter::new(store.clone(), policy(3));
        let key = IdentityKey::from_raw("user_u1");

        writer.enqueue(&key, json!({ "items": [] }));
        writer.flush().await;
        assert!(matches!(writer.status(), SaveStatus::Unsaved { .. }));
        assert!(store.document(CARTS_COLLECTION, "user_u1").is_none());

        writer.enqueue(&key, json!({ "items": [] }));
        writer.flush().await;
        assert_eq!(writer.status(), SaveStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let store = MemoryStore::new();
        store.set_write_delay(Some(Duration::from_millis(10)));
        let writer = CartWriter::new(store.clone(), policy(1));

        writer.enqueue(&IdentityKey::from_raw("guest_g1"), json!({ "items": [1] }));
        writer.enqueue(&IdentityKey::from_raw("user_u1"), json!({ "items": [2] }));
        writer.flush().await;

        assert_eq!(store.writes_to(CARTS_COLLECTION, "guest_g1").len(), 1);
        assert_eq!(store.writes_to(CARTS_COLLECTION, "user_u1").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_other_key_keeps_unsaved() {
        let store = MemoryStore::new();
        let writer = CartWriter::new(store.clone(), policy(1));
        let guest = IdentityKey::from_raw("guest_g1");
        let user = IdentityKey::from_raw("user_u1");

        store.fail_next_writes(1);
        writer.enqueue(&guest, json!({ "items": [1] }));
        writer.flush().await;
        assert!(matches!(writer.status(), SaveStatus::Unsaved { .. }));

        writer.enqueue(&user, json!({ "items": [2] }));
        writer.flush().await;
        assert!(store.document(CARTS_COLLECTION, "user_u1").is_some());
        assert!(matches!(writer.status(), SaveStatus::Unsaved { .. }));

        writer.enqueue(&guest, json!({ "items": [3] }));
        writer.flush().await;
        assert_eq!(writer.status(), SaveStatus::Saved);
    }
}
