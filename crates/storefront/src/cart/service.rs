//! The cart synchronization engine.
//!
//! Mutations run synchronously against the in-memory [`CartLines`] under a
//! mutex, then hand the full item list to the [`CartWriter`] for the identity
//! key that was current at mutation time. A background task follows the
//! [`IdentityResolver`]: each key change discards the in-memory cart and
//! reloads `carts/{key}`.
//!
//! A reload that finishes after a local mutation is discarded; the in-memory
//! state is the source of truth and its write is already queued. A reload
//! overtaken by a later identity switch is discarded as well, even when the
//! shopper has switched back to the same key.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use aqs_core::{
    CARTS_COLLECTION, CartDocument, CartItem, CartLines, CurrencyCode, IdentityKey, OrderSummary,
    Perfume, PerfumeId, clamp_quantity,
};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use super::writer::{CartWriter, RetryPolicy, SaveStatus};
use crate::identity::IdentityResolver;
use crate::store::DocumentStore;

/// What subscribers see after every change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub identity: IdentityKey,
    pub items: Vec<CartItem>,
    pub total_items: u64,
    pub summary: OrderSummary,
    /// Whether the document for `identity` has been read.
    pub loaded: bool,
    pub save_status: SaveStatus,
}

struct CartState {
    identity: IdentityKey,
    lines: CartLines,
    loaded: bool,
    /// Bumped by every mutation and identity switch.
    generation: u64,
    /// Bumped by every identity switch.
    epoch: u64,
}

/// State counters taken when a load was requested.
#[derive(Debug, Clone, Copy, Default)]
struct LoadTicket {
    epoch: u64,
    generation: u64,
}

struct CartInner<S> {
    store: S,
    writer: CartWriter<S>,
    currency: CurrencyCode,
    state: Mutex<CartState>,
    snapshots: watch::Sender<CartSnapshot>,
}

/// One shopper's cart.
///
/// The sync task stops when the service is dropped.
pub struct CartService<S> {
    inner: Arc<CartInner<S>>,
    sync: JoinHandle<()>,
}

impl<S: DocumentStore + Clone> CartService<S> {
    /// Create the service and start following `identity`.
    ///
    /// The cart for the current key is loaded in the background; watch
    /// [`CartSnapshot::loaded`]. Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(
        store: S,
        identity: &IdentityResolver,
        policy: RetryPolicy,
        currency: CurrencyCode,
    ) -> Self {
        let mut keys = identity.subscribe();
        let initial = keys.borrow_and_update().clone();
        let writer = CartWriter::new(store.clone(), policy);
        let state = CartState {
            identity: initial.clone(),
            lines: CartLines::new(),
            loaded: false,
            generation: 0,
            epoch: 0,
        };
        let (snapshots, _rx) = watch::channel(build_snapshot(
            &state,
            currency,
            writer.status(),
        ));
        let inner = Arc::new(CartInner {
            store,
            writer,
            currency,
            state: Mutex::new(state),
            snapshots,
        });

        let task_inner = Arc::clone(&inner);
        let sync = tokio::spawn(async move {
            let mut status = task_inner.writer.subscribe();
            task_inner.load(initial, LoadTicket::default()).await;
            loop {
                tokio::select! {
                    changed = keys.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let key = keys.borrow_and_update().clone();
                        task_inner.switch_to(key).await;
                    }
                    changed = status.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        status.mark_unchanged();
                        task_inner.publish(&task_inner.lock());
                    }
                }
            }
        });

        Self { inner, sync }
    }

    /// Add one unit of `perfume`. Perfumes without an id are ignored.
    pub fn add_to_cart(&self, perfume: Perfume) {
        if perfume.id.is_empty() {
            warn!("Ignoring perfume without an id");
            return;
        }
        debug!(perfume_id = %perfume.id, "Add to cart");
        self.inner.mutate(|lines| {
            lines.add(perfume);
            true
        });
    }

    /// Remove the line for `id`. Persists even when the line is absent.
    pub fn remove_from_cart(&self, id: &PerfumeId) {
        self.inner.mutate(|lines| {
            lines.remove(id);
            true
        });
    }

    /// Add one unit to an existing line; no-op when absent.
    pub fn increase_qty(&self, id: &PerfumeId) {
        self.inner.mutate(|lines| lines.increase(id));
    }

    /// Take one unit off an existing line, removing it at zero; no-op when
    /// absent.
    pub fn decrease_qty(&self, id: &PerfumeId) {
        self.inner.mutate(|lines| lines.decrease(id));
    }

    /// Set a line's quantity. The request is clamped to a non-negative
    /// integer; zero removes the line.
    pub fn set_qty(&self, id: &PerfumeId, requested: f64) {
        let quantity = clamp_quantity(requested);
        self.inner.mutate(|lines| {
            if quantity == 0 {
                lines.remove(id);
                true
            } else {
                lines.set_quantity(id, quantity)
            }
        });
    }

    /// Switch to `key` and load its document.
    pub async fn load_for_identity(&self, key: IdentityKey) {
        self.inner.switch_to(key).await;
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    /// Subscribe to snapshots, published after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CartSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Sum of all quantities.
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.inner.lock().lines.total_items()
    }

    /// Current lines.
    #[must_use]
    pub fn lines(&self) -> CartLines {
        self.inner.lock().lines.clone()
    }

    /// Key the cart currently belongs to.
    #[must_use]
    pub fn identity(&self) -> IdentityKey {
        self.inner.lock().identity.clone()
    }

    /// Persistence state of cart writes.
    #[must_use]
    pub fn save_status(&self) -> SaveStatus {
        self.inner.writer.status()
    }

    /// Wait until every queued write has finished.
    pub async fn flush(&self) {
        self.inner.writer.flush().await;
    }
}

impl<S> Drop for CartService<S> {
    fn drop(&mut self) {
        self.sync.abort();
    }
}

impl<S: DocumentStore + Clone> CartInner<S> {
    fn lock(&self) -> MutexGuard<'_, CartState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &CartState) {
        self.snapshots
            .send_replace(build_snapshot(state, self.currency, self.writer.status()));
    }

    /// Apply `f`; when it reports a change, queue a write and publish.
    fn mutate(&self, f: impl FnOnce(&mut CartLines) -> bool) {
        let mut state = self.lock();
        if !f(&mut state.lines) {
            return;
        }
        state.generation += 1;
        let patch = CartDocument::items_patch(&state.lines, now_millis());
        self.writer.enqueue(&state.identity, patch);
        self.publish(&state);
    }

    async fn switch_to(&self, key: IdentityKey) {
        let ticket = {
            let mut state = self.lock();
            state.identity = key.clone();
            state.lines = CartLines::new();
            state.loaded = false;
            state.generation += 1;
            state.epoch += 1;
            self.publish(&state);
            LoadTicket {
                epoch: state.epoch,
                generation: state.generation,
            }
        };
        self.load(key, ticket).await;
    }

    #[instrument(skip_all, fields(identity = %key))]
    async fn load(&self, key: IdentityKey, ticket: LoadTicket) {
        let lines = match self.store.get(CARTS_COLLECTION, key.as_str()).await {
            Ok(Some(doc)) => CartDocument::from_value(&doc).lines,
            Ok(None) => {
                debug!("No stored cart");
                CartLines::new()
            }
            Err(e) => {
                error!(error = %e, "Failed to load cart");
                CartLines::new()
            }
        };

        let mut state = self.lock();
        if state.epoch != ticket.epoch {
            debug!("Identity changed during load, discarding");
            return;
        }
        if state.generation == ticket.generation {
            state.lines = lines;
        } else {
            debug!("Cart changed during load, keeping local state");
        }
        state.loaded = true;
        self.publish(&state);
    }
}

fn build_snapshot(state: &CartState, currency: CurrencyCode, save_status: SaveStatus) -> CartSnapshot {
    CartSnapshot {
        identity: state.identity.clone(),
        items: state.lines.items().to_vec(),
        total_items: state.lines.total_items(),
        summary: state.lines.summary(currency),
        loaded: state.loaded,
        save_status,
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use aqs_core::{AuthUser, GuestId, UserId};
    use serde_json::{Value, json};

    use super::*;
    use crate::identity::AuthEvents;
    use crate::store::MemoryStore;

    struct Harness {
        store: MemoryStore,
        events: AuthEvents,
        _resolver: IdentityResolver,
        cart: CartService<MemoryStore>,
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        }
    }

    fn perfume(id: &str, price: i64) -> Perfume {
        Perfume::normalize(&json!({"id": id, "name": id, "price": price}))
    }

    async fn wait_until(cart: &CartService<MemoryStore>, f: impl Fn(&CartSnapshot) -> bool) {
        let mut rx = cart.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| f(s)))
            .await
            .unwrap()
            .unwrap();
    }

    async fn harness(store: MemoryStore) -> Harness {
        let events = AuthEvents::default();
        let resolver = IdentityResolver::spawn(&events, GuestId::new("g1"));
        let cart = CartService::spawn(store.clone(), &resolver, policy(), CurrencyCode::BHD);
        wait_until(&cart, |s| s.loaded).await;
        Harness {
            store,
            events,
            _resolver: resolver,
            cart,
        }
    }

    fn stored_items(store: &MemoryStore, key: &str) -> Value {
        store.document(CARTS_COLLECTION, key).unwrap()["items"].clone()
    }

    #[tokio::test]
    async fn test_add_add_decrease_decrease_scenario() {
        let h = harness(MemoryStore::new()).await;
        let p1 = PerfumeId::new("p1");

        h.cart.add_to_cart(perfume("p1", 25));
        assert_eq!((h.cart.lines().len(), h.cart.total_items()), (1, 1));
        h.cart.add_to_cart(perfume("p1", 25));
        assert_eq!((h.cart.lines().len(), h.cart.total_items()), (1, 2));
        h.cart.decrease_qty(&p1);
        assert_eq!((h.cart.lines().len(), h.cart.total_items()), (1, 1));
        h.cart.decrease_qty(&p1);
        assert_eq!((h.cart.lines().len(), h.cart.total_items()), (0, 0));

        h.cart.flush().await;
        assert_eq!(stored_items(&h.store, "guest_g1"), json!([]));
    }

    #[tokio::test]
    async fn test_mutations_persist_full_item_list() {
        let h = harness(MemoryStore::new()).await;
        h.cart.add_to_cart(perfume("a", 10));
        h.cart.add_to_cart(perfume("b", 5));
        h.cart.set_qty(&PerfumeId::new("a"), 2.9);
        h.cart.flush().await;

        let items = stored_items(&h.store, "guest_g1");
        assert_eq!(items[0]["perfume"]["id"], "a");
        assert_eq!(items[0]["quantity"], 2);
        assert_eq!(items[1]["quantity"], 1);
        assert_eq!(items[0]["perfume"]["stockText"], "In Stock");
        assert!(h.store.document(CARTS_COLLECTION, "guest_g1").unwrap()["updatedAt"].is_i64());
    }

    #[tokio::test]
    async fn test_set_qty_negative_removes() {
        let h = harness(MemoryStore::new()).await;
        h.cart.add_to_cart(perfume("a", 10));
        h.cart.set_qty(&PerfumeId::new("a"), -5.0);
        assert_eq!(h.cart.total_items(), 0);
    }

    #[tokio::test]
    async fn test_remove_absent_still_persists() {
        let h = harness(MemoryStore::new()).await;
        h.cart.remove_from_cart(&PerfumeId::new("missing"));
        h.cart.flush().await;
        assert_eq!(h.store.writes_to(CARTS_COLLECTION, "guest_g1").len(), 1);

        h.cart.increase_qty(&PerfumeId::new("missing"));
        h.cart.flush().await;
        assert_eq!(h.store.writes_to(CARTS_COLLECTION, "guest_g1").len(), 1);
    }

    #[tokio::test]
    async fn test_loads_existing_cart() {
        let store = MemoryStore::new();
        store.insert(
            CARTS_COLLECTION,
            "guest_g1",
            json!({"items": [{"perfume": {"id": "a", "price": 4}, "quantity": 3}]}),
        );
        let h = harness(store).await;
        let snapshot = h.cart.snapshot();
        assert_eq!(snapshot.total_items, 3);
        assert_eq!(snapshot.summary.subtotal.amount, rust_decimal::Decimal::new(12, 0));
    }

    #[tokio::test]
    async fn test_failed_load_is_empty_cart() {
        let store = MemoryStore::new();
        store.fail_reads(true);
        let h = harness(store).await;
        assert!(h.cart.snapshot().items.is_empty());
    }

    #[tokio::test]
    async fn test_guest_to_user_reloads_exactly_once() {
        let store = MemoryStore::new();
        store.insert(
            CARTS_COLLECTION,
            "user_u1",
            json!({"items": [{"perfume": {"id": "saved"}, "quantity": 2}]}),
        );
        let h = harness(store).await;
        h.cart.add_to_cart(perfume("guest-item", 1));
        h.cart.flush().await;

        h.events.sign_in(AuthUser {
            id: UserId::new("u1"),
            email: None,
        });
        wait_until(&h.cart, |s| s.identity.as_str() == "user_u1" && s.loaded).await;

        assert_eq!(h.store.read_count(CARTS_COLLECTION, "user_u1"), 1);
        assert_eq!(h.store.read_count(CARTS_COLLECTION, "guest_g1"), 1);
        let snapshot = h.cart.snapshot();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].perfume.id.as_str(), "saved");
        assert_eq!(snapshot.total_items, 2);

        // The guest document keeps the guest's items.
        assert_eq!(stored_items(&h.store, "guest_g1")[0]["perfume"]["id"], "guest-item");
    }

    #[tokio::test]
    async fn test_local_change_during_load_wins() {
        let store = MemoryStore::new();
        store.insert(
            CARTS_COLLECTION,
            "guest_g1",
            json!({"items": [{"perfume": {"id": "stored"}, "quantity": 4}]}),
        );
        store.set_read_delay(Some(Duration::from_millis(100)));

        let events = AuthEvents::default();
        let resolver = IdentityResolver::spawn(&events, GuestId::new("g1"));
        let cart = CartService::spawn(store.clone(), &resolver, policy(), CurrencyCode::BHD);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!cart.snapshot().loaded);

        cart.add_to_cart(perfume("local", 3));
        wait_until(&cart, |s| s.loaded).await;

        let snapshot = cart.snapshot();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].perfume.id.as_str(), "local");
        assert_eq!(snapshot.total_items, 1);

        cart.flush().await;
        let items = stored_items(&store, "guest_g1");
        assert_eq!(items.as_array().unwrap().len(), 1);
        assert_eq!(items[0]["perfume"]["id"], "local");
    }

    #[tokio::test]
    async fn test_change_before_first_load_wins() {
        let store = MemoryStore::new();
        store.insert(
            CARTS_COLLECTION,
            "guest_g1",
            json!({"items": [{"perfume": {"id": "stored"}, "quantity": 4}]}),
        );
        let events = AuthEvents::default();
        let resolver = IdentityResolver::spawn(&events, GuestId::new("g1"));
        let cart = CartService::spawn(store.clone(), &resolver, policy(), CurrencyCode::BHD);
        cart.add_to_cart(perfume("local", 3));

        wait_until(&cart, |s| s.loaded).await;
        let snapshot = cart.snapshot();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].perfume.id.as_str(), "local");
    }

    #[tokio::test]
    async fn test_overtaken_load_of_same_key_is_discarded() {
        let store = MemoryStore::new();
        store.insert(
            CARTS_COLLECTION,
            "user_a",
            json!({"items": [{"perfume": {"id": "saved"}, "quantity": 2}]}),
        );
        let h = harness(store).await;
        let a = IdentityKey::user(&UserId::new("a"));

        h.store.set_read_delay(Some(Duration::from_millis(30)));
        tokio::join!(
            h.cart.load_for_identity(a.clone()),
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                h.store.set_read_delay(None);
                h.cart.load_for_identity(IdentityKey::user(&UserId::new("b"))).await;
                h.store.set_read_delay(Some(Duration::from_millis(300)));
                h.cart.load_for_identity(a.clone()).await;
            },
            async {
                tokio::time::sleep(Duration::from_millis(150)).await;
                let snapshot = h.cart.snapshot();
                assert_eq!(snapshot.identity, a);
                assert!(!snapshot.loaded);
                assert!(snapshot.items.is_empty());
            },
        );

        let snapshot = h.cart.snapshot();
        assert!(snapshot.loaded);
        assert_eq!(snapshot.total_items, 2);
        assert_eq!(snapshot.items[0].perfume.id.as_str(), "saved");
    }

    #[tokio::test]
    async fn test_save_status_reaches_snapshot() {
        let store = MemoryStore::new();
        let h = harness(store).await;
        h.store.fail_next_writes(3);
        h.cart.add_to_cart(perfume("a", 1));
        wait_until(&h.cart, |s| matches!(s.save_status, SaveStatus::Unsaved { .. })).await;
    }
}
