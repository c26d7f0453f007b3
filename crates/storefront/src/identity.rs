//! Identity resolution.
//!
//! [`AuthEvents`] is the auth-state stream for one shopper: the current
//! [`AuthUser`] or `None` when signed out. [`IdentityResolver`] subscribes to
//! it and republishes the cart document key (`user_{uid}` or
//! `guest_{guestId}`), emitting only when the key actually changes.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use aqs_core::{AuthUser, GuestId, IdentityKey};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_sessions::Session;
use tracing::{debug, warn};

use crate::models::session::keys;

// =============================================================================
// Auth state stream
// =============================================================================

/// Auth-state stream for a single shopper.
#[derive(Debug)]
pub struct AuthEvents {
    tx: watch::Sender<Option<AuthUser>>,
}

impl AuthEvents {
    /// A stream starting in the given state.
    #[must_use]
    pub fn new(initial: Option<AuthUser>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Publish a signed-in user.
    pub fn sign_in(&self, user: AuthUser) {
        self.tx.send_replace(Some(user));
    }

    /// Publish the signed-out state.
    pub fn sign_out(&self) {
        self.tx.send_replace(None);
    }

    /// The current user, if signed in.
    #[must_use]
    pub fn current(&self) -> Option<AuthUser> {
        self.tx.borrow().clone()
    }

    /// Subscribe to auth-state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.tx.subscribe()
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new(None)
    }
}

// =============================================================================
// Guest id persistence
// =============================================================================

/// Durable storage for the anonymous guest id.
pub trait GuestIdStore: Send + Sync {
    /// The stored id, if any.
    fn load(&self) -> impl Future<Output = Option<GuestId>> + Send;

    /// Persist `id`. Failures are logged; the id stays usable for this process.
    fn save(&self, id: &GuestId) -> impl Future<Output = ()> + Send;
}

/// Return the stored guest id, generating and storing a new one on first use.
pub async fn guest_id_or_create(store: &impl GuestIdStore) -> GuestId {
    if let Some(id) = store.load().await.filter(|id| !id.is_empty()) {
        return id;
    }
    let id = GuestId::generate();
    store.save(&id).await;
    debug!(guest_id = %id, "Generated guest id");
    id
}

/// Guest id kept in the shopper's cookie session.
#[derive(Clone)]
pub struct SessionGuestStore {
    session: Session,
}

impl SessionGuestStore {
    #[must_use]
    pub const fn new(session: Session) -> Self {
        Self { session }
    }
}

impl GuestIdStore for SessionGuestStore {
    async fn load(&self) -> Option<GuestId> {
        match self.session.get::<GuestId>(keys::GUEST_ID).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Failed to read guest id from session");
                None
            }
        }
    }

    async fn save(&self, id: &GuestId) {
        if let Err(e) = self.session.insert(keys::GUEST_ID, id).await {
            warn!(error = %e, "Failed to store guest id in session");
        }
    }
}

/// Guest id kept in process memory (CLI, tests).
#[derive(Clone, Default)]
pub struct MemoryGuestStore {
    id: Arc<Mutex<Option<GuestId>>>,
}

impl MemoryGuestStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GuestIdStore for MemoryGuestStore {
    async fn load(&self) -> Option<GuestId> {
        self.id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn save(&self, id: &GuestId) {
        *self.id.lock().unwrap_or_else(PoisonError::into_inner) = Some(id.clone());
    }
}

// =============================================================================
// IdentityResolver
// =============================================================================

/// Publishes the cart document key for the current identity.
///
/// The background task stops when the resolver is dropped.
#[derive(Debug)]
pub struct IdentityResolver {
    guest_id: GuestId,
    keys: watch::Receiver<IdentityKey>,
    task: JoinHandle<()>,
}

impl IdentityResolver {
    /// Subscribe to `events` and start resolving keys.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(events: &AuthEvents, guest_id: GuestId) -> Self {
        let mut auth = events.subscribe();
        let initial = IdentityKey::resolve(auth.borrow_and_update().as_ref(), &guest_id);
        let (tx, keys) = watch::channel(initial);

        let guest = guest_id.clone();
        let task = tokio::spawn(async move {
            while auth.changed().await.is_ok() {
                let key = IdentityKey::resolve(auth.borrow_and_update().as_ref(), &guest);
                let changed = tx.send_if_modified(|current| {
                    if *current == key {
                        false
                    } else {
                        *current = key;
                        true
                    }
                });
                if changed {
                    debug!(identity = %tx.borrow().as_str(), "Identity changed");
                }
            }
        });

        Self {
            guest_id,
            keys,
            task,
        }
    }

    /// The key in effect right now.
    #[must_use]
    pub fn current(&self) -> IdentityKey {
        self.keys.borrow().clone()
    }

    /// Subscribe to key changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<IdentityKey> {
        self.keys.clone()
    }

    /// The guest id used while signed out.
    #[must_use]
    pub const fn guest_id(&self) -> &GuestId {
        &self.guest_id
    }
}

impl Drop for IdentityResolver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use aqs_core::UserId;

    use super::*;

    fn user(id: &str) -> AuthUser {
        AuthUser {
            id: UserId::new(id),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_guest_id_is_created_once() {
        let store = MemoryGuestStore::new();
        let first = guest_id_or_create(&store).await;
        let second = guest_id_or_create(&store).await;
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[tokio::test]
    async fn test_resolver_follows_sign_in_and_out() {
        let events = AuthEvents::default();
        let resolver = IdentityResolver::spawn(&events, GuestId::new("g1"));
        let mut keys = resolver.subscribe();
        assert_eq!(resolver.current().as_str(), "guest_g1");

        events.sign_in(user("u1"));
        tokio::time::timeout(Duration::from_secs(1), keys.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(keys.borrow_and_update().as_str(), "user_u1");

        events.sign_out();
        tokio::time::timeout(Duration::from_secs(1), keys.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(keys.borrow_and_update().as_str(), "guest_g1");
    }

    #[tokio::test]
    async fn test_same_user_does_not_republish() {
        let events = AuthEvents::new(Some(user("u1")));
        let resolver = IdentityResolver::spawn(&events, GuestId::new("g1"));
        let mut keys = resolver.subscribe();
        keys.mark_unchanged();

        events.sign_in(user("u1"));
        let changed = tokio::time::timeout(Duration::from_millis(100), keys.changed()).await;
        assert!(changed.is_err());
        assert_eq!(resolver.current().as_str(), "user_u1");
    }
}
