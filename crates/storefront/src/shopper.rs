//! Per-shopper services.
//!
//! A [`Shopper`] bundles everything one browser session drives: the auth
//! stream, the identity resolver, the cart and checkout. The
//! [`ShopperRegistry`] keeps them in a `moka` cache keyed by guest id and
//! drops a shopper after 30 idle minutes; queued cart writes still finish.

use std::sync::Arc;
use std::time::Duration;

use aqs_core::{AuthUser, CurrencyCode, GuestId, IdentityKey};
use moka::future::Cache;
use tower_sessions::Session;
use tracing::{debug, instrument, warn};

use crate::cart::{CartService, CartSnapshot, RetryPolicy};
use crate::checkout::CheckoutService;
use crate::config::CartSyncConfig;
use crate::identity::{AuthEvents, IdentityResolver, SessionGuestStore, guest_id_or_create};
use crate::models::session::keys;
use crate::payments::PaymentClient;
use crate::store::AnyStore;

/// How long a request waits for the cart of a new identity to load.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle time after which a shopper is dropped from memory.
const SHOPPER_IDLE: Duration = Duration::from_secs(30 * 60);

/// One browser session's services.
pub struct Shopper {
    pub events: AuthEvents,
    pub identity: IdentityResolver,
    pub cart: Arc<CartService<AnyStore>>,
    pub checkout: CheckoutService<AnyStore, PaymentClient>,
}

impl Shopper {
    fn spawn(parts: &RegistryInner, guest_id: GuestId, user: Option<AuthUser>) -> Self {
        let events = AuthEvents::new(user);
        let identity = IdentityResolver::spawn(&events, guest_id);
        let cart = Arc::new(CartService::spawn(
            parts.store.clone(),
            &identity,
            RetryPolicy::from(&parts.cart),
            parts.currency,
        ));
        let checkout = CheckoutService::new(
            parts.store.clone(),
            parts.gateway.clone(),
            Arc::clone(&cart),
            parts.cart.checkout_debounce,
            parts.currency,
        );
        Self {
            events,
            identity,
            cart,
            checkout,
        }
    }

    /// Key the cart should be on given the latest auth state.
    #[must_use]
    pub fn expected_identity(&self) -> IdentityKey {
        IdentityKey::resolve(self.events.current().as_ref(), self.identity.guest_id())
    }

    /// Publish `user` unless it is already the current auth state.
    pub fn sync_user(&self, user: Option<AuthUser>) {
        if self.events.current() == user {
            return;
        }
        match user {
            Some(user) => self.events.sign_in(user),
            None => self.events.sign_out(),
        }
    }

    /// Snapshot once the cart for the current identity has loaded.
    ///
    /// Gives up after a few seconds and returns whatever is current.
    pub async fn settled(&self) -> CartSnapshot {
        let expected = self.expected_identity();
        let mut snapshots = self.cart.subscribe();
        let wait = snapshots.wait_for(|s| s.loaded && s.identity == expected);
        match tokio::time::timeout(SETTLE_TIMEOUT, wait).await {
            Ok(Ok(snapshot)) => snapshot.clone(),
            Ok(Err(_)) | Err(_) => {
                warn!(identity = %expected, "Cart did not settle");
                self.cart.snapshot()
            }
        }
    }
}

struct RegistryInner {
    store: AnyStore,
    gateway: PaymentClient,
    cart: CartSyncConfig,
    currency: CurrencyCode,
    shoppers: Cache<GuestId, Arc<Shopper>>,
}

/// Live shoppers keyed by guest id.
#[derive(Clone)]
pub struct ShopperRegistry {
    inner: Arc<RegistryInner>,
}

impl ShopperRegistry {
    #[must_use]
    pub fn new(
        store: AnyStore,
        gateway: PaymentClient,
        cart: CartSyncConfig,
        currency: CurrencyCode,
    ) -> Self {
        let shoppers = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(SHOPPER_IDLE)
            .build();
        Self {
            inner: Arc::new(RegistryInner {
                store,
                gateway,
                cart,
                currency,
                shoppers,
            }),
        }
    }

    /// The shopper for this session, created on first use.
    ///
    /// The guest id is read from (or written to) the session, and the
    /// session's signed-in user is published to the shopper's auth stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be read.
    #[instrument(skip_all)]
    pub async fn shopper_for(
        &self,
        session: &Session,
    ) -> Result<Arc<Shopper>, tower_sessions::session::Error> {
        let guest_id = guest_id_or_create(&SessionGuestStore::new(session.clone())).await;
        let user = session.get::<AuthUser>(keys::CURRENT_USER).await?;

        let inner = &self.inner;
        let shopper = inner
            .shoppers
            .get_with(guest_id.clone(), async {
                debug!(guest_id = %guest_id, "Starting shopper");
                Arc::new(Shopper::spawn(inner, guest_id.clone(), user.clone()))
            })
            .await;
        shopper.sync_user(user);
        Ok(shopper)
    }

    /// Number of live shoppers.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.inner.shoppers.entry_count()
    }

    /// Whether no shopper is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for every shopper's queued cart writes (shutdown).
    pub async fn flush_all(&self) {
        let shoppers: Vec<Arc<Shopper>> = self.inner.shoppers.iter().map(|(_, s)| s).collect();
        for shopper in shoppers {
            shopper.cart.flush().await;
        }
    }
}
