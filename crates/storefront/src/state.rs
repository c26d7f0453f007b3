//! Application state shared across handlers.

use std::sync::Arc;

use crate::auth::{AnyVerifier, FirebaseAuth, StaticVerifier};
use crate::catalog::Catalog;
use crate::config::{StoreBackend, StorefrontConfig};
use crate::payments::PaymentClient;
use crate::shopper::ShopperRegistry;
use crate::store::{AnyStore, FirestoreStore, MemoryStore};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// document store, the catalog cache and the live shoppers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    store: AnyStore,
    catalog: Catalog<AnyStore>,
    verifier: AnyVerifier,
    shoppers: ShopperRegistry,
}

impl AppState {
    /// Create a new application state with the backend named in `config`.
    ///
    /// HTTP clients share one connection pool.
    #[must_use]
    pub fn new(config: StorefrontConfig) -> Self {
        let client = reqwest::Client::new();
        let store = match (config.store.backend, &config.store.firestore) {
            (StoreBackend::Firestore, Some(firestore)) => {
                AnyStore::Firestore(FirestoreStore::with_client(client.clone(), firestore))
            }
            _ => AnyStore::Memory(MemoryStore::without_history()),
        };
        let verifier = config.store.firestore.as_ref().map_or_else(
            || AnyVerifier::Static(StaticVerifier::new()),
            |firestore| AnyVerifier::Firebase(FirebaseAuth::with_client(client.clone(), firestore)),
        );
        let payments = PaymentClient::with_client(client, &config.payments);
        Self::with_parts(config, store, verifier, payments)
    }

    /// Create state from explicit parts (tests, local tooling).
    #[must_use]
    pub fn with_parts(
        config: StorefrontConfig,
        store: AnyStore,
        verifier: AnyVerifier,
        payments: PaymentClient,
    ) -> Self {
        let catalog = Catalog::new(store.clone());
        let shoppers = ShopperRegistry::new(
            store.clone(),
            payments,
            config.cart,
            config.payments.currency,
        );
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                catalog,
                verifier,
                shoppers,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the document store.
    #[must_use]
    pub fn store(&self) -> &AnyStore {
        &self.inner.store
    }

    /// Get a reference to the cached catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog<AnyStore> {
        &self.inner.catalog
    }

    /// Get a reference to the ID token verifier.
    #[must_use]
    pub fn verifier(&self) -> &AnyVerifier {
        &self.inner.verifier
    }

    /// Get a reference to the live shoppers.
    #[must_use]
    pub fn shoppers(&self) -> &ShopperRegistry {
        &self.inner.shoppers
    }
}
