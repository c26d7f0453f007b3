//! Checkout initiation.
//!
//! Holds the shopper's contact fields, saves them to the cart document after
//! a quiet period, and starts a payment session for the current cart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use aqs_core::{
    CARTS_COLLECTION, CartDocument, CheckoutContact, ContactValidation, CurrencyCode,
    IdentityKey, OrderSummary,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::cart::CartService;
use crate::debounce::Debouncer;
use crate::payments::{CreateSessionRequest, PayMethod, PaymentError, PaymentGateway, PaymentSession};
use crate::store::{DocumentStore, StoreError};

/// Errors that can occur when starting a payment.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Nothing to pay for.
    #[error("Your cart is empty.")]
    EmptyCart,

    /// Email or address failed validation.
    #[error("Please enter a valid email and full shipping address.")]
    InvalidContact(ContactValidation),

    /// A payment is already being started.
    #[error("A payment is already in progress.")]
    Busy,

    /// Saving the contact fields failed.
    #[error("Failed to save checkout details: {0}")]
    Store(#[from] StoreError),

    /// The payment service rejected or garbled the request.
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

/// Everything the checkout view needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutState {
    pub contact: CheckoutContact,
    pub validation: ContactValidation,
    pub item_count: usize,
    pub summary: OrderSummary,
    pub saving_contact: bool,
    pub paying: bool,
    pub can_pay: bool,
}

/// Resets a busy flag when dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct CheckoutInner<S, G> {
    store: S,
    gateway: G,
    cart: Arc<CartService<S>>,
    currency: CurrencyCode,
    contact: Mutex<CheckoutContact>,
    saving: AtomicBool,
    paying: AtomicBool,
}

/// Checkout flow for one shopper.
pub struct CheckoutService<S, G> {
    inner: Arc<CheckoutInner<S, G>>,
    debouncer: Debouncer,
}

impl<S, G> CheckoutService<S, G>
where
    S: DocumentStore + Clone,
    G: PaymentGateway,
{
    #[must_use]
    pub fn new(
        store: S,
        gateway: G,
        cart: Arc<CartService<S>>,
        debounce: Duration,
        currency: CurrencyCode,
    ) -> Self {
        Self {
            inner: Arc::new(CheckoutInner {
                store,
                gateway,
                cart,
                currency,
                contact: Mutex::new(CheckoutContact::default()),
                saving: AtomicBool::new(false),
                paying: AtomicBool::new(false),
            }),
            debouncer: Debouncer::new(debounce),
        }
    }

    /// Current contact fields as typed.
    #[must_use]
    pub fn contact(&self) -> CheckoutContact {
        self.inner.contact()
    }

    /// Update one or both contact fields and reschedule the debounced save.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn update_contact(&self, email: Option<String>, shipping_address: Option<String>) {
        let contact = {
            let mut contact = self
                .inner
                .contact
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(email) = email {
                contact.email = email;
            }
            if let Some(address) = shipping_address {
                contact.shipping_address = address;
            }
            contact.clone()
        };

        if contact.is_blank() {
            self.debouncer.cancel();
            return;
        }

        let inner = Arc::clone(&self.inner);
        self.debouncer.schedule(async move {
            let key = inner.cart.identity();
            if let Err(e) = inner.save_contact(&key, &contact).await {
                error!(identity = %key, error = %e, "Failed to save checkout details");
            }
        });
    }

    /// Form state, validation and totals.
    #[must_use]
    pub fn state(&self) -> CheckoutState {
        let contact = self.inner.contact();
        let lines = self.inner.cart.lines();
        let validation = contact.validate();
        let saving_contact = self.inner.saving.load(Ordering::SeqCst);
        let paying = self.inner.paying.load(Ordering::SeqCst);
        CheckoutState {
            can_pay: contact.can_pay(lines.len()) && !saving_contact && !paying,
            item_count: lines.len(),
            summary: lines.summary(self.inner.currency),
            contact,
            validation,
            saving_contact,
            paying,
        }
    }

    /// Whether a contact save is waiting for its quiet period.
    #[must_use]
    pub fn save_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Save the contact fields to the cart document now.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Store`] if the write fails.
    pub async fn save_contact_now(&self) -> Result<(), CheckoutError> {
        self.debouncer.cancel();
        let key = self.inner.cart.identity();
        self.inner
            .save_contact(&key, &self.inner.contact())
            .await
            .map_err(CheckoutError::from)
    }

    /// Save the contact fields, then request a payment session for the
    /// current cart.
    ///
    /// # Errors
    ///
    /// Fails without contacting the payment service when the cart is empty,
    /// the contact fields are invalid, another payment is starting, or the
    /// contact save fails. Payment service failures are returned as
    /// [`CheckoutError::Payment`].
    #[instrument(skip(self), fields(identity = tracing::field::Empty))]
    pub async fn start_payment(&self, method: PayMethod) -> Result<PaymentSession, CheckoutError> {
        let contact = self.inner.contact();
        let valid = contact.to_valid().map_err(CheckoutError::InvalidContact)?;
        let lines = self.inner.cart.lines();
        if lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let _paying = BusyGuard::acquire(&self.inner.paying).ok_or(CheckoutError::Busy)?;

        let key = self.inner.cart.identity();
        tracing::Span::current().record("identity", key.as_str());

        self.debouncer.cancel();
        self.inner.save_contact(&key, &contact).await?;

        let request = CreateSessionRequest::new(method, lines.items(), self.inner.currency, &valid);
        let session = self.inner.gateway.create_session(&request).await?;
        info!(next = %session.next_location(), "Payment session created");
        Ok(session)
    }
}

impl<S: DocumentStore, G> CheckoutInner<S, G> {
    fn contact(&self) -> CheckoutContact {
        self.contact
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn save_contact(
        &self,
        key: &IdentityKey,
        contact: &CheckoutContact,
    ) -> Result<(), StoreError> {
        if contact.is_blank() {
            return Ok(());
        }
        self.saving.store(true, Ordering::SeqCst);
        let patch = CartDocument::checkout_patch(contact, chrono::Utc::now().timestamp_millis());
        let result = self.store.merge(CARTS_COLLECTION, key.as_str(), patch).await;
        self.saving.store(false, Ordering::SeqCst);
        if result.is_ok() {
            debug!(identity = %key, "Checkout details saved");
        }
        result
    }
}
