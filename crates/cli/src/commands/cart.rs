//! Cart inspection.
//!
//! # Usage
//!
//! ```bash
//! aqs-cli cart show user_abc123
//! aqs-cli cart show guest_3f2c...
//! ```

use aqs_core::{
    CARTS_COLLECTION, CartDocument, CartItem, CheckoutContact, CurrencyCode, IdentityKey,
    OrderSummary,
};
use aqs_storefront::store::{DocumentStore, StoreError};
use serde::Serialize;
use tracing::info;

use super::CommandError;

/// A stored cart as the storefront would load it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartReport {
    pub identity: IdentityKey,
    pub items: Vec<CartItem>,
    pub total_items: u64,
    pub summary: OrderSummary,
    pub updated_at: Option<i64>,
    pub checkout: Option<CheckoutContact>,
}

/// Read and normalize `carts/{key}`; `None` when there is no document.
///
/// # Errors
///
/// Returns `StoreError` if the read fails.
pub async fn report(
    store: &impl DocumentStore,
    key: &IdentityKey,
) -> Result<Option<CartReport>, StoreError> {
    let Some(raw) = store.get(CARTS_COLLECTION, key.as_str()).await? else {
        return Ok(None);
    };
    let doc = CartDocument::from_value(&raw);
    Ok(Some(CartReport {
        identity: key.clone(),
        total_items: doc.lines.total_items(),
        summary: doc.lines.summary(CurrencyCode::default()),
        items: doc.lines.items().to_vec(),
        updated_at: doc.updated_at,
        checkout: doc.checkout,
    }))
}

/// Log the normalized cart for `key`.
///
/// # Errors
///
/// Returns an error if Firestore is not configured or the read fails.
pub async fn show(key: &str) -> Result<(), CommandError> {
    let store = super::firestore_from_env()?;
    let key = IdentityKey::from_raw(key.trim());

    match report(&store, &key).await? {
        Some(report) => {
            let pretty = serde_json::to_string_pretty(&report).unwrap_or_default();
            info!(identity = %key, "Cart document:\n{pretty}");
        }
        None => info!(identity = %key, "No cart stored for this identity"),
    }
    Ok(())
}
