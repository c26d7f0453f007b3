//! Newsletter sign-up.

use aqs_core::Email;
use serde_json::json;
use thiserror::Error;
use tracing::{info, instrument};

use crate::store::{DocumentStore, StoreError};

/// Collection holding one document per subscribed address.
pub const SUBSCRIBERS_COLLECTION: &str = "newsletter_subscribers";

/// Sign-up source recorded with each subscriber.
const SOURCE: &str = "footer";

/// Errors that can occur when subscribing.
#[derive(Debug, Error)]
pub enum NewsletterError {
    #[error("Please enter a valid email address.")]
    InvalidEmail,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Subscribe an address. Input is trimmed and lowercased; invalid addresses
/// are never written.
///
/// # Errors
///
/// Returns [`NewsletterError::InvalidEmail`] for a malformed address and
/// [`NewsletterError::Store`] if the write fails.
#[instrument(skip(store, raw))]
pub async fn subscribe(store: &impl DocumentStore, raw: &str) -> Result<Email, NewsletterError> {
    let email = Email::parse(&raw.trim().to_lowercase()).map_err(|_| NewsletterError::InvalidEmail)?;

    store
        .merge(
            SUBSCRIBERS_COLLECTION,
            email.as_str(),
            json!({
                "email": email.as_str(),
                "createdAt": chrono::Utc::now().timestamp_millis(),
                "source": SOURCE,
            }),
        )
        .await?;

    info!(domain = %email.domain(), "Newsletter subscription");
    Ok(email)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_subscribe_normalizes_address() {
        let store = MemoryStore::new();
        let email = subscribe(&store, "  Fan@Example.COM ").await.unwrap();
        assert_eq!(email.as_str(), "fan@example.com");

        let doc = store.document(SUBSCRIBERS_COLLECTION, "fan@example.com").unwrap();
        assert_eq!(doc["email"], "fan@example.com");
        assert_eq!(doc["source"], "footer");
        assert!(doc["createdAt"].is_i64());
    }

    #[tokio::test]
    async fn test_invalid_address_is_not_written() {
        let store = MemoryStore::new();
        let err = subscribe(&store, "not-an-email").await.unwrap_err();
        assert!(matches!(err, NewsletterError::InvalidEmail));
        assert_eq!(err.to_string(), "Please enter a valid email address.");
        assert!(store.writes().is_empty());
    }
}
