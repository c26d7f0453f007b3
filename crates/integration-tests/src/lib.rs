//! Integration tests for the AQS de Parfum storefront.
//!
//! # Running Tests
//!
//! ```bash
//! # Start a storefront on the in-memory store
//! STORE_BACKEND=memory STOREFRONT_BASE_URL=http://localhost:3000 \
//!   PAYMENTS_BASE_URL=http://localhost:4000 cargo run -p aqs-storefront
//!
//! # Run the ignored tests against it
//! cargo test -p aqs-integration-tests -- --ignored
//! ```
//!
//! Tests that need catalog data expect a seeded Firestore project
//! (`aqs-cli seed`), since the in-memory store starts empty.
//!
//! # Environment Variables
//!
//! - `STOREFRONT_URL` - storefront under test (default `http://localhost:3000`)

use reqwest::Client;
use serde_json::Value;

/// Base URL of the storefront under test.
#[must_use]
pub fn storefront_url() -> String {
    std::env::var("STOREFRONT_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// A shopper: one HTTP client with its own cookie jar, so one session.
pub struct TestShopper {
    pub client: Client,
    pub base_url: String,
}

impl TestShopper {
    /// A new shopper with an empty cookie jar.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .cookie_store(true)
                .build()
                .expect("Failed to create HTTP client"),
            base_url: storefront_url(),
        }
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// GET `path` and parse the JSON body.
    ///
    /// # Errors
    ///
    /// Returns the request or decode error.
    pub async fn get_json(&self, path: &str) -> Result<(u16, Value), reqwest::Error> {
        let response = self.client.get(self.url(path)).send().await?;
        let status = response.status().as_u16();
        Ok((status, response.json().await?))
    }

    /// Send `body` with `method` to `path` and parse the JSON body.
    ///
    /// # Errors
    ///
    /// Returns the request or decode error.
    pub async fn send_json(
        &self,
        method: reqwest::Method,
        path: &str,
        body: &Value,
    ) -> Result<(u16, Value), reqwest::Error> {
        let response = self
            .client
            .request(method, self.url(path))
            .json(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        Ok((status, response.json().await?))
    }
}

impl Default for TestShopper {
    fn default() -> Self {
        Self::new()
    }
}
