//! Firestore REST API client.
//!
//! Talks to `{base}/projects/{project}/databases/(default)/documents` with
//! `reqwest`. Document ids are percent-encoded into the path; query strings
//! are built with `url`.

use std::sync::Arc;

use secrecy::ExposeSecret;
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use super::codec::{decode_document, encode_fields, field_path};
use super::{Direction, Document, DocumentStore, OrderBy, StoreError, strip_absent};
use crate::config::FirestoreConfig;

// =============================================================================
// FirestoreStore
// =============================================================================

/// [`DocumentStore`] backed by the Firestore REST API.
#[derive(Clone)]
pub struct FirestoreStore {
    inner: Arc<FirestoreStoreInner>,
}

struct FirestoreStoreInner {
    client: reqwest::Client,
    documents_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl FirestoreStore {
    /// Create a new client.
    #[must_use]
    pub fn new(config: &FirestoreConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create a client sharing an existing connection pool.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: &FirestoreConfig) -> Self {
        let documents_url = format!(
            "{}/projects/{}/databases/(default)/documents",
            config.base_url, config.project_id
        );
        Self {
            inner: Arc::new(FirestoreStoreInner {
                client,
                documents_url,
                api_key: config.api_key.expose_secret().to_string(),
                access_token: config
                    .access_token
                    .as_ref()
                    .map(|t| t.expose_secret().to_string()),
            }),
        }
    }

    fn document_url(&self, collection: &str, id: &str) -> Result<Url, StoreError> {
        let raw = format!(
            "{}/{}/{}",
            self.inner.documents_url,
            urlencoding::encode(collection),
            urlencoding::encode(id)
        );
        self.with_key(&raw)
    }

    fn with_key(&self, raw: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(raw)
            .map_err(|e| StoreError::InvalidDocument(format!("bad document url: {e}")))?;
        url.query_pairs_mut().append_pair("key", &self.inner.api_key);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.inner.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and return the body of a successful response.
    ///
    /// `Ok(None)` for a 404.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Option<String>, StoreError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(StoreError::RateLimited(retry_after));
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Firestore returned non-success status"
            );
            return Err(StoreError::Status {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }
        Ok(Some(body))
    }
}

impl DocumentStore for FirestoreStore {
    #[instrument(skip_all, fields(collection = %collection, id = %id))]
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let url = self.document_url(collection, id)?;
        let Some(body) = self.send(self.inner.client.get(url)).await? else {
            debug!("Document not found");
            return Ok(None);
        };
        let doc: Value = serde_json::from_str(&body)?;
        Ok(Some(decode_document(&doc)?.fields))
    }

    #[instrument(skip_all, fields(collection = %collection, id = %id))]
    async fn merge(&self, collection: &str, id: &str, fields: Value) -> Result<(), StoreError> {
        let Value::Object(map) = strip_absent(fields) else {
            return Err(StoreError::InvalidDocument(
                "merge payload must be an object".into(),
            ));
        };

        let mut url = self.document_url(collection, id)?;
        {
            let mut query = url.query_pairs_mut();
            for name in map.keys() {
                query.append_pair("updateMask.fieldPaths", &field_path(name));
            }
        }

        let body = json!({ "fields": encode_fields(&map) });
        let request = self.inner.client.patch(url).json(&body);
        match self.send(request).await? {
            Some(_) => Ok(()),
            None => Err(StoreError::Status {
                status: 404,
                message: format!("{collection}/{id} could not be written"),
            }),
        }
    }

    #[instrument(skip_all, fields(collection = %collection))]
    async fn scan(
        &self,
        collection: &str,
        order: Option<&OrderBy>,
    ) -> Result<Vec<Document>, StoreError> {
        let mut query = json!({ "from": [{ "collectionId": collection }] });
        if let Some(order) = order {
            let direction = match order.direction {
                Direction::Ascending => "ASCENDING",
                Direction::Descending => "DESCENDING",
            };
            query["orderBy"] = json!([{
                "field": { "fieldPath": field_path(&order.field) },
                "direction": direction,
            }]);
        }

        let url = self.with_key(&format!("{}:runQuery", self.inner.documents_url))?;
        let request = self
            .inner
            .client
            .post(url)
            .json(&json!({ "structuredQuery": query }));
        let Some(body) = self.send(request).await? else {
            return Ok(Vec::new());
        };

        // runQuery streams one entry per result; entries without a document
        // carry only read metadata.
        let rows: Vec<Value> = serde_json::from_str(&body)?;
        let docs = rows
            .iter()
            .filter_map(|row| row.get("document"))
            .map(decode_document)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = docs.len(), "Scanned collection");
        Ok(docs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn store() -> FirestoreStore {
        FirestoreStore::new(&FirestoreConfig {
            project_id: "aqs".to_string(),
            api_key: SecretString::from("k3y"),
            access_token: None,
            base_url: "https://firestore.googleapis.com/v1".to_string(),
            auth_base_url: "https://identitytoolkit.googleapis.com/v1".to_string(),
        })
    }

    #[test]
    fn test_document_url_encodes_id_and_adds_key() {
        let url = store()
            .document_url("newsletter_subscribers", "a+b@c.com")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://firestore.googleapis.com/v1/projects/aqs/databases/(default)/documents/newsletter_subscribers/a%2Bb%40c.com?key=k3y"
        );
    }

    #[test]
    fn test_run_query_url() {
        let s = store();
        let url = s
            .with_key(&format!("{}:runQuery", s.inner.documents_url))
            .unwrap();
        assert!(url.path().ends_with("/documents:runQuery"));
        assert_eq!(url.query(), Some("key=k3y"));
    }
}
