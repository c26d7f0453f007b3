//! ID token verification.
//!
//! Sign-in happens client-side with the auth provider; the storefront only
//! receives the resulting ID token and resolves it to an [`AuthUser`] through
//! the Identity Toolkit `accounts:lookup` endpoint.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock, PoisonError};

use aqs_core::{AuthUser, Email, UserId};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::FirestoreConfig;

/// Errors that can occur when verifying an ID token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token is malformed, expired or revoked.
    #[error("Invalid or expired ID token")]
    InvalidToken,

    /// Sign-in is not available in this deployment.
    #[error("Sign-in is not configured")]
    NotConfigured,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with an unexpected status.
    #[error("Auth provider returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Resolves ID tokens to users.
pub trait AuthVerifier: Send + Sync + 'static {
    fn verify(&self, id_token: &str) -> impl Future<Output = Result<AuthUser, AuthError>> + Send;
}

// =============================================================================
// FirebaseAuth
// =============================================================================

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
}

impl LookupResponse {
    fn into_user(self) -> Result<AuthUser, AuthError> {
        let user = self.users.into_iter().next().ok_or(AuthError::InvalidToken)?;
        if user.local_id.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        Ok(AuthUser {
            id: UserId::new(user.local_id),
            email: user.email.and_then(|e| Email::parse(&e).ok()),
        })
    }
}

/// Identity Toolkit client.
#[derive(Clone)]
pub struct FirebaseAuth {
    inner: Arc<FirebaseAuthInner>,
}

struct FirebaseAuthInner {
    client: reqwest::Client,
    endpoint: String,
}

impl FirebaseAuth {
    #[must_use]
    pub fn new(config: &FirestoreConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Create a client sharing an existing connection pool.
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: &FirestoreConfig) -> Self {
        let endpoint = format!(
            "{}/accounts:lookup?key={}",
            config.auth_base_url,
            urlencoding::encode(config.api_key.expose_secret())
        );
        Self {
            inner: Arc::new(FirebaseAuthInner { client, endpoint }),
        }
    }
}

impl AuthVerifier for FirebaseAuth {
    #[instrument(skip_all)]
    async fn verify(&self, id_token: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .inner
            .client
            .post(&self.inner.endpoint)
            .json(&json!({ "idToken": id_token }))
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;

        if status == reqwest::StatusCode::BAD_REQUEST {
            debug!(body = %text.chars().take(200).collect::<String>(), "ID token rejected");
            return Err(AuthError::InvalidToken);
        }
        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %text.chars().take(500).collect::<String>(),
                "Identity Toolkit returned non-success status"
            );
            return Err(AuthError::Status {
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            });
        }

        serde_json::from_str::<LookupResponse>(&text)?.into_user()
    }
}

// =============================================================================
// StaticVerifier
// =============================================================================

/// Fixed token table, for the in-memory backend and tests.
///
/// With no tokens registered every sign-in fails with
/// [`AuthError::NotConfigured`].
#[derive(Clone, Default)]
pub struct StaticVerifier {
    tokens: Arc<RwLock<HashMap<String, AuthUser>>>,
}

impl StaticVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `user`.
    pub fn insert(&self, token: impl Into<String>, user: AuthUser) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.into(), user);
    }
}

impl AuthVerifier for StaticVerifier {
    async fn verify(&self, id_token: &str) -> Result<AuthUser, AuthError> {
        let tokens = self.tokens.read().unwrap_or_else(PoisonError::into_inner);
        if tokens.is_empty() {
            return Err(AuthError::NotConfigured);
        }
        tokens.get(id_token).cloned().ok_or(AuthError::InvalidToken)
    }
}

/// Verifier chosen at startup.
#[derive(Clone)]
pub enum AnyVerifier {
    Firebase(FirebaseAuth),
    Static(StaticVerifier),
}

impl AuthVerifier for AnyVerifier {
    async fn verify(&self, id_token: &str) -> Result<AuthUser, AuthError> {
        match self {
            Self::Firebase(auth) => auth.verify(id_token).await,
            Self::Static(auth) => auth.verify(id_token).await,
        }
    }
}
