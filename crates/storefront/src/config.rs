//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `PAYMENTS_BASE_URL` - Base URL of the payment-session service
//! - `FIRESTORE_PROJECT_ID` - Firestore project (firestore backend only)
//! - `FIRESTORE_API_KEY` - Web API key, also used for ID token lookups (firestore backend only)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STORE_BACKEND` - `firestore` or `memory` (default: firestore)
//! - `FIRESTORE_ACCESS_TOKEN` - OAuth bearer token for server-side access
//! - `FIRESTORE_BASE_URL` - REST endpoint (default: `https://firestore.googleapis.com/v1`)
//! - `IDENTITY_TOOLKIT_BASE_URL` - Auth endpoint (default: `https://identitytoolkit.googleapis.com/v1`)
//! - `PAYMENTS_CURRENCY` - Payment currency code (default: BHD)
//! - `CART_SAVE_MAX_ATTEMPTS` - Attempts per cart write (default: 3)
//! - `CART_SAVE_BACKOFF_MS` - First retry delay, doubled per attempt (default: 250)
//! - `CHECKOUT_SAVE_DEBOUNCE_MS` - Quiet period before saving contact fields (default: 600)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use aqs_core::CurrencyCode;
use secrecy::SecretString;
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

const DEFAULT_FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_IDENTITY_TOOLKIT_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Document store backend
    pub store: StoreConfig,
    /// Payment-session service
    pub payments: PaymentsConfig,
    /// Cart and checkout persistence tuning
    pub cart: CartSyncConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Which document store backs the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    /// In-process store; data is lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown backend '{other}' (expected firestore or memory)")),
        }
    }
}

/// Document store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Present for the firestore backend, and for the memory backend when a
    /// project is configured anyway (enables ID token sign-in).
    pub firestore: Option<FirestoreConfig>,
}

/// Firestore REST configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct FirestoreConfig {
    /// Project id
    pub project_id: String,
    /// Web API key
    pub api_key: SecretString,
    /// Optional OAuth bearer token
    pub access_token: Option<SecretString>,
    /// REST endpoint without trailing slash
    pub base_url: String,
    /// Identity Toolkit endpoint without trailing slash
    pub auth_base_url: String,
}

impl std::fmt::Debug for FirestoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreConfig")
            .field("project_id", &self.project_id)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("base_url", &self.base_url)
            .field("auth_base_url", &self.auth_base_url)
            .finish()
    }
}

/// Payment-session service configuration.
#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    /// Base URL; sessions are created at `{base_url}/api/payments/create-session`
    pub base_url: String,
    /// Currency sent with every session request
    pub currency: CurrencyCode,
}

/// Cart write retry and checkout debounce settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartSyncConfig {
    /// Attempts per cart write before it is reported unsaved
    pub save_max_attempts: u32,
    /// Delay before the first retry; doubles on each further attempt
    pub save_backoff: Duration,
    /// Quiet period before checkout contact fields are saved
    pub checkout_debounce: Duration,
}

impl Default for CartSyncConfig {
    fn default() -> Self {
        Self {
            save_max_attempts: 3,
            save_backoff: Duration::from_millis(250),
            checkout_debounce: Duration::from_millis(600),
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = parse_env::<IpAddr>("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env::<u16>("STOREFRONT_PORT", "3000")?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?;
        validate_url(&base_url, "STOREFRONT_BASE_URL")?;

        let store = StoreConfig::from_env()?;
        let payments = PaymentsConfig::from_env()?;
        let cart = CartSyncConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");

        Ok(Self {
            host,
            port,
            base_url,
            store,
            payments,
            cart,
            sentry_dsn,
            sentry_environment,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl StoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let backend = parse_env::<StoreBackend>("STORE_BACKEND", "firestore")?;
        let firestore = match backend {
            StoreBackend::Firestore => Some(FirestoreConfig::from_env()?),
            StoreBackend::Memory if get_optional_env("FIRESTORE_PROJECT_ID").is_some() => {
                Some(FirestoreConfig::from_env()?)
            }
            StoreBackend::Memory => None,
        };
        Ok(Self { backend, firestore })
    }
}

impl FirestoreConfig {
    /// Load the Firestore settings on their own (used by the CLI).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a secret
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_token = get_optional_env("FIRESTORE_ACCESS_TOKEN")
            .map(|token| {
                validate_secret_strength(&token, "FIRESTORE_ACCESS_TOKEN")?;
                Ok(SecretString::from(token))
            })
            .transpose()?;
        let base_url = trim_slash(get_env_or_default(
            "FIRESTORE_BASE_URL",
            DEFAULT_FIRESTORE_BASE_URL,
        ));
        validate_url(&base_url, "FIRESTORE_BASE_URL")?;
        let auth_base_url = trim_slash(get_env_or_default(
            "IDENTITY_TOOLKIT_BASE_URL",
            DEFAULT_IDENTITY_TOOLKIT_BASE_URL,
        ));
        validate_url(&auth_base_url, "IDENTITY_TOOLKIT_BASE_URL")?;

        Ok(Self {
            project_id: get_required_env("FIRESTORE_PROJECT_ID")?,
            api_key: get_validated_secret("FIRESTORE_API_KEY")?,
            access_token,
            base_url,
            auth_base_url,
        })
    }
}

impl PaymentsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = trim_slash(get_required_env("PAYMENTS_BASE_URL")?);
        validate_url(&base_url, "PAYMENTS_BASE_URL")?;
        let code = get_env_or_default("PAYMENTS_CURRENCY", "BHD");
        let currency = CurrencyCode::parse(&code).ok_or_else(|| {
            ConfigError::InvalidEnvVar(
                "PAYMENTS_CURRENCY".to_string(),
                format!("unsupported currency '{code}'"),
            )
        })?;
        Ok(Self { base_url, currency })
    }
}

impl CartSyncConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let save_max_attempts = parse_env::<u32>("CART_SAVE_MAX_ATTEMPTS", "3")?;
        if save_max_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CART_SAVE_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            save_max_attempts,
            save_backoff: Duration::from_millis(parse_env("CART_SAVE_BACKOFF_MS", "250")?),
            checkout_debounce: Duration::from_millis(parse_env(
                "CHECKOUT_SAVE_DEBOUNCE_MS",
                "600",
            )?),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn validate_url(value: &str, var_name: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))
}

fn trim_slash(mut value: String) -> String {
    while value.ends_with('/') {
        value.pop();
    }
    value
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the console."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
