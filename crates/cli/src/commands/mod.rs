//! CLI subcommands.

pub mod cart;
pub mod seed;

use aqs_storefront::config::{ConfigError, FirestoreConfig};
use aqs_storefront::store::{FirestoreStore, StoreError};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0} validation errors found")]
    Invalid(usize),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Connect to the Firestore project named in the environment.
///
/// # Errors
///
/// Returns `ConfigError` if the Firestore variables are missing or invalid.
pub fn firestore_from_env() -> Result<FirestoreStore, ConfigError> {
    dotenvy::dotenv().ok();
    let config = FirestoreConfig::from_env()?;
    tracing::info!(project = %config.project_id, "Using Firestore project");
    Ok(FirestoreStore::new(&config))
}
