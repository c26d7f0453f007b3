//! Seed the catalog and news feed from a YAML file.
//!
//! # File format
//!
//! ```yaml
//! perfumes:
//!   - id: royal-oud
//!     name: Royal Oud
//!     price: 25.5
//!     notes: ["Saffron, Bergamot", "Rose", "Oud, Amber"]
//! news_posts:
//!   - id: summer-launch
//!     title: Summer Launch
//!     publishedAt: 2025-06-01T00:00:00Z
//! ```
//!
//! Every record is normalized the same way the storefront reads it before it
//! is merge-written to `perfumes/{id}` or `news_posts/{id}`.

use std::path::Path;

use aqs_core::{NEWS_COLLECTION, NewsPost, PERFUMES_COLLECTION, Perfume};
use aqs_storefront::store::{DocumentStore, StoreError};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};

use super::CommandError;

/// Seed file contents.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub perfumes: Vec<Value>,
    pub news_posts: Vec<Value>,
}

/// One document to write.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedWrite {
    pub collection: &'static str,
    pub id: String,
    pub fields: Value,
}

fn record_id(raw: &Value) -> Option<String> {
    let id = match raw.get("id")? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

fn without_id(mut fields: Value) -> Value {
    if let Some(obj) = fields.as_object_mut() {
        obj.remove("id");
    }
    fields
}

/// Normalize every record into a write, or list what is wrong.
///
/// # Errors
///
/// Returns one message per record without a usable `id`.
pub fn plan(file: &SeedFile) -> Result<Vec<SeedWrite>, Vec<String>> {
    let mut writes = Vec::new();
    let mut errors = Vec::new();

    for (i, raw) in file.perfumes.iter().enumerate() {
        match record_id(raw) {
            Some(id) => {
                let perfume = Perfume::from_document(&id, raw);
                writes.push(SeedWrite {
                    collection: PERFUMES_COLLECTION,
                    fields: without_id(perfume.to_value()),
                    id,
                });
            }
            None => errors.push(format!("perfumes[{i}]: missing id")),
        }
    }

    for (i, raw) in file.news_posts.iter().enumerate() {
        match record_id(raw) {
            Some(id) => {
                let post = NewsPost::from_document(&id, raw);
                writes.push(SeedWrite {
                    collection: NEWS_COLLECTION,
                    fields: without_id(serde_json::to_value(&post).unwrap_or(Value::Null)),
                    id,
                });
            }
            None => errors.push(format!("news_posts[{i}]: missing id")),
        }
    }

    if errors.is_empty() {
        Ok(writes)
    } else {
        Err(errors)
    }
}

/// Merge-write every planned document.
///
/// # Errors
///
/// Stops at the first failed write.
pub async fn apply(store: &impl DocumentStore, writes: &[SeedWrite]) -> Result<usize, StoreError> {
    for write in writes {
        store
            .merge(write.collection, &write.id, write.fields.clone())
            .await?;
        info!(collection = write.collection, id = %write.id, "Seeded");
    }
    Ok(writes.len())
}

/// Parse and validate a seed file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or a record is
/// invalid.
pub async fn load(file_path: &str) -> Result<Vec<SeedWrite>, CommandError> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(CommandError::NotFound(file_path.to_string()));
    }

    info!(path = %file_path, "Loading seed file");
    let content = tokio::fs::read_to_string(path).await?;
    let file: SeedFile = serde_yaml::from_str(&content)?;
    info!(
        perfumes = file.perfumes.len(),
        news_posts = file.news_posts.len(),
        "Parsed seed file"
    );

    plan(&file).map_err(|errors| {
        error!("Seed file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        CommandError::Invalid(errors.len())
    })
}

/// Seed from `file_path`. With `dry_run` nothing is written.
///
/// # Errors
///
/// Returns an error if the file is invalid, Firestore is not configured, or
/// a write fails.
pub async fn run(file_path: &str, dry_run: bool) -> Result<(), CommandError> {
    let writes = load(file_path).await?;

    if dry_run {
        for write in &writes {
            info!(collection = write.collection, id = %write.id, fields = %write.fields, "Would seed");
        }
        info!(documents = writes.len(), "Dry run complete");
        return Ok(());
    }

    let store = super::firestore_from_env()?;
    let written = apply(&store, &writes).await?;
    info!(documents = written, "Seeding complete!");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use aqs_storefront::store::MemoryStore;

    use super::*;

    const SAMPLE: &str = r#"
perfumes:
  - id: royal-oud
    name: Royal Oud
    price: 25.5
    notes: ["Saffron, Bergamot", "Rose", "Oud, Amber"]
  - id: cheap
    price: -4
news_posts:
  - id: launch
    title: Summer Launch
    publishedAt: "2025-06-01T00:00:00Z"
    isFeatured: true
"#;

    #[test]
    fn test_plan_normalizes_records() {
        let file: SeedFile = serde_yaml::from_str(SAMPLE).unwrap();
        let writes = plan(&file).unwrap();
        assert_eq!(writes.len(), 3);

        let oud = writes.first().unwrap();
        assert_eq!(oud.collection, PERFUMES_COLLECTION);
        assert_eq!(oud.id, "royal-oud");
        assert_eq!(oud.fields["stockText"], "In Stock");
        assert!(oud.fields.get("id").is_none());

        let cheap = writes.get(1).unwrap();
        assert_eq!(cheap.fields["price"].as_f64(), Some(0.0));

        let launch = writes.get(2).unwrap();
        assert_eq!(launch.collection, NEWS_COLLECTION);
        assert_eq!(launch.fields["isFeatured"], true);
    }

    #[test]
    fn test_plan_reports_missing_ids() {
        let file: SeedFile =
            serde_yaml::from_str("perfumes:\n  - name: Nameless\nnews_posts:\n  - id: ''\n").unwrap();
        let errors = plan(&file).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "perfumes[0]: missing id".to_string(),
                "news_posts[0]: missing id".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_writes_documents() {
        let file: SeedFile = serde_yaml::from_str(SAMPLE).unwrap();
        let writes = plan(&file).unwrap();
        let store = MemoryStore::new();

        assert_eq!(apply(&store, &writes).await.unwrap(), 3);
        let oud = store.document(PERFUMES_COLLECTION, "royal-oud").unwrap();
        assert_eq!(oud["name"], "Royal Oud");
        assert!(store.document(NEWS_COLLECTION, "launch").is_some());
    }
}
