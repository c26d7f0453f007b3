//! News feed.

use aqs_core::{NEWS_COLLECTION, NEWS_ORDER_FIELD, NewsPost, featured};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::store::{DocumentStore, OrderBy, StoreError};

/// Listing error shown in place of the feed.
pub const FEED_ERROR: &str = "Failed to load news feed.";

/// Posts newest first, with the one to feature at the top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsFeed {
    pub featured: Option<NewsPost>,
    pub posts: Vec<NewsPost>,
}

/// Read all posts ordered by `publishedAt`, newest first.
///
/// # Errors
///
/// Returns `StoreError` if the collection cannot be read.
#[instrument(skip(store))]
pub async fn news_feed(store: &impl DocumentStore) -> Result<NewsFeed, StoreError> {
    let docs = store
        .scan(NEWS_COLLECTION, Some(&OrderBy::descending(NEWS_ORDER_FIELD)))
        .await?;
    let posts: Vec<NewsPost> = docs
        .iter()
        .map(|doc| NewsPost::from_document(&doc.id, &doc.fields))
        .collect();
    debug!(count = posts.len(), "Loaded news feed");
    Ok(NewsFeed {
        featured: featured(&posts).cloned(),
        posts,
    })
}

/// One post by document id.
///
/// # Errors
///
/// Returns `StoreError` if the document cannot be read.
pub async fn news_post(store: &impl DocumentStore, id: &str) -> Result<Option<NewsPost>, StoreError> {
    Ok(store
        .get(NEWS_COLLECTION, id)
        .await?
        .map(|raw| NewsPost::from_document(id, &raw)))
}
