//! News route handlers.

use aqs_core::NewsPost;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use tracing::{error, instrument};

use crate::error::{AppError, Result};
use crate::news::{FEED_ERROR, NewsFeed, news_feed, news_post};
use crate::state::AppState;

/// News feed, or the feed error in its place.
#[derive(Debug, Serialize)]
pub struct FeedResponse {
    #[serde(flatten)]
    pub feed: NewsFeed,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// Posts newest first, plus the featured one.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> (StatusCode, Json<FeedResponse>) {
    match news_feed(state.store()).await {
        Ok(feed) => (StatusCode::OK, Json(FeedResponse { feed, error: None })),
        Err(e) => {
            error!(error = %e, "Failed to load news feed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(FeedResponse {
                    feed: NewsFeed {
                        featured: None,
                        posts: Vec::new(),
                    },
                    error: Some(FEED_ERROR),
                }),
            )
        }
    }
}

/// One post by id.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<NewsPost>> {
    news_post(state.store(), &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("news post {id}")))
}
