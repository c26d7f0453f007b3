//! News feed posts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::id::NewsPostId;
use super::perfume::{string_field, string_list};

/// Collection holding the news feed.
pub const NEWS_COLLECTION: &str = "news_posts";

/// Field the feed is ordered by (newest first).
pub const NEWS_ORDER_FIELD: &str = "publishedAt";

/// A headline figure shown on a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsStat {
    pub value: String,
    pub label: String,
}

/// A titled body section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsSection {
    pub heading: String,
    pub body: String,
}

/// A pull quote with attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewsQuote {
    pub text: String,
    pub by: String,
}

/// A normalized news post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsPost {
    pub id: NewsPostId,
    pub slug: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub hero_image_url: Option<String>,
    pub is_featured: bool,
    pub tags: Vec<String>,
    pub stats: Vec<NewsStat>,
    pub sections: Vec<NewsSection>,
    pub quote: Option<NewsQuote>,
}

impl NewsPost {
    /// Normalize a stored post.
    #[must_use]
    pub fn from_document(doc_id: &str, raw: &Value) -> Self {
        let empty = Map::new();
        let obj = raw.as_object().unwrap_or(&empty);

        Self {
            id: NewsPostId::new(doc_id),
            slug: string_field(obj, "slug"),
            title: string_field(obj, "title"),
            subtitle: non_empty(obj, "subtitle"),
            published_at: obj.get("publishedAt").and_then(parse_timestamp),
            hero_image_url: non_empty(obj, "heroImageUrl"),
            is_featured: obj
                .get("isFeatured")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            tags: string_list(obj, "tags"),
            stats: objects(obj, "stats")
                .map(|o| NewsStat {
                    value: string_field(o, "value"),
                    label: string_field(o, "label"),
                })
                .collect(),
            sections: objects(obj, "sections")
                .map(|o| NewsSection {
                    heading: string_field(o, "heading"),
                    body: string_field(o, "body"),
                })
                .collect(),
            quote: obj.get("quote").and_then(Value::as_object).map(|o| NewsQuote {
                text: string_field(o, "text"),
                by: string_field(o, "by"),
            }),
        }
    }
}

/// The post to feature at the top of the feed: the first one flagged as
/// featured, otherwise the newest.
#[must_use]
pub fn featured(posts: &[NewsPost]) -> Option<&NewsPost> {
    posts
        .iter()
        .find(|p| p.is_featured)
        .or_else(|| posts.first())
}

fn non_empty(obj: &Map<String, Value>, key: &str) -> Option<String> {
    Some(string_field(obj, key)).filter(|s| !s.is_empty())
}

fn objects<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
) -> impl Iterator<Item = &'a Map<String, Value>> {
    obj.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// Accepts RFC 3339 strings, epoch milliseconds, and `{seconds, nanoseconds}`
/// objects.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(o) => {
            let seconds = o.get("seconds").and_then(Value::as_i64)?;
            let nanos = o
                .get("nanoseconds")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, nanos)
        }
        _ => None,
    }
}
