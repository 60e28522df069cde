//! Stats API payloads and their mapping onto store types.

use chrono::{DateTime, Utc};
use hntop_core::Item;
use serde::Deserialize;

/// Link to the discussion page of an item.
pub fn comments_link(external_id: &str) -> String {
    format!("https://news.ycombinator.com/item?id={external_id}")
}

/// Front-page listing response.
#[derive(Debug, Deserialize)]
pub struct FrontPageResponse {
    #[serde(default)]
    pub hits: Vec<FrontPageHit>,
}

/// One entry of the front-page listing.
#[derive(Debug, Deserialize)]
pub struct FrontPageHit {
    #[serde(rename = "objectID")]
    pub object_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub num_comments: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl FrontPageHit {
    /// Convert into a store item observed at `now`.
    ///
    /// Text posts have no outbound link; theirs stays empty so no preview is
    /// ever fetched for them. An unparseable creation time falls back to `now`.
    pub fn into_item(self, now: DateTime<Utc>) -> Item {
        let comments = comments_link(&self.object_id);
        let created_at = match self.created_at.as_deref().map(DateTime::parse_from_rfc3339) {
            Some(Ok(ts)) => ts.with_timezone(&Utc),
            Some(Err(e)) => {
                tracing::warn!(id = %self.object_id, error = %e, "bad created_at, using current time");
                now
            }
            None => now,
        };

        Item {
            external_id: self.object_id,
            title: self.title.unwrap_or_default(),
            link: self.url.unwrap_or_default(),
            comments_link: Some(comments),
            points: self.points.unwrap_or_default(),
            comment_count: self.num_comments.unwrap_or_default(),
            author: self.author.filter(|a| !a.is_empty()),
            created_at,
            updated_at: now,
        }
    }
}

/// Per-item payload. Comments arrive as a nested `children` tree.
#[derive(Debug, Deserialize)]
pub struct ItemPayload {
    #[serde(default)]
    pub points: Option<i64>,
    #[serde(default)]
    pub num_comments: Option<i64>,
    #[serde(default)]
    pub children: Vec<CommentNode>,
}

#[derive(Debug, Deserialize)]
pub struct CommentNode {
    #[serde(default)]
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    fn count(&self) -> i64 {
        1 + self.children.iter().map(CommentNode::count).sum::<i64>()
    }
}

/// Fresh popularity counters for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemStats {
    pub points: i64,
    pub comment_count: i64,
}

impl ItemPayload {
    /// Validate the payload into counters.
    ///
    /// A null or missing `points` counts as zero. A missing `num_comments` is
    /// derived by counting the comment tree.
    pub fn into_stats(self) -> ItemStats {
        let points = self.points.unwrap_or_default();
        let comment_count = self
            .num_comments
            .unwrap_or_else(|| self.children.iter().map(CommentNode::count).sum());
        ItemStats { points, comment_count }
    }
}
