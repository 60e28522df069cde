//! Stats API client.
//!
//! Talks to the Algolia-hosted Hacker News API.
//!
//! ### Endpoints
//! - **Front page**: `{base}/search_by_date?tags=front_page&hitsPerPage=N`
//! - **Item**: `{base}/items/{id}`
//!
//! ### Status Classification
//! - 404/410 → `Error::NotFound` (item gone upstream)
//! - 429 → `Error::RateLimited`
//! - any other non-2xx → `Error::HttpStatus`
//! - undecodable body → `Error::Parse`

pub mod response;

pub use response::{FrontPageHit, FrontPageResponse, ItemPayload, ItemStats, comments_link};

use async_trait::async_trait;
use chrono::Utc;
use hntop_core::{AppConfig, Error, Item};
use reqwest::header;
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};

use crate::fetch::transport_error;
use crate::refresh::StatsSource;

/// Stats client configuration.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// Base URL (default: https://hn.algolia.com/api/v1).
    pub base_url: String,
    /// Request timeout (default: 30s).
    pub timeout: Duration,
    /// User-agent string (default: hntop/0.x).
    pub user_agent: String,
    /// Hits requested from the front-page listing (default: 100).
    pub front_page_size: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for StatsConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.stats_base_url.clone(),
            timeout: config.stats_timeout(),
            user_agent: config.user_agent.clone(),
            front_page_size: config.front_page_size,
        }
    }
}

/// Stats API client.
#[derive(Debug, Clone)]
pub struct StatsClient {
    http: reqwest::Client,
    config: StatsConfig,
}

impl StatsClient {
    /// Create a new stats client with the given configuration.
    pub fn new(config: StatsConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, Error> {
        let response = self
            .http
            .get(url)
            .header(header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        tracing::debug!(url, status = status.as_u16(), "stats API response");

        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), url));
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Parse(format!("{url}: {e}")))
    }

    /// Fetch the current front page as store items.
    pub async fn front_page(&self) -> Result<Vec<Item>, Error> {
        let start = Instant::now();
        let url = self.endpoint("search_by_date");
        let query = [("tags", "front_page".to_string()), ("hitsPerPage", self.config.front_page_size.to_string())];

        let listing: FrontPageResponse = self.get_json(&url, &query).await?;
        let now = Utc::now();
        let items: Vec<Item> = listing.hits.into_iter().map(|hit| hit.into_item(now)).collect();

        tracing::debug!("front page fetched in {:?}, {} items", start.elapsed(), items.len());
        Ok(items)
    }

    /// Fetch fresh counters for one item.
    pub async fn item_stats(&self, external_id: &str) -> Result<ItemStats, Error> {
        if external_id.is_empty() || !external_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidUrl(format!("bad item id: {external_id:?}")));
        }

        let url = self.endpoint(&format!("items/{external_id}"));
        let payload: ItemPayload = self.get_json(&url, &[]).await?;
        Ok(payload.into_stats())
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &StatsConfig {
        &self.config
    }
}

#[async_trait]
impl StatsSource for StatsClient {
    async fn fetch_stats(&self, external_id: &str) -> Result<ItemStats, Error> {
        self.item_stats(external_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestResponse, TestServer};

    fn client_for(server: &TestServer) -> StatsClient {
        StatsClient::new(StatsConfig { base_url: server.url("/api/v1/"), front_page_size: 2, ..Default::default() })
            .unwrap()
    }

    #[test]
    fn test_config_default() {
        let config = StatsConfig::default();
        assert_eq!(config.base_url, "https://hn.algolia.com/api/v1");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.front_page_size, 100);
    }

    #[tokio::test]
    async fn test_item_stats_classification() {
        let server = TestServer::start(|path| match path {
            "/api/v1/items/1" => TestResponse::json(r#"{"points":42,"children":[{"children":[]}]}"#),
            "/api/v1/items/2" => TestResponse::status(404),
            "/api/v1/items/3" => TestResponse::status(429),
            "/api/v1/items/4" => TestResponse::json("not json"),
            _ => TestResponse::status(503),
        })
        .await;
        let client = client_for(&server);

        assert_eq!(client.item_stats("1").await.unwrap(), ItemStats { points: 42, comment_count: 1 });
        assert!(client.item_stats("2").await.unwrap_err().is_gone_upstream());
        assert!(client.item_stats("3").await.unwrap_err().is_rate_limited());
        assert!(matches!(client.item_stats("4").await.unwrap_err(), Error::Parse(_)));
        assert!(matches!(client.item_stats("5").await.unwrap_err(), Error::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_item_stats_rejects_bad_id_without_request() {
        let server = TestServer::start(|_| TestResponse::status(500)).await;
        let client = client_for(&server);

        assert!(matches!(client.item_stats("../etc").await, Err(Error::InvalidUrl(_))));
        assert!(matches!(client.item_stats("").await, Err(Error::InvalidUrl(_))));
        assert_eq!(server.hits.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_front_page_request_and_mapping() {
        let server = TestServer::start(|_| {
            TestResponse::json(
                r#"{"hits":[
                    {"objectID":"10","title":"One","url":"https://one.example","author":"a","points":5,"num_comments":1,"created_at":"2024-01-01T00:00:00Z"},
                    {"objectID":"11","title":"Two","url":null,"author":"b","points":7,"num_comments":0,"created_at":"2024-01-02T00:00:00Z"}
                ]}"#,
            )
        })
        .await;
        let client = client_for(&server);

        let items = client.front_page().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].link, "https://one.example");
        assert!(items[1].link.is_empty());
        assert_eq!(items[1].comments_link, Some(comments_link("11")));

        let request = server.requests().pop().unwrap();
        assert!(request.starts_with("GET /api/v1/search_by_date?tags=front_page&hitsPerPage=2 "));
    }
}
