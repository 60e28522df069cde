//! Preview fetch gateway with per-URL exclusivity, bounded concurrency and
//! per-domain pacing.
//!
//! ### Waits, in order
//! 1. Per-URL lock: one in-flight fetch per URL across all callers.
//! 2. Global permit: at most `concurrency` fetches in flight (default: 5).
//! 3. Domain pacing: at least `domain_interval` between request starts to the
//!    same host (default: 1s).
//!
//! Every wait, the request and the body read race the caller's
//! [`CancellationToken`] and fail with `Error::Cancelled` when it fires.
//!
//! ### Request & Response
//! - GET with a fixed User-Agent and `Accept: text/html,application/xhtml+xml`
//! - Timeout: 10s, redirects: 10 (exceeding either is an error)
//! - Non-2xx status and non-HTML content types are errors
//! - Body read through a hard 1MB cap, whatever the declared length

pub mod locks;
pub mod pacing;
pub mod url;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use hntop_core::{AppConfig, Error, PreviewMetadata};
use reqwest::{Client, StatusCode, Url, header};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub use locks::{KeyGuard, KeyedLocks};
pub use pacing::DomainPacer;
pub use self::url::{domain_key, parse_target};

use crate::enrich::PreviewSource;
use crate::extract::{clean_preview, extract_preview};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml";

/// Configuration for the fetch gateway.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "hntop/0.1 (OpenGraph fetcher)")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 1MB)
    pub max_bytes: usize,

    /// Request timeout (default: 10s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 10)
    pub max_redirects: usize,

    /// Fetches allowed in flight at once (default: 5)
    pub concurrency: usize,

    /// Minimum spacing between requests to one domain (default: 1s)
    pub domain_interval: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.preview_max_bytes,
            timeout: config.preview_timeout(),
            max_redirects: config.preview_max_redirects,
            concurrency: config.preview_concurrency,
            domain_interval: config.domain_interval(),
        }
    }
}

/// A fetched HTML page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// The URL requested
    pub url: Url,
    /// The URL after redirects
    pub final_url: Url,
    pub status: StatusCode,
    pub content_type: String,
    /// Body bytes, cut at `max_bytes`
    pub bytes: Bytes,
    /// True when the body was longer than `max_bytes`
    pub truncated: bool,
    pub fetch_ms: u64,
}

/// Map a transport failure onto the error taxonomy.
pub(crate) fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() { Error::FetchTimeout(err.to_string()) } else { Error::Network(err.to_string()) }
}

/// Race `fut` against `cancel`.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken, fut: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

/// Rate-limited, deduplicated HTML fetcher.
///
/// Cloning is cheap; clones share locks, permits and pacing state.
#[derive(Clone)]
pub struct FetchGateway {
    http: Client,
    config: FetchConfig,
    url_locks: KeyedLocks,
    permits: Arc<Semaphore>,
    pacer: Arc<DomainPacer>,
}

impl FetchGateway {
    /// Create a new gateway with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        let permits = Arc::new(Semaphore::new(config.concurrency.max(1)));
        let pacer = Arc::new(DomainPacer::new(config.domain_interval));

        Ok(Self { http, config, url_locks: KeyedLocks::new(), permits, pacer })
    }

    /// Fetch `url` and extract its cleaned preview metadata.
    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<PreviewMetadata, Error> {
        let page = self.fetch_page(url, cancel).await?;
        let html = String::from_utf8_lossy(&page.bytes);

        // Relative images resolve against the page actually served.
        let mut preview = clean_preview(extract_preview(&html, page.final_url.as_str()));
        preview.url = url.to_string();

        tracing::debug!(url, title = ?preview.title, has_description = preview.description.is_some(), "extracted preview");
        Ok(preview)
    }

    /// Fetch the raw HTML for `url` under all gateway limits.
    pub async fn fetch_page(&self, url: &str, cancel: &CancellationToken) -> Result<FetchedPage, Error> {
        let target = parse_target(url)?;

        let _url_guard = self.url_locks.acquire(url, cancel).await?;

        let _permit = cancellable(cancel, async {
            self.permits.acquire().await.map_err(|_| Error::Cancelled)
        })
        .await?;

        self.pacer.wait(&domain_key(&target), cancel).await?;

        let page = cancellable(cancel, self.download(target)).await;
        self.pacer.prune();
        page
    }

    async fn download(&self, url: Url) -> Result<FetchedPage, Error> {
        let start = Instant::now();
        tracing::debug!(url = %url, "fetching preview");

        let mut response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, ACCEPT_HTML)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::from_status(status.as_u16(), url.as_str()));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !is_html(&content_type) {
            return Err(Error::ContentType(format!("{url}: {content_type:?}")));
        }

        let final_url = response.url().clone();
        let max_bytes = self.config.max_bytes;
        let initial = response.content_length().map_or(0, |len| len as usize).min(max_bytes);
        let mut body = BytesMut::with_capacity(initial);
        let mut truncated = false;

        while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
            let remaining = max_bytes - body.len();
            if chunk.len() >= remaining {
                body.extend_from_slice(&chunk[..remaining]);
                truncated = chunk.len() > remaining;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        let fetch_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(url = %url, final_url = %final_url, fetch_ms, bytes = body.len(), truncated, "fetched preview page");

        Ok(FetchedPage { url, final_url, status, content_type, bytes: body.freeze(), truncated, fetch_ms })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

fn is_html(content_type: &str) -> bool {
    content_type.contains("text/html") || content_type.contains("application/xhtml+xml")
}

#[async_trait]
impl PreviewSource for FetchGateway {
    async fn fetch_preview(&self, url: &str, cancel: &CancellationToken) -> Result<PreviewMetadata, Error> {
        self.fetch(url, cancel).await
    }
}
