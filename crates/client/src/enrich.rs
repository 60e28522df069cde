//! Preview enrichment policy.
//!
//! [`Enricher::enrich`] decides per URL whether to trust the cache, fetch, or
//! stay silent:
//!
//! 1. Empty URL: nothing, no cache or network access.
//! 2. Live success entry: returned as-is.
//! 3. Live failure entry (tombstone): nothing, no network access until it expires.
//! 4. Otherwise fetch under the enrichment timeout. Successes are cleaned and
//!    cached for the success TTL; failures are cached as a URL-only tombstone
//!    for the failure TTL.
//!
//! Lookup, fetch and store run under a per-URL lock, so concurrent requests
//! for one URL cost a single fetch: the later callers find the warm cache.
//! Errors never reach the caller; they are logged and degrade to "no preview".

use async_trait::async_trait;
use hntop_core::{AppConfig, Error, PreviewMetadata, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::extract::{clean_preview, truncate_preview};
use crate::fetch::KeyedLocks;

/// Something that can produce preview metadata for a URL.
#[async_trait]
pub trait PreviewSource: Send + Sync {
    async fn fetch_preview(&self, url: &str, cancel: &CancellationToken) -> Result<PreviewMetadata, Error>;
}

/// Enrichment policy configuration.
#[derive(Debug, Clone)]
pub struct EnrichConfig {
    /// Upper bound on one enrichment attempt (default: 15s)
    pub timeout: Duration,
    /// Cut text fields to 200/500/100 characters (default: false)
    pub truncate: bool,
    /// Enrichments started at once by [`Enricher::enrich_all`] (default: 5)
    pub concurrency: usize,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for EnrichConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout: config.enrich_timeout(),
            truncate: config.truncate_previews,
            concurrency: config.preview_concurrency,
        }
    }
}

/// Cache-first preview enricher.
///
/// Cloning is cheap; clones share the source, the store and the per-URL locks.
#[derive(Clone)]
pub struct Enricher {
    source: Arc<dyn PreviewSource>,
    store: Store,
    config: EnrichConfig,
    in_flight: KeyedLocks,
    cancel: CancellationToken,
}

impl Enricher {
    pub fn new(source: Arc<dyn PreviewSource>, store: Store, config: EnrichConfig) -> Self {
        Self { source, store, config, in_flight: KeyedLocks::new(), cancel: CancellationToken::new() }
    }

    /// Tie every attempt to `cancel`; a cancelled attempt returns nothing and
    /// writes no tombstone.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Preview for `url`, or `None` when there is none to show.
    pub async fn enrich(&self, url: &str) -> Option<PreviewMetadata> {
        if url.trim().is_empty() {
            return None;
        }

        let cancel = self.cancel.child_token();
        let timeout = self.config.timeout;
        let deadline = Instant::now() + timeout;

        let _flight = match tokio::time::timeout_at(deadline, self.in_flight.acquire(url, &cancel)).await {
            Ok(Ok(guard)) => guard,
            Ok(Err(_)) => return None,
            Err(_) => {
                tracing::warn!(url, "timed out waiting for concurrent enrichment");
                return None;
            }
        };

        match self.store.lookup_preview(url).await {
            Ok(Some(entry)) if entry.success => {
                tracing::debug!(url, "preview cache hit");
                return Some(entry.metadata);
            }
            Ok(Some(entry)) => {
                tracing::debug!(url, expires_at = %entry.expires_at, "preview tombstone, skipping fetch");
                return None;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(url, error = %e, "preview cache lookup failed, fetching anyway"),
        }

        let result = match tokio::time::timeout_at(deadline, self.source.fetch_preview(url, &cancel)).await {
            Ok(result) => result,
            Err(_) => Err(Error::FetchTimeout(format!("enrichment of {url} exceeded {timeout:?}"))),
        };

        match result {
            Ok(preview) => {
                let mut preview = clean_preview(preview);
                if self.config.truncate {
                    preview = truncate_preview(preview);
                }
                preview.url = url.to_string();

                if let Err(e) = self.store.store_preview(url, &preview, true).await {
                    tracing::warn!(url, error = %e, "failed to cache preview");
                }
                Some(preview)
            }
            Err(Error::Cancelled) => {
                tracing::debug!(url, "enrichment cancelled");
                None
            }
            Err(e) => {
                tracing::warn!(url, error = %e, rate_limited = e.is_rate_limited(), "preview fetch failed");
                if let Err(e) = self.store.store_preview(url, &PreviewMetadata::bare(url), false).await {
                    tracing::warn!(url, error = %e, "failed to cache preview tombstone");
                }
                None
            }
        }
    }

    /// Enrich many URLs concurrently. Results keep the input order.
    ///
    /// At most `concurrency` enrichments run at once, and each one's timeout
    /// starts only when it gets a slot. Queued URLs therefore never spend
    /// their deadline behind other fetches.
    pub async fn enrich_all(&self, urls: Vec<String>) -> Vec<Option<PreviewMetadata>> {
        let slots = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for (idx, url) in urls.into_iter().enumerate() {
            let enricher = self.clone();
            let slots = Arc::clone(&slots);
            tasks.spawn(async move {
                let slot = tokio::select! {
                    biased;
                    _ = enricher.cancel.cancelled() => None,
                    slot = slots.acquire_owned() => slot.ok(),
                };
                let Some(_slot) = slot else {
                    return (idx, None);
                };
                (idx, enricher.enrich(&url).await)
            });
        }

        let mut results = vec![None; tasks.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, preview)) => results[idx] = preview,
                Err(e) => tracing::error!(error = %e, "enrichment task failed"),
            }
        }
        results
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &EnrichConfig {
        &self.config
    }
}
