//! Stats refresh worker pool.
//!
//! ### Flow
//! - Items without an id, or whose id is in the exclusion set, are skipped.
//! - A producer task feeds ids into a bounded job queue (capacity = workers).
//! - `workers` tasks share the queue receiver and fetch one item at a time
//!   under a per-item timeout.
//! - Results flow through a bounded channel to a single consumer, the only
//!   task that writes to the store.
//!
//! ### Outcomes
//! - stats → points, comment count and updated timestamp written
//! - not found → item deleted (gone upstream)
//! - rate limited → logged, item left unchanged
//! - anything else → logged, item left unchanged
//!
//! One item's failure never aborts the batch.

use async_trait::async_trait;
use chrono::Utc;
use hntop_core::{AppConfig, Error, Item, Store};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::fetch::cancellable;
use crate::stats::ItemStats;

/// Something that can produce fresh counters for an item.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch_stats(&self, external_id: &str) -> Result<ItemStats, Error>;
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Concurrent workers (default: 10)
    pub workers: usize,
    /// Bound on one item's request (default: 30s)
    pub item_timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RefreshConfig {
    fn from(config: &AppConfig) -> Self {
        Self { workers: config.stats_workers, item_timeout: config.stats_timeout() }
    }
}

/// Outcome of one stats job.
#[derive(Debug)]
pub struct StatsResult {
    pub external_id: String,
    pub outcome: Result<ItemStats, Error>,
}

impl StatsResult {
    /// True when the item no longer exists upstream.
    pub fn is_gone_upstream(&self) -> bool {
        self.outcome.as_ref().is_err_and(Error::is_gone_upstream)
    }
}

/// Per-batch counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Jobs dispatched to workers.
    pub submitted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub rate_limited: usize,
    pub failed: usize,
    /// Items filtered out before dispatch.
    pub skipped: usize,
}

impl RefreshSummary {
    /// Every dispatched job produced exactly one accounted result.
    pub fn is_complete(&self) -> bool {
        self.updated + self.deleted + self.rate_limited + self.failed == self.submitted
    }
}

/// Bounded pool refreshing item stats.
pub struct StatsRefreshPool {
    source: Arc<dyn StatsSource>,
    store: Store,
    config: RefreshConfig,
    cancel: CancellationToken,
}

impl StatsRefreshPool {
    pub fn new(source: Arc<dyn StatsSource>, store: Store, config: RefreshConfig) -> Self {
        Self { source, store, config, cancel: CancellationToken::new() }
    }

    /// Cancelling `cancel` fails every unfinished job promptly.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Refresh every item not in `exclude` and apply the outcomes to the store.
    pub async fn refresh(&self, items: &[Item], exclude: &HashSet<String>) -> RefreshSummary {
        let start = Instant::now();
        let ids: Vec<String> = items
            .iter()
            .map(|item| &item.external_id)
            .filter(|id| !id.is_empty() && !exclude.contains(id.as_str()))
            .cloned()
            .collect();

        let mut summary = RefreshSummary { submitted: ids.len(), skipped: items.len() - ids.len(), ..Default::default() };
        if ids.is_empty() {
            tracing::debug!(skipped = summary.skipped, "no items need a stats refresh");
            return summary;
        }

        let workers = self.config.workers.clamp(1, ids.len());
        let (job_tx, job_rx) = mpsc::channel::<String>(workers);
        let (result_tx, mut result_rx) = mpsc::channel::<StatsResult>(workers);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut tasks = JoinSet::new();
        tasks.spawn(async move {
            for id in ids {
                if job_tx.send(id).await.is_err() {
                    break;
                }
            }
        });

        for worker in 0..workers {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let source = self.source.clone();
            let cancel = self.cancel.clone();
            let timeout = self.config.item_timeout;

            tasks.spawn(async move {
                loop {
                    let next = jobs.lock().await.recv().await;
                    let Some(external_id) = next else {
                        break;
                    };

                    tracing::debug!(worker, id = %external_id, "refreshing item stats");
                    let outcome = fetch_one(source.as_ref(), &external_id, timeout, &cancel).await;
                    if results.send(StatsResult { external_id, outcome }).await.is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        while let Some(result) = result_rx.recv().await {
            self.apply(result, &mut summary).await;
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "stats worker panicked");
            }
        }

        tracing::info!(
            submitted = summary.submitted,
            updated = summary.updated,
            deleted = summary.deleted,
            rate_limited = summary.rate_limited,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "stats refresh complete"
        );
        summary
    }

    async fn apply(&self, result: StatsResult, summary: &mut RefreshSummary) {
        let id = result.external_id;
        match result.outcome {
            Ok(stats) => match self.store.update_stats(&id, stats.points, stats.comment_count, Utc::now()).await {
                Ok(true) => {
                    tracing::debug!(id = %id, points = stats.points, comments = stats.comment_count, "updated item stats");
                    summary.updated += 1;
                }
                Ok(false) => {
                    tracing::debug!(id = %id, "item disappeared from the store before its stats arrived");
                    summary.failed += 1;
                }
                Err(e) => {
                    tracing::error!(id = %id, error = %e, "failed to write item stats");
                    summary.failed += 1;
                }
            },
            Err(e) if e.is_gone_upstream() => match self.store.delete_item(&id).await {
                Ok(_) => {
                    tracing::info!(id = %id, "item gone upstream, deleted");
                    summary.deleted += 1;
                }
                Err(e) => {
                    tracing::error!(id = %id, error = %e, "failed to delete item");
                    summary.failed += 1;
                }
            },
            Err(e) if e.is_rate_limited() => {
                tracing::warn!(id = %id, error = %e, "stats API rate limited, item left for next run");
                summary.rate_limited += 1;
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "stats refresh failed");
                summary.failed += 1;
            }
        }
    }
}

async fn fetch_one(
    source: &dyn StatsSource, external_id: &str, timeout: Duration, cancel: &CancellationToken,
) -> Result<ItemStats, Error> {
    cancellable(cancel, async {
        match tokio::time::timeout(timeout, source.fetch_stats(external_id)).await {
            Ok(result) => result,
            Err(_) => Err(Error::FetchTimeout(format!("stats for {external_id} exceeded {timeout:?}"))),
        }
    })
    .await
}
