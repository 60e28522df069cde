//! hntop-enrich entry point.
//!
//! One pipeline run: sweep the preview cache, pull the front page, refresh
//! stats for stored items, then enrich the feed selection with previews.
//! Logging goes to stderr as JSON.

use anyhow::{Context, Result};
use hntop_client::{
    EnrichConfig, Enricher, FetchConfig, FetchGateway, RefreshConfig, StatsClient, StatsConfig, StatsRefreshPool,
};
use hntop_core::{AppConfig, CacheTtl, Item, Store};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(db_path = %config.db_path.display(), "starting hntop-enrich");

    let store = Store::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open store at {}", config.db_path.display()))?
        .with_preview_ttl(CacheTtl::from(&config));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling in-flight work");
                shutdown.cancel();
            }
        });
    }

    run(&config, store, &shutdown).await
}

async fn run(config: &AppConfig, store: Store, shutdown: &CancellationToken) -> Result<()> {
    let start = Instant::now();

    match store.sweep_previews().await {
        Ok(swept) => tracing::info!(swept, "swept expired preview cache entries"),
        Err(e) => tracing::warn!(error = %e, "preview cache sweep failed"),
    }

    let stats = StatsClient::new(StatsConfig::from(config))?;

    let written = match stats.front_page().await {
        Ok(items) => match store.upsert_items(&items).await {
            Ok(written) => {
                tracing::info!(fetched = items.len(), written = written.len(), "stored front page items");
                written
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to store front page items");
                HashSet::new()
            }
        },
        Err(e) => {
            tracing::error!(error = %e, "failed to fetch front page, continuing with stored items");
            HashSet::new()
        }
    };

    if let Some(listed) = list_feed(&store, config, "stats refresh").await {
        let pool = StatsRefreshPool::new(Arc::new(stats), store.clone(), RefreshConfig::from(config))
            .with_cancellation(shutdown.clone());
        pool.refresh(&listed, &written).await;
    }

    let Some(feed) = list_feed(&store, config, "enrichment").await else {
        return Ok(());
    };
    let gateway = FetchGateway::new(FetchConfig::from(config))?;
    let enricher =
        Enricher::new(Arc::new(gateway), store, EnrichConfig::from(config)).with_cancellation(shutdown.clone());

    let previews = enricher.enrich_all(feed.iter().map(|item| item.link.clone()).collect()).await;
    let resolved = previews.iter().filter(|p| p.is_some()).count();

    tracing::info!(
        items = feed.len(),
        previews = resolved,
        cancelled = shutdown.is_cancelled(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "run complete"
    );
    Ok(())
}

/// Items selected for the feed, or `None` (logged) when the store cannot list them.
async fn list_feed(store: &Store, config: &AppConfig, stage: &str) -> Option<Vec<Item>> {
    match store.list_items(config.feed_limit, config.min_points).await {
        Ok(items) => Some(items),
        Err(e) => {
            tracing::error!(error = %e, stage, "failed to list stored items, skipping stage");
            None
        }
    }
}
