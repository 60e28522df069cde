//! Outbound side of hntop.
//!
//! This crate provides the rate-limited preview fetch gateway, OpenGraph
//! extraction, the stats API client, the cache-first enrichment policy and
//! the stats refresh worker pool.

pub mod enrich;
pub mod extract;
pub mod fetch;
pub mod refresh;
pub mod stats;

#[cfg(test)]
mod testing;

pub use enrich::{EnrichConfig, Enricher, PreviewSource};
pub use extract::{clean_preview, extract_preview, truncate_preview};
pub use fetch::{FetchConfig, FetchGateway, FetchedPage};
pub use refresh::{RefreshConfig, RefreshSummary, StatsRefreshPool, StatsResult, StatsSource};
pub use stats::{ItemStats, StatsClient, StatsConfig};
