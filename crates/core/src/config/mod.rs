//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (HNTOP_*)
//! 2. TOML config file (if HNTOP_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::store::CacheTtl;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (HNTOP_*)
/// 2. TOML config file (if HNTOP_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite store.
    ///
    /// Set via HNTOP_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent sent with preview fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Hard cap on preview body bytes read per request.
    #[serde(default = "default_preview_max_bytes")]
    pub preview_max_bytes: usize,

    /// Per-request timeout inside the fetch gateway, in milliseconds.
    #[serde(default = "default_preview_timeout_ms")]
    pub preview_timeout_ms: u64,

    /// Redirects followed before a preview fetch fails.
    #[serde(default = "default_preview_max_redirects")]
    pub preview_max_redirects: usize,

    /// Global number of preview fetches allowed in flight.
    #[serde(default = "default_preview_concurrency")]
    pub preview_concurrency: usize,

    /// Minimum spacing between two requests to the same domain, in milliseconds.
    /// Zero disables pacing.
    #[serde(default = "default_domain_interval_ms")]
    pub domain_interval_ms: u64,

    /// Upper bound on one enrichment attempt, in milliseconds.
    #[serde(default = "default_enrich_timeout_ms")]
    pub enrich_timeout_ms: u64,

    /// Lifetime of a successful preview cache entry.
    #[serde(default = "default_success_ttl_secs")]
    pub success_ttl_secs: u64,

    /// Lifetime of a failed (tombstone) preview cache entry.
    #[serde(default = "default_failure_ttl_secs")]
    pub failure_ttl_secs: u64,

    /// Cut title/description/site name to 200/500/100 characters.
    #[serde(default)]
    pub truncate_previews: bool,

    /// Base URL of the stats API.
    ///
    /// Set via HNTOP_STATS_BASE_URL environment variable.
    #[serde(default = "default_stats_base_url")]
    pub stats_base_url: String,

    /// Number of stats refresh workers.
    #[serde(default = "default_stats_workers")]
    pub stats_workers: usize,

    /// Per-item stats request timeout, in milliseconds.
    #[serde(default = "default_stats_timeout_ms")]
    pub stats_timeout_ms: u64,

    /// Hits requested from the front-page listing.
    #[serde(default = "default_front_page_size")]
    pub front_page_size: usize,

    /// Items selected from the store for enrichment.
    #[serde(default = "default_feed_limit")]
    pub feed_limit: usize,

    /// Items must have strictly more points than this to be enriched.
    #[serde(default = "default_min_points")]
    pub min_points: i64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./hntop.sqlite")
}

fn default_user_agent() -> String {
    "hntop/0.1 (OpenGraph fetcher)".into()
}

fn default_preview_max_bytes() -> usize {
    1_048_576 // 1MB
}

fn default_preview_timeout_ms() -> u64 {
    10_000
}

fn default_preview_max_redirects() -> usize {
    10
}

fn default_preview_concurrency() -> usize {
    5
}

fn default_domain_interval_ms() -> u64 {
    1_000
}

fn default_enrich_timeout_ms() -> u64 {
    15_000
}

fn default_success_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_failure_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_stats_base_url() -> String {
    "https://hn.algolia.com/api/v1".into()
}

fn default_stats_workers() -> usize {
    10
}

fn default_stats_timeout_ms() -> u64 {
    30_000
}

fn default_front_page_size() -> usize {
    100
}

fn default_feed_limit() -> usize {
    30
}

fn default_min_points() -> i64 {
    50
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            preview_max_bytes: default_preview_max_bytes(),
            preview_timeout_ms: default_preview_timeout_ms(),
            preview_max_redirects: default_preview_max_redirects(),
            preview_concurrency: default_preview_concurrency(),
            domain_interval_ms: default_domain_interval_ms(),
            enrich_timeout_ms: default_enrich_timeout_ms(),
            success_ttl_secs: default_success_ttl_secs(),
            failure_ttl_secs: default_failure_ttl_secs(),
            truncate_previews: false,
            stats_base_url: default_stats_base_url(),
            stats_workers: default_stats_workers(),
            stats_timeout_ms: default_stats_timeout_ms(),
            front_page_size: default_front_page_size(),
            feed_limit: default_feed_limit(),
            min_points: default_min_points(),
        }
    }
}

impl AppConfig {
    pub fn preview_timeout(&self) -> Duration {
        Duration::from_millis(self.preview_timeout_ms)
    }

    pub fn domain_interval(&self) -> Duration {
        Duration::from_millis(self.domain_interval_ms)
    }

    pub fn enrich_timeout(&self) -> Duration {
        Duration::from_millis(self.enrich_timeout_ms)
    }

    pub fn success_ttl(&self) -> Duration {
        Duration::from_secs(self.success_ttl_secs)
    }

    pub fn failure_ttl(&self) -> Duration {
        Duration::from_secs(self.failure_ttl_secs)
    }

    pub fn stats_timeout(&self) -> Duration {
        Duration::from_millis(self.stats_timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `HNTOP_`
    /// 2. TOML file from `HNTOP_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("HNTOP_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("HNTOP_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

impl From<&AppConfig> for CacheTtl {
    fn from(config: &AppConfig) -> Self {
        CacheTtl { success: config.success_ttl(), failure: config.failure_ttl() }
    }
}
