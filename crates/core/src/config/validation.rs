//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

const MAX_PREVIEW_BYTES: usize = 10 * 1024 * 1024;
const MIN_TIMEOUT_MS: u64 = 100;
const MAX_TIMEOUT_MS: u64 = 300_000;

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn check_timeout(field: &str, value: u64) -> Result<(), ConfigError> {
    if value < MIN_TIMEOUT_MS {
        return Err(invalid(field, "must be at least 100ms"));
    }
    if value > MAX_TIMEOUT_MS {
        return Err(invalid(field, "must not exceed 5 minutes (300000ms)"));
    }
    Ok(())
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `preview_max_bytes` is 0 or exceeds 10MB
    /// - any timeout is under 100ms or over 5 minutes
    /// - `preview_concurrency` or `stats_workers` is 0
    /// - `user_agent` is empty
    /// - `stats_base_url` is not an http(s) URL
    /// - `failure_ttl_secs` exceeds `success_ttl_secs`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preview_max_bytes == 0 {
            return Err(invalid("preview_max_bytes", "must be greater than 0"));
        }
        if self.preview_max_bytes > MAX_PREVIEW_BYTES {
            return Err(invalid("preview_max_bytes", "must not exceed 10MB"));
        }

        check_timeout("preview_timeout_ms", self.preview_timeout_ms)?;
        check_timeout("enrich_timeout_ms", self.enrich_timeout_ms)?;
        check_timeout("stats_timeout_ms", self.stats_timeout_ms)?;

        if self.preview_concurrency == 0 {
            return Err(invalid("preview_concurrency", "must be at least 1"));
        }
        if self.stats_workers == 0 {
            return Err(invalid("stats_workers", "must be at least 1"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        match url::Url::parse(&self.stats_base_url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            _ => return Err(invalid("stats_base_url", "must be an http(s) URL")),
        }

        if self.failure_ttl_secs > self.success_ttl_secs {
            return Err(invalid("failure_ttl_secs", "must not exceed success_ttl_secs"));
        }

        if self.enrich_timeout_ms < self.preview_timeout_ms {
            tracing::warn!(
                enrich_timeout_ms = self.enrich_timeout_ms,
                preview_timeout_ms = self.preview_timeout_ms,
                "enrich timeout is shorter than the per-request timeout; \
                 slow pages will be cut off by the enrichment bound"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: Result<(), ConfigError>) -> Option<String> {
        match result {
            Err(ConfigError::Invalid { field, .. }) => Some(field),
            _ => None,
        }
    }

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_max_bytes_zero() {
        let config = AppConfig { preview_max_bytes: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("preview_max_bytes"));
    }

    #[test]
    fn test_validate_max_bytes_exceeds_limit() {
        let config = AppConfig { preview_max_bytes: 11 * 1024 * 1024, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("preview_max_bytes"));
    }

    #[test]
    fn test_validate_timeouts() {
        let config = AppConfig { preview_timeout_ms: 50, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("preview_timeout_ms"));

        let config = AppConfig { stats_timeout_ms: 301_000, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("stats_timeout_ms"));

        let config = AppConfig { enrich_timeout_ms: 99, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("enrich_timeout_ms"));
    }

    #[test]
    fn test_validate_zero_workers() {
        let config = AppConfig { stats_workers: 0, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("stats_workers"));
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let config = AppConfig { user_agent: String::new(), ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("user_agent"));
    }

    #[test]
    fn test_validate_stats_base_url() {
        let config = AppConfig { stats_base_url: "ftp://example.com".into(), ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("stats_base_url"));

        let config = AppConfig { stats_base_url: "not a url".into(), ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("stats_base_url"));
    }

    #[test]
    fn test_validate_ttl_ordering() {
        let config = AppConfig { failure_ttl_secs: 8 * 24 * 3600, ..Default::default() };
        assert_eq!(field_of(config.validate()).as_deref(), Some("failure_ttl_secs"));
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig {
            preview_max_bytes: 1,
            preview_timeout_ms: 100,
            enrich_timeout_ms: 100,
            stats_timeout_ms: 300_000,
            preview_concurrency: 1,
            stats_workers: 1,
            domain_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
