//! Preview metadata cache.
//!
//! One row per URL, overwritten on every fetch attempt. Successful fetches
//! live for the success TTL (7 days by default), failures are kept as
//! tombstones for the failure TTL (1 day by default). Rows past their expiry
//! are invisible to lookups and removed by [`Store::sweep_previews`].

use super::connection::Store;
use super::{format_ts, parse_ts};
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Page-preview metadata scraped from a URL's OpenGraph tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewMetadata {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
    pub site_name: Option<String>,
}

impl PreviewMetadata {
    /// A record carrying only the URL, used for failure tombstones.
    pub fn bare(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Default::default() }
    }

    /// True when no preview field carries a value.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.image.is_none() && self.site_name.is_none()
    }
}

/// A live row of the preview cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(flatten)]
    pub metadata: PreviewMetadata,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub success: bool,
}

const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Lifetimes applied when writing cache rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub success: Duration,
    pub failure: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self { success: Duration::from_secs(7 * 24 * 60 * 60), failure: Duration::from_secs(24 * 60 * 60) }
    }
}

impl CacheTtl {
    /// Expiry for a row written at `now`.
    ///
    /// TTLs are clamped to a century so the stored text stays a four-digit year.
    pub fn expires_at(&self, now: DateTime<Utc>, success: bool) -> DateTime<Utc> {
        let ttl = if success { self.success } else { self.failure };
        let ttl = chrono::Duration::from_std(ttl.min(MAX_TTL)).unwrap_or(chrono::Duration::zero());
        now + ttl
    }
}

impl Store {
    /// Look up a live cache entry for `url`.
    ///
    /// Returns None if there is no row or the row has expired.
    pub async fn lookup_preview(&self, url: &str) -> Result<Option<CacheEntry>, Error> {
        self.lookup_preview_at(url, Utc::now()).await
    }

    /// [`Store::lookup_preview`] evaluated at an explicit instant.
    pub async fn lookup_preview_at(&self, url: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>, Error> {
        let url = url.to_string();
        let now = format_ts(now);
        self.conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT url, title, description, image, site_name, fetched_at, expires_at, success
                     FROM preview_cache
                     WHERE url = ?1 AND expires_at > ?2",
                )?;

                let result = stmt.query_row(params![url, now], |row| {
                    Ok((
                        PreviewMetadata {
                            url: row.get(0)?,
                            title: row.get(1)?,
                            description: row.get(2)?,
                            image: row.get(3)?,
                            site_name: row.get(4)?,
                        },
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, i32>(7)? == 1,
                    ))
                });

                match result {
                    Ok((metadata, fetched_at, expires_at, success)) => Ok(Some(CacheEntry {
                        metadata,
                        fetched_at: parse_ts(&fetched_at)?,
                        expires_at: parse_ts(&expires_at)?,
                        success,
                    })),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or overwrite the cache row for `url`.
    ///
    /// The expiry is derived from the store's [`CacheTtl`] and `success`.
    /// All fields are replaced unconditionally (last write wins).
    pub async fn store_preview(&self, url: &str, metadata: &PreviewMetadata, success: bool) -> Result<(), Error> {
        self.store_preview_at(url, metadata, success, Utc::now()).await
    }

    /// [`Store::store_preview`] with an explicit write time.
    pub async fn store_preview_at(
        &self, url: &str, metadata: &PreviewMetadata, success: bool, now: DateTime<Utc>,
    ) -> Result<(), Error> {
        let url = url.to_string();
        let metadata = metadata.clone();
        let fetched_at = format_ts(now);
        let expires_at = format_ts(self.preview_ttl.expires_at(now, success));

        tracing::debug!(url = %url, success, expires_at = %expires_at, "caching preview");

        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO preview_cache (
                        url, title, description, image, site_name, fetched_at, expires_at, success
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT(url) DO UPDATE SET
                        title = excluded.title,
                        description = excluded.description,
                        image = excluded.image,
                        site_name = excluded.site_name,
                        fetched_at = excluded.fetched_at,
                        expires_at = excluded.expires_at,
                        success = excluded.success",
                    params![
                        &url,
                        &metadata.title,
                        &metadata.description,
                        &metadata.image,
                        &metadata.site_name,
                        &fetched_at,
                        &expires_at,
                        success as i32,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every cache row whose expiry has passed.
    ///
    /// Returns the number of deleted entries.
    pub async fn sweep_previews(&self) -> Result<u64, Error> {
        self.sweep_previews_at(Utc::now()).await
    }

    pub async fn sweep_previews_at(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let now = format_ts(now);
        let deleted = self
            .conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM preview_cache WHERE expires_at < ?1", params![now])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)?;

        if deleted > 0 {
            tracing::debug!(deleted, "swept expired preview cache entries");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn sample(url: &str) -> PreviewMetadata {
        PreviewMetadata {
            url: url.to_string(),
            title: Some("A".to_string()),
            description: Some("B".to_string()),
            image: Some("https://example.com/a.png".to_string()),
            site_name: Some("Example".to_string()),
        }
    }

    async fn row_count(store: &Store) -> i64 {
        store
            .conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM preview_cache", [], |row| row.get(0)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_lookup_missing() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store.lookup_preview("https://nowhere.example").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_success_entry_expires_after_seven_days() {
        let store = Store::open_in_memory().await.unwrap();
        let url = "https://example.com/post";
        let now = Utc::now();

        store.store_preview_at(url, &sample(url), true, now).await.unwrap();

        let entry = store.lookup_preview_at(url, now).await.unwrap().unwrap();
        assert!(entry.success);
        assert_eq!(entry.metadata.title.as_deref(), Some("A"));
        assert_eq!(entry.metadata.description.as_deref(), Some("B"));
        let ttl = entry.expires_at - entry.fetched_at;
        assert_eq!(ttl, ChronoDuration::days(7));
    }

    #[tokio::test]
    async fn test_failure_entry_expires_after_one_day() {
        let store = Store::open_in_memory().await.unwrap();
        let url = "https://example.com/broken";
        let now = Utc::now();

        store.store_preview_at(url, &PreviewMetadata::bare(url), false, now).await.unwrap();

        let entry = store.lookup_preview_at(url, now).await.unwrap().unwrap();
        assert!(!entry.success);
        assert!(entry.metadata.is_empty());
        assert_eq!(entry.expires_at - entry.fetched_at, ChronoDuration::days(1));

        let later = now + ChronoDuration::hours(25);
        assert!(store.lookup_preview_at(url, later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_twice_keeps_single_row() {
        let store = Store::open_in_memory().await.unwrap();
        let url = "https://example.com/post";

        store.store_preview(url, &PreviewMetadata::bare(url), false).await.unwrap();
        store.store_preview(url, &sample(url), true).await.unwrap();

        assert_eq!(row_count(&store).await, 1);
        let entry = store.lookup_preview(url).await.unwrap().unwrap();
        assert!(entry.success);
        assert_eq!(entry.metadata.site_name.as_deref(), Some("Example"));
    }

    #[tokio::test]
    async fn test_overwrite_clears_previous_fields() {
        let store = Store::open_in_memory().await.unwrap();
        let url = "https://example.com/post";

        store.store_preview(url, &sample(url), true).await.unwrap();
        store.store_preview(url, &PreviewMetadata::bare(url), false).await.unwrap();

        let entry = store.lookup_preview(url).await.unwrap().unwrap();
        assert!(!entry.success);
        assert!(entry.metadata.title.is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let store = Store::open_in_memory().await.unwrap();
        let now = Utc::now();
        let old = now - ChronoDuration::days(2);

        store
            .store_preview_at("https://a.example", &PreviewMetadata::bare("https://a.example"), false, old)
            .await
            .unwrap();
        store
            .store_preview_at("https://b.example", &sample("https://b.example"), true, old)
            .await
            .unwrap();

        assert_eq!(store.sweep_previews_at(now).await.unwrap(), 1);
        assert_eq!(store.sweep_previews_at(now).await.unwrap(), 0);
        assert_eq!(row_count(&store).await, 1);
        assert!(store.lookup_preview_at("https://b.example", now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_custom_ttl() {
        let ttl = CacheTtl { success: Duration::from_secs(60), failure: Duration::from_secs(10) };
        let store = Store::open_in_memory().await.unwrap().with_preview_ttl(ttl);
        let now = Utc::now();
        let url = "https://example.com/short";

        store.store_preview_at(url, &sample(url), true, now).await.unwrap();
        assert!(store.lookup_preview_at(url, now + ChronoDuration::seconds(59)).await.unwrap().is_some());
        assert!(store.lookup_preview_at(url, now + ChronoDuration::seconds(61)).await.unwrap().is_none());
    }

    #[test]
    fn test_cache_ttl_is_clamped() {
        use chrono::Datelike;
        let ttl = CacheTtl { success: Duration::MAX, failure: Duration::from_secs(1) };
        let expires = ttl.expires_at(Utc::now(), true);
        assert!(expires.year() < 10_000);
        assert!(format_ts(expires).starts_with(|c: char| c.is_ascii_digit()));
    }
}
