//! SQLite-backed persistent store for items and the preview cache.
//!
//! This module provides async access to a single SQLite database via
//! tokio-rusqlite. It supports:
//!
//! - Automatic schema migrations
//! - WAL mode for concurrent readers
//! - Preview metadata cache with success/failure TTLs and an expiry sweep
//! - Item records keyed by their external id
//!
//! All writers are serialized by the connection's background thread.

pub mod connection;
pub mod items;
pub mod migrations;
pub mod previews;

pub use crate::Error;

pub use connection::Store;
pub use items::Item;
pub use previews::{CacheEntry, CacheTtl, PreviewMetadata};

use chrono::{DateTime, SecondsFormat, Utc};

/// Fixed-width RFC 3339 rendering so stored timestamps compare correctly as text.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Parse(format!("bad stored timestamp {raw:?}: {e}")))
}
