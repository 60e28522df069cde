//! Schema versioning.
//!
//! `_migrations` records one row per applied step. Each pending step runs in
//! its own transaction together with its bookkeeping row, so a failed step
//! leaves the database at the previous version.

use super::{Error, format_ts};
use chrono::Utc;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};
use tokio_rusqlite::{Connection, params};

/// One schema step.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Known steps, ascending by version.
pub(crate) const MIGRATIONS: &[Migration] = &[
    Migration { version: 1, name: "items", sql: include_str!("../../migrations/001_items.sql") },
    Migration { version: 2, name: "preview_cache", sql: include_str!("../../migrations/002_preview_cache.sql") },
];

const VERSION_TABLE: &str = "CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
)";

/// Bring the schema up to date. Returns how many steps were applied.
pub async fn run(conn: &Connection) -> Result<usize, Error> {
    let applied = conn.call(|conn| apply(conn, MIGRATIONS)).await?;
    if applied > 0 {
        tracing::info!(applied, "store schema migrated");
    }
    Ok(applied)
}

fn current_version(conn: &rusqlite::Connection) -> Result<i64, Error> {
    let version: Option<i64> = conn
        .query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0))
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

fn apply(conn: &mut rusqlite::Connection, steps: &[Migration]) -> Result<usize, Error> {
    conn.execute_batch(VERSION_TABLE)?;
    let current = current_version(conn)?;

    if let Some(latest) = steps.last().map(|m| m.version)
        && current > latest
    {
        return Err(Error::MigrationFailed(format!(
            "database is at version {current}, newest known is {latest}"
        )));
    }

    let mut applied = 0;
    for step in steps.iter().filter(|m| m.version > current) {
        tracing::debug!(version = step.version, name = step.name, "applying migration");

        let tx = conn.transaction()?;
        tx.execute_batch(step.sql)
            .map_err(|e| Error::MigrationFailed(format!("{} ({}): {e}", step.version, step.name)))?;
        tx.execute(
            "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![step.version, step.name, format_ts(Utc::now())],
        )?;
        tx.commit()?;
        applied += 1;
    }

    Ok(applied)
}
