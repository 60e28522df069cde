//! Item records.
//!
//! Items are keyed by their external id. The stats refresh pool updates
//! points/comment counts in place and deletes items that vanished upstream.

use super::connection::Store;
use super::{format_ts, parse_ts};
use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A content item sourced from the front-page listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub external_id: String,
    pub title: String,
    pub link: String,
    pub comments_link: Option<String>,
    pub points: i64,
    pub comment_count: i64,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const ITEM_COLUMNS: &str =
    "external_id, title, link, comments_link, points, comment_count, author, created_at, updated_at";

/// Row as read from SQLite, timestamps still in their stored text form.
struct ItemRow {
    item: Item,
    created_at: String,
    updated_at: String,
}

fn item_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ItemRow> {
    Ok(ItemRow {
        item: Item {
            external_id: row.get(0)?,
            title: row.get(1)?,
            link: row.get(2)?,
            comments_link: row.get(3)?,
            points: row.get(4)?,
            comment_count: row.get(5)?,
            author: row.get(6)?,
            created_at: DateTime::<Utc>::MIN_UTC,
            updated_at: DateTime::<Utc>::MIN_UTC,
        },
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

impl ItemRow {
    fn finish(self) -> Result<Item, Error> {
        let mut item = self.item;
        item.created_at = parse_ts(&self.created_at)?;
        item.updated_at = parse_ts(&self.updated_at)?;
        Ok(item)
    }
}

impl Store {
    /// Insert or update a batch of items.
    ///
    /// `created_at` is kept from the first insert. Returns the external ids
    /// that were written; callers pass this set to the stats refresh so the
    /// same items are not fetched twice in one run. Rows that fail to write
    /// are logged and left out of the set.
    pub async fn upsert_items(&self, items: &[Item]) -> Result<HashSet<String>, Error> {
        let items = items.to_vec();
        self.conn
            .call(move |conn| -> Result<HashSet<String>, Error> {
                let mut written = HashSet::with_capacity(items.len());
                let mut stmt = conn.prepare(
                    "INSERT INTO items (
                        external_id, title, link, comments_link, points, comment_count, author,
                        created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(external_id) DO UPDATE SET
                        title = excluded.title,
                        link = excluded.link,
                        comments_link = excluded.comments_link,
                        points = excluded.points,
                        comment_count = excluded.comment_count,
                        author = excluded.author,
                        updated_at = excluded.updated_at",
                )?;

                for item in &items {
                    let result = stmt.execute(params![
                        &item.external_id,
                        &item.title,
                        &item.link,
                        &item.comments_link,
                        item.points,
                        item.comment_count,
                        &item.author,
                        format_ts(item.created_at),
                        format_ts(item.updated_at),
                    ]);

                    match result {
                        Ok(n) if n > 0 => {
                            written.insert(item.external_id.clone());
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, id = %item.external_id, "failed to upsert item");
                        }
                    }
                }

                Ok(written)
            })
            .await
            .map_err(Error::from)
    }

    /// Items with strictly more than `min_points`, newest first.
    pub async fn list_items(&self, limit: usize, min_points: i64) -> Result<Vec<Item>, Error> {
        let limit = limit as i64;
        self.conn
            .call(move |conn| -> Result<Vec<Item>, Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ITEM_COLUMNS} FROM items WHERE points > ?1 ORDER BY created_at DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![min_points, limit], item_from_row)?;

                let mut items = Vec::new();
                for row in rows {
                    items.push(row?.finish()?);
                }
                Ok(items)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn get_item(&self, external_id: &str) -> Result<Option<Item>, Error> {
        let external_id = external_id.to_string();
        self.conn
            .call(move |conn| -> Result<Option<Item>, Error> {
                let mut stmt = conn.prepare(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE external_id = ?1"))?;
                match stmt.query_row(params![external_id], item_from_row) {
                    Ok(row) => Ok(Some(row.finish()?)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Overwrite the popularity counters of one item.
    ///
    /// Returns false when no item has that id.
    pub async fn update_stats(
        &self, external_id: &str, points: i64, comment_count: i64, updated_at: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let external_id = external_id.to_string();
        let updated_at = format_ts(updated_at);
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let n = conn.execute(
                    "UPDATE items SET points = ?1, comment_count = ?2, updated_at = ?3 WHERE external_id = ?4",
                    params![points, comment_count, updated_at, external_id],
                )?;
                Ok(n > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove an item. Returns false when it was already gone.
    pub async fn delete_item(&self, external_id: &str) -> Result<bool, Error> {
        let external_id = external_id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let n = conn.execute("DELETE FROM items WHERE external_id = ?1", params![external_id])?;
                Ok(n > 0)
            })
            .await
            .map_err(Error::from)
    }
}
