//! SQLite overflow segment for work queues

use crate::frontier::SortKey;
use crate::storage::schema::initialize_spill_schema;
use crate::storage::traits::{SpillStore, StorageResult};
use crate::storage::UriRow;
use crate::uri::CrawlUri;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use tracing::debug;

const SELECT_COLUMNS: &str = "class_key, sort_precedence, ordinal, uri, via, path_from_seed, \
                              precedence, fetch_attempts, fetch_status";

fn read_row(row: &Row<'_>) -> rusqlite::Result<UriRow> {
    Ok(UriRow {
        class_key: row.get(0)?,
        sort_precedence: row.get(1)?,
        ordinal: row.get(2)?,
        uri: row.get(3)?,
        via: row.get(4)?,
        path_from_seed: row.get(5)?,
        precedence: row.get(6)?,
        fetch_attempts: row.get(7)?,
        fetch_status: row.get(8)?,
    })
}

/// SQLite-backed [`SpillStore`]
pub struct SqliteSpillStore {
    conn: Connection,
}

impl SqliteSpillStore {
    /// Opens (or creates) a spill database file
    ///
    /// Leftover rows from an earlier run are discarded; checkpoints, not the
    /// spill file, carry queue contents across restarts.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = OFF;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        initialize_spill_schema(&conn)?;
        let stale = conn.execute("DELETE FROM spilled_uris", [])?;
        if stale > 0 {
            debug!(rows = stale, path = %path.display(), "Cleared stale spill rows");
        }
        Ok(Self { conn })
    }

    /// Creates a spill store backed by an in-memory database
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_spill_schema(&conn)?;
        Ok(Self { conn })
    }

    fn select(&self, sql: &str, class_key: &str, limit: i64) -> StorageResult<Vec<(SortKey, CrawlUri)>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![class_key, limit], read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(UriRow::into_uri).collect()
    }
}

impl SpillStore for SqliteSpillStore {
    fn append(&mut self, class_key: &str, entries: &[(SortKey, CrawlUri)]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO spilled_uris (class_key, sort_precedence, ordinal, uri, via,
                 path_from_seed, precedence, fetch_attempts, fetch_status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for (key, uri) in entries {
                let row = UriRow::from_uri(class_key, *key, uri);
                stmt.execute(params![
                    row.class_key,
                    row.sort_precedence,
                    row.ordinal,
                    row.uri,
                    row.via,
                    row.path_from_seed,
                    row.precedence,
                    row.fetch_attempts,
                    row.fetch_status,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn take_front(&mut self, class_key: &str, limit: usize) -> StorageResult<Vec<(SortKey, CrawlUri)>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = self.select(
            &format!(
                "SELECT {} FROM spilled_uris WHERE class_key = ?1
                 ORDER BY sort_precedence, ordinal LIMIT ?2",
                SELECT_COLUMNS
            ),
            class_key,
            limit,
        )?;
        let keys: Vec<SortKey> = entries.iter().map(|(key, _)| *key).collect();
        self.remove(class_key, &keys)?;
        Ok(entries)
    }

    fn load_all(&self, class_key: &str) -> StorageResult<Vec<(SortKey, CrawlUri)>> {
        self.select(
            &format!(
                "SELECT {} FROM spilled_uris WHERE class_key = ?1
                 ORDER BY sort_precedence, ordinal LIMIT ?2",
                SELECT_COLUMNS
            ),
            class_key,
            -1,
        )
    }

    fn remove(&mut self, class_key: &str, keys: &[SortKey]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare(
                "DELETE FROM spilled_uris
                 WHERE class_key = ?1 AND sort_precedence = ?2 AND ordinal = ?3",
            )?;
            for key in keys {
                removed += stmt.execute(params![class_key, key.precedence, key.ordinal])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn clear(&mut self, class_key: &str) -> StorageResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM spilled_uris WHERE class_key = ?1",
            params![class_key],
        )?;
        Ok(removed)
    }

    fn count(&self, class_key: &str) -> StorageResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM spilled_uris WHERE class_key = ?1",
            params![class_key],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
