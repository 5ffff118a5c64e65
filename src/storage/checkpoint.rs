//! SQLite checkpoint store
//!
//! Persists [`FrontierSnapshot`]s so that a crawl can be resumed after a
//! restart. Each save creates a new checkpoint; loading picks the latest.

use crate::frontier::{CounterSnapshot, FrontierSnapshot, PendingUri, QueueSnapshot};
use crate::state::QueueState;
use crate::storage::schema::initialize_checkpoint_schema;
use crate::storage::traits::{StorageError, StorageResult};
use crate::storage::UriRow;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Summary row of a saved checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointRecord {
    pub id: i64,
    pub created_at: String,
    pub config_hash: String,
    pub counters: CounterSnapshot,
    pub queue_count: u64,
    pub uri_count: u64,
}

/// SQLite checkpoint backend
pub struct SqliteCheckpointStore {
    conn: Connection,
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl SqliteCheckpointStore {
    /// Opens (or creates) a checkpoint database
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;
        initialize_checkpoint_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory checkpoint database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_checkpoint_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Saves a snapshot; returns the new checkpoint ID
    pub fn save(&mut self, snapshot: &FrontierSnapshot, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        let uri_count: usize = snapshot.queues.iter().map(|q| q.uris.len()).sum();
        let tx = self.conn.transaction()?;

        tx.execute(
            "INSERT INTO checkpoints (created_at, config_hash, discovered, succeeded, failed,
             disregarded, queue_count, uri_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                now,
                config_hash,
                to_i64(snapshot.counters.discovered),
                to_i64(snapshot.counters.succeeded),
                to_i64(snapshot.counters.failed),
                to_i64(snapshot.counters.disregarded),
                to_i64(snapshot.queues.len() as u64),
                to_i64(uri_count as u64),
            ],
        )?;
        let checkpoint_id = tx.last_insert_rowid();

        {
            let mut queue_stmt = tx.prepare(
                "INSERT INTO checkpoint_queues (checkpoint_id, class_key, state, wake_in_ms,
                 session_balance, total_spent, retired)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            let mut uri_stmt = tx.prepare(
                "INSERT INTO checkpoint_uris (checkpoint_id, class_key, sort_precedence, ordinal,
                 uri, via, path_from_seed, precedence, fetch_attempts, fetch_status, in_flight)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;

            for queue in &snapshot.queues {
                queue_stmt.execute(params![
                    checkpoint_id,
                    queue.class_key,
                    queue.state.to_db_string(),
                    queue.wake_in.map(|d| to_i64(d.as_millis() as u64)),
                    to_i64(queue.session_balance),
                    to_i64(queue.total_spent),
                    queue.retired as i32,
                ])?;

                for pending in &queue.uris {
                    let row = UriRow::from_uri(&queue.class_key, pending.key, &pending.uri);
                    uri_stmt.execute(params![
                        checkpoint_id,
                        row.class_key,
                        row.sort_precedence,
                        row.ordinal,
                        row.uri,
                        row.via,
                        row.path_from_seed,
                        row.precedence,
                        row.fetch_attempts,
                        row.fetch_status,
                        pending.in_flight as i32,
                    ])?;
                }
            }

            let mut seen_stmt = tx.prepare(
                "INSERT OR IGNORE INTO checkpoint_seen (checkpoint_id, fingerprint) VALUES (?1, ?2)",
            )?;
            for fp in &snapshot.seen {
                // Stored bit-for-bit as a signed integer
                seen_stmt.execute(params![checkpoint_id, *fp as i64])?;
            }
        }

        tx.commit()?;
        info!(
            checkpoint_id,
            queues = snapshot.queues.len(),
            uris = uri_count,
            "Saved checkpoint"
        );
        Ok(checkpoint_id)
    }

    /// Gets the most recent checkpoint summary
    pub fn latest_record(&self) -> StorageResult<Option<CheckpointRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, created_at, config_hash, discovered, succeeded, failed, disregarded,
             queue_count, uri_count FROM checkpoints ORDER BY id DESC LIMIT 1",
        )?;

        let record = stmt
            .query_row([], |row| {
                Ok(CheckpointRecord {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    config_hash: row.get(2)?,
                    counters: CounterSnapshot {
                        discovered: row.get::<_, i64>(3)? as u64,
                        succeeded: row.get::<_, i64>(4)? as u64,
                        failed: row.get::<_, i64>(5)? as u64,
                        disregarded: row.get::<_, i64>(6)? as u64,
                    },
                    queue_count: row.get::<_, i64>(7)? as u64,
                    uri_count: row.get::<_, i64>(8)? as u64,
                })
            })
            .optional()?;

        Ok(record)
    }

    /// Loads the most recent checkpoint, if any
    pub fn load_latest(&self) -> StorageResult<Option<(CheckpointRecord, FrontierSnapshot)>> {
        match self.latest_record()? {
            Some(record) => {
                let snapshot = self.load(record.id)?;
                Ok(Some((record, snapshot)))
            }
            None => Ok(None),
        }
    }

    /// Loads a checkpoint by ID
    pub fn load(&self, checkpoint_id: i64) -> StorageResult<FrontierSnapshot> {
        let counters = self
            .conn
            .query_row(
                "SELECT discovered, succeeded, failed, disregarded FROM checkpoints WHERE id = ?1",
                params![checkpoint_id],
                |row| {
                    Ok(CounterSnapshot {
                        discovered: row.get::<_, i64>(0)? as u64,
                        succeeded: row.get::<_, i64>(1)? as u64,
                        failed: row.get::<_, i64>(2)? as u64,
                        disregarded: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()?
            .ok_or(StorageError::CheckpointNotFound(checkpoint_id))?;

        let mut queues = Vec::new();
        let mut positions = HashMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT class_key, state, wake_in_ms, session_balance, total_spent, retired
                 FROM checkpoint_queues WHERE checkpoint_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt.query_map(params![checkpoint_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i32>(5)?,
                ))
            })?;

            for row in rows {
                let (class_key, state, wake_in_ms, balance, spent, retired) = row?;
                let state = QueueState::from_db_string(&state).ok_or_else(|| {
                    StorageError::Serialization(format!("unknown queue state '{}'", state))
                })?;
                positions.insert(class_key.clone(), queues.len());
                queues.push(QueueSnapshot {
                    class_key,
                    state,
                    wake_in: wake_in_ms.map(|ms| Duration::from_millis(ms.max(0) as u64)),
                    session_balance: balance.max(0) as u64,
                    total_spent: spent.max(0) as u64,
                    retired: retired != 0,
                    uris: Vec::new(),
                });
            }
        }

        {
            let mut stmt = self.conn.prepare(
                "SELECT class_key, sort_precedence, ordinal, uri, via, path_from_seed, precedence,
                 fetch_attempts, fetch_status, in_flight
                 FROM checkpoint_uris WHERE checkpoint_id = ?1
                 ORDER BY class_key, sort_precedence, ordinal",
            )?;
            let rows = stmt.query_map(params![checkpoint_id], |row| {
                Ok((
                    UriRow {
                        class_key: row.get(0)?,
                        sort_precedence: row.get(1)?,
                        ordinal: row.get(2)?,
                        uri: row.get(3)?,
                        via: row.get(4)?,
                        path_from_seed: row.get(5)?,
                        precedence: row.get(6)?,
                        fetch_attempts: row.get(7)?,
                        fetch_status: row.get(8)?,
                    },
                    row.get::<_, i32>(9)? != 0,
                ))
            })?;

            for row in rows {
                let (uri_row, in_flight) = row?;
                let position = *positions.get(&uri_row.class_key).ok_or_else(|| {
                    StorageError::Serialization(format!(
                        "URI {} belongs to unknown queue {}",
                        uri_row.uri, uri_row.class_key
                    ))
                })?;
                let (key, uri) = uri_row.into_uri()?;
                queues[position].uris.push(PendingUri { key, uri, in_flight });
            }
        }

        let seen = {
            let mut stmt = self
                .conn
                .prepare("SELECT fingerprint FROM checkpoint_seen WHERE checkpoint_id = ?1")?;
            let fps = stmt
                .query_map(params![checkpoint_id], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            fps.into_iter().map(|fp| fp as u64).collect()
        };

        Ok(FrontierSnapshot {
            queues,
            seen,
            counters,
        })
    }

    /// Lists all checkpoints, newest first
    pub fn list(&self) -> StorageResult<Vec<(i64, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, created_at FROM checkpoints ORDER BY id DESC")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
