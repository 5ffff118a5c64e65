//! Database schema definitions
//!
//! Two independent databases: the spill database holding queue overflow
//! while the crawl runs, and the checkpoint database holding frontier
//! snapshots for resumption.

/// SQL schema for the spill database
pub const SPILL_SCHEMA_SQL: &str = r#"
-- URIs pushed out of a queue's in-memory head segment
CREATE TABLE IF NOT EXISTS spilled_uris (
    class_key TEXT NOT NULL,
    sort_precedence INTEGER NOT NULL,
    ordinal INTEGER NOT NULL,
    uri TEXT NOT NULL,
    via TEXT,
    path_from_seed TEXT NOT NULL,
    precedence INTEGER NOT NULL,
    fetch_attempts INTEGER NOT NULL DEFAULT 0,
    fetch_status TEXT NOT NULL,
    PRIMARY KEY (class_key, sort_precedence, ordinal)
);
"#;

/// SQL schema for the checkpoint database
pub const CHECKPOINT_SCHEMA_SQL: &str = r#"
-- One row per saved snapshot
CREATE TABLE IF NOT EXISTS checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    discovered INTEGER NOT NULL DEFAULT 0,
    succeeded INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    disregarded INTEGER NOT NULL DEFAULT 0,
    queue_count INTEGER NOT NULL DEFAULT 0,
    uri_count INTEGER NOT NULL DEFAULT 0
);

-- Per-queue scheduling state
CREATE TABLE IF NOT EXISTS checkpoint_queues (
    checkpoint_id INTEGER NOT NULL REFERENCES checkpoints(id),
    class_key TEXT NOT NULL,
    state TEXT NOT NULL,
    wake_in_ms INTEGER,
    session_balance INTEGER NOT NULL DEFAULT 0,
    total_spent INTEGER NOT NULL DEFAULT 0,
    retired INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (checkpoint_id, class_key)
);

-- Queued and in-flight URIs in queue order
CREATE TABLE IF NOT EXISTS checkpoint_uris (
    checkpoint_id INTEGER NOT NULL REFERENCES checkpoints(id),
    class_key TEXT NOT NULL,
    sort_precedence INTEGER NOT NULL,
    ordinal INTEGER NOT NULL,
    uri TEXT NOT NULL,
    via TEXT,
    path_from_seed TEXT NOT NULL,
    precedence INTEGER NOT NULL,
    fetch_attempts INTEGER NOT NULL DEFAULT 0,
    fetch_status TEXT NOT NULL,
    in_flight INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (checkpoint_id, class_key, sort_precedence, ordinal)
);

-- Seen-URI fingerprints
CREATE TABLE IF NOT EXISTS checkpoint_seen (
    checkpoint_id INTEGER NOT NULL REFERENCES checkpoints(id),
    fingerprint INTEGER NOT NULL,
    PRIMARY KEY (checkpoint_id, fingerprint)
);
"#;

/// Initializes the spill database schema
pub fn initialize_spill_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SPILL_SCHEMA_SQL)?;
    Ok(())
}

/// Initializes the checkpoint database schema
pub fn initialize_checkpoint_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(CHECKPOINT_SCHEMA_SQL)?;
    Ok(())
}

/// Gets the current schema version
pub fn get_schema_version() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn table_exists(conn: &Connection, table: &str) -> bool {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
                |row| row.get(0),
            )
            .unwrap();
        count == 1
    }

    #[test]
    fn test_schemas_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_spill_schema(&conn).unwrap();
        initialize_spill_schema(&conn).unwrap();
        initialize_checkpoint_schema(&conn).unwrap();
        assert!(initialize_checkpoint_schema(&conn).is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_spill_schema(&conn).unwrap();
        initialize_checkpoint_schema(&conn).unwrap();

        for table in [
            "spilled_uris",
            "checkpoints",
            "checkpoint_queues",
            "checkpoint_uris",
            "checkpoint_seen",
        ] {
            assert!(table_exists(&conn, table), "Table {} should exist", table);
        }
        assert_eq!(get_schema_version(), 1);
    }
}
