//! Storage module for frontier data
//!
//! This module handles all database operations for the frontier:
//! - SQLite overflow segments for work queues that outgrow memory
//! - SQLite checkpoints of the whole frontier for crawl resumption

mod checkpoint;
mod schema;
mod spill;
mod traits;

pub use checkpoint::{CheckpointRecord, SqliteCheckpointStore};
pub use schema::get_schema_version;
pub use spill::SqliteSpillStore;
pub use traits::{SpillStore, StorageError, StorageResult};

use crate::frontier::SortKey;
use crate::uri::{CrawlUri, FetchStatus};

/// A URI as stored in a database row
#[derive(Debug, Clone)]
pub(crate) struct UriRow {
    pub class_key: String,
    pub sort_precedence: i32,
    pub ordinal: i64,
    pub uri: String,
    pub via: Option<String>,
    pub path_from_seed: String,
    pub precedence: i32,
    pub fetch_attempts: u32,
    pub fetch_status: String,
}

impl UriRow {
    pub fn from_uri(class_key: &str, key: SortKey, uri: &CrawlUri) -> Self {
        Self {
            class_key: class_key.to_string(),
            sort_precedence: key.precedence,
            ordinal: key.ordinal,
            uri: uri.as_str().to_string(),
            via: uri.via().map(str::to_string),
            path_from_seed: uri.path_from_seed.as_str().to_string(),
            precedence: uri.precedence,
            fetch_attempts: uri.fetch_attempts,
            fetch_status: uri.fetch_status.to_db_string(),
        }
    }

    pub fn key(&self) -> SortKey {
        SortKey::new(self.sort_precedence, self.ordinal)
    }

    pub fn into_uri(self) -> StorageResult<(SortKey, CrawlUri)> {
        let key = self.key();
        let status = FetchStatus::from_db_string(&self.fetch_status).ok_or_else(|| {
            StorageError::Serialization(format!("unknown fetch status '{}'", self.fetch_status))
        })?;
        let uri = CrawlUri::restore(
            &self.uri,
            self.via,
            &self.path_from_seed,
            Some(self.class_key),
            self.precedence,
            self.fetch_attempts,
            status,
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok((key, uri))
    }
}
