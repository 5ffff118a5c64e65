//! Storage traits and error types

use crate::frontier::SortKey;
use crate::uri::CrawlUri;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Overflow segment for work queues
///
/// Each queue's spilled URIs are kept in `(precedence, ordinal)` order under
/// the queue's class key. Every spilled key of a queue sorts after every key
/// still held in that queue's memory segment.
pub trait SpillStore: Send {
    /// Writes URIs to the end of a queue's overflow segment
    fn append(&mut self, class_key: &str, entries: &[(SortKey, CrawlUri)]) -> StorageResult<()>;

    /// Removes and returns up to `limit` of a queue's lowest-keyed URIs
    fn take_front(&mut self, class_key: &str, limit: usize) -> StorageResult<Vec<(SortKey, CrawlUri)>>;

    /// Returns a queue's spilled URIs in order without removing them
    fn load_all(&self, class_key: &str) -> StorageResult<Vec<(SortKey, CrawlUri)>>;

    /// Removes specific entries; returns how many were removed
    fn remove(&mut self, class_key: &str, keys: &[SortKey]) -> StorageResult<usize>;

    /// Removes every entry of a queue; returns how many were removed
    fn clear(&mut self, class_key: &str) -> StorageResult<usize>;

    fn count(&self, class_key: &str) -> StorageResult<usize>;
}
