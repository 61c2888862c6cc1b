//! Storage traits and error types

use crate::storage::{
    ChannelRecord, CrawlOutcome, EdgeKind, EdgeRecord, MessageRecord, RunRecord, RunStatus,
};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every write is idempotent: repeating a call with the same arguments leaves
/// the store unchanged.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StorageResult<()>;

    // ===== Channels =====

    /// Inserts or updates a channel keyed by `record.address`
    ///
    /// Optional fields that are `None` in `record` keep their stored value.
    fn upsert_channel(&mut self, record: &ChannelRecord) -> StorageResult<()>;

    fn get_channel(&self, address: &str) -> StorageResult<Option<ChannelRecord>>;

    /// All channels, in insertion order
    fn list_channels(&self) -> StorageResult<Vec<ChannelRecord>>;

    fn count_channels(&self) -> StorageResult<u64>;

    // ===== Edges =====

    /// Records a directed edge; returns false if it already existed
    ///
    /// Both channels must already be stored.
    fn add_edge(&mut self, kind: EdgeKind, source: &str, target: &str) -> StorageResult<bool>;

    fn add_similar_edge(&mut self, source: &str, target: &str) -> StorageResult<bool> {
        self.add_edge(EdgeKind::Similar, source, target)
    }

    fn add_related_edge(&mut self, source: &str, target: &str) -> StorageResult<bool> {
        self.add_edge(EdgeKind::Related, source, target)
    }

    fn list_edges(&self, kind: EdgeKind) -> StorageResult<Vec<EdgeRecord>>;

    fn count_edges(&self, kind: EdgeKind) -> StorageResult<u64>;

    // ===== Messages =====

    /// Stores a batch of messages in one transaction
    ///
    /// Existing `(channel, message_id)` rows get their payload replaced.
    ///
    /// # Returns
    ///
    /// The number of rows written
    fn append_messages(&mut self, channel: &str, batch: &[MessageRecord]) -> StorageResult<usize>;

    /// Highest stored message id for a channel (the checkpoint)
    fn get_latest_message_id(&self, channel: &str) -> StorageResult<Option<i64>>;

    fn count_messages(&self, channel: Option<&str>) -> StorageResult<u64>;

    /// Stored messages of a channel with `message_id > after`, ascending
    fn messages_after(&self, channel: &str, after: i64) -> StorageResult<Vec<MessageRecord>>;

    /// Highest message id whose forwards already became related edges
    fn get_related_checkpoint(&self, channel: &str) -> StorageResult<Option<i64>>;

    /// Moves the related checkpoint forward; never lowers it
    fn set_related_checkpoint(&mut self, channel: &str, message_id: i64) -> StorageResult<()>;

    // ===== Categories =====

    /// Links an address to a category, creating the category if needed
    fn add_category_link(&mut self, category: &str, address: &str) -> StorageResult<()>;

    /// Addresses discovered for a category, in insertion order
    fn addresses_in_category(&self, category: &str) -> StorageResult<Vec<String>>;

    fn list_categories(&self) -> StorageResult<Vec<String>>;

    /// Category names per address
    fn categories_by_address(&self) -> StorageResult<HashMap<String, Vec<String>>>;

    // ===== Crawl Log =====

    /// Records the terminal outcome of a job in a run, replacing earlier entries
    fn log_outcome(&mut self, run_id: i64, address: &str, outcome: CrawlOutcome)
        -> StorageResult<()>;

    /// Outcomes recorded for a run, keyed by address
    fn get_outcomes(&self, run_id: i64) -> StorageResult<HashMap<String, CrawlOutcome>>;
}
