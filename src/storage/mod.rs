//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Idempotent channel upserts keyed by address
//! - Similar/related edge tracking (directional, deduplicated)
//! - Message batches and per-channel checkpoints
//! - Discovery categories, run tracking and the crawl log

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::GraphError;
use chrono::NaiveDate;
use std::path::Path;

/// Initializes or opens a storage database
pub fn open_storage(path: &Path) -> Result<SqliteStorage, GraphError> {
    SqliteStorage::new(path)
}

/// A channel row, keyed by its canonical address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRecord {
    pub address: String,

    /// Remote numeric id; unknown for bare invite titles
    pub channel_id: Option<i64>,

    pub name: Option<String>,
    pub subscribers: Option<u64>,
    pub verified: bool,
    pub created_at: Option<NaiveDate>,
}

impl ChannelRecord {
    /// A record that only knows its address
    pub fn bare(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            channel_id: None,
            name: None,
            subscribers: None,
            verified: false,
            created_at: None,
        }
    }
}

/// The two kinds of channel-to-channel edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// From the recommendation endpoint
    Similar,
    /// Inferred from forwarded messages
    Related,
}

impl EdgeKind {
    pub(crate) fn table(&self) -> &'static str {
        match self {
            Self::Similar => "channel_similar",
            Self::Related => "channel_related",
        }
    }
}

/// A directed edge between two channel addresses
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeRecord {
    pub source: String,
    pub target: String,
}

/// One fetched message, payload stored as JSON text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub message_id: i64,
    pub payload: String,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "interrupted" => Some(Self::Interrupted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Terminal outcome of one channel job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlOutcome {
    /// Pipeline reached `Done`
    Done,
    /// Address did not resolve to a channel
    Unresolvable,
    /// A local or non-retryable remote error ended the job
    Failed,
    /// Put back unprocessed because no session was left
    Deferred,
}

impl CrawlOutcome {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Unresolvable => "unresolvable",
            Self::Failed => "failed",
            Self::Deferred => "deferred",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "done" => Some(Self::Done),
            "unresolvable" => Some(Self::Unresolvable),
            "failed" => Some(Self::Failed),
            "deferred" => Some(Self::Deferred),
            _ => None,
        }
    }

    /// Whether a resumed run can skip a job that ended this way
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Deferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_invalid() {
        assert_eq!(RunStatus::from_db_string("invalid"), None);
        assert_eq!(
            RunStatus::from_db_string("interrupted"),
            Some(RunStatus::Interrupted)
        );
    }

    #[test]
    fn test_deferred_jobs_are_retried_on_resume() {
        assert!(CrawlOutcome::Done.is_final());
        assert!(CrawlOutcome::Unresolvable.is_final());
        assert!(CrawlOutcome::Failed.is_final());
        assert!(!CrawlOutcome::Deferred.is_final());
        assert_eq!(
            CrawlOutcome::from_db_string(CrawlOutcome::Deferred.to_db_string()),
            Some(CrawlOutcome::Deferred)
        );
    }
}
