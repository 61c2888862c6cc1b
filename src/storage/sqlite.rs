//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{
    ChannelRecord, CrawlOutcome, EdgeKind, EdgeRecord, MessageRecord, RunRecord, RunStatus,
};
use crate::GraphError;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(GraphError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, GraphError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> Result<Self, GraphError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelRecord> {
    let created_at: Option<String> = row.get(5)?;
    Ok(ChannelRecord {
        address: row.get(0)?,
        channel_id: row.get(1)?,
        name: row.get(2)?,
        subscribers: row
            .get::<_, Option<i64>>(3)?
            .and_then(|s| u64::try_from(s).ok()),
        verified: row.get(4)?,
        created_at: created_at
            .and_then(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT).ok()),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let finished_at = (status != RunStatus::Running).then_some(now);
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), finished_at, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn complete_run(&mut self, run_id: i64) -> StorageResult<()> {
        self.update_run_status(run_id, RunStatus::Completed)
    }

    // ===== Channels =====

    fn upsert_channel(&mut self, record: &ChannelRecord) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let subscribers = record
            .subscribers
            .map(|s| i64::try_from(s).unwrap_or(i64::MAX));
        let created_at = record
            .created_at
            .map(|d| d.format(DATE_FORMAT).to_string());

        // A record without a channel id (bare invite title) carries no verified flag
        self.conn.execute(
            "INSERT INTO channels (address, channel_id, name, subscribers, verified, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(address) DO UPDATE SET
                channel_id = COALESCE(excluded.channel_id, channels.channel_id),
                name = COALESCE(excluded.name, channels.name),
                subscribers = COALESCE(excluded.subscribers, channels.subscribers),
                verified = CASE WHEN excluded.channel_id IS NULL
                                THEN channels.verified ELSE excluded.verified END,
                created_at = COALESCE(excluded.created_at, channels.created_at),
                updated_at = excluded.updated_at",
            params![
                record.address,
                record.channel_id,
                record.name,
                subscribers,
                record.verified,
                created_at,
                now,
            ],
        )?;
        Ok(())
    }

    fn get_channel(&self, address: &str) -> StorageResult<Option<ChannelRecord>> {
        let channel = self
            .conn
            .query_row(
                "SELECT address, channel_id, name, subscribers, verified, created_at
                 FROM channels WHERE address = ?1",
                params![address],
                channel_from_row,
            )
            .optional()?;
        Ok(channel)
    }

    fn list_channels(&self) -> StorageResult<Vec<ChannelRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT address, channel_id, name, subscribers, verified, created_at
             FROM channels ORDER BY id",
        )?;
        let channels = stmt
            .query_map([], channel_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(channels)
    }

    fn count_channels(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM channels", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Edges =====

    fn add_edge(&mut self, kind: EdgeKind, source: &str, target: &str) -> StorageResult<bool> {
        let inserted = self
            .conn
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO {} (source, target) VALUES (?1, ?2)",
                    kind.table()
                ),
                params![source, target],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StorageError::ConstraintViolation(format!(
                        "edge {} -> {} references an unknown channel",
                        source, target
                    ))
                }
                other => StorageError::Sqlite(other),
            })?;
        Ok(inserted > 0)
    }

    fn list_edges(&self, kind: EdgeKind) -> StorageResult<Vec<EdgeRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT source, target FROM {} ORDER BY rowid",
            kind.table()
        ))?;
        let edges = stmt
            .query_map([], |row| {
                Ok(EdgeRecord {
                    source: row.get(0)?,
                    target: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    fn count_edges(&self, kind: EdgeKind) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.table()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Messages =====

    fn append_messages(&mut self, channel: &str, batch: &[MessageRecord]) -> StorageResult<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO channel_messages (channel, message_id, data) VALUES (?1, ?2, ?3)
                 ON CONFLICT(channel, message_id) DO UPDATE SET data = excluded.data",
            )?;
            for message in batch {
                written += stmt.execute(params![channel, message.message_id, message.payload])?;
            }
        }
        tx.commit()?;

        Ok(written)
    }

    fn get_latest_message_id(&self, channel: &str) -> StorageResult<Option<i64>> {
        let latest: Option<i64> = self.conn.query_row(
            "SELECT MAX(message_id) FROM channel_messages WHERE channel = ?1",
            params![channel],
            |row| row.get(0),
        )?;
        Ok(latest)
    }

    fn count_messages(&self, channel: Option<&str>) -> StorageResult<u64> {
        let count: i64 = match channel {
            Some(channel) => self.conn.query_row(
                "SELECT COUNT(*) FROM channel_messages WHERE channel = ?1",
                params![channel],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM channel_messages", [], |row| row.get(0))?,
        };
        Ok(count as u64)
    }

    fn messages_after(&self, channel: &str, after: i64) -> StorageResult<Vec<MessageRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT message_id, data FROM channel_messages
             WHERE channel = ?1 AND message_id > ?2
             ORDER BY message_id",
        )?;
        let messages = stmt
            .query_map(params![channel, after], |row| {
                Ok(MessageRecord {
                    message_id: row.get(0)?,
                    payload: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    fn get_related_checkpoint(&self, channel: &str) -> StorageResult<Option<i64>> {
        let checkpoint = self
            .conn
            .query_row(
                "SELECT related_checkpoint FROM channels WHERE address = ?1",
                params![channel],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()?;
        Ok(checkpoint.flatten())
    }

    fn set_related_checkpoint(&mut self, channel: &str, message_id: i64) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE channels
             SET related_checkpoint = MAX(COALESCE(related_checkpoint, 0), ?2)
             WHERE address = ?1",
            params![channel, message_id],
        )?;
        if updated == 0 {
            return Err(StorageError::ChannelNotFound(channel.to_string()));
        }
        Ok(())
    }

    // ===== Categories =====

    fn add_category_link(&mut self, category: &str, address: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO categories (name) VALUES (?1)",
            params![category],
        )?;
        let category_id: i64 = self.conn.query_row(
            "SELECT id FROM categories WHERE name = ?1",
            params![category],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT OR IGNORE INTO category_links (category_id, address) VALUES (?1, ?2)",
            params![category_id, address],
        )?;
        Ok(())
    }

    fn addresses_in_category(&self, category: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT cl.address FROM category_links cl
             JOIN categories c ON c.id = cl.category_id
             WHERE c.name = ?1
             ORDER BY cl.rowid",
        )?;
        let urls = stmt
            .query_map(params![category], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(urls)
    }

    fn list_categories(&self) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM categories ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn categories_by_address(&self) -> StorageResult<HashMap<String, Vec<String>>> {
        let mut stmt = self.conn.prepare(
            "SELECT cl.address, c.name FROM category_links cl
             JOIN categories c ON c.id = cl.category_id
             ORDER BY c.name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut by_address: HashMap<String, Vec<String>> = HashMap::new();
        for row in rows {
            let (address, name) = row?;
            by_address.entry(address).or_default().push(name);
        }
        Ok(by_address)
    }

    // ===== Crawl Log =====

    fn log_outcome(
        &mut self,
        run_id: i64,
        address: &str,
        outcome: CrawlOutcome,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_log (run_id, address, outcome, logged_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(run_id, address) DO UPDATE SET
                outcome = excluded.outcome,
                logged_at = excluded.logged_at",
            params![run_id, address, outcome.to_db_string(), now],
        )?;
        Ok(())
    }

    fn get_outcomes(&self, run_id: i64) -> StorageResult<HashMap<String, CrawlOutcome>> {
        let mut stmt = self
            .conn
            .prepare("SELECT address, outcome FROM crawl_log WHERE run_id = ?1")?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut outcomes = HashMap::new();
        for row in rows {
            let (address, outcome) = row?;
            match CrawlOutcome::from_db_string(&outcome) {
                Some(outcome) => {
                    outcomes.insert(address, outcome);
                }
                None => {
                    return Err(StorageError::Serialization(format!(
                        "unknown crawl outcome '{}' for {}",
                        outcome, address
                    )))
                }
            }
        }
        Ok(outcomes)
    }
}
