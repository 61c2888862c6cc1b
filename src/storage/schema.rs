//! Database schema definitions
//!
//! Channels are keyed by their canonical address. Edges and messages refer to
//! channels by that address; category links do not, because discovery can
//! record an address before the channel itself is crawled.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Resolved channels
CREATE TABLE IF NOT EXISTS channels (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address TEXT NOT NULL UNIQUE,
    channel_id INTEGER,
    name TEXT,
    subscribers INTEGER,
    verified INTEGER NOT NULL DEFAULT 0,
    created_at TEXT,
    -- Highest message id whose forwards were resolved into related edges
    related_checkpoint INTEGER,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_channels_channel_id ON channels(channel_id);

-- Recommendation edges (main -> similar)
CREATE TABLE IF NOT EXISTS channel_similar (
    source TEXT NOT NULL REFERENCES channels(address) ON DELETE CASCADE,
    target TEXT NOT NULL REFERENCES channels(address) ON DELETE CASCADE,
    PRIMARY KEY (source, target)
);

-- Forward-provenance edges (main -> reposted-from)
CREATE TABLE IF NOT EXISTS channel_related (
    source TEXT NOT NULL REFERENCES channels(address) ON DELETE CASCADE,
    target TEXT NOT NULL REFERENCES channels(address) ON DELETE CASCADE,
    PRIMARY KEY (source, target)
);

-- Fetched messages; the per-channel maximum message_id is the checkpoint
CREATE TABLE IF NOT EXISTS channel_messages (
    channel TEXT NOT NULL REFERENCES channels(address) ON DELETE CASCADE,
    message_id INTEGER NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (channel, message_id)
);

-- Discovery categories
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS category_links (
    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
    address TEXT NOT NULL,
    PRIMARY KEY (category_id, address)
);

CREATE INDEX IF NOT EXISTS idx_category_links_address ON category_links(address);

-- Terminal job outcomes per run, used to resume interrupted runs
CREATE TABLE IF NOT EXISTS crawl_log (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    address TEXT NOT NULL,
    outcome TEXT NOT NULL,
    logged_at TEXT NOT NULL,
    PRIMARY KEY (run_id, address)
);
"#;

/// Initializes the database schema
///
/// Safe to call on an existing database; every statement is `IF NOT EXISTS`.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
