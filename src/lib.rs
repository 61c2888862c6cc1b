//! Channel-Graph: a channel relationship crawler
//!
//! This crate resolves social-network channels through a pool of authenticated
//! protocol sessions, collects their recommended ("similar") channels and the
//! channels they repost from ("related"), stores everything in SQLite and
//! exports the resulting graph to Neo4j.

pub mod address;
pub mod config;
pub mod crawler;
pub mod graph;
pub mod output;
pub mod protocol;
pub mod proxy;
pub mod session;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Channel-Graph operations
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Graph store error: {0}")]
    Neo4j(#[from] neo4rs::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("No sessions found in {0}")]
    NoSessions(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid proxy entry: {0}")]
    InvalidProxy(String),
}

/// Channel address errors
#[derive(Debug, Error)]
pub enum AddressError {
    #[error("Empty channel address")]
    Empty,

    #[error("Unsupported host in channel address: {0}")]
    UnsupportedHost(String),

    #[error("Malformed channel address: {0}")]
    Malformed(String),
}

/// Result type alias for Channel-Graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for address operations
pub type AddressResult<T> = std::result::Result<T, AddressError>;

// Re-export commonly used types
pub use address::{classify_address, ChannelAddress};
pub use config::Config;
pub use state::{ChannelStage, SessionState};
