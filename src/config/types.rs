use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Channel-Graph
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub sessions: SessionsConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
    pub output: OutputConfig,
    #[serde(default)]
    pub graph: Option<GraphConfig>,
    /// Categories to crawl, in order
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Worker pool and pagination configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Number of concurrent workers
    pub workers: usize,

    /// Messages requested per pagination call
    #[serde(rename = "batch-size")]
    pub batch_size: u32,

    /// How long an idle worker waits on an empty queue before exiting (milliseconds)
    #[serde(rename = "dequeue-timeout-ms")]
    pub dequeue_timeout_ms: u64,

    /// Length of one backoff unit after a rate limit (milliseconds)
    #[serde(rename = "backoff-unit-ms")]
    pub backoff_unit_ms: u64,

    /// Upper bound on the backoff, in units
    #[serde(rename = "max-backoff-units")]
    pub max_backoff_units: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            batch_size: 100,
            dequeue_timeout_ms: 30_000,
            backoff_unit_ms: 1_000,
            max_backoff_units: 15,
        }
    }
}

impl CrawlerConfig {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    /// Backoff before retry number `attempt` (1-based): `min(attempt * 2, max)` units
    pub fn backoff(&self, attempt: u32) -> Duration {
        let units = attempt.saturating_mul(2).min(self.max_backoff_units);
        Duration::from_millis(self.backoff_unit_ms.saturating_mul(units as u64))
    }
}

/// Session slot configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Directory containing `<name>.session` files
    pub directory: String,

    /// Consecutive connect/authorization failures before a slot is banned
    #[serde(rename = "connect-failure-limit", default = "default_connect_failure_limit")]
    pub connect_failure_limit: u32,

    /// Lower bound of the randomized delay before a first connect (milliseconds)
    #[serde(rename = "startup-delay-min-ms", default = "default_startup_delay_min")]
    pub startup_delay_min_ms: u64,

    /// Upper bound of the randomized delay before a first connect (milliseconds)
    #[serde(rename = "startup-delay-max-ms", default = "default_startup_delay_max")]
    pub startup_delay_max_ms: u64,

    /// Sleep between scans when every usable slot is busy (milliseconds)
    #[serde(rename = "acquire-poll-ms", default = "default_acquire_poll")]
    pub acquire_poll_ms: u64,
}

fn default_connect_failure_limit() -> u32 {
    3
}

fn default_startup_delay_min() -> u64 {
    500
}

fn default_startup_delay_max() -> u64 {
    3_000
}

fn default_acquire_poll() -> u64 {
    250
}

/// Protocol gateway connection and device profile
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Base URL of the protocol gateway
    #[serde(rename = "base-url")]
    pub base_url: String,

    #[serde(rename = "api-id")]
    pub api_id: i64,

    #[serde(rename = "api-hash")]
    pub api_hash: String,

    #[serde(rename = "device-model", default = "default_device_model")]
    pub device_model: String,

    #[serde(rename = "system-version", default = "default_system_version")]
    pub system_version: String,

    #[serde(rename = "app-version", default = "default_app_version")]
    pub app_version: String,

    #[serde(rename = "lang-code", default = "default_lang_code")]
    pub lang_code: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_device_model() -> String {
    "MacBook Air M1".to_string()
}

fn default_system_version() -> String {
    "macOS 14.4.1".to_string()
}

fn default_app_version() -> String {
    "4.16.8 arm64".to_string()
}

fn default_lang_code() -> String {
    "en".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

/// Proxy sources
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// JSON endpoint listing free proxies
    #[serde(rename = "list-url", default)]
    pub list_url: Option<String>,

    /// Proxies slower than this are discarded (milliseconds)
    #[serde(rename = "max-timeout-ms", default = "default_proxy_timeout")]
    pub max_timeout_ms: u64,

    /// Fixed `host:port` entries
    #[serde(rename = "static", default)]
    pub static_proxies: Vec<String>,
}

fn default_proxy_timeout() -> u64 {
    500
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Neo4j export target
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}
