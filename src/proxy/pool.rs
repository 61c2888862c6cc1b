//! Proxy pool
//!
//! Endpoints come from two places: fixed `host:port` entries in the config and
//! an optional JSON list endpoint. The list is fetched lazily on first use and
//! refetched whenever the pool runs dry. A failed fetch is logged and leaves
//! the pool with whatever static entries it has.

use crate::config::ProxyConfig;
use crate::proxy::ProxyEndpoint;
use crate::GraphError;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;

/// Response shape of the proxy list endpoint
#[derive(Debug, Deserialize)]
struct ProxyList {
    proxies: Vec<serde_json::Value>,
}

/// Supplies egress endpoints, one per session connect
pub struct ProxyPool {
    http: Client,
    list_url: Option<String>,
    max_timeout_ms: u64,
    static_endpoints: Vec<ProxyEndpoint>,
    fetched: Mutex<Vec<ProxyEndpoint>>,
}

impl ProxyPool {
    /// Builds a pool from the optional `[proxy]` config section
    pub fn from_config(config: Option<&ProxyConfig>) -> Result<Self, GraphError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        let Some(config) = config else {
            return Ok(Self::new(http, None, 0, Vec::new()));
        };

        let static_endpoints = config
            .static_proxies
            .iter()
            .map(|entry| ProxyEndpoint::parse(entry))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(
            http,
            config.list_url.clone(),
            config.max_timeout_ms,
            static_endpoints,
        ))
    }

    /// A pool with fixed endpoints and no list source
    pub fn with_endpoints(endpoints: Vec<ProxyEndpoint>) -> Self {
        Self::new(Client::new(), None, 0, endpoints)
    }

    /// A pool that never hands out a proxy
    pub fn disabled() -> Self {
        Self::with_endpoints(Vec::new())
    }

    fn new(
        http: Client,
        list_url: Option<String>,
        max_timeout_ms: u64,
        static_endpoints: Vec<ProxyEndpoint>,
    ) -> Self {
        Self {
            http,
            list_url,
            max_timeout_ms,
            static_endpoints,
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// Number of endpoints currently known
    pub fn len(&self) -> usize {
        self.static_endpoints.len() + self.fetched_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fetched_len(&self) -> usize {
        self.fetched.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Picks a random endpoint, refetching the list once if the pool is empty
    ///
    /// # Returns
    ///
    /// * `Some(ProxyEndpoint)` - The endpoint to bind a session to
    /// * `None` - No proxy is available; the session connects directly
    pub async fn next_endpoint(&self) -> Option<ProxyEndpoint> {
        if self.is_empty() {
            self.refresh().await;
        }

        let fetched = self
            .fetched
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default();
        let candidates: Vec<&ProxyEndpoint> =
            self.static_endpoints.iter().chain(fetched.iter()).collect();

        candidates
            .choose(&mut rand::thread_rng())
            .map(|endpoint| (*endpoint).clone())
    }

    /// Refetches the proxy list; returns the number of usable entries
    pub async fn refresh(&self) -> usize {
        let Some(url) = &self.list_url else {
            tracing::debug!("No proxy list-url configured, skipping proxy fetch");
            return 0;
        };

        let endpoints = match self.fetch(url).await {
            Ok(list) => filter_proxies(&list.proxies, self.max_timeout_ms),
            Err(e) => {
                tracing::error!("Failed to fetch proxy list from {}: {}", url, e);
                Vec::new()
            }
        };

        let count = endpoints.len();
        tracing::info!("Fetched {} proxies", count);
        if let Ok(mut fetched) = self.fetched.lock() {
            *fetched = endpoints;
        }
        count
    }

    async fn fetch(&self, url: &str) -> Result<ProxyList, reqwest::Error> {
        self.http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<ProxyList>()
            .await
    }
}

/// Keeps `http` entries with an integer port that answer within `max_timeout_ms`
fn filter_proxies(entries: &[serde_json::Value], max_timeout_ms: u64) -> Vec<ProxyEndpoint> {
    entries
        .iter()
        .filter_map(|entry| {
            let timeout = entry.get("timeout").and_then(|t| t.as_f64())?;
            if timeout.round() > max_timeout_ms as f64 {
                return None;
            }

            if entry.get("protocol").and_then(|p| p.as_str()) != Some("http") {
                return None;
            }

            let ip = entry
                .get("ip")
                .and_then(|ip| ip.as_str())
                .filter(|ip| !ip.is_empty())?;

            let port = match entry.get("port") {
                Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
                Some(serde_json::Value::String(s)) => s.trim().parse::<u16>().ok(),
                _ => None,
            };
            match port {
                Some(port) if port != 0 => Some(ProxyEndpoint::new(ip, port)),
                _ => {
                    tracing::warn!("Invalid port format for {}: {:?}", ip, entry.get("port"));
                    None
                }
            }
        })
        .collect()
}
