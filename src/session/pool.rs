//! Session pool
//!
//! Owns one slot per session credential. A slot connects lazily the first time
//! it is acquired, stays bound to the proxy it got at that point, and moves
//! between `Idle`, `Busy` and `Banned`:
//!
//! ```text
//! Idle --acquire--> Busy --release--> Idle
//!   \                 |
//!    \--(K failed connects)--> Banned <--mark_banned--/
//! ```
//!
//! The pool lock only guards bookkeeping. Connecting happens outside it, with
//! the slot already marked `Busy` so no other caller can pick it up.

use crate::config::SessionsConfig;
use crate::protocol::{Connector, ProtocolClient, RemoteError};
use crate::proxy::{ProxyEndpoint, ProxyPool};
use crate::state::SessionState;
use crate::GraphError;
use rand::Rng;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Exclusive use of one session until it is released or banned
#[derive(Clone)]
pub struct SessionLease {
    /// Slot index, passed back to `release` / `mark_banned`
    pub id: usize,
    pub name: String,
    pub client: Arc<dyn ProtocolClient>,
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

/// Point-in-time view of a slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSnapshot {
    pub name: String,
    pub state: SessionState,
    pub connected: bool,
    pub proxy: Option<ProxyEndpoint>,
    pub consecutive_failures: u32,
}

/// Connect policy knobs
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Consecutive failed connects before a slot is banned
    pub connect_failure_limit: u32,
    pub startup_delay_min: Duration,
    pub startup_delay_max: Duration,
    /// Sleep between scans while every usable slot is busy
    pub acquire_poll: Duration,
}

impl PoolSettings {
    /// No startup delay and a short poll
    pub fn immediate() -> Self {
        Self {
            connect_failure_limit: 3,
            startup_delay_min: Duration::ZERO,
            startup_delay_max: Duration::ZERO,
            acquire_poll: Duration::from_millis(5),
        }
    }

    fn startup_delay(&self) -> Duration {
        if self.startup_delay_max <= self.startup_delay_min {
            return self.startup_delay_min;
        }
        rand::thread_rng().gen_range(self.startup_delay_min..=self.startup_delay_max)
    }
}

impl From<&SessionsConfig> for PoolSettings {
    fn from(config: &SessionsConfig) -> Self {
        Self {
            connect_failure_limit: config.connect_failure_limit.max(1),
            startup_delay_min: Duration::from_millis(config.startup_delay_min_ms),
            startup_delay_max: Duration::from_millis(config.startup_delay_max_ms),
            acquire_poll: Duration::from_millis(config.acquire_poll_ms),
        }
    }
}

struct Slot {
    name: String,
    state: SessionState,
    client: Option<Arc<dyn ProtocolClient>>,
    /// `Some` once a proxy decision was made; the inner value may be a direct connection
    proxy: Option<Option<ProxyEndpoint>>,
    consecutive_failures: u32,
}

struct PoolState {
    slots: Vec<Slot>,
    cursor: usize,
}

impl PoolState {
    fn all_banned(&self) -> bool {
        self.slots.iter().all(|s| s.state == SessionState::Banned)
    }
}

/// What one scan over the slots produced
enum Scan {
    Leased(SessionLease),
    AllBusy,
    AllBanned,
}

/// A slot picked by a scan that still has to connect
struct Reserved {
    id: usize,
    name: String,
    proxy: Option<Option<ProxyEndpoint>>,
}

/// Pool of session slots shared by all workers
pub struct SessionPool {
    state: Mutex<PoolState>,
    connector: Arc<dyn Connector>,
    proxies: ProxyPool,
    settings: PoolSettings,
}

impl SessionPool {
    pub fn new(
        names: Vec<String>,
        connector: Arc<dyn Connector>,
        proxies: ProxyPool,
        settings: PoolSettings,
    ) -> Self {
        let slots = names
            .into_iter()
            .map(|name| Slot {
                name,
                state: SessionState::Idle,
                client: None,
                proxy: None,
                consecutive_failures: 0,
            })
            .collect();

        Self {
            state: Mutex::new(PoolState { slots, cursor: 0 }),
            connector,
            proxies,
            settings,
        }
    }

    /// Creates a pool over the `*.session` files of the configured directory
    ///
    /// # Returns
    ///
    /// * `Ok(SessionPool)` - At least one session was found
    /// * `Err(GraphError::NoSessions)` - The directory holds no session files
    /// * `Err(GraphError::Io)` - The directory could not be read
    pub fn from_config(
        config: &SessionsConfig,
        connector: Arc<dyn Connector>,
        proxies: ProxyPool,
    ) -> Result<Self, GraphError> {
        let names = discover_sessions(Path::new(&config.directory))?;
        if names.is_empty() {
            return Err(GraphError::NoSessions(config.directory.clone()));
        }
        tracing::info!("Found {} sessions in {}", names.len(), config.directory);
        Ok(Self::new(names, connector, proxies, PoolSettings::from(config)))
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hands out an idle session for exclusive use
    ///
    /// Waits (polling) while every usable slot is busy.
    ///
    /// # Returns
    ///
    /// * `Some(SessionLease)` - A connected, authorized session now marked busy
    /// * `None` - Every slot is banned
    pub async fn acquire(&self) -> Option<SessionLease> {
        loop {
            match self.scan().await {
                Scan::Leased(lease) => return Some(lease),
                Scan::AllBanned => {
                    tracing::error!("All sessions are banned");
                    return None;
                }
                Scan::AllBusy => tokio::time::sleep(self.settings.acquire_poll).await,
            }
        }
    }

    /// One rotation over the slots, connecting idle ones as needed
    async fn scan(&self) -> Scan {
        let total = self.len();

        for _ in 0..total {
            let reserved = {
                let mut state = self.lock();
                if state.all_banned() {
                    return Scan::AllBanned;
                }

                let id = state.cursor;
                state.cursor = (state.cursor + 1) % state.slots.len();

                let slot = &mut state.slots[id];
                if !slot.state.is_available() {
                    continue;
                }
                slot.state = SessionState::Busy;

                if let Some(client) = &slot.client {
                    tracing::info!("Allocated session: {}", slot.name);
                    return Scan::Leased(SessionLease {
                        id,
                        name: slot.name.clone(),
                        client: Arc::clone(client),
                    });
                }

                Reserved {
                    id,
                    name: slot.name.clone(),
                    proxy: slot.proxy.clone(),
                }
            };

            if let Some(lease) = self.connect_reserved(reserved).await {
                return Scan::Leased(lease);
            }
        }

        if self.lock().all_banned() {
            Scan::AllBanned
        } else {
            Scan::AllBusy
        }
    }

    async fn connect_reserved(&self, reserved: Reserved) -> Option<SessionLease> {
        let Reserved { id, name, proxy } = reserved;

        tokio::time::sleep(self.settings.startup_delay()).await;

        let proxy = match proxy {
            Some(bound) => bound,
            None => {
                let picked = self.proxies.next_endpoint().await;
                self.lock().slots[id].proxy = Some(picked.clone());
                picked
            }
        };

        match &proxy {
            Some(p) => tracing::info!("Using proxy {} for session {}", p, name),
            None => tracing::info!("Connecting session {} without proxy", name),
        }

        let outcome = match self.connector.connect(&name, proxy.as_ref()).await {
            Ok(client) => match client.is_authorized().await {
                Ok(true) => Ok(client),
                Ok(false) => {
                    if let Err(e) = client.disconnect().await {
                        tracing::debug!("Disconnect of unauthorized session {} failed: {}", name, e);
                    }
                    Err(RemoteError::Rpc("session is not authorized".to_string()))
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        let mut state = self.lock();
        let limit = self.settings.connect_failure_limit;
        let slot = &mut state.slots[id];

        match outcome {
            Ok(client) => {
                slot.client = Some(Arc::clone(&client));
                slot.consecutive_failures = 0;
                tracing::info!("Allocated session: {}", name);
                Some(SessionLease { id, name, client })
            }
            Err(e) => {
                slot.consecutive_failures += 1;
                if slot.state == SessionState::Banned {
                    return None;
                }
                if e == RemoteError::Banned || slot.consecutive_failures >= limit {
                    tracing::warn!(
                        "Session {} failed to connect {} time(s) ({}), banning it",
                        name,
                        slot.consecutive_failures,
                        e
                    );
                    slot.state = SessionState::Banned;
                } else {
                    tracing::error!("Failed to connect session {}: {}", name, e);
                    slot.state = SessionState::Idle;
                }
                None
            }
        }
    }

    /// Returns a busy session to the pool; no-op for idle or banned slots
    pub fn release(&self, id: usize) {
        let mut state = self.lock();
        if let Some(slot) = state.slots.get_mut(id) {
            if slot.state == SessionState::Busy {
                slot.state = SessionState::Idle;
                tracing::debug!("Released session: {}", slot.name);
            }
        }
    }

    /// Permanently removes a session from rotation
    pub fn mark_banned(&self, id: usize) {
        let mut state = self.lock();
        if let Some(slot) = state.slots.get_mut(id) {
            if !slot.state.is_terminal() {
                tracing::warn!(
                    "Session {} has been banned and will no longer be used",
                    slot.name
                );
                slot.state = SessionState::Banned;
            }
        }
    }

    /// Number of sessions that are not banned
    pub fn available_count(&self) -> usize {
        self.lock()
            .slots
            .iter()
            .filter(|s| !s.state.is_terminal())
            .count()
    }

    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.lock()
            .slots
            .iter()
            .map(|s| SlotSnapshot {
                name: s.name.clone(),
                state: s.state,
                connected: s.client.is_some(),
                proxy: s.proxy.clone().flatten(),
                consecutive_failures: s.consecutive_failures,
            })
            .collect()
    }

    /// Disconnects every cached connection
    pub async fn close(&self) {
        let clients: Vec<(String, Arc<dyn ProtocolClient>)> = {
            let mut state = self.lock();
            state
                .slots
                .iter_mut()
                .filter_map(|s| s.client.take().map(|c| (s.name.clone(), c)))
                .collect()
        };

        for (name, client) in clients {
            if let Err(e) = client.disconnect().await {
                tracing::warn!("Failed to disconnect session {}: {}", name, e);
            }
        }
    }
}

/// Lists session names (`<name>.session` files) in `dir`, sorted
pub fn discover_sessions(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("session") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            names.push(stem.to_string());
        }
    }
    names.sort();
    Ok(names)
}
