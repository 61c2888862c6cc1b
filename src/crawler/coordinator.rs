//! Crawler coordinator - main crawl orchestration logic
//!
//! This module wires one crawl run together:
//! - Opening storage and creating or resuming a run record
//! - Building the job list from discovery categories
//! - Creating the proxy and session pools
//! - Running the scheduler and closing the run with its final status

use crate::address::classify_address;
use crate::config::Config;
use crate::crawler::pipeline::{ChannelJob, ChannelPipeline};
use crate::crawler::scheduler::{RunSummary, Scheduler};
use crate::crawler::source::ChannelSource;
use crate::protocol::{Connector, GatewayConnector};
use crate::proxy::ProxyPool;
use crate::session::SessionPool;
use crate::storage::{RunStatus, SqliteStorage, Storage, StorageResult};
use crate::GraphError;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Config,
    storage: Arc<Mutex<SqliteStorage>>,
    run_id: i64,
    resumed: bool,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `config_hash` - Hash of the config file, stored on the run record
    /// * `fresh` - Start a new run even if the last one did not finish
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Storage is open and a run is active
    /// * `Err(GraphError)` - Failed to initialize
    pub fn new(config: Config, config_hash: &str, fresh: bool) -> Result<Self, GraphError> {
        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        Self::with_storage(config, storage, config_hash, fresh)
    }

    /// Like [`Coordinator::new`], over an already opened store
    pub fn with_storage(
        config: Config,
        mut storage: SqliteStorage,
        config_hash: &str,
        fresh: bool,
    ) -> Result<Self, GraphError> {
        let unfinished = match storage.get_latest_run()? {
            Some(run) if !fresh && matches!(run.status, RunStatus::Running | RunStatus::Interrupted) => {
                Some(run)
            }
            _ => None,
        };

        let (run_id, resumed) = match unfinished {
            Some(run) => {
                if run.config_hash != config_hash {
                    tracing::warn!(
                        "Configuration changed since run {} started; resuming anyway",
                        run.id
                    );
                }
                tracing::info!("Resuming interrupted run {}", run.id);
                storage.update_run_status(run.id, RunStatus::Running)?;
                (run.id, true)
            }
            None => {
                let run_id = storage.create_run(config_hash)?;
                tracing::info!("Starting new run {}", run_id);
                (run_id, false)
            }
        };

        Ok(Self {
            config,
            storage: Arc::new(Mutex::new(storage)),
            run_id,
            resumed,
        })
    }

    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Shared handle to the run's store
    pub fn storage(&self) -> Arc<Mutex<SqliteStorage>> {
        Arc::clone(&self.storage)
    }

    fn store(&self) -> Result<MutexGuard<'_, SqliteStorage>, GraphError> {
        self.storage
            .lock()
            .map_err(|_| GraphError::Storage("storage lock poisoned".to_string()))
    }

    /// Categories to crawl: explicit, else configured, else every stored one
    pub fn resolve_categories(&self, requested: &[String]) -> Result<Vec<String>, GraphError> {
        Ok(resolve_categories(&self.config, &*self.store()?, requested)?)
    }

    /// Builds the job list for `categories`
    ///
    /// On a resumed run, addresses that already reached a final outcome are
    /// skipped.
    pub fn load_jobs(&self, categories: &[String]) -> Result<Vec<ChannelJob>, GraphError> {
        let store = self.store()?;
        let finished = if self.resumed {
            store.get_outcomes(self.run_id)?
        } else {
            HashMap::new()
        };
        let skip: HashSet<String> = finished
            .into_iter()
            .filter(|(_, outcome)| outcome.is_final())
            .map(|(address, _)| address)
            .collect();

        let jobs = collect_jobs(&*store, categories, &skip)?;
        if !skip.is_empty() {
            tracing::info!(
                "Skipping channels finished earlier in run {} ({} logged)",
                self.run_id,
                skip.len()
            );
        }
        Ok(jobs)
    }

    /// Runs the crawl over `categories` with sessions opened by `connector`
    ///
    /// The run ends `completed` when every job reached a final outcome and
    /// `interrupted` when jobs were deferred for lack of sessions.
    pub async fn run(
        &self,
        connector: Arc<dyn Connector>,
        categories: &[String],
    ) -> Result<RunSummary, GraphError> {
        self.run_until(connector, categories, std::future::pending())
            .await
    }

    /// Like [`Coordinator::run`], but stops the scheduler when `shutdown`
    /// resolves; the sessions are still closed and the run ends `interrupted`
    pub async fn run_until<F>(
        &self,
        connector: Arc<dyn Connector>,
        categories: &[String],
        shutdown: F,
    ) -> Result<RunSummary, GraphError>
    where
        F: Future<Output = ()>,
    {
        let categories = self.resolve_categories(categories)?;
        let jobs = self.load_jobs(&categories)?;
        tracing::info!(
            "Run {}: {} channels across {} categories",
            self.run_id,
            jobs.len(),
            categories.len()
        );

        if jobs.is_empty() {
            self.store()?.complete_run(self.run_id)?;
            return Ok(RunSummary::default());
        }

        let sessions = match self.open_sessions(connector) {
            Ok(sessions) => Arc::new(sessions),
            Err(e) => {
                self.store()?.update_run_status(self.run_id, RunStatus::Failed)?;
                return Err(e);
            }
        };

        let pipeline = Arc::new(ChannelPipeline::new(
            self.storage(),
            self.config.crawler.batch_size,
        ));
        let scheduler = Scheduler::new(self.config.crawler.clone(), Arc::clone(&sessions), pipeline)
            .with_crawl_log(self.storage(), self.run_id);

        let start_time = std::time::Instant::now();
        let summary = scheduler.run_until(jobs, shutdown).await;
        sessions.close().await;

        let status = if summary.is_complete() {
            RunStatus::Completed
        } else {
            RunStatus::Interrupted
        };
        self.store()?.update_run_status(self.run_id, status)?;

        tracing::info!(
            "Run {} {} in {:?}: {} new messages",
            self.run_id,
            status.to_db_string(),
            start_time.elapsed(),
            summary.messages_appended
        );
        Ok(summary)
    }

    fn open_sessions(&self, connector: Arc<dyn Connector>) -> Result<SessionPool, GraphError> {
        let proxies = ProxyPool::from_config(self.config.proxy.as_ref())?;
        SessionPool::from_config(&self.config.sessions, connector, proxies)
    }
}

/// Categories to crawl: `requested`, else `config.categories`, else every stored one
pub fn resolve_categories<S: Storage + ?Sized>(
    config: &Config,
    storage: &S,
    requested: &[String],
) -> StorageResult<Vec<String>> {
    if !requested.is_empty() {
        return Ok(requested.to_vec());
    }
    if !config.categories.is_empty() {
        return Ok(config.categories.clone());
    }
    storage.list_categories()
}

/// Jobs for every address discovered in `categories`
///
/// Addresses are canonicalized and deduplicated across categories (the
/// first category wins); addresses in `skip` are left out.
pub fn collect_jobs<S: ChannelSource + ?Sized>(
    source: &S,
    categories: &[String],
    skip: &HashSet<String>,
) -> StorageResult<Vec<ChannelJob>> {
    let mut seen = HashSet::new();
    let mut jobs = Vec::new();

    for category in categories {
        let urls = source.channel_urls_by_category(category)?;
        tracing::info!("Category {}: {} addresses", category, urls.len());

        for raw in urls {
            let address = match classify_address(&raw) {
                Ok(address) => address.canonical_link(),
                Err(e) => {
                    tracing::warn!("Skipping address '{}': {}", raw, e);
                    continue;
                }
            };
            if skip.contains(&address) || !seen.insert(address.clone()) {
                continue;
            }
            jobs.push(ChannelJob::new(address, Some(category.clone())));
        }
    }
    Ok(jobs)
}

/// Runs a complete crawl against the configured protocol gateway
///
/// # Example
///
/// ```no_run
/// use channel_graph::config::load_config_with_hash;
/// use channel_graph::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let summary = run_crawl(config, &hash, false, &[]).await?;
/// println!("{} channels done", summary.done);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(
    config: Config,
    config_hash: &str,
    fresh: bool,
    categories: &[String],
) -> Result<RunSummary, GraphError> {
    let connector: Arc<dyn Connector> = Arc::new(GatewayConnector::new(&config.gateway)?);
    let coordinator = Coordinator::new(config, config_hash, fresh)?;

    let run_id = coordinator.run_id();
    let ctrl_c = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::warn!("Interrupted, run {} can be resumed", run_id);
    };
    coordinator.run_until(connector, categories, ctrl_c).await
}
