//! Job scheduler: a bounded worker pool over a FIFO job queue
//!
//! This module handles:
//! - The job queue with an unfinished-job counter (`JobQueue`)
//! - Workers that borrow a session per job and run the pipeline on it
//! - Backoff and retry after rate limits, session replacement after bans
//! - Ending the run once every job is finished or no worker can make progress

use crate::config::CrawlerConfig;
use crate::crawler::pipeline::{ChannelJob, ChannelPipeline, PipelineOutcome};
use crate::session::SessionPool;
use crate::storage::{CrawlOutcome, SqliteStorage, Storage};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::Instant;

struct QueueState {
    jobs: VecDeque<ChannelJob>,
    unfinished: usize,
}

/// FIFO of channel jobs with join semantics
///
/// Every pushed job counts as unfinished until `task_done` is called for it.
/// A job handed back with `requeue` stays unfinished.
pub struct JobQueue {
    state: Mutex<QueueState>,
    available: Notify,
    drained: Notify,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                unfinished: 0,
            }),
            available: Notify::new(),
            drained: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a new job
    pub fn push(&self, job: ChannelJob) {
        {
            let mut state = self.lock();
            state.unfinished += 1;
            state.jobs.push_back(job);
        }
        self.available.notify_one();
    }

    /// Puts a job back without finishing it
    pub fn requeue(&self, job: ChannelJob) {
        self.lock().jobs.push_back(job);
        self.available.notify_one();
    }

    /// Takes the oldest job, waiting up to `timeout` for one to arrive
    pub async fn pop(&self, timeout: Duration) -> Option<ChannelJob> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(job) = self.lock().jobs.pop_front() {
                return Some(job);
            }

            // notify_one stores a permit, so a push racing this check is not lost
            if tokio::time::timeout_at(deadline, self.available.notified())
                .await
                .is_err()
            {
                return self.lock().jobs.pop_front();
            }
        }
    }

    /// Marks one previously pushed job as finished
    pub fn task_done(&self) {
        let finished = {
            let mut state = self.lock();
            state.unfinished = state.unfinished.saturating_sub(1);
            state.unfinished == 0
        };
        if finished {
            self.drained.notify_waiters();
        }
    }

    /// Resolves once every pushed job has been marked finished
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.unfinished() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Removes and returns every queued job
    pub fn drain(&self) -> Vec<ChannelJob> {
        self.lock().jobs.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unfinished(&self) -> usize {
        self.lock().unfinished
    }
}

/// Counters for one scheduler run
///
/// Every job passed to [`Scheduler::run`] ends up in exactly one of
/// `done`, `unresolvable`, `failed` or `deferred`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub done: usize,
    pub unresolvable: usize,
    pub failed: usize,
    /// Jobs left in the queue because no session could run them
    pub deferred: usize,
    pub rate_limits: usize,
    pub bans: usize,
    pub messages_appended: usize,
    /// The run was stopped from outside before the queue drained
    pub interrupted: bool,
}

impl RunSummary {
    pub fn total_jobs(&self) -> usize {
        self.done + self.unresolvable + self.failed + self.deferred
    }

    /// Whether every job reached a final outcome
    pub fn is_complete(&self) -> bool {
        self.deferred == 0 && !self.interrupted
    }
}

/// Where terminal job outcomes are recorded
struct CrawlLog {
    storage: Arc<Mutex<SqliteStorage>>,
    run_id: i64,
}

impl CrawlLog {
    fn record(&self, address: &str, outcome: CrawlOutcome) {
        let result = match self.storage.lock() {
            Ok(mut store) => store.log_outcome(self.run_id, address, outcome),
            Err(_) => {
                tracing::error!("Storage lock poisoned, cannot log outcome for {}", address);
                return;
            }
        };
        if let Err(e) = result {
            tracing::warn!("Failed to log outcome for {}: {}", address, e);
        }
    }
}

/// State shared by all workers of one run
struct Shared {
    config: CrawlerConfig,
    queue: JobQueue,
    sessions: Arc<SessionPool>,
    pipeline: Arc<ChannelPipeline>,
    log: Option<CrawlLog>,
    summary: Mutex<RunSummary>,
    /// Job each worker is currently running, by worker id
    in_flight: Mutex<HashMap<usize, ChannelJob>>,
}

impl Shared {
    fn tally(&self, update: impl FnOnce(&mut RunSummary)) {
        let mut summary = self.summary.lock().unwrap_or_else(|e| e.into_inner());
        update(&mut summary);
    }

    /// Records a terminal outcome and marks the job finished
    fn finish(&self, job: &ChannelJob, outcome: CrawlOutcome) {
        self.tally(|s| match outcome {
            CrawlOutcome::Done => s.done += 1,
            CrawlOutcome::Unresolvable => s.unresolvable += 1,
            CrawlOutcome::Failed => s.failed += 1,
            CrawlOutcome::Deferred => s.deferred += 1,
        });
        if let Some(log) = &self.log {
            log.record(&job.address, outcome);
        }
        self.queue.task_done();
    }

    fn in_flight(&self) -> MutexGuard<'_, HashMap<usize, ChannelJob>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What a worker does after one pipeline attempt
enum Next {
    Finished,
    Retry,
    /// Job went back to the queue; the worker stops
    Stop,
}

/// Drains channel jobs with a fixed number of workers
pub struct Scheduler {
    config: CrawlerConfig,
    sessions: Arc<SessionPool>,
    pipeline: Arc<ChannelPipeline>,
    log: Option<(Arc<Mutex<SqliteStorage>>, i64)>,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `config` - Worker count, dequeue timeout and backoff settings
    /// * `sessions` - The pool workers borrow sessions from
    /// * `pipeline` - The per-channel pipeline each job runs through
    pub fn new(
        config: CrawlerConfig,
        sessions: Arc<SessionPool>,
        pipeline: Arc<ChannelPipeline>,
    ) -> Self {
        Self {
            config,
            sessions,
            pipeline,
            log: None,
        }
    }

    /// Writes terminal job outcomes to the crawl log of `run_id`
    pub fn with_crawl_log(mut self, storage: Arc<Mutex<SqliteStorage>>, run_id: i64) -> Self {
        self.log = Some((storage, run_id));
        self
    }

    /// Runs `jobs` to completion
    ///
    /// Returns once every job is finished, or once all workers have exited
    /// because no session was left to run the remaining jobs. Jobs still
    /// queued at that point are counted as deferred.
    pub async fn run(&self, jobs: Vec<ChannelJob>) -> RunSummary {
        self.run_until(jobs, std::future::pending()).await
    }

    /// Like [`Scheduler::run`], but stops early when `shutdown` resolves
    ///
    /// Workers are aborted; the jobs they were running and the jobs still
    /// queued are counted as deferred.
    pub async fn run_until<F>(&self, jobs: Vec<ChannelJob>, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        let shared = Arc::new(Shared {
            config: self.config.clone(),
            queue: JobQueue::new(),
            sessions: Arc::clone(&self.sessions),
            pipeline: Arc::clone(&self.pipeline),
            log: self.log.as_ref().map(|(storage, run_id)| CrawlLog {
                storage: Arc::clone(storage),
                run_id: *run_id,
            }),
            summary: Mutex::new(RunSummary::default()),
            in_flight: Mutex::new(HashMap::new()),
        });

        let total = jobs.len();
        for job in jobs {
            shared.queue.push(job);
        }

        let worker_count = self.config.workers.max(1);
        tracing::info!("Starting {} workers for {} jobs", worker_count, total);

        let mut workers = JoinSet::new();
        for id in 0..worker_count {
            workers.spawn(worker(id, Arc::clone(&shared)));
        }

        tokio::select! {
            _ = shared.queue.join() => {
                tracing::info!("All jobs processed");
            }
            _ = async { while workers.join_next().await.is_some() {} } => {
                tracing::warn!("All workers exited with {} jobs unfinished", shared.queue.unfinished());
            }
            _ = shutdown => {
                tracing::warn!("Shutdown requested with {} jobs unfinished", shared.queue.unfinished());
                shared.tally(|s| s.interrupted = true);
            }
        }

        workers.abort_all();
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    tracing::error!("Worker task failed: {}", e);
                }
            }
        }

        let interrupted: Vec<ChannelJob> = shared.in_flight().drain().map(|(_, job)| job).collect();
        for job in interrupted {
            tracing::warn!("Deferring {}: interrupted while running", job.address);
            shared.finish(&job, CrawlOutcome::Deferred);
        }
        for job in shared.queue.drain() {
            tracing::warn!("Deferring {}: no session available", job.address);
            shared.finish(&job, CrawlOutcome::Deferred);
        }

        let summary = shared
            .summary
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        tracing::info!(
            "Run finished: {} done, {} unresolvable, {} failed, {} deferred ({} rate limits, {} bans)",
            summary.done,
            summary.unresolvable,
            summary.failed,
            summary.deferred,
            summary.rate_limits,
            summary.bans
        );
        summary
    }
}

async fn worker(id: usize, shared: Arc<Shared>) {
    tracing::debug!("Worker {} started", id);
    let timeout = shared.config.dequeue_timeout();

    while let Some(mut job) = shared.queue.pop(timeout).await {
        shared.in_flight().insert(id, job.clone());
        loop {
            let next = attempt(&shared, &mut job).await;
            // No await between the outcome and this removal, so an abort
            // never sees a job both finished and in flight
            match next {
                Next::Finished => {
                    shared.in_flight().remove(&id);
                    break;
                }
                Next::Retry => continue,
                Next::Stop => {
                    shared.in_flight().remove(&id);
                    tracing::info!("Worker {} stopping: no usable sessions", id);
                    return;
                }
            }
        }
    }

    tracing::debug!("Worker {} idle, exiting", id);
}

/// Runs the pipeline once for `job` on a freshly acquired session
async fn attempt(shared: &Shared, job: &mut ChannelJob) -> Next {
    let Some(lease) = shared.sessions.acquire().await else {
        shared.queue.requeue(job.clone());
        return Next::Stop;
    };
    tracing::debug!("{}: running on session {}", job.address, lease.name);

    let outcome = shared.pipeline.run(lease.client.as_ref(), job).await;
    match outcome {
        PipelineOutcome::Done(report) => {
            shared.sessions.release(lease.id);
            shared.tally(|s| s.messages_appended += report.messages_appended);
            shared.finish(job, CrawlOutcome::Done);
            Next::Finished
        }
        PipelineOutcome::Unresolvable(reason) => {
            shared.sessions.release(lease.id);
            tracing::warn!("{}: {}", job.address, reason);
            shared.finish(job, CrawlOutcome::Unresolvable);
            Next::Finished
        }
        PipelineOutcome::Failed(_) => {
            shared.sessions.release(lease.id);
            shared.finish(job, CrawlOutcome::Failed);
            Next::Finished
        }
        PipelineOutcome::RateLimited { retry_after } => {
            shared.sessions.release(lease.id);
            shared.tally(|s| s.rate_limits += 1);
            job.attempts += 1;

            if shared.sessions.available_count() == 0 {
                shared.queue.requeue(job.clone());
                return Next::Stop;
            }

            let backoff = shared.config.backoff(job.attempts);
            tracing::info!(
                "{}: retry {} in {:?} (remote asked for {}s)",
                job.address,
                job.attempts,
                backoff,
                retry_after.as_secs()
            );
            tokio::time::sleep(backoff).await;
            Next::Retry
        }
        PipelineOutcome::SessionBanned => {
            shared.sessions.mark_banned(lease.id);
            shared.tally(|s| s.bans += 1);
            job.attempts += 1;

            if shared.sessions.available_count() == 0 {
                shared.queue.requeue(job.clone());
                return Next::Stop;
            }
            tracing::info!("{}: retrying on another session", job.address);
            Next::Retry
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphSnapshot;
    use crate::protocol::scripted::{
        channel, forwarded, message, ScriptedConnector, ScriptedWorld,
    };
    use crate::protocol::{FullChat, InviteResult};
    use crate::proxy::ProxyPool;
    use crate::session::PoolSettings;
    use crate::state::SessionState;
    use crate::storage::EdgeKind;
    use std::collections::HashMap;

    fn test_config(workers: usize) -> CrawlerConfig {
        CrawlerConfig {
            workers,
            batch_size: 100,
            dequeue_timeout_ms: 50,
            backoff_unit_ms: 1,
            max_backoff_units: 15,
        }
    }

    fn world_with_channels(count: i64) -> Arc<ScriptedWorld> {
        let world = Arc::new(ScriptedWorld::new());
        for id in 1..=count {
            let handle = format!("channel_{}", id);
            world.add_channel(
                channel(id, Some(&handle), "Channel"),
                Some(FullChat {
                    participants_count: Some(100),
                    about: None,
                }),
            );
            world.set_messages(id, vec![message(1), message(2)]);
        }
        world
    }

    fn jobs(count: i64) -> Vec<ChannelJob> {
        (1..=count)
            .map(|id| ChannelJob::new(format!("https://t.me/channel_{}", id), None))
            .collect()
    }

    fn scheduler(
        world: &Arc<ScriptedWorld>,
        sessions: &[&str],
        workers: usize,
    ) -> (Scheduler, Arc<SessionPool>, Arc<Mutex<SqliteStorage>>) {
        let pool = Arc::new(SessionPool::new(
            sessions.iter().map(|s| s.to_string()).collect(),
            Arc::new(ScriptedConnector::new(Arc::clone(world))),
            ProxyPool::disabled(),
            PoolSettings::immediate(),
        ));
        let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        let pipeline = Arc::new(ChannelPipeline::new(Arc::clone(&storage), 100));
        let scheduler = Scheduler::new(test_config(workers), Arc::clone(&pool), pipeline);
        (scheduler, pool, storage)
    }

    #[tokio::test]
    async fn test_queue_fifo_and_timeout() {
        let queue = JobQueue::new();
        queue.push(ChannelJob::new("a", None));
        queue.push(ChannelJob::new("b", None));

        let first = queue.pop(Duration::from_millis(10)).await.unwrap();
        assert_eq!(first.address, "a");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.unfinished(), 2);

        queue.requeue(first);
        assert_eq!(queue.pop(Duration::from_millis(10)).await.unwrap().address, "b");
        assert_eq!(queue.pop(Duration::from_millis(10)).await.unwrap().address, "a");
        assert!(queue.pop(Duration::from_millis(10)).await.is_none());
    }

    #[tokio::test]
    async fn test_queue_pop_wakes_on_push() {
        let queue = Arc::new(JobQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(ChannelJob::new("late", None));
        let job = waiter.await.unwrap();
        assert_eq!(job.map(|j| j.address), Some("late".to_string()));
    }

    #[tokio::test]
    async fn test_queue_join_waits_for_task_done() {
        let queue = Arc::new(JobQueue::new());
        queue.push(ChannelJob::new("a", None));
        queue.push(ChannelJob::new("b", None));

        let joined = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.join().await })
        };

        queue.task_done();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!joined.is_finished());

        queue.task_done();
        tokio::time::timeout(Duration::from_secs(1), joined)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_all_jobs_finish() {
        let world = world_with_channels(6);
        let (scheduler, pool, storage) = scheduler(&world, &["s1", "s2"], 3);

        let mut all = jobs(6);
        all.push(ChannelJob::new("https://t.me/not_there", None));
        let summary = scheduler.run(all).await;

        assert_eq!(summary.done, 6);
        assert_eq!(summary.unresolvable, 1);
        assert_eq!(summary.total_jobs(), 7);
        assert_eq!(summary.messages_appended, 12);
        assert!(summary.is_complete());
        assert_eq!(pool.available_count(), 2);
        assert!(pool.snapshot().iter().all(|s| s.state == SessionState::Idle));
        assert_eq!(storage.lock().unwrap().count_channels().unwrap(), 6);
    }

    #[tokio::test]
    async fn test_banned_session_is_replaced() {
        let world = world_with_channels(5);
        world.ban_after("s2", 0);
        let (scheduler, pool, _storage) = scheduler(&world, &["s1", "s2", "s3"], 2);

        let summary = scheduler.run(jobs(5)).await;

        assert_eq!(summary.done, 5);
        assert_eq!(summary.deferred, 0);
        assert!(summary.bans <= 1);
        assert_eq!(pool.available_count(), 3 - summary.bans);
        if summary.bans == 1 {
            let states: HashMap<String, SessionState> = pool
                .snapshot()
                .into_iter()
                .map(|s| (s.name, s.state))
                .collect();
            assert_eq!(states["s2"], SessionState::Banned);
        }
    }

    #[tokio::test]
    async fn test_ban_during_run_leaves_two_sessions() {
        let world = world_with_channels(9);
        world.ban_after("s1", 0);
        // One worker walks the slots in order, so s1 is leased first
        let (scheduler, pool, _storage) = scheduler(&world, &["s1", "s2", "s3"], 1);

        let summary = scheduler.run(jobs(9)).await;

        assert_eq!(summary.done, 9);
        assert_eq!(summary.bans, 1);
        assert_eq!(pool.available_count(), 2);
    }

    #[tokio::test]
    async fn test_all_sessions_banned_defers_jobs() {
        let world = world_with_channels(4);
        for name in ["s1", "s2", "s3"] {
            world.ban_after(name, 0);
        }
        let (scheduler, pool, storage) = scheduler(&world, &["s1", "s2", "s3"], 2);
        let run_id = storage.lock().unwrap().create_run("hash").unwrap();
        let scheduler = scheduler.with_crawl_log(Arc::clone(&storage), run_id);

        let summary = tokio::time::timeout(Duration::from_secs(5), scheduler.run(jobs(4)))
            .await
            .expect("run must terminate");

        assert_eq!(summary.done, 0);
        assert_eq!(summary.deferred, 4);
        assert_eq!(summary.bans, 3);
        assert_eq!(summary.total_jobs(), 4);
        assert!(!summary.is_complete());
        assert_eq!(pool.available_count(), 0);

        let outcomes = storage.lock().unwrap().get_outcomes(run_id).unwrap();
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.values().all(|o| *o == CrawlOutcome::Deferred));
    }

    #[tokio::test]
    async fn test_rate_limited_job_is_retried() {
        let world = world_with_channels(1);
        world.rate_limit_next("s1", Duration::from_secs(30));
        let (scheduler, _pool, storage) = scheduler(&world, &["s1"], 1);
        let run_id = storage.lock().unwrap().create_run("hash").unwrap();
        let scheduler = scheduler.with_crawl_log(Arc::clone(&storage), run_id);

        let summary = scheduler.run(jobs(1)).await;

        assert_eq!(summary.done, 1);
        assert_eq!(summary.rate_limits, 1);
        assert_eq!(world.call_count("resolve_by_handle"), 2);

        let outcomes = storage.lock().unwrap().get_outcomes(run_id).unwrap();
        assert_eq!(outcomes["https://t.me/channel_1"], CrawlOutcome::Done);
    }

    #[tokio::test]
    async fn test_shutdown_defers_running_and_queued_jobs() {
        let world = Arc::new(ScriptedWorld::with_latency(Duration::from_millis(200)));
        for id in 1..=4 {
            let handle = format!("channel_{}", id);
            world.add_channel(channel(id, Some(&handle), "Channel"), Some(FullChat::default()));
        }
        let (scheduler, _pool, storage) = scheduler(&world, &["s1", "s2"], 2);
        let run_id = storage.lock().unwrap().create_run("hash").unwrap();
        let scheduler = scheduler.with_crawl_log(Arc::clone(&storage), run_id);

        let summary = scheduler
            .run_until(jobs(4), tokio::time::sleep(Duration::from_millis(30)))
            .await;

        assert!(summary.interrupted);
        assert!(!summary.is_complete());
        assert_eq!(summary.done, 0);
        assert_eq!(summary.deferred, 4);
        assert_eq!(summary.total_jobs(), 4);

        let outcomes = storage.lock().unwrap().get_outcomes(run_id).unwrap();
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.values().all(|o| *o == CrawlOutcome::Deferred));
    }

    #[tokio::test]
    async fn test_empty_job_list() {
        let world = world_with_channels(0);
        let (scheduler, _pool, _storage) = scheduler(&world, &["s1"], 2);
        let summary = scheduler.run(Vec::new()).await;
        assert_eq!(summary, RunSummary::default());
    }

    /// Ten public channels, all linked to channel 1 by repost
    fn linked_world() -> Arc<ScriptedWorld> {
        let world = Arc::new(ScriptedWorld::new());
        for id in 1..=10 {
            let handle = format!("channel_{}", id);
            world.add_channel(
                channel(id, Some(&handle), &handle),
                Some(FullChat {
                    participants_count: Some(10 * id as u64),
                    about: None,
                }),
            );
            if id > 1 {
                world.set_messages(id, vec![message(1), forwarded(2, 1)]);
            }
        }
        world.set_recommendations(1, vec![channel(2, Some("channel_2"), "channel_2")]);
        world.add_invite(
            "PreviewOnly",
            InviteResult::Title {
                title: "Closed club".to_string(),
                participants_count: Some(12),
            },
        );
        world
    }

    fn logged_scheduler(
        world: &Arc<ScriptedWorld>,
        storage: &Arc<Mutex<SqliteStorage>>,
        sessions: &[&str],
        workers: usize,
        run_id: i64,
    ) -> Scheduler {
        let pool = Arc::new(SessionPool::new(
            sessions.iter().map(|s| s.to_string()).collect(),
            Arc::new(ScriptedConnector::new(Arc::clone(world))),
            ProxyPool::disabled(),
            PoolSettings::immediate(),
        ));
        let pipeline = Arc::new(ChannelPipeline::new(Arc::clone(storage), 50));
        let config = CrawlerConfig {
            workers,
            dequeue_timeout_ms: 50,
            backoff_unit_ms: 1,
            ..Default::default()
        };
        Scheduler::new(config, pool, pipeline).with_crawl_log(Arc::clone(storage), run_id)
    }

    fn jobs_for(ids: impl IntoIterator<Item = i64>) -> Vec<ChannelJob> {
        ids.into_iter()
            .map(|id| {
                ChannelJob::new(
                    format!("https://t.me/channel_{}", id),
                    Some("news".to_string()),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_ban_mid_run_moves_work_to_other_sessions() {
        let world = linked_world();
        world.ban_after("s1", 3);

        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let run_id = storage.create_run("hash").unwrap();
        let storage = Arc::new(Mutex::new(storage));

        let scheduler = logged_scheduler(&world, &storage, &["s1", "s2", "s3"], 3, run_id);
        let summary = scheduler.run(jobs_for(2..=10)).await;

        assert_eq!(summary.done, 9);
        assert_eq!(summary.bans, 1);
        assert!(summary.is_complete());

        let store = storage.lock().unwrap();
        let outcomes = store.get_outcomes(run_id).unwrap();
        assert_eq!(outcomes.len(), 9);
        assert!(outcomes.values().all(|o| *o == CrawlOutcome::Done));
        // Every channel reposts from channel 1
        assert_eq!(store.count_edges(EdgeKind::Related).unwrap(), 9);
        assert_eq!(store.count_messages(None).unwrap(), 18);
    }

    #[tokio::test]
    async fn test_rerun_adds_nothing_and_graph_is_stable() {
        let world = linked_world();
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let first_run = storage.create_run("hash").unwrap();
        let storage = Arc::new(Mutex::new(storage));

        let mut work = jobs_for(1..=3);
        work.push(ChannelJob::new(
            "https://t.me/+PreviewOnly",
            Some("clubs".to_string()),
        ));

        let first = logged_scheduler(&world, &storage, &["s1"], 1, first_run)
            .run(work.clone())
            .await;
        assert_eq!(first.done, 4);
        assert_eq!(first.messages_appended, 4);

        let before = GraphSnapshot::from_storage(&*storage.lock().unwrap()).unwrap();

        let second_run = storage.lock().unwrap().create_run("hash").unwrap();
        let second = logged_scheduler(&world, &storage, &["s1"], 1, second_run)
            .run(work)
            .await;
        assert_eq!(second.done, 4);
        assert_eq!(second.messages_appended, 0);

        let after = GraphSnapshot::from_storage(&*storage.lock().unwrap()).unwrap();
        assert_eq!(before, after);

        // channel_1 -> channel_2 similar; channel_2, channel_3 -> channel_1 reposts
        assert_eq!(after.similar.len(), 1);
        assert_eq!(after.reposts.len(), 2);

        let store = storage.lock().unwrap();
        let preview = store
            .get_channel("https://t.me/+PreviewOnly")
            .unwrap()
            .expect("invite preview stored");
        assert_eq!(preview.channel_id, None);
        assert_eq!(preview.name.as_deref(), Some("Closed club"));
        assert_eq!(preview.subscribers, Some(12));
        assert_eq!(
            store.addresses_in_category("clubs").unwrap(),
            vec!["https://t.me/+PreviewOnly".to_string()]
        );
    }
}
