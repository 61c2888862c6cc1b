//! Per-channel crawl pipeline
//!
//! One job walks the stages in [`ChannelStage`] order:
//!
//! 1. **Resolve**: classify the address and fetch metadata
//! 2. **FetchSimilar**: recommendation list, public handles only
//! 3. **FetchMessages**: paginate above the checkpoint, one transaction per batch
//! 4. **ExtractRelated**: forwarded-from channel ids not yet turned into edges
//! 5. **ResolveRelated**: resolve those ids into channel records
//! 6. **Persist**: channels, edges, category link, related checkpoint
//!
//! Rate limits and bans abort the job and go back to the scheduler as-is.
//! Every other failure ends the job (`Failed`), except where a stage
//! explicitly tolerates it (empty recommendations, unresolvable forwards).

use crate::address::{classify_address, ChannelAddress};
use crate::protocol::{
    Entity, FullChat, InviteResult, Message, MessageCursor, ProtocolClient, RemoteError,
};
use crate::state::ChannelStage;
use crate::storage::{ChannelRecord, MessageRecord, SqliteStorage, Storage, StorageError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A channel address waiting to be crawled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelJob {
    /// Canonical channel link
    pub address: String,

    /// Discovery category the address came from
    pub category: Option<String>,

    /// Retries so far (rate limits and session bans)
    pub attempts: u32,
}

impl ChannelJob {
    pub fn new(address: impl Into<String>, category: Option<String>) -> Self {
        Self {
            address: address.into(),
            category,
            attempts: 0,
        }
    }
}

/// What the Resolve stage found
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Public (or id-addressed) channel with its full-info companion
    PublicChannel { entity: Entity, full: FullChat },

    /// Invite pointing at a visible chat; no subscriber count
    InviteChat { entity: Entity },

    /// Invite preview only; no entity to continue with
    InviteTitle {
        title: String,
        participants_count: Option<u64>,
    },

    Unresolved { reason: String },
}

/// Counts for one finished channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelReport {
    pub address: String,
    pub similar: usize,
    pub related: usize,
    pub messages_appended: usize,
    pub checkpoint: Option<i64>,
}

/// Result of running the pipeline once
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Done(ChannelReport),
    Unresolvable(String),
    Failed(String),
    /// Session got throttled; the job should be retried
    RateLimited { retry_after: Duration },
    /// Session was revoked; ban it and retry on another one
    SessionBanned,
}

/// Why a stage stopped the job
enum Abort {
    Session(RemoteError),
    Job(String),
}

impl From<StorageError> for Abort {
    fn from(e: StorageError) -> Self {
        Abort::Job(format!("storage: {}", e))
    }
}

impl From<RemoteError> for Abort {
    fn from(e: RemoteError) -> Self {
        if e.is_session_signal() {
            Abort::Session(e)
        } else {
            Abort::Job(e.to_string())
        }
    }
}

type StageResult<T> = Result<T, Abort>;

/// Tracks the current stage of one job for logging
struct StageCursor<'a> {
    address: &'a str,
    stage: ChannelStage,
}

impl<'a> StageCursor<'a> {
    fn new(address: &'a str) -> Self {
        Self {
            address,
            stage: ChannelStage::Resolve,
        }
    }

    fn advance(&mut self) {
        let next = self.stage.next();
        tracing::debug!("{}: {} -> {}", self.address, self.stage, next);
        self.stage = next;
    }

    fn jump(&mut self, stage: ChannelStage) {
        tracing::debug!("{}: {} -> {}", self.address, self.stage, stage);
        self.stage = stage;
    }
}

/// Runs the crawl stages for channel jobs against a shared store
pub struct ChannelPipeline {
    storage: Arc<Mutex<SqliteStorage>>,
    batch_size: u32,
}

impl ChannelPipeline {
    pub fn new(storage: Arc<Mutex<SqliteStorage>>, batch_size: u32) -> Self {
        Self {
            storage,
            batch_size: batch_size.max(1),
        }
    }

    fn store(&self) -> StageResult<MutexGuard<'_, SqliteStorage>> {
        self.storage
            .lock()
            .map_err(|_| Abort::Job("storage lock poisoned".to_string()))
    }

    /// Runs every stage for `job` on one session
    pub async fn run(&self, client: &dyn ProtocolClient, job: &ChannelJob) -> PipelineOutcome {
        let mut cursor = StageCursor::new(&job.address);

        let result = self.run_stages(client, job, &mut cursor).await;
        match result {
            Ok(Some(report)) => {
                cursor.jump(ChannelStage::Done);
                tracing::info!(
                    "{}: done ({} similar, {} related, {} new messages)",
                    job.address,
                    report.similar,
                    report.related,
                    report.messages_appended
                );
                PipelineOutcome::Done(report)
            }
            Ok(None) => {
                cursor.jump(ChannelStage::Unresolvable);
                PipelineOutcome::Unresolvable(format!("could not resolve {}", job.address))
            }
            Err(Abort::Session(RemoteError::RateLimited { retry_after })) => {
                tracing::warn!(
                    "{}: rate limited during {} (retry after {}s)",
                    job.address,
                    cursor.stage,
                    retry_after.as_secs()
                );
                PipelineOutcome::RateLimited { retry_after }
            }
            Err(Abort::Session(RemoteError::Banned)) => {
                tracing::warn!("{}: session banned during {}", job.address, cursor.stage);
                PipelineOutcome::SessionBanned
            }
            Err(Abort::Session(RemoteError::Rpc(e))) | Err(Abort::Job(e)) => {
                tracing::error!("{}: failed during {}: {}", job.address, cursor.stage, e);
                PipelineOutcome::Failed(e)
            }
        }
    }

    /// `Ok(None)` means the address is unresolvable
    async fn run_stages(
        &self,
        client: &dyn ProtocolClient,
        job: &ChannelJob,
        cursor: &mut StageCursor<'_>,
    ) -> StageResult<Option<ChannelReport>> {
        let address = match classify_address(&job.address) {
            Ok(address) => address,
            Err(e) => {
                tracing::warn!("{}: {}", job.address, e);
                return Ok(None);
            }
        };
        let key = address.canonical_link();

        let (record, entity) = match resolve(client, &address).await? {
            Resolution::Unresolved { reason } => {
                tracing::warn!("Could not get channel info for {}: {}", key, reason);
                return Ok(None);
            }
            Resolution::InviteTitle {
                title,
                participants_count,
            } => {
                // Nothing addressable behind a preview; store what the preview says
                let record = ChannelRecord {
                    name: Some(title),
                    subscribers: participants_count,
                    ..ChannelRecord::bare(&key)
                };
                cursor.jump(ChannelStage::Persist);
                self.persist(&record, &[], &[], job.category.as_deref(), None)?;
                return Ok(Some(ChannelReport {
                    address: key,
                    ..ChannelReport::default()
                }));
            }
            Resolution::InviteChat { entity } => (channel_record(&key, &entity, None), entity),
            Resolution::PublicChannel { entity, full } => (
                channel_record(&key, &entity, full.participants_count),
                entity,
            ),
        };
        cursor.advance();

        let similar = self.fetch_similar(client, &key, &entity).await?;
        cursor.advance();

        let (messages_appended, checkpoint) =
            self.fetch_messages(client, &record, &entity).await?;
        cursor.advance();

        let related_ids = self.extract_related(&key, entity.id)?;
        cursor.advance();

        let related = resolve_related(client, &related_ids).await?;
        cursor.advance();

        self.persist(
            &record,
            &similar,
            &related,
            job.category.as_deref(),
            checkpoint,
        )?;

        Ok(Some(ChannelReport {
            address: key,
            similar: similar.len(),
            related: related.len(),
            messages_appended,
            checkpoint,
        }))
    }

    async fn fetch_similar(
        &self,
        client: &dyn ProtocolClient,
        key: &str,
        entity: &Entity,
    ) -> StageResult<Vec<ChannelRecord>> {
        if !entity.is_addressable() {
            tracing::warn!("Channel entity missing access hash: {}", key);
            return Ok(Vec::new());
        }

        let chats = match client.fetch_recommendations(entity).await {
            Ok(chats) => chats,
            Err(e) if e.is_session_signal() => return Err(Abort::Session(e)),
            Err(e) => {
                tracing::warn!("Error retrieving similar channels for {}: {}", key, e);
                return Ok(Vec::new());
            }
        };

        let mut seen = HashSet::new();
        let similar: Vec<ChannelRecord> = chats
            .iter()
            .filter(|chat| chat.id != entity.id)
            .filter_map(|chat| {
                let handle = chat.username.as_deref()?;
                match ChannelAddress::from_handle(handle) {
                    Ok(address) => Some(channel_record(
                        &address.canonical_link(),
                        chat,
                        chat.participants_count,
                    )),
                    Err(e) => {
                        tracing::debug!("Skipping similar channel @{}: {}", handle, e);
                        None
                    }
                }
            })
            .filter(|record| seen.insert(record.address.clone()))
            .collect();

        if similar.is_empty() {
            tracing::warn!("Cannot get similar channels for channel: {}", key);
        }
        Ok(similar)
    }

    /// Paginates above the checkpoint; returns (rows appended, checkpoint after)
    async fn fetch_messages(
        &self,
        client: &dyn ProtocolClient,
        record: &ChannelRecord,
        entity: &Entity,
    ) -> StageResult<(usize, Option<i64>)> {
        let key = record.address.as_str();

        // The channel row must exist before messages can reference it
        let checkpoint = {
            let mut store = self.store()?;
            store.upsert_channel(record)?;
            store.get_latest_message_id(key)?
        };

        if !entity.is_addressable() {
            tracing::warn!("Skipping messages for {}: no access hash", key);
            return Ok((0, checkpoint));
        }

        let mut cursor = MessageCursor::from_checkpoint(checkpoint);
        let mut seen: HashSet<i64> = HashSet::new();
        let mut appended = 0;

        loop {
            let batch = client
                .paginate_messages(entity, cursor, self.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }

            let floor = cursor.floor();
            let fresh: Vec<&Message> = batch
                .iter()
                .filter(|m| m.id > floor && seen.insert(m.id))
                .collect();

            if !fresh.is_empty() {
                let rows = fresh
                    .iter()
                    .map(|m| {
                        serde_json::to_string(m).map(|payload| MessageRecord {
                            message_id: m.id,
                            payload,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| Abort::Job(format!("message encoding: {}", e)))?;

                appended += self.store()?.append_messages(key, &rows)?;
                tracing::trace!("{}: stored {} messages above {}", key, rows.len(), floor);
            }

            let max_id = batch.iter().map(|m| m.id).max().unwrap_or(floor);
            if batch.len() < self.batch_size as usize || !cursor.advance(max_id) {
                break;
            }
        }

        let checkpoint_after = self.store()?.get_latest_message_id(key)?;
        Ok((appended, checkpoint_after.max(checkpoint)))
    }

    /// Forward sources of stored messages not yet covered by related edges
    fn extract_related(&self, key: &str, own_id: i64) -> StageResult<Vec<i64>> {
        let store = self.store()?;
        let after = store.get_related_checkpoint(key)?.unwrap_or(0);
        let pending = store.messages_after(key, after)?;
        drop(store);

        let mut seen = HashSet::new();
        let ids = pending
            .iter()
            .filter_map(|row| serde_json::from_str::<Message>(&row.payload).ok())
            .filter_map(|m| m.forwarded_channel_id())
            .filter(|id| *id != own_id && seen.insert(*id))
            .collect();
        Ok(ids)
    }

    fn persist(
        &self,
        record: &ChannelRecord,
        similar: &[ChannelRecord],
        related: &[ChannelRecord],
        category: Option<&str>,
        checkpoint: Option<i64>,
    ) -> StageResult<()> {
        let mut store = self.store()?;
        store.upsert_channel(record)?;

        for channel in similar {
            store.upsert_channel(channel)?;
            store.add_similar_edge(&record.address, &channel.address)?;
        }

        for channel in related {
            store.upsert_channel(channel)?;
            store.add_related_edge(&record.address, &channel.address)?;
        }

        if let Some(category) = category {
            store.add_category_link(category, &record.address)?;
        }

        if let Some(checkpoint) = checkpoint {
            store.set_related_checkpoint(&record.address, checkpoint)?;
        }

        Ok(())
    }
}

/// Resolve stage
///
/// Non-session errors fold into `Unresolved`; rate limits and bans propagate.
pub async fn resolve(
    client: &dyn ProtocolClient,
    address: &ChannelAddress,
) -> Result<Resolution, RemoteError> {
    let attempt = match address {
        ChannelAddress::Invite { token } => {
            return match client.resolve_by_invite(token).await {
                Ok(InviteResult::Chat { chat }) => Ok(Resolution::InviteChat { entity: chat }),
                Ok(InviteResult::Title {
                    title,
                    participants_count,
                }) => Ok(Resolution::InviteTitle {
                    title,
                    participants_count,
                }),
                Err(e) if e.is_session_signal() => Err(e),
                Err(e) => Ok(Resolution::Unresolved {
                    reason: format!("invite check failed: {}", e),
                }),
            };
        }
        ChannelAddress::Public { handle } => client.resolve_by_handle(handle).await,
        ChannelAddress::Private { channel_id } => client.resolve_by_id(*channel_id).await,
    };

    let entity = match attempt {
        Ok(entity) => entity,
        Err(e) if e.is_session_signal() => return Err(e),
        Err(e) => {
            return Ok(Resolution::Unresolved {
                reason: e.to_string(),
            })
        }
    };

    match full_info(client, &entity).await? {
        Some((entity, full)) => Ok(Resolution::PublicChannel { entity, full }),
        None => Ok(Resolution::Unresolved {
            reason: "full info incomplete".to_string(),
        }),
    }
}

/// `Ok(None)` when the call failed locally or the response lacks a part
async fn full_info(
    client: &dyn ProtocolClient,
    entity: &Entity,
) -> Result<Option<(Entity, FullChat)>, RemoteError> {
    match client.fetch_full_info(entity).await {
        Ok(info) => Ok(info
            .complete()
            .map(|(chat, full)| (chat.clone(), full.clone()))),
        Err(e) if e.is_session_signal() => Err(e),
        Err(e) => {
            tracing::debug!("Full info for {} failed: {}", entity.id, e);
            Ok(None)
        }
    }
}

/// ResolveRelated stage; ids that do not resolve are dropped
async fn resolve_related(
    client: &dyn ProtocolClient,
    ids: &[i64],
) -> StageResult<Vec<ChannelRecord>> {
    let mut related = Vec::with_capacity(ids.len());

    for &id in ids {
        let entity = match client.resolve_by_id(id).await {
            Ok(entity) => entity,
            Err(e) if e.is_session_signal() => return Err(Abort::Session(e)),
            Err(e) => {
                tracing::debug!("Dropping related channel {}: {}", id, e);
                continue;
            }
        };

        let Some((entity, full)) = full_info(client, &entity).await? else {
            tracing::debug!("Dropping related channel {}: full info incomplete", id);
            continue;
        };

        let address = entity
            .username
            .as_deref()
            .and_then(|handle| ChannelAddress::from_handle(handle).ok())
            .unwrap_or(ChannelAddress::Private {
                channel_id: entity.id,
            });
        related.push(channel_record(
            &address.canonical_link(),
            &entity,
            full.participants_count,
        ));
    }

    Ok(related)
}

fn channel_record(address: &str, entity: &Entity, subscribers: Option<u64>) -> ChannelRecord {
    ChannelRecord {
        address: address.to_string(),
        channel_id: Some(entity.id),
        name: Some(entity.title.clone()),
        subscribers,
        verified: entity.verified,
        created_at: entity.date.map(|d| d.date_naive()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::scripted::{channel, forwarded, message, ScriptedConnector, ScriptedWorld};
    use crate::protocol::Connector;
    use crate::storage::EdgeKind;

    const MAIN: &str = "https://t.me/main";

    fn full(subscribers: u64) -> Option<FullChat> {
        Some(FullChat {
            participants_count: Some(subscribers),
            about: None,
        })
    }

    fn world() -> Arc<ScriptedWorld> {
        let world = Arc::new(ScriptedWorld::new());
        world.add_channel(channel(1, Some("Main"), "Main channel"), full(500));
        world.add_channel(channel(10, Some("source_ten"), "Source"), full(70));
        world.add_channel(channel(11, None, "Hidden source"), full(7));
        world.set_recommendations(
            1,
            vec![
                channel(1, Some("Main"), "Main channel"),
                channel(2, Some("Similar_One"), "Similar"),
                channel(3, None, "No handle"),
            ],
        );
        world.set_messages(
            1,
            vec![
                message(1),
                forwarded(2, 10),
                forwarded(3, 10),
                forwarded(4, 11),
                forwarded(5, 1),
                forwarded(6, 99),
            ],
        );
        world
    }

    fn pipeline(batch_size: u32) -> (ChannelPipeline, Arc<Mutex<SqliteStorage>>) {
        let storage = Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()));
        (ChannelPipeline::new(Arc::clone(&storage), batch_size), storage)
    }

    async fn session(world: &Arc<ScriptedWorld>, name: &str) -> Arc<dyn ProtocolClient> {
        ScriptedConnector::new(Arc::clone(world))
            .connect(name, None)
            .await
            .unwrap()
    }

    fn done(outcome: PipelineOutcome) -> ChannelReport {
        match outcome {
            PipelineOutcome::Done(report) => report,
            other => panic!("expected Done, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_crawl_persists_graph() {
        let world = world();
        let (pipeline, storage) = pipeline(100);
        let client = session(&world, "a").await;

        let job = ChannelJob::new("@Main", Some("news".to_string()));
        let report = done(pipeline.run(client.as_ref(), &job).await);
        assert_eq!(report.address, MAIN);
        assert_eq!(report.similar, 1);
        assert_eq!(report.related, 2);
        assert_eq!(report.messages_appended, 6);
        assert_eq!(report.checkpoint, Some(6));

        let store = storage.lock().unwrap();
        let main = store.get_channel(MAIN).unwrap().unwrap();
        assert_eq!(main.channel_id, Some(1));
        assert_eq!(main.subscribers, Some(500));

        let similar = store.list_edges(EdgeKind::Similar).unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].source, MAIN);
        assert_eq!(similar[0].target, "https://t.me/similar_one");

        let related: Vec<String> = store
            .list_edges(EdgeKind::Related)
            .unwrap()
            .into_iter()
            .map(|e| e.target)
            .collect();
        assert_eq!(related, vec!["https://t.me/source_ten", "https://t.me/c/11"]);

        assert_eq!(store.addresses_in_category("news").unwrap(), vec![MAIN]);
        assert_eq!(store.get_related_checkpoint(MAIN).unwrap(), Some(6));
        // Unknown forward source 99 is dropped, own id 1 is never resolved
        assert_eq!(world.call_count("resolve_by_id"), 3);
    }

    #[tokio::test]
    async fn test_rerun_without_new_messages_is_a_no_op() {
        let world = world();
        let (pipeline, storage) = pipeline(100);
        let client = session(&world, "a").await;
        let job = ChannelJob::new(MAIN, None);

        done(pipeline.run(client.as_ref(), &job).await);
        let resolves_before = world.call_count("resolve_by_id");

        let second = done(pipeline.run(client.as_ref(), &job).await);
        assert_eq!(second.messages_appended, 0);
        assert_eq!(second.checkpoint, Some(6));
        assert_eq!(world.call_count("resolve_by_id"), resolves_before);

        // The second run asked only for ids above the checkpoint
        let last_page = world
            .calls()
            .into_iter()
            .filter(|c| c.method == "paginate_messages")
            .last()
            .unwrap();
        assert_eq!(last_page.argument, "1>6");

        let store = storage.lock().unwrap();
        assert_eq!(store.count_messages(Some(MAIN)).unwrap(), 6);
        assert_eq!(store.count_edges(EdgeKind::Similar).unwrap(), 1);
        assert_eq!(store.count_edges(EdgeKind::Related).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_new_messages_are_fetched_incrementally() {
        let world = world();
        let (pipeline, storage) = pipeline(100);
        let client = session(&world, "a").await;
        let job = ChannelJob::new(MAIN, None);
        done(pipeline.run(client.as_ref(), &job).await);

        world.post_messages(1, vec![message(7), forwarded(8, 10)]);
        let report = done(pipeline.run(client.as_ref(), &job).await);
        assert_eq!(report.messages_appended, 2);
        assert_eq!(report.checkpoint, Some(8));
        // The only new forward points at an already linked channel
        assert_eq!(report.related, 1);
        assert_eq!(
            storage
                .lock()
                .unwrap()
                .count_edges(EdgeKind::Related)
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_pagination_stops_on_short_and_empty_batches() {
        let world = world();
        let (pipeline, _storage) = pipeline(2);
        let client = session(&world, "a").await;

        done(pipeline.run(client.as_ref(), &ChannelJob::new(MAIN, None)).await);
        // 2 + 2 + 2, then an empty page
        assert_eq!(world.call_count("paginate_messages"), 4);

        let (pipeline, _storage) = self::pipeline(4);
        let world = self::world();
        let client = session(&world, "a").await;
        done(pipeline.run(client.as_ref(), &ChannelJob::new(MAIN, None)).await);
        // 4, then a short page of 2
        assert_eq!(world.call_count("paginate_messages"), 2);
    }

    #[tokio::test]
    async fn test_invite_title_yields_minimal_record() {
        let world = Arc::new(ScriptedWorld::new());
        world.add_invite(
            "Secret",
            InviteResult::Title {
                title: "Secret club".to_string(),
                participants_count: None,
            },
        );
        let (pipeline, storage) = pipeline(100);
        let client = session(&world, "a").await;

        let job = ChannelJob::new("https://t.me/joinchat/Secret", Some("art".to_string()));
        let report = done(pipeline.run(client.as_ref(), &job).await);
        assert_eq!(report.address, "https://t.me/+Secret");
        assert_eq!(report.checkpoint, None);

        let store = storage.lock().unwrap();
        let record = store.get_channel("https://t.me/+Secret").unwrap().unwrap();
        assert_eq!(record.name.as_deref(), Some("Secret club"));
        assert_eq!(record.channel_id, None);
        assert_eq!(record.subscribers, None);
        assert_eq!(
            store.addresses_in_category("art").unwrap(),
            vec!["https://t.me/+Secret"]
        );
        assert_eq!(world.call_count("paginate_messages"), 0);
        assert_eq!(world.call_count("fetch_recommendations"), 0);
    }

    #[tokio::test]
    async fn test_invite_chat_has_no_subscriber_count() {
        let world = world();
        world.add_invite(
            "Chat",
            InviteResult::Chat {
                chat: channel(1, None, "Main channel"),
            },
        );
        let (pipeline, storage) = pipeline(100);
        let client = session(&world, "a").await;

        let report = done(
            pipeline
                .run(client.as_ref(), &ChannelJob::new("https://t.me/+Chat", None))
                .await,
        );
        assert_eq!(report.messages_appended, 6);

        let record = storage
            .lock()
            .unwrap()
            .get_channel("https://t.me/+Chat")
            .unwrap()
            .unwrap();
        assert_eq!(record.channel_id, Some(1));
        assert_eq!(record.subscribers, None);
    }

    #[tokio::test]
    async fn test_unresolvable_addresses() {
        let world = world();
        world.add_channel(channel(20, Some("nofull"), "No full info"), None);
        let (pipeline, storage) = pipeline(100);
        let client = session(&world, "a").await;

        for address in ["@missing", "@nofull", "https://example.com/x", "https://t.me/+Gone"] {
            let outcome = pipeline.run(client.as_ref(), &ChannelJob::new(address, None)).await;
            assert!(
                matches!(outcome, PipelineOutcome::Unresolvable(_)),
                "{} gave {:?}",
                address,
                outcome
            );
        }
        assert_eq!(storage.lock().unwrap().count_channels().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ban_mid_pagination_keeps_progress_and_resumes() {
        let world = world();
        // resolve, full info, recommendations and the first page succeed
        world.ban_after("a", 4);
        let (pipeline, storage) = pipeline(2);
        let job = ChannelJob::new(MAIN, None);

        let banned = session(&world, "a").await;
        assert_eq!(
            pipeline.run(banned.as_ref(), &job).await,
            PipelineOutcome::SessionBanned
        );
        {
            let store = storage.lock().unwrap();
            assert_eq!(store.get_latest_message_id(MAIN).unwrap(), Some(2));
            assert_eq!(store.count_edges(EdgeKind::Related).unwrap(), 0);
        }

        let fresh = session(&world, "b").await;
        let report = done(pipeline.run(fresh.as_ref(), &job).await);
        assert_eq!(report.messages_appended, 4);
        // Forwards from the page stored before the ban are still linked
        assert_eq!(report.related, 2);
        assert_eq!(
            storage
                .lock()
                .unwrap()
                .count_edges(EdgeKind::Related)
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_rate_limit_propagates() {
        let world = world();
        world.rate_limit_next("a", Duration::from_secs(9));
        let (pipeline, _storage) = pipeline(100);
        let client = session(&world, "a").await;

        assert_eq!(
            pipeline.run(client.as_ref(), &ChannelJob::new(MAIN, None)).await,
            PipelineOutcome::RateLimited {
                retry_after: Duration::from_secs(9)
            }
        );
    }
}
