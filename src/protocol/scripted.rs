//! In-memory protocol implementation driven by fixtures
//!
//! A [`ScriptedWorld`] holds the channels, invites, recommendations and
//! message histories a fake remote side knows about, plus per-session faults
//! (refused connects, revoked authorization, bans after N calls, queued rate
//! limits). [`ScriptedConnector`] hands out [`ScriptedClient`]s bound to the
//! world, and every call is recorded so tests can assert on what was asked.

use crate::protocol::{
    Connector, Entity, ForwardHeader, FullChat, FullInfo, InviteResult, Message, MessageCursor,
    ProtocolClient, RemoteError, RemoteResult,
};
use crate::proxy::ProxyEndpoint;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One remote call as seen by the scripted side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub session: String,
    pub method: &'static str,
    pub argument: String,
}

#[derive(Debug, Default)]
struct SessionScript {
    refuse_connect: bool,
    unauthorized: bool,
    ban_after: Option<usize>,
    rate_limits: VecDeque<Duration>,
    served: usize,
}

#[derive(Debug, Default)]
struct WorldState {
    handles: HashMap<String, i64>,
    entities: HashMap<i64, Entity>,
    full: HashMap<i64, FullChat>,
    invites: HashMap<String, InviteResult>,
    recommendations: HashMap<i64, Vec<Entity>>,
    messages: HashMap<i64, Vec<Message>>,
    sessions: HashMap<String, SessionScript>,
    calls: Vec<RecordedCall>,
    connects: Vec<(String, Option<ProxyEndpoint>)>,
    disconnects: Vec<String>,
}

/// Shared fixture state behind every scripted client
#[derive(Debug, Default)]
pub struct ScriptedWorld {
    state: Mutex<WorldState>,
    latency: Option<Duration>,
}

impl ScriptedWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every remote call sleeps this long before answering
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            state: Mutex::default(),
            latency: Some(latency),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a channel; `full` is the full-info companion, if it has one
    pub fn add_channel(&self, entity: Entity, full: Option<FullChat>) {
        let mut state = self.lock();
        if let Some(handle) = &entity.username {
            state.handles.insert(handle.to_lowercase(), entity.id);
        }
        if let Some(full) = full {
            state.full.insert(entity.id, full);
        }
        state.entities.insert(entity.id, entity);
    }

    pub fn add_invite(&self, token: &str, result: InviteResult) {
        self.lock().invites.insert(token.to_string(), result);
    }

    pub fn set_recommendations(&self, channel_id: i64, similar: Vec<Entity>) {
        self.lock().recommendations.insert(channel_id, similar);
    }

    /// Replaces the message history of a channel
    pub fn set_messages(&self, channel_id: i64, mut messages: Vec<Message>) {
        messages.sort_by_key(|m| m.id);
        self.lock().messages.insert(channel_id, messages);
    }

    /// Appends newly posted messages to a channel's history
    pub fn post_messages(&self, channel_id: i64, messages: Vec<Message>) {
        let mut state = self.lock();
        let history = state.messages.entry(channel_id).or_default();
        history.extend(messages);
        history.sort_by_key(|m| m.id);
    }

    /// Connect attempts for `session` fail with an RPC error
    pub fn refuse_connect(&self, session: &str) {
        self.script(session, |s| s.refuse_connect = true);
    }

    /// `session` connects but reports itself signed out
    pub fn revoke_authorization(&self, session: &str) {
        self.script(session, |s| s.unauthorized = true);
    }

    /// After `calls` successful remote calls, `session` answers `Banned` forever
    pub fn ban_after(&self, session: &str, calls: usize) {
        self.script(session, |s| s.ban_after = Some(calls));
    }

    /// The next remote call on `session` answers `RateLimited`
    pub fn rate_limit_next(&self, session: &str, retry_after: Duration) {
        self.script(session, |s| s.rate_limits.push_back(retry_after));
    }

    fn script(&self, session: &str, edit: impl FnOnce(&mut SessionScript)) {
        let mut state = self.lock();
        edit(state.sessions.entry(session.to_string()).or_default());
    }

    /// All remote calls so far, in arrival order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.method == method).count()
    }

    /// Session names and proxies of every connect attempt
    pub fn connects(&self) -> Vec<(String, Option<ProxyEndpoint>)> {
        self.lock().connects.clone()
    }

    pub fn disconnects(&self) -> Vec<String> {
        self.lock().disconnects.clone()
    }

    fn gate(&self, session: &str, method: &'static str, argument: String) -> RemoteResult<()> {
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            session: session.to_string(),
            method,
            argument,
        });

        let script = state.sessions.entry(session.to_string()).or_default();
        if script.ban_after.is_some_and(|limit| script.served >= limit) {
            return Err(RemoteError::Banned);
        }
        if let Some(retry_after) = script.rate_limits.pop_front() {
            return Err(RemoteError::RateLimited { retry_after });
        }
        script.served += 1;
        Ok(())
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

/// Opens [`ScriptedClient`]s against a shared world
pub struct ScriptedConnector {
    world: Arc<ScriptedWorld>,
}

impl ScriptedConnector {
    pub fn new(world: Arc<ScriptedWorld>) -> Self {
        Self { world }
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(
        &self,
        session: &str,
        proxy: Option<&ProxyEndpoint>,
    ) -> RemoteResult<Arc<dyn ProtocolClient>> {
        let refused = {
            let mut state = self.world.lock();
            state
                .connects
                .push((session.to_string(), proxy.cloned()));
            state
                .sessions
                .get(session)
                .is_some_and(|s| s.refuse_connect)
        };
        if refused {
            return Err(RemoteError::Rpc(format!("{}: connection refused", session)));
        }

        Ok(Arc::new(ScriptedClient {
            world: Arc::clone(&self.world),
            session: session.to_string(),
        }))
    }
}

/// One scripted session
pub struct ScriptedClient {
    world: Arc<ScriptedWorld>,
    session: String,
}

impl ScriptedClient {
    fn entity(&self, id: i64) -> RemoteResult<Entity> {
        self.world
            .lock()
            .entities
            .get(&id)
            .cloned()
            .ok_or_else(|| RemoteError::Rpc("CHANNEL_INVALID".to_string()))
    }
}

#[async_trait]
impl ProtocolClient for ScriptedClient {
    async fn is_authorized(&self) -> RemoteResult<bool> {
        let state = self.world.lock();
        Ok(!state
            .sessions
            .get(&self.session)
            .is_some_and(|s| s.unauthorized))
    }

    async fn resolve_by_handle(&self, handle: &str) -> RemoteResult<Entity> {
        self.world.pause().await;
        self.world
            .gate(&self.session, "resolve_by_handle", handle.to_string())?;
        let id = self
            .world
            .lock()
            .handles
            .get(&handle.to_lowercase())
            .copied()
            .ok_or_else(|| RemoteError::Rpc("USERNAME_NOT_OCCUPIED".to_string()))?;
        self.entity(id)
    }

    async fn resolve_by_invite(&self, token: &str) -> RemoteResult<InviteResult> {
        self.world.pause().await;
        self.world
            .gate(&self.session, "resolve_by_invite", token.to_string())?;
        self.world
            .lock()
            .invites
            .get(token)
            .cloned()
            .ok_or_else(|| RemoteError::Rpc("INVITE_HASH_INVALID".to_string()))
    }

    async fn resolve_by_id(&self, channel_id: i64) -> RemoteResult<Entity> {
        self.world.pause().await;
        self.world
            .gate(&self.session, "resolve_by_id", channel_id.to_string())?;
        self.entity(channel_id)
    }

    async fn fetch_full_info(&self, entity: &Entity) -> RemoteResult<FullInfo> {
        self.world.pause().await;
        self.world
            .gate(&self.session, "fetch_full_info", entity.id.to_string())?;
        let chat = self.entity(entity.id)?;
        let full_chat = self.world.lock().full.get(&entity.id).cloned();
        Ok(FullInfo {
            chats: vec![chat],
            full_chat,
        })
    }

    async fn fetch_recommendations(&self, entity: &Entity) -> RemoteResult<Vec<Entity>> {
        self.world.pause().await;
        self.world
            .gate(&self.session, "fetch_recommendations", entity.id.to_string())?;
        Ok(self
            .world
            .lock()
            .recommendations
            .get(&entity.id)
            .cloned()
            .unwrap_or_default())
    }

    async fn paginate_messages(
        &self,
        entity: &Entity,
        cursor: MessageCursor,
        limit: u32,
    ) -> RemoteResult<Vec<Message>> {
        self.world.pause().await;
        self.world.gate(
            &self.session,
            "paginate_messages",
            format!("{}>{}", entity.id, cursor.floor()),
        )?;
        let floor = cursor.floor();
        Ok(self
            .world
            .lock()
            .messages
            .get(&entity.id)
            .map(|history| {
                history
                    .iter()
                    .filter(|m| m.id > floor)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn disconnect(&self) -> RemoteResult<()> {
        self.world.lock().disconnects.push(self.session.clone());
        Ok(())
    }
}

/// A channel entity with a derived access hash
pub fn channel(id: i64, handle: Option<&str>, title: &str) -> Entity {
    Entity {
        id,
        access_hash: Some(id.wrapping_mul(7919)),
        title: title.to_string(),
        username: handle.map(str::to_string),
        verified: false,
        date: None,
        participants_count: None,
    }
}

/// A plain text message
pub fn message(id: i64) -> Message {
    Message {
        id,
        date: None,
        text: Some(format!("post {}", id)),
        views: None,
        fwd_from: None,
    }
}

/// A message forwarded from `channel_id`
pub fn forwarded(id: i64, channel_id: i64) -> Message {
    Message {
        fwd_from: Some(ForwardHeader {
            channel_id: Some(channel_id),
            channel_post: None,
            from_name: None,
        }),
        ..message(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_channel() -> Arc<ScriptedWorld> {
        let world = Arc::new(ScriptedWorld::new());
        world.add_channel(
            channel(1, Some("RustLang"), "Rust"),
            Some(FullChat {
                participants_count: Some(1000),
                about: None,
            }),
        );
        world.set_messages(1, (1..=5).map(message).collect());
        world
    }

    #[tokio::test]
    async fn test_resolve_is_case_insensitive() {
        let world = world_with_channel();
        let client = ScriptedConnector::new(Arc::clone(&world))
            .connect("a", None)
            .await
            .unwrap();

        let entity = client.resolve_by_handle("rustlang").await.unwrap();
        assert_eq!(entity.id, 1);
        assert!(matches!(
            client.resolve_by_handle("missing").await,
            Err(RemoteError::Rpc(_))
        ));
        assert_eq!(world.call_count("resolve_by_handle"), 2);
    }

    #[tokio::test]
    async fn test_pagination_respects_floor_and_limit() {
        let world = world_with_channel();
        let client = ScriptedConnector::new(Arc::clone(&world))
            .connect("a", None)
            .await
            .unwrap();
        let entity = channel(1, None, "Rust");

        let page = client
            .paginate_messages(&entity, MessageCursor::from_checkpoint(Some(2)), 2)
            .await
            .unwrap();
        assert_eq!(page.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3, 4]);
    }

    #[tokio::test]
    async fn test_session_faults() {
        let world = world_with_channel();
        world.ban_after("a", 1);
        world.rate_limit_next("b", Duration::from_secs(2));
        world.refuse_connect("c");

        let connector = ScriptedConnector::new(Arc::clone(&world));
        let a = connector.connect("a", None).await.unwrap();
        assert!(a.resolve_by_handle("rustlang").await.is_ok());
        assert_eq!(a.resolve_by_handle("rustlang").await, Err(RemoteError::Banned));

        let b = connector.connect("b", None).await.unwrap();
        assert!(matches!(
            b.resolve_by_handle("rustlang").await,
            Err(RemoteError::RateLimited { .. })
        ));
        assert!(b.resolve_by_handle("rustlang").await.is_ok());

        assert!(connector.connect("c", None).await.is_err());
        assert_eq!(world.connects().len(), 3);
    }

    #[tokio::test]
    async fn test_revoked_authorization() {
        let world = world_with_channel();
        world.revoke_authorization("a");
        let client = ScriptedConnector::new(world).connect("a", None).await.unwrap();
        assert!(!client.is_authorized().await.unwrap());
    }
}
