//! Remote messaging-protocol interface
//!
//! The wire protocol itself lives outside this crate. What the crawler needs
//! is a small set of typed remote calls, each of which ends either with a
//! value or with one of the distinguishable [`RemoteError`] conditions:
//!
//! - [`ProtocolClient`]: one authenticated connection (a session)
//! - [`Connector`]: opens a client for a session name through an optional proxy
//! - [`gateway`]: HTTP implementation talking to a protocol gateway process
//! - `scripted`: in-memory implementation driven by fixtures (tests and the
//!   `test-utils` feature)

pub mod gateway;
#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;
mod types;

pub use gateway::{DeviceProfile, GatewayConnector};
pub use types::{
    Entity, ForwardHeader, FullChat, FullInfo, InviteResult, Message, MessageCursor, RemoteError,
    RemoteResult,
};

use crate::proxy::ProxyEndpoint;
use async_trait::async_trait;
use std::sync::Arc;

/// Typed remote calls available on one session
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Whether the session's credential is still signed in
    async fn is_authorized(&self) -> RemoteResult<bool>;

    /// Resolves a public handle (without `@`) to a channel entity
    async fn resolve_by_handle(&self, handle: &str) -> RemoteResult<Entity>;

    /// Checks an invite token
    async fn resolve_by_invite(&self, token: &str) -> RemoteResult<InviteResult>;

    /// Resolves a numeric channel id the session has seen (e.g. via a forward)
    async fn resolve_by_id(&self, channel_id: i64) -> RemoteResult<Entity>;

    /// Fetches the full-info companion of a channel
    async fn fetch_full_info(&self, entity: &Entity) -> RemoteResult<FullInfo>;

    /// Fetches the channels the remote side recommends for this one
    async fn fetch_recommendations(&self, entity: &Entity) -> RemoteResult<Vec<Entity>>;

    /// Fetches up to `limit` messages above `cursor.floor()`, oldest first
    async fn paginate_messages(
        &self,
        entity: &Entity,
        cursor: MessageCursor,
        limit: u32,
    ) -> RemoteResult<Vec<Message>>;

    async fn disconnect(&self) -> RemoteResult<()>;
}

/// Opens protocol connections for session slots
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        session: &str,
        proxy: Option<&ProxyEndpoint>,
    ) -> RemoteResult<Arc<dyn ProtocolClient>>;
}
