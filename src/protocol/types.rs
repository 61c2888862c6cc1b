//! Typed shapes of remote protocol responses

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors a remote call can end with
///
/// `RateLimited` and `Banned` are session-level signals the scheduler acts
/// on; `Rpc` is everything else (unknown handle, malformed response, transport
/// failure) and is handled locally by the calling stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("account banned")]
    Banned,

    #[error("{0}")]
    Rpc(String),
}

impl RemoteError {
    /// Returns true for the conditions that must reach the scheduler untouched
    pub fn is_session_signal(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Banned)
    }
}

/// Result type for remote calls
pub type RemoteResult<T> = Result<T, RemoteError>;

/// A channel (or chat) entity as returned by the protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Remote numeric id
    pub id: i64,

    /// Needed to address the channel in follow-up calls
    #[serde(default)]
    pub access_hash: Option<i64>,

    pub title: String,

    /// Public handle, if the channel has one
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub verified: bool,

    /// Creation date
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,

    /// Member count when the entity itself carries it (recommendation lists do)
    #[serde(default)]
    pub participants_count: Option<u64>,
}

impl Entity {
    /// Returns true if follow-up calls (recommendations, history) can address it
    pub fn is_addressable(&self) -> bool {
        self.access_hash.is_some()
    }
}

/// The full-info companion of a channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FullChat {
    #[serde(default)]
    pub participants_count: Option<u64>,

    #[serde(default)]
    pub about: Option<String>,
}

/// Response of a full-info request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FullInfo {
    /// Entities mentioned by the response; the requested channel comes first
    #[serde(default)]
    pub chats: Vec<Entity>,

    #[serde(default)]
    pub full_chat: Option<FullChat>,
}

impl FullInfo {
    /// The channel entity and its full-info companion, when both are present
    pub fn complete(&self) -> Option<(&Entity, &FullChat)> {
        Some((self.chats.first()?, self.full_chat.as_ref()?))
    }
}

/// Response of an invite check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InviteResult {
    /// The invite points at a chat the session can see
    Chat { chat: Entity },

    /// Only a preview title is available
    Title {
        title: String,
        #[serde(default)]
        participants_count: Option<u64>,
    },
}

/// Forward provenance of a message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForwardHeader {
    /// Originating channel, when the message was forwarded from one
    #[serde(default)]
    pub channel_id: Option<i64>,

    #[serde(default)]
    pub channel_post: Option<i64>,

    #[serde(default)]
    pub from_name: Option<String>,
}

/// A channel message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Monotonically assigned by the source; the pagination cursor
    pub id: i64,

    #[serde(default)]
    pub date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub views: Option<u64>,

    #[serde(default)]
    pub fwd_from: Option<ForwardHeader>,
}

impl Message {
    /// Channel this message was forwarded from, if any
    pub fn forwarded_channel_id(&self) -> Option<i64> {
        self.fwd_from.as_ref().and_then(|f| f.channel_id)
    }
}

/// Pagination window: messages with `id > max(min_id, offset_id)`, oldest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCursor {
    /// Lower bound that never moves during a run (the stored checkpoint)
    pub min_id: i64,

    /// Highest id already received in this run
    pub offset_id: i64,
}

impl MessageCursor {
    /// Starts a pagination run right above `checkpoint`
    pub fn from_checkpoint(checkpoint: Option<i64>) -> Self {
        let start = checkpoint.unwrap_or(0);
        Self {
            min_id: start,
            offset_id: start,
        }
    }

    /// Exclusive lower bound of the next page
    pub fn floor(&self) -> i64 {
        self.min_id.max(self.offset_id)
    }

    /// Moves the cursor past `max_id`; returns false if that would not advance it
    pub fn advance(&mut self, max_id: i64) -> bool {
        if max_id <= self.floor() {
            return false;
        }
        self.offset_id = max_id;
        true
    }
}
