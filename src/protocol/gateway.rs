//! HTTP client for the protocol gateway
//!
//! The gateway is a sidecar process that owns the wire protocol (handshake,
//! encryption, framing) and the session credential files. It exposes every
//! remote call as a JSON endpoint under `/sessions/{name}/...`:
//!
//! | Endpoint | Purpose |
//! |----------|---------|
//! | `POST connect` | Open the session, bound to the given proxy |
//! | `GET authorized` | `{"authorized": bool}` |
//! | `POST call/{method}` | Typed remote call, JSON args in, JSON result out |
//! | `POST disconnect` | Close the session |
//!
//! # Error Mapping
//!
//! | Response | RemoteError |
//! |----------|-------------|
//! | HTTP 420 / 429, or `FLOOD_WAIT*` | `RateLimited` (from `retry_after` or `Retry-After`) |
//! | `*_BANNED`, `USER_DEACTIVATED*`, `AUTH_KEY_UNREGISTERED`, ... | `Banned` |
//! | Anything else non-2xx, transport failures, undecodable bodies | `Rpc` |

use crate::config::GatewayConfig;
use crate::protocol::{
    Connector, Entity, FullInfo, InviteResult, Message, MessageCursor, ProtocolClient,
    RemoteError, RemoteResult,
};
use crate::proxy::ProxyEndpoint;
use crate::GraphError;
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Error codes that mean the account behind the session is gone for good,
/// on top of every `*_BANNED` and `USER_DEACTIVATED*` code
const BAN_CODES: &[&str] = &[
    "AUTH_KEY_DUPLICATED",
    "AUTH_KEY_UNREGISTERED",
    "SESSION_REVOKED",
];

fn is_ban_code(code: &str) -> bool {
    BAN_CODES.contains(&code)
        || code.ends_with("_BANNED")
        || code.starts_with("USER_DEACTIVATED")
}

/// Client identity presented when a session connects
#[derive(Debug, Clone, Serialize)]
pub struct DeviceProfile {
    pub api_id: i64,
    pub api_hash: String,
    pub device_model: String,
    pub system_version: String,
    pub app_version: String,
    pub lang_code: String,
    pub system_lang_code: String,
}

impl From<&GatewayConfig> for DeviceProfile {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
            device_model: config.device_model.clone(),
            system_version: config.system_version.clone(),
            app_version: config.app_version.clone(),
            lang_code: config.lang_code.clone(),
            system_lang_code: config.lang_code.clone(),
        }
    }
}

#[derive(Serialize)]
struct ProxySpec<'a> {
    proxy_type: &'static str,
    addr: &'a str,
    port: u16,
    rdns: bool,
}

#[derive(Serialize)]
struct ConnectRequest<'a> {
    #[serde(flatten)]
    profile: &'a DeviceProfile,
    proxy: Option<ProxySpec<'a>>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    retry_after: Option<u64>,
}

#[derive(Deserialize)]
struct AuthorizedBody {
    authorized: bool,
}

#[derive(Deserialize)]
struct ChatsBody {
    #[serde(default)]
    chats: Vec<Entity>,
}

#[derive(Deserialize)]
struct MessagesBody {
    #[serde(default)]
    messages: Vec<Message>,
}

/// Opens gateway-backed sessions
pub struct GatewayConnector {
    http: Client,
    base_url: Url,
    profile: DeviceProfile,
}

impl GatewayConnector {
    /// Creates a connector for the configured gateway
    ///
    /// # Returns
    ///
    /// * `Ok(GatewayConnector)` - Ready to open sessions
    /// * `Err(GraphError)` - Invalid base URL or HTTP client setup failure
    pub fn new(config: &GatewayConfig) -> Result<Self, GraphError> {
        let base_url = Url::parse(&config.base_url)?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            http,
            base_url,
            profile: DeviceProfile::from(config),
        })
    }
}

#[async_trait]
impl Connector for GatewayConnector {
    async fn connect(
        &self,
        session: &str,
        proxy: Option<&ProxyEndpoint>,
    ) -> RemoteResult<Arc<dyn ProtocolClient>> {
        let client = GatewayClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            session: session.to_string(),
        };

        let request = ConnectRequest {
            profile: &self.profile,
            proxy: proxy.map(|p| ProxySpec {
                proxy_type: "http",
                addr: &p.addr,
                port: p.port,
                rdns: true,
            }),
        };

        let url = client.endpoint(&["connect"])?;
        let response = self
            .http
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        decode::<serde_json::Value>(response).await?;

        Ok(Arc::new(client))
    }
}

/// One gateway session
struct GatewayClient {
    http: Client,
    base_url: Url,
    session: String,
}

impl GatewayClient {
    fn endpoint(&self, tail: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Rpc(format!("gateway url {} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .push("sessions")
            .push(&self.session)
            .extend(tail);
        Ok(url)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        args: serde_json::Value,
    ) -> RemoteResult<T> {
        let url = self.endpoint(&["call", method])?;
        tracing::trace!("session {} -> {}", self.session, method);
        let response = self
            .http
            .post(url)
            .json(&args)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }
}

fn input_channel(entity: &Entity) -> RemoteResult<serde_json::Value> {
    let access_hash = entity.access_hash.ok_or_else(|| {
        RemoteError::Rpc(format!("channel {} has no access hash", entity.id))
    })?;
    Ok(json!({ "channel_id": entity.id, "access_hash": access_hash }))
}

#[async_trait]
impl ProtocolClient for GatewayClient {
    async fn is_authorized(&self) -> RemoteResult<bool> {
        let url = self.endpoint(&["authorized"])?;
        let response = self.http.get(url).send().await.map_err(transport_error)?;
        let body: AuthorizedBody = decode(response).await?;
        Ok(body.authorized)
    }

    async fn resolve_by_handle(&self, handle: &str) -> RemoteResult<Entity> {
        self.call("resolve_username", json!({ "username": handle }))
            .await
    }

    async fn resolve_by_invite(&self, token: &str) -> RemoteResult<InviteResult> {
        self.call("check_chat_invite", json!({ "hash": token })).await
    }

    async fn resolve_by_id(&self, channel_id: i64) -> RemoteResult<Entity> {
        self.call("get_channel", json!({ "channel_id": channel_id }))
            .await
    }

    async fn fetch_full_info(&self, entity: &Entity) -> RemoteResult<FullInfo> {
        self.call("get_full_channel", json!({ "channel": input_channel(entity)? }))
            .await
    }

    async fn fetch_recommendations(&self, entity: &Entity) -> RemoteResult<Vec<Entity>> {
        let body: ChatsBody = self
            .call(
                "get_channel_recommendations",
                json!({ "channel": input_channel(entity)? }),
            )
            .await?;
        Ok(body.chats)
    }

    async fn paginate_messages(
        &self,
        entity: &Entity,
        cursor: MessageCursor,
        limit: u32,
    ) -> RemoteResult<Vec<Message>> {
        let body: MessagesBody = self
            .call(
                "get_messages",
                json!({
                    "channel": input_channel(entity)?,
                    "min_id": cursor.min_id,
                    "offset_id": cursor.offset_id,
                    "limit": limit,
                    "reverse": true,
                }),
            )
            .await?;
        Ok(body.messages)
    }

    async fn disconnect(&self) -> RemoteResult<()> {
        let url = self.endpoint(&["disconnect"])?;
        let response = self.http.post(url).send().await.map_err(transport_error)?;
        decode::<serde_json::Value>(response).await.map(|_| ())
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    RemoteError::Rpc(format!("gateway unreachable: {}", e))
}

async fn decode<T: DeserializeOwned>(response: Response) -> RemoteResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Rpc(format!("malformed gateway response: {}", e)));
    }

    let header_retry = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.json::<ErrorBody>().await.unwrap_or_default();

    Err(classify_failure(status.as_u16(), &body, header_retry))
}

fn classify_failure(status: u16, body: &ErrorBody, header_retry: Option<u64>) -> RemoteError {
    let code = body.error.as_deref().unwrap_or("");

    if status == 420 || status == 429 || code.starts_with("FLOOD_WAIT") {
        let seconds = body.retry_after.or(header_retry).unwrap_or(0);
        return RemoteError::RateLimited {
            retry_after: Duration::from_secs(seconds),
        };
    }

    if is_ban_code(code) {
        return RemoteError::Banned;
    }

    if code.is_empty() {
        RemoteError::Rpc(format!("gateway returned HTTP {}", status))
    } else {
        RemoteError::Rpc(format!("gateway returned HTTP {}: {}", status, code))
    }
}
