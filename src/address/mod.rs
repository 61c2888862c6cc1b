//! Channel address handling
//!
//! Discovery hands us channel addresses in whatever shape the source page used:
//! full links, bare `t.me/...` paths, `@handles`, invite links in both the old
//! `/joinchat/<token>` and the newer `/+<token>` form. This module classifies
//! them and produces the canonical link used as the channel key.

mod normalize;

pub use normalize::{canonical_handle, is_valid_handle};

use crate::{AddressError, AddressResult};
use std::fmt;
use url::Url;

/// Hosts that serve channel links
const CHANNEL_HOSTS: &[&str] = &["t.me", "telegram.me", "telegram.dog"];

/// Base of every canonical link
pub const LINK_BASE: &str = "https://t.me";

/// A classified channel address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelAddress {
    /// Public channel reachable by handle
    Public { handle: String },

    /// Private invite link; only an invite check is possible
    Invite { token: String },

    /// Internal `t.me/c/<id>` link, resolvable by numeric id only
    Private { channel_id: i64 },
}

impl ChannelAddress {
    /// Canonical link, used as the stable channel key
    pub fn canonical_link(&self) -> String {
        match self {
            Self::Public { handle } => format!("{}/{}", LINK_BASE, handle),
            Self::Invite { token } => format!("{}/+{}", LINK_BASE, token),
            Self::Private { channel_id } => format!("{}/c/{}", LINK_BASE, channel_id),
        }
    }

    /// Builds the address for a channel known by handle
    pub fn from_handle(handle: &str) -> AddressResult<Self> {
        Ok(Self::Public {
            handle: canonical_handle(handle)?,
        })
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_link())
    }
}

/// Classifies a raw channel address
///
/// # Examples
///
/// ```
/// use channel_graph::address::{classify_address, ChannelAddress};
///
/// let addr = classify_address("https://t.me/joinchat/AbCdEf").unwrap();
/// assert_eq!(addr, ChannelAddress::Invite { token: "AbCdEf".to_string() });
///
/// let addr = classify_address("@Durov").unwrap();
/// assert_eq!(addr.canonical_link(), "https://t.me/durov");
/// ```
pub fn classify_address(raw: &str) -> AddressResult<ChannelAddress> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AddressError::Empty);
    }

    if let Some(handle) = raw.strip_prefix('@') {
        return ChannelAddress::from_handle(handle);
    }

    if raw.contains("://") {
        let url = Url::parse(raw).map_err(|e| AddressError::Malformed(e.to_string()))?;
        return classify_url(&url);
    }

    // Host without scheme, e.g. "t.me/somechannel"
    let lower = raw.to_ascii_lowercase();
    if CHANNEL_HOSTS
        .iter()
        .any(|host| lower.starts_with(&format!("{}/", host)) || lower.starts_with(&format!("www.{}/", host)))
    {
        let url = Url::parse(&format!("https://{}", raw))
            .map_err(|e| AddressError::Malformed(e.to_string()))?;
        return classify_url(&url);
    }

    if let Some(token) = raw.strip_prefix('+') {
        return invite(token);
    }

    ChannelAddress::from_handle(raw)
}

fn classify_url(url: &Url) -> AddressResult<ChannelAddress> {
    let host = url
        .host_str()
        .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
        .ok_or_else(|| AddressError::Malformed(url.to_string()))?;

    if !CHANNEL_HOSTS.contains(&host.as_str()) {
        return Err(AddressError::UnsupportedHost(host));
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    match segments.as_slice() {
        ["joinchat", token, ..] => invite(token),
        ["c", id, ..] => id
            .parse::<i64>()
            .map(|channel_id| ChannelAddress::Private { channel_id })
            .map_err(|_| AddressError::Malformed(url.to_string())),
        ["s", handle, ..] => ChannelAddress::from_handle(handle),
        [first, ..] if first.starts_with('+') => invite(&first[1..]),
        [handle, ..] => ChannelAddress::from_handle(handle),
        [] => Err(AddressError::Malformed(url.to_string())),
    }
}

fn invite(token: &str) -> AddressResult<ChannelAddress> {
    let token = token.trim();
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(AddressError::Malformed(format!("invalid invite token '{}'", token)));
    }
    Ok(ChannelAddress::Invite {
        token: token.to_string(),
    })
}
