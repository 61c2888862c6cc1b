use crate::{ConfigError, ConfigResult};
use serde::Serialize;
use std::fmt;

/// An outbound HTTP proxy a session is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ProxyEndpoint {
    pub addr: String,
    pub port: u16,
}

impl ProxyEndpoint {
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
        }
    }

    /// Parses a `host:port` entry
    ///
    /// # Examples
    ///
    /// ```
    /// use channel_graph::proxy::ProxyEndpoint;
    ///
    /// let proxy = ProxyEndpoint::parse("10.0.0.1:8080").unwrap();
    /// assert_eq!(proxy.port, 8080);
    /// assert!(ProxyEndpoint::parse("10.0.0.1").is_err());
    /// ```
    pub fn parse(entry: &str) -> ConfigResult<Self> {
        let entry = entry.trim();
        let (addr, port) = entry
            .rsplit_once(':')
            .ok_or_else(|| ConfigError::InvalidProxy(format!("'{}' is not host:port", entry)))?;

        if addr.is_empty() {
            return Err(ConfigError::InvalidProxy(format!(
                "'{}' has an empty host",
                entry
            )));
        }

        let port = port
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or_else(|| ConfigError::InvalidProxy(format!("'{}' has an invalid port", entry)))?;

        Ok(Self::new(addr, port))
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}
