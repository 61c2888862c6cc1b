//! Outbound proxy endpoints for sessions
//!
//! # Components
//!
//! - `ProxyEndpoint`: a `host:port` pair
//! - `ProxyPool`: static entries merged with a fetched JSON list

mod endpoint;
mod pool;

pub use endpoint::ProxyEndpoint;
pub use pool::ProxyPool;
