//! Session management
//!
//! # Components
//!
//! - `SessionPool`: exclusive acquire/release over authenticated sessions
//! - `SessionLease`: a checked-out session
//! - `discover_sessions`: finds `*.session` credential files

mod pool;

pub use pool::{discover_sessions, PoolSettings, SessionLease, SessionPool, SlotSnapshot};
