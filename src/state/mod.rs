//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `SessionState`: Lifecycle of a session slot (idle, busy, banned)
//! - `ChannelStage`: Stage of a channel job inside the crawl pipeline

mod channel_stage;
mod session_state;

// Re-export main types
pub use channel_stage::ChannelStage;
pub use session_state::SessionState;
