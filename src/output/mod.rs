//! Output module for reporting on the channel database
//!
//! This module handles:
//! - Recording channel, edge and message statistics
//! - Printing the outcome breakdown of the latest crawl run

pub mod stats;

pub use stats::{load_statistics, print_statistics, ChannelStatistics};
