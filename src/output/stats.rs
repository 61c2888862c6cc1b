//! Statistics generation from the channel database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::storage::{CrawlOutcome, EdgeKind, RunRecord, Storage};
use crate::GraphError;
use std::collections::HashMap;

/// Channel database summary
#[derive(Debug, Clone)]
pub struct ChannelStatistics {
    /// Total number of stored channels
    pub total_channels: u64,

    /// Channels whose numeric id is known
    pub resolved_channels: u64,

    pub total_messages: u64,
    pub similar_edges: u64,
    pub related_edges: u64,

    /// Discovered addresses per category, in category order
    pub categories: Vec<(String, usize)>,

    /// Most recent crawl run, if any
    pub latest_run: Option<RunRecord>,

    /// Outcome counts of the most recent run
    pub outcomes: HashMap<CrawlOutcome, u64>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(ChannelStatistics)` - Successfully loaded statistics
/// * `Err(GraphError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<ChannelStatistics, GraphError> {
    let channels = storage.list_channels()?;
    let resolved_channels = channels.iter().filter(|c| c.channel_id.is_some()).count() as u64;

    let mut categories = Vec::new();
    for name in storage.list_categories()? {
        let count = storage.addresses_in_category(&name)?.len();
        categories.push((name, count));
    }

    let latest_run = storage.get_latest_run()?;
    let mut outcomes = HashMap::new();
    if let Some(run) = &latest_run {
        for outcome in storage.get_outcomes(run.id)?.into_values() {
            *outcomes.entry(outcome).or_insert(0) += 1;
        }
    }

    Ok(ChannelStatistics {
        total_channels: channels.len() as u64,
        resolved_channels,
        total_messages: storage.count_messages(None)?,
        similar_edges: storage.count_edges(EdgeKind::Similar)?,
        related_edges: storage.count_edges(EdgeKind::Related)?,
        categories,
        latest_run,
        outcomes,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &ChannelStatistics) {
    println!("=== Channel Graph Statistics ===\n");

    println!("Overview:");
    println!(
        "  Channels: {} ({} with numeric id)",
        stats.total_channels, stats.resolved_channels
    );
    println!("  Messages stored: {}", stats.total_messages);
    println!("  Similar edges: {}", stats.similar_edges);
    println!("  Related edges: {}", stats.related_edges);
    println!();

    if !stats.categories.is_empty() {
        println!("Categories ({}):", stats.categories.len());
        for (name, count) in &stats.categories {
            println!("  - {}: {} addresses", name, count);
        }
        println!();
    }

    let Some(run) = &stats.latest_run else {
        println!("No crawl runs recorded");
        return;
    };

    println!("Latest Run:");
    println!("  Id: {}", run.id);
    println!("  Status: {}", run.status.to_db_string());
    println!("  Started: {}", run.started_at);
    if let Some(finished) = &run.finished_at {
        println!("  Finished: {}", finished);
    }

    let total: u64 = stats.outcomes.values().sum();
    let mut outcome_counts: Vec<_> = stats.outcomes.iter().collect();
    outcome_counts.sort_by(|a, b| b.1.cmp(a.1));
    for (outcome, count) in outcome_counts {
        let percentage = if total > 0 {
            (*count as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        println!(
            "  {}: {} ({:.1}%)",
            outcome.to_db_string(),
            count,
            percentage
        );
    }
}
