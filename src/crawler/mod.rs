//! Crawler module for channel graph collection
//!
//! This module contains the core crawling logic, including:
//! - The per-channel pipeline (resolve, similar, messages, related, persist)
//! - The job scheduler with its worker pool, retries and ban handling
//! - The discovery source that supplies addresses per category
//! - Overall run coordination

mod coordinator;
mod pipeline;
mod scheduler;
mod source;

pub use coordinator::{collect_jobs, resolve_categories, run_crawl, Coordinator};
pub use pipeline::{
    resolve, ChannelJob, ChannelPipeline, ChannelReport, PipelineOutcome, Resolution,
};
pub use scheduler::{JobQueue, RunSummary, Scheduler};
pub use source::{import_discovery, import_document, ChannelSource, ImportReport};
