//! Output module for progress events, job summaries and reports
//!
//! This module handles:
//! - Streaming progress events to an external consumer
//! - The final job summary and its markdown report
//! - Cache store statistics

mod events;
pub mod stats;
mod summary;

pub use events::{Event, EventReporter, EventStream, ResourceInfo};
pub use stats::{load_statistics, print_statistics, CacheStatistics};
pub use summary::{format_markdown_report, write_markdown_report, JobSummary, NodeIssue};
