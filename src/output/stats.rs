//! Statistics from the cache store
//!
//! This module provides functionality for extracting and displaying
//! cache statistics, used by `--stats`.

use crate::state::NodeState;
use crate::storage::{CacheStore, JobRecord};
use crate::MirrorError;
use std::collections::HashMap;

/// Cache store statistics summary
#[derive(Debug, Clone)]
pub struct CacheStatistics {
    /// Total number of cache entries
    pub total_entries: u64,

    /// Count of entries by terminal state
    pub entries_by_state: HashMap<NodeState, u64>,

    /// Bytes of all stored resources
    pub stored_bytes: u64,

    /// Number of jobs recorded
    pub job_count: u64,

    pub latest_job: Option<JobRecord>,
}

impl CacheStatistics {
    pub fn count(&self, state: NodeState) -> u64 {
        self.entries_by_state.get(&state).copied().unwrap_or(0)
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The cache store to query
///
/// # Returns
///
/// * `Ok(CacheStatistics)` - Successfully loaded statistics
/// * `Err(MirrorError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn CacheStore) -> Result<CacheStatistics, MirrorError> {
    let entries_by_state = storage.count_by_state()?;
    let total_entries = entries_by_state.values().sum();

    Ok(CacheStatistics {
        total_entries,
        entries_by_state,
        stored_bytes: storage.total_bytes()?,
        job_count: storage.job_count()?,
        latest_job: storage.get_latest_job()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CacheStatistics) {
    println!("=== Cache Statistics ===\n");

    println!("Overview:");
    println!("  Cache entries: {}", stats.total_entries);
    println!("  Stored bytes: {}", stats.stored_bytes);
    println!("  Jobs recorded: {}", stats.job_count);
    println!();

    println!("Entries by State:");
    for state in NodeState::terminal_states() {
        let count = stats.count(state);
        let percentage = if stats.total_entries > 0 {
            (count as f64 / stats.total_entries as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    if let Some(job) = &stats.latest_job {
        println!("Latest Job:");
        println!("  ID: {}", job.id);
        println!("  Started: {}", job.started_at);
        if let Some(finished) = &job.finished_at {
            println!("  Finished: {}", finished);
        }
        println!("  Status: {}", job.status.to_db_string());
    }
}
