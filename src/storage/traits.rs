//! Storage traits and error types
//!
//! This module defines the trait interface for cache store backends and
//! associated error types.

use crate::state::NodeState;
use crate::storage::{CacheEntry, JobRecord, JobStatus, JobTotals, Outcome, PathClaim};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Job not found: {0}")]
    JobNotFound(i64),

    #[error("{0} was already stored by job {1}")]
    DuplicateWrite(String, i64),

    #[error("Corrupt cache entry for {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for cache store backend implementations
///
/// The cache store maps normalized URLs to their outcome and persists across
/// jobs. Implementations are used behind a mutex, so methods take `&mut self`
/// where they write.
pub trait CacheStore {
    // ===== Job Management =====

    /// Creates a new job record in the Running state
    ///
    /// # Returns
    ///
    /// The ID of the newly created job
    fn create_job(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a job by ID
    fn get_job(&self, job_id: i64) -> StorageResult<JobRecord>;

    /// Gets the most recent job
    fn get_latest_job(&self) -> StorageResult<Option<JobRecord>>;

    /// Marks a job finished with its final status and totals
    fn complete_job(
        &mut self,
        job_id: i64,
        status: JobStatus,
        totals: &JobTotals,
    ) -> StorageResult<()>;

    // ===== Cache Entries =====

    /// Looks up the recorded outcome for a normalized URL
    fn lookup(&self, normalized_url: &str) -> StorageResult<Option<CacheEntry>>;

    /// Records the outcome for a normalized URL
    ///
    /// A second Done for the same URL within one job is rejected with
    /// [`StorageError::DuplicateWrite`]. A Done entry from an earlier job is
    /// superseded only by a new Done; non-successful outcomes never replace it.
    fn record(
        &mut self,
        job_id: i64,
        normalized_url: &str,
        outcome: &Outcome,
        attempt_count: u32,
    ) -> StorageResult<()>;

    /// Removes the entry for a URL so the next job fetches it again
    ///
    /// # Returns
    ///
    /// True if an entry was removed
    fn invalidate(&mut self, normalized_url: &str) -> StorageResult<bool>;

    /// Returns every Done entry
    fn done_entries(&self) -> StorageResult<Vec<CacheEntry>>;

    // ===== Local Paths =====

    /// Claims a local path for content with the given hash
    fn claim_path(&mut self, local_path: &str, content_hash: &str) -> StorageResult<PathClaim>;

    // ===== Statistics =====

    /// Counts entries per state
    fn count_by_state(&self) -> StorageResult<HashMap<NodeState, u64>>;

    /// Total bytes of all Done entries
    fn total_bytes(&self) -> StorageResult<u64>;

    /// Number of recorded jobs
    fn job_count(&self) -> StorageResult<u64>;

    /// Removes all entries, claims and job history
    fn clear(&mut self) -> StorageResult<()>;
}
