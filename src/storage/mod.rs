//! Storage module for the dedup/cache store
//!
//! This module handles everything that outlives a single job:
//! - SQLite database initialization and schema management
//! - URL -> outcome cache entries that make reruns idempotent
//! - Job records for resumption and history
//! - Local path claims that keep distinct content from overwriting each other
//! - Atomic resource file writes and the content-addressed originals store

mod files;
mod schema;
mod sqlite;
mod traits;

pub use files::{content_hash, ResourceFiles};
pub use sqlite::SqliteStorage;
pub use traits::{CacheStore, StorageError, StorageResult};

use crate::classify::ResourceKind;
use crate::state::{FailReason, NodeState, SkipReason};

use std::path::Path;

/// Initializes or opens a cache store database
///
/// Parent directories are created as needed.
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    SqliteStorage::new(path)
}

/// A stored artifact of a successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResource {
    /// Path relative to the output root, `/`-separated
    pub local_path: String,
    /// Hex SHA-256 of the fetched bytes
    pub content_hash: String,
    pub content_type: Option<String>,
    pub kind: ResourceKind,
    pub byte_size: u64,
    /// URL the body was served from after redirects
    pub final_url: String,
}

/// Terminal outcome recorded for a normalized URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done(StoredResource),
    Skipped(SkipReason),
    Failed(FailReason),
}

impl Outcome {
    pub fn state(&self) -> NodeState {
        match self {
            Self::Done(_) => NodeState::Done,
            Self::Skipped(_) => NodeState::Skipped,
            Self::Failed(_) => NodeState::Failed,
        }
    }

    /// Machine-readable reason for non-successful outcomes
    pub fn reason_code(&self) -> Option<String> {
        match self {
            Self::Done(_) => None,
            Self::Skipped(reason) => Some(reason.as_code().to_string()),
            Self::Failed(reason) => Some(reason.as_code()),
        }
    }
}

/// Represents a cache entry in the database
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub normalized_url: String,
    pub outcome: Outcome,
    pub attempt_count: u32,
    /// Job that recorded this entry
    pub job_id: i64,
    pub last_updated: String,
}

impl CacheEntry {
    pub fn is_done(&self) -> bool {
        matches!(self.outcome, Outcome::Done(_))
    }

    pub fn resource(&self) -> Option<&StoredResource> {
        match &self.outcome {
            Outcome::Done(resource) => Some(resource),
            _ => None,
        }
    }
}

/// Result of claiming a local path for some content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClaim {
    /// The path was free and now belongs to this content
    Claimed,
    /// The path already holds identical content
    SameContent,
    /// The path holds different content
    Taken,
}

/// Represents a job run
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: JobStatus,
}

/// Per-bucket totals stored with a finished job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobTotals {
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub bytes_transferred: u64,
}

/// Status of a job run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Completed,
    Stopped,
    Failed,
}

impl JobStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "stopped" => Some(Self::Stopped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
