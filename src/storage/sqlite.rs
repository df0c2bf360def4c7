//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the CacheStore trait.

use crate::classify::ResourceKind;
use crate::state::{FailReason, NodeState, SkipReason};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CacheStore, StorageError, StorageResult};
use crate::storage::{
    CacheEntry, JobRecord, JobStatus, JobTotals, Outcome, PathClaim, StoredResource,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const ENTRY_COLUMNS: &str = "normalized_url, state, local_path, reason, content_hash, \
     content_type, kind, byte_size, final_url, attempt_count, job_id, last_updated";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn row_to_job(row: &Row<'_>) -> rusqlite::Result<JobRecord> {
        Ok(JobRecord {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            config_hash: row.get(3)?,
            status: JobStatus::from_db_string(&row.get::<_, String>(4)?)
                .unwrap_or(JobStatus::Failed),
        })
    }

    fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<Option<CacheEntry>> {
        let normalized_url: String = row.get(0)?;
        let state: String = row.get(1)?;
        let reason: Option<String> = row.get(3)?;

        let outcome = match NodeState::from_db_string(&state) {
            Some(NodeState::Done) => {
                let local_path: Option<String> = row.get(2)?;
                let content_hash: Option<String> = row.get(4)?;
                let kind: Option<String> = row.get(6)?;
                let byte_size: Option<i64> = row.get(7)?;
                let final_url: Option<String> = row.get(8)?;
                match (local_path, content_hash) {
                    (Some(local_path), Some(content_hash)) => Outcome::Done(StoredResource {
                        local_path,
                        content_hash,
                        content_type: row.get(5)?,
                        kind: kind
                            .as_deref()
                            .map(ResourceKind::from_db_string)
                            .unwrap_or(ResourceKind::Other),
                        byte_size: byte_size.unwrap_or(0).max(0) as u64,
                        final_url: final_url.unwrap_or_else(|| normalized_url.clone()),
                    }),
                    _ => return Ok(None),
                }
            }
            Some(NodeState::Skipped) => {
                match reason.as_deref().and_then(SkipReason::from_code) {
                    Some(reason) => Outcome::Skipped(reason),
                    None => return Ok(None),
                }
            }
            Some(NodeState::Failed) => {
                match reason.as_deref().and_then(FailReason::from_code) {
                    Some(reason) => Outcome::Failed(reason),
                    None => return Ok(None),
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(CacheEntry {
            normalized_url,
            outcome,
            attempt_count: row.get(9)?,
            job_id: row.get(10)?,
            last_updated: row.get(11)?,
        }))
    }
}

impl CacheStore for SqliteStorage {
    // ===== Job Management =====

    fn create_job(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO jobs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, JobStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_job(&self, job_id: i64) -> StorageResult<JobRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM jobs WHERE id = ?1",
                params![job_id],
                Self::row_to_job,
            )
            .optional()?
            .ok_or(StorageError::JobNotFound(job_id))
    }

    fn get_latest_job(&self) -> StorageResult<Option<JobRecord>> {
        let job = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM jobs ORDER BY id DESC LIMIT 1",
                [],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn complete_job(
        &mut self,
        job_id: i64,
        status: JobStatus,
        totals: &JobTotals,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE jobs SET status = ?1, finished_at = ?2, succeeded = ?3, failed = ?4,
             skipped = ?5, bytes_transferred = ?6 WHERE id = ?7",
            params![
                status.to_db_string(),
                now,
                totals.succeeded as i64,
                totals.failed as i64,
                totals.skipped as i64,
                totals.bytes_transferred as i64,
                job_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::JobNotFound(job_id));
        }
        Ok(())
    }

    // ===== Cache Entries =====

    fn lookup(&self, normalized_url: &str) -> StorageResult<Option<CacheEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM cache_entries WHERE normalized_url = ?1",
                    ENTRY_COLUMNS
                ),
                params![normalized_url],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry.flatten())
    }

    fn record(
        &mut self,
        job_id: i64,
        normalized_url: &str,
        outcome: &Outcome,
        attempt_count: u32,
    ) -> StorageResult<()> {
        let existing: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT state, job_id FROM cache_entries WHERE normalized_url = ?1",
                params![normalized_url],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((state, existing_job)) = existing {
            if state == NodeState::Done.to_db_string() {
                match outcome {
                    Outcome::Done(_) if existing_job == job_id => {
                        return Err(StorageError::DuplicateWrite(
                            normalized_url.to_string(),
                            job_id,
                        ));
                    }
                    Outcome::Done(_) => {}
                    _ => return Ok(()),
                }
            }
        }

        let now = Utc::now().to_rfc3339();
        let resource = match outcome {
            Outcome::Done(resource) => Some(resource),
            _ => None,
        };

        self.conn.execute(
            "INSERT INTO cache_entries (normalized_url, state, local_path, reason, content_hash,
                 content_type, kind, byte_size, final_url, attempt_count, job_id, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(normalized_url) DO UPDATE SET
                 state = excluded.state,
                 local_path = excluded.local_path,
                 reason = excluded.reason,
                 content_hash = excluded.content_hash,
                 content_type = excluded.content_type,
                 kind = excluded.kind,
                 byte_size = excluded.byte_size,
                 final_url = excluded.final_url,
                 attempt_count = excluded.attempt_count,
                 job_id = excluded.job_id,
                 last_updated = excluded.last_updated",
            params![
                normalized_url,
                outcome.state().to_db_string(),
                resource.map(|r| r.local_path.as_str()),
                outcome.reason_code(),
                resource.map(|r| r.content_hash.as_str()),
                resource.and_then(|r| r.content_type.as_deref()),
                resource.map(|r| r.kind.as_str()),
                resource.map(|r| r.byte_size as i64),
                resource.map(|r| r.final_url.as_str()),
                attempt_count,
                job_id,
                now
            ],
        )?;

        Ok(())
    }

    fn invalidate(&mut self, normalized_url: &str) -> StorageResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM cache_entries WHERE normalized_url = ?1",
            params![normalized_url],
        )?;
        Ok(removed > 0)
    }

    fn done_entries(&self) -> StorageResult<Vec<CacheEntry>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM cache_entries WHERE state = ?1 ORDER BY normalized_url",
            ENTRY_COLUMNS
        ))?;

        let entries = stmt
            .query_map(params![NodeState::Done.to_db_string()], Self::row_to_entry)?
            .filter_map(|row| row.ok().flatten())
            .collect();

        Ok(entries)
    }

    // ===== Local Paths =====

    fn claim_path(&mut self, local_path: &str, content_hash: &str) -> StorageResult<PathClaim> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO claimed_paths (local_path, content_hash) VALUES (?1, ?2)",
            params![local_path, content_hash],
        )?;
        if inserted > 0 {
            return Ok(PathClaim::Claimed);
        }

        let holder: String = self.conn.query_row(
            "SELECT content_hash FROM claimed_paths WHERE local_path = ?1",
            params![local_path],
            |row| row.get(0),
        )?;

        if holder == content_hash {
            Ok(PathClaim::SameContent)
        } else {
            Ok(PathClaim::Taken)
        }
    }

    // ===== Statistics =====

    fn count_by_state(&self) -> StorageResult<HashMap<NodeState, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT state, COUNT(*) FROM cache_entries GROUP BY state")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (state, count) = row?;
            if let Some(state) = NodeState::from_db_string(&state) {
                counts.insert(state, count.max(0) as u64);
            }
        }

        Ok(counts)
    }

    fn total_bytes(&self) -> StorageResult<u64> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(byte_size), 0) FROM cache_entries WHERE state = ?1",
            params![NodeState::Done.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(total.max(0) as u64)
    }

    fn job_count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM jobs", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(
            "
            DELETE FROM cache_entries;
            DELETE FROM claimed_paths;
            DELETE FROM jobs;
        ",
        )?;
        Ok(())
    }
}
