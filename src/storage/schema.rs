//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sumi-Mirror cache store.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per job run against this output root
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    succeeded INTEGER NOT NULL DEFAULT 0,
    failed INTEGER NOT NULL DEFAULT 0,
    skipped INTEGER NOT NULL DEFAULT 0,
    bytes_transferred INTEGER NOT NULL DEFAULT 0
);

-- Normalized URL -> outcome; the authority for "already handled"
CREATE TABLE IF NOT EXISTS cache_entries (
    normalized_url TEXT PRIMARY KEY,
    state TEXT NOT NULL,
    local_path TEXT,
    reason TEXT,
    content_hash TEXT,
    content_type TEXT,
    kind TEXT,
    byte_size INTEGER,
    final_url TEXT,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    job_id INTEGER NOT NULL REFERENCES jobs(id),
    last_updated TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_state ON cache_entries(state);

-- Local paths handed out so far, with the content stored under each
CREATE TABLE IF NOT EXISTS claimed_paths (
    local_path TEXT PRIMARY KEY,
    content_hash TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        let result = initialize_schema(&conn);

        assert!(result.is_ok());
    }

    #[test]
    fn test_tables_exist_after_init() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        for table in ["jobs", "cache_entries", "claimed_paths"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "Table {} should exist", table);
        }
    }
}
