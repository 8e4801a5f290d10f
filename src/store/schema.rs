//! SQLite schema and migrations for the theorem store and job journal.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    // WAL mode for concurrent readers while a job task writes
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        apply_v1_schema(conn)?;
    }

    Ok(())
}

/// Apply version 1 schema.
fn apply_v1_schema(conn: &Connection) -> SqliteResult<()> {
    // Verified theorems, keyed by content hash. Append-only: the primary
    // key plus INSERT OR IGNORE is the deduplication mechanism.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS theorems (
            content_hash TEXT PRIMARY KEY,
            statement TEXT NOT NULL,
            proof TEXT NOT NULL,
            explanation TEXT,
            signature BLOB NOT NULL,
            source_job TEXT NOT NULL,
            inserted_at TEXT NOT NULL
        )",
        [],
    )?;

    // Append-only job transition log, replayable per job.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS job_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL,
            phase TEXT NOT NULL,
            candidate_id TEXT,
            note TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_theorems_inserted ON theorems(inserted_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_job_events_job ON job_events(job_id, id)",
        [],
    )?;

    conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;

    Ok(())
}

/// Get the current schema version.
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

/// Check if the schema is initialized.
pub fn is_initialized(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='theorems'",
        [],
        |row| row.get::<_, i32>(0),
    )
    .map(|count| count > 0)
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_schema() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        assert!(is_initialized(&conn));
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_idempotent_initialization() {
        let conn = Connection::open_in_memory().unwrap();

        initialize_schema(&conn).unwrap();
        initialize_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }
}
