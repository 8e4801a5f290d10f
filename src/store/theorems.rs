//! SQLite-backed knowledge graph store for verified theorems.

use crate::error::{Error, Result};
use crate::job::JobId;
use crate::store::record::{cosine, signature, TheoremRecord};
use crate::store::schema::{initialize_schema, is_initialized};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Append-only, content-addressed repository of verified theorems.
///
/// `put` is idempotent on the content hash, which is the sole
/// synchronization primitive needed for concurrent job completion: the last
/// writer of a duplicate hash is a no-op.
pub struct SqliteTheoremStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTheoremStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Store(e.to_string()))?;

        if !is_initialized(&conn) {
            initialize_schema(&conn).map_err(|e| Error::Store(e.to_string()))?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Store(e.to_string()))?;
        initialize_schema(&conn).map_err(|e| Error::Store(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&conn).map_err(|e| Error::Store(e.to_string()))
    }

    /// Insert a record. Idempotent: re-inserting an identical content hash
    /// is a no-op, not an error. Returns whether a new row was written.
    pub fn put(&self, record: &TheoremRecord) -> Result<bool> {
        let inserted = self.with_conn(|conn| {
            let signature_blob: Vec<u8> = record
                .signature
                .iter()
                .flat_map(|f| f.to_le_bytes())
                .collect();

            let rows = conn.execute(
                "INSERT OR IGNORE INTO theorems (
                    content_hash, statement, proof, explanation, signature,
                    source_job, inserted_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.content_hash,
                    record.statement,
                    record.proof,
                    record.explanation,
                    signature_blob,
                    record.source_job.to_string(),
                    record.inserted_at.to_rfc3339(),
                ],
            )?;
            Ok(rows > 0)
        })?;

        if !inserted {
            debug!(hash = %record.content_hash, "duplicate theorem hash; put is a no-op");
        }
        Ok(inserted)
    }

    /// Fetch a record by its content hash.
    pub fn get(&self, content_hash: &str) -> Result<Option<TheoremRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT content_hash, statement, proof, explanation, signature,
                        source_job, inserted_at
                 FROM theorems WHERE content_hash = ?1",
                params![content_hash],
                Self::row_to_record,
            )
            .optional()
        })
    }

    /// Rank stored theorems by similarity to the statement.
    ///
    /// Returns at most `k` records, best first; ties broken by earliest
    /// insertion timestamp, then by hash, so the ordering is reproducible.
    pub fn similar(&self, statement: &str, k: usize) -> Result<Vec<TheoremRecord>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_sig = signature(statement);

        let mut records = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT content_hash, statement, proof, explanation, signature,
                        source_job, inserted_at
                 FROM theorems",
            )?;
            let rows = stmt
                .query_map([], Self::row_to_record)?
                .filter_map(|r| r.ok())
                .collect::<Vec<_>>();
            Ok(rows)
        })?;

        records.sort_by(|a, b| {
            let score_a = cosine(&query_sig, &a.signature);
            let score_b = cosine(&query_sig, &b.signature);
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.inserted_at.cmp(&b.inserted_at))
                .then_with(|| a.content_hash.cmp(&b.content_hash))
        });
        records.truncate(k);
        Ok(records)
    }

    /// Fill in a missing explanation. The proof content itself is never
    /// mutated; only a still-empty explanation may be written, once.
    /// Returns whether the update applied.
    pub fn set_explanation(&self, content_hash: &str, explanation: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "UPDATE theorems SET explanation = ?2
                 WHERE content_hash = ?1
                   AND (explanation IS NULL OR explanation = '')",
                params![content_hash, explanation],
            )?;
            Ok(rows > 0)
        })
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM theorems", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
        })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<TheoremRecord> {
        let signature: Vec<f32> = row
            .get::<_, Vec<u8>>(4)?
            .chunks(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or([0; 4]);
                f32::from_le_bytes(arr)
            })
            .collect();

        let source_job_str: String = row.get(5)?;

        Ok(TheoremRecord {
            content_hash: row.get(0)?,
            statement: row.get(1)?,
            proof: row.get(2)?,
            explanation: row.get::<_, Option<String>>(3)?.filter(|s| !s.is_empty()),
            signature,
            source_job: JobId::parse(&source_job_str).unwrap_or_default(),
            inserted_at: parse_datetime(row.get::<_, String>(6)?),
        })
    }
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
