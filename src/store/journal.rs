//! Append-only job event journal.
//!
//! Every phase transition of every job is appended here as an immutable
//! row. Replaying a job's events reconstructs its current phase, which is
//! how in-flight state survives a process restart.

use crate::error::{Error, Result};
use crate::job::{replay_phase, JobEvent, JobId, JobPhase};
use crate::store::schema::{initialize_schema, is_initialized};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Durable, append-only log of job transitions, keyed by job id.
pub struct JobJournal {
    conn: Arc<Mutex<Connection>>,
}

impl JobJournal {
    /// Open or create a journal at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Store(e.to_string()))?;

        if !is_initialized(&conn) {
            initialize_schema(&conn).map_err(|e| Error::Store(e.to_string()))?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory journal (for testing).
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

    /// Append one transition event. Events are never updated or deleted.
    pub fn append(&self, event: &JobEvent) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO job_events (job_id, phase, candidate_id, note, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.job_id.to_string(),
                    event.phase.to_string(),
                    event.candidate_id.map(|c| c.to_string()),
                    event.note,
                    event.timestamp.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// All events for a job, in append order.
    pub fn events(&self, job_id: JobId) -> Result<Vec<JobEvent>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT phase, candidate_id, note, created_at
                 FROM job_events WHERE job_id = ?1 ORDER BY id",
            )?;

            let events = stmt
                .query_map(params![job_id.to_string()], |row| {
                    let phase_str: String = row.get(0)?;
                    let candidate_str: Option<String> = row.get(1)?;
                    Ok(JobEvent {
                        job_id,
                        phase: parse_phase(&phase_str),
                        candidate_id: candidate_str
                            .and_then(|s| crate::job::CandidateId::parse(&s).ok()),
                        note: row.get(2)?,
                        timestamp: parse_datetime(row.get::<_, String>(3)?),
                    })
                })?
                .filter_map(|r| r.ok())
                .collect();

            Ok(events)
        })
    }

    /// Reconstruct a job's current phase by replaying its event log.
    pub fn replayed_phase(&self, job_id: JobId) -> Result<JobPhase> {
        let events = self.events(job_id)?;
        Ok(replay_phase(&events))
    }

    /// Ids of all jobs with at least one event, for restart recovery.
    pub fn job_ids(&self) -> Result<Vec<JobId>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT job_id FROM job_events GROUP BY job_id ORDER BY MIN(id)")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .filter_map(|r| r.ok())
                .filter_map(|s| JobId::parse(&s).ok())
                .collect();
            Ok(ids)
        })
    }
}

fn parse_phase(s: &str) -> JobPhase {
    match s {
        "submitted" => JobPhase::Submitted,
        "translating" => JobPhase::Translating,
        "synthesizing" => JobPhase::Synthesizing,
        "verifying" => JobPhase::Verifying,
        "repairing" => JobPhase::Repairing,
        "verified" => JobPhase::Verified,
        "failed" => JobPhase::Failed,
        _ => JobPhase::Submitted,
    }
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
