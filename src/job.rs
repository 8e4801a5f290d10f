//! Job lifecycle types: jobs, candidates, verdicts, and transition events.
//!
//! A `Job` is one end-to-end formalization request. It exclusively owns the
//! sequence of candidates and verdicts produced while processing it; the
//! orchestrator is the only mutator, and a job becomes immutable once it
//! reaches a terminal phase.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of raw input submitted to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// Plain natural-language prose.
    Natural,
    /// LaTeX markup.
    Latex,
    /// Already-formal statement text; translation is a parse check only.
    Formal,
}

impl std::fmt::Display for InputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Natural => write!(f, "natural"),
            Self::Latex => write!(f, "latex"),
            Self::Formal => write!(f, "formal"),
        }
    }
}

/// Unique identifier for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id from its string form.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::Internal(format!("Invalid job id '{}': {}", s, e)))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateId(Uuid);

impl CandidateId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id from its string form.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::Internal(format!("Invalid candidate id '{}': {}", s, e)))
    }
}

impl Default for CandidateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Phases of the job state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Submitted,
    Translating,
    Synthesizing,
    Verifying,
    /// Transient: resolves immediately to Synthesizing, Translating, or
    /// Failed via the repair policy. Logged so the event trail shows why a
    /// job looped.
    Repairing,
    Verified,
    Failed,
}

impl JobPhase {
    /// Whether this phase is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Failed)
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submitted => write!(f, "submitted"),
            Self::Translating => write!(f, "translating"),
            Self::Synthesizing => write!(f, "synthesizing"),
            Self::Verifying => write!(f, "verifying"),
            Self::Repairing => write!(f, "repairing"),
            Self::Verified => write!(f, "verified"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The checker's judgment on one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictOutcome {
    Success,
    TypeError,
    TacticFailure,
    Timeout,
    CheckerCrash,
}

impl VerdictOutcome {
    /// Whether this outcome is terminal success for the job.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Whether this outcome is a semantic rejection carrying a diagnostic,
    /// as opposed to an infrastructure fault.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::TypeError | Self::TacticFailure)
    }
}

impl std::fmt::Display for VerdictOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::TypeError => write!(f, "type_error"),
            Self::TacticFailure => write!(f, "tactic_failure"),
            Self::Timeout => write!(f, "timeout"),
            Self::CheckerCrash => write!(f, "checker_crash"),
        }
    }
}

/// A structured verdict for one submitted candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub outcome: VerdictOutcome,
    /// Diagnostic message from the checker (empty on success).
    pub diagnostic: String,
    /// Remaining proof goal, present only for non-success outcomes where
    /// the checker made partial progress.
    pub goal_state: Option<String>,
    /// Wall-clock time the check took.
    pub elapsed_ms: u64,
}

impl Verdict {
    /// Create a success verdict.
    pub fn success(elapsed_ms: u64) -> Self {
        Self {
            outcome: VerdictOutcome::Success,
            diagnostic: String::new(),
            goal_state: None,
            elapsed_ms,
        }
    }

    /// Create a rejection verdict with a diagnostic and optional goal state.
    pub fn rejected(
        outcome: VerdictOutcome,
        diagnostic: impl Into<String>,
        goal_state: Option<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            outcome,
            diagnostic: diagnostic.into(),
            goal_state,
            elapsed_ms,
        }
    }

    /// Create a timeout verdict.
    pub fn timed_out(elapsed_ms: u64) -> Self {
        Self {
            outcome: VerdictOutcome::Timeout,
            diagnostic: format!("verification exceeded {}ms budget", elapsed_ms),
            goal_state: None,
            elapsed_ms,
        }
    }

    /// Create a crash verdict.
    pub fn crashed(diagnostic: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            outcome: VerdictOutcome::CheckerCrash,
            diagnostic: diagnostic.into(),
            goal_state: None,
            elapsed_ms,
        }
    }
}

/// One (statement, proof) pair attempted during a job's lifetime.
///
/// Immutable once its verdict is recorded; generation indices within a job
/// are strictly increasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    /// Formal statement text.
    pub statement: String,
    /// Formal proof text; None until synthesis produces one.
    pub proof: Option<String>,
    /// 0 = first attempt; strictly increasing within a job.
    pub generation: u32,
    /// The candidate this one repairs, if any.
    pub parent: Option<CandidateId>,
    /// The checker's judgment, exactly one once verified.
    pub verdict: Option<Verdict>,
    pub created_at: DateTime<Utc>,
}

impl Candidate {
    fn new(statement: impl Into<String>, generation: u32, parent: Option<CandidateId>) -> Self {
        Self {
            id: CandidateId::new(),
            statement: statement.into(),
            proof: None,
            generation,
            parent,
            verdict: None,
            created_at: Utc::now(),
        }
    }
}

/// Why a job failed, in user-visible terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// All proof and statement retry budgets were exhausted, or the checker
    /// crashed twice in a row.
    BudgetExhausted,
    /// An external model service stayed unavailable past the infra budget.
    /// Distinct from "unprovable".
    ServiceUnavailable,
    /// The input could not be turned into any formal statement.
    Untranslatable,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BudgetExhausted => write!(f, "budget_exhausted"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
            Self::Untranslatable => write!(f, "untranslatable"),
        }
    }
}

/// Terminal failure payload: enough for a human to continue manually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    pub reason: FailureReason,
    /// The final formal statement attempted, if translation got that far.
    pub statement: Option<String>,
    /// The last checker diagnostic.
    pub diagnostic: Option<String>,
    /// The last remaining goal state, if the checker made partial progress.
    pub goal_state: Option<String>,
    /// Total candidates attempted.
    pub attempts: u32,
}

/// Terminal result of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum JobResult {
    Verified {
        /// Content hash key of the stored theorem record.
        theorem_id: String,
    },
    Failed(FailureReport),
}

/// One end-to-end formalization request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub input_kind: InputKind,
    pub raw_input: String,
    pub phase: JobPhase,
    /// Proof re-synthesis attempts for the current statement.
    pub proof_retries: u32,
    /// Ranked-statement advances so far.
    pub statement_retries: u32,
    /// Infrastructure (service_unavailable) retries so far.
    pub infra_retries: u32,
    /// Consecutive checker crashes; reset by any non-crash verdict.
    pub consecutive_crashes: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Audit link to the job this one supersedes, if resubmitted.
    pub retry_of: Option<JobId>,
    /// Strict append order; generation indices strictly increasing.
    pub candidates: Vec<Candidate>,
    pub result: Option<JobResult>,
    #[serde(skip)]
    next_generation: u32,
}

impl Job {
    /// Create a job for freshly submitted input.
    pub fn new(input_kind: InputKind, raw_input: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            input_kind,
            raw_input: raw_input.into(),
            phase: JobPhase::Submitted,
            proof_retries: 0,
            statement_retries: 0,
            infra_retries: 0,
            consecutive_crashes: 0,
            created_at: now,
            updated_at: now,
            retry_of: None,
            candidates: Vec::new(),
            result: None,
            next_generation: 0,
        }
    }

    /// Create a job superseding an earlier one, keeping the audit link.
    pub fn retry_of(input_kind: InputKind, raw_input: impl Into<String>, parent: JobId) -> Self {
        let mut job = Self::new(input_kind, raw_input);
        job.retry_of = Some(parent);
        job
    }

    /// Advance to a new phase. Terminal jobs are immutable.
    pub fn advance(&mut self, phase: JobPhase) -> Result<()> {
        if self.phase.is_terminal() {
            return Err(Error::Internal(format!(
                "Job {} is terminal ({}); cannot advance to {}",
                self.id, self.phase, phase
            )));
        }
        self.phase = phase;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Append a new candidate for the given statement.
    pub fn push_candidate(
        &mut self,
        statement: impl Into<String>,
        parent: Option<CandidateId>,
    ) -> CandidateId {
        let candidate = Candidate::new(statement, self.next_generation, parent);
        self.next_generation += 1;
        let id = candidate.id;
        self.candidates.push(candidate);
        self.updated_at = Utc::now();
        id
    }

    /// Attach a synthesized proof to the newest candidate.
    pub fn attach_proof(&mut self, proof: impl Into<String>) -> Result<()> {
        let candidate = self
            .candidates
            .last_mut()
            .ok_or_else(|| Error::Internal("No candidate to attach proof to".into()))?;
        if candidate.verdict.is_some() {
            return Err(Error::Internal(format!(
                "Candidate {} already has a verdict",
                candidate.id
            )));
        }
        candidate.proof = Some(proof.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record the verdict for the newest candidate. Exactly one verdict per
    /// submitted candidate.
    pub fn record_verdict(&mut self, verdict: Verdict) -> Result<()> {
        let candidate = self
            .candidates
            .last_mut()
            .ok_or_else(|| Error::Internal("No candidate to record a verdict for".into()))?;
        if candidate.verdict.is_some() {
            return Err(Error::Internal(format!(
                "Candidate {} already has a verdict",
                candidate.id
            )));
        }
        if verdict.outcome == VerdictOutcome::CheckerCrash {
            self.consecutive_crashes += 1;
        } else {
            self.consecutive_crashes = 0;
        }
        candidate.verdict = Some(verdict);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// The newest candidate, if any.
    pub fn last_candidate(&self) -> Option<&Candidate> {
        self.candidates.last()
    }

    /// The verdict of the newest candidate, if recorded.
    pub fn last_verdict(&self) -> Option<&Verdict> {
        self.candidates.last().and_then(|c| c.verdict.as_ref())
    }

    /// Total candidates attempted so far.
    pub fn attempts(&self) -> u32 {
        self.candidates.len() as u32
    }

    /// Finish the job with a terminal result.
    pub fn finish(&mut self, result: JobResult) -> Result<()> {
        let phase = match &result {
            JobResult::Verified { .. } => JobPhase::Verified,
            JobResult::Failed(_) => JobPhase::Failed,
        };
        self.advance(phase)?;
        self.result = Some(result);
        Ok(())
    }

    /// Build the user-visible failure payload from current state.
    pub fn failure_report(&self, reason: FailureReason) -> FailureReport {
        FailureReport {
            reason,
            statement: self.last_candidate().map(|c| c.statement.clone()),
            diagnostic: self.last_verdict().map(|v| v.diagnostic.clone()),
            goal_state: self.last_verdict().and_then(|v| v.goal_state.clone()),
            attempts: self.attempts(),
        }
    }
}

/// An immutable record of one phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub phase: JobPhase,
    /// The candidate in play at the time of the transition, if any.
    pub candidate_id: Option<CandidateId>,
    pub timestamp: DateTime<Utc>,
    /// Short free-form annotation (repair action, failure reason).
    pub note: Option<String>,
}

impl JobEvent {
    /// Create a transition event.
    pub fn new(job_id: JobId, phase: JobPhase, candidate_id: Option<CandidateId>) -> Self {
        Self {
            job_id,
            phase,
            candidate_id,
            timestamp: Utc::now(),
            note: None,
        }
    }

    /// Annotate the event.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Reconstruct a job's current phase by replaying its event log.
pub fn replay_phase(events: &[JobEvent]) -> JobPhase {
    events
        .last()
        .map(|e| e.phase)
        .unwrap_or(JobPhase::Submitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_candidate_generations_monotonic() {
        let mut job = Job::new(InputKind::Natural, "every even number above two");
        let first = job.push_candidate("thm a", None);
        job.push_candidate("thm b", Some(first));
        job.push_candidate("thm c", None);

        let gens: Vec<u32> = job.candidates.iter().map(|c| c.generation).collect();
        assert_eq!(gens, vec![0, 1, 2]);
    }

    #[test]
    fn test_verdict_uniqueness() {
        let mut job = Job::new(InputKind::Formal, "theorem t : 1 = 1");
        job.push_candidate("theorem t : 1 = 1", None);
        job.attach_proof("rfl").unwrap();
        job.record_verdict(Verdict::success(10)).unwrap();

        // A second verdict for the same candidate must be rejected.
        assert!(job.record_verdict(Verdict::success(10)).is_err());
        // So must a late proof attach.
        assert!(job.attach_proof("simp").is_err());
    }

    #[test]
    fn test_terminal_job_is_immutable() {
        let mut job = Job::new(InputKind::Latex, "\\forall x, x = x");
        job.finish(JobResult::Failed(job.failure_report(FailureReason::Untranslatable)))
            .unwrap();

        assert_eq!(job.phase, JobPhase::Failed);
        assert!(job.advance(JobPhase::Translating).is_err());
    }

    #[test]
    fn test_consecutive_crash_tracking() {
        let mut job = Job::new(InputKind::Natural, "x");
        job.push_candidate("s", None);
        job.record_verdict(Verdict::crashed("segfault", 5)).unwrap();
        assert_eq!(job.consecutive_crashes, 1);

        job.push_candidate("s", None);
        job.record_verdict(Verdict::rejected(
            VerdictOutcome::TacticFailure,
            "simp failed",
            Some("⊢ False".into()),
            5,
        ))
        .unwrap();
        assert_eq!(job.consecutive_crashes, 0);
    }

    #[test]
    fn test_failure_report_contents() {
        let mut job = Job::new(InputKind::Natural, "x");
        job.push_candidate("theorem t : P", None);
        job.attach_proof("by tauto").unwrap();
        job.record_verdict(Verdict::rejected(
            VerdictOutcome::TacticFailure,
            "tauto failed",
            Some("⊢ P".into()),
            100,
        ))
        .unwrap();

        let report = job.failure_report(FailureReason::BudgetExhausted);
        assert_eq!(report.statement.as_deref(), Some("theorem t : P"));
        assert_eq!(report.diagnostic.as_deref(), Some("tauto failed"));
        assert_eq!(report.goal_state.as_deref(), Some("⊢ P"));
        assert_eq!(report.attempts, 1);
    }

    #[test]
    fn test_replay_phase() {
        let id = JobId::new();
        assert_eq!(replay_phase(&[]), JobPhase::Submitted);

        let events = vec![
            JobEvent::new(id, JobPhase::Submitted, None),
            JobEvent::new(id, JobPhase::Translating, None),
            JobEvent::new(id, JobPhase::Synthesizing, None),
        ];
        assert_eq!(replay_phase(&events), JobPhase::Synthesizing);
    }

    proptest! {
        #[test]
        fn prop_generations_strictly_increase(count in 1usize..40) {
            let mut job = Job::new(InputKind::Natural, "input");
            for i in 0..count {
                job.push_candidate(format!("statement {}", i), None);
            }
            for pair in job.candidates.windows(2) {
                prop_assert!(pair[0].generation < pair[1].generation);
            }
        }
    }
}
