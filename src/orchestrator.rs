//! Pipeline orchestrator: the job state machine.
//!
//! Drives Translating → Synthesizing → Verifying, loops through Repairing
//! on rejection, and finishes at Verified or Failed. Each job runs on its
//! own tokio task; candidates and verdicts within one job stay strictly
//! sequential, and the only shared mutable state between jobs is the
//! theorem store, whose content-hash insert is idempotent.

use crate::checker::CheckerAdapter;
use crate::config::PipelineConfig;
use crate::error::{Error, Result, TranslationErrorReason};
use crate::explain::ExplanationGenerator;
use crate::job::{
    Candidate, FailureReason, InputKind, Job, JobEvent, JobId, JobPhase, JobResult,
};
use crate::repair::{RepairAction, RepairPolicy};
use crate::services::{
    FormalChecker, LanguageFormalizer, NarrativeGenerator, RepairContext, TacticSynthesizer,
    TranslationContext,
};
use crate::store::{JobJournal, SqliteTheoremStore, TheoremRecord};
use crate::synthesizer::ProofSynthesizer;
use crate::translator::{StatementQueue, StatementTranslator};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Read-only view of a job for external callers.
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    pub id: JobId,
    pub input_kind: InputKind,
    pub phase: JobPhase,
    pub candidates: Vec<Candidate>,
    pub result: Option<JobResult>,
    pub retry_of: Option<JobId>,
    pub proof_retries: u32,
    pub statement_retries: u32,
    pub infra_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    fn of(job: &Job) -> Self {
        Self {
            id: job.id,
            input_kind: job.input_kind,
            phase: job.phase,
            candidates: job.candidates.clone(),
            result: job.result.clone(),
            retry_of: job.retry_of,
            proof_retries: job.proof_retries,
            statement_retries: job.statement_retries,
            infra_retries: job.infra_retries,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Builder wiring services and stores into a pipeline.
pub struct PipelineBuilder {
    config: PipelineConfig,
    formalizer: Option<Arc<dyn LanguageFormalizer>>,
    synthesizer: Option<Arc<dyn TacticSynthesizer>>,
    checker: Option<Arc<dyn FormalChecker>>,
    narrative: Option<Arc<dyn NarrativeGenerator>>,
    store: Option<Arc<SqliteTheoremStore>>,
    journal: Option<Arc<JobJournal>>,
}

impl PipelineBuilder {
    fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            formalizer: None,
            synthesizer: None,
            checker: None,
            narrative: None,
            store: None,
            journal: None,
        }
    }

    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the formalizer service.
    pub fn formalizer(mut self, formalizer: Arc<dyn LanguageFormalizer>) -> Self {
        self.formalizer = Some(formalizer);
        self
    }

    /// Set the tactic synthesis service.
    pub fn synthesizer(mut self, synthesizer: Arc<dyn TacticSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Set the formal checker service.
    pub fn checker(mut self, checker: Arc<dyn FormalChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    /// Set the narrative service.
    pub fn narrative(mut self, narrative: Arc<dyn NarrativeGenerator>) -> Self {
        self.narrative = Some(narrative);
        self
    }

    /// Set the theorem store. Defaults to an in-memory store.
    pub fn store(mut self, store: Arc<SqliteTheoremStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the job journal. Defaults to an in-memory journal.
    pub fn journal(mut self, journal: Arc<JobJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Build the pipeline.
    pub fn build(self) -> Result<Pipeline> {
        let formalizer = self
            .formalizer
            .ok_or_else(|| Error::Config("pipeline needs a formalizer service".into()))?;
        let synthesizer = self
            .synthesizer
            .ok_or_else(|| Error::Config("pipeline needs a synthesizer service".into()))?;
        let checker = self
            .checker
            .ok_or_else(|| Error::Config("pipeline needs a checker service".into()))?;
        let narrative = self
            .narrative
            .ok_or_else(|| Error::Config("pipeline needs a narrative service".into()))?;

        let store = match self.store {
            Some(store) => store,
            None => Arc::new(SqliteTheoremStore::in_memory()?),
        };
        let journal = match self.journal {
            Some(journal) => journal,
            None => Arc::new(JobJournal::in_memory()?),
        };

        let policy = RepairPolicy::from_config(&self.config);
        let proof_synth = ProofSynthesizer::new(synthesizer)
            .with_store(Arc::clone(&store), self.config.lemma_hint_count);

        Ok(Pipeline {
            inner: Arc::new(PipelineInner {
                config: self.config,
                translator: StatementTranslator::new(formalizer),
                synthesizer: proof_synth,
                checker: CheckerAdapter::new(checker),
                explainer: ExplanationGenerator::new(narrative),
                store,
                journal,
                policy,
                jobs: RwLock::new(HashMap::new()),
            }),
        })
    }
}

struct PipelineInner {
    config: PipelineConfig,
    translator: StatementTranslator,
    synthesizer: ProofSynthesizer,
    checker: CheckerAdapter,
    explainer: ExplanationGenerator,
    store: Arc<SqliteTheoremStore>,
    journal: Arc<JobJournal>,
    policy: RepairPolicy,
    jobs: RwLock<HashMap<JobId, Arc<RwLock<Job>>>>,
}

/// The formalization pipeline: submit jobs, poll their lifecycle, query
/// the theorem store.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Pipeline {
    /// Start building a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Accept a formalization request and start processing it.
    ///
    /// Returns immediately with the job id; progress is observed through
    /// [`Pipeline::get_job`].
    pub async fn submit(&self, input_kind: InputKind, text: impl Into<String>) -> Result<JobId> {
        self.enqueue(Job::new(input_kind, text)).await
    }

    /// Accept a request superseding an earlier job, keeping the audit link.
    pub async fn resubmit(
        &self,
        input_kind: InputKind,
        text: impl Into<String>,
        retry_of: JobId,
    ) -> Result<JobId> {
        self.enqueue(Job::retry_of(input_kind, text, retry_of)).await
    }

    async fn enqueue(&self, job: Job) -> Result<JobId> {
        let job_id = job.id;
        info!(%job_id, kind = %job.input_kind, "job submitted");

        self.inner
            .journal
            .append(&JobEvent::new(job_id, JobPhase::Submitted, None))?;

        let handle = Arc::new(RwLock::new(job));
        self.inner
            .jobs
            .write()
            .await
            .insert(job_id, Arc::clone(&handle));

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if let Err(e) = drive(&inner, &handle).await {
                // Unrecoverable pipeline fault (store I/O, poisoned state):
                // make sure the job still reaches a terminal phase.
                error!(%job_id, error = %e, "job driver failed");
                let mut job = handle.write().await;
                if !job.phase.is_terminal() {
                    let report = job.failure_report(FailureReason::ServiceUnavailable);
                    if job.finish(JobResult::Failed(report)).is_ok() {
                        let _ = inner.journal.append(
                            &JobEvent::new(job_id, JobPhase::Failed, None)
                                .with_note(e.to_string()),
                        );
                    }
                }
            }
        });

        Ok(job_id)
    }

    /// Snapshot a job's current phase, candidates, verdicts, and result.
    pub async fn get_job(&self, job_id: JobId) -> Result<JobSnapshot> {
        let jobs = self.inner.jobs.read().await;
        let handle = jobs
            .get(&job_id)
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;
        let job = handle.read().await;
        Ok(JobSnapshot::of(&job))
    }

    /// Poll a job until it reaches a terminal phase.
    pub async fn await_terminal(&self, job_id: JobId) -> Result<JobSnapshot> {
        loop {
            let snapshot = self.get_job(job_id).await?;
            if snapshot.phase.is_terminal() {
                return Ok(snapshot);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Fetch a stored theorem by its content-hash id.
    pub fn get_theorem(&self, theorem_id: &str) -> Result<TheoremRecord> {
        self.inner
            .store
            .get(theorem_id)?
            .ok_or_else(|| Error::NotFound(format!("theorem {}", theorem_id)))
    }

    /// Rank stored theorems by similarity to a statement.
    pub fn find_similar(&self, statement: &str, k: usize) -> Result<Vec<TheoremRecord>> {
        self.inner.store.similar(statement, k)
    }

    /// Retry narrative generation for a stored theorem whose explanation is
    /// still empty. Never re-runs verification.
    pub async fn backfill_explanation(&self, theorem_id: &str) -> Result<bool> {
        let record = self.get_theorem(theorem_id)?;
        if record.explanation.is_some() {
            return Ok(false);
        }
        match self
            .inner
            .explainer
            .explain_or_none(&record.statement, &record.proof)
            .await
        {
            Some(text) => self.inner.store.set_explanation(theorem_id, &text),
            None => Ok(false),
        }
    }

    /// Checker session accounting, for tests and metrics.
    pub fn checker_sessions(&self) -> Arc<crate::checker::SessionGauge> {
        self.inner.checker.sessions()
    }
}

async fn transition(
    inner: &PipelineInner,
    handle: &Arc<RwLock<Job>>,
    phase: JobPhase,
    note: Option<String>,
) -> Result<()> {
    let (job_id, candidate_id) = {
        let mut job = handle.write().await;
        job.advance(phase)?;
        (job.id, job.last_candidate().map(|c| c.id))
    };

    debug!(%job_id, %phase, "phase transition");
    let mut event = JobEvent::new(job_id, phase, candidate_id);
    if let Some(note) = note {
        event = event.with_note(note);
    }
    inner.journal.append(&event)
}

async fn fail(
    inner: &PipelineInner,
    handle: &Arc<RwLock<Job>>,
    reason: FailureReason,
) -> Result<()> {
    let (job_id, candidate_id, report) = {
        let mut job = handle.write().await;
        let report = job.failure_report(reason);
        job.finish(JobResult::Failed(report.clone()))?;
        (job.id, job.last_candidate().map(|c| c.id), report)
    };

    info!(%job_id, reason = %reason, attempts = report.attempts, "job failed");
    inner.journal.append(
        &JobEvent::new(job_id, JobPhase::Failed, candidate_id).with_note(reason.to_string()),
    )
}

/// Translate the raw input, absorbing infra retries and one disambiguation
/// round. Returns None when the job was failed terminally.
async fn translate_input(
    inner: &PipelineInner,
    handle: &Arc<RwLock<Job>>,
) -> Result<Option<StatementQueue>> {
    let (input_kind, raw_input) = {
        let job = handle.read().await;
        (job.input_kind, job.raw_input.clone())
    };

    let mut context: Option<TranslationContext> = None;
    let mut disambiguated = false;

    loop {
        match inner
            .translator
            .translate(input_kind, &raw_input, context.as_ref())
            .await
        {
            Ok(queue) => return Ok(Some(queue)),
            Err(e) if e.is_service_unavailable() => {
                let exhausted = {
                    let mut job = handle.write().await;
                    job.infra_retries += 1;
                    job.infra_retries > inner.config.max_infra_retries
                };
                if exhausted {
                    fail(inner, handle, FailureReason::ServiceUnavailable).await?;
                    return Ok(None);
                }
                warn!("formalizer unavailable; retrying");
            }
            Err(Error::Translation {
                reason: TranslationErrorReason::Ambiguous,
                ..
            }) if !disambiguated => {
                // One re-translation asking the model to commit to the most
                // standard reading.
                disambiguated = true;
                context = Some(TranslationContext::disambiguation());
            }
            Err(e) => {
                warn!(error = %e, "translation failed terminally");
                fail(inner, handle, FailureReason::Untranslatable).await?;
                return Ok(None);
            }
        }
    }
}

enum SynthesisStep {
    Proof(String),
    /// No strategy for this statement; try the next ranked one.
    AdvanceStatement,
    /// The job was failed terminally.
    Done,
}

/// Synthesize a proof for the current statement, absorbing infra retries.
async fn synthesize_proof(
    inner: &PipelineInner,
    handle: &Arc<RwLock<Job>>,
    statement: &str,
    repair: Option<&RepairContext>,
) -> Result<SynthesisStep> {
    use crate::error::SynthesisErrorReason;

    loop {
        match inner.synthesizer.synthesize(statement, repair).await {
            Ok(proof) => return Ok(SynthesisStep::Proof(proof)),
            Err(e) if e.is_service_unavailable() => {
                let exhausted = {
                    let mut job = handle.write().await;
                    job.infra_retries += 1;
                    job.infra_retries > inner.config.max_infra_retries
                };
                if exhausted {
                    fail(inner, handle, FailureReason::ServiceUnavailable).await?;
                    return Ok(SynthesisStep::Done);
                }
                warn!("synthesizer unavailable; retrying");
            }
            Err(Error::Synthesis {
                reason: SynthesisErrorReason::NoStrategyFound,
                ..
            }) => return Ok(SynthesisStep::AdvanceStatement),
            Err(e) => {
                warn!(error = %e, "synthesis failed terminally");
                fail(inner, handle, FailureReason::ServiceUnavailable).await?;
                return Ok(SynthesisStep::Done);
            }
        }
    }
}

/// Finalize a verified job: explanation, store write, terminal result.
async fn finalize_verified(
    inner: &PipelineInner,
    handle: &Arc<RwLock<Job>>,
    statement: &str,
    proof: &str,
) -> Result<()> {
    // Explanation is best-effort; the job is Verified either way and a
    // missing narrative can be backfilled later.
    let explanation = inner.explainer.explain_or_none(statement, proof).await;

    let job_id = handle.read().await.id;
    let record = TheoremRecord::new(statement, proof, explanation, job_id);
    let theorem_id = record.content_hash.clone();

    // Idempotent on the content hash: a concurrent duplicate is a no-op.
    inner.store.put(&record)?;

    let candidate_id = {
        let mut job = handle.write().await;
        job.finish(JobResult::Verified {
            theorem_id: theorem_id.clone(),
        })?;
        job.last_candidate().map(|c| c.id)
    };

    info!(%job_id, %theorem_id, "job verified");
    inner.journal.append(
        &JobEvent::new(job_id, JobPhase::Verified, candidate_id).with_note(theorem_id),
    )
}

/// The per-job state machine.
async fn drive(inner: &Arc<PipelineInner>, handle: &Arc<RwLock<Job>>) -> Result<()> {
    transition(inner, handle, JobPhase::Translating, None).await?;
    let Some(mut queue) = translate_input(inner, handle).await? else {
        return Ok(());
    };

    let mut repair: Option<RepairContext> = None;
    let mut parent = None;

    'statement: loop {
        let statement = queue.current().text.clone();

        transition(inner, handle, JobPhase::Synthesizing, None).await?;
        let proof = match synthesize_proof(inner, handle, &statement, repair.as_ref()).await? {
            SynthesisStep::Proof(proof) => proof,
            SynthesisStep::AdvanceStatement => {
                let can_advance = {
                    let job = handle.read().await;
                    queue.has_untried()
                        && job.statement_retries < inner.config.max_statement_retries
                };
                if can_advance {
                    {
                        let mut job = handle.write().await;
                        inner
                            .policy
                            .apply(&mut job, &RepairAction::RetranslateStatement);
                    }
                    transition(
                        inner,
                        handle,
                        JobPhase::Translating,
                        Some("no_strategy_found".into()),
                    )
                    .await?;
                    queue.advance();
                    repair = None;
                    continue 'statement;
                }
                fail(inner, handle, FailureReason::BudgetExhausted).await?;
                return Ok(());
            }
            SynthesisStep::Done => return Ok(()),
        };

        {
            let mut job = handle.write().await;
            let id = job.push_candidate(&statement, parent);
            parent = Some(id);
            job.attach_proof(&proof)?;
        }

        'verify: loop {
            transition(inner, handle, JobPhase::Verifying, None).await?;
            let verdict = inner
                .checker
                .verify(&statement, &proof, inner.config.verify_timeout_ms)
                .await;
            let outcome = verdict.outcome;

            {
                let mut job = handle.write().await;
                job.record_verdict(verdict.clone())?;
            }

            if outcome.is_success() {
                return finalize_verified(inner, handle, &statement, &proof).await;
            }

            let action = {
                let job = handle.read().await;
                inner.policy.decide(&job, &verdict, queue.has_untried())
            };
            transition(
                inner,
                handle,
                JobPhase::Repairing,
                Some(format!("{}: {}", outcome, action_name(&action))),
            )
            .await?;
            {
                let mut job = handle.write().await;
                inner.policy.apply(&mut job, &action);
            }

            match action {
                RepairAction::ReverifyCandidate => {
                    // A lone crash says nothing about the proof: resubmit
                    // the same pair as a fresh candidate.
                    let mut job = handle.write().await;
                    let id = job.push_candidate(&statement, parent);
                    parent = Some(id);
                    job.attach_proof(&proof)?;
                    drop(job);
                    continue 'verify;
                }
                RepairAction::ResynthesizeProof { repair_context } => {
                    repair = Some(repair_context);
                    continue 'statement;
                }
                RepairAction::RetranslateStatement => {
                    transition(
                        inner,
                        handle,
                        JobPhase::Translating,
                        Some("advancing to next ranked statement".into()),
                    )
                    .await?;
                    queue.advance();
                    repair = None;
                    continue 'statement;
                }
                RepairAction::GiveUp => {
                    fail(inner, handle, FailureReason::BudgetExhausted).await?;
                    return Ok(());
                }
            }
        }
    }
}

fn action_name(action: &RepairAction) -> &'static str {
    match action {
        RepairAction::ResynthesizeProof { .. } => "resynthesize_proof",
        RepairAction::RetranslateStatement => "retranslate_statement",
        RepairAction::ReverifyCandidate => "reverify_candidate",
        RepairAction::GiveUp => "give_up",
    }
}
