//! # axion-core
//!
//! The formalization-and-verification pipeline behind Axion: raw
//! mathematical input (natural language, LaTeX, or formal code) in,
//! machine-checked theorems out.
//!
//! ## Core Components
//!
//! - **Translator**: raw input to ranked formal statements
//! - **Synthesizer**: statement to candidate proof, seeded with similar
//!   verified theorems
//! - **Checker adapter**: scoped, time-bounded verification with
//!   structured verdicts
//! - **Repair loop**: bounded retry policy over proofs and statements
//! - **Orchestrator**: the per-job state machine, one tokio task per job
//! - **Theorem store**: append-only, content-addressed, similarity-searchable
//!
//! ## Example
//!
//! ```rust,ignore
//! use axion_core::{InputKind, Pipeline};
//!
//! let pipeline = Pipeline::builder()
//!     .formalizer(formalizer)
//!     .synthesizer(synthesizer)
//!     .checker(checker)
//!     .narrative(narrative)
//!     .build()?;
//!
//! let job_id = pipeline
//!     .submit(InputKind::Natural, "every natural number plus zero is itself")
//!     .await?;
//! let snapshot = pipeline.await_terminal(job_id).await?;
//! println!("job finished in phase {}", snapshot.phase);
//! ```

pub mod checker;
pub mod config;
pub mod error;
pub mod explain;
pub mod job;
pub mod orchestrator;
pub mod repair;
pub mod services;
pub mod store;
pub mod synthesizer;
pub mod translator;

// Re-exports for convenience
pub use checker::{CheckerAdapter, SessionGauge};
pub use config::PipelineConfig;
pub use error::{Error, Result, SynthesisErrorReason, TranslationErrorReason};
pub use explain::ExplanationGenerator;
pub use job::{
    Candidate, CandidateId, FailureReason, FailureReport, InputKind, Job, JobEvent, JobId,
    JobPhase, JobResult, Verdict, VerdictOutcome,
};
pub use orchestrator::{JobSnapshot, Pipeline, PipelineBuilder};
pub use repair::{RepairAction, RepairPolicy};
pub use services::lean::{LeanChecker, LeanCheckerConfig};
pub use services::model::{ModelServiceClient, ModelServiceConfig};
pub use services::{
    CheckReport, FormalChecker, LanguageFormalizer, LemmaHint, NarrativeGenerator,
    RankedStatement, RejectionKind, RepairContext, TacticSynthesizer, TranslationContext,
};
pub use store::{
    content_hash, JobJournal, SqliteTheoremStore, TheoremRecord, SIGNATURE_DIM,
};
pub use synthesizer::ProofSynthesizer;
pub use translator::{parse_check, StatementQueue, StatementTranslator};
