//! Black-box external service traits.
//!
//! Every long-latency collaborator of the pipeline (the formalizing
//! language model, the tactic synthesis model, the formal checker, and the
//! narrative model) sits behind one of these traits. Implementations are
//! injected (`Arc<dyn …>`), so tests run against deterministic fakes and
//! production wires up [`model::ModelServiceClient`] and
//! [`lean::LeanChecker`].

pub mod lean;
pub mod model;

use crate::error::Result;
use crate::job::InputKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One candidate formal statement with the model's confidence in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedStatement {
    /// Formal statement text.
    pub text: String,
    /// Model confidence, higher is better. Used for best-first ordering.
    pub confidence: f64,
}

impl RankedStatement {
    /// Create a ranked statement.
    pub fn new(text: impl Into<String>, confidence: f64) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Prior-failure context passed back into translation during repair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationContext {
    /// The statement whose proofs kept failing, if any.
    pub prior_statement: Option<String>,
    /// The last checker diagnostic seen for that statement.
    pub prior_diagnostic: Option<String>,
    /// Ask the model to commit to the most standard reading instead of
    /// reporting ambiguity.
    pub disambiguate: bool,
}

impl TranslationContext {
    /// Context for a disambiguation re-translation.
    pub fn disambiguation() -> Self {
        Self {
            disambiguate: true,
            ..Default::default()
        }
    }
}

/// Verifier feedback carried into a repair synthesis call.
///
/// This is the primary signal for re-synthesis: most failures are
/// proof-script errors, not statement errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairContext {
    /// Diagnostic from the failing verdict.
    pub diagnostic: String,
    /// Remaining goal state, if the checker made partial progress.
    pub goal_state: Option<String>,
    /// Set after a timeout verdict: steer the model toward cheaper tactics.
    pub prefer_simple_tactics: bool,
}

/// A verified theorem offered to the synthesizer as a reuse hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LemmaHint {
    pub statement: String,
    pub proof: String,
}

/// Which way a checker rejection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// The statement or proof term does not type-check.
    TypeError,
    /// The proof script ran but left goals or a failing tactic.
    TacticFailure,
}

/// Structured result of one checker invocation.
///
/// Process-level faults are not reports; they surface as
/// [`crate::error::Error::CheckerFault`] from [`FormalChecker::check`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CheckReport {
    /// The pair is accepted by the checker.
    Ok,
    /// The checker rejected the pair.
    Rejected {
        kind: RejectionKind,
        diagnostic: String,
        /// Remaining goal, present when the checker got partway through.
        goal_state: Option<String>,
    },
}

impl CheckReport {
    /// Whether the checker accepted the pair.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Natural-language-to-formal-statement model service.
#[async_trait]
pub trait LanguageFormalizer: Send + Sync {
    /// Translate raw input into candidate formal statements, best-first.
    ///
    /// May fail with `Translation { reason }`; `ambiguous` is recoverable by
    /// re-translating with a disambiguation context.
    async fn translate(
        &self,
        input_kind: InputKind,
        text: &str,
        context: Option<&TranslationContext>,
    ) -> Result<Vec<RankedStatement>>;
}

/// Proof-search model service.
#[async_trait]
pub trait TacticSynthesizer: Send + Sync {
    /// Propose a formal proof for the statement.
    ///
    /// `repair` carries the previous verdict's diagnostic and goal state;
    /// `hints` are similar verified theorems for lemma reuse. Outputs are
    /// not deterministic across calls.
    async fn propose(
        &self,
        statement: &str,
        repair: Option<&RepairContext>,
        hints: &[LemmaHint],
    ) -> Result<String>;
}

/// External formal proof checker.
#[async_trait]
pub trait FormalChecker: Send + Sync {
    /// Submit a (statement, proof) pair for checking.
    ///
    /// Semantic rejection comes back as `CheckReport::Rejected`; a crashed
    /// or unreachable checker is an `Error::CheckerFault`. Timeout policy is
    /// enforced by the caller, not here.
    async fn check(&self, statement: &str, proof: &str) -> Result<CheckReport>;
}

/// Plain-language proof narration service.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    /// Produce an ordered sequence of natural-language proof steps.
    async fn describe(&self, statement: &str, proof: &str) -> Result<Vec<String>>;
}
