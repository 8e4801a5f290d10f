//! Error types for axion-core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using axion-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a translation attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationErrorReason {
    /// The input could not be parsed into any formal statement.
    Unparseable,
    /// The input admits multiple formal readings; the caller may ask for
    /// the next-ranked candidate or a disambiguated re-translation.
    Ambiguous,
    /// The formalizer service could not be reached.
    ServiceUnavailable,
}

impl std::fmt::Display for TranslationErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unparseable => write!(f, "unparseable"),
            Self::Ambiguous => write!(f, "ambiguous"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
        }
    }
}

/// Why a synthesis attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisErrorReason {
    /// The synthesizer found no proof strategy for the statement.
    NoStrategyFound,
    /// The synthesizer service could not be reached.
    ServiceUnavailable,
}

impl std::fmt::Display for SynthesisErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoStrategyFound => write!(f, "no_strategy_found"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
        }
    }
}

/// Errors that can occur during pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Statement translation failed.
    #[error("Translation error ({reason}): {message}")]
    Translation {
        reason: TranslationErrorReason,
        message: String,
    },

    /// Proof synthesis failed.
    #[error("Synthesis error ({reason}): {message}")]
    Synthesis {
        reason: SynthesisErrorReason,
        message: String,
    },

    /// The external checker process or session faulted.
    ///
    /// Semantic rejections (type errors, tactic failures) are not errors at
    /// this level; they come back as non-success verdicts.
    #[error("Checker fault: {0}")]
    CheckerFault(String),

    /// Operation exceeded its time budget.
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Subprocess communication error.
    #[error("Subprocess communication error: {0}")]
    SubprocessComm(String),

    /// Model service API error.
    #[error("Model service error: {endpoint} - {message}")]
    ModelService { endpoint: String, message: String },

    /// Theorem store or journal error.
    #[error("Store error: {0}")]
    Store(String),

    /// A retry budget was exhausted.
    #[error("Budget exhausted: {resource}")]
    BudgetExhausted { resource: String },

    /// The requested job or theorem does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a translation error.
    pub fn translation(reason: TranslationErrorReason, message: impl Into<String>) -> Self {
        Self::Translation {
            reason,
            message: message.into(),
        }
    }

    /// Create a synthesis error.
    pub fn synthesis(reason: SynthesisErrorReason, message: impl Into<String>) -> Self {
        Self::Synthesis {
            reason,
            message: message.into(),
        }
    }

    /// Create a checker fault.
    pub fn checker_fault(message: impl Into<String>) -> Self {
        Self::CheckerFault(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a model service error.
    pub fn model_service(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelService {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a budget exhausted error.
    pub fn budget_exhausted(resource: impl Into<String>) -> Self {
        Self::BudgetExhausted {
            resource: resource.into(),
        }
    }

    /// Whether this error is an infrastructure outage rather than a
    /// semantic failure. Infrastructure errors consume the infra-retry
    /// budget instead of the proof-retry budget.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Translation {
                reason: TranslationErrorReason::ServiceUnavailable,
                ..
            } | Self::Synthesis {
                reason: SynthesisErrorReason::ServiceUnavailable,
                ..
            } | Self::ModelService { .. }
        )
    }
}
