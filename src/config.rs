//! Pipeline configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the formalization pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum proof re-synthesis attempts per statement (default: 3).
    pub max_proof_retries: u32,

    /// Maximum ranked-statement advances per job (default: 2).
    pub max_statement_retries: u32,

    /// Maximum retries when a model service is unavailable (default: 2).
    /// Counted separately from the semantic budgets.
    pub max_infra_retries: u32,

    /// Hard per-verification timeout in milliseconds.
    /// On expiry the checker session is released and a timeout verdict is
    /// produced; this is the only cancellation mechanism.
    pub verify_timeout_ms: u64,

    /// How many similar theorems to fetch as lemma hints during synthesis.
    pub lemma_hint_count: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_proof_retries: 3,
            max_statement_retries: 2,
            max_infra_retries: 2,
            verify_timeout_ms: 30_000,
            lemma_hint_count: 5,
        }
    }
}

impl PipelineConfig {
    /// Set the proof-retry budget.
    pub fn with_max_proof_retries(mut self, retries: u32) -> Self {
        self.max_proof_retries = retries;
        self
    }

    /// Set the statement-retry budget.
    pub fn with_max_statement_retries(mut self, retries: u32) -> Self {
        self.max_statement_retries = retries;
        self
    }

    /// Set the infrastructure-retry budget.
    pub fn with_max_infra_retries(mut self, retries: u32) -> Self {
        self.max_infra_retries = retries;
        self
    }

    /// Set the verification timeout.
    pub fn with_verify_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.verify_timeout_ms = timeout_ms;
        self
    }

    /// Set the lemma hint fan-out.
    pub fn with_lemma_hint_count(mut self, count: usize) -> Self {
        self.lemma_hint_count = count;
        self
    }

    /// Upper bound on verification calls for one job under this config.
    ///
    /// Each of the (1 + max_statement_retries) statements gets at most
    /// (1 + max_proof_retries) budget-consuming verifications, and every
    /// one of those may be followed by at most one crash re-verification
    /// before a second consecutive crash gives up.
    pub fn max_verifications(&self) -> u64 {
        let per_statement = 1 + self.max_proof_retries as u64;
        let budgeted = (1 + self.max_statement_retries as u64) * per_statement;
        budgeted * 2 + 1
    }
}
