//! Proof synthesis: statement to candidate proof, with lemma reuse.

use crate::error::Result;
use crate::services::{LemmaHint, RepairContext, TacticSynthesizer};
use crate::store::SqliteTheoremStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Wraps the tactic synthesis service and, when a store is attached,
/// seeds each call with structurally similar verified theorems.
///
/// The store consultation is read-only and best-effort: a store error
/// degrades to synthesis without hints, it never fails the call.
pub struct ProofSynthesizer {
    synthesizer: Arc<dyn TacticSynthesizer>,
    store: Option<Arc<SqliteTheoremStore>>,
    hint_count: usize,
}

impl ProofSynthesizer {
    /// Create a synthesizer without lemma hints.
    pub fn new(synthesizer: Arc<dyn TacticSynthesizer>) -> Self {
        Self {
            synthesizer,
            store: None,
            hint_count: 0,
        }
    }

    /// Attach a theorem store for lemma-reuse hints.
    pub fn with_store(mut self, store: Arc<SqliteTheoremStore>, hint_count: usize) -> Self {
        self.store = Some(store);
        self.hint_count = hint_count;
        self
    }

    /// Produce a candidate proof for the statement.
    ///
    /// `repair` carries the previous verdict's diagnostic and goal state;
    /// when present it is the primary signal, since most failures are
    /// proof-script errors rather than statement errors. Outputs are not
    /// reproducible across calls.
    pub async fn synthesize(
        &self,
        statement: &str,
        repair: Option<&RepairContext>,
    ) -> Result<String> {
        let hints = self.lemma_hints(statement);
        debug!(
            hints = hints.len(),
            repairing = repair.is_some(),
            "requesting proof synthesis"
        );
        self.synthesizer.propose(statement, repair, &hints).await
    }

    fn lemma_hints(&self, statement: &str) -> Vec<LemmaHint> {
        let Some(store) = &self.store else {
            return Vec::new();
        };

        match store.similar(statement, self.hint_count) {
            Ok(records) => records
                .into_iter()
                .map(|r| LemmaHint {
                    statement: r.statement,
                    proof: r.proof,
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "theorem store lookup failed; synthesizing without hints");
                Vec::new()
            }
        }
    }
}
