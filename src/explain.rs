//! Explanation generation for verified theorems.

use crate::error::Result;
use crate::services::NarrativeGenerator;
use std::sync::Arc;
use tracing::warn;

/// Wraps the narrative service. Only ever invoked on a verified
/// (statement, proof) pair; a failure here never invalidates the verified
/// result and can be retried later via the store's explanation backfill.
pub struct ExplanationGenerator {
    narrative: Arc<dyn NarrativeGenerator>,
}

impl ExplanationGenerator {
    /// Create a generator over the given narrative service.
    pub fn new(narrative: Arc<dyn NarrativeGenerator>) -> Self {
        Self { narrative }
    }

    /// Produce the step narrative, joined into one stored text.
    pub async fn explain(&self, statement: &str, proof: &str) -> Result<String> {
        let steps = self.narrative.describe(statement, proof).await?;
        Ok(steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step.trim()))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Best-effort variant: degrade to no explanation instead of erroring.
    pub async fn explain_or_none(&self, statement: &str, proof: &str) -> Option<String> {
        match self.explain(statement, proof).await {
            Ok(text) if !text.is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "narrative generation failed; leaving explanation empty");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;

    struct FixedNarrative(Vec<String>);

    #[async_trait]
    impl NarrativeGenerator for FixedNarrative {
        async fn describe(&self, _statement: &str, _proof: &str) -> Result<Vec<String>> {
            Ok(self.0.clone())
        }
    }

    struct DownNarrative;

    #[async_trait]
    impl NarrativeGenerator for DownNarrative {
        async fn describe(&self, _statement: &str, _proof: &str) -> Result<Vec<String>> {
            Err(Error::model_service("narrative", "connection refused"))
        }
    }

    #[tokio::test]
    async fn test_steps_numbered_in_order() {
        let gen = ExplanationGenerator::new(Arc::new(FixedNarrative(vec![
            "Define the position function.".into(),
            "Apply the definition at time t.".into(),
            "Close the goal by reflexivity.".into(),
        ])));

        let text = gen.explain("theorem t : P", "rfl").await.unwrap();
        assert_eq!(
            text,
            "1. Define the position function.\n2. Apply the definition at time t.\n3. Close the goal by reflexivity."
        );
    }

    #[tokio::test]
    async fn test_unavailable_service_degrades_to_none() {
        let gen = ExplanationGenerator::new(Arc::new(DownNarrative));
        assert!(gen.explain_or_none("theorem t : P", "rfl").await.is_none());
    }

    #[tokio::test]
    async fn test_empty_narrative_is_none() {
        let gen = ExplanationGenerator::new(Arc::new(FixedNarrative(vec![])));
        assert!(gen.explain_or_none("theorem t : P", "rfl").await.is_none());
    }
}
