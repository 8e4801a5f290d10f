//! Statement translation: raw input to ranked formal statements.
//!
//! For `formal` input the translator is a parse check only. For `natural`
//! and `latex` input it calls the formalizer service and returns a ranked
//! queue of candidate statements the repair loop can advance through.

use crate::error::{Error, Result, TranslationErrorReason};
use crate::job::InputKind;
use crate::services::{LanguageFormalizer, RankedStatement, TranslationContext};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Accepts `theorem`/`lemma`/`example` declarations with a name and a type
/// ascription, the statement surface the checker understands.
fn statement_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(theorem|lemma|example)\s+[A-Za-z_][A-Za-z0-9_']*[^:]*:\s*\S")
            .expect("statement pattern is valid")
    })
}

/// Syntactic validation of a formal statement: declaration shape plus
/// balanced delimiters. Not a type check; the checker owns semantics.
pub fn parse_check(statement: &str) -> bool {
    if !statement_pattern().is_match(statement) {
        return false;
    }

    let mut depth_paren = 0i32;
    let mut depth_bracket = 0i32;
    let mut depth_brace = 0i32;
    for ch in statement.chars() {
        match ch {
            '(' => depth_paren += 1,
            ')' => depth_paren -= 1,
            '[' => depth_bracket += 1,
            ']' => depth_bracket -= 1,
            '{' => depth_brace += 1,
            '}' => depth_brace -= 1,
            _ => {}
        }
        if depth_paren < 0 || depth_bracket < 0 || depth_brace < 0 {
            return false;
        }
    }
    depth_paren == 0 && depth_bracket == 0 && depth_brace == 0
}

/// Ranked candidate statements with a cursor for the repair loop.
///
/// Best-first order; `advance` moves to the next-ranked statement when the
/// proof budget for the current one is exhausted.
#[derive(Debug, Clone)]
pub struct StatementQueue {
    statements: Vec<RankedStatement>,
    cursor: usize,
}

impl StatementQueue {
    fn new(mut statements: Vec<RankedStatement>) -> Self {
        statements.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Self {
            statements,
            cursor: 0,
        }
    }

    /// The statement currently in play.
    pub fn current(&self) -> &RankedStatement {
        &self.statements[self.cursor]
    }

    /// Move to the next-ranked statement, if one remains.
    pub fn advance(&mut self) -> Option<&RankedStatement> {
        if self.cursor + 1 < self.statements.len() {
            self.cursor += 1;
            Some(&self.statements[self.cursor])
        } else {
            None
        }
    }

    /// Whether an untried statement remains after the current one.
    pub fn has_untried(&self) -> bool {
        self.cursor + 1 < self.statements.len()
    }

    /// Number of candidate statements.
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Whether the queue is empty. Never true for a queue returned by
    /// [`StatementTranslator::translate`].
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Wraps the formalizer service. Pure function of input plus optional
/// prior-failure context; no side effects.
pub struct StatementTranslator {
    formalizer: Arc<dyn LanguageFormalizer>,
}

impl StatementTranslator {
    /// Create a translator over the given formalizer service.
    pub fn new(formalizer: Arc<dyn LanguageFormalizer>) -> Self {
        Self { formalizer }
    }

    /// Translate raw input into a ranked statement queue.
    pub async fn translate(
        &self,
        input_kind: InputKind,
        text: &str,
        context: Option<&TranslationContext>,
    ) -> Result<StatementQueue> {
        match input_kind {
            InputKind::Formal => self.validate_formal(text),
            InputKind::Natural | InputKind::Latex => {
                self.translate_informal(input_kind, text, context).await
            }
        }
    }

    /// Formal input: syntactic validation only, at most one candidate.
    fn validate_formal(&self, text: &str) -> Result<StatementQueue> {
        let trimmed = text.trim();
        if !parse_check(trimmed) {
            return Err(Error::translation(
                TranslationErrorReason::Unparseable,
                "formal input failed the parse check",
            ));
        }
        Ok(StatementQueue::new(vec![RankedStatement::new(
            trimmed, 1.0,
        )]))
    }

    async fn translate_informal(
        &self,
        input_kind: InputKind,
        text: &str,
        context: Option<&TranslationContext>,
    ) -> Result<StatementQueue> {
        let candidates = self.formalizer.translate(input_kind, text, context).await?;
        debug!(
            kind = %input_kind,
            candidates = candidates.len(),
            "formalizer returned candidates"
        );

        let mut valid = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if parse_check(&candidate.text) {
                valid.push(candidate);
            } else {
                warn!(statement = %candidate.text, "dropping malformed candidate statement");
            }
        }

        if valid.is_empty() {
            return Err(Error::translation(
                TranslationErrorReason::Unparseable,
                "formalizer produced no parseable statement",
            ));
        }
        Ok(StatementQueue::new(valid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedFormalizer {
        statements: Vec<RankedStatement>,
    }

    #[async_trait]
    impl LanguageFormalizer for FixedFormalizer {
        async fn translate(
            &self,
            _input_kind: InputKind,
            _text: &str,
            _context: Option<&TranslationContext>,
        ) -> Result<Vec<RankedStatement>> {
            Ok(self.statements.clone())
        }
    }

    #[test]
    fn test_parse_check_accepts_declarations() {
        assert!(parse_check("theorem add_zero (n : Nat) : n + 0 = n"));
        assert!(parse_check("lemma pos_of_sq (x : ℝ) : x ^ 2 ≥ 0"));
        assert!(parse_check(
            "theorem motion (m F : ℝ) : ∃ (x : ℝ → ℝ), ∀ t, x t = (F / (2 * m)) * t ^ 2"
        ));
    }

    #[test]
    fn test_parse_check_rejects_malformed() {
        assert!(!parse_check("prove that squares are positive"));
        assert!(!parse_check("theorem missing_type"));
        assert!(!parse_check("theorem unbalanced (n : Nat : n + 0 = n"));
        assert!(!parse_check("theorem stray ) : 1 = 1"));
    }

    #[tokio::test]
    async fn test_formal_input_is_parse_check_only() {
        // The formalizer would panic if called; formal input must not reach it.
        struct Unreachable;
        #[async_trait]
        impl LanguageFormalizer for Unreachable {
            async fn translate(
                &self,
                _: InputKind,
                _: &str,
                _: Option<&TranslationContext>,
            ) -> Result<Vec<RankedStatement>> {
                panic!("formal input must not call the formalizer");
            }
        }

        let translator = StatementTranslator::new(Arc::new(Unreachable));
        let queue = translator
            .translate(InputKind::Formal, "theorem t : 1 = 1", None)
            .await
            .unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.current().text, "theorem t : 1 = 1");

        let err = translator
            .translate(InputKind::Formal, "not a statement", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Translation {
                reason: TranslationErrorReason::Unparseable,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_candidates_ranked_best_first() {
        let translator = StatementTranslator::new(Arc::new(FixedFormalizer {
            statements: vec![
                RankedStatement::new("theorem low : 1 = 1", 0.2),
                RankedStatement::new("theorem high : 2 = 2", 0.9),
                RankedStatement::new("theorem mid : 3 = 3", 0.5),
            ],
        }));

        let mut queue = translator
            .translate(InputKind::Natural, "something", None)
            .await
            .unwrap();
        assert_eq!(queue.current().text, "theorem high : 2 = 2");
        assert_eq!(queue.advance().unwrap().text, "theorem mid : 3 = 3");
        assert_eq!(queue.advance().unwrap().text, "theorem low : 1 = 1");
        assert!(queue.advance().is_none());
    }

    #[tokio::test]
    async fn test_malformed_candidates_dropped() {
        let translator = StatementTranslator::new(Arc::new(FixedFormalizer {
            statements: vec![
                RankedStatement::new("not formal at all", 0.9),
                RankedStatement::new("theorem ok : 1 = 1", 0.4),
            ],
        }));

        let queue = translator
            .translate(InputKind::Latex, "x = x", None)
            .await
            .unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.current().text, "theorem ok : 1 = 1");
    }

    #[tokio::test]
    async fn test_all_malformed_is_unparseable() {
        let translator = StatementTranslator::new(Arc::new(FixedFormalizer {
            statements: vec![RankedStatement::new("garbage", 0.9)],
        }));

        let err = translator
            .translate(InputKind::Natural, "x", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Translation {
                reason: TranslationErrorReason::Unparseable,
                ..
            }
        ));
    }
}
