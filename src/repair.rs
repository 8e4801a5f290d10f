//! Repair loop policy: bounded retry decisions after a failed verdict.
//!
//! The policy separates "the proof is wrong" (cheap, frequent, retry the
//! proof only) from "the statement formalization is wrong" (expensive,
//! retry from translation), bounding each independently so every job
//! terminates.

use crate::config::PipelineConfig;
use crate::job::{Job, Verdict, VerdictOutcome};
use crate::services::RepairContext;
use serde::{Deserialize, Serialize};

/// What the orchestrator should do after a non-success verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RepairAction {
    /// Ask the synthesizer for a new proof of the same statement, feeding
    /// back the verdict's diagnostic and goal state.
    ResynthesizeProof { repair_context: RepairContext },
    /// Advance to the next-ranked candidate statement and restart proof
    /// synthesis with a fresh proof sub-budget.
    RetranslateStatement,
    /// Re-submit the same candidate after a lone checker crash; the crash
    /// was an infrastructure fault, not evidence against the proof.
    ReverifyCandidate,
    /// All budgets exhausted, or the checker crashed twice in a row.
    GiveUp,
}

/// Bounded repair policy. Pure decision logic; the orchestrator applies
/// the bookkeeping via [`RepairPolicy::apply`].
#[derive(Debug, Clone)]
pub struct RepairPolicy {
    max_proof_retries: u32,
    max_statement_retries: u32,
}

impl RepairPolicy {
    /// Build the policy from pipeline configuration.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_proof_retries: config.max_proof_retries,
            max_statement_retries: config.max_statement_retries,
        }
    }

    /// Decide the next action for a job whose newest candidate drew a
    /// non-success verdict. `has_untried_statement` reports whether the
    /// translator's ranked queue still holds an untried statement.
    pub fn decide(&self, job: &Job, verdict: &Verdict, has_untried_statement: bool) -> RepairAction {
        debug_assert!(
            !verdict.outcome.is_success(),
            "repair policy invoked on a success verdict"
        );

        match verdict.outcome {
            VerdictOutcome::Success => RepairAction::GiveUp,
            VerdictOutcome::CheckerCrash => {
                if job.consecutive_crashes >= 2 {
                    RepairAction::GiveUp
                } else {
                    RepairAction::ReverifyCandidate
                }
            }
            VerdictOutcome::TypeError | VerdictOutcome::TacticFailure => {
                if job.proof_retries < self.max_proof_retries {
                    RepairAction::ResynthesizeProof {
                        repair_context: RepairContext {
                            diagnostic: verdict.diagnostic.clone(),
                            goal_state: verdict.goal_state.clone(),
                            prefer_simple_tactics: false,
                        },
                    }
                } else {
                    self.statement_fallback(job, has_untried_statement)
                }
            }
            VerdictOutcome::Timeout => {
                // Counts toward the same proof budget, but steers the next
                // synthesis toward cheaper tactics.
                if job.proof_retries < self.max_proof_retries {
                    RepairAction::ResynthesizeProof {
                        repair_context: RepairContext {
                            diagnostic: verdict.diagnostic.clone(),
                            goal_state: verdict.goal_state.clone(),
                            prefer_simple_tactics: true,
                        },
                    }
                } else {
                    self.statement_fallback(job, has_untried_statement)
                }
            }
        }
    }

    fn statement_fallback(&self, job: &Job, has_untried_statement: bool) -> RepairAction {
        if has_untried_statement && job.statement_retries < self.max_statement_retries {
            RepairAction::RetranslateStatement
        } else {
            RepairAction::GiveUp
        }
    }

    /// Apply an action's budget bookkeeping to the job.
    pub fn apply(&self, job: &mut Job, action: &RepairAction) {
        match action {
            RepairAction::ResynthesizeProof { .. } => {
                job.proof_retries += 1;
            }
            RepairAction::RetranslateStatement => {
                job.statement_retries += 1;
                // Fresh proof sub-budget for the new statement.
                job.proof_retries = 0;
            }
            RepairAction::ReverifyCandidate | RepairAction::GiveUp => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::InputKind;
    use proptest::prelude::*;

    fn policy() -> RepairPolicy {
        RepairPolicy::from_config(&PipelineConfig::default())
    }

    fn job() -> Job {
        let mut job = Job::new(InputKind::Natural, "input");
        job.push_candidate("theorem t : P", None);
        job
    }

    fn tactic_failure() -> Verdict {
        Verdict::rejected(
            VerdictOutcome::TacticFailure,
            "simp made no progress",
            Some("⊢ P".into()),
            10,
        )
    }

    #[test]
    fn test_tactic_failure_resynthesizes_with_context() {
        let action = policy().decide(&job(), &tactic_failure(), false);
        match action {
            RepairAction::ResynthesizeProof { repair_context } => {
                assert_eq!(repair_context.diagnostic, "simp made no progress");
                assert_eq!(repair_context.goal_state.as_deref(), Some("⊢ P"));
                assert!(!repair_context.prefer_simple_tactics);
            }
            other => panic!("expected ResynthesizeProof, got {:?}", other),
        }
    }

    #[test]
    fn test_timeout_prefers_simple_tactics() {
        let action = policy().decide(&job(), &Verdict::timed_out(30_000), false);
        match action {
            RepairAction::ResynthesizeProof { repair_context } => {
                assert!(repair_context.prefer_simple_tactics);
            }
            other => panic!("expected ResynthesizeProof, got {:?}", other),
        }
    }

    #[test]
    fn test_exhausted_proof_budget_advances_statement() {
        let mut j = job();
        j.proof_retries = 3;

        // An untried ranked statement remains: advance to it.
        assert!(matches!(
            policy().decide(&j, &tactic_failure(), true),
            RepairAction::RetranslateStatement
        ));

        // None left: give up.
        assert!(matches!(
            policy().decide(&j, &tactic_failure(), false),
            RepairAction::GiveUp
        ));
    }

    #[test]
    fn test_statement_budget_bounds_retranslation() {
        let mut j = job();
        j.proof_retries = 3;
        j.statement_retries = 2;

        assert!(matches!(
            policy().decide(&j, &tactic_failure(), true),
            RepairAction::GiveUp
        ));
    }

    #[test]
    fn test_single_crash_reverifies_second_gives_up() {
        let mut j = job();
        j.consecutive_crashes = 1;
        assert!(matches!(
            policy().decide(&j, &Verdict::crashed("boom", 5), true),
            RepairAction::ReverifyCandidate
        ));

        j.consecutive_crashes = 2;
        assert!(matches!(
            policy().decide(&j, &Verdict::crashed("boom", 5), true),
            RepairAction::GiveUp
        ));
    }

    #[test]
    fn test_apply_bookkeeping() {
        let p = policy();
        let mut j = job();

        p.apply(
            &mut j,
            &RepairAction::ResynthesizeProof {
                repair_context: RepairContext {
                    diagnostic: "d".into(),
                    goal_state: None,
                    prefer_simple_tactics: false,
                },
            },
        );
        assert_eq!(j.proof_retries, 1);

        j.proof_retries = 3;
        p.apply(&mut j, &RepairAction::RetranslateStatement);
        assert_eq!(j.statement_retries, 1);
        assert_eq!(j.proof_retries, 0);

        p.apply(&mut j, &RepairAction::ReverifyCandidate);
        assert_eq!(j.proof_retries, 0);
        assert_eq!(j.statement_retries, 1);
    }

    fn adversarial_verdict(choice: u8) -> Verdict {
        match choice % 4 {
            0 => tactic_failure(),
            1 => Verdict::rejected(VerdictOutcome::TypeError, "bad type", None, 10),
            2 => Verdict::timed_out(1_000),
            _ => Verdict::crashed("boom", 5),
        }
    }

    proptest! {
        /// Termination: no adversarial verdict sequence keeps a job alive
        /// past the configured verification bound.
        #[test]
        fn prop_policy_terminates(choices in proptest::collection::vec(0u8..4, 0..256)) {
            let config = PipelineConfig::default();
            let p = RepairPolicy::from_config(&config);
            let mut j = job();
            // Pretend the translator produced plenty of ranked statements;
            // the statement budget must still bound the loop.
            let has_untried = true;

            let mut verifications: u64 = 1; // the initial candidate
            let mut gave_up = false;
            for choice in choices {
                let verdict = adversarial_verdict(choice);
                // Mirror the orchestrator's crash bookkeeping.
                if verdict.outcome == VerdictOutcome::CheckerCrash {
                    j.consecutive_crashes += 1;
                } else {
                    j.consecutive_crashes = 0;
                }

                let action = p.decide(&j, &verdict, has_untried);
                match action {
                    RepairAction::GiveUp => {
                        gave_up = true;
                        break;
                    }
                    _ => {
                        p.apply(&mut j, &action);
                        verifications += 1;
                    }
                }
                prop_assert!(verifications <= config.max_verifications());
            }

            // Either the adversary ran out of moves or the policy gave up
            // within budget.
            prop_assert!(gave_up || verifications <= config.max_verifications());
        }
    }
}
