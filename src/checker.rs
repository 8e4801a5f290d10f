//! Verifier adapter: one scoped, time-bounded checker invocation.
//!
//! Wraps the external checker as a scoped operation: a session is acquired,
//! the pair is submitted, and the session is released on every exit path.
//! Retry policy does not live here; the repair loop owns it.

use crate::job::{Verdict, VerdictOutcome};
use crate::services::{CheckReport, FormalChecker, RejectionKind};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Counters for checker session accounting.
///
/// `active` must return to zero after every verification, including
/// timeouts and crashes; tests assert on this to prove no session leaks.
#[derive(Debug, Default)]
pub struct SessionGauge {
    active: AtomicUsize,
    acquired: AtomicU64,
}

impl SessionGauge {
    /// Sessions currently held.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Sessions acquired over the adapter's lifetime.
    pub fn acquired_total(&self) -> u64 {
        self.acquired.load(Ordering::SeqCst)
    }
}

/// Releases the session when dropped, whatever the exit path.
struct SessionGuard {
    gauge: Arc<SessionGauge>,
}

impl SessionGuard {
    fn acquire(gauge: Arc<SessionGauge>) -> Self {
        gauge.active.fetch_add(1, Ordering::SeqCst);
        gauge.acquired.fetch_add(1, Ordering::SeqCst);
        Self { gauge }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.gauge.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Adapter from the raw checker service to structured verdicts.
pub struct CheckerAdapter {
    checker: Arc<dyn FormalChecker>,
    sessions: Arc<SessionGauge>,
}

impl CheckerAdapter {
    /// Create an adapter over the given checker service.
    pub fn new(checker: Arc<dyn FormalChecker>) -> Self {
        Self {
            checker,
            sessions: Arc::new(SessionGauge::default()),
        }
    }

    /// Session accounting, for tests and metrics.
    pub fn sessions(&self) -> Arc<SessionGauge> {
        Arc::clone(&self.sessions)
    }

    /// Submit one (statement, proof) pair and produce exactly one verdict.
    ///
    /// The hard `timeout_ms` budget is the only cancellation mechanism: on
    /// expiry the in-flight check is abandoned, the session released, and a
    /// timeout verdict returned. A process-level checker fault becomes a
    /// `checker_crash` verdict, distinct from semantic rejection. This
    /// method never retries and never errors; policy is the caller's.
    pub async fn verify(&self, statement: &str, proof: &str, timeout_ms: u64) -> Verdict {
        let _session = SessionGuard::acquire(Arc::clone(&self.sessions));
        let start = Instant::now();

        let outcome = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.checker.check(statement, proof),
        )
        .await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(CheckReport::Ok)) => {
                debug!(elapsed_ms, "checker accepted candidate");
                Verdict::success(elapsed_ms)
            }
            Ok(Ok(CheckReport::Rejected {
                kind,
                diagnostic,
                goal_state,
            })) => {
                debug!(elapsed_ms, kind = ?kind, "checker rejected candidate");
                let outcome = match kind {
                    RejectionKind::TypeError => VerdictOutcome::TypeError,
                    RejectionKind::TacticFailure => VerdictOutcome::TacticFailure,
                };
                Verdict::rejected(outcome, diagnostic, goal_state, elapsed_ms)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "checker session faulted");
                Verdict::crashed(e.to_string(), elapsed_ms)
            }
            Err(_) => {
                warn!(timeout_ms, "verification exceeded its time budget");
                Verdict::timed_out(timeout_ms)
            }
        }
    }
}
