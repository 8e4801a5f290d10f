//! Lean REPL subprocess checker.
//!
//! Production [`FormalChecker`] implementation driving the
//! leanprover-community REPL over JSON on stdin/stdout. See:
//! https://github.com/leanprover-community/repl
//!
//! The pipeline only ever sees the trait; process management, the line
//! protocol, and diagnostic classification all stay in here.

use crate::error::{Error, Result};
use crate::services::{CheckReport, FormalChecker, RejectionKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Configuration for the Lean checker subprocess.
#[derive(Debug, Clone)]
pub struct LeanCheckerConfig {
    /// Path to the REPL executable. If None, `repl` is looked up in PATH,
    /// falling back to `lake env repl` when a project root is set.
    pub repl_path: Option<PathBuf>,

    /// Lean project root (containing lakefile.lean). If None, runs in
    /// standalone mode without imports.
    pub project_root: Option<PathBuf>,

    /// Whether to echo the wire protocol at debug level.
    pub verbose: bool,
}

impl Default for LeanCheckerConfig {
    fn default() -> Self {
        Self {
            repl_path: None,
            project_root: None,
            verbose: false,
        }
    }
}

impl LeanCheckerConfig {
    /// Create a config rooted in a Lean project.
    pub fn with_project(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: Some(project_root.into()),
            ..Default::default()
        }
    }

    /// Set verbose wire logging.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[derive(Debug, Serialize)]
struct ReplCommand<'a> {
    cmd: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    env: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ReplResponse {
    #[serde(default)]
    env: Option<u64>,
    #[serde(default)]
    messages: Vec<ReplMessage>,
    #[serde(default)]
    sorries: Vec<ReplSorry>,
}

#[derive(Debug, Deserialize)]
struct ReplMessage {
    severity: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ReplSorry {
    #[serde(default)]
    goal: String,
}

impl ReplResponse {
    fn errors(&self) -> impl Iterator<Item = &ReplMessage> {
        self.messages.iter().filter(|m| m.severity == "error")
    }

    fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }
}

/// A live REPL subprocess with its pipes.
struct LeanSession {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl LeanSession {
    async fn roundtrip(&mut self, command: &ReplCommand<'_>) -> Result<ReplResponse> {
        let request = serde_json::to_string(command)?;
        self.stdin
            .write_all(request.as_bytes())
            .await
            .map_err(|e| Error::SubprocessComm(format!("Failed to write to Lean REPL: {}", e)))?;
        self.stdin
            .write_all(b"\n\n")
            .await
            .map_err(|e| Error::SubprocessComm(format!("Failed to write to Lean REPL: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| Error::SubprocessComm(format!("Failed to flush Lean REPL stdin: {}", e)))?;

        // The REPL answers with one JSON object, possibly pretty-printed,
        // terminated by a blank line.
        let mut payload = String::new();
        loop {
            let mut line = String::new();
            let read = self
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| Error::SubprocessComm(format!("Failed to read from Lean REPL: {}", e)))?;
            if read == 0 {
                return Err(Error::SubprocessComm(
                    "Lean REPL closed its stdout unexpectedly".to_string(),
                ));
            }
            if line.trim().is_empty() {
                if payload.trim().is_empty() {
                    continue;
                }
                break;
            }
            payload.push_str(&line);
        }

        serde_json::from_str(payload.trim()).map_err(|e| {
            Error::SubprocessComm(format!(
                "Failed to parse Lean REPL response: {} (payload: {})",
                e,
                payload.trim()
            ))
        })
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}

/// Checker backed by a Lean REPL subprocess.
///
/// The session is spawned lazily on first use and respawned after a fault,
/// so a crashed checker recovers on the next verification. The child is
/// killed when the checker is dropped.
pub struct LeanChecker {
    config: LeanCheckerConfig,
    session: Mutex<Option<LeanSession>>,
}

impl LeanChecker {
    /// Create a checker with the given configuration.
    pub fn new(config: LeanCheckerConfig) -> Self {
        Self {
            config,
            session: Mutex::new(None),
        }
    }

    fn build_command(&self) -> Result<Command> {
        if let Some(ref repl_path) = self.config.repl_path {
            let mut cmd = Command::new(repl_path);
            if let Some(ref root) = self.config.project_root {
                cmd.current_dir(root);
            }
            return Ok(cmd);
        }

        if let Ok(path) = which::which("repl") {
            let mut cmd = Command::new(path);
            if let Some(ref root) = self.config.project_root {
                cmd.current_dir(root);
            }
            return Ok(cmd);
        }

        if let Some(ref root) = self.config.project_root {
            let mut cmd = Command::new("lake");
            cmd.arg("env").arg("repl");
            cmd.current_dir(root);
            return Ok(cmd);
        }

        Err(Error::Config(
            "Lean REPL not found: set repl_path, add `repl` to PATH, or set project_root".into(),
        ))
    }

    fn spawn_session(&self) -> Result<LeanSession> {
        let mut cmd = self.build_command()?;
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::SubprocessComm(format!("Failed to spawn Lean REPL: {}", e)))?;

        let stdin = child.stdin.take().ok_or_else(|| {
            Error::SubprocessComm("Failed to get stdin handle for Lean REPL".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::SubprocessComm("Failed to get stdout handle for Lean REPL".to_string())
        })?;

        Ok(LeanSession {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Classify the REPL's output into a check report.
    fn classify(response: &ReplResponse) -> CheckReport {
        if response.has_errors() {
            let diagnostic = response
                .errors()
                .map(|m| m.data.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            let goal_state = extract_goal_state(&diagnostic);

            let kind = if diagnostic.contains("unsolved goals")
                || diagnostic.contains("tactic")
                || diagnostic.contains("simp")
            {
                RejectionKind::TacticFailure
            } else {
                RejectionKind::TypeError
            };
            return CheckReport::Rejected {
                kind,
                diagnostic,
                goal_state,
            };
        }

        if let Some(sorry) = response.sorries.first() {
            return CheckReport::Rejected {
                kind: RejectionKind::TacticFailure,
                diagnostic: "proof contains unfinished goals".to_string(),
                goal_state: Some(sorry.goal.clone()),
            };
        }

        CheckReport::Ok
    }
}

/// Pull the remaining goal out of an `unsolved goals` diagnostic.
fn extract_goal_state(diagnostic: &str) -> Option<String> {
    let (_, rest) = diagnostic.split_once("unsolved goals")?;
    let goal = rest.trim();
    if goal.is_empty() {
        None
    } else {
        Some(goal.to_string())
    }
}

#[async_trait]
impl FormalChecker for LeanChecker {
    async fn check(&self, statement: &str, proof: &str) -> Result<CheckReport> {
        // Proofs arrive as a tactic block (`by …`) or a bare term; either
        // way the REPL wants one full declaration.
        let body = proof.trim().trim_start_matches(":=").trim();
        let declaration = format!("{} := {}", statement, body);

        if self.config.verbose {
            debug!(%declaration, "submitting declaration to Lean REPL");
        }

        let mut guard = self.session.lock().await;

        // Respawn if there is no session yet or the previous one died.
        let alive = match &mut *guard {
            Some(s) => s.is_alive(),
            None => false,
        };
        let session = if alive {
            guard.as_mut().unwrap()
        } else {
            if guard.is_some() {
                warn!("Lean REPL session died; respawning");
            }
            guard.insert(self.spawn_session()?)
        };

        let command = ReplCommand {
            cmd: &declaration,
            env: None,
        };

        match session.roundtrip(&command).await {
            Ok(response) => {
                if self.config.verbose {
                    debug!(env = ?response.env, messages = response.messages.len(), "Lean REPL response");
                }
                Ok(Self::classify(&response))
            }
            Err(e) => {
                // Drop the broken session so the next check starts clean,
                // then surface the fault to the adapter.
                *guard = None;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(messages: Vec<(&str, &str)>, sorries: Vec<&str>) -> ReplResponse {
        ReplResponse {
            env: Some(1),
            messages: messages
                .into_iter()
                .map(|(severity, data)| ReplMessage {
                    severity: severity.to_string(),
                    data: data.to_string(),
                })
                .collect(),
            sorries: sorries
                .into_iter()
                .map(|goal| ReplSorry {
                    goal: goal.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_clean_response_is_ok() {
        let report = LeanChecker::classify(&response(vec![], vec![]));
        assert!(report.is_ok());
    }

    #[test]
    fn test_unsolved_goals_classified_as_tactic_failure() {
        let report = LeanChecker::classify(&response(
            vec![("error", "unsolved goals\n⊢ a + b = b + a")],
            vec![],
        ));
        match report {
            CheckReport::Rejected {
                kind,
                goal_state,
                ..
            } => {
                assert_eq!(kind, RejectionKind::TacticFailure);
                assert_eq!(goal_state.as_deref(), Some("⊢ a + b = b + a"));
            }
            CheckReport::Ok => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_unknown_identifier_classified_as_type_error() {
        let report = LeanChecker::classify(&response(
            vec![("error", "unknown identifier 'frobnicate'")],
            vec![],
        ));
        match report {
            CheckReport::Rejected { kind, .. } => assert_eq!(kind, RejectionKind::TypeError),
            CheckReport::Ok => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_sorry_counts_as_unfinished_proof() {
        let report = LeanChecker::classify(&response(vec![], vec!["⊢ P"]));
        match report {
            CheckReport::Rejected {
                kind,
                goal_state,
                ..
            } => {
                assert_eq!(kind, RejectionKind::TacticFailure);
                assert_eq!(goal_state.as_deref(), Some("⊢ P"));
            }
            CheckReport::Ok => panic!("expected rejection"),
        }
    }

    #[test]
    fn test_warnings_do_not_reject() {
        let report = LeanChecker::classify(&response(
            vec![("warning", "declaration uses 'partial'")],
            vec![],
        ));
        assert!(report.is_ok());
    }

    #[test]
    fn test_goal_state_extraction_handles_absence() {
        assert_eq!(extract_goal_state("type mismatch"), None);
        assert_eq!(extract_goal_state("unsolved goals"), None);
        assert_eq!(
            extract_goal_state("unsolved goals\n⊢ False").as_deref(),
            Some("⊢ False")
        );
    }

    // Integration tests require a Lean toolchain.
    #[tokio::test]
    #[ignore = "requires Lean REPL installed"]
    async fn test_check_against_live_repl() {
        let checker = LeanChecker::new(LeanCheckerConfig::default());
        let report = checker
            .check("theorem t : 1 + 1 = 2", "by norm_num")
            .await
            .unwrap();
        assert!(report.is_ok());
    }
}
