// src/exec.rs

//! Privileged command execution
//!
//! Every package manager, kernel tool and snapshot call goes through a
//! [`CommandExecutor`]. The orchestrator never interprets what a command does;
//! it only looks at the exit status and, on failure, the captured text.
//!
//! - Privileged commands are prefixed with `sudo` unless already root
//! - stdin is nulled so interactive prompts cannot hang a run
//! - An optional wall-clock timeout kills the child when it expires

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// A command to run, as an argument vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program followed by its arguments
    pub argv: Vec<String>,
    /// Human-readable label used in logs
    pub description: String,
    /// Needs root (gets a `sudo` prefix when not already root)
    pub privileged: bool,
    /// Wall-clock bound; `None` runs to completion
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        let description = argv.join(" ");
        Self {
            argv,
            description,
            privileged: false,
            timeout: None,
        }
    }

    /// Mark as requiring root
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Set the log label
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Bound the run time
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program name (first argv element)
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }

    /// The full command line joined with spaces
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.privileged {
            write!(f, "[root] {}", self.command_line())
        } else {
            write!(f, "{}", self.command_line())
        }
    }
}

/// Captured result of a finished (or abandoned) command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal or timed out
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Successful exit with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Failed exit with the given code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(code),
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    /// Abandoned after the timeout expired
    pub fn timed_out() -> Self {
        Self {
            timed_out: true,
            ..Self::default()
        }
    }

    pub fn success(&self) -> bool {
        !self.timed_out && self.status == Some(0)
    }

    /// Text used for error classification: stderr, else stdout
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        if self.timed_out {
            "Command timed out".to_string()
        } else {
            "Unknown error".to_string()
        }
    }

    /// Reduce to the uniform phase outcome
    pub fn outcome(&self) -> PhaseOutcome {
        if self.success() {
            PhaseOutcome::ok()
        } else {
            PhaseOutcome::failed(self.error_text())
        }
    }
}

/// Uniform result every backend invocation and every phase reduces to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseOutcome {
    pub success: bool,
    pub error_text: Option<String>,
}

impl PhaseOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error_text: None,
        }
    }

    pub fn failed(error_text: impl Into<String>) -> Self {
        Self {
            success: false,
            error_text: Some(error_text.into()),
        }
    }

    /// Join several outcomes: failed if any failed, error texts concatenated
    pub fn combine(outcomes: impl IntoIterator<Item = PhaseOutcome>) -> Self {
        let errors: Vec<String> = outcomes
            .into_iter()
            .filter(|o| !o.success)
            .map(|o| o.error_text.unwrap_or_else(|| "Unknown error".to_string()))
            .collect();

        if errors.is_empty() {
            Self::ok()
        } else {
            Self::failed(errors.join("\n"))
        }
    }

    pub fn error_text(&self) -> &str {
        self.error_text.as_deref().unwrap_or("")
    }
}

/// Runs external commands on behalf of the orchestrator
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion (or until its timeout)
    ///
    /// A non-zero exit is not an error; only failing to start the command is.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Whether an external tool is installed
    fn tool_available(&self, tool: &str) -> bool;

    /// Run and reduce to an outcome, folding spawn errors into a failure
    async fn outcome(&self, spec: &CommandSpec) -> PhaseOutcome {
        match self.run(spec).await {
            Ok(output) => {
                if !output.success() {
                    debug!("{} failed: {}", spec.description, output.error_text());
                }
                output.outcome()
            }
            Err(e) => {
                warn!("{}: {}", spec.description, e);
                PhaseOutcome::failed(e.to_string())
            }
        }
    }
}

/// Executor backed by real processes
pub struct SystemExecutor {
    use_sudo: bool,
}

impl SystemExecutor {
    pub fn new(use_sudo: bool) -> Self {
        Self { use_sudo }
    }

    /// Final argv after the privilege prefix is applied
    fn resolve(&self, spec: &CommandSpec) -> Vec<String> {
        let needs_sudo = spec.privileged && self.use_sudo && !nix::unistd::geteuid().is_root();
        if needs_sudo {
            std::iter::once("sudo".to_string())
                .chain(spec.argv.iter().cloned())
                .collect()
        } else {
            spec.argv.clone()
        }
    }
}

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let argv = self.resolve(spec);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::Config(format!("empty command for '{}'", spec.description)))?;

        debug!("Running: {}", argv.join(" "));

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                command: spec.command_line(),
                source,
            })?;

        let wait = child.wait_with_output();
        let output = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result?,
                Err(_) => {
                    // Dropping the wait future drops the child, which kills it
                    warn!(
                        "{} timed out after {} seconds",
                        spec.description,
                        limit.as_secs()
                    );
                    return Ok(CommandOutput::timed_out());
                }
            },
            None => wait.await?,
        };

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            timed_out: false,
        })
    }

    fn tool_available(&self, tool: &str) -> bool {
        // The baseline backend is assumed present on any Arch system
        tool == crate::helpers::BASELINE_HELPER || which::which(tool).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builder() {
        let spec = CommandSpec::new(["pacman", "-S"])
            .args(["--needed", "nodejs"])
            .privileged()
            .timeout(Duration::from_secs(5));

        assert_eq!(spec.program(), "pacman");
        assert_eq!(spec.command_line(), "pacman -S --needed nodejs");
        assert_eq!(spec.to_string(), "[root] pacman -S --needed nodejs");
        assert_eq!(spec.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_error_text_prefers_stderr() {
        let output = CommandOutput {
            status: Some(1),
            stdout: "some progress\n".to_string(),
            stderr: "error: target not found: foo\n".to_string(),
            timed_out: false,
        };
        assert!(!output.success());
        assert_eq!(output.error_text(), "error: target not found: foo");

        let output = CommandOutput {
            status: Some(1),
            stdout: "error: failed retrieving file".to_string(),
            ..CommandOutput::default()
        };
        assert_eq!(output.error_text(), "error: failed retrieving file");
        assert_eq!(CommandOutput::failed(1, "").error_text(), "Unknown error");
    }

    #[test]
    fn test_timeout_is_failure() {
        let output = CommandOutput::timed_out();
        assert!(!output.success());
        assert_eq!(output.outcome(), PhaseOutcome::failed("Command timed out"));
    }

    #[test]
    fn test_combine_outcomes() {
        let combined = PhaseOutcome::combine([PhaseOutcome::ok(), PhaseOutcome::ok()]);
        assert!(combined.success);

        let combined = PhaseOutcome::combine([
            PhaseOutcome::failed("first"),
            PhaseOutcome::ok(),
            PhaseOutcome::failed("second"),
        ]);
        assert!(!combined.success);
        assert_eq!(combined.error_text(), "first\nsecond");
    }

    #[test]
    fn test_resolve_without_sudo() {
        let executor = SystemExecutor::new(false);
        let spec = CommandSpec::new(["pacman", "-Syu"]).privileged();
        assert_eq!(executor.resolve(&spec), vec!["pacman", "-Syu"]);
    }
}
