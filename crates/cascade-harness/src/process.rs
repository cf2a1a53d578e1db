//! Subprocess execution with captured output and bounded wall-clock time.

use crate::error::{HarnessError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// One external command to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to launch.
    pub program: String,

    /// Arguments, in order.
    pub args: Vec<String>,

    /// Working directory; inherited from the harness when absent.
    pub cwd: Option<PathBuf>,

    /// Wall-clock limit; no limit when absent.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }
}

/// Captured output of a finished (or timed-out) subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    /// Exit code; `None` when the process was signal-killed or timed out.
    pub exit_code: Option<i32>,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Whether the wall-clock limit expired before the process finished.
    pub timed_out: bool,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl RunOutput {
    /// Whether the process ran to completion and exited 0.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs external commands and captures their output.
///
/// A non-zero exit code is a normal result. `Err` is reserved for
/// infrastructure failures: the program could not be launched at all.
/// On timeout the child is forcibly killed and `timed_out` is set, so a
/// hung subprocess can never block its worker indefinitely.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub async fn run(&self, spec: &CommandSpec) -> Result<RunOutput> {
        let start = Instant::now();

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }

        debug!(program = %spec.program, args = ?spec.args, "spawning subprocess");

        let child = cmd.spawn().map_err(|source| HarnessError::Spawn {
            command: spec.program.clone(),
            source,
        })?;

        let wait = child.wait_with_output();
        let output = match spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(done) => done?,
                Err(_) => {
                    // Dropping the wait future kills the child (kill_on_drop).
                    warn!(
                        program = %spec.program,
                        limit_ms = limit.as_millis() as u64,
                        "subprocess timed out"
                    );
                    return Ok(RunOutput {
                        exit_code: None,
                        stdout: String::new(),
                        stderr: String::new(),
                        timed_out: true,
                        duration_ms: start.elapsed().as_millis() as u64,
                    });
                }
            },
            None => wait.await?,
        };

        Ok(RunOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            timed_out: false,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout() {
        let spec = CommandSpec::new("echo").arg("hello");
        let out = ProcessRunner.run(&spec).await.expect("run failed");
        assert!(out.success());
        assert_eq!(out.exit_code, Some(0));
        assert!(out.stdout.contains("hello"));
        assert!(!out.timed_out);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_a_normal_result() {
        let spec = CommandSpec::new("false");
        let out = ProcessRunner.run(&spec).await.expect("run failed");
        assert!(!out.success());
        assert_ne!(out.exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let spec = CommandSpec::new("/nonexistent-binary-that-does-not-exist");
        let err = ProcessRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, HarnessError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_and_reports() {
        let spec = CommandSpec::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(100));
        let start = Instant::now();
        let out = ProcessRunner.run(&spec).await.expect("run failed");
        assert!(out.timed_out);
        assert_eq!(out.exit_code, None);
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "timeout did not bound wall-clock time"
        );
    }

    #[tokio::test]
    async fn test_cwd_is_respected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec = CommandSpec::new("pwd").cwd(dir.path());
        let out = ProcessRunner.run(&spec).await.expect("run failed");
        assert!(out.success());
        // Canonical paths can differ (e.g. /tmp symlinks); the leaf is stable.
        let leaf = dir
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .expect("leaf");
        assert!(out.stdout.contains(leaf));
    }
}
