//! Invocation of the compiler under test.

use crate::diagnostics::{parse_diagnostics, Diagnostic};
use crate::error::Result;
use crate::process::{CommandSpec, ProcessRunner};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// What a build produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Compiler,
    Stdlib,
    TestBinary,
}

/// A compiled binary or library. Immutable once created; lives inside the
/// current workspace generation and disappears with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildArtifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub built_at: DateTime<Utc>,
}

impl BuildArtifact {
    pub fn new(path: PathBuf, kind: ArtifactKind) -> Self {
        Self {
            path,
            kind,
            built_at: Utc::now(),
        }
    }
}

/// Outcome of one compiler invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileOutcome {
    /// Present iff the compiler exited 0.
    pub artifact: Option<BuildArtifact>,

    /// Diagnostics in emission order, stdout stream first.
    pub diagnostics: Vec<Diagnostic>,

    /// Compiler exit code; `None` on signal-death or timeout.
    pub exit_code: Option<i32>,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl CompileOutcome {
    pub fn succeeded(&self) -> bool {
        self.artifact.is_some()
    }
}

/// Compilation seam between the scheduler and the real compiler.
///
/// Inject a deterministic stub in tests; production wires up
/// [`CompilerInvoker`].
#[async_trait]
pub trait Compile: Send + Sync {
    async fn compile(&self, files: &[PathBuf], output: &Path) -> Result<CompileOutcome>;
}

/// Runs the Cascade compiler: `cascadec <files...> -o <output>`.
///
/// A non-zero compiler exit never yields an artifact, whatever the code's
/// value; diagnostics are returned either way. A failed compile with zero
/// parsed diagnostics is itself reportable; nothing is invented to fill
/// the gap.
#[derive(Debug, Clone)]
pub struct CompilerInvoker {
    compiler: PathBuf,
    runner: ProcessRunner,
    timeout: Option<Duration>,
}

impl CompilerInvoker {
    pub fn new(compiler: impl Into<PathBuf>) -> Self {
        Self {
            compiler: compiler.into(),
            runner: ProcessRunner,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }
}

#[async_trait]
impl Compile for CompilerInvoker {
    async fn compile(&self, files: &[PathBuf], output: &Path) -> Result<CompileOutcome> {
        let mut spec = CommandSpec::new(self.compiler.to_string_lossy());
        for file in files {
            spec = spec.arg(file.to_string_lossy());
        }
        spec = spec.arg("-o").arg(output.to_string_lossy());
        if let Some(limit) = self.timeout {
            spec = spec.timeout(limit);
        }

        let run = self.runner.run(&spec).await?;

        let mut diagnostics = parse_diagnostics(&run.stdout);
        diagnostics.extend(parse_diagnostics(&run.stderr));

        let artifact = if run.success() {
            Some(BuildArtifact::new(
                output.to_path_buf(),
                ArtifactKind::TestBinary,
            ))
        } else {
            None
        };

        debug!(
            compiler = %self.compiler.display(),
            exit_code = ?run.exit_code,
            diagnostics = diagnostics.len(),
            "compiler invocation finished"
        );

        Ok(CompileOutcome {
            artifact,
            diagnostics,
            exit_code: run.exit_code,
            duration_ms: run.duration_ms,
        })
    }
}
