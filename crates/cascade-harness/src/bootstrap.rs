//! Two-phase toolchain bootstrap: the compiler itself, then the standard
//! library built with it.
//!
//! Phase 2 is entered only from `CompilerBuilt`; a failed compiler build
//! leaves the stdlib phase unattempted and the test scheduler never runs.
//! Phase success is strictly "subprocess exit code equals zero"; build
//! output is captured for the report but never parsed for success.

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::invoker::{ArtifactKind, BuildArtifact};
use crate::process::{CommandSpec, ProcessRunner, RunOutput};
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    Compiler,
    Stdlib,
}

/// Bootstrap state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapStatus {
    NotStarted,
    CompilerBuilding,
    CompilerBuilt,
    CompilerFailed,
    StdlibBuilding,
    StdlibBuilt,
    StdlibFailed,
}

impl BootstrapStatus {
    /// Terminal success: both phases built.
    pub fn succeeded(&self) -> bool {
        matches!(self, BootstrapStatus::StdlibBuilt)
    }

    /// Terminal failure: one of the phases stopped the run.
    pub fn failed(&self) -> bool {
        matches!(
            self,
            BootstrapStatus::CompilerFailed | BootstrapStatus::StdlibFailed
        )
    }
}

/// Result of one bootstrap phase, recorded on success and failure alike so
/// the report can show build time and flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub phase: BuildPhase,
    pub succeeded: bool,

    /// Exit code of the step that decided the phase.
    pub exit_code: Option<i32>,

    /// Combined output of the phase's subprocesses.
    pub log: String,

    /// Digest of the log, for compact report references.
    pub log_digest: String,

    /// Flag set the phase ran with.
    pub flags: Vec<String>,

    pub duration_ms: u64,
}

impl BuildOutcome {
    fn new(
        phase: BuildPhase,
        succeeded: bool,
        exit_code: Option<i32>,
        log: String,
        flags: Vec<String>,
        duration_ms: u64,
    ) -> Self {
        let log_digest = hex::encode(Sha256::digest(log.as_bytes()));
        Self {
            phase,
            succeeded,
            exit_code,
            log,
            log_digest,
            flags,
            duration_ms,
        }
    }
}

/// Final state of the whole bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapOutcome {
    pub status: BootstrapStatus,
    pub compiler: BuildOutcome,

    /// Absent when the compiler phase failed and stdlib was never
    /// attempted.
    pub stdlib: Option<BuildOutcome>,

    pub compiler_artifact: Option<BuildArtifact>,
    pub stdlib_artifact: Option<BuildArtifact>,
}

impl BootstrapOutcome {
    pub fn succeeded(&self) -> bool {
        self.status.succeeded()
    }
}

/// Drives the two-phase bootstrap.
pub struct Bootstrap {
    runner: ProcessRunner,
    config: HarnessConfig,
    status: BootstrapStatus,
}

impl Bootstrap {
    pub fn new(config: &HarnessConfig) -> Self {
        Self {
            runner: ProcessRunner,
            config: config.clone(),
            status: BootstrapStatus::NotStarted,
        }
    }

    pub fn status(&self) -> BootstrapStatus {
        self.status
    }

    /// Run both phases. `Err` only for infrastructure failures; a build
    /// that exits non-zero comes back as a failed [`BootstrapOutcome`].
    pub async fn run(&mut self, workspace: &Workspace) -> Result<BootstrapOutcome> {
        if self.config.stdlib_sources.is_empty() {
            return Err(HarnessError::InvalidConfig(
                "no standard library sources configured".to_string(),
            ));
        }

        self.status = BootstrapStatus::CompilerBuilding;
        info!(phase = "compiler", "bootstrap phase starting");
        let (compiler, compiler_artifact) = self.build_compiler(workspace).await?;

        if !compiler.succeeded {
            self.status = BootstrapStatus::CompilerFailed;
            warn!(
                phase = "compiler",
                exit_code = ?compiler.exit_code,
                "compiler build failed; stdlib build and tests will not run"
            );
            return Ok(BootstrapOutcome {
                status: self.status,
                compiler,
                stdlib: None,
                compiler_artifact: None,
                stdlib_artifact: None,
            });
        }

        self.status = BootstrapStatus::CompilerBuilt;
        info!(phase = "compiler", duration_ms = compiler.duration_ms, "compiler built");

        self.status = BootstrapStatus::StdlibBuilding;
        info!(phase = "stdlib", "bootstrap phase starting");
        let compiler_artifact = match compiler_artifact {
            Some(artifact) => artifact,
            None => {
                return Err(HarnessError::InvalidConfig(
                    "compiler build succeeded but emitted no artifact path".to_string(),
                ))
            }
        };
        let (stdlib, stdlib_artifact) = self.build_stdlib(workspace, &compiler_artifact).await?;

        if stdlib.succeeded {
            self.status = BootstrapStatus::StdlibBuilt;
            info!(phase = "stdlib", duration_ms = stdlib.duration_ms, "stdlib built");
        } else {
            self.status = BootstrapStatus::StdlibFailed;
            warn!(
                phase = "stdlib",
                exit_code = ?stdlib.exit_code,
                "stdlib build failed; tests will not run"
            );
        }

        Ok(BootstrapOutcome {
            status: self.status,
            compiler,
            stdlib: Some(stdlib),
            compiler_artifact: Some(compiler_artifact),
            stdlib_artifact,
        })
    }

    async fn build_compiler(
        &self,
        workspace: &Workspace,
    ) -> Result<(BuildOutcome, Option<BuildArtifact>)> {
        let start = Instant::now();
        let build_dir = workspace.build_dir()?;
        let flags = self.config.build_flags.as_configure_args();

        let source_dir =
            std::fs::canonicalize(&self.config.compiler_src).map_err(|source| {
                HarnessError::Workspace {
                    path: self.config.compiler_src.clone(),
                    source,
                }
            })?;

        // Configure step: emits the build tree.
        let configure = command_from(&self.config.build_system.configure)?
            .args(flags.iter().cloned())
            .arg(source_dir.to_string_lossy())
            .cwd(&build_dir)
            .timeout(self.config.timeouts.configure);
        let configured = self.runner.run(&configure).await?;

        if !configured.success() {
            let log = render_log("configure", &configured);
            let outcome = BuildOutcome::new(
                BuildPhase::Compiler,
                false,
                configured.exit_code,
                log,
                flags,
                start.elapsed().as_millis() as u64,
            );
            return Ok((outcome, None));
        }

        // Build step, parallelised with -j.
        let build = command_from(&self.config.build_system.build)?
            .arg("-j")
            .arg(self.config.build_system.jobs.to_string())
            .cwd(&build_dir)
            .timeout(self.config.timeouts.build);
        let built = self.runner.run(&build).await?;

        let succeeded = built.success();
        let log = format!(
            "{}\n{}",
            render_log("configure", &configured),
            render_log("build", &built)
        );
        let outcome = BuildOutcome::new(
            BuildPhase::Compiler,
            succeeded,
            built.exit_code,
            log,
            flags,
            start.elapsed().as_millis() as u64,
        );

        let artifact = succeeded.then(|| {
            BuildArtifact::new(
                build_dir.join(&self.config.build_system.artifact),
                ArtifactKind::Compiler,
            )
        });

        Ok((outcome, artifact))
    }

    async fn build_stdlib(
        &self,
        workspace: &Workspace,
        compiler: &BuildArtifact,
    ) -> Result<(BuildOutcome, Option<BuildArtifact>)> {
        let start = Instant::now();
        let out_path = workspace.stdlib_dir()?.join("libcascade");

        let mut spec = CommandSpec::new(compiler.path.to_string_lossy());
        for file in &self.config.stdlib_sources {
            spec = spec.arg(file.to_string_lossy());
        }
        let spec = spec
            .arg("-o")
            .arg(out_path.to_string_lossy())
            .timeout(self.config.timeouts.build);

        let ran = self.runner.run(&spec).await?;
        let succeeded = ran.success();
        let outcome = BuildOutcome::new(
            BuildPhase::Stdlib,
            succeeded,
            ran.exit_code,
            render_log("stdlib", &ran),
            Vec::new(),
            start.elapsed().as_millis() as u64,
        );

        let artifact = succeeded.then(|| BuildArtifact::new(out_path, ArtifactKind::Stdlib));

        Ok((outcome, artifact))
    }
}

fn command_from(argv: &[String]) -> Result<CommandSpec> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| HarnessError::InvalidConfig("empty build command".to_string()))?;
    Ok(CommandSpec::new(program).args(args.iter().cloned()))
}

fn render_log(label: &str, out: &RunOutput) -> String {
    let exit = out
        .exit_code
        .map_or_else(|| "none".to_string(), |c| c.to_string());
    format!(
        "== {label}: exit {exit} in {}ms ==\n{}{}",
        out.duration_ms, out.stdout, out.stderr
    )
}

// Used by tests and the CLI to name phase subtrees consistently.
pub fn phase_name(phase: BuildPhase) -> &'static str {
    match phase {
        BuildPhase::Compiler => "compiler",
        BuildPhase::Stdlib => "stdlib",
    }
}
