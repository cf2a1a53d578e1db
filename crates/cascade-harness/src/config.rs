//! Harness configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Optimization/sanitizer flag set handed to the native compiler build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildFlags {
    /// Optimized build.
    pub optimize: bool,

    /// Sanitizer-instrumented build.
    pub sanitize: bool,

    /// Extra flags passed through to the configure step verbatim.
    pub extra: Vec<String>,
}

impl BuildFlags {
    /// Render the flag set as configure-step arguments.
    pub fn as_configure_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        args.push(format!(
            "-DCMAKE_BUILD_TYPE={}",
            if self.optimize { "Release" } else { "Debug" }
        ));
        if self.sanitize {
            args.push("-DCASCADE_SANITIZE=ON".to_string());
        }
        args.extend(self.extra.iter().cloned());
        args
    }
}

/// How to drive the native build system that bootstraps the compiler.
///
/// The configure step runs inside the build directory and receives the
/// flag set plus the compiler source directory as trailing arguments; the
/// build step receives `-j <jobs>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSystemConfig {
    /// Configure command (first element is the executable).
    pub configure: Vec<String>,

    /// Build command (first element is the executable).
    pub build: Vec<String>,

    /// `-j` parallelism for the build step.
    pub jobs: usize,

    /// Compiler binary the build emits, relative to the build directory.
    pub artifact: PathBuf,
}

impl Default for BuildSystemConfig {
    fn default() -> Self {
        Self {
            configure: vec!["cmake".to_string()],
            build: vec!["cmake".to_string(), "--build".to_string(), ".".to_string()],
            jobs: default_worker_count(),
            artifact: PathBuf::from("cascadec"),
        }
    }
}

/// Wall-clock limits for the run's subprocess classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    pub configure: Duration,
    pub build: Duration,
    pub compile: Duration,
    pub run: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            configure: Duration::from_secs(300),
            build: Duration::from_secs(1800),
            compile: Duration::from_secs(60),
            run: Duration::from_secs(30),
        }
    }
}

/// Top-level configuration for one harness run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Compiler source checkout to bootstrap.
    pub compiler_src: PathBuf,

    /// Standard library sources, compiled with the bootstrapped compiler.
    pub stdlib_sources: Vec<PathBuf>,

    /// Directory holding the test corpus.
    pub corpus_dir: PathBuf,

    /// Build root owned (and wiped) by the harness.
    pub build_root: PathBuf,

    /// Worker slots for test jobs.
    pub worker_count: usize,

    pub build_system: BuildSystemConfig,
    pub build_flags: BuildFlags,
    pub timeouts: Timeouts,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            compiler_src: PathBuf::from("."),
            stdlib_sources: Vec::new(),
            corpus_dir: PathBuf::from("tests"),
            build_root: PathBuf::from("build/harness"),
            worker_count: default_worker_count(),
            build_system: BuildSystemConfig::default(),
            build_flags: BuildFlags::default(),
            timeouts: Timeouts::default(),
        }
    }
}

/// Default worker count: half the available logical CPUs, at least one.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() / 2).max(1))
        .unwrap_or(1)
}
