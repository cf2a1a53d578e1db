//! Cascade Harness Core
//!
//! Build-and-test orchestration for the Cascade toolchain:
//! - Bootstraps the compiler from source, then the standard library with it
//! - Compiles and executes the test corpus across a bounded worker pool
//! - Aggregates per-case diagnostics and exit codes into a pass/fail report

pub mod bootstrap;
pub mod config;
pub mod corpus;
pub mod diagnostics;
pub mod error;
pub mod harness;
pub mod invoker;
pub mod process;
pub mod report;
pub mod scheduler;
pub mod telemetry;
pub mod workspace;

// Re-export key types
pub use bootstrap::{Bootstrap, BootstrapOutcome, BootstrapStatus, BuildOutcome, BuildPhase};
pub use config::{
    default_worker_count, BuildFlags, BuildSystemConfig, HarnessConfig, Timeouts,
};
pub use corpus::{corpus_digest, load_corpus, Expectation, TestCase};
pub use diagnostics::{
    parse_diagnostics, Diagnostic, Severity, SourceLocation, RAW_DIAGNOSTIC_CODE,
};
pub use error::{HarnessError, Result};
pub use harness::{run, run_corpus, HarnessRun};
pub use invoker::{ArtifactKind, BuildArtifact, Compile, CompileOutcome, CompilerInvoker};
pub use process::{CommandSpec, ProcessRunner, RunOutput};
pub use report::{CaseReport, Report, ResultAggregator, TestResult, Verdict};
pub use scheduler::{SchedulerConfig, TestScheduler};
pub use telemetry::init_tracing;
pub use workspace::Workspace;
