//! `cascade-test`: bootstrap the Cascade toolchain and run its test
//! corpus.
//!
//! Exit codes: 0 when every build phase succeeded and no test failed,
//! 1 for build or test failures, 2 for infrastructure errors (unusable
//! workspace, unlaunchable build tools).

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use cascade_harness::{
    bootstrap, default_worker_count, harness, init_tracing, BuildFlags, BuildOutcome,
    BuildSystemConfig, HarnessConfig, HarnessRun, Timeouts, Verdict, Workspace,
};

#[derive(Parser)]
#[command(name = "cascade-test")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Test harness for the Cascade compiler toolchain", long_about = None)]
struct Cli {
    /// Compiler source checkout to bootstrap
    #[arg(long, default_value = ".")]
    compiler_src: PathBuf,

    /// Standard library source file (repeatable)
    #[arg(long = "stdlib", value_name = "FILE")]
    stdlib_sources: Vec<PathBuf>,

    /// Directory holding the test corpus
    #[arg(long, default_value = "tests")]
    corpus: PathBuf,

    /// Build root owned by the harness (wiped on every run)
    #[arg(long, default_value = "build/harness")]
    build_root: PathBuf,

    /// Worker slots for test jobs (default: half the logical CPUs)
    #[arg(short, long)]
    workers: Option<usize>,

    /// `-j` parallelism for the native build step
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Skip the bootstrap phases and test an existing compiler binary
    #[arg(long, requires = "compiler")]
    skip_bootstrap: bool,

    /// Prebuilt compiler to use with --skip-bootstrap
    #[arg(long)]
    compiler: Option<PathBuf>,

    /// Optimized compiler build
    #[arg(long)]
    release: bool,

    /// Sanitizer-instrumented compiler build
    #[arg(long)]
    sanitize: bool,

    /// Per-test compile timeout in seconds
    #[arg(long, default_value_t = 60)]
    compile_timeout: u64,

    /// Per-test run timeout in seconds
    #[arg(long, default_value_t = 30)]
    run_timeout: u64,

    /// Bootstrap build timeout in seconds
    #[arg(long, default_value_t = 1800)]
    build_timeout: u64,

    /// Emit the report as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn to_config(&self) -> HarnessConfig {
        HarnessConfig {
            compiler_src: self.compiler_src.clone(),
            stdlib_sources: self.stdlib_sources.clone(),
            corpus_dir: self.corpus.clone(),
            build_root: self.build_root.clone(),
            worker_count: self.workers.unwrap_or_else(default_worker_count),
            build_system: BuildSystemConfig {
                jobs: self.jobs.unwrap_or_else(default_worker_count),
                ..BuildSystemConfig::default()
            },
            build_flags: BuildFlags {
                optimize: self.release,
                sanitize: self.sanitize,
                extra: Vec::new(),
            },
            timeouts: Timeouts {
                compile: Duration::from_secs(self.compile_timeout),
                run: Duration::from_secs(self.run_timeout),
                build: Duration::from_secs(self.build_timeout),
                ..Timeouts::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("cascade-test: error: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(false, cli.verbose);

    let config = cli.to_config();

    let run = if cli.skip_bootstrap {
        let compiler = cli
            .compiler
            .clone()
            .context("--skip-bootstrap requires --compiler")?;
        info!(compiler = %compiler.display(), "skipping bootstrap");
        let workspace = Arc::new(
            Workspace::prepare(&config.build_root).context("failed to prepare workspace")?,
        );
        let report = harness::run_corpus(&config, compiler, workspace)
            .await
            .context("corpus run failed")?;
        HarnessRun {
            bootstrap: None,
            report: Some(report),
        }
    } else {
        harness::run(&config).await.context("harness run failed")?
    };

    if cli.json {
        render_json(&run)?;
    } else {
        render_text(&run);
    }

    Ok(if run.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn render_json(run: &HarnessRun) -> Result<()> {
    let doc = serde_json::json!({
        "bootstrap": &run.bootstrap,
        "report": &run.report,
    });
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn render_text(run: &HarnessRun) {
    if let Some(outcome) = &run.bootstrap {
        render_build(&outcome.compiler);
        if let Some(stdlib) = &outcome.stdlib {
            render_build(stdlib);
        } else {
            println!("build stdlib: skipped (compiler build failed)");
        }
    }

    let Some(report) = &run.report else {
        println!("\nno tests were run");
        return;
    };

    for case in report.failures() {
        match &case.verdict {
            Verdict::Fail { reason } => {
                println!("FAIL {}: {}", case.result.case_id, reason);
            }
            Verdict::InfraError { detail } => {
                println!("ERROR {}: {}", case.result.case_id, detail);
            }
            Verdict::Pass => {}
        }
        for diag in &case.result.diagnostics {
            println!("    {}", summarize_diagnostic(diag));
        }
    }

    println!(
        "\n{} passed, {} failed ({} total)",
        report.pass_count, report.fail_count, report.total
    );
}

fn render_build(outcome: &BuildOutcome) {
    let state = if outcome.succeeded { "ok" } else { "FAILED" };
    let flags = if outcome.flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", outcome.flags.join(" "))
    };
    println!(
        "build {}: {} in {}ms{}",
        bootstrap::phase_name(outcome.phase),
        state,
        outcome.duration_ms,
        flags
    );
    if !outcome.succeeded {
        for line in outcome.log.lines() {
            println!("    {line}");
        }
    }
}

fn summarize_diagnostic(diag: &cascade_harness::Diagnostic) -> String {
    match diag {
        cascade_harness::Diagnostic::Parsed {
            code,
            severity,
            message,
            location,
        } => {
            let tag = match severity {
                cascade_harness::Severity::Error => "E",
                cascade_harness::Severity::Warning => "W",
            };
            let at = location
                .as_ref()
                .map(|l| format!(" at {}:{}:{}", l.file, l.line, l.column))
                .unwrap_or_default();
            format!("[{tag}{code:04}] {message}{at}")
        }
        cascade_harness::Diagnostic::Raw { text } => format!("(unparsed) {text}"),
    }
}
