//! End-to-end harness run: workspace → bootstrap → schedule → report.

use crate::bootstrap::{Bootstrap, BootstrapOutcome};
use crate::config::HarnessConfig;
use crate::corpus::load_corpus;
use crate::error::Result;
use crate::invoker::CompilerInvoker;
use crate::report::{Report, ResultAggregator};
use crate::scheduler::{SchedulerConfig, TestScheduler};
use crate::workspace::Workspace;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct HarnessRun {
    pub bootstrap: Option<BootstrapOutcome>,

    /// Present iff test jobs were scheduled, i.e. the bootstrap succeeded
    /// or was skipped in favour of a prebuilt compiler.
    pub report: Option<Report>,
}

impl HarnessRun {
    /// Whether the whole run is green: every attempted build phase
    /// succeeded and no test failed.
    pub fn succeeded(&self) -> bool {
        let builds_ok = self.bootstrap.as_ref().map_or(true, |b| b.succeeded());
        let tests_ok = self.report.as_ref().map_or(false, |r| r.all_passed());
        builds_ok && tests_ok
    }
}

/// Full pipeline: prepare the workspace, bootstrap the toolchain, then run
/// the corpus. A failed bootstrap short-circuits with `report: None`; no
/// test job is ever scheduled against a broken toolchain.
pub async fn run(config: &HarnessConfig) -> Result<HarnessRun> {
    let workspace = Arc::new(Workspace::prepare(&config.build_root)?);

    let mut bootstrap = Bootstrap::new(config);
    let outcome = bootstrap.run(&workspace).await?;

    let Some(compiler) = outcome.compiler_artifact.clone().filter(|_| outcome.succeeded()) else {
        return Ok(HarnessRun {
            bootstrap: Some(outcome),
            report: None,
        });
    };

    let report = run_corpus(config, compiler.path, workspace).await?;
    Ok(HarnessRun {
        bootstrap: Some(outcome),
        report: Some(report),
    })
}

/// Corpus-only pipeline against an existing compiler binary. Used by the
/// full pipeline after bootstrap and directly when the bootstrap is
/// skipped.
pub async fn run_corpus(
    config: &HarnessConfig,
    compiler: PathBuf,
    workspace: Arc<Workspace>,
) -> Result<Report> {
    let cases = load_corpus(&config.corpus_dir)?;
    info!(cases = cases.len(), corpus = %config.corpus_dir.display(), "corpus loaded");

    let invoker = CompilerInvoker::new(compiler).with_timeout(config.timeouts.compile);
    let scheduler = TestScheduler::new(
        Arc::new(invoker),
        SchedulerConfig {
            worker_count: config.worker_count,
            run_timeout: Some(config.timeouts.run),
        },
    )?;

    let aggregator = Arc::new(ResultAggregator::new(&cases));
    scheduler.run(workspace, cases, &aggregator).await?;

    let report = aggregator.finalize();
    info!(
        pass = report.pass_count,
        fail = report.fail_count,
        "corpus run finished"
    );
    Ok(report)
}
