//! Bounded-concurrency execution of test-case jobs.
//!
//! Cases are submitted FIFO; a fair semaphore with `worker_count` permits
//! bounds how many jobs run at once, so the first free slot always takes
//! the next queued case. One job's failure, test-level or
//! infrastructure-level, never aborts its siblings: infrastructure errors
//! are caught at the job boundary and recorded as that case's result.

use crate::corpus::TestCase;
use crate::error::{HarnessError, Result};
use crate::invoker::Compile;
use crate::process::{CommandSpec, ProcessRunner};
use crate::report::{ResultAggregator, TestResult};
use crate::workspace::Workspace;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Concurrent worker slots; must be at least 1. At 1 the scheduler
    /// degrades to strictly sequential execution with identical per-case
    /// results.
    pub worker_count: usize,

    /// Wall-clock limit for executing one compiled test binary.
    pub run_timeout: Option<Duration>,
}

/// Executes test cases across a fixed pool of worker slots.
pub struct TestScheduler {
    compiler: Arc<dyn Compile>,
    runner: ProcessRunner,
    config: SchedulerConfig,
}

impl TestScheduler {
    pub fn new(compiler: Arc<dyn Compile>, config: SchedulerConfig) -> Result<Self> {
        if config.worker_count == 0 {
            return Err(HarnessError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            compiler,
            runner: ProcessRunner,
            config,
        })
    }

    /// Run every case and record its result into `aggregator` as it
    /// completes. Returns once all submitted jobs have finished, which is
    /// the barrier that makes `aggregator.finalize()` legal.
    pub async fn run(
        &self,
        workspace: Arc<Workspace>,
        cases: Vec<TestCase>,
        aggregator: &Arc<ResultAggregator>,
    ) -> Result<()> {
        let sem = Arc::new(Semaphore::new(self.config.worker_count));
        let mut tasks = Vec::with_capacity(cases.len());

        debug!(
            cases = cases.len(),
            workers = self.config.worker_count,
            "scheduling test jobs"
        );

        for case in cases {
            let sem = Arc::clone(&sem);
            let compiler = Arc::clone(&self.compiler);
            let runner = self.runner;
            let workspace = Arc::clone(&workspace);
            let aggregator = Arc::clone(aggregator);
            let run_timeout = self.config.run_timeout;

            tasks.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let result =
                    execute_case(compiler.as_ref(), &runner, &workspace, &case, run_timeout).await;
                aggregator.record(result);
            }));
        }

        for task in tasks {
            let _ = task.await;
        }

        Ok(())
    }
}

/// One job: compile, then (for run cases with an artifact) execute.
/// Infrastructure failures are downgraded into the returned result.
async fn execute_case(
    compiler: &dyn Compile,
    runner: &ProcessRunner,
    workspace: &Workspace,
    case: &TestCase,
    run_timeout: Option<Duration>,
) -> TestResult {
    let start = Instant::now();

    let mut result = match run_case(compiler, runner, workspace, case, run_timeout).await {
        Ok(result) => result,
        Err(e) => {
            warn!(
                case = %case.id,
                error = %e,
                "infrastructure error in test job; siblings unaffected"
            );
            TestResult {
                case_id: case.id.clone(),
                diagnostics: Vec::new(),
                compile_succeeded: false,
                run_exit_code: None,
                run_timed_out: false,
                infra_error: Some(e.to_string()),
                duration_ms: 0,
            }
        }
    };

    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}

async fn run_case(
    compiler: &dyn Compile,
    runner: &ProcessRunner,
    workspace: &Workspace,
    case: &TestCase,
    run_timeout: Option<Duration>,
) -> Result<TestResult> {
    let out_dir = workspace.path_for(&case.id)?;
    // The compiler's default binary name; one directory per case keeps
    // concurrent outputs apart.
    let out_path = out_dir.join("main");

    let compile = compiler.compile(&case.files, &out_path).await?;

    let mut result = TestResult {
        case_id: case.id.clone(),
        compile_succeeded: compile.succeeded(),
        diagnostics: compile.diagnostics,
        run_exit_code: None,
        run_timed_out: false,
        infra_error: None,
        duration_ms: 0,
    };

    // A case whose compile failed never reaches the run step.
    if let Some(artifact) = compile.artifact {
        if case.wants_run() {
            let mut spec =
                CommandSpec::new(artifact.path.to_string_lossy()).cwd(&out_dir);
            if let Some(limit) = run_timeout {
                spec = spec.timeout(limit);
            }
            let ran = runner.run(&spec).await?;
            result.run_exit_code = ran.exit_code;
            result.run_timed_out = ran.timed_out;
        }
    }

    Ok(result)
}
