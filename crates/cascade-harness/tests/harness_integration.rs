//! End-to-end tests for the full harness pipeline, driven by fake
//! build-system and compiler scripts.

#![cfg(unix)]

use cascade_harness::{
    harness, BootstrapStatus, BuildFlags, BuildSystemConfig, Compile, CompileOutcome, Expectation,
    HarnessConfig, Result, ResultAggregator, SchedulerConfig, TestCase, TestScheduler, Timeouts,
    Verdict, Workspace,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    fs::write(&path, body).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

/// A fake `cascadec`: fails with diagnostic E0101 on sources marked
/// FAIL101, otherwise emits a tiny shell binary whose exit code comes from
/// a `ret <n>` line (default 0). Sources marked HANG produce a binary that
/// sleeps forever.
const FAKE_CASCADEC: &str = r#"#!/bin/sh
out=""
files=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) files="$files $1"; shift ;;
  esac
done
code=0
hang=""
for f in $files; do
  if grep -q FAIL101 "$f"; then
    echo "error: [E0101] expected a declaration! $f:1:1"
    exit 1
  fi
  if grep -q '^ret ' "$f"; then
    code=$(grep '^ret ' "$f" | head -1 | cut -d' ' -f2)
  fi
  if grep -q HANG "$f"; then
    hang=1
  fi
done
if [ -n "$hang" ]; then
  printf '#!/bin/sh\nsleep 30\n' > "$out"
else
  printf '#!/bin/sh\nexit %s\n' "$code" > "$out"
fi
chmod +x "$out"
exit 0
"#;

/// Harness config whose build system installs `FAKE_CASCADEC` as the
/// bootstrapped compiler.
fn fixture_config(root: &Path) -> HarnessConfig {
    let src = root.join("compiler-src");
    fs::create_dir_all(&src).expect("mkdir src");

    let template = write_script(root, "cascadec.template", FAKE_CASCADEC);
    let configure = write_script(root, "configure.sh", "#!/bin/sh\nexit 0\n");
    let build = write_script(
        root,
        "build.sh",
        &format!("#!/bin/sh\ncp {} cascadec\nexit 0\n", template.display()),
    );

    let stdlib = root.join("core.csc");
    fs::write(&stdlib, "module core;\n").expect("write stdlib");

    let corpus = root.join("corpus");
    fs::create_dir_all(&corpus).expect("mkdir corpus");

    HarnessConfig {
        compiler_src: src,
        stdlib_sources: vec![stdlib],
        corpus_dir: corpus,
        build_root: root.join("build"),
        worker_count: 4,
        build_system: BuildSystemConfig {
            configure: vec![configure.to_string_lossy().to_string()],
            build: vec![build.to_string_lossy().to_string()],
            jobs: 2,
            artifact: PathBuf::from("cascadec"),
        },
        build_flags: BuildFlags::default(),
        timeouts: Timeouts::default(),
    }
}

fn add_case(config: &HarnessConfig, name: &str, source: &str) {
    fs::write(config.corpus_dir.join(name), source).expect("write case");
}

/// Scenario: the compiler build itself fails. No stdlib build, no test
/// jobs, empty report, red overall.
#[tokio::test]
async fn test_compiler_build_failure_schedules_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = fixture_config(dir.path());
    config.build_system.build = vec![write_script(
        dir.path(),
        "broken-build.sh",
        "#!/bin/sh\necho 'fatal error: cascadec.cc' >&2\nexit 1\n",
    )
    .to_string_lossy()
    .to_string()];
    add_case(&config, "would_pass.csc", "ret 0\n");

    let run = harness::run(&config).await.expect("harness run");

    let bootstrap = run.bootstrap.as_ref().expect("bootstrap outcome");
    assert_eq!(bootstrap.status, BootstrapStatus::CompilerFailed);
    assert!(bootstrap.stdlib.is_none());
    assert!(run.report.is_none(), "no test may run on a failed build");
    assert!(!run.succeeded());
}

/// Scenario: green bootstrap; two cases compile and exit 0, one fails to
/// compile with diagnostic code 101.
#[tokio::test]
async fn test_mixed_corpus_reports_passes_and_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = fixture_config(dir.path());
    add_case(&config, "first.csc", "ret 0\n");
    add_case(&config, "second.csc", "ret 0\n");
    add_case(&config, "broken.csc", "FAIL101\n");

    let run = harness::run(&config).await.expect("harness run");

    let bootstrap = run.bootstrap.as_ref().expect("bootstrap outcome");
    assert!(bootstrap.succeeded());

    let report = run.report.as_ref().expect("report");
    assert_eq!(report.total, 3);
    assert_eq!(report.pass_count, 2);
    assert_eq!(report.fail_count, 1);
    assert!(!run.succeeded());

    let failure = report.failures().next().expect("failing case");
    assert_eq!(failure.result.case_id, "broken");
    assert!(!failure.result.compile_succeeded);
    assert_eq!(
        failure.result.run_exit_code, None,
        "a failed compile must never record an exit code"
    );
    assert!(failure.result.diagnostics.iter().any(|d| d.code() == 101));
}

/// Scenario: a binary exceeding its run timeout is reported as timed out
/// without stalling the pool.
#[tokio::test]
async fn test_hanging_binary_times_out_and_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = fixture_config(dir.path());
    config.timeouts.run = Duration::from_millis(300);
    add_case(&config, "hangs.csc", "HANG\n");
    add_case(&config, "quick.csc", "ret 0\n");

    let start = Instant::now();
    let run = harness::run(&config).await.expect("harness run");
    assert!(
        start.elapsed() < Duration::from_secs(10),
        "timeout did not bound the run"
    );

    let report = run.report.expect("report");
    assert_eq!(report.pass_count, 1);
    assert_eq!(report.fail_count, 1);

    let failure = report.failures().next().expect("failing case");
    assert_eq!(failure.result.case_id, "hangs");
    assert!(failure.result.run_timed_out);
    assert_eq!(failure.result.run_exit_code, None);
    assert!(
        matches!(&failure.verdict, Verdict::Fail { reason } if reason.contains("timed out"))
    );
}

/// Scenario: expected-diagnostic cases pass when the compiler rejects them
/// with exactly the declared codes.
#[tokio::test]
async fn test_expected_diagnostics_case_passes_on_rejection() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = fixture_config(dir.path());
    add_case(&config, "rejects.csc", "FAIL101\n");
    fs::write(
        config.corpus_dir.join("manifest.json"),
        r#"[{"id": "rejects", "files": ["rejects.csc"], "expected_diagnostics": [101]}]"#,
    )
    .expect("write manifest");

    let run = harness::run(&config).await.expect("harness run");
    let report = run.report.as_ref().expect("report");
    assert_eq!(report.pass_count, 1);
    assert_eq!(report.fail_count, 0);
    assert!(run.succeeded());
}

/// In-process compiler stub for the wall-clock scaling scenario: each
/// compile takes ~10ms and no subprocess is involved.
struct SleepyCompiler;

#[async_trait::async_trait]
impl Compile for SleepyCompiler {
    async fn compile(&self, _files: &[PathBuf], _output: &Path) -> Result<CompileOutcome> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(CompileOutcome {
            artifact: None,
            diagnostics: Vec::new(),
            exit_code: Some(0),
            duration_ms: 10,
        })
    }
}

/// Scenario: 100 independent ~10ms cases across 4 workers finish much
/// closer to the parallel bound than to sequential time, every case
/// exactly once.
#[tokio::test]
async fn test_hundred_cases_scale_with_worker_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let workspace = Arc::new(Workspace::prepare(dir.path().join("ws")).expect("prepare"));

    let cases: Vec<TestCase> = (0..100)
        .map(|i| TestCase {
            id: format!("case-{i}"),
            files: vec![PathBuf::from(format!("case-{i}.csc"))],
            expectation: Expectation::Diagnostics(vec![]),
        })
        .collect();
    let aggregator = Arc::new(ResultAggregator::new(&cases));

    let scheduler = TestScheduler::new(
        Arc::new(SleepyCompiler),
        SchedulerConfig {
            worker_count: 4,
            run_timeout: None,
        },
    )
    .expect("scheduler");

    let start = Instant::now();
    scheduler
        .run(workspace, cases, &aggregator)
        .await
        .expect("run");
    let elapsed = start.elapsed();

    // Sequential would be ~1000ms; 4 workers bound it near ~250ms.
    assert!(
        elapsed < Duration::from_millis(800),
        "expected parallel speedup, took {elapsed:?}"
    );

    let report = aggregator.finalize();
    assert_eq!(report.total, 100);
    assert_eq!(report.pass_count, 100);
    let mut ids: Vec<String> = report
        .cases
        .iter()
        .map(|c| c.result.case_id.clone())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 100, "every case must appear exactly once");
}
