//! Result aggregation and the final pass/fail report.

use crate::corpus::{corpus_digest, Expectation, TestCase};
use crate::diagnostics::Diagnostic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Outcome of one executed test case.
///
/// Created exactly once by the worker that ran the case, then handed to the
/// aggregator; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub case_id: String,

    /// Compile diagnostics in emission order.
    pub diagnostics: Vec<Diagnostic>,

    pub compile_succeeded: bool,

    /// Absent when the case never reached the run step (compile failure or
    /// compile-only case) or when the binary was signal-killed.
    pub run_exit_code: Option<i32>,

    pub run_timed_out: bool,

    /// Set when this job hit an infrastructure failure (e.g. launch
    /// failure); the case is reported, siblings are unaffected.
    pub infra_error: Option<String>,

    pub duration_ms: u64,
}

/// Judgement of one result against its case's expectation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Verdict {
    Pass,
    Fail { reason: String },
    InfraError { detail: String },
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// One case's result plus its verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub result: TestResult,
    pub verdict: Verdict,
}

/// Aggregate of all test results for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub run_id: String,
    pub corpus_digest: String,
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub pass_count: usize,
    pub fail_count: usize,

    /// Every case exactly once, in arrival (completion) order.
    pub cases: Vec<CaseReport>,
}

impl Report {
    /// Failing cases in arrival order.
    pub fn failures(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|c| !c.verdict.passed())
    }

    pub fn all_passed(&self) -> bool {
        self.fail_count == 0
    }
}

/// Thread-safe collector for per-case results.
///
/// One instance per harness run, passed explicitly to whoever records into
/// it, never a process-wide singleton, so concurrent runs (the harness's
/// own tests included) cannot interfere. `record` is the single serialized
/// mutation point shared by the workers.
pub struct ResultAggregator {
    expectations: HashMap<String, Expectation>,
    corpus_digest: String,
    expected: usize,
    results: Mutex<Vec<TestResult>>,
}

impl ResultAggregator {
    pub fn new(cases: &[TestCase]) -> Self {
        Self {
            expectations: cases
                .iter()
                .map(|c| (c.id.clone(), c.expectation.clone()))
                .collect(),
            corpus_digest: corpus_digest(cases),
            expected: cases.len(),
            results: Mutex::new(Vec::new()),
        }
    }

    /// Append one result. Called by workers as jobs complete.
    pub fn record(&self, result: TestResult) {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result);
    }

    pub fn recorded(&self) -> usize {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Build the final report.
    ///
    /// # Panics
    ///
    /// Panics unless every scheduled case has been recorded: calling this
    /// before the scheduler's barrier is a harness bug, not a runtime
    /// condition. Also panics on a result whose case was never scheduled.
    pub fn finalize(&self) -> Report {
        let results = self
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        assert_eq!(
            results.len(),
            self.expected,
            "finalize called with {} of {} results recorded",
            results.len(),
            self.expected,
        );

        let cases: Vec<CaseReport> = results
            .into_iter()
            .map(|result| {
                let expectation = self.expectations.get(&result.case_id).unwrap_or_else(|| {
                    panic!("result recorded for unscheduled case `{}`", result.case_id)
                });
                let verdict = judge(&result, expectation);
                CaseReport { result, verdict }
            })
            .collect();

        let pass_count = cases.iter().filter(|c| c.verdict.passed()).count();
        let fail_count = cases.len() - pass_count;

        Report {
            run_id: Uuid::new_v4().to_string(),
            corpus_digest: self.corpus_digest.clone(),
            generated_at: Utc::now(),
            total: cases.len(),
            pass_count,
            fail_count,
            cases,
        }
    }
}

fn judge(result: &TestResult, expectation: &Expectation) -> Verdict {
    if let Some(detail) = &result.infra_error {
        return Verdict::InfraError {
            detail: detail.clone(),
        };
    }

    match expectation {
        Expectation::ExitCode(expected) => {
            if !result.compile_succeeded {
                return Verdict::Fail {
                    reason: format!(
                        "compilation failed with {} diagnostic(s)",
                        result.diagnostics.len()
                    ),
                };
            }
            if result.run_timed_out {
                return Verdict::Fail {
                    reason: "execution timed out".to_string(),
                };
            }
            match result.run_exit_code {
                Some(code) if code == *expected => Verdict::Pass,
                Some(code) => Verdict::Fail {
                    reason: format!("exit code {code}, expected {expected}"),
                },
                None => Verdict::Fail {
                    reason: "no exit code recorded".to_string(),
                },
            }
        }
        Expectation::Diagnostics(expected) => {
            let mut emitted: Vec<u16> = result.diagnostics.iter().map(|d| d.code()).collect();
            emitted.sort_unstable();
            let mut wanted = expected.clone();
            wanted.sort_unstable();
            if emitted == wanted {
                Verdict::Pass
            } else {
                Verdict::Fail {
                    reason: format!("diagnostic codes {emitted:?}, expected {wanted:?}"),
                }
            }
        }
    }
}
