//! Test result models
//!
//! Defines per-case execution states, terminal results and the run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::artifact::Artifact;
use super::descriptor::TestCaseDescriptor;
use super::lifecycle::HookScope;
use crate::resolver::Diagnostic;
use crate::utils::Timing;

/// Terminal status of a test case
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Errored,
    Skipped,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Passed => "✓",
            TestStatus::Failed => "✗",
            TestStatus::Skipped => "○",
            TestStatus::Errored => "!",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Passed)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TestStatus::Failed | TestStatus::Errored)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "PASS"),
            TestStatus::Failed => write!(f, "FAIL"),
            TestStatus::Skipped => write!(f, "SKIP"),
            TestStatus::Errored => write!(f, "ERROR"),
        }
    }
}

/// Scheduling state of a case inside a run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseState {
    Pending,
    Running,
    Retrying { attempt: u32 },
    Finished(TestStatus),
}

impl CaseState {
    pub fn is_finished(&self) -> bool {
        matches!(self, CaseState::Finished(_))
    }
}

/// Result of a single test case
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestResult {
    pub id: String,
    pub display_name: String,
    pub class_name: String,
    pub status: TestStatus,
    pub duration_ms: u64,
    pub attempts: u32,
    pub message: Option<String>,
    /// Rendered expected/actual diff for equality assertions
    pub diff: Option<String>,
    pub output: String,
    pub artifacts: Vec<Artifact>,
    pub is_flaky: bool,
    pub explicit: bool,
}

impl TestResult {
    fn base(case: &TestCaseDescriptor, status: TestStatus) -> Self {
        Self {
            id: case.id.clone(),
            display_name: case.display_name.clone(),
            class_name: case.class_name.clone(),
            status,
            duration_ms: 0,
            attempts: 0,
            message: None,
            diff: None,
            output: String::new(),
            artifacts: Vec::new(),
            is_flaky: case.retry.is_flaky,
            explicit: case.explicit,
        }
    }

    pub fn pass(case: &TestCaseDescriptor, duration_ms: u64) -> Self {
        Self {
            duration_ms,
            ..Self::base(case, TestStatus::Passed)
        }
    }

    pub fn fail(case: &TestCaseDescriptor, duration_ms: u64, message: impl Into<String>) -> Self {
        Self {
            duration_ms,
            message: Some(message.into()),
            ..Self::base(case, TestStatus::Failed)
        }
    }

    pub fn skip(case: &TestCaseDescriptor, reason: impl Into<String>) -> Self {
        Self {
            message: Some(reason.into()),
            ..Self::base(case, TestStatus::Skipped)
        }
    }

    pub fn error(case: &TestCaseDescriptor, error: impl Into<String>) -> Self {
        Self {
            message: Some(error.into()),
            ..Self::base(case, TestStatus::Errored)
        }
    }

    /// Errored result for a declaration that never produced cases
    pub fn discovery_error(id: impl Into<String>, class_name: impl Into<String>, error: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            class_name: class_name.into(),
            status: TestStatus::Errored,
            duration_ms: 0,
            attempts: 0,
            message: Some(error.into()),
            diff: None,
            output: String::new(),
            artifacts: Vec::new(),
            is_flaky: false,
            explicit: false,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_diff(mut self, diff: Option<String>) -> Self {
        self.diff = diff;
        self
    }

    pub fn with_output(mut self, output: String, artifacts: Vec<Artifact>) -> Self {
        self.output = output;
        self.artifacts = artifacts;
        self
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.status.symbol(),
            self.display_name,
            self.duration_ms
        )?;
        if self.attempts > 1 {
            write!(f, " ({} attempts)", self.attempts)?;
        }
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

/// A class, assembly or session hook that failed outside any single case
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookFailure {
    pub scope: HookScope,
    pub scope_name: String,
    pub hook: String,
    pub message: String,
}

impl fmt::Display for HookFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} hook {} ({}) failed: {}",
            self.scope, self.hook, self.scope_name, self.message
        )
    }
}

/// Summary of one run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Cases that passed only after at least one retry
    pub retried_passes: usize,
    pub total_duration_ms: u64,
    pub results: Vec<TestResult>,
    pub diagnostics: Vec<Diagnostic>,
    pub hook_failures: Vec<HookFailure>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, results: Vec<TestResult>) -> Self {
        let count = |status: TestStatus| results.iter().filter(|r| r.status == status).count();

        let total = results.len();
        let passed = count(TestStatus::Passed);
        let failed = count(TestStatus::Failed);
        let skipped = count(TestStatus::Skipped);
        let errors = count(TestStatus::Errored);
        let retried_passes = results
            .iter()
            .filter(|r| r.status == TestStatus::Passed && r.attempts > 1)
            .count();
        let total_duration_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;

        Self {
            started_at,
            total,
            passed,
            failed,
            skipped,
            errors,
            retried_passes,
            total_duration_ms,
            results,
            diagnostics: Vec::new(),
            hook_failures: Vec::new(),
            cancelled: false,
        }
    }

    /// Replace the wall-clock estimate with a measured run duration
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.started_at = timing.started_at;
        self.total_duration_ms = timing.duration_ms;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_hook_failures(mut self, failures: Vec<HookFailure>) -> Self {
        self.hook_failures = failures;
        self
    }

    pub fn cancelled(mut self, cancelled: bool) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn result(&self, id: &str) -> Option<&TestResult> {
        self.results.iter().find(|r| r.id == id)
    }

    pub fn pass_rate(&self) -> f64 {
        let executed = self.total - self.skipped;
        if executed == 0 {
            0.0
        } else {
            (self.passed as f64 / executed as f64) * 100.0
        }
    }

    pub fn is_all_passed(&self) -> bool {
        self.failed == 0 && self.errors == 0 && self.hook_failures.is_empty() && !self.cancelled
    }

    /// 0 when every executed case passed, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.is_all_passed() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {} | Error: {}",
            self.total, self.passed, self.failed, self.skipped, self.errors
        )?;
        if self.retried_passes > 0 {
            writeln!(f, "Passed after retry: {}", self.retried_passes)?;
        }
        for failure in &self.hook_failures {
            writeln!(f, "{failure}")?;
        }
        if self.cancelled {
            writeln!(f, "Run cancelled")?;
        }
        writeln!(
            f,
            "Pass Rate: {:.1}% | Duration: {}ms",
            self.pass_rate(),
            self.total_duration_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_body;

    fn case(id: &str) -> TestCaseDescriptor {
        TestCaseDescriptor::new("Suite", id, test_body(|_| async { Ok(()) }))
    }

    #[test]
    fn test_result_creation() {
        let result = TestResult::pass(&case("a"), 100);
        assert!(result.status.is_success());
        assert_eq!(result.duration_ms, 100);
        assert_eq!(result.id, "Suite.a");
    }

    #[test]
    fn test_run_summary_counts() {
        let results = vec![
            TestResult::pass(&case("a"), 10).with_attempts(3),
            TestResult::fail(&case("b"), 5, "boom"),
            TestResult::skip(&case("c"), "not today"),
            TestResult::error(&case("d"), "hook failed"),
        ];

        let summary = RunSummary::new(Utc::now(), results);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.retried_passes, 1);
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_skips_do_not_fail_the_run() {
        let results = vec![
            TestResult::pass(&case("a"), 1),
            TestResult::skip(&case("b"), "declared"),
        ];
        let summary = RunSummary::new(Utc::now(), results);
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(summary.pass_rate(), 100.0);
    }

    #[test]
    fn test_timing_sets_duration() {
        let timing = Timing {
            label: "run".into(),
            started_at: Utc::now(),
            duration_ms: 1234,
        };
        let summary = RunSummary::new(Utc::now(), Vec::new()).with_timing(timing.clone());
        assert_eq!(summary.total_duration_ms, 1234);
        assert_eq!(summary.started_at, timing.started_at);
    }

    #[test]
    fn test_hook_failure_fails_the_run() {
        let summary = RunSummary::new(Utc::now(), vec![TestResult::pass(&case("a"), 1)])
            .with_hook_failures(vec![HookFailure {
                scope: HookScope::Class,
                scope_name: "Suite".into(),
                hook: "Suite.cleanup".into(),
                message: "disk full".into(),
            }]);
        assert_eq!(summary.exit_code(), 1);
    }
}
