//! Result reporting
//!
//! Every case reaches exactly one terminal `report_*` call on the run's
//! [`ResultSink`]. Output and artifacts travel on the [`TestResult`].

use std::sync::Mutex;

use crate::error::TestError;
use crate::models::{TestCaseDescriptor, TestResult, TestStatus};

/// Receiver of per-case progress and terminal results
pub trait ResultSink: Send + Sync {
    /// A case was admitted and is about to run
    fn on_started(&self, _case: &TestCaseDescriptor) {}

    /// A case failed an attempt and will run again as `attempt`
    fn on_retry(&self, _case: &TestCaseDescriptor, _attempt: u32, _error: &TestError) {}

    fn report_passed(&self, result: &TestResult);

    fn report_failed(&self, result: &TestResult, message: &str);

    fn report_errored(&self, result: &TestResult, error: &str);

    fn report_skipped(&self, result: &TestResult, reason: &str);
}

/// Dispatch `result` to the terminal call matching its status
pub fn report(sink: &dyn ResultSink, result: &TestResult) {
    let message = result.message.as_deref().unwrap_or_default();
    match result.status {
        TestStatus::Passed => sink.report_passed(result),
        TestStatus::Failed => sink.report_failed(result, message),
        TestStatus::Errored => sink.report_errored(result, message),
        TestStatus::Skipped => sink.report_skipped(result, message),
    }
}

/// Sink that keeps every result in report order
#[derive(Default)]
pub struct CollectingSink {
    results: Mutex<Vec<TestResult>>,
    started: Mutex<Vec<String>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<TestResult> {
        self.results.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// IDs of started cases, in start order
    pub fn started(&self) -> Vec<String> {
        self.started.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn push(&self, result: &TestResult) {
        if let Ok(mut results) = self.results.lock() {
            results.push(result.clone());
        }
    }
}

impl ResultSink for CollectingSink {
    fn on_started(&self, case: &TestCaseDescriptor) {
        if let Ok(mut started) = self.started.lock() {
            started.push(case.id.clone());
        }
    }

    fn report_passed(&self, result: &TestResult) {
        self.push(result);
    }

    fn report_failed(&self, result: &TestResult, _message: &str) {
        self.push(result);
    }

    fn report_errored(&self, result: &TestResult, _error: &str) {
        self.push(result);
    }

    fn report_skipped(&self, result: &TestResult, _reason: &str) {
        self.push(result);
    }
}

/// Sink that drops everything
pub struct NullSink;

impl ResultSink for NullSink {
    fn report_passed(&self, _result: &TestResult) {}
    fn report_failed(&self, _result: &TestResult, _message: &str) {}
    fn report_errored(&self, _result: &TestResult, _error: &str) {}
    fn report_skipped(&self, _result: &TestResult, _reason: &str) {}
}
