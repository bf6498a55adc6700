//! Console result sink
//!
//! Prints each result as it is reported. JSON formats print nothing per case;
//! the full summary is written once the run ends.

use std::sync::Mutex;

use super::formatter::{OutputFormat, ResultFormatter};
use crate::error::TestError;
use crate::models::{TestCaseDescriptor, TestResult};
use crate::sink::ResultSink;

pub struct ConsoleSink {
    formatter: ResultFormatter,
    // Keeps multi-line results from interleaving
    lock: Mutex<()>,
}

impl ConsoleSink {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            formatter: ResultFormatter::new(format),
            lock: Mutex::new(()),
        }
    }

    pub fn no_color(mut self) -> Self {
        self.formatter = self.formatter.no_color();
        self
    }

    fn print(&self, result: &TestResult) {
        if !self.formatter.format().is_streaming() {
            return;
        }
        let line = self.formatter.format_result(result);
        let _guard = self.lock.lock();
        println!("{line}");
    }
}

impl ResultSink for ConsoleSink {
    fn on_retry(&self, case: &TestCaseDescriptor, attempt: u32, error: &TestError) {
        if self.formatter.format() == OutputFormat::Table {
            let _guard = self.lock.lock();
            println!("↻ {} retrying (attempt {}): {}", case.display_name, attempt, error);
        }
    }

    fn report_passed(&self, result: &TestResult) {
        self.print(result);
    }

    fn report_failed(&self, result: &TestResult, _message: &str) {
        self.print(result);
    }

    fn report_errored(&self, result: &TestResult, _error: &str) {
        self.print(result);
    }

    fn report_skipped(&self, result: &TestResult, _reason: &str) {
        self.print(result);
    }
}
