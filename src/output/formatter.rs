//! Output formatters for test results
//!
//! Provides JSON, Table, and summary output formats.

use std::io::Write;

use crate::models::{RunSummary, TestCaseDescriptor, TestResult, TestStatus};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }

    /// Whether results are printed as they arrive
    pub fn is_streaming(&self) -> bool {
        matches!(self, OutputFormat::Table | OutputFormat::Summary)
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    fn status_label(&self, status: TestStatus) -> String {
        let label = format!("{} {}", status.symbol(), status);
        if !self.colorize {
            return label;
        }
        let color = match status {
            TestStatus::Passed => "32",
            TestStatus::Failed | TestStatus::Errored => "31",
            TestStatus::Skipped => "33",
        };
        format!("\x1b[{color}m{label}\x1b[0m")
    }

    /// Format a single test result
    pub fn format_result(&self, result: &TestResult) -> String {
        match self.format {
            OutputFormat::Table => self.format_result_table(result),
            OutputFormat::Json => serde_json::to_string(result).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Summary => self.format_result_summary(result),
        }
    }

    fn format_result_table(&self, result: &TestResult) -> String {
        let mut line = format!(
            "{:48} {} [{:>6}ms]",
            result.display_name,
            self.status_label(result.status),
            result.duration_ms
        );
        if result.attempts > 1 {
            line.push_str(&format!(" (attempt {})", result.attempts));
        }
        if result.status != TestStatus::Passed {
            if let Some(message) = &result.message {
                line.push_str(&format!("\n    {message}"));
            }
        }
        line
    }

    fn format_result_summary(&self, result: &TestResult) -> String {
        format!(
            "{} {} ({}ms)",
            result.status.symbol(),
            result.display_name,
            result.duration_ms
        )
    }

    /// Format the run summary
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Table => self.format_summary_table(summary),
            OutputFormat::Json => serde_json::to_string(summary).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Summary => self.format_summary_brief(summary),
        }
    }

    fn format_summary_table(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        let failures: Vec<&TestResult> = summary
            .results
            .iter()
            .filter(|r| r.status.is_failure())
            .collect();
        if !failures.is_empty() {
            output.push_str("\nFailures:\n");
            for result in failures {
                output.push_str(&self.format_failure(result));
            }
        }

        let flaky: Vec<&TestResult> = summary
            .results
            .iter()
            .filter(|r| r.status == TestStatus::Passed && r.attempts > 1)
            .collect();
        if !flaky.is_empty() {
            output.push_str("\nPassed after retry:\n");
            for result in flaky {
                output.push_str(&format!(
                    "   - {} ({} attempts)\n",
                    result.display_name, result.attempts
                ));
            }
        }

        if !summary.diagnostics.is_empty() {
            output.push_str("\nDiagnostics:\n");
            for diagnostic in &summary.diagnostics {
                output.push_str(&format!("   {diagnostic}\n"));
            }
        }

        let pass_str = if self.colorize {
            format!("\x1b[32m{}\x1b[0m", summary.passed)
        } else {
            summary.passed.to_string()
        };
        let fail_str = if self.colorize && summary.failed + summary.errors > 0 {
            format!("\x1b[31m{}\x1b[0m", summary.failed)
        } else {
            summary.failed.to_string()
        };

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!(
            "║  Total: {:3} | Pass: {} | Fail: {} | Skip: {:3} | Error: {:3}\n",
            summary.total, pass_str, fail_str, summary.skipped, summary.errors
        ));
        output.push_str(&format!(
            "║  Pass Rate: {:5.1}% | Duration: {:6}ms\n",
            summary.pass_rate(),
            summary.total_duration_ms
        ));
        for failure in &summary.hook_failures {
            output.push_str(&format!("║  {failure}\n"));
        }
        if summary.cancelled {
            output.push_str("║  Run cancelled\n");
        }
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        output
    }

    fn format_failure(&self, result: &TestResult) -> String {
        let mut output = format!(
            " {} {} ({})\n",
            self.status_label(result.status),
            result.display_name,
            result.id
        );
        if let Some(message) = &result.message {
            output.push_str(&format!("     {message}\n"));
        }
        if let Some(diff) = &result.diff {
            for line in diff.lines() {
                output.push_str(&format!("     {line}\n"));
            }
        }
        if !result.output.is_empty() {
            output.push_str("     Output:\n");
            for line in result.output.lines() {
                output.push_str(&format!("       {line}\n"));
            }
        }
        for artifact in &result.artifacts {
            output.push_str(&format!(
                "     Artifact: {} [{}]\n",
                artifact.path.display(),
                artifact.mime_type
            ));
        }
        output
    }

    fn format_summary_brief(&self, summary: &RunSummary) -> String {
        format!(
            "{}/{} passed ({:.1}%), {} failed, {} errored, {} skipped in {}ms",
            summary.passed,
            summary.total,
            summary.pass_rate(),
            summary.failed,
            summary.errors,
            summary.skipped,
            summary.total_duration_ms
        )
    }

    /// Format the selected cases for list mode
    pub fn format_listing(&self, cases: &[TestCaseDescriptor], detailed: bool) -> String {
        let mut output = String::new();
        for case in cases {
            output.push_str(&case.id);
            if detailed {
                let mut details = Vec::new();
                if !case.categories.is_empty() {
                    details.push(format!("categories: {}", case.categories.join(", ")));
                }
                if !case.tags.is_empty() {
                    details.push(format!("tags: {}", case.tags.join(", ")));
                }
                if !case.dependencies.is_empty() {
                    let deps: Vec<&str> =
                        case.dependencies.iter().map(|d| d.target.as_str()).collect();
                    details.push(format!("depends on: {}", deps.join(", ")));
                }
                if let Some(reason) = &case.skip_reason {
                    details.push(format!("skipped: {reason}"));
                }
                if case.explicit {
                    details.push("explicit".to_string());
                }
                if !details.is_empty() {
                    output.push_str(&format!("  [{}]", details.join("; ")));
                }
            }
            output.push('\n');
        }
        output.push_str(&format!("{} test(s)\n", cases.len()));
        output
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

/// Write a run summary to a file
pub fn write_summary_to_file(
    path: &str,
    summary: &RunSummary,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_summary(summary);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
