//! Error types
//!
//! Outcome errors raised by test bodies and hooks, plus discovery and
//! configuration errors raised by the engine itself.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Expected-vs-actual mismatch raised by a test body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssertionFailure {
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    pub fn mismatch(
        message: impl Into<String>,
        expected: impl fmt::Debug,
        actual: impl fmt::Debug,
    ) -> Self {
        Self {
            message: message.into(),
            expected: Some(format!("{expected:?}")),
            actual: Some(format!("{actual:?}")),
        }
    }

    /// Line-oriented diff of expected and actual, if both are present.
    pub fn diff(&self) -> Option<String> {
        let expected = self.expected.as_deref()?;
        let actual = self.actual.as_deref()?;

        let mut out = String::new();
        let exp_lines: Vec<&str> = expected.lines().collect();
        let act_lines: Vec<&str> = actual.lines().collect();
        let len = exp_lines.len().max(act_lines.len());

        for i in 0..len {
            match (exp_lines.get(i), act_lines.get(i)) {
                (Some(e), Some(a)) if e == a => out.push_str(&format!("  {e}\n")),
                (e, a) => {
                    if let Some(e) = e {
                        out.push_str(&format!("- {e}\n"));
                    }
                    if let Some(a) = a {
                        out.push_str(&format!("+ {a}\n"));
                    }
                }
            }
        }
        Some(out)
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let (Some(e), Some(a)) = (&self.expected, &self.actual) {
            write!(f, " (expected: {e}, actual: {a})")?;
        }
        Ok(())
    }
}

/// Outcome error of a test body or lifecycle hook
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum TestError {
    #[error("Assertion failed: {0}")]
    Assertion(AssertionFailure),

    #[error("Framework error: {0}")]
    Framework(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Cancelled")]
    Cancelled,

    #[error("Skipped: {0}")]
    Skip(String),
}

impl TestError {
    pub fn assertion(message: impl Into<String>) -> Self {
        TestError::Assertion(AssertionFailure::new(message))
    }

    pub fn framework(message: impl Into<String>) -> Self {
        TestError::Framework(message.into())
    }

    pub fn skip(reason: impl Into<String>) -> Self {
        TestError::Skip(reason.into())
    }

    /// Only assertion failures are eligible for another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TestError::Assertion(_))
    }
}

/// Result type returned by test bodies and hooks
pub type TestOutcome = Result<(), TestError>;

/// Fail with an assertion error unless both values are equal.
pub fn check_eq<T: PartialEq + fmt::Debug>(expected: T, actual: T) -> TestOutcome {
    if expected == actual {
        Ok(())
    } else {
        Err(TestError::Assertion(AssertionFailure::mismatch(
            "values are not equal",
            expected,
            actual,
        )))
    }
}

/// Fail with an assertion error unless the condition holds.
pub fn check(condition: bool, message: impl Into<String>) -> TestOutcome {
    if condition {
        Ok(())
    } else {
        Err(TestError::assertion(message))
    }
}

/// Errors raised while turning data sources into concrete cases
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum DataError {
    #[error("Data provider '{member}' failed: {message}")]
    ProviderFailed { member: String, message: String },

    #[error("Matrix exclusion has {found} values but the matrix declares {expected} parameters")]
    ExclusionArity { expected: usize, found: usize },

    #[error("Matrix parameter '{0}' declares no values")]
    EmptyMatrixParameter(String),

    #[error("Shared instance of '{type_name}' could not be constructed: {message}")]
    SharedConstruction { type_name: String, message: String },
}

/// Artifact attachment errors
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Artifact file does not exist: {0}")]
    NotFound(PathBuf),
}

/// Engine configuration errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid test name regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid name filter '{0}'")]
    InvalidWildcard(String),
}
