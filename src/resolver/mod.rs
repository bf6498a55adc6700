//! Dependency and ordering resolution
//!
//! Builds the dependency graph over case IDs, reports cycles and unresolved
//! references, and computes a priority-aware execution order.

mod graph;

pub use graph::{resolve, resolve_with_failures, ExecutionPlan, Prerequisite};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// NEXTUNIT001
    CircularDependency,
    /// NEXTUNIT002
    UnresolvedDependency,
}

impl DiagnosticCode {
    pub fn code(&self) -> &'static str {
        match self {
            DiagnosticCode::CircularDependency => "NEXTUNIT001",
            DiagnosticCode::UnresolvedDependency => "NEXTUNIT002",
        }
    }

    /// Cycles remove cases from the runnable set; unresolved references do not
    pub fn is_error(&self) -> bool {
        matches!(self, DiagnosticCode::CircularDependency)
    }
}

/// Discovery-time finding about the dependency graph
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
    pub test_ids: Vec<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = if self.code.is_error() { "error" } else { "warning" };
        write!(f, "{severity}[{}]: {}", self.code.code(), self.message)
    }
}
