//! Data models for test execution
//!
//! Descriptors, lifecycle hooks, artifacts and results used throughout the engine.

mod artifact;
mod descriptor;
mod lifecycle;
mod test_result;

pub use artifact::{detect_mime_type, Artifact};
pub use descriptor::{
    test_body, Argument, DependencyInfo, ParallelInfo, RetryInfo, TestBody, TestCaseDescriptor,
    TimeoutInfo,
};
pub use lifecycle::{
    dedup_hooks, Hook, HookContext, HookFn, HookId, HookPhase, HookScope, LifecycleInfo,
};
pub use test_result::{CaseState, HookFailure, RunSummary, TestResult, TestStatus};
