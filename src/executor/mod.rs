//! Test execution engine
//!
//! Lane-constrained parallel scheduling, per-case lifecycle and retries,
//! and run-scoped hook bookkeeping.

mod cancel;
mod hooks;
mod lanes;
mod runner;
mod scheduler;
mod scope;

pub use cancel::CancellationToken;
pub use hooks::{invoke_body, run_after, run_before};
pub use lanes::{lane_keys, LaneKey, LanePermit, LaneSet};
pub use runner::CaseRunner;
pub use scheduler::Scheduler;
pub use scope::ScopeRegistry;
