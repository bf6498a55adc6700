//! nextunit
//!
//! Async test execution engine. Tests are registered as descriptors, expanded
//! from their data sources, ordered by their declared dependencies and run
//! concurrently under per-key parallelism constraints, with lifecycle hooks
//! at test, class, assembly and session scope.
//!
//! ```no_run
//! use nextunit::{check_eq, test_body, TestCaseDescriptor, TestRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = TestRegistry::new().with(TestCaseDescriptor::new(
//!         "Math",
//!         "adds",
//!         test_body(|_| async { check_eq(4, 2 + 2) }),
//!     ));
//!     let code = nextunit::harness::run(registry).await?;
//!     std::process::exit(code);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod data;
pub mod engine;
pub mod error;
pub mod executor;
pub mod filter;
pub mod harness;
pub mod models;
pub mod output;
pub mod registry;
pub mod resolver;
pub mod sink;
pub mod utils;

pub use context::TestContext;
pub use data::{ClassSource, DataSource, MatrixSpec, ParameterSource, SharedType, TestTemplate};
pub use engine::{Engine, EngineConfig};
pub use error::{check, check_eq, AssertionFailure, TestError, TestOutcome};
pub use executor::CancellationToken;
pub use filter::TestFilter;
pub use models::{
    test_body, Hook, HookContext, HookPhase, HookScope, LifecycleInfo, RunSummary,
    TestCaseDescriptor, TestResult, TestStatus,
};
pub use registry::TestRegistry;
pub use sink::{CollectingSink, ResultSink};
