//! Run pipeline
//!
//! filter → expand → resolve → session setup → schedule → teardown → summary.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::data::{Expander, SharedRegistry};
use crate::executor::{CancellationToken, Scheduler, ScopeRegistry};
use crate::filter::TestFilter;
use crate::models::{RunSummary, TestCaseDescriptor, TestResult};
use crate::registry::TestRegistry;
use crate::resolver::resolve_with_failures;
use crate::sink::{report, ResultSink};
use crate::utils::Timer;

/// Engine settings
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    pub max_parallel: Option<usize>,
    pub fail_fast: bool,
}

/// Concrete cases plus the templates that failed to expand
#[derive(Debug, Default)]
pub struct Discovery {
    pub cases: Vec<TestCaseDescriptor>,
    pub errors: Vec<TestResult>,
    /// Logical IDs of declarations whose expansion failed
    pub failed: Vec<String>,
}

pub struct Engine {
    config: EngineConfig,
    sink: Arc<dyn ResultSink>,
}

impl Engine {
    pub fn new(sink: Arc<dyn ResultSink>) -> Self {
        Self {
            config: EngineConfig::default(),
            sink,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Select templates, then expand only the selected ones
    pub async fn discover(
        &self,
        registry: &TestRegistry,
        filter: &TestFilter,
        shared: &SharedRegistry,
    ) -> Discovery {
        let selected = filter.select(registry.templates());
        info!(
            "Selected {} of {} declared test(s)",
            selected.len(),
            registry.len()
        );

        let expander = Expander::new(shared);
        let mut discovery = Discovery::default();
        let mut ids: HashSet<String> = HashSet::new();
        for template in &selected {
            match expander.expand(template).await {
                Ok(cases) => {
                    for case in cases {
                        if ids.insert(case.id.clone()) {
                            discovery.cases.push(case);
                        } else {
                            warn!("Duplicate test id {}", case.id);
                            discovery.errors.push(TestResult::error(
                                &case,
                                format!("duplicate test id '{}'", case.id),
                            ));
                        }
                    }
                }
                Err(e) => {
                    warn!("Discovery failed for {}: {}", template.id(), e);
                    discovery.failed.push(template.id().to_string());
                    discovery.errors.push(TestResult::discovery_error(
                        template.id(),
                        template.descriptor.class_name.clone(),
                        e.to_string(),
                    ));
                }
            }
        }
        discovery
    }

    /// Discover without running; data providers are still invoked
    pub async fn list(&self, registry: &TestRegistry, filter: &TestFilter) -> Discovery {
        let shared = SharedRegistry::new();
        let discovery = self.discover(registry, filter, &shared).await;
        shared.clear();
        discovery
    }

    /// Execute every selected test and summarize the run
    pub async fn run(
        &self,
        registry: &TestRegistry,
        filter: &TestFilter,
        cancel: &CancellationToken,
    ) -> RunSummary {
        let timer = Timer::start("run");
        let shared = Arc::new(SharedRegistry::new());

        let Discovery {
            cases,
            errors,
            failed,
        } = self.discover(registry, filter, &shared).await;
        for result in &errors {
            report(self.sink.as_ref(), result);
        }
        info!(
            "Discovered {} test case(s), {} discovery error(s)",
            cases.len(),
            errors.len()
        );

        let plan = resolve_with_failures(&cases, &failed);
        let scopes = Arc::new(ScopeRegistry::new(&cases, shared.clone()));
        let cases = Arc::new(cases);

        let results = match scopes.run_session_setup(cancel).await {
            Ok(()) => {
                Scheduler::new(self.sink.clone())
                    .with_max_parallel(self.config.max_parallel)
                    .with_fail_fast(self.config.fail_fast)
                    .run(cases.clone(), &plan, scopes.clone(), cancel)
                    .await
            }
            Err(message) => {
                error!("Session setup failed: {}", message);
                cases
                    .iter()
                    .map(|case| {
                        let result = TestResult::error(case, message.clone());
                        report(self.sink.as_ref(), &result);
                        result
                    })
                    .collect()
            }
        };

        scopes.finish_open_scopes(cancel).await;
        scopes.run_session_teardown(cancel).await;
        shared.clear();

        let mut all = errors;
        all.extend(results);
        let summary = RunSummary::new(timer.started_at(), all)
            .with_timing(timer.finish())
            .with_diagnostics(plan.diagnostics)
            .with_hook_failures(scopes.take_failures())
            .cancelled(cancel.is_cancelled());

        info!(
            "Run completed in {}ms - Pass: {}/{} ({:.1}%)",
            summary.total_duration_ms,
            summary.passed,
            summary.total,
            summary.pass_rate()
        );
        summary
    }
}
