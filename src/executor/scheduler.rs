//! Concurrency scheduler
//!
//! A single dispatcher loop owns all scheduling state. Cases become ready
//! when every prerequisite has finished, are admitted by priority and then
//! by their position in the resolved order when their lanes have room, and
//! run as independent tokio tasks. The dispatcher wakes on each completion
//! to report the result, release dependents and admit more work.

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cancel::CancellationToken;
use super::lanes::{lane_keys, LaneKey, LaneSet};
use super::runner::CaseRunner;
use super::scope::ScopeRegistry;
use crate::models::{CaseState, TestCaseDescriptor, TestResult, TestStatus};
use crate::resolver::ExecutionPlan;
use crate::sink::{report, ResultSink};

type Completion = BoxFuture<'static, (usize, TestResult)>;
/// Priority, then rank in [`ExecutionPlan::order`]
type ReadyEntry = (i32, Reverse<usize>);

/// Dispatches resolved cases onto the async runtime
pub struct Scheduler {
    max_parallel: Option<usize>,
    fail_fast: bool,
    sink: Arc<dyn ResultSink>,
}

impl Scheduler {
    pub fn new(sink: Arc<dyn ResultSink>) -> Self {
        Self {
            max_parallel: None,
            fail_fast: false,
            sink,
        }
    }

    /// Cap on concurrently running cases across all lanes
    pub fn with_max_parallel(mut self, max_parallel: Option<usize>) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Cancel the run on the first failed or errored case
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Run every case of `plan`; results come back in case order
    pub async fn run(
        &self,
        cases: Arc<Vec<TestCaseDescriptor>>,
        plan: &ExecutionPlan,
        scopes: Arc<ScopeRegistry>,
        cancel: &CancellationToken,
    ) -> Vec<TestResult> {
        let lanes = LaneSet::build(&cases, self.max_parallel);
        let keys: Vec<Vec<LaneKey>> = cases
            .iter()
            .map(|c| lane_keys(&c.parallel, &c.assembly, &c.class_name))
            .collect();
        let runner = CaseRunner::new(scopes.clone(), cancel.clone()).with_sink(self.sink.clone());

        let mut state = DispatchState::new(&cases, plan);
        let mut in_flight: FuturesUnordered<Completion> = FuturesUnordered::new();

        for i in 0..cases.len() {
            if plan.is_cyclic(i) {
                let result = TestResult::error(
                    &cases[i],
                    format!("{} is part of a circular dependency", cases[i].id),
                );
                in_flight.push(resolve_without_running(i, result, &cases, &scopes, cancel));
                state.states[i] = CaseState::Running;
            }
        }

        let mut cancel_seen = false;
        loop {
            if cancel.is_cancelled() {
                state.ready.clear();
                for i in 0..cases.len() {
                    if state.states[i] == CaseState::Pending {
                        state.states[i] = CaseState::Running;
                        let result = TestResult::skip(&cases[i], "run cancelled");
                        in_flight.push(resolve_without_running(i, result, &cases, &scopes, cancel));
                    }
                }
            } else {
                let mut blocked = Vec::new();
                while let Some(entry) = state.ready.pop() {
                    let Reverse(rank) = entry.1;
                    let i = plan.order[rank];
                    if state.states[i] != CaseState::Pending {
                        continue;
                    }

                    if let Some(reason) = state.skip_reason(i) {
                        state.states[i] = CaseState::Running;
                        let result = TestResult::skip(&cases[i], reason);
                        in_flight.push(resolve_without_running(i, result, &cases, &scopes, cancel));
                        continue;
                    }

                    match lanes.try_admit(&keys[i]) {
                        Some(permit) => {
                            debug!("Admitted {} (lanes {:?})", cases[i].id, keys[i]);
                            state.states[i] = CaseState::Running;
                            self.sink.on_started(&cases[i]);

                            let runner = runner.clone();
                            let task_cases = cases.clone();
                            let handle = tokio::spawn(async move {
                                let _permit = permit;
                                runner.run(&task_cases[i]).await
                            });
                            let case = cases[i].clone();
                            in_flight.push(
                                async move {
                                    let result = handle.await.unwrap_or_else(|e| {
                                        TestResult::error(&case, format!("test task failed: {e}"))
                                    });
                                    (i, result)
                                }
                                .boxed(),
                            );
                        }
                        None => blocked.push(entry),
                    }
                }
                state.ready.extend(blocked);
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                Some((i, result)) = in_flight.next() => {
                    let failed = result.status.is_failure();
                    state.complete(i, result, self.sink.as_ref());
                    if failed && self.fail_fast && !cancel.is_cancelled() {
                        warn!("Fail-fast: cancelling run after {}", cases[i].id);
                        cancel.cancel();
                    }
                }
                _ = cancel.cancelled(), if !cancel_seen => {
                    info!("Run cancelled; skipping cases that have not started");
                    cancel_seen = true;
                }
            }
        }

        // Anything still pending was never released by its prerequisites
        for i in 0..cases.len() {
            if state.results[i].is_none() {
                let result = TestResult::error(&cases[i], "case was never scheduled");
                scopes.leave(&cases[i], cancel).await;
                state.complete(i, result, self.sink.as_ref());
            }
        }

        state.results.into_iter().flatten().collect()
    }
}

/// Report a case that is decided without running its body
fn resolve_without_running(
    i: usize,
    result: TestResult,
    cases: &Arc<Vec<TestCaseDescriptor>>,
    scopes: &Arc<ScopeRegistry>,
    cancel: &CancellationToken,
) -> Completion {
    let cases = cases.clone();
    let scopes = scopes.clone();
    let cancel = cancel.clone();
    async move {
        scopes.leave(&cases[i], &cancel).await;
        (i, result)
    }
    .boxed()
}

struct DispatchState<'a> {
    cases: &'a [TestCaseDescriptor],
    plan: &'a ExecutionPlan,
    states: Vec<CaseState>,
    results: Vec<Option<TestResult>>,
    remaining: Vec<usize>,
    /// First prerequisite that did not pass and does not allow proceeding
    failed_prerequisite: Vec<Option<String>>,
    ranks: Vec<usize>,
    ready: BinaryHeap<ReadyEntry>,
}

impl<'a> DispatchState<'a> {
    fn new(cases: &'a [TestCaseDescriptor], plan: &'a ExecutionPlan) -> Self {
        let remaining: Vec<usize> = plan.prerequisites.iter().map(Vec::len).collect();
        let ranks = plan.ranks();
        let ready = remaining
            .iter()
            .enumerate()
            .filter(|(i, n)| **n == 0 && !plan.is_cyclic(*i))
            .map(|(i, _)| (cases[i].priority, Reverse(ranks[i])))
            .collect();

        Self {
            cases,
            plan,
            states: vec![CaseState::Pending; cases.len()],
            results: vec![None; cases.len()],
            remaining,
            failed_prerequisite: plan.failed_upstream.clone(),
            ranks,
            ready,
        }
    }

    fn skip_reason(&self, i: usize) -> Option<String> {
        if let Some(reason) = &self.cases[i].skip_reason {
            return Some(reason.clone());
        }
        self.failed_prerequisite[i]
            .as_ref()
            .map(|dep| format!("dependency '{dep}' did not pass"))
    }

    /// Record the terminal result of `i` and release its dependents
    fn complete(&mut self, i: usize, result: TestResult, sink: &dyn ResultSink) {
        if self.states[i].is_finished() {
            return;
        }

        debug!("{} finished: {}", self.cases[i].id, result.status);
        report(sink, &result);
        self.states[i] = CaseState::Finished(result.status);
        let passed = result.status == TestStatus::Passed;
        self.results[i] = Some(result);

        for &d in &self.plan.dependents[i] {
            let proceed = self.plan.prerequisites[d]
                .iter()
                .find(|p| p.index == i)
                .is_some_and(|p| p.proceed_on_failure);
            if !passed && !proceed && self.failed_prerequisite[d].is_none() {
                self.failed_prerequisite[d] = Some(self.cases[i].id.clone());
            }

            self.remaining[d] -= 1;
            if self.remaining[d] == 0 {
                self.ready.push((self.cases[d].priority, Reverse(self.ranks[d])));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SharedRegistry;
    use crate::error::TestError;
    use crate::models::test_body;
    use crate::resolver::resolve;
    use crate::sink::CollectingSink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn run_cases(cases: Vec<TestCaseDescriptor>, sink: Arc<CollectingSink>) -> Vec<TestResult> {
        let plan = resolve(&cases);
        let scopes = Arc::new(ScopeRegistry::new(&cases, Arc::new(SharedRegistry::new())));
        Scheduler::new(sink)
            .run(Arc::new(cases), &plan, scopes, &CancellationToken::new())
            .await
    }

    fn ok(name: &str) -> TestCaseDescriptor {
        TestCaseDescriptor::new("S", name, test_body(|_| async { Ok(()) })).with_id(name)
    }

    fn failing(name: &str) -> TestCaseDescriptor {
        TestCaseDescriptor::new("S", name, test_body(|_| async { Err(TestError::assertion("no")) }))
            .with_id(name)
    }

    #[tokio::test]
    async fn test_every_case_reported_once() {
        let sink = Arc::new(CollectingSink::new());
        let cases = vec![ok("a"), failing("b"), ok("c").skip("wip")];
        let results = run_cases(cases, sink.clone()).await;

        assert_eq!(results.len(), 3);
        assert_eq!(sink.results().len(), 3);
        assert_eq!(results[0].status, TestStatus::Passed);
        assert_eq!(results[1].status, TestStatus::Failed);
        assert_eq!(results[2].status, TestStatus::Skipped);
        assert_eq!(results[2].message.as_deref(), Some("wip"));
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_dependent() {
        let sink = Arc::new(CollectingSink::new());
        let cases = vec![
            failing("setup"),
            ok("strict").depends_on("setup"),
            ok("lenient").depends_on_proceeding("setup"),
        ];
        let results = run_cases(cases, sink.clone()).await;

        assert_eq!(results[1].status, TestStatus::Skipped);
        assert!(results[1].message.as_ref().unwrap().contains("'setup'"));
        assert_eq!(results[2].status, TestStatus::Passed);
        assert!(!sink.started().contains(&"strict".to_string()));
    }

    #[tokio::test]
    async fn test_cycle_members_error_and_run_continues() {
        let sink = Arc::new(CollectingSink::new());
        let cases = vec![
            ok("a").depends_on("b"),
            ok("b").depends_on("a"),
            ok("c"),
            ok("d").depends_on("a"),
        ];
        let results = run_cases(cases, sink).await;

        assert_eq!(results[0].status, TestStatus::Errored);
        assert_eq!(results[1].status, TestStatus::Errored);
        assert_eq!(results[2].status, TestStatus::Passed);
        assert_eq!(results[3].status, TestStatus::Skipped);
    }

    #[tokio::test]
    async fn test_priority_orders_serial_cases() {
        let sink = Arc::new(CollectingSink::new());
        let cases = vec![
            ok("low").not_in_parallel().with_priority(1),
            ok("high").not_in_parallel().with_priority(10),
            ok("mid").not_in_parallel().with_priority(5),
        ];
        run_cases(cases, sink.clone()).await;
        assert_eq!(sink.started(), vec!["high", "mid", "low"]);
    }

    #[tokio::test]
    async fn test_released_dependent_keeps_resolved_slot() {
        let sink = Arc::new(CollectingSink::new());
        let cases = vec![
            ok("report").not_in_parallel().depends_on("load"),
            ok("load").not_in_parallel(),
            ok("audit").not_in_parallel(),
        ];
        run_cases(cases, sink.clone()).await;
        assert_eq!(sink.started(), vec!["load", "report", "audit"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fail_fast_skips_remaining() {
        let sink = Arc::new(CollectingSink::new());
        let ran = Arc::new(AtomicUsize::new(0));
        let mut cases = vec![failing("first").not_in_parallel().with_priority(1)];
        for i in 0..3 {
            let ran = ran.clone();
            cases.push(
                TestCaseDescriptor::new(
                    "S",
                    format!("later{i}"),
                    test_body(move |_| {
                        ran.fetch_add(1, Ordering::SeqCst);
                        async {
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            Ok(())
                        }
                    }),
                )
                .not_in_parallel(),
            );
        }

        let plan = resolve(&cases);
        let scopes = Arc::new(ScopeRegistry::new(&cases, Arc::new(SharedRegistry::new())));
        let cancel = CancellationToken::new();
        let results = Scheduler::new(sink)
            .with_fail_fast(true)
            .run(Arc::new(cases), &plan, scopes, &cancel)
            .await;

        assert!(cancel.is_cancelled());
        assert_eq!(results[0].status, TestStatus::Failed);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(results[1..]
            .iter()
            .all(|r| r.status == TestStatus::Skipped));
    }
}
