//! Per-case execution
//!
//! Wraps one test body in its scope setup, test hooks, retry loop, timeout
//! and cancellation, and maps the final outcome to a [`TestResult`].

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::cancel::CancellationToken;
use super::hooks::{invoke_body, run_after, run_before};
use super::scope::ScopeRegistry;
use crate::context::TestContext;
use crate::error::{TestError, TestOutcome};
use crate::models::{CaseState, HookContext, HookScope, TestCaseDescriptor, TestResult};
use crate::sink::ResultSink;
use crate::utils::Timer;

/// Runs single test cases against a shared scope registry
#[derive(Clone)]
pub struct CaseRunner {
    scopes: Arc<ScopeRegistry>,
    cancel: CancellationToken,
    sink: Option<Arc<dyn ResultSink>>,
}

impl CaseRunner {
    pub fn new(scopes: Arc<ScopeRegistry>, cancel: CancellationToken) -> Self {
        Self {
            scopes,
            cancel,
            sink: None,
        }
    }

    /// Notify `sink` of retries
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run `case` to a terminal result. Always leaves the case's scopes.
    pub async fn run(&self, case: &TestCaseDescriptor) -> TestResult {
        let timer = Timer::start(&case.id);
        let token = self.cancel.child();
        let ctx = TestContext::new(case, token.clone());

        let result = match self.scopes.enter(case, &self.cancel).await {
            Ok(()) => self.run_entered(case, &ctx, &token).await,
            Err(message) => TestResult::error(case, message),
        };

        self.scopes.leave(case, &self.cancel).await;
        let (output, artifacts) = ctx.take_captured();
        result
            .with_duration(timer.finish().duration_ms)
            .with_output(output, artifacts)
    }

    async fn run_entered(
        &self,
        case: &TestCaseDescriptor,
        ctx: &TestContext,
        token: &CancellationToken,
    ) -> TestResult {
        let hook_ctx = HookContext {
            scope: HookScope::Test,
            scope_name: case.class_name.clone(),
            test: Some(ctx.clone()),
            cancellation: token.clone(),
        };

        let (outcome, attempts) = match run_before(&case.lifecycle.before_test, &hook_ctx).await {
            Ok(()) => self.attempt_loop(case, ctx, token).await,
            Err((id, TestError::Framework(msg))) => (
                Err(TestError::framework(format!("before-test hook {id}: {msg}"))),
                0,
            ),
            Err((_, e)) => (Err(e), 0),
        };

        // After-test hooks run even when setup or the body failed
        let after_failures = run_after(&case.lifecycle.after_test, &hook_ctx).await;
        let outcome = match (outcome, after_failures.into_iter().next()) {
            (Ok(()), Some((id, e))) => Err(TestError::framework(format!(
                "after-test hook {id}: {e}"
            ))),
            (outcome, _) => outcome,
        };

        to_result(case, outcome).with_attempts(attempts)
    }

    /// Run the body until it passes, fails for a non-retryable reason, or
    /// runs out of attempts. Test hooks are not rerun between attempts.
    async fn attempt_loop(
        &self,
        case: &TestCaseDescriptor,
        ctx: &TestContext,
        token: &CancellationToken,
    ) -> (TestOutcome, u32) {
        let max_attempts = case.retry.max_attempts();
        let mut attempt = 1;

        loop {
            let outcome = self.attempt(case, &ctx.for_attempt(attempt), token).await;

            match outcome {
                Err(e) if e.is_retryable() && attempt < max_attempts && !token.is_cancelled() => {
                    info!(
                        "{} failed attempt {}/{}, retrying: {}",
                        case.id, attempt, max_attempts, e
                    );
                    attempt += 1;
                    debug!("{} -> {:?}", case.id, CaseState::Retrying { attempt });
                    if let Some(sink) = &self.sink {
                        sink.on_retry(case, attempt, &e);
                    }
                    if !delay(case.retry.delay(), token).await {
                        return (Err(TestError::Cancelled), attempt - 1);
                    }
                }
                outcome => return (outcome, attempt),
            }
        }
    }

    async fn attempt(
        &self,
        case: &TestCaseDescriptor,
        ctx: &TestContext,
        token: &CancellationToken,
    ) -> TestOutcome {
        let body = invoke_body((case.body)(ctx.clone()));

        let bounded = async {
            match case.timeout.effective() {
                Some(limit) => match tokio::time::timeout(limit, body).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!("{} timed out after {}ms", case.id, limit.as_millis());
                        token.cancel();
                        Err(TestError::Timeout(limit.as_millis() as u64))
                    }
                },
                None => body.await,
            }
        };

        tokio::select! {
            outcome = bounded => outcome,
            _ = self.cancel.cancelled() => Err(TestError::Cancelled),
        }
    }
}

/// Sleep for `duration`; false if the token fired first
async fn delay(duration: Duration, token: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !token.is_cancelled();
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = token.cancelled() => false,
    }
}

fn to_result(case: &TestCaseDescriptor, outcome: TestOutcome) -> TestResult {
    match outcome {
        Ok(()) => TestResult::pass(case, 0),
        Err(TestError::Assertion(failure)) => {
            TestResult::fail(case, 0, failure.to_string()).with_diff(failure.diff())
        }
        Err(TestError::Skip(reason)) => TestResult::skip(case, reason),
        Err(e @ (TestError::Framework(_) | TestError::Timeout(_) | TestError::Cancelled)) => {
            TestResult::error(case, e.to_string())
        }
    }
}
