//! Hook and body invocation
//!
//! Test bodies and hooks run behind `catch_unwind` so a panic becomes a
//! reported outcome rather than a crashed run. A panicking body counts as an
//! assertion failure (`assert!` panics); a panicking hook is a framework error.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error};

use crate::error::{TestError, TestOutcome};
use crate::models::{Hook, HookContext, HookId};

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Await a test body, mapping a panic to an assertion failure
pub async fn invoke_body(body: BoxFuture<'static, TestOutcome>) -> TestOutcome {
    match AssertUnwindSafe(body).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(TestError::assertion(panic_message(payload))),
    }
}

async fn invoke_hook(hook: &Hook, ctx: HookContext) -> TestOutcome {
    debug!("Running {} {} hook {}", ctx.scope, ctx.scope_name, hook.id);
    match AssertUnwindSafe((hook.func)(ctx)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(TestError::Framework(msg))) => Err(TestError::Framework(msg)),
        Ok(Err(TestError::Skip(reason))) => Err(TestError::Skip(reason)),
        Ok(Err(TestError::Cancelled)) => Err(TestError::Cancelled),
        Ok(Err(other)) => Err(TestError::Framework(format!("hook {} failed: {other}", hook.id))),
        Err(payload) => Err(TestError::Framework(format!(
            "hook {} panicked: {}",
            hook.id,
            panic_message(payload)
        ))),
    }
}

/// Run `hooks` in order, stopping at the first failure
pub async fn run_before(hooks: &[Hook], ctx: &HookContext) -> Result<(), (HookId, TestError)> {
    for hook in hooks {
        if let Err(e) = invoke_hook(hook, ctx.clone()).await {
            error!("Before-{} hook {} failed: {}", ctx.scope, hook.id, e);
            return Err((hook.id.clone(), e));
        }
    }
    Ok(())
}

/// Run every hook in `hooks`, collecting failures
pub async fn run_after(hooks: &[Hook], ctx: &HookContext) -> Vec<(HookId, TestError)> {
    let mut failures = Vec::new();
    for hook in hooks {
        if let Err(e) = invoke_hook(hook, ctx.clone()).await {
            error!("After-{} hook {} failed: {}", ctx.scope, hook.id, e);
            failures.push((hook.id.clone(), e));
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CancellationToken;
    use crate::models::HookScope;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn ctx() -> HookContext {
        HookContext {
            scope: HookScope::Class,
            scope_name: "C".into(),
            test: None,
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_body_panic_becomes_assertion() {
        async fn asserting() -> TestOutcome {
            let values: Vec<u8> = Vec::new();
            assert!(!values.is_empty(), "left != right");
            Ok(())
        }

        let outcome = invoke_body(asserting().boxed()).await;
        match outcome {
            Err(TestError::Assertion(f)) => assert!(f.message.contains("left != right")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_before_stops_at_first_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c1 = calls.clone();
        let c2 = calls.clone();
        let hooks = vec![
            Hook::new("C", "fails", move |_| {
                c1.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError::framework("db down")) }
            }),
            Hook::new("C", "never", move |_| {
                c2.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            }),
        ];

        let (id, err) = run_before(&hooks, &ctx()).await.unwrap_err();
        assert_eq!(id.name, "fails");
        assert!(matches!(err, TestError::Framework(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_after_runs_all_and_maps_assertions() {
        let hooks = vec![
            Hook::new("C", "assert", |_| async { Err(TestError::assertion("nope")) }),
            Hook::new("C", "panics", |_| async {
                let values: Vec<u8> = Vec::new();
                assert!(!values.is_empty(), "boom");
                Ok(())
            }),
            Hook::new("C", "ok", |_| async { Ok(()) }),
        ];

        let failures = run_after(&hooks, &ctx()).await;
        assert_eq!(failures.len(), 2);
        assert!(failures
            .iter()
            .all(|(_, e)| matches!(e, TestError::Framework(_))));
    }
}
