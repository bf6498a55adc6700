//! Hooks, retries and timeouts across full runs

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nextunit::{
    check, test_body, CancellationToken, CollectingSink, Engine, Hook, HookPhase, HookScope,
    LifecycleInfo, RunSummary, TestCaseDescriptor, TestFilter, TestRegistry, TestStatus,
};

async fn run(registry: &TestRegistry) -> RunSummary {
    Engine::new(Arc::new(CollectingSink::new()))
        .run(registry, &TestFilter::new(), &CancellationToken::new())
        .await
}

fn counting_hook(class: &str, name: &str, counter: &Arc<AtomicUsize>) -> Hook {
    let counter = counter.clone();
    Hook::new(class, name, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn class_hooks_run_once_around_all_members() {
    let before = Arc::new(AtomicUsize::new(0));
    let after = Arc::new(AtomicUsize::new(0));
    let lifecycle = Arc::new(
        LifecycleInfo::new()
            .with(HookScope::Class, HookPhase::Before, counting_hook("Db", "open", &before))
            .with(HookScope::Class, HookPhase::After, counting_hook("Db", "close", &after)),
    );

    let mut registry = TestRegistry::new();
    for i in 0..6 {
        registry.add(
            TestCaseDescriptor::new(
                "Db",
                format!("query{i}"),
                test_body(|_| async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(())
                }),
            )
            .with_lifecycle(lifecycle.clone()),
        );
    }

    let summary = run(&registry).await;

    assert_eq!(summary.passed, 6);
    assert_eq!(before.load(Ordering::SeqCst), 1);
    assert_eq!(after.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failing_class_setup_errors_members() {
    let ran = Arc::new(AtomicUsize::new(0));
    let lifecycle = Arc::new(LifecycleInfo::new().with(
        HookScope::Class,
        HookPhase::Before,
        Hook::new("Broken", "setup", |_| async {
            check(false, "fixture unavailable")
        }),
    ));

    let mut registry = TestRegistry::new();
    for name in ["one", "two"] {
        let ran = ran.clone();
        registry.add(
            TestCaseDescriptor::new(
                "Broken",
                name,
                test_body(move |_| {
                    ran.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                }),
            )
            .with_lifecycle(lifecycle.clone()),
        );
    }

    let summary = run(&registry).await;

    assert_eq!(summary.errors, 2);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    let message = summary.result("Broken.one").unwrap().message.clone().unwrap();
    assert!(message.contains("Broken.setup"), "{message}");
}

#[tokio::test]
async fn retry_passes_on_third_attempt() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();

    let registry = TestRegistry::new().with(
        TestCaseDescriptor::new(
            "Flaky",
            "third_time",
            test_body(move |_| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { check(n >= 3, format!("attempt {n} failed")) }
            }),
        )
        .with_retry(3, 0),
    );

    let summary = run(&registry).await;

    let result = summary.result("Flaky.third_time").unwrap();
    assert_eq!(result.status, TestStatus::Passed);
    assert_eq!(result.attempts, 3);
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retries_exhausted_reports_failure() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();

    let registry = TestRegistry::new().with(
        TestCaseDescriptor::new(
            "Flaky",
            "never",
            test_body(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { check(false, "still broken") }
            }),
        )
        .with_retry(2, 0),
    );

    let summary = run(&registry).await;

    assert_eq!(summary.result("Flaky.never").unwrap().status, TestStatus::Failed);
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn timeout_errors_case_and_run_continues() {
    let registry = TestRegistry::new()
        .with(
            TestCaseDescriptor::new(
                "Slow",
                "hangs",
                test_body(|_| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }),
            )
            .with_timeout_ms(50),
        )
        .with(TestCaseDescriptor::new("Slow", "quick", test_body(|_| async { Ok(()) })));

    let summary = tokio::time::timeout(Duration::from_secs(3), run(&registry))
        .await
        .expect("timed-out case must not hold the run");

    let hung = summary.result("Slow.hangs").unwrap();
    assert_eq!(hung.status, TestStatus::Errored);
    assert!(hung.message.as_ref().unwrap().contains("50ms"));
    assert_eq!(summary.result("Slow.quick").unwrap().status, TestStatus::Passed);
}

#[tokio::test]
async fn static_skip_never_runs_hooks() {
    let before = Arc::new(AtomicUsize::new(0));
    let registry = TestRegistry::new().with(
        TestCaseDescriptor::new("Skipped", "off", test_body(|_| async { Ok(()) }))
            .with_hook(HookScope::Test, HookPhase::Before, counting_hook("Skipped", "prep", &before))
            .skip("not on this platform"),
    );

    let summary = run(&registry).await;

    let result = summary.result("Skipped.off").unwrap();
    assert_eq!(result.status, TestStatus::Skipped);
    assert_eq!(result.message.as_deref(), Some("not on this platform"));
    assert_eq!(before.load(Ordering::SeqCst), 0);
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn assembly_hooks_run_once_per_assembly() {
    let before = Arc::new(AtomicUsize::new(0));
    let after = Arc::new(AtomicUsize::new(0));

    let mut registry = TestRegistry::new();
    let mut finished_at_teardown = Vec::new();
    for assembly in ["billing", "reports"] {
        let done = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(AtomicUsize::new(0));
        finished_at_teardown.push(seen.clone());

        let teardown = {
            let (after, done) = (after.clone(), done.clone());
            Hook::new("Fixture", "stop", move |_| {
                after.fetch_add(1, Ordering::SeqCst);
                seen.store(done.load(Ordering::SeqCst), Ordering::SeqCst);
                async { Ok(()) }
            })
        };
        let lifecycle = Arc::new(
            LifecycleInfo::new()
                .with(
                    HookScope::Assembly,
                    HookPhase::Before,
                    counting_hook("Fixture", "start", &before),
                )
                .with(HookScope::Assembly, HookPhase::After, teardown),
        );

        for class in ["Ledger", "Export"] {
            for i in 0..2 {
                let done = done.clone();
                registry.add(
                    TestCaseDescriptor::new(
                        class,
                        format!("{assembly}{i}"),
                        test_body(move |_| {
                            let done = done.clone();
                            async move {
                                tokio::time::sleep(Duration::from_millis(10)).await;
                                done.fetch_add(1, Ordering::SeqCst);
                                Ok(())
                            }
                        }),
                    )
                    .in_assembly(assembly)
                    .with_lifecycle(lifecycle.clone()),
                );
            }
        }
    }

    let summary = run(&registry).await;

    assert_eq!(summary.passed, 8);
    assert_eq!(before.load(Ordering::SeqCst), 2);
    assert_eq!(after.load(Ordering::SeqCst), 2);
    for seen in finished_at_teardown {
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }
}

#[tokio::test]
async fn assembly_hook_declared_by_each_class_runs_once() {
    let before = Arc::new(AtomicUsize::new(0));
    let mut registry = TestRegistry::new();
    for class in ["Users", "Groups", "Roles"] {
        registry.add(
            TestCaseDescriptor::new(class, "list", test_body(|_| async { Ok(()) }))
                .in_assembly("directory")
                .with_hook(
                    HookScope::Assembly,
                    HookPhase::Before,
                    counting_hook("Directory", "seed", &before),
                ),
        );
    }

    let summary = run(&registry).await;

    assert_eq!(summary.passed, 3);
    assert_eq!(before.load(Ordering::SeqCst), 1);
}
