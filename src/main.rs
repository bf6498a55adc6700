//! nextunit sample suite
//!
//! A small registry exercising the engine: data-driven cases, a dependency
//! chain, serialized and rate-limited groups, retries, repeats, class hooks
//! and an explicit soak test.
//!
//! ## Usage
//!
//! ```bash
//! # Run everything except explicit tests
//! nextunit run
//!
//! # Only the storage category, four at a time
//! nextunit run --category storage -j 4
//!
//! # Include the soak test and write a JSON summary
//! nextunit run --explicit --format json -o results.json
//!
//! # Show what would run
//! nextunit list --detailed --filter 'Storage.*'
//! ```

use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nextunit::{
    check, check_eq, test_body, Hook, HookPhase, HookScope, LifecycleInfo, MatrixSpec,
    TestCaseDescriptor, TestError, TestRegistry, TestTemplate,
};
use nextunit::models::TestBody;

#[tokio::main]
async fn main() -> Result<()> {
    let code = nextunit::harness::run(sample_registry()).await?;
    std::process::exit(code);
}

fn sample_registry() -> TestRegistry {
    let mut registry = TestRegistry::new();
    arithmetic(&mut registry);
    storage(&mut registry);
    network(&mut registry);
    registry
}

fn arithmetic(registry: &mut TestRegistry) {
    registry
        .add(
            TestTemplate::new(
                TestCaseDescriptor::new(
                    "Arithmetic",
                    "adds",
                    test_body(|ctx| async move {
                        let a: i64 = ctx.arg(0)?;
                        let b: i64 = ctx.arg(1)?;
                        let sum: i64 = ctx.arg(2)?;
                        check_eq(sum, a + b)
                    }),
                )
                .with_category("unit"),
            )
            .with_arguments([[1, 2, 3], [-4, 4, 0], [20, 22, 42]]),
        )
        .add(
            TestTemplate::new(
                TestCaseDescriptor::new(
                    "Arithmetic",
                    "divides",
                    test_body(|ctx| async move {
                        let numerator: i64 = ctx.arg(0)?;
                        let divisor: i64 = ctx.arg(1)?;
                        let quotient = numerator
                            .checked_div(divisor)
                            .ok_or_else(|| TestError::skip("division by zero"))?;
                        check(quotient * divisor <= numerator, "quotient too large")
                    }),
                )
                .with_category("unit"),
            )
            .with_matrix(
                MatrixSpec::new()
                    .param("numerator", [10, 25, 99])
                    .param("divisor", [1, 3, 0])
                    .exclude([99, 0]),
            ),
        );
}

fn storage(registry: &mut TestRegistry) {
    let store = Arc::new(AtomicU64::new(0));

    let open_store = store.clone();
    let close_store = store.clone();
    let lifecycle = Arc::new(
        LifecycleInfo::new()
            .with(
                HookScope::Class,
                HookPhase::Before,
                Hook::new("Storage", "open", move |_| {
                    let store = open_store.clone();
                    async move {
                        store.store(0, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .with(
                HookScope::Class,
                HookPhase::After,
                Hook::new("Storage", "close", move |_| {
                    let store = close_store.clone();
                    async move {
                        store.store(0, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            ),
    );

    let storage_case = |method: &str, body: TestBody| {
        TestCaseDescriptor::new("Storage", method, body)
            .with_category("storage")
            .not_in_parallel_with(["storage"])
            .with_lifecycle(lifecycle.clone())
    };

    let writes = store.clone();
    let reads = store.clone();
    registry
        .add(storage_case(
            "writes",
            test_body(move |ctx| {
                let store = writes.clone();
                async move {
                    store.store(42, Ordering::SeqCst);
                    ctx.write_line("wrote 42");
                    Ok(())
                }
            }),
        ))
        .add(
            storage_case(
                "reads_back",
                test_body(move |_| {
                    let store = reads.clone();
                    async move { check_eq(42, store.load(Ordering::SeqCst)) }
                }),
            )
            .depends_on("Storage.writes"),
        )
        .add(
            TestTemplate::new(
                TestCaseDescriptor::new(
                    "Storage",
                    "compacts",
                    test_body(|ctx| async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        ctx.write_line(format!("segment {:?}", ctx.repeat_index()));
                        Ok(())
                    }),
                )
                .with_category("storage")
                .with_parallel_limit(2),
            )
            .repeat(4),
        )
        .add(
            TestCaseDescriptor::new(
                "Storage",
                "soak",
                test_body(|_| async {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    Ok(())
                }),
            )
            .with_category("storage")
            .explicit(Some("takes several seconds".to_string()))
            .with_timeout_ms(10_000),
        );
}

fn network(registry: &mut TestRegistry) {
    let dials = Arc::new(AtomicU64::new(0));

    registry
        .add(
            TestCaseDescriptor::new(
                "Network",
                "eventually_connects",
                test_body(move |ctx| {
                    let dials = dials.clone();
                    async move {
                        let n = dials.fetch_add(1, Ordering::SeqCst) + 1;
                        ctx.write_line(format!("dial {n}"));
                        check(n >= 2, "connection refused")
                    }
                }),
            )
            .with_category("network")
            .with_retry(3, 50)
            .flaky("remote end warms up slowly"),
        )
        .add(
            TestCaseDescriptor::new(
                "Network",
                "responds_quickly",
                test_body(|_| async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Ok(())
                }),
            )
            .with_category("network")
            .with_timeout_ms(1_000)
            .depends_on_proceeding("Network.eventually_connects"),
        )
        .add(
            TestCaseDescriptor::new("Network", "ipv6", test_body(|_| async { Ok(()) }))
                .with_category("network")
                .skip("no IPv6 route on this host"),
        );
}
