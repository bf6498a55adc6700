//! Test case descriptors
//!
//! A [`TestCaseDescriptor`] describes one concrete, runnable test instance.
//! Descriptors are built once (directly or by data expansion), never mutated
//! afterwards, and consumed exactly once by the engine.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::lifecycle::{Hook, HookPhase, HookScope, LifecycleInfo};
use crate::context::TestContext;
use crate::data::SharedInstance;
use crate::error::TestOutcome;

/// Invocation delegate of a test case
pub type TestBody = Arc<dyn Fn(TestContext) -> BoxFuture<'static, TestOutcome> + Send + Sync>;

/// Wrap an async closure as a [`TestBody`]
pub fn test_body<F, Fut>(f: F) -> TestBody
where
    F: Fn(TestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TestOutcome> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// A concrete argument value handed to a test body
#[derive(Clone)]
pub enum Argument {
    Value(serde_json::Value),
    Shared(SharedInstance),
}

impl Argument {
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Argument::Value(v) => Some(v),
            Argument::Shared(_) => None,
        }
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(v) => write!(f, "{v}"),
            Argument::Shared(s) => write!(f, "<{}>", s.type_name()),
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Value(v) => write!(f, "{v}"),
            Argument::Shared(s) => write!(f, "{}", s.type_name()),
        }
    }
}

impl From<serde_json::Value> for Argument {
    fn from(value: serde_json::Value) -> Self {
        Argument::Value(value)
    }
}

/// Parallelism policy of a test case
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelInfo {
    /// Run serially; scoped to `constraint_keys` when any are given
    pub not_in_parallel: bool,
    pub constraint_keys: Vec<String>,
    /// Named bucket whose members share one limiter
    pub parallel_group: Option<String>,
    /// Max concurrent members of the group, or of the owning class without a group
    pub parallel_limit: Option<usize>,
}

/// Edge from a test case to one of its prerequisites
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub target: String,
    pub proceed_on_failure: bool,
}

/// Retry policy
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryInfo {
    /// Max attempts; `None` means a single attempt
    pub count: Option<u32>,
    pub delay_ms: u64,
    pub is_flaky: bool,
    pub flaky_reason: Option<String>,
}

impl RetryInfo {
    pub fn max_attempts(&self) -> u32 {
        self.count.unwrap_or(1).max(1)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Timeouts declared at method, class and assembly level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutInfo {
    pub method_ms: Option<u64>,
    pub class_ms: Option<u64>,
    pub assembly_ms: Option<u64>,
}

impl TimeoutInfo {
    /// Method timeout, else class, else assembly
    pub fn effective(&self) -> Option<Duration> {
        self.method_ms
            .or(self.class_ms)
            .or(self.assembly_ms)
            .map(Duration::from_millis)
    }
}

/// One concrete, runnable test instance
#[derive(Clone)]
pub struct TestCaseDescriptor {
    /// Unique across the run after expansion
    pub id: String,
    /// Identifier of the declaration this case was expanded from
    pub logical_id: String,
    pub display_name: String,
    pub assembly: String,
    pub class_name: String,
    pub method_name: String,
    pub body: TestBody,
    pub lifecycle: Arc<LifecycleInfo>,
    pub parallel: ParallelInfo,
    pub dependencies: Vec<DependencyInfo>,
    pub skip_reason: Option<String>,
    pub explicit: bool,
    pub explicit_reason: Option<String>,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
    pub timeout: TimeoutInfo,
    pub retry: RetryInfo,
    pub repeat_index: Option<u32>,
    /// Higher runs first among otherwise unconstrained cases
    pub priority: i32,
    pub arguments: Option<Vec<Argument>>,
}

impl TestCaseDescriptor {
    /// Create a descriptor for `class_name::method_name` in the default assembly
    pub fn new(
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        body: TestBody,
    ) -> Self {
        let class_name = class_name.into();
        let method_name = method_name.into();
        let id = format!("{class_name}.{method_name}");

        Self {
            logical_id: id.clone(),
            id,
            display_name: method_name.clone(),
            assembly: "default".to_string(),
            class_name,
            method_name,
            body,
            lifecycle: Arc::new(LifecycleInfo::default()),
            parallel: ParallelInfo::default(),
            dependencies: Vec::new(),
            skip_reason: None,
            explicit: false,
            explicit_reason: None,
            categories: Vec::new(),
            tags: Vec::new(),
            timeout: TimeoutInfo::default(),
            retry: RetryInfo::default(),
            repeat_index: None,
            priority: 0,
            arguments: None,
        }
    }

    /// Override the identifier (and logical identifier)
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self.logical_id = self.id.clone();
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn in_assembly(mut self, assembly: impl Into<String>) -> Self {
        self.assembly = assembly.into();
        self
    }

    pub fn not_in_parallel(mut self) -> Self {
        self.parallel.not_in_parallel = true;
        self
    }

    pub fn not_in_parallel_with<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parallel.not_in_parallel = true;
        self.parallel
            .constraint_keys
            .extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn in_parallel_group(mut self, group: impl Into<String>) -> Self {
        self.parallel.parallel_group = Some(group.into());
        self
    }

    pub fn with_parallel_limit(mut self, limit: usize) -> Self {
        self.parallel.parallel_limit = Some(limit);
        self
    }

    /// Depend on `target`; a failed prerequisite skips this case
    pub fn depends_on(mut self, target: impl Into<String>) -> Self {
        self.dependencies.push(DependencyInfo {
            target: target.into(),
            proceed_on_failure: false,
        });
        self
    }

    /// Depend on `target` but run even if it fails
    pub fn depends_on_proceeding(mut self, target: impl Into<String>) -> Self {
        self.dependencies.push(DependencyInfo {
            target: target.into(),
            proceed_on_failure: true,
        });
        self
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }

    pub fn explicit(mut self, reason: Option<String>) -> Self {
        self.explicit = true;
        self.explicit_reason = reason;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout.method_ms = Some(ms);
        self
    }

    pub fn with_class_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout.class_ms = Some(ms);
        self
    }

    pub fn with_assembly_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout.assembly_ms = Some(ms);
        self
    }

    pub fn with_retry(mut self, count: u32, delay_ms: u64) -> Self {
        self.retry.count = Some(count);
        self.retry.delay_ms = delay_ms;
        self
    }

    pub fn flaky(mut self, reason: impl Into<String>) -> Self {
        self.retry.is_flaky = true;
        self.retry.flaky_reason = Some(reason.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_arguments(mut self, arguments: Vec<Argument>) -> Self {
        self.arguments = Some(arguments);
        self
    }

    /// Attach a hook at `scope`/`phase`
    pub fn with_hook(mut self, scope: HookScope, phase: HookPhase, hook: Hook) -> Self {
        Arc::make_mut(&mut self.lifecycle).push(scope, phase, hook);
        self
    }

    /// Share a prepared hook set, as all cases of a class do
    pub fn with_lifecycle(mut self, lifecycle: Arc<LifecycleInfo>) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// Fully qualified name used for name filtering
    pub fn full_name(&self) -> String {
        format!("{}.{}.{}", self.assembly, self.class_name, self.method_name)
    }
}

impl fmt::Debug for TestCaseDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCaseDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("class_name", &self.class_name)
            .field("parallel", &self.parallel)
            .field("dependencies", &self.dependencies)
            .field("priority", &self.priority)
            .field("arguments", &self.arguments)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for TestCaseDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}
