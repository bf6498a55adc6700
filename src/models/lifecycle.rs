//! Lifecycle hooks
//!
//! Hooks run before/after a test, a class, an assembly or the whole session.
//! Class, assembly and session hooks are identified by declaring type and
//! name so that the same hook referenced from many cases runs once.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::context::TestContext;
use crate::error::TestOutcome;
use crate::executor::CancellationToken;

/// Granularity at which a hook runs once
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookScope {
    Test,
    Class,
    Assembly,
    Session,
}

impl fmt::Display for HookScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookScope::Test => write!(f, "test"),
            HookScope::Class => write!(f, "class"),
            HookScope::Assembly => write!(f, "assembly"),
            HookScope::Session => write!(f, "session"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookPhase {
    Before,
    After,
}

/// Context handed to a hook invocation
#[derive(Clone)]
pub struct HookContext {
    pub scope: HookScope,
    /// Class or assembly name; empty for session hooks
    pub scope_name: String,
    /// Present for test-scoped hooks only
    pub test: Option<TestContext>,
    pub cancellation: CancellationToken,
}

pub type HookFn = Arc<dyn Fn(HookContext) -> BoxFuture<'static, TestOutcome> + Send + Sync>;

/// Declaring type + method name
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HookId {
    pub declaring_type: String,
    pub name: String,
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.declaring_type, self.name)
    }
}

#[derive(Clone)]
pub struct Hook {
    pub id: HookId,
    pub func: HookFn,
}

impl Hook {
    pub fn new<F, Fut>(declaring_type: impl Into<String>, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TestOutcome> + Send + 'static,
    {
        Self {
            id: HookId {
                declaring_type: declaring_type.into(),
                name: name.into(),
            },
            func: Arc::new(move |ctx| f(ctx).boxed()),
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hook({})", self.id)
    }
}

/// Ordered hook lists per scope and phase
#[derive(Clone, Debug, Default)]
pub struct LifecycleInfo {
    pub before_test: Vec<Hook>,
    pub after_test: Vec<Hook>,
    pub before_class: Vec<Hook>,
    pub after_class: Vec<Hook>,
    pub before_assembly: Vec<Hook>,
    pub after_assembly: Vec<Hook>,
    pub before_session: Vec<Hook>,
    pub after_session: Vec<Hook>,
}

impl LifecycleInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hooks(&self, scope: HookScope, phase: HookPhase) -> &[Hook] {
        match (scope, phase) {
            (HookScope::Test, HookPhase::Before) => &self.before_test,
            (HookScope::Test, HookPhase::After) => &self.after_test,
            (HookScope::Class, HookPhase::Before) => &self.before_class,
            (HookScope::Class, HookPhase::After) => &self.after_class,
            (HookScope::Assembly, HookPhase::Before) => &self.before_assembly,
            (HookScope::Assembly, HookPhase::After) => &self.after_assembly,
            (HookScope::Session, HookPhase::Before) => &self.before_session,
            (HookScope::Session, HookPhase::After) => &self.after_session,
        }
    }

    pub fn push(&mut self, scope: HookScope, phase: HookPhase, hook: Hook) {
        let list = match (scope, phase) {
            (HookScope::Test, HookPhase::Before) => &mut self.before_test,
            (HookScope::Test, HookPhase::After) => &mut self.after_test,
            (HookScope::Class, HookPhase::Before) => &mut self.before_class,
            (HookScope::Class, HookPhase::After) => &mut self.after_class,
            (HookScope::Assembly, HookPhase::Before) => &mut self.before_assembly,
            (HookScope::Assembly, HookPhase::After) => &mut self.after_assembly,
            (HookScope::Session, HookPhase::Before) => &mut self.before_session,
            (HookScope::Session, HookPhase::After) => &mut self.after_session,
        };
        list.push(hook);
    }

    pub fn with(mut self, scope: HookScope, phase: HookPhase, hook: Hook) -> Self {
        self.push(scope, phase, hook);
        self
    }
}

/// Merge hook lists, keeping the first occurrence of each [`HookId`]
pub fn dedup_hooks<'a>(lists: impl IntoIterator<Item = &'a [Hook]>) -> Vec<Hook> {
    let mut seen = std::collections::HashSet::new();
    let mut merged = Vec::new();
    for list in lists {
        for hook in list {
            if seen.insert(hook.id.clone()) {
                merged.push(hook.clone());
            }
        }
    }
    merged
}
