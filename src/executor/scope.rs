//! Run-scoped class, assembly and session state
//!
//! One [`ScopeRegistry`] is created per run and shared by every case task.
//! The first case entering a class (or assembly) runs its before-hooks; the
//! last case leaving it runs the after-hooks. Each scope counts down from the
//! number of cases the run holds for it, so teardown fires as soon as the
//! scope drains. Scopes left open (a cancelled run) are closed by
//! [`ScopeRegistry::finish_open_scopes`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::cancel::CancellationToken;
use super::hooks::{run_after, run_before};
use crate::data::{ScopeKey, SharedRegistry};
use crate::error::TestError;
use crate::models::{
    dedup_hooks, Hook, HookContext, HookFailure, HookId, HookPhase, HookScope, TestCaseDescriptor,
};

struct ScopeState {
    scope: HookScope,
    name: String,
    before: Vec<Hook>,
    after: Vec<Hook>,
    setup: OnceCell<Result<(), String>>,
    remaining: AtomicUsize,
    torn_down: AtomicBool,
    shared_key: ScopeKey,
}

impl ScopeState {
    fn new(scope: HookScope, name: &str, cases: &[&TestCaseDescriptor], shared_key: ScopeKey) -> Self {
        Self {
            scope,
            name: name.to_string(),
            before: dedup_hooks(cases.iter().map(|c| c.lifecycle.hooks(scope, HookPhase::Before))),
            after: dedup_hooks(cases.iter().map(|c| c.lifecycle.hooks(scope, HookPhase::After))),
            setup: OnceCell::new(),
            remaining: AtomicUsize::new(cases.len()),
            torn_down: AtomicBool::new(false),
            shared_key,
        }
    }

    fn context(&self, cancellation: &CancellationToken) -> HookContext {
        HookContext {
            scope: self.scope,
            scope_name: self.name.clone(),
            test: None,
            cancellation: cancellation.clone(),
        }
    }
}

/// Once-per-scope hook bookkeeping for a single run
pub struct ScopeRegistry {
    classes: HashMap<(String, String), ScopeState>,
    assemblies: HashMap<String, ScopeState>,
    session: ScopeState,
    shared: Arc<SharedRegistry>,
    failures: Mutex<Vec<HookFailure>>,
}

fn setup_message(scope: HookScope, id: &HookId, error: &TestError) -> String {
    format!("before-{scope} hook {id} failed: {error}")
}

impl ScopeRegistry {
    /// Collect and deduplicate the scope hooks of `cases`
    pub fn new(cases: &[TestCaseDescriptor], shared: Arc<SharedRegistry>) -> Self {
        let mut by_class: HashMap<(String, String), Vec<&TestCaseDescriptor>> = HashMap::new();
        let mut by_assembly: HashMap<String, Vec<&TestCaseDescriptor>> = HashMap::new();
        for case in cases {
            by_class
                .entry((case.assembly.clone(), case.class_name.clone()))
                .or_default()
                .push(case);
            by_assembly.entry(case.assembly.clone()).or_default().push(case);
        }

        let classes = by_class
            .into_iter()
            .map(|(key, members)| {
                let state = ScopeState::new(
                    HookScope::Class,
                    &key.1,
                    &members,
                    ScopeKey::Class {
                        assembly: key.0.clone(),
                        class: key.1.clone(),
                    },
                );
                (key, state)
            })
            .collect();

        let assemblies = by_assembly
            .into_iter()
            .map(|(name, members)| {
                let state = ScopeState::new(
                    HookScope::Assembly,
                    &name,
                    &members,
                    ScopeKey::Assembly(name.clone()),
                );
                (name, state)
            })
            .collect();

        let all: Vec<&TestCaseDescriptor> = cases.iter().collect();
        let session = ScopeState::new(HookScope::Session, "", &all, ScopeKey::Session);
        debug!(
            "Session has {} before / {} after hook(s)",
            session.before.len(),
            session.after.len()
        );

        Self {
            classes,
            assemblies,
            session,
            shared,
            failures: Mutex::new(Vec::new()),
        }
    }

    /// Run session before-hooks; later calls return the first outcome
    pub async fn run_session_setup(&self, cancel: &CancellationToken) -> Result<(), String> {
        self.setup(&self.session, cancel).await
    }

    /// Run session after-hooks once, if setup was attempted
    pub async fn run_session_teardown(&self, cancel: &CancellationToken) {
        self.teardown(&self.session, cancel).await;
    }

    /// Ensure the assembly and class of `case` are set up
    pub async fn enter(
        &self,
        case: &TestCaseDescriptor,
        cancel: &CancellationToken,
    ) -> Result<(), String> {
        if let Some(assembly) = self.assemblies.get(&case.assembly) {
            self.setup(assembly, cancel).await?;
        }
        if let Some(class) = self.class_of(case) {
            self.setup(class, cancel).await?;
        }
        Ok(())
    }

    /// Mark `case` finished, tearing down any scope it was the last member of.
    /// Must be called exactly once per case, whether it ran or not.
    pub async fn leave(&self, case: &TestCaseDescriptor, cancel: &CancellationToken) {
        if let Some(class) = self.class_of(case) {
            if class.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.teardown(class, cancel).await;
            }
        }
        if let Some(assembly) = self.assemblies.get(&case.assembly) {
            if assembly.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.teardown(assembly, cancel).await;
            }
        }
    }

    /// Tear down every class and assembly that has not been closed yet
    pub async fn finish_open_scopes(&self, cancel: &CancellationToken) {
        for class in self.classes.values() {
            self.teardown(class, cancel).await;
        }
        for assembly in self.assemblies.values() {
            self.teardown(assembly, cancel).await;
        }
    }

    /// Failures of after-hooks recorded so far
    pub fn take_failures(&self) -> Vec<HookFailure> {
        self.failures
            .lock()
            .map(|mut f| std::mem::take(&mut *f))
            .unwrap_or_default()
    }

    fn class_of(&self, case: &TestCaseDescriptor) -> Option<&ScopeState> {
        self.classes
            .get(&(case.assembly.clone(), case.class_name.clone()))
    }

    async fn setup(&self, state: &ScopeState, cancel: &CancellationToken) -> Result<(), String> {
        state
            .setup
            .get_or_init(|| async {
                if !state.before.is_empty() {
                    info!("Setting up {} {}", state.scope, state.name);
                }
                run_before(&state.before, &state.context(cancel))
                    .await
                    .map_err(|(id, e)| setup_message(state.scope, &id, &e))
            })
            .await
            .clone()
    }

    async fn teardown(&self, state: &ScopeState, cancel: &CancellationToken) {
        if state.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }

        // Nothing was set up for a scope whose cases were all skipped
        if state.setup.initialized() {
            if !state.after.is_empty() {
                info!("Tearing down {} {}", state.scope, state.name);
            }
            let failures = run_after(&state.after, &state.context(cancel)).await;
            if !failures.is_empty() {
                if let Ok(mut recorded) = self.failures.lock() {
                    recorded.extend(failures.into_iter().map(|(id, e)| HookFailure {
                        scope: state.scope,
                        scope_name: state.name.clone(),
                        hook: id.to_string(),
                        message: e.to_string(),
                    }));
                }
            }
        }

        self.shared.release(&state.shared_key);
    }
}
