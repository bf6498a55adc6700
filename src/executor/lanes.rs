//! Concurrency lanes
//!
//! Each parallel constraint maps to a semaphore. A case is admitted only when
//! every lane it belongs to has a free permit; admission never blocks, so
//! holding several lanes cannot deadlock.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::models::{ParallelInfo, TestCaseDescriptor};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LaneKey {
    /// Shared by `NotInParallel` cases without constraint keys
    Serial,
    /// One per constraint key
    Constraint(String),
    /// One per named parallel group
    Group(String),
    /// Per-class limit for ungrouped cases with a parallel limit
    Class { assembly: String, class: String },
}

/// Lanes a case must hold while it runs, in precedence order of the policy
pub fn lane_keys(parallel: &ParallelInfo, assembly: &str, class_name: &str) -> Vec<LaneKey> {
    if parallel.not_in_parallel {
        if parallel.constraint_keys.is_empty() {
            return vec![LaneKey::Serial];
        }
        let mut keys: Vec<LaneKey> = parallel
            .constraint_keys
            .iter()
            .cloned()
            .map(LaneKey::Constraint)
            .collect();
        keys.sort();
        keys.dedup();
        return keys;
    }

    if let Some(group) = &parallel.parallel_group {
        return vec![LaneKey::Group(group.clone())];
    }

    if parallel.parallel_limit.is_some() {
        return vec![LaneKey::Class {
            assembly: assembly.to_string(),
            class: class_name.to_string(),
        }];
    }

    Vec::new()
}

/// Permits held by one running case
#[derive(Debug)]
pub struct LanePermit {
    _permits: Vec<OwnedSemaphorePermit>,
}

/// All lanes of a run plus the optional global cap
pub struct LaneSet {
    lanes: HashMap<LaneKey, Arc<Semaphore>>,
    global: Option<Arc<Semaphore>>,
}

impl LaneSet {
    /// Size every lane from the cases that use it
    pub fn build(cases: &[TestCaseDescriptor], max_parallel: Option<usize>) -> Self {
        let mut limits: HashMap<LaneKey, Option<usize>> = HashMap::new();

        for case in cases {
            for key in lane_keys(&case.parallel, &case.assembly, &case.class_name) {
                let declared = match key {
                    LaneKey::Serial | LaneKey::Constraint(_) => Some(1),
                    LaneKey::Group(_) | LaneKey::Class { .. } => case.parallel.parallel_limit,
                };
                let entry = limits.entry(key).or_insert(declared);
                // The tightest declared limit wins
                *entry = match (*entry, declared) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
            }
        }

        let lanes = limits
            .into_iter()
            .map(|(key, limit)| {
                let permits = limit.map_or(Semaphore::MAX_PERMITS, |l| l.max(1));
                (key, Arc::new(Semaphore::new(permits)))
            })
            .collect();

        Self {
            lanes,
            global: max_parallel.map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    /// Take a permit from every lane in `keys`, or none at all
    pub fn try_admit(&self, keys: &[LaneKey]) -> Option<LanePermit> {
        let mut permits = Vec::with_capacity(keys.len() + 1);

        if let Some(global) = &self.global {
            permits.push(global.clone().try_acquire_owned().ok()?);
        }

        for key in keys {
            let lane = self.lanes.get(key)?;
            permits.push(lane.clone().try_acquire_owned().ok()?);
        }

        Some(LanePermit { _permits: permits })
    }

    pub fn available(&self, key: &LaneKey) -> Option<usize> {
        self.lanes.get(key).map(|s| s.available_permits())
    }
}
