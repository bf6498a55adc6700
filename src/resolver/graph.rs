//! Dependency graph
//!
//! Edges point from a case to its prerequisites. A dependency target matches
//! the case with that exact ID, or else every case expanded from the
//! declaration with that logical ID. Targets naming a declaration that
//! failed to expand resolve to that failure instead of to a case.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

use super::{Diagnostic, DiagnosticCode};
use crate::models::TestCaseDescriptor;

/// Resolved edge to a prerequisite case
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Prerequisite {
    pub index: usize,
    pub proceed_on_failure: bool,
}

/// Indices refer to the case slice passed to [`resolve`]
#[derive(Clone, Debug, Default)]
pub struct ExecutionPlan {
    /// Topological order, higher priority first among ready cases
    pub order: Vec<usize>,
    pub prerequisites: Vec<Vec<Prerequisite>>,
    pub dependents: Vec<Vec<usize>>,
    /// Cases on a dependency cycle; never executed
    pub cyclic: HashSet<usize>,
    /// Per case, the first strict prerequisite that failed discovery
    pub failed_upstream: Vec<Option<String>>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ExecutionPlan {
    pub fn is_cyclic(&self, index: usize) -> bool {
        self.cyclic.contains(&index)
    }

    /// Position of every case in [`ExecutionPlan::order`]
    pub fn ranks(&self) -> Vec<usize> {
        let mut ranks = vec![0; self.order.len()];
        for (rank, &i) in self.order.iter().enumerate() {
            ranks[i] = rank;
        }
        ranks
    }

    pub fn len(&self) -> usize {
        self.prerequisites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prerequisites.is_empty()
    }
}

/// Validate and linearize the dependency graph of `cases`
pub fn resolve(cases: &[TestCaseDescriptor]) -> ExecutionPlan {
    resolve_with_failures(cases, &[])
}

/// Like [`resolve`], where `failed` holds the logical IDs of declarations
/// that produced no cases because discovery failed
pub fn resolve_with_failures(cases: &[TestCaseDescriptor], failed: &[String]) -> ExecutionPlan {
    let mut by_id: HashMap<&str, usize> = HashMap::new();
    let mut by_logical: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, case) in cases.iter().enumerate() {
        by_id.entry(case.id.as_str()).or_insert(i);
        by_logical.entry(case.logical_id.as_str()).or_default().push(i);
    }

    let mut diagnostics = Vec::new();
    let mut prerequisites: Vec<Vec<Prerequisite>> = Vec::with_capacity(cases.len());
    let mut failed_upstream: Vec<Option<String>> = vec![None; cases.len()];

    for (i, case) in cases.iter().enumerate() {
        let mut prereqs: Vec<Prerequisite> = Vec::new();

        for dep in &case.dependencies {
            let targets = match by_id.get(dep.target.as_str()) {
                Some(&j) => vec![j],
                None => by_logical
                    .get(dep.target.as_str())
                    .cloned()
                    .unwrap_or_default(),
            };

            if targets.is_empty() {
                if let Some(logical) = failed.iter().find(|f| names_declaration(f, &dep.target)) {
                    debug!("{} depends on {}, which failed discovery", case.id, logical);
                    if !dep.proceed_on_failure && failed_upstream[i].is_none() {
                        failed_upstream[i] = Some(dep.target.clone());
                    }
                    continue;
                }

                warn!(
                    "[{}] {} depends on unknown test '{}'",
                    DiagnosticCode::UnresolvedDependency.code(),
                    case.id,
                    dep.target
                );
                diagnostics.push(Diagnostic {
                    code: DiagnosticCode::UnresolvedDependency,
                    message: format!("Test '{}' depends on unknown test '{}'", case.id, dep.target),
                    test_ids: vec![case.id.clone()],
                });
                continue;
            }

            for j in targets {
                match prereqs.iter_mut().find(|p| p.index == j) {
                    Some(existing) => existing.proceed_on_failure &= dep.proceed_on_failure,
                    None => prereqs.push(Prerequisite {
                        index: j,
                        proceed_on_failure: dep.proceed_on_failure,
                    }),
                }
            }
        }

        prerequisites.push(prereqs);
    }

    let mut cyclic = HashSet::new();
    for component in cyclic_components(&prerequisites) {
        cyclic.extend(component.iter().copied());

        let path: Vec<&str> = cycle_through(&prerequisites, &component)
            .iter()
            .map(|&i| cases[i].id.as_str())
            .collect();
        let mut message = format!("Circular dependency: {}", path.join(" -> "));
        if component.len() + 1 > path.len() {
            let members: Vec<&str> = component.iter().map(|&i| cases[i].id.as_str()).collect();
            message.push_str(&format!(" (cycle members: {})", members.join(", ")));
        }
        warn!("[{}] {}", DiagnosticCode::CircularDependency.code(), message);
        diagnostics.push(Diagnostic {
            code: DiagnosticCode::CircularDependency,
            message,
            test_ids: component.iter().map(|&i| cases[i].id.clone()).collect(),
        });
    }

    // Every edge inside a component starts at a cycle member; the rest is acyclic.
    for &i in &cyclic {
        prerequisites[i].clear();
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); cases.len()];
    for (i, prereqs) in prerequisites.iter().enumerate() {
        for p in prereqs {
            dependents[p.index].push(i);
        }
    }

    let order = priority_order(cases, &prerequisites, &dependents);
    debug!(
        "Resolved {} case(s), {} diagnostic(s)",
        cases.len(),
        diagnostics.len()
    );

    ExecutionPlan {
        order,
        prerequisites,
        dependents,
        cyclic,
        failed_upstream,
        diagnostics,
    }
}

/// Whether `target` names the declaration `logical` or one of its variants
fn names_declaration(logical: &str, target: &str) -> bool {
    target == logical
        || target
            .strip_prefix(logical)
            .is_some_and(|rest| rest.starts_with('[') || rest.starts_with('#'))
}

/// Strongly connected components that contain a cycle: two or more
/// members, or one member depending on itself. Iterative Tarjan; members
/// come back sorted by declaration order.
fn cyclic_components(prerequisites: &[Vec<Prerequisite>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;

    let n = prerequisites.len();
    let mut index = vec![UNVISITED; n];
    let mut low = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0;
    let mut components = Vec::new();

    for start in 0..n {
        if index[start] != UNVISITED {
            continue;
        }

        let mut work: Vec<(usize, usize)> = vec![(start, 0)];
        index[start] = next_index;
        low[start] = next_index;
        next_index += 1;
        stack.push(start);
        on_stack[start] = true;

        while let Some(&(node, child)) = work.last() {
            if let Some(edge) = prerequisites[node].get(child) {
                if let Some(top) = work.last_mut() {
                    top.1 += 1;
                }
                let next = edge.index;
                if index[next] == UNVISITED {
                    index[next] = next_index;
                    low[next] = next_index;
                    next_index += 1;
                    stack.push(next);
                    on_stack[next] = true;
                    work.push((next, 0));
                } else if on_stack[next] {
                    low[node] = low[node].min(index[next]);
                }
                continue;
            }

            work.pop();
            if let Some(&(parent, _)) = work.last() {
                low[parent] = low[parent].min(low[node]);
            }
            if low[node] != index[node] {
                continue;
            }

            let mut component = Vec::new();
            while let Some(member) = stack.pop() {
                on_stack[member] = false;
                component.push(member);
                if member == node {
                    break;
                }
            }
            let self_loop = prerequisites[node].iter().any(|p| p.index == node);
            if component.len() > 1 || self_loop {
                component.sort_unstable();
                components.push(component);
            }
        }
    }

    components.sort_by_key(|c| c[0]);
    components
}

/// Shortest cycle through the first member of `component`, closed back on
/// its start
fn cycle_through(prerequisites: &[Vec<Prerequisite>], component: &[usize]) -> Vec<usize> {
    let start = component[0];
    let members: HashSet<usize> = component.iter().copied().collect();
    let mut came_from: HashMap<usize, usize> = HashMap::new();
    let mut queue = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        for p in &prerequisites[node] {
            if p.index == start {
                let mut path = vec![start];
                let mut at = node;
                while at != start {
                    path.push(at);
                    match came_from.get(&at) {
                        Some(&prev) => at = prev,
                        None => break,
                    }
                }
                path[1..].reverse();
                path.push(start);
                return path;
            }
            if members.contains(&p.index) && !came_from.contains_key(&p.index) {
                came_from.insert(p.index, node);
                queue.push_back(p.index);
            }
        }
    }

    vec![start, start]
}

/// Kahn's algorithm; ties broken by descending priority, then declaration order
fn priority_order(
    cases: &[TestCaseDescriptor],
    prerequisites: &[Vec<Prerequisite>],
    dependents: &[Vec<usize>],
) -> Vec<usize> {
    let mut remaining: Vec<usize> = prerequisites.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<(i32, Reverse<usize>)> = remaining
        .iter()
        .enumerate()
        .filter(|(_, n)| **n == 0)
        .map(|(i, _)| (cases[i].priority, Reverse(i)))
        .collect();

    let mut order = Vec::with_capacity(cases.len());
    while let Some((_, Reverse(i))) = ready.pop() {
        order.push(i);
        for &d in &dependents[i] {
            remaining[d] -= 1;
            if remaining[d] == 0 {
                ready.push((cases[d].priority, Reverse(d)));
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_body;

    fn case(name: &str) -> TestCaseDescriptor {
        TestCaseDescriptor::new("G", name, test_body(|_| async { Ok(()) })).with_id(name)
    }

    fn position(plan: &ExecutionPlan, i: usize) -> usize {
        plan.order.iter().position(|&x| x == i).unwrap()
    }

    #[test]
    fn test_dependency_precedes_dependent() {
        let cases = vec![case("b").depends_on("a"), case("a")];
        let plan = resolve(&cases);

        assert!(plan.diagnostics.is_empty());
        assert!(position(&plan, 1) < position(&plan, 0));
        assert_eq!(plan.dependents[1], vec![0]);
    }

    #[test]
    fn test_two_node_cycle_detected() {
        let cases = vec![case("a").depends_on("b"), case("b").depends_on("a"), case("c")];
        let plan = resolve(&cases);

        assert_eq!(plan.cyclic.len(), 2);
        assert!(plan.is_cyclic(0) && plan.is_cyclic(1));
        assert!(!plan.is_cyclic(2));

        let cycles: Vec<_> = plan
            .diagnostics
            .iter()
            .filter(|d| d.code == DiagnosticCode::CircularDependency)
            .collect();
        assert_eq!(cycles.len(), 1);
        assert!(cycles[0].to_string().starts_with("error[NEXTUNIT001]"));
        // resolver terminates and every case still gets an order slot
        assert_eq!(plan.order.len(), 3);
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let plan = resolve(&[case("a").depends_on("a")]);
        assert!(plan.is_cyclic(0));
        assert_eq!(plan.order, vec![0]);
    }

    #[test]
    fn test_cycle_closed_through_cross_edge() {
        // a -> c -> b -> a, with a -> b visited first
        let cases = vec![
            case("a").depends_on("b").depends_on("c"),
            case("b").depends_on("a"),
            case("c").depends_on("b"),
        ];
        let plan = resolve(&cases);

        assert!(plan.is_cyclic(0) && plan.is_cyclic(1) && plan.is_cyclic(2));
        assert_eq!(plan.diagnostics.len(), 1);
        assert_eq!(plan.diagnostics[0].test_ids, vec!["a", "b", "c"]);
        assert!(plan.diagnostics[0].message.contains("a -> b -> a"));
    }

    #[test]
    fn test_disjoint_cycles_reported_separately() {
        let cases = vec![
            case("a").depends_on("b"),
            case("b").depends_on("a"),
            case("x").depends_on("y"),
            case("y").depends_on("z"),
            case("z").depends_on("x"),
        ];
        let plan = resolve(&cases);

        assert_eq!(plan.cyclic.len(), 5);
        let messages: Vec<&str> = plan.diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            [
                "Circular dependency: a -> b -> a",
                "Circular dependency: x -> y -> z -> x"
            ]
        );
    }

    #[test]
    fn test_failed_declaration_is_not_unknown() {
        let cases = vec![
            case("after").depends_on("rows"),
            case("lenient").depends_on_proceeding("rows"),
            case("variant").depends_on("rows[1]"),
        ];
        let plan = resolve_with_failures(&cases, &["rows".to_string()]);

        assert!(plan.diagnostics.is_empty());
        assert_eq!(plan.failed_upstream[0].as_deref(), Some("rows"));
        assert_eq!(plan.failed_upstream[1], None);
        assert_eq!(plan.failed_upstream[2].as_deref(), Some("rows[1]"));
        assert!(plan.prerequisites.iter().all(Vec::is_empty));
    }

    #[test]
    fn test_ranks_invert_order() {
        let cases = vec![case("b").depends_on("a"), case("a"), case("c")];
        let plan = resolve(&cases);
        assert_eq!(plan.order, vec![1, 0, 2]);
        assert_eq!(plan.ranks(), vec![1, 0, 2]);
    }

    #[test]
    fn test_downstream_of_cycle_is_not_cyclic() {
        let cases = vec![
            case("a").depends_on("b"),
            case("b").depends_on("a"),
            case("c").depends_on("a"),
        ];
        let plan = resolve(&cases);
        assert!(!plan.is_cyclic(2));
        assert_eq!(plan.prerequisites[2].len(), 1);
    }

    #[test]
    fn test_unresolved_reference_is_warning() {
        let plan = resolve(&[case("a").depends_on("ghost")]);
        assert_eq!(plan.diagnostics.len(), 1);
        assert_eq!(
            plan.diagnostics[0].code,
            DiagnosticCode::UnresolvedDependency
        );
        assert!(!plan.diagnostics[0].code.is_error());
        assert!(plan.prerequisites[0].is_empty());
    }

    #[test]
    fn test_logical_id_matches_all_variants() {
        let mut v0 = case("data[0]");
        v0.logical_id = "data".into();
        let mut v1 = case("data[1]");
        v1.logical_id = "data".into();

        let plan = resolve(&[v0, v1, case("after").depends_on("data")]);
        let targets: Vec<usize> = plan.prerequisites[2].iter().map(|p| p.index).collect();
        assert_eq!(targets, vec![0, 1]);
    }

    #[test]
    fn test_priority_breaks_ties() {
        let cases = vec![
            case("low").with_priority(-1),
            case("mid"),
            case("high").with_priority(5),
        ];
        let plan = resolve(&cases);
        assert_eq!(plan.order, vec![2, 1, 0]);
    }

    #[test]
    fn test_duplicate_edges_merge_strictly() {
        let cases = vec![
            case("a"),
            case("b").depends_on_proceeding("a").depends_on("a"),
        ];
        let plan = resolve(&cases);
        assert_eq!(plan.prerequisites[1].len(), 1);
        assert!(!plan.prerequisites[1][0].proceed_on_failure);
    }
}
