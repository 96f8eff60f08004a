//! Account dependency graph (spec.md §4.5).
//!
//! An edge `A -> B` means an event on account `A` reads account `B`'s
//! balance (e.g. a `{FULL}` transfer out of `B` into `A`, or a push/pull
//! policy that pulls from `B`). Cycle detection rejects configurations
//! the engine cannot order; the reverse-reachability query answers "which
//! accounts might need re-processing after a retroactive insert touched
//! account set S" (spec.md §4.8).

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{EngineError, Result};
use crate::model::AccountId;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// `edges[a]` is the set of accounts that `a` depends on.
    edges: FxHashMap<AccountId, FxHashSet<AccountId>>,
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&mut self, account: AccountId) {
        self.edges.entry(account).or_default();
    }

    pub fn add_dependency(&mut self, dependent: AccountId, depends_on: AccountId) {
        self.edges.entry(dependent.clone()).or_default().insert(depends_on.clone());
        self.edges.entry(depends_on).or_default();
    }

    /// Depth-first cycle search with an explicit recursion stack; returns
    /// the cycle (account ids, in order) if one exists.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(PartialEq, Clone, Copy)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: FxHashMap<&AccountId, Mark> = FxHashMap::default();
        let mut stack: Vec<AccountId> = Vec::new();

        fn visit<'a>(
            node: &'a AccountId,
            edges: &'a FxHashMap<AccountId, FxHashSet<AccountId>>,
            marks: &mut FxHashMap<&'a AccountId, Mark>,
            stack: &mut Vec<AccountId>,
        ) -> Option<Vec<String>> {
            marks.insert(node, Mark::Visiting);
            stack.push(node.clone());

            if let Some(neighbors) = edges.get(node) {
                for next in neighbors {
                    match marks.get(next) {
                        Some(Mark::Visiting) => {
                            let start = stack.iter().position(|a| a == next).unwrap_or(0);
                            let mut cycle: Vec<String> =
                                stack[start..].iter().map(|a| a.to_string()).collect();
                            cycle.push(next.to_string());
                            return Some(cycle);
                        }
                        Some(Mark::Done) => continue,
                        None => {
                            if let Some(cycle) = visit(next, edges, marks, stack) {
                                return Some(cycle);
                            }
                        }
                    }
                }
            }

            stack.pop();
            marks.insert(node, Mark::Done);
            None
        }

        for node in self.edges.keys() {
            if marks.contains_key(node) {
                continue;
            }
            if let Some(cycle) = visit(node, &self.edges, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
        None
    }

    /// Kahn's algorithm topological sort over the dependency edges,
    /// dependencies before dependents. Fails with [`EngineError::Cycle`]
    /// if the graph isn't a DAG.
    pub fn topological_order(&self) -> Result<Vec<AccountId>> {
        if let Some(cycle) = self.find_cycle() {
            return Err(EngineError::Cycle { cycle });
        }

        // in_degree[a] counts a's own dependencies: a can only be emitted
        // once every account it depends on has been emitted.
        let mut in_degree: FxHashMap<AccountId, usize> =
            self.edges.iter().map(|(a, deps)| (a.clone(), deps.len())).collect();

        let mut ready: Vec<AccountId> =
            in_degree.iter().filter(|(_, d)| **d == 0).map(|(a, _)| a.clone()).collect();
        ready.sort();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(node) = ready.pop() {
            order.push(node.clone());
            for (a, deps) in &self.edges {
                if deps.contains(&node) {
                    let d = in_degree.get_mut(a).unwrap();
                    *d -= 1;
                    if *d == 0 {
                        ready.push(a.clone());
                    }
                }
            }
            ready.sort();
        }

        Ok(order)
    }

    /// Drop any direct edge `a -> b` that is already implied by a longer
    /// path `a -> ... -> b` through some other direct dependency of `a`
    /// (spec.md §4.5: "an event directly depending on B while already
    /// transitively depending on B via another direct dep has that direct
    /// edge removed"). Assumes the graph is acyclic; call after
    /// [`Self::topological_order`] has confirmed that.
    pub fn reduce_transitive(&mut self) {
        let snapshot = self.edges.clone();
        for (node, deps) in &mut self.edges {
            let direct: Vec<AccountId> = deps.iter().cloned().collect();
            deps.retain(|dep| {
                !direct
                    .iter()
                    .any(|other| other != dep && Self::reaches(&snapshot, other, dep))
            });
        }
    }

    fn reaches(edges: &FxHashMap<AccountId, FxHashSet<AccountId>>, from: &AccountId, to: &AccountId) -> bool {
        let mut stack = vec![from.clone()];
        let mut seen = FxHashSet::default();
        while let Some(node) = stack.pop() {
            if !seen.insert(node.clone()) {
                continue;
            }
            let Some(deps) = edges.get(&node) else { continue };
            if deps.contains(to) {
                return true;
            }
            stack.extend(deps.iter().cloned());
        }
        false
    }

    /// Reverse-BFS from `changed`: every account whose events depend,
    /// directly or transitively, on an account in `changed`.
    #[must_use]
    pub fn affected_by(&self, changed: &FxHashSet<AccountId>) -> FxHashSet<AccountId> {
        let mut affected: FxHashSet<AccountId> = changed.clone();
        let mut frontier: Vec<AccountId> = changed.iter().cloned().collect();

        while let Some(node) = frontier.pop() {
            for (dependent, deps) in &self.edges {
                if deps.contains(&node) && affected.insert(dependent.clone()) {
                    frontier.push(dependent.clone());
                }
            }
        }
        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> AccountId {
        AccountId::new(s)
    }

    #[test]
    fn acyclic_graph_sorts_dependencies_first() {
        let mut g = DependencyGraph::new();
        g.add_dependency(id("checking"), id("savings"));
        let order = g.topological_order().expect("acyclic graph should sort");
        let checking_pos = order.iter().position(|a| a == &id("checking")).unwrap();
        let savings_pos = order.iter().position(|a| a == &id("savings")).unwrap();
        assert!(savings_pos < checking_pos, "dependency must precede dependent");
    }

    #[test]
    fn self_referential_cycle_is_detected() {
        let mut g = DependencyGraph::new();
        g.add_dependency(id("a"), id("b"));
        g.add_dependency(id("b"), id("a"));
        assert!(g.find_cycle().is_some());
        assert!(matches!(g.topological_order(), Err(EngineError::Cycle { .. })));
    }

    #[test]
    fn affected_by_includes_transitive_dependents() {
        let mut g = DependencyGraph::new();
        g.add_dependency(id("checking"), id("savings"));
        g.add_dependency(id("credit_card"), id("checking"));
        let affected = g.affected_by(&[id("savings")].into_iter().collect());
        assert!(affected.contains(&id("checking")));
        assert!(affected.contains(&id("credit_card")));
    }

    #[test]
    fn reduce_transitive_drops_redundant_direct_edge() {
        let mut g = DependencyGraph::new();
        // credit_card -> checking -> savings, plus a redundant direct
        // credit_card -> savings edge that's already implied.
        g.add_dependency(id("checking"), id("savings"));
        g.add_dependency(id("credit_card"), id("checking"));
        g.add_dependency(id("credit_card"), id("savings"));

        g.reduce_transitive();

        assert!(!g.edges.get(&id("credit_card")).unwrap().contains(&id("savings")));
        assert!(g.edges.get(&id("credit_card")).unwrap().contains(&id("checking")));
    }
}
