//! Cycle detection over the typed dependency graph.
//!
//! The store holds one multi-typed edge set; algorithms pick the subset
//! that matters to them at read time. Cycles are forbidden across
//! `blocks` and `parent-child` combined; loops through informational
//! types (`related` and friends) are legal.

use std::collections::{HashMap, HashSet, VecDeque};

use beads_core::dependency::Dependency;
use beads_core::idgen;
use beads_storage::Storage;

use crate::cancel::CancelToken;
use crate::error::Result;

/// Adjacency over the cycle-relevant subset of the edge set.
///
/// Edges to external references terminate the search; they can never
/// close a local cycle.
pub(crate) struct BlockingGraph {
    adjacency: HashMap<String, Vec<String>>,
}

impl BlockingGraph {
    /// Builds the graph from every edge record of the given stores.
    pub(crate) fn load(stores: &[&dyn Storage]) -> Result<Self> {
        let mut edges: Vec<Dependency> = Vec::new();
        for store in stores {
            edges.extend(store.get_all_dependency_records()?);
        }
        Ok(Self::from_edges(&edges))
    }

    pub(crate) fn from_edges(edges: &[Dependency]) -> Self {
        let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
        for dep in edges {
            if !dep.dep_type.forbids_cycles() {
                continue;
            }
            if idgen::is_external_ref(&dep.depends_on_id) {
                continue;
            }
            adjacency
                .entry(dep.issue_id.clone())
                .or_default()
                .push(dep.depends_on_id.clone());
        }
        Self { adjacency }
    }

    fn neighbors(&self, id: &str) -> &[String] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Finds a path `from -> ... -> to` along existing edges, if any.
    ///
    /// Used before inserting the edge `to -> from`: such a path plus the
    /// new edge is exactly the cycle the write would create.
    pub(crate) fn find_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![from.to_string()]);
        }
        let mut parents: HashMap<String, String> = HashMap::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        let mut visited: HashSet<&str> = HashSet::new();
        queue.push_back(from);
        visited.insert(from);

        while let Some(current) = queue.pop_front() {
            for next in self.neighbors(current) {
                if !visited.insert(next) {
                    continue;
                }
                parents.insert(next.clone(), current.to_string());
                if next == to {
                    let mut path = vec![to.to_string()];
                    let mut cursor = to.to_string();
                    while let Some(prev) = parents.get(&cursor) {
                        path.push(prev.clone());
                        cursor = prev.clone();
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }
        None
    }

    /// Returns every elementary cycle reachable through back edges of a
    /// DFS, deduplicated by canonical rotation.
    pub(crate) fn cycles(&self, cancel: &CancelToken) -> Result<Vec<Vec<String>>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            Gray,
            Black,
        }

        let mut colors: HashMap<&str, Color> = HashMap::new();
        let mut seen: HashSet<Vec<String>> = HashSet::new();
        let mut cycles: Vec<Vec<String>> = Vec::new();

        let mut nodes: Vec<&str> = self.adjacency.keys().map(String::as_str).collect();
        nodes.sort_unstable();

        for start in nodes {
            if colors.contains_key(start) {
                continue;
            }
            // Iterative DFS; frame = (node, next neighbor index).
            let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
            let mut path: Vec<&str> = vec![start];
            colors.insert(start, Color::Gray);

            while let Some((node, idx)) = stack.last().copied() {
                cancel.check()?;
                let neighbors = self.neighbors(node);
                if idx < neighbors.len() {
                    if let Some(frame) = stack.last_mut() {
                        frame.1 += 1;
                    }
                    let next = neighbors[idx].as_str();
                    match colors.get(next) {
                        Some(Color::Gray) => {
                            // Back edge: the cycle is the path suffix
                            // starting at `next`.
                            if let Some(pos) = path.iter().position(|n| *n == next) {
                                let cycle = canonical_rotation(
                                    path[pos..].iter().map(|s| s.to_string()).collect(),
                                );
                                if seen.insert(cycle.clone()) {
                                    cycles.push(cycle);
                                }
                            }
                        }
                        Some(Color::Black) => {}
                        None => {
                            colors.insert(next, Color::Gray);
                            path.push(next);
                            stack.push((next, 0));
                        }
                    }
                } else {
                    colors.insert(node, Color::Black);
                    path.pop();
                    stack.pop();
                }
            }
        }

        Ok(cycles)
    }
}

/// Rotates a cycle so its smallest id comes first; each distinct cycle
/// then has exactly one representation.
fn canonical_rotation(cycle: Vec<String>) -> Vec<String> {
    if cycle.is_empty() {
        return cycle;
    }
    let min_pos = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut rotated = Vec::with_capacity(cycle.len());
    rotated.extend_from_slice(&cycle[min_pos..]);
    rotated.extend_from_slice(&cycle[..min_pos]);
    rotated
}

/// Detects cycles across `blocks` and `parent-child` edges of the given
/// stores. Each cycle is reported once, smallest id first.
pub fn detect_cycles(stores: &[&dyn Storage], cancel: &CancelToken) -> Result<Vec<Vec<String>>> {
    let graph = BlockingGraph::load(stores)?;
    graph.cycles(cancel)
}

/// Returns the cycle that inserting `from -> to` would create, if any.
pub fn cycle_created_by(
    stores: &[&dyn Storage],
    from: &str,
    to: &str,
) -> Result<Option<Vec<String>>> {
    let graph = BlockingGraph::load(stores)?;
    // A path to -> ... -> from closed by the new edge from -> to.
    Ok(graph.find_path(to, from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::enums::DependencyType;

    fn edge(from: &str, to: &str, dep_type: DependencyType) -> Dependency {
        Dependency::new(from, to, dep_type, "test")
    }

    #[test]
    fn no_cycles_in_dag() {
        let edges = vec![
            edge("a", "b", DependencyType::Blocks),
            edge("b", "c", DependencyType::Blocks),
            edge("a", "c", DependencyType::ParentChild),
        ];
        let graph = BlockingGraph::from_edges(&edges);
        assert!(graph.cycles(&CancelToken::new()).unwrap().is_empty());
    }

    #[test]
    fn detects_two_cycle() {
        let edges = vec![
            edge("x", "y", DependencyType::Blocks),
            edge("y", "x", DependencyType::Blocks),
        ];
        let graph = BlockingGraph::from_edges(&edges);
        let cycles = graph.cycles(&CancelToken::new()).unwrap();
        assert_eq!(cycles, vec![vec!["x".to_string(), "y".to_string()]]);
    }

    #[test]
    fn mixed_type_cycle_detected_once() {
        // blocks + parent-child combine into one forbidden cycle.
        let edges = vec![
            edge("a", "b", DependencyType::Blocks),
            edge("b", "c", DependencyType::ParentChild),
            edge("c", "a", DependencyType::Blocks),
        ];
        let graph = BlockingGraph::from_edges(&edges);
        let cycles = graph.cycles(&CancelToken::new()).unwrap();
        assert_eq!(
            cycles,
            vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]]
        );
    }

    #[test]
    fn informational_loops_are_legal() {
        let edges = vec![
            edge("a", "b", DependencyType::Related),
            edge("b", "a", DependencyType::Related),
            edge("a", "b", DependencyType::DiscoveredFrom),
        ];
        let graph = BlockingGraph::from_edges(&edges);
        assert!(graph.cycles(&CancelToken::new()).unwrap().is_empty());
    }

    #[test]
    fn external_edges_terminate_search() {
        let edges = vec![
            edge("a", "external:beads:login", DependencyType::Blocks),
            edge("b", "a", DependencyType::Blocks),
        ];
        let graph = BlockingGraph::from_edges(&edges);
        assert!(graph.cycles(&CancelToken::new()).unwrap().is_empty());
    }

    #[test]
    fn find_path_reconstructs_route() {
        let edges = vec![
            edge("a", "b", DependencyType::Blocks),
            edge("b", "c", DependencyType::Blocks),
        ];
        let graph = BlockingGraph::from_edges(&edges);
        assert_eq!(
            graph.find_path("a", "c").unwrap(),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(graph.find_path("c", "a").is_none());
    }

    #[test]
    fn find_path_misses_unreachable_targets() {
        let edges = vec![
            edge("a", "b", DependencyType::Blocks),
            edge("c", "b", DependencyType::Blocks),
        ];
        let graph = BlockingGraph::from_edges(&edges);
        assert!(graph.find_path("a", "c").is_none());
    }

    #[test]
    fn cancel_aborts_traversal() {
        let edges = vec![edge("a", "b", DependencyType::Blocks)];
        let graph = BlockingGraph::from_edges(&edges);
        let token = CancelToken::new();
        token.cancel();
        assert!(graph.cycles(&token).is_err());
    }
}
