//! Shared graph traversal abstraction.
//!
//! Used for symbol reachability over usage edges and for dependent-file
//! closures over reversed import edges.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// Adjacency access plus multi-source BFS.
///
/// # Example
/// ```ignore
/// impl GraphTraversal for UsageGraph {
///     type Node = SymbolId;
///
///     fn successors(&self, node: SymbolId) -> &[SymbolId] {
///         self.adjacency.get(&node).map(|v| v.as_slice()).unwrap_or(&[])
///     }
///
///     fn contains_node(&self, node: SymbolId) -> bool {
///         self.nodes.contains(&node)
///     }
/// }
///
/// let live = graph.reachable_from(roots);
/// ```
pub trait GraphTraversal {
    type Node: Copy + Eq + Hash;

    /// Outgoing neighbours of `node`.
    fn successors(&self, node: Self::Node) -> &[Self::Node];

    fn contains_node(&self, node: Self::Node) -> bool;

    /// Every node reachable from any root, roots included.
    ///
    /// One traversal in O(|V| + |E|) however many roots are given. Roots
    /// missing from the graph are skipped.
    fn reachable_from<I>(&self, roots: I) -> HashSet<Self::Node>
    where
        I: IntoIterator<Item = Self::Node>,
    {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();

        for root in roots {
            if self.contains_node(root) && visited.insert(root) {
                queue.push_back(root);
            }
        }

        while let Some(node) = queue.pop_front() {
            for &next in self.successors(node) {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SymbolId;
    use std::collections::HashMap;

    #[derive(Default)]
    struct CallGraph {
        nodes: HashSet<SymbolId>,
        edges: HashMap<SymbolId, Vec<SymbolId>>,
    }

    impl CallGraph {
        fn call(&mut self, from: u64, to: u64) {
            self.nodes.insert(SymbolId(from));
            self.nodes.insert(SymbolId(to));
            self.edges.entry(SymbolId(from)).or_default().push(SymbolId(to));
        }
    }

    impl GraphTraversal for CallGraph {
        type Node = SymbolId;

        fn successors(&self, node: SymbolId) -> &[SymbolId] {
            self.edges.get(&node).map(|v| v.as_slice()).unwrap_or(&[])
        }

        fn contains_node(&self, node: SymbolId) -> bool {
            self.nodes.contains(&node)
        }
    }

    #[test]
    fn test_empty_roots() {
        let graph = CallGraph::default();
        assert!(graph.reachable_from(Vec::new()).is_empty());
    }

    #[test]
    fn test_multi_source_with_cycle() {
        let mut graph = CallGraph::default();
        graph.call(1, 2);
        graph.call(2, 1);
        graph.call(3, 4);
        graph.call(5, 6);

        let reachable = graph.reachable_from([SymbolId(1), SymbolId(3)]);
        assert_eq!(reachable.len(), 4);
        assert!(!reachable.contains(&SymbolId(5)));
        assert!(!reachable.contains(&SymbolId(6)));
    }

    #[test]
    fn test_unknown_root_skipped() {
        let mut graph = CallGraph::default();
        graph.call(1, 2);
        let reachable = graph.reachable_from([SymbolId(99), SymbolId(2)]);
        assert_eq!(reachable.len(), 1);
        assert!(reachable.contains(&SymbolId(2)));
    }
}
