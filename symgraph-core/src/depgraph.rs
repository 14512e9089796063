//! File dependency graph, coupling metrics and import cycle detection.
//!
//! Performance characteristics:
//! - Edge derivation: O(I) over resolved imports, grouped per file pair
//! - Cycle detection: Tarjan SCC in O(|V| + |E|), then one bounded BFS per
//!   file of each non-trivial component
//!
//! Nodes are added in sorted path order and neighbours are visited sorted, so
//! reported cycles are identical across runs.

use crate::common::GraphTraversal;
use crate::config::ThresholdConfig;
use crate::issues::{rules, ImportIssue, ImportIssueKind, Issue, IssueKind};
use crate::model::{DependencyEdge, DependencyKind, FileId, Import, ImportStatus};
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

/// An elementary import cycle. `files[i]` imports `files[i + 1]` and the
/// last file imports the first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cycle {
    pub files: Vec<String>,
    pub length: usize,
}

impl Cycle {
    /// `(from, to)` pairs, closing hop included.
    pub fn hops(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        let n = self.files.len();
        (0..n).map(move |i| (self.files[i].as_str(), self.files[(i + 1) % n].as_str()))
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for file in self.files.iter().chain(self.files.first()) {
            if !first {
                f.write_str(" -> ")?;
            }
            f.write_str(file)?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouplingCategory {
    HighFanOut,
    HighFanIn,
    Isolated,
    Normal,
}

impl CouplingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HighFanOut => "high_fan_out",
            Self::HighFanIn => "high_fan_in",
            Self::Isolated => "isolated",
            Self::Normal => "normal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCoupling {
    pub path: String,
    pub fan_in: usize,
    pub fan_out: usize,
    pub category: CouplingCategory,
}

/// Query view of the file graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<DependencyEdge>,
    pub cycles: Vec<Cycle>,
}

/// Cycles found plus the strongly connected components whose cycles are all
/// longer than the configured bound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleAnalysis {
    pub cycles: Vec<Cycle>,
    pub truncated_components: Vec<Vec<String>>,
}

/// File pairs connected by resolved imports. A pair is `Dynamic` only when
/// every import behind it is dynamic.
pub fn dependency_edges<'a>(
    imports: impl IntoIterator<Item = &'a Import>,
    live: &BTreeSet<String>,
) -> Vec<DependencyEdge> {
    // (from, to) → (import count, all dynamic)
    let mut pairs: BTreeMap<(&str, &str), (u32, bool)> = BTreeMap::new();

    for import in imports {
        if import.status != ImportStatus::Resolved || import.tombstoned {
            continue;
        }
        if !live.contains(&import.file_path) {
            continue;
        }
        let targets: BTreeSet<&str> = import
            .resolved_path
            .iter()
            .chain(import.submodule_paths.iter())
            .map(|s| s.as_str())
            .filter(|t| live.contains(*t))
            .collect();
        for target in targets {
            let entry = pairs
                .entry((import.file_path.as_str(), target))
                .or_insert((0, true));
            entry.0 += 1;
            entry.1 &= import.is_dynamic;
        }
    }

    pairs
        .into_iter()
        .map(|((from, to), (count, dynamic))| DependencyEdge {
            from: FileId::for_path(from),
            to: FileId::for_path(to),
            from_path: from.to_string(),
            to_path: to.to_string(),
            kind: if dynamic {
                DependencyKind::Dynamic
            } else {
                DependencyKind::Static
            },
            import_count: count,
            stale: false,
        })
        .collect()
}

fn build_graph<'a>(nodes: &'a [String], edges: &'a [DependencyEdge]) -> DiGraphMap<&'a str, ()> {
    let mut sorted: Vec<&str> = nodes.iter().map(|s| s.as_str()).collect();
    sorted.sort_unstable();
    let mut g = DiGraphMap::new();
    for node in sorted {
        g.add_node(node);
    }
    for edge in edges.iter().filter(|e| !e.stale) {
        g.add_edge(edge.from_path.as_str(), edge.to_path.as_str(), ());
    }
    g
}

fn sorted_neighbors<'a>(g: &DiGraphMap<&'a str, ()>, node: &'a str) -> Vec<&'a str> {
    let mut out: Vec<&str> = g.neighbors(node).collect();
    out.sort_unstable();
    out
}

/// Shortest cycle through `start` inside `component`, at most `max_len` hops.
fn shortest_cycle_through<'a>(
    g: &DiGraphMap<&'a str, ()>,
    start: &'a str,
    component: &BTreeSet<&'a str>,
    max_len: usize,
) -> Option<Vec<&'a str>> {
    if g.contains_edge(start, start) {
        return Some(vec![start]);
    }
    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut depth: HashMap<&str, usize> = HashMap::new();
    let mut queue = VecDeque::new();
    depth.insert(start, 1);
    queue.push_back(start);

    while let Some(node) = queue.pop_front() {
        let d = depth.get(node).copied().unwrap_or(1);
        if node != start && g.contains_edge(node, start) {
            let mut path = vec![node];
            let mut cur = node;
            while let Some(&prev) = parent.get(cur) {
                path.push(prev);
                cur = prev;
            }
            path.reverse();
            return Some(path);
        }
        if d >= max_len {
            continue;
        }
        for next in sorted_neighbors(g, node) {
            if component.contains(next) && !depth.contains_key(next) {
                depth.insert(next, d + 1);
                parent.insert(next, node);
                queue.push_back(next);
            }
        }
    }
    None
}

/// Rotates a cycle so its smallest file comes first.
fn canonical_rotation(mut path: Vec<&str>) -> Vec<&str> {
    let pivot = path
        .iter()
        .enumerate()
        .min_by_key(|(_, file)| **file)
        .map_or(0, |(i, _)| i);
    path.rotate_left(pivot);
    path
}

/// Tarjan SCC over non-stale edges, then the shortest cycle through every
/// file of each component. Cycles found from several files are reported
/// once, under their canonical rotation.
pub fn find_cycles(nodes: &[String], edges: &[DependencyEdge], max_len: usize) -> CycleAnalysis {
    let g = build_graph(nodes, edges);
    let mut analysis = CycleAnalysis::default();

    for scc in tarjan_scc(&g) {
        let component: BTreeSet<&str> = scc.iter().copied().collect();
        let Some(first) = component.iter().next().copied() else {
            continue;
        };
        if component.len() == 1 && !g.contains_edge(first, first) {
            continue;
        }

        let found: BTreeSet<Vec<&str>> = component
            .iter()
            .filter_map(|&start| shortest_cycle_through(&g, start, &component, max_len.max(1)))
            .map(canonical_rotation)
            .collect();

        if found.is_empty() {
            tracing::debug!(
                first = %first,
                size = component.len(),
                max_len,
                "no cycle within bound"
            );
            analysis
                .truncated_components
                .push(component.into_iter().map(String::from).collect());
            continue;
        }
        analysis.cycles.extend(found.into_iter().map(|path| Cycle {
            length: path.len(),
            files: path.into_iter().map(String::from).collect(),
        }));
    }

    analysis.cycles.sort();
    analysis.truncated_components.sort();
    analysis
}

/// Fan-in and fan-out over distinct neighbouring files.
pub fn coupling(
    nodes: &[String],
    edges: &[DependencyEdge],
    thresholds: &ThresholdConfig,
) -> Vec<FileCoupling> {
    let g = build_graph(nodes, edges);
    let mut out: Vec<FileCoupling> = g
        .nodes()
        .map(|node| {
            let fan_out = g
                .neighbors_directed(node, petgraph::Direction::Outgoing)
                .filter(|n| *n != node)
                .count();
            let fan_in = g
                .neighbors_directed(node, petgraph::Direction::Incoming)
                .filter(|n| *n != node)
                .count();
            let has_self_loop = g.contains_edge(node, node);
            let category = if fan_out >= thresholds.high_fan_out {
                CouplingCategory::HighFanOut
            } else if fan_in >= thresholds.high_fan_in {
                CouplingCategory::HighFanIn
            } else if fan_in == 0 && fan_out == 0 && !has_self_loop {
                CouplingCategory::Isolated
            } else {
                CouplingCategory::Normal
            };
            FileCoupling {
                path: node.to_string(),
                fan_in,
                fan_out,
                category,
            }
        })
        .collect();
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

/// Reverse import adjacency: file → files importing it.
pub struct Dependents<'a> {
    importers: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> Dependents<'a> {
    /// Stale edges are included.
    pub fn new(edges: impl IntoIterator<Item = &'a DependencyEdge>) -> Self {
        let mut importers: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in edges {
            importers
                .entry(edge.to_path.as_str())
                .or_default()
                .push(edge.from_path.as_str());
        }
        Self { importers }
    }

    /// `seeds` plus every file importing one of them, transitively.
    pub fn closure<I>(&self, seeds: I) -> HashSet<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.reachable_from(seeds)
    }
}

impl<'a> GraphTraversal for Dependents<'a> {
    type Node = &'a str;

    fn successors(&self, node: &'a str) -> &[&'a str] {
        self.importers.get(node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    fn contains_node(&self, _node: &'a str) -> bool {
        true
    }
}

/// One circular [`ImportIssue`] per hop and one `import-cycle` issue per
/// cycle, anchored at the import that opens the cycle.
pub fn cycle_findings<'a>(
    cycles: &[Cycle],
    imports: impl IntoIterator<Item = &'a Import>,
) -> (Vec<ImportIssue>, Vec<Issue>) {
    // (from, to) → first import statement behind the hop
    let mut hop_imports: HashMap<(&str, &str), &Import> = HashMap::new();
    for import in imports {
        if import.status != ImportStatus::Resolved {
            continue;
        }
        for target in import.resolved_path.iter().chain(import.submodule_paths.iter()) {
            let key = (import.file_path.as_str(), target.as_str());
            let entry = hop_imports.entry(key).or_insert(import);
            if import.line < entry.line {
                *entry = import;
            }
        }
    }

    let mut import_issues = Vec::new();
    let mut issues = Vec::new();
    for cycle in cycles {
        for (i, (from, to)) in cycle.hops().enumerate() {
            let (import_path, line) = hop_imports
                .get(&(from, to))
                .map(|imp| (imp.raw_path.clone(), imp.line))
                .unwrap_or_else(|| (to.to_string(), 0));
            if i == 0 {
                issues.push(Issue::new(
                    IssueKind::CycleDetected,
                    rules::IMPORT_CYCLE,
                    from,
                    line,
                    format!("import cycle of length {}: {}", cycle.length, cycle),
                ));
            }
            import_issues.push(ImportIssue {
                file_path: from.to_string(),
                import_path,
                kind: ImportIssueKind::Circular,
                line,
            });
        }
    }
    import_issues.sort();
    import_issues.dedup();
    (import_issues, issues)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(from: &str, to: &str) -> DependencyEdge {
        DependencyEdge {
            from: FileId::for_path(from),
            to: FileId::for_path(to),
            from_path: from.to_string(),
            to_path: to.to_string(),
            kind: DependencyKind::Static,
            import_count: 1,
            stale: false,
        }
    }

    fn nodes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn import(from: &str, to: &str, line: usize, dynamic: bool) -> Import {
        let mut imp = crate::symbols::extract_file(
            &crate::model::FileMeta::new(from, "h"),
            Ok(&crate::ast::FileAst::new(
                line,
                vec![crate::ast::AstNode::import(&format!("./{}", to), line)],
            )),
        )
        .imports
        .remove(0);
        imp.status = ImportStatus::Resolved;
        imp.resolved_path = Some(to.to_string());
        imp.is_dynamic = dynamic;
        imp
    }

    #[test]
    fn test_two_file_cycle_reported_once() {
        let analysis = find_cycles(
            &nodes(&["a.py", "b.py"]),
            &[edge("a.py", "b.py"), edge("b.py", "a.py")],
            32,
        );
        assert_eq!(analysis.cycles.len(), 1);
        assert_eq!(analysis.cycles[0].files, vec!["a.py", "b.py"]);
        assert_eq!(analysis.cycles[0].length, 2);
    }

    #[test]
    fn test_self_import_is_length_one() {
        let analysis = find_cycles(&nodes(&["a.py"]), &[edge("a.py", "a.py")], 32);
        assert_eq!(analysis.cycles.len(), 1);
        assert_eq!(analysis.cycles[0].length, 1);
        assert_eq!(analysis.cycles[0].to_string(), "a.py -> a.py");
    }

    #[test]
    fn test_shortest_cycle_per_file() {
        // a → b → c → a and a → c → a
        let edges = vec![
            edge("a", "b"),
            edge("b", "c"),
            edge("c", "a"),
            edge("a", "c"),
        ];
        let analysis = find_cycles(&nodes(&["a", "b", "c"]), &edges, 32);
        let files: Vec<_> = analysis.cycles.iter().map(|c| c.files.clone()).collect();
        assert_eq!(files, vec![nodes(&["a", "b", "c"]), nodes(&["a", "c"])]);
    }

    #[test]
    fn test_mutual_import_inside_larger_component() {
        // a → b → c → a plus c → b
        let edges = vec![
            edge("a", "b"),
            edge("b", "c"),
            edge("c", "a"),
            edge("c", "b"),
        ];
        let analysis = find_cycles(&nodes(&["a", "b", "c"]), &edges, 32);
        assert_eq!(analysis.cycles.len(), 2);
        assert_eq!(analysis.cycles[0].files, nodes(&["a", "b", "c"]));
        assert_eq!(analysis.cycles[1].files, nodes(&["b", "c"]));
        assert!(analysis.truncated_components.is_empty());
    }

    #[test]
    fn test_bound_keeps_short_cycle_of_component() {
        let edges = vec![
            edge("a", "b"),
            edge("b", "c"),
            edge("c", "a"),
            edge("c", "b"),
        ];
        let analysis = find_cycles(&nodes(&["a", "b", "c"]), &edges, 2);
        assert_eq!(analysis.cycles.len(), 1);
        assert_eq!(analysis.cycles[0].files, nodes(&["b", "c"]));
        assert!(analysis.truncated_components.is_empty());
    }

    #[test]
    fn test_circular_issue_for_inner_mutual_import() {
        let imports = vec![
            import("a", "b", 1, false),
            import("b", "c", 1, false),
            import("c", "a", 1, false),
            import("c", "b", 2, false),
        ];
        let live: BTreeSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let edges = dependency_edges(&imports, &live);
        let cycles = find_cycles(&nodes(&["a", "b", "c"]), &edges, 32).cycles;
        let (import_issues, issues) = cycle_findings(&cycles, &imports);
        assert_eq!(issues.len(), 2);
        assert!(import_issues
            .iter()
            .any(|i| i.file_path == "c" && i.import_path == "./b" && i.line == 2));
    }

    #[test]
    fn test_cycle_closes_over_existing_edges() {
        let edges = vec![
            edge("m1", "m2"),
            edge("m2", "m3"),
            edge("m3", "m4"),
            edge("m4", "m1"),
            edge("x", "m1"),
        ];
        let analysis = find_cycles(&nodes(&["m1", "m2", "m3", "m4", "x"]), &edges, 32);
        let cycle = &analysis.cycles[0];
        assert_eq!(cycle.length, 4);
        for (from, to) in cycle.hops() {
            assert!(edges.iter().any(|e| e.from_path == from && e.to_path == to));
        }
    }

    #[test]
    fn test_bounded_search_truncates() {
        let edges = vec![edge("a", "b"), edge("b", "c"), edge("c", "a")];
        let analysis = find_cycles(&nodes(&["a", "b", "c"]), &edges, 2);
        assert!(analysis.cycles.is_empty());
        assert_eq!(analysis.truncated_components, vec![nodes(&["a", "b", "c"])]);
    }

    #[test]
    fn test_stale_edges_ignored() {
        let mut back = edge("b", "a");
        back.stale = true;
        let analysis = find_cycles(&nodes(&["a", "b"]), &[edge("a", "b"), back], 32);
        assert!(analysis.cycles.is_empty());
    }

    #[test]
    fn test_coupling_categories() {
        let thresholds = ThresholdConfig {
            high_fan_in: 2,
            high_fan_out: 2,
            ..ThresholdConfig::default()
        };
        let edges = vec![
            edge("hub", "a"),
            edge("hub", "b"),
            edge("a", "b"),
        ];
        let report = coupling(&nodes(&["a", "b", "hub", "lonely"]), &edges, &thresholds);
        let category = |p: &str| report.iter().find(|c| c.path == p).unwrap().category;
        assert_eq!(category("hub"), CouplingCategory::HighFanOut);
        assert_eq!(category("b"), CouplingCategory::HighFanIn);
        assert_eq!(category("a"), CouplingCategory::Normal);
        assert_eq!(category("lonely"), CouplingCategory::Isolated);
    }

    #[test]
    fn test_dependents_closure() {
        let edges = vec![edge("app", "svc"), edge("svc", "db"), edge("cli", "app"), edge("x", "y")];
        let dependents = Dependents::new(&edges);
        let closure = dependents.closure(["db"]);
        let mut files: Vec<_> = closure.into_iter().collect();
        files.sort_unstable();
        assert_eq!(files, vec!["app", "cli", "db", "svc"]);
        assert_eq!(dependents.closure(["cli"]).len(), 1);
    }

    #[test]
    fn test_dependency_edge_kind_and_count() {
        let live: BTreeSet<String> = ["a.ts", "b.ts"].iter().map(|s| s.to_string()).collect();
        let imports = vec![
            import("a.ts", "b.ts", 1, true),
            import("a.ts", "b.ts", 2, false),
            import("b.ts", "a.ts", 3, true),
        ];
        let edges = dependency_edges(&imports, &live);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].import_count, 2);
        assert_eq!(edges[0].kind, DependencyKind::Static);
        assert_eq!(edges[1].kind, DependencyKind::Dynamic);

        let cycles = find_cycles(&nodes(&["a.ts", "b.ts"]), &edges, 8).cycles;
        let (import_issues, issues) = cycle_findings(&cycles, &imports);
        assert_eq!(import_issues.len(), 2);
        assert_eq!(import_issues[0].line, 1);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule_id, "import-cycle");
    }
}
