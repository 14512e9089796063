//! Read-only queries over one snapshot version.
//!
//! A [`Query`] borrows a snapshot; hold the `Arc<Snapshot>` returned by the
//! coordinator for as long as the answers are needed.

use crate::complexity::ComplexityReport;
use crate::depgraph::{CouplingCategory, DependencyGraph};
use crate::issues::{ImportIssue, Issue, IssueKind};
use crate::model::{FileState, ImportStatus, Language, Symbol, SymbolId, SymbolKind, UsageKind};
use crate::reachability::{DeadCodeItem, DeadCodeStatus};
use crate::snapshot::{Snapshot, SnapshotDiff};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Codebase-wide counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub version: u64,
    pub files: usize,
    pub symbols: usize,
    pub symbols_by_kind: BTreeMap<SymbolKind, usize>,
    pub usage_edges: usize,
    pub usage_edges_by_kind: BTreeMap<UsageKind, usize>,
    pub dependency_edges: usize,
    pub imports_by_status: BTreeMap<ImportStatus, usize>,
    pub stale_files: usize,
    pub stale_symbols: usize,
    pub stale_edges: usize,
    pub tombstoned_files: usize,
    pub dead_code_by_status: BTreeMap<DeadCodeStatus, usize>,
    pub cycles: usize,
    pub issues_by_kind: BTreeMap<IssueKind, usize>,
    /// True while change events are waiting for an analysis pass.
    pub analysis_stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub path: String,
    pub language: Language,
    pub line_count: usize,
    pub state: FileState,
    pub symbols: usize,
    pub imports: usize,
    pub unresolved_imports: usize,
    pub fan_in: usize,
    pub fan_out: usize,
    pub coupling: Option<CouplingCategory>,
    pub dead_code: usize,
    pub issues: usize,
    pub max_cyclomatic: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSummary {
    pub symbol: Symbol,
    /// Symbols using this one.
    pub used_by: Vec<SymbolId>,
    /// Symbols this one uses.
    pub uses: Vec<SymbolId>,
    pub dead_code: Option<DeadCodeStatus>,
    pub complexity: Option<ComplexityReport>,
}

pub struct Query<'a> {
    snapshot: &'a Snapshot,
}

impl<'a> Query<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self { snapshot }
    }

    pub fn summary(&self) -> Summary {
        let graph = &self.snapshot.graph;
        let analysis = &self.snapshot.analysis;
        let mut summary = Summary {
            version: self.snapshot.version,
            files: graph.live_paths().len(),
            usage_edges: graph.usage_edges.len(),
            dependency_edges: graph.dependency_edges.len(),
            stale_files: graph.stale_file_count(),
            tombstoned_files: graph.files.values().filter(|f| f.deleted).count(),
            cycles: analysis.cycles.len(),
            issues_by_kind: analysis.issue_counts(),
            analysis_stale: analysis.stale,
            ..Summary::default()
        };

        for symbol in graph.symbols.values().filter(|s| !s.tombstoned) {
            summary.symbols += 1;
            *summary.symbols_by_kind.entry(symbol.kind).or_insert(0) += 1;
            if symbol.stale {
                summary.stale_symbols += 1;
            }
        }
        for edge in &graph.usage_edges {
            *summary.usage_edges_by_kind.entry(edge.kind).or_insert(0) += 1;
        }
        summary.stale_edges = graph.usage_edges.iter().filter(|e| e.stale).count()
            + graph.dependency_edges.iter().filter(|e| e.stale).count();
        for status in [ImportStatus::Resolved, ImportStatus::External, ImportStatus::Unresolved] {
            let count = graph.import_count(status);
            if count > 0 {
                summary.imports_by_status.insert(status, count);
            }
        }
        for item in &analysis.dead_code {
            *summary.dead_code_by_status.entry(item.status).or_insert(0) += 1;
        }
        summary
    }

    pub fn file(&self, path: &str) -> Option<FileSummary> {
        let graph = &self.snapshot.graph;
        let analysis = &self.snapshot.analysis;
        let file = graph.files.get(path)?;
        let coupling = analysis.coupling.iter().find(|c| c.path == path);

        Some(FileSummary {
            path: file.path.clone(),
            language: file.language,
            line_count: file.line_count,
            state: graph.state_of(path),
            symbols: graph.symbols_in_file(path).filter(|s| !s.tombstoned).count(),
            imports: graph.imports_in_file(path).filter(|i| !i.tombstoned).count(),
            unresolved_imports: graph
                .imports_in_file(path)
                .filter(|i| !i.tombstoned && i.status == ImportStatus::Unresolved)
                .count(),
            fan_in: coupling.map_or(0, |c| c.fan_in),
            fan_out: coupling.map_or(0, |c| c.fan_out),
            coupling: coupling.map(|c| c.category),
            dead_code: analysis.dead_code.iter().filter(|d| d.file_path == path).count(),
            issues: analysis.issues.iter().filter(|i| i.file_path == path).count(),
            max_cyclomatic: graph
                .symbols_in_file(path)
                .filter_map(|s| s.cyclomatic_complexity)
                .max(),
        })
    }

    pub fn symbol(&self, id: SymbolId) -> Option<SymbolSummary> {
        let graph = &self.snapshot.graph;
        let analysis = &self.snapshot.analysis;
        let symbol = graph.symbols.get(&id)?;

        let mut used_by: Vec<SymbolId> = graph
            .usage_edges
            .iter()
            .filter(|e| e.target == id && e.source != id)
            .map(|e| e.source)
            .collect();
        used_by.sort();
        used_by.dedup();
        let mut uses: Vec<SymbolId> = graph
            .usage_edges
            .iter()
            .filter(|e| e.source == id && e.target != id)
            .map(|e| e.target)
            .collect();
        uses.sort();
        uses.dedup();

        Some(SymbolSummary {
            symbol: symbol.clone(),
            used_by,
            uses,
            dead_code: analysis
                .dead_code
                .iter()
                .find(|d| d.symbol_id == id)
                .map(|d| d.status),
            complexity: analysis.complexity.iter().find(|c| c.symbol_id == id).cloned(),
        })
    }

    /// Live symbols whose name or qualified name equals `name`.
    pub fn find_symbols(&self, name: &str) -> Vec<&'a Symbol> {
        self.snapshot
            .graph
            .symbols
            .values()
            .filter(|s| !s.tombstoned && (s.name == name || s.qualified_name == name))
            .collect()
    }

    pub fn dead_code(&self, min_confidence: f64) -> Vec<&'a DeadCodeItem> {
        self.snapshot
            .analysis
            .dead_code
            .iter()
            .filter(|d| d.confidence >= min_confidence)
            .collect()
    }

    pub fn import_issues(&self) -> &'a [ImportIssue] {
        &self.snapshot.analysis.import_issues
    }

    /// Live files, non-stale edges and the cycles found over them.
    pub fn dependency_graph(&self) -> DependencyGraph {
        let graph = &self.snapshot.graph;
        DependencyGraph {
            nodes: graph.live_paths().into_iter().collect(),
            edges: graph
                .dependency_edges
                .iter()
                .filter(|e| !e.stale)
                .cloned()
                .collect(),
            cycles: self.snapshot.analysis.cycles.clone(),
        }
    }

    /// Reports at or above `min_cyclomatic`, most complex first.
    pub fn complexity_report(&self, min_cyclomatic: u32) -> Vec<&'a ComplexityReport> {
        let mut reports: Vec<&ComplexityReport> = self
            .snapshot
            .analysis
            .complexity
            .iter()
            .filter(|r| r.cyclomatic >= min_cyclomatic)
            .collect();
        reports.sort_by(|a, b| {
            b.cyclomatic
                .cmp(&a.cyclomatic)
                .then_with(|| a.qualified_name.cmp(&b.qualified_name))
        });
        reports
    }

    pub fn issues(&self, kind: Option<IssueKind>) -> Vec<&'a Issue> {
        self.snapshot
            .analysis
            .issues
            .iter()
            .filter(|i| kind.map_or(true, |k| i.kind == k))
            .collect()
    }

    /// Changes from `older` to this snapshot.
    pub fn diff_since(&self, older: &Snapshot) -> SnapshotDiff {
        SnapshotDiff::between(older, self.snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstNode, FileAst, NodeKind};
    use crate::cache::ExtractionCache;
    use crate::config::SymgraphConfig;
    use crate::engine::{CancellationToken, Engine};
    use crate::model::FileMeta;
    use crate::parser::SourceUnit;

    fn analyze(units: Vec<SourceUnit>) -> Snapshot {
        Engine::new(SymgraphConfig::default())
            .unwrap()
            .full_pass(1, &units, &mut ExtractionCache::new(), &CancellationToken::new())
            .unwrap()
    }

    fn fixture() -> Snapshot {
        analyze(vec![
            SourceUnit::new(
                FileMeta::new("app.py", "1"),
                FileAst::new(
                    12,
                    vec![
                        AstNode::import_names(".util", &["load"], 1),
                        AstNode::import("missing_local_mod", 2),
                        AstNode::function("main", 3, 10).with_children(vec![
                            AstNode::branch(NodeKind::If, 4, 5),
                            AstNode::call("load", 6),
                        ]),
                        AstNode::call("main", 12),
                    ],
                ),
            ),
            SourceUnit::new(
                FileMeta::new("util.py", "2"),
                FileAst::new(
                    6,
                    vec![AstNode::function("load", 1, 2), AstNode::function("_unused", 4, 6)],
                ),
            ),
        ])
    }

    #[test]
    fn test_summary_counts() {
        let snap = fixture();
        let summary = Query::new(&snap).summary();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.symbols_by_kind[&SymbolKind::Function], 3);
        assert_eq!(summary.imports_by_status[&ImportStatus::Resolved], 1);
        assert_eq!(summary.dead_code_by_status[&DeadCodeStatus::Dead], 1);
        assert_eq!(summary.stale_symbols, 0);
        assert!(!summary.analysis_stale);
    }

    #[test]
    fn test_empty_snapshot_summary() {
        let snap = Snapshot::empty();
        let summary = Query::new(&snap).summary();
        assert_eq!(summary, Summary::default());
        assert!(Query::new(&snap).dependency_graph().nodes.is_empty());
        assert!(Query::new(&snap).file("a.py").is_none());
    }

    #[test]
    fn test_file_and_symbol_summaries() {
        let snap = fixture();
        let query = Query::new(&snap);

        let util = query.file("util.py").unwrap();
        assert_eq!(util.symbols, 2);
        assert_eq!(util.fan_in, 1);
        assert_eq!(util.dead_code, 1);

        let app = query.file("app.py").unwrap();
        assert_eq!(app.max_cyclomatic, Some(2));

        let load = query.find_symbols("load");
        let target = load.iter().find(|s| s.kind == SymbolKind::Function).unwrap();
        let summary = query.symbol(target.id).unwrap();
        assert_eq!(summary.used_by.len(), 1);
        assert!(summary.dead_code.is_none());
        assert_eq!(summary.complexity.unwrap().cyclomatic, 1);
    }

    #[test]
    fn test_filters() {
        let snap = fixture();
        let query = Query::new(&snap);
        assert_eq!(query.dead_code(0.0).len(), 1);
        assert!(query.dead_code(1.1).is_empty());
        assert_eq!(query.complexity_report(2).len(), 1);
        assert_eq!(query.complexity_report(0)[0].name, "main");
        assert!(query.issues(Some(IssueKind::CycleDetected)).is_empty());
        assert_eq!(query.dependency_graph().edges.len(), 1);
        assert!(query.diff_since(&snap).is_empty());
    }
}
