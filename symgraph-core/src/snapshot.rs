//! Versioned, immutable analysis snapshots and diffs between them.
//!
//! A [`Snapshot`] is published behind an `Arc` and never mutated afterwards.
//! Per-file extraction and resolution results are `Arc`-shared between
//! consecutive versions, so only the files touched by a change are copied.

use crate::complexity::ComplexityReport;
use crate::depgraph::{Cycle, FileCoupling};
use crate::issues::{ImportIssue, Issue, IssueKind};
use crate::model::{
    DependencyEdge, FileState, Import, ImportId, ImportStatus, SourceFile, Symbol, SymbolId,
    UsageEdge,
};
use crate::reachability::{DeadCodeItem, EntryPoint};
use crate::resolve::{AmbiguousReference, FileResolution};
use crate::symbols::extractor::FileExtract;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Arena of graph records. Files are keyed by repository-relative path,
/// everything else by opaque id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeGraph {
    pub files: BTreeMap<String, SourceFile>,
    pub symbols: BTreeMap<SymbolId, Symbol>,
    pub imports: BTreeMap<ImportId, Import>,
    pub usage_edges: Vec<UsageEdge>,
    pub dependency_edges: Vec<DependencyEdge>,
    /// Targets of module-level references per file.
    pub module_roots: BTreeMap<String, Vec<SymbolId>>,
    pub file_states: BTreeMap<String, FileState>,
    /// First segments of absolute imports that named an in-repo module.
    /// Carried into the next pass so a deleted module's importers report
    /// an unresolved import instead of a new external package.
    #[serde(default)]
    pub internal_modules: BTreeSet<String>,
}

impl CodeGraph {
    /// Paths of files that are not tombstoned.
    pub fn live_paths(&self) -> BTreeSet<String> {
        self.files
            .values()
            .filter(|f| !f.deleted)
            .map(|f| f.path.clone())
            .collect()
    }

    pub fn symbols_in_file<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Symbol> + 'a {
        self.symbols.values().filter(move |s| s.file_path == path)
    }

    pub fn imports_in_file<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Import> + 'a {
        self.imports.values().filter(move |i| i.file_path == path)
    }

    pub fn state_of(&self, path: &str) -> FileState {
        self.file_states.get(path).copied().unwrap_or_default()
    }

    pub fn stale_file_count(&self) -> usize {
        self.file_states
            .values()
            .filter(|s| **s == FileState::Stale)
            .count()
    }

    pub fn import_count(&self, status: ImportStatus) -> usize {
        self.imports
            .values()
            .filter(|i| !i.tombstoned && i.status == status)
            .count()
    }
}

/// Output of the global stages for one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResults {
    pub dead_code: Vec<DeadCodeItem>,
    pub complexity: Vec<ComplexityReport>,
    pub cycles: Vec<Cycle>,
    pub truncated_components: Vec<Vec<String>>,
    pub coupling: Vec<FileCoupling>,
    pub entry_points: Vec<EntryPoint>,
    pub ambiguous: Vec<AmbiguousReference>,
    pub import_issues: Vec<ImportIssue>,
    pub issues: Vec<Issue>,
    /// Set after change events until the next analysis pass.
    pub stale: bool,
}

impl AnalysisResults {
    pub fn issue_counts(&self) -> BTreeMap<IssueKind, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.kind).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Full,
    Incremental,
}

impl fmt::Display for RunTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::Incremental => "incremental",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub id: u64,
    pub trigger: RunTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files_updated: usize,
    pub files_deleted: usize,
    pub symbols_marked_stale: usize,
    pub symbol_count: usize,
    pub issue_count: usize,
}

/// One published version. Cloning is cheap: every part is `Arc`-shared and
/// writers copy a part only when they change it (`Arc::make_mut`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u64,
    pub graph: Arc<CodeGraph>,
    pub analysis: Arc<AnalysisResults>,
    pub last_run: Option<AnalysisRun>,
    #[serde(skip)]
    pub extracts: Arc<BTreeMap<String, Arc<FileExtract>>>,
    #[serde(skip)]
    pub resolutions: Arc<BTreeMap<String, Arc<FileResolution>>>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.files.is_empty()
    }
}

/// Record-level changes between two snapshot versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    pub from_version: u64,
    pub to_version: u64,
    pub added_files: Vec<String>,
    pub removed_files: Vec<String>,
    pub added_symbols: Vec<SymbolId>,
    pub removed_symbols: Vec<SymbolId>,
    /// Same id, different content (lines, visibility, complexity, flags).
    pub changed_symbols: Vec<SymbolId>,
    pub added_imports: Vec<ImportId>,
    pub removed_imports: Vec<ImportId>,
    pub changed_imports: Vec<ImportId>,
    pub added_edges: Vec<UsageEdge>,
    pub removed_edges: Vec<UsageEdge>,
}

fn keyed_changes<K: Ord + Copy, V: PartialEq>(
    old: &BTreeMap<K, V>,
    new: &BTreeMap<K, V>,
) -> (Vec<K>, Vec<K>, Vec<K>) {
    let mut added = Vec::new();
    let mut changed = Vec::new();
    for (key, value) in new {
        match old.get(key) {
            None => added.push(*key),
            Some(prev) if prev != value => changed.push(*key),
            Some(_) => {}
        }
    }
    let removed = old.keys().filter(|k| !new.contains_key(*k)).copied().collect();
    (added, removed, changed)
}

impl SnapshotDiff {
    pub fn between(old: &Snapshot, new: &Snapshot) -> Self {
        let (added_symbols, removed_symbols, changed_symbols) =
            keyed_changes(&old.graph.symbols, &new.graph.symbols);
        let (added_imports, removed_imports, changed_imports) =
            keyed_changes(&old.graph.imports, &new.graph.imports);

        let old_edges: BTreeSet<&UsageEdge> = old.graph.usage_edges.iter().collect();
        let new_edges: BTreeSet<&UsageEdge> = new.graph.usage_edges.iter().collect();

        Self {
            from_version: old.version,
            to_version: new.version,
            added_files: new
                .graph
                .files
                .keys()
                .filter(|p| !old.graph.files.contains_key(*p))
                .cloned()
                .collect(),
            removed_files: old
                .graph
                .files
                .keys()
                .filter(|p| !new.graph.files.contains_key(*p))
                .cloned()
                .collect(),
            added_symbols,
            removed_symbols,
            changed_symbols,
            added_imports,
            removed_imports,
            changed_imports,
            added_edges: new_edges.difference(&old_edges).map(|e| (*e).clone()).collect(),
            removed_edges: old_edges.difference(&new_edges).map(|e| (*e).clone()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added_files.is_empty()
            && self.removed_files.is_empty()
            && self.added_symbols.is_empty()
            && self.removed_symbols.is_empty()
            && self.changed_symbols.is_empty()
            && self.added_imports.is_empty()
            && self.removed_imports.is_empty()
            && self.changed_imports.is_empty()
            && self.added_edges.is_empty()
            && self.removed_edges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileId, Language, SymbolKind, UsageKind, Visibility};

    fn symbol(id: u64, line: usize) -> Symbol {
        Symbol {
            id: SymbolId(id),
            name: format!("s{}", id),
            qualified_name: format!("m::s{}", id),
            kind: SymbolKind::Function,
            file_id: FileId(1),
            file_path: "m.py".into(),
            start_line: line,
            end_line: line,
            cyclomatic_complexity: Some(1),
            visibility: Visibility::Private,
            decorators: Vec::new(),
            parent: None,
            stale: false,
            tombstoned: false,
            metadata: BTreeMap::new(),
        }
    }

    fn snapshot(version: u64, symbols: Vec<Symbol>, edges: Vec<(u64, u64)>) -> Snapshot {
        let mut graph = CodeGraph::default();
        graph.files.insert(
            "m.py".into(),
            SourceFile {
                id: FileId(1),
                path: "m.py".into(),
                language: Language::Python,
                line_count: 10,
                content_hash: "h".into(),
                file_size: 0,
                last_modified: None,
                deleted: false,
            },
        );
        for s in symbols {
            graph.symbols.insert(s.id, s);
        }
        graph.usage_edges = edges
            .into_iter()
            .map(|(a, b)| UsageEdge {
                source: SymbolId(a),
                target: SymbolId(b),
                kind: UsageKind::Call,
                count: 1,
                stale: false,
            })
            .collect();
        Snapshot {
            version,
            graph: Arc::new(graph),
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_diff_of_identical_snapshots_is_empty() {
        let a = snapshot(1, vec![symbol(1, 1)], vec![]);
        let b = snapshot(2, vec![symbol(1, 1)], vec![]);
        let diff = SnapshotDiff::between(&a, &b);
        assert!(diff.is_empty());
        assert_eq!((diff.from_version, diff.to_version), (1, 2));
    }

    #[test]
    fn test_diff_reports_symbol_and_edge_changes() {
        let a = snapshot(1, vec![symbol(1, 1), symbol(2, 2)], vec![(1, 2)]);
        let b = snapshot(2, vec![symbol(1, 5), symbol(3, 3)], vec![(1, 3)]);
        let diff = SnapshotDiff::between(&a, &b);
        assert_eq!(diff.added_symbols, vec![SymbolId(3)]);
        assert_eq!(diff.removed_symbols, vec![SymbolId(2)]);
        assert_eq!(diff.changed_symbols, vec![SymbolId(1)]);
        assert_eq!(diff.added_edges.len(), 1);
        assert_eq!(diff.removed_edges[0].target, SymbolId(2));
        assert!(diff.added_files.is_empty());
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = Snapshot::empty();
        assert!(snap.is_empty());
        assert_eq!(snap.graph.stale_file_count(), 0);
        assert!(snap.analysis.issue_counts().is_empty());
        assert_eq!(snap.graph.state_of("x.py"), FileState::Unknown);
    }
}
