//! Dead code detection by reachability over usage edges.
//!
//! Entry points (roots) are:
//! - symbols the language classifier accepts (exported API, `main`,
//!   framework decorators and base classes, configured names)
//! - targets of module-level references
//! - every symbol of a test file, traversed separately
//!
//! Performance characteristics:
//! - Graph build: O(|S| + |E|) where S = symbols, E = usage edges
//! - Reachability: two multi-source BFS passes (production, tests)
//!
//! # Confidence
//!
//! `confidence = base / (1 + a)` where `a` is the number of ambiguous
//! references that list the symbol, or an unreachable declaration nested in
//! it, as a candidate and `base` is 1.0 for `unused`, 0.9 for `test_only`
//! and 0.7 for `only_used_by_dead_code`.

use crate::common::GraphTraversal;
use crate::entry::{ClassifierRegistry, EntryReason};
use crate::model::{Language, Location, SourceFile, Symbol, SymbolId, SymbolKind, UsageEdge};
use crate::resolve::AmbiguousReference;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadCodeStatus {
    Dead,
    DeadInProduction,
    PossiblyDead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadCodeReason {
    Unused,
    TestOnly,
    OnlyUsedByDeadCode,
}

impl DeadCodeReason {
    fn base_confidence(self) -> f64 {
        match self {
            Self::Unused => 1.0,
            Self::TestOnly => 0.9,
            Self::OnlyUsedByDeadCode => 0.7,
        }
    }
}

impl fmt::Display for DeadCodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dead => "dead",
            Self::DeadInProduction => "dead_in_production",
            Self::PossiblyDead => "possibly_dead",
        })
    }
}

impl fmt::Display for DeadCodeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unused => "unused",
            Self::TestOnly => "test_only",
            Self::OnlyUsedByDeadCode => "only_used_by_dead_code",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadCodeItem {
    pub symbol_id: SymbolId,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    pub location: Location,
    pub reason: DeadCodeReason,
    pub status: DeadCodeStatus,
    pub confidence: f64,
    /// Ambiguous references naming this symbol, or an unreachable
    /// declaration nested in it, as a candidate.
    pub ambiguous_references: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryPoint {
    pub file_path: String,
    pub qualified_name: String,
    pub symbol_id: SymbolId,
    pub reason: EntryReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReachabilityReport {
    pub dead_code: Vec<DeadCodeItem>,
    pub entry_points: Vec<EntryPoint>,
    pub reachable_count: usize,
}

/// Graph state the analyzer reads.
pub struct ReachabilityInput<'a> {
    pub files: &'a BTreeMap<String, SourceFile>,
    pub symbols: &'a BTreeMap<SymbolId, Symbol>,
    pub edges: &'a [UsageEdge],
    pub module_roots: &'a BTreeMap<String, Vec<SymbolId>>,
    pub ambiguous: &'a [AmbiguousReference],
}

/// `*` prefix/suffix wildcard over names and paths.
#[derive(Debug, Clone)]
pub struct IgnorePattern {
    raw: String,
}

impl IgnorePattern {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn matches(&self, text: &str) -> bool {
        let p = self.raw.as_str();
        match (p.strip_prefix('*'), p.strip_suffix('*')) {
            _ if p == "*" => true,
            (Some(_), Some(_)) => text.contains(&p[1..p.len() - 1]),
            (Some(suffix), None) => text.ends_with(suffix),
            (None, Some(prefix)) => text.starts_with(prefix),
            (None, None) => text == p,
        }
    }

    pub fn matches_symbol(&self, symbol: &Symbol) -> bool {
        self.matches(&symbol.name)
            || self.matches(&symbol.qualified_name)
            || self.matches(&symbol.file_path)
    }
}

/// Usage edges plus class → implicit member edges.
struct UsageGraph {
    nodes: HashSet<SymbolId>,
    adjacency: HashMap<SymbolId, Vec<SymbolId>>,
}

impl GraphTraversal for UsageGraph {
    type Node = SymbolId;

    fn successors(&self, node: SymbolId) -> &[SymbolId] {
        self.adjacency.get(&node).map(|v| v.as_slice()).unwrap_or(&[])
    }

    fn contains_node(&self, node: SymbolId) -> bool {
        self.nodes.contains(&node)
    }
}

pub struct ReachabilityAnalyzer<'a> {
    registry: &'a ClassifierRegistry,
    ignore: Vec<IgnorePattern>,
}

impl<'a> ReachabilityAnalyzer<'a> {
    pub fn new(registry: &'a ClassifierRegistry, ignore: &[String]) -> Self {
        Self {
            registry,
            ignore: ignore.iter().map(IgnorePattern::new).collect(),
        }
    }

    fn is_ignored(&self, symbol: &Symbol) -> bool {
        self.ignore.iter().any(|p| p.matches_symbol(symbol))
    }

    fn build_graph(&self, input: &ReachabilityInput<'_>) -> UsageGraph {
        let mut adjacency: HashMap<SymbolId, Vec<SymbolId>> = HashMap::new();
        for edge in input.edges.iter().filter(|e| !e.stale) {
            adjacency.entry(edge.source).or_default().push(edge.target);
        }
        for member in input.symbols.values() {
            let Some(class) = member.parent.and_then(|p| input.symbols.get(&p)) else {
                continue;
            };
            if !class.kind.is_type() {
                continue;
            }
            let language = input
                .files
                .get(&class.file_path)
                .map(|f| f.language)
                .unwrap_or_else(|| Language::from_path(&class.file_path));
            if self
                .registry
                .for_language(language)
                .is_implicit_member(class, member)
            {
                adjacency.entry(class.id).or_default().push(member.id);
            }
        }
        UsageGraph {
            nodes: input.symbols.keys().copied().collect(),
            adjacency,
        }
    }

    pub fn analyze(&self, input: &ReachabilityInput<'_>) -> ReachabilityReport {
        let graph = self.build_graph(input);
        let is_test = |path: &str| self.registry.is_test_file(path);

        let mut entry_points = Vec::new();
        let mut test_roots = Vec::new();
        for symbol in input.symbols.values().filter(|s| !s.tombstoned) {
            if is_test(&symbol.file_path) {
                test_roots.push(symbol.id);
                continue;
            }
            let language = input
                .files
                .get(&symbol.file_path)
                .map(|f| f.language)
                .unwrap_or_else(|| Language::from_path(&symbol.file_path));
            let parent = symbol.parent.and_then(|p| input.symbols.get(&p));
            if let Some(reason) = self.registry.entry_reason(language, symbol, parent) {
                entry_points.push(EntryPoint {
                    file_path: symbol.file_path.clone(),
                    qualified_name: symbol.qualified_name.clone(),
                    symbol_id: symbol.id,
                    reason,
                });
            }
        }
        let mut module_roots = Vec::new();
        for (path, roots) in input.module_roots {
            if is_test(path) {
                test_roots.extend(roots.iter().copied());
            } else {
                module_roots.extend(roots.iter().copied());
            }
        }

        let production_roots: HashSet<SymbolId> = entry_points
            .iter()
            .map(|e| e.symbol_id)
            .chain(module_roots.iter().copied())
            .collect();
        for id in &module_roots {
            if let Some(symbol) = input.symbols.get(id) {
                if !entry_points.iter().any(|e| e.symbol_id == *id) {
                    entry_points.push(EntryPoint {
                        file_path: symbol.file_path.clone(),
                        qualified_name: symbol.qualified_name.clone(),
                        symbol_id: *id,
                        reason: EntryReason::ModuleScope,
                    });
                }
            }
        }

        let reachable = graph.reachable_from(production_roots.iter().copied());
        let test_reachable = graph.reachable_from(test_roots.iter().copied());

        let mut incoming: HashMap<SymbolId, usize> = HashMap::new();
        for edge in input.edges.iter().filter(|e| !e.stale && e.source != e.target) {
            *incoming.entry(edge.target).or_insert(0) += 1;
        }
        let mut ambiguity: HashMap<SymbolId, usize> = HashMap::new();
        for reference in input.ambiguous {
            for candidate in &reference.candidates {
                *ambiguity.entry(*candidate).or_insert(0) += 1;
            }
        }

        let mut children: HashMap<SymbolId, Vec<SymbolId>> = HashMap::new();
        for symbol in input.symbols.values() {
            if let Some(parent) = symbol.parent {
                children.entry(parent).or_default().push(symbol.id);
            }
        }
        // Ambiguity of a reported declaration plus the unreachable
        // declarations folded into it.
        let nested_ambiguity = |root: SymbolId| -> usize {
            let mut total = 0;
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                total += ambiguity.get(&id).copied().unwrap_or(0);
                if let Some(nested) = children.get(&id) {
                    stack.extend(nested.iter().copied().filter(|c| !reachable.contains(c)));
                }
            }
            total
        };

        let mut dead_code = Vec::new();
        for symbol in input.symbols.values() {
            if symbol.tombstoned
                || symbol.kind == SymbolKind::Import
                || reachable.contains(&symbol.id)
                || is_test(&symbol.file_path)
            {
                continue;
            }
            // Report the outermost unreachable declaration only
            if symbol.parent.is_some_and(|p| !reachable.contains(&p)) {
                continue;
            }
            if self.is_ignored(symbol) {
                continue;
            }

            let ambiguous_references = nested_ambiguity(symbol.id);
            let (status, reason) = if test_reachable.contains(&symbol.id) {
                (DeadCodeStatus::DeadInProduction, DeadCodeReason::TestOnly)
            } else if incoming.get(&symbol.id).copied().unwrap_or(0) == 0 {
                (DeadCodeStatus::Dead, DeadCodeReason::Unused)
            } else {
                (DeadCodeStatus::PossiblyDead, DeadCodeReason::OnlyUsedByDeadCode)
            };
            let status = if ambiguous_references > 0 {
                DeadCodeStatus::PossiblyDead
            } else {
                status
            };
            let confidence = reason.base_confidence() / (1.0 + ambiguous_references as f64);

            dead_code.push(DeadCodeItem {
                symbol_id: symbol.id,
                name: symbol.name.clone(),
                qualified_name: symbol.qualified_name.clone(),
                kind: symbol.kind,
                file_path: symbol.file_path.clone(),
                location: Location::from(symbol),
                reason,
                status,
                confidence,
                ambiguous_references,
            });
        }

        dead_code.sort_by(|a, b| {
            (&a.file_path, a.location.start_line, &a.qualified_name).cmp(&(
                &b.file_path,
                b.location.start_line,
                &b.qualified_name,
            ))
        });
        entry_points.sort();

        tracing::debug!(
            roots = production_roots.len(),
            test_roots = test_roots.len(),
            reachable = reachable.len(),
            dead = dead_code.len(),
            "reachability analysis complete"
        );

        ReachabilityReport {
            dead_code,
            entry_points,
            reachable_count: reachable.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EntryPointConfig;
    use crate::model::{FileId, UsageKind, Visibility};

    struct Fixture {
        files: BTreeMap<String, SourceFile>,
        symbols: BTreeMap<SymbolId, Symbol>,
        edges: Vec<UsageEdge>,
        module_roots: BTreeMap<String, Vec<SymbolId>>,
        ambiguous: Vec<AmbiguousReference>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                files: BTreeMap::new(),
                symbols: BTreeMap::new(),
                edges: Vec::new(),
                module_roots: BTreeMap::new(),
                ambiguous: Vec::new(),
            }
        }

        fn symbol(&mut self, id: u64, path: &str, name: &str, kind: SymbolKind) -> &mut Symbol {
            self.files.entry(path.to_string()).or_insert_with(|| SourceFile {
                id: FileId::for_path(path),
                path: path.to_string(),
                language: Language::from_path(path),
                line_count: 100,
                content_hash: "h".into(),
                file_size: 0,
                last_modified: None,
                deleted: false,
            });
            let symbol = Symbol {
                id: SymbolId(id),
                name: name.to_string(),
                qualified_name: format!("{}::{}", path, name),
                kind,
                file_id: FileId::for_path(path),
                file_path: path.to_string(),
                start_line: id as usize,
                end_line: id as usize,
                cyclomatic_complexity: None,
                visibility: Visibility::Private,
                decorators: Vec::new(),
                parent: None,
                stale: false,
                tombstoned: false,
                metadata: BTreeMap::new(),
            };
            self.symbols.entry(SymbolId(id)).or_insert(symbol)
        }

        fn call(&mut self, from: u64, to: u64) {
            self.edges.push(UsageEdge {
                source: SymbolId(from),
                target: SymbolId(to),
                kind: UsageKind::Call,
                count: 1,
                stale: false,
            });
        }

        fn analyze(&self, ignore: &[String]) -> ReachabilityReport {
            let registry = ClassifierRegistry::new(&EntryPointConfig::default()).unwrap();
            let analyzer = ReachabilityAnalyzer::new(&registry, ignore);
            analyzer.analyze(&ReachabilityInput {
                files: &self.files,
                symbols: &self.symbols,
                edges: &self.edges,
                module_roots: &self.module_roots,
                ambiguous: &self.ambiguous,
            })
        }
    }

    fn status_of(report: &ReachabilityReport, id: u64) -> Option<(DeadCodeStatus, DeadCodeReason)> {
        report
            .dead_code
            .iter()
            .find(|d| d.symbol_id == SymbolId(id))
            .map(|d| (d.status, d.reason))
    }

    #[test]
    fn test_classification() {
        let mut fx = Fixture::new();
        fx.symbol(1, "app.py", "main", SymbolKind::Function);
        fx.symbol(2, "app.py", "used", SymbolKind::Function);
        fx.symbol(3, "app.py", "orphan", SymbolKind::Function);
        fx.symbol(4, "app.py", "helper_of_orphan", SymbolKind::Function);
        fx.symbol(5, "app.py", "only_in_tests", SymbolKind::Function);
        fx.symbol(6, "tests/test_app.py", "test_it", SymbolKind::Function);
        fx.call(1, 2);
        fx.call(3, 4);
        fx.call(6, 5);

        let report = fx.analyze(&[]);
        assert_eq!(status_of(&report, 1), None);
        assert_eq!(status_of(&report, 2), None);
        assert_eq!(
            status_of(&report, 3),
            Some((DeadCodeStatus::Dead, DeadCodeReason::Unused))
        );
        assert_eq!(
            status_of(&report, 4),
            Some((DeadCodeStatus::PossiblyDead, DeadCodeReason::OnlyUsedByDeadCode))
        );
        assert_eq!(
            status_of(&report, 5),
            Some((DeadCodeStatus::DeadInProduction, DeadCodeReason::TestOnly))
        );
        assert_eq!(status_of(&report, 6), None);
        assert!(report
            .entry_points
            .iter()
            .any(|e| e.symbol_id == SymbolId(1) && e.reason == EntryReason::Main));
    }

    #[test]
    fn test_ambiguity_lowers_confidence() {
        let mut fx = Fixture::new();
        fx.symbol(1, "a.py", "close", SymbolKind::Function);
        fx.symbol(2, "b.py", "close", SymbolKind::Function);
        fx.symbol(3, "a.py", "unused", SymbolKind::Function);
        fx.ambiguous.push(AmbiguousReference {
            file_path: "a.py".into(),
            line: 1,
            source: None,
            name: "x.close".into(),
            candidates: vec![SymbolId(1), SymbolId(2)],
        });
        let report = fx.analyze(&[]);
        let item = report.dead_code.iter().find(|d| d.symbol_id == SymbolId(1)).unwrap();
        assert_eq!(item.status, DeadCodeStatus::PossiblyDead);
        assert_eq!(item.ambiguous_references, 1);
        assert!((item.confidence - 0.5).abs() < 1e-9);

        let plain = report.dead_code.iter().find(|d| d.symbol_id == SymbolId(3)).unwrap();
        assert!(plain.confidence > item.confidence);
    }

    #[test]
    fn test_ambiguous_member_keeps_class_possibly_dead() {
        let mut fx = Fixture::new();
        fx.symbol(1, "a.py", "entry", SymbolKind::Function).visibility = Visibility::Public;
        fx.symbol(2, "c.py", "Store", SymbolKind::Class);
        fx.symbol(3, "c.py", "save", SymbolKind::Method).parent = Some(SymbolId(2));
        fx.symbol(4, "c.py", "Other", SymbolKind::Class);
        fx.symbol(5, "c.py", "save", SymbolKind::Method).parent = Some(SymbolId(4));
        fx.symbol(6, "c.py", "Unrelated", SymbolKind::Class);
        fx.module_roots.insert("a.py".into(), vec![SymbolId(1)]);
        fx.ambiguous.push(AmbiguousReference {
            file_path: "a.py".into(),
            line: 1,
            source: Some(SymbolId(1)),
            name: "s.save".into(),
            candidates: vec![SymbolId(3), SymbolId(5)],
        });

        let report = fx.analyze(&[]);
        for class in [2, 4] {
            let item = report
                .dead_code
                .iter()
                .find(|d| d.symbol_id == SymbolId(class))
                .unwrap();
            assert_eq!(item.status, DeadCodeStatus::PossiblyDead);
            assert_eq!(item.ambiguous_references, 1);
            assert!((item.confidence - 0.5).abs() < 1e-9);
        }
        assert!(status_of(&report, 3).is_none());
        assert!(status_of(&report, 5).is_none());
        assert_eq!(
            status_of(&report, 6),
            Some((DeadCodeStatus::Dead, DeadCodeReason::Unused))
        );
    }

    #[test]
    fn test_module_roots_and_implicit_members() {
        let mut fx = Fixture::new();
        fx.symbol(1, "m.py", "Widget", SymbolKind::Class);
        fx.symbol(2, "m.py", "__init__", SymbolKind::Method).parent = Some(SymbolId(1));
        fx.symbol(3, "m.py", "render", SymbolKind::Method).parent = Some(SymbolId(1));
        fx.module_roots.insert("m.py".into(), vec![SymbolId(1)]);

        let report = fx.analyze(&[]);
        assert_eq!(status_of(&report, 1), None);
        assert_eq!(status_of(&report, 2), None);
        assert_eq!(
            status_of(&report, 3),
            Some((DeadCodeStatus::Dead, DeadCodeReason::Unused))
        );
        assert!(report
            .entry_points
            .iter()
            .any(|e| e.reason == EntryReason::ModuleScope));
    }

    #[test]
    fn test_outermost_only_and_ignore() {
        let mut fx = Fixture::new();
        fx.symbol(1, "m.py", "Legacy", SymbolKind::Class);
        fx.symbol(2, "m.py", "run", SymbolKind::Method).parent = Some(SymbolId(1));
        fx.symbol(3, "m.py", "legacy_helper", SymbolKind::Function);

        let report = fx.analyze(&[]);
        assert!(status_of(&report, 1).is_some());
        assert!(status_of(&report, 2).is_none());

        let report = fx.analyze(&["legacy_*".to_string(), "*Legacy".to_string()]);
        assert!(report.dead_code.is_empty());
    }

    #[test]
    fn test_ignore_pattern_forms() {
        assert!(IgnorePattern::new("*").matches("x"));
        assert!(IgnorePattern::new("test_*").matches("test_a"));
        assert!(IgnorePattern::new("*_old").matches("run_old"));
        assert!(IgnorePattern::new("*gen*").matches("src/generated/x.py"));
        assert!(IgnorePattern::new("exact").matches("exact"));
        assert!(!IgnorePattern::new("exact").matches("exactly"));
    }
}
