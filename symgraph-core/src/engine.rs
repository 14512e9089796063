//! Analysis pipeline: extraction, resolution and the global stages.
//!
//! Performance characteristics:
//! - Extraction: parallel per file via Rayon, O(changed files) with a warm
//!   extraction cache
//! - Import resolution: parallel, every file, string work only
//! - Usage resolution: parallel over dirty files; other files reuse the
//!   previous snapshot's results
//! - Global stages (cycles, coupling, reachability, complexity): single
//!   threaded over the assembled graph
//!
//! A barrier separates extraction from resolution: the symbol table is built
//! once from all extracts and only read afterwards.

use crate::cache::ExtractionCache;
use crate::complexity::{complexity_reports, FunctionMetrics};
use crate::config::SymgraphConfig;
use crate::depgraph::{coupling, cycle_findings, dependency_edges, find_cycles, CycleAnalysis, Dependents};
use crate::entry::ClassifierRegistry;
use crate::error::{SymgraphError, SymgraphResult};
use crate::issues::{ImportIssue, ImportIssueKind};
use crate::model::{FileMeta, FileState, Import, ImportId, ImportStatus, SymbolId};
use crate::parser::SourceUnit;
use crate::reachability::{ReachabilityAnalyzer, ReachabilityInput};
use crate::resolve::{resolve_imports, FileResolution, ImportResolver, UsageResolver};
use crate::snapshot::{AnalysisResults, CodeGraph, Snapshot};
use crate::symbols::extractor::{extract_file, FileExtract};
use crate::symbols::SymbolTable;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation, checked between file units.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of extracting a single unit.
enum UnitOutcome {
    Cached(Arc<FileExtract>),
    Extracted(Arc<FileExtract>),
    Cancelled,
}

/// Cache hits keep the extract but take the latest size and mtime.
fn refresh(hit: Arc<FileExtract>, meta: &FileMeta) -> Arc<FileExtract> {
    if hit.file.file_size == meta.file_size && hit.file.last_modified == meta.last_modified {
        return hit;
    }
    let mut extract = (*hit).clone();
    extract.file.file_size = meta.file_size;
    extract.file.last_modified = meta.last_modified;
    Arc::new(extract)
}

pub struct Engine {
    config: SymgraphConfig,
    registry: ClassifierRegistry,
}

impl Engine {
    pub fn new(config: SymgraphConfig) -> SymgraphResult<Self> {
        let registry = ClassifierRegistry::new(&config.entry_points)?;
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &SymgraphConfig {
        &self.config
    }

    pub fn registry(&self) -> &ClassifierRegistry {
        &self.registry
    }

    /// Extracts one file, reusing the cache on a content hash match.
    pub fn extract_one(
        &self,
        meta: &FileMeta,
        ast: Result<&crate::ast::FileAst, &str>,
        cache: &mut ExtractionCache,
    ) -> Arc<FileExtract> {
        if let Some(hit) = cache.get(&meta.path, &meta.content_hash) {
            let extract = refresh(hit, meta);
            cache.insert(meta.path.clone(), meta.content_hash.clone(), Arc::clone(&extract));
            return extract;
        }
        let extract = Arc::new(extract_file(meta, ast));
        if !extract.parse_failed {
            cache.insert(meta.path.clone(), meta.content_hash.clone(), Arc::clone(&extract));
        }
        extract
    }

    /// Parallel extraction of every unit.
    ///
    /// On cancellation the extracts computed so far are kept in `cache` and
    /// [`SymgraphError::Cancelled`] is returned.
    pub fn extract_units(
        &self,
        units: &[SourceUnit],
        cache: &mut ExtractionCache,
        cancel: &CancellationToken,
    ) -> SymgraphResult<BTreeMap<String, Arc<FileExtract>>> {
        let total = units.len();
        let outcomes: Vec<UnitOutcome> = {
            let cache = &*cache;
            units
                .par_iter()
                .map(|unit| {
                    if cancel.is_cancelled() {
                        return UnitOutcome::Cancelled;
                    }
                    if let Some(hit) = cache.get(&unit.meta.path, &unit.meta.content_hash) {
                        return UnitOutcome::Cached(refresh(hit, &unit.meta));
                    }
                    let ast = unit.ast.as_ref().map_err(|e| e.as_str());
                    UnitOutcome::Extracted(Arc::new(extract_file(&unit.meta, ast)))
                })
                .collect()
        };

        let mut extracts = BTreeMap::new();
        let mut completed = 0;
        let mut reused = 0;
        for outcome in outcomes {
            let extract = match outcome {
                UnitOutcome::Cached(extract) => {
                    reused += 1;
                    extract
                }
                UnitOutcome::Extracted(extract) => extract,
                UnitOutcome::Cancelled => continue,
            };
            completed += 1;
            if !extract.parse_failed {
                cache.insert(
                    extract.path().to_string(),
                    extract.file.content_hash.clone(),
                    Arc::clone(&extract),
                );
            }
            extracts.insert(extract.path().to_string(), extract);
        }

        if completed < total {
            tracing::info!(completed, total, "extraction cancelled");
            return Err(SymgraphError::Cancelled { completed, total });
        }
        tracing::debug!(files = total, reused, "extraction complete");
        Ok(extracts)
    }

    /// Extraction plus derivation from scratch.
    pub fn full_pass(
        &self,
        version: u64,
        units: &[SourceUnit],
        cache: &mut ExtractionCache,
        cancel: &CancellationToken,
    ) -> SymgraphResult<Snapshot> {
        let extracts = self.extract_units(units, cache, cancel)?;
        self.derive_with(version, Arc::new(extracts), None, &BTreeSet::new(), &BTreeSet::new())
    }

    /// Full pass replacing `earlier`. Module names that were in-repo in
    /// `earlier` keep looking internal, so the result matches an incremental
    /// pass over the same file set.
    pub fn full_pass_after(
        &self,
        earlier: &Snapshot,
        units: &[SourceUnit],
        cache: &mut ExtractionCache,
        cancel: &CancellationToken,
    ) -> SymgraphResult<Snapshot> {
        let extracts = self.extract_units(units, cache, cancel)?;
        self.derive_with(
            earlier.version + 1,
            Arc::new(extracts),
            None,
            &BTreeSet::new(),
            &earlier.graph.internal_modules,
        )
    }

    /// Builds a complete snapshot from per-file extracts.
    ///
    /// With a `prior` snapshot, usage resolution is re-run only for files
    /// that are in `changed`, whose extract or import resolution differs
    /// from `prior`, or that import such a file transitively. Everything
    /// else reuses the prior resolution, which yields the same result as a
    /// from-scratch derivation.
    ///
    /// Absolute imports naming a module that was in-repo in `prior` stay
    /// unresolved rather than turning external once the module is gone.
    pub fn derive(
        &self,
        version: u64,
        extracts: Arc<BTreeMap<String, Arc<FileExtract>>>,
        prior: Option<&Snapshot>,
        changed: &BTreeSet<String>,
    ) -> SymgraphResult<Snapshot> {
        let none = BTreeSet::new();
        let remembered = prior.map_or(&none, |p| &p.graph.internal_modules);
        self.derive_with(version, extracts, prior, changed, remembered)
    }

    fn derive_with(
        &self,
        version: u64,
        extracts: Arc<BTreeMap<String, Arc<FileExtract>>>,
        prior: Option<&Snapshot>,
        changed: &BTreeSet<String>,
        remembered: &BTreeSet<String>,
    ) -> SymgraphResult<Snapshot> {
        let live: BTreeSet<String> = extracts.keys().cloned().collect();
        let resolver =
            ImportResolver::new(&live, &self.config).remembering(remembered.iter().cloned());

        let resolved: BTreeMap<&str, Vec<Import>> = extracts
            .as_ref()
            .par_iter()
            .map(|(path, extract)| (path.as_str(), resolve_imports(&resolver, extract)))
            .collect();
        let import_map: HashMap<ImportId, Import> = resolved
            .values()
            .flatten()
            .map(|import| (import.id, import.clone()))
            .collect();
        let dep_edges = dependency_edges(import_map.values(), &live);

        let dirty = self.dirty_files(&extracts, &resolved, &dep_edges, prior, changed);

        let table = SymbolTable::new(&extracts, &import_map);
        let usage = UsageResolver::new(&table, &self.registry);
        let resolutions: BTreeMap<String, Arc<FileResolution>> = extracts
            .as_ref()
            .par_iter()
            .map(|(path, extract)| {
                let reused = prior
                    .filter(|_| !dirty.contains(path))
                    .and_then(|p| p.resolutions.get(path))
                    .cloned();
                let resolution = match reused {
                    Some(resolution) => resolution,
                    None => {
                        let imports = resolved.get(path.as_str()).cloned().unwrap_or_default();
                        Arc::new(usage.resolve_file(extract, imports))
                    }
                };
                (path.clone(), resolution)
            })
            .collect();

        let mut graph = CodeGraph::default();
        let mut metrics: BTreeMap<SymbolId, FunctionMetrics> = BTreeMap::new();
        for (path, extract) in extracts.iter() {
            graph.files.insert(path.clone(), extract.file.clone());
            graph.file_states.insert(path.clone(), FileState::Synced);
            for symbol in &extract.symbols {
                let mut symbol = symbol.clone();
                symbol.cyclomatic_complexity = extract.metrics.get(&symbol.id).map(|m| m.cyclomatic());
                graph.symbols.insert(symbol.id, symbol);
            }
            metrics.extend(extract.metrics.iter().map(|(id, m)| (*id, *m)));
        }
        for (path, resolution) in &resolutions {
            for import in &resolution.imports {
                graph.imports.insert(import.id, import.clone());
            }
            graph.usage_edges.extend(resolution.edges.iter().cloned());
            if !resolution.module_roots.is_empty() {
                graph
                    .module_roots
                    .insert(path.clone(), resolution.module_roots.clone());
            }
        }
        graph.usage_edges.sort();
        graph.dependency_edges = dep_edges;
        graph.internal_modules = extracts
            .iter()
            .flat_map(|(path, extract)| {
                let language = extract.language();
                resolved
                    .get(path.as_str())
                    .into_iter()
                    .flatten()
                    .filter_map(move |import| ImportResolver::internal_module(import, language))
            })
            .collect();

        self.check_limits(&graph)?;
        let analysis = self.analyze(&graph, &extracts, &resolutions, &metrics);

        tracing::info!(
            version,
            files = graph.files.len(),
            resolved = dirty.len(),
            symbols = graph.symbols.len(),
            usage_edges = graph.usage_edges.len(),
            cycles = analysis.cycles.len(),
            dead = analysis.dead_code.len(),
            issues = analysis.issues.len(),
            "analysis pass complete"
        );

        Ok(Snapshot {
            version,
            graph: Arc::new(graph),
            analysis: Arc::new(analysis),
            last_run: None,
            extracts,
            resolutions: Arc::new(resolutions),
        })
    }

    fn dirty_files(
        &self,
        extracts: &BTreeMap<String, Arc<FileExtract>>,
        resolved: &BTreeMap<&str, Vec<Import>>,
        dep_edges: &[crate::model::DependencyEdge],
        prior: Option<&Snapshot>,
        changed: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        let Some(prior) = prior else {
            return extracts.keys().cloned().collect();
        };

        let mut seeds: BTreeSet<&str> = changed.iter().map(|s| s.as_str()).collect();
        for (path, extract) in extracts {
            let same_extract = prior
                .extracts
                .get(path)
                .is_some_and(|old| Arc::ptr_eq(old, extract) || **old == **extract);
            let same_imports = prior
                .resolutions
                .get(path)
                .is_some_and(|r| Some(&r.imports) == resolved.get(path.as_str()));
            if !(same_extract && same_imports) {
                seeds.insert(path.as_str());
            }
        }
        for path in prior.extracts.keys() {
            if !extracts.contains_key(path) {
                seeds.insert(path.as_str());
            }
        }

        let dependents = Dependents::new(prior.graph.dependency_edges.iter().chain(dep_edges));
        dependents
            .closure(seeds)
            .into_iter()
            .filter(|p| extracts.contains_key(*p))
            .map(String::from)
            .collect()
    }

    fn check_limits(&self, graph: &CodeGraph) -> SymgraphResult<()> {
        let limits = &self.config.limits;
        if graph.symbols.len() > limits.max_symbols {
            return Err(SymgraphError::ResourceExhausted {
                resource: "symbols",
                limit: limits.max_symbols,
                actual: graph.symbols.len(),
            });
        }
        let edges = graph.usage_edges.len() + graph.dependency_edges.len();
        if edges > limits.max_edges {
            return Err(SymgraphError::ResourceExhausted {
                resource: "edges",
                limit: limits.max_edges,
                actual: edges,
            });
        }
        Ok(())
    }

    /// Tarjan over the graph's non-stale dependency edges.
    pub fn detect_cycles(&self, graph: &CodeGraph) -> CycleAnalysis {
        let nodes: Vec<String> = graph.live_paths().into_iter().collect();
        find_cycles(
            &nodes,
            &graph.dependency_edges,
            self.config.thresholds.max_cycle_length,
        )
    }

    fn analyze(
        &self,
        graph: &CodeGraph,
        extracts: &BTreeMap<String, Arc<FileExtract>>,
        resolutions: &BTreeMap<String, Arc<FileResolution>>,
        metrics: &BTreeMap<SymbolId, FunctionMetrics>,
    ) -> AnalysisResults {
        let nodes: Vec<String> = graph.files.keys().cloned().collect();
        let cycles = self.detect_cycles(graph);
        let coupling = coupling(&nodes, &graph.dependency_edges, &self.config.thresholds);

        let (mut import_issues, cycle_issues) = cycle_findings(&cycles.cycles, graph.imports.values());
        import_issues.extend(
            graph
                .imports
                .values()
                .filter(|i| i.status == ImportStatus::Unresolved)
                .map(|i| ImportIssue {
                    file_path: i.file_path.clone(),
                    import_path: i.raw_path.clone(),
                    kind: ImportIssueKind::Unresolved,
                    line: i.line,
                }),
        );
        import_issues.sort();

        let ambiguous: Vec<_> = resolutions
            .values()
            .flat_map(|r| r.ambiguous.iter().cloned())
            .collect();

        let reachability = ReachabilityAnalyzer::new(&self.registry, &self.config.ignore).analyze(
            &ReachabilityInput {
                files: &graph.files,
                symbols: &graph.symbols,
                edges: &graph.usage_edges,
                module_roots: &graph.module_roots,
                ambiguous: &ambiguous,
            },
        );

        let mut issues: Vec<_> = extracts
            .values()
            .flat_map(|e| e.issues.iter().cloned())
            .chain(resolutions.values().flat_map(|r| r.issues.iter().cloned()))
            .chain(cycle_issues)
            .collect();
        issues.sort();

        AnalysisResults {
            dead_code: reachability.dead_code,
            complexity: complexity_reports(graph.symbols.values(), metrics),
            cycles: cycles.cycles,
            truncated_components: cycles.truncated_components,
            coupling,
            entry_points: reachability.entry_points,
            ambiguous,
            import_issues,
            issues,
            stale: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstNode, FileAst};
    use crate::config::LimitConfig;

    fn unit(path: &str, hash: &str, nodes: Vec<AstNode>) -> SourceUnit {
        SourceUnit::new(FileMeta::new(path, hash), FileAst::new(20, nodes))
    }

    fn engine() -> Engine {
        Engine::new(SymgraphConfig::default()).unwrap()
    }

    #[test]
    fn test_full_pass_basic_graph() {
        let units = vec![
            unit(
                "app.py",
                "1",
                vec![
                    AstNode::import_names(".util", &["load"], 1),
                    AstNode::function("main", 2, 4).with_children(vec![AstNode::call("load", 3)]),
                ],
            ),
            unit("util.py", "2", vec![AstNode::function("load", 1, 2)]),
        ];
        let mut cache = ExtractionCache::new();
        let snap = engine()
            .full_pass(1, &units, &mut cache, &CancellationToken::new())
            .unwrap();

        assert_eq!(snap.graph.files.len(), 2);
        assert_eq!(snap.graph.dependency_edges.len(), 1);
        assert!(snap.analysis.dead_code.is_empty());
        assert!(snap.analysis.cycles.is_empty());
        assert_eq!(cache.len(), 2);
        assert!(snap
            .graph
            .symbols
            .values()
            .filter(|s| s.kind.is_callable())
            .all(|s| s.cyclomatic_complexity == Some(1)));
    }

    #[test]
    fn test_parse_failure_keeps_file() {
        let units = vec![SourceUnit::failed(FileMeta::new("bad.py", "x"), "syntax error")];
        let mut cache = ExtractionCache::new();
        let snap = engine()
            .full_pass(1, &units, &mut cache, &CancellationToken::new())
            .unwrap();
        assert!(snap.graph.files.contains_key("bad.py"));
        assert_eq!(snap.analysis.issues.len(), 1);
        assert_eq!(snap.analysis.issues[0].rule_id, "parse-error");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cancelled_pass_keeps_cache() {
        let units = vec![unit("a.py", "1", vec![AstNode::function("f", 1, 2)])];
        let token = CancellationToken::new();
        token.cancel();
        let mut cache = ExtractionCache::new();
        let err = engine().full_pass(1, &units, &mut cache, &token).unwrap_err();
        assert!(matches!(err, SymgraphError::Cancelled { completed: 0, total: 1 }));
    }

    #[test]
    fn test_resource_limit() {
        let config = SymgraphConfig {
            limits: LimitConfig {
                max_symbols: 1,
                ..LimitConfig::default()
            },
            ..SymgraphConfig::default()
        };
        let engine = Engine::new(config).unwrap();
        let units = vec![unit(
            "a.py",
            "1",
            vec![AstNode::function("f", 1, 2), AstNode::function("g", 3, 4)],
        )];
        let err = engine
            .full_pass(1, &units, &mut ExtractionCache::new(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(
            err,
            SymgraphError::ResourceExhausted {
                resource: "symbols",
                limit: 1,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_derive_reuses_clean_resolutions() {
        let engine = engine();
        let units = vec![
            unit("a.ts", "1", vec![AstNode::function("a", 1, 2).exported()]),
            unit("b.ts", "2", vec![AstNode::function("b", 1, 2).exported()]),
        ];
        let mut cache = ExtractionCache::new();
        let first = engine
            .full_pass(1, &units, &mut cache, &CancellationToken::new())
            .unwrap();

        let second = engine
            .derive(2, first.extracts.clone(), Some(&first), &BTreeSet::new())
            .unwrap();
        assert!(Arc::ptr_eq(&first.resolutions["a.ts"], &second.resolutions["a.ts"]));
        assert_eq!(first.graph, second.graph);

        let mut hint = BTreeSet::new();
        hint.insert("b.ts".to_string());
        let third = engine
            .derive(3, first.extracts.clone(), Some(&first), &hint)
            .unwrap();
        assert!(Arc::ptr_eq(&first.resolutions["a.ts"], &third.resolutions["a.ts"]));
        assert!(!Arc::ptr_eq(&first.resolutions["b.ts"], &third.resolutions["b.ts"]));
    }
}
