//! Builder pattern API for symgraph analysis.
//!
//! Provides a fluent interface for configuring and running an analysis:
//!
//! ```rust,ignore
//! use symgraph_core::prelude::*;
//!
//! let result = Symgraph::new("/path/to/repo")
//!     .source_roots(["src", "lib"])
//!     .ignore_patterns(["legacy_*"])
//!     .with_cache(true)
//!     .analyze_dir()?;
//!
//! println!("Dead symbols: {}", result.dead_count());
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cache::{self, ExtractionCache};
use crate::config::{load_config_or_default, SymgraphConfig};
use crate::engine::{CancellationToken, Engine};
use crate::issues::ImportIssueKind;
use crate::parser::{ParserAdapter, SourceUnit};
use crate::query::Query;
use crate::scan::{gather_ast_files_with_excludes, load_ast_dumps, AstDumpParser};
use crate::snapshot::{AnalysisRun, Snapshot};
use crate::sync::SyncCoordinator;

/// Builder for configuring an analysis of one repository.
#[derive(Debug, Clone)]
pub struct Symgraph {
    /// Repository root; `symgraph.toml`, dumps and `.symgraph/` live here
    root: PathBuf,

    /// Explicit configuration instead of `symgraph.toml`
    config: Option<SymgraphConfig>,

    /// Whether to use the on-disk extraction cache
    use_cache: bool,

    source_roots: Option<Vec<String>>,
    internal_prefixes: Vec<String>,
    ignored_patterns: Vec<String>,
    excluded_dirs: Vec<String>,
}

impl Symgraph {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: None,
            use_cache: true,
            source_roots: None,
            internal_prefixes: Vec::new(),
            ignored_patterns: Vec::new(),
            excluded_dirs: Vec::new(),
        }
    }

    /// Enable or disable the extraction cache.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    /// Use `config` instead of reading `symgraph.toml`.
    pub fn with_config(mut self, config: SymgraphConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the configured roots for absolute imports, in priority order.
    pub fn source_roots(mut self, roots: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.source_roots = Some(roots.into_iter().map(Into::into).collect());
        self
    }

    pub fn internal_prefixes(mut self, prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.internal_prefixes
            .extend(prefixes.into_iter().map(Into::into));
        self
    }

    /// Add patterns for symbols to leave out of dead-code reports.
    pub fn ignore_patterns(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ignored_patterns
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Add directory names to skip while gathering AST dumps.
    pub fn exclude_dirs(mut self, dirs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.excluded_dirs.extend(dirs.into_iter().map(Into::into));
        self
    }

    /// Effective configuration: file or explicit config, then overrides.
    pub fn config(&self) -> Result<SymgraphConfig> {
        let mut config = match &self.config {
            Some(config) => config.clone(),
            None => load_config_or_default(&self.root)
                .with_context(|| format!("Failed to load config from {}", self.root.display()))?,
        };
        if let Some(roots) = &self.source_roots {
            config.source_roots = roots.clone();
        }
        config
            .internal_prefixes
            .extend(self.internal_prefixes.iter().cloned());
        config.ignore.extend(self.ignored_patterns.iter().cloned());
        Ok(config)
    }

    /// Coordinator reading dumps below the root on demand.
    pub fn coordinator(&self) -> Result<SyncCoordinator> {
        self.coordinator_with(Arc::new(AstDumpParser::new(&self.root)))
    }

    pub fn coordinator_with(&self, parser: Arc<dyn ParserAdapter>) -> Result<SyncCoordinator> {
        let engine = Engine::new(self.config()?).context("Invalid entry point patterns")?;
        let cache = if self.use_cache {
            cache::load_cache(&self.root).unwrap_or_default()
        } else {
            ExtractionCache::new()
        };
        Ok(SyncCoordinator::new(engine, parser).with_cache(cache))
    }

    /// Loads every `*.ast.json` dump below the root.
    pub fn load_units(&self) -> Result<Vec<SourceUnit>> {
        let excludes: Vec<&str> = self.excluded_dirs.iter().map(|s| s.as_str()).collect();
        let files = gather_ast_files_with_excludes(&self.root, &excludes)
            .context("Failed to gather AST dumps")?;
        Ok(load_ast_dumps(&self.root, &files))
    }

    /// Writes the coordinator's extraction cache when caching is enabled.
    /// A failed write is logged, not returned.
    pub fn persist_cache(&self, coordinator: &SyncCoordinator) {
        if !self.use_cache {
            return;
        }
        if let Err(e) = cache::save_cache(&self.root, &coordinator.cache()) {
            tracing::warn!(root = %self.root.display(), error = %e, "failed to save extraction cache");
        }
    }

    /// Runs a full pass over `units`.
    pub fn analyze(&self, units: &[SourceUnit]) -> Result<AnalysisResult> {
        let coordinator = self.coordinator()?;
        coordinator
            .full_pass(units, &CancellationToken::new())
            .context("Analysis pass failed")?;
        self.persist_cache(&coordinator);
        Ok(AnalysisResult::new(&self.root, &coordinator))
    }

    /// Runs a full pass over the dumps found below the root.
    pub fn analyze_dir(&self) -> Result<AnalysisResult> {
        let units = self.load_units()?;
        self.analyze(&units)
    }
}

/// Result of running an analysis.
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// Root path that was analyzed
    pub root: PathBuf,

    /// Published snapshot the result describes
    pub snapshot: Arc<Snapshot>,

    /// Run history of the coordinator that produced it
    pub runs: Vec<AnalysisRun>,
}

impl AnalysisResult {
    pub fn new(root: impl Into<PathBuf>, coordinator: &SyncCoordinator) -> Self {
        Self {
            root: root.into(),
            snapshot: coordinator.snapshot(),
            runs: coordinator.runs(),
        }
    }

    pub fn query(&self) -> Query<'_> {
        Query::new(&self.snapshot)
    }

    pub fn has_dead_code(&self) -> bool {
        !self.snapshot.analysis.dead_code.is_empty()
    }

    pub fn has_broken_imports(&self) -> bool {
        self.snapshot
            .analysis
            .import_issues
            .iter()
            .any(|i| i.kind == ImportIssueKind::Unresolved)
    }

    pub fn dead_count(&self) -> usize {
        self.snapshot.analysis.dead_code.len()
    }

    /// Share of non-import symbols reported as dead.
    pub fn dead_percentage(&self) -> f64 {
        let total = self
            .snapshot
            .graph
            .symbols
            .values()
            .filter(|s| !s.tombstoned && s.kind != crate::model::SymbolKind::Import)
            .count();
        if total == 0 {
            0.0
        } else {
            (self.dead_count() as f64 / total as f64) * 100.0
        }
    }
}
