//! Persisted snapshot rows.
//!
//! A snapshot is flattened into rows keyed by `(repository_id, file_id)`
//! that keep their stale/tombstone columns, plus the analysis run history.
//! [`JsonFileStore`] keeps every repository of one store in a single JSON
//! document written atomically (temp file + rename).
//!
//! # Store Versioning
//!
//! The document carries a format version; loading a document with a
//! different format version fails with a `Store` error instead of returning
//! partially understood rows.

use crate::error::{IoResultExt, SymgraphError, SymgraphResult};
use crate::model::{DependencyEdge, FileId, FileState, Import, SourceFile, Symbol, UsageEdge};
use crate::snapshot::{AnalysisResults, AnalysisRun, CodeGraph, Snapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current store format version. Increment when a row changes shape.
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Maximum store document size (500MB).
const MAX_STORE_SIZE_BYTES: usize = 500_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRow {
    pub repository_id: String,
    pub state: FileState,
    #[serde(flatten)]
    pub file: SourceFile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRow {
    pub repository_id: String,
    #[serde(flatten)]
    pub symbol: Symbol,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRow {
    pub repository_id: String,
    #[serde(flatten)]
    pub import: Import,
}

/// Usage edges are keyed by the file of their source symbol; edges whose
/// source symbol is gone are not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEdgeRow {
    pub repository_id: String,
    pub file_id: FileId,
    #[serde(flatten)]
    pub edge: UsageEdge,
}

/// Everything persisted for one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub repository_id: String,
    pub version: u64,
    pub saved_at: DateTime<Utc>,
    pub files: Vec<FileRow>,
    pub symbols: Vec<SymbolRow>,
    pub imports: Vec<ImportRow>,
    pub usage_edges: Vec<UsageEdgeRow>,
    pub dependency_edges: Vec<DependencyEdge>,
    #[serde(default)]
    pub module_roots: BTreeMap<String, Vec<crate::model::SymbolId>>,
    #[serde(default)]
    pub internal_modules: BTreeSet<String>,
    pub analysis: AnalysisResults,
    pub runs: Vec<AnalysisRun>,
}

impl StoredSnapshot {
    pub fn from_snapshot(repository_id: &str, snapshot: &Snapshot, runs: &[AnalysisRun]) -> Self {
        let graph = &snapshot.graph;
        let repo = || repository_id.to_string();
        Self {
            repository_id: repo(),
            version: snapshot.version,
            saved_at: Utc::now(),
            files: graph
                .files
                .values()
                .map(|file| FileRow {
                    repository_id: repo(),
                    state: graph.state_of(&file.path),
                    file: file.clone(),
                })
                .collect(),
            symbols: graph
                .symbols
                .values()
                .map(|symbol| SymbolRow {
                    repository_id: repo(),
                    symbol: symbol.clone(),
                })
                .collect(),
            imports: graph
                .imports
                .values()
                .map(|import| ImportRow {
                    repository_id: repo(),
                    import: import.clone(),
                })
                .collect(),
            usage_edges: graph
                .usage_edges
                .iter()
                .filter_map(|edge| {
                    let source = graph.symbols.get(&edge.source)?;
                    Some(UsageEdgeRow {
                        repository_id: repo(),
                        file_id: source.file_id,
                        edge: edge.clone(),
                    })
                })
                .collect(),
            dependency_edges: graph.dependency_edges.clone(),
            module_roots: graph.module_roots.clone(),
            internal_modules: graph.internal_modules.clone(),
            analysis: snapshot.analysis.as_ref().clone(),
            runs: runs.to_vec(),
        }
    }

    /// Rebuilds a queryable snapshot. Per-file extraction state is not
    /// persisted, so the result cannot seed an incremental pass.
    pub fn into_snapshot(self) -> Snapshot {
        let mut graph = CodeGraph::default();
        for row in self.files {
            graph.file_states.insert(row.file.path.clone(), row.state);
            graph.files.insert(row.file.path.clone(), row.file);
        }
        graph.symbols = self
            .symbols
            .into_iter()
            .map(|row| (row.symbol.id, row.symbol))
            .collect();
        graph.imports = self
            .imports
            .into_iter()
            .map(|row| (row.import.id, row.import))
            .collect();
        graph.usage_edges = self.usage_edges.into_iter().map(|row| row.edge).collect();
        graph.dependency_edges = self.dependency_edges;
        graph.module_roots = self.module_roots;
        graph.internal_modules = self.internal_modules;

        Snapshot {
            version: self.version,
            graph: Arc::new(graph),
            analysis: Arc::new(self.analysis),
            last_run: self.runs.last().cloned(),
            ..Snapshot::default()
        }
    }

    pub fn rows_for_file(&self, file_id: FileId) -> (Vec<&SymbolRow>, Vec<&ImportRow>) {
        (
            self.symbols.iter().filter(|r| r.symbol.file_id == file_id).collect(),
            self.imports.iter().filter(|r| r.import.file_id == file_id).collect(),
        )
    }
}

/// Persisted-state boundary.
pub trait SnapshotStore: Send + Sync {
    /// Replaces everything stored for `repository_id`.
    fn save(&self, repository_id: &str, snapshot: &Snapshot, runs: &[AnalysisRun]) -> SymgraphResult<()>;

    fn load(&self, repository_id: &str) -> SymgraphResult<Option<StoredSnapshot>>;

    fn repositories(&self) -> SymgraphResult<Vec<String>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    format_version: u32,
    symgraph_version: String,
    repositories: BTreeMap<String, StoredSnapshot>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            format_version: STORE_FORMAT_VERSION,
            symgraph_version: env!("CARGO_PKG_VERSION").to_string(),
            repositories: BTreeMap::new(),
        }
    }
}

/// JSON document store at a single path.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> SymgraphResult<StoreDocument> {
        if !self.path.exists() {
            return Ok(StoreDocument::default());
        }
        let text = fs::read_to_string(&self.path).with_path(&self.path)?;
        let doc: StoreDocument = serde_json::from_str(&text).map_err(|e| {
            SymgraphError::store(format!("corrupted store {}: {}", self.path.display(), e))
        })?;
        if doc.format_version != STORE_FORMAT_VERSION {
            return Err(SymgraphError::store(format!(
                "store format {} written by symgraph {} is not supported (expected {})",
                doc.format_version, doc.symgraph_version, STORE_FORMAT_VERSION
            )));
        }
        Ok(doc)
    }

    fn write(&self, doc: &StoreDocument) -> SymgraphResult<()> {
        let json = serde_json::to_string(doc)
            .map_err(|e| SymgraphError::store(format!("serialization failed: {}", e)))?;
        if json.len() > MAX_STORE_SIZE_BYTES {
            return Err(SymgraphError::store(format!(
                "store document of {} bytes exceeds the {} byte limit",
                json.len(),
                MAX_STORE_SIZE_BYTES
            )));
        }

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_path(dir)?;
        }
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let temp_path = self
            .path
            .with_extension(format!("{}.{}.tmp", std::process::id(), nanos));
        fs::write(&temp_path, &json).with_path(&temp_path)?;
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(SymgraphError::io(&self.path, e));
        }
        Ok(())
    }
}

impl SnapshotStore for JsonFileStore {
    fn save(&self, repository_id: &str, snapshot: &Snapshot, runs: &[AnalysisRun]) -> SymgraphResult<()> {
        let mut doc = self.read()?;
        let stored = StoredSnapshot::from_snapshot(repository_id, snapshot, runs);
        tracing::info!(
            store = %self.path.display(),
            repository = repository_id,
            version = snapshot.version,
            symbols = stored.symbols.len(),
            "snapshot stored"
        );
        doc.repositories.insert(repository_id.to_string(), stored);
        self.write(&doc)
    }

    fn load(&self, repository_id: &str) -> SymgraphResult<Option<StoredSnapshot>> {
        Ok(self.read()?.repositories.remove(repository_id))
    }

    fn repositories(&self) -> SymgraphResult<Vec<String>> {
        Ok(self.read()?.repositories.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstNode, FileAst};
    use crate::cache::ExtractionCache;
    use crate::config::SymgraphConfig;
    use crate::engine::{CancellationToken, Engine};
    use crate::model::FileMeta;
    use crate::parser::SourceUnit;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir(name: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("symgraph_store_test")
            .join(format!("{}_{}_{}", name, std::process::id(), n));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn snapshot() -> Snapshot {
        let units = vec![
            SourceUnit::new(
                FileMeta::new("app.py", "1"),
                FileAst::new(
                    5,
                    vec![
                        AstNode::import_names(".util", &["load"], 1),
                        AstNode::function("main", 2, 4)
                            .with_children(vec![AstNode::call("load", 3)]),
                    ],
                ),
            ),
            SourceUnit::new(
                FileMeta::new("util.py", "2"),
                FileAst::new(3, vec![AstNode::function("load", 1, 2), AstNode::function("old", 3, 3)]),
            ),
        ];
        Engine::new(SymgraphConfig::default())
            .unwrap()
            .full_pass(1, &units, &mut ExtractionCache::new(), &CancellationToken::new())
            .unwrap()
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = temp_dir("round_trip");
        let store = JsonFileStore::new(dir.join("state").join("store.json"));
        let snap = snapshot();
        store.save("repo", &snap, &[]).unwrap();

        let stored = store.load("repo").unwrap().unwrap();
        assert_eq!(stored.repository_id, "repo");
        assert!(stored.symbols.iter().all(|r| r.repository_id == "repo"));

        let restored = stored.into_snapshot();
        assert_eq!(restored.version, snap.version);
        assert_eq!(restored.graph, snap.graph);
        assert_eq!(restored.analysis.dead_code.len(), snap.analysis.dead_code.len());
        assert_eq!(restored.analysis.issues, snap.analysis.issues);
        assert!(store.load("other").unwrap().is_none());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rows_keyed_by_file() {
        let snap = snapshot();
        let stored = StoredSnapshot::from_snapshot("repo", &snap, &[]);
        let util = FileId::for_path("util.py");
        let (symbols, imports) = stored.rows_for_file(util);
        assert_eq!(symbols.len(), 2);
        assert!(imports.is_empty());
        assert!(stored
            .usage_edges
            .iter()
            .all(|r| r.file_id == FileId::for_path("app.py")));
    }

    #[test]
    fn test_multiple_repositories() {
        let dir = temp_dir("multi");
        let store = JsonFileStore::new(dir.join("store.json"));
        let snap = snapshot();
        store.save("a", &snap, &[]).unwrap();
        store.save("b", &snap, &[]).unwrap();
        assert_eq!(store.repositories().unwrap(), vec!["a", "b"]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rejects_other_format_version() {
        let dir = temp_dir("version");
        let path = dir.join("store.json");
        fs::write(
            &path,
            r#"{"format_version":99,"symgraph_version":"9.0.0","repositories":{}}"#,
        )
        .unwrap();
        let err = JsonFileStore::new(&path).load("repo").unwrap_err();
        assert!(matches!(err, SymgraphError::Store { .. }));

        fs::write(&path, "{broken").unwrap();
        assert!(JsonFileStore::new(&path).load("repo").is_err());
        fs::remove_dir_all(&dir).ok();
    }
}
