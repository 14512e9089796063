//! Incremental sync coordinator.
//!
//! Applies file change events to the published snapshot and folds them into
//! the next analysis pass. Per file the state moves
//! `unknown → synced → stale → (synced | tombstoned)`.
//!
//! # Concurrency
//!
//! - Single writer: events, full passes and incremental passes serialize on
//!   one lock; submitted events wait in a FIFO queue that is drained only
//!   while holding that lock, so events apply in submission order
//! - Readers call [`SyncCoordinator::snapshot`] and keep an `Arc` to an
//!   immutable version for as long as they like
//! - A new version is published only after an event's whole cascade (or a
//!   whole pass) succeeded; failures leave the current version in place
//! - Each event copies only the snapshot parts it writes; the rest stays
//!   shared with the previous version

use crate::cache::ExtractionCache;
use crate::depgraph::Dependents;
use crate::engine::{CancellationToken, Engine};
use crate::error::{SymgraphError, SymgraphResult};
use crate::model::{FileMeta, FileState, SymbolId};
use crate::parser::{ParserAdapter, SourceUnit};
use crate::resolve::{resolve_imports, ImportResolver};
use crate::snapshot::{AnalysisRun, RunTrigger, Snapshot};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Create,
    Modify,
    Delete,
    /// Delete of `previous_path` plus create of `file_path`.
    Move,
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
            Self::Move => "move",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub operation: ChangeOperation,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl ChangeEvent {
    fn new(operation: ChangeOperation, path: &str, hash: &str) -> Self {
        Self {
            operation,
            file_path: path.to_string(),
            previous_path: None,
            content_hash: hash.to_string(),
            file_size: 0,
            last_modified: None,
        }
    }

    pub fn create(path: &str, hash: &str) -> Self {
        Self::new(ChangeOperation::Create, path, hash)
    }

    pub fn modify(path: &str, hash: &str) -> Self {
        Self::new(ChangeOperation::Modify, path, hash)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(ChangeOperation::Delete, path, "")
    }

    pub fn moved(from: &str, to: &str, hash: &str) -> Self {
        let mut event = Self::new(ChangeOperation::Move, to, hash);
        event.previous_path = Some(from.to_string());
        event
    }

    fn meta(&self) -> FileMeta {
        FileMeta {
            path: self.file_path.clone(),
            content_hash: self.content_hash.clone(),
            file_size: self.file_size,
            last_modified: self.last_modified,
        }
    }
}

/// Effect of one applied event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOutcome {
    pub version: u64,
    pub stale_files: Vec<String>,
    pub tombstoned_files: Vec<String>,
    pub symbols_marked_stale: usize,
}

/// State owned by the single writer.
#[derive(Default)]
struct WriterState {
    cache: ExtractionCache,
    /// Files created, modified or deleted since the last pass.
    pending: BTreeSet<String>,
    deleted: BTreeSet<String>,
    symbols_marked_stale: usize,
    runs: Vec<AnalysisRun>,
}

pub struct SyncCoordinator {
    engine: Engine,
    parser: Arc<dyn ParserAdapter>,
    current: RwLock<Arc<Snapshot>>,
    writer: Mutex<WriterState>,
    queue: Mutex<VecDeque<ChangeEvent>>,
}

impl SyncCoordinator {
    pub fn new(engine: Engine, parser: Arc<dyn ParserAdapter>) -> Self {
        Self {
            engine,
            parser,
            current: RwLock::new(Arc::new(Snapshot::empty())),
            writer: Mutex::new(WriterState::default()),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Starts from a previously saved extraction cache.
    pub fn with_cache(self, cache: ExtractionCache) -> Self {
        self.writer.lock().cache = cache;
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn cache(&self) -> ExtractionCache {
        self.writer.lock().cache.clone()
    }

    pub fn runs(&self) -> Vec<AnalysisRun> {
        self.writer.lock().runs.clone()
    }

    fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write() = Arc::clone(&snapshot);
        snapshot
    }

    fn record_run(
        state: &mut WriterState,
        snapshot: &mut Snapshot,
        trigger: RunTrigger,
        started_at: DateTime<Utc>,
        files_updated: usize,
        files_deleted: usize,
    ) {
        let run = AnalysisRun {
            id: state.runs.len() as u64 + 1,
            trigger,
            started_at,
            finished_at: Utc::now(),
            files_updated,
            files_deleted,
            symbols_marked_stale: state.symbols_marked_stale,
            symbol_count: snapshot.graph.symbols.len(),
            issue_count: snapshot.analysis.issues.len(),
        };
        state.runs.push(run.clone());
        snapshot.last_run = Some(run);
        state.pending.clear();
        state.deleted.clear();
        state.symbols_marked_stale = 0;
    }

    /// Reruns every stage over `units`, which replace the whole file set.
    pub fn full_pass(
        &self,
        units: &[SourceUnit],
        cancel: &CancellationToken,
    ) -> SymgraphResult<Arc<Snapshot>> {
        let mut state = self.writer.lock();
        let current = self.snapshot();
        let started_at = Utc::now();

        let mut next = self
            .engine
            .full_pass_after(&current, units, &mut state.cache, cancel)?;

        let live = next.graph.live_paths();
        state.cache.retain_paths(&live);
        let files_deleted = current
            .graph
            .live_paths()
            .difference(&live)
            .count();
        Self::record_run(
            &mut state,
            &mut next,
            RunTrigger::Full,
            started_at,
            units.len(),
            files_deleted,
        );
        tracing::info!(version = next.version, files = units.len(), "full pass published");
        Ok(self.publish(next))
    }

    pub fn submit(&self, event: ChangeEvent) {
        self.queue.lock().push_back(event);
    }

    pub fn pending_events(&self) -> usize {
        self.queue.lock().len()
    }

    /// Applies queued events in order. Invalid events are logged and
    /// skipped; any other error stops processing and is returned.
    ///
    /// The writer lock is held across pop and apply, so concurrent callers
    /// cannot reorder events.
    pub fn process_pending(&self) -> SymgraphResult<Vec<EventOutcome>> {
        let mut state = self.writer.lock();
        let mut outcomes = Vec::new();
        loop {
            let Some(event) = self.queue.lock().pop_front() else {
                break;
            };
            match self.apply_locked(&mut state, &event) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(
                        path = %event.file_path,
                        operation = %event.operation,
                        error = %e,
                        "change event skipped"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcomes)
    }

    /// Applies one event and publishes the resulting stale snapshot.
    pub fn apply(&self, event: &ChangeEvent) -> SymgraphResult<EventOutcome> {
        let mut state = self.writer.lock();
        self.apply_locked(&mut state, event)
    }

    fn apply_locked(
        &self,
        state: &mut WriterState,
        event: &ChangeEvent,
    ) -> SymgraphResult<EventOutcome> {
        let current = self.snapshot();
        let mut next = Snapshot::clone(&current);
        next.version = current.version + 1;

        let mut touched = BTreeSet::new();
        let mut tombstoned = Vec::new();
        let path = event.file_path.as_str();

        match event.operation {
            ChangeOperation::Create | ChangeOperation::Modify => {
                if event.operation == ChangeOperation::Modify && !next.extracts.contains_key(path) {
                    tracing::debug!(path, "modify of unknown file treated as create");
                }
                self.upsert(&mut next, state, &event.meta());
                touched.insert(path.to_string());
            }
            ChangeOperation::Delete => {
                if !next.extracts.contains_key(path) {
                    return Err(SymgraphError::invalid_event(path, "delete of unknown file"));
                }
                Self::tombstone(&mut next, state, path);
                touched.insert(path.to_string());
                tombstoned.push(path.to_string());
            }
            ChangeOperation::Move => {
                let Some(previous) = event.previous_path.as_deref() else {
                    return Err(SymgraphError::invalid_event(path, "move without previous_path"));
                };
                if !next.extracts.contains_key(previous) {
                    return Err(SymgraphError::invalid_event(previous, "move of unknown file"));
                }
                Self::tombstone(&mut next, state, previous);
                self.upsert(&mut next, state, &event.meta());
                touched.insert(previous.to_string());
                touched.insert(path.to_string());
                tombstoned.push(previous.to_string());
            }
        }

        let (stale_files, symbols_marked_stale) = self.mark_stale(&mut next, &touched);
        state.symbols_marked_stale += symbols_marked_stale;

        let cycles = self.engine.detect_cycles(&next.graph);
        let unchanged = next.analysis.stale
            && next.analysis.cycles == cycles.cycles
            && next.analysis.truncated_components == cycles.truncated_components;
        if !unchanged {
            let analysis = Arc::make_mut(&mut next.analysis);
            analysis.cycles = cycles.cycles;
            analysis.truncated_components = cycles.truncated_components;
            analysis.stale = true;
        }

        let outcome = EventOutcome {
            version: next.version,
            stale_files,
            tombstoned_files: tombstoned,
            symbols_marked_stale,
        };
        tracing::info!(
            path,
            operation = %event.operation,
            version = next.version,
            stale_files = outcome.stale_files.len(),
            symbols_marked_stale,
            "change event applied"
        );
        self.publish(next);
        Ok(outcome)
    }

    /// Re-extracts one file and replaces its records.
    fn upsert(&self, next: &mut Snapshot, state: &mut WriterState, meta: &FileMeta) {
        let path = meta.path.as_str();
        let ast = self.parser.parse(path);
        let extract = self.engine.extract_one(
            meta,
            ast.as_ref().map_err(|e| e.as_str()),
            &mut state.cache,
        );

        let graph = Arc::make_mut(&mut next.graph);
        graph.symbols.retain(|_, s| s.file_path != path);
        graph.imports.retain(|_, i| i.file_path != path);
        graph.module_roots.remove(path);
        for symbol in &extract.symbols {
            let mut symbol = symbol.clone();
            symbol.stale = true;
            symbol.cyclomatic_complexity = extract.metrics.get(&symbol.id).map(|m| m.cyclomatic());
            graph.symbols.insert(symbol.id, symbol);
        }
        for import in &extract.imports {
            let mut import = import.clone();
            import.stale = true;
            graph.imports.insert(import.id, import);
        }
        graph.files.insert(path.to_string(), extract.file.clone());
        graph.file_states.insert(path.to_string(), FileState::Stale);

        Arc::make_mut(&mut next.extracts).insert(path.to_string(), extract);
        state.pending.insert(path.to_string());
        state.deleted.remove(path);
    }

    fn tombstone(next: &mut Snapshot, state: &mut WriterState, path: &str) {
        let graph = Arc::make_mut(&mut next.graph);
        for symbol in graph.symbols.values_mut().filter(|s| s.file_path == path) {
            symbol.tombstoned = true;
        }
        for import in graph.imports.values_mut().filter(|i| i.file_path == path) {
            import.tombstoned = true;
        }
        if let Some(file) = graph.files.get_mut(path) {
            file.deleted = true;
        }
        graph.file_states.insert(path.to_string(), FileState::Tombstoned);
        graph.module_roots.remove(path);

        Arc::make_mut(&mut next.extracts).remove(path);
        state.cache.remove(path);
        state.pending.insert(path.to_string());
        state.deleted.insert(path.to_string());
    }

    /// Marks stale the touched files, files whose import resolution changes
    /// under the new file set, and all their transitive dependents.
    fn mark_stale(&self, next: &mut Snapshot, touched: &BTreeSet<String>) -> (Vec<String>, usize) {
        let live: BTreeSet<String> = next.extracts.keys().cloned().collect();
        let resolver = ImportResolver::new(&live, self.engine.config())
            .remembering(next.graph.internal_modules.iter().cloned());

        let mut seeds: BTreeSet<String> = touched.clone();
        for (path, extract) in next.extracts.iter() {
            if touched.contains(path) {
                continue;
            }
            let now = resolve_imports(&resolver, extract);
            let before = next.resolutions.get(path).map(|r| &r.imports);
            if before != Some(&now) {
                seeds.insert(path.clone());
            }
        }

        let stale_files: BTreeSet<String> = {
            let dependents = Dependents::new(&next.graph.dependency_edges);
            dependents
                .closure(seeds.iter().map(|s| s.as_str()))
                .into_iter()
                .filter(|p| live.contains(*p))
                .map(String::from)
                .collect()
        };

        let graph = Arc::make_mut(&mut next.graph);
        let mut marked = 0;
        let mut stale_symbols: HashSet<SymbolId> = HashSet::new();
        for symbol in graph.symbols.values_mut() {
            if symbol.tombstoned {
                stale_symbols.insert(symbol.id);
            } else if stale_files.contains(&symbol.file_path) {
                if !symbol.stale {
                    symbol.stale = true;
                    marked += 1;
                }
                stale_symbols.insert(symbol.id);
            }
        }
        for import in graph.imports.values_mut() {
            if stale_files.contains(&import.file_path) {
                import.stale = true;
            }
        }
        for path in &stale_files {
            graph.file_states.insert(path.clone(), FileState::Stale);
        }

        let symbols = &graph.symbols;
        for edge in &mut graph.usage_edges {
            if stale_symbols.contains(&edge.source)
                || stale_symbols.contains(&edge.target)
                || !symbols.contains_key(&edge.source)
                || !symbols.contains_key(&edge.target)
            {
                edge.stale = true;
            }
        }
        for edge in &mut graph.dependency_edges {
            let gone = |p: &String| !live.contains(p);
            if stale_files.contains(&edge.from_path)
                || stale_files.contains(&edge.to_path)
                || gone(&edge.from_path)
                || gone(&edge.to_path)
            {
                edge.stale = true;
            }
        }

        (stale_files.into_iter().collect(), marked)
    }

    /// Re-derives stale files, drops tombstones and reruns the global stages.
    pub fn incremental_pass(&self) -> SymgraphResult<Arc<Snapshot>> {
        let mut state = self.writer.lock();
        let current = self.snapshot();
        let started_at = Utc::now();

        let changed = state.pending.clone();
        let mut next = self.engine.derive(
            current.version + 1,
            Arc::clone(&current.extracts),
            Some(&current),
            &changed,
        )?;

        let files_deleted = state.deleted.len();
        let files_updated = changed.len() - files_deleted.min(changed.len());
        Self::record_run(
            &mut state,
            &mut next,
            RunTrigger::Incremental,
            started_at,
            files_updated,
            files_deleted,
        );
        Ok(self.publish(next))
    }

    /// Applies `events` in order, then runs an incremental pass.
    pub fn sync(&self, events: impl IntoIterator<Item = ChangeEvent>) -> SymgraphResult<Arc<Snapshot>> {
        for event in events {
            self.submit(event);
        }
        self.process_pending()?;
        self.incremental_pass()
    }
}
