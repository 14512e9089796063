//! Structured logging using **tracing**.
//!
//! The engine itself only emits events; installing a subscriber is the
//! embedding application's job. The CLI calls [`init_structured_logging`],
//! which writes JSON lines to stderr so stdout stays clean for reports.

use crate::snapshot::{Snapshot, SnapshotDiff};
use tracing::{info, warn};

/// Initializes the global tracing subscriber.
///
/// Later calls are ignored, so tests and embedders that install their own
/// subscriber keep it.
///
/// # Environment Variables
/// - `RUST_LOG`: Controls log filtering (e.g., `RUST_LOG=symgraph_core=debug`)
pub fn init_structured_logging() {
    let _ = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_level(true)
        .with_target(true)
        .with_current_span(true)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Logs the headline numbers of a published snapshot.
pub fn log_snapshot(snapshot: &Snapshot) {
    let analysis = &snapshot.analysis;
    info!(
        version = snapshot.version,
        files = snapshot.graph.files.len(),
        symbols = snapshot.graph.symbols.len(),
        dead_code = analysis.dead_code.len(),
        cycles = analysis.cycles.len(),
        issues = analysis.issues.len(),
        stale = analysis.stale,
        "snapshot ready"
    );
}

/// Logs the size of a diff between two versions.
pub fn log_diff(diff: &SnapshotDiff) {
    if diff.is_empty() {
        info!(
            from = diff.from_version,
            to = diff.to_version,
            "no changes since stored snapshot"
        );
        return;
    }
    info!(
        from = diff.from_version,
        to = diff.to_version,
        added_files = diff.added_files.len(),
        removed_files = diff.removed_files.len(),
        added_symbols = diff.added_symbols.len(),
        removed_symbols = diff.removed_symbols.len(),
        changed_symbols = diff.changed_symbols.len(),
        added_edges = diff.added_edges.len(),
        removed_edges = diff.removed_edges.len(),
        "snapshot diff"
    );
}

/// Logs a store lookup that found nothing for `repository_id`.
pub fn log_store_miss(store: &str, repository_id: &str) {
    warn!(store, repository = repository_id, "no stored snapshot to compare");
}
