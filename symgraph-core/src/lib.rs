//! symgraph-core: incremental symbol and dependency graph engine
//!
//! This library turns pre-parsed source files into a symbol/dependency graph
//! and answers structural questions about a codebase.
//!
//! # Features
//!
//! - **Symbol extraction**: functions, methods, classes, interfaces,
//!   variables and imports with their lexical scopes
//! - **Import resolution**: relative, source-root and package imports;
//!   external and unresolved imports are reported, never guessed
//! - **Usage resolution**: lexical scoping, member lookup through base
//!   classes, import re-exports and conservative duck typing
//! - **Dependency graph**: fan-in/fan-out, coupling categories, Tarjan cycles
//! - **Dead code**: reachability from per-language entry points with
//!   confidence scores
//! - **Complexity**: cyclomatic complexity and maintainability index
//! - **Incremental sync**: create/modify/delete/move events over versioned,
//!   immutable snapshots
//! - **Extraction cache** and **JSON snapshot store**
//!
//! # Quick Start
//!
//! Use the [`prelude`] module for convenient imports:
//!
//! ```rust,ignore
//! use symgraph_core::prelude::*;
//!
//! let result = Symgraph::new("/path/to/repo").analyze_dir()?;
//!
//! for dead in result.query().dead_code(0.8) {
//!     println!("{}: {} ({})", dead.file_path, dead.qualified_name, dead.status);
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`ast`], [`parser`], [`scan`]: input boundary (generic AST, adapters, dumps)
//! - [`symbols`]: per-file extraction and the symbol table
//! - [`resolve`]: import and usage resolution
//! - [`depgraph`], [`reachability`], [`complexity`]: global stages
//! - [`engine`]: the analysis pipeline
//! - [`sync`]: incremental sync coordinator
//! - [`snapshot`], [`query`]: published state and read API
//! - [`cache`], [`store`]: extraction cache and persisted snapshots
//! - [`builder`]: fluent builder API
//! - [`error`]: typed error handling
//!
//! # Cargo Features
//!
//! - `store` (default): JSON snapshot store
//! - `full`: Enable all optional features

// Core modules (always available)
pub mod ast;
pub mod builder;
pub mod cache;
pub mod common;
pub mod complexity;
pub mod config;
pub mod depgraph;
pub mod engine;
pub mod entry;
pub mod error;
pub mod issues;
pub mod logging;
pub mod model;
pub mod parser;
pub mod prelude;
pub mod query;
pub mod reachability;
pub mod report;
pub mod resolve;
pub mod scan;
pub mod snapshot;
pub mod symbols;
pub mod sync;

// Feature-gated modules
#[cfg(feature = "store")]
pub mod store;

// Common trait re-exports
pub use common::GraphTraversal;

// ============================================================================
// Explicit Re-exports (avoiding glob imports for clear API surface)
// ============================================================================

// Error types
pub use error::{IoResultExt, SymgraphError, SymgraphResult};

// Builder API
pub use builder::{AnalysisResult, Symgraph};

// Data model
pub use ast::{AstNode, FileAst, ImportedName, NodeKind};
pub use model::{
    DependencyEdge, DependencyKind, FileId, FileMeta, FileState, Import, ImportId, ImportStatus,
    Language, Location, SourceFile, Symbol, SymbolId, SymbolKind, UsageEdge, UsageKind, Visibility,
};

// Pipeline
pub use engine::{CancellationToken, Engine};
pub use parser::{InMemoryParser, ParserAdapter, SourceUnit};
pub use sync::{ChangeEvent, ChangeOperation, EventOutcome, SyncCoordinator};

// Snapshots and queries
pub use query::{FileSummary, Query, Summary, SymbolSummary};
pub use snapshot::{AnalysisResults, AnalysisRun, CodeGraph, RunTrigger, Snapshot, SnapshotDiff};

// Findings
pub use complexity::{ComplexityReport, Grade};
pub use depgraph::{CouplingCategory, Cycle, DependencyGraph, FileCoupling};
pub use issues::{ImportIssue, ImportIssueKind, Issue, IssueKind, Severity};
pub use reachability::{DeadCodeItem, DeadCodeReason, DeadCodeStatus, EntryPoint};
pub use resolve::{AmbiguousReference, Resolution, UnresolvedReason};

// Entry point classifiers
pub use entry::{ClassifierRegistry, EntryPointClassifier, EntryReason};

// Cache types
pub use cache::{content_hash, file_hash, load_cache, save_cache, CacheMetadata, ExtractionCache};

// Configuration
pub use config::{load_config, load_config_or_default, SymgraphConfig};

// File scanning
pub use scan::{gather_ast_files, gather_ast_files_with_excludes, load_ast_dumps, AstDumpParser};

// Persisted state
#[cfg(feature = "store")]
pub use store::{JsonFileStore, SnapshotStore, StoredSnapshot};

#[cfg(test)]
mod tests;
