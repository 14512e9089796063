//! Prelude module for convenient imports.
//!
//! Import commonly used types with a single line:
//!
//! ```rust,ignore
//! use symgraph_core::prelude::*;
//! ```
//!
//! This provides the most commonly needed types for running an analysis and
//! reading its results without polluting the namespace with rarely-used
//! items.

// Core types
pub use crate::error::{SymgraphError, SymgraphResult};
pub use crate::model::{FileMeta, Language, Symbol, SymbolId, SymbolKind};

// Input boundary
pub use crate::ast::{AstNode, FileAst};
pub use crate::parser::{InMemoryParser, ParserAdapter, SourceUnit};
pub use crate::scan::{gather_ast_files, load_ast_dumps};

// Analysis and incremental sync
pub use crate::engine::{CancellationToken, Engine};
pub use crate::sync::{ChangeEvent, ChangeOperation, SyncCoordinator};

// Reading results
pub use crate::query::Query;
pub use crate::reachability::{DeadCodeItem, DeadCodeStatus};
pub use crate::snapshot::{Snapshot, SnapshotDiff};

// Configuration
pub use crate::config::{load_config, SymgraphConfig};

// Builder API
pub use crate::builder::{AnalysisResult, Symgraph};

// Persisted state
#[cfg(feature = "store")]
pub use crate::store::{JsonFileStore, SnapshotStore};
