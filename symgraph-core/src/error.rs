//! Typed error handling for symgraph.
//!
//! Only a handful of conditions ever abort a run (resource exhaustion and
//! explicit cancellation). Parse failures, unresolved imports and ambiguous
//! references never surface here; they are recorded as issues on the
//! snapshot and analysis of the remaining files continues.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for symgraph operations.
#[derive(Error, Debug)]
pub enum SymgraphError {
    /// I/O error when reading/writing files
    #[error("I/O error at {path}: {message}")]
    Io {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file errors
    #[error("Config error at {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// Snapshot store errors (serialization, version mismatch)
    #[error("Store error: {message}")]
    Store { message: String },

    /// A change event that cannot be applied to the current snapshot
    #[error("Invalid change event for {path}: {message}")]
    InvalidEvent { path: String, message: String },

    /// A global algorithm exceeded a configured resource limit.
    #[error("Resource exhausted: {resource} limit {limit} exceeded ({actual})")]
    ResourceExhausted {
        resource: &'static str,
        limit: usize,
        actual: usize,
    },

    /// A full analysis pass was cancelled between file units.
    #[error("Analysis cancelled after {completed} of {total} files")]
    Cancelled { completed: usize, total: usize },
}

impl SymgraphError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create a config error.
    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create an invalid-event error.
    pub fn invalid_event(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEvent {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error (analysis can continue).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::InvalidEvent { .. } | Self::Store { .. }
        )
    }

    /// Check if this error aborted a run and left the prior snapshot in place.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. } | Self::Cancelled { .. })
    }

    /// Get the path associated with this error, if any.
    pub fn path(&self) -> Option<String> {
        match self {
            Self::InvalidEvent { path, .. } => Some(path.clone()),
            Self::Io { path, .. } => Some(path.display().to_string()),
            Self::Config { path, .. } => Some(path.display().to_string()),
            _ => None,
        }
    }
}

/// Convenience type alias for symgraph results.
pub type SymgraphResult<T> = Result<T, SymgraphError>;

/// Extension trait for converting std::io::Error with path context.
pub trait IoResultExt<T> {
    /// Add path context to an I/O error.
    fn with_path(self, path: impl Into<PathBuf>) -> SymgraphResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> SymgraphResult<T> {
        self.map_err(|e| SymgraphError::io(path, e))
    }
}
