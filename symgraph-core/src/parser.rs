//! Input boundary: pre-parsed ASTs and the adapter that supplies them.
//!
//! Parsing source text is out of scope; a [`ParserAdapter`] returns a
//! [`FileAst`] per path or an error message that becomes a `parse-error`
//! issue on the file.

use crate::ast::FileAst;
use crate::model::FileMeta;
use parking_lot::RwLock;
use std::collections::HashMap;

/// One file of a full pass.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub meta: FileMeta,
    pub ast: Result<FileAst, String>,
}

impl SourceUnit {
    pub fn new(meta: FileMeta, ast: FileAst) -> Self {
        Self { meta, ast: Ok(ast) }
    }

    pub fn failed(meta: FileMeta, message: impl Into<String>) -> Self {
        Self {
            meta,
            ast: Err(message.into()),
        }
    }

    pub fn path(&self) -> &str {
        &self.meta.path
    }
}

pub trait ParserAdapter: Send + Sync {
    fn parse(&self, path: &str) -> Result<FileAst, String>;
}

/// Serves ASTs registered ahead of time.
#[derive(Debug, Default)]
pub struct InMemoryParser {
    asts: RwLock<HashMap<String, FileAst>>,
}

impl InMemoryParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, ast: FileAst) {
        self.asts.write().insert(path.into(), ast);
    }

    pub fn remove(&self, path: &str) -> Option<FileAst> {
        self.asts.write().remove(path)
    }

    pub fn len(&self) -> usize {
        self.asts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.asts.read().is_empty()
    }
}

impl ParserAdapter for InMemoryParser {
    fn parse(&self, path: &str) -> Result<FileAst, String> {
        self.asts
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| format!("no AST available for {}", path))
    }
}
