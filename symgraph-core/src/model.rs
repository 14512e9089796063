//! Core graph records: files, symbols, imports and edges.
//!
//! Records never own each other. Every cross reference is an opaque integer
//! id ([`FileId`], [`SymbolId`], [`ImportId`]) resolved through the snapshot's
//! arenas, so mutually importing files and mutually recursive symbols are just
//! edge lists.
//!
//! Ids are derived from content rather than allocation order: a symbol keeps
//! its id across re-parses as long as its file path, qualified name and kind
//! are unchanged. This is what makes a full pass idempotent and lets an
//! incremental pass reproduce exactly the ids a full pass would assign.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Derive a stable 64-bit id from a sequence of string parts.
fn stable_id(parts: &[&str]) -> u64 {
    let mut sha = Sha256::new();
    for part in parts {
        sha.update(part.as_bytes());
        sha.update([0x1f]);
    }
    let digest = sha.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:016x}", self.0)
            }
        }
    };
}

opaque_id!(
    /// Identifier of a source file, derived from its path.
    FileId
);
opaque_id!(
    /// Identifier of a declared symbol.
    SymbolId
);
opaque_id!(
    /// Identifier of one import statement.
    ImportId
);

impl FileId {
    pub fn for_path(path: &str) -> Self {
        Self(stable_id(&["file", path]))
    }
}

impl SymbolId {
    pub fn derive(path: &str, qualified_name: &str, kind: SymbolKind) -> Self {
        Self(stable_id(&["symbol", path, qualified_name, kind.as_str()]))
    }
}

impl ImportId {
    /// `ordinal` is the position of the import statement in its file.
    pub fn derive(path: &str, ordinal: usize) -> Self {
        Self(stable_id(&["import", path, &ordinal.to_string()]))
    }
}

/// Source language of a file. Drives import rules and entry point detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Rust,
    Go,
    Java,
    Other,
}

impl Language {
    /// Guess the language from a file extension.
    pub fn from_path(path: &str) -> Self {
        let ext = path.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
        match ext {
            "py" | "pyi" => Self::Python,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" | "mts" | "cts" => Self::TypeScript,
            "rs" => Self::Rust,
            "go" => Self::Go,
            "java" => Self::Java,
            _ => Self::Other,
        }
    }

    /// File extensions tried when resolving an extension-less import path.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Python => &["py", "pyi"],
            Self::JavaScript | Self::TypeScript => &["ts", "tsx", "js", "jsx", "mjs", "cjs"],
            Self::Rust => &["rs"],
            Self::Go => &["go"],
            Self::Java => &["java"],
            Self::Other => &[],
        }
    }

    /// Whether an import path is written relative to the importing file.
    pub fn is_relative_import(&self, raw: &str) -> bool {
        match self {
            Self::Python => raw.starts_with('.'),
            Self::JavaScript | Self::TypeScript => {
                raw == "." || raw == ".." || raw.starts_with("./") || raw.starts_with("../")
            }
            Self::Rust => {
                raw.starts_with("crate::") || raw.starts_with("self::") || raw.starts_with("super::")
            }
            Self::Go | Self::Java | Self::Other => false,
        }
    }

    /// Python and JavaScript bodies do not see class members unqualified.
    pub fn class_members_in_scope(&self) -> bool {
        matches!(self, Self::Java | Self::Go | Self::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata supplied with every file by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub path: String,
    pub content_hash: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileMeta {
    pub fn new(path: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_hash: content_hash.into(),
            file_size: 0,
            last_modified: None,
        }
    }
}

/// A file known to a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFile {
    pub id: FileId,
    pub path: String,
    pub language: Language,
    pub line_count: usize,
    pub content_hash: String,
    pub file_size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    /// Set when the file has been deleted but the deletion is not yet folded
    /// into an analysis pass.
    pub deleted: bool,
}

/// Kind of declared symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Variable,
    Import,
    Interface,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Method => "method",
            Self::Class => "class",
            Self::Variable => "variable",
            Self::Import => "import",
            Self::Interface => "interface",
        }
    }

    /// Functions and methods carry complexity metrics.
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Function | Self::Method)
    }

    /// Classes and interfaces own member scopes.
    pub fn is_type(&self) -> bool {
        matches!(self, Self::Class | Self::Interface)
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared visibility of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Explicitly exported / public API
    Public,
    #[default]
    Private,
}

/// A named declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    /// Module path, enclosing scope chain and name, joined with `::`.
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file_id: FileId,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    /// Filled by the complexity stage for functions and methods.
    pub cyclomatic_complexity: Option<u32>,
    pub visibility: Visibility,
    pub decorators: Vec<String>,
    /// Enclosing function or class, if any.
    pub parent: Option<SymbolId>,
    pub stale: bool,
    pub tombstoned: bool,
    /// Language-specific extras (`bases`, `import_path`, ...).
    pub metadata: BTreeMap<String, String>,
}

impl Symbol {
    pub fn is_exported(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// Base class names recorded by the builder, in declaration order.
    pub fn bases(&self) -> Vec<&str> {
        self.metadata
            .get("bases")
            .map(|b| b.split(',').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn line_span(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// Outcome of import resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Resolved,
    External,
    Unresolved,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::External => "external",
            Self::Unresolved => "unresolved",
        }
    }
}

/// One import statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Import {
    pub id: ImportId,
    pub file_id: FileId,
    pub file_path: String,
    /// Import path exactly as written.
    pub raw_path: String,
    /// Imported member names (empty for whole-module imports).
    pub names: Vec<String>,
    pub line: usize,
    pub is_relative: bool,
    pub is_dynamic: bool,
    pub is_wildcard: bool,
    pub status: ImportStatus,
    pub resolved_target: Option<FileId>,
    pub resolved_path: Option<String>,
    /// Files reached through imported names that are submodules
    /// (`from pkg import sub`).
    pub submodule_paths: Vec<String>,
    pub is_external: bool,
    pub package_name: Option<String>,
    pub stale: bool,
    pub tombstoned: bool,
}

/// How one symbol uses another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UsageKind {
    Call,
    Reference,
    Inherit,
    ImportUse,
}

impl UsageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Reference => "reference",
            Self::Inherit => "inherit",
            Self::ImportUse => "import-use",
        }
    }
}

/// Directed usage: `source` uses `target`, `count` times.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UsageEdge {
    pub source: SymbolId,
    pub target: SymbolId,
    pub kind: UsageKind,
    pub count: u32,
    pub stale: bool,
}

/// Kind of a file-to-file dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// At least one static import
    Static,
    /// Only dynamic (runtime) imports
    Dynamic,
}

/// File-level edge summarizing the imports from one file into another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: FileId,
    pub to: FileId,
    pub from_path: String,
    pub to_path: String,
    pub kind: DependencyKind,
    pub import_count: u32,
    pub stale: bool,
}

/// Per-file sync state: `unknown → synced → stale → (synced | tombstoned)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    #[default]
    Unknown,
    Synced,
    Stale,
    Tombstoned,
}

/// Source range of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub start_line: usize,
    pub end_line: usize,
}

impl From<&Symbol> for Location {
    fn from(symbol: &Symbol) -> Self {
        Self {
            start_line: symbol.start_line,
            end_line: symbol.end_line,
        }
    }
}
