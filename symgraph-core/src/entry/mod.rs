//! Entry point detection, one classifier per language.
//!
//! Classifiers are heuristics: they encode naming, decorator and base class
//! conventions of each ecosystem, plus the builtin namespace the usage
//! resolver falls back to. Configured names, decorator patterns and test
//! file patterns from `symgraph.toml` apply on top of every classifier.
//!
//! # Components
//!
//! - `python`: dunder members, pytest/unittest, web framework decorators
//! - `javascript`: exports, framework decorators, component lifecycle
//! - `rust`: `main`, `pub`, `#[test]`, `#[no_mangle]`, trait impl methods
//! - `generic`: Go, Java and anything else

pub mod generic;
pub mod javascript;
pub mod python;
pub mod rust;

use crate::config::{EntryPointConfig, CONFIG_FILE_NAME};
use crate::error::{SymgraphError, SymgraphResult};
use crate::model::{Language, Symbol, SymbolKind};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub use generic::GenericClassifier;
pub use javascript::JavaScriptClassifier;
pub use python::PythonClassifier;
pub use rust::RustClassifier;

/// Why a symbol is a reachability root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryReason {
    Exported,
    Main,
    Decorator,
    BaseClass,
    Test,
    Configured,
    ModuleScope,
}

impl fmt::Display for EntryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exported => "exported",
            Self::Main => "main",
            Self::Decorator => "decorator",
            Self::BaseClass => "base_class",
            Self::Test => "test",
            Self::Configured => "configured",
            Self::ModuleScope => "module_scope",
        };
        f.write_str(s)
    }
}

/// Per-language entry point conventions.
pub trait EntryPointClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    /// Root reason for a symbol, if any. `parent` is the enclosing symbol.
    fn entry_reason(&self, symbol: &Symbol, parent: Option<&Symbol>) -> Option<EntryReason>;

    /// Members reached implicitly when their class is reached
    /// (constructors, lifecycle hooks, operator overloads).
    fn is_implicit_member(&self, class: &Symbol, member: &Symbol) -> bool;

    fn is_builtin(&self, name: &str) -> bool;
}

/// Normalized decorator text: no `@`, no call arguments.
pub(crate) fn decorator_name(raw: &str) -> &str {
    let trimmed = raw.trim().trim_start_matches('@').trim_start_matches("#[");
    let end = trimmed.find(['(', ']']).unwrap_or(trimmed.len());
    trimmed[..end].trim()
}

/// Last segment of a dotted or `::` path.
pub(crate) fn last_segment(path: &str) -> &str {
    path.rsplit(['.', ':']).next().unwrap_or(path)
}

/// Non-private methods of an exported class are part of its API.
pub(crate) fn is_exported_member(symbol: &Symbol, parent: Option<&Symbol>) -> bool {
    symbol.kind == SymbolKind::Method
        && parent.is_some_and(|p| p.is_exported())
        && !symbol.name.starts_with('_')
        && !symbol.name.starts_with('#')
}

/// Classifiers for every language plus the configured overrides.
pub struct ClassifierRegistry {
    python: PythonClassifier,
    javascript: JavaScriptClassifier,
    rust: RustClassifier,
    generic: GenericClassifier,
    names: HashSet<String>,
    decorators: Vec<Regex>,
    test_patterns: Vec<Regex>,
}

fn compile(patterns: &[String], field: &str) -> SymgraphResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                SymgraphError::config(
                    CONFIG_FILE_NAME,
                    format!("invalid entry_points.{} pattern '{}': {}", field, p, e),
                )
            })
        })
        .collect()
}

impl ClassifierRegistry {
    pub fn new(config: &EntryPointConfig) -> SymgraphResult<Self> {
        Ok(Self {
            python: PythonClassifier,
            javascript: JavaScriptClassifier,
            rust: RustClassifier,
            generic: GenericClassifier,
            names: config.names.iter().cloned().collect(),
            decorators: compile(&config.decorators, "decorators")?,
            test_patterns: compile(&config.test_patterns, "test_patterns")?,
        })
    }

    pub fn for_language(&self, language: Language) -> &dyn EntryPointClassifier {
        match language {
            Language::Python => &self.python,
            Language::JavaScript | Language::TypeScript => &self.javascript,
            Language::Rust => &self.rust,
            Language::Go | Language::Java | Language::Other => &self.generic,
        }
    }

    pub fn is_test_file(&self, path: &str) -> bool {
        self.test_patterns.iter().any(|re| re.is_match(path))
    }

    /// Configured overrides first, then the language classifier.
    pub fn entry_reason(
        &self,
        language: Language,
        symbol: &Symbol,
        parent: Option<&Symbol>,
    ) -> Option<EntryReason> {
        if symbol.kind == SymbolKind::Import {
            return None;
        }
        if self.names.contains(&symbol.name) || self.names.contains(&symbol.qualified_name) {
            return Some(EntryReason::Configured);
        }
        if symbol
            .decorators
            .iter()
            .any(|d| self.decorators.iter().any(|re| re.is_match(decorator_name(d))))
        {
            return Some(EntryReason::Decorator);
        }
        self.for_language(language).entry_reason(symbol, parent)
    }

    pub fn is_builtin(&self, language: Language, name: &str) -> bool {
        self.for_language(language).is_builtin(name)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::model::{FileId, Symbol, SymbolId, SymbolKind, Visibility};
    use std::collections::BTreeMap;

    pub fn symbol(name: &str, kind: SymbolKind) -> Symbol {
        Symbol {
            id: SymbolId(name.len() as u64),
            name: name.to_string(),
            qualified_name: format!("m::{}", name),
            kind,
            file_id: FileId(1),
            file_path: "m".to_string(),
            start_line: 1,
            end_line: 1,
            cyclomatic_complexity: None,
            visibility: Visibility::Private,
            decorators: Vec::new(),
            parent: None,
            stale: false,
            tombstoned: false,
            metadata: BTreeMap::new(),
        }
    }
}
