//! Analysis findings attached to a snapshot.
//!
//! Issues are data, not errors: they are collected while a pass runs and the
//! pass carries on. Each one names the file, line, rule and a message meant
//! for humans.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of an [`Issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    ParseError,
    UnresolvedImport,
    UnresolvedReference,
    AmbiguousReference,
    CycleDetected,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseError => "parse_error",
            Self::UnresolvedImport => "unresolved_import",
            Self::UnresolvedReference => "unresolved_reference",
            Self::AmbiguousReference => "ambiguous_reference",
            Self::CycleDetected => "cycle_detected",
        }
    }
}

/// Severity of an [`Issue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Machine-readable rule identifiers.
pub mod rules {
    pub const PARSE_ERROR: &str = "parse-error";
    pub const UNRESOLVED_IMPORT: &str = "unresolved-import";
    pub const UNRESOLVED_IMPORT_NAME: &str = "unresolved-import-name";
    pub const UNRESOLVED_REFERENCE: &str = "unresolved-reference";
    pub const AMBIGUOUS_REFERENCE: &str = "ambiguous-reference";
    pub const IMPORT_CYCLE: &str = "import-cycle";
}

/// A finding produced during analysis.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Issue {
    pub file_path: String,
    pub line: usize,
    pub rule_id: String,
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    pub fn new(
        kind: IssueKind,
        rule_id: &str,
        file_path: impl Into<String>,
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        let severity = match kind {
            IssueKind::ParseError | IssueKind::UnresolvedImport => Severity::Error,
            IssueKind::AmbiguousReference => Severity::Info,
            IssueKind::UnresolvedReference | IssueKind::CycleDetected => Severity::Warning,
        };
        Self {
            file_path: file_path.into(),
            line,
            rule_id: rule_id.to_string(),
            kind,
            severity,
            message: message.into(),
        }
    }

    pub fn parse_error(file_path: &str, line: usize, message: impl Into<String>) -> Self {
        Self::new(IssueKind::ParseError, rules::PARSE_ERROR, file_path, line, message)
    }

    pub fn unresolved_import(file_path: &str, line: usize, import_path: &str) -> Self {
        Self::new(
            IssueKind::UnresolvedImport,
            rules::UNRESOLVED_IMPORT,
            file_path,
            line,
            format!("cannot resolve import '{}'", import_path),
        )
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: [{}] {}",
            self.file_path, self.line, self.rule_id, self.message
        )
    }
}

/// Kind of a broken import reported through the query API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportIssueKind {
    Unresolved,
    Circular,
}

/// An import that is unresolved or participates in a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImportIssue {
    pub file_path: String,
    pub import_path: String,
    pub kind: ImportIssueKind,
    pub line: usize,
}
