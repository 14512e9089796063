//! Language-neutral AST consumed from parser adapters.
//!
//! The engine never tokenizes source text. A parser adapter (tree-sitter, a
//! language server, a compiler plugin) lowers its native tree into this
//! shape and hands it over either in memory or as a `*.ast.json` dump.
//!
//! Only the constructs the analysis needs are modelled: declarations,
//! imports, references and the branching constructs that feed cyclomatic
//! complexity. Everything else is an [`NodeKind::Other`] container whose
//! children are still walked.
//!
//! # JSON shape
//!
//! ```json
//! { "type": "function", "name": "run", "start_line": 3, "end_line": 9,
//!   "params": ["x"], "children": [ { "type": "call", "callee": "helper",
//!   "start_line": 4, "end_line": 4 } ] }
//! ```

use crate::model::Language;
use serde::{Deserialize, Serialize};

/// AST of one file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileAst {
    /// Overrides the extension-based language guess.
    #[serde(default)]
    pub language: Option<Language>,
    pub line_count: usize,
    #[serde(default)]
    pub nodes: Vec<AstNode>,
}

impl FileAst {
    pub fn new(line_count: usize, nodes: Vec<AstNode>) -> Self {
        Self {
            language: None,
            line_count,
            nodes,
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Checks the structural invariants the symbol builder relies on.
    ///
    /// Returns the first violation as `(line, message)`.
    pub fn validate(&self) -> Result<(), (usize, String)> {
        let mut stack: Vec<&AstNode> = self.nodes.iter().collect();
        while let Some(node) = stack.pop() {
            if node.start_line == 0 {
                return Err((0, format!("{} node starts at line 0", node.kind.label())));
            }
            if node.end_line < node.start_line {
                return Err((
                    node.start_line,
                    format!(
                        "{} node ends at line {} before it starts",
                        node.kind.label(),
                        node.end_line
                    ),
                ));
            }
            if node.end_line > self.line_count {
                return Err((
                    node.start_line,
                    format!(
                        "{} node spans to line {} past end of file ({} lines)",
                        node.kind.label(),
                        node.end_line,
                        self.line_count
                    ),
                ));
            }
            if let Some(name) = node.kind.declared_name() {
                if name.trim().is_empty() {
                    return Err((
                        node.start_line,
                        format!("{} declaration has an empty name", node.kind.label()),
                    ));
                }
            }
            if let NodeKind::Import { path, .. } = &node.kind {
                if path.trim().is_empty() {
                    return Err((node.start_line, "import with an empty path".to_string()));
                }
            }
            stack.extend(node.children.iter());
        }
        Ok(())
    }
}

/// One AST node with its source span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstNode {
    #[serde(flatten)]
    pub kind: NodeKind,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<AstNode>,
}

/// An imported member, optionally renamed (`from m import a as b`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedName {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
}

impl ImportedName {
    /// Name bound in the importing scope.
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Function {
        name: String,
        #[serde(default)]
        params: Vec<String>,
        #[serde(default)]
        exported: bool,
        #[serde(default)]
        decorators: Vec<String>,
        /// Measured Halstead volume, when the adapter computes one.
        #[serde(default)]
        halstead_volume: Option<f64>,
    },
    Class {
        name: String,
        #[serde(default)]
        bases: Vec<String>,
        #[serde(default)]
        exported: bool,
        #[serde(default)]
        decorators: Vec<String>,
    },
    Interface {
        name: String,
        #[serde(default)]
        extends: Vec<String>,
        #[serde(default)]
        exported: bool,
    },
    Variable {
        name: String,
        #[serde(default)]
        exported: bool,
    },
    Import {
        /// Module path as written (`..utils`, `./api`, `crate::db`).
        path: String,
        #[serde(default)]
        names: Vec<ImportedName>,
        /// Alias for whole-module imports (`import numpy as np`).
        #[serde(default)]
        alias: Option<String>,
        #[serde(default)]
        wildcard: bool,
        /// Runtime import (`import()`, `importlib.import_module`).
        #[serde(default)]
        dynamic: bool,
    },
    Identifier {
        name: String,
    },
    /// Call of a plain or dotted callee (`helper`, `self.save`, `np.array`).
    Call {
        callee: String,
    },
    /// Member access; `computed` marks `obj[expr]` style access.
    Attribute {
        object: String,
        attr: String,
        #[serde(default)]
        computed: bool,
    },
    If,
    ElseIf,
    Else,
    For,
    While,
    Case {
        #[serde(default)]
        default: bool,
    },
    /// One binary `and` / `or` operator.
    BoolOp {
        #[serde(default)]
        op: String,
    },
    Ternary,
    Block,
    Return,
    #[serde(other)]
    Other,
}

impl NodeKind {
    /// Name introduced by a declaration node.
    pub fn declared_name(&self) -> Option<&str> {
        match self {
            Self::Function { name, .. }
            | Self::Class { name, .. }
            | Self::Interface { name, .. }
            | Self::Variable { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Whether the node adds one to cyclomatic complexity.
    pub fn is_decision_point(&self) -> bool {
        match self {
            Self::If | Self::ElseIf | Self::For | Self::While | Self::BoolOp { .. } | Self::Ternary => {
                true
            }
            Self::Case { default } => !default,
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Function { .. } => "function",
            Self::Class { .. } => "class",
            Self::Interface { .. } => "interface",
            Self::Variable { .. } => "variable",
            Self::Import { .. } => "import",
            Self::Identifier { .. } => "identifier",
            Self::Call { .. } => "call",
            Self::Attribute { .. } => "attribute",
            Self::If => "if",
            Self::ElseIf => "else_if",
            Self::Else => "else",
            Self::For => "for",
            Self::While => "while",
            Self::Case { .. } => "case",
            Self::BoolOp { .. } => "bool_op",
            Self::Ternary => "ternary",
            Self::Block => "block",
            Self::Return => "return",
            Self::Other => "other",
        }
    }
}

// Construction helpers used by adapters written in Rust and by fixtures.
impl AstNode {
    pub fn new(kind: NodeKind, start_line: usize, end_line: usize) -> Self {
        Self {
            kind,
            start_line,
            end_line,
            children: Vec::new(),
        }
    }

    pub fn function(name: &str, start_line: usize, end_line: usize) -> Self {
        Self::new(
            NodeKind::Function {
                name: name.to_string(),
                params: Vec::new(),
                exported: false,
                decorators: Vec::new(),
                halstead_volume: None,
            },
            start_line,
            end_line,
        )
    }

    pub fn class(name: &str, start_line: usize, end_line: usize) -> Self {
        Self::new(
            NodeKind::Class {
                name: name.to_string(),
                bases: Vec::new(),
                exported: false,
                decorators: Vec::new(),
            },
            start_line,
            end_line,
        )
    }

    pub fn interface(name: &str, start_line: usize, end_line: usize) -> Self {
        Self::new(
            NodeKind::Interface {
                name: name.to_string(),
                extends: Vec::new(),
                exported: false,
            },
            start_line,
            end_line,
        )
    }

    pub fn variable(name: &str, line: usize) -> Self {
        Self::new(
            NodeKind::Variable {
                name: name.to_string(),
                exported: false,
            },
            line,
            line,
        )
    }

    /// Whole-module import (`import pkg.mod`).
    pub fn import(path: &str, line: usize) -> Self {
        Self::new(
            NodeKind::Import {
                path: path.to_string(),
                names: Vec::new(),
                alias: None,
                wildcard: false,
                dynamic: false,
            },
            line,
            line,
        )
    }

    /// Member import (`from pkg import a, b`).
    pub fn import_names(path: &str, names: &[&str], line: usize) -> Self {
        Self::new(
            NodeKind::Import {
                path: path.to_string(),
                names: names
                    .iter()
                    .map(|n| ImportedName {
                        name: n.to_string(),
                        alias: None,
                    })
                    .collect(),
                alias: None,
                wildcard: false,
                dynamic: false,
            },
            line,
            line,
        )
    }

    pub fn call(callee: &str, line: usize) -> Self {
        Self::new(
            NodeKind::Call {
                callee: callee.to_string(),
            },
            line,
            line,
        )
    }

    pub fn ident(name: &str, line: usize) -> Self {
        Self::new(
            NodeKind::Identifier {
                name: name.to_string(),
            },
            line,
            line,
        )
    }

    pub fn attr(object: &str, attr: &str, line: usize) -> Self {
        Self::new(
            NodeKind::Attribute {
                object: object.to_string(),
                attr: attr.to_string(),
                computed: false,
            },
            line,
            line,
        )
    }

    pub fn branch(kind: NodeKind, start_line: usize, end_line: usize) -> Self {
        Self::new(kind, start_line, end_line)
    }

    pub fn with_children(mut self, children: Vec<AstNode>) -> Self {
        self.children = children;
        self
    }

    pub fn exported(mut self) -> Self {
        match &mut self.kind {
            NodeKind::Function { exported, .. }
            | NodeKind::Class { exported, .. }
            | NodeKind::Interface { exported, .. }
            | NodeKind::Variable { exported, .. } => *exported = true,
            _ => {}
        }
        self
    }

    pub fn decorated(mut self, decorator: &str) -> Self {
        match &mut self.kind {
            NodeKind::Function { decorators, .. } | NodeKind::Class { decorators, .. } => {
                decorators.push(decorator.to_string())
            }
            _ => {}
        }
        self
    }

    pub fn with_params(mut self, names: &[&str]) -> Self {
        if let NodeKind::Function { params, .. } = &mut self.kind {
            *params = names.iter().map(|p| p.to_string()).collect();
        }
        self
    }

    pub fn with_bases(mut self, names: &[&str]) -> Self {
        match &mut self.kind {
            NodeKind::Class { bases, .. } => *bases = names.iter().map(|b| b.to_string()).collect(),
            NodeKind::Interface { extends, .. } => {
                *extends = names.iter().map(|b| b.to_string()).collect()
            }
            _ => {}
        }
        self
    }

    pub fn with_alias(mut self, name: &str) -> Self {
        if let NodeKind::Import { alias, .. } = &mut self.kind {
            *alias = Some(name.to_string());
        }
        self
    }

    pub fn wildcard(mut self) -> Self {
        if let NodeKind::Import { wildcard, .. } = &mut self.kind {
            *wildcard = true;
        }
        self
    }

    pub fn dynamic(mut self) -> Self {
        if let NodeKind::Import { dynamic, .. } = &mut self.kind {
            *dynamic = true;
        }
        self
    }
}
