//! Symbol table builder: one AST in, one [`FileExtract`] out.
//!
//! Extracts:
//! - Functions, methods (functions directly inside a class), classes,
//!   interfaces and variables, locals included
//! - One import symbol per name an import statement binds
//! - The lexical scope tree, with parameters bound but not declared
//! - Raw references (identifiers, calls, attribute accesses, base classes,
//!   decorators) for the usage resolver
//! - Complexity inputs for every function
//!
//! Extraction is pure and per file, so it runs in parallel and its output
//! can be cached by content hash.

use crate::ast::{AstNode, FileAst, NodeKind};
use crate::complexity::{decision_points, FunctionMetrics};
use crate::issues::Issue;
use crate::model::{
    FileId, FileMeta, Import, ImportId, ImportStatus, Language, SourceFile, Symbol, SymbolId,
    SymbolKind, UsageKind, Visibility,
};
use crate::symbols::scope::{Binding, ScopeId, ScopeKind, ScopeTree, WildcardImport};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// What a raw reference names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "form", rename_all = "snake_case")]
pub enum RefTarget {
    /// Bare identifier.
    Name { name: String },
    /// `object.attr`; `object` may itself be dotted.
    Member {
        object: String,
        attr: String,
        computed: bool,
    },
}

impl RefTarget {
    /// Splits a dotted or `::` path into a member access on its last segment.
    pub fn from_path(path: &str) -> Self {
        let normalized = path.replace("::", ".");
        match normalized.rsplit_once('.') {
            Some((object, attr)) if !object.is_empty() && !attr.is_empty() => Self::Member {
                object: object.to_string(),
                attr: attr.to_string(),
                computed: false,
            },
            _ => Self::Name {
                name: normalized.trim_matches('.').to_string(),
            },
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Name { name } => name.clone(),
            Self::Member {
                object,
                attr,
                computed: false,
            } => format!("{}.{}", object, attr),
            Self::Member { object, attr, .. } => format!("{}[{}]", object, attr),
        }
    }
}

/// A reference found in a body, before resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReference {
    pub scope: ScopeId,
    /// Innermost enclosing function or class; `None` at module level.
    pub source: Option<SymbolId>,
    pub target: RefTarget,
    pub kind: UsageKind,
    pub line: usize,
}

/// Everything the builder derives from one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileExtract {
    pub file: SourceFile,
    pub symbols: Vec<Symbol>,
    pub imports: Vec<Import>,
    pub scopes: ScopeTree,
    pub references: Vec<RawReference>,
    pub metrics: BTreeMap<SymbolId, FunctionMetrics>,
    pub issues: Vec<Issue>,
    pub parse_failed: bool,
}

impl FileExtract {
    /// A known file with no symbols and a `parse-error` issue.
    pub fn failed(file: SourceFile, line: usize, message: &str) -> Self {
        let issue = Issue::parse_error(&file.path, line, message);
        Self {
            file,
            symbols: Vec::new(),
            imports: Vec::new(),
            scopes: ScopeTree::new(),
            references: Vec::new(),
            metrics: BTreeMap::new(),
            issues: vec![issue],
            parse_failed: true,
        }
    }

    pub fn path(&self) -> &str {
        &self.file.path
    }

    pub fn language(&self) -> Language {
        self.file.language
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.id == id)
    }
}

/// Module part of qualified names: path without extension, `/` as `::`.
pub fn module_path(path: &str) -> String {
    let stem = match path.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') && !stem.is_empty() => stem,
        _ => path,
    };
    stem.trim_start_matches("./").replace('/', "::")
}

/// AST visitor that builds symbols, scopes and references for one file.
struct SymbolBuilder<'a> {
    file_id: FileId,
    path: &'a str,
    language: Language,
    symbols: Vec<Symbol>,
    imports: Vec<Import>,
    scopes: ScopeTree,
    references: Vec<RawReference>,
    metrics: BTreeMap<SymbolId, FunctionMetrics>,
    ordinals: HashMap<String, usize>,
}

/// Declaration details shared by every symbol kind.
struct Decl<'n> {
    name: &'n str,
    kind: SymbolKind,
    exported: bool,
    decorators: &'n [String],
    metadata: BTreeMap<String, String>,
}

impl<'a> SymbolBuilder<'a> {
    fn new(file_id: FileId, path: &'a str, language: Language) -> Self {
        Self {
            file_id,
            path,
            language,
            symbols: Vec::with_capacity(32),
            imports: Vec::new(),
            scopes: ScopeTree::new(),
            references: Vec::new(),
            metrics: BTreeMap::new(),
            ordinals: HashMap::new(),
        }
    }

    /// Qualified name with an ordinal suffix for repeated names in a scope.
    fn qualify(&mut self, prefix: &str, name: &str) -> String {
        let base = format!("{}::{}", prefix, name);
        let n = self.ordinals.entry(base.clone()).or_insert(0);
        *n += 1;
        if *n > 1 {
            format!("{}#{}", base, n)
        } else {
            base
        }
    }

    fn declare(
        &mut self,
        decl: Decl<'_>,
        node: &AstNode,
        scope: ScopeId,
        owner: Option<SymbolId>,
        prefix: &str,
    ) -> (SymbolId, String) {
        let qualified_name = self.qualify(prefix, decl.name);
        let id = SymbolId::derive(self.path, &qualified_name, decl.kind);
        self.symbols.push(Symbol {
            id,
            name: decl.name.to_string(),
            qualified_name: qualified_name.clone(),
            kind: decl.kind,
            file_id: self.file_id,
            file_path: self.path.to_string(),
            start_line: node.start_line,
            end_line: node.end_line,
            cyclomatic_complexity: None,
            visibility: if decl.exported {
                Visibility::Public
            } else {
                Visibility::Private
            },
            decorators: decl.decorators.to_vec(),
            parent: owner,
            stale: false,
            tombstoned: false,
            metadata: decl.metadata,
        });
        self.scopes.bind(scope, decl.name, Binding::Symbol { id });
        (id, qualified_name)
    }

    fn reference(
        &mut self,
        scope: ScopeId,
        source: Option<SymbolId>,
        target: RefTarget,
        kind: UsageKind,
        line: usize,
    ) {
        self.references.push(RawReference {
            scope,
            source,
            target,
            kind,
            line,
        });
    }

    /// Decorator expressions are evaluated in the enclosing scope.
    fn decorator_references(
        &mut self,
        decorators: &[String],
        scope: ScopeId,
        owner: Option<SymbolId>,
        line: usize,
    ) {
        for decorator in decorators {
            let expr = decorator.trim_start_matches('@');
            let expr = expr.split('(').next().unwrap_or(expr).trim();
            if !expr.is_empty() {
                self.reference(scope, owner, RefTarget::from_path(expr), UsageKind::Call, line);
            }
        }
    }

    fn visit_nodes(
        &mut self,
        nodes: &[AstNode],
        scope: ScopeId,
        owner: Option<SymbolId>,
        prefix: &str,
    ) {
        for node in nodes {
            self.visit_node(node, scope, owner, prefix);
        }
    }

    fn visit_node(&mut self, node: &AstNode, scope: ScopeId, owner: Option<SymbolId>, prefix: &str) {
        match &node.kind {
            NodeKind::Function {
                name,
                params,
                exported,
                decorators,
                halstead_volume,
            } => {
                let in_class = self
                    .scopes
                    .get(scope)
                    .is_some_and(|s| s.kind == ScopeKind::Class);
                let kind = if in_class {
                    SymbolKind::Method
                } else {
                    SymbolKind::Function
                };
                self.decorator_references(decorators, scope, owner, node.start_line);
                let decl = Decl {
                    name,
                    kind,
                    exported: *exported,
                    decorators,
                    metadata: BTreeMap::new(),
                };
                let (id, qualified) = self.declare(decl, node, scope, owner, prefix);
                self.metrics.insert(
                    id,
                    FunctionMetrics {
                        decision_points: decision_points(&node.children),
                        loc: node.end_line - node.start_line + 1,
                        halstead_volume: *halstead_volume,
                    },
                );

                let body = self.scopes.push(scope, ScopeKind::Function, id);
                for param in params {
                    self.scopes.bind(body, param, Binding::Parameter);
                }
                self.visit_nodes(&node.children, body, Some(id), &qualified);
            }

            NodeKind::Class {
                name,
                bases,
                exported,
                decorators,
            } => {
                self.decorator_references(decorators, scope, owner, node.start_line);
                let mut metadata = BTreeMap::new();
                if !bases.is_empty() {
                    metadata.insert("bases".to_string(), bases.join(","));
                }
                let decl = Decl {
                    name,
                    kind: SymbolKind::Class,
                    exported: *exported,
                    decorators,
                    metadata,
                };
                let (id, qualified) = self.declare(decl, node, scope, owner, prefix);
                self.visit_type_body(node, bases, id, scope, &qualified);
            }

            NodeKind::Interface {
                name,
                extends,
                exported,
            } => {
                let mut metadata = BTreeMap::new();
                if !extends.is_empty() {
                    metadata.insert("bases".to_string(), extends.join(","));
                }
                let decl = Decl {
                    name,
                    kind: SymbolKind::Interface,
                    exported: *exported,
                    decorators: &[],
                    metadata,
                };
                let (id, qualified) = self.declare(decl, node, scope, owner, prefix);
                self.visit_type_body(node, extends, id, scope, &qualified);
            }

            NodeKind::Variable { name, exported } => {
                let decl = Decl {
                    name,
                    kind: SymbolKind::Variable,
                    exported: *exported,
                    decorators: &[],
                    metadata: BTreeMap::new(),
                };
                self.declare(decl, node, scope, owner, prefix);
                // Initializer belongs to the enclosing body
                self.visit_nodes(&node.children, scope, owner, prefix);
            }

            NodeKind::Import {
                path,
                names,
                alias,
                wildcard,
                dynamic,
            } => {
                self.visit_import(
                    node,
                    path,
                    names,
                    alias.as_deref(),
                    *wildcard,
                    *dynamic,
                    scope,
                    owner,
                    prefix,
                );
            }

            NodeKind::Identifier { name } => {
                self.reference(
                    scope,
                    owner,
                    RefTarget::Name { name: name.clone() },
                    UsageKind::Reference,
                    node.start_line,
                );
            }

            NodeKind::Call { callee } => {
                self.reference(
                    scope,
                    owner,
                    RefTarget::from_path(callee),
                    UsageKind::Call,
                    node.start_line,
                );
                self.visit_nodes(&node.children, scope, owner, prefix);
            }

            NodeKind::Attribute {
                object,
                attr,
                computed,
            } => {
                self.reference(
                    scope,
                    owner,
                    RefTarget::Member {
                        object: object.replace("::", "."),
                        attr: attr.clone(),
                        computed: *computed,
                    },
                    UsageKind::Reference,
                    node.start_line,
                );
                self.visit_nodes(&node.children, scope, owner, prefix);
            }

            _ => self.visit_nodes(&node.children, scope, owner, prefix),
        }
    }

    fn visit_type_body(
        &mut self,
        node: &AstNode,
        bases: &[String],
        id: SymbolId,
        scope: ScopeId,
        qualified: &str,
    ) {
        // Bases are evaluated outside the class body
        for base in bases {
            self.reference(
                scope,
                Some(id),
                RefTarget::from_path(base),
                UsageKind::Inherit,
                node.start_line,
            );
        }
        let body = self.scopes.push(scope, ScopeKind::Class, id);
        self.visit_nodes(&node.children, body, Some(id), qualified);
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_import(
        &mut self,
        node: &AstNode,
        raw_path: &str,
        names: &[crate::ast::ImportedName],
        alias: Option<&str>,
        wildcard: bool,
        dynamic: bool,
        scope: ScopeId,
        owner: Option<SymbolId>,
        prefix: &str,
    ) {
        let import_id = ImportId::derive(self.path, self.imports.len());
        self.imports.push(Import {
            id: import_id,
            file_id: self.file_id,
            file_path: self.path.to_string(),
            raw_path: raw_path.to_string(),
            names: names.iter().map(|n| n.name.clone()).collect(),
            line: node.start_line,
            is_relative: self.language.is_relative_import(raw_path),
            is_dynamic: dynamic,
            is_wildcard: wildcard,
            status: ImportStatus::Unresolved,
            resolved_target: None,
            resolved_path: None,
            submodule_paths: Vec::new(),
            is_external: false,
            package_name: None,
            stale: false,
            tombstoned: false,
        });

        let mut bound: Vec<(String, Option<String>)> = Vec::new();
        if wildcard {
            bound.push(("*".to_string(), None));
        }
        for imported in names {
            bound.push((imported.local_name().to_string(), Some(imported.name.clone())));
        }
        if !wildcard && names.is_empty() {
            bound.push((self.module_binding_name(raw_path, alias), None));
        }

        for (local, member) in bound {
            let mut metadata = BTreeMap::new();
            metadata.insert("import_path".to_string(), raw_path.to_string());
            if let Some(m) = &member {
                metadata.insert("member".to_string(), m.clone());
            }
            let qualified_name = self.qualify(prefix, &local);
            let symbol = SymbolId::derive(self.path, &qualified_name, SymbolKind::Import);
            self.symbols.push(Symbol {
                id: symbol,
                name: local.clone(),
                qualified_name,
                kind: SymbolKind::Import,
                file_id: self.file_id,
                file_path: self.path.to_string(),
                start_line: node.start_line,
                end_line: node.end_line,
                cyclomatic_complexity: None,
                visibility: Visibility::Private,
                decorators: Vec::new(),
                parent: owner,
                stale: false,
                tombstoned: false,
                metadata,
            });
            if local == "*" {
                self.scopes.add_wildcard(
                    scope,
                    WildcardImport {
                        import: import_id,
                        symbol,
                    },
                );
            } else {
                self.scopes.bind(
                    scope,
                    &local,
                    Binding::Import {
                        import: import_id,
                        symbol,
                        member,
                    },
                );
            }
        }
    }

    /// Local name of a whole-module import.
    fn module_binding_name(&self, raw_path: &str, alias: Option<&str>) -> String {
        if let Some(alias) = alias {
            return alias.to_string();
        }
        match self.language {
            // `import a.b` is referenced as `a.b` in code
            Language::Python => raw_path.trim_start_matches('.').to_string(),
            _ => {
                let last = raw_path
                    .rsplit(['/', '.', ':'])
                    .find(|s| !s.is_empty())
                    .unwrap_or(raw_path);
                last.to_string()
            }
        }
    }
}

/// Runs the builder over one file.
///
/// An absent or malformed AST yields [`FileExtract::failed`]: the file stays
/// known, has no symbols and carries a `parse-error` issue.
pub fn extract_file(meta: &FileMeta, ast: Result<&FileAst, &str>) -> FileExtract {
    let language = ast
        .as_ref()
        .ok()
        .and_then(|a| a.language)
        .unwrap_or_else(|| Language::from_path(&meta.path));
    let mut file = SourceFile {
        id: FileId::for_path(&meta.path),
        path: meta.path.clone(),
        language,
        line_count: 0,
        content_hash: meta.content_hash.clone(),
        file_size: meta.file_size,
        last_modified: meta.last_modified,
        deleted: false,
    };

    let ast = match ast {
        Ok(ast) => ast,
        Err(message) => {
            tracing::warn!(path = %meta.path, error = %message, "parser adapter produced no AST");
            return FileExtract::failed(file, 0, message);
        }
    };
    file.line_count = ast.line_count;

    if let Err((line, message)) = ast.validate() {
        tracing::warn!(path = %meta.path, line, error = %message, "malformed AST");
        return FileExtract::failed(file, line, &message);
    }

    let mut builder = SymbolBuilder::new(file.id, &meta.path, language);
    let module = module_path(&meta.path);
    builder.visit_nodes(&ast.nodes, ScopeId::MODULE, None, &module);

    tracing::debug!(
        path = %meta.path,
        symbols = builder.symbols.len(),
        imports = builder.imports.len(),
        references = builder.references.len(),
        "extracted file"
    );

    FileExtract {
        file,
        symbols: builder.symbols,
        imports: builder.imports,
        scopes: builder.scopes,
        references: builder.references,
        metrics: builder.metrics,
        issues: Vec::new(),
        parse_failed: false,
    }
}
