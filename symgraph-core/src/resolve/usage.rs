//! Usage resolution: raw references → usage edges.
//!
//! Every reference resolves to exactly one of:
//! - [`Resolution::Resolved`]: a single declaring symbol
//! - [`Resolution::Ambiguous`]: several plausible symbols; no edge is
//!   created and the reference is reported
//! - [`Resolution::Unresolved`]: builtin, local (parameter or instance
//!   attribute) or not found
//!
//! Lookup order for a bare name: enclosing scopes outward to the module
//! scope (declarations, import bindings, wildcard imports), then the
//! language's builtins. Member accesses resolve `self`/`this` through the
//! enclosing class and its bases, module aliases through the imported file,
//! class names through the class body, and anything else by name among the
//! functions and methods visible from the file (its transitive import
//! closure).
//!
//! A file's resolution depends only on the file itself and on files it
//! imports, directly or transitively. The incremental coordinator relies on
//! this to limit re-resolution to changed files and their dependents.

use crate::entry::ClassifierRegistry;
use crate::issues::{rules, Issue, IssueKind};
use crate::model::{Import, ImportStatus, SymbolId, UsageEdge, UsageKind};
use crate::symbols::extractor::{FileExtract, RawReference, RefTarget};
use crate::symbols::scope::{Binding, ScopeId, ScopeKind};
use crate::symbols::table::{ImportBinding, SymbolTable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Bound on import re-export chains and base class hierarchies.
const MAX_DEPTH: usize = 16;

/// Receivers that denote the current instance or class.
const SELF_NAMES: &[&str] = &["self", "this", "cls", "Self"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    Builtin,
    /// Parameter or instance attribute.
    Local,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Resolved(SymbolId),
    Ambiguous(Vec<SymbolId>),
    Unresolved(UnresolvedReason),
}

/// A reference with several candidate targets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AmbiguousReference {
    pub file_path: String,
    pub line: usize,
    pub source: Option<SymbolId>,
    pub name: String,
    pub candidates: Vec<SymbolId>,
}

/// Resolution output of one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileResolution {
    pub path: String,
    /// The file's imports with resolution status filled in.
    pub imports: Vec<Import>,
    /// Coalesced usage and import-use edges originating from this file.
    pub edges: Vec<UsageEdge>,
    /// Targets of module-level references.
    pub module_roots: Vec<SymbolId>,
    pub ambiguous: Vec<AmbiguousReference>,
    pub issues: Vec<Issue>,
}

/// Result of a lexical name lookup.
enum Lexical {
    Symbol(SymbolId),
    Parameter,
    Import(SymbolId),
    /// Name provided by a wildcard import; `decl` is known when the
    /// wildcard's target file is in the repository.
    Wildcard {
        symbol: SymbolId,
        decl: Option<Export>,
    },
}

/// A module-level name exported by a file plus the import-use links needed
/// to reach it through wildcard re-exports.
#[derive(Clone)]
struct Export {
    symbol: SymbolId,
    /// Declaration behind any wildcard re-exports.
    decl: SymbolId,
    links: Vec<(SymbolId, SymbolId)>,
}

/// One resolved reference and the extra edges it implies.
struct Outcome {
    resolution: Resolution,
    /// Further symbols used by the same source (receivers, classes).
    also: Vec<SymbolId>,
    /// Import-use edges discovered along the way.
    links: Vec<(SymbolId, SymbolId)>,
}

impl Outcome {
    fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            also: Vec::new(),
            links: Vec::new(),
        }
    }

    fn resolved(id: SymbolId) -> Self {
        Self::new(Resolution::Resolved(id))
    }

    fn with_also(mut self, id: SymbolId) -> Self {
        self.also.push(id);
        self
    }
}

/// Module name a file path stands for (`pkg/sub/__init__.py` → `sub`).
fn module_name_of(path: &str) -> &str {
    let file = path.rsplit('/').next().unwrap_or(path);
    let stem = file.split('.').next().unwrap_or(file);
    if matches!(stem, "__init__" | "index" | "mod") {
        let dir = path.rsplit_once('/').map(|(d, _)| d).unwrap_or("");
        dir.rsplit('/').next().unwrap_or(dir)
    } else {
        stem
    }
}

/// Resolves the references of one file against a complete symbol table.
pub struct UsageResolver<'t> {
    table: &'t SymbolTable<'t>,
    registry: &'t ClassifierRegistry,
}

impl<'t> UsageResolver<'t> {
    pub fn new(table: &'t SymbolTable<'t>, registry: &'t ClassifierRegistry) -> Self {
        Self { table, registry }
    }

    /// Resolves one reference. Exposed for tests and tooling.
    pub fn resolve_reference(&self, extract: &FileExtract, reference: &RawReference) -> Resolution {
        let mut closure = None;
        self.resolve(extract, reference, &mut closure).resolution
    }

    pub fn resolve_file(&self, extract: &FileExtract, imports: Vec<Import>) -> FileResolution {
        let path = extract.path().to_string();
        let mut edges: BTreeMap<(SymbolId, SymbolId, UsageKind), u32> = BTreeMap::new();
        let mut module_roots = Vec::new();
        let mut ambiguous = Vec::new();
        let mut issues = Vec::new();

        let mut add_edge = |source: SymbolId, target: SymbolId, kind: UsageKind| {
            if source != target {
                *edges.entry((source, target, kind)).or_insert(0) += 1;
            }
        };

        // Import bindings → imported declarations
        for scope in extract.scopes.iter() {
            for (local, bindings) in &scope.bindings {
                for binding in bindings {
                    let Binding::Import {
                        import,
                        symbol,
                        member,
                    } = binding
                    else {
                        continue;
                    };
                    let Some(imp) = self.table.import(*import) else {
                        continue;
                    };
                    let Some(target) = imp.resolved_path.as_deref() else {
                        continue;
                    };
                    if imp.status != ImportStatus::Resolved {
                        continue;
                    }
                    match member {
                        Some(name) => {
                            if let Some(export) = self.export_of(target, name, 0) {
                                add_edge(*symbol, export.symbol, UsageKind::ImportUse);
                                for (a, b) in export.links {
                                    add_edge(a, b, UsageKind::ImportUse);
                                }
                            } else if self.submodule_for(imp, name).is_none() {
                                issues.push(Issue::new(
                                    IssueKind::UnresolvedReference,
                                    rules::UNRESOLVED_IMPORT_NAME,
                                    &path,
                                    imp.line,
                                    format!("'{}' is not defined in {}", name, target),
                                ));
                            }
                        }
                        None => {
                            // `import com.acme.Parser` / `use crate::db::Pool`
                            let declared = self
                                .table
                                .module_scope(target)
                                .and_then(|s| s.lookup(local));
                            if let Some(Binding::Symbol { id }) = declared {
                                add_edge(*symbol, *id, UsageKind::ImportUse);
                            }
                        }
                    }
                }
            }
        }

        let mut closure = None;
        for reference in &extract.references {
            let outcome = self.resolve(extract, reference, &mut closure);
            for (a, b) in &outcome.links {
                add_edge(*a, *b, UsageKind::ImportUse);
            }

            let mut targets: Vec<(SymbolId, UsageKind)> = outcome
                .also
                .iter()
                .map(|id| (*id, UsageKind::Reference))
                .collect();

            match outcome.resolution {
                Resolution::Resolved(id) => targets.push((id, reference.kind)),
                Resolution::Ambiguous(candidates) => {
                    let name = reference.target.display();
                    tracing::warn!(
                        path = %path,
                        line = reference.line,
                        name = %name,
                        candidates = candidates.len(),
                        "ambiguous reference"
                    );
                    issues.push(Issue::new(
                        IssueKind::AmbiguousReference,
                        rules::AMBIGUOUS_REFERENCE,
                        &path,
                        reference.line,
                        format!("'{}' matches {} candidate symbols", name, candidates.len()),
                    ));
                    ambiguous.push(AmbiguousReference {
                        file_path: path.clone(),
                        line: reference.line,
                        source: reference.source,
                        name,
                        candidates,
                    });
                }
                Resolution::Unresolved(UnresolvedReason::NotFound) => {
                    if let RefTarget::Name { name } = &reference.target {
                        issues.push(Issue::new(
                            IssueKind::UnresolvedReference,
                            rules::UNRESOLVED_REFERENCE,
                            &path,
                            reference.line,
                            format!("cannot resolve '{}'", name),
                        ));
                    }
                }
                Resolution::Unresolved(_) => {}
            }

            for (target, kind) in targets {
                match reference.source {
                    Some(source) => add_edge(source, target, kind),
                    None => module_roots.push(target),
                }
            }
        }

        for imp in &imports {
            if imp.status == ImportStatus::Unresolved {
                issues.push(Issue::unresolved_import(&path, imp.line, &imp.raw_path));
            }
        }

        module_roots.sort_unstable();
        module_roots.dedup();
        issues.sort();
        issues.dedup();
        let edges = edges
            .into_iter()
            .map(|((source, target, kind), count)| UsageEdge {
                source,
                target,
                kind,
                count,
                stale: false,
            })
            .collect();

        FileResolution {
            path,
            imports,
            edges,
            module_roots,
            ambiguous,
            issues,
        }
    }

    fn resolve(
        &self,
        extract: &FileExtract,
        reference: &RawReference,
        closure: &mut Option<HashSet<&'t str>>,
    ) -> Outcome {
        match &reference.target {
            RefTarget::Name { name } => match self.lookup_name(extract, reference.scope, name) {
                Some(Lexical::Symbol(id)) | Some(Lexical::Import(id)) => Outcome::resolved(id),
                Some(Lexical::Parameter) => {
                    Outcome::new(Resolution::Unresolved(UnresolvedReason::Local))
                }
                Some(Lexical::Wildcard { symbol, decl }) => {
                    let mut outcome = Outcome::resolved(symbol);
                    if let Some(export) = decl {
                        outcome.links = export.links;
                        outcome.links.push((symbol, export.symbol));
                    }
                    outcome
                }
                None if self.registry.is_builtin(extract.language(), name) => {
                    Outcome::new(Resolution::Unresolved(UnresolvedReason::Builtin))
                }
                None => Outcome::new(Resolution::Unresolved(UnresolvedReason::NotFound)),
            },
            RefTarget::Member {
                object,
                attr,
                computed,
            } => self.resolve_member(extract, reference.scope, object, attr, *computed, closure),
        }
    }

    fn resolve_member(
        &self,
        extract: &FileExtract,
        scope: ScopeId,
        object: &str,
        attr: &str,
        computed: bool,
        closure: &mut Option<HashSet<&'t str>>,
    ) -> Outcome {
        if computed {
            return Outcome::new(self.duck_typed(extract, attr, true, closure));
        }

        if SELF_NAMES.contains(&object) {
            let member = extract
                .scopes
                .enclosing_class(scope)
                .and_then(|class| self.member_of_type(class, attr, 0, &mut HashSet::new()));
            return match member {
                Some(id) => Outcome::resolved(id),
                None => Outcome::new(Resolution::Unresolved(UnresolvedReason::Local)),
            };
        }

        let root = object.split('.').next().unwrap_or(object);
        let full = self.lookup_name(extract, scope, object);
        let fully_matched = full.is_some();
        let lexical = match full {
            Some(found) => Some(found),
            None if root != object => self.lookup_name(extract, scope, root),
            None => None,
        };

        match lexical {
            Some(Lexical::Import(symbol)) if fully_matched => {
                let binding = self.table.import_binding(symbol);
                if let Some(module) = binding.and_then(|b| self.module_target(b)) {
                    let mut outcome = Outcome::resolved(symbol);
                    if let Some(export) = self.export_of(module, attr, 0) {
                        outcome.links = export.links;
                        outcome.links.push((symbol, export.symbol));
                    }
                    return outcome;
                }
                let member = self
                    .final_decl(symbol, 0)
                    .filter(|d| self.table.is_type(*d))
                    .and_then(|class| self.member_of_type(class, attr, 0, &mut HashSet::new()));
                match member {
                    Some(id) => Outcome::resolved(id).with_also(symbol),
                    None => Outcome::resolved(symbol),
                }
            }
            Some(Lexical::Symbol(id)) if fully_matched && self.table.is_type(id) => {
                match self.member_of_type(id, attr, 0, &mut HashSet::new()) {
                    Some(member) => Outcome::resolved(member).with_also(id),
                    None => Outcome::resolved(id),
                }
            }
            Some(Lexical::Symbol(id)) | Some(Lexical::Import(id)) => {
                Outcome::new(self.duck_typed(extract, attr, false, closure)).with_also(id)
            }
            Some(Lexical::Wildcard { symbol, decl }) => {
                let mut outcome =
                    Outcome::new(self.duck_typed(extract, attr, false, closure)).with_also(symbol);
                if let Some(export) = decl {
                    outcome.links = export.links;
                    outcome.links.push((symbol, export.symbol));
                }
                outcome
            }
            Some(Lexical::Parameter) => Outcome::new(self.duck_typed(extract, attr, false, closure)),
            None if self.registry.is_builtin(extract.language(), root) => {
                Outcome::new(Resolution::Unresolved(UnresolvedReason::Builtin))
            }
            None => Outcome::new(self.duck_typed(extract, attr, false, closure)),
        }
    }

    /// Lexical lookup from `start` outward.
    fn lookup_name(&self, extract: &FileExtract, start: ScopeId, name: &str) -> Option<Lexical> {
        let language = extract.language();
        let mut opaque_wildcard = None;

        for scope in extract.scopes.chain(start) {
            if scope.kind == ScopeKind::Class
                && scope.id != start
                && !language.class_members_in_scope()
            {
                continue;
            }
            match scope.lookup(name) {
                Some(Binding::Symbol { id }) => return Some(Lexical::Symbol(*id)),
                Some(Binding::Parameter) => return Some(Lexical::Parameter),
                Some(Binding::Import { symbol, .. }) => return Some(Lexical::Import(*symbol)),
                None => {}
            }
            for wildcard in &scope.wildcards {
                match self.table.import(wildcard.import) {
                    Some(imp) if imp.status == ImportStatus::Resolved => {
                        let decl = imp
                            .resolved_path
                            .as_deref()
                            .and_then(|target| self.export_of(target, name, 1));
                        if decl.is_some() {
                            return Some(Lexical::Wildcard {
                                symbol: wildcard.symbol,
                                decl,
                            });
                        }
                    }
                    _ => {
                        opaque_wildcard.get_or_insert(wildcard.symbol);
                    }
                }
            }
        }

        // An external wildcard may provide any name that is not a builtin
        match opaque_wildcard {
            Some(symbol) if !self.registry.is_builtin(language, name) => {
                Some(Lexical::Wildcard { symbol, decl: None })
            }
            _ => None,
        }
    }

    /// Module-level binding `name` of `path`, following wildcard re-exports.
    fn export_of(&self, path: &str, name: &str, depth: usize) -> Option<Export> {
        if depth > MAX_DEPTH {
            return None;
        }
        let scope = self.table.module_scope(path)?;
        match scope.lookup(name) {
            Some(Binding::Symbol { id: symbol }) | Some(Binding::Import { symbol, .. }) => {
                return Some(Export {
                    symbol: *symbol,
                    decl: *symbol,
                    links: Vec::new(),
                })
            }
            Some(Binding::Parameter) => return None,
            None => {}
        }
        for wildcard in &scope.wildcards {
            let Some(target) = self.table.import_target(wildcard.import) else {
                continue;
            };
            if target == path {
                continue;
            }
            if let Some(mut inner) = self.export_of(target, name, depth + 1) {
                inner.links.push((wildcard.symbol, inner.symbol));
                return Some(Export {
                    symbol: wildcard.symbol,
                    decl: inner.decl,
                    links: inner.links,
                });
            }
        }
        None
    }

    /// Follows import symbols to the declaration they finally name.
    fn final_decl(&self, symbol: SymbolId, depth: usize) -> Option<SymbolId> {
        if depth > MAX_DEPTH {
            return None;
        }
        if !self.table.is_import(symbol) {
            return Some(symbol);
        }
        let binding = self.table.import_binding(symbol)?;
        let target = self.table.import_target(binding.import)?;
        let name = match &binding.member {
            Some(member) => member.as_str(),
            None => self.table.symbol(symbol)?.name.as_str(),
        };
        let export = self.export_of(target, name, 0)?;
        self.final_decl(export.decl, depth + 1)
    }

    /// File an import binding denotes when it names a module.
    fn module_target(&self, binding: &ImportBinding) -> Option<&'t str> {
        let imp = self.table.import(binding.import)?;
        if imp.status != ImportStatus::Resolved {
            return None;
        }
        match &binding.member {
            None if !imp.is_wildcard => imp.resolved_path.as_deref(),
            None => None,
            Some(member) => self.submodule_for(imp, member),
        }
    }

    fn submodule_for<'i>(&self, imp: &'i Import, member: &str) -> Option<&'i str> {
        imp.submodule_paths
            .iter()
            .find(|p| module_name_of(p) == member)
            .map(|p| p.as_str())
    }

    /// Member `name` of a class, searching resolved bases depth-first.
    fn member_of_type(
        &self,
        class: SymbolId,
        name: &str,
        depth: usize,
        visited: &mut HashSet<SymbolId>,
    ) -> Option<SymbolId> {
        if depth > MAX_DEPTH || !visited.insert(class) {
            return None;
        }
        if let Some(Binding::Symbol { id }) = self.table.class_scope(class)?.lookup(name) {
            return Some(*id);
        }
        let symbol = self.table.symbol(class)?;
        for base in symbol.bases() {
            if let Some(base_id) = self.resolve_type_name(&symbol.file_path, base) {
                if let Some(found) = self.member_of_type(base_id, name, depth + 1, visited) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Resolves a base class name as written in `file_path`'s module scope.
    fn resolve_type_name(&self, file_path: &str, name: &str) -> Option<SymbolId> {
        let scope = self.table.module_scope(file_path)?;
        let normalized = name.replace("::", ".");
        let decl = match normalized.rsplit_once('.') {
            Some((object, attr)) => match scope.lookup(object) {
                Some(Binding::Import { symbol, .. }) => {
                    let binding = self.table.import_binding(*symbol)?;
                    let module = self.module_target(binding)?;
                    let export = self.export_of(module, attr, 0)?;
                    self.final_decl(export.decl, 0)?
                }
                _ => return None,
            },
            None => match scope.lookup(&normalized)? {
                Binding::Symbol { id } => *id,
                Binding::Import { symbol, .. } => self.final_decl(*symbol, 0)?,
                Binding::Parameter => return None,
            },
        };
        self.table.is_type(decl).then_some(decl)
    }

    /// Name-based fallback over functions and methods visible from the
    /// file. Computed accesses are ambiguous whenever any candidate exists.
    fn duck_typed(
        &self,
        extract: &FileExtract,
        attr: &str,
        computed: bool,
        closure: &mut Option<HashSet<&'t str>>,
    ) -> Resolution {
        let named = self.table.callables_named(attr);
        if named.is_empty() {
            return Resolution::Unresolved(UnresolvedReason::NotFound);
        }
        let visible = closure.get_or_insert_with(|| match self.table.file(extract.path()) {
            Some(file) => self.table.import_closure(file.path()),
            None => HashSet::new(),
        });
        let mut candidates: Vec<SymbolId> = named
            .iter()
            .copied()
            .filter(|id| {
                self.table
                    .symbol(*id)
                    .is_some_and(|s| visible.contains(s.file_path.as_str()))
            })
            .collect();
        candidates.sort_unstable();

        match candidates.len() {
            0 => Resolution::Unresolved(UnresolvedReason::NotFound),
            1 if !computed => Resolution::Resolved(candidates[0]),
            _ => Resolution::Ambiguous(candidates),
        }
    }
}
