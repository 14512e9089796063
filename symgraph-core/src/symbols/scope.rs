//! Lexical scope tree of one file.
//!
//! Scopes live in a flat arena indexed by [`ScopeId`]; index 0 is always the
//! module scope. Each scope maps names to the bindings declared in it, in
//! declaration order.

use crate::model::{ImportId, SymbolId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub const MODULE: ScopeId = ScopeId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    Module,
    Function,
    Class,
}

/// What a name is bound to inside a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "binding", rename_all = "snake_case")]
pub enum Binding {
    /// A declared symbol of this file.
    Symbol { id: SymbolId },
    /// A function parameter. Never a symbol, never reported.
    Parameter,
    /// A name introduced by an import. `member` is `None` for whole-module
    /// imports, where the binding stands for the imported file itself.
    Import {
        import: ImportId,
        symbol: SymbolId,
        member: Option<String>,
    },
}

/// Wildcard import visible in a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildcardImport {
    pub import: ImportId,
    pub symbol: SymbolId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub id: ScopeId,
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    /// Function or class owning the scope. `None` for the module scope.
    pub owner: Option<SymbolId>,
    pub bindings: BTreeMap<String, Vec<Binding>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wildcards: Vec<WildcardImport>,
}

impl Scope {
    /// The binding that wins for `name`: the last one declared.
    pub fn lookup(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name).and_then(|all| all.last())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    /// Member scope of each class or interface symbol.
    class_scopes: BTreeMap<SymbolId, ScopeId>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                id: ScopeId::MODULE,
                parent: None,
                kind: ScopeKind::Module,
                owner: None,
                bindings: BTreeMap::new(),
                wildcards: Vec::new(),
            }],
            class_scopes: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, parent: ScopeId, kind: ScopeKind, owner: SymbolId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            id,
            parent: Some(parent),
            kind,
            owner: Some(owner),
            bindings: BTreeMap::new(),
            wildcards: Vec::new(),
        });
        if kind == ScopeKind::Class {
            self.class_scopes.insert(owner, id);
        }
        id
    }

    pub fn bind(&mut self, scope: ScopeId, name: &str, binding: Binding) {
        if let Some(s) = self.scopes.get_mut(scope.index()) {
            s.bindings.entry(name.to_string()).or_default().push(binding);
        }
    }

    pub fn add_wildcard(&mut self, scope: ScopeId, wildcard: WildcardImport) {
        if let Some(s) = self.scopes.get_mut(scope.index()) {
            s.wildcards.push(wildcard);
        }
    }

    pub fn get(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.index())
    }

    pub fn module(&self) -> &Scope {
        &self.scopes[0]
    }

    pub fn class_scope(&self, class: SymbolId) -> Option<&Scope> {
        self.class_scopes.get(&class).and_then(|id| self.get(*id))
    }

    /// Scopes from `start` outward to the module scope.
    pub fn chain(&self, start: ScopeId) -> ScopeChain<'_> {
        ScopeChain {
            tree: self,
            next: Some(start),
        }
    }

    /// Nearest enclosing class of `scope`, looking through function scopes.
    pub fn enclosing_class(&self, scope: ScopeId) -> Option<SymbolId> {
        self.chain(scope)
            .find(|s| s.kind == ScopeKind::Class)
            .and_then(|s| s.owner)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

pub struct ScopeChain<'a> {
    tree: &'a ScopeTree,
    next: Option<ScopeId>,
}

impl<'a> Iterator for ScopeChain<'a> {
    type Item = &'a Scope;

    fn next(&mut self) -> Option<Self::Item> {
        let scope = self.tree.get(self.next?)?;
        self.next = scope.parent;
        Some(scope)
    }
}
