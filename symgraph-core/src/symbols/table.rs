//! Immutable, cross-file view over all extracts of a pass.
//!
//! Built once after the extraction barrier and shared read-only by the
//! per-file usage resolvers.

use crate::model::{Import, ImportId, Symbol, SymbolId, SymbolKind};
use crate::symbols::extractor::FileExtract;
use crate::symbols::scope::{Binding, Scope};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// How an import symbol was bound.
#[derive(Debug, Clone)]
pub struct ImportBinding {
    pub import: ImportId,
    pub member: Option<String>,
}

pub struct SymbolTable<'a> {
    extracts: &'a BTreeMap<String, Arc<FileExtract>>,
    imports: &'a HashMap<ImportId, Import>,
    symbols: HashMap<SymbolId, &'a Symbol>,
    import_bindings: HashMap<SymbolId, ImportBinding>,
    /// Functions and methods by simple name.
    callables: HashMap<&'a str, Vec<SymbolId>>,
    /// File → files it imports (targets and submodules).
    forward: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> SymbolTable<'a> {
    pub fn new(
        extracts: &'a BTreeMap<String, Arc<FileExtract>>,
        imports: &'a HashMap<ImportId, Import>,
    ) -> Self {
        let mut symbols = HashMap::new();
        let mut import_bindings = HashMap::new();
        let mut callables: HashMap<&str, Vec<SymbolId>> = HashMap::new();

        for extract in extracts.values() {
            for symbol in &extract.symbols {
                symbols.insert(symbol.id, symbol);
                if symbol.kind.is_callable() {
                    callables.entry(symbol.name.as_str()).or_default().push(symbol.id);
                }
            }
            for scope in extract.scopes.iter() {
                for binding in scope.bindings.values().flatten() {
                    if let Binding::Import {
                        import,
                        symbol,
                        member,
                    } = binding
                    {
                        import_bindings.insert(
                            *symbol,
                            ImportBinding {
                                import: *import,
                                member: member.clone(),
                            },
                        );
                    }
                }
                for wildcard in &scope.wildcards {
                    import_bindings.insert(
                        wildcard.symbol,
                        ImportBinding {
                            import: wildcard.import,
                            member: None,
                        },
                    );
                }
            }
        }

        let mut forward: HashMap<&str, Vec<&str>> = HashMap::new();
        for import in imports.values() {
            let targets = import
                .resolved_path
                .iter()
                .chain(import.submodule_paths.iter());
            for target in targets {
                if target != &import.file_path && extracts.contains_key(target) {
                    forward
                        .entry(import.file_path.as_str())
                        .or_default()
                        .push(target.as_str());
                }
            }
        }
        for targets in forward.values_mut() {
            targets.sort_unstable();
            targets.dedup();
        }

        Self {
            extracts,
            imports,
            symbols,
            import_bindings,
            callables,
            forward,
        }
    }

    pub fn file(&self, path: &str) -> Option<&'a FileExtract> {
        self.extracts.get(path).map(|e| e.as_ref())
    }

    pub fn symbol(&self, id: SymbolId) -> Option<&'a Symbol> {
        self.symbols.get(&id).copied()
    }

    pub fn import(&self, id: ImportId) -> Option<&'a Import> {
        self.imports.get(&id)
    }

    pub fn import_binding(&self, symbol: SymbolId) -> Option<&ImportBinding> {
        self.import_bindings.get(&symbol)
    }

    /// Target file of an import, when it resolved in-repo.
    pub fn import_target(&self, id: ImportId) -> Option<&'a str> {
        self.import(id)?.resolved_path.as_deref()
    }

    pub fn module_scope(&self, path: &str) -> Option<&'a Scope> {
        self.file(path).map(|f| f.scopes.module())
    }

    /// Member scope of a class or interface.
    pub fn class_scope(&self, class: SymbolId) -> Option<&'a Scope> {
        let symbol = self.symbol(class)?;
        if !symbol.kind.is_type() {
            return None;
        }
        self.file(&symbol.file_path)?.scopes.class_scope(class)
    }

    pub fn callables_named(&self, name: &str) -> &[SymbolId] {
        self.callables.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// The file and everything it imports, transitively.
    pub fn import_closure(&self, path: &'a str) -> HashSet<&'a str> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(path);
        queue.push_back(path);
        while let Some(file) = queue.pop_front() {
            for next in self.forward.get(file).into_iter().flatten() {
                if seen.insert(*next) {
                    queue.push_back(*next);
                }
            }
        }
        seen
    }

    pub fn is_type(&self, id: SymbolId) -> bool {
        self.symbol(id).is_some_and(|s| s.kind.is_type())
    }

    pub fn is_import(&self, id: SymbolId) -> bool {
        self.symbol(id).is_some_and(|s| s.kind == SymbolKind::Import)
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstNode, FileAst};
    use crate::model::FileMeta;
    use crate::symbols::extractor::extract_file;

    fn extracts() -> BTreeMap<String, Arc<FileExtract>> {
        let a = FileAst::new(
            5,
            vec![
                AstNode::import_names("./b", &["run"], 1),
                AstNode::function("main", 2, 4),
            ],
        );
        let b = FileAst::new(3, vec![AstNode::function("run", 1, 2)]);
        let mut map = BTreeMap::new();
        map.insert("a.ts".to_string(), Arc::new(extract_file(&FileMeta::new("a.ts", "1"), Ok(&a))));
        map.insert("b.ts".to_string(), Arc::new(extract_file(&FileMeta::new("b.ts", "2"), Ok(&b))));
        map
    }

    #[test]
    fn test_closure_and_callables() {
        let extracts = extracts();
        let mut import = extracts["a.ts"].imports[0].clone();
        import.resolved_path = Some("b.ts".to_string());
        let mut imports = HashMap::new();
        imports.insert(import.id, import);

        let table = SymbolTable::new(&extracts, &imports);
        let closure = table.import_closure("a.ts");
        assert!(closure.contains("a.ts") && closure.contains("b.ts"));
        assert_eq!(table.import_closure("b.ts").len(), 1);

        assert_eq!(table.callables_named("run").len(), 1);
        assert_eq!(table.callables_named("nothing").len(), 0);

        let import_symbol = extracts["a.ts"].symbols[0].id;
        assert!(table.is_import(import_symbol));
        let binding = table.import_binding(import_symbol).unwrap();
        assert_eq!(binding.member.as_deref(), Some("run"));
    }
}
