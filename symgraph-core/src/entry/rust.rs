//! Rust conventions: `main`, `pub` items, `#[test]`/`#[bench]` functions,
//! `#[no_mangle]` FFI exports and trait implementation methods, which the
//! compiler calls on the program's behalf.

use super::{decorator_name, EntryPointClassifier, EntryReason};
use crate::model::{Symbol, SymbolKind};

const TRAIT_METHODS: &[&str] = &[
    "fmt", "drop", "clone", "clone_from", "eq", "ne", "partial_cmp", "cmp", "hash", "default",
    "from", "into", "try_from", "try_into", "from_str", "deref", "deref_mut", "next",
    "next_back", "size_hint", "poll", "as_ref", "as_mut", "borrow", "borrow_mut", "index",
    "index_mut", "add", "sub", "mul", "div", "neg", "not", "serialize", "deserialize",
    "into_iter", "extend", "from_iter", "source", "description",
];

const BUILTINS: &[&str] = &[
    "Some", "None", "Ok", "Err", "Box", "Vec", "String", "Option", "Result", "Default",
    "Clone", "Iterator", "Into", "From", "Self", "self", "std", "core", "alloc", "println",
    "print", "eprintln", "eprint", "format", "vec", "assert", "assert_eq", "assert_ne",
    "debug_assert", "panic", "write", "writeln", "matches", "todo", "unimplemented",
    "unreachable", "dbg", "include_str", "env", "concat", "stringify", "Arc", "Rc", "HashMap",
    "HashSet", "BTreeMap", "BTreeSet", "drop", "usize", "u8", "u32", "u64", "i32", "i64",
    "f32", "f64", "bool", "char", "str",
];

pub struct RustClassifier;

impl EntryPointClassifier for RustClassifier {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn entry_reason(&self, symbol: &Symbol, parent: Option<&Symbol>) -> Option<EntryReason> {
        if symbol.is_exported() {
            return Some(EntryReason::Exported);
        }
        if symbol.kind == SymbolKind::Function && parent.is_none() && symbol.name == "main" {
            return Some(EntryReason::Main);
        }
        for attr in &symbol.decorators {
            let name = decorator_name(attr);
            if matches!(name, "test" | "bench") || name.ends_with("::test") {
                return Some(EntryReason::Test);
            }
            if matches!(name, "no_mangle" | "export_name" | "proc_macro")
                || name.starts_with("proc_macro")
                || name.ends_with("::main")
            {
                return Some(EntryReason::Decorator);
            }
        }
        None
    }

    fn is_implicit_member(&self, _class: &Symbol, member: &Symbol) -> bool {
        TRAIT_METHODS.contains(&member.name.as_str())
    }

    fn is_builtin(&self, name: &str) -> bool {
        BUILTINS.contains(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::test_support::symbol;
    use crate::model::Visibility;

    #[test]
    fn test_entry_points() {
        let c = RustClassifier;
        assert_eq!(
            c.entry_reason(&symbol("main", SymbolKind::Function), None),
            Some(EntryReason::Main)
        );

        let mut public = symbol("api", SymbolKind::Function);
        public.visibility = Visibility::Public;
        assert_eq!(c.entry_reason(&public, None), Some(EntryReason::Exported));

        let mut test = symbol("it_works", SymbolKind::Function);
        test.decorators.push("#[tokio::test]".to_string());
        assert_eq!(c.entry_reason(&test, None), Some(EntryReason::Test));

        let mut ffi = symbol("ffi_entry", SymbolKind::Function);
        ffi.decorators.push("no_mangle".to_string());
        assert_eq!(c.entry_reason(&ffi, None), Some(EntryReason::Decorator));

        assert_eq!(c.entry_reason(&symbol("helper", SymbolKind::Function), None), None);
    }

    #[test]
    fn test_trait_methods_are_implicit() {
        let c = RustClassifier;
        let ty = symbol("Config", SymbolKind::Class);
        assert!(c.is_implicit_member(&ty, &symbol("fmt", SymbolKind::Method)));
        assert!(!c.is_implicit_member(&ty, &symbol("load", SymbolKind::Method)));
    }
}
