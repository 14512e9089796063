//! Fallback conventions for Go, Java and unknown languages.

use super::{decorator_name, last_segment, EntryPointClassifier, EntryReason};
use crate::model::{Symbol, SymbolKind};

const FRAMEWORK_ANNOTATIONS: &[&str] = &[
    "Test", "ParameterizedTest", "BeforeEach", "AfterEach", "BeforeAll", "AfterAll", "Bean",
    "Controller", "RestController", "Service", "Component", "Repository", "Configuration",
    "SpringBootApplication", "RequestMapping", "GetMapping", "PostMapping", "PutMapping",
    "DeleteMapping", "PatchMapping", "EventListener", "Scheduled", "PostConstruct",
    "PreDestroy",
];

const IMPLICIT_MEMBERS: &[&str] = &[
    "<init>", "constructor", "__init__", "init", "toString", "equals", "hashCode",
    "compareTo", "close", "run", "call", "String", "Error",
];

const BUILTINS: &[&str] = &[
    // Go
    "len", "cap", "make", "new", "append", "copy", "delete", "panic", "recover", "print",
    "println", "close", "nil", "true", "false", "iota", "string", "int", "int64", "error",
    "byte", "rune", "float64", "bool", "any",
    // Java
    "System", "String", "Integer", "Long", "Double", "Boolean", "Math", "Object", "List",
    "Map", "Set", "ArrayList", "HashMap", "HashSet", "Arrays", "Collections", "Optional",
    "Exception", "RuntimeException", "IllegalArgumentException", "IllegalStateException",
    "this", "super", "null",
];

pub struct GenericClassifier;

impl EntryPointClassifier for GenericClassifier {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn entry_reason(&self, symbol: &Symbol, _parent: Option<&Symbol>) -> Option<EntryReason> {
        if symbol.is_exported() {
            return Some(EntryReason::Exported);
        }
        if symbol.kind.is_callable() && matches!(symbol.name.as_str(), "main" | "init") {
            return Some(EntryReason::Main);
        }
        if symbol.kind == SymbolKind::Function
            && ["Test", "Benchmark", "Example", "Fuzz"]
                .iter()
                .any(|p| symbol.name.starts_with(p))
        {
            return Some(EntryReason::Test);
        }
        if symbol
            .decorators
            .iter()
            .any(|d| FRAMEWORK_ANNOTATIONS.contains(&last_segment(decorator_name(d))))
        {
            return Some(EntryReason::Decorator);
        }
        None
    }

    fn is_implicit_member(&self, class: &Symbol, member: &Symbol) -> bool {
        member.name == class.name
            || IMPLICIT_MEMBERS.contains(&member.name.as_str())
            || member
                .decorators
                .iter()
                .any(|d| decorator_name(d) == "Override")
    }

    fn is_builtin(&self, name: &str) -> bool {
        BUILTINS.contains(&name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::test_support::symbol;

    #[test]
    fn test_go_and_java_conventions() {
        let c = GenericClassifier;
        assert_eq!(
            c.entry_reason(&symbol("TestParse", SymbolKind::Function), None),
            Some(EntryReason::Test)
        );
        assert_eq!(
            c.entry_reason(&symbol("main", SymbolKind::Method), None),
            Some(EntryReason::Main)
        );
        let mut bean = symbol("dataSource", SymbolKind::Method);
        bean.decorators.push("@Bean".to_string());
        assert_eq!(c.entry_reason(&bean, None), Some(EntryReason::Decorator));

        let class = symbol("Parser", SymbolKind::Class);
        assert!(c.is_implicit_member(&class, &symbol("Parser", SymbolKind::Method)));
        let mut over = symbol("apply", SymbolKind::Method);
        over.decorators.push("@Override".to_string());
        assert!(c.is_implicit_member(&class, &over));
        assert!(c.is_builtin("append"));
    }
}
