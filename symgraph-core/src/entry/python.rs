//! Python conventions: pytest and unittest, dunder protocol methods, web and
//! CLI framework decorators, framework base classes.

use super::{decorator_name, is_exported_member, last_segment, EntryPointClassifier, EntryReason};
use crate::model::{Symbol, SymbolKind};

const FRAMEWORK_DECORATOR_SUFFIXES: &[&str] = &[
    "route", "get", "post", "put", "patch", "delete", "websocket", "command", "group", "task",
    "fixture", "listener", "on_event", "middleware", "callback", "receiver", "shared_task",
    "validator", "field_validator", "errorhandler", "before_request", "after_request",
];

const FRAMEWORK_BASES: &[&str] = &[
    "TestCase", "IsolatedAsyncioTestCase", "BaseCommand", "AppConfig", "Migration", "Model",
    "ModelAdmin", "Serializer", "ModelSerializer", "View", "APIView", "ViewSet",
    "ModelViewSet", "Resource", "BaseModel", "Enum", "Protocol",
];

const IMPLICIT_MEMBERS: &[&str] = &[
    "setUp", "tearDown", "setUpClass", "tearDownClass", "asyncSetUp", "asyncTearDown", "Meta",
];

const BUILTINS: &[&str] = &[
    "abs", "all", "any", "ascii", "bin", "bool", "breakpoint", "bytearray", "bytes", "callable",
    "chr", "classmethod", "compile", "complex", "delattr", "dict", "dir", "divmod", "enumerate",
    "eval", "exec", "filter", "float", "format", "frozenset", "getattr", "globals", "hasattr",
    "hash", "help", "hex", "id", "input", "int", "isinstance", "issubclass", "iter", "len",
    "list", "locals", "map", "max", "memoryview", "min", "next", "object", "oct", "open", "ord",
    "pow", "print", "property", "range", "repr", "reversed", "round", "set", "setattr", "slice",
    "sorted", "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip",
    "__import__", "__name__", "__file__", "__doc__", "__all__", "True", "False", "None",
    "NotImplemented", "Ellipsis", "self", "cls", "Exception", "BaseException", "ValueError",
    "TypeError", "KeyError", "IndexError", "AttributeError", "RuntimeError", "StopIteration",
    "NotImplementedError", "OSError", "IOError", "ImportError", "AssertionError",
    "ZeroDivisionError", "FileNotFoundError", "PermissionError", "TimeoutError",
    "KeyboardInterrupt", "SystemExit", "Warning", "DeprecationWarning", "UserWarning",
];

pub struct PythonClassifier;

fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

impl EntryPointClassifier for PythonClassifier {
    fn name(&self) -> &'static str {
        "python"
    }

    fn entry_reason(&self, symbol: &Symbol, parent: Option<&Symbol>) -> Option<EntryReason> {
        if symbol.is_exported() || is_exported_member(symbol, parent) {
            return Some(EntryReason::Exported);
        }
        if symbol.kind == SymbolKind::Function && parent.is_none() && symbol.name == "main" {
            return Some(EntryReason::Main);
        }
        if symbol.kind.is_callable() && symbol.name.starts_with("test") {
            return Some(EntryReason::Test);
        }
        let framework_decorator = symbol.decorators.iter().any(|d| {
            let name = decorator_name(d);
            (name.contains('.') && FRAMEWORK_DECORATOR_SUFFIXES.contains(&last_segment(name)))
                || matches!(name, "fixture" | "shared_task" | "receiver" | "register")
        });
        if framework_decorator {
            return Some(EntryReason::Decorator);
        }
        if symbol.kind == SymbolKind::Class
            && symbol
                .bases()
                .iter()
                .any(|b| FRAMEWORK_BASES.contains(&last_segment(b)))
        {
            return Some(EntryReason::BaseClass);
        }
        None
    }

    fn is_implicit_member(&self, _class: &Symbol, member: &Symbol) -> bool {
        is_dunder(&member.name)
            || IMPLICIT_MEMBERS.contains(&member.name.as_str())
            || member.decorators.iter().any(|d| {
                let name = decorator_name(d);
                name == "property" || name.ends_with(".setter") || name.ends_with(".getter")
            })
    }

    fn is_builtin(&self, name: &str) -> bool {
        BUILTINS.contains(&name) || is_dunder(name)
    }
}
