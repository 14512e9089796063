//! JavaScript and TypeScript conventions: module exports, framework
//! decorators (Angular, NestJS, TypeORM) and class lifecycle hooks.

use super::{decorator_name, is_exported_member, last_segment, EntryPointClassifier, EntryReason};
use crate::model::Symbol;

const FRAMEWORK_DECORATORS: &[&str] = &[
    "Component", "Injectable", "Controller", "Module", "NgModule", "Directive", "Pipe", "Get",
    "Post", "Put", "Patch", "Delete", "Resolver", "Query", "Mutation", "Subscription", "Entity",
    "Input", "Output", "HostListener",
];

const LIFECYCLE: &[&str] = &[
    "constructor", "render", "componentDidMount", "componentDidUpdate", "componentWillUnmount",
    "shouldComponentUpdate", "getDerivedStateFromProps", "getSnapshotBeforeUpdate",
    "componentDidCatch", "ngOnInit", "ngOnDestroy", "ngOnChanges", "ngAfterViewInit",
    "ngAfterContentInit", "ngDoCheck", "connectedCallback", "disconnectedCallback",
    "attributeChangedCallback", "toString", "toJSON", "valueOf",
];

const BUILTINS: &[&str] = &[
    "console", "Math", "JSON", "Object", "Array", "String", "Number", "Boolean", "Promise",
    "Date", "Error", "TypeError", "RangeError", "RegExp", "Map", "Set", "WeakMap", "WeakSet",
    "Symbol", "BigInt", "Reflect", "Proxy", "Intl", "parseInt", "parseFloat", "isNaN",
    "isFinite", "setTimeout", "clearTimeout", "setInterval", "clearInterval", "require",
    "module", "exports", "process", "window", "document", "globalThis", "undefined", "NaN",
    "Infinity", "fetch", "Buffer", "__dirname", "__filename", "describe", "it", "test",
    "expect", "beforeEach", "afterEach", "beforeAll", "afterAll", "jest", "vi", "arguments",
    "encodeURIComponent", "decodeURIComponent", "structuredClone", "queueMicrotask", "this",
    "super", "null", "true", "false", "navigator", "localStorage", "URL", "URLSearchParams",
];

pub struct JavaScriptClassifier;

impl EntryPointClassifier for JavaScriptClassifier {
    fn name(&self) -> &'static str {
        "javascript"
    }

    fn entry_reason(&self, symbol: &Symbol, parent: Option<&Symbol>) -> Option<EntryReason> {
        if symbol.is_exported() || is_exported_member(symbol, parent) {
            return Some(EntryReason::Exported);
        }
        if symbol
            .decorators
            .iter()
            .any(|d| FRAMEWORK_DECORATORS.contains(&last_segment(decorator_name(d))))
        {
            return Some(EntryReason::Decorator);
        }
        None
    }

    fn is_implicit_member(&self, _class: &Symbol, member: &Symbol) -> bool {
        LIFECYCLE.contains(&member.name.as_str()) || member.name.starts_with("[Symbol.")
    }

    fn is_builtin(&self, name: &str) -> bool {
        BUILTINS.contains(&name)
    }
}
