//! Per-file symbol extraction and the cross-file symbol table.

pub mod extractor;
pub mod scope;
pub mod table;

pub use extractor::{extract_file, module_path, FileExtract, RawReference, RefTarget};
pub use scope::{Binding, Scope, ScopeId, ScopeKind, ScopeTree};
pub use table::SymbolTable;
