//! Cross-file resolution: imports first, then usages.

pub mod imports;
pub mod usage;

use crate::model::{Import, ImportStatus};
use crate::symbols::extractor::FileExtract;

pub use imports::{ImportResolution, ImportResolver};
pub use usage::{AmbiguousReference, FileResolution, Resolution, UnresolvedReason, UsageResolver};

/// Resolves every import of one file.
pub fn resolve_imports(resolver: &ImportResolver<'_>, extract: &FileExtract) -> Vec<Import> {
    let language = extract.language();
    extract
        .imports
        .iter()
        .map(|import| {
            let resolved = resolver.resolve(import, language).apply_to(import);
            if resolved.status == ImportStatus::Unresolved {
                tracing::debug!(
                    path = %extract.path(),
                    import = %import.raw_path,
                    line = import.line,
                    "unresolved import"
                );
            }
            resolved
        })
        .collect()
}
