//! Import resolution: raw import path → in-repo file, external package, or
//! unresolved.
//!
//! Resolution order:
//! 1. Relative imports against the importing file's directory (Python
//!    leading dots, `./` and `../`, Rust `crate::`/`self::`/`super::`).
//! 2. Absolute imports against each configured source root in priority
//!    order, then again with a matching `internal_prefixes` entry stripped.
//! 3. Anything left is external when it does not look internal, and
//!    unresolved when it does.
//!
//! Pure string work over the set of live paths, so it is cheap enough to
//! re-run for every file when the file set changes.

use crate::config::SymgraphConfig;
use crate::model::{FileId, Import, ImportStatus, Language};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Outcome for one import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportResolution {
    pub status: ImportStatus,
    pub target: Option<String>,
    /// Files reached through imported names that are modules themselves.
    pub submodules: Vec<String>,
    pub package_name: Option<String>,
}

impl ImportResolution {
    fn external(package: String) -> Self {
        Self {
            status: ImportStatus::External,
            target: None,
            submodules: Vec::new(),
            package_name: Some(package),
        }
    }

    fn unresolved() -> Self {
        Self {
            status: ImportStatus::Unresolved,
            target: None,
            submodules: Vec::new(),
            package_name: None,
        }
    }

    /// Copies the outcome onto an extracted import.
    pub fn apply_to(&self, import: &Import) -> Import {
        let mut resolved = import.clone();
        resolved.status = self.status;
        resolved.resolved_target = self.target.as_deref().map(FileId::for_path);
        resolved.resolved_path = self.target.clone();
        resolved.submodule_paths = self.submodules.clone();
        resolved.is_external = self.status == ImportStatus::External;
        resolved.package_name = self.package_name.clone();
        resolved.stale = false;
        resolved.tombstoned = false;
        resolved
    }
}

/// Normalizes `a/./b/../c` to `a/c`. `None` when the path escapes the root.
pub fn normalize_path(path: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            p => parts.push(p),
        }
    }
    Some(parts.join("/"))
}

fn join(dir: &str, rel: &str) -> Option<String> {
    if dir.is_empty() {
        normalize_path(rel)
    } else {
        normalize_path(&format!("{}/{}", dir, rel))
    }
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn strip_ext(path: &str) -> &str {
    match path.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => path,
    }
}

/// Resolves imports against a fixed set of live file paths.
pub struct ImportResolver<'a> {
    known: &'a BTreeSet<String>,
    roots: Vec<String>,
    internal_prefixes: &'a [String],
    /// First path segment (directory or module stem) under any root.
    top_level: HashSet<String>,
    /// Module names that resolved in-repo in an earlier pass.
    remembered: HashSet<String>,
    /// Directory → files directly inside it, for package-level imports.
    dirs: BTreeMap<String, Vec<String>>,
}

impl<'a> ImportResolver<'a> {
    pub fn new(known: &'a BTreeSet<String>, config: &'a SymgraphConfig) -> Self {
        let roots: Vec<String> = config
            .source_roots
            .iter()
            .map(|r| r.trim_matches('/').to_string())
            .collect();

        let mut top_level = HashSet::new();
        let mut dirs: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for path in known {
            dirs.entry(parent_dir(path).to_string())
                .or_default()
                .push(path.clone());
            for root in &roots {
                let rest = if root.is_empty() {
                    path.as_str()
                } else {
                    match path.strip_prefix(root.as_str()).and_then(|r| r.strip_prefix('/')) {
                        Some(rest) => rest,
                        None => continue,
                    }
                };
                match rest.split_once('/') {
                    Some((dir, _)) => top_level.insert(dir.to_string()),
                    None => top_level.insert(strip_ext(rest).to_string()),
                };
            }
        }

        Self {
            known,
            roots,
            internal_prefixes: &config.internal_prefixes,
            top_level,
            remembered: HashSet::new(),
            dirs,
        }
    }

    /// Keeps treating `modules` as in-repo names after their files are gone.
    pub fn remembering<I>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        self.remembered.extend(modules);
        self
    }

    fn exists(&self, path: &str) -> bool {
        self.known.contains(path)
    }

    fn first_existing(&self, candidates: Vec<String>) -> Option<String> {
        candidates.into_iter().find(|c| self.exists(c))
    }

    /// Candidate file paths for a module base path.
    fn candidates(&self, language: Language, base: &str) -> Vec<String> {
        let prefixed = |name: &str| {
            if base.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", base, name)
            }
        };
        match language {
            Language::Python => {
                let mut out = Vec::new();
                if !base.is_empty() {
                    out.push(format!("{}.py", base));
                    out.push(format!("{}.pyi", base));
                }
                out.push(prefixed("__init__.py"));
                out.push(prefixed("__init__.pyi"));
                out
            }
            Language::JavaScript | Language::TypeScript => {
                let exts = language.extensions();
                let mut out = vec![base.to_string()];
                out.extend(exts.iter().map(|e| format!("{}.{}", base, e)));
                out.extend(exts.iter().map(|e| prefixed(&format!("index.{}", e))));
                out
            }
            Language::Rust => vec![format!("{}.rs", base), prefixed("mod.rs")],
            Language::Java => vec![format!("{}.java", base)],
            Language::Go => vec![format!("{}.go", base)],
            Language::Other => vec![base.to_string()],
        }
    }

    /// Files of a directory, for Go packages and Java wildcard imports.
    fn package_file(&self, language: Language, dir: &str) -> Option<String> {
        let ext = language.extensions().first()?;
        self.dirs
            .get(dir)?
            .iter()
            .find(|p| p.ends_with(&format!(".{}", ext)))
            .cloned()
    }

    fn separator(language: Language) -> &'static str {
        match language {
            Language::Python | Language::Java => ".",
            Language::Rust => "::",
            _ => "/",
        }
    }

    fn first_segment(language: Language, raw: &str) -> &str {
        let trimmed = raw.trim_start_matches(['.', '/', '@']);
        trimmed
            .split(Self::separator(language))
            .next()
            .unwrap_or(trimmed)
    }

    fn matching_prefix(&self, raw: &str) -> Option<&str> {
        self.internal_prefixes
            .iter()
            .map(|p| p.as_str())
            .filter(|p| !p.is_empty() && raw.starts_with(p))
            .max_by_key(|p| p.len())
    }

    /// Relative imports, first segments naming a top-level or remembered
    /// module, and configured prefixes all look internal.
    pub fn is_internal_looking(&self, import: &Import, language: Language) -> bool {
        let first = Self::first_segment(language, &import.raw_path);
        import.is_relative
            || self.top_level.contains(first)
            || self.remembered.contains(first)
            || self.matching_prefix(&import.raw_path).is_some()
    }

    /// Module name an absolute, non-external import contributes to
    /// [`CodeGraph::internal_modules`](crate::snapshot::CodeGraph).
    pub fn internal_module(import: &Import, language: Language) -> Option<String> {
        if import.is_relative || import.status == ImportStatus::External {
            return None;
        }
        let first = Self::first_segment(language, &import.raw_path);
        (!first.is_empty()).then(|| first.to_string())
    }

    pub fn package_name(language: Language, raw: &str) -> String {
        match language {
            Language::JavaScript | Language::TypeScript => {
                let mut parts = raw.split('/');
                let first = parts.next().unwrap_or(raw);
                match (first.starts_with('@'), parts.next()) {
                    (true, Some(second)) => format!("{}/{}", first, second),
                    _ => first.to_string(),
                }
            }
            Language::Java => raw
                .trim_end_matches(".*")
                .rsplit_once('.')
                .map(|(pkg, _)| pkg.to_string())
                .unwrap_or_else(|| raw.to_string()),
            Language::Go => raw.to_string(),
            Language::Rust => raw.split("::").next().unwrap_or(raw).to_string(),
            Language::Python => raw.split('.').next().unwrap_or(raw).to_string(),
            Language::Other => raw
                .split(['/', '.'])
                .next()
                .unwrap_or(raw)
                .to_string(),
        }
    }

    pub fn resolve(&self, import: &Import, language: Language) -> ImportResolution {
        let (target, submodules) = match language {
            Language::Python => self.resolve_python(import),
            Language::Rust => (self.resolve_rust(import), Vec::new()),
            _ => (self.resolve_path_like(import, language), Vec::new()),
        };

        if target.is_some() || !submodules.is_empty() {
            return ImportResolution {
                status: ImportStatus::Resolved,
                target: target.or_else(|| submodules.first().cloned()),
                submodules,
                package_name: None,
            };
        }
        if self.is_internal_looking(import, language) {
            ImportResolution::unresolved()
        } else {
            ImportResolution::external(Self::package_name(language, &import.raw_path))
        }
    }

    /// Module base paths an absolute import may denote, in priority order.
    fn absolute_bases(&self, module: &str) -> Vec<String> {
        let mut bases: Vec<String> = self.roots.iter().filter_map(|r| join(r, module)).collect();
        if let Some(prefix) = self.matching_prefix(module) {
            let rest = module[prefix.len()..].trim_start_matches(['/', '.']);
            bases.extend(self.roots.iter().filter_map(|r| join(r, rest)));
        }
        bases
    }

    fn resolve_python(&self, import: &Import) -> (Option<String>, Vec<String>) {
        let raw = import.raw_path.as_str();
        let dots = raw.len() - raw.trim_start_matches('.').len();
        let module = raw[dots..].replace('.', "/");

        let bases: Vec<String> = if dots > 0 {
            let mut dir = parent_dir(&import.file_path).to_string();
            let mut ok = true;
            for _ in 1..dots {
                if dir.is_empty() {
                    ok = false;
                    break;
                }
                dir = parent_dir(&dir).to_string();
            }
            if !ok {
                return (None, Vec::new());
            }
            join(&dir, &module).into_iter().collect()
        } else {
            self.absolute_bases(&module)
        };

        for base in &bases {
            let target = self.first_existing(self.candidates(Language::Python, base));
            let submodules: Vec<String> = import
                .names
                .iter()
                .filter_map(|name| {
                    let sub = if base.is_empty() {
                        name.clone()
                    } else {
                        format!("{}/{}", base, name)
                    };
                    self.first_existing(self.candidates(Language::Python, &sub))
                })
                .collect();
            if target.is_some() || !submodules.is_empty() {
                return (target, submodules);
            }
        }
        (None, Vec::new())
    }

    /// Directory holding the crate root (`lib.rs` / `main.rs`) of a file.
    fn rust_crate_dir(&self, file_path: &str) -> String {
        let mut dir = parent_dir(file_path);
        loop {
            let lib = join(dir, "lib.rs").unwrap_or_default();
            let main = join(dir, "main.rs").unwrap_or_default();
            if self.exists(&lib) || self.exists(&main) {
                return dir.to_string();
            }
            if dir.is_empty() {
                break;
            }
            dir = parent_dir(dir);
        }
        self.roots
            .iter()
            .find(|r| !r.is_empty() && file_path.starts_with(&format!("{}/", r)))
            .cloned()
            .unwrap_or_else(|| parent_dir(file_path).to_string())
    }

    /// Directory where child modules of a Rust file live.
    fn rust_module_dir(file_path: &str) -> String {
        let name = file_path.rsplit('/').next().unwrap_or(file_path);
        if matches!(name, "mod.rs" | "lib.rs" | "main.rs") {
            parent_dir(file_path).to_string()
        } else {
            strip_ext(file_path).to_string()
        }
    }

    /// Module file owning a directory (`d.rs`, `d/mod.rs`, `d/lib.rs`).
    fn rust_dir_module(&self, dir: &str) -> Option<String> {
        let mut candidates = vec![
            join(dir, "mod.rs").unwrap_or_default(),
            join(dir, "lib.rs").unwrap_or_default(),
            join(dir, "main.rs").unwrap_or_default(),
        ];
        if !dir.is_empty() {
            candidates.push(format!("{}.rs", dir));
        }
        self.first_existing(candidates)
    }

    fn resolve_rust(&self, import: &Import) -> Option<String> {
        let raw = import.raw_path.trim_end_matches("::*");
        let mut segments: Vec<&str> = raw.split("::").filter(|s| !s.is_empty()).collect();

        let dir = match segments.first().copied() {
            Some("crate") => {
                segments.remove(0);
                self.rust_crate_dir(&import.file_path)
            }
            Some("self") => {
                segments.remove(0);
                Self::rust_module_dir(&import.file_path)
            }
            Some("super") => {
                let mut dir = Self::rust_module_dir(&import.file_path);
                while segments.first() == Some(&"super") {
                    segments.remove(0);
                    dir = parent_dir(&dir).to_string();
                }
                dir
            }
            Some(first) if self.top_level.contains(first) => {
                self.rust_crate_dir(&import.file_path)
            }
            _ => return None,
        };

        // Longest module prefix wins; trailing segments name items inside it
        for k in (1..=segments.len()).rev() {
            let Some(base) = join(&dir, &segments[..k].join("/")) else {
                continue;
            };
            if let Some(found) = self.first_existing(self.candidates(Language::Rust, &base)) {
                return Some(found);
            }
        }
        self.rust_dir_module(&dir)
            .filter(|found| found != &import.file_path)
    }

    /// JavaScript/TypeScript, Go, Java and anything else written as a path.
    fn resolve_path_like(&self, import: &Import, language: Language) -> Option<String> {
        let raw = import.raw_path.as_str();
        let module = match language {
            Language::Java | Language::Other if !raw.contains('/') => {
                raw.trim_end_matches(".*").replace('.', "/")
            }
            _ => raw.to_string(),
        };

        let bases: Vec<String> = if import.is_relative {
            join(parent_dir(&import.file_path), &module)
                .into_iter()
                .collect()
        } else {
            self.absolute_bases(&module)
        };

        for base in &bases {
            if let Some(found) = self.first_existing(self.candidates(language, base)) {
                return Some(found);
            }
            if matches!(language, Language::Go | Language::Java) {
                if let Some(found) = self.package_file(language, base) {
                    return Some(found);
                }
            }
        }

        // Java static imports name a member of the class file
        if language == Language::Java {
            if let Some((class, _member)) = module.rsplit_once('/') {
                for base in self.absolute_bases(class) {
                    if let Some(found) = self.first_existing(self.candidates(language, &base)) {
                        return Some(found);
                    }
                }
            }
        }
        None
    }
}
