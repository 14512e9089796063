//! Parallel, deterministic discovery and loading of `*.ast.json` dumps.
//!
//! Performance optimizations:
//! - Early directory pruning via `WalkDir::filter_entry` (O(1) subtree skip)
//! - Parallel file processing via Rayon's `par_bridge` / `par_iter`
//! - Results are sorted by path so passes are reproducible
//!
//! ## Dump layout
//!
//! The dump for `src/app.py` lives next to it as `src/app.py.ast.json`:
//!
//! ```json
//! { "path": "src/app.py", "language": "python", "line_count": 40,
//!   "content_hash": "…", "last_modified": "2024-05-01T10:00:00Z",
//!   "nodes": [ … ] }
//! ```
//!
//! Every field except `nodes` is optional. A missing `path` is derived from
//! the dump's location and a missing `content_hash` is the SHA-256 of the
//! dump itself.

use crate::ast::{AstNode, FileAst};
use crate::cache::{content_hash, STATE_DIR};
use crate::model::{FileMeta, Language};
use crate::parser::{ParserAdapter, SourceUnit};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File name suffix of AST dumps.
pub const AST_DUMP_SUFFIX: &str = ".ast.json";

/// Directories to exclude by default.
const EXCLUDED_DIRS: &[&str] = &["target", ".git", "node_modules", ".cargo", STATE_DIR];

#[inline]
fn is_excluded_dir(entry: &walkdir::DirEntry, excludes: &HashSet<&str>) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| excludes.contains(name))
}

#[inline]
fn is_ast_dump(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(AST_DUMP_SUFFIX))
}

/// Gathers all `*.ast.json` files below `root`, sorted.
///
/// Automatically excludes `target/`, `.git/`, `node_modules/`, `.cargo/`
/// and the `.symgraph/` state directory.
pub fn gather_ast_files(root: &Path) -> Result<Vec<PathBuf>> {
    gather_ast_files_with_excludes(root, &[])
}

/// Like [`gather_ast_files`] with extra directory names to prune.
pub fn gather_ast_files_with_excludes(root: &Path, excludes: &[&str]) -> Result<Vec<PathBuf>> {
    let all_excludes: HashSet<&str> = EXCLUDED_DIRS
        .iter()
        .copied()
        .chain(excludes.iter().copied())
        .collect();

    let mut files = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !is_excluded_dir(e, &all_excludes))
        .par_bridge()
        .filter_map(|entry| match entry {
            Ok(e) if is_ast_dump(e.path()) => Some(Ok(e.path().to_path_buf())),
            Ok(_) => None,
            Err(e) => Some(Err(e.into())),
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| format!("Failed to gather AST dumps from {}", root.display()))?;
    files.sort();
    Ok(files)
}

/// On-disk form of one parsed file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstDump {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default)]
    pub line_count: usize,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub nodes: Vec<AstNode>,
}

impl AstDump {
    fn into_ast(self) -> FileAst {
        FileAst {
            language: self.language,
            line_count: self.line_count,
            nodes: self.nodes,
        }
    }
}

/// Repository-relative source path a dump stands for, with `/` separators.
pub fn source_path_of(root: &Path, dump: &Path) -> String {
    let relative = dump.strip_prefix(root).unwrap_or(dump);
    let text = relative.to_string_lossy().replace('\\', "/");
    text.strip_suffix(AST_DUMP_SUFFIX)
        .map(String::from)
        .unwrap_or(text)
}

fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path).and_then(|m| m.modified()).ok().map(DateTime::<Utc>::from)
}

/// Loads one dump. Unreadable or malformed dumps become failed units so the
/// file is still known and carries a parse error.
pub fn load_ast_dump(root: &Path, dump_path: &Path) -> SourceUnit {
    let default_path = source_path_of(root, dump_path);
    let bytes = match fs::read(dump_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            let meta = FileMeta::new(default_path, String::new());
            return SourceUnit::failed(meta, format!("cannot read {}: {}", dump_path.display(), e));
        }
    };
    let hash = content_hash(&bytes);

    match serde_json::from_slice::<AstDump>(&bytes) {
        Ok(dump) => {
            let meta = FileMeta {
                path: dump.path.clone().unwrap_or(default_path),
                content_hash: dump.content_hash.clone().unwrap_or(hash),
                file_size: dump.file_size.unwrap_or(bytes.len() as u64),
                last_modified: dump.last_modified.or_else(|| modified_time(dump_path)),
            };
            SourceUnit::new(meta, dump.into_ast())
        }
        Err(e) => {
            let mut meta = FileMeta::new(default_path, hash);
            meta.file_size = bytes.len() as u64;
            meta.last_modified = modified_time(dump_path);
            SourceUnit::failed(meta, format!("malformed AST dump: {}", e))
        }
    }
}

/// Loads dumps in parallel, sorted by source path.
pub fn load_ast_dumps(root: &Path, files: &[PathBuf]) -> Vec<SourceUnit> {
    let mut units: Vec<SourceUnit> = files
        .par_iter()
        .map(|file| load_ast_dump(root, file))
        .collect();
    units.sort_by(|a, b| a.path().cmp(b.path()));
    units
}

/// Reads `<root>/<path>.ast.json` on demand.
#[derive(Debug, Clone)]
pub struct AstDumpParser {
    root: PathBuf,
}

impl AstDumpParser {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ParserAdapter for AstDumpParser {
    fn parse(&self, path: &str) -> Result<FileAst, String> {
        let dump_path = self.root.join(format!("{}{}", path, AST_DUMP_SUFFIX));
        let bytes = fs::read(&dump_path)
            .map_err(|e| format!("cannot read {}: {}", dump_path.display(), e))?;
        serde_json::from_slice::<AstDump>(&bytes)
            .map(AstDump::into_ast)
            .map_err(|e| format!("malformed AST dump: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir(name: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("symgraph_scan_test")
            .join(format!("{}_{}_{}", name, std::process::id(), n));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    const DUMP: &str = r#"{
        "line_count": 3,
        "nodes": [
            { "type": "function", "name": "run", "start_line": 1, "end_line": 3 }
        ]
    }"#;

    #[test]
    fn test_gather_prunes_excluded_dirs() {
        let dir = temp_dir("gather");
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::create_dir_all(dir.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(dir.join(".symgraph")).unwrap();
        fs::write(dir.join("src/app.py.ast.json"), DUMP).unwrap();
        fs::write(dir.join("src/app.py"), "def run(): pass").unwrap();
        fs::write(dir.join("node_modules/pkg/index.js.ast.json"), DUMP).unwrap();
        fs::write(dir.join(".symgraph/x.py.ast.json"), DUMP).unwrap();

        let files = gather_ast_files(&dir).unwrap();
        assert_eq!(files, vec![dir.join("src/app.py.ast.json")]);

        let files = gather_ast_files_with_excludes(&dir, &["src"]).unwrap();
        assert!(files.is_empty());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_dump_defaults() {
        let dir = temp_dir("load");
        fs::create_dir_all(dir.join("src")).unwrap();
        let dump = dir.join("src/app.py.ast.json");
        fs::write(&dump, DUMP).unwrap();

        let unit = load_ast_dump(&dir, &dump);
        assert_eq!(unit.path(), "src/app.py");
        assert_eq!(unit.meta.content_hash, content_hash(DUMP.as_bytes()));
        assert_eq!(unit.meta.file_size, DUMP.len() as u64);
        assert_eq!(unit.ast.as_ref().unwrap().nodes.len(), 1);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_explicit_fields_win() {
        let dir = temp_dir("explicit");
        let dump = dir.join("whatever.ast.json");
        fs::write(
            &dump,
            r#"{"path":"lib/util.ts","language":"typescript","content_hash":"abc","line_count":1,"nodes":[]}"#,
        )
        .unwrap();
        let unit = load_ast_dump(&dir, &dump);
        assert_eq!(unit.path(), "lib/util.ts");
        assert_eq!(unit.meta.content_hash, "abc");
        assert_eq!(unit.ast.unwrap().language, Some(Language::TypeScript));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_malformed_dump_is_failed_unit() {
        let dir = temp_dir("malformed");
        let good = dir.join("a.py.ast.json");
        let bad = dir.join("b.py.ast.json");
        fs::write(&good, DUMP).unwrap();
        fs::write(&bad, "{ not json").unwrap();

        let units = load_ast_dumps(&dir, &[bad, good]);
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].path(), "a.py");
        assert!(units[1].ast.is_err());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_dump_parser_reads_on_demand() {
        let dir = temp_dir("parser");
        fs::write(dir.join("a.py.ast.json"), DUMP).unwrap();
        let parser = AstDumpParser::new(&dir);
        assert_eq!(parser.parse("a.py").unwrap().line_count, 3);
        assert!(parser.parse("missing.py").is_err());
        fs::remove_dir_all(&dir).ok();
    }
}
