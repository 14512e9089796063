//! Extraction cache keyed by file path and SHA-256 content hash.
//!
//! Performance characteristics:
//! - O(1) lookups; a hit skips symbol extraction for the file
//! - Entries are `Arc`-shared with snapshots, so caching costs no copies
//!
//! Extraction depends only on the file's AST, so an entry stays valid for as
//! long as the content hash matches. Results computed before a cancelled
//! pass are inserted too and picked up by the next pass.
//!
//! # Cache Versioning
//!
//! The on-disk cache carries version metadata and is discarded when:
//! - the cache format changes
//! - the major version of symgraph changes

use crate::symbols::extractor::FileExtract;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum cache file size (200MB).
const MAX_CACHE_SIZE_BYTES: usize = 200_000_000;

/// Current cache format version. Increment when `FileExtract` changes shape.
const CACHE_VERSION: u32 = 1;

const SYMGRAPH_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Directory holding symgraph state inside an analyzed repository.
pub const STATE_DIR: &str = ".symgraph";

const CACHE_FILE: &str = "cache.json";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheMetadata {
    pub cache_version: u32,
    pub symgraph_version: String,
    pub created_at: DateTime<Utc>,
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self::current()
    }
}

impl CacheMetadata {
    pub fn current() -> Self {
        Self {
            cache_version: CACHE_VERSION,
            symgraph_version: SYMGRAPH_VERSION.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn is_compatible(&self) -> bool {
        if self.cache_version != CACHE_VERSION {
            return false;
        }
        let current_major = SYMGRAPH_VERSION.split('.').next().unwrap_or("0");
        let cached_major = self.symgraph_version.split('.').next().unwrap_or("0");
        current_major == cached_major
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CachedExtract {
    pub hash: String,
    pub extract: Arc<FileExtract>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ExtractionCache {
    #[serde(default)]
    pub metadata: CacheMetadata,
    entries: HashMap<String, CachedExtract>,
}

impl ExtractionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached extract for `path` if its content hash is unchanged.
    pub fn get(&self, path: &str, hash: &str) -> Option<Arc<FileExtract>> {
        self.entries
            .get(path)
            .filter(|cached| cached.hash == hash)
            .map(|cached| Arc::clone(&cached.extract))
    }

    pub fn insert(&mut self, path: impl Into<String>, hash: impl Into<String>, extract: Arc<FileExtract>) {
        self.entries.insert(
            path.into(),
            CachedExtract {
                hash: hash.into(),
                extract,
            },
        );
    }

    pub fn remove(&mut self, path: &str) {
        self.entries.remove(path);
    }

    /// Drops entries for files no longer present.
    pub fn retain_paths(&mut self, live: &BTreeSet<String>) {
        self.entries.retain(|path, _| live.contains(path));
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// SHA-256 of in-memory content as lowercase hex.
#[inline]
pub fn content_hash(bytes: &[u8]) -> String {
    let mut sha = Sha256::new();
    sha.update(bytes);
    format!("{:x}", sha.finalize())
}

/// SHA-256 of a file's content.
pub fn file_hash(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read {} for hashing", path.display()))?;
    Ok(content_hash(&bytes))
}

/// Loads `.symgraph/cache.json`.
///
/// Returns `None` when the file is missing, corrupted or written by an
/// incompatible version (the stale file is removed).
pub fn load_cache(root: &Path) -> Option<ExtractionCache> {
    let path = root.join(STATE_DIR).join(CACHE_FILE);
    if !path.exists() {
        return None;
    }

    let text = fs::read_to_string(&path).ok()?;
    let cache: ExtractionCache = match serde_json::from_str(&text) {
        Ok(cache) => cache,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupted extraction cache ignored");
            return None;
        }
    };

    if !cache.metadata.is_compatible() {
        tracing::info!(
            cached_version = cache.metadata.cache_version,
            cached_symgraph = %cache.metadata.symgraph_version,
            current_version = CACHE_VERSION,
            "extraction cache version mismatch, rebuilding"
        );
        let _ = fs::remove_file(&path);
        return None;
    }

    Some(cache)
}

/// Saves the cache with an atomic temp-file + rename write.
///
/// A cache larger than the size limit is dropped instead of written.
pub fn save_cache(root: &Path, cache: &ExtractionCache) -> Result<()> {
    let dir = root.join(STATE_DIR);
    if !dir.exists() {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let path = dir.join(CACHE_FILE);
    let json = serde_json::to_string(cache)?;

    if json.len() > MAX_CACHE_SIZE_BYTES {
        tracing::warn!(
            size = json.len(),
            limit = MAX_CACHE_SIZE_BYTES,
            "extraction cache exceeds size limit, clearing"
        );
        let _ = fs::remove_file(&path);
        return Ok(());
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_path = dir.join(format!("{}.{}.{}.tmp", CACHE_FILE, std::process::id(), nanos));

    fs::write(&temp_path, &json)
        .with_context(|| format!("Failed to write temp cache file: {}", temp_path.display()))?;

    fs::rename(&temp_path, &path).with_context(|| {
        let _ = fs::remove_file(&temp_path);
        format!("Failed to rename cache file to: {}", path.display())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AstNode, FileAst};
    use crate::model::FileMeta;
    use crate::symbols::extractor::extract_file;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir(name: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("symgraph_cache_test")
            .join(format!("{}_{}_{}", name, std::process::id(), n));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn extract(path: &str, hash: &str) -> Arc<FileExtract> {
        let ast = FileAst::new(2, vec![AstNode::function("f", 1, 2)]);
        Arc::new(extract_file(&FileMeta::new(path, hash), Ok(&ast)))
    }

    #[test]
    fn test_content_hash() {
        let a = content_hash(b"def f(): pass");
        assert_eq!(a, content_hash(b"def f(): pass"));
        assert_ne!(a, content_hash(b"def g(): pass"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_file_hash_matches_content_hash() {
        let dir = temp_dir("file_hash");
        let file = dir.join("a.py");
        fs::write(&file, "x = 1").unwrap();
        assert_eq!(file_hash(&file).unwrap(), content_hash(b"x = 1"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_hit_requires_matching_hash() {
        let mut cache = ExtractionCache::new();
        cache.insert("a.py", "h1", extract("a.py", "h1"));
        assert!(cache.get("a.py", "h1").is_some());
        assert!(cache.get("a.py", "h2").is_none());
        assert!(cache.get("b.py", "h1").is_none());

        let live: BTreeSet<String> = BTreeSet::new();
        cache.retain_paths(&live);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = temp_dir("save_load");
        let mut cache = ExtractionCache::new();
        cache.insert("a.py", "h1", extract("a.py", "h1"));
        save_cache(&dir, &cache).unwrap();

        let loaded = load_cache(&dir).unwrap();
        assert_eq!(loaded.len(), 1);
        let hit = loaded.get("a.py", "h1").unwrap();
        assert_eq!(hit.symbols.len(), 1);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_incompatible_cache_discarded() {
        let dir = temp_dir("incompatible");
        let mut cache = ExtractionCache::new();
        cache.metadata.cache_version = CACHE_VERSION + 1;
        save_cache(&dir, &cache).unwrap();
        assert!(load_cache(&dir).is_none());
        assert!(!dir.join(STATE_DIR).join(CACHE_FILE).exists());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_and_corrupted_cache() {
        let dir = temp_dir("corrupted");
        assert!(load_cache(&dir).is_none());
        fs::create_dir_all(dir.join(STATE_DIR)).unwrap();
        fs::write(dir.join(STATE_DIR).join(CACHE_FILE), "{not json").unwrap();
        assert!(load_cache(&dir).is_none());
        fs::remove_dir_all(&dir).ok();
    }
}
