//! Configuration loading from symgraph.toml.
//!
//! Every field is optional; a missing file or a missing section falls back
//! to [`SymgraphConfig::default`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Name of the configuration file looked up in the repository root.
pub const CONFIG_FILE_NAME: &str = "symgraph.toml";

/// Main configuration structure for symgraph.toml.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SymgraphConfig {
    /// Roots for absolute imports, in priority order (first match wins).
    /// The empty string means the repository root.
    pub source_roots: Vec<String>,
    /// Absolute import prefixes that are always considered in-repo.
    pub internal_prefixes: Vec<String>,
    /// Patterns (name, qualified name or path) excluded from dead-code reports.
    pub ignore: Vec<String>,
    pub thresholds: ThresholdConfig,
    pub entry_points: EntryPointConfig,
    pub limits: LimitConfig,
    pub output: OutputConfig,
}

impl Default for SymgraphConfig {
    fn default() -> Self {
        Self {
            source_roots: vec![String::new(), "src".to_string()],
            internal_prefixes: Vec::new(),
            ignore: Vec::new(),
            thresholds: ThresholdConfig::default(),
            entry_points: EntryPointConfig::default(),
            limits: LimitConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Coupling and cycle thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Distinct importers at or above which a file is `high_fan_in`.
    pub high_fan_in: usize,
    /// Distinct imported files at or above which a file is `high_fan_out`.
    pub high_fan_out: usize,
    /// Longest cycle searched for inside one strongly connected component.
    pub max_cycle_length: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            high_fan_in: 10,
            high_fan_out: 10,
            max_cycle_length: 32,
        }
    }
}

/// Extra entry point rules on top of the per-language classifiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EntryPointConfig {
    /// Symbol names or qualified names always treated as roots.
    pub names: Vec<String>,
    /// Regex patterns; a symbol with a matching decorator is a root.
    pub decorators: Vec<String>,
    /// Regex patterns matched against file paths to recognise test files.
    pub test_patterns: Vec<String>,
}

impl Default for EntryPointConfig {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            decorators: Vec::new(),
            test_patterns: vec![
                r"(^|/)tests?/".to_string(),
                r"(^|/)test_[^/]*$".to_string(),
                r"_test\.[a-z]+$".to_string(),
                r"\.(test|spec)\.[a-z]+$".to_string(),
                r"(^|/)__tests__/".to_string(),
            ],
        }
    }
}

/// Resource limits for the global algorithms.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitConfig {
    pub max_symbols: usize,
    pub max_edges: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_symbols: 5_000_000,
            max_edges: 20_000_000,
        }
    }
}

/// Output format configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format: "plain" or "json".
    pub format: Option<String>,
}

/// Loads configuration from symgraph.toml if it exists.
pub fn load_config(root: &Path) -> Result<Option<SymgraphConfig>> {
    let path = root.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(None);
    }

    let content =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let cfg = toml::from_str(&content).context("Invalid symgraph.toml")?;
    Ok(Some(cfg))
}

/// Loads symgraph.toml or falls back to defaults when absent.
pub fn load_config_or_default(root: &Path) -> Result<SymgraphConfig> {
    Ok(load_config(root)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir()
            .join("symgraph_config_test")
            .join(format!("{}_{}_{}", name, std::process::id(), id));
        if dir.exists() {
            fs::remove_dir_all(&dir).ok();
        }
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = temp_dir("missing");
        assert!(load_config(&dir).unwrap().is_none());
        assert_eq!(load_config_or_default(&dir).unwrap(), SymgraphConfig::default());
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let dir = temp_dir("partial");
        fs::write(
            dir.join(CONFIG_FILE_NAME),
            "source_roots = [\"lib\"]\nignore = [\"legacy_*\"]\n\n[thresholds]\nhigh_fan_out = 3\n",
        )
        .unwrap();

        let cfg = load_config(&dir).unwrap().unwrap();
        assert_eq!(cfg.source_roots, vec!["lib".to_string()]);
        assert_eq!(cfg.ignore, vec!["legacy_*".to_string()]);
        assert_eq!(cfg.thresholds.high_fan_out, 3);
        assert_eq!(cfg.thresholds.high_fan_in, 10);
        assert!(!cfg.entry_points.test_patterns.is_empty());
    }

    #[test]
    fn test_invalid_config_is_error() {
        let dir = temp_dir("invalid");
        fs::write(dir.join(CONFIG_FILE_NAME), "source_roots = 42").unwrap();
        assert!(load_config(&dir).is_err());
    }
}
