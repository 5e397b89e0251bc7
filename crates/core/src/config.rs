//! Runtime configuration: ignore patterns, supported extensions, ranking
//! weights, and the handful of recognized environment options.
//!
//! Loaded in three layers, lowest precedence first: built-in defaults, the
//! `<homeDir>/.context/.env` file, then the process environment.

use md5::{Digest, Md5};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::ranker::RankingConfig;

/// Directory name used for all persisted state (`.context/merkle/*.json`,
/// `.context/.env`), under the user's home directory.
const STATE_DIR: &str = ".context";

/// Default directory names skipped during a walk, regardless of user config.
fn default_skip_dirs() -> HashSet<String> {
    [".git", "node_modules", "__pycache__", "target", "dist", "build", ".next", "vendor"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Default file extensions considered for indexing.
fn default_extensions() -> HashSet<String> {
    [
        "rs", "go", "py", "js", "jsx", "ts", "tsx", "mjs", "cjs", "java", "kt", "rb", "c", "h",
        "cpp", "cc", "cxx", "hpp", "hh", "hxx", "cs", "php", "swift", "scala", "md",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Ignore-pattern and extension configuration for the Synchronizer and
/// Indexing Coordinator, plus the ranking weights handed to the Ranker.
#[derive(Clone, Debug)]
pub struct IndexConfig {
    /// Directory/file name literals, `*.ext` suffix globs, `dir/`-style
    /// directory patterns, and `a/b`-style path patterns. See
    /// [`crate::sync::matches_ignore`] for exact matching rules.
    pub ignore_patterns: HashSet<String>,
    pub extensions: HashSet<String>,
    pub ranking: RankingConfig,
    pub hybrid_mode: bool,
    pub embedding_batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: default_skip_dirs(),
            extensions: default_extensions(),
            ranking: RankingConfig::default(),
            hybrid_mode: false,
            embedding_batch_size: 32,
        }
    }
}

impl IndexConfig {
    /// Start from built-in defaults, then apply the `.context/.env` file, then
    /// the process environment (highest precedence).
    pub fn load() -> Self {
        let mut config = Self::default();
        if let Some(env_path) = env_file_path() {
            if let Ok(contents) = std::fs::read_to_string(&env_path) {
                apply_env_file(&mut config, &contents, false);
            }
        }
        apply_process_env(&mut config);
        config
    }

    pub fn add_ignore_pattern(&mut self, pattern: impl Into<String>) {
        self.ignore_patterns.insert(pattern.into());
    }

    pub fn add_extension(&mut self, ext: impl Into<String>) {
        self.extensions.insert(ext.into());
    }

    pub fn reset_ignore_patterns(&mut self) {
        self.ignore_patterns = default_skip_dirs();
    }

    pub fn reset_extensions(&mut self) {
        self.extensions = default_extensions();
    }
}

/// Apply `KEY=value` lines (`#`-comments and blank lines skipped) to `config`.
/// `override_existing` controls whether a key already set wins — used to give
/// process-env values precedence over the file without re-parsing twice.
fn apply_env_file(config: &mut IndexConfig, contents: &str, override_existing: bool) {
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else { continue };
        apply_one(config, key.trim(), value.trim(), override_existing);
    }
}

fn apply_process_env(config: &mut IndexConfig) {
    for key in ["HYBRID_MODE", "EMBEDDING_BATCH_SIZE"] {
        if let Ok(value) = std::env::var(key) {
            apply_one(config, key, &value, true);
        }
    }
}

fn apply_one(config: &mut IndexConfig, key: &str, value: &str, _override_existing: bool) {
    match key {
        "HYBRID_MODE" => config.hybrid_mode = matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        "EMBEDDING_BATCH_SIZE" => {
            if let Ok(n) = value.parse::<usize>() {
                config.embedding_batch_size = n;
            }
        }
        // Provider-specific API keys pass through untouched; collaborators read
        // them directly from the process environment when they construct
        // themselves, matching the external-collaborator boundary in the spec.
        _ => {}
    }
}

fn home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

pub fn state_dir() -> Option<PathBuf> {
    home_dir().map(|h| h.join(STATE_DIR))
}

pub fn env_file_path() -> Option<PathBuf> {
    state_dir().map(|d| d.join(".env"))
}

/// `<homeDir>/.context/merkle/<md5(absRoot)>.json`
pub fn snapshot_path(root: &Path) -> Option<PathBuf> {
    let abs = root.to_string_lossy();
    let mut hasher = Md5::new();
    hasher.update(abs.as_bytes());
    let digest = hex::encode(hasher.finalize());
    state_dir().map(|d| d.join("merkle").join(format!("{digest}.json")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_file_parses_hybrid_mode_and_batch_size() {
        let mut config = IndexConfig::default();
        apply_env_file(&mut config, "HYBRID_MODE=true\n# a comment\nEMBEDDING_BATCH_SIZE=64\n", false);
        assert!(config.hybrid_mode);
        assert_eq!(config.embedding_batch_size, 64);
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let mut config = IndexConfig::default();
        apply_env_file(&mut config, "\n#comment\n  \nEMBEDDING_BATCH_SIZE=8\n", false);
        assert_eq!(config.embedding_batch_size, 8);
    }

    #[test]
    fn snapshot_path_is_deterministic_per_root() {
        let a = snapshot_path(Path::new("/repo/one"));
        let b = snapshot_path(Path::new("/repo/one"));
        let c = snapshot_path(Path::new("/repo/two"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
