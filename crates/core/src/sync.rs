//! Synchronizer — walks a repository root, hashes file contents, and diffs
//! against the previous snapshot to produce added/removed/modified sets.
//!
//! Owns the in-memory path→hash map and the hash DAG of the current snapshot
//! exclusively; nothing outside this module mutates either.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::snapshot_path;
use crate::error::{CoreError, Result};
use crate::hashdag::{DagSnapshot, HashDag};

/// Added/removed/modified relative paths, each sorted for deterministic output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedSnapshot {
    #[serde(rename = "fileHashes")]
    file_hashes: Vec<(String, String)>,
    #[serde(rename = "merkleDAG")]
    merkle_dag: DagSnapshot,
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// True if `name` begins with a dot — always skipped regardless of configured
/// ignore patterns.
fn is_dotfile(name: &str) -> bool {
    name.starts_with('.')
}

/// Matches a single path component or relative path against the configured
/// ignore patterns. Supports literal names, `*.ext` suffix globs, `dir/`
/// directory patterns, and `a/b`-style path patterns containing `/`.
pub fn matches_ignore(rel_path: &str, name: &str, is_dir: bool, patterns: &HashSet<String>) -> bool {
    for pattern in patterns {
        if pattern == name {
            return true;
        }
        if let Some(ext) = pattern.strip_prefix("*.") {
            if !is_dir {
                if let Some(file_ext) = name.rsplit('.').next() {
                    if file_ext == ext && name.contains('.') {
                        return true;
                    }
                }
            }
            continue;
        }
        if let Some(dirname) = pattern.strip_suffix('/') {
            if is_dir && name == dirname {
                return true;
            }
            continue;
        }
        if pattern.contains('/') && (rel_path == pattern || rel_path.starts_with(&format!("{pattern}/"))) {
            return true;
        }
    }
    false
}

fn walk_and_hash(root: &Path, patterns: &HashSet<String>) -> HashMap<String, String> {
    let mut files = Vec::new();
    walk_dir(root, root, patterns, &mut files);

    use rayon::prelude::*;
    files
        .par_iter()
        .filter_map(|(rel_path, abs_path)| std::fs::read(abs_path).ok().map(|bytes| (rel_path.clone(), hash_bytes(&bytes))))
        .collect()
}

fn walk_dir(dir: &Path, root: &Path, patterns: &HashSet<String>, out: &mut Vec<(String, PathBuf)>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_dotfile(&name) {
            continue;
        }

        let rel_path = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().replace('\\', "/");
        let is_dir = path.is_dir();

        if matches_ignore(&rel_path, &name, is_dir, patterns) {
            continue;
        }

        if is_dir {
            walk_dir(&path, root, patterns, out);
        } else {
            out.push((rel_path, path));
        }
    }
}

fn build_dag(root: &Path, hashes: &HashMap<String, String>) -> HashDag {
    let mut dag = HashDag::new();
    let mut paths: Vec<&String> = hashes.keys().collect();
    paths.sort();
    for rel in paths {
        if let Ok(bytes) = std::fs::read(root.join(rel)) {
            dag.add(bytes, None);
        }
    }
    dag
}

/// Owns the path→hash map and hash DAG for one repository root, diffing
/// successive walks and persisting the result to a per-root snapshot file.
pub struct Synchronizer {
    root: PathBuf,
    ignore_patterns: HashSet<String>,
    file_hashes: HashMap<String, String>,
    dag: HashDag,
}

impl Synchronizer {
    pub fn new(root: impl Into<PathBuf>, ignore_patterns: HashSet<String>) -> Self {
        Self { root: root.into(), ignore_patterns, file_hashes: HashMap::new(), dag: HashDag::new() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads the persisted snapshot if present; otherwise performs a full
    /// walk and writes a fresh snapshot.
    pub async fn initialize(&mut self) -> Result<()> {
        let Some(path) = snapshot_path(&self.root) else {
            return self.full_walk_and_persist().await;
        };

        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let persisted: PersistedSnapshot = serde_json::from_str(&contents)?;
                self.file_hashes = persisted.file_hashes.into_iter().collect();
                self.dag = HashDag::deserialize(persisted.merkle_dag);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.full_walk_and_persist().await,
            Err(e) => Err(CoreError::Io(e)),
        }
    }

    async fn full_walk_and_persist(&mut self) -> Result<()> {
        let root = self.root.clone();
        let patterns = self.ignore_patterns.clone();
        let hashes = tokio::task::spawn_blocking(move || walk_and_hash(&root, &patterns))
            .await
            .map_err(|e| CoreError::Watcher(e.to_string()))?;
        self.file_hashes = hashes;
        self.rebuild_dag_blocking().await;
        self.persist().await
    }

    async fn rebuild_dag_blocking(&mut self) {
        let root = self.root.clone();
        let hashes = self.file_hashes.clone();
        if let Ok(dag) = tokio::task::spawn_blocking(move || build_dag(&root, &hashes)).await {
            self.dag = dag;
        }
    }

    /// Rewalks the root, diffs against the in-memory map, updates state, and
    /// persists the snapshot. The in-memory map is updated even if the write
    /// to disk fails (best-effort durability).
    pub async fn check_for_changes(&mut self) -> Result<ChangeSet> {
        let root = self.root.clone();
        let patterns = self.ignore_patterns.clone();
        let new_hashes = tokio::task::spawn_blocking(move || walk_and_hash(&root, &patterns))
            .await
            .map_err(|e| CoreError::Watcher(e.to_string()))?;

        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut modified = Vec::new();

        for (path, hash) in &new_hashes {
            match self.file_hashes.get(path) {
                None => added.push(path.clone()),
                Some(old_hash) if old_hash != hash => modified.push(path.clone()),
                Some(_) => {}
            }
        }
        for path in self.file_hashes.keys() {
            if !new_hashes.contains_key(path) {
                removed.push(path.clone());
            }
        }

        added.sort();
        removed.sort();
        modified.sort();

        self.file_hashes = new_hashes;
        self.rebuild_dag_blocking().await;
        let _ = self.persist().await;

        Ok(ChangeSet { added, removed, modified })
    }

    pub fn get_file_hash(&self, relative_path: &str) -> Option<&str> {
        self.file_hashes.get(relative_path).map(String::as_str)
    }

    pub fn file_count(&self) -> usize {
        self.file_hashes.len()
    }

    /// All currently-known relative paths, sorted for deterministic iteration.
    pub fn known_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.file_hashes.keys().cloned().collect();
        paths.sort();
        paths
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = snapshot_path(&self.root) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file_hashes: Vec<(String, String)> =
            self.file_hashes.iter().map(|(p, h)| (p.clone(), h.clone())).collect();
        file_hashes.sort();
        let snapshot = PersistedSnapshot { file_hashes, merkle_dag: self.dag.serialize() };
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(&path, json).await?;
        Ok(())
    }

    /// Removes the persisted snapshot for `root`. Swallows "not found";
    /// surfaces other I/O failures.
    pub async fn delete_snapshot(root: &Path) -> Result<()> {
        let Some(path) = snapshot_path(root) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn default_patterns() -> HashSet<String> {
        [".git", "node_modules", "target"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn matches_ignore_handles_literal_suffix_dir_and_path_patterns() {
        let mut patterns = HashSet::new();
        patterns.insert("README.md".to_string());
        patterns.insert("*.log".to_string());
        patterns.insert("build/".to_string());
        patterns.insert("src/generated".to_string());

        assert!(matches_ignore("README.md", "README.md", false, &patterns));
        assert!(matches_ignore("a/b/debug.log", "debug.log", false, &patterns));
        assert!(matches_ignore("build", "build", true, &patterns));
        assert!(matches_ignore("src/generated", "generated", true, &patterns));
        assert!(matches_ignore("src/generated/foo.rs", "foo.rs", false, &patterns));
        assert!(!matches_ignore("src/main.rs", "main.rs", false, &patterns));
    }

    #[tokio::test]
    async fn initialize_then_check_for_changes_detects_add_modify_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        fs::write(root.join("a.rs"), b"fn a() {}").unwrap();
        fs::write(root.join("b.rs"), b"fn b() {}").unwrap();

        // Point the snapshot at a scratch location by using a fresh HOME for this test.
        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());

        let mut sync = Synchronizer::new(&root, default_patterns());
        sync.initialize().await.unwrap();
        assert_eq!(sync.file_count(), 2);

        fs::write(root.join("a.rs"), b"fn a() { changed() }").unwrap();
        fs::remove_file(root.join("b.rs")).unwrap();
        fs::write(root.join("c.rs"), b"fn c() {}").unwrap();

        let changes = sync.check_for_changes().await.unwrap();
        assert_eq!(changes.added, vec!["c.rs".to_string()]);
        assert_eq!(changes.removed, vec!["b.rs".to_string()]);
        assert_eq!(changes.modified, vec!["a.rs".to_string()]);

        let snapshot_file = snapshot_path(&root).unwrap();
        assert!(snapshot_file.exists());
    }

    #[tokio::test]
    async fn dotfiles_are_always_skipped_regardless_of_patterns() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        fs::write(root.join(".secret"), b"hidden").unwrap();
        fs::write(root.join("visible.rs"), b"fn x() {}").unwrap();

        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());

        let mut sync = Synchronizer::new(&root, HashSet::new());
        sync.initialize().await.unwrap();
        assert_eq!(sync.file_count(), 1);
        assert!(sync.get_file_hash("visible.rs").is_some());
        assert!(sync.get_file_hash(".secret").is_none());
    }

    #[tokio::test]
    async fn delete_snapshot_swallows_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());
        let result = Synchronizer::delete_snapshot(tmp.path()).await;
        assert!(result.is_ok());
    }
}
