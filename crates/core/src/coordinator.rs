//! Indexing Coordinator — owns the collection-name → Synchronizer mapping,
//! drives the per-file chunk/embed/store pipeline, and wires the file
//! watcher's change callback back into the incremental path.
//!
//! Two different repositories index concurrently without contention: each
//! gets its own `tokio::sync::Mutex`-guarded [`CollectionState`], not a
//! single global lock.

use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::collaborators::{DeletePredicate, Embedder, Splitter, VectorRecord, VectorStore};
use crate::config::IndexConfig;
use crate::error::Result;
use crate::imports::ImportAnalyzer;
use crate::sync::Synchronizer;
use crate::watcher::{ChangeBatch, ChangeCallback, Watcher};

#[derive(Clone, Debug)]
pub struct ProgressEvent {
    pub phase: String,
    pub current: usize,
    pub total: usize,
    pub percentage: u8,
}

pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

fn report(cb: &Option<ProgressCallback>, phase: &str, current: usize, total: usize) {
    let Some(cb) = cb else { return };
    let percentage = if total == 0 { 100 } else { ((current as f64 / total as f64) * 100.0).clamp(0.0, 100.0) as u8 };
    cb(ProgressEvent { phase: phase.to_string(), current, total, percentage });
}

#[derive(Clone, Debug, Default)]
pub struct IndexStats {
    pub files_indexed: usize,
    pub chunks_indexed: usize,
    pub files_removed: usize,
}

struct CollectionState {
    root: PathBuf,
    synchronizer: Synchronizer,
    import_analyzer: ImportAnalyzer,
    max_import_count: AtomicU64, // bit-pattern of an f64, via to_bits/from_bits
    watcher: Option<Watcher>,
}

impl CollectionState {
    fn new(root: &Path, ignore_patterns: std::collections::HashSet<String>) -> Self {
        Self {
            root: root.to_path_buf(),
            synchronizer: Synchronizer::new(root, ignore_patterns),
            import_analyzer: ImportAnalyzer::new(),
            max_import_count: AtomicU64::new(0f64.to_bits()),
            watcher: None,
        }
    }

    fn bump_max_import(&self, count: f64) {
        loop {
            let current = f64::from_bits(self.max_import_count.load(Ordering::Relaxed));
            if count <= current {
                return;
            }
            let updated = count.to_bits();
            if self
                .max_import_count
                .compare_exchange(current.to_bits(), updated, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    fn max_import(&self) -> f64 {
        f64::from_bits(self.max_import_count.load(Ordering::Relaxed))
    }
}

fn extension_of(rel_path: &str) -> Option<&str> {
    rel_path.rsplit('.').next().filter(|ext| *ext != rel_path)
}

fn has_supported_extension(rel_path: &str, extensions: &std::collections::HashSet<String>) -> bool {
    extension_of(rel_path).map(|ext| extensions.contains(ext)).unwrap_or(false)
}

/// Best-effort popularity count for a file: the import graph tracks raw
/// module strings as written, not resolved paths, so this checks the
/// relative path, the relative path without extension, and the bare file
/// stem and takes whichever the analyzer recognizes. See the module
/// resolution non-goal in [`crate::imports`].
fn import_count_for_path(analyzer: &ImportAnalyzer, rel_path: &str) -> u32 {
    let without_ext = rel_path.rsplit_once('.').map(|(base, _)| base).unwrap_or(rel_path);
    let stem = rel_path.rsplit('/').next().unwrap_or(rel_path);
    let stem_without_ext = stem.rsplit_once('.').map(|(base, _)| base).unwrap_or(stem);

    [rel_path, without_ext, stem, stem_without_ext]
        .iter()
        .map(|candidate| analyzer.frequency(candidate))
        .max()
        .unwrap_or(0)
}

pub(crate) fn sparse_terms(text: &str) -> HashMap<String, f32> {
    let mut counts: HashMap<String, f32> = HashMap::new();
    for token in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if token.is_empty() {
            continue;
        }
        *counts.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    counts
}

fn collection_digest(root: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    hex::encode(hasher.finalize())[..8].to_string()
}

fn modified_at_ms(metadata: &std::fs::Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct IndexingCoordinator {
    config: IndexConfig,
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    splitter: Arc<Mutex<Box<dyn Splitter>>>,
    collections: dashmap::DashMap<String, Arc<Mutex<CollectionState>>>,
}

impl IndexingCoordinator {
    pub fn new(
        config: IndexConfig,
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        splitter: Box<dyn Splitter>,
    ) -> Self {
        Self {
            config,
            embedder,
            vector_store,
            splitter: Arc::new(Mutex::new(splitter)),
            collections: dashmap::DashMap::new(),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub(crate) fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    pub(crate) fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn get_collection_name(&self, root: &Path) -> String {
        let prefix = if self.config.hybrid_mode { "hybrid_code_chunks_" } else { "code_chunks_" };
        format!("{prefix}{}", collection_digest(root))
    }

    pub async fn has_index(&self, root: &Path) -> Result<bool> {
        self.vector_store.has_collection(&self.get_collection_name(root)).await
    }

    fn entry_for(&self, root: &Path) -> (String, Arc<Mutex<CollectionState>>) {
        let name = self.get_collection_name(root);
        let entry = self
            .collections
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Mutex::new(CollectionState::new(root, self.config.ignore_patterns.clone()))))
            .clone();
        (name, entry)
    }

    pub async fn clear_index(&self, root: &Path, progress: Option<ProgressCallback>) -> Result<()> {
        report(&progress, "Preparing", 0, 1);
        let name = self.get_collection_name(root);
        self.vector_store.drop_collection(&name).await?;
        Synchronizer::delete_snapshot(root).await?;
        self.collections.remove(&name);
        report(&progress, "Done", 1, 1);
        Ok(())
    }

    /// Indexes `root`, choosing the incremental path when a collection and a
    /// snapshot both already exist and `force` is false, otherwise performing
    /// a full reindex.
    pub async fn index_codebase(&self, root: &Path, progress: Option<ProgressCallback>, force: bool) -> Result<IndexStats> {
        report(&progress, "Preparing", 0, 1);

        let (name, entry) = self.entry_for(root);
        let mut state = entry.lock().await;

        if force {
            self.vector_store.drop_collection(&name).await?;
            Synchronizer::delete_snapshot(root).await?;
            *state = CollectionState::new(root, self.config.ignore_patterns.clone());
        }

        let has_collection = self.vector_store.has_collection(&name).await?;
        let snapshot_exists = crate::config::snapshot_path(root).map(|p| p.exists()).unwrap_or(false);
        let incremental = !force && has_collection && snapshot_exists;

        if !has_collection {
            if self.config.hybrid_mode {
                self.vector_store.create_hybrid_collection(&name, self.embedder.dimension()).await?;
            } else {
                self.vector_store.create_collection(&name, self.embedder.dimension()).await?;
            }
        }

        if incremental {
            self.index_incremental(root, &name, &mut state, progress).await
        } else {
            self.index_full(root, &name, &mut state, progress).await
        }
    }

    async fn index_full(
        &self,
        root: &Path,
        name: &str,
        state: &mut CollectionState,
        progress: Option<ProgressCallback>,
    ) -> Result<IndexStats> {
        state.synchronizer.initialize().await?;
        let paths: Vec<String> =
            state.synchronizer.known_paths().into_iter().filter(|p| has_supported_extension(p, &self.config.extensions)).collect();

        report(&progress, "Scanning", 0, paths.len());

        let mut chunks_indexed = 0usize;
        for (i, rel_path) in paths.iter().enumerate() {
            chunks_indexed += self.index_file(root, name, state, rel_path).await?;
            report(&progress, "Indexing", i + 1, paths.len());
        }

        Ok(IndexStats { files_indexed: paths.len(), chunks_indexed, files_removed: 0 })
    }

    async fn index_incremental(
        &self,
        root: &Path,
        name: &str,
        state: &mut CollectionState,
        progress: Option<ProgressCallback>,
    ) -> Result<IndexStats> {
        let changes = state.synchronizer.check_for_changes().await?;

        let touched: Vec<String> = changes
            .added
            .iter()
            .chain(changes.modified.iter())
            .filter(|p| has_supported_extension(p, &self.config.extensions))
            .cloned()
            .collect();

        report(&progress, "Scanning", 0, touched.len());

        let mut chunks_indexed = 0usize;
        for (i, rel_path) in touched.iter().enumerate() {
            chunks_indexed += self.index_file(root, name, state, rel_path).await?;
            report(&progress, "Indexing", i + 1, touched.len());
        }

        for removed in &changes.removed {
            self.vector_store.delete(name, DeletePredicate::RelativePath(removed.clone())).await?;
        }

        Ok(IndexStats { files_indexed: touched.len(), chunks_indexed, files_removed: changes.removed.len() })
    }

    /// Chunks, embeds, and stores one file, replacing any records that
    /// already exist for it. Returns the number of chunks written. I/O
    /// failures reading the file are logged and treated as zero chunks
    /// rather than failing the whole run.
    async fn index_file(&self, root: &Path, collection: &str, state: &mut CollectionState, rel_path: &str) -> Result<usize> {
        let abs_path = root.join(rel_path);

        let content = match tokio::fs::read_to_string(&abs_path).await {
            Ok(c) => c,
            Err(e) => {
                warn!(path = rel_path, error = %e, "skipping unreadable file during indexing");
                return Ok(0);
            }
        };
        let mtime = tokio::fs::metadata(&abs_path).await.map(|m| modified_at_ms(&m)).unwrap_or(0);
        let language = extension_of(rel_path).unwrap_or("").to_string();

        self.vector_store.delete(collection, DeletePredicate::RelativePath(rel_path.to_string())).await?;

        let chunks = self.splitter.lock().await.split(&content, &language, Some(rel_path));
        if chunks.is_empty() {
            state.import_analyzer.analyze_file(&content, &language, rel_path);
            return Ok(0);
        }

        state.import_analyzer.analyze_file(&content, &language, rel_path);
        let import_count = import_count_for_path(&state.import_analyzer, rel_path);
        state.bump_max_import(import_count as f64);

        let mut records = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.config.embedding_batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;

            for (chunk, embedding) in batch.iter().zip(embeddings) {
                let payload = json!({
                    "relativePath": rel_path,
                    "content": chunk.content,
                    "startLine": chunk.start_line,
                    "endLine": chunk.end_line,
                    "language": chunk.language,
                    "importCount": import_count,
                    "modifiedAtMs": mtime,
                });
                let sparse = self.config.hybrid_mode.then(|| sparse_terms(&chunk.content));
                records.push(VectorRecord {
                    id: format!("{rel_path}:{}-{}", chunk.start_line, chunk.end_line),
                    vector: embedding.values,
                    sparse,
                    payload,
                });
            }
        }

        let count = records.len();
        if self.config.hybrid_mode {
            self.vector_store.insert_hybrid(collection, records).await?;
        } else {
            self.vector_store.insert(collection, records).await?;
        }
        Ok(count)
    }

    /// Loads the root's Synchronizer from its persisted snapshot (without
    /// touching the vector store) if it is not already populated in this
    /// process, then returns its tracked file count. Cheap enough for a
    /// `stats`-style caller that wants the count without running a reindex.
    pub async fn file_count(&self, root: &Path) -> Result<usize> {
        let (_, entry) = self.entry_for(root);
        let mut state = entry.lock().await;
        if state.synchronizer.file_count() == 0 {
            state.synchronizer.initialize().await?;
        }
        Ok(state.synchronizer.file_count())
    }

    pub async fn max_import_count(&self, root: &Path) -> Option<f64> {
        let name = self.get_collection_name(root);
        let entry = self.collections.get(&name)?.clone();
        Some(entry.lock().await.max_import())
    }

    /// Starts watching `root`, wiring its changes into the incremental index
    /// path when no explicit callback is given. Takes `Arc<Self>` by value
    /// because the default callback outlives this call — pass
    /// `Arc::clone(&coordinator)`.
    pub async fn start_watching(
        self: Arc<Self>,
        root: &Path,
        cb: Option<ChangeCallback>,
        debounce_ms: Option<u64>,
    ) -> Result<()> {
        let (_, entry) = self.entry_for(root);
        let mut state = entry.lock().await;

        if state.watcher.as_ref().is_some_and(Watcher::is_watching) {
            warn!(root = %root.display(), "watcher already running; ignoring start_watching");
            return Ok(());
        }

        let mut watcher = Watcher::new(vec![root.to_path_buf()], debounce_ms);
        let change_cb = cb.unwrap_or_else(|| self.default_reindex_callback(root.to_path_buf()));
        watcher.on_change(change_cb);
        watcher.start().await?;
        state.watcher = Some(watcher);
        Ok(())
    }

    fn default_reindex_callback(self: Arc<Self>, root: PathBuf) -> ChangeCallback {
        Arc::new(move |_batch: ChangeBatch| {
            let coordinator = Arc::clone(&self);
            let root = root.clone();
            Box::pin(async move {
                coordinator.index_codebase(&root, None, false).await.map(|_| ()).map_err(|e| e.to_string())
            })
        })
    }

    pub async fn stop_watching(&self, root: &Path) -> Result<()> {
        let (_, entry) = self.entry_for(root);
        let mut state = entry.lock().await;
        if let Some(watcher) = state.watcher.as_mut() {
            watcher.stop().await?;
        }
        Ok(())
    }

    pub async fn is_watching(&self, root: &Path) -> bool {
        let (_, entry) = self.entry_for(root);
        let state = entry.lock().await;
        state.watcher.as_ref().is_some_and(Watcher::is_watching)
    }

    pub async fn get_watcher_stats(&self, root: &Path) -> Option<crate::watcher::WatchStats> {
        let (_, entry) = self.entry_for(root);
        let state = entry.lock().await;
        state.watcher.as_ref().map(Watcher::stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder_hash::HashingEmbedder;
    use crate::splitter::FallbackSplitter;
    use crate::vectorstore_local::LocalVectorStore;
    use std::fs;

    fn coordinator() -> IndexingCoordinator {
        IndexingCoordinator::new(
            IndexConfig::default(),
            Arc::new(HashingEmbedder::new(32)),
            Arc::new(LocalVectorStore::new()),
            Box::new(FallbackSplitter::new()),
        )
    }

    #[tokio::test]
    async fn full_index_then_incremental_picks_up_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());
        let root = tmp.path().to_path_buf();

        fs::write(root.join("a.rs"), "fn a() {\n    body_one_long_enough_to_survive_min_len();\n}\n").unwrap();

        let coord = coordinator();
        let stats = coord.index_codebase(&root, None, false).await.unwrap();
        assert_eq!(stats.files_indexed, 1);
        assert!(stats.chunks_indexed >= 1);

        fs::write(root.join("b.rs"), "fn b() {\n    body_two_long_enough_to_survive_min_len();\n}\n").unwrap();
        let stats2 = coord.index_codebase(&root, None, false).await.unwrap();
        assert_eq!(stats2.files_indexed, 1);
        assert_eq!(stats2.files_removed, 0);
    }

    #[tokio::test]
    async fn clear_index_drops_the_collection() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());
        let root = tmp.path().to_path_buf();
        fs::write(root.join("a.rs"), "fn a() {\n    body_long_enough_to_survive_min_len();\n}\n").unwrap();

        let coord = coordinator();
        coord.index_codebase(&root, None, false).await.unwrap();
        assert!(coord.has_index(&root).await.unwrap());

        coord.clear_index(&root, None).await.unwrap();
        assert!(!coord.has_index(&root).await.unwrap());
    }

    #[tokio::test]
    async fn unsupported_extensions_are_skipped_during_indexing() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tempfile::tempdir().unwrap();
        std::env::set_var("HOME", home.path());
        let root = tmp.path().to_path_buf();
        fs::write(root.join("notes.bin"), "irrelevant").unwrap();

        let coord = coordinator();
        let stats = coord.index_codebase(&root, None, false).await.unwrap();
        assert_eq!(stats.files_indexed, 0);
    }
}
