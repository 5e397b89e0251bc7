//! semindex-core — incremental, local-first semantic code indexing.
//!
//! Four pieces compose into the public surface: a content-addressed hash DAG
//! ([`hashdag`]) underlies the [`sync`] Synchronizer's incremental change
//! detection, a debounced [`watcher`] drives that Synchronizer from live
//! filesystem events, [`imports`] builds the import-frequency graph the
//! [`ranker`] uses as one of its signals, and [`evaluation`] offers offline
//! A/B comparison between ranking configurations. [`coordinator`] and
//! [`query`] wire all of it together behind the [`collaborators`] traits, with
//! dependency-light reference implementations ([`embedder_hash`],
//! [`vectorstore_local`], [`splitter`], and — behind features —
//! [`splitter_ast`], [`embedder_onnx`]) so the crate runs with no external
//! services.

pub mod collaborators;
pub mod config;
pub mod coordinator;
pub mod embedder_hash;
pub mod error;
pub mod evaluation;
pub mod hashdag;
pub mod imports;
pub mod query;
pub mod ranker;
pub mod splitter;
pub mod sync;
pub mod vectorstore_local;
pub mod watcher;

#[cfg(feature = "treesitter")]
pub mod splitter_ast;

#[cfg(feature = "semantic")]
pub mod embedder_onnx;

pub use collaborators::{DeletePredicate, Embedder, EmbeddingVector, HybridRequest, SearchHit, SearchOptions, SplitChunk, Splitter, VectorRecord, VectorStore};
pub use config::IndexConfig;
pub use coordinator::{IndexStats, IndexingCoordinator, ProgressCallback, ProgressEvent};
pub use error::{CoreError, Result};
pub use evaluation::{AbHarness, AbReport, Metrics, TestQuery, Winner};
pub use hashdag::{DagDiff, HashDag, Node, NodeId};
pub use imports::{ImportAnalyzer, ImportEdge, ImportGraph};
pub use query::QueryHit;
pub use ranker::{RankedResult, Ranker, RankingConfig, VectorHit};
pub use sync::{ChangeSet, Synchronizer};
pub use watcher::{ChangeBatch, ChangeCallback, ErrorCallback, WatchEvent, WatchEventKind, WatchStats, Watcher};
