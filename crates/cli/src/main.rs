//! semindex CLI — thin wrapper over `semindex-core`'s indexing, search, and
//! watch operations. Calls the core library directly with no server process.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use semindex_core::config::{state_dir, IndexConfig};
use semindex_core::coordinator::{IndexingCoordinator, ProgressCallback, ProgressEvent};
use semindex_core::embedder_hash::HashingEmbedder;
use semindex_core::splitter::FallbackSplitter;
use semindex_core::vectorstore_local::LocalVectorStore;
use semindex_core::{Embedder, Splitter, VectorStore};

#[derive(Parser)]
#[command(name = "semindex", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index (or reindex) a codebase
    Index {
        /// Project root (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Drop the existing collection and reindex from scratch
        #[arg(long)]
        force: bool,
    },
    /// Run a semantic search against an indexed codebase
    Search {
        /// Search query
        query: String,

        /// Project root (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Maximum number of results
        #[arg(long, default_value = "5")]
        top_k: usize,

        /// Minimum score to include in results
        #[arg(long, default_value = "0.0")]
        min_score: f64,

        /// Disable ranking and report raw vector-similarity order
        #[arg(long)]
        no_ranking: bool,
    },
    /// Watch a codebase and keep its index up to date
    Watch {
        /// Project root (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Debounce window in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,
    },
    /// Drop a codebase's index and persisted snapshot
    ClearIndex {
        /// Project root (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// Show indexing status for a codebase
    Stats {
        /// Project root (default: current directory)
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

fn resolve_root(root: Option<PathBuf>) -> PathBuf {
    root.unwrap_or_else(|| std::env::current_dir().expect("could not determine current directory"))
        .canonicalize()
        .expect("path not found")
}

fn vector_store_path() -> Option<PathBuf> {
    state_dir().map(|d| d.join("vectors.json"))
}

fn build_embedder() -> Arc<dyn Embedder> {
    #[cfg(feature = "semantic")]
    {
        match semindex_core::embedder_onnx::OnnxEmbedder::new(None) {
            Ok(embedder) => return Arc::new(embedder),
            Err(e) => warn!(error = %e, "falling back to the hashing embedder"),
        }
    }
    Arc::new(HashingEmbedder::default())
}

fn build_splitter() -> Box<dyn Splitter> {
    #[cfg(feature = "treesitter")]
    {
        return Box::new(semindex_core::splitter_ast::AstSplitter::new());
    }
    #[cfg(not(feature = "treesitter"))]
    Box::new(FallbackSplitter::new())
}

fn progress_printer(json: bool) -> ProgressCallback {
    Arc::new(move |event: ProgressEvent| {
        if !json {
            eprintln!("[{:>3}%] {} ({}/{})", event.percentage, event.phase, event.current, event.total);
        }
    })
}

async fn build_coordinator() -> (Arc<IndexingCoordinator>, Arc<LocalVectorStore>) {
    let store = match vector_store_path() {
        Some(path) => Arc::new(LocalVectorStore::with_snapshot_path(path)),
        None => Arc::new(LocalVectorStore::new()),
    };
    if let Err(e) = store.load().await {
        warn!(error = %e, "failed to load persisted vector store snapshot; starting empty");
    }

    let vector_store: Arc<dyn VectorStore> = store.clone();
    let coordinator = Arc::new(IndexingCoordinator::new(IndexConfig::load(), build_embedder(), vector_store, build_splitter()));
    (coordinator, store)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive("semindex=info".parse().unwrap()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let (coordinator, store) = build_coordinator().await;

    match cli.command {
        Commands::Index { root, force } => {
            let root = resolve_root(root);
            let stats = coordinator.index_codebase(&root, Some(progress_printer(cli.json)), force).await.unwrap_or_else(|e| {
                eprintln!("index failed: {e}");
                std::process::exit(1);
            });

            if let Err(e) = store.persist().await {
                warn!(error = %e, "failed to persist vector store snapshot");
            }

            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "filesIndexed": stats.files_indexed,
                        "chunksIndexed": stats.chunks_indexed,
                        "filesRemoved": stats.files_removed,
                    })
                );
            } else {
                println!(
                    "Indexed {} file(s), {} chunk(s), removed {} file(s)",
                    stats.files_indexed, stats.chunks_indexed, stats.files_removed
                );
            }
        }
        Commands::Search { query, root, top_k, min_score, no_ranking } => {
            let root = resolve_root(root);
            let hits = coordinator.semantic_search(&root, &query, top_k, min_score, None, !no_ranking).await.unwrap_or_else(|e| {
                eprintln!("search failed: {e}");
                std::process::exit(1);
            });

            if cli.json {
                let items: Vec<serde_json::Value> = hits
                    .iter()
                    .map(|h| {
                        serde_json::json!({
                            "relativePath": h.relative_path,
                            "startLine": h.start_line,
                            "endLine": h.end_line,
                            "language": h.language,
                            "score": h.score,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&items).unwrap());
            } else {
                if hits.is_empty() {
                    eprintln!("No results for '{query}'");
                    std::process::exit(1);
                }
                for hit in &hits {
                    println!("{:<60} {}:{}-{}  {:.3}", hit.relative_path, hit.language, hit.start_line, hit.end_line, hit.score);
                }
            }
        }
        Commands::Watch { root, debounce_ms } => {
            let root = resolve_root(root);
            coordinator.index_codebase(&root, Some(progress_printer(cli.json)), false).await.unwrap_or_else(|e| {
                eprintln!("initial index failed: {e}");
                std::process::exit(1);
            });

            Arc::clone(&coordinator).start_watching(&root, None, debounce_ms).await.unwrap_or_else(|e| {
                eprintln!("failed to start watcher: {e}");
                std::process::exit(1);
            });
            info!(root = %root.display(), "watching for changes; press ctrl-c to stop");

            let _ = tokio::signal::ctrl_c().await;
            let _ = coordinator.stop_watching(&root).await;
            if let Err(e) = store.persist().await {
                warn!(error = %e, "failed to persist vector store snapshot");
            }
        }
        Commands::ClearIndex { root } => {
            let root = resolve_root(root);
            coordinator.clear_index(&root, Some(progress_printer(cli.json))).await.unwrap_or_else(|e| {
                eprintln!("clear-index failed: {e}");
                std::process::exit(1);
            });
            if let Err(e) = store.persist().await {
                warn!(error = %e, "failed to persist vector store snapshot");
            }
            println!("Index cleared for {}", root.display());
        }
        Commands::Stats { root } => {
            let root = resolve_root(root);
            let indexed = coordinator.has_index(&root).await.unwrap_or(false);
            let files = coordinator.file_count(&root).await.unwrap_or(0);
            let watching = coordinator.is_watching(&root).await;

            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "root": root.display().to_string(),
                        "indexed": indexed,
                        "files": files,
                        "watching": watching,
                    })
                );
            } else {
                println!("Root:     {}", root.display());
                println!("Indexed:  {indexed}");
                println!("Files:    {files}");
                println!("Watching: {watching}");
            }
        }
    }
}
