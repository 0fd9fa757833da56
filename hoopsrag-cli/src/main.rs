//! HoopsRAG CLI - ingest a basketball corpus and ask it questions
//!
//! # Commands
//!
//! ```bash
//! # Build a store snapshot from stat tables and articles
//! hoopsrag ingest corpus/ --store corpus.jsonl
//!
//! # Ask a grounded question (API key from OPENAI_API_KEY by default)
//! hoopsrag ask "How many assists does Player X average?" --store corpus.jsonl --top-k 5
//!
//! # Retrieval only
//! hoopsrag search "Player X assists" --store corpus.jsonl --season 2024-25
//!
//! # Diagnostics
//! hoopsrag chunk corpus/stats.csv --strategy fixed
//! hoopsrag embed "Who leads the league in assists?" --query
//! ```
//!
//! Logging is controlled with `RUST_LOG`, e.g. `RUST_LOG=hoopsrag_lib=debug`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use hoopsrag_lib::{
    chunk::{ChunkStrategy, Chunker},
    config::RagConfig,
    document::Normalizer,
    embed::{Embedder, EmbedderKind},
    generate::build_generator,
    ingest::Indexer,
    pipeline::{AskOptions, Assistant},
    rerank::{BgeReranker, Reranker},
    retrieve::{RetrievalFilter, Retriever},
    season::Season,
    store::{MemoryStore, VectorStore},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

type DynEmbedder = Box<dyn Embedder>;

#[derive(Parser)]
#[command(name = "hoopsrag")]
#[command(about = "Grounded question answering over a basketball corpus")]
#[command(version)]
struct Cli {
    /// TOML config file; defaults apply to anything it leaves out
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Embedding backend
    #[arg(long, global = true, value_enum, default_value = "bge")]
    embedder: EmbedderArg,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderArg {
    /// BAAI/bge-large-en-v1.5 (downloads ~1.2GB on first use)
    Bge,
    /// Deterministic feature hashing, no download
    Hash,
}

impl From<EmbedderArg> for EmbedderKind {
    fn from(arg: EmbedderArg) -> Self {
        match arg {
            EmbedderArg::Bge => EmbedderKind::Bge,
            EmbedderArg::Hash => EmbedderKind::Hash,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Fixed,
    Boundary,
}

impl From<StrategyArg> for ChunkStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Fixed => ChunkStrategy::Fixed,
            StrategyArg::Boundary => ChunkStrategy::Boundary,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize, chunk and embed documents into a store snapshot
    Ingest {
        /// Files or directories (.csv stat tables, .txt/.md articles)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Snapshot file; updated in place when it exists
        #[arg(short, long)]
        store: PathBuf,
    },

    /// Ask a question and print the grounded answer with its sources
    Ask {
        question: String,

        #[arg(short, long)]
        store: PathBuf,

        /// Number of chunks to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Generation model identifier
        #[arg(short, long)]
        model: Option<String>,

        /// Restrict retrieval to these seasons (e.g. 2024-25)
        #[arg(long)]
        season: Vec<Season>,

        /// Rerank candidates with the cross-encoder
        #[arg(short, long)]
        rerank: bool,

        /// API key; read from the env var named in the config when omitted
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Retrieve chunks for a query without generating an answer
    Search {
        query: String,

        #[arg(short, long)]
        store: PathBuf,

        /// Number of results to return
        #[arg(short, long)]
        k: Option<usize>,

        #[arg(long)]
        season: Vec<Season>,

        #[arg(short, long)]
        rerank: bool,
    },

    /// Normalize and chunk a file, showing the chunks
    Chunk {
        input: PathBuf,

        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Maximum chunk length in bytes
        #[arg(long)]
        size: Option<usize>,

        /// Bytes shared by adjacent chunks
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Embed text and show vector info
    Embed {
        text: String,

        /// Treat as query (uses query prompt prefix)
        #[arg(short, long)]
        query: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let embedder_kind = EmbedderKind::from(cli.embedder);

    match cli.command {
        Commands::Ingest { paths, store } => {
            let embedder = load_embedder(embedder_kind)?;
            let snapshot = Arc::new(RwLock::new(open_store(&store)?));
            let indexer = Indexer::new(embedder, snapshot.clone(), &config)?;

            let report = indexer.ingest_paths(&paths)?;
            let guard = snapshot
                .read()
                .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
            guard.save(&store)?;

            println!("Ingested: {report}");
            for skipped in &report.skipped {
                println!("  skipped {}: {}", skipped.source, skipped.reason);
            }
            println!(
                "Store '{}' now holds {} chunks from {} documents",
                store.display(),
                guard.len(),
                guard.document_ids().len()
            );
        }

        Commands::Ask {
            question,
            store,
            top_k,
            model,
            season,
            rerank,
            api_key,
        } => {
            let api_key = match api_key {
                Some(key) => key,
                None => std::env::var(&config.generation.api_key_env).with_context(|| {
                    format!("set {} or pass --api-key", config.generation.api_key_env)
                })?,
            };
            let options = AskOptions {
                top_k,
                model,
                filter: season_filter(season),
            };

            let embedder = load_embedder(embedder_kind)?;
            let snapshot = Arc::new(RwLock::new(open_store(&store)?));
            if rerank || config.retrieval.rerank {
                println!("Loading reranker model...");
                let retriever = Retriever::with_rerank(
                    embedder,
                    snapshot,
                    BgeReranker::new()?,
                    config.retrieval.clone(),
                );
                ask(retriever, api_key, config, &question, &options).await?;
            } else {
                let retriever = Retriever::new(embedder, snapshot, config.retrieval.clone());
                ask(retriever, api_key, config, &question, &options).await?;
            }
        }

        Commands::Search {
            query,
            store,
            k,
            season,
            rerank,
        } => {
            let k = config.check_top_k(k.unwrap_or(config.retrieval.top_k))?;
            let filter = season_filter(season);
            let embedder = load_embedder(embedder_kind)?;
            let snapshot = Arc::new(RwLock::new(open_store(&store)?));

            let results = if rerank || config.retrieval.rerank {
                println!("Loading reranker model...");
                Retriever::with_rerank(embedder, snapshot, BgeReranker::new()?, config.retrieval.clone())
                    .retrieve(&query, k, filter.as_ref())?
            } else {
                Retriever::new(embedder, snapshot, config.retrieval.clone())
                    .retrieve(&query, k, filter.as_ref())?
            };

            println!("\n=== Results for '{query}' ===\n");
            for (i, result) in results.iter().enumerate() {
                let meta = &result.chunk.metadata;
                println!(
                    "#{} (score: {:.4}) {} [{}, {}]",
                    i + 1,
                    result.score,
                    meta.document_id,
                    meta.kind,
                    meta.season
                );
                println!("---");
                println!("{}\n", preview(&result.chunk.content, 300));
            }
        }

        Commands::Chunk {
            input,
            strategy,
            size,
            overlap,
        } => {
            let strategy = strategy.map_or(config.chunking.strategy, ChunkStrategy::from);
            let size = size.unwrap_or(config.chunking.max_length);
            let overlap = overlap.unwrap_or(config.chunking.overlap);
            let chunker = strategy.build(size, overlap)?;

            let documents = Normalizer::new(config.seasons).normalize_file(&input)?;
            for document in &documents {
                let chunks = chunker.chunk(document);
                println!(
                    "Chunked '{}' into {} chunks using {} strategy:\n",
                    document.id,
                    chunks.len(),
                    chunker.name()
                );
                for (i, chunk) in chunks.iter().enumerate() {
                    let range = &chunk.metadata.range;
                    println!(
                        "--- Chunk {} ({}B, ~{} tokens, bytes {}..{}, id: {}) ---",
                        i + 1,
                        chunk.content.len(),
                        chunk.token_estimate(),
                        range.start,
                        range.end,
                        chunk.id
                    );
                    println!("{}\n", preview(&chunk.content, 200));
                }
            }
        }

        Commands::Embed { text, query } => {
            let embedder = load_embedder(embedder_kind)?;

            let embedding = if query {
                println!("Embedding as query: {text}");
                embedder.embed_query(&text)?
            } else {
                println!("Embedding as document: {text}");
                embedder.embed(&text)?
            };

            println!("\nEmbedding stats:");
            println!("  Encoder: {}", embedder.version());
            println!("  Dimensions: {}", embedding.len());
            println!("  First 5 values: {:?}", &embedding[..embedding.len().min(5)]);
            println!("  Min: {:.4}", embedding.iter().copied().fold(f32::INFINITY, f32::min));
            println!("  Max: {:.4}", embedding.iter().copied().fold(f32::NEG_INFINITY, f32::max));
        }
    }

    Ok(())
}

async fn ask<R: Reranker + 'static>(
    retriever: Retriever<DynEmbedder, MemoryStore, R>,
    api_key: String,
    config: RagConfig,
    question: &str,
    options: &AskOptions,
) -> Result<()> {
    let generator = build_generator(&config.generation, api_key)?;
    let assistant = Assistant::with_retriever(retriever, generator, config)?;

    let response = match assistant.ask(question, options).await {
        Ok(response) => response,
        Err(e) if e.is_retryable() => bail!("{} ({e})", e.user_message()),
        Err(e) => return Err(e.into()),
    };

    println!("{}\n", response.answer);
    println!("Outcome: {:?}, grounding: {:?}", response.outcome, response.grounding);
    if !response.sources.is_empty() {
        println!("\nSources:");
        for (i, source) in response.sources.iter().enumerate() {
            println!("  [{}] {} (score: {:.4})", i + 1, source.document_id, source.score);
            println!("      {}", preview(&source.excerpt, 200));
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<RagConfig> {
    match path {
        Some(path) => RagConfig::load(path)
            .with_context(|| format!("failed to load config '{}'", path.display())),
        None => Ok(RagConfig::default()),
    }
}

fn load_embedder(kind: EmbedderKind) -> Result<Arc<DynEmbedder>> {
    if kind == EmbedderKind::Bge {
        println!("Loading BGE model (first run downloads ~1.2GB)...");
    }
    Ok(Arc::new(kind.load()?))
}

/// Loads the snapshot at `path`. A missing file is an empty store.
fn open_store(path: &Path) -> Result<MemoryStore> {
    if !path.exists() {
        info!(path = %path.display(), "store file not found, starting empty");
        return Ok(MemoryStore::new());
    }
    let store = MemoryStore::load(path)
        .with_context(|| format!("failed to load store '{}'", path.display()))?;
    info!(chunks = store.len(), path = %path.display(), "loaded store");
    Ok(store)
}

fn season_filter(seasons: Vec<Season>) -> Option<RetrievalFilter> {
    (!seasons.is_empty()).then(|| RetrievalFilter::seasons(seasons))
}

fn preview(text: &str, max_chars: usize) -> String {
    let preview: String = text.chars().take(max_chars).collect();
    let ellipsis = if text.chars().count() > max_chars { "..." } else { "" };
    format!("{preview}{ellipsis}")
}
