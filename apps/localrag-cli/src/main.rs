//! localrag command-line front end.
//!
//! ```bash
//! localrag ingest docs/ manual.pdf
//! localrag quick "battery storage" -k 5
//! localrag deep "how do I size an inverter" --rerank-k 10
//! localrag status
//! ```
//!
//! Indexes are restored from `storage.dir` on start when present and written
//! back after every ingest.

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use localrag_cache::{CacheStore, MemoryCache, RedisCache};
use localrag_core::config::{Config, Settings};
use localrag_core::traits::{DenseIndex, Embedder};
use localrag_core::types::IngestReport;
use localrag_core::Error;
use localrag_embed::EmbedProvider;
use localrag_hybrid::{RagPipeline, SearchService, LEXICAL_FILE};
use localrag_text::Bm25Index;
use localrag_vector::{FlatIndex, LanceIndex};

const LANCE_TABLE: &str = "chunks";

#[derive(Parser)]
#[command(name = "localrag", version, about = "Local document retrieval with hybrid dense + BM25 search")]
struct Cli {
    /// Override `storage.dir`
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest files; directories are walked recursively
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Lexical search with dense fallback
    Quick {
        query: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },
    /// Dense recall, BM25 over the candidates, fused
    Deep {
        query: String,
        #[arg(long)]
        faiss_k: Option<usize>,
        #[arg(long)]
        rerank_k: Option<usize>,
        /// Dense weight in [0, 1]
        #[arg(long)]
        alpha: Option<f32>,
    },
    /// Corpus sizes and embedding provider
    Status,
    /// Write the current indexes to a directory
    Save { dir: PathBuf },
    /// Restore indexes from a directory and report status
    Load { dir: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();

    let config = Config::load().map_err(|e| {
        eprintln!("Error loading config: {e:#}");
        e
    })?;
    let mut settings = config.settings()?;
    if let Command::Deep { alpha: Some(alpha), .. } = &cli.command {
        if !(0.0..=1.0).contains(alpha) {
            return Err(Error::InvalidConfig(format!("alpha must be within 0..=1, got {alpha}")).into());
        }
        settings.search.alpha = *alpha;
    }
    let store_dir = match &cli.store {
        Some(dir) => dir.clone(),
        None => settings.storage.resolved_dir(&std::env::current_dir()?),
    };

    let embedder = EmbedProvider::from_settings(&settings.embed)?;
    match settings.storage.backend.as_str() {
        "flat" => run(FlatIndex::new(), embedder, &settings, &store_dir, cli.command).await,
        "lance" => {
            let uri = store_dir.join("lance");
            let dense = LanceIndex::open(&uri.to_string_lossy(), LANCE_TABLE, embedder.dim()).await?;
            run(dense, embedder, &settings, &store_dir, cli.command).await
        }
        other => Err(Error::InvalidConfig(format!("Unknown storage backend: {other}")).into()),
    }
}

async fn run<D: DenseIndex>(dense: D, embedder: EmbedProvider, settings: &Settings, store_dir: &Path, command: Command) -> Result<()> {
    let pipeline = RagPipeline::new(Box::new(embedder), dense, Bm25Index::new()).with_settings(settings);
    if store_dir.join(LEXICAL_FILE).exists() {
        pipeline.load(store_dir).await?;
    }

    match command {
        Command::Ingest { paths } => {
            let report = ingest(&pipeline, &collect_files(&paths)?).await;
            pipeline.save(store_dir).await?;
            print_json(&report)?;
            if report.failures().next().is_some() {
                warn!(failed = report.failures().count(), "some files were not ingested");
            }
        }
        Command::Status => print_json(&pipeline.status().await?)?,
        Command::Save { dir } => {
            pipeline.save(&dir).await?;
            print_json(&pipeline.status().await?)?;
        }
        Command::Load { dir } => {
            pipeline.load(&dir).await?;
            print_json(&pipeline.status().await?)?;
        }
        Command::Quick { query, top_k } => {
            let service = search_service(pipeline, settings).await?;
            let response = service.quick_search(&query, top_k.unwrap_or(settings.search.quick_top_k)).await?;
            print_json(&response)?;
        }
        Command::Deep { query, faiss_k, rerank_k, .. } => {
            let service = search_service(pipeline, settings).await?;
            let faiss_k = faiss_k.unwrap_or(settings.search.faiss_k);
            let rerank_k = rerank_k.unwrap_or(settings.search.rerank_k);
            print_json(&service.deep_search(&query, faiss_k, rerank_k).await?)?;
        }
    }
    Ok(())
}

async fn search_service<D: DenseIndex>(pipeline: RagPipeline<D, Bm25Index>, settings: &Settings) -> Result<SearchService<D, Bm25Index>> {
    let store: Arc<dyn CacheStore> = match &settings.cache.redis_url {
        Some(url) => Arc::new(RedisCache::connect(url).await?),
        None => Arc::new(MemoryCache::new()),
    };
    Ok(SearchService::from_settings(Arc::new(pipeline), store, &settings.cache))
}

async fn ingest<D: DenseIndex>(pipeline: &RagPipeline<D, Bm25Index>, files: &[PathBuf]) -> IngestReport {
    let pb = ProgressBar::new(files.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar().template("{msg} [{bar:40}] {pos}/{len}") {
        pb.set_style(style);
    }
    pb.set_message("Ingesting");

    let report = pipeline.ingest_files_with(files, |_| pb.inc(1)).await;
    pb.finish_and_clear();
    report
}

/// Files are kept as given; directories are expanded to every file beneath them.
fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()).into());
        }
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
