//! Ingestion CLI
//!
//! Run with: cargo run -p rag-ingest -- --config ingest.toml

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rag_ingest::config::{IngestConfig, ObjectStoreBackend, VectorDbBackend};
use rag_ingest::providers::{
    EmbeddingProvider, HfTokenizer, LocalObjectStore, LocalVectorStore, MilvusVectorStore,
    ObjectStoreProvider, OllamaEmbedder, VectorStoreProvider,
};
use rag_ingest::{
    ContentExtractor, DedupIndex, IngestionPipeline, ObjectLister, PipelineOptions, TokenChunker,
};

#[derive(Parser, Debug)]
#[command(
    name = "rag-ingest",
    version,
    about = "Ingest new objects from an object store into a vector index"
)]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(long, short, env = "RAG_INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Only ingest keys under this prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Maximum pages read per paginated document
    #[arg(long)]
    max_pages: Option<u32>,

    /// List and dedup only; download, extract and insert nothing
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rag_ingest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => IngestConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => IngestConfig::default(),
    };
    if let Some(prefix) = cli.prefix {
        config.object_store.prefix = prefix;
    }
    if cli.max_pages.is_some() {
        config.extraction.max_pages = cli.max_pages;
    }
    config.validate()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Object store: {:?} (prefix '{}')", config.object_store.backend, config.object_store.prefix);
    tracing::info!("  - Vector store: {:?} (collection '{}')", config.vector_db.backend, config.vector_db.collection);
    tracing::info!("  - Embedding model: {} ({} dims)", config.embeddings.model, config.embeddings.dimensions);
    tracing::info!("  - Chunk window: {} tokens, {} overlap", config.chunking.window_size, config.chunking.overlap);

    let objects = build_object_store(&config).await?;
    let vectors = build_vector_store(&config)?;
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OllamaEmbedder::new(&config.embeddings)?);
    let tokenizer = Arc::new(
        HfTokenizer::from_file(&config.chunking.tokenizer_path)
            .context("the tokenizer must match the embedding model; set chunking.tokenizer_path")?,
    );

    if !objects.health_check().await.unwrap_or(false) {
        tracing::warn!("Object store '{}' reports unhealthy", objects.name());
    }
    if !cli.dry_run && !embedder.health_check().await.unwrap_or(false) {
        tracing::warn!("Embedding service not available at {}", config.embeddings.base_url);
    }

    vectors
        .ensure_collection(config.embeddings.dimensions)
        .await
        .context("preparing vector collection")?;

    let options = PipelineOptions {
        dry_run: cli.dry_run,
        ..PipelineOptions::from_config(&config)
    };

    let pipeline = IngestionPipeline::new(
        ObjectLister::new(objects.clone(), config.object_store.page_size),
        DedupIndex::new(vectors.clone(), config.dedup.batch_size),
        objects,
        ContentExtractor::new(config.extraction.max_pages),
        TokenChunker::new(tokenizer, config.chunking.window_size, config.chunking.overlap)?,
        embedder,
        vectors,
    )
    .with_options(options);

    let report = pipeline.run().await.context("ingestion run aborted")?;

    println!("\n{}", report);
    for failure in &report.failures {
        println!("  FAILED {} (after {}): {}", failure.key, failure.stage, failure.error);
    }

    Ok(())
}

async fn build_object_store(config: &IngestConfig) -> anyhow::Result<Arc<dyn ObjectStoreProvider>> {
    match config.object_store.backend {
        ObjectStoreBackend::Local => Ok(Arc::new(LocalObjectStore::new(
            config.object_store.root.clone(),
        )?)),
        #[cfg(feature = "gcp")]
        ObjectStoreBackend::Gcs => {
            let bucket = config
                .object_store
                .bucket
                .clone()
                .context("object_store.bucket is required for the gcs backend")?;
            Ok(Arc::new(
                rag_ingest::providers::gcp::GcsObjectStore::new(bucket).await?,
            ))
        }
        #[cfg(not(feature = "gcp"))]
        ObjectStoreBackend::Gcs => {
            anyhow::bail!("the gcs backend requires building with `--features gcp`")
        }
    }
}

fn build_vector_store(config: &IngestConfig) -> anyhow::Result<Arc<dyn VectorStoreProvider>> {
    match config.vector_db.backend {
        VectorDbBackend::Local => Ok(Arc::new(LocalVectorStore::open(
            &config.vector_db.storage_path,
        )?)),
        VectorDbBackend::Milvus => Ok(Arc::new(MilvusVectorStore::new(&config.vector_db)?)),
    }
}
