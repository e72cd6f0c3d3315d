//! Configuration for the ingestion pipeline

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main ingestion configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Object store configuration
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    /// Vector database configuration
    #[serde(default)]
    pub vector_db: VectorDbConfig,
    /// Dedup query configuration
    #[serde(default)]
    pub dedup: DedupConfig,
    /// Embedding configuration
    #[serde(default)]
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,
    /// Text extraction configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

impl IngestConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunking.window_size == 0 {
            return Err(Error::Config("chunking.window_size must be > 0".to_string()));
        }
        if self.chunking.overlap >= self.chunking.window_size {
            return Err(Error::Config(format!(
                "chunking.overlap ({}) must be smaller than chunking.window_size ({})",
                self.chunking.overlap, self.chunking.window_size
            )));
        }
        if self.object_store.page_size == 0 {
            return Err(Error::Config("object_store.page_size must be > 0".to_string()));
        }
        if self.dedup.batch_size == 0 {
            return Err(Error::Config("dedup.batch_size must be > 0".to_string()));
        }
        if self.embeddings.dimensions == 0 {
            return Err(Error::Config("embeddings.dimensions must be > 0".to_string()));
        }
        if self.object_store.backend == ObjectStoreBackend::Gcs && self.object_store.bucket.is_none() {
            return Err(Error::Config("object_store.bucket is required for the gcs backend".to_string()));
        }
        Ok(())
    }
}

/// Object store backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStoreBackend {
    /// Directory tree on the local filesystem
    #[default]
    Local,
    /// Google Cloud Storage
    Gcs,
}

/// Object store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    #[serde(default)]
    pub backend: ObjectStoreBackend,
    /// Root directory for the local backend
    #[serde(default = "default_object_root")]
    pub root: PathBuf,
    /// Bucket name for the gcs backend
    #[serde(default)]
    pub bucket: Option<String>,
    /// Key prefix to ingest (empty = whole bucket)
    #[serde(default)]
    pub prefix: String,
    /// Maximum descriptors per listing page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_object_root() -> PathBuf {
    PathBuf::from("./bucket")
}

fn default_page_size() -> usize {
    1000
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            backend: ObjectStoreBackend::Local,
            root: default_object_root(),
            bucket: None,
            prefix: String::new(),
            page_size: default_page_size(),
        }
    }
}

/// Vector database backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum VectorDbBackend {
    /// SQLite file on the local filesystem
    #[default]
    Local,
    /// Milvus over its REST API
    Milvus,
}

/// Vector database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDbConfig {
    #[serde(default)]
    pub backend: VectorDbBackend,
    /// Storage path for the local backend
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    /// Milvus base URI, e.g. `http://localhost:19530`
    #[serde(default = "default_milvus_uri")]
    pub uri: String,
    /// Milvus bearer token (`user:password` or API key)
    #[serde(default)]
    pub token: Option<String>,
    /// Collection name
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Field holding the content identity
    #[serde(default = "default_identity_field")]
    pub identity_field: String,
    /// Request timeout in seconds
    #[serde(default = "default_vector_timeout")]
    pub timeout_secs: u64,
}

fn default_storage_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rag-ingest")
        .join("records.db")
}

fn default_milvus_uri() -> String {
    "http://localhost:19530".to_string()
}

fn default_collection() -> String {
    "documents".to_string()
}

fn default_identity_field() -> String {
    "etag".to_string()
}

fn default_vector_timeout() -> u64 {
    30
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            backend: VectorDbBackend::Local,
            storage_path: default_storage_path(),
            uri: default_milvus_uri(),
            token: None,
            collection: default_collection(),
            identity_field: default_identity_field(),
            timeout_secs: default_vector_timeout(),
        }
    }
}

/// Dedup query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Maximum identities per existence query
    #[serde(default = "default_dedup_batch")]
    pub batch_size: usize,
}

fn default_dedup_batch() -> usize {
    500
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            batch_size: default_dedup_batch(),
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Ollama base URL
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Embedding model name
    #[serde(default = "default_embed_model")]
    pub model: String,
    /// Embedding dimensions (768 for nomic-embed-text)
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
    /// Task prefix prepended to every chunk before embedding
    #[serde(default = "default_document_prefix")]
    pub document_prefix: String,
    /// Request timeout in seconds
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Concurrent embedding requests per object
    #[serde(default = "default_parallel_requests")]
    pub parallel_requests: usize,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_embed_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_dimensions() -> usize {
    768
}

fn default_document_prefix() -> String {
    "search_document: ".to_string()
}

fn default_embed_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

fn default_parallel_requests() -> usize {
    4
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            model: default_embed_model(),
            dimensions: default_dimensions(),
            document_prefix: default_document_prefix(),
            timeout_secs: default_embed_timeout(),
            max_retries: default_max_retries(),
            parallel_requests: default_parallel_requests(),
        }
    }
}

/// Token-window chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Path to the embedding model's `tokenizer.json`
    #[serde(default = "default_tokenizer_path")]
    pub tokenizer_path: PathBuf,
    /// Window size in tokens
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Tokens shared by consecutive windows
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

fn default_tokenizer_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rag-ingest")
        .join("tokenizer.json")
}

fn default_window_size() -> usize {
    1000
}

fn default_overlap() -> usize {
    200
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            tokenizer_path: default_tokenizer_path(),
            window_size: default_window_size(),
            overlap: default_overlap(),
        }
    }
}

/// Text extraction configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Maximum pages read per paginated document (unbounded when unset)
    #[serde(default)]
    pub max_pages: Option<u32>,
}

/// Processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Objects of one page processed concurrently (default: CPU count, max 8)
    #[serde(default)]
    pub parallel_objects: Option<usize>,
    /// Time budget for one object in seconds
    #[serde(default = "default_object_timeout")]
    pub object_timeout_secs: u64,
}

fn default_object_timeout() -> u64 {
    300
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_objects: None,
            object_timeout_secs: default_object_timeout(),
        }
    }
}

impl ProcessingConfig {
    /// Resolved worker count
    pub fn workers(&self) -> usize {
        self.parallel_objects
            .unwrap_or_else(|| num_cpus::get().min(8))
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.window_size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.dedup.batch_size, 500);
        assert_eq!(config.vector_db.identity_field, "etag");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = IngestConfig::from_toml(
            r#"
            [object_store]
            prefix = "reports/"
            page_size = 50

            [chunking]
            window_size = 512
            overlap = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.object_store.prefix, "reports/");
        assert_eq!(config.object_store.page_size, 50);
        assert_eq!(config.chunking.window_size, 512);
        assert_eq!(config.embeddings.model, "nomic-embed-text");
        assert_eq!(config.vector_db.backend, VectorDbBackend::Local);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        let result = IngestConfig::from_toml(
            r#"
            [chunking]
            window_size = 100
            overlap = 100
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_gcs_requires_bucket() {
        let result = IngestConfig::from_toml(
            r#"
            [object_store]
            backend = "gcs"
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_workers_never_zero() {
        let processing = ProcessingConfig {
            parallel_objects: Some(0),
            ..Default::default()
        };
        assert_eq!(processing.workers(), 1);
    }
}
