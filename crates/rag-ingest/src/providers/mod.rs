//! Provider abstractions for the pipeline's external collaborators
//!
//! The pipeline only sees these traits; concrete backends are constructed
//! by the caller and injected.

pub mod embedding;
pub mod local;
pub mod milvus;
pub mod object_store;
pub mod ollama;
pub mod tokenizer;
pub mod vector_store;

#[cfg(feature = "gcp")]
pub mod gcp;

pub use embedding::EmbeddingProvider;
pub use local::{LocalObjectStore, LocalVectorStore};
pub use milvus::MilvusVectorStore;
pub use object_store::ObjectStoreProvider;
pub use ollama::OllamaEmbedder;
pub use tokenizer::{HfTokenizer, TokenizerProvider};
pub use vector_store::VectorStoreProvider;
