//! rag-ingest: incremental object-store to vector-index ingestion
//!
//! Lists a bucket page by page, skips objects whose content identity is
//! already stored, and extracts, chunks, embeds and inserts the rest. Each
//! object is an independent unit of work; one object's failure never stops
//! the run.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod storage;
pub mod types;

pub use config::IngestConfig;
pub use error::{Error, Result};
pub use ingestion::{normalize_identity, ContentExtractor, DedupIndex, ObjectLister, TokenChunker};
pub use processing::{IngestionPipeline, ObjectOutcome, PipelineOptions, RunReport};
pub use types::{
    document::{Chunk, ExtractionResult, FileType, IndexedRecord},
    object::{ObjectDescriptor, ObjectPage},
};
