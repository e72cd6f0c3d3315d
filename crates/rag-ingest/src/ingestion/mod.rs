//! Listing, dedup, extraction and chunking stages of the ingestion pipeline

mod chunker;
mod dedup;
mod extractor;
mod lister;

pub use chunker::TokenChunker;
pub use dedup::{normalize_identity, DedupIndex, PagePartition};
pub use extractor::ContentExtractor;
pub use lister::ObjectLister;
