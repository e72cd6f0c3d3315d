//! Core types for the ingestion pipeline

pub mod document;
pub mod object;

pub use document::{Chunk, ExtractionResult, FileType, IndexedRecord};
pub use object::{ObjectDescriptor, ObjectPage};
