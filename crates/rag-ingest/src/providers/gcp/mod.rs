//! Google Cloud Platform provider implementations
//!
//! - Google Cloud Storage as the ingestion source

mod gcs_store;

pub use gcs_store::GcsObjectStore;
