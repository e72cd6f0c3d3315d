//! Vector store provider trait for existence queries and batch inserts

use async_trait::async_trait;

use crate::error::Result;
use crate::types::IndexedRecord;

/// Trait for the vector index the pipeline writes into
///
/// Implementations:
/// - `LocalVectorStore`: SQLite record table
/// - `MilvusVectorStore`: Milvus REST API
#[async_trait]
pub trait VectorStoreProvider: Send + Sync {
    /// Create the collection if it does not exist and make it queryable
    async fn ensure_collection(&self, dimensions: usize) -> Result<()>;

    /// Return identity values of stored records whose identity is in `identities`
    ///
    /// At most `limit` rows are returned. Rows may repeat an identity (one row
    /// per stored chunk); callers must not assume distinct values.
    async fn query_identities(&self, identities: &[String], limit: usize) -> Result<Vec<String>>;

    /// Insert all records of one object in a single call
    ///
    /// Returns the number of records inserted.
    async fn insert_records(&self, records: &[IndexedRecord]) -> Result<usize>;

    /// Get total number of records stored
    async fn len(&self) -> Result<usize>;

    /// Check if store is empty
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Check if the provider is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
