//! Object store provider trait for listing and downloading stored objects

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ObjectPage;

/// Trait for a paginated, read-only object store
///
/// Implementations:
/// - `LocalObjectStore`: Directory tree on the local filesystem
/// - `GcsObjectStore`: Google Cloud Storage
#[async_trait]
pub trait ObjectStoreProvider: Send + Sync {
    /// Fetch one listing page
    ///
    /// `page_token` is the opaque `next_token` of the previous page, `None`
    /// for the first page. A page holds at most `page_size` descriptors.
    async fn list_page(
        &self,
        prefix: &str,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<ObjectPage>;

    /// Download an object's bytes
    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    /// Check if the provider is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
