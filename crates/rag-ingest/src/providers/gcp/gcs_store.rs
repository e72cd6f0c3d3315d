//! Google Cloud Storage object store
//!
//! Lists a bucket page by page using the service's own page tokens and
//! downloads objects for extraction.

use async_trait::async_trait;

use google_cloud_storage::client::{Client as GcsClient, ClientConfig};
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::list::ListObjectsRequest;
use google_cloud_storage::http::objects::Object;

use crate::error::{Error, Result};
use crate::providers::object_store::ObjectStoreProvider;
use crate::types::{ObjectDescriptor, ObjectPage};

/// Google Cloud Storage object store
pub struct GcsObjectStore {
    client: GcsClient,
    bucket: String,
}

impl GcsObjectStore {
    /// Create a new GCS object store using application default credentials
    pub async fn new(bucket: String) -> Result<Self> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| Error::Config(format!("Failed to create GCS client: {}", e)))?;

        Ok(Self {
            client: GcsClient::new(config),
            bucket,
        })
    }

    /// Describe a listed object
    ///
    /// The md5 hash is a pure content hash; the etag is used only for
    /// composite objects that carry no md5.
    fn to_descriptor(item: &Object) -> ObjectDescriptor {
        let identity = item.md5_hash.as_deref().unwrap_or(item.etag.as_str());
        let content_type = item
            .content_type
            .clone()
            .unwrap_or_else(|| mime_guess::from_path(&item.name).first_or_octet_stream().to_string());

        ObjectDescriptor::new(
            item.name.clone(),
            identity,
            item.size.max(0) as u64,
            content_type,
        )
    }
}

#[async_trait]
impl ObjectStoreProvider for GcsObjectStore {
    async fn list_page(
        &self,
        prefix: &str,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<ObjectPage> {
        let request = ListObjectsRequest {
            bucket: self.bucket.clone(),
            prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
            page_token: page_token.map(|t| t.to_string()),
            max_results: Some(page_size.min(i32::MAX as usize) as i32),
            ..Default::default()
        };

        let response = self
            .client
            .list_objects(&request)
            .await
            .map_err(|e| Error::object_store(format!("Failed to list GCS objects: {}", e)))?;

        let objects = response
            .items
            .unwrap_or_default()
            .iter()
            .filter(|item| !item.name.ends_with('/'))
            .map(Self::to_descriptor)
            .collect();

        Ok(ObjectPage {
            objects,
            next_token: response.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.client
            .download_object(
                &GetObjectRequest {
                    bucket: self.bucket.clone(),
                    object: key.to_string(),
                    ..Default::default()
                },
                &Range::default(),
            )
            .await
            .map_err(|e| Error::object_store(format!("Failed to download {} from GCS: {}", key, e)))
    }

    async fn health_check(&self) -> Result<bool> {
        let list_request = ListObjectsRequest {
            bucket: self.bucket.clone(),
            max_results: Some(1),
            ..Default::default()
        };

        self.client
            .list_objects(&list_request)
            .await
            .map(|_| true)
            .map_err(|e| Error::object_store(format!("GCS health check failed: {}", e)))
    }

    fn name(&self) -> &str {
        "gcs"
    }
}
