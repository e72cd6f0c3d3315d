//! Object store descriptors

use serde::{Deserialize, Serialize};

use crate::ingestion::normalize_identity;

/// One stored object as reported by a listing page
///
/// The content identity is normalized on construction, so the value carried
/// here is the same one written to and queried from the vector store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    /// Object key (path within the bucket)
    pub key: String,
    /// Normalized content hash supplied by the store
    pub content_identity: String,
    /// Size in bytes
    pub size: u64,
    /// MIME type reported by the store
    pub content_type: String,
}

impl ObjectDescriptor {
    /// Create a descriptor, normalizing the raw identity
    pub fn new(
        key: impl Into<String>,
        raw_identity: &str,
        size: u64,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            content_identity: normalize_identity(raw_identity),
            size,
            content_type: content_type.into(),
        }
    }

    /// Whether the store supplied a usable identity for this object
    pub fn has_identity(&self) -> bool {
        !self.content_identity.is_empty()
    }
}

/// A single page of a listing
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    /// Descriptors in this page, in store order
    pub objects: Vec<ObjectDescriptor>,
    /// Opaque token for the next page, `None` when the listing is exhausted
    pub next_token: Option<String>,
}

impl ObjectPage {
    /// Number of descriptors in the page
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the page carries no descriptors
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
