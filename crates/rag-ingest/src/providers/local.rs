//! Local provider implementations using the filesystem and SQLite
//!
//! `LocalObjectStore` treats a directory tree as a bucket; `LocalVectorStore`
//! keeps records in a SQLite file.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::storage::RecordDb;
use crate::types::{IndexedRecord, ObjectDescriptor, ObjectPage};

use super::object_store::ObjectStoreProvider;
use super::vector_store::VectorStoreProvider;

/// Directory tree exposed as a paginated object store
///
/// Keys are `/`-separated paths relative to the root, listed in
/// lexicographic order. The page token is the last key of the previous
/// page. Content identity is the hex SHA-256 of the file bytes.
pub struct LocalObjectStore {
    /// Directory holding the objects
    root: PathBuf,
}

impl LocalObjectStore {
    /// Create a new local object store
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Resolve a key to a path under the root, refusing traversal
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(Error::object_store(format!("Invalid object key: {}", key)));
        }
        Ok(self.root.join(relative))
    }

    /// Keys after `after` that start with `prefix`, at most `limit + 1` of them
    fn collect_keys(&self, prefix: &str, after: Option<&str>, limit: usize) -> Result<Vec<String>> {
        let mut keys = BTreeSet::new();

        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| Error::object_store(format!("Listing failed: {}", e)))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if !key.starts_with(prefix) || after.is_some_and(|a| key.as_str() <= a) {
                continue;
            }

            keys.insert(key);
            if keys.len() > limit + 1 {
                keys.pop_last();
            }
        }

        Ok(keys.into_iter().collect())
    }

    fn describe(&self, key: &str) -> Result<ObjectDescriptor> {
        let path = self.object_path(key)?;
        let data = std::fs::read(&path)
            .map_err(|e| Error::object_store(format!("Failed to read {}: {}", key, e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&data);
        let identity = hex::encode(hasher.finalize());

        let content_type = mime_guess::from_path(key).first_or_octet_stream().to_string();

        Ok(ObjectDescriptor::new(key, &identity, data.len() as u64, content_type))
    }
}

#[async_trait]
impl ObjectStoreProvider for LocalObjectStore {
    async fn list_page(
        &self,
        prefix: &str,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<ObjectPage> {
        let page_size = page_size.max(1);
        let store = Self {
            root: self.root.clone(),
        };
        let prefix = prefix.to_string();
        let after = page_token.map(|t| t.to_string());

        tokio::task::spawn_blocking(move || {
            let mut keys = store.collect_keys(&prefix, after.as_deref(), page_size)?;
            let has_more = keys.len() > page_size;
            keys.truncate(page_size);

            let objects = keys
                .iter()
                .map(|key| store.describe(key))
                .collect::<Result<Vec<_>>>()?;

            let next_token = if has_more { keys.last().cloned() } else { None };

            Ok(ObjectPage { objects, next_token })
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::object_store(format!("Failed to read object {}: {}", key, e)))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.root.is_dir())
    }

    fn name(&self) -> &str {
        "local-filesystem"
    }
}

/// Local vector store backed by a SQLite record table
pub struct LocalVectorStore {
    db: Arc<RecordDb>,
}

impl LocalVectorStore {
    /// Create from an existing database
    pub fn new(db: Arc<RecordDb>) -> Self {
        Self { db }
    }

    /// Open (or create) the database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Arc::new(RecordDb::new(path)?)))
    }

    /// Create a store over an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Arc::new(RecordDb::in_memory()?)))
    }

    /// Get underlying database for direct access
    pub fn inner(&self) -> &Arc<RecordDb> {
        &self.db
    }
}

#[async_trait]
impl VectorStoreProvider for LocalVectorStore {
    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.ensure_dimension(dimensions))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn query_identities(&self, identities: &[String], limit: usize) -> Result<Vec<String>> {
        let db = self.db.clone();
        let identities = identities.to_vec();
        tokio::task::spawn_blocking(move || db.find_identities(&identities, limit))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn insert_records(&self, records: &[IndexedRecord]) -> Result<usize> {
        let db = self.db.clone();
        let records = records.to_vec();
        tokio::task::spawn_blocking(move || db.insert_records(&records))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn len(&self) -> Result<usize> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.count())
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "local-sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, key: &str, data: &[u8]) {
        let path = root.join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, data).unwrap();
    }

    #[tokio::test]
    async fn test_listing_pages_in_key_order() {
        let dir = tempfile::tempdir().unwrap();
        for key in ["b.pdf", "a.pdf", "docs/c.txt", "docs/d.md", "e.png"] {
            write(dir.path(), key, key.as_bytes());
        }
        let store = LocalObjectStore::new(dir.path().to_path_buf()).unwrap();

        let first = store.list_page("", None, 2).await.unwrap();
        let keys: Vec<_> = first.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a.pdf", "b.pdf"]);
        assert_eq!(first.next_token.as_deref(), Some("b.pdf"));

        let second = store.list_page("", first.next_token.as_deref(), 2).await.unwrap();
        let keys: Vec<_> = second.objects.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["docs/c.txt", "docs/d.md"]);

        let third = store.list_page("", second.next_token.as_deref(), 2).await.unwrap();
        assert_eq!(third.len(), 1);
        assert!(third.next_token.is_none());
    }

    #[tokio::test]
    async fn test_listing_respects_prefix() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "docs/a.pdf", b"a");
        write(dir.path(), "other/b.pdf", b"b");
        let store = LocalObjectStore::new(dir.path().to_path_buf()).unwrap();

        let page = store.list_page("docs/", None, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page.objects[0].key, "docs/a.pdf");
        assert_eq!(page.objects[0].content_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_identical_bytes_share_identity() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "one.txt", b"same bytes");
        write(dir.path(), "two.txt", b"same bytes");
        write(dir.path(), "three.txt", b"other bytes");
        let store = LocalObjectStore::new(dir.path().to_path_buf()).unwrap();

        let page = store.list_page("", None, 10).await.unwrap();
        let identity = |key: &str| {
            page.objects
                .iter()
                .find(|o| o.key == key)
                .map(|o| o.content_identity.clone())
                .unwrap()
        };
        assert_eq!(identity("one.txt"), identity("two.txt"));
        assert_ne!(identity("one.txt"), identity("three.txt"));
        assert_eq!(identity("one.txt").len(), 64);
    }

    #[tokio::test]
    async fn test_get_object_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf()).unwrap();
        assert!(store.get_object("../etc/passwd").await.is_err());
        assert!(store.get_object("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn test_vector_store_round_trip() {
        let store = LocalVectorStore::in_memory().unwrap();
        store.ensure_collection(3).await.unwrap();
        assert!(store.is_empty().await.unwrap());

        let records = vec![IndexedRecord {
            content_identity: "e1".to_string(),
            source_key: "a.pdf".to_string(),
            chunk_index: 0,
            text: "hello".to_string(),
            vector: vec![1.0, 0.0, 0.0],
        }];
        assert_eq!(store.insert_records(&records).await.unwrap(), 1);

        let found = store
            .query_identities(&["e1".to_string(), "e2".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(found, vec!["e1".to_string()]);
    }
}
