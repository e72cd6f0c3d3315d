//! Identity-based existence checks against the vector store
//!
//! An object whose content identity already has records in the store is
//! skipped. Identities are normalized identically on the write path
//! (`ObjectDescriptor::new`) and the read path (here), so a quoted hash from
//! one store and a bare hash from another compare equal.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::Result;
use crate::providers::VectorStoreProvider;
use crate::types::{ObjectDescriptor, ObjectPage};

/// Canonical form of a content identity
///
/// Trims whitespace, drops a weak-validator `W/` prefix and strips
/// surrounding quote characters. An all-quote input yields an empty string.
pub fn normalize_identity(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("W/").unwrap_or(trimmed);
    trimmed
        .trim_matches(|c: char| c == '"' || c == '\'')
        .trim()
        .to_string()
}

/// Existence checks against the vector store's identity field
pub struct DedupIndex {
    store: Arc<dyn VectorStoreProvider>,
    batch_size: usize,
}

impl DedupIndex {
    /// Create an index issuing at most `batch_size` identities per query
    pub fn new(store: Arc<dyn VectorStoreProvider>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Subset of `identities` that already has at least one stored record
    ///
    /// A store error aborts the whole check; nothing is reported as existing
    /// on a partial answer.
    pub async fn find_existing(&self, identities: &HashSet<String>) -> Result<HashSet<String>> {
        let mut wanted: Vec<String> = identities
            .iter()
            .map(|id| normalize_identity(id))
            .filter(|id| !id.is_empty())
            .collect();
        wanted.sort();
        wanted.dedup();

        let mut existing = HashSet::new();
        for batch in wanted.chunks(self.batch_size) {
            existing.extend(self.query_batch(batch).await?);
        }

        tracing::debug!(
            "Dedup check: {} of {} identities already stored",
            existing.len(),
            wanted.len()
        );

        Ok(existing)
    }

    /// Resolve one batch, re-querying while the row limit may have hidden hits
    ///
    /// Stores return one row per stored chunk, so a row limit equal to the
    /// batch length can be filled by a single identity. Identities not yet
    /// seen are asked for again until a query comes back short.
    async fn query_batch(&self, batch: &[String]) -> Result<HashSet<String>> {
        let mut found = HashSet::new();
        let mut remaining: Vec<String> = batch.to_vec();

        while !remaining.is_empty() {
            let limit = remaining.len();
            let rows = self.store.query_identities(&remaining, limit).await?;
            let row_count = rows.len();

            let requested: HashSet<&str> = remaining.iter().map(|s| s.as_str()).collect();
            let mut progressed = false;
            for row in rows {
                let identity = normalize_identity(&row);
                if requested.contains(identity.as_str()) && found.insert(identity) {
                    progressed = true;
                }
            }

            if row_count < limit || !progressed {
                break;
            }
            remaining.retain(|id| !found.contains(id));
        }

        Ok(found)
    }

    /// Split a listing page into objects to skip and objects to ingest
    pub async fn partition_page(&self, page: ObjectPage) -> Result<PagePartition> {
        let grouped = group_by_identity(page.objects);
        let identities: HashSet<String> = grouped.groups.keys().cloned().collect();
        let existing = self.find_existing(&identities).await?;

        let mut partition = PagePartition {
            unidentified: grouped.unidentified,
            ..Default::default()
        };

        for identity in grouped.order {
            let Some(objects) = grouped.groups.get(&identity) else {
                continue;
            };
            if existing.contains(&identity) {
                partition.skip.extend(objects.iter().cloned());
            } else {
                partition.ingest.extend(objects.iter().cloned());
            }
        }

        Ok(partition)
    }
}

/// Dedup decision for every descriptor of one page
#[derive(Debug, Default)]
pub struct PagePartition {
    /// Identity already stored
    pub skip: Vec<ObjectDescriptor>,
    /// Identity not stored; every key sharing it is ingested
    pub ingest: Vec<ObjectDescriptor>,
    /// No usable identity was supplied
    pub unidentified: Vec<ObjectDescriptor>,
}

impl PagePartition {
    /// Number of descriptors across all three groups
    pub fn len(&self) -> usize {
        self.skip.len() + self.ingest.len() + self.unidentified.len()
    }

    /// Whether the partition holds no descriptors
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct IdentityGroups {
    /// Identities in first-seen order
    order: Vec<String>,
    groups: HashMap<String, Vec<ObjectDescriptor>>,
    unidentified: Vec<ObjectDescriptor>,
}

fn group_by_identity(objects: Vec<ObjectDescriptor>) -> IdentityGroups {
    let mut order = Vec::new();
    let mut groups: HashMap<String, Vec<ObjectDescriptor>> = HashMap::new();
    let mut unidentified = Vec::new();

    for object in objects {
        if !object.has_identity() {
            unidentified.push(object);
            continue;
        }
        let identity = object.content_identity.clone();
        groups
            .entry(identity.clone())
            .or_insert_with(|| {
                order.push(identity);
                Vec::new()
            })
            .push(object);
    }

    IdentityGroups {
        order,
        groups,
        unidentified,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::providers::LocalVectorStore;
    use crate::types::IndexedRecord;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    /// Store holding `rows_per_identity` rows for each known identity,
    /// returned quoted and truncated to the requested limit
    struct ChunkedStore {
        known: HashSet<String>,
        rows_per_identity: usize,
        queries: Mutex<Vec<usize>>,
        fail: bool,
    }

    impl ChunkedStore {
        fn new(known: &[&str], rows_per_identity: usize) -> Self {
            Self {
                known: known.iter().map(|s| s.to_string()).collect(),
                rows_per_identity,
                queries: Mutex::new(Vec::new()),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl VectorStoreProvider for ChunkedStore {
        async fn ensure_collection(&self, _dimensions: usize) -> Result<()> {
            Ok(())
        }

        async fn query_identities(&self, identities: &[String], limit: usize) -> Result<Vec<String>> {
            self.queries.lock().push(identities.len());
            if self.fail {
                return Err(Error::vector_db("query failed"));
            }
            let mut rows = Vec::new();
            for id in identities {
                if self.known.contains(id) {
                    for _ in 0..self.rows_per_identity {
                        rows.push(format!("\"{}\"", id));
                    }
                }
            }
            rows.truncate(limit);
            Ok(rows)
        }

        async fn insert_records(&self, records: &[IndexedRecord]) -> Result<usize> {
            Ok(records.len())
        }

        async fn len(&self) -> Result<usize> {
            Ok(self.known.len() * self.rows_per_identity)
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "chunked"
        }
    }

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn descriptor(key: &str, identity: &str) -> ObjectDescriptor {
        ObjectDescriptor::new(key, identity, 1, "application/pdf")
    }

    #[test]
    fn test_normalize_identity() {
        assert_eq!(normalize_identity("\"abc\""), "abc");
        assert_eq!(normalize_identity("  'abc'  "), "abc");
        assert_eq!(normalize_identity("W/\"abc\""), "abc");
        assert_eq!(normalize_identity("abc"), "abc");
        assert_eq!(normalize_identity("\"\""), "");
        assert_eq!(normalize_identity("   "), "");
    }

    #[tokio::test]
    async fn test_many_chunks_per_identity_do_not_hide_hits() {
        // three identities stored, ten rows each: one query of limit 4 can
        // only ever surface the first
        let store = Arc::new(ChunkedStore::new(&["a", "b", "c"], 10));
        let index = DedupIndex::new(store.clone(), 4);

        let found = index.find_existing(&set(&["a", "b", "c", "d"])).await.unwrap();
        assert_eq!(found, set(&["a", "b", "c"]));
        assert!(store.queries.lock().len() > 1);
    }

    #[tokio::test]
    async fn test_sub_batches_respect_batch_size() {
        let store = Arc::new(ChunkedStore::new(&["id3"], 1));
        let index = DedupIndex::new(store.clone(), 2);

        let wanted: HashSet<String> = (0..5).map(|i| format!("id{}", i)).collect();
        let found = index.find_existing(&wanted).await.unwrap();

        assert_eq!(found, set(&["id3"]));
        let queries = store.queries.lock();
        assert_eq!(queries.len(), 3);
        assert!(queries.iter().all(|&n| n <= 2));
    }

    #[tokio::test]
    async fn test_quoted_query_input_matches_bare_rows() {
        let store = LocalVectorStore::in_memory().unwrap();
        store
            .insert_records(&[IndexedRecord {
                content_identity: "abc".to_string(),
                source_key: "a.pdf".to_string(),
                chunk_index: 0,
                text: "t".to_string(),
                vector: vec![1.0],
            }])
            .await
            .unwrap();
        let index = DedupIndex::new(Arc::new(store), 10);

        let found = index.find_existing(&set(&["\"abc\"", "xyz"])).await.unwrap();
        assert_eq!(found, set(&["abc"]));
    }

    #[tokio::test]
    async fn test_empty_input_issues_no_query() {
        let store = Arc::new(ChunkedStore::new(&["a"], 1));
        let index = DedupIndex::new(store.clone(), 10);

        assert!(index.find_existing(&HashSet::new()).await.unwrap().is_empty());
        assert!(store.queries.lock().is_empty());
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let mut store = ChunkedStore::new(&["a"], 1);
        store.fail = true;
        let index = DedupIndex::new(Arc::new(store), 10);

        let result = index.find_existing(&set(&["a"])).await;
        assert!(matches!(result, Err(Error::VectorDb(_))));
    }

    #[tokio::test]
    async fn test_partition_groups_shared_identity() {
        let store = Arc::new(ChunkedStore::new(&["old"], 3));
        let index = DedupIndex::new(store, 10);

        let page = ObjectPage {
            objects: vec![
                descriptor("a.pdf", "\"old\""),
                descriptor("b.pdf", "new"),
                descriptor("c.pdf", "\"new\""),
                descriptor("d.pdf", "\"\""),
            ],
            next_token: None,
        };

        let partition = index.partition_page(page).await.unwrap();
        let keys = |v: &[ObjectDescriptor]| v.iter().map(|o| o.key.clone()).collect::<Vec<_>>();
        assert_eq!(keys(&partition.skip), vec!["a.pdf"]);
        assert_eq!(keys(&partition.ingest), vec!["b.pdf", "c.pdf"]);
        assert_eq!(keys(&partition.unidentified), vec!["d.pdf"]);
        assert_eq!(partition.len(), 4);
    }

    proptest! {
        #[test]
        fn prop_find_existing_is_exact_and_distributes_over_union(
            stored in proptest::collection::hash_set("[a-f]{1,3}", 0..12),
            left in proptest::collection::hash_set("[a-f]{1,3}", 0..12),
            right in proptest::collection::hash_set("[a-f]{1,3}", 0..12),
            rows in 1usize..5,
            batch in 1usize..6,
        ) {
            let known: Vec<&str> = stored.iter().map(|s| s.as_str()).collect();
            let index = DedupIndex::new(Arc::new(ChunkedStore::new(&known, rows)), batch);

            let union: HashSet<String> = left.union(&right).cloned().collect();
            let found_union = tokio_test::block_on(index.find_existing(&union)).unwrap();
            let found_left = tokio_test::block_on(index.find_existing(&left)).unwrap();
            let found_right = tokio_test::block_on(index.find_existing(&right)).unwrap();

            let expected: HashSet<String> = union.intersection(&stored).cloned().collect();
            prop_assert_eq!(&found_union, &expected);
            let combined: HashSet<String> = found_left.union(&found_right).cloned().collect();
            prop_assert_eq!(found_union, combined);
        }
    }
}
