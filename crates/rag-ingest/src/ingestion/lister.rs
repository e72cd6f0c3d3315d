//! Paginated, memory-bounded enumeration of the object store

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;

use crate::error::Result;
use crate::providers::ObjectStoreProvider;
use crate::types::ObjectPage;

/// Where the listing is between pages
enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Pulls one listing page at a time from an object store
///
/// Only the current page is held in memory. A page-fetch error ends the
/// stream after it is yielded; there is no mid-listing resume.
pub struct ObjectLister {
    store: Arc<dyn ObjectStoreProvider>,
    page_size: usize,
}

impl ObjectLister {
    /// Create a lister over `store`
    pub fn new(store: Arc<dyn ObjectStoreProvider>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Lazily stream the pages under `prefix`
    pub fn stream(&self, prefix: &str) -> BoxStream<'static, Result<ObjectPage>> {
        let store = self.store.clone();
        let prefix = prefix.to_string();
        let page_size = self.page_size;

        stream::try_unfold(Cursor::Start, move |cursor| {
            next_page(store.clone(), prefix.clone(), page_size, cursor)
        })
        .boxed()
    }
}

async fn next_page(
    store: Arc<dyn ObjectStoreProvider>,
    prefix: String,
    page_size: usize,
    cursor: Cursor,
) -> Result<Option<(ObjectPage, Cursor)>> {
    let token = match cursor {
        Cursor::Done => return Ok(None),
        Cursor::Start => None,
        Cursor::Next(token) => Some(token),
    };

    let page = store.list_page(&prefix, token.as_deref(), page_size).await?;

    tracing::debug!(
        "Listed page of {} objects from {} (more: {})",
        page.len(),
        store.name(),
        page.next_token.is_some()
    );

    let next = match &page.next_token {
        Some(next) if token.as_deref() != Some(next.as_str()) => Cursor::Next(next.clone()),
        Some(next) => {
            tracing::warn!("Object store repeated page token '{}', stopping", next);
            Cursor::Done
        }
        None => Cursor::Done,
    };

    Ok(Some((page, next)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::ObjectDescriptor;
    use async_trait::async_trait;
    use futures::TryStreamExt;
    use parking_lot::Mutex;

    /// Serves fixed pages; optionally fails on one page index
    struct PagedStore {
        pages: Vec<Vec<&'static str>>,
        fail_on: Option<usize>,
        requests: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl ObjectStoreProvider for PagedStore {
        async fn list_page(
            &self,
            _prefix: &str,
            page_token: Option<&str>,
            _page_size: usize,
        ) -> Result<ObjectPage> {
            self.requests.lock().push(page_token.map(|t| t.to_string()));
            let index: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
            if self.fail_on == Some(index) {
                return Err(Error::object_store("listing unavailable"));
            }
            let objects = self.pages[index]
                .iter()
                .map(|key| ObjectDescriptor::new(*key, key, 1, "text/plain"))
                .collect();
            let next_token = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
            Ok(ObjectPage { objects, next_token })
        }

        async fn get_object(&self, _key: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "paged"
        }
    }

    #[tokio::test]
    async fn test_streams_every_page_in_order() {
        let store = Arc::new(PagedStore {
            pages: vec![vec!["a", "b"], vec!["c"], vec![]],
            fail_on: None,
            requests: Mutex::new(Vec::new()),
        });
        let lister = ObjectLister::new(store.clone(), 2);

        let pages: Vec<ObjectPage> = lister.stream("").try_collect().await.unwrap();
        let sizes: Vec<usize> = pages.iter().map(|p| p.len()).collect();
        assert_eq!(sizes, vec![2, 1, 0]);
        assert_eq!(
            *store.requests.lock(),
            vec![None, Some("1".to_string()), Some("2".to_string())]
        );
    }

    #[tokio::test]
    async fn test_page_error_ends_stream() {
        let store = Arc::new(PagedStore {
            pages: vec![vec!["a"], vec!["b"], vec!["c"]],
            fail_on: Some(1),
            requests: Mutex::new(Vec::new()),
        });
        let lister = ObjectLister::new(store, 10);

        let results: Vec<Result<ObjectPage>> = lister.stream("").collect().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(Error::ObjectStore(_))));
    }
}
