use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ListPage, ListRequest, ObjectStore, ObjectSummary};
use crate::error::{FetchError, FetchErrorKind};

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
    pub metadata: HashMap<String, String>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<(String, String), StoredObject>,
    get_failures: HashMap<String, FetchErrorKind>,
    listing_failure: Option<String>,
    put_failures: HashSet<String>,
    writes: u64,
    get_calls: Vec<String>,
}

/// In-memory object store for tests and local runs.
///
/// Keys list in lexicographic order like S3. Every write advances a logical
/// clock by one second so `last_modified` reflects write order.
#[derive(Debug)]
pub struct InMemoryObjectStore {
    inner: Mutex<Inner>,
    page_size: usize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            page_size: page_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        let mut inner = self.lock();
        let last_modified = next_timestamp(&mut inner);
        inner.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                content_type: "text/plain".to_string(),
                metadata: HashMap::new(),
                last_modified,
            },
        );
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Make every `get` of `key` fail with the given kind
    pub fn fail_get(&self, key: &str, kind: FetchErrorKind) {
        self.lock().get_failures.insert(key.to_string(), kind);
    }

    /// Make every listing call fail
    pub fn fail_listing(&self, message: &str) {
        self.lock().listing_failure = Some(message.to_string());
    }

    /// Make every `put` to `key` fail
    pub fn fail_put(&self, key: &str) {
        self.lock().put_failures.insert(key.to_string());
    }

    /// Keys passed to `get`, in call order
    pub fn get_calls(&self) -> Vec<String> {
        self.lock().get_calls.clone()
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

fn next_timestamp(inner: &mut Inner) -> DateTime<Utc> {
    inner.writes += 1;
    let epoch = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default();
    epoch + Duration::seconds(inner.writes as i64)
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_page(&self, request: ListRequest<'_>) -> Result<ListPage> {
        let inner = self.lock();
        if let Some(message) = &inner.listing_failure {
            anyhow::bail!("{}", message);
        }

        // The continuation token is the last key of the previous page.
        let after = request.continuation_token.or(request.start_after);

        let mut matching = inner
            .objects
            .iter()
            .filter(|((bucket, key), _)| {
                bucket == request.bucket
                    && key.starts_with(request.prefix)
                    && after.map_or(true, |after| key.as_str() > after)
            })
            .map(|((_, key), object)| ObjectSummary {
                key: key.clone(),
                size_bytes: object.body.len() as u64,
                last_modified: Some(object.last_modified),
            });

        let objects: Vec<ObjectSummary> = matching.by_ref().take(self.page_size).collect();
        let has_more = matching.next().is_some();
        let next_token = if has_more {
            objects.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage { objects, next_token })
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, FetchError> {
        let mut inner = self.lock();
        inner.get_calls.push(key.to_string());
        if let Some(kind) = inner.get_failures.get(key) {
            return Err(FetchError::new(key, *kind, "injected failure"));
        }
        inner
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.body.clone())
            .ok_or_else(|| FetchError::not_found(key))
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self
            .lock()
            .objects
            .contains_key(&(bucket.to_string(), key.to_string())))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let mut inner = self.lock();
        if inner.put_failures.contains(key) {
            anyhow::bail!("write to s3://{}/{} refused", bucket, key);
        }
        let last_modified = next_timestamp(&mut inner);
        inner.objects.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                metadata,
                last_modified,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pagination_follows_continuation_token() {
        let store = InMemoryObjectStore::with_page_size(2);
        for key in ["p/a.txt", "p/b.txt", "p/c.txt", "q/d.txt"] {
            store.insert("bucket", key, "x");
        }

        let request = ListRequest {
            bucket: "bucket",
            prefix: "p/",
            start_after: None,
            continuation_token: None,
        };
        let first = store.list_page(request).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        assert_eq!(first.next_token.as_deref(), Some("p/b.txt"));

        let second = store
            .list_page(ListRequest {
                continuation_token: first.next_token.as_deref(),
                ..request
            })
            .await
            .unwrap();
        assert_eq!(second.objects.len(), 1);
        assert_eq!(second.objects[0].key, "p/c.txt");
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn test_writes_advance_last_modified() {
        let store = InMemoryObjectStore::new();
        store.insert("b", "one", "1");
        store.insert("b", "two", "2");
        let one = store.object("b", "one").unwrap();
        let two = store.object("b", "two").unwrap();
        assert!(two.last_modified > one.last_modified);
    }
}
