//! Object store abstraction used by discovery, fetching and summary output.

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::FetchError;

pub use memory::InMemoryObjectStore;
pub use s3::S3ObjectStore;

/// Maximum keys requested per listing page
pub const LIST_PAGE_SIZE: i32 = 1000;

/// One entry of a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A single page from a paginated listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectSummary>,
    /// Token for the following page, `None` once the listing is exhausted
    pub next_token: Option<String>,
}

/// Parameters of one listing call
#[derive(Debug, Clone, Copy)]
pub struct ListRequest<'a> {
    pub bucket: &'a str,
    pub prefix: &'a str,
    /// Only keys strictly after this one are returned
    pub start_after: Option<&'a str>,
    pub continuation_token: Option<&'a str>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one page of keys in the store's native (lexicographic) order
    async fn list_page(&self, request: ListRequest<'_>) -> anyhow::Result<ListPage>;

    /// Read an object's full content
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, FetchError>;

    /// Whether an object exists
    async fn head(&self, bucket: &str, key: &str) -> anyhow::Result<bool>;

    /// Write an object with user metadata
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> anyhow::Result<()>;
}
