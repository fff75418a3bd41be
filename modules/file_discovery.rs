use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::ListingError;
use crate::object_store::{ListRequest, ObjectStore, ObjectSummary};

/// Extensions accepted by default (compared case-insensitively)
pub const DEFAULT_EXTENSIONS: [&str; 3] = ["txt", "log", "md"];

/// Suffix of summary output objects
pub const OUTPUT_SUFFIX: &str = ".json";

/// Where a job's summary outputs live relative to its source prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    prefix: String,
    output_prefix: String,
}

impl OutputLayout {
    pub fn new(prefix: &str, output_dir: &str) -> Self {
        let output_dir = output_dir.trim_matches('/');
        let separator = if prefix.is_empty() || prefix.ends_with('/') { "" } else { "/" };
        Self {
            prefix: prefix.to_string(),
            output_prefix: format!("{}{}{}/", prefix, separator, output_dir),
        }
    }

    /// Source key relative to the job prefix, without a leading slash
    fn relative<'a>(&self, source_key: &'a str) -> &'a str {
        source_key
            .strip_prefix(&self.prefix)
            .unwrap_or(source_key)
            .trim_start_matches('/')
    }

    /// Key prefix under which summary outputs are written
    pub fn output_prefix(&self) -> &str {
        &self.output_prefix
    }

    pub fn contains(&self, key: &str) -> bool {
        key.starts_with(&self.output_prefix)
    }

    /// `docs/a/b.txt` under prefix `docs/` maps to `docs/summaries/a/b.txt.json`
    pub fn output_key(&self, source_key: &str) -> String {
        format!("{}{}{}", self.output_prefix, self.relative(source_key), OUTPUT_SUFFIX)
    }

    /// Inverse of [`OutputLayout::output_key`]; `None` for non-summary entries
    pub fn source_key(&self, output_key: &str) -> Option<String> {
        let relative = output_key
            .strip_prefix(&self.output_prefix)?
            .strip_suffix(OUTPUT_SUFFIX)?;
        if relative.is_empty() {
            return None;
        }
        if self.prefix.is_empty() || self.prefix.ends_with('/') {
            Some(format!("{}{}", self.prefix, relative))
        } else {
            Some(format!("{}/{}", self.prefix, relative))
        }
    }

    pub fn report_key(&self) -> String {
        format!("{}report.md", self.output_prefix)
    }
}

/// Decides which listed keys enter processing
#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    extensions: Vec<String>,
    layout: OutputLayout,
    deny_list: HashSet<String>,
}

impl EligibilityFilter {
    pub fn new<I, S>(extensions: I, layout: OutputLayout, deny_list: HashSet<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            layout,
            deny_list,
        }
    }

    pub fn is_eligible(&self, key: &str) -> bool {
        // Skip directory markers
        if key.ends_with('/') {
            return false;
        }
        if self.layout.contains(key) || self.deny_list.contains(key) {
            return false;
        }
        let lower = key.to_ascii_lowercase();
        self.extensions
            .iter()
            .any(|ext| lower.ends_with(&format!(".{}", ext)))
    }
}

/// Lazy, finite sequence of eligible keys under a bucket/prefix.
///
/// Pages are fetched on demand; the sequence ends after `max_files` keys or
/// when the store reports no further pages.
pub struct ObjectLister {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    filter: EligibilityFilter,
    max_files: usize,
    start_after: Option<String>,
    buffer: VecDeque<ObjectSummary>,
    continuation_token: Option<String>,
    pages_exhausted: bool,
    yielded: usize,
}

impl ObjectLister {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: &str,
        prefix: &str,
        filter: EligibilityFilter,
        max_files: usize,
    ) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            filter,
            max_files,
            start_after: None,
            buffer: VecDeque::new(),
            continuation_token: None,
            pages_exhausted: false,
            yielded: 0,
        }
    }

    /// Resume strictly after `checkpoint`
    pub fn start_after(mut self, checkpoint: Option<String>) -> Self {
        self.start_after = checkpoint;
        self
    }

    pub fn yielded(&self) -> usize {
        self.yielded
    }

    /// Next eligible key, `Ok(None)` once the sequence is finished
    pub async fn next_key(&mut self) -> Result<Option<String>, ListingError> {
        loop {
            if self.yielded >= self.max_files {
                return Ok(None);
            }

            if let Some(object) = self.buffer.pop_front() {
                if self.filter.is_eligible(&object.key) {
                    self.yielded += 1;
                    return Ok(Some(object.key));
                }
                debug!("Skipping ineligible object: {}", object.key);
                continue;
            }

            if self.pages_exhausted {
                if self.yielded == 0 {
                    warn!(
                        "No eligible files found in s3://{}/{}",
                        self.bucket, self.prefix
                    );
                }
                return Ok(None);
            }

            self.fetch_page().await?;
        }
    }

    async fn fetch_page(&mut self) -> Result<(), ListingError> {
        let request = ListRequest {
            bucket: &self.bucket,
            prefix: &self.prefix,
            start_after: self.start_after.as_deref(),
            continuation_token: self.continuation_token.as_deref(),
        };

        let page = self
            .store
            .list_page(request)
            .await
            .map_err(|e| ListingError::new(&self.bucket, &self.prefix, e))?;

        info!(
            "Listed page of {} objects in s3://{}/{}",
            page.objects.len(),
            self.bucket,
            self.prefix
        );

        self.buffer.extend(page.objects);
        self.continuation_token = page.next_token;
        self.pages_exhausted = self.continuation_token.is_none();
        Ok(())
    }
}

/// Locate the resume cursor for a prefix from its summary outputs.
///
/// Picks the most recently modified summary output and returns the source
/// key it was written for. Returns `None` when no outputs exist yet.
pub async fn find_checkpoint(
    store: &dyn ObjectStore,
    bucket: &str,
    layout: &OutputLayout,
) -> Result<Option<String>, ListingError> {
    let output_prefix = layout.output_prefix();
    let mut latest: Option<ObjectSummary> = None;
    let mut token: Option<String> = None;

    loop {
        let page = store
            .list_page(ListRequest {
                bucket,
                prefix: output_prefix,
                start_after: None,
                continuation_token: token.as_deref(),
            })
            .await
            .map_err(|e| ListingError::new(bucket, output_prefix, e))?;

        for object in page.objects {
            if layout.source_key(&object.key).is_none() {
                continue;
            }
            let newer = match &latest {
                Some(current) => object.last_modified > current.last_modified,
                None => true,
            };
            if newer {
                latest = Some(object);
            }
        }

        token = page.next_token;
        if token.is_none() {
            break;
        }
    }

    let checkpoint = latest.and_then(|object| layout.source_key(&object.key));
    if let Some(key) = &checkpoint {
        info!("Resuming s3://{}/{} after checkpoint {}", bucket, output_prefix, key);
    }
    Ok(checkpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::InMemoryObjectStore;

    fn filter(prefix: &str) -> EligibilityFilter {
        EligibilityFilter::new(
            DEFAULT_EXTENSIONS,
            OutputLayout::new(prefix, "summaries"),
            HashSet::from(["docs/corrupt.txt".to_string()]),
        )
    }

    #[test]
    fn test_eligibility_rules() {
        let filter = filter("docs/");
        assert!(filter.is_eligible("docs/a.txt"));
        assert!(filter.is_eligible("docs/notes.MD"));
        assert!(filter.is_eligible("docs/server.log"));
        assert!(!filter.is_eligible("docs/image.png"));
        assert!(!filter.is_eligible("docs/nested/"));
        assert!(!filter.is_eligible("docs/summaries/a.txt"));
        assert!(!filter.is_eligible("docs/corrupt.txt"));
    }

    #[test]
    fn test_output_layout_round_trip() {
        let layout = OutputLayout::new("docs/", "/summaries/");
        assert_eq!(layout.output_prefix(), "docs/summaries/");
        assert_eq!(layout.output_key("docs/2020/a.txt"), "docs/summaries/2020/a.txt.json");
        assert_eq!(
            layout.source_key("docs/summaries/2020/a.txt.json").as_deref(),
            Some("docs/2020/a.txt")
        );
        assert_eq!(layout.source_key("docs/summaries/report.md"), None);
        assert_eq!(layout.source_key("docs/other/a.txt.json"), None);
    }

    #[test]
    fn test_output_layout_for_prefix_without_slash() {
        let layout = OutputLayout::new("docs", "summaries");
        assert_eq!(layout.output_prefix(), "docs/summaries/");
        assert_eq!(layout.output_key("docs/a.txt"), "docs/summaries/a.txt.json");
        assert_eq!(
            layout.source_key("docs/summaries/a.txt.json").as_deref(),
            Some("docs/a.txt")
        );
        assert_eq!(layout.report_key(), "docs/summaries/report.md");

        let filter = EligibilityFilter::new(DEFAULT_EXTENSIONS, layout, HashSet::new());
        assert!(filter.is_eligible("docssummaries/x.txt"));
        assert!(!filter.is_eligible("docs/summaries/a.txt"));
    }

    #[test]
    fn test_output_layout_for_empty_prefix() {
        let layout = OutputLayout::new("", "summaries");
        assert_eq!(layout.output_key("a.txt"), "summaries/a.txt.json");
        assert_eq!(layout.source_key("summaries/a.txt.json").as_deref(), Some("a.txt"));
    }

    #[tokio::test]
    async fn test_lister_spans_pages_and_stops_at_max_files() {
        let store = Arc::new(InMemoryObjectStore::with_page_size(2));
        for key in ["docs/a.txt", "docs/b.png", "docs/c.md", "docs/d.log", "docs/e.txt"] {
            store.insert("bucket", key, "content");
        }

        let mut lister = ObjectLister::new(store, "bucket", "docs/", filter("docs/"), 3);
        let mut keys = Vec::new();
        while let Some(key) = lister.next_key().await.unwrap() {
            keys.push(key);
        }

        assert_eq!(keys, vec!["docs/a.txt", "docs/c.md", "docs/d.log"]);
        assert_eq!(lister.yielded(), 3);
    }

    #[tokio::test]
    async fn test_lister_resumes_after_checkpoint() {
        let store = Arc::new(InMemoryObjectStore::new());
        for key in ["docs/a.txt", "docs/b.txt", "docs/c.txt"] {
            store.insert("bucket", key, "content");
        }

        let mut lister = ObjectLister::new(store, "bucket", "docs/", filter("docs/"), 10)
            .start_after(Some("docs/a.txt".to_string()));
        assert_eq!(lister.next_key().await.unwrap().as_deref(), Some("docs/b.txt"));
        assert_eq!(lister.next_key().await.unwrap().as_deref(), Some("docs/c.txt"));
        assert_eq!(lister.next_key().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_listing_failure_is_surfaced() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.fail_listing("AccessDenied");

        let mut lister = ObjectLister::new(store, "bucket", "docs/", filter("docs/"), 10);
        let err = lister.next_key().await.unwrap_err();
        assert!(err.to_string().contains("AccessDenied"));
    }

    #[tokio::test]
    async fn test_checkpoint_is_most_recent_output() {
        let store = InMemoryObjectStore::with_page_size(1);
        store.insert("bucket", "docs/summaries/c.txt.json", "{}");
        store.insert("bucket", "docs/summaries/a.txt.json", "{}");
        store.insert("bucket", "docs/summaries/report.md", "# report");

        let layout = OutputLayout::new("docs/", "summaries");
        let checkpoint = find_checkpoint(&store, "bucket", &layout).await.unwrap();
        assert_eq!(checkpoint.as_deref(), Some("docs/a.txt"));
    }

    #[tokio::test]
    async fn test_no_checkpoint_without_outputs() {
        let store = InMemoryObjectStore::new();
        store.insert("bucket", "docs/a.txt", "content");
        let layout = OutputLayout::new("docs/", "summaries");
        assert_eq!(find_checkpoint(&store, "bucket", &layout).await.unwrap(), None);
    }
}
