use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use super::{ListPage, ListRequest, ObjectStore, ObjectSummary, LIST_PAGE_SIZE};
use crate::error::{FetchError, FetchErrorKind};

/// S3-backed object store
#[derive(Clone)]
pub struct S3ObjectStore {
    s3_client: S3Client,
}

impl S3ObjectStore {
    pub fn new(s3_client: S3Client) -> Self {
        Self { s3_client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_page(&self, request: ListRequest<'_>) -> Result<ListPage> {
        let mut call = self
            .s3_client
            .list_objects_v2()
            .bucket(request.bucket)
            .prefix(request.prefix)
            .max_keys(LIST_PAGE_SIZE);

        if let Some(start_after) = request.start_after {
            call = call.start_after(start_after);
        }
        if let Some(token) = request.continuation_token {
            call = call.continuation_token(token);
        }

        let response = call
            .send()
            .await
            .context(format!(
                "Failed to list objects in s3://{}/{}",
                request.bucket, request.prefix
            ))?;

        let objects: Vec<ObjectSummary> = response
            .contents()
            .iter()
            .filter_map(|object| {
                let key = object.key()?;
                Some(ObjectSummary {
                    key: key.to_string(),
                    size_bytes: object.size().unwrap_or(0).max(0) as u64,
                    last_modified: object
                        .last_modified()
                        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())),
                })
            })
            .collect();

        debug!(
            "Listed {} objects from s3://{}/{}",
            objects.len(),
            request.bucket,
            request.prefix
        );

        Ok(ListPage {
            objects,
            next_token: response.next_continuation_token().map(|s| s.to_string()),
        })
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, FetchError> {
        info!("Downloading file: s3://{}/{}", bucket, key);

        let response = self
            .s3_client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                let kind = match err.as_service_error() {
                    Some(service) if service.is_no_such_key() => FetchErrorKind::NotFound,
                    _ if is_access_denied(err.code(), err.raw_response().map(|r| r.status().as_u16())) => {
                        FetchErrorKind::PermissionDenied
                    }
                    _ => FetchErrorKind::Transient,
                };
                FetchError::new(key, kind, aws_sdk_s3::error::DisplayErrorContext(&err))
            })?;

        let mut body = response.body.into_async_read();
        let mut buffer = Vec::new();
        body.read_to_end(&mut buffer)
            .await
            .map_err(|e| FetchError::new(key, FetchErrorKind::Transient, e))?;

        Ok(Bytes::from(buffer))
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<bool> {
        match self.s3_client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) => match err.as_service_error() {
                Some(service) if service.is_not_found() => Ok(false),
                _ => Err(sdk_error(&err))
                    .context(format!("Failed to get metadata for s3://{}/{}", bucket, key)),
            },
        }
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        info!("Uploading {} bytes to s3://{}/{}", body.len(), bucket, key);

        self.s3_client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body.into())
            .content_type(content_type)
            .set_metadata(Some(metadata))
            .send()
            .await
            .context(format!("Failed to upload {} to S3 bucket {}", key, bucket))?;

        Ok(())
    }
}

/// Flatten an SDK error and its source chain into an owned error
fn sdk_error<E: std::error::Error>(err: &E) -> anyhow::Error {
    anyhow::anyhow!("{}", aws_sdk_s3::error::DisplayErrorContext(err))
}

fn is_access_denied(code: Option<&str>, status: Option<u16>) -> bool {
    matches!(code, Some("AccessDenied") | Some("Forbidden")) || status == Some(403)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_denied_classification() {
        assert!(is_access_denied(Some("AccessDenied"), None));
        assert!(is_access_denied(None, Some(403)));
        assert!(!is_access_denied(Some("SlowDown"), Some(503)));
        assert!(!is_access_denied(None, None));
    }

    #[test]
    fn test_sdk_error_outlives_borrowed_source() {
        let err = {
            let source = std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out");
            sdk_error(&source)
        };
        assert!(err.to_string().contains("connect timed out"));
    }
}
