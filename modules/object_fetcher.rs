use bytes::Bytes;
use std::sync::Arc;
use tracing::{error, info};

use crate::error::{DecodeError, FetchError};
use crate::object_store::ObjectStore;

/// Why an object could not be turned into text
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Retrieves single objects and decodes them as UTF-8
#[derive(Clone)]
pub struct ObjectFetcher {
    store: Arc<dyn ObjectStore>,
}

impl ObjectFetcher {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub async fn fetch(&self, bucket: &str, key: &str) -> Result<Bytes, FetchError> {
        self.store.get(bucket, key).await.inspect_err(|e| {
            error!("Error retrieving file content for {}: {}", key, e);
        })
    }

    pub async fn fetch_text(&self, bucket: &str, key: &str) -> Result<String, ObjectError> {
        let bytes = self.fetch(bucket, key).await?;
        let text = decode_utf8(key, bytes)?;
        info!("Retrieved content for {} (length: {})", key, text.len());
        Ok(text)
    }
}

pub fn decode_utf8(key: &str, bytes: Bytes) -> Result<String, DecodeError> {
    String::from_utf8(bytes.to_vec()).map_err(|source| DecodeError {
        key: key.to_string(),
        source,
    })
}
