use std::future::Future;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use tracing::warn;

use crate::store::{KvStore, StoreError};

use super::queue::QueueEntry;
use super::types::{CrlMetadata, CrlRecord, PartialRecord, RecordLookup};

/// Prefixes for the three document families sharing the namespace.
pub const META_PREFIX: &str = "CRL_META_";
pub const BLOB_PREFIX: &str = "CRL_DER_";
pub const QUEUE_PREFIX: &str = "QUEUE_";

/// Key for a source's metadata document: prefix + base64url(name).
/// Deterministic, ASCII-safe, and reversible for diagnostics.
pub fn meta_key(name: &str) -> String {
    format!("{META_PREFIX}{}", URL_SAFE_NO_PAD.encode(name))
}

/// Key for a source's raw CRL bytes.
pub fn blob_key(name: &str) -> String {
    format!("{BLOB_PREFIX}{}", URL_SAFE_NO_PAD.encode(name))
}

/// Domain layer over the raw key-value store: record layout, JSON metadata
/// documents, rate-limit retries, and the tolerant blob/metadata pairing
/// rules for readers.
#[derive(Debug, Clone)]
pub struct RecordStore<S> {
    kv: S,
    max_retries: u32,
    backoff: Duration,
}

impl<S: KvStore> RecordStore<S> {
    pub fn new(kv: S) -> Self {
        Self {
            kv,
            max_retries: 3,
            backoff: Duration::from_millis(200),
        }
    }

    /// Overrides the rate-limit retry budget (tests shrink the backoff).
    pub fn with_retry_policy(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    /// Persists a record. The blob goes in first so metadata never points at
    /// bytes that were never written; `blob = None` refreshes the metadata
    /// alone (re-fetch produced identical bytes).
    pub async fn save(
        &self,
        metadata: &CrlMetadata,
        blob: Option<&[u8]>,
    ) -> Result<(), StoreError> {
        if let Some(blob) = blob {
            self.put_with_backoff(&blob_key(&metadata.name), blob)
                .await?;
        }
        let doc = serde_json::to_vec(metadata)?;
        self.put_with_backoff(&meta_key(&metadata.name), &doc).await
    }

    /// Merges a failed attempt into the source's metadata without touching
    /// previously stored CRL fields. Creates a metadata-only document when
    /// the source has no stored state at all.
    pub async fn record_failure(
        &self,
        name: &str,
        url: &str,
        error: &str,
    ) -> Result<(), StoreError> {
        let mut metadata = self
            .load_metadata(name)
            .await?
            .unwrap_or_else(|| CrlMetadata::new(name, url));
        metadata.url = url.to_string();
        metadata.last_error = Some(error.to_string());
        let doc = serde_json::to_vec(&metadata)?;
        self.put_with_backoff(&meta_key(name), &doc).await
    }

    /// Reads a source's metadata document. An undecodable document is logged
    /// and treated as absent, never surfaced as corruption.
    pub async fn load_metadata(&self, name: &str) -> Result<Option<CrlMetadata>, StoreError> {
        let Some(bytes) = self.get_with_backoff(&meta_key(name)).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(metadata) => Ok(Some(metadata)),
            Err(error) => {
                warn!("discarding undecodable metadata for '{name}': {error}");
                Ok(None)
            }
        }
    }

    /// Reads blob and metadata together, tagging exactly what was found. A
    /// crash between the two writes (or deletes) shows up here as `Partial`.
    pub async fn load_record(&self, name: &str) -> Result<RecordLookup, StoreError> {
        let metadata = self.load_metadata(name).await?;
        let blob = self.get_with_backoff(&blob_key(name)).await?;
        Ok(match (metadata, blob) {
            (Some(metadata), Some(raw_blob)) => {
                RecordLookup::Complete(CrlRecord { metadata, raw_blob })
            }
            (Some(metadata), None) => RecordLookup::Partial(PartialRecord::MetadataOnly(metadata)),
            (None, Some(_)) => RecordLookup::Partial(PartialRecord::BlobOnly),
            (None, None) => RecordLookup::Absent,
        })
    }

    /// All decodable metadata documents currently stored.
    pub async fn list_metadata(&self) -> Result<Vec<CrlMetadata>, StoreError> {
        let keys = self.list_with_backoff(META_PREFIX).await?;
        let mut all = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(bytes) = self.get_with_backoff(&key).await? else {
                continue; // deleted between list and get
            };
            match serde_json::from_slice::<CrlMetadata>(&bytes) {
                Ok(metadata) => all.push(metadata),
                Err(error) => warn!("skipping undecodable metadata at '{key}': {error}"),
            }
        }
        Ok(all)
    }

    /// Removes a record, blob first, so no metadata outlives its blob beyond
    /// a crash window.
    pub async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.delete_with_backoff(&blob_key(name)).await?;
        self.delete_with_backoff(&meta_key(name)).await
    }

    pub async fn list_queue_keys(&self) -> Result<Vec<String>, StoreError> {
        self.list_with_backoff(QUEUE_PREFIX).await
    }

    /// Reads one queue entry; undecodable entries are logged and skipped.
    pub async fn load_queue_entry(&self, key: &str) -> Result<Option<QueueEntry>, StoreError> {
        let Some(bytes) = self.get_with_backoff(key).await? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(error) => {
                warn!("skipping undecodable queue entry at '{key}': {error}");
                Ok(None)
            }
        }
    }

    pub async fn save_queue_entry(&self, key: &str, entry: &QueueEntry) -> Result<(), StoreError> {
        let doc = serde_json::to_vec(entry)?;
        self.put_with_backoff(key, &doc).await
    }

    async fn put_with_backoff(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.with_backoff(|| self.kv.put(key, value)).await
    }

    async fn get_with_backoff(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.with_backoff(|| self.kv.get(key)).await
    }

    async fn list_with_backoff(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.with_backoff(|| self.kv.list(prefix)).await
    }

    async fn delete_with_backoff(&self, key: &str) -> Result<(), StoreError> {
        self.with_backoff(|| self.kv.delete(key)).await
    }

    /// Retries rate-limited operations with doubling backoff; every other
    /// outcome is returned as-is.
    async fn with_backoff<T, F, Fut>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Err(StoreError::RateLimited) if attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff * 2u32.pow(attempt - 1);
                    warn!(
                        "store rate limited, retry {attempt}/{} in {delay:?}",
                        self.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}
