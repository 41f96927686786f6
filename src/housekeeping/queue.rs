use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::CrlSource;
use crate::store::{KvStore, StoreError};

use super::fetcher::CrlFetch;
use super::job::{PipelineOutcome, run_pipeline};
use super::records::RecordStore;
use super::types::QueueOutcome;

/// One queued CRL, written by the upstream edge component when a CRL is too
/// large to handle inline. Wire names are the producer's (camelCase);
/// producer-private fields ride along in `extra` and survive rewrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "sizeMB", skip_serializing_if = "Option::is_none")]
    pub size_mb: Option<f64>,
    #[serde(default)]
    pub processed_by_housekeeping: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crl_hash: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueueEntry {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            name: None,
            size_mb: None,
            processed_by_housekeeping: false,
            processed_at: None,
            error: None,
            revoked_count: None,
            crl_hash: None,
            extra: Map::new(),
        }
    }

    /// Name the stored record carries: the producer's name when given,
    /// otherwise one derived from the URL tail.
    pub fn record_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => {
                let tail = self
                    .url
                    .rsplit('/')
                    .next()
                    .filter(|tail| !tail.is_empty())
                    .unwrap_or(&self.url);
                format!("Queued CRL - {tail}")
            }
        }
    }
}

/// Drains the queue: every unprocessed entry is fetched, parsed and stored
/// like a registry source, then marked processed (or annotated with its
/// error, leaving it eligible for the next run). Entry failures never abort
/// the drain; only a store-level fault does.
pub async fn process_queue<S: KvStore>(
    records: &RecordStore<S>,
    fetcher: &dyn CrlFetch,
    sample_size: usize,
) -> Result<QueueOutcome, StoreError> {
    let keys = records.list_queue_keys().await?;
    let mut outcome = QueueOutcome::default();
    if keys.is_empty() {
        info!("[QUEUE] no queued CRLs");
        return Ok(outcome);
    }
    info!("[QUEUE] {} queued CRL(s)", keys.len());

    for key in keys {
        let Some(mut entry) = records.load_queue_entry(&key).await? else {
            outcome.skipped += 1;
            continue;
        };
        if entry.processed_by_housekeeping {
            info!("[QUEUE] already processed: {}", entry.url);
            outcome.skipped += 1;
            continue;
        }
        match entry.size_mb {
            Some(size_mb) => info!("[QUEUE] processing {} ({size_mb}MB)", entry.url),
            None => info!("[QUEUE] processing {}", entry.url),
        }

        let source = CrlSource {
            name: entry.record_name(),
            url: entry.url.clone(),
            enabled: true,
        };
        entry.processed_at = Some(Utc::now());
        match run_pipeline(&source, fetcher, records, sample_size).await {
            PipelineOutcome::Updated(metadata) | PipelineOutcome::Unchanged(metadata) => {
                entry.processed_by_housekeeping = true;
                entry.error = None;
                entry.revoked_count = Some(metadata.revoked_count);
                entry.crl_hash = metadata.crl_hash;
                outcome.processed += 1;
            }
            PipelineOutcome::Failed { stage, message } => {
                warn!("[QUEUE] {} failed at {stage}: {message}", entry.url);
                entry.error = Some(format!("{stage}: {message}"));
                outcome.failed += 1;
            }
        }
        if let Err(error) = records.save_queue_entry(&key, &entry).await {
            warn!("[QUEUE] could not update entry '{key}': {error}");
        }
    }

    info!(
        "[QUEUE] complete: {} processed, {} failed, {} skipped",
        outcome.processed, outcome.failed, outcome.skipped
    );
    Ok(outcome)
}
