use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields extracted from one parsed CRL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrlFields {
    /// Issuer distinguished name, kept for diagnostics only.
    pub issuer: String,
    pub this_update: Option<DateTime<Utc>>,
    pub next_update: Option<DateTime<Utc>>,
    /// Exact number of revoked certificates listed in the CRL.
    pub revoked_count: usize,
    /// First K revoked serials in listed order, as uppercase hex.
    pub revoked_serials_sample: Vec<String>,
}

impl CrlFields {
    /// True when the CRL declares a publication time after its own expiry.
    /// Such a CRL still parses; the window is recorded exactly as given.
    pub fn validity_inverted(&self) -> bool {
        match (self.this_update, self.next_update) {
            (Some(this_update), Some(next_update)) => this_update > next_update,
            _ => false,
        }
    }
}

/// Metadata document persisted beside each CRL blob, as JSON.
///
/// `fetched_at` records the last *successful* fetch and is absent only for
/// sources that failed before ever succeeding (such a document still carries
/// `last_error`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrlMetadata {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub this_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked_count: usize,
    #[serde(default)]
    pub revoked_serials_sample: Vec<String>,
    /// SHA-256 hex of the stored blob; drives change detection.
    #[serde(default)]
    pub crl_hash: Option<String>,
    /// Set when the CRL declared `this_update` after `next_update`.
    #[serde(default)]
    pub validity_inverted: bool,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl CrlMetadata {
    /// An empty document for a source that has no stored state yet.
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            this_update: None,
            next_update: None,
            revoked_count: 0,
            revoked_serials_sample: Vec::new(),
            crl_hash: None,
            validity_inverted: false,
            fetched_at: None,
            last_error: None,
        }
    }

    /// Hours since the last successful fetch, when one exists.
    pub fn age_hours(&self, now: DateTime<Utc>) -> Option<f64> {
        self.fetched_at
            .map(|fetched_at| (now - fetched_at).num_seconds() as f64 / 3600.0)
    }
}

/// A complete stored record: metadata plus the raw CRL bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct CrlRecord {
    pub metadata: CrlMetadata,
    pub raw_blob: Vec<u8>,
}

/// What a record read actually found.
///
/// Blob and metadata live under separate keys, so a crash between the two
/// writes can leave either half behind. Readers treat `Partial` like
/// `Absent` (the next run re-fetches), never as corruption.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordLookup {
    Absent,
    Partial(PartialRecord),
    Complete(CrlRecord),
}

/// The half of a record that survived a partial write.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialRecord {
    BlobOnly,
    MetadataOnly(CrlMetadata),
}

/// Health classification for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Stale,
    Missing,
    Error,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Healthy => "healthy",
            Self::Stale => "stale",
            Self::Missing => "missing",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// Freshness verdict for one source, recomputed each health pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub name: String,
    pub status: HealthState,
    /// Hours since the last successful fetch, when one exists.
    pub age_hours: Option<f64>,
}

/// Counts from the queue pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueOutcome {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Aggregate outcome of one housekeeping invocation. Logged at the end of
/// the run and served by the status endpoint; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub sources_total: usize,
    pub sources_enabled: usize,
    /// Sources whose fetch+parse+store pipeline completed, unchanged included.
    pub fetched: usize,
    /// Completed sources whose bytes matched the stored hash.
    pub unchanged: usize,
    pub fetch_failures: usize,
    pub parse_failures: usize,
    pub store_failures: usize,
    pub healthy: usize,
    pub stale: usize,
    pub missing: usize,
    pub errored: usize,
    pub deleted: usize,
    pub delete_failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueOutcome>,
}

impl RunSummary {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        sources_total: usize,
        sources_enabled: usize,
    ) -> Self {
        Self {
            run_id,
            started_at,
            duration_ms: 0,
            sources_total,
            sources_enabled,
            fetched: 0,
            unchanged: 0,
            fetch_failures: 0,
            parse_failures: 0,
            store_failures: 0,
            healthy: 0,
            stale: 0,
            missing: 0,
            errored: 0,
            deleted: 0,
            delete_failures: 0,
            queue: None,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} sources fetched ({} unchanged), failures fetch={} parse={} store={}, \
             health {}h/{}s/{}m/{}e, {} deleted ({} delete failures) in {}ms",
            self.fetched,
            self.sources_enabled,
            self.unchanged,
            self.fetch_failures,
            self.parse_failures,
            self.store_failures,
            self.healthy,
            self.stale,
            self.missing,
            self.errored,
            self.deleted,
            self.delete_failures,
            self.duration_ms,
        )?;
        if let Some(queue) = &self.queue {
            write!(
                f,
                ", queue processed={} failed={} skipped={}",
                queue.processed, queue.failed, queue.skipped
            )?;
        }
        Ok(())
    }
}

/// Everything one invocation produced; the status endpoint serves the most
/// recent one.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub summary: RunSummary,
    pub statuses: Vec<HealthStatus>,
}
