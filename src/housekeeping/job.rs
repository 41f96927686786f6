use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use ring::digest;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{CrlSource, HousekeepingConfig};
use crate::store::KvStore;

use super::cleanup::select_expired;
use super::errors::JobError;
use super::fetcher::CrlFetch;
use super::health::evaluate;
use super::parser::parse_crl;
use super::queue::process_queue;
use super::records::RecordStore;
use super::types::{CrlMetadata, HealthState, HealthStatus, RunReport, RunSummary};

/// One whole housekeeping invocation: drain the queue, refresh every enabled
/// source concurrently, evaluate health, sweep expired records.
///
/// A source failing at any stage is recorded on that source and never stops
/// the others; the run itself only fails on infrastructure faults (the store
/// rejecting a listing or a health read).
pub struct HousekeepingJob<S> {
    records: RecordStore<S>,
    fetcher: Arc<dyn CrlFetch>,
    housekeeping: HousekeepingConfig,
    sources: Vec<CrlSource>,
}

impl<S: KvStore> HousekeepingJob<S> {
    pub fn new(
        store: S,
        fetcher: Arc<dyn CrlFetch>,
        housekeeping: HousekeepingConfig,
        sources: Vec<CrlSource>,
    ) -> Self {
        Self {
            records: RecordStore::new(store),
            fetcher,
            housekeeping,
            sources,
        }
    }

    pub async fn run(&self) -> Result<RunReport, JobError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();
        let enabled: Vec<&CrlSource> = self.sources.iter().filter(|s| s.enabled).collect();
        let mut summary = RunSummary::new(run_id, started_at, self.sources.len(), enabled.len());
        info!(
            "[RUN] {run_id}: starting with {}/{} sources enabled",
            enabled.len(),
            self.sources.len()
        );

        if self.housekeeping.enable_queue_processing {
            let outcome = process_queue(
                &self.records,
                self.fetcher.as_ref(),
                self.housekeeping.sample_size,
            )
            .await?;
            summary.queue = Some(outcome);
        }

        self.registry_pass(&enabled, &mut summary).await;

        let mut statuses = Vec::new();
        if self.housekeeping.enable_health_check {
            statuses = self.health_pass(&enabled, &mut summary).await?;
        }
        if self.housekeeping.enable_cleanup {
            self.cleanup_pass(&mut summary).await?;
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!("[RUN] {run_id}: {summary}");
        Ok(RunReport { summary, statuses })
    }

    /// Refreshes every enabled source in parallel. Pipelines share nothing
    /// but the store, which tolerates unordered writes to distinct keys.
    async fn registry_pass(&self, enabled: &[&CrlSource], summary: &mut RunSummary) {
        if enabled.is_empty() {
            info!("[UPDATE] no enabled sources to refresh");
            return;
        }
        let mut join_set = JoinSet::new();
        for source in enabled {
            let source = (*source).clone();
            let records = self.records.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let sample_size = self.housekeeping.sample_size;
            join_set.spawn(async move {
                let outcome =
                    run_pipeline(&source, fetcher.as_ref(), &records, sample_size).await;
                if let PipelineOutcome::Failed { stage, message } = &outcome {
                    let described = format!("{stage}: {message}");
                    if let Err(store_error) = records
                        .record_failure(&source.name, &source.url, &described)
                        .await
                    {
                        warn!(
                            "[UPDATE] '{}': could not record the failure: {store_error}",
                            source.name
                        );
                    }
                }
                (source.name, outcome)
            });
        }

        while let Some(task_result) = join_set.join_next().await {
            match task_result {
                Ok((_, outcome)) => match outcome {
                    PipelineOutcome::Updated(_) => summary.fetched += 1,
                    PipelineOutcome::Unchanged(_) => {
                        summary.fetched += 1;
                        summary.unchanged += 1;
                    }
                    PipelineOutcome::Failed { stage, .. } => match stage {
                        FailureStage::Fetch => summary.fetch_failures += 1,
                        FailureStage::Parse => summary.parse_failures += 1,
                        FailureStage::Store => summary.store_failures += 1,
                    },
                },
                Err(join_error) => {
                    error!("[UPDATE] source task failed to complete: {join_error}");
                }
            }
        }
    }

    /// Classifies every enabled source from stored metadata. A store read
    /// failing here is an infrastructure fault and fails the run.
    async fn health_pass(
        &self,
        enabled: &[&CrlSource],
        summary: &mut RunSummary,
    ) -> Result<Vec<HealthStatus>, JobError> {
        let now = Utc::now();
        let mut statuses = Vec::with_capacity(enabled.len());
        for source in enabled {
            let metadata = self.records.load_metadata(&source.name).await?;
            let status = evaluate(
                &source.name,
                metadata.as_ref(),
                now,
                self.housekeeping.max_crl_age_hours,
            );
            match status.status {
                HealthState::Healthy => {
                    summary.healthy += 1;
                    info!(
                        "[HEALTH] '{}' healthy ({})",
                        status.name,
                        describe_age(status.age_hours)
                    );
                }
                HealthState::Stale => {
                    summary.stale += 1;
                    warn!(
                        "[HEALTH] '{}' stale ({})",
                        status.name,
                        describe_age(status.age_hours)
                    );
                }
                HealthState::Missing => {
                    summary.missing += 1;
                    warn!("[HEALTH] '{}' missing: no stored CRL", status.name);
                }
                HealthState::Error => {
                    summary.errored += 1;
                    let reason = metadata
                        .as_ref()
                        .and_then(|m| m.last_error.as_deref())
                        .unwrap_or("unknown");
                    warn!("[HEALTH] '{}' error: {reason}", status.name);
                }
            }
            statuses.push(status);
        }
        Ok(statuses)
    }

    /// Deletes records for disabled sources past retention, best-effort per
    /// key. Listing the store is the only fatal step.
    async fn cleanup_pass(&self, summary: &mut RunSummary) -> Result<(), JobError> {
        let all = self.records.list_metadata().await?;
        let enabled_names: HashSet<String> = self
            .sources
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.name.clone())
            .collect();
        let expired = select_expired(
            &all,
            &enabled_names,
            self.housekeeping.retention_days,
            Utc::now(),
        );
        if expired.is_empty() {
            info!("[CLEANUP] nothing past retention");
            return Ok(());
        }
        for name in expired {
            match self.records.delete(&name).await {
                Ok(()) => {
                    summary.deleted += 1;
                    info!("[CLEANUP] deleted '{name}' (disabled, past retention)");
                }
                Err(error) => {
                    summary.delete_failures += 1;
                    warn!("[CLEANUP] could not delete '{name}': {error}");
                }
            }
        }
        Ok(())
    }
}

/// Where a source's pipeline gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FailureStage {
    Fetch,
    Parse,
    Store,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Fetch => "fetch",
            Self::Parse => "parse",
            Self::Store => "store",
        };
        f.write_str(label)
    }
}

/// Outcome of one source's fetch→parse→store pipeline.
#[derive(Debug)]
pub(super) enum PipelineOutcome {
    Updated(CrlMetadata),
    Unchanged(CrlMetadata),
    Failed { stage: FailureStage, message: String },
}

/// Runs one source through fetch, parse and store. Failure handling beyond
/// logging is the caller's: the registry pass records it on the source's
/// metadata, the queue pass on the queue entry.
pub(super) async fn run_pipeline<S: KvStore>(
    source: &CrlSource,
    fetcher: &dyn CrlFetch,
    records: &RecordStore<S>,
    sample_size: usize,
) -> PipelineOutcome {
    let blob = match fetcher.fetch(source).await {
        Ok(blob) => blob,
        Err(error) => {
            warn!("[FETCH] '{}' failed: {error}", source.name);
            return PipelineOutcome::Failed {
                stage: FailureStage::Fetch,
                message: error.to_string(),
            };
        }
    };

    let fields = match parse_crl(&blob, sample_size) {
        Ok(fields) => fields,
        Err(error) => {
            warn!("[UPDATE] '{}' returned an unparsable CRL: {error}", source.name);
            return PipelineOutcome::Failed {
                stage: FailureStage::Parse,
                message: error.to_string(),
            };
        }
    };
    let validity_inverted = fields.validity_inverted();
    if validity_inverted {
        warn!(
            "[UPDATE] '{}' declares thisUpdate after nextUpdate; storing the window as given",
            source.name
        );
    }

    let hash = sha256_hex(&blob);
    let unchanged = match records.load_metadata(&source.name).await {
        Ok(previous) => previous
            .and_then(|m| m.crl_hash)
            .is_some_and(|previous_hash| previous_hash == hash),
        Err(error) => {
            warn!(
                "[UPDATE] '{}': could not read previous metadata: {error}",
                source.name
            );
            false
        }
    };

    let issuer = fields.issuer;
    let metadata = CrlMetadata {
        name: source.name.clone(),
        url: source.url.clone(),
        this_update: fields.this_update,
        next_update: fields.next_update,
        revoked_count: fields.revoked_count,
        revoked_serials_sample: fields.revoked_serials_sample,
        crl_hash: Some(hash),
        validity_inverted,
        fetched_at: Some(Utc::now()),
        last_error: None,
    };

    let blob_to_write = if unchanged { None } else { Some(blob.as_slice()) };
    if let Err(error) = records.save(&metadata, blob_to_write).await {
        warn!("[UPDATE] '{}': store rejected the record: {error}", source.name);
        return PipelineOutcome::Failed {
            stage: FailureStage::Store,
            message: error.to_string(),
        };
    }

    if unchanged {
        info!("[UPDATE] '{}' unchanged (hash match), metadata refreshed", source.name);
        PipelineOutcome::Unchanged(metadata)
    } else {
        info!(
            "[UPDATE] '{}' stored: {} revoked certificates, issuer '{issuer}'",
            source.name, metadata.revoked_count
        );
        PipelineOutcome::Updated(metadata)
    }
}

fn sha256_hex(blob: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, blob))
}

fn describe_age(age_hours: Option<f64>) -> String {
    match age_hours {
        Some(age) => format!("{age:.1}h old"),
        None => "never fetched".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use crate::housekeeping::errors::FetchError;
    use crate::housekeeping::fetcher::MockCrlFetch;
    use crate::store::MemoryStore;

    use super::*;

    fn source(name: &str, enabled: bool) -> CrlSource {
        CrlSource {
            name: name.to_string(),
            url: format!("https://pki.example.org/{name}.crl"),
            enabled,
        }
    }

    fn config() -> HousekeepingConfig {
        HousekeepingConfig {
            max_crl_age_hours: 24.0,
            retention_days: 7.0,
            sample_size: 10,
            enable_health_check: true,
            enable_cleanup: true,
            enable_queue_processing: false,
        }
    }

    #[tokio::test]
    async fn source_failures_never_abort_the_run() {
        let sources = vec![
            source("timeout-ca", true),
            source("garbage-ca", true),
            source("gone-ca", true),
            source("disabled-ca", false),
        ];
        let mut fetcher = MockCrlFetch::new();
        fetcher.expect_fetch().returning(|source| match source.name.as_str() {
            "timeout-ca" => Err(FetchError::Timeout),
            "garbage-ca" => Ok(b"definitely not DER".to_vec()),
            "gone-ca" => Err(FetchError::HttpStatus(StatusCode::NOT_FOUND)),
            other => panic!("unexpected fetch for '{other}'"),
        });

        let store = MemoryStore::default();
        let job = HousekeepingJob::new(store.clone(), Arc::new(fetcher), config(), sources);
        let report = job.run().await.unwrap();

        let summary = &report.summary;
        assert_eq!(summary.sources_total, 4);
        assert_eq!(summary.sources_enabled, 3);
        assert_eq!(summary.fetched, 0);
        assert_eq!(summary.fetch_failures, 2);
        assert_eq!(summary.parse_failures, 1);
        assert_eq!(summary.errored, 3);
        assert_eq!(report.statuses.len(), 3);

        // each failure landed on its own source's metadata
        let records = RecordStore::new(store);
        let timeout_meta = records.load_metadata("timeout-ca").await.unwrap().unwrap();
        assert!(timeout_meta.last_error.as_deref().is_some_and(|e| e.starts_with("fetch:")));
        let garbage_meta = records.load_metadata("garbage-ca").await.unwrap().unwrap();
        assert!(garbage_meta.last_error.as_deref().is_some_and(|e| e.starts_with("parse:")));
    }

    #[tokio::test]
    async fn health_and_cleanup_passes_can_be_toggled_off() {
        let mut fetcher = MockCrlFetch::new();
        fetcher.expect_fetch().returning(|_| Err(FetchError::Timeout));
        let mut housekeeping = config();
        housekeeping.enable_health_check = false;
        housekeeping.enable_cleanup = false;

        let job = HousekeepingJob::new(
            MemoryStore::default(),
            Arc::new(fetcher),
            housekeeping,
            vec![source("timeout-ca", true)],
        );
        let report = job.run().await.unwrap();

        assert!(report.statuses.is_empty());
        assert!(report.summary.queue.is_none());
        assert_eq!(report.summary.healthy + report.summary.errored, 0);
        assert_eq!(report.summary.deleted, 0);
    }

    #[tokio::test]
    async fn orphaned_records_are_swept_during_the_run() {
        let store = MemoryStore::default();
        let records = RecordStore::new(store.clone());
        let mut metadata =
            CrlMetadata::new("retired-ca", "https://pki.example.org/retired.crl");
        metadata.fetched_at = Some(Utc::now() - chrono::Duration::days(30));
        records.save(&metadata, Some(b"old blob")).await.unwrap();

        // no enabled sources, so the fetcher must stay untouched
        let job = HousekeepingJob::new(store, Arc::new(MockCrlFetch::new()), config(), Vec::new());
        let report = job.run().await.unwrap();

        assert_eq!(report.summary.deleted, 1);
        assert_eq!(
            records.load_record("retired-ca").await.unwrap(),
            crate::housekeeping::types::RecordLookup::Absent
        );
    }
}
