use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info};

use crate::store::KvStore;

use super::job::HousekeepingJob;
use super::types::RunReport;

/// Most recent run report, shared between the scheduler (writer) and the
/// status endpoint (reader). Empty until the first run completes.
pub type RunReportSlot = Arc<RwLock<Option<RunReport>>>;

pub fn report_slot() -> RunReportSlot {
    Arc::new(RwLock::new(None))
}

/// Runs the housekeeping job on a fixed cadence.
///
/// Runs never overlap: each one is awaited before the next tick is taken.
/// The store offers no locking primitive, so a second process pointed at the
/// same store is not protected against; cadence is the only guard.
pub struct JobScheduler<S> {
    job: Arc<HousekeepingJob<S>>,
    interval: Duration,
    last_run: RunReportSlot,
}

impl<S: KvStore> JobScheduler<S> {
    pub fn new(job: Arc<HousekeepingJob<S>>, interval_secs: u64, last_run: RunReportSlot) -> Self {
        Self {
            job,
            interval: Duration::from_secs(interval_secs.max(1)),
            last_run,
        }
    }

    /// Spawns the background loop. The first run starts immediately.
    pub fn start(self) -> JoinHandle<()> {
        info!(
            "starting housekeeping scheduler with an interval of {:?}",
            self.interval
        );
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            // a run longer than the interval delays the next tick instead
            // of firing a burst of catch-up runs
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await; // first tick completes immediately
                match self.job.run().await {
                    Ok(report) => {
                        *self.last_run.write().await = Some(report);
                    }
                    Err(error) => {
                        error!("[RUN] housekeeping run failed: {error}");
                    }
                }
            }
        })
    }
}
