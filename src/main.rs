use std::sync::Arc;

use crl_housekeeper::{
    config::Config,
    housekeeping::{
        HousekeepingJob, HttpFetcher,
        scheduler::{JobScheduler, report_slot},
    },
    server::{AppState, Server},
    store::{KvStore, MemoryStore, RedisStore},
    telemetry,
};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let config = Config::load()?;
    tracing::info!(
        "loaded configuration: {} source(s), {} store",
        config.sources.len(),
        if config.redis.is_some() { "redis" } else { "in-memory" }
    );

    match &config.redis {
        Some(redis) => {
            let store = RedisStore::new(redis.start().await?);
            run(store, config).await
        }
        None => {
            tracing::warn!("no redis configured; records will not survive a restart");
            run(MemoryStore::default(), config).await
        }
    }
}

async fn run<S: KvStore>(store: S, config: Config) -> color_eyre::Result<()> {
    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
    let job = HousekeepingJob::new(
        store,
        fetcher,
        config.housekeeping.clone(),
        config.sources.clone(),
    );

    if config.scheduler.run_once {
        let report = job.run().await?;
        tracing::info!("single run complete: {}", report.summary);
        return Ok(());
    }

    let slot = report_slot();
    let state = AppState {
        sources_total: config.sources.len(),
        sources_enabled: config.enabled_source_names().len(),
        last_run: Arc::clone(&slot),
    };
    let server = Server::new(state, &config.server).await?;

    JobScheduler::new(Arc::new(job), config.scheduler.interval_secs, slot).start();

    server.run().await
}
