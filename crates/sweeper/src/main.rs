use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{info, warn};

use stockhold_audit::TracingAuditSink;
use stockhold_core::SystemClock;
use stockhold_infra::{
    AppConfig, ExpiryScheduler, ExpirySweep, InMemoryInventoryStore, InMemoryOrderStore,
    InventoryService, PostgresStore,
};

#[derive(Parser)]
#[command(name = "stockhold-sweeper")]
#[command(about = "Release stock held by expired reservations", long_about = None)]
struct Cli {
    /// Run a single sweep, print how many reservations were released, and exit.
    #[arg(long, default_value_t = false)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockhold_observability::init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("invalid configuration")?;

    match config.database_url.as_deref() {
        Some(url) => {
            let store = PostgresStore::connect(url, config.database_max_connections)
                .await
                .context("failed to connect to Postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to apply schema")?;

            let service = InventoryService::with_config(
                store.clone(),
                store,
                TracingAuditSink,
                SystemClock,
                config.service(),
            );
            run(Arc::new(service), &config, cli.once).await
        }
        None => {
            warn!("DATABASE_URL not set; sweeping an in-memory store");
            let service = InventoryService::with_config(
                Arc::new(InMemoryInventoryStore::new()),
                Arc::new(InMemoryOrderStore::new()),
                TracingAuditSink,
                SystemClock,
                config.service(),
            );
            run(Arc::new(service), &config, cli.once).await
        }
    }
}

async fn run<T>(target: Arc<T>, config: &AppConfig, once: bool) -> anyhow::Result<()>
where
    T: ExpirySweep + 'static,
{
    if once {
        // Store calls block; keep them off the async workers.
        let report = tokio::task::spawn_blocking(move || target.run_expiry_sweep(target.now()))
            .await
            .context("sweep task failed")?;

        println!("Cleaned up {} expired reservations", report.released);
        if !report.is_clean() {
            bail!(
                "sweep incomplete: {} failed, {} audit failures, aborted: {}",
                report.failed,
                report.audit_failures,
                report.aborted
            );
        }
        return Ok(());
    }

    let handle = ExpiryScheduler::spawn(target, config.scheduler())
        .context("failed to spawn expiry scheduler")?;
    info!(
        wake_interval_secs = config.sweep_interval_secs,
        batch_size = config.sweep_batch_size,
        "sweeper running; ctrl-c to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    let stats = tokio::task::spawn_blocking(move || {
        let stats = handle.stats();
        handle.shutdown();
        stats
    })
    .await
    .context("scheduler shutdown failed")?;

    info!(
        sweeps = stats.sweeps,
        released = stats.released,
        failed = stats.failed,
        "sweeper stopped"
    );
    Ok(())
}
