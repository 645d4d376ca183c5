use std::time::Duration;

use anyhow::Result;
use tracing::info;

use invite_worker::config::Config;
use invite_worker::jobs::{ExpirySweepJob, JobScheduler, PoolMetricsJob};
use invite_worker::{build_engine, logging};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    logging::init_logging(&config.logging)?;

    info!("Starting invite worker v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&config.database.pool_config()).await?;
    persistence::db::run_migrations(&pool).await?;

    let engine = build_engine(pool.clone(), config.invites.clone());

    let mut scheduler = JobScheduler::new();
    if config.sweeper.enabled {
        scheduler.register(ExpirySweepJob::new(engine.clone(), &config.sweeper));
    }
    scheduler.register(PoolMetricsJob::new(
        pool.clone(),
        config.sweeper.pool_metrics_interval_secs,
    ));
    scheduler.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler.shutdown();
    scheduler.wait_for_shutdown(Duration::from_secs(30)).await;
    pool.close().await;

    Ok(())
}
