use anyhow::Result;
use dog_broker::QueueError;
use tracing::{info, warn};

use job_center::{build, seed_demo_jobs, spawn_stats_reporter, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    dog_broker::init_tracing();

    let config = AppConfig::from_env();
    let center = build(&config)?;

    center.broker.start().await?;
    info!("[job-center] broker running, press Ctrl-C to drain and exit");

    if config.seed_demo_jobs {
        seed_demo_jobs(&center.broker).await?;
    }

    let reporter = spawn_stats_reporter(center.broker.clone(), config.stats_interval);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, draining in-flight jobs");
    reporter.abort();

    match center.broker.stop().await {
        Ok(()) => info!("Drained cleanly"),
        Err(QueueError::DrainTimeout { remaining }) => {
            warn!(remaining, "Drain timed out, exiting with jobs still running")
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
