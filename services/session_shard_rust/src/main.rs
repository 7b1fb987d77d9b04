//! SessionShard Rust Service
//!
//! Runs one shot-prediction session against a live, simulated or replayed game.

use anyhow::Result;
use dotenv::dotenv;
use session_shard_rust::{SessionShard, SessionShardConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting SessionShard Rust Service...");

    let config = SessionShardConfig::from_env()?;
    let (shard, handle) = SessionShard::from_config(config);
    let task = tokio::spawn(shard.run());

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, stopping session");
    if let Err(e) = handle.shutdown().await {
        error!("Shutdown command failed: {}", e);
    }
    task.await??;
    Ok(())
}
