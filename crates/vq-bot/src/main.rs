//! vibe-quant reduce-only exit executor - Entry Point
//!
//! Replays a recorded feed against the paper exchange.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

/// Reduce-only exit executor
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via VQ_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// JSONL feed to replay
    #[arg(short, long)]
    replay: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    vq_telemetry::init_logging()?;

    info!("Starting vq-bot v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > VQ_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("VQ_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = vq_bot::AppConfig::from_file(&config_path)?;
    info!(
        symbols = config.symbols.len(),
        tick_interval_ms = config.tick_interval_ms,
        "Configuration loaded"
    );

    let app = vq_bot::Application::new(config).await?;
    let summary = app.run(&args.replay).await?;

    if !summary.stop.is_clean() {
        for (key, order_id) in &summary.stop.residual_orders {
            error!(%key, %order_id, "Residual order");
        }
        anyhow::bail!(
            "{} residual order(s), {} controller(s) timed out during drain",
            summary.stop.residual_orders.len(),
            summary.stop.timed_out.len()
        );
    }
    Ok(())
}
