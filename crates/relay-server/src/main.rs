//! # Firechat Relay
//!
//! Realtime presence and fan-out relay for Firechat.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! firechat-relay
//!
//! # Run with custom config
//! firechat-relay --config /path/to/relay.toml
//!
//! # Run with environment variables
//! PORT=8080 RELAY_LIMITS__MAX_CONNECTIONS=500 firechat-relay
//! ```

use anyhow::Result;
use clap::Parser;
use firechat_relay_server::{config::Config, handlers, metrics};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(name = "firechat-relay", version, about)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, env = "FIRECHAT_RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "firechat_relay_server=debug,firechat_relay_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load(cli.config.as_deref())?;

    tracing::info!("Starting Firechat relay on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
