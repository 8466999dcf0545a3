//! Matchmaking logic API entry point

use anyhow::Context;
use clap::Parser;
use mmlogic::{MmlogicApi, MmlogicServer};
use mmlogic_config::{EvaluationMode, MmlogicConfig, StorageBackend};
use state_storage::{Connector, MemoryStore, RedisConnector};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port, overriding the configured one
    #[arg(short, long)]
    port: Option<u16>,

    /// Redis URL, overriding the configured one
    #[arg(long)]
    redis_url: Option<String>,

    /// Serve from an in-process store instead of Redis
    #[arg(long)]
    memory: bool,

    /// Evaluate a pool's filters concurrently
    #[arg(long)]
    concurrent: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mmlogic=info,state_storage=info,mmlogic_config=info,warn".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!("Starting matchmaking logic API");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = MmlogicConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(url) = args.redis_url {
        config.storage.redis_url = url;
    }
    if args.memory {
        config.storage.backend = StorageBackend::Memory;
    }
    if args.concurrent {
        config.evaluation.mode = EvaluationMode::Concurrent;
    }
    config.validate().context("Invalid configuration")?;

    let connector: Arc<dyn Connector> = match config.storage.backend {
        StorageBackend::Redis => Arc::new(
            RedisConnector::new(&config.storage.redis_url).context("Failed to configure Redis backend")?,
        ),
        StorageBackend::Memory => {
            warn!("Using in-process store; data is lost on exit");
            MemoryStore::new().connector()
        }
    };

    let api = Arc::new(MmlogicApi::new(config, connector));
    let server = MmlogicServer::new(api)?;

    let shutdown_signal = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    };

    server.run(shutdown_signal).await
}
