//! # Shard Proxy
//!
//! Entry point: parse arguments, set up logging, run until Ctrl+C.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use proxy_runtime::{load_config, Overrides, ProxyRuntime};

/// Gateway routing client requests to the observers of a sharded chain.
#[derive(Debug, Parser)]
#[command(name = "proxy-runtime", version, about)]
struct Args {
    /// TOML configuration file (also the topology source for reloads)
    #[arg(short, long, default_value = "config/proxy.toml")]
    config: PathBuf,

    /// Override the number of regular shards
    #[arg(long)]
    num_shards: Option<u32>,

    /// Override the admin server port
    #[arg(long)]
    admin_port: Option<u16>,

    /// Skip observer sync-state checks (every observer counts as synced)
    #[arg(long)]
    no_status_check: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over the default level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    if args.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    let overrides = Overrides {
        num_shards: args.num_shards,
        admin_port: args.admin_port,
        no_status_check: args.no_status_check,
    };
    let config = load_config(&args.config, overrides)?;

    let mut runtime = ProxyRuntime::new(config, &args.config)?;
    runtime.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    runtime.shutdown().await;
    Ok(())
}
