//! graceful-cluster
//!
//! Runs the demo HTTP server in a graceful worker cluster.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌───────────────────── coordinator ─────────────────────┐
//!   SIGTERM/INT ─▶│ signals → event loop → health gate → closing set      │
//!   SIGUSR2     ─▶│                      → shutdown sequencer → exit      │
//!                 └──────┬──────────────────────────┬─────────────────────┘
//!                 stdin/stdout (JSON lines)   stdin/stdout (JSON lines)
//!                 ┌──────▼───────┐            ┌──────▼───────┐
//!                 │   worker 1   │    ...     │   worker N   │
//!                 │ http server  │            │ http server  │
//!                 │ drain cascade│            │ drain cascade│
//!                 └──────┬───────┘            └──────┬───────┘
//!                        └──── shared port (SO_REUSEPORT) ────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use futures_util::FutureExt;

use graceful_cluster::config::loader::read_config;
use graceful_cluster::lifecycle::is_worker_process;
use graceful_cluster::observability::logging;
use graceful_cluster::{http, Cluster, ClusterConfig, WorkerContext, WorkerEntry};

#[derive(Parser)]
#[command(name = "graceful-cluster")]
#[command(about = "Run an HTTP server in a gracefully restarting worker cluster", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of workers (overrides the config file)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Address the workers listen on (overrides the config file)
    #[arg(short, long)]
    bind: Option<String>,

    /// Exit immediately on SIGTERM/SIGINT
    #[arg(long)]
    disable_graceful: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ClusterConfig::default(),
    };
    if let Some(workers) = cli.workers {
        config.cluster.workers = workers;
    }
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if cli.disable_graceful {
        config.cluster.disable_graceful = true;
    }

    logging::init(&config.observability.log_level);

    let role = if is_worker_process() { "worker" } else { "coordinator" };
    tracing::info!(
        role,
        pid = std::process::id(),
        bind_address = %config.server.bind_address,
        "graceful-cluster v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let server = config.server.clone();
    let entry: WorkerEntry = Arc::new(move |ctx: WorkerContext| {
        let server = server.clone();
        async move { http::start(&server, ctx) }.boxed()
    });

    Cluster::builder().config(config).entry(entry).start().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
