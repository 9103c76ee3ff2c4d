//! Startup orchestration.
//!
//! # Responsibilities
//! - Check the entry point and validate configuration
//! - Decide whether this process is the coordinator or a worker
//! - Initialize coordinator subsystems in dependency order
//!
//! # Design Decisions
//! - Fail fast: bootstrap errors are returned before anything is forked
//! - Subsystems initialize in order, not concurrently
//! - Workers are forked last, after signal handlers are in place

use std::net::SocketAddr;

use crate::cluster::coordinator::{exit_process, install_panic_hook, Coordinator, CoordinatorOptions, ExitCallback};
use crate::cluster::spawner::{ProcessSpawner, WORKER_ENV};
use crate::config::loader::ConfigError;
use crate::config::validation::validate_config;
use crate::config::ClusterConfig;
use crate::error::{ClusterError, Result};
use crate::lifecycle::signals::spawn_signal_listener;
use crate::observability::metrics;
use crate::worker::runtime::{run_worker, WorkerEntry};

/// True when this process was forked by a coordinator.
pub fn is_worker_process() -> bool {
    std::env::var_os(WORKER_ENV).is_some()
}

/// Entry point of the library.
pub struct Cluster;

impl Cluster {
    pub fn builder() -> ClusterBuilder {
        ClusterBuilder::default()
    }
}

/// Collects the pieces needed to start a cluster.
#[derive(Default)]
pub struct ClusterBuilder {
    config: ClusterConfig,
    entry: Option<WorkerEntry>,
    exit_callback: Option<ExitCallback>,
}

impl ClusterBuilder {
    pub fn config(mut self, config: ClusterConfig) -> Self {
        self.config = config;
        self
    }

    /// Function each worker runs to start its server.
    pub fn entry(mut self, entry: WorkerEntry) -> Self {
        self.entry = Some(entry);
        self
    }

    /// Replace the default exit behaviour (terminate the process with 0).
    pub fn on_exit(mut self, callback: ExitCallback) -> Self {
        self.exit_callback = Some(callback);
        self
    }

    /// Start the cluster.
    ///
    /// In a worker this serves until drained and then exits the process. In
    /// the coordinator it forks the workers and returns once shutdown has
    /// completed and the exit callback has run.
    pub async fn start(self) -> Result<()> {
        let entry = self.entry.ok_or(ClusterError::MissingEntryPoint)?;
        validate_config(&self.config).map_err(|errors| ClusterError::Config(ConfigError::Validation(errors)))?;

        if is_worker_process() {
            let code = run_worker(&self.config.worker, entry).await?;
            std::process::exit(code);
        }

        let cluster = &self.config.cluster;
        install_panic_hook(cluster.disable_graceful);

        let observability = &self.config.observability;
        if observability.metrics_enabled {
            match observability.metrics_address.parse::<SocketAddr>() {
                Ok(addr) => metrics::init_metrics(addr),
                Err(e) => tracing::warn!(error = %e, "Invalid metrics address, metrics disabled"),
            }
        }

        let spawner = ProcessSpawner::current_exe()?;
        let coordinator = Coordinator::new(
            CoordinatorOptions::from(cluster),
            spawner,
            self.exit_callback.unwrap_or_else(exit_process),
        );
        let _signals = spawn_signal_listener(coordinator.event_sender())?;

        let outcome = coordinator.run().await;
        tracing::info!(%outcome, "Coordinator stopped");
        Ok(())
    }
}
