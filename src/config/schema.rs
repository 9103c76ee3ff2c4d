//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the cluster.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the cluster.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ClusterConfig {
    /// Coordinator settings (worker count, health floor, shutdown).
    pub cluster: ClusterSection,

    /// Per-worker drain and self-restart settings.
    pub worker: WorkerConfig,

    /// Embedded demo server settings.
    pub server: ServerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Coordinator-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClusterSection {
    /// Desired number of workers kept alive.
    pub workers: usize,

    /// Minimum percentage of desired workers that must stay outside the
    /// closing set during a restart.
    pub minimum_health_percent: u32,

    /// Cluster-wide shutdown timeout in milliseconds.
    pub shutdown_timeout_ms: u64,

    /// Exit immediately on SIGTERM/SIGINT instead of draining workers.
    pub disable_graceful: bool,

    /// Base delay for re-fork retries in milliseconds.
    pub refork_base_delay_ms: u64,

    /// Maximum delay for re-fork retries in milliseconds.
    pub refork_max_delay_ms: u64,
}

impl Default for ClusterSection {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            minimum_health_percent: 50,
            shutdown_timeout_ms: 5_000,
            disable_graceful: false,
            refork_base_delay_ms: 100,
            refork_max_delay_ms: 5_000,
        }
    }
}

impl ClusterSection {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Worker-side configuration: the drain cascade and the self-monitor.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Drain window before the disconnect is forced, in milliseconds.
    pub disconnect_delay_ms: u64,

    /// Backstop after disconnect before the process is terminated.
    pub force_shutdown_timeout_ms: u64,

    /// Interval between live-connection polls during drain.
    pub drain_poll_interval_ms: u64,

    /// Resident memory (bytes) above which the worker asks to be restarted.
    pub restart_on_memory_bytes: Option<u64>,

    /// Wall-clock interval after which the worker asks to be restarted.
    pub restart_on_interval_ms: Option<u64>,

    /// How often resident memory is sampled.
    pub memory_check_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            disconnect_delay_ms: 30_000,
            force_shutdown_timeout_ms: 30_000,
            drain_poll_interval_ms: 1_000,
            restart_on_memory_bytes: None,
            restart_on_interval_ms: None,
            memory_check_interval_ms: 5_000,
        }
    }
}

impl WorkerConfig {
    pub fn disconnect_delay(&self) -> Duration {
        Duration::from_millis(self.disconnect_delay_ms)
    }

    pub fn force_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.force_shutdown_timeout_ms)
    }

    pub fn drain_poll_interval(&self) -> Duration {
        Duration::from_millis(self.drain_poll_interval_ms)
    }

    pub fn memory_check_interval(&self) -> Duration {
        Duration::from_millis(self.memory_check_interval_ms)
    }

    /// Memory threshold, treating zero as disabled.
    pub fn memory_threshold(&self) -> Option<u64> {
        self.restart_on_memory_bytes.filter(|bytes| *bytes > 0)
    }

    /// Restart interval, treating zero as disabled.
    pub fn restart_interval(&self) -> Option<Duration> {
        self.restart_on_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Embedded server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address shared by every worker (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus endpoint on the coordinator.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
