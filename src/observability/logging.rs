//! Structured logging.
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Output goes to stderr: a worker's stdout is its IPC channel
//! - `RUST_LOG` wins over the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// Safe to call more than once; later calls are ignored, which lets an
/// embedding application install its own subscriber first.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "graceful_cluster={level},tower_http={level}",
            level = log_level
        ))
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
