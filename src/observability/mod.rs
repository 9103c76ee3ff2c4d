//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! coordinator + workers produce:
//!     → logging.rs (structured log events on stderr)
//!     → metrics.rs (counters, gauges; coordinator only)
//!
//! Consumers:
//!     → Log aggregation (stderr of the coordinator, shared with workers)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Every recovered failure (crash, drain timeout, forced exit) is a log
//!   line, never a return value
//! - Metrics are cheap (atomic increments) and optional

pub mod logging;
pub mod metrics;
