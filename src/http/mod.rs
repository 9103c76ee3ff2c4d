//! HTTP surface of a worker.
//!
//! # Data Flow
//! ```text
//! Shared port (SO_REUSEPORT)
//!     → net::TrackedListener (connection counted)
//!     → server.rs (Axum router, keep-alive refusal while draining)
//!     → handler
//! ```

pub mod server;

pub use server::{start, HttpResource, HttpServer};
