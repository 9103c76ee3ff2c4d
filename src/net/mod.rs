//! Network plumbing for the embedded server.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection (kernel picks a worker via SO_REUSEPORT)
//!     → listener.rs (accept loop)
//!     → connection.rs (tracked for the drain poll)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Load balancing between workers is left to the kernel
//! - Each connection tracked so drain can wait for zero

pub mod connection;
pub mod listener;
