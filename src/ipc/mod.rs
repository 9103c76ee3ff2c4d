//! Coordinator ↔ worker message passing.
//!
//! # Data Flow
//! ```text
//! worker (stdout) ── {"cmd":"confirm-restart","pid":N} ──▶ coordinator
//! worker (stdout) ── {"cmd":"online","pid":N} ───────────▶ coordinator
//! coordinator ───────────── "restart" ──────────────────▶ worker (stdin)
//! ```
//!
//! # Design Decisions
//! - One point-to-point channel per worker, newline-delimited JSON
//! - The terminate path is an OS signal, never a message, so workers can
//!   tell a restart instruction apart from a shutdown
//! - Worker logs go to stderr; stdout carries only protocol lines

pub mod channel;
pub mod protocol;

pub use channel::{LineReceiver, LineSender};
pub use protocol::{CoordinatorMessage, WorkerMessage};
