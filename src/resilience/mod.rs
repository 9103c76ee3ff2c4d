//! Resilience helpers.
//!
//! # Design Decisions
//! - A failed fork is retried, never abandoned: the cluster keeps converging
//!   on its desired worker count
//! - Retries back off exponentially with jitter

pub mod backoff;
