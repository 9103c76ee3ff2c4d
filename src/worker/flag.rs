//! The graceful-shutdown flag shared with the embedded server.
//!
//! This is the only piece of state the cluster exposes to the server it
//! hosts. The worker sets it when draining begins; the server reads it to
//! stop offering keep-alive (e.g. by answering with `Connection: close`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct GracefulFlag(Arc<AtomicBool>);

impl GracefulFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the worker as draining. Never cleared: a draining worker exits.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
