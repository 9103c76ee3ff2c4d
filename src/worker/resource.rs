//! Contract between the worker runtime and the server it hosts.

use futures_util::future::BoxFuture;

/// What the drain cascade needs from the embedded server.
///
/// The server itself is opaque to the cluster: it is only asked how many
/// connections are live, told to stop accepting, and awaited until closed.
pub trait ServerResource: Send + Sync + 'static {
    /// Connections currently open.
    fn connection_count(&self) -> usize;

    /// Stop accepting new connections and begin closing.
    fn close(&self);

    /// Resolves once the server has fully stopped.
    fn closed(&self) -> BoxFuture<'static, ()>;
}
