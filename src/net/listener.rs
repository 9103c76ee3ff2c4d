//! Shared-port listener for workers.
//!
//! # Responsibilities
//! - Bind with SO_REUSEPORT so every worker listens on the same address and
//!   the kernel spreads connections between them
//! - Wrap accepted streams so the tracker sees every live connection
//! - Keep accepting through transient accept errors

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};

use crate::net::connection::{ConnectionTracker, TrackedStream};

const ACCEPT_BACKLOG: u32 = 1024;

/// Bind `addr` so that several processes can listen on it at once.
pub fn bind_shared(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    socket.listen(ACCEPT_BACKLOG)
}

/// A listener whose connections are counted by a [`ConnectionTracker`].
pub struct TrackedListener {
    inner: TcpListener,
    tracker: ConnectionTracker,
}

impl TrackedListener {
    pub fn new(inner: TcpListener, tracker: ConnectionTracker) -> Self {
        Self { inner, tracker }
    }
}

impl axum::serve::Listener for TrackedListener {
    type Io = TrackedStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.accept().await {
                Ok((stream, addr)) => {
                    let guard = self.tracker.track();
                    tracing::debug!(peer_addr = %addr, connection_id = %guard.id(), "Connection accepted");
                    return (TrackedStream::new(stream, guard), addr);
                }
                Err(e) => {
                    // Typically EMFILE; back off instead of spinning.
                    tracing::warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}
