//! In-process transport.
//!
//! [`memory_pair`] returns a connector and the server side that accepts its
//! connections. Used by the test suites and handy for wiring two components
//! of the same process together without sockets.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use super::error::TransportError;
use super::link::{Connector, Link};

/// Create a connected connector/server pair.
pub fn memory_pair() -> (MemoryConnector, MemoryServer) {
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    (
        MemoryConnector {
            accept_tx,
            attempts: Arc::new(AtomicUsize::new(0)),
        },
        MemoryServer { accept_rx },
    )
}

/// Client side of an in-process transport.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    attempts: Arc<AtomicUsize>,
}

impl MemoryConnector {
    /// Total number of `connect` calls across all clones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, address: &str) -> Result<Link, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let (local, remote) = Link::pair();
        let peer = MemoryPeer {
            address: address.to_owned(),
            link: remote,
        };
        self.accept_tx
            .send(peer)
            .map_err(|_| TransportError::ConnectionRefused)?;

        trace!(address, "memory link opened");
        Ok(local)
    }
}

/// Server side of an in-process transport.
#[derive(Debug)]
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
    /// Wait for the next connection. `None` once every connector is gone.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }

    /// Take a pending connection without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.try_recv().ok()
    }
}

/// The server's end of one accepted connection.
#[derive(Debug)]
pub struct MemoryPeer {
    address: String,
    link: Link,
}

impl MemoryPeer {
    /// Address the client connected to, including any query parameters.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send a frame to the client.
    pub fn send(&self, frame: impl Into<String>) -> Result<(), TransportError> {
        self.link.send(frame)
    }

    /// Wait for the next frame from the client.
    pub async fn recv(&mut self) -> Option<String> {
        self.link.recv().await
    }

    /// Drop the connection from the server side.
    pub fn disconnect(self) {
        trace!(address = %self.address, "memory link closed by server");
    }
}
