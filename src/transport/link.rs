//! The duplex connection boundary.
//!
//! A [`Link`] is one live connection, exposed as a pair of text-frame
//! channels. A [`Connector`] opens links; a [`Handshake`] optionally runs on a
//! fresh link before the session treats it as connected.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::{HandshakeError, TransportError};

/// One live duplex connection carrying text frames.
///
/// Dropping the link closes it. A closed remote end shows up as
/// [`Link::recv`] returning `None`.
#[derive(Debug)]
pub struct Link {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<String>,
}

impl Link {
    /// Build a link from its two halves.
    pub fn new(
        outgoing: mpsc::UnboundedSender<String>,
        incoming: mpsc::UnboundedReceiver<String>,
    ) -> Self {
        Self { outgoing, incoming }
    }

    /// Two links connected back to back.
    pub fn pair() -> (Link, Link) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        (Link::new(a_tx, b_rx), Link::new(b_tx, a_rx))
    }

    /// Queue a frame for transmission.
    pub fn send(&self, frame: impl Into<String>) -> Result<(), TransportError> {
        self.outgoing
            .send(frame.into())
            .map_err(|_| TransportError::Closed)
    }

    /// Wait for the next frame. `None` once the remote end is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<String>,
        mpsc::UnboundedReceiver<String>,
    ) {
        (self.outgoing, self.incoming)
    }
}

/// Opens links to an address.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open one connection.
    async fn connect(&self, address: &str) -> Result<Link, TransportError>;
}

/// Admission step run on every fresh link before it counts as connected.
#[async_trait]
pub trait Handshake: Send + Sync + 'static {
    /// Rewrite the session address, e.g. to add identifying query parameters.
    fn address(&self, base: &str) -> String {
        base.to_owned()
    }

    /// Exchange frames on `link` until the remote end admits or rejects us.
    ///
    /// Called once per connection attempt.
    async fn admit(&self, link: &mut Link) -> Result<(), HandshakeError>;
}
