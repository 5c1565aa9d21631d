//! Transport layer error types.
//!
//! None of these escape the session: every one of them ends the current
//! connection attempt and is followed by a reconnect.

use thiserror::Error;

/// Connection-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Nobody is listening at the address.
    #[error("connection refused")]
    ConnectionRefused,

    /// The connector could not open a connection.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The attempt did not complete in time.
    #[error("connection attempt timed out")]
    Timeout,

    /// The link is gone.
    #[error("connection closed")]
    Closed,

    /// No async runtime was available to drive the session.
    #[error("no tokio runtime available")]
    NoRuntime,
}

/// Proof-of-possession handshake failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// The relay did not accept the signed assertion.
    #[error("handshake rejected: {0}")]
    Rejected(String),

    /// The signing function failed.
    #[error("signing failed: {0}")]
    Sign(String),

    /// The relay sent something other than the expected handshake frame.
    #[error("malformed handshake frame: {0}")]
    Malformed(String),

    /// The handshake did not complete in time.
    #[error("handshake timed out")]
    Timeout,

    /// The link dropped mid-handshake.
    #[error("link closed during handshake")]
    LinkClosed,
}
