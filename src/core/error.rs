//! Top-level error type.
//!
//! Each layer owns its error enum; [`Error`] aggregates them for callers that
//! want a single type.

use thiserror::Error;

use crate::schema::{DecodeError, ValidationError};

/// Every error the crate can produce.
#[derive(Debug, Error)]
pub enum Error {
    /// A value failed schema validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An inbound frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Connection-level failure.
    #[cfg(feature = "transport")]
    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    /// Proof-of-possession handshake failure.
    #[cfg(feature = "transport")]
    #[error("handshake error: {0}")]
    Handshake(#[from] crate::transport::HandshakeError),

    /// Key handling failure.
    #[cfg(feature = "auth")]
    #[error("identity error: {0}")]
    Identity(#[from] crate::auth::IdentityError),

    /// Negotiation controller failure.
    #[cfg(feature = "negotiation")]
    #[error("controller error: {0}")]
    Controller(#[from] crate::negotiation::ControllerError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;
