//! Authenticated sessions.
//!
//! A publisher proves possession of the private key behind its [`ClientId`]
//! before the relay admits it:
//!
//! - [`ClientIdentity`] holds an ECDSA key pair and derives the Client ID
//! - [`Signer`] abstracts the signing function (which may suspend)
//! - [`ChallengeHandshake`] runs the challenge exchange on every connection
//!
//! Use [`authenticated`] to get a [`SessionBuilder`] with the handshake wired in.

mod handshake;
mod identity;

use std::sync::Arc;

pub use handshake::ChallengeHandshake;
pub use identity::{
    client_id, ClientId, ClientIdentity, Curve, FnSigner, IdentityError, SignError, Signer,
};

use crate::transport::{Connector, SessionBuilder};

/// A session builder that authenticates as `client_id` on every connection.
pub fn authenticated(
    address: impl Into<String>,
    connector: Arc<dyn Connector>,
    client_id: ClientId,
    signer: Arc<dyn Signer>,
) -> SessionBuilder {
    SessionBuilder::new(address, connector)
        .handshake(Arc::new(ChallengeHandshake::new(client_id, signer)))
}
