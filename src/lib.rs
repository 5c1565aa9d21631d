//! # media-relay-client
//!
//! Client side of a media relay's signaling protocol: publish a local track
//! or subscribe to a remote one through a relay that brokers offer/answer
//! and ICE candidate exchange.
//!
//! - **Resilience**: sessions reconnect forever with capped backoff and
//!   buffer outbound frames while disconnected
//! - **Trust boundary**: every inbound frame is validated into a closed
//!   envelope type before anything acts on it
//! - **Authentication**: publishers prove possession of an ECDSA key whose
//!   public half is their Client ID
//! - **Negotiation**: Sender and Receiver controllers drive an external
//!   peer-transport engine through an explicit IDLE/ACTIVE state machine
//!
//! ## Feature Flags
//!
//! - `transport` (default): resilient session, backoff, in-memory connector
//! - `websocket` (default): WebSocket connector
//! - `auth` (default): Client ID, ECDSA identity, challenge handshake
//! - `negotiation` (default): Sender / Receiver controllers
//!
//! ## Modules
//!
//! - [`core`]: event streams, constants and error types (always included)
//! - [`schema`]: validators and the signaling envelope (always included)
//! - [`transport`]: resilient session (requires `transport` feature)
//! - [`auth`]: authenticated sessions (requires `auth` feature)
//! - [`negotiation`]: controllers (requires `negotiation` feature)
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use media_relay_client::prelude::*;
//!
//! # fn engine() -> Arc<dyn PeerTransportEngine> { unimplemented!() }
//! # async fn run() -> media_relay_client::Result<()> {
//! let identity = Arc::new(ClientIdentity::generate(Curve::P256)?);
//! let sender = Sender::connect(
//!     "wss://relay.example.org/publish",
//!     Arc::new(WebSocketConnector::new()),
//!     identity.client_id(),
//!     identity,
//!     MediaKind::Video,
//!     engine(),
//! )?;
//!
//! sender.attach_track(MediaTrack::new("camera-0", MediaKind::Video)).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Trust-boundary validation (always included)
pub mod schema;

// Resilient session (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod transport;

// Authenticated sessions (feature-gated)
#[cfg(feature = "auth")]
#[cfg_attr(docsrs, doc(cfg(feature = "auth")))]
pub mod auth;

// Negotiation controllers (feature-gated)
#[cfg(feature = "negotiation")]
#[cfg_attr(docsrs, doc(cfg(feature = "negotiation")))]
pub mod negotiation;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{Error, EventStream, Result, Subject, Subscription};
    pub use crate::schema::{Envelope, IceCandidate, SdpType, SessionDescription, Signal};

    #[cfg(feature = "transport")]
    pub use crate::transport::{
        BackoffConfig, ConnectionState, Connector, Session, SessionBuilder, SessionConfig,
    };

    #[cfg(feature = "websocket")]
    pub use crate::transport::WebSocketConnector;

    #[cfg(feature = "auth")]
    pub use crate::auth::{ClientId, ClientIdentity, Curve, Signer};

    #[cfg(feature = "negotiation")]
    pub use crate::negotiation::{
        ControllerError, ControllerState, MediaKind, MediaTrack, PeerConfig, PeerTransport,
        PeerTransportEngine, Receiver, ReceiverParams, Sender, SenderOptions,
    };
}

// Re-export commonly used items at crate root
pub use crate::core::{Error, Result};
pub use crate::schema::{decode, Envelope};

#[cfg(feature = "transport")]
pub use crate::transport::{ConnectionState, Session, SessionBuilder};
