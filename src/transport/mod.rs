//! Resilient signaling transport.
//!
//! This layer turns a flaky duplex connection into a [`Session`] that:
//!
//! - **Reconnects** after every drop, with capped exponential [`Backoff`]
//! - **Buffers** outbound frames while disconnected and flushes them in order
//! - **Publishes** inbound frames and [`ConnectionState`] changes as events
//!
//! Connections come from a [`Connector`] (WebSocket, or in-memory for tests)
//! and may be gated by a [`Handshake`] before they count as connected.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   Sender / Receiver controllers         │
//! ├─────────────────────────────────────────┤
//! │         Session                         │  ← This module
//! │   reconnect, buffering, events          │
//! ├─────────────────────────────────────────┤
//! │   Connector (+ Handshake)               │
//! └─────────────────────────────────────────┘
//! ```

mod backoff;
mod config;
mod error;
mod link;
pub mod memory;
mod session;
#[cfg(feature = "websocket")]
mod websocket;

pub use backoff::{Backoff, BackoffConfig};
pub use config::SessionConfig;
pub use error::*;
pub use link::{Connector, Handshake, Link};
pub use memory::{memory_pair, MemoryConnector, MemoryPeer, MemoryServer};
pub(crate) use session::closed;
pub use session::{ConnectionState, Session, SessionBuilder};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;
