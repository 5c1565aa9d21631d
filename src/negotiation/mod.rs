//! Negotiation controllers.
//!
//! - [`Sender`] publishes a local track: offers, trickled candidates
//! - [`Receiver`] subscribes to a remote track: answers, inbound tracks
//!
//! Both run the same IDLE/ACTIVE state machine over a [`Session`] and drive
//! an external [`PeerTransportEngine`]. Failures never stop a controller;
//! they surface as state transitions or on `error_events()`. Only `close()`
//! ends one.
//!
//! [`Session`]: crate::transport::Session

mod controller;
mod engine;
mod receiver;
mod sender;

pub use controller::{ControllerError, ControllerState};
pub use engine::{
    IceServer, MediaKind, MediaTrack, PeerConfig, PeerConnectionState, PeerError, PeerEvent,
    PeerEventSink, PeerTransport, PeerTransportEngine, TrackSlot,
};
pub use receiver::{Receiver, ReceiverParams};
pub use sender::{Sender, SenderOptions};
