//! Peer-transport engine boundary.
//!
//! The controllers never touch media or ICE themselves. They drive an
//! external engine (a WebRTC stack, a test double) through two traits:
//!
//! - [`PeerTransportEngine`] creates handles
//! - [`PeerTransport`] is one handle: tracks, descriptions, candidates
//!
//! Handles report back through the [`PeerEventSink`] they were created with.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::{IceCandidate, SessionDescription};

/// Media kind of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio track.
    Audio,
    /// Video track.
    Video,
}

impl MediaKind {
    /// The lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = crate::core::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            other => Err(crate::core::Error::Config(format!("unknown media kind: {other}"))),
        }
    }
}

/// A media track as seen by the controllers: an opaque id and a kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaTrack {
    id: String,
    kind: MediaKind,
}

impl MediaTrack {
    /// Describe a track.
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Engine-assigned identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Media kind.
    pub fn kind(&self) -> MediaKind {
        self.kind
    }
}

/// Engine handle for one outbound track slot, used to replace or remove it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackSlot(pub u64);

/// One STUN/TURN server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServer {
    /// Server URLs, e.g. `stun:stun.example.org:3478`.
    pub urls: Vec<String>,
    /// TURN username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// TURN credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// A server without credentials.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Self::default()
        }
    }
}

/// Optional configuration passed to the engine for every new handle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConfig {
    /// ICE servers.
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,
}

impl PeerConfig {
    /// Add an ICE server.
    pub fn with_ice_server(mut self, server: IceServer) -> Self {
        self.ice_servers.push(server);
        self
    }
}

/// Aggregate connection state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerConnectionState {
    /// Created, nothing exchanged yet.
    New,
    /// ICE/DTLS in progress.
    Connecting,
    /// Media can flow.
    Connected,
    /// Connectivity lost; may recover but the controllers do not wait for it.
    Disconnected,
    /// Connectivity could not be established.
    Failed,
    /// The handle was closed.
    Closed,
}

impl PeerConnectionState {
    /// Check if the controller should rebuild its handle.
    pub fn is_lost(self) -> bool {
        matches!(self, PeerConnectionState::Disconnected | PeerConnectionState::Failed)
    }
}

/// Notification from a handle.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// The local description must be renegotiated.
    NegotiationNeeded,
    /// A local candidate was discovered.
    IceCandidate(IceCandidate),
    /// A remote track arrived.
    Track(MediaTrack),
    /// The aggregate connection state changed.
    ConnectionState(PeerConnectionState),
}

/// Where a handle reports its [`PeerEvent`]s.
#[derive(Clone)]
pub struct PeerEventSink {
    deliver: Arc<dyn Fn(PeerEvent) + Send + Sync>,
}

impl PeerEventSink {
    /// Deliver events to `deliver`.
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(PeerEvent) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Report an event. Events from a handle that was already torn down are
    /// discarded by the controller.
    pub fn emit(&self, event: PeerEvent) {
        (self.deliver)(event);
    }
}

impl fmt::Debug for PeerEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PeerEventSink")
    }
}

/// Engine failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    /// The engine reported an error.
    #[error("peer engine error: {0}")]
    Failed(String),

    /// The handle is closed.
    #[error("peer handle closed")]
    Closed,
}

/// Creates peer-transport handles.
pub trait PeerTransportEngine: Send + Sync + 'static {
    /// Create a handle that reports to `events`.
    fn create(
        &self,
        config: Option<&PeerConfig>,
        events: PeerEventSink,
    ) -> Result<Box<dyn PeerTransport>, PeerError>;
}

/// One peer-transport handle.
///
/// Owned exclusively by a single controller.
#[async_trait]
pub trait PeerTransport: Send {
    /// Add an outbound track.
    async fn add_track(&mut self, track: &MediaTrack) -> Result<TrackSlot, PeerError>;

    /// Swap the track in an existing slot without renegotiating.
    async fn replace_track(&mut self, slot: TrackSlot, track: &MediaTrack)
        -> Result<(), PeerError>;

    /// Remove an outbound track.
    async fn remove_track(&mut self, slot: TrackSlot) -> Result<(), PeerError>;

    /// Generate an offer.
    async fn create_offer(&mut self) -> Result<SessionDescription, PeerError>;

    /// Generate an answer to the applied remote offer.
    async fn create_answer(&mut self) -> Result<SessionDescription, PeerError>;

    /// Apply the local description.
    async fn set_local_description(&mut self, description: SessionDescription)
        -> Result<(), PeerError>;

    /// Apply the remote description.
    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), PeerError>;

    /// Apply a remote candidate.
    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), PeerError>;

    /// Release the handle. No events may be delivered afterwards.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_media_kind_names() {
        assert_eq!(MediaKind::Audio.to_string(), "audio");
        assert_eq!("video".parse::<MediaKind>().unwrap(), MediaKind::Video);
        assert!(matches!(
            "screen".parse::<MediaKind>(),
            Err(crate::core::Error::Config(message)) if message == "unknown media kind: screen"
        ));
        assert_eq!(serde_json::to_value(MediaKind::Video).unwrap(), json!("video"));
    }

    #[test]
    fn test_peer_config_serialization() {
        let config = PeerConfig::default().with_ice_server(IceServer::new("stun:stun.test:3478"));
        assert_eq!(
            serde_json::to_value(&config).unwrap(),
            json!({"iceServers": [{"urls": ["stun:stun.test:3478"]}]})
        );

        let parsed: PeerConfig = serde_json::from_value(json!({})).unwrap();
        assert!(parsed.ice_servers.is_empty());
    }

    #[test]
    fn test_sink_delivers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            PeerEventSink::new(move |event| seen.lock().unwrap().push(event))
        };

        sink.clone().emit(PeerEvent::NegotiationNeeded);
        sink.emit(PeerEvent::ConnectionState(PeerConnectionState::Failed));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(
            seen[1],
            PeerEvent::ConnectionState(state) if state.is_lost()
        ));
    }
}
