//! Subscribing controller.
//!
//! A [`Receiver`] subscribes to one stream of one [`MediaKind`]. The relay
//! sends offers; the receiver answers them and exposes the resulting inbound
//! track, keeping at most one track per kind.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use url::Url;

use super::controller::{
    self, accept, closed, next_input, transmit, ControllerError, ControllerHandle,
    ControllerState, Input, PeerSlot, Shared,
};
use super::engine::{MediaKind, MediaTrack, PeerConfig, PeerEvent, PeerTransportEngine};
use crate::core::constants::{PARAM_KEY_ID, PARAM_KIND, PARAM_STREAM_ID};
use crate::core::{lock, Error, EventStream, Result, Subject};
use crate::schema::{Envelope, SdpType, SessionDescription, Signal};
use crate::transport::{ConnectionState, Connector, Session, SessionBuilder};

/// Identifies the stream a [`Receiver`] subscribes to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiverParams {
    /// Key identifier of the publisher.
    pub key_id: String,
    /// Stream identifier.
    pub stream_id: String,
    /// Media kind to receive.
    pub kind: MediaKind,
}

impl ReceiverParams {
    /// Subscribe to `stream_id` of publisher `key_id`.
    pub fn new(key_id: impl Into<String>, stream_id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            key_id: key_id.into(),
            stream_id: stream_id.into(),
            kind,
        }
    }

    /// `base` with `keyId`, `streamId` and `kind` set as query parameters.
    ///
    /// Existing values for those keys are replaced; other parameters are kept.
    pub fn address(&self, base: &str) -> Result<String> {
        let mut url =
            Url::parse(base).map_err(|e| Error::Config(format!("invalid address {base}: {e}")))?;

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| ![PARAM_KEY_ID, PARAM_STREAM_ID, PARAM_KIND].contains(&key.as_ref()))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair(PARAM_KEY_ID, &self.key_id)
            .append_pair(PARAM_STREAM_ID, &self.stream_id)
            .append_pair(PARAM_KIND, self.kind.as_str());

        Ok(url.into())
    }
}

#[derive(Default)]
struct Inbound {
    tracks: Mutex<BTreeMap<MediaKind, MediaTrack>>,
    events: Subject<MediaTrack>,
}

impl Inbound {
    fn replace(&self, track: MediaTrack) {
        let previous = lock(&self.tracks).insert(track.kind(), track.clone());
        if let Some(previous) = previous {
            debug!(old = previous.id(), new = track.id(), "inbound track replaced");
        }
        self.events.emit(track);
    }
}

/// Receives one remote track through the relay.
///
/// Dropping the receiver closes it.
pub struct Receiver {
    kind: MediaKind,
    inbound: Arc<Inbound>,
    handle: ControllerHandle<Infallible>,
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("session", self.handle.session())
            .finish()
    }
}

impl Receiver {
    /// Create a receiver over `session` and start connecting.
    ///
    /// The session address must already identify the stream; see
    /// [`Receiver::connect`]. Must be called from within a Tokio runtime.
    pub fn new(
        session: SessionBuilder,
        kind: MediaKind,
        engine: Arc<dyn PeerTransportEngine>,
        peer_config: Option<PeerConfig>,
    ) -> Result<Self> {
        let inbound = Arc::new(Inbound::default());
        let (handle, wiring) = controller::wire(session);

        let actor = ReceiverActor {
            kind,
            inbound: Arc::clone(&inbound),
            session: wiring.session,
            slot: PeerSlot::new(engine, peer_config, wiring.inputs, Arc::clone(&wiring.shared)),
            shared: wiring.shared,
        };
        controller::launch(handle.session(), actor.run(wiring.rx))?;

        Ok(Self {
            kind,
            inbound,
            handle,
        })
    }

    /// Subscribe to the stream named by `params` at `address`.
    pub fn connect(
        address: &str,
        connector: Arc<dyn Connector>,
        params: ReceiverParams,
        engine: Arc<dyn PeerTransportEngine>,
    ) -> Result<Self> {
        let session = SessionBuilder::new(params.address(address)?, connector);
        Self::new(session, params.kind, engine, None)
    }

    /// The declared media kind.
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Current inbound tracks, at most one per kind.
    pub fn inbound_tracks(&self) -> Vec<MediaTrack> {
        lock(&self.inbound.tracks).values().cloned().collect()
    }

    /// Every inbound track as it replaces the previous one.
    pub fn track_events(&self) -> EventStream<MediaTrack> {
        self.inbound.events.stream()
    }

    /// Current controller state.
    pub fn state(&self) -> ControllerState {
        self.handle.state()
    }

    /// IDLE/ACTIVE transitions.
    pub fn state_events(&self) -> EventStream<ControllerState> {
        self.handle.state_events()
    }

    /// Recoverable failures: engine errors, incomplete negotiations, relay errors.
    pub fn error_events(&self) -> EventStream<ControllerError> {
        self.handle.error_events()
    }

    /// The underlying signaling session.
    pub fn session(&self) -> &Session {
        self.handle.session()
    }

    /// Check if [`Receiver::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Release the handle, stop the controller and close the session. Idempotent.
    pub fn close(&self) {
        self.handle.close();
    }
}

struct ReceiverActor {
    kind: MediaKind,
    inbound: Arc<Inbound>,
    session: Arc<Session>,
    shared: Arc<Shared>,
    slot: PeerSlot<Infallible>,
}

impl ReceiverActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Input<Infallible>>) {
        let mut close_rx = self.shared.close_signal();

        while let Some(input) = next_input(&mut close_rx, &mut rx).await {
            tokio::select! {
                _ = closed(&mut close_rx) => break,
                _ = self.step(input) => {}
            }
        }

        self.slot.teardown();
        debug!(kind = %self.kind, "receiver stopped");
    }

    async fn step(&mut self, input: Input<Infallible>) {
        match input {
            Input::Session(ConnectionState::Connected) => self.activate(),
            Input::Session(ConnectionState::Disconnected) => self.slot.teardown(),
            Input::Session(ConnectionState::Connecting) => {}
            Input::Message(frame) => self.on_message(&frame).await,
            Input::Peer { generation, event } => {
                if self.slot.is_current(generation) {
                    self.on_peer(event);
                } else {
                    trace!(generation, "dropping event from released handle");
                }
            }
            Input::Command(never) => match never {},
            Input::Shutdown => {}
        }
    }

    fn activate(&mut self) {
        if let Err(e) = self.slot.ensure_active() {
            self.shared.publish(e.into());
        }
    }

    fn on_peer(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Track(track) if track.kind() == self.kind => self.inbound.replace(track),
            PeerEvent::Track(track) => {
                debug!(expected = %self.kind, actual = %track.kind(), "ignoring track of other kind");
            }
            PeerEvent::IceCandidate(candidate) => {
                transmit(&self.session, &Envelope::ice_candidate(candidate));
            }
            PeerEvent::ConnectionState(state) if state.is_lost() => {
                info!(?state, "peer transport lost, rebuilding handle");
                self.slot.teardown();
                if self.session.state() == ConnectionState::Connected {
                    self.activate();
                }
            }
            PeerEvent::ConnectionState(state) => trace!(?state, "peer state"),
            PeerEvent::NegotiationNeeded => trace!("receiver waits for the remote offer"),
        }
    }

    async fn on_message(&mut self, frame: &str) {
        let Some(Envelope::Signalling(signal)) = accept(&self.shared, frame) else {
            return;
        };

        match signal {
            Signal::Description(offer) if offer.sdp_type == SdpType::Offer => self.answer(offer).await,
            Signal::Description(_) => {
                info!("unexpected answer, abandoning negotiation");
                self.slot.teardown();
            }
            Signal::IceCandidate(candidate) => {
                let handle = match self.slot.ensure_active() {
                    Ok(handle) => handle,
                    Err(e) => return self.shared.publish(e.into()),
                };
                if let Err(e) = handle.add_ice_candidate(candidate).await {
                    self.shared.publish(e.into());
                }
            }
        }
    }

    async fn answer(&mut self, offer: SessionDescription) {
        let handle = match self.slot.ensure_active() {
            Ok(handle) => handle,
            Err(e) => return self.shared.publish(e.into()),
        };

        if let Err(e) = handle.set_remote_description(offer).await {
            return self.shared.publish(e.into());
        }
        let answer = match handle.create_answer().await {
            Ok(answer) => answer,
            Err(e) => return self.shared.publish(e.into()),
        };
        if answer.sdp_type != SdpType::Answer || !answer.is_usable() {
            return self.shared.publish(ControllerError::NegotiationIncomplete);
        }
        if let Err(e) = handle.set_local_description(answer.clone()).await {
            return self.shared.publish(e.into());
        }

        debug!(kind = %self.kind, "sending answer");
        transmit(&self.session, &Envelope::description(answer));
    }
}
