//! Publishing controller.
//!
//! A [`Sender`] pushes one local track of a fixed [`MediaKind`] to the relay.
//! It creates a peer-transport handle whenever the session connects (or a
//! track is attached), answers the engine's renegotiation requests with
//! offers, and trickles local candidates as they appear.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use super::controller::{
    self, accept, closed, next_input, transmit, ControllerError, ControllerHandle,
    ControllerState, Input, PeerSlot, Shared,
};
use super::engine::{MediaKind, MediaTrack, PeerConfig, PeerEvent, PeerTransportEngine, TrackSlot};
use crate::core::{EventStream, Result};
use crate::schema::{Envelope, SdpType, Signal};
use crate::transport::{ConnectionState, Session, SessionBuilder};

/// How to set up a [`Sender`].
#[derive(Debug, Clone, PartialEq)]
pub struct SenderOptions {
    kind: MediaKind,
    track: Option<MediaTrack>,
    peer_config: Option<PeerConfig>,
}

impl SenderOptions {
    /// Publish tracks of `kind`; the track is attached later.
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            track: None,
            peer_config: None,
        }
    }

    /// Publish `track` from the start.
    pub fn with_track(track: MediaTrack) -> Self {
        Self {
            kind: track.kind(),
            track: Some(track),
            peer_config: None,
        }
    }

    /// Configuration handed to the engine for every handle.
    pub fn peer_config(mut self, config: PeerConfig) -> Self {
        self.peer_config = Some(config);
        self
    }
}

impl From<MediaKind> for SenderOptions {
    fn from(kind: MediaKind) -> Self {
        Self::new(kind)
    }
}

impl From<MediaTrack> for SenderOptions {
    fn from(track: MediaTrack) -> Self {
        Self::with_track(track)
    }
}

pub(crate) enum Command {
    Attach(MediaTrack, oneshot::Sender<Result<(), ControllerError>>),
    Detach(oneshot::Sender<Result<(), ControllerError>>),
}

/// Publishes one local track through the relay.
///
/// Dropping the sender closes it.
pub struct Sender {
    kind: MediaKind,
    handle: ControllerHandle<Command>,
}

impl std::fmt::Debug for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("session", self.handle.session())
            .finish()
    }
}

impl Sender {
    /// Create a sender over `session` and start connecting.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        session: SessionBuilder,
        options: impl Into<SenderOptions>,
        engine: Arc<dyn PeerTransportEngine>,
    ) -> Result<Self> {
        let options = options.into();
        let kind = options.kind;
        let (handle, wiring) = controller::wire(session);

        let actor = SenderActor {
            kind,
            track: options.track,
            outbound: None,
            session: wiring.session,
            slot: PeerSlot::new(
                engine,
                options.peer_config,
                wiring.inputs,
                Arc::clone(&wiring.shared),
            ),
            shared: wiring.shared,
        };
        controller::launch(handle.session(), actor.run(wiring.rx))?;

        Ok(Self { kind, handle })
    }

    /// Create a sender that authenticates as `client_id` on every connection.
    #[cfg(feature = "auth")]
    pub fn connect(
        address: impl Into<String>,
        connector: Arc<dyn crate::transport::Connector>,
        client_id: crate::auth::ClientId,
        signer: Arc<dyn crate::auth::Signer>,
        options: impl Into<SenderOptions>,
        engine: Arc<dyn PeerTransportEngine>,
    ) -> Result<Self> {
        let session = crate::auth::authenticated(address, connector, client_id, signer);
        Self::new(session, options, engine)
    }

    /// The declared media kind.
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Publish `track`, replacing any previously attached track.
    ///
    /// A track of the wrong kind is rejected with
    /// [`ControllerError::KindMismatch`] and tears down the active handle.
    pub async fn attach_track(&self, track: MediaTrack) -> Result<(), ControllerError> {
        let (reply, response) = oneshot::channel();
        self.handle.command(Command::Attach(track, reply))?;
        response.await.map_err(|_| ControllerError::Closed)?
    }

    /// Stop publishing the current track.
    pub async fn detach_track(&self) -> Result<(), ControllerError> {
        let (reply, response) = oneshot::channel();
        self.handle.command(Command::Detach(reply))?;
        response.await.map_err(|_| ControllerError::Closed)?
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

    /// Check if [`Sender::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Release the handle, stop the controller and close the session. Idempotent.
    pub fn close(&self) {
        self.handle.close();
    }
}

struct SenderActor {
    kind: MediaKind,
    track: Option<MediaTrack>,
    outbound: Option<TrackSlot>,
    session: Arc<Session>,
    shared: Arc<Shared>,
    slot: PeerSlot<Command>,
}

impl SenderActor {
    async fn run(mut self, mut rx: tokio::sync::mpsc::UnboundedReceiver<Input<Command>>) {
        let mut close_rx = self.shared.close_signal();

        if self.track.is_some() {
            tokio::select! {
                _ = closed(&mut close_rx) => {}
                _ = self.activate() => {}
            }
        }

        while let Some(input) = next_input(&mut close_rx, &mut rx).await {
            tokio::select! {
                _ = closed(&mut close_rx) => break,
                _ = self.step(input) => {}
            }
        }

        self.teardown();
        debug!(kind = %self.kind, "sender stopped");
    }

    async fn step(&mut self, input: Input<Command>) {
        match input {
            Input::Session(state) => self.on_session(state).await,
            Input::Message(frame) => self.on_message(&frame).await,
            Input::Peer { generation, event } => {
                if self.slot.is_current(generation) {
                    self.on_peer(event).await;
                } else {
                    trace!(generation, "dropping event from released handle");
                }
            }
            Input::Command(Command::Attach(track, reply)) => {
                let _ = reply.send(self.attach(track).await);
            }
            Input::Command(Command::Detach(reply)) => {
                let _ = reply.send(self.detach().await);
            }
            Input::Shutdown => {}
        }
    }

    fn teardown(&mut self) {
        self.slot.teardown();
        self.outbound = None;
    }

    async fn activate(&mut self) {
        if let Err(e) = self.slot.ensure_active() {
            self.shared.publish(e.into());
            return;
        }
        if let Err(e) = self.push_track().await {
            self.shared.publish(e);
        }
    }

    /// Put the stored track on the handle, reusing the existing slot.
    async fn push_track(&mut self) -> Result<(), ControllerError> {
        let Some(track) = self.track.clone() else {
            return Ok(());
        };
        let Some(handle) = self.slot.handle() else {
            return Ok(());
        };

        match self.outbound {
            Some(slot) => handle.replace_track(slot, &track).await?,
            None => self.outbound = Some(handle.add_track(&track).await?),
        }
        debug!(kind = %self.kind, track = track.id(), "outbound track attached");
        Ok(())
    }

    async fn attach(&mut self, track: MediaTrack) -> Result<(), ControllerError> {
        if track.kind() != self.kind {
            warn!(expected = %self.kind, actual = %track.kind(), "rejecting track of wrong kind");
            self.teardown();
            return Err(ControllerError::KindMismatch {
                expected: self.kind,
                actual: track.kind(),
            });
        }

        self.track = Some(track);
        self.slot.ensure_active()?;
        self.push_track().await
    }

    async fn detach(&mut self) -> Result<(), ControllerError> {
        self.track = None;
        if let (Some(slot), Some(handle)) = (self.outbound.take(), self.slot.handle()) {
            handle.remove_track(slot).await?;
            debug!(kind = %self.kind, "outbound track removed");
        }
        Ok(())
    }

    async fn on_session(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Connected => self.activate().await,
            ConnectionState::Disconnected => self.teardown(),
            ConnectionState::Connecting => {}
        }
    }

    async fn on_peer(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::NegotiationNeeded => self.negotiate().await,
            PeerEvent::IceCandidate(candidate) => {
                transmit(&self.session, &Envelope::ice_candidate(candidate));
            }
            PeerEvent::Track(track) => {
                debug!(track = track.id(), "sender ignores inbound track");
            }
            PeerEvent::ConnectionState(state) if state.is_lost() => {
                info!(?state, "peer transport lost, rebuilding handle");
                self.teardown();
                if self.session.state() == ConnectionState::Connected {
                    self.activate().await;
                }
            }
            PeerEvent::ConnectionState(state) => trace!(?state, "peer state"),
        }
    }

    async fn negotiate(&mut self) {
        let Some(handle) = self.slot.handle() else {
            return;
        };

        let offer = match handle.create_offer().await {
            Ok(offer) => offer,
            Err(e) => return self.shared.publish(e.into()),
        };
        if offer.sdp_type != SdpType::Offer || !offer.is_usable() {
            return self.shared.publish(ControllerError::NegotiationIncomplete);
        }
        if let Err(e) = handle.set_local_description(offer.clone()).await {
            return self.shared.publish(e.into());
        }

        debug!(kind = %self.kind, "sending offer");
        transmit(&self.session, &Envelope::description(offer));
    }

    async fn on_message(&mut self, frame: &str) {
        let Some(Envelope::Signalling(signal)) = accept(&self.shared, frame) else {
            return;
        };

        match signal {
            Signal::Description(answer) if answer.sdp_type == SdpType::Answer => {
                let Some(handle) = self.slot.handle() else {
                    debug!("answer while idle dropped");
                    return;
                };
                if let Err(e) = handle.set_remote_description(answer).await {
                    self.shared.publish(e.into());
                }
            }
            Signal::Description(_) => debug!("sender ignores inbound offer"),
            Signal::IceCandidate(candidate) => {
                let Some(handle) = self.slot.handle() else {
                    debug!("candidate while idle dropped");
                    return;
                };
                if let Err(e) = handle.add_ice_candidate(candidate).await {
                    self.shared.publish(e.into());
                }
            }
        }
    }
}
