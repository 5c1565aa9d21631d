//! Shared machinery of the Sender and Receiver controllers.
//!
//! Each controller is split in two halves:
//!
//! - a handle ([`ControllerHandle`]) owned by the caller, exposing state and
//!   error streams and forwarding commands
//! - an actor task that owns the [`Session`] events, the peer-transport handle
//!   ([`PeerSlot`]) and processes every [`Input`] strictly in order
//!
//! ```text
//!   session states ─┐
//!   session frames ─┼──► mpsc ──► actor ──► PeerTransport
//!   peer events ────┤                └────► Session::send
//!   commands ───────┘
//! ```
//!
//! The IDLE/ACTIVE state lives in [`PeerSlot`]: ACTIVE exactly when a handle
//! exists. [`PeerSlot::ensure_active`] is idempotent and
//! [`PeerSlot::teardown`] releases the handle fully.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::engine::{
    MediaKind, PeerConfig, PeerError, PeerEvent, PeerEventSink, PeerTransport,
    PeerTransportEngine,
};
use crate::core::{lock, EventStream, Subject, Subscription};
use crate::schema::{self, Envelope, RemoteError};
use crate::transport::{ConnectionState, Session, SessionBuilder, TransportError};

/// Whether a controller currently holds a peer-transport handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    /// No handle.
    Idle,
    /// A handle exists and is wired to the session.
    Active,
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerState::Idle => f.write_str("IDLE"),
            ControllerState::Active => f.write_str("ACTIVE"),
        }
    }
}

/// Controller failures.
///
/// Only track operations return these to the caller; everything else is
/// published on the controller's error stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// The track does not match the controller's media kind.
    #[error("track kind {actual} does not match controller kind {expected}")]
    KindMismatch {
        /// The controller's kind.
        expected: MediaKind,
        /// The offending track's kind.
        actual: MediaKind,
    },

    /// The engine produced no usable session description.
    #[error("negotiation produced no usable session description")]
    NegotiationIncomplete,

    /// The engine failed.
    #[error(transparent)]
    Peer(#[from] PeerError),

    /// The relay reported an error.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The controller was closed.
    #[error("controller closed")]
    Closed,
}

/// Everything an actor reacts to.
pub(crate) enum Input<C> {
    Session(ConnectionState),
    Message(String),
    Peer { generation: u64, event: PeerEvent },
    Command(C),
    Shutdown,
}

/// State observable from outside the actor.
pub(crate) struct Shared {
    state: Mutex<ControllerState>,
    states: Subject<ControllerState>,
    errors: Subject<ControllerError>,
    close_tx: watch::Sender<bool>,
}

impl Shared {
    fn new() -> Self {
        let (close_tx, _) = watch::channel(false);
        Self {
            state: Mutex::new(ControllerState::Idle),
            states: Subject::new(),
            errors: Subject::new(),
            close_tx,
        }
    }

    fn set_state(&self, next: ControllerState) {
        {
            let mut state = lock(&self.state);
            if *state == next {
                return;
            }
            *state = next;
        }
        debug!(state = %next, "controller state changed");
        self.states.emit(next);
    }

    pub(crate) fn publish(&self, error: ControllerError) {
        warn!(error = %error, "controller error");
        self.errors.emit(error);
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.close_tx.borrow()
    }

    pub(crate) fn close_signal(&self) -> watch::Receiver<bool> {
        self.close_tx.subscribe()
    }
}

/// Caller-side half of a controller.
pub(crate) struct ControllerHandle<C> {
    session: Arc<Session>,
    inputs: mpsc::UnboundedSender<Input<C>>,
    shared: Arc<Shared>,
    subscriptions: Mutex<Vec<Subscription>>,
}

/// Actor-side wiring produced by [`wire`].
pub(crate) struct Wiring<C> {
    pub(crate) session: Arc<Session>,
    pub(crate) inputs: mpsc::UnboundedSender<Input<C>>,
    pub(crate) rx: mpsc::UnboundedReceiver<Input<C>>,
    pub(crate) shared: Arc<Shared>,
}

/// Build the session and subscribe to its events. The session is not started.
pub(crate) fn wire<C: Send + 'static>(builder: SessionBuilder) -> (ControllerHandle<C>, Wiring<C>) {
    let session = Arc::new(builder.build());
    let (inputs, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::new());

    let states = {
        let inputs = inputs.clone();
        session.state_events().subscribe(move |state: &ConnectionState| {
            let _ = inputs.send(Input::Session(*state));
        })
    };
    let messages = {
        let inputs = inputs.clone();
        session.message_events().subscribe(move |frame: &String| {
            let _ = inputs.send(Input::Message(frame.clone()));
        })
    };

    let handle = ControllerHandle {
        session: Arc::clone(&session),
        inputs: inputs.clone(),
        shared: Arc::clone(&shared),
        subscriptions: Mutex::new(vec![states, messages]),
    };
    let wiring = Wiring {
        session,
        inputs,
        rx,
        shared,
    };
    (handle, wiring)
}

/// Spawn `actor` and start the session.
pub(crate) fn launch<F>(session: &Session, actor: F) -> Result<(), TransportError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
    runtime.spawn(actor);
    session.start()
}

impl<C: Send + 'static> ControllerHandle<C> {
    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn state(&self) -> ControllerState {
        *lock(&self.shared.state)
    }

    pub(crate) fn state_events(&self) -> EventStream<ControllerState> {
        self.shared.states.stream()
    }

    pub(crate) fn error_events(&self) -> EventStream<ControllerError> {
        self.shared.errors.stream()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    pub(crate) fn command(&self, command: C) -> Result<(), ControllerError> {
        if self.is_closed() {
            return Err(ControllerError::Closed);
        }
        self.inputs
            .send(Input::Command(command))
            .map_err(|_| ControllerError::Closed)
    }
}

impl<C> ControllerHandle<C> {
    /// Stop the actor, release the handle and close the session. Idempotent.
    pub(crate) fn close(&self) {
        if self.shared.close_tx.send_replace(true) {
            return;
        }
        info!(address = %self.session.address(), "closing controller");
        lock(&self.subscriptions).clear();
        self.session.close();
        let _ = self.inputs.send(Input::Shutdown);
    }
}

impl<C> Drop for ControllerHandle<C> {
    fn drop(&mut self) {
        self.close();
    }
}

pub(crate) use crate::transport::closed;

/// Wait for the next input. `None` once the controller shuts down.
pub(crate) async fn next_input<C>(
    close_rx: &mut watch::Receiver<bool>,
    rx: &mut mpsc::UnboundedReceiver<Input<C>>,
) -> Option<Input<C>> {
    tokio::select! {
        _ = closed(close_rx) => None,
        input = rx.recv() => match input {
            Some(Input::Shutdown) | None => None,
            Some(input) => Some(input),
        },
    }
}

/// Owns the peer-transport handle and the IDLE/ACTIVE state.
pub(crate) struct PeerSlot<C> {
    engine: Arc<dyn PeerTransportEngine>,
    config: Option<PeerConfig>,
    handle: Option<Box<dyn PeerTransport>>,
    generation: u64,
    inputs: mpsc::UnboundedSender<Input<C>>,
    shared: Arc<Shared>,
}

impl<C: Send + 'static> PeerSlot<C> {
    pub(crate) fn new(
        engine: Arc<dyn PeerTransportEngine>,
        config: Option<PeerConfig>,
        inputs: mpsc::UnboundedSender<Input<C>>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            engine,
            config,
            handle: None,
            generation: 0,
            inputs,
            shared,
        }
    }

    pub(crate) fn state(&self) -> ControllerState {
        if self.handle.is_some() {
            ControllerState::Active
        } else {
            ControllerState::Idle
        }
    }

    /// Check if an event was produced by the current handle.
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.handle.is_some() && generation == self.generation
    }

    /// The current handle, if ACTIVE.
    pub(crate) fn handle(&mut self) -> Option<&mut (dyn PeerTransport + 'static)> {
        self.handle.as_deref_mut()
    }

    /// Create a handle unless one exists.
    pub(crate) fn ensure_active(&mut self) -> Result<&mut (dyn PeerTransport + 'static), PeerError> {
        if self.handle.is_none() {
            let generation = self.generation.wrapping_add(1);
            let inputs = self.inputs.clone();
            let sink = PeerEventSink::new(move |event| {
                let _ = inputs.send(Input::Peer { generation, event });
            });

            let handle = self.engine.create(self.config.as_ref(), sink)?;
            self.generation = generation;
            self.handle = Some(handle);
            debug!(generation, "peer handle created");
            self.shared.set_state(ControllerState::Active);
        }

        self.handle.as_deref_mut().ok_or(PeerError::Closed)
    }

    /// Close and forget the handle. A no-op while IDLE.
    pub(crate) fn teardown(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.close();
            debug!(generation = self.generation, "peer handle released");
            self.shared.set_state(ControllerState::Idle);
        }
    }
}

/// Decode an inbound frame, dropping anything that fails validation and
/// publishing relay errors.
pub(crate) fn accept(shared: &Shared, frame: &str) -> Option<Envelope> {
    let envelope = match schema::decode(frame) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(error = %e, "dropping invalid envelope");
            return None;
        }
    };
    if let Some(error) = envelope.remote_error() {
        shared.publish(ControllerError::Remote(error));
        return None;
    }
    Some(envelope)
}

/// Encode and send `envelope`.
pub(crate) fn transmit(session: &Session, envelope: &Envelope) {
    match envelope.encode() {
        Ok(frame) => session.send(frame),
        Err(e) => warn!(error = %e, "failed to encode envelope"),
    }
}
