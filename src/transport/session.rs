//! Resilient signaling session.
//!
//! A [`Session`] wraps one duplex connection at a time and keeps it alive:
//!
//! - every drop is followed by a reconnect (delayed per [`BackoffConfig`])
//! - frames sent while disconnected are buffered and flushed in FIFO order
//!   as soon as the next connection is admitted
//! - inbound frames and state changes are published on [`EventStream`]s
//!
//! Only [`Session::close`] ends this cycle.
//!
//! # State sequence
//!
//! ```text
//!            start()
//!   DISCONNECTED ──► CONNECTING ──► CONNECTED
//!        ▲               │              │
//!        └───────────────┴──────────────┘
//!             failure / drop (then retry after backoff)
//! ```
//!
//! [`BackoffConfig`]: super::BackoffConfig

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace, warn};

use super::backoff::Backoff;
use super::config::SessionConfig;
use super::error::{HandshakeError, TransportError};
use super::link::{Connector, Handshake, Link};
use crate::core::{lock, Error, EventStream, Subject};

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// A connection attempt is in progress.
    Connecting,
    /// A connection is up and admitted.
    Connected,
    /// No connection; a retry may be pending.
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => f.write_str("CONNECTING"),
            ConnectionState::Connected => f.write_str("CONNECTED"),
            ConnectionState::Disconnected => f.write_str("DISCONNECTED"),
        }
    }
}

struct Launch {
    connector: Arc<dyn Connector>,
    handshake: Option<Arc<dyn Handshake>>,
    config: SessionConfig,
}

#[derive(Default)]
struct Outbound {
    live: Option<mpsc::UnboundedSender<String>>,
    buffer: VecDeque<String>,
}

struct Shared {
    address: String,
    close_tx: watch::Sender<bool>,
    launch: Mutex<Option<Launch>>,
    outbound: Mutex<Outbound>,
    state: Mutex<ConnectionState>,
    messages: Subject<String>,
    states: Subject<ConnectionState>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        *self.close_tx.borrow()
    }

    fn transition(&self, next: ConnectionState) {
        {
            let mut state = lock(&self.state);
            if *state == next {
                return;
            }
            *state = next;
        }
        debug!(address = %self.address, state = %next, "session state changed");
        self.states.emit(next);
    }

    /// Flush the backlog into `outgoing` and make it the live sender.
    ///
    /// Returns `false` if the session was closed or the link died meanwhile.
    fn go_live(&self, outgoing: mpsc::UnboundedSender<String>) -> bool {
        let mut outbound = lock(&self.outbound);
        if self.is_closed() {
            return false;
        }

        let flushed = outbound.buffer.len();
        while let Some(frame) = outbound.buffer.pop_front() {
            if let Err(mpsc::error::SendError(frame)) = outgoing.send(frame) {
                outbound.buffer.push_front(frame);
                return false;
            }
        }
        if flushed > 0 {
            debug!(address = %self.address, flushed, "flushed buffered frames");
        }

        outbound.live = Some(outgoing);
        true
    }

    fn go_offline(&self) {
        lock(&self.outbound).live = None;
    }
}

/// Builder for a [`Session`].
pub struct SessionBuilder {
    address: String,
    connector: Arc<dyn Connector>,
    handshake: Option<Arc<dyn Handshake>>,
    config: SessionConfig,
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("address", &self.address)
            .field("handshake", &self.handshake.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl SessionBuilder {
    /// Target `address` through `connector`.
    pub fn new(address: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        Self {
            address: address.into(),
            connector,
            handshake: None,
            config: SessionConfig::default(),
        }
    }

    /// Run `handshake` on every fresh link before it counts as connected.
    pub fn handshake(mut self, handshake: Arc<dyn Handshake>) -> Self {
        self.handshake = Some(handshake);
        self
    }

    /// Replace the configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Create the session without connecting yet.
    ///
    /// Use this to subscribe to events before the first connection attempt,
    /// then call [`Session::start`].
    pub fn build(self) -> Session {
        let (close_tx, _) = watch::channel(false);
        Session {
            shared: Arc::new(Shared {
                address: self.address,
                close_tx,
                launch: Mutex::new(Some(Launch {
                    connector: self.connector,
                    handshake: self.handshake,
                    config: self.config,
                })),
                outbound: Mutex::new(Outbound::default()),
                state: Mutex::new(ConnectionState::Disconnected),
                messages: Subject::new(),
                states: Subject::new(),
            }),
        }
    }
}

/// A self-healing connection to one address.
///
/// Dropping the session closes it.
pub struct Session {
    shared: Arc<Shared>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.shared.address)
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    /// Begin connecting. Idempotent; a no-op after [`Session::close`].
    pub fn start(&self) -> Result<(), TransportError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let launch = lock(&self.shared.launch).take();
        let Some(launch) = launch else {
            return Ok(());
        };
        if self.is_closed() {
            return Ok(());
        }

        runtime.spawn(run(Arc::clone(&self.shared), launch));
        Ok(())
    }

    /// The address this session was created with.
    pub fn address(&self) -> &str {
        &self.shared.address
    }

    /// The most recently published state.
    pub fn state(&self) -> ConnectionState {
        *lock(&self.shared.state)
    }

    /// Check if [`Session::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Number of frames waiting for a connection.
    pub fn buffered(&self) -> usize {
        lock(&self.shared.outbound).buffer.len()
    }

    /// Send a frame, or buffer it until the next connection is admitted.
    ///
    /// Fire-and-forget: delivery is best effort. After [`Session::close`]
    /// this is a no-op.
    pub fn send(&self, frame: impl Into<String>) {
        let frame = frame.into();
        if self.is_closed() {
            debug!(address = %self.shared.address, "send on closed session ignored");
            return;
        }

        let mut outbound = lock(&self.shared.outbound);
        match outbound.live.as_ref() {
            Some(live) => {
                if let Err(mpsc::error::SendError(frame)) = live.send(frame) {
                    trace!(address = %self.shared.address, "link gone, buffering frame");
                    outbound.live = None;
                    outbound.buffer.push_back(frame);
                }
            }
            None => outbound.buffer.push_back(frame),
        }
    }

    /// Close the session for good. Idempotent.
    ///
    /// Tears down the live connection and stops all future reconnects,
    /// including attempts that are already in flight.
    pub fn close(&self) {
        if self.shared.close_tx.send_replace(true) {
            return;
        }
        info!(address = %self.shared.address, "closing session");

        let mut outbound = lock(&self.shared.outbound);
        outbound.live = None;
        outbound.buffer.clear();
    }

    /// Inbound frames.
    pub fn message_events(&self) -> EventStream<String> {
        self.shared.messages.stream()
    }

    /// State transitions.
    pub fn state_events(&self) -> EventStream<ConnectionState> {
        self.shared.states.stream()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

/// Resolves once the close flag behind `rx` is set.
pub(crate) async fn closed(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn open(
    connector: &dyn Connector,
    handshake: Option<&dyn Handshake>,
    address: &str,
    config: &SessionConfig,
) -> Result<Link, Error> {
    let mut link = timeout(config.connect_timeout, connector.connect(address))
        .await
        .map_err(|_| TransportError::Timeout)??;

    if let Some(handshake) = handshake {
        timeout(config.handshake_timeout, handshake.admit(&mut link))
            .await
            .map_err(|_| HandshakeError::Timeout)??;
    }

    Ok(link)
}

async fn run(shared: Arc<Shared>, launch: Launch) {
    let Launch {
        connector,
        handshake,
        config,
    } = launch;
    let mut close_rx = shared.close_tx.subscribe();
    let address = match &handshake {
        Some(handshake) => handshake.address(&shared.address),
        None => shared.address.clone(),
    };
    let mut backoff = Backoff::new(config.backoff.clone());

    while !shared.is_closed() {
        shared.transition(ConnectionState::Connecting);

        let attempt = open(&*connector, handshake.as_deref(), &address, &config);
        let result = tokio::select! {
            _ = closed(&mut close_rx) => break,
            result = attempt => result,
        };

        match result {
            Ok(link) => {
                backoff.reset();
                serve(&shared, link, &mut close_rx).await;
                info!(address = %shared.address, "connection dropped");
            }
            Err(e) => {
                warn!(address = %shared.address, error = %e, "connection attempt failed");
            }
        }

        shared.transition(ConnectionState::Disconnected);
        if shared.is_closed() {
            break;
        }

        let delay = backoff.next_delay();
        if delay.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }
        debug!(address = %shared.address, ?delay, attempt = backoff.attempt(), "reconnecting after delay");
        tokio::select! {
            _ = closed(&mut close_rx) => break,
            _ = sleep(delay) => {}
        }
    }

    shared.go_offline();
    shared.transition(ConnectionState::Disconnected);
    debug!(address = %shared.address, "session task finished");
}

async fn serve(shared: &Shared, link: Link, close_rx: &mut watch::Receiver<bool>) {
    let (outgoing, mut incoming) = link.into_parts();
    if !shared.go_live(outgoing) {
        return;
    }
    shared.transition(ConnectionState::Connected);

    loop {
        tokio::select! {
            _ = closed(close_rx) => break,
            frame = incoming.recv() => match frame {
                Some(frame) => shared.messages.emit(frame),
                None => break,
            },
        }
    }

    shared.go_offline();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::backoff::BackoffConfig;
    use crate::transport::memory::{memory_pair, MemoryServer};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    const WAIT: Duration = Duration::from_secs(5);

    fn fast_config() -> SessionConfig {
        SessionConfig::default().with_backoff(
            BackoffConfig::default()
                .with_initial(Duration::from_millis(5))
                .with_max(Duration::from_millis(20))
                .with_jitter(0.0),
        )
    }

    async fn wait_for_state(rx: &mut UnboundedReceiver<ConnectionState>, wanted: ConnectionState) {
        timeout(WAIT, async {
            while let Some(state) = rx.recv().await {
                if state == wanted {
                    return;
                }
            }
            panic!("state stream ended before {wanted}");
        })
        .await
        .expect("timed out waiting for state");
    }

    async fn accept(server: &mut MemoryServer) -> crate::transport::memory::MemoryPeer {
        timeout(WAIT, server.accept())
            .await
            .expect("timed out waiting for connection")
            .expect("connector dropped")
    }

    #[tokio::test]
    async fn test_buffered_frames_flush_in_order() {
        let (connector, mut server) = memory_pair();
        let session = SessionBuilder::new("mem://relay", Arc::new(connector))
            .config(fast_config())
            .build();

        session.send("one");
        session.send("two");
        session.send("three");
        assert_eq!(session.buffered(), 3);

        session.start().unwrap();
        let mut peer = accept(&mut server).await;

        for expected in ["one", "two", "three"] {
            let frame = timeout(WAIT, peer.recv()).await.unwrap();
            assert_eq!(frame.as_deref(), Some(expected));
        }
        session.close();
    }

    #[tokio::test]
    async fn test_state_sequence_and_messages() {
        let (connector, mut server) = memory_pair();
        let session = SessionBuilder::new("mem://relay", Arc::new(connector))
            .config(fast_config())
            .build();
        let (_states_sub, mut states) = session.state_events().subscribe_channel();
        let (_messages_sub, mut messages) = session.message_events().subscribe_channel();

        session.start().unwrap();
        let peer = accept(&mut server).await;

        assert_eq!(states.recv().await, Some(ConnectionState::Connecting));
        assert_eq!(states.recv().await, Some(ConnectionState::Connected));

        peer.send("hello").unwrap();
        assert_eq!(timeout(WAIT, messages.recv()).await.unwrap().as_deref(), Some("hello"));

        drop(peer);
        assert_eq!(states.recv().await, Some(ConnectionState::Disconnected));
        assert_eq!(states.recv().await, Some(ConnectionState::Connecting));
        let _peer = accept(&mut server).await;
        assert_eq!(states.recv().await, Some(ConnectionState::Connected));

        session.close();
    }

    #[tokio::test]
    async fn test_reconnects_after_repeated_drops() {
        let (connector, mut server) = memory_pair();
        let session = SessionBuilder::new("mem://relay", Arc::new(connector.clone()))
            .config(fast_config())
            .build();
        let (_sub, mut states) = session.state_events().subscribe_channel();
        session.start().unwrap();

        for _ in 0..5 {
            let peer = accept(&mut server).await;
            wait_for_state(&mut states, ConnectionState::Connected).await;
            drop(peer);
            wait_for_state(&mut states, ConnectionState::Disconnected).await;
        }

        let mut peer = accept(&mut server).await;
        wait_for_state(&mut states, ConnectionState::Connected).await;
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(connector.attempts(), 6);

        session.send("still here");
        assert_eq!(timeout(WAIT, peer.recv()).await.unwrap().as_deref(), Some("still here"));
        session.close();
    }

    #[tokio::test]
    async fn test_frames_sent_while_dropped_are_delivered_after_reconnect() {
        let (connector, mut server) = memory_pair();
        let session = SessionBuilder::new("mem://relay", Arc::new(connector))
            .config(SessionConfig::default().with_backoff(
                BackoffConfig::default()
                    .with_initial(Duration::from_millis(100))
                    .with_jitter(0.0),
            ))
            .build();
        let (_sub, mut states) = session.state_events().subscribe_channel();
        session.start().unwrap();

        let peer = accept(&mut server).await;
        wait_for_state(&mut states, ConnectionState::Connected).await;
        drop(peer);
        wait_for_state(&mut states, ConnectionState::Disconnected).await;

        for i in 0..10 {
            session.send(format!("frame-{i}"));
        }

        let mut peer = accept(&mut server).await;
        for i in 0..10 {
            let frame = timeout(WAIT, peer.recv()).await.unwrap();
            assert_eq!(frame, Some(format!("frame-{i}")));
        }
        session.close();
    }

    #[tokio::test]
    async fn test_close_stops_reconnecting() {
        let (connector, mut server) = memory_pair();
        let session = SessionBuilder::new("mem://relay", Arc::new(connector.clone()))
            .config(fast_config())
            .build();
        let (_sub, mut states) = session.state_events().subscribe_channel();
        session.start().unwrap();

        let mut peer = accept(&mut server).await;
        wait_for_state(&mut states, ConnectionState::Connected).await;

        session.close();
        session.close();
        wait_for_state(&mut states, ConnectionState::Disconnected).await;

        session.send("ignored");
        session.start().unwrap();
        assert_eq!(session.buffered(), 0);

        // The live link is torn down and nothing reconnects.
        assert_eq!(timeout(WAIT, peer.recv()).await.unwrap(), None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connector.attempts(), 1);
        assert!(server.try_accept().is_none());
    }

    #[tokio::test]
    async fn test_failed_attempts_cycle_states() {
        let (connector, server) = memory_pair();
        drop(server);

        let session = SessionBuilder::new("mem://nowhere", Arc::new(connector.clone()))
            .config(fast_config())
            .build();
        let (_sub, mut states) = session.state_events().subscribe_channel();
        session.start().unwrap();

        assert_eq!(states.recv().await, Some(ConnectionState::Connecting));
        assert_eq!(states.recv().await, Some(ConnectionState::Disconnected));
        assert_eq!(states.recv().await, Some(ConnectionState::Connecting));

        session.send("queued");
        assert_eq!(session.buffered(), 1);
        session.close();
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        #[test]
        fn prop_frames_sent_while_disconnected_arrive_in_order(
            before in proptest::collection::vec(".{0,12}", 0..8),
            after in proptest::collection::vec(".{0,12}", 0..8),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async {
                let (connector, mut server) = memory_pair();
                let session = SessionBuilder::new("mem://relay", Arc::new(connector))
                    .config(fast_config())
                    .build();
                let (_sub, mut states) = session.state_events().subscribe_channel();

                for frame in &before {
                    session.send(frame.clone());
                }
                session.start().unwrap();

                let mut peer = accept(&mut server).await;
                for frame in &before {
                    assert_eq!(timeout(WAIT, peer.recv()).await.unwrap().as_ref(), Some(frame));
                }

                // Nothing yields between the drop being observed and the sends,
                // so every frame lands in the backlog.
                drop(peer);
                wait_for_state(&mut states, ConnectionState::Disconnected).await;
                for frame in &after {
                    session.send(frame.clone());
                }
                assert_eq!(session.buffered(), after.len());

                let mut peer = accept(&mut server).await;
                for frame in &after {
                    assert_eq!(timeout(WAIT, peer.recv()).await.unwrap().as_ref(), Some(frame));
                }
                session.close();
            });
        }
    }

    #[test]
    fn test_start_without_runtime() {
        let (connector, _server) = memory_pair();
        let session = SessionBuilder::new("mem://relay", Arc::new(connector)).build();
        assert_eq!(session.start(), Err(TransportError::NoRuntime));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }
}
