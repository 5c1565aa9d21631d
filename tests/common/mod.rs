//! Shared test fixtures: a scripted peer-transport engine and wait helpers.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use media_relay_client::negotiation::{
    MediaTrack, PeerConfig, PeerError, PeerEvent, PeerEventSink, PeerTransport,
    PeerTransportEngine, TrackSlot,
};
use media_relay_client::schema::{IceCandidate, SessionDescription};
use media_relay_client::transport::{MemoryPeer, MemoryServer};
use serde_json::Value;
use tokio::time::{sleep, timeout, Instant};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(Duration::from_millis(5)).await;
    }
}

pub async fn accept(server: &mut MemoryServer) -> MemoryPeer {
    timeout(WAIT, server.accept())
        .await
        .expect("timed out waiting for connection")
        .expect("connector dropped")
}

/// Next frame from the client, parsed as JSON.
pub async fn next_frame(peer: &mut MemoryPeer) -> Value {
    let frame = timeout(WAIT, peer.recv())
        .await
        .expect("timed out waiting for frame")
        .expect("client disconnected");
    serde_json::from_str(&frame).expect("client sent invalid json")
}

/// Check that the client sends nothing for a short while.
pub async fn assert_silent(peer: &mut MemoryPeer) {
    if let Ok(Some(frame)) = timeout(Duration::from_millis(100), peer.recv()).await {
        panic!("unexpected frame: {frame}");
    }
}

/// What a handle was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    AddTrack(String),
    ReplaceTrack(TrackSlot, String),
    RemoveTrack(TrackSlot),
    CreateOffer,
    CreateAnswer,
    SetLocal(SessionDescription),
    SetRemote(SessionDescription),
    AddCandidate(IceCandidate),
}

#[derive(Clone)]
pub struct HandleRecord {
    pub sink: PeerEventSink,
    pub config: Option<PeerConfig>,
    pub calls: Vec<Call>,
    pub tracks: Vec<(TrackSlot, MediaTrack)>,
    pub closed: bool,
}

struct Script {
    offer_sdp: String,
    answer_sdp: String,
    handles: Vec<HandleRecord>,
}

/// Records every handle and call; descriptions come from a script.
#[derive(Clone)]
pub struct MockEngine {
    script: Arc<Mutex<Script>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                offer_sdp: "v=0\r\no=mock-offer".into(),
                answer_sdp: "v=0\r\no=mock-answer".into(),
                handles: Vec::new(),
            })),
        }
    }

    /// Make every subsequent offer carry `sdp`.
    pub fn set_offer_sdp(&self, sdp: &str) {
        self.script.lock().unwrap().offer_sdp = sdp.into();
    }

    pub fn answer_sdp(&self) -> String {
        self.script.lock().unwrap().answer_sdp.clone()
    }

    pub fn offer_sdp(&self) -> String {
        self.script.lock().unwrap().offer_sdp.clone()
    }

    pub fn created(&self) -> usize {
        self.script.lock().unwrap().handles.len()
    }

    pub fn live(&self) -> usize {
        self.script
            .lock()
            .unwrap()
            .handles
            .iter()
            .filter(|h| !h.closed)
            .count()
    }

    pub fn handle(&self, index: usize) -> HandleRecord {
        self.script.lock().unwrap().handles[index].clone()
    }

    pub fn latest(&self) -> HandleRecord {
        let script = self.script.lock().unwrap();
        script.handles.last().expect("no handle created").clone()
    }

    /// Deliver `event` as if handle `index` produced it.
    pub fn emit(&self, index: usize, event: PeerEvent) {
        let sink = self.handle(index).sink;
        sink.emit(event);
    }

    pub fn emit_latest(&self, event: PeerEvent) {
        let sink = self.latest().sink;
        sink.emit(event);
    }
}

impl PeerTransportEngine for MockEngine {
    fn create(
        &self,
        config: Option<&PeerConfig>,
        events: PeerEventSink,
    ) -> Result<Box<dyn PeerTransport>, PeerError> {
        let mut script = self.script.lock().unwrap();
        script.handles.push(HandleRecord {
            sink: events,
            config: config.cloned(),
            calls: Vec::new(),
            tracks: Vec::new(),
            closed: false,
        });
        Ok(Box::new(MockPeer {
            index: script.handles.len() - 1,
            next_slot: 0,
            script: Arc::clone(&self.script),
        }))
    }
}

struct MockPeer {
    index: usize,
    next_slot: u64,
    script: Arc<Mutex<Script>>,
}

impl MockPeer {
    fn record(&self, call: Call) -> Result<(), PeerError> {
        let mut script = self.script.lock().unwrap();
        let handle = &mut script.handles[self.index];
        if handle.closed {
            return Err(PeerError::Closed);
        }
        handle.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for MockPeer {
    async fn add_track(&mut self, track: &MediaTrack) -> Result<TrackSlot, PeerError> {
        self.record(Call::AddTrack(track.id().into()))?;
        let slot = TrackSlot(self.next_slot);
        self.next_slot += 1;
        self.script.lock().unwrap().handles[self.index]
            .tracks
            .push((slot, track.clone()));
        Ok(slot)
    }

    async fn replace_track(&mut self, slot: TrackSlot, track: &MediaTrack) -> Result<(), PeerError> {
        self.record(Call::ReplaceTrack(slot, track.id().into()))?;
        let mut script = self.script.lock().unwrap();
        let entry = script.handles[self.index]
            .tracks
            .iter_mut()
            .find(|(s, _)| *s == slot)
            .ok_or_else(|| PeerError::Failed("unknown slot".into()))?;
        entry.1 = track.clone();
        Ok(())
    }

    async fn remove_track(&mut self, slot: TrackSlot) -> Result<(), PeerError> {
        self.record(Call::RemoveTrack(slot))?;
        self.script.lock().unwrap().handles[self.index]
            .tracks
            .retain(|(s, _)| *s != slot);
        Ok(())
    }

    async fn create_offer(&mut self) -> Result<SessionDescription, PeerError> {
        self.record(Call::CreateOffer)?;
        Ok(SessionDescription::offer(self.script.lock().unwrap().offer_sdp.clone()))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, PeerError> {
        self.record(Call::CreateAnswer)?;
        Ok(SessionDescription::answer(self.script.lock().unwrap().answer_sdp.clone()))
    }

    async fn set_local_description(&mut self, description: SessionDescription) -> Result<(), PeerError> {
        self.record(Call::SetLocal(description))
    }

    async fn set_remote_description(&mut self, description: SessionDescription) -> Result<(), PeerError> {
        self.record(Call::SetRemote(description))
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), PeerError> {
        self.record(Call::AddCandidate(candidate))
    }

    fn close(&mut self) {
        self.script.lock().unwrap().handles[self.index].closed = true;
    }
}
