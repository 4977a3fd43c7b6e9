//! Shared fixtures for client-core integration tests
//!
//! Scripted implementations of the collaborator traits plus a harness that
//! assembles a real [`ClientManager`] through the public builder. Everything
//! here goes through `medilink_client_core`'s public API only, so these
//! tests double as a check that the exported surface is sufficient to embed
//! the client.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use medilink_client_core::client::builder::ClientBuilder;
use medilink_client_core::client::capture::CaptureBackend;
use medilink_client_core::client::config::{CaptureConstraints, ClientConfig};
use medilink_client_core::client::device::PlatformHints;
use medilink_client_core::client::manager::ClientManager;
use medilink_client_core::client::types::{
    ConnectionState, JoinRequest, ParticipantRole, SessionId, TrackKind,
};
use medilink_client_core::error::{ClientError, ClientResult};
use medilink_client_core::events::ClientEvent;
use medilink_client_core::signaling::{JoinTokenRequest, JoinTokenResponse, SignalingApi};
use medilink_client_core::transport::{
    ConnectivityState, MediaHandle, MediaSink, MediaTransport, RemoteParticipantInfo,
    RemoteTrackInfo, TransportConnectRequest, TransportEvent,
};

/// Install a fmt subscriber honoring `RUST_LOG`, once per test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Harness
// ============================================================================

/// A real client wired to scripted collaborators
pub struct TestClient {
    pub client: Arc<ClientManager>,
    pub signaling: Arc<FakeSignaling>,
    pub transport: Arc<FakeTransport>,
    pub devices: Arc<FakeCaptureBackend>,
    pub events: broadcast::Receiver<ClientEvent>,
}

impl TestClient {
    pub async fn join_as_patient(&self) -> SessionId {
        self.client
            .join(JoinRequest::new("apt-9001", ParticipantRole::Patient))
            .await
            .expect("join should succeed against the scripted collaborators")
    }
}

/// Build a client with default test configuration
pub async fn build_client() -> TestClient {
    build_client_with(|builder| builder).await
}

/// Build a client, letting the caller adjust the builder first
///
/// Platform hints are pinned so profiling never depends on the machine the
/// tests run on, and the bind budget is shrunk so scenarios without a
/// registered sink settle quickly.
pub async fn build_client_with<F>(configure: F) -> TestClient
where
    F: FnOnce(ClientBuilder) -> ClientBuilder,
{
    init_tracing();

    let signaling = Arc::new(FakeSignaling::new());
    let transport = Arc::new(FakeTransport::new());
    let devices = Arc::new(FakeCaptureBackend::new());

    let mut config = ClientConfig::new();
    config.bind_max_attempts = 2;
    config.bind_retry_delay_ms = 10;

    let builder = ClientBuilder::new()
        .config(config)
        .platform_hints(
            PlatformHints::new()
                .with_logical_cores(8)
                .with_memory_gib(16.0),
        )
        .signaling(signaling.clone())
        .transport(transport.clone())
        .capture_backend(devices.clone());
    let client = configure(builder)
        .build()
        .await
        .expect("builder has every collaborator");
    let events = client.subscribe_events();

    TestClient {
        client,
        signaling,
        transport,
        devices,
        events,
    }
}

pub fn video_track(id: &str) -> RemoteTrackInfo {
    RemoteTrackInfo {
        track_id: id.to_string(),
        kind: TrackKind::Video,
    }
}

pub fn audio_track(id: &str) -> RemoteTrackInfo {
    RemoteTrackInfo {
        track_id: id.to_string(),
        kind: TrackKind::Audio,
    }
}

/// Give the spawned event loop a beat to process what we sent
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(80)).await;
}

/// Pull everything currently buffered on an event receiver
pub fn drain(receiver: &mut broadcast::Receiver<ClientEvent>) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

/// Connection states in emission order, extracted from drained events
pub fn state_sequence(events: &[ClientEvent]) -> Vec<ConnectionState> {
    events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::SessionStateChanged { info, .. } => Some(info.new_state.clone()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Scripted collaborators
// ============================================================================

/// Signaling fake with a scriptable response queue
///
/// With nothing scripted it issues sequentially numbered tokens, which lets
/// tests tell a reused credential from a refreshed one.
pub struct FakeSignaling {
    scripted: StdMutex<VecDeque<ClientResult<JoinTokenResponse>>>,
    requests: StdMutex<Vec<JoinTokenRequest>>,
    issued: AtomicU32,
}

impl FakeSignaling {
    pub fn new() -> Self {
        Self {
            scripted: StdMutex::new(VecDeque::new()),
            requests: StdMutex::new(Vec::new()),
            issued: AtomicU32::new(0),
        }
    }

    /// Script a refusal (success=false) for the next token request
    pub fn refuse_next(&self, message: &str) {
        self.scripted.lock().unwrap().push_back(Ok(JoinTokenResponse {
            success: false,
            token: None,
            room_name: None,
            message: Some(message.to_string()),
        }));
    }

    /// Script a transport-level failure for the next token request
    pub fn fail_next(&self, error: ClientError) {
        self.scripted.lock().unwrap().push_back(Err(error));
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<JoinTokenRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl SignalingApi for FakeSignaling {
    async fn request_join_token(
        &self,
        request: &JoinTokenRequest,
    ) -> ClientResult<JoinTokenResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(scripted) = self.scripted.lock().unwrap().pop_front() {
            return scripted;
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(JoinTokenResponse {
            success: true,
            token: Some(format!("jwt-{}", n)),
            room_name: Some(format!("consult-{}", request.appointment_id)),
            message: None,
        })
    }
}

/// Transport fake that records every call and replays scripted failures
pub struct FakeTransport {
    events: broadcast::Sender<TransportEvent>,
    connect_failures: AtomicU32,
    disconnects: AtomicU32,
    connect_requests: StdMutex<Vec<TransportConnectRequest>>,
    refuse_subscribe: StdMutex<HashSet<String>>,
    roster: StdMutex<Vec<RemoteParticipantInfo>>,
    connectivity: StdMutex<ConnectivityState>,
    restarts: AtomicU32,
}

impl FakeTransport {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            connect_failures: AtomicU32::new(0),
            disconnects: AtomicU32::new(0),
            connect_requests: StdMutex::new(Vec::new()),
            refuse_subscribe: StdMutex::new(HashSet::new()),
            roster: StdMutex::new(Vec::new()),
            connectivity: StdMutex::new(ConnectivityState::Connected),
            restarts: AtomicU32::new(0),
        }
    }

    /// Fail the next `count` connect attempts
    pub fn fail_next_connects(&self, count: u32) {
        self.connect_failures.store(count, Ordering::SeqCst);
    }

    /// Refuse subscriptions for the given track ids until healed
    pub fn fail_subscriptions(&self, track_ids: &[&str]) {
        let mut refuse = self.refuse_subscribe.lock().unwrap();
        for id in track_ids {
            refuse.insert((*id).to_string());
        }
    }

    pub fn heal_subscriptions(&self) {
        self.refuse_subscribe.lock().unwrap().clear();
    }

    /// Set the connectivity state reported to health checks
    pub fn set_connectivity(&self, state: ConnectivityState) {
        *self.connectivity.lock().unwrap() = state;
    }

    /// Emit a transport event into the client's event loop
    pub fn send(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    pub fn connect_requests(&self) -> Vec<TransportConnectRequest> {
        self.connect_requests.lock().unwrap().clone()
    }

    pub fn disconnect_count(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn restart_count(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaTransport for FakeTransport {
    async fn connect(&self, request: TransportConnectRequest) -> ClientResult<()> {
        self.connect_requests.lock().unwrap().push(request);
        if self.connect_failures.load(Ordering::SeqCst) > 0 {
            self.connect_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(ClientError::transport_join("simulated ice failure"));
        }
        Ok(())
    }

    async fn disconnect(&self) -> ClientResult<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_track_enabled(&self, _handle: &MediaHandle, _enabled: bool) -> ClientResult<()> {
        Ok(())
    }

    async fn subscribe_track(&self, _identity: &str, track_id: &str) -> ClientResult<MediaHandle> {
        if self.refuse_subscribe.lock().unwrap().contains(track_id) {
            return Err(ClientError::transport_failed("subscribe refused"));
        }
        let kind = if track_id.contains("audio") {
            TrackKind::Audio
        } else {
            TrackKind::Video
        };
        Ok(MediaHandle::new(track_id, kind))
    }

    async fn unsubscribe_track(&self, _identity: &str, _track_id: &str) -> ClientResult<()> {
        Ok(())
    }

    async fn remote_participants(&self) -> ClientResult<Vec<RemoteParticipantInfo>> {
        Ok(self.roster.lock().unwrap().clone())
    }

    fn connectivity_state(&self) -> ConnectivityState {
        *self.connectivity.lock().unwrap()
    }

    async fn restart_connectivity(&self) -> ClientResult<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

/// Capture backend fake with per-kind denial
pub struct FakeCaptureBackend {
    denied: StdMutex<HashSet<TrackKind>>,
    opened: StdMutex<Vec<MediaHandle>>,
    closed: StdMutex<Vec<String>>,
    constraint_applications: StdMutex<Vec<(String, CaptureConstraints)>>,
}

impl FakeCaptureBackend {
    pub fn new() -> Self {
        Self {
            denied: StdMutex::new(HashSet::new()),
            opened: StdMutex::new(Vec::new()),
            closed: StdMutex::new(Vec::new()),
            constraint_applications: StdMutex::new(Vec::new()),
        }
    }

    /// Deny permission for one capture kind
    pub fn deny(&self, kind: TrackKind) {
        self.denied.lock().unwrap().insert(kind);
    }

    pub fn opened_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn closed_ids(&self) -> Vec<String> {
        self.closed.lock().unwrap().clone()
    }

    /// Constraint changes applied to a given local track
    pub fn constraints_applied_to(&self, track_id: &str) -> Vec<CaptureConstraints> {
        self.constraint_applications
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == track_id)
            .map(|(_, c)| *c)
            .collect()
    }
}

#[async_trait]
impl CaptureBackend for FakeCaptureBackend {
    async fn open_track(
        &self,
        kind: TrackKind,
        _constraints: &CaptureConstraints,
    ) -> ClientResult<MediaHandle> {
        if self.denied.lock().unwrap().contains(&kind) {
            return Err(ClientError::CaptureDenied { kind });
        }
        let handle = MediaHandle::new(format!("local-{}", kind), kind);
        self.opened.lock().unwrap().push(handle.clone());
        Ok(handle)
    }

    async fn apply_constraints(
        &self,
        handle: &MediaHandle,
        constraints: &CaptureConstraints,
    ) -> ClientResult<()> {
        self.constraint_applications
            .lock()
            .unwrap()
            .push((handle.id.clone(), *constraints));
        Ok(())
    }

    async fn close_track(&self, handle: &MediaHandle) -> ClientResult<()> {
        self.closed.lock().unwrap().push(handle.id.clone());
        Ok(())
    }
}

/// Sink that records attaches and detaches
pub struct RecordingSink {
    attached: StdMutex<Vec<MediaHandle>>,
    detaches: AtomicU32,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            attached: StdMutex::new(Vec::new()),
            detaches: AtomicU32::new(0),
        })
    }

    pub fn attached_ids(&self) -> Vec<String> {
        self.attached
            .lock()
            .unwrap()
            .iter()
            .map(|h| h.id.clone())
            .collect()
    }

    pub fn detach_count(&self) -> u32 {
        self.detaches.load(Ordering::SeqCst)
    }
}

impl MediaSink for RecordingSink {
    fn attach(&self, media: &MediaHandle) {
        self.attached.lock().unwrap().push(media.clone());
    }

    fn detach(&self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }
}
