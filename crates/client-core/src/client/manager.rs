//! Session manager for the client-core library
//!
//! [`ClientManager`] is the heart of the crate: it owns the connection state
//! machine and coordinates every other component around it. One manager
//! handles one consultation session from `join()` to its terminal state.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │    UI / Application      │
//! └────────────┬─────────────┘
//!              │ join / leave / mute / events
//! ┌────────────▼─────────────┐
//! │      ClientManager       │ ◄── This Module
//! │  state machine + events  │
//! └──┬────┬────┬────┬────┬───┘
//!    │    │    │    │    │
//!  capture │ registry │ health
//!        binder    quality
//! ```
//!
//! All session state transitions happen on one logical writer: either the
//! task calling `join()`/`leave()`, or the session event loop that consumes
//! transport events and [`RecoveryCommand`]s. Health checks and timers never
//! mutate state directly; they send commands into the loop instead, so a
//! recovery action can never race a user action.
//!
//! The public session operations (`join`, `leave`, mute controls) live in
//! the `session` module; this module holds the struct, the event loop and
//! the recovery machinery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::binder::{RenderBinder, SinkRegistry};
use crate::client::capture::{CaptureBackend, CaptureManager};
use crate::client::config::{CapturePreset, ClientConfig, RejoinCredentialPolicy};
use crate::client::health::{HealthMonitor, RecoveryCommand};
use crate::client::quality::QualityController;
use crate::client::recovery::{with_timeout, ErrorContext};
use crate::client::registry::{ParticipantRegistry, SubscribedTrack};
use crate::client::types::{
    ClientStats, ConnectionState, JoinCredential, JoinRequest, ParticipantSummary, SessionId,
    SessionInfo,
};
use crate::error::{ClientError, ClientResult};
use crate::events::{
    ClientEvent, EventPriority, EventSubscription, MediaEventInfo, MediaEventType,
    NetworkQualityInfo, ParticipantInfo, SessionStatusInfo, TrackEventInfo, TrackEventType,
};
use crate::transport::{
    MediaSink, MediaTransport, NetworkQualitySample, SinkSlot, TransportConnectRequest,
    TransportEvent,
};

/// Capacity of the broadcast channel behind `subscribe_events`
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Upper bound on a single transport connect attempt
pub(crate) const TRANSPORT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Monotonic counters behind [`ClientStats`]
///
/// Shared with the health monitor so its repairs are counted alongside the
/// manager's own.
#[derive(Debug, Default)]
pub(crate) struct SessionStatsCounters {
    pub(crate) interruptions: AtomicU64,
    pub(crate) cold_rejoins: AtomicU64,
    pub(crate) watchdog_rejoins: AtomicU64,
    pub(crate) bind_failures: AtomicU64,
}

/// Data held for the lifetime of one join
pub(crate) struct ActiveSession {
    pub(crate) id: SessionId,
    pub(crate) request: JoinRequest,
    /// Latest credential issued for this session; refreshed credentials
    /// replace the original so a forced rejoin always uses the newest one.
    pub(crate) credential: Option<JoinCredential>,
    pub(crate) created_at: chrono::DateTime<Utc>,
    pub(crate) connected_at: Option<chrono::DateTime<Utc>>,
}

/// Main coordinator for one consultation session
///
/// Create through [`ClientBuilder`](crate::ClientBuilder). A manager is
/// single-use: once the session reaches `Disconnected` or `Failed` it stays
/// there, and a new consultation needs a new manager.
pub struct ClientManager {
    pub(crate) config: ClientConfig,
    pub(crate) signaling: Arc<dyn crate::signaling::SignalingApi>,
    pub(crate) transport: Arc<dyn MediaTransport>,
    pub(crate) capture: Arc<CaptureManager>,
    pub(crate) registry: Arc<ParticipantRegistry>,
    pub(crate) binder: Arc<RenderBinder>,
    pub(crate) sinks: Arc<SinkRegistry>,
    pub(crate) quality: Arc<QualityController>,
    pub(crate) health: Arc<HealthMonitor>,
    pub(crate) state: Arc<RwLock<ConnectionState>>,
    pub(crate) session: RwLock<Option<ActiveSession>>,
    pub(crate) counters: Arc<SessionStatsCounters>,
    pub(crate) event_tx: broadcast::Sender<ClientEvent>,
    pub(crate) subscriptions: Arc<RwLock<Vec<EventSubscription>>>,
    pub(crate) commands: mpsc::UnboundedSender<RecoveryCommand>,
    pub(crate) command_rx: Mutex<Option<mpsc::UnboundedReceiver<RecoveryCommand>>>,
    pub(crate) event_loop: Mutex<Option<JoinHandle<()>>>,
    pub(crate) reconnect_timer: Mutex<Option<JoinHandle<()>>>,
    pub(crate) completion_notifier: Option<Arc<dyn Fn(SessionId) + Send + Sync>>,
}

impl ClientManager {
    /// Assemble a manager from its collaborators
    ///
    /// Called by the builder; must run inside a tokio runtime because it
    /// spawns the handler dispatch task.
    pub(crate) fn new(
        config: ClientConfig,
        initial_preset: CapturePreset,
        signaling: Arc<dyn crate::signaling::SignalingApi>,
        transport: Arc<dyn MediaTransport>,
        capture_backend: Arc<dyn CaptureBackend>,
        sinks: Arc<SinkRegistry>,
        completion_notifier: Option<Arc<dyn Fn(SessionId) + Send + Sync>>,
    ) -> Arc<Self> {
        let capture = Arc::new(CaptureManager::new(capture_backend));
        let registry = Arc::new(ParticipantRegistry::new(transport.clone()));
        let binder = Arc::new(RenderBinder::new(
            sinks.clone(),
            config.bind_max_attempts,
            config.bind_retry_delay(),
        ));
        let quality = Arc::new(QualityController::new(capture.clone(), initial_preset));
        let state = Arc::new(RwLock::new(ConnectionState::Idle));
        let counters = Arc::new(SessionStatsCounters::default());

        let (event_tx, dispatcher_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let subscriptions: Arc<RwLock<Vec<EventSubscription>>> =
            Arc::new(RwLock::new(Vec::new()));
        Self::spawn_handler_dispatcher(dispatcher_rx, subscriptions.clone());

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let health = Arc::new(HealthMonitor::new(
            config.health.clone(),
            state.clone(),
            registry.clone(),
            binder.clone(),
            transport.clone(),
            command_tx.clone(),
            event_tx.clone(),
            counters.clone(),
        ));

        Arc::new(Self {
            config,
            signaling,
            transport,
            capture,
            registry,
            binder,
            sinks,
            quality,
            health,
            state,
            session: RwLock::new(None),
            counters,
            event_tx,
            subscriptions,
            commands: command_tx,
            command_rx: Mutex::new(Some(command_rx)),
            event_loop: Mutex::new(None),
            reconnect_timer: Mutex::new(None),
            completion_notifier,
        })
    }

    /// Forward broadcast events to registered handlers
    ///
    /// Runs until the event channel closes, which happens when the manager
    /// is dropped. Holds only the subscription list, never the manager, so
    /// it cannot keep the manager alive.
    fn spawn_handler_dispatcher(
        mut receiver: broadcast::Receiver<ClientEvent>,
        subscriptions: Arc<RwLock<Vec<EventSubscription>>>,
    ) {
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let subs = subscriptions.read().await.clone();
                        for subscription in &subs {
                            subscription.deliver(event.clone()).await;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Event handler dispatch lagged behind the event stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Subscribe to the raw event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    /// Register an event handler with its filter, returning the subscription id
    pub async fn add_event_handler(&self, subscription: EventSubscription) -> uuid::Uuid {
        let id = subscription.id();
        self.subscriptions.write().await.push(subscription);
        debug!(subscription_id = %id, "Event handler registered");
        id
    }

    /// Remove a previously registered event handler
    pub async fn remove_event_handler(&self, id: uuid::Uuid) -> bool {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id() != id);
        subscriptions.len() != before
    }

    /// Publish an event to stream subscribers and registered handlers
    pub(crate) fn emit(&self, event: ClientEvent) {
        // send() only fails with no receivers, which is fine.
        let _ = self.event_tx.send(event);
    }

    // ========================================================================
    // Sinks
    // ========================================================================

    /// Register a rendering sink under a slot
    ///
    /// Sinks usually arrive after build, when the call screen mounts its
    /// surfaces. The registry holds them weakly; the application keeps
    /// ownership. A track already live for the slot is not rebound here,
    /// the recovery sweep picks it up on its next pass.
    pub fn register_sink(&self, slot: SinkSlot, sink: &Arc<dyn MediaSink>) {
        self.sinks.register(slot, sink);
    }

    /// Remove a sink registration
    ///
    /// Already-attached media is not detached; the slot simply stops
    /// resolving for future binds.
    pub fn unregister_sink(&self, slot: &SinkSlot) {
        self.sinks.unregister(slot);
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Current connection state
    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// Check if the session is currently connected
    pub async fn is_connected(&self) -> bool {
        matches!(self.connection_state().await, ConnectionState::Connected)
    }

    /// Snapshot of the current session, if a join has started
    pub async fn session_info(&self) -> Option<SessionInfo> {
        let state = self.connection_state().await;
        let session = self.session.read().await;
        session.as_ref().map(|s| SessionInfo {
            session_id: s.id,
            room_name: s
                .credential
                .as_ref()
                .map(|c| c.room_name.clone())
                .unwrap_or_default(),
            local_identity: s.request.identity(),
            role: s.request.role,
            state: state.clone(),
            created_at: s.created_at,
            connected_at: s.connected_at,
        })
    }

    /// Remote participants with their track summaries
    pub async fn participants(&self) -> Vec<ParticipantSummary> {
        self.registry.summaries(|track_id| self.binder.is_bound(track_id))
    }

    /// Aggregate session statistics
    pub async fn stats(&self) -> ClientStats {
        let connection_state = self.connection_state().await;
        ClientStats {
            is_running: connection_state.is_in_progress(),
            participant_count: self.registry.participant_count(),
            subscribed_tracks: self.registry.subscribed_tracks().len(),
            bound_tracks: self.binder.bound_count(),
            local_tracks: self.capture.local_tracks().len(),
            interruptions: self.counters.interruptions.load(Ordering::Relaxed),
            cold_rejoins: self.counters.cold_rejoins.load(Ordering::Relaxed),
            watchdog_rejoins: self.counters.watchdog_rejoins.load(Ordering::Relaxed),
            bind_failures: self.counters.bind_failures.load(Ordering::Relaxed),
            constraint_rejections: self.quality.rejection_count(),
            connection_state,
        }
    }

    pub(crate) async fn current_session_id(&self) -> Option<SessionId> {
        self.session.read().await.as_ref().map(|s| s.id)
    }

    pub(crate) async fn local_identity(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.request.identity())
    }

    /// Apply a validated state transition and emit the corresponding event
    ///
    /// Illegal transitions are logged and refused; callers that care (the
    /// join path, the rejoin path) check the return value.
    pub(crate) async fn set_state(&self, next: ConnectionState, reason: Option<String>) -> bool {
        let previous = {
            let mut state = self.state.write().await;
            if !state.can_transition_to(&next) {
                warn!(from = %state, to = %next, "Refusing illegal session state transition");
                return false;
            }
            let previous = state.clone();
            *state = next.clone();
            previous
        };
        info!(from = %previous, to = %next, reason = ?reason, "Session state changed");

        if let Some(session_id) = self.current_session_id().await {
            let priority = if matches!(next, ConnectionState::Failed) {
                EventPriority::Critical
            } else {
                EventPriority::High
            };
            self.emit(ClientEvent::SessionStateChanged {
                info: SessionStatusInfo {
                    session_id,
                    new_state: next,
                    previous_state: Some(previous),
                    reason,
                    timestamp: Utc::now(),
                },
                priority,
            });
        }
        true
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Spawn the session event loop
    ///
    /// Subscribes to transport events before spawning so nothing emitted
    /// during the connect handshake is lost.
    pub(crate) async fn start_event_loop(self: &Arc<Self>) {
        let mut slot = self.event_loop.lock().await;
        if slot.is_some() {
            return;
        }
        let commands = match self.command_rx.lock().await.take() {
            Some(receiver) => receiver,
            None => {
                warn!("Recovery command channel already consumed; event loop not restarted");
                return;
            }
        };
        let transport_events = self.transport.subscribe_events();
        let manager = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            manager.run_event_loop(transport_events, commands).await;
        }));
    }

    pub(crate) async fn stop_event_loop(&self) {
        if let Some(handle) = self.event_loop.lock().await.take() {
            handle.abort();
        }
    }

    async fn run_event_loop(
        self: Arc<Self>,
        mut transport_events: broadcast::Receiver<TransportEvent>,
        mut commands: mpsc::UnboundedReceiver<RecoveryCommand>,
    ) {
        debug!("Session event loop started");
        loop {
            tokio::select! {
                event = transport_events.recv() => match event {
                    Ok(event) => self.handle_transport_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Session event loop lagged behind transport events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Transport event stream closed");
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(command) => self.handle_recovery_command(command).await,
                    None => break,
                },
            }
            if self.state.read().await.is_terminal() {
                debug!("Session ended, event loop exiting");
                break;
            }
        }
    }

    /// Route one transport event, re-checking the session state first
    ///
    /// Membership and track events are only honored while the session is
    /// active; anything arriving before `Connecting` completed or after
    /// teardown is dropped.
    pub(crate) async fn handle_transport_event(&self, event: TransportEvent) {
        let state = self.connection_state().await;
        match event {
            TransportEvent::ParticipantJoined { identity, tracks } => {
                if !state.is_active() {
                    debug!(identity = %identity, state = %state, "Dropping participant join outside an active session");
                    return;
                }
                self.on_participant_joined(identity, tracks).await;
            }
            TransportEvent::ParticipantLeft { identity } => {
                if !state.is_active() {
                    debug!(identity = %identity, state = %state, "Dropping participant leave outside an active session");
                    return;
                }
                self.on_participant_left(identity).await;
            }
            TransportEvent::TrackPublished { identity, track } => {
                if !state.is_active() {
                    debug!(track_id = %track.track_id, state = %state, "Dropping track publication outside an active session");
                    return;
                }
                let track_id = track.track_id.clone();
                match self.registry.add_track(&identity, track).await {
                    Some(subscribed) => {
                        self.emit_track_event(&subscribed, TrackEventType::Subscribed).await;
                        self.bind_remote(&subscribed).await;
                    }
                    None => {
                        debug!(identity = %identity, track_id = %track_id, "Track publication for unknown participant dropped");
                    }
                }
            }
            TransportEvent::TrackUnpublished { identity, track_id } => {
                if !state.is_active() {
                    return;
                }
                if let Some((removed, kind)) = self.registry.remove_track(&identity, &track_id).await
                {
                    self.binder.unbind(&removed);
                    if let Some(session_id) = self.current_session_id().await {
                        self.emit(ClientEvent::TrackEvent {
                            info: TrackEventInfo {
                                session_id,
                                identity,
                                track_id: removed,
                                kind,
                                event_type: TrackEventType::Unsubscribed,
                                timestamp: Utc::now(),
                            },
                            priority: EventPriority::Normal,
                        });
                    }
                }
            }
            TransportEvent::Interrupted { reason } => {
                if state != ConnectionState::Connected {
                    debug!(state = %state, "Dropping interruption notice");
                    return;
                }
                self.on_interrupted(reason).await;
            }
            TransportEvent::Resumed => {
                if state != ConnectionState::Reconnecting {
                    debug!(state = %state, "Dropping resumption notice");
                    return;
                }
                self.on_resumed().await;
            }
            TransportEvent::NetworkQuality(sample) => {
                if !state.is_active() {
                    return;
                }
                self.on_network_quality(sample).await;
            }
            TransportEvent::Closed { reason } => {
                if !state.is_active() {
                    debug!(state = %state, "Dropping transport close notice");
                    return;
                }
                error!(reason = %reason, "Transport closed unexpectedly");
                let error = ClientError::transport_failed(format!("transport closed: {}", reason));
                self.fail_session(format!("transport closed: {}", reason), error).await;
            }
        }
    }

    pub(crate) async fn on_participant_joined(
        &self,
        identity: String,
        tracks: Vec<crate::transport::RemoteTrackInfo>,
    ) {
        let first_participant = self.registry.participant_count() == 0;
        let subscribed = self.registry.add_participant(&identity, tracks).await;

        if let Some(session_id) = self.current_session_id().await {
            self.emit(ClientEvent::ParticipantJoined {
                info: ParticipantInfo {
                    session_id,
                    identity: identity.clone(),
                    timestamp: Utc::now(),
                },
                priority: EventPriority::High,
            });
        }

        for track in &subscribed {
            self.emit_track_event(track, TrackEventType::Subscribed).await;
            self.bind_remote(track).await;
        }

        if first_participant && self.registry.participant_count() > 0 {
            self.health.arm_first_join_probe().await;
        }
    }

    async fn on_participant_left(&self, identity: String) {
        let removed = self.registry.remove_participant(&identity).await;
        for track_id in &removed {
            self.binder.unbind(track_id);
        }
        info!(identity = %identity, tracks = removed.len(), "Participant left");
        if let Some(session_id) = self.current_session_id().await {
            self.emit(ClientEvent::ParticipantLeft {
                info: ParticipantInfo {
                    session_id,
                    identity,
                    timestamp: Utc::now(),
                },
                priority: EventPriority::High,
            });
        }
    }

    async fn on_interrupted(&self, reason: String) {
        self.counters.interruptions.fetch_add(1, Ordering::Relaxed);
        warn!(reason = %reason, "Transport interrupted, waiting for resumption");
        self.set_state(
            ConnectionState::Reconnecting,
            Some(format!("transport interrupted: {}", reason)),
        )
        .await;
        self.start_reconnect_timer().await;
    }

    async fn on_resumed(&self) {
        self.cancel_reconnect_timer().await;
        info!("Transport resumed within the reconnection window");
        self.set_state(ConnectionState::Connected, Some("transport resumed".to_string()))
            .await;
        // One re-validation per resumption; the periodic sweep covers the rest.
        self.health.revalidate_media().await;
    }

    async fn on_network_quality(&self, sample: NetworkQualitySample) {
        let (session_id, local_identity) = {
            let session = self.session.read().await;
            match session.as_ref() {
                Some(s) => (s.id, s.request.identity()),
                None => return,
            }
        };
        self.emit(ClientEvent::NetworkQualityChanged {
            info: NetworkQualityInfo {
                session_id,
                participant_identity: sample.participant_identity.clone(),
                level: sample.level,
                timestamp: sample.timestamp,
            },
            priority: EventPriority::Low,
        });
        if sample.participant_identity == local_identity {
            self.quality.on_local_quality_sample(&sample).await;
        }
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    pub(crate) async fn handle_recovery_command(&self, command: RecoveryCommand) {
        match command {
            RecoveryCommand::ForceRejoin { reason } => {
                if !self.connection_state().await.is_active() {
                    debug!("Dropping forced rejoin outside an active session");
                    return;
                }
                self.counters.watchdog_rejoins.fetch_add(1, Ordering::Relaxed);
                warn!(reason = %reason, "Watchdog forcing a rejoin with the current credential");
                self.rejoin(true, reason).await;
            }
            RecoveryCommand::TransportUnhealthy { state } => {
                if self.connection_state().await != ConnectionState::Connected {
                    debug!(connectivity = %state, "Transport already in recovery, dropping health escalation");
                    return;
                }
                self.counters.interruptions.fetch_add(1, Ordering::Relaxed);
                warn!(connectivity = %state, "Transport unhealthy after in-place restart");
                self.set_state(
                    ConnectionState::Reconnecting,
                    Some(format!("transport connectivity {}", state)),
                )
                .await;
                self.start_reconnect_timer().await;
            }
            RecoveryCommand::ReconnectTimedOut { seconds } => {
                if self.connection_state().await != ConnectionState::Reconnecting {
                    debug!("Reconnect deadline passed after resumption, ignoring");
                    return;
                }
                self.counters.cold_rejoins.fetch_add(1, Ordering::Relaxed);
                warn!(seconds, "Reconnection window elapsed, attempting cold rejoin");
                self.rejoin(false, format!("reconnection window of {}s elapsed", seconds))
                    .await;
            }
        }
    }

    /// Start (or restart) the reconnection deadline
    pub(crate) async fn start_reconnect_timer(&self) {
        let mut slot = self.reconnect_timer.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        let seconds = self.config.reconnect_timeout_secs;
        let commands = self.commands.clone();
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            let _ = commands.send(RecoveryCommand::ReconnectTimedOut { seconds });
        }));
    }

    pub(crate) async fn cancel_reconnect_timer(&self) {
        if let Some(handle) = self.reconnect_timer.lock().await.take() {
            handle.abort();
        }
    }

    /// Tear the transport session down and join the room again
    ///
    /// `keep_credential` is true for the watchdog's forced rejoin, which
    /// reuses whatever credential is stored. The cold rejoin after a
    /// reconnect timeout follows the configured credential policy instead.
    /// A rejoin that fails ends the session.
    pub(crate) async fn rejoin(&self, keep_credential: bool, reason: String) {
        self.cancel_reconnect_timer().await;

        let (session_id, identity, stored) = {
            let session = self.session.read().await;
            match session.as_ref() {
                Some(s) => (s.id, s.request.identity(), s.credential.clone()),
                None => {
                    warn!("Rejoin requested without an active session");
                    return;
                }
            }
        };
        let stored = match stored {
            Some(credential) => credential,
            None => {
                warn!("Rejoin requested before a credential was issued");
                return;
            }
        };

        let credential = if keep_credential {
            stored
        } else {
            match self.config.rejoin_credential_policy {
                RejoinCredentialPolicy::Reuse => stored,
                RejoinCredentialPolicy::Refresh => match self.refresh_credential().await {
                    Ok(fresh) => fresh,
                    Err(e) if e.is_credential_error() => {
                        error!(error = %e, "Credential refused during rejoin, ending the session");
                        self.teardown_to(
                            ConnectionState::Disconnected,
                            e.user_friendly_message(),
                            Some(e),
                        )
                        .await;
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "Credential refresh failed, reusing the stored credential");
                        stored
                    }
                },
            }
        };

        if self.connection_state().await == ConnectionState::Connected {
            self.set_state(ConnectionState::Reconnecting, Some(reason.clone())).await;
        }
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "Transport disconnect before rejoin failed");
        }
        self.binder.detach_all();
        self.registry.clear();
        if !self
            .set_state(ConnectionState::Connecting, Some(reason.clone()))
            .await
        {
            return;
        }

        let connect_request = TransportConnectRequest {
            room_name: credential.room_name.clone(),
            token: credential.token.clone(),
            identity,
            local_tracks: self.capture.handles(),
        };
        match with_timeout(
            "transport_rejoin",
            TRANSPORT_CONNECT_TIMEOUT,
            self.transport.connect(connect_request),
        )
        .await
        {
            Ok(()) => {
                {
                    let mut session = self.session.write().await;
                    if let Some(s) = session.as_mut() {
                        s.credential = Some(credential);
                        s.connected_at = Some(Utc::now());
                    }
                }
                if !self
                    .set_state(ConnectionState::Connected, Some("rejoined".to_string()))
                    .await
                {
                    // The user tore the session down mid-rejoin.
                    let _ = self.transport.disconnect().await;
                    return;
                }
                self.resync_roster().await;
                info!(session_id = %session_id, "Rejoin complete");
            }
            Err(e) => {
                error!(error = %e, "Rejoin failed, ending the session");
                self.fail_session(format!("rejoin failed: {}", e), e).await;
            }
        }
    }

    /// Ask the signaling backend for a new credential for the current session
    pub(crate) async fn refresh_credential(&self) -> ClientResult<JoinCredential> {
        let request = {
            let session = self.session.read().await;
            match session.as_ref() {
                Some(s) => s.request.clone(),
                None => return Err(ClientError::NoActiveSession),
            }
        };
        let wire = crate::signaling::JoinTokenRequest::from_join(&request);
        let response = crate::client::recovery::retry_with_backoff(
            "refresh_join_token",
            crate::client::recovery::RetryConfig::quick(),
            || async { self.signaling.request_join_token(&wire).await },
        )
        .await?;
        let credential = response.into_credential()?;
        {
            let mut session = self.session.write().await;
            if let Some(s) = session.as_mut() {
                s.credential = Some(credential.clone());
            }
        }
        debug!("Join credential refreshed");
        Ok(credential)
    }

    /// Pull the current roster from the transport and fold it into the registry
    ///
    /// Used right after a connect: participants who joined before us never
    /// produce join events, so the snapshot is the only way to learn them.
    pub(crate) async fn resync_roster(&self) {
        let roster = self
            .transport
            .remote_participants()
            .await
            .context("enumerate remote participants after connect");
        match roster {
            Ok(participants) => {
                for participant in participants {
                    self.on_participant_joined(participant.identity, participant.tracks)
                        .await;
                }
            }
            Err(e) => {
                warn!(error = %e, "Roster enumeration failed, relying on transport events");
            }
        }
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Release everything and move to a terminal state
    ///
    /// Ordering is deliberate and observable: capture stops first (devices
    /// freed even if later steps stall), then timers, then sink detach, then
    /// the transport and registry, and the state transition last.
    pub(crate) async fn teardown_to(
        &self,
        terminal: ConnectionState,
        reason: String,
        error: Option<ClientError>,
    ) {
        let released = self.capture.release().await;
        self.health.stop().await;
        self.cancel_reconnect_timer().await;
        self.binder.detach_all();
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "Transport disconnect during teardown failed");
        }
        self.registry.clear();
        let session_id = self.current_session_id().await;
        if released {
            if let Some(session_id) = session_id {
                self.emit(ClientEvent::MediaEvent {
                    info: MediaEventInfo {
                        session_id,
                        event_type: MediaEventType::CaptureReleased,
                        timestamp: Utc::now(),
                        metadata: std::collections::HashMap::new(),
                    },
                    priority: EventPriority::Normal,
                });
            }
        }
        self.set_state(terminal, Some(reason)).await;
        if let Some(error) = error {
            self.emit(ClientEvent::ClientError {
                error,
                session_id,
                priority: EventPriority::Critical,
            });
        }
    }

    /// End the session with `Failed` after an unrecoverable error
    pub(crate) async fn fail_session(&self, reason: String, error: ClientError) {
        self.teardown_to(ConnectionState::Failed, reason, Some(error)).await;
    }

    // ========================================================================
    // Binding
    // ========================================================================

    /// Bind a subscribed remote track to its rendering surface
    ///
    /// Bind exhaustion is a warning, not a session error: the track stays
    /// subscribed and the health checks keep trying.
    pub(crate) async fn bind_remote(&self, track: &SubscribedTrack) {
        let slot = SinkSlot::remote(&track.identity, track.kind);
        match self.binder.bind(&track.track_id, &track.handle, slot).await {
            Ok(()) => {
                self.emit_track_event(track, TrackEventType::Bound).await;
            }
            Err(ClientError::BindFailed { attempts, .. }) => {
                self.counters.bind_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    track_id = %track.track_id,
                    attempts,
                    "Track bind exhausted its attach budget"
                );
                self.emit_track_event(track, TrackEventType::BindFailed { attempts })
                    .await;
            }
            Err(e) => {
                warn!(track_id = %track.track_id, error = %e, "Track bind failed");
            }
        }
    }

    pub(crate) async fn emit_track_event(
        &self,
        track: &SubscribedTrack,
        event_type: TrackEventType,
    ) {
        let session_id = match self.current_session_id().await {
            Some(id) => id,
            None => return,
        };
        let priority = match event_type {
            TrackEventType::BindFailed { .. } => EventPriority::High,
            _ => EventPriority::Normal,
        };
        self.emit(ClientEvent::TrackEvent {
            info: TrackEventInfo {
                session_id,
                identity: track.identity.clone(),
                track_id: track.track_id.clone(),
                kind: track.kind,
                event_type,
                timestamp: Utc::now(),
            },
            priority,
        });
    }
}

impl std::fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientManager")
            .field("config", &self.config)
            .field("participants", &self.registry.participant_count())
            .field("bound_tracks", &self.binder.bound_count())
            .finish()
    }
}
