//! Health and recovery monitoring
//!
//! Four periodic checks keep a live session honest:
//!
//! 1. **Track presence** (default 3 s): every `Subscribed` remote track must
//!    be bound to a sink; unbound tracks are re-bound.
//! 2. **Recovery sweep** (default 5 s): retries failed subscriptions and
//!    re-asserts bindings for whatever comes back.
//! 3. **Transport health** (default 10 s): a degraded transport gets one
//!    in-place restart; if connectivity has not recovered after a grace
//!    period the condition is escalated to the session event loop.
//! 4. **No-remote-media watchdog** (default 15 s, plus a one-shot probe
//!    30 s after the first participant join): participants that have been
//!    present for a full interval without a single subscribed track indicate
//!    a broken transport path and trigger a forced rejoin.
//!
//! Checks perform only benign, idempotent repairs themselves (re-subscribe,
//! re-bind, in-place restart). Anything that changes session state is routed
//! to the session event loop as a [`RecoveryCommand`], so a single writer
//! owns every state transition. Each check re-verifies the session state at
//! the top of its tick; a tick that lands after teardown does nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::binder::RenderBinder;
use crate::client::config::HealthConfig;
use crate::client::manager::SessionStatsCounters;
use crate::client::registry::{ParticipantRegistry, SubscribedTrack};
use crate::client::types::{ConnectionState, SessionId};
use crate::events::{ClientEvent, EventPriority, TrackEventInfo, TrackEventType};
use crate::transport::{MediaTransport, SinkSlot};

/// Session-level action requested by a health check or recovery timer
///
/// Checks and timers never transition the session themselves; they hand one
/// of these to the session event loop and let it apply the change under its
/// own rules.
#[derive(Debug, Clone)]
pub(crate) enum RecoveryCommand {
    /// Tear the transport down and rejoin, keeping the current credential
    ForceRejoin {
        /// Human-readable trigger, logged and attached to the state change
        reason: String,
    },
    /// An in-place transport restart did not take
    TransportUnhealthy {
        /// Connectivity state observed after the grace period
        state: String,
    },
    /// The reconnection window elapsed without a resumption
    ReconnectTimedOut {
        /// Length of the window that elapsed
        seconds: u64,
    },
}

/// Owner of the periodic health checks for one session
///
/// Created once per client and restarted for each session. `start` spawns
/// the check tasks; `stop` aborts them all and clears the one-shot probe.
/// The check bodies are public so tests can drive a tick directly without
/// waiting out an interval.
pub struct HealthMonitor {
    config: HealthConfig,
    state: Arc<RwLock<ConnectionState>>,
    registry: Arc<ParticipantRegistry>,
    binder: Arc<RenderBinder>,
    transport: Arc<dyn MediaTransport>,
    commands: mpsc::UnboundedSender<RecoveryCommand>,
    events: broadcast::Sender<ClientEvent>,
    counters: Arc<SessionStatsCounters>,
    session_id: RwLock<Option<SessionId>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    probe: Mutex<Option<JoinHandle<()>>>,
    probe_armed: AtomicBool,
}

impl HealthMonitor {
    pub(crate) fn new(
        config: HealthConfig,
        state: Arc<RwLock<ConnectionState>>,
        registry: Arc<ParticipantRegistry>,
        binder: Arc<RenderBinder>,
        transport: Arc<dyn MediaTransport>,
        commands: mpsc::UnboundedSender<RecoveryCommand>,
        events: broadcast::Sender<ClientEvent>,
        counters: Arc<SessionStatsCounters>,
    ) -> Self {
        Self {
            config,
            state,
            registry,
            binder,
            transport,
            commands,
            events,
            counters,
            session_id: RwLock::new(None),
            tasks: Mutex::new(Vec::new()),
            probe: Mutex::new(None),
            probe_armed: AtomicBool::new(false),
        }
    }

    /// Begin monitoring a session
    ///
    /// Restarts cleanly if checks from a previous session are still running.
    pub async fn start(self: &Arc<Self>, session_id: SessionId) {
        self.stop().await;
        *self.session_id.write().await = Some(session_id);
        self.probe_armed.store(false, Ordering::SeqCst);

        let mut tasks = self.tasks.lock().await;

        let monitor = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            let period = monitor.config.track_presence_interval();
            loop {
                tokio::time::sleep(period).await;
                monitor.run_track_presence_check().await;
            }
        }));

        let monitor = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            let period = monitor.config.recovery_sweep_interval();
            loop {
                tokio::time::sleep(period).await;
                monitor.run_recovery_sweep().await;
            }
        }));

        let monitor = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            let period = monitor.config.transport_check_interval();
            loop {
                tokio::time::sleep(period).await;
                monitor.run_transport_health_check().await;
            }
        }));

        let monitor = Arc::clone(self);
        tasks.push(tokio::spawn(async move {
            let period = monitor.config.media_watchdog_interval();
            loop {
                tokio::time::sleep(period).await;
                monitor.run_media_watchdog().await;
            }
        }));

        info!(
            session_id = %session_id,
            presence_ms = self.config.track_presence_interval_ms,
            sweep_ms = self.config.recovery_sweep_interval_ms,
            transport_ms = self.config.transport_check_interval_ms,
            watchdog_ms = self.config.media_watchdog_interval_ms,
            "Health monitoring started"
        );
    }

    /// Abort every check task and the one-shot probe
    ///
    /// Idempotent; safe to call on a monitor that was never started.
    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        let had_tasks = !tasks.is_empty();
        for task in tasks.drain(..) {
            task.abort();
        }
        if let Some(probe) = self.probe.lock().await.take() {
            probe.abort();
        }
        *self.session_id.write().await = None;
        if had_tasks {
            debug!("Health monitoring stopped");
        }
    }

    /// Whether check tasks are currently scheduled
    pub async fn is_running(&self) -> bool {
        !self.tasks.lock().await.is_empty()
    }

    /// Arm the one-shot no-remote-media probe
    ///
    /// Called when the first remote participant joins; later calls in the
    /// same session are no-ops. The probe fires once after the configured
    /// delay and applies the same starvation test as the periodic watchdog.
    pub async fn arm_first_join_probe(self: &Arc<Self>) {
        if self.probe_armed.swap(true, Ordering::SeqCst) {
            return;
        }
        let monitor = Arc::clone(self);
        let delay = self.config.media_watchdog_probe_delay();
        debug!(delay_ms = self.config.media_watchdog_probe_delay_ms, "Armed first-join media probe");
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            monitor.run_media_watchdog().await;
        });
        *self.probe.lock().await = Some(handle);
    }

    /// Track presence check: every subscribed track must be bound to a sink
    pub async fn run_track_presence_check(&self) {
        if !self.session_active().await {
            return;
        }
        for track in self.registry.subscribed_tracks() {
            if self.binder.is_bound(&track.track_id) {
                continue;
            }
            debug!(
                track_id = %track.track_id,
                identity = %track.identity,
                "Presence check found unbound subscribed track"
            );
            self.rebind(&track).await;
        }
    }

    /// Recovery sweep: retry failed subscriptions, then re-assert bindings
    pub async fn run_recovery_sweep(&self) {
        if !self.session_active().await {
            return;
        }
        self.revalidate_media().await;
    }

    /// Transport health check: restart in place, escalate if it does not take
    pub async fn run_transport_health_check(&self) {
        if !self.session_active().await {
            return;
        }
        let state = self.transport.connectivity_state();
        if !state.needs_restart() {
            return;
        }
        info!(connectivity = %state, "Transport degraded, requesting in-place restart");
        if let Err(e) = self.transport.restart_connectivity().await {
            warn!(error = %e, "Transport restart request failed");
        }

        tokio::time::sleep(self.config.transport_restart_grace()).await;
        if !self.session_active().await {
            return;
        }
        let after = self.transport.connectivity_state();
        if after.needs_restart() {
            warn!(connectivity = %after, "Transport did not recover within the restart grace period");
            let _ = self.commands.send(RecoveryCommand::TransportUnhealthy {
                state: after.to_string(),
            });
        } else {
            info!(connectivity = %after, "Transport recovered after in-place restart");
        }
    }

    /// No-remote-media watchdog: participants present but nothing ever played
    ///
    /// Only participants present for at least one full watchdog interval
    /// count, so someone who joined moments before the tick cannot trigger a
    /// rejoin.
    pub async fn run_media_watchdog(&self) {
        if !self.session_active().await {
            return;
        }
        let starved = self
            .registry
            .media_starved_identities(self.config.media_watchdog_interval());
        if starved.is_empty() {
            return;
        }
        warn!(
            identities = ?starved,
            "Participants present with no remote media, requesting forced rejoin"
        );
        let _ = self.commands.send(RecoveryCommand::ForceRejoin {
            reason: format!("no remote media from {}", starved.join(", ")),
        });
    }

    /// Re-validate every subscription and binding
    ///
    /// Invoked by the session event loop once per resumption, and by the
    /// periodic recovery sweep. Idempotent: healthy subscriptions and
    /// matching bindings are left untouched.
    pub async fn revalidate_media(&self) {
        let recovered = self.registry.ensure_subscriptions().await;
        for track in &recovered {
            info!(
                track_id = %track.track_id,
                identity = %track.identity,
                "Recovered subscription for remote track"
            );
            self.emit_track_event(track, TrackEventType::Subscribed).await;
        }
        for track in self.registry.subscribed_tracks() {
            if !self.binder.is_bound(&track.track_id) {
                self.rebind(&track).await;
            }
        }
    }

    async fn rebind(&self, track: &SubscribedTrack) {
        let slot = SinkSlot::remote(&track.identity, track.kind);
        match self.binder.bind(&track.track_id, &track.handle, slot).await {
            Ok(()) => {
                self.emit_track_event(track, TrackEventType::Bound).await;
            }
            Err(crate::ClientError::BindFailed { attempts, .. }) => {
                self.counters.bind_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    track_id = %track.track_id,
                    attempts,
                    "Re-bind exhausted its attach budget"
                );
                self.emit_track_event(track, TrackEventType::BindFailed { attempts })
                    .await;
            }
            Err(e) => {
                warn!(track_id = %track.track_id, error = %e, "Re-bind failed");
            }
        }
    }

    async fn emit_track_event(&self, track: &SubscribedTrack, event_type: TrackEventType) {
        let session_id = match *self.session_id.read().await {
            Some(id) => id,
            None => return,
        };
        let priority = match event_type {
            TrackEventType::BindFailed { .. } => EventPriority::High,
            _ => EventPriority::Normal,
        };
        let _ = self.events.send(ClientEvent::TrackEvent {
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

    async fn session_active(&self) -> bool {
        self.state.read().await.is_active()
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.config)
            .field("probe_armed", &self.probe_armed.load(Ordering::SeqCst))
            .finish()
    }
}
