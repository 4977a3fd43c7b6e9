//! Session operations for the client-core library
//!
//! This module contains the public operations on a consultation session:
//! joining, leaving, mute controls, capture constraint updates and viewport
//! handling.
//!
//! # Session Lifecycle Overview
//!
//! A consultation session moves through a fixed state machine:
//!
//! ```text
//! Idle ──► RequestingCredential ──► Connecting ──► Connected
//!                  │                    │              │  ▲
//!                  │                    │              ▼  │
//!                  │                    │         Reconnecting
//!                  ▼                    ▼              │
//!            Disconnected            Failed ◄──────────┘
//! ```
//!
//! `join()` drives the left-to-right path; transport interruptions move a
//! connected session to `Reconnecting` and back; `leave()` reaches
//! `Disconnected` from anywhere. `Disconnected` and `Failed` are terminal:
//! a manager whose session ended cannot be reused.
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use medilink_client_core::{ClientManager, JoinRequest, ParticipantRole};
//!
//! async fn run_consultation(client: Arc<ClientManager>) -> Result<(), Box<dyn std::error::Error>> {
//!     let session_id = client
//!         .join(JoinRequest::new("apt-1001", ParticipantRole::Patient))
//!         .await?;
//!     println!("joined consultation session {}", session_id);
//!
//!     // Privacy controls during the call
//!     client.set_microphone_muted(true).await?;
//!     client.set_microphone_muted(false).await?;
//!
//!     client.leave().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::client::config::{CaptureConstraints, CapturePreset};
use crate::client::device::ViewportClass;
use crate::client::manager::{ActiveSession, TRANSPORT_CONNECT_TIMEOUT};
use crate::client::recovery::{retry_with_backoff, with_timeout, RetryConfig};
use crate::client::types::{
    ConnectionState, JoinRequest, ParticipantRole, PublicationState, SessionId, TrackKind,
};
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, EventPriority, MediaEventInfo, MediaEventType, SessionStatusInfo};
use crate::signaling::JoinTokenRequest;
use crate::transport::TransportConnectRequest;

/// Session operations implementation for ClientManager
impl super::manager::ClientManager {
    /// Join the consultation for an appointment
    ///
    /// Runs the full establishment sequence: credential request, local media
    /// acquisition, transport join and initial roster sync. Returns once the
    /// session is `Connected` with the health checks running.
    ///
    /// # Arguments
    ///
    /// * `request` - The appointment and the local user's role
    ///
    /// # Returns
    ///
    /// The id of the established session.
    ///
    /// # Errors
    ///
    /// * `ClientError::InvalidSessionState` - `join` was already called on
    ///   this manager, or `leave()` ended the session while this join was
    ///   still underway
    /// * `ClientError::CredentialRejected` - the backend refused the join;
    ///   the message carries the backend's reason verbatim and the transport
    ///   was never contacted
    /// * `ClientError::SignalingUnreachable` - the credential request kept
    ///   failing after retries
    /// * `ClientError::NoUsableMedia` - neither microphone nor camera could
    ///   be acquired
    /// * `ClientError::TransportJoin` / `ClientError::TransportFailed` - the
    ///   transport join failed even after a retry with a fresh credential
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use medilink_client_core::{ClientManager, JoinRequest, ParticipantRole};
    ///
    /// async fn join_as_patient(client: Arc<ClientManager>) -> Result<(), Box<dyn std::error::Error>> {
    ///     let session_id = client
    ///         .join(JoinRequest::new("apt-42", ParticipantRole::Patient))
    ///         .await?;
    ///     println!("in session {}", session_id);
    ///     Ok(())
    /// }
    /// ```
    ///
    /// # Join Flow
    ///
    /// 1. Claims the state machine (`Idle` → `RequestingCredential`)
    /// 2. Requests a join credential, retrying transient signaling failures
    /// 3. Acquires microphone and camera, degrading on per-device failure
    /// 4. Opens the transport session (`Connecting`), publishing local tracks
    /// 5. On transport failure, retries once with a freshly issued credential
    /// 6. Transitions to `Connected`, folds in the existing roster and
    ///    starts the health checks
    pub async fn join(self: &Arc<Self>, request: JoinRequest) -> ClientResult<SessionId> {
        // Claim the state machine; only an idle manager may join.
        let session_id = SessionId::new_v4();
        {
            let mut state = self.state.write().await;
            if !matches!(*state, ConnectionState::Idle) {
                return Err(ClientError::invalid_state("join", state.clone()));
            }
            *state = ConnectionState::RequestingCredential;
        }
        *self.session.write().await = Some(ActiveSession {
            id: session_id,
            request: request.clone(),
            credential: None,
            created_at: Utc::now(),
            connected_at: None,
        });
        info!(
            session_id = %session_id,
            appointment_id = %request.appointment_id,
            role = request.role.label(),
            "Joining consultation"
        );
        self.emit(ClientEvent::SessionStateChanged {
            info: SessionStatusInfo {
                session_id,
                new_state: ConnectionState::RequestingCredential,
                previous_state: Some(ConnectionState::Idle),
                reason: None,
                timestamp: Utc::now(),
            },
            priority: EventPriority::High,
        });

        // Ask the signaling backend for a join credential. Transient network
        // failures are retried; a refusal is final and never reaches the
        // transport.
        let wire = JoinTokenRequest::from_join(&request);
        let response = retry_with_backoff("request_join_token", RetryConfig::quick(), || async {
            self.signaling.request_join_token(&wire).await
        })
        .await;
        let credential = match response.and_then(|r| r.into_credential()) {
            Ok(credential) => credential,
            Err(e) if e.is_credential_error() => {
                warn!(error = %e, "Join refused by signaling backend");
                self.teardown_to(
                    ConnectionState::Disconnected,
                    e.user_friendly_message(),
                    Some(e.clone()),
                )
                .await;
                return Err(e);
            }
            Err(e) => {
                error!(error = %e, "Join authorization failed");
                self.fail_session(format!("join authorization failed: {}", e), e.clone())
                    .await;
                return Err(e);
            }
        };

        // leave() may have won the race while the credential request was in
        // flight; a dead session must not acquire devices.
        let state = self.connection_state().await;
        if state.is_terminal() {
            debug!(state = %state, "Session ended during the credential request, aborting join");
            return Err(ClientError::invalid_state("join", state));
        }

        // Acquire local media. Per-device failures degrade the session;
        // acquiring nothing at all aborts it.
        match self.capture.acquire_local_tracks(&self.config.capture).await {
            Ok(_) => {
                let missing = self.capture.missing_kinds();
                if !missing.is_empty() {
                    warn!(missing = ?missing, "Proceeding with degraded capture");
                    self.emit(ClientEvent::MediaEvent {
                        info: MediaEventInfo {
                            session_id,
                            event_type: MediaEventType::CaptureDegraded { missing },
                            timestamp: Utc::now(),
                            metadata: HashMap::new(),
                        },
                        priority: EventPriority::High,
                    });
                }
            }
            Err(e) => {
                error!(error = %e, "No local media could be acquired");
                self.fail_session("no usable media could be acquired".to_string(), e.clone())
                    .await;
                return Err(e);
            }
        }

        // Store the credential and open the transport session. The event
        // loop starts before connect so nothing emitted during the handshake
        // is lost.
        {
            let mut session = self.session.write().await;
            if let Some(s) = session.as_mut() {
                s.credential = Some(credential.clone());
            }
        }
        if !self.set_state(ConnectionState::Connecting, None).await {
            // leave() won the race while media was being acquired.
            self.capture.release().await;
            return Err(ClientError::invalid_state(
                "join",
                self.connection_state().await,
            ));
        }
        self.start_event_loop().await;
        for track in self.capture.local_tracks() {
            self.capture
                .set_publication_state(track.kind, PublicationState::Publishing);
        }

        let mut active_credential = credential;
        let mut refreshes: u32 = 0;
        loop {
            let connect_request = TransportConnectRequest {
                room_name: active_credential.room_name.clone(),
                token: active_credential.token.clone(),
                identity: request.identity(),
                local_tracks: self.capture.handles(),
            };
            match with_timeout(
                "transport_connect",
                TRANSPORT_CONNECT_TIMEOUT,
                self.transport.connect(connect_request),
            )
            .await
            {
                Ok(()) => break,
                Err(e) if refreshes < self.config.transport_join_retries => {
                    refreshes += 1;
                    warn!(
                        error = %e,
                        attempt = refreshes,
                        "Transport join failed, retrying with a fresh credential"
                    );
                    match self.refresh_credential().await {
                        Ok(fresh) => active_credential = fresh,
                        Err(refresh_err) if refresh_err.is_credential_error() => {
                            warn!(error = %refresh_err, "Credential refused during join retry");
                            self.teardown_to(
                                ConnectionState::Disconnected,
                                refresh_err.user_friendly_message(),
                                Some(refresh_err.clone()),
                            )
                            .await;
                            return Err(refresh_err);
                        }
                        Err(refresh_err) => {
                            error!(error = %refresh_err, "Credential refresh failed during join retry");
                            self.fail_session(
                                format!("credential refresh failed: {}", refresh_err),
                                refresh_err.clone(),
                            )
                            .await;
                            return Err(refresh_err);
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Transport join failed after credential refresh");
                    self.fail_session(format!("transport join failed: {}", e), e.clone())
                        .await;
                    return Err(e);
                }
            }
        }

        // The transport accepted our tracks as part of the join.
        for track in self.capture.local_tracks() {
            self.capture
                .set_publication_state(track.kind, PublicationState::Published);
        }
        {
            let mut session = self.session.write().await;
            if let Some(s) = session.as_mut() {
                s.credential = Some(active_credential.clone());
                s.connected_at = Some(Utc::now());
            }
        }
        if !self.set_state(ConnectionState::Connected, None).await {
            // leave() won the race while the transport was connecting; drop
            // everything this join still holds.
            self.capture.release().await;
            self.stop_event_loop().await;
            let _ = self.transport.disconnect().await;
            return Err(ClientError::invalid_state(
                "join",
                self.connection_state().await,
            ));
        }

        // Fold in participants who arrived before us, then start the checks.
        self.resync_roster().await;
        self.health.start(session_id).await;
        info!(session_id = %session_id, "Consultation session established");
        Ok(session_id)
    }

    /// Leave the consultation session
    ///
    /// Tears the session down in a fixed order, all of it completing before
    /// this call returns: capture stops first (camera and microphone are
    /// freed even if a later step stalls), then every timer is cleared, then
    /// sinks are detached, and the state transition to `Disconnected` comes
    /// last. After `leave()` no timer tick or late transport event has any
    /// effect.
    ///
    /// Calling `leave()` on a session that already ended is a no-op; calling
    /// it before `join()` is an error.
    ///
    /// For the patient side, a configured completion notifier is invoked
    /// after teardown so the application can move to its post-consultation
    /// flow.
    ///
    /// # Errors
    ///
    /// * `ClientError::NoActiveSession` - `join()` was never called
    pub async fn leave(&self) -> ClientResult<()> {
        let state = self.connection_state().await;
        if state.is_terminal() {
            debug!(state = %state, "leave() on an ended session is a no-op");
            return Ok(());
        }
        if matches!(state, ConnectionState::Idle) {
            return Err(ClientError::NoActiveSession);
        }

        info!(state = %state, "Leaving consultation session");
        self.teardown_to(ConnectionState::Disconnected, "user left".to_string(), None)
            .await;
        self.stop_event_loop().await;

        let (session_id, role) = {
            let session = self.session.read().await;
            match session.as_ref() {
                Some(s) => (s.id, s.request.role),
                None => return Ok(()),
            }
        };
        if role != ParticipantRole::Practitioner {
            if let Some(notifier) = &self.completion_notifier {
                debug!(session_id = %session_id, "Invoking consultation completion notifier");
                notifier(session_id);
            }
        }
        Ok(())
    }

    /// Mute or unmute the microphone
    ///
    /// The local track is disabled at the source first, then the transport
    /// is told to stop sending it; no renegotiation happens. Muting an
    /// already muted microphone is a no-op.
    pub async fn set_microphone_muted(&self, muted: bool) -> ClientResult<()> {
        self.set_track_muted(TrackKind::Audio, muted).await
    }

    /// Mute or unmute the camera
    pub async fn set_camera_muted(&self, muted: bool) -> ClientResult<()> {
        self.set_track_muted(TrackKind::Video, muted).await
    }

    async fn set_track_muted(&self, kind: TrackKind, muted: bool) -> ClientResult<()> {
        let state = self.connection_state().await;
        if !state.is_in_progress() {
            return Err(ClientError::invalid_state("set_muted", state));
        }

        // The local flip is the real mute; it holds even if the transport
        // relay below fails.
        let handle = match self.capture.set_muted(kind, muted)? {
            Some(handle) => handle,
            None => return Ok(()),
        };
        self.transport.set_track_enabled(&handle, !muted).await?;

        if let Some(session_id) = self.current_session_id().await {
            let event_type = match kind {
                TrackKind::Audio => MediaEventType::MicrophoneStateChanged { muted },
                TrackKind::Video => MediaEventType::CameraStateChanged { muted },
            };
            self.emit(ClientEvent::MediaEvent {
                info: MediaEventInfo {
                    session_id,
                    event_type,
                    timestamp: Utc::now(),
                    metadata: HashMap::new(),
                },
                priority: EventPriority::Normal,
            });
        }
        info!(kind = %kind, muted, "Local track mute changed");
        Ok(())
    }

    /// Whether the microphone is currently muted, if it was acquired
    pub fn is_microphone_muted(&self) -> Option<bool> {
        self.capture.is_muted(TrackKind::Audio)
    }

    /// Whether the camera is currently muted, if it was acquired
    pub fn is_camera_muted(&self) -> Option<bool> {
        self.capture.is_muted(TrackKind::Video)
    }

    /// Apply new capture constraints to a local track
    ///
    /// Advisory: a backend rejection is returned to the caller but leaves
    /// the session and the previously applied constraints untouched.
    pub async fn apply_capture_constraints(
        &self,
        kind: TrackKind,
        constraints: CaptureConstraints,
    ) -> ClientResult<()> {
        self.capture.apply_constraints(kind, constraints).await?;
        if let Some(session_id) = self.current_session_id().await {
            self.emit(ClientEvent::MediaEvent {
                info: MediaEventInfo {
                    session_id,
                    event_type: MediaEventType::ConstraintsApplied { kind },
                    timestamp: Utc::now(),
                    metadata: HashMap::new(),
                },
                priority: EventPriority::Low,
            });
        }
        Ok(())
    }

    /// Report a viewport resize from the UI layer
    ///
    /// Crossing the mobile breakpoint switches the capture preset through
    /// the quality controller; staying within the same class does nothing.
    pub async fn handle_viewport_resize(&self, width_px: u32) {
        let viewport = ViewportClass::from_width(width_px);
        debug!(width_px, viewport = ?viewport, "Viewport resize reported");
        self.quality.on_viewport_change(viewport).await;
    }

    /// The capture preset currently applied by the quality controller
    pub async fn capture_preset(&self) -> CapturePreset {
        self.quality.current_preset().await
    }
}
