//! Core types for the session coordination layer
//!
//! Identifier aliases, session/track state enums with their transition rules,
//! and the snapshot types handed to applications (session info, participant
//! summaries, statistics). All actual media operations are delegated to the
//! transport boundary in `crate::transport`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::config::CaptureConstraints;

/// Unique identifier for a session
pub type SessionId = uuid::Uuid;

/// Transport-assigned identifier for a remote track
pub type TrackId = String;

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    /// Microphone capture / remote audio
    Audio,
    /// Camera capture / remote video
    Video,
}

impl TrackKind {
    /// Human-readable device name for user-facing messages
    pub fn device_name(&self) -> &'static str {
        match self {
            TrackKind::Audio => "microphone",
            TrackKind::Video => "camera",
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Connection state of the session
///
/// The session advances `Idle → RequestingCredential → Connecting → Connected`,
/// bounces between `Connected` and `Reconnecting` while the transport heals
/// itself, and ends in `Disconnected` (user-initiated or rejected) or `Failed`
/// (exhausted recovery). The terminal states never transition again; only a
/// fresh `join()` produces a new session.
///
/// ```rust
/// use medilink_client_core::ConnectionState;
///
/// assert!(ConnectionState::Connecting.can_transition_to(&ConnectionState::Connected));
/// assert!(!ConnectionState::Idle.can_transition_to(&ConnectionState::Connected));
/// assert!(ConnectionState::Disconnected.is_terminal());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No session; initial state
    Idle,
    /// Asking the signaling backend for a join credential
    RequestingCredential,
    /// Opening the transport session and publishing local tracks
    Connecting,
    /// Session established, media flowing
    Connected,
    /// Transport interrupted; resumption pending
    Reconnecting,
    /// Session ended by the user or rejected by signaling (terminal)
    Disconnected,
    /// Session ended by exhausted recovery or fatal error (terminal)
    Failed,
}

impl ConnectionState {
    /// Check if the session has ended and will never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Failed)
    }

    /// Check if the session is live (media may flow, recovery checks run)
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Reconnecting)
    }

    /// Check if a join is underway or complete
    pub fn is_in_progress(&self) -> bool {
        !self.is_terminal() && !matches!(self, ConnectionState::Idle)
    }

    /// Check whether a transition to `next` is legal
    ///
    /// `Failed` is reachable from any non-terminal state and `Disconnected`
    /// from any state via `leave()`; everything else follows the forward path.
    /// `Connected` is only reachable through `Connecting` or a resumed
    /// `Reconnecting`.
    pub fn can_transition_to(&self, next: &ConnectionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(next, ConnectionState::Disconnected | ConnectionState::Failed) {
            return true;
        }
        matches!(
            (self, next),
            (ConnectionState::Idle, ConnectionState::RequestingCredential)
                | (ConnectionState::RequestingCredential, ConnectionState::Connecting)
                | (ConnectionState::Connecting, ConnectionState::Connected)
                | (ConnectionState::Connected, ConnectionState::Reconnecting)
                | (ConnectionState::Reconnecting, ConnectionState::Connected)
                | (ConnectionState::Reconnecting, ConnectionState::Connecting)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Publication state of a local track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublicationState {
    /// Not yet offered to the transport
    Unpublished,
    /// Publish request in flight
    Publishing,
    /// Visible to the remote side
    Published,
    /// Publish attempt failed
    PublishFailed,
}

/// Subscription state of a remote track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionState {
    /// Known but not requested
    Unsubscribed,
    /// Subscribe request in flight
    Subscribing,
    /// Media is being received
    Subscribed,
    /// Subscribe attempt failed
    SubscriptionFailed,
}

/// Role of the local user within a consultation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantRole {
    /// The practitioner side of the consultation
    Practitioner,
    /// The patient side of the consultation
    Patient,
}

impl ParticipantRole {
    /// Short label used when composing the role-qualified identity
    pub fn label(&self) -> &'static str {
        match self {
            ParticipantRole::Practitioner => "doctor",
            ParticipantRole::Patient => "patient",
        }
    }

    /// Compose the role-qualified identity for an appointment
    ///
    /// ```rust
    /// use medilink_client_core::ParticipantRole;
    ///
    /// assert_eq!(ParticipantRole::Patient.identity_for("apt-42"), "patient-apt-42");
    /// ```
    pub fn identity_for(&self, appointment_id: &str) -> String {
        format!("{}-{}", self.label(), appointment_id)
    }
}

/// Request to join a consultation session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Appointment this consultation belongs to
    pub appointment_id: String,
    /// Local user's role
    pub role: ParticipantRole,
}

impl JoinRequest {
    /// Create a join request for an appointment
    pub fn new(appointment_id: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            appointment_id: appointment_id.into(),
            role,
        }
    }

    /// The role-qualified identity this request joins under
    pub fn identity(&self) -> String {
        self.role.identity_for(&self.appointment_id)
    }
}

/// Time-limited credential authorizing a join to one room
#[derive(Debug, Clone)]
pub struct JoinCredential {
    /// Opaque join token issued by the signaling backend
    pub token: String,
    /// Room the token is scoped to
    pub room_name: String,
    /// When the credential was issued
    pub issued_at: DateTime<Utc>,
}

/// Snapshot of the current session
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Unique session identifier
    pub session_id: SessionId,
    /// Room name returned by the signaling backend
    pub room_name: String,
    /// Role-qualified local identity
    pub local_identity: String,
    /// Local user's role
    pub role: ParticipantRole,
    /// Current connection state
    pub state: ConnectionState,
    /// When the join attempt started
    pub created_at: DateTime<Utc>,
    /// When the transport confirmed the join (if it did)
    pub connected_at: Option<DateTime<Utc>>,
}

/// Snapshot of a local capture track
#[derive(Debug, Clone)]
pub struct LocalTrackInfo {
    /// Audio or video
    pub kind: TrackKind,
    /// Whether the track is enabled (false = muted)
    pub enabled: bool,
    /// Publication state toward the transport
    pub publication_state: PublicationState,
    /// Constraint envelope the track was opened with
    pub constraints: CaptureConstraints,
}

/// Snapshot of a remote track held by the registry
#[derive(Debug, Clone)]
pub struct RemoteTrackSnapshot {
    /// Transport-assigned track identifier
    pub track_id: TrackId,
    /// Audio or video
    pub kind: TrackKind,
    /// Subscription state
    pub subscription_state: SubscriptionState,
    /// Whether the track is currently bound to a live sink
    pub bound: bool,
}

/// Snapshot of a remote participant and their tracks
#[derive(Debug, Clone)]
pub struct ParticipantSummary {
    /// Participant identity
    pub identity: String,
    /// When the transport reported them joining
    pub joined_at: DateTime<Utc>,
    /// Their tracks as currently known
    pub tracks: Vec<RemoteTrackSnapshot>,
}

/// Statistics about the client's current session
#[derive(Debug, Clone)]
pub struct ClientStats {
    /// Whether the client has been started and not stopped
    pub is_running: bool,
    /// Current connection state
    pub connection_state: ConnectionState,
    /// Remote participants currently in the session
    pub participant_count: usize,
    /// Remote tracks in `Subscribed` state
    pub subscribed_tracks: usize,
    /// Remote tracks currently bound to a sink
    pub bound_tracks: usize,
    /// Local tracks currently held by the capture manager
    pub local_tracks: usize,
    /// Transport interruptions observed
    pub interruptions: u64,
    /// Cold rejoins attempted after a reconnect timeout
    pub cold_rejoins: u64,
    /// Forced rejoins issued by the no-remote-media watchdog
    pub watchdog_rejoins: u64,
    /// Bind attempts that exhausted their retry budget
    pub bind_failures: u64,
    /// Constraint applications rejected by the backend
    pub constraint_rejections: u64,
}

impl Default for ClientStats {
    fn default() -> Self {
        Self {
            is_running: false,
            connection_state: ConnectionState::Idle,
            participant_count: 0,
            subscribed_tracks: 0,
            bound_tracks: 0,
            local_tracks: 0,
            interruptions: 0,
            cold_rejoins: 0,
            watchdog_rejoins: 0,
            bind_failures: 0,
            constraint_rejections: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_never_transition() {
        for next in [
            ConnectionState::Idle,
            ConnectionState::RequestingCredential,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            ConnectionState::Disconnected,
            ConnectionState::Failed,
        ] {
            assert!(!ConnectionState::Disconnected.can_transition_to(&next));
            assert!(!ConnectionState::Failed.can_transition_to(&next));
        }
    }

    #[test]
    fn test_connected_requires_connecting_or_resume() {
        assert!(ConnectionState::Connecting.can_transition_to(&ConnectionState::Connected));
        assert!(ConnectionState::Reconnecting.can_transition_to(&ConnectionState::Connected));
        assert!(!ConnectionState::Idle.can_transition_to(&ConnectionState::Connected));
        assert!(
            !ConnectionState::RequestingCredential.can_transition_to(&ConnectionState::Connected)
        );
    }

    #[test]
    fn test_failure_reachable_from_non_terminal() {
        assert!(ConnectionState::Idle.can_transition_to(&ConnectionState::Failed));
        assert!(ConnectionState::Reconnecting.can_transition_to(&ConnectionState::Failed));
        assert!(ConnectionState::Connected.can_transition_to(&ConnectionState::Disconnected));
    }

    #[test]
    fn test_cold_rejoin_path() {
        // A stalled reconnect re-runs the connect leg in place.
        assert!(ConnectionState::Reconnecting.can_transition_to(&ConnectionState::Connecting));
        assert!(ConnectionState::Connecting.can_transition_to(&ConnectionState::Connected));
    }

    #[test]
    fn test_role_identities() {
        assert_eq!(
            ParticipantRole::Practitioner.identity_for("apt-7"),
            "doctor-apt-7"
        );
        let request = JoinRequest::new("apt-7", ParticipantRole::Patient);
        assert_eq!(request.identity(), "patient-apt-7");
    }
}
