//! Media transport boundary
//!
//! The session client never talks to a WebRTC stack directly. Everything it
//! needs from the real-time layer is expressed here as the [`MediaTransport`]
//! trait plus a broadcast stream of [`TransportEvent`]s, so the coordination
//! logic stays testable against fakes and portable across transport SDKs.
//!
//! The rendering side of the boundary lives here too: the UI supplies
//! [`MediaSink`] implementations per [`SinkSlot`], and the render binder
//! attaches subscribed media to them without ever owning their lifecycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::client::types::{TrackId, TrackKind};
use crate::error::ClientResult;

/// Opaque handle to a playable media stream
///
/// Produced by the capture backend for local tracks and by the transport for
/// subscribed remote tracks; consumed by sinks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaHandle {
    /// Stable identifier of the underlying stream
    pub id: String,
    /// Audio or video
    pub kind: TrackKind,
}

impl MediaHandle {
    /// Create a media handle
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

impl std::fmt::Display for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Connectivity sub-state reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    /// Transport created, no connection attempt yet
    New,
    /// Connection attempt in progress
    Connecting,
    /// Connectivity established
    Connected,
    /// Connectivity lost; transport may self-heal
    Disconnected,
    /// Connectivity failed; needs an explicit restart
    Failed,
    /// Transport closed for good
    Closed,
}

impl ConnectivityState {
    /// Check if the transport considers itself usable or on the way up
    pub fn is_healthy(&self) -> bool {
        matches!(
            self,
            ConnectivityState::New | ConnectivityState::Connecting | ConnectivityState::Connected
        )
    }

    /// Check if an in-place restart is warranted
    pub fn needs_restart(&self) -> bool {
        matches!(
            self,
            ConnectivityState::Disconnected | ConnectivityState::Failed
        )
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A remote track as described by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrackInfo {
    /// Transport-assigned track identifier
    pub track_id: TrackId,
    /// Audio or video
    pub kind: TrackKind,
}

/// A remote participant as described by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipantInfo {
    /// Participant identity
    pub identity: String,
    /// Tracks they currently publish
    pub tracks: Vec<RemoteTrackInfo>,
}

/// One network quality observation pushed by the transport
///
/// Levels run 0 (unusable) to 5 (excellent). Samples are ephemeral; only the
/// most recent one per participant matters.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkQualitySample {
    /// Participant the sample describes
    pub participant_identity: String,
    /// Quality level, 0..=5
    pub level: u8,
    /// When the transport produced the sample
    pub timestamp: DateTime<Utc>,
}

impl NetworkQualitySample {
    /// Create a sample stamped with the current time
    pub fn now(participant_identity: impl Into<String>, level: u8) -> Self {
        Self {
            participant_identity: participant_identity.into(),
            level: level.min(5),
            timestamp: Utc::now(),
        }
    }

    /// Check if this sample indicates poor connectivity
    pub fn is_poor(&self) -> bool {
        self.level <= 1
    }
}

/// Events pushed by the transport while a session is open
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A remote participant joined, possibly already publishing tracks
    ParticipantJoined {
        /// Their identity
        identity: String,
        /// Tracks they publish at join time
        tracks: Vec<RemoteTrackInfo>,
    },
    /// A remote participant left
    ParticipantLeft {
        /// Their identity
        identity: String,
    },
    /// A known participant published a new track
    TrackPublished {
        /// Owning participant
        identity: String,
        /// The published track
        track: RemoteTrackInfo,
    },
    /// A known participant unpublished a track
    TrackUnpublished {
        /// Owning participant
        identity: String,
        /// The withdrawn track
        track_id: TrackId,
    },
    /// Connectivity was interrupted; the transport is trying to resume
    Interrupted {
        /// Transport-provided reason
        reason: String,
    },
    /// Connectivity resumed after an interruption
    Resumed,
    /// A network quality observation
    NetworkQuality(NetworkQualitySample),
    /// The transport shut down and will not recover on its own
    Closed {
        /// Transport-provided reason
        reason: String,
    },
}

/// Everything the connector needs to open a transport session
#[derive(Debug, Clone)]
pub struct TransportConnectRequest {
    /// Room to join
    pub room_name: String,
    /// Join token issued by the signaling backend
    pub token: String,
    /// Role-qualified local identity
    pub identity: String,
    /// Local tracks to publish as part of the join
    pub local_tracks: Vec<MediaHandle>,
}

/// The real-time communication layer, seen from the coordination side
///
/// Implementations wrap an actual transport SDK. All methods are safe to call
/// from multiple tasks; the implementation owns its internal synchronization.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Open the session and publish the given local tracks
    async fn connect(&self, request: TransportConnectRequest) -> ClientResult<()>;

    /// Close the session
    ///
    /// Idempotent; closing an unopened transport is a no-op.
    async fn disconnect(&self) -> ClientResult<()>;

    /// Enable or disable an already-published local track without renegotiation
    async fn set_track_enabled(&self, handle: &MediaHandle, enabled: bool) -> ClientResult<()>;

    /// Subscribe to a remote track, resolving with its playable media
    async fn subscribe_track(&self, identity: &str, track_id: &str) -> ClientResult<MediaHandle>;

    /// Drop the subscription to a remote track
    async fn unsubscribe_track(&self, identity: &str, track_id: &str) -> ClientResult<()>;

    /// Remote participants currently in the session, with their tracks
    async fn remote_participants(&self) -> ClientResult<Vec<RemoteParticipantInfo>>;

    /// Current connectivity sub-state
    fn connectivity_state(&self) -> ConnectivityState;

    /// Request an in-place connectivity restart (ICE restart or equivalent)
    async fn restart_connectivity(&self) -> ClientResult<()>;

    /// Subscribe to the transport's event stream
    fn subscribe_events(&self) -> broadcast::Receiver<TransportEvent>;
}

/// An abstract rendering target supplied by the UI layer
///
/// The controller never owns a sink: it attaches and detaches media, nothing
/// more. `is_ready` lets the UI report surfaces that are registered but not
/// yet mounted, which the binder covers with its bounded retry.
pub trait MediaSink: Send + Sync {
    /// Attach a playable media stream to this surface
    ///
    /// Implementations must tolerate a repeated attach of the same media;
    /// overlapping recovery paths can deliver it more than once.
    fn attach(&self, media: &MediaHandle);

    /// Detach whatever is attached
    fn detach(&self);

    /// Whether the surface can accept an attach right now
    fn is_ready(&self) -> bool {
        true
    }
}

/// Addressing for registered sinks
///
/// The UI registers concrete sinks under slots; the binder resolves a track to
/// a slot and falls back to the per-kind remote default when no
/// participant-specific surface exists (the usual case for a two-party call).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SinkSlot {
    /// Local self-view for one kind
    Local(TrackKind),
    /// Surface dedicated to one remote participant and kind
    Remote {
        /// Participant identity
        identity: String,
        /// Audio or video
        kind: TrackKind,
    },
    /// Shared remote surface for one kind
    RemoteDefault(TrackKind),
}

impl SinkSlot {
    /// Slot for a remote participant's track
    pub fn remote(identity: impl Into<String>, kind: TrackKind) -> Self {
        SinkSlot::Remote {
            identity: identity.into(),
            kind,
        }
    }
}

impl std::fmt::Display for SinkSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkSlot::Local(kind) => write!(f, "local-{}", kind),
            SinkSlot::Remote { identity, kind } => write!(f, "remote-{}-{}", identity, kind),
            SinkSlot::RemoteDefault(kind) => write!(f, "remote-default-{}", kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_predicates() {
        assert!(ConnectivityState::Connected.is_healthy());
        assert!(ConnectivityState::Connecting.is_healthy());
        assert!(!ConnectivityState::Failed.is_healthy());
        assert!(ConnectivityState::Failed.needs_restart());
        assert!(ConnectivityState::Disconnected.needs_restart());
        assert!(!ConnectivityState::Connected.needs_restart());
    }

    #[test]
    fn test_quality_sample_classification() {
        assert!(NetworkQualitySample::now("patient-apt-1", 0).is_poor());
        assert!(NetworkQualitySample::now("patient-apt-1", 1).is_poor());
        assert!(!NetworkQualitySample::now("patient-apt-1", 2).is_poor());
        // Out-of-range levels clamp to the scale.
        assert_eq!(NetworkQualitySample::now("patient-apt-1", 9).level, 5);
    }

    #[test]
    fn test_sink_slot_display() {
        assert_eq!(SinkSlot::Local(TrackKind::Video).to_string(), "local-video");
        assert_eq!(
            SinkSlot::remote("doctor-apt-1", TrackKind::Audio).to_string(),
            "remote-doctor-apt-1-audio"
        );
        assert_eq!(
            SinkSlot::RemoteDefault(TrackKind::Video).to_string(),
            "remote-default-video"
        );
    }
}
