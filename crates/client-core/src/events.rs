//! Event handling for client-core operations
//!
//! This module provides the event system for live consultation sessions:
//! session state changes, participant arrivals and departures, track and
//! media events, network quality updates, and error notifications. The event
//! system supports filtering, prioritization, and async handling.
//!
//! # Event Types
//!
//! - **Session Events** - connection state transitions
//! - **Participant Events** - remote parties joining and leaving
//! - **Track Events** - subscription and sink-binding changes
//! - **Media Events** - mute toggles, capture degradation, constraint changes
//! - **Quality Events** - per-participant network quality samples
//! - **Error Events** - client errors and failures
//!
//! # Usage Examples
//!
//! ## Basic Event Handler
//!
//! ```rust
//! use medilink_client_core::events::{
//!     ClientEventHandler, SessionStatusInfo, ParticipantInfo,
//! };
//! use async_trait::async_trait;
//!
//! struct MyEventHandler;
//!
//! #[async_trait]
//! impl ClientEventHandler for MyEventHandler {
//!     async fn on_session_state_changed(&self, status_info: SessionStatusInfo) {
//!         println!("Session {} is now {}", status_info.session_id, status_info.new_state);
//!     }
//!
//!     async fn on_participant_joined(&self, info: ParticipantInfo) {
//!         println!("{} joined", info.identity);
//!     }
//!
//!     async fn on_participant_left(&self, info: ParticipantInfo) {
//!         println!("{} left", info.identity);
//!     }
//! }
//! ```
//!
//! ## Event Filtering
//!
//! ```rust
//! use medilink_client_core::events::{EventFilter, EventPriority, MediaEventType};
//! use std::collections::HashSet;
//!
//! // Only high-priority events
//! let filter = EventFilter {
//!     min_priority: Some(EventPriority::High),
//!     ..Default::default()
//! };
//!
//! // Only mute-state media events
//! let mut media_types = HashSet::new();
//! media_types.insert(MediaEventType::MicrophoneStateChanged { muted: true });
//! media_types.insert(MediaEventType::MicrophoneStateChanged { muted: false });
//!
//! let media_filter = EventFilter {
//!     media_event_types: Some(media_types),
//!     ..Default::default()
//! };
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::types::{ConnectionState, SessionId, TrackId, TrackKind};

/// Information about a session state change
///
/// # Examples
///
/// ```rust
/// use medilink_client_core::events::SessionStatusInfo;
/// use medilink_client_core::ConnectionState;
/// use chrono::Utc;
///
/// let status_info = SessionStatusInfo {
///     session_id: uuid::Uuid::new_v4(),
///     new_state: ConnectionState::Connected,
///     previous_state: Some(ConnectionState::Connecting),
///     reason: Some("Transport session established".to_string()),
///     timestamp: Utc::now(),
/// };
///
/// assert_eq!(status_info.new_state, ConnectionState::Connected);
/// ```
#[derive(Debug, Clone)]
pub struct SessionStatusInfo {
    /// Session that changed state
    pub session_id: SessionId,
    /// New connection state after the transition
    pub new_state: ConnectionState,
    /// Previous state before the transition (if known)
    pub previous_state: Option<ConnectionState>,
    /// Reason for the change (e.g. "Transport interrupted")
    pub reason: Option<String>,
    /// When the state change occurred
    pub timestamp: DateTime<Utc>,
}

/// Information about a remote participant joining or leaving
#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    /// Session the participant belongs to
    pub session_id: SessionId,
    /// Role-qualified identity (e.g. "doctor-apt-42")
    pub identity: String,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
}

/// What happened to a remote track
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackEventType {
    /// Track media is now being received
    Subscribed,
    /// Track was unpublished or its participant left
    Unsubscribed,
    /// Track was attached to a rendering sink
    Bound,
    /// Track binding gave up after exhausting its attempt budget; the view
    /// stays dark but the call continues
    BindFailed {
        /// Attempts made before giving up
        attempts: u32,
    },
}

/// Information about a remote track event
#[derive(Debug, Clone)]
pub struct TrackEventInfo {
    /// Session the track belongs to
    pub session_id: SessionId,
    /// Identity of the publishing participant
    pub identity: String,
    /// Transport-assigned track identifier
    pub track_id: TrackId,
    /// Audio or video
    pub kind: TrackKind,
    /// What happened
    pub event_type: TrackEventType,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
}

/// Types of local media events
///
/// # Examples
///
/// ```rust
/// use medilink_client_core::events::MediaEventType;
///
/// let mute_event = MediaEventType::MicrophoneStateChanged { muted: true };
/// let camera_event = MediaEventType::CameraStateChanged { muted: false };
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaEventType {
    /// Microphone mute state changed
    MicrophoneStateChanged {
        /// Whether the microphone is now muted
        muted: bool,
    },
    /// Camera mute state changed
    CameraStateChanged {
        /// Whether the camera is now muted
        muted: bool,
    },
    /// One or more capture kinds could not be acquired; the session continues
    /// without them
    CaptureDegraded {
        /// The kinds that are absent
        missing: Vec<TrackKind>,
    },
    /// New capture constraints were applied to a local track
    ConstraintsApplied {
        /// The kind whose constraints changed
        kind: TrackKind,
    },
    /// All local capture was stopped and released
    CaptureReleased,
}

/// Local media event information
#[derive(Debug, Clone)]
pub struct MediaEventInfo {
    /// Session the event relates to
    pub session_id: SessionId,
    /// Type of media event that occurred
    pub event_type: MediaEventType,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// Additional event metadata (constraint values, device labels, etc.)
    pub metadata: std::collections::HashMap<String, String>,
}

/// Network quality update for one participant
#[derive(Debug, Clone)]
pub struct NetworkQualityInfo {
    /// Session the sample belongs to
    pub session_id: SessionId,
    /// Participant the sample measures (may be the local identity)
    pub participant_identity: String,
    /// Quality level, 0 (unusable) to 5 (excellent)
    pub level: u8,
    /// When the sample was taken
    pub timestamp: DateTime<Utc>,
}

/// Event priority levels for filtering and handling
///
/// # Examples
///
/// ```rust
/// use medilink_client_core::events::EventPriority;
///
/// assert!(EventPriority::Critical > EventPriority::High);
/// assert!(EventPriority::High > EventPriority::Normal);
/// assert!(EventPriority::Normal > EventPriority::Low);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    /// Low priority events (quality samples, routine status)
    Low,
    /// Normal priority events (track events, media events)
    Normal,
    /// High priority events (participants joining, session connected)
    High,
    /// Critical priority events (fatal failures)
    Critical,
}

/// Event filtering options for selective subscription
///
/// # Examples
///
/// ```rust
/// use medilink_client_core::events::{EventFilter, EventPriority};
/// use medilink_client_core::ConnectionState;
/// use std::collections::HashSet;
///
/// // Filter for high-priority events only
/// let priority_filter = EventFilter {
///     min_priority: Some(EventPriority::High),
///     ..Default::default()
/// };
///
/// // Filter for terminal state changes
/// let mut states = HashSet::new();
/// states.insert(ConnectionState::Disconnected);
/// states.insert(ConnectionState::Failed);
/// let state_filter = EventFilter {
///     connection_states: Some(states),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Only receive events for specific sessions (None = all sessions)
    pub session_ids: Option<HashSet<SessionId>>,
    /// Only receive specific connection state changes (None = all states)
    pub connection_states: Option<HashSet<ConnectionState>>,
    /// Only receive specific types of media events (None = all media events)
    pub media_event_types: Option<HashSet<MediaEventType>>,
    /// Minimum event priority level (None = all priorities)
    pub min_priority: Option<EventPriority>,
}

/// Comprehensive client event types
///
/// Unified event type covering everything that can happen during a
/// consultation session, with associated priority levels for filtering.
///
/// # Examples
///
/// ```rust
/// use medilink_client_core::events::{ClientEvent, ParticipantInfo, EventPriority};
/// use chrono::Utc;
///
/// let event = ClientEvent::ParticipantJoined {
///     info: ParticipantInfo {
///         session_id: uuid::Uuid::new_v4(),
///         identity: "doctor-apt-42".to_string(),
///         timestamp: Utc::now(),
///     },
///     priority: EventPriority::High,
/// };
///
/// assert_eq!(event.priority(), EventPriority::High);
/// ```
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Session connection state changed
    SessionStateChanged {
        /// Information about the state change
        info: SessionStatusInfo,
        /// Priority of this event
        priority: EventPriority,
    },
    /// A remote participant joined the session
    ParticipantJoined {
        /// Information about the participant
        info: ParticipantInfo,
        /// Priority of this event
        priority: EventPriority,
    },
    /// A remote participant left the session
    ParticipantLeft {
        /// Information about the participant
        info: ParticipantInfo,
        /// Priority of this event
        priority: EventPriority,
    },
    /// A remote track was subscribed, unsubscribed, or (un)bound
    TrackEvent {
        /// Information about the track event
        info: TrackEventInfo,
        /// Priority of this event
        priority: EventPriority,
    },
    /// Local media event (mute, capture degradation, constraints)
    MediaEvent {
        /// Information about the media event
        info: MediaEventInfo,
        /// Priority of this event
        priority: EventPriority,
    },
    /// Network quality sample received
    NetworkQualityChanged {
        /// The quality sample
        info: NetworkQualityInfo,
        /// Priority of this event
        priority: EventPriority,
    },
    /// Client error occurred
    ClientError {
        /// The error that occurred
        error: crate::ClientError,
        /// Session associated with the error (if any)
        session_id: Option<SessionId>,
        /// Priority of this event
        priority: EventPriority,
    },
}

impl ClientEvent {
    /// Get the priority of this event
    pub fn priority(&self) -> EventPriority {
        match self {
            ClientEvent::SessionStateChanged { priority, .. } => priority.clone(),
            ClientEvent::ParticipantJoined { priority, .. } => priority.clone(),
            ClientEvent::ParticipantLeft { priority, .. } => priority.clone(),
            ClientEvent::TrackEvent { priority, .. } => priority.clone(),
            ClientEvent::MediaEvent { priority, .. } => priority.clone(),
            ClientEvent::NetworkQualityChanged { priority, .. } => priority.clone(),
            ClientEvent::ClientError { priority, .. } => priority.clone(),
        }
    }

    /// Get the session ID associated with this event (if any)
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            ClientEvent::SessionStateChanged { info, .. } => Some(info.session_id),
            ClientEvent::ParticipantJoined { info, .. } => Some(info.session_id),
            ClientEvent::ParticipantLeft { info, .. } => Some(info.session_id),
            ClientEvent::TrackEvent { info, .. } => Some(info.session_id),
            ClientEvent::MediaEvent { info, .. } => Some(info.session_id),
            ClientEvent::NetworkQualityChanged { info, .. } => Some(info.session_id),
            ClientEvent::ClientError { session_id, .. } => *session_id,
        }
    }

    /// Check if this event passes the given filter
    ///
    /// # Examples
    ///
    /// ```rust
    /// use medilink_client_core::events::{ClientEvent, EventFilter, EventPriority, NetworkQualityInfo};
    /// use chrono::Utc;
    ///
    /// let event = ClientEvent::NetworkQualityChanged {
    ///     info: NetworkQualityInfo {
    ///         session_id: uuid::Uuid::new_v4(),
    ///         participant_identity: "patient-apt-42".to_string(),
    ///         level: 4,
    ///         timestamp: Utc::now(),
    ///     },
    ///     priority: EventPriority::Low,
    /// };
    ///
    /// let filter = EventFilter {
    ///     min_priority: Some(EventPriority::High),
    ///     ..Default::default()
    /// };
    ///
    /// // A low-priority sample does not pass a high-priority filter
    /// assert!(!event.passes_filter(&filter));
    /// ```
    pub fn passes_filter(&self, filter: &EventFilter) -> bool {
        // Check priority filter
        if let Some(min_priority) = &filter.min_priority {
            if self.priority() < *min_priority {
                return false;
            }
        }

        // Check session ID filter
        if let Some(session_ids) = &filter.session_ids {
            if let Some(session_id) = self.session_id() {
                if !session_ids.contains(&session_id) {
                    return false;
                }
            } else {
                // Event has no session ID but filter requires specific sessions
                return false;
            }
        }

        // Check connection state filter
        if let Some(states) = &filter.connection_states {
            if let ClientEvent::SessionStateChanged { info, .. } = self {
                if !states.contains(&info.new_state) {
                    return false;
                }
            }
        }

        // Check media event type filter
        if let Some(media_types) = &filter.media_event_types {
            if let ClientEvent::MediaEvent { info, .. } = self {
                if !media_types.contains(&info.event_type) {
                    return false;
                }
            }
        }

        true
    }
}

/// Enhanced event handler with filtering capabilities
///
/// Trait for handling consultation session events. The three required methods
/// cover what every embedding application needs to react to; the rest default
/// to no-ops and can be overridden selectively.
///
/// # Examples
///
/// ```rust
/// use medilink_client_core::events::{
///     ClientEventHandler, SessionStatusInfo, ParticipantInfo, TrackEventInfo,
/// };
/// use async_trait::async_trait;
///
/// struct LoggingEventHandler;
///
/// #[async_trait]
/// impl ClientEventHandler for LoggingEventHandler {
///     async fn on_session_state_changed(&self, status_info: SessionStatusInfo) {
///         println!("Session state: {:?}", status_info.new_state);
///     }
///
///     async fn on_participant_joined(&self, info: ParticipantInfo) {
///         println!("Joined: {}", info.identity);
///     }
///
///     async fn on_participant_left(&self, info: ParticipantInfo) {
///         println!("Left: {}", info.identity);
///     }
///
///     async fn on_track_event(&self, info: TrackEventInfo) {
///         println!("Track {}: {:?}", info.track_id, info.event_type);
///     }
/// }
/// ```
#[async_trait]
pub trait ClientEventHandler: Send + Sync {
    /// Handle session connection state changes
    ///
    /// Called for every applied transition, including the terminal ones.
    async fn on_session_state_changed(&self, status_info: SessionStatusInfo);

    /// Handle a remote participant joining the session
    async fn on_participant_joined(&self, info: ParticipantInfo);

    /// Handle a remote participant leaving the session
    async fn on_participant_left(&self, info: ParticipantInfo);

    /// Handle remote track subscription and binding changes
    ///
    /// Default implementation does nothing.
    async fn on_track_event(&self, _info: TrackEventInfo) {
        // Default: no-op
    }

    /// Handle local media events
    ///
    /// Default implementation does nothing.
    async fn on_media_event(&self, _info: MediaEventInfo) {
        // Default: no-op
    }

    /// Handle network quality updates
    ///
    /// Default implementation does nothing.
    async fn on_network_quality(&self, _info: NetworkQualityInfo) {
        // Default: no-op
    }

    /// Handle client errors
    ///
    /// Default implementation does nothing.
    async fn on_client_error(&self, _error: crate::ClientError, _session_id: Option<SessionId>) {
        // Default: no-op
    }

    /// Dispatch a unified event to the specific handler methods
    ///
    /// Applications normally implement the specific methods and leave this
    /// default dispatcher alone.
    async fn on_client_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::SessionStateChanged { info, .. } => {
                self.on_session_state_changed(info).await;
            }
            ClientEvent::ParticipantJoined { info, .. } => {
                self.on_participant_joined(info).await;
            }
            ClientEvent::ParticipantLeft { info, .. } => {
                self.on_participant_left(info).await;
            }
            ClientEvent::TrackEvent { info, .. } => {
                self.on_track_event(info).await;
            }
            ClientEvent::MediaEvent { info, .. } => {
                self.on_media_event(info).await;
            }
            ClientEvent::NetworkQualityChanged { info, .. } => {
                self.on_network_quality(info).await;
            }
            ClientEvent::ClientError {
                error, session_id, ..
            } => {
                self.on_client_error(error, session_id).await;
            }
        }
    }
}

/// An event subscription pairing a handler with a filter
///
/// # Examples
///
/// ```rust
/// use medilink_client_core::events::{
///     EventSubscription, EventFilter, EventPriority, ClientEventHandler,
///     SessionStatusInfo, ParticipantInfo,
/// };
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct TestHandler;
///
/// #[async_trait]
/// impl ClientEventHandler for TestHandler {
///     async fn on_session_state_changed(&self, _status_info: SessionStatusInfo) {}
///     async fn on_participant_joined(&self, _info: ParticipantInfo) {}
///     async fn on_participant_left(&self, _info: ParticipantInfo) {}
/// }
///
/// let handler = Arc::new(TestHandler);
/// let subscription = EventSubscription::all_events(handler);
/// println!("Subscription ID: {}", subscription.id());
/// ```
#[derive(Clone)]
pub struct EventSubscription {
    handler: Arc<dyn ClientEventHandler>,
    filter: EventFilter,
    id: uuid::Uuid,
}

impl EventSubscription {
    /// Subscribe to every event
    pub fn all_events(handler: Arc<dyn ClientEventHandler>) -> Self {
        Self {
            handler,
            filter: EventFilter::default(),
            id: uuid::Uuid::new_v4(),
        }
    }

    /// Subscribe with a filter
    pub fn with_filter(handler: Arc<dyn ClientEventHandler>, filter: EventFilter) -> Self {
        Self {
            handler,
            filter,
            id: uuid::Uuid::new_v4(),
        }
    }

    /// Unique identifier of this subscription
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// The subscription's filter
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Deliver an event to this subscription if it passes the filter
    pub async fn deliver(&self, event: ClientEvent) {
        if event.passes_filter(&self.filter) {
            self.handler.on_client_event(event).await;
        }
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .finish()
    }
}
