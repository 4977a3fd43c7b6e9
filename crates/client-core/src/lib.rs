//! # medilink-client-core - Consultation session client library
//!
//! This crate provides the media session coordination layer for telehealth
//! client applications: it establishes, supervises and tears down the live
//! two-party video consultation between a patient and a practitioner.
//!
//! ## Overview
//!
//! The library is composed of a few core pieces:
//!
//! - **Client**: the [`ClientManager`] session handle, its [`ClientBuilder`],
//!   and the engines behind them (capture, participant registry, sink
//!   binding, health monitoring, adaptive quality)
//! - **Signaling**: the join authorization boundary
//! - **Transport**: the media transport, sink and connectivity boundary
//! - **Events**: the typed session event stream and handler plumbing
//! - **Error**: the error taxonomy shared across the crate
//!
//! The crate owns no I/O of its own. The embedding application supplies a
//! [`SignalingApi`](signaling::SignalingApi), a
//! [`MediaTransport`](transport::MediaTransport) and a
//! [`CaptureBackend`](client::capture::CaptureBackend); everything above
//! those traits lives here, so the whole session lifecycle can be driven
//! and tested without touching a network or a camera.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use medilink_client_core::{ClientBuilder, JoinRequest, ParticipantRole};
//! use medilink_client_core::client::capture::CaptureBackend;
//! use medilink_client_core::signaling::SignalingApi;
//! use medilink_client_core::transport::MediaTransport;
//!
//! # async fn example(
//! #     signaling: Arc<dyn SignalingApi>,
//! #     transport: Arc<dyn MediaTransport>,
//! #     devices: Arc<dyn CaptureBackend>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let client = ClientBuilder::new()
//!     .signaling(signaling)
//!     .transport(transport)
//!     .capture_backend(devices)
//!     .build()
//!     .await?;
//!
//! let session_id = client
//!     .join(JoinRequest::new("apt-2042", ParticipantRole::Patient))
//!     .await?;
//! println!("in consultation {}", session_id);
//!
//! client.leave().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Structure
//!
//! - [`client`]: session manager, builder and supporting engines
//! - [`signaling`]: join token request boundary
//! - [`transport`]: media transport and rendering sink boundary
//! - [`events`]: session event types, filters and handlers
//! - [`error`]: error types and classification helpers

pub mod client;
pub mod error;
pub mod events;
pub mod signaling;
pub mod transport;

// Re-export commonly used types and functions
pub use client::{
    CapturePreset, ClientBuilder, ClientConfig, ClientManager, ClientStats, ConnectionState,
    JoinRequest, ParticipantRole, SessionId, TrackKind,
};
pub use error::{ClientError, ClientResult};
pub use events::{ClientEvent, ClientEventHandler, EventFilter, EventPriority, EventSubscription};

/// Re-export of common types for easier use
pub mod prelude {
    pub use crate::client::{
        CapturePreset, ClientBuilder, ClientConfig, ClientManager, ClientStats, ConnectionState,
        HealthConfig, JoinRequest, ParticipantRole, RejoinCredentialPolicy, SessionId, SessionInfo,
        TrackKind,
    };
    pub use crate::client::capture::CaptureBackend;
    pub use crate::error::{ClientError, ClientResult};
    pub use crate::events::{
        ClientEvent, ClientEventHandler, EventFilter, EventPriority, EventSubscription,
    };
    pub use crate::signaling::SignalingApi;
    pub use crate::transport::{MediaSink, MediaTransport, SinkSlot, TransportEvent};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
