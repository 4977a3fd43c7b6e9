//! Consultation Session Client
//!
//! This module provides the session client for two-party video
//! consultations. It coordinates join authorization, local capture, the
//! media transport, remote track bookkeeping, sink binding, health
//! monitoring and adaptive capture quality behind a single
//! [`ClientManager`] handle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐    ┌─────────────────────┐    ┌─────────────────────┐
//! │    ClientBuilder    │    │    ClientManager    │    │    Collaborators    │
//! │                     │    │                     │    │                     │
//! │ config + hints      │───▶│ join() / leave()    │───▶│ SignalingApi        │
//! │ collaborators       │    │ mute / constraints  │    │ MediaTransport      │
//! │ sinks               │    │ event loop          │    │ CaptureBackend      │
//! └─────────────────────┘    └─────────────────────┘    └─────────────────────┘
//!                                      │
//!           ┌──────────────┬───────────┼───────────┬──────────────┐
//!           ▼              ▼           ▼           ▼              ▼
//!    ┌────────────┐ ┌────────────┐ ┌──────────┐ ┌─────────┐ ┌───────────┐
//!    │  Capture   │ │ Participant│ │  Render  │ │ Health  │ │  Quality  │
//!    │  Manager   │ │  Registry  │ │  Binder  │ │ Monitor │ │Controller │
//!    └────────────┘ └────────────┘ └──────────┘ └─────────┘ └───────────┘
//! ```
//!
//! All connection state transitions happen on the callers of `join` and
//! `leave` or inside the single session event loop; the periodic health
//! checks never touch state directly, they send recovery commands into
//! the loop instead.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use medilink_client_core::client::{ClientBuilder, JoinRequest, ParticipantRole};
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
//! // Watch the session from the raw event stream
//! let mut events = client.subscribe_events();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("event: {:?}", event.priority());
//!     }
//! });
//!
//! let session_id = client
//!     .join(JoinRequest::new("apt-2042", ParticipantRole::Patient))
//!     .await?;
//! println!("in consultation {}", session_id);
//!
//! client.set_microphone_muted(true).await?;
//! client.set_microphone_muted(false).await?;
//!
//! client.leave().await?;
//! # Ok(())
//! # }
//! ```

pub mod binder;
pub mod builder;
pub mod capture;
pub mod config;
pub mod device;
pub mod health;
pub mod manager;
pub mod quality;
pub mod recovery;
pub mod registry;
pub mod session;
pub mod types;


// Re-exports for convenience
pub use builder::ClientBuilder;
pub use config::{
    AudioConstraints, CaptureConfig, CaptureConstraints, CapturePreset, ClientConfig,
    HealthConfig, RejoinCredentialPolicy, VideoConstraints,
};
pub use device::{DeviceProfile, DeviceProfiler, NetworkEffectiveType, PlatformHints, ViewportClass};
pub use manager::ClientManager;
pub use types::{
    ClientStats, ConnectionState, JoinCredential, JoinRequest, LocalTrackInfo, ParticipantRole,
    ParticipantSummary, PublicationState, SessionId, SessionInfo, SubscriptionState, TrackId,
    TrackKind,
};
