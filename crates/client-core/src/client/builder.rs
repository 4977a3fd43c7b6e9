//! Client builder for assembling consultation session clients
//!
//! This module provides a fluent builder interface for constructing session
//! clients. The builder collects configuration, the three collaborator
//! implementations (signaling, transport, capture devices), the rendering
//! sinks, and optional platform hints, then assembles a ready
//! [`ClientManager`].
//!
//! # Architecture
//!
//! The `ClientBuilder` is the only way to obtain a `ClientManager`. The
//! crate itself never touches HTTP, a WebRTC SDK, or physical devices;
//! those live behind the [`SignalingApi`], [`MediaTransport`] and
//! [`CaptureBackend`] traits, and the builder is where the embedding
//! application plugs its implementations in.
//!
//! # Examples
//!
//! ## Basic Client Setup
//!
//! ```no_run
//! use std::sync::Arc;
//! use medilink_client_core::ClientBuilder;
//! use medilink_client_core::client::capture::CaptureBackend;
//! use medilink_client_core::signaling::SignalingApi;
//! use medilink_client_core::transport::MediaTransport;
//!
//! async fn assemble(
//!     signaling: Arc<dyn SignalingApi>,
//!     transport: Arc<dyn MediaTransport>,
//!     devices: Arc<dyn CaptureBackend>,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ClientBuilder::new()
//!         .signaling(signaling)
//!         .transport(transport)
//!         .capture_backend(devices)
//!         .build()
//!         .await?;
//!     println!("client ready: {:?}", client.connection_state().await);
//!     Ok(())
//! }
//! ```
//!
//! ## Tuned Configuration
//!
//! ```rust
//! use medilink_client_core::ClientBuilder;
//! use medilink_client_core::client::config::CapturePreset;
//! use medilink_client_core::client::device::PlatformHints;
//!
//! let builder = ClientBuilder::new()
//!     .reconnect_timeout_secs(20)
//!     .capture_preset(CapturePreset::Low)
//!     .platform_hints(PlatformHints::new().with_viewport_width(390));
//! ```

use std::sync::Arc;

use tracing::info;

use crate::client::binder::SinkRegistry;
use crate::client::capture::CaptureBackend;
use crate::client::config::{
    CaptureConfig, CapturePreset, ClientConfig, HealthConfig, RejoinCredentialPolicy,
};
use crate::client::device::{DeviceProfiler, PlatformHints};
use crate::client::manager::ClientManager;
use crate::client::types::SessionId;
use crate::error::{ClientError, ClientResult};
use crate::signaling::SignalingApi;
use crate::transport::{MediaSink, MediaTransport, SinkSlot};

/// Fluent builder for consultation session clients
///
/// Collects everything a [`ClientManager`] needs and validates it at
/// [`build`](ClientBuilder::build) time. The three collaborators are
/// mandatory; everything else has production defaults.
///
/// # Configuration Categories
///
/// ## Session Policy
/// - Reconnection window and rejoin credential handling
/// - Transport join retry budget
/// - Health check scheduling
///
/// ## Capture
/// - Constraint presets or an explicit capture configuration
/// - Platform hints for automatic preset selection on constrained devices
///
/// ## Collaborators
/// - Signaling backend, media transport, capture device backend
/// - Rendering sinks, registered per slot
/// - Optional consultation completion callback
///
/// # Examples
///
/// ```rust
/// use medilink_client_core::ClientBuilder;
///
/// let builder = ClientBuilder::new()
///     .reconnect_timeout_secs(30)
///     .transport_join_retries(1);
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
    hints: PlatformHints,
    preset_override: Option<CapturePreset>,
    capture_customized: bool,
    signaling: Option<Arc<dyn SignalingApi>>,
    transport: Option<Arc<dyn MediaTransport>>,
    capture_backend: Option<Arc<dyn CaptureBackend>>,
    sinks: Arc<SinkRegistry>,
    completion_notifier: Option<Arc<dyn Fn(SessionId) + Send + Sync>>,
}

impl ClientBuilder {
    /// Create a new client builder with default configuration
    ///
    /// Defaults match the production policy: a 30 second reconnection
    /// window, one transport join retry with a fresh credential, the
    /// standard capture preset, and the stock health check cadence. Device
    /// profiling may still lower the capture preset at build time when
    /// platform hints indicate a constrained host.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use medilink_client_core::ClientBuilder;
    ///
    /// let builder = ClientBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self {
            config: ClientConfig::new(),
            hints: PlatformHints::new(),
            preset_override: None,
            capture_customized: false,
            signaling: None,
            transport: None,
            capture_backend: None,
            sinks: Arc::new(SinkRegistry::new()),
            completion_notifier: None,
        }
    }

    /// Replace the entire configuration
    ///
    /// Later per-field builder calls still apply on top of it. A config set
    /// this way counts as an explicit capture choice, so device profiling
    /// will not overwrite its capture section.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self.capture_customized = true;
        self
    }

    /// Select a capture preset explicitly
    ///
    /// Overrides whatever the device profiler would have chosen.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use medilink_client_core::ClientBuilder;
    /// use medilink_client_core::client::config::CapturePreset;
    ///
    /// let builder = ClientBuilder::new().capture_preset(CapturePreset::Low);
    /// ```
    pub fn capture_preset(mut self, preset: CapturePreset) -> Self {
        self.config.capture = CaptureConfig::from_preset(preset);
        self.preset_override = Some(preset);
        self.capture_customized = true;
        self
    }

    /// Adjust the capture configuration through a closure
    ///
    /// The closure receives the current capture configuration and returns
    /// the adjusted one, which keeps call sites readable when only a field
    /// or two changes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use medilink_client_core::ClientBuilder;
    ///
    /// let builder = ClientBuilder::new().with_capture(|mut capture| {
    ///     capture.video.frame_rate = 24;
    ///     capture.audio.auto_gain_control = false;
    ///     capture
    /// });
    /// ```
    pub fn with_capture<F>(mut self, f: F) -> Self
    where
        F: FnOnce(CaptureConfig) -> CaptureConfig,
    {
        self.config.capture = f(self.config.capture);
        self.capture_customized = true;
        self
    }

    /// Set the reconnection window in seconds
    ///
    /// How long a session may sit in `Reconnecting` before the client gives
    /// up on transparent resumption and performs a cold rejoin.
    pub fn reconnect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.reconnect_timeout_secs = secs;
        self
    }

    /// Set the automatic transport join retry budget
    ///
    /// Each retry requests a fresh credential first.
    pub fn transport_join_retries(mut self, retries: u32) -> Self {
        self.config.transport_join_retries = retries;
        self
    }

    /// Set the health check scheduling
    pub fn health(mut self, health: HealthConfig) -> Self {
        self.config.health = health;
        self
    }

    /// Set the credential policy for the cold rejoin
    pub fn rejoin_credential_policy(mut self, policy: RejoinCredentialPolicy) -> Self {
        self.config.rejoin_credential_policy = policy;
        self
    }

    /// Supply platform signals for device profiling
    ///
    /// The profiler classifies the host at build time; a constrained
    /// classification (low memory, few cores, slow network, mobile
    /// viewport) starts the session on the reduced capture preset. Hints
    /// that cannot be read may simply be left unset.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use medilink_client_core::ClientBuilder;
    /// use medilink_client_core::client::device::{NetworkEffectiveType, PlatformHints};
    ///
    /// let builder = ClientBuilder::new().platform_hints(
    ///     PlatformHints::new()
    ///         .with_memory_gib(8.0)
    ///         .with_network(NetworkEffectiveType::Cellular4g)
    ///         .with_viewport_width(1280),
    /// );
    /// ```
    pub fn platform_hints(mut self, hints: PlatformHints) -> Self {
        self.hints = hints;
        self
    }

    /// Set the signaling backend used for join authorization
    pub fn signaling(mut self, signaling: Arc<dyn SignalingApi>) -> Self {
        self.signaling = Some(signaling);
        self
    }

    /// Set the media transport implementation
    pub fn transport(mut self, transport: Arc<dyn MediaTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the capture device backend
    pub fn capture_backend(mut self, backend: Arc<dyn CaptureBackend>) -> Self {
        self.capture_backend = Some(backend);
        self
    }

    /// Register a rendering sink under a slot
    ///
    /// Sinks are held weakly; the application keeps ownership and may drop
    /// a sink at any time, at which point its tracks simply report as
    /// unbound. Sinks can also be registered after build through
    /// [`ClientManager::register_sink`], which is the normal path for
    /// surfaces that mount once the call screen renders.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use medilink_client_core::ClientBuilder;
    /// use medilink_client_core::client::types::TrackKind;
    /// use medilink_client_core::transport::{MediaHandle, MediaSink, SinkSlot};
    ///
    /// struct VideoSurface;
    ///
    /// impl MediaSink for VideoSurface {
    ///     fn attach(&self, _media: &MediaHandle) {}
    ///     fn detach(&self) {}
    /// }
    ///
    /// let surface: Arc<dyn MediaSink> = Arc::new(VideoSurface);
    /// let builder = ClientBuilder::new()
    ///     .sink(SinkSlot::RemoteDefault(TrackKind::Video), &surface);
    /// # drop(builder); drop(surface);
    /// ```
    pub fn sink(self, slot: SinkSlot, sink: &Arc<dyn MediaSink>) -> Self {
        self.sinks.register(slot, sink);
        self
    }

    /// Register a callback invoked after the local user leaves
    ///
    /// Runs on the patient side only, after teardown completes, so the
    /// application can move to its post-consultation flow. The
    /// practitioner side never triggers it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use medilink_client_core::ClientBuilder;
    ///
    /// let builder = ClientBuilder::new()
    ///     .on_session_completed(|session_id| {
    ///         println!("consultation {} over", session_id);
    ///     });
    /// ```
    pub fn on_session_completed<F>(mut self, callback: F) -> Self
    where
        F: Fn(SessionId) + Send + Sync + 'static,
    {
        self.completion_notifier = Some(Arc::new(callback));
        self
    }

    /// Build the session client
    ///
    /// Validates that all three collaborators were supplied, runs device
    /// profiling to settle the initial capture preset, and assembles the
    /// manager. Must be called inside a tokio runtime; the manager spawns
    /// its event dispatch task here.
    ///
    /// # Errors
    ///
    /// * `ClientError::InvalidConfiguration` - a collaborator is missing
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use medilink_client_core::{ClientBuilder, JoinRequest, ParticipantRole};
    /// use medilink_client_core::client::capture::CaptureBackend;
    /// use medilink_client_core::signaling::SignalingApi;
    /// use medilink_client_core::transport::MediaTransport;
    ///
    /// async fn start(
    ///     signaling: Arc<dyn SignalingApi>,
    ///     transport: Arc<dyn MediaTransport>,
    ///     devices: Arc<dyn CaptureBackend>,
    /// ) -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = ClientBuilder::new()
    ///         .signaling(signaling)
    ///         .transport(transport)
    ///         .capture_backend(devices)
    ///         .reconnect_timeout_secs(30)
    ///         .build()
    ///         .await?;
    ///
    ///     let session_id = client
    ///         .join(JoinRequest::new("apt-1001", ParticipantRole::Patient))
    ///         .await?;
    ///     println!("joined {}", session_id);
    ///     Ok(())
    /// }
    /// ```
    ///
    /// A builder without collaborators fails validation:
    ///
    /// ```
    /// use medilink_client_core::ClientBuilder;
    ///
    /// # tokio_test::block_on(async {
    /// assert!(ClientBuilder::new().build().await.is_err());
    /// # })
    /// ```
    pub async fn build(self) -> ClientResult<Arc<ClientManager>> {
        let signaling = self.signaling.ok_or_else(|| missing("signaling"))?;
        let transport = self.transport.ok_or_else(|| missing("transport"))?;
        let capture_backend = self.capture_backend.ok_or_else(|| missing("capture_backend"))?;

        let mut config = self.config;
        let profile = DeviceProfiler::profile(&self.hints);
        let initial_preset = self
            .preset_override
            .unwrap_or_else(|| profile.capture_preset());
        if !self.capture_customized {
            config.capture = CaptureConfig::from_preset(initial_preset);
        }

        info!(
            constrained = profile.constrained,
            preset = ?initial_preset,
            reconnect_timeout_secs = config.reconnect_timeout_secs,
            "Assembling session client"
        );
        Ok(ClientManager::new(
            config,
            initial_preset,
            signaling,
            transport,
            capture_backend,
            self.sinks,
            self.completion_notifier,
        ))
    }
}

fn missing(field: &str) -> ClientError {
    ClientError::InvalidConfiguration {
        field: field.to_string(),
        reason: "required collaborator was not supplied".to_string(),
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
