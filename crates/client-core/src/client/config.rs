//! Client configuration structures and presets
//!
//! This module provides the configuration surface for the session client:
//! capture constraint envelopes, health-check scheduling, reconnection
//! policy, and sink binding limits. It offers both fine-grained control and
//! presets for common device classes.
//!
//! # Key Components
//!
//! - **ClientConfig** - Main client configuration with recovery and binding policy
//! - **CaptureConfig** - Camera/microphone constraint envelopes
//! - **CapturePreset** - Predefined capture templates (standard vs constrained devices)
//! - **HealthConfig** - Intervals for the periodic recovery checks
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │     ClientConfig         │
//! │ ┌──────────────────────┐ │
//! │ │   CaptureConfig     ─┼─┼─ • Video resolution / frame rate
//! │ │   HealthConfig      ─┼─┼─ • Check intervals & watchdog delays
//! │ │   Recovery policy    │ │  • Reconnect timeout, rejoin credential
//! │ └──────────────────────┘ │  • Bind attempt budget
//! └──────────────────────────┘
//! ```
//!
//! # Usage Examples
//!
//! ```rust
//! use medilink_client_core::client::config::{ClientConfig, CapturePreset};
//!
//! let config = ClientConfig::new()
//!     .with_capture_preset(CapturePreset::Low)
//!     .with_reconnect_timeout_secs(20);
//!
//! assert_eq!(config.capture.video.width, 640);
//! assert_eq!(config.reconnect_timeout_secs, 20);
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::client::types::TrackKind;

/// Video capture constraint envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoConstraints {
    /// Requested frame width in pixels
    pub width: u32,
    /// Requested frame height in pixels
    pub height: u32,
    /// Requested frame rate in frames per second
    pub frame_rate: u32,
}

impl VideoConstraints {
    /// Convert to the generic constraint envelope used at the capture boundary
    pub fn to_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            width: Some(self.width),
            height: Some(self.height),
            frame_rate: Some(self.frame_rate),
            ..CaptureConstraints::default()
        }
    }
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30,
        }
    }
}

/// Audio capture processing flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConstraints {
    /// Whether echo cancellation is requested
    pub echo_cancellation: bool,
    /// Whether noise suppression is requested
    pub noise_suppression: bool,
    /// Whether automatic gain control is requested
    pub auto_gain_control: bool,
}

impl AudioConstraints {
    /// Convert to the generic constraint envelope used at the capture boundary
    pub fn to_constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            echo_cancellation: Some(self.echo_cancellation),
            noise_suppression: Some(self.noise_suppression),
            auto_gain_control: Some(self.auto_gain_control),
            ..CaptureConstraints::default()
        }
    }
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Generic constraint envelope applied to a capture track
///
/// Every field is optional; unset fields leave the current device setting
/// untouched. Constraint application is advisory end to end, so a backend is
/// free to honor a subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureConstraints {
    /// Requested frame width in pixels (video only)
    pub width: Option<u32>,
    /// Requested frame height in pixels (video only)
    pub height: Option<u32>,
    /// Requested frame rate (video only)
    pub frame_rate: Option<u32>,
    /// Echo cancellation request (audio only)
    pub echo_cancellation: Option<bool>,
    /// Noise suppression request (audio only)
    pub noise_suppression: Option<bool>,
    /// Automatic gain control request (audio only)
    pub auto_gain_control: Option<bool>,
}

impl CaptureConstraints {
    /// Check if no constraint is set
    pub fn is_empty(&self) -> bool {
        self.width.is_none()
            && self.height.is_none()
            && self.frame_rate.is_none()
            && self.echo_cancellation.is_none()
            && self.noise_suppression.is_none()
            && self.auto_gain_control.is_none()
    }
}

/// Predefined capture configuration presets
///
/// `Standard` suits desktop-class devices on decent networks; `Low` is picked
/// for constrained devices (or forced at runtime when network quality drops).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapturePreset {
    /// 720p/30 video with full audio processing
    Standard,
    /// 360p/15 video for constrained devices or poor networks
    Low,
}

/// Capture configuration for both local tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Video constraint envelope
    pub video: VideoConstraints,
    /// Audio processing flags
    pub audio: AudioConstraints,
}

impl CaptureConfig {
    /// Build a capture configuration from a preset
    ///
    /// ```rust
    /// use medilink_client_core::client::config::{CaptureConfig, CapturePreset};
    ///
    /// let low = CaptureConfig::from_preset(CapturePreset::Low);
    /// assert_eq!((low.video.width, low.video.height, low.video.frame_rate), (640, 360, 15));
    /// ```
    pub fn from_preset(preset: CapturePreset) -> Self {
        match preset {
            CapturePreset::Standard => Self::default(),
            CapturePreset::Low => Self {
                video: VideoConstraints {
                    width: 640,
                    height: 360,
                    frame_rate: 15,
                },
                audio: AudioConstraints::default(),
            },
        }
    }

    /// Constraint envelope for one kind under this configuration
    pub fn constraints_for(&self, kind: TrackKind) -> CaptureConstraints {
        match kind {
            TrackKind::Video => self.video.to_constraints(),
            TrackKind::Audio => self.audio.to_constraints(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            video: VideoConstraints::default(),
            audio: AudioConstraints::default(),
        }
    }
}

/// Credential handling when the connector performs the cold rejoin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejoinCredentialPolicy {
    /// Request a fresh credential before rejoining (the original may have
    /// aged out during the reconnection stall)
    Refresh,
    /// Reuse the credential from the original join
    Reuse,
}

impl Default for RejoinCredentialPolicy {
    fn default() -> Self {
        RejoinCredentialPolicy::Refresh
    }
}

/// Scheduling for the periodic health checks
///
/// Defaults match the production cadence; tests shrink these to keep timer
/// scenarios fast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Track presence check interval in milliseconds
    pub track_presence_interval_ms: u64,
    /// Aggressive re-bind sweep interval in milliseconds
    pub recovery_sweep_interval_ms: u64,
    /// Transport connectivity check interval in milliseconds
    pub transport_check_interval_ms: u64,
    /// Grace period after an in-place transport restart in milliseconds
    pub transport_restart_grace_ms: u64,
    /// No-remote-media watchdog interval in milliseconds
    pub media_watchdog_interval_ms: u64,
    /// One-shot watchdog probe delay after the first participant join
    pub media_watchdog_probe_delay_ms: u64,
}

impl HealthConfig {
    /// Track presence check interval
    pub fn track_presence_interval(&self) -> Duration {
        Duration::from_millis(self.track_presence_interval_ms)
    }

    /// Aggressive re-bind sweep interval
    pub fn recovery_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_sweep_interval_ms)
    }

    /// Transport connectivity check interval
    pub fn transport_check_interval(&self) -> Duration {
        Duration::from_millis(self.transport_check_interval_ms)
    }

    /// Grace period granted to an in-place transport restart
    pub fn transport_restart_grace(&self) -> Duration {
        Duration::from_millis(self.transport_restart_grace_ms)
    }

    /// No-remote-media watchdog interval
    pub fn media_watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.media_watchdog_interval_ms)
    }

    /// Delay before the one-shot no-remote-media probe
    pub fn media_watchdog_probe_delay(&self) -> Duration {
        Duration::from_millis(self.media_watchdog_probe_delay_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            track_presence_interval_ms: 3_000,
            recovery_sweep_interval_ms: 5_000,
            transport_check_interval_ms: 10_000,
            transport_restart_grace_ms: 2_000,
            media_watchdog_interval_ms: 15_000,
            media_watchdog_probe_delay_ms: 30_000,
        }
    }
}

/// Main client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Capture constraint envelopes for local tracks
    pub capture: CaptureConfig,
    /// Health check scheduling
    pub health: HealthConfig,
    /// Seconds allowed in `Reconnecting` before the cold rejoin fires
    pub reconnect_timeout_secs: u64,
    /// Automatic transport join retries (each with a fresh credential)
    pub transport_join_retries: u32,
    /// Credential handling for the cold rejoin
    pub rejoin_credential_policy: RejoinCredentialPolicy,
    /// Maximum sink attach attempts per bind
    pub bind_max_attempts: u32,
    /// Delay between sink attach attempts in milliseconds
    pub bind_retry_delay_ms: u64,
}

impl ClientConfig {
    /// Create a configuration with production defaults
    pub fn new() -> Self {
        Self {
            capture: CaptureConfig::default(),
            health: HealthConfig::default(),
            reconnect_timeout_secs: 30,
            transport_join_retries: 1,
            rejoin_credential_policy: RejoinCredentialPolicy::default(),
            bind_max_attempts: 10,
            bind_retry_delay_ms: 500,
        }
    }

    /// Set the capture configuration
    pub fn with_capture(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    /// Set the capture configuration from a preset
    pub fn with_capture_preset(mut self, preset: CapturePreset) -> Self {
        self.capture = CaptureConfig::from_preset(preset);
        self
    }

    /// Set the reconnection timeout in seconds
    pub fn with_reconnect_timeout_secs(mut self, secs: u64) -> Self {
        self.reconnect_timeout_secs = secs;
        self
    }

    /// Set the health check scheduling
    pub fn with_health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }

    /// Set the cold rejoin credential policy
    pub fn with_rejoin_credential_policy(mut self, policy: RejoinCredentialPolicy) -> Self {
        self.rejoin_credential_policy = policy;
        self
    }

    /// Reconnection timeout as a duration
    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.reconnect_timeout_secs)
    }

    /// Delay between sink attach attempts as a duration
    pub fn bind_retry_delay(&self) -> Duration {
        Duration::from_millis(self.bind_retry_delay_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.reconnect_timeout_secs, 30);
        assert_eq!(config.transport_join_retries, 1);
        assert_eq!(config.bind_max_attempts, 10);
        assert_eq!(config.bind_retry_delay_ms, 500);
        assert_eq!(config.rejoin_credential_policy, RejoinCredentialPolicy::Refresh);
        assert_eq!(config.capture.video.width, 1280);
    }

    #[test]
    fn test_low_preset() {
        let capture = CaptureConfig::from_preset(CapturePreset::Low);
        assert_eq!(capture.video.width, 640);
        assert_eq!(capture.video.height, 360);
        assert_eq!(capture.video.frame_rate, 15);
        // Audio processing stays on regardless of preset.
        assert!(capture.audio.echo_cancellation);
    }

    #[test]
    fn test_constraints_for_kind() {
        let capture = CaptureConfig::default();
        let video = capture.constraints_for(TrackKind::Video);
        assert_eq!(video.width, Some(1280));
        assert!(video.echo_cancellation.is_none());

        let audio = capture.constraints_for(TrackKind::Audio);
        assert!(audio.width.is_none());
        assert_eq!(audio.echo_cancellation, Some(true));
    }

    #[test]
    fn test_health_defaults() {
        let health = HealthConfig::default();
        assert_eq!(health.track_presence_interval(), Duration::from_secs(3));
        assert_eq!(health.recovery_sweep_interval(), Duration::from_secs(5));
        assert_eq!(health.transport_check_interval(), Duration::from_secs(10));
        assert_eq!(health.media_watchdog_interval(), Duration::from_secs(15));
        assert_eq!(health.media_watchdog_probe_delay(), Duration::from_secs(30));
    }
}
