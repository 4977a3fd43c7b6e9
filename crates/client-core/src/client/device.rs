//! Device capability profiling
//!
//! Classifies the host into a coarse constrained/unconstrained bucket once at
//! startup, so the initial capture preset can be chosen before any media is
//! acquired. Logical core count is read from the OS; memory, network class,
//! and viewport arrive as host-supplied hints because a library crate cannot
//! probe those portably. Any signal that is unavailable counts as "unknown"
//! and never pushes the profile toward constrained.

use crate::client::config::CapturePreset;
use tracing::debug;

/// Coarse network classification, mirroring the effective-type buckets
/// reported by connection-aware hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkEffectiveType {
    /// Very slow cellular link
    Slow2g,
    /// 2G-class cellular link
    Cellular2g,
    /// 3G-class cellular link
    Cellular3g,
    /// 4G-class or better link
    Cellular4g,
    /// No signal available
    #[default]
    Unknown,
}

impl NetworkEffectiveType {
    /// Whether this class is slow enough to warrant reduced capture quality
    pub fn is_slow(&self) -> bool {
        matches!(self, Self::Slow2g | Self::Cellular2g | Self::Cellular3g)
    }
}

/// Viewport classification used for preset selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewportClass {
    Mobile,
    #[default]
    Desktop,
}

impl ViewportClass {
    /// Breakpoint below which a viewport is treated as mobile, in pixels
    pub const MOBILE_BREAKPOINT_PX: u32 = 768;

    /// Classify a viewport by its width in pixels
    pub fn from_width(width_px: u32) -> Self {
        if width_px < Self::MOBILE_BREAKPOINT_PX {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }

    pub fn is_mobile(&self) -> bool {
        matches!(self, Self::Mobile)
    }
}

/// Platform signals supplied by the embedding application
///
/// Every field is optional. `None` means the signal could not be read, which
/// the profiler treats as unconstrained rather than failing startup.
#[derive(Debug, Clone, Default)]
pub struct PlatformHints {
    /// Approximate device memory in GiB, if the host exposes it
    pub approx_memory_gib: Option<f64>,
    /// Logical core count override; when absent the profiler reads it from
    /// the OS via `std::thread::available_parallelism`
    pub logical_cores: Option<usize>,
    /// Network effective-type bucket, if the host exposes one
    pub network: Option<NetworkEffectiveType>,
    /// Current viewport width in pixels, if rendering into a sized surface
    pub viewport_width: Option<u32>,
}

impl PlatformHints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory_gib(mut self, gib: f64) -> Self {
        self.approx_memory_gib = Some(gib);
        self
    }

    pub fn with_logical_cores(mut self, cores: usize) -> Self {
        self.logical_cores = Some(cores);
        self
    }

    pub fn with_network(mut self, network: NetworkEffectiveType) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_viewport_width(mut self, width_px: u32) -> Self {
        self.viewport_width = Some(width_px);
        self
    }
}

/// Result of profiling the host device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    /// Whether the device should start on the reduced capture preset
    pub constrained: bool,
    /// Viewport class at profile time
    pub viewport: ViewportClass,
    /// Logical cores actually used for classification, when known
    pub logical_cores: Option<usize>,
    /// Memory figure actually used for classification, when known
    pub memory_gib: Option<f64>,
    /// Network bucket actually used for classification
    pub network: NetworkEffectiveType,
}

impl DeviceProfile {
    /// The capture preset this profile selects
    pub fn capture_preset(&self) -> CapturePreset {
        if self.constrained {
            CapturePreset::Low
        } else {
            CapturePreset::Standard
        }
    }
}

/// One-shot device profiler
///
/// # Examples
///
/// ```rust
/// use medilink_client_core::client::device::{DeviceProfiler, PlatformHints, NetworkEffectiveType};
/// use medilink_client_core::client::config::CapturePreset;
///
/// let hints = PlatformHints::new()
///     .with_logical_cores(8)
///     .with_memory_gib(2.0)
///     .with_network(NetworkEffectiveType::Cellular4g);
///
/// let profile = DeviceProfiler::profile(&hints);
/// assert!(profile.constrained); // low memory wins
/// assert_eq!(profile.capture_preset(), CapturePreset::Low);
/// ```
pub struct DeviceProfiler;

impl DeviceProfiler {
    /// Memory threshold at or below which the device counts as constrained
    const LOW_MEMORY_GIB: f64 = 4.0;
    /// Core-count threshold at or below which the device counts as constrained
    const LOW_CORE_COUNT: usize = 4;

    /// Classify the host from the given hints
    ///
    /// Synchronous and side-effect-free apart from reading the OS core count.
    /// Missing signals are skipped, so a hint set with nothing filled in
    /// classifies as unconstrained.
    pub fn profile(hints: &PlatformHints) -> DeviceProfile {
        let logical_cores = hints.logical_cores.or_else(|| {
            std::thread::available_parallelism().ok().map(|n| n.get())
        });
        let network = hints.network.unwrap_or_default();
        let viewport = hints
            .viewport_width
            .map(ViewportClass::from_width)
            .unwrap_or_default();

        let low_memory = hints
            .approx_memory_gib
            .is_some_and(|gib| gib <= Self::LOW_MEMORY_GIB);
        let low_cores = logical_cores.is_some_and(|n| n <= Self::LOW_CORE_COUNT);

        let constrained = low_memory || low_cores || network.is_slow() || viewport.is_mobile();

        debug!(
            constrained = constrained,
            low_memory = low_memory,
            low_cores = low_cores,
            slow_network = network.is_slow(),
            mobile_viewport = viewport.is_mobile(),
            "Device profile computed"
        );

        DeviceProfile {
            constrained,
            viewport,
            logical_cores,
            memory_gib: hints.approx_memory_gib,
            network,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_signals_assume_unconstrained() {
        // Pin the core count so the test does not depend on the host machine.
        let hints = PlatformHints::new().with_logical_cores(8);
        let profile = DeviceProfiler::profile(&hints);
        assert!(!profile.constrained);
        assert_eq!(profile.capture_preset(), CapturePreset::Standard);
        assert_eq!(profile.network, NetworkEffectiveType::Unknown);
        assert_eq!(profile.viewport, ViewportClass::Desktop);
    }

    #[test]
    fn test_each_signal_can_constrain() {
        let base = PlatformHints::new().with_logical_cores(8);

        let p = DeviceProfiler::profile(&base.clone().with_memory_gib(4.0));
        assert!(p.constrained);

        let p = DeviceProfiler::profile(&PlatformHints::new().with_logical_cores(2));
        assert!(p.constrained);

        let p = DeviceProfiler::profile(&base.clone().with_network(NetworkEffectiveType::Cellular3g));
        assert!(p.constrained);

        let p = DeviceProfiler::profile(&base.with_viewport_width(390));
        assert!(p.constrained);
    }

    #[test]
    fn test_healthy_desktop_is_unconstrained() {
        let hints = PlatformHints::new()
            .with_logical_cores(12)
            .with_memory_gib(16.0)
            .with_network(NetworkEffectiveType::Cellular4g)
            .with_viewport_width(1920);
        let profile = DeviceProfiler::profile(&hints);
        assert!(!profile.constrained);
    }

    #[test]
    fn test_viewport_breakpoint() {
        assert_eq!(ViewportClass::from_width(767), ViewportClass::Mobile);
        assert_eq!(ViewportClass::from_width(768), ViewportClass::Desktop);
    }
}
