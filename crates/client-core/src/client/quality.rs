//! Adaptive quality control
//!
//! Reacts to pushed network-quality samples and viewport class changes by
//! asking the capture manager for different video constraints. Everything
//! here is advisory: a rejected constraint change is logged and counted,
//! never propagated, and an identical request is suppressed rather than
//! re-sent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::capture::CaptureManager;
use crate::client::config::{CaptureConfig, CapturePreset};
use crate::client::device::ViewportClass;
use crate::client::types::TrackKind;
use crate::transport::NetworkQualitySample;

/// Runtime quality policy
///
/// Downgrades capture when the local link degrades and tracks the
/// mobile/desktop viewport threshold. Upgrades happen only through viewport
/// changes; a recovering network does not by itself restore the standard
/// preset, matching the conservative behavior expected mid-consultation.
pub struct QualityController {
    capture: Arc<CaptureManager>,
    /// Preset last applied successfully (or configured at session start)
    applied: Mutex<CapturePreset>,
    last_viewport: Mutex<Option<ViewportClass>>,
    rejections: AtomicU64,
}

impl QualityController {
    pub fn new(capture: Arc<CaptureManager>, initial_preset: CapturePreset) -> Self {
        Self {
            capture,
            applied: Mutex::new(initial_preset),
            last_viewport: Mutex::new(None),
            rejections: AtomicU64::new(0),
        }
    }

    /// Handle a quality sample for the local participant
    ///
    /// A poor sample (level <= 1) switches video capture to the low preset.
    /// Better samples are recorded at debug and otherwise ignored.
    pub async fn on_local_quality_sample(&self, sample: &NetworkQualitySample) {
        if !sample.is_poor() {
            debug!(level = sample.level, "Network quality sample healthy");
            return;
        }
        info!(level = sample.level, "Poor local network quality, reducing capture");
        self.apply_preset(CapturePreset::Low).await;
    }

    /// Handle a viewport class change
    ///
    /// Only transitions across the mobile/desktop threshold trigger a preset
    /// change; repeated reports of the same class are ignored.
    pub async fn on_viewport_change(&self, viewport: ViewportClass) {
        {
            let mut last = self.last_viewport.lock().await;
            if *last == Some(viewport) {
                return;
            }
            *last = Some(viewport);
        }

        let preset = if viewport.is_mobile() {
            CapturePreset::Low
        } else {
            CapturePreset::Standard
        };
        info!(viewport = ?viewport, preset = ?preset, "Viewport class changed");
        self.apply_preset(preset).await;
    }

    /// Preset currently in effect
    pub async fn current_preset(&self) -> CapturePreset {
        *self.applied.lock().await
    }

    /// Number of constraint changes the backend rejected
    pub fn rejection_count(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    async fn apply_preset(&self, preset: CapturePreset) {
        {
            let applied = self.applied.lock().await;
            if *applied == preset {
                debug!(preset = ?preset, "Capture preset already in effect");
                return;
            }
        }

        if self.capture.track_info(TrackKind::Video).is_none() {
            debug!("No local video track, skipping constraint change");
            return;
        }

        let constraints = CaptureConfig::from_preset(preset).constraints_for(TrackKind::Video);
        match self.capture.apply_constraints(TrackKind::Video, constraints).await {
            Ok(()) => {
                *self.applied.lock().await = preset;
                info!(preset = ?preset, "Capture preset applied");
            }
            Err(e) => {
                // Advisory only. The previous preset stays recorded so the
                // next trigger retries instead of being suppressed.
                self.rejections.fetch_add(1, Ordering::Relaxed);
                warn!(preset = ?preset, error = %e, "Constraint change rejected, continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::capture::CaptureBackend;
    use crate::client::config::CaptureConstraints;
    use crate::error::{ClientError, ClientResult};
    use crate::transport::MediaHandle;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32};

    struct CountingBackend {
        applies: AtomicU32,
        fail_apply: AtomicBool,
        last_width: AtomicU32,
    }

    impl CountingBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                applies: AtomicU32::new(0),
                fail_apply: AtomicBool::new(false),
                last_width: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl CaptureBackend for CountingBackend {
        async fn open_track(
            &self,
            kind: TrackKind,
            _constraints: &CaptureConstraints,
        ) -> ClientResult<MediaHandle> {
            Ok(MediaHandle::new(format!("local-{}", kind), kind))
        }

        async fn apply_constraints(
            &self,
            _handle: &MediaHandle,
            constraints: &CaptureConstraints,
        ) -> ClientResult<()> {
            if self.fail_apply.load(Ordering::SeqCst) {
                return Err(ClientError::constraint_apply(TrackKind::Video, "device busy"));
            }
            self.applies.fetch_add(1, Ordering::SeqCst);
            if let Some(width) = constraints.width {
                self.last_width.store(width, Ordering::SeqCst);
            }
            Ok(())
        }

        async fn close_track(&self, _handle: &MediaHandle) -> ClientResult<()> {
            Ok(())
        }
    }

    async fn controller_with_video(
        backend: Arc<CountingBackend>,
    ) -> (QualityController, Arc<CaptureManager>) {
        let capture = Arc::new(CaptureManager::new(backend));
        capture
            .acquire_local_tracks(&CaptureConfig::default())
            .await
            .unwrap();
        (
            QualityController::new(capture.clone(), CapturePreset::Standard),
            capture,
        )
    }

    fn poor_sample() -> NetworkQualitySample {
        NetworkQualitySample::now("patient-apt-1", 1)
    }

    #[tokio::test]
    async fn test_poor_sample_applies_low_once() {
        let backend = CountingBackend::new();
        let (controller, _capture) = controller_with_video(backend.clone()).await;

        controller.on_local_quality_sample(&poor_sample()).await;
        controller.on_local_quality_sample(&poor_sample()).await;

        assert_eq!(backend.applies.load(Ordering::SeqCst), 1);
        assert_eq!(backend.last_width.load(Ordering::SeqCst), 640);
        assert_eq!(controller.current_preset().await, CapturePreset::Low);
    }

    #[tokio::test]
    async fn test_healthy_sample_is_ignored() {
        let backend = CountingBackend::new();
        let (controller, _capture) = controller_with_video(backend.clone()).await;

        controller
            .on_local_quality_sample(&NetworkQualitySample::now("patient-apt-1", 4))
            .await;

        assert_eq!(backend.applies.load(Ordering::SeqCst), 0);
        assert_eq!(controller.current_preset().await, CapturePreset::Standard);
    }

    #[tokio::test]
    async fn test_viewport_transitions() {
        let backend = CountingBackend::new();
        let (controller, _capture) = controller_with_video(backend.clone()).await;

        controller.on_viewport_change(ViewportClass::Mobile).await;
        controller.on_viewport_change(ViewportClass::Mobile).await;
        assert_eq!(backend.applies.load(Ordering::SeqCst), 1);
        assert_eq!(controller.current_preset().await, CapturePreset::Low);

        controller.on_viewport_change(ViewportClass::Desktop).await;
        assert_eq!(backend.applies.load(Ordering::SeqCst), 2);
        assert_eq!(backend.last_width.load(Ordering::SeqCst), 1280);
        assert_eq!(controller.current_preset().await, CapturePreset::Standard);
    }

    #[tokio::test]
    async fn test_rejection_swallowed_and_retried() {
        let backend = CountingBackend::new();
        let (controller, _capture) = controller_with_video(backend.clone()).await;
        backend.fail_apply.store(true, Ordering::SeqCst);

        controller.on_local_quality_sample(&poor_sample()).await;
        assert_eq!(controller.rejection_count(), 1);
        assert_eq!(controller.current_preset().await, CapturePreset::Standard);

        // Backend recovers; the next poor sample is not suppressed.
        backend.fail_apply.store(false, Ordering::SeqCst);
        controller.on_local_quality_sample(&poor_sample()).await;
        assert_eq!(backend.applies.load(Ordering::SeqCst), 1);
        assert_eq!(controller.current_preset().await, CapturePreset::Low);
    }

    #[tokio::test]
    async fn test_no_video_track_is_noop() {
        let backend = CountingBackend::new();
        let capture = Arc::new(CaptureManager::new(backend.clone()));
        let controller = QualityController::new(capture, CapturePreset::Standard);

        controller.on_local_quality_sample(&poor_sample()).await;
        assert_eq!(backend.applies.load(Ordering::SeqCst), 0);
        assert_eq!(controller.rejection_count(), 0);
    }
}
