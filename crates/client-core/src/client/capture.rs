//! Local capture management
//!
//! This module owns the local audio and video tracks for the duration of a
//! session: acquisition under a constraint preset, mute state, runtime
//! constraint changes, and guaranteed release on teardown. Actual device
//! access lives behind the [`CaptureBackend`] trait so hardware stays at the
//! crate boundary and tests can substitute a scripted backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::client::config::{CaptureConfig, CaptureConstraints};
use crate::client::types::{LocalTrackInfo, PublicationState, TrackKind};
use crate::error::{ClientError, ClientResult};
use crate::transport::MediaHandle;

/// Device-side capture operations
///
/// Implemented by the embedding application (or a platform layer) to open and
/// close physical capture devices. All errors surface as the capture family of
/// [`ClientError`] variants.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Open a capture track of the given kind under the given constraints
    async fn open_track(
        &self,
        kind: TrackKind,
        constraints: &CaptureConstraints,
    ) -> ClientResult<MediaHandle>;

    /// Apply new constraints to an already-open track
    async fn apply_constraints(
        &self,
        handle: &MediaHandle,
        constraints: &CaptureConstraints,
    ) -> ClientResult<()>;

    /// Stop and discard a capture track
    async fn close_track(&self, handle: &MediaHandle) -> ClientResult<()>;
}

/// One captured local media stream unit
#[derive(Debug, Clone)]
pub struct LocalTrack {
    /// Media kind of this track
    pub kind: TrackKind,
    /// Whether the track is live (false = muted)
    pub enabled: bool,
    /// Publication state within the current transport session
    pub publication_state: PublicationState,
    /// Constraints the track was opened (or last re-constrained) with
    pub constraints: CaptureConstraints,
    /// Backend handle for the underlying device track
    pub handle: MediaHandle,
}

impl LocalTrack {
    fn info(&self) -> LocalTrackInfo {
        LocalTrackInfo {
            kind: self.kind,
            enabled: self.enabled,
            publication_state: self.publication_state,
            constraints: self.constraints.clone(),
        }
    }
}

/// Manager for local capture tracks
///
/// One instance lives inside the client manager and is reused across
/// sessions; [`CaptureManager::acquire_local_tracks`] starts a fresh
/// capture generation and [`CaptureManager::release`] ends it.
pub struct CaptureManager {
    backend: Arc<dyn CaptureBackend>,
    /// Active local tracks by kind
    tracks: DashMap<TrackKind, LocalTrack>,
    /// Set once release() has run for the current generation
    released: AtomicBool,
}

impl CaptureManager {
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            tracks: DashMap::new(),
            released: AtomicBool::new(true),
        }
    }

    /// Acquire camera and microphone tracks under the given configuration
    ///
    /// Each kind is attempted independently; a per-kind failure is logged and
    /// the session proceeds degraded with the kinds that did open. Returns the
    /// kinds actually acquired, or [`ClientError::NoUsableMedia`] when neither
    /// device could be opened.
    pub async fn acquire_local_tracks(
        &self,
        config: &CaptureConfig,
    ) -> ClientResult<Vec<TrackKind>> {
        self.tracks.clear();
        self.released.store(false, Ordering::SeqCst);

        let mut acquired = Vec::new();
        for kind in [TrackKind::Audio, TrackKind::Video] {
            let constraints = config.constraints_for(kind);
            match self.backend.open_track(kind, &constraints).await {
                Ok(handle) => {
                    debug!(kind = %kind, handle = %handle, "Capture track opened");
                    self.tracks.insert(
                        kind,
                        LocalTrack {
                            kind,
                            enabled: true,
                            publication_state: PublicationState::Unpublished,
                            constraints,
                            handle,
                        },
                    );
                    acquired.push(kind);
                }
                Err(e) => {
                    warn!(
                        kind = %kind,
                        error = %e,
                        category = e.category(),
                        "Capture acquisition failed, continuing without this kind"
                    );
                }
            }
        }

        if acquired.is_empty() {
            self.released.store(true, Ordering::SeqCst);
            return Err(ClientError::NoUsableMedia);
        }

        info!(kinds = ?acquired, "Local capture acquired");
        Ok(acquired)
    }

    /// Toggle mute state on the matching local track
    ///
    /// Idempotent: returns `Ok(None)` when the track is already in the
    /// requested state, otherwise `Ok(Some(handle))` so the caller can relay
    /// the change to the transport without renegotiation.
    pub fn set_muted(&self, kind: TrackKind, muted: bool) -> ClientResult<Option<MediaHandle>> {
        let mut track = self
            .tracks
            .get_mut(&kind)
            .ok_or(ClientError::LocalTrackNotFound { kind })?;

        let enabled = !muted;
        if track.enabled == enabled {
            return Ok(None);
        }
        track.enabled = enabled;
        debug!(kind = %kind, muted = muted, "Local track mute state changed");
        Ok(Some(track.handle.clone()))
    }

    /// Apply new constraints to an open track, best effort
    ///
    /// On backend success the stored constraints are updated; on failure the
    /// previous constraints stay recorded and the error is returned for the
    /// caller to log and ignore (constraint application is advisory).
    pub async fn apply_constraints(
        &self,
        kind: TrackKind,
        constraints: CaptureConstraints,
    ) -> ClientResult<()> {
        let handle = {
            let track = self
                .tracks
                .get(&kind)
                .ok_or(ClientError::LocalTrackNotFound { kind })?;
            track.handle.clone()
        };

        match self.backend.apply_constraints(&handle, &constraints).await {
            Ok(()) => {
                if let Some(mut track) = self.tracks.get_mut(&kind) {
                    track.constraints = constraints;
                }
                debug!(kind = %kind, "Capture constraints applied");
                Ok(())
            }
            Err(e) => {
                warn!(kind = %kind, error = %e, "Constraint application rejected");
                Err(e)
            }
        }
    }

    /// Record the publication state reported by the transport for a kind
    pub fn set_publication_state(&self, kind: TrackKind, state: PublicationState) {
        if let Some(mut track) = self.tracks.get_mut(&kind) {
            track.publication_state = state;
        }
    }

    /// Stop and discard all local tracks
    ///
    /// Guarded so repeated calls are no-ops; backend close failures are logged
    /// and do not interrupt the remaining closes. Called on every session exit
    /// path, including abnormal teardown. Returns true when this call actually
    /// released a live capture.
    pub async fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }

        let handles: Vec<(TrackKind, MediaHandle)> = self
            .tracks
            .iter()
            .map(|t| (t.kind, t.handle.clone()))
            .collect();
        self.tracks.clear();
        if handles.is_empty() {
            return false;
        }

        for (kind, handle) in handles {
            if let Err(e) = self.backend.close_track(&handle).await {
                warn!(kind = %kind, handle = %handle, error = %e, "Failed to close capture track");
            }
        }
        info!("Local capture released");
        true
    }

    /// Whether release() has run for the current capture generation
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Backend handle for a kind, if that kind was acquired
    pub fn handle(&self, kind: TrackKind) -> Option<MediaHandle> {
        self.tracks.get(&kind).map(|t| t.handle.clone())
    }

    /// Backend handles for all acquired tracks
    pub fn handles(&self) -> Vec<MediaHandle> {
        self.tracks.iter().map(|t| t.handle.clone()).collect()
    }

    /// Snapshot of one local track
    pub fn track_info(&self, kind: TrackKind) -> Option<LocalTrackInfo> {
        self.tracks.get(&kind).map(|t| t.info())
    }

    /// Snapshot of all local tracks
    pub fn local_tracks(&self) -> Vec<LocalTrackInfo> {
        self.tracks.iter().map(|t| t.info()).collect()
    }

    /// Mute state for a kind, if that kind was acquired
    pub fn is_muted(&self, kind: TrackKind) -> Option<bool> {
        self.tracks.get(&kind).map(|t| !t.enabled)
    }

    /// Kinds that failed to acquire in the current generation
    pub fn missing_kinds(&self) -> Vec<TrackKind> {
        [TrackKind::Audio, TrackKind::Video]
            .into_iter()
            .filter(|kind| !self.tracks.contains_key(kind))
            .collect()
    }
}
