//! Track to sink binding
//!
//! Connects subscribed remote tracks (and local preview tracks) to the
//! rendering surfaces the UI layer registers. Surfaces routinely mount a
//! moment after the track arrives, so binding runs through the shared
//! attach-with-retry combinator instead of failing on the first miss. The
//! binder never owns a sink: it holds weak references and treats a dropped
//! sink as an unbound track.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::client::recovery::{retry_with_backoff, RetryConfig};
use crate::client::types::TrackId;
use crate::error::{ClientError, ClientResult};
use crate::transport::{MediaHandle, MediaSink, SinkSlot};

/// Registry of UI-supplied sinks, addressed by slot
///
/// Sinks are held weakly; a slot whose sink has been dropped resolves to
/// nothing and is pruned on the next lookup.
#[derive(Default)]
pub struct SinkRegistry {
    sinks: DashMap<SinkSlot, Weak<dyn MediaSink>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink under a slot, replacing any previous registration
    pub fn register(&self, slot: SinkSlot, sink: &Arc<dyn MediaSink>) {
        debug!(slot = %slot, "Sink registered");
        self.sinks.insert(slot, Arc::downgrade(sink));
    }

    /// Remove a slot's registration
    pub fn unregister(&self, slot: &SinkSlot) {
        self.sinks.remove(slot);
    }

    /// Resolve a slot to a live sink, pruning dead entries
    pub fn resolve(&self, slot: &SinkSlot) -> Option<Arc<dyn MediaSink>> {
        match self.sinks.get(slot).and_then(|weak| weak.upgrade()) {
            Some(sink) => Some(sink),
            None => {
                self.sinks.remove_if(slot, |_, weak| weak.upgrade().is_none());
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

/// One live track-to-sink binding
struct Binding {
    /// Slot the caller asked for (resolution may have landed on a fallback)
    slot: SinkSlot,
    sink: Weak<dyn MediaSink>,
    handle: MediaHandle,
}

/// Binds tracks to rendering sinks with bounded retry
///
/// A track is bound to at most one sink at a time; binding to a new sink
/// detaches the previous one first. `bind` is idempotent: repeating the same
/// track/sink pair produces exactly one `attach` call.
pub struct RenderBinder {
    sinks: Arc<SinkRegistry>,
    bindings: DashMap<TrackId, Binding>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl RenderBinder {
    pub fn new(sinks: Arc<SinkRegistry>, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            sinks,
            bindings: DashMap::new(),
            max_attempts,
            retry_delay,
        }
    }

    /// Bind a track's media to the sink registered for `slot`
    ///
    /// Resolution falls back from the exact slot to the per-kind remote
    /// default, and retries on a fixed cadence while the surface mounts.
    /// When the attempt budget is exhausted the error is
    /// [`ClientError::BindFailed`]; the track stays unbound and a later
    /// health check may try again.
    pub async fn bind(
        &self,
        track_id: &TrackId,
        handle: &MediaHandle,
        slot: SinkSlot,
    ) -> ClientResult<()> {
        let resolved = retry_with_backoff(
            "sink_attach",
            RetryConfig::fixed(self.max_attempts, self.retry_delay),
            || async {
                self.resolve_ready(&slot)
                    .ok_or_else(|| ClientError::sink_not_ready(slot.to_string()))
            },
        )
        .await
        .map_err(|e| match e {
            ClientError::SinkNotReady { .. } => {
                ClientError::bind_failed(track_id.clone(), self.max_attempts)
            }
            other => other,
        })?;

        if let Some(existing) = self.bindings.get(track_id) {
            if Weak::ptr_eq(&existing.sink, &Arc::downgrade(&resolved)) {
                debug!(track_id = %track_id, slot = %slot, "Track already bound to this sink");
                return Ok(());
            }
            // Bound elsewhere: release the old surface before attaching.
            if let Some(previous) = existing.sink.upgrade() {
                previous.detach();
            }
            drop(existing);
            self.bindings.remove(track_id);
        }

        resolved.attach(handle);
        debug!(track_id = %track_id, slot = %slot, "Track bound to sink");
        self.bindings.insert(
            track_id.clone(),
            Binding {
                slot,
                sink: Arc::downgrade(&resolved),
                handle: handle.clone(),
            },
        );
        Ok(())
    }

    /// Detach a track from its sink and clear the binding
    pub fn unbind(&self, track_id: &TrackId) {
        if let Some((_, binding)) = self.bindings.remove(track_id) {
            if let Some(sink) = binding.sink.upgrade() {
                sink.detach();
            }
            debug!(track_id = %track_id, slot = %binding.slot, "Track unbound");
        }
    }

    /// Detach every binding, synchronously
    pub fn detach_all(&self) {
        let track_ids: Vec<TrackId> = self.bindings.iter().map(|b| b.key().clone()).collect();
        for track_id in &track_ids {
            self.unbind(track_id);
        }
        if !track_ids.is_empty() {
            debug!(count = track_ids.len(), "All sink bindings released");
        }
    }

    /// Whether a track is currently bound to a live sink
    pub fn is_bound(&self, track_id: &TrackId) -> bool {
        self.bindings
            .get(track_id)
            .is_some_and(|b| b.sink.upgrade().is_some())
    }

    /// The slot a track was bound under, if bound
    pub fn bound_slot(&self, track_id: &TrackId) -> Option<SinkSlot> {
        self.bindings.get(track_id).map(|b| b.slot.clone())
    }

    /// The media handle a track was bound with, if bound
    pub fn bound_handle(&self, track_id: &TrackId) -> Option<MediaHandle> {
        self.bindings.get(track_id).map(|b| b.handle.clone())
    }

    /// Number of live bindings
    pub fn bound_count(&self) -> usize {
        self.bindings
            .iter()
            .filter(|b| b.sink.upgrade().is_some())
            .count()
    }

    /// Resolve with layered fallback and readiness check
    fn resolve_ready(&self, slot: &SinkSlot) -> Option<Arc<dyn MediaSink>> {
        let exact = self.sinks.resolve(slot).filter(|s| s.is_ready());
        if exact.is_some() {
            return exact;
        }
        match slot {
            SinkSlot::Remote { kind, .. } => {
                let fallback = SinkSlot::RemoteDefault(*kind);
                let sink = self.sinks.resolve(&fallback).filter(|s| s.is_ready());
                if sink.is_some() {
                    debug!(requested = %slot, fallback = %fallback, "Using default sink slot");
                }
                sink
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for RenderBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderBinder")
            .field("bindings", &self.bindings.len())
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}
