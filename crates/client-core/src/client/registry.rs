//! Remote participant registry
//!
//! Tracks the set of remote participants currently in the session and the
//! subscription state of each of their tracks. All mutation happens through
//! the event handlers below, driven by the transport event loop, so the
//! registry stays consistent with what the transport has actually delivered:
//! after any interleaving of join/leave events the participant set equals
//! exactly the currently-joined identities.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::client::types::{ParticipantSummary, RemoteTrackSnapshot, SubscriptionState, TrackId, TrackKind};
use crate::transport::{MediaHandle, MediaTransport, RemoteTrackInfo};

/// A track published by a remote participant
#[derive(Debug, Clone)]
pub struct RemoteTrack {
    pub track_id: TrackId,
    pub kind: TrackKind,
    pub subscription_state: SubscriptionState,
    /// Whether this track has ever reached Subscribed (feeds the
    /// no-remote-media watchdog)
    pub ever_subscribed: bool,
    /// Transport handle, present once subscribed
    pub handle: Option<MediaHandle>,
}

impl RemoteTrack {
    fn new(info: &RemoteTrackInfo) -> Self {
        Self {
            track_id: info.track_id.clone(),
            kind: info.kind,
            subscription_state: SubscriptionState::Unsubscribed,
            ever_subscribed: false,
            handle: None,
        }
    }

    fn snapshot(&self, bound: bool) -> RemoteTrackSnapshot {
        RemoteTrackSnapshot {
            track_id: self.track_id.clone(),
            kind: self.kind,
            subscription_state: self.subscription_state,
            bound,
        }
    }
}

/// A remote party visible in the session
#[derive(Debug, Clone)]
pub struct RemoteParticipant {
    pub identity: String,
    pub joined_at: DateTime<Utc>,
    joined_instant: Instant,
    tracks: HashMap<TrackId, RemoteTrack>,
}

impl RemoteParticipant {
    fn new(identity: String) -> Self {
        Self {
            identity,
            joined_at: Utc::now(),
            joined_instant: Instant::now(),
            tracks: HashMap::new(),
        }
    }
}

/// A successfully subscribed remote track, ready for sink binding
#[derive(Debug, Clone)]
pub struct SubscribedTrack {
    pub identity: String,
    pub track_id: TrackId,
    pub kind: TrackKind,
    pub handle: MediaHandle,
}

/// Registry of remote participants and their tracks
///
/// Owns every `RemoteParticipant` and `RemoteTrack` object; no track outlives
/// its owning participant. Subscription is delegated to the transport's
/// subscribe primitive; completed subscriptions are returned to the caller so
/// the render binder can be invoked for them.
pub struct ParticipantRegistry {
    transport: Arc<dyn MediaTransport>,
    participants: DashMap<String, RemoteParticipant>,
}

impl ParticipantRegistry {
    pub fn new(transport: Arc<dyn MediaTransport>) -> Self {
        Self {
            transport,
            participants: DashMap::new(),
        }
    }

    /// Handle a participant joining, with the tracks they already publish
    ///
    /// Idempotent for repeated joins of the same identity: already-known
    /// tracks keep their state and new tracks are merged in. Returns the
    /// tracks that newly reached Subscribed.
    pub async fn add_participant(
        &self,
        identity: &str,
        tracks: Vec<RemoteTrackInfo>,
    ) -> Vec<SubscribedTrack> {
        {
            let mut entry = self
                .participants
                .entry(identity.to_string())
                .or_insert_with(|| {
                    info!(identity = %identity, "Remote participant joined");
                    RemoteParticipant::new(identity.to_string())
                });
            for info in &tracks {
                entry
                    .tracks
                    .entry(info.track_id.clone())
                    .or_insert_with(|| RemoteTrack::new(info));
            }
        }

        let mut subscribed = Vec::new();
        for info in tracks {
            if let Some(track) = self.subscribe_one(identity, &info.track_id).await {
                subscribed.push(track);
            }
        }
        subscribed
    }

    /// Handle a participant leaving
    ///
    /// Removes the participant and all its tracks, issuing best-effort
    /// unsubscribes for anything still subscribed. Returns the removed track
    /// ids so the caller can release their sink bindings.
    pub async fn remove_participant(&self, identity: &str) -> Vec<TrackId> {
        let Some((_, participant)) = self.participants.remove(identity) else {
            return Vec::new();
        };
        info!(identity = %identity, tracks = participant.tracks.len(), "Remote participant left");

        let mut removed = Vec::new();
        for (track_id, track) in participant.tracks {
            if track.subscription_state == SubscriptionState::Subscribed {
                if let Err(e) = self.transport.unsubscribe_track(identity, &track_id).await {
                    warn!(identity = %identity, track_id = %track_id, error = %e, "Unsubscribe on departure failed");
                }
            }
            removed.push(track_id);
        }
        removed
    }

    /// Handle a single track published by an already-known participant
    ///
    /// Tracks from unknown participants are ignored: the registry never holds
    /// a track whose owning participant is absent, and the participant's own
    /// join event will re-deliver its track set.
    pub async fn add_track(
        &self,
        identity: &str,
        info: RemoteTrackInfo,
    ) -> Option<SubscribedTrack> {
        let track_id = info.track_id.clone();
        {
            let mut entry = self.participants.get_mut(identity)?;
            entry
                .tracks
                .entry(track_id.clone())
                .or_insert_with(|| RemoteTrack::new(&info));
        }
        debug!(identity = %identity, track_id = %track_id, kind = %info.kind, "Remote track published");
        self.subscribe_one(identity, &track_id).await
    }

    /// Handle a single track unpublished by a participant
    ///
    /// Returns the removed track's id and kind when a track was actually
    /// removed, so the caller can release its sink binding and report it.
    pub async fn remove_track(
        &self,
        identity: &str,
        track_id: &TrackId,
    ) -> Option<(TrackId, TrackKind)> {
        let track = {
            let mut entry = self.participants.get_mut(identity)?;
            entry.tracks.remove(track_id)?
        };
        debug!(identity = %identity, track_id = %track_id, "Remote track unpublished");

        if track.subscription_state == SubscriptionState::Subscribed {
            if let Err(e) = self.transport.unsubscribe_track(identity, track_id).await {
                warn!(identity = %identity, track_id = %track_id, error = %e, "Unsubscribe failed");
            }
        }
        Some((track_id.clone(), track.kind))
    }

    /// Attempt subscription for every track not Subscribed or in flight
    ///
    /// Re-subscribing an already-subscribed track is a no-op and a track
    /// whose subscribe is still in flight is left to finish, so this is safe
    /// to call from overlapping recovery paths. Returns the tracks that newly
    /// reached Subscribed.
    pub async fn ensure_subscriptions(&self) -> Vec<SubscribedTrack> {
        let pending: Vec<(String, TrackId)> = self
            .participants
            .iter()
            .flat_map(|p| {
                p.tracks
                    .values()
                    .filter(|t| {
                        !matches!(
                            t.subscription_state,
                            SubscriptionState::Subscribed | SubscriptionState::Subscribing
                        )
                    })
                    .map(|t| (p.identity.clone(), t.track_id.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut subscribed = Vec::new();
        for (identity, track_id) in pending {
            if let Some(track) = self.subscribe_one(&identity, &track_id).await {
                subscribed.push(track);
            }
        }
        subscribed
    }

    /// Subscribe a single known track, skipping tracks Subscribed or mid-subscribe
    async fn subscribe_one(&self, identity: &str, track_id: &TrackId) -> Option<SubscribedTrack> {
        // Mark Subscribing under the entry lock, then await without holding it.
        let kind = {
            let mut entry = self.participants.get_mut(identity)?;
            let track = entry.tracks.get_mut(track_id)?;
            if matches!(
                track.subscription_state,
                SubscriptionState::Subscribed | SubscriptionState::Subscribing
            ) {
                return None;
            }
            track.subscription_state = SubscriptionState::Subscribing;
            track.kind
        };

        match self.transport.subscribe_track(identity, track_id).await {
            Ok(handle) => {
                let stored = match self.participants.get_mut(identity) {
                    Some(mut entry) => match entry.tracks.get_mut(track_id) {
                        Some(track) => {
                            track.subscription_state = SubscriptionState::Subscribed;
                            track.ever_subscribed = true;
                            track.handle = Some(handle.clone());
                            true
                        }
                        None => false,
                    },
                    None => false,
                };
                if !stored {
                    // The owner vanished while the subscribe was in flight;
                    // the transport-side subscription must not outlive it.
                    warn!(identity = %identity, track_id = %track_id, "Track owner gone after subscribe, rolling back");
                    if let Err(e) = self.transport.unsubscribe_track(identity, track_id).await {
                        warn!(identity = %identity, track_id = %track_id, error = %e, "Orphan unsubscribe failed");
                    }
                    return None;
                }
                debug!(identity = %identity, track_id = %track_id, "Remote track subscribed");
                Some(SubscribedTrack {
                    identity: identity.to_string(),
                    track_id: track_id.clone(),
                    kind,
                    handle,
                })
            }
            Err(e) => {
                warn!(identity = %identity, track_id = %track_id, error = %e, "Subscription failed");
                if let Some(mut entry) = self.participants.get_mut(identity) {
                    if let Some(track) = entry.tracks.get_mut(track_id) {
                        track.subscription_state = SubscriptionState::SubscriptionFailed;
                    }
                }
                None
            }
        }
    }

    /// All currently subscribed tracks, for binding re-validation
    pub fn subscribed_tracks(&self) -> Vec<SubscribedTrack> {
        self.participants
            .iter()
            .flat_map(|p| {
                p.tracks
                    .values()
                    .filter_map(|t| {
                        let handle = t.handle.clone()?;
                        (t.subscription_state == SubscriptionState::Subscribed).then(|| {
                            SubscribedTrack {
                                identity: p.identity.clone(),
                                track_id: t.track_id.clone(),
                                kind: t.kind,
                                handle,
                            }
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Identities present at least `min_presence` whose tracks have never
    /// reached Subscribed
    pub fn media_starved_identities(&self, min_presence: Duration) -> Vec<String> {
        self.participants
            .iter()
            .filter(|p| {
                p.joined_instant.elapsed() >= min_presence
                    && !p.tracks.values().any(|t| t.ever_subscribed)
            })
            .map(|p| p.identity.clone())
            .collect()
    }

    /// Number of participants currently in the session
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.participants.contains_key(identity)
    }

    /// Identities currently in the session
    pub fn identities(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.identity.clone()).collect()
    }

    /// Snapshot of all participants, with binding state supplied by the caller
    pub fn summaries<F>(&self, is_bound: F) -> Vec<ParticipantSummary>
    where
        F: Fn(&TrackId) -> bool,
    {
        self.participants
            .iter()
            .map(|p| ParticipantSummary {
                identity: p.identity.clone(),
                joined_at: p.joined_at,
                tracks: p
                    .tracks
                    .values()
                    .map(|t| t.snapshot(is_bound(&t.track_id)))
                    .collect(),
            })
            .collect()
    }

    /// Discard all participants and tracks without touching the transport
    ///
    /// Used on terminal teardown, where the transport disconnect already ends
    /// every subscription; this only drops the local objects, synchronously.
    pub fn clear(&self) {
        let count = self.participants.len();
        self.participants.clear();
        if count > 0 {
            debug!(participants = count, "Participant registry cleared");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClientError, ClientResult};
    use crate::transport::{
        ConnectivityState, RemoteParticipantInfo, TransportConnectRequest, TransportEvent,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::broadcast;

    /// Transport stub that can be scripted to fail subscriptions per track id
    struct StubTransport {
        fail_subscribe: std::sync::Mutex<Vec<TrackId>>,
        subscribe_hold: std::sync::Mutex<Option<Duration>>,
        subscribes: AtomicU32,
        unsubscribes: AtomicU32,
        events: broadcast::Sender<TransportEvent>,
    }

    impl StubTransport {
        fn new(fail_subscribe: Vec<TrackId>) -> Self {
            let (events, _) = broadcast::channel(16);
            Self {
                fail_subscribe: std::sync::Mutex::new(fail_subscribe),
                subscribe_hold: std::sync::Mutex::new(None),
                subscribes: AtomicU32::new(0),
                unsubscribes: AtomicU32::new(0),
                events,
            }
        }

        fn heal(&self) {
            self.fail_subscribe.lock().unwrap().clear();
        }

        /// Make every subscribe linger, widening the in-flight window
        fn delay_subscribes(&self, delay: Duration) {
            *self.subscribe_hold.lock().unwrap() = Some(delay);
        }
    }

    #[async_trait]
    impl MediaTransport for StubTransport {
        async fn connect(&self, _request: TransportConnectRequest) -> ClientResult<()> {
            Ok(())
        }
        async fn disconnect(&self) -> ClientResult<()> {
            Ok(())
        }
        async fn set_track_enabled(&self, _handle: &MediaHandle, _enabled: bool) -> ClientResult<()> {
            Ok(())
        }
        async fn subscribe_track(&self, _identity: &str, track_id: &str) -> ClientResult<MediaHandle> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            let hold = *self.subscribe_hold.lock().unwrap();
            if let Some(delay) = hold {
                tokio::time::sleep(delay).await;
            }
            if self.fail_subscribe.lock().unwrap().iter().any(|t| t == track_id) {
                return Err(ClientError::transport_failed("subscribe refused"));
            }
            Ok(MediaHandle::new(track_id, TrackKind::Video))
        }
        async fn unsubscribe_track(&self, _identity: &str, _track_id: &str) -> ClientResult<()> {
            self.unsubscribes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn remote_participants(&self) -> ClientResult<Vec<RemoteParticipantInfo>> {
            Ok(Vec::new())
        }
        fn connectivity_state(&self) -> ConnectivityState {
            ConnectivityState::Connected
        }
        async fn restart_connectivity(&self) -> ClientResult<()> {
            Ok(())
        }
        fn subscribe_events(&self) -> broadcast::Receiver<TransportEvent> {
            self.events.subscribe()
        }
    }

    fn video_track(id: &str) -> RemoteTrackInfo {
        RemoteTrackInfo {
            track_id: id.to_string(),
            kind: TrackKind::Video,
        }
    }

    #[tokio::test]
    async fn test_join_subscribes_existing_tracks() {
        let registry = ParticipantRegistry::new(Arc::new(StubTransport::new(vec![])));
        let subscribed = registry
            .add_participant("doctor-apt-1", vec![video_track("TR_v1"), video_track("TR_v2")])
            .await;

        assert_eq!(subscribed.len(), 2);
        assert_eq!(registry.participant_count(), 1);
        assert_eq!(registry.subscribed_tracks().len(), 2);
    }

    #[tokio::test]
    async fn test_leave_removes_participant_and_tracks() {
        let transport = Arc::new(StubTransport::new(vec![]));
        let registry = ParticipantRegistry::new(transport.clone());
        registry
            .add_participant("doctor-apt-1", vec![video_track("TR_v1")])
            .await;

        let removed = registry.remove_participant("doctor-apt-1").await;
        assert_eq!(removed, vec!["TR_v1".to_string()]);
        assert_eq!(registry.participant_count(), 0);
        assert!(registry.subscribed_tracks().is_empty());
        assert_eq!(transport.unsubscribes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_join_is_idempotent() {
        let transport = Arc::new(StubTransport::new(vec![]));
        let registry = ParticipantRegistry::new(transport.clone());

        registry.add_participant("doctor-apt-1", vec![video_track("TR_v1")]).await;
        let again = registry.add_participant("doctor-apt-1", vec![video_track("TR_v1")]).await;

        // Second delivery finds the track already Subscribed and does nothing.
        assert!(again.is_empty());
        assert_eq!(registry.participant_count(), 1);
        assert_eq!(transport.subscribes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_track_from_unknown_participant_ignored() {
        let registry = ParticipantRegistry::new(Arc::new(StubTransport::new(vec![])));
        let result = registry.add_track("stranger", video_track("TR_x")).await;
        assert!(result.is_none());
        assert_eq!(registry.participant_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_subscription_retried_by_ensure() {
        let transport = Arc::new(StubTransport::new(vec!["TR_v1".to_string()]));
        let registry = ParticipantRegistry::new(transport.clone());

        let first = registry.add_participant("doctor-apt-1", vec![video_track("TR_v1")]).await;
        assert!(first.is_empty());
        assert!(registry.subscribed_tracks().is_empty());

        // Watchdog view: the participant is present with no media yet.
        assert_eq!(
            registry.media_starved_identities(Duration::ZERO),
            vec!["doctor-apt-1".to_string()]
        );

        // The transport recovers; the sweep picks the track back up.
        transport.heal();
        let resubscribed = registry.ensure_subscriptions().await;
        assert_eq!(resubscribed.len(), 1);
        assert_eq!(registry.subscribed_tracks().len(), 1);
        assert!(registry.media_starved_identities(Duration::ZERO).is_empty());

        // Subscribed tracks are left alone on the next sweep.
        let again = registry.ensure_subscriptions().await;
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_departure_during_subscription_unsubscribes() {
        let transport = Arc::new(StubTransport::new(vec![]));
        transport.delay_subscribes(Duration::from_millis(100));
        let registry = Arc::new(ParticipantRegistry::new(transport.clone()));

        let joining = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .add_participant("doctor-apt-1", vec![video_track("TR_v1")])
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let removed = registry.remove_participant("doctor-apt-1").await;
        assert_eq!(removed, vec!["TR_v1".to_string()]);

        // The subscribe completed after the departure; its result is dropped
        // and the transport-side subscription is rolled back.
        let subscribed = joining.await.unwrap();
        assert!(subscribed.is_empty());
        assert_eq!(registry.participant_count(), 0);
        assert!(registry.subscribed_tracks().is_empty());
        assert_eq!(transport.unsubscribes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sweep_leaves_inflight_subscription_alone() {
        let transport = Arc::new(StubTransport::new(vec![]));
        transport.delay_subscribes(Duration::from_millis(100));
        let registry = Arc::new(ParticipantRegistry::new(transport.clone()));

        let joining = {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .add_participant("doctor-apt-1", vec![video_track("TR_v1")])
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        // A sweep overlapping the in-flight subscribe must not issue a
        // second one.
        let overlapped = registry.ensure_subscriptions().await;
        assert!(overlapped.is_empty());

        let subscribed = joining.await.unwrap();
        assert_eq!(subscribed.len(), 1);
        assert_eq!(transport.subscribes.load(Ordering::SeqCst), 1);
        assert_eq!(registry.subscribed_tracks().len(), 1);
    }

    #[tokio::test]
    async fn test_media_starved_respects_min_presence() {
        let transport = Arc::new(StubTransport::new(vec!["TR_v1".to_string()]));
        let registry = ParticipantRegistry::new(transport);
        registry.add_participant("doctor-apt-1", vec![video_track("TR_v1")]).await;

        assert!(registry
            .media_starved_identities(Duration::from_secs(3600))
            .is_empty());
        assert_eq!(registry.media_starved_identities(Duration::ZERO).len(), 1);
    }

    #[tokio::test]
    async fn test_clear_discards_everything() {
        let registry = ParticipantRegistry::new(Arc::new(StubTransport::new(vec![])));
        registry.add_participant("doctor-apt-1", vec![video_track("TR_v1")]).await;
        registry.clear();
        assert_eq!(registry.participant_count(), 0);
        assert!(registry.identities().is_empty());
    }
}
