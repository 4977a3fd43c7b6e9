//! End-to-end consultation lifecycle over the public API
//!
//! These tests embed the client the way an application shell would: build it
//! with the public builder, register sinks when the call screen mounts,
//! react to events and tear the session down. Collaborators are scripted
//! fakes from `common`, so the full join, roster, quality and teardown paths
//! run without a network or real devices.

mod common;

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use medilink_client_core::client::config::{CapturePreset, HealthConfig};
use medilink_client_core::client::types::{
    ConnectionState, JoinRequest, ParticipantRole, SessionId, SubscriptionState, TrackKind,
};
use medilink_client_core::events::{ClientEvent, MediaEventType, TrackEventType};
use medilink_client_core::transport::{MediaSink, SinkSlot, TransportEvent};

use common::{
    audio_track, build_client_with, drain, settle, state_sequence, video_track, RecordingSink,
};

#[tokio::test]
async fn test_full_consultation_flow() {
    let completions: Arc<StdMutex<Vec<SessionId>>> = Arc::new(StdMutex::new(Vec::new()));
    let completions_in_callback = completions.clone();
    let mut harness = build_client_with(move |builder| {
        builder.on_session_completed(move |session_id| {
            completions_in_callback.lock().unwrap().push(session_id);
        })
    })
    .await;

    // The call screen mounts and provides a surface for remote video.
    let video_surface = RecordingSink::new();
    harness.client.register_sink(
        SinkSlot::RemoteDefault(TrackKind::Video),
        &(video_surface.clone() as Arc<dyn MediaSink>),
    );

    let session_id = harness.join_as_patient().await;
    assert_eq!(
        harness.client.connection_state().await,
        ConnectionState::Connected
    );

    // The join authorized against the appointment under the patient identity
    // and connected with the issued token.
    let token_request = harness.signaling.last_request().expect("token requested");
    assert_eq!(token_request.appointment_id, "apt-9001");
    assert_eq!(token_request.identity, "patient-apt-9001");
    let connects = harness.transport.connect_requests();
    assert_eq!(connects.len(), 1);
    assert_eq!(connects[0].room_name, "consult-apt-9001");
    assert_eq!(connects[0].token, "jwt-1");
    assert_eq!(connects[0].local_tracks.len(), 2, "camera and microphone");

    // The practitioner arrives publishing camera and microphone.
    harness.transport.send(TransportEvent::ParticipantJoined {
        identity: "doctor-apt-9001".to_string(),
        tracks: vec![video_track("doctor-video-1"), audio_track("doctor-audio-1")],
    });
    settle().await;

    let participants = harness.client.participants().await;
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].identity, "doctor-apt-9001");
    assert_eq!(participants[0].tracks.len(), 2);
    assert_eq!(video_surface.attached_ids(), vec!["doctor-video-1"]);

    let stats = harness.client.stats().await;
    assert_eq!(stats.subscribed_tracks, 2);
    assert_eq!(stats.bound_tracks, 1, "only the video surface is registered");
    assert_eq!(stats.bind_failures, 1, "remote audio has nowhere to attach");

    // Patient briefly mutes the microphone during the consultation.
    harness.client.set_microphone_muted(true).await.unwrap();
    assert_eq!(harness.client.is_microphone_muted(), Some(true));
    harness.client.set_microphone_muted(false).await.unwrap();
    assert_eq!(harness.client.is_microphone_muted(), Some(false));

    harness.client.leave().await.unwrap();
    assert_eq!(
        harness.client.connection_state().await,
        ConnectionState::Disconnected
    );
    assert_eq!(harness.devices.closed_ids().len(), 2, "both devices released");
    assert_eq!(harness.transport.disconnect_count(), 1);
    assert!(video_surface.detach_count() >= 1, "surface detached on leave");
    assert_eq!(
        *completions.lock().unwrap(),
        vec![session_id],
        "patient leave reports the consultation as completed"
    );

    let events = drain(&mut harness.events);
    assert_eq!(
        state_sequence(&events),
        vec![
            ConnectionState::RequestingCredential,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Disconnected,
        ]
    );
    let mute_flips: Vec<bool> = events
        .iter()
        .filter_map(|e| match e {
            ClientEvent::MediaEvent { info, .. } => match &info.event_type {
                MediaEventType::MicrophoneStateChanged { muted } => Some(*muted),
                _ => None,
            },
            _ => None,
        })
        .collect();
    assert_eq!(mute_flips, vec![true, false]);
    assert!(
        events.iter().any(|e| matches!(
            e,
            ClientEvent::ParticipantJoined { info, .. } if info.identity == "doctor-apt-9001"
        )),
        "expected a participant joined event for the practitioner"
    );
}

#[tokio::test]
async fn test_sink_registered_mid_session_is_recovered() {
    let mut harness = build_client_with(|builder| {
        builder.health(HealthConfig {
            track_presence_interval_ms: 100,
            recovery_sweep_interval_ms: 600_000,
            transport_check_interval_ms: 600_000,
            transport_restart_grace_ms: 1_000,
            media_watchdog_interval_ms: 600_000,
            media_watchdog_probe_delay_ms: 600_000,
        })
    })
    .await;

    harness.join_as_patient().await;
    harness.transport.send(TransportEvent::ParticipantJoined {
        identity: "doctor-apt-9001".to_string(),
        tracks: vec![video_track("doctor-video-1")],
    });
    settle().await;

    // No surface yet: the track is subscribed but stays unbound.
    let stats = harness.client.stats().await;
    assert_eq!(stats.subscribed_tracks, 1);
    assert_eq!(stats.bound_tracks, 0);

    // The call screen finishes mounting and registers its surface; the
    // periodic presence check picks the track up without a new publication.
    let video_surface = RecordingSink::new();
    harness.client.register_sink(
        SinkSlot::RemoteDefault(TrackKind::Video),
        &(video_surface.clone() as Arc<dyn MediaSink>),
    );
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(video_surface.attached_ids(), vec!["doctor-video-1"]);
    let participants = harness.client.participants().await;
    assert!(participants[0].tracks[0].bound, "snapshot reflects the bind");
    assert_eq!(
        participants[0].tracks[0].subscription_state,
        SubscriptionState::Subscribed
    );
    assert_eq!(harness.client.stats().await.bound_tracks, 1);

    let events = drain(&mut harness.events);
    assert!(
        events.iter().any(|e| matches!(
            e,
            ClientEvent::TrackEvent { info, .. }
                if info.event_type == TrackEventType::Bound && info.track_id == "doctor-video-1"
        )),
        "expected a bound event once the late surface was attached"
    );

    harness.client.leave().await.unwrap();
}

#[tokio::test]
async fn test_viewport_breakpoint_drives_capture_constraints() {
    let harness = build_client_with(|builder| builder).await;
    harness.join_as_patient().await;
    assert_eq!(
        harness.client.capture_preset().await,
        CapturePreset::Standard
    );

    // Window shrinks below the mobile breakpoint.
    harness.client.handle_viewport_resize(600).await;
    assert_eq!(harness.client.capture_preset().await, CapturePreset::Low);
    let applied = harness.devices.constraints_applied_to("local-video");
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].width, Some(640));

    // Same class again: suppressed.
    harness.client.handle_viewport_resize(700).await;
    assert_eq!(
        harness.devices.constraints_applied_to("local-video").len(),
        1
    );

    // Back above the breakpoint restores the standard preset.
    harness.client.handle_viewport_resize(1280).await;
    assert_eq!(
        harness.client.capture_preset().await,
        CapturePreset::Standard
    );
    let applied = harness.devices.constraints_applied_to("local-video");
    assert_eq!(applied.len(), 2);
    assert_eq!(applied[1].width, Some(1280));

    harness.client.leave().await.unwrap();
}

#[tokio::test]
async fn test_practitioner_join_identity_and_completion() {
    let completions: Arc<StdMutex<Vec<SessionId>>> = Arc::new(StdMutex::new(Vec::new()));
    let completions_in_callback = completions.clone();
    let harness = build_client_with(move |builder| {
        builder.on_session_completed(move |session_id| {
            completions_in_callback.lock().unwrap().push(session_id);
        })
    })
    .await;

    harness
        .client
        .join(JoinRequest::new("apt-77", ParticipantRole::Practitioner))
        .await
        .unwrap();

    let token_request = harness.signaling.last_request().expect("token requested");
    assert_eq!(token_request.identity, "doctor-apt-77");

    harness.client.leave().await.unwrap();
    assert!(
        completions.lock().unwrap().is_empty(),
        "only the patient side reports completion to the backend"
    );
}
