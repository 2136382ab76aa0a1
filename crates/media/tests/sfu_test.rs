//! SFU integration tests over the loopback transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use voicebridge_core::TaskPool;
use voicebridge_media::loopback::{LoopbackFactory, LoopbackRemoteTrack, LoopbackSession};
use voicebridge_media::{
    EncryptionInfo, MediaError, Peer, PeerConfig, Room, RoomConfig, Sfu, SfuConfig, TransportState,
    VideoQuality,
};

fn make_sfu(auto_subscribe: bool) -> (Sfu, Arc<LoopbackFactory>) {
    let factory = LoopbackFactory::new();
    let config = SfuConfig {
        default_auto_subscribe_audio: auto_subscribe,
        ..SfuConfig::default()
    };
    let sfu = Sfu::new(config, TaskPool::new(64), Arc::clone(&factory) as _, None);
    (sfu, factory)
}

fn join(room: &Arc<Room>, id: &str) -> (Arc<Peer>, Arc<LoopbackSession>) {
    join_with_config(room, id, PeerConfig::default())
}

fn join_with_config(
    room: &Arc<Room>,
    id: &str,
    config: PeerConfig,
) -> (Arc<Peer>, Arc<LoopbackSession>) {
    let session = LoopbackSession::new();
    let peer = Peer::new(
        Some(id.to_string()),
        Arc::clone(&session) as _,
        HashMap::new(),
        config,
    );
    room.add_peer(Arc::clone(&peer)).unwrap();
    (peer, session)
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

/// A syntactically valid RTP packet with the given SSRC and payload.
fn rtp_packet(ssrc: u32, payload: &[u8]) -> Vec<u8> {
    let mut pkt = vec![0u8; 12];
    pkt[0] = 0x80;
    pkt[1] = 111;
    pkt[8..12].copy_from_slice(&ssrc.to_be_bytes());
    pkt.extend_from_slice(payload);
    pkt
}

/// An RTP packet carrying a one-byte audio-level extension (id 1).
fn rtp_audio_packet(level: u8, voice: bool, payload: &[u8]) -> Vec<u8> {
    let mut pkt = vec![0u8; 12];
    pkt[0] = 0x80 | 0x10;
    pkt[1] = 111;
    pkt[8..12].copy_from_slice(&7u32.to_be_bytes());
    pkt.extend_from_slice(&0xbedeu16.to_be_bytes());
    pkt.extend_from_slice(&1u16.to_be_bytes());
    let ext = if voice { 0x80 | (level & 0x7f) } else { level & 0x7f };
    pkt.extend_from_slice(&[0x10, ext, 0x00, 0x00]);
    pkt.extend_from_slice(payload);
    pkt
}

/// An RTP packet whose payload is a VP9 descriptor with the given layers.
fn rtp_vp9_packet(ssrc: u32, sid: u8, tid: u8) -> Vec<u8> {
    let layer = (tid << 5) | (sid << 1);
    rtp_packet(ssrc, &[0xa0, 0x05, layer, 0xde, 0xad])
}

#[tokio::test]
async fn test_duplicate_room_rejected() {
    let (sfu, _) = make_sfu(false);
    sfu.create_room(Some("r".into()), 0, HashMap::new(), RoomConfig::default())
        .unwrap();
    let err = sfu
        .create_room(Some("r".into()), 0, HashMap::new(), RoomConfig::default())
        .unwrap_err();
    assert!(matches!(err, MediaError::RoomExists(_)));
}

#[tokio::test]
async fn test_close_room_not_found() {
    let (sfu, _) = make_sfu(false);
    assert!(matches!(
        sfu.close_room("missing").await,
        Err(MediaError::RoomNotFound(_))
    ));
}

#[tokio::test]
async fn test_room_capacity() {
    let (sfu, _) = make_sfu(false);
    let room = sfu
        .create_room(Some("r".into()), 1, HashMap::new(), RoomConfig::default())
        .unwrap();

    let (_, _) = join(&room, "a");
    let session = LoopbackSession::new();
    let peer_b = Peer::new(
        Some("b".into()),
        session as _,
        HashMap::new(),
        PeerConfig::default(),
    );
    let err = room.add_peer(peer_b).unwrap_err();
    assert!(matches!(err, MediaError::RoomFull { .. }));
    assert_eq!(room.peer_count(), 1);
}

#[tokio::test]
async fn test_e2ee_room_rejects_undeclared_peer() {
    let (sfu, _) = make_sfu(false);
    let room = sfu
        .create_room(
            Some("secure".into()),
            0,
            HashMap::new(),
            RoomConfig {
                e2ee_required: true,
                ..RoomConfig::default()
            },
        )
        .unwrap();

    let session = LoopbackSession::new();
    let plain = Peer::new(None, session as _, HashMap::new(), PeerConfig::default());
    assert!(matches!(
        room.add_peer(plain),
        Err(MediaError::E2eeMissing)
    ));

    let config = PeerConfig {
        encryption: Some(EncryptionInfo {
            algorithm: "aes-256-gcm".into(),
            key_id: 1,
            sender_key: vec![0; 16],
        }),
        ..PeerConfig::default()
    };
    let (peer, _) = join_with_config(&room, "secured", config);
    assert_eq!(peer.id(), "secured");
}

#[tokio::test]
async fn test_audio_forwarding_taps_and_speakers() {
    let (sfu, factory) = make_sfu(false);
    let room = sfu
        .create_room(Some("r".into()), 0, HashMap::new(), RoomConfig::default())
        .unwrap();

    let (_, session_a) = join(&room, "a");
    let (_, _) = join(&room, "b");

    let (tap_tx, mut tap_rx) = tokio::sync::mpsc::unbounded_channel();
    room.add_audio_tap(
        "test",
        Arc::new(move |peer_id: &str, payload: &[u8], codec: &str| {
            let _ = tap_tx.send((peer_id.to_string(), payload.to_vec(), codec.to_string()));
        }),
    );

    let (track, feed) = LoopbackRemoteTrack::opus("mic-a", "stream-a");
    session_a.publish_track(track as _);
    wait_until(|| !room.list_publisher_tracks().is_empty()).await;

    room.subscribe("b", "mic-a", VideoQuality::High, -1, -1).unwrap();

    let pkt = rtp_audio_packet(5, true, b"opus-data");
    feed.send(pkt.clone()).await.unwrap();

    // Tap receives the payload past the fixed header.
    let (peer_id, payload, codec) = tokio::time::timeout(Duration::from_secs(2), tap_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(peer_id, "a");
    assert_eq!(payload, pkt[12..].to_vec());
    assert_eq!(codec, "audio/opus");

    // Subscriber receives the raw packet.
    let down = factory.local_track("mic-a", None).unwrap();
    wait_until(|| down.packet_count() == 1).await;
    assert_eq!(down.packets()[0], pkt);

    // The audio-level extension reached the speaker detector.
    wait_until(|| !room.active_speakers().is_empty()).await;
    let speakers = room.active_speakers();
    assert_eq!(speakers[0].peer_id, "a");
    assert_eq!(speakers[0].audio_level, 5);
    assert!(speakers[0].voice_activity);
}

#[tokio::test]
async fn test_auto_subscribe_on_join_and_publish() {
    let (sfu, _) = make_sfu(true);
    let room = sfu
        .create_room(Some("r".into()), 0, HashMap::new(), RoomConfig::default())
        .unwrap();

    // A joins and publishes audio.
    let (_, session_a) = join(&room, "a");
    let (track, _feed) = LoopbackRemoteTrack::opus("mic-a", "stream-a");
    session_a.publish_track(track as _);
    wait_until(|| !room.list_publisher_tracks().is_empty()).await;

    // B joins after the track exists: exactly one subscription at high.
    let (peer_b, _) = join(&room, "b");
    let details = peer_b.subscription_details();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].track_id, "mic-a");
    assert_eq!(details[0].quality, VideoQuality::High);
    assert_eq!(details[0].max_spatial_layer, -1);
    assert_eq!(details[0].max_temporal_layer, -1);

    // C was already in the room when D publishes: C gets subscribed too.
    let (peer_c, _) = join(&room, "c");
    let (_, session_d) = join(&room, "d");
    let (track_d, _feed_d) = LoopbackRemoteTrack::opus("mic-d", "stream-d");
    session_d.publish_track(track_d as _);
    wait_until(|| room.list_publisher_tracks().len() == 2).await;
    wait_until(|| peer_c.subscription_details().len() == 2).await;

    // The publisher itself is never auto-subscribed to its own track.
    assert!(peer_b
        .subscription_details()
        .iter()
        .all(|d| d.publisher_peer_id != "b"));
}

#[tokio::test]
async fn test_subscribe_twice_replaces_and_unsubscribe_idempotent() {
    let (sfu, _) = make_sfu(false);
    let room = sfu
        .create_room(Some("r".into()), 0, HashMap::new(), RoomConfig::default())
        .unwrap();

    let (_, session_a) = join(&room, "a");
    let (_, _) = join(&room, "b");
    let (track, _feed) = LoopbackRemoteTrack::opus("mic-a", "stream-a");
    session_a.publish_track(track as _);
    wait_until(|| !room.list_publisher_tracks().is_empty()).await;

    let first = room.subscribe("b", "mic-a", VideoQuality::High, -1, -1).unwrap();
    let second = room.subscribe("b", "mic-a", VideoQuality::Low, -1, -1).unwrap();
    assert_ne!(first.id(), second.id());

    let pt = room.get_publisher_track("mic-a").unwrap();
    assert_eq!(pt.subscriber_count(), 1);
    assert_eq!(
        pt.subscription_for("b").unwrap().quality(),
        VideoQuality::Low
    );

    room.unsubscribe("b", "mic-a").unwrap();
    room.unsubscribe("b", "mic-a").unwrap();
    assert_eq!(pt.subscriber_count(), 0);
}

#[tokio::test]
async fn test_remove_peer_cleans_up() {
    let (sfu, _) = make_sfu(false);
    let room = sfu
        .create_room(Some("r".into()), 0, HashMap::new(), RoomConfig::default())
        .unwrap();

    let (_, session_a) = join(&room, "a");
    let (peer_b, _) = join(&room, "b");
    let (track, _feed) = LoopbackRemoteTrack::opus("mic-a", "stream-a");
    session_a.publish_track(track as _);
    wait_until(|| !room.list_publisher_tracks().is_empty()).await;
    room.subscribe("b", "mic-a", VideoQuality::High, -1, -1).unwrap();

    assert_eq!(room.peer_count(), 2);
    room.remove_peer("a").await;

    assert_eq!(room.peer_count(), 1);
    assert!(room.list_publisher_tracks().is_empty());
    assert!(peer_b.subscription_details().is_empty());
    assert!(session_a.is_closed());

    // Removing again is a no-op.
    room.remove_peer("a").await;
    assert_eq!(room.peer_count(), 1);
}

#[tokio::test]
async fn test_transport_failure_removes_peer() {
    let (sfu, _) = make_sfu(false);
    let room = sfu
        .create_room(Some("r".into()), 0, HashMap::new(), RoomConfig::default())
        .unwrap();

    let (_, session_a) = join(&room, "a");
    session_a.set_transport_state(TransportState::Connected);
    session_a.set_transport_state(TransportState::Failed);
    wait_until(|| room.peer_count() == 0).await;
}

#[tokio::test]
async fn test_simulcast_layer_selection_and_pli() {
    let (sfu, factory) = make_sfu(false);
    let room = sfu
        .create_room(Some("r".into()), 0, HashMap::new(), RoomConfig::default())
        .unwrap();

    let (_, session_a) = join(&room, "a");
    let (_, _) = join(&room, "b");

    let (layer_q, feed_q) = LoopbackRemoteTrack::vp9("cam-a", "stream-a", "q", 100);
    let (layer_f, feed_f) = LoopbackRemoteTrack::vp9("cam-a", "stream-a", "f", 300);
    session_a.publish_track(layer_q as _);
    session_a.publish_track(layer_f as _);
    wait_until(|| {
        room.get_publisher_track("cam-a")
            .map(|t| t.info().layers.len() == 2)
            .unwrap_or(false)
    })
    .await;

    room.subscribe("b", "cam-a", VideoQuality::High, -1, -1).unwrap();
    let down = factory.local_track("cam-a", Some("f")).unwrap();

    // High quality pulls from the "f" layer.
    feed_f.send(rtp_packet(300, b"hi-res")).await.unwrap();
    wait_until(|| down.packet_count() == 1).await;

    // Switch to low: the forwarder notices on its next packet and requests a
    // keyframe from the publisher for the newly selected layer.
    room.update_subscription("b", "cam-a", VideoQuality::Low, -1, -1, false)
        .unwrap();
    for _ in 0..20 {
        feed_f.send(rtp_packet(300, b"hi-res-2")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        if !session_a.feedback_requests().is_empty() {
            break;
        }
    }
    assert_eq!(session_a.feedback_requests()[0].media_ssrc, 100);

    // Subsequent reads come from "q".
    feed_q.send(rtp_packet(100, b"lo-res")).await.unwrap();
    wait_until(|| down.packets().iter().any(|p| p.ends_with(b"lo-res"))).await;
}

#[tokio::test]
async fn test_svc_layer_filtering() {
    let (sfu, factory) = make_sfu(false);
    let room = sfu
        .create_room(Some("r".into()), 0, HashMap::new(), RoomConfig::default())
        .unwrap();

    let (_, session_a) = join(&room, "a");
    let (_, _) = join(&room, "b");

    let (track, feed) = LoopbackRemoteTrack::vp9("svc-a", "stream-a", "", 42);
    session_a.publish_track(track as _);
    wait_until(|| !room.list_publisher_tracks().is_empty()).await;
    room.get_publisher_track("svc-a").unwrap().set_svc(true);

    room.subscribe("b", "svc-a", VideoQuality::High, 0, 0).unwrap();
    let down = factory.local_track("svc-a", None).unwrap();

    // Above the spatial limit: dropped. Above temporal: dropped. Base: kept.
    feed.send(rtp_vp9_packet(42, 1, 0)).await.unwrap();
    feed.send(rtp_vp9_packet(42, 0, 2)).await.unwrap();
    feed.send(rtp_vp9_packet(42, 0, 0)).await.unwrap();

    wait_until(|| down.packet_count() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(down.packet_count(), 1);
}

#[tokio::test]
async fn test_inject_audio_reaches_taps() {
    let (sfu, _) = make_sfu(false);
    let room = sfu
        .create_room(Some("r".into()), 0, HashMap::new(), RoomConfig::default())
        .unwrap();

    let (tap_tx, mut tap_rx) = tokio::sync::mpsc::unbounded_channel();
    room.add_audio_tap(
        "orchestrator",
        Arc::new(move |peer_id: &str, payload: &[u8], codec: &str| {
            let _ = tap_tx.send((peer_id.to_string(), payload.to_vec(), codec.to_string()));
        }),
    );

    room.inject_audio("tts", b"synthesized", "audio/opus");
    let (peer_id, payload, codec) = tap_rx.recv().await.unwrap();
    assert_eq!(peer_id, "tts");
    assert_eq!(payload, b"synthesized");
    assert_eq!(codec, "audio/opus");

    room.remove_audio_tap("orchestrator");
    room.inject_audio("tts", b"more", "audio/opus");
    assert!(tap_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_stats_aggregation() {
    let (sfu, _) = make_sfu(false);
    let room = sfu
        .create_room(Some("r".into()), 0, HashMap::new(), RoomConfig::default())
        .unwrap();
    let (_, session_a) = join(&room, "a");
    let (_, _) = join(&room, "b");
    let (track, _feed) = LoopbackRemoteTrack::opus("mic-a", "stream-a");
    session_a.publish_track(track as _);
    wait_until(|| !room.list_publisher_tracks().is_empty()).await;
    room.subscribe("b", "mic-a", VideoQuality::High, -1, -1).unwrap();

    let stats = sfu.stats();
    assert_eq!(stats.room_count, 1);
    assert_eq!(stats.peer_count, 2);
    assert_eq!(stats.track_count, 1);
    assert_eq!(stats.audio_track_count, 1);
    assert_eq!(stats.subscription_count, 1);
    assert_eq!(room.publisher_count(), 1);
}
