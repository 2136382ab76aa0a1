//! REST surface

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use voicebridge_core::events::{CallStartedData, CallTerminatedData, WebhookTestData};
use voicebridge_core::EventType;
use voicebridge_dialog::{DialogTurn, SessionSnapshot};
use voicebridge_media::{
    EncryptionInfo, MediaError, Peer, PeerConfig, PeerInfo, PublisherTrackInfo, RoomConfig,
    SubscriptionDetail, VideoQuality,
};
use voicebridge_webhook::{
    generate_secret, replay_dead_letter, DeadLetter, DeliveryAttempt, WebhookEndpoint,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Media
        .route("/api/rooms", post(create_room).get(list_rooms))
        .route("/api/rooms/:id", get(get_room).delete(close_room))
        .route("/api/rooms/:id/join", post(join_room))
        .route("/api/rooms/:id/leave", post(leave_room))
        .route("/api/rooms/:id/ice", post(trickle_ice))
        .route("/api/rooms/:id/renegotiate", post(renegotiate))
        .route("/api/rooms/:id/tracks", get(list_tracks))
        .route("/api/rooms/:id/speakers", get(active_speakers))
        .route("/api/rooms/:id/subscribe", post(subscribe_track))
        .route("/api/rooms/:id/unsubscribe", post(unsubscribe_track))
        .route("/api/rooms/:id/subscription", post(update_subscription))
        // Dialog
        .route("/api/dialogs", get(list_dialogs))
        .route("/api/dialog/sessions", post(start_dialog))
        .route(
            "/api/dialog/sessions/:id",
            get(get_dialog_session).delete(end_dialog),
        )
        .route("/api/dialog/sessions/:id/event", post(send_dialog_event))
        // Webhooks
        .route("/api/webhooks", post(create_webhook).get(list_webhooks))
        .route(
            "/api/webhooks/:id",
            get(get_webhook).put(update_webhook).delete(delete_webhook),
        )
        .route("/api/webhooks/:id/test", post(test_webhook))
        .route("/api/webhooks/:id/deliveries", get(list_deliveries))
        .route("/api/webhooks/:id/dead-letters", get(list_dead_letters))
        .route("/api/dead-letters/:id/replay", post(replay_letter))
        // Health
        .route("/health", get(health))
        .route("/api/stats", get(stats))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let sfu = state.sfu.stats();
    Json(serde_json::json!({
        "sfu": sfu,
        "dialog_sessions": state.engine.session_count(),
    }))
}

// ---- media -----------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateRoomRequest {
    room_id: Option<String>,
    #[serde(default)]
    max_peers: usize,
    #[serde(default)]
    max_publishers: usize,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    e2ee_required: bool,
    auto_subscribe_audio: Option<bool>,
}

#[derive(Debug, Serialize)]
struct RoomSummary {
    room_id: String,
    peer_count: usize,
    max_peers: usize,
    created_at: chrono::DateTime<chrono::Utc>,
}

async fn create_room(
    State(state): State<AppState>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<Json<RoomSummary>, ApiError> {
    let room = state.sfu.create_room(
        req.room_id,
        req.max_peers,
        req.metadata,
        RoomConfig {
            max_publishers: req.max_publishers,
            e2ee_required: req.e2ee_required,
            auto_subscribe_audio: req.auto_subscribe_audio,
        },
    )?;
    Ok(Json(RoomSummary {
        room_id: room.id().to_string(),
        peer_count: room.peer_count(),
        max_peers: room.max_peers(),
        created_at: room.created_at(),
    }))
}

async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomSummary>> {
    let rooms = state
        .sfu
        .list_rooms()
        .into_iter()
        .map(|room| RoomSummary {
            room_id: room.id().to_string(),
            peer_count: room.peer_count(),
            max_peers: room.max_peers(),
            created_at: room.created_at(),
        })
        .collect();
    Json(rooms)
}

#[derive(Debug, Serialize)]
struct RoomDetail {
    room_id: String,
    max_peers: usize,
    metadata: HashMap<String, String>,
    created_at: chrono::DateTime<chrono::Utc>,
    peers: Vec<PeerInfo>,
}

async fn get_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoomDetail>, ApiError> {
    let room = state
        .sfu
        .get_room(&id)
        .ok_or_else(|| MediaError::RoomNotFound(id.clone()))?;
    Ok(Json(RoomDetail {
        room_id: room.id().to_string(),
        max_peers: room.max_peers(),
        metadata: room.metadata().clone(),
        created_at: room.created_at(),
        peers: room.peers().iter().map(|p| p.info()).collect(),
    }))
}

async fn close_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.sfu.close_room(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct JoinRoomRequest {
    peer_id: Option<String>,
    sdp_offer: String,
    #[serde(default)]
    dialog_name: String,
    // None picks the server default (publish audio, auto-subscribe).
    publish_audio: Option<bool>,
    publish_video: Option<bool>,
    simulcast: Option<bool>,
    auto_subscribe_audio: Option<bool>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    encryption: Option<EncryptionInfo>,
}

#[derive(Debug, Serialize)]
struct SessionInfo {
    session_id: String,
    room_id: String,
    peer_id: String,
    protocol: String,
}

#[derive(Debug, Serialize)]
struct JoinRoomResponse {
    sdp_answer: String,
    session_info: SessionInfo,
    available_tracks: Vec<PublisherTrackInfo>,
}

async fn join_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<JoinRoomRequest>,
) -> Result<Json<JoinRoomResponse>, ApiError> {
    let room = state
        .sfu
        .get_room(&id)
        .ok_or_else(|| MediaError::RoomNotFound(id.clone()))?;

    let defaults = PeerConfig::default();
    let config = PeerConfig {
        publish_audio: req.publish_audio.unwrap_or(defaults.publish_audio),
        publish_video: req.publish_video.unwrap_or(defaults.publish_video),
        simulcast: req.simulcast.unwrap_or(defaults.simulcast),
        auto_subscribe_audio: req
            .auto_subscribe_audio
            .unwrap_or(defaults.auto_subscribe_audio),
        encryption: req.encryption,
    };

    let session = (state.session_factory)();
    let peer = Peer::new(req.peer_id, session, req.metadata.clone(), config);
    let available = match room.add_peer(Arc::clone(&peer)) {
        Ok(available) => available,
        Err(err) => {
            peer.close().await;
            return Err(err.into());
        }
    };

    let answer = match peer.handle_offer(&req.sdp_offer).await {
        Ok(answer) => answer,
        Err(err) => {
            room.remove_peer(peer.id()).await;
            return Err(err.into());
        }
    };

    let session_id = format!("{}-{}", room.id(), peer.id());
    let _ = state
        .publisher
        .emit(
            EventType::CallStarted,
            &session_id,
            &CallStartedData {
                caller_id: peer.id().to_string(),
                called_number: room.id().to_string(),
                protocol: "webrtc".into(),
            },
        )
        .await;

    // Orchestration runs on the service context, outliving this request.
    state
        .orchestrator
        .start_for_peer(room.id(), peer.id(), &req.dialog_name);

    Ok(Json(JoinRoomResponse {
        sdp_answer: answer,
        session_info: SessionInfo {
            session_id,
            room_id: room.id().to_string(),
            peer_id: peer.id().to_string(),
            protocol: "webrtc".into(),
        },
        available_tracks: available.iter().map(|t| t.info()).collect(),
    }))
}

#[derive(Debug, Deserialize)]
struct PeerRequest {
    peer_id: String,
}

async fn leave_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PeerRequest>,
) -> Result<StatusCode, ApiError> {
    let room = state
        .sfu
        .get_room(&id)
        .ok_or_else(|| MediaError::RoomNotFound(id.clone()))?;
    if room.get_peer(&req.peer_id).is_none() {
        return Err(MediaError::PeerNotFound(req.peer_id).into());
    }
    room.remove_peer(&req.peer_id).await;

    let _ = state
        .publisher
        .emit(
            EventType::CallTerminated,
            &format!("{}-{}", id, req.peer_id),
            &CallTerminatedData {
                reason: "leave".into(),
                duration_ms: 0,
            },
        )
        .await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct TrickleIceRequest {
    peer_id: String,
    candidate: String,
}

async fn trickle_ice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TrickleIceRequest>,
) -> Result<StatusCode, ApiError> {
    let room = state
        .sfu
        .get_room(&id)
        .ok_or_else(|| MediaError::RoomNotFound(id.clone()))?;
    let peer = room
        .get_peer(&req.peer_id)
        .ok_or_else(|| MediaError::PeerNotFound(req.peer_id.clone()))?;
    peer.add_ice_candidate(&req.candidate).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct RenegotiateRequest {
    peer_id: String,
    sdp_offer: String,
}

async fn renegotiate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenegotiateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let room = state
        .sfu
        .get_room(&id)
        .ok_or_else(|| MediaError::RoomNotFound(id.clone()))?;
    let peer = room
        .get_peer(&req.peer_id)
        .ok_or_else(|| MediaError::PeerNotFound(req.peer_id.clone()))?;
    let answer = peer.renegotiate(&req.sdp_offer).await?;
    Ok(Json(serde_json::json!({ "sdp_answer": answer })))
}

async fn list_tracks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PublisherTrackInfo>>, ApiError> {
    let room = state
        .sfu
        .get_room(&id)
        .ok_or_else(|| MediaError::RoomNotFound(id.clone()))?;
    Ok(Json(
        room.list_publisher_tracks().iter().map(|t| t.info()).collect(),
    ))
}

async fn active_speakers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<voicebridge_media::ActiveSpeakerInfo>>, ApiError> {
    let room = state
        .sfu
        .get_room(&id)
        .ok_or_else(|| MediaError::RoomNotFound(id.clone()))?;
    Ok(Json(room.active_speakers()))
}

#[derive(Debug, Deserialize)]
struct SubscribeRequest {
    peer_id: String,
    track_id: String,
    quality: Option<VideoQuality>,
    max_temporal: Option<i32>,
    max_spatial: Option<i32>,
}

async fn subscribe_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SubscribeRequest>,
) -> Result<Json<SubscriptionDetail>, ApiError> {
    let room = state
        .sfu
        .get_room(&id)
        .ok_or_else(|| MediaError::RoomNotFound(id.clone()))?;
    let sub = room.subscribe(
        &req.peer_id,
        &req.track_id,
        req.quality.unwrap_or(VideoQuality::High),
        req.max_temporal.unwrap_or(-1),
        req.max_spatial.unwrap_or(-1),
    )?;
    Ok(Json(sub.detail()))
}

#[derive(Debug, Deserialize)]
struct UnsubscribeRequest {
    peer_id: String,
    track_id: String,
}

async fn unsubscribe_track(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UnsubscribeRequest>,
) -> Result<StatusCode, ApiError> {
    let room = state
        .sfu
        .get_room(&id)
        .ok_or_else(|| MediaError::RoomNotFound(id.clone()))?;
    room.unsubscribe(&req.peer_id, &req.track_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct UpdateSubscriptionRequest {
    peer_id: String,
    track_id: String,
    quality: Option<VideoQuality>,
    max_temporal: Option<i32>,
    max_spatial: Option<i32>,
    #[serde(default)]
    paused: bool,
}

async fn update_subscription(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateSubscriptionRequest>,
) -> Result<StatusCode, ApiError> {
    let room = state
        .sfu
        .get_room(&id)
        .ok_or_else(|| MediaError::RoomNotFound(id.clone()))?;
    room.update_subscription(
        &req.peer_id,
        &req.track_id,
        req.quality.unwrap_or(VideoQuality::High),
        req.max_temporal.unwrap_or(-1),
        req.max_spatial.unwrap_or(-1),
        req.paused,
    )?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- dialog ----------------------------------------------------------------

async fn list_dialogs(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "dialogs": state.engine.list_dialogs() }))
}

#[derive(Debug, Deserialize)]
struct StartDialogRequest {
    #[serde(default)]
    session_id: String,
    dialog_name: String,
    initial_state: Option<String>,
    #[serde(default)]
    variables: HashMap<String, String>,
}

async fn start_dialog(
    State(state): State<AppState>,
    Json(req): Json<StartDialogRequest>,
) -> Result<Json<DialogTurn>, ApiError> {
    let turn = state
        .engine
        .start_dialog(
            &req.session_id,
            &req.dialog_name,
            req.initial_state.as_deref(),
            req.variables,
        )
        .await?;
    Ok(Json(turn))
}

#[derive(Debug, Deserialize)]
struct SendEventRequest {
    event_type: String,
    #[serde(default)]
    data: String,
}

async fn send_dialog_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SendEventRequest>,
) -> Result<Json<DialogTurn>, ApiError> {
    let turn = state
        .engine
        .send_event(&id, &req.event_type, &req.data)
        .await?;
    Ok(Json(turn))
}

async fn get_dialog_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    Ok(Json(state.engine.get_session(&id)?))
}

async fn end_dialog(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.end_dialog(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- webhooks ----------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateWebhookRequest {
    name: String,
    url: String,
    /// Generated when absent; returned once in the response.
    secret: Option<String>,
    event_types: Vec<EventType>,
    #[serde(default)]
    description: String,
    max_rps: Option<u32>,
}

#[derive(Debug, Serialize)]
struct CreateWebhookResponse {
    #[serde(flatten)]
    endpoint: WebhookEndpoint,
    secret: String,
}

async fn create_webhook(
    State(state): State<AppState>,
    Json(req): Json<CreateWebhookRequest>,
) -> Result<Json<CreateWebhookResponse>, ApiError> {
    voicebridge_core::validate_outbound_url(&req.url, false)
        .await
        .map_err(|err| ApiError::bad_request(err.to_string()))?;

    let secret = req.secret.unwrap_or_else(generate_secret);
    let mut endpoint = WebhookEndpoint::new(req.name, req.url, secret.clone(), req.event_types);
    endpoint.description = req.description;
    if let Some(max_rps) = req.max_rps {
        endpoint.max_rps = max_rps;
    }

    let endpoint = state.repo.create_endpoint(endpoint).await?;
    Ok(Json(CreateWebhookResponse { endpoint, secret }))
}

async fn list_webhooks(
    State(state): State<AppState>,
) -> Result<Json<Vec<WebhookEndpoint>>, ApiError> {
    Ok(Json(state.repo.list_endpoints().await?))
}

async fn get_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<WebhookEndpoint>, ApiError> {
    Ok(Json(state.repo.get_endpoint(&id).await?))
}

#[derive(Debug, Deserialize)]
struct UpdateWebhookRequest {
    name: Option<String>,
    url: Option<String>,
    event_types: Option<Vec<EventType>>,
    description: Option<String>,
    is_active: Option<bool>,
    max_rps: Option<u32>,
}

async fn update_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateWebhookRequest>,
) -> Result<Json<WebhookEndpoint>, ApiError> {
    let mut endpoint = state.repo.get_endpoint(&id).await?;
    if let Some(url) = &req.url {
        voicebridge_core::validate_outbound_url(url, false)
            .await
            .map_err(|err| ApiError::bad_request(err.to_string()))?;
        endpoint.url = url.clone();
    }
    if let Some(name) = req.name {
        endpoint.name = name;
    }
    if let Some(event_types) = req.event_types {
        endpoint.event_types = event_types;
    }
    if let Some(description) = req.description {
        endpoint.description = description;
    }
    if let Some(is_active) = req.is_active {
        endpoint.is_active = is_active;
    }
    if let Some(max_rps) = req.max_rps {
        endpoint.max_rps = max_rps;
    }
    Ok(Json(state.repo.update_endpoint(endpoint).await?))
}

async fn delete_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.repo.delete_endpoint(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn test_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let endpoint = state.repo.get_endpoint(&id).await?;
    state
        .publisher
        .emit(
            EventType::WebhookTest,
            "",
            &WebhookTestData {
                webhook_id: endpoint.id.clone(),
                message: "test delivery".into(),
            },
        )
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?;
    Ok(Json(serde_json::json!({ "queued": true })))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default)]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

async fn list_deliveries(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<DeliveryAttempt>>, ApiError> {
    // 404 for unknown endpoints rather than an empty list.
    state.repo.get_endpoint(&id).await?;
    Ok(Json(
        state.repo.list_deliveries(&id, page.limit, page.offset).await?,
    ))
}

async fn list_dead_letters(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DeadLetter>>, ApiError> {
    state.repo.get_endpoint(&id).await?;
    Ok(Json(state.repo.list_dead_letters(&id).await?))
}

async fn replay_letter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let env = replay_dead_letter(&state.repo, &state.publisher, &id).await?;
    Ok(Json(serde_json::json!({
        "replayed": true,
        "event_id": env.id,
        "event_type": env.event_type,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicebridge_config::Settings;

    fn test_state() -> AppState {
        let mut settings = Settings::default();
        settings.dialog.dialog_dir = std::env::temp_dir()
            .join("voicebridge-missing-dialogs")
            .display()
            .to_string();
        settings.dialog.hot_reload = false;
        AppState::build(settings)
    }

    #[tokio::test]
    async fn test_router_creation() {
        let _ = create_router(test_state());
    }

    #[tokio::test]
    async fn test_room_lifecycle_handlers() {
        let state = test_state();

        let Json(created) = create_room(
            State(state.clone()),
            Json(CreateRoomRequest {
                room_id: Some("r1".into()),
                max_peers: 2,
                max_publishers: 0,
                metadata: HashMap::new(),
                e2ee_required: false,
                auto_subscribe_audio: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(created.room_id, "r1");
        assert_eq!(created.max_peers, 2);

        // Duplicate id conflicts.
        let err = create_room(
            State(state.clone()),
            Json(CreateRoomRequest {
                room_id: Some("r1".into()),
                max_peers: 0,
                max_publishers: 0,
                metadata: HashMap::new(),
                e2ee_required: false,
                auto_subscribe_audio: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);

        let Json(detail) = get_room(State(state.clone()), Path("r1".into())).await.unwrap();
        assert_eq!(detail.room_id, "r1");

        let status = close_room(State(state.clone()), Path("r1".into())).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        let err = get_room(State(state), Path("r1".into())).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_join_room_returns_answer_and_session() {
        let state = test_state();
        create_room(
            State(state.clone()),
            Json(CreateRoomRequest {
                room_id: Some("r1".into()),
                max_peers: 0,
                max_publishers: 0,
                metadata: HashMap::new(),
                e2ee_required: false,
                auto_subscribe_audio: None,
            }),
        )
        .await
        .unwrap();

        let Json(joined) = join_room(
            State(state.clone()),
            Path("r1".into()),
            Json(JoinRoomRequest {
                peer_id: Some("p1".into()),
                sdp_offer: "v=0".into(),
                dialog_name: String::new(),
                publish_audio: None,
                publish_video: None,
                simulcast: None,
                auto_subscribe_audio: None,
                metadata: HashMap::new(),
                encryption: None,
            }),
        )
        .await
        .unwrap();
        assert!(!joined.sdp_answer.is_empty());
        assert_eq!(joined.session_info.session_id, "r1-p1");
        assert_eq!(state.sfu.get_room("r1").unwrap().peer_count(), 1);

        let status = leave_room(
            State(state.clone()),
            Path("r1".into()),
            Json(PeerRequest {
                peer_id: "p1".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(state.sfu.get_room("r1").unwrap().peer_count(), 0);
    }

    #[tokio::test]
    async fn test_webhook_create_generates_secret() {
        let state = test_state();
        let Json(created) = create_webhook(
            State(state.clone()),
            Json(CreateWebhookRequest {
                name: "hook".into(),
                url: "https://93.184.215.14/hook".into(),
                secret: None,
                event_types: vec![EventType::WebhookTest],
                description: String::new(),
                max_rps: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(created.secret.len(), 64);

        let Json(listed) = list_webhooks(State(state)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "hook");
    }
}
