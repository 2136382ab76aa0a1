//! Webhook delivery end-to-end tests against a local HTTP server.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use voicebridge_core::events::WebhookTestData;
use voicebridge_core::{Envelope, EventType, MemoryQueue, Publisher, TaskPool};
use voicebridge_webhook::{
    replay_dead_letter, verify, Deliverer, DelivererConfig, DeliveryStatus, MemoryRepository,
    Subscriber, WebhookEndpoint, WebhookRepository, SIGNATURE_HEADER,
};

#[derive(Clone)]
struct ServerState {
    /// Statuses to return, in order; empty means 200.
    script: Arc<Mutex<VecDeque<u16>>>,
    requests: Arc<Mutex<Vec<(HeaderMap, Vec<u8>)>>>,
}

async fn hook(State(state): State<ServerState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    state.requests.lock().push((headers, body.to_vec()));
    let code = state.script.lock().pop_front().unwrap_or(200);
    StatusCode::from_u16(code).unwrap()
}

async fn spawn_server(script: Vec<u16>) -> (String, ServerState) {
    let state = ServerState {
        script: Arc::new(Mutex::new(script.into())),
        requests: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/hook", post(hook))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/hook"), state)
}

struct Fixture {
    repo: Arc<dyn WebhookRepository>,
    publisher: Arc<Publisher>,
    _cancel: CancellationToken,
}

async fn fixture(max_retries: u32) -> Fixture {
    let (queue, queue_rx) = MemoryQueue::new(64);
    let publisher = Arc::new(Publisher::new(Arc::new(queue), "integration", "events"));

    let repo: Arc<dyn WebhookRepository> = Arc::new(MemoryRepository::new());
    let deliverer = Arc::new(Deliverer::new(
        Arc::clone(&repo),
        DelivererConfig {
            max_retries,
            backoff_initial: Duration::from_millis(100),
            backoff_max: Duration::from_secs(1),
            allow_private_urls: true,
            ..DelivererConfig::default()
        },
    ));
    let cancel = CancellationToken::new();
    let subscriber = Subscriber::new(
        Arc::clone(&repo),
        deliverer,
        TaskPool::new(16),
        cancel.clone(),
    );
    subscriber.run(queue_rx);

    Fixture {
        repo,
        publisher,
        _cancel: cancel,
    }
}

async fn wait_for_deliveries(
    repo: &Arc<dyn WebhookRepository>,
    webhook_id: &str,
    count: usize,
) -> Vec<voicebridge_webhook::DeliveryAttempt> {
    for _ in 0..100 {
        let attempts = repo.list_deliveries(webhook_id, 0, 0).await.unwrap();
        if attempts.len() >= count {
            return attempts;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("expected {count} delivery attempts for {webhook_id}");
}

#[tokio::test]
async fn test_signed_delivery_with_retries() {
    // Two 500s, then success, within max_retries=3.
    let (url, server) = spawn_server(vec![500, 500, 200]).await;
    let fx = fixture(3).await;

    let secret = "test-secret";
    let wh = fx
        .repo
        .create_endpoint(WebhookEndpoint::new(
            "e2e",
            url,
            secret,
            vec![EventType::WebhookTest],
        ))
        .await
        .unwrap();

    fx.publisher
        .emit(
            EventType::WebhookTest,
            "s1",
            &WebhookTestData {
                webhook_id: wh.id.clone(),
                message: "ping".into(),
            },
        )
        .await
        .unwrap();

    let attempts = wait_for_deliveries(&fx.repo, &wh.id, 3).await;
    let failed = attempts
        .iter()
        .filter(|a| a.status == DeliveryStatus::Failed)
        .count();
    let succeeded = attempts
        .iter()
        .filter(|a| a.status == DeliveryStatus::Success)
        .count();
    assert_eq!(failed, 2);
    assert_eq!(succeeded, 1);

    // Headers and signature on the first request.
    let requests = server.requests.lock();
    assert_eq!(requests.len(), 3);
    let (headers, body) = &requests[0];
    assert_eq!(
        headers.get("x-voicetyped-event").unwrap().to_str().unwrap(),
        "webhook.test"
    );
    assert!(headers.get("x-voicetyped-delivery").is_some());
    let signature = headers
        .get(SIGNATURE_HEADER.to_lowercase())
        .unwrap()
        .to_str()
        .unwrap();
    assert!(verify(secret, body, signature));
    assert!(!verify("wrong-secret", body, signature));

    // The body is the envelope itself.
    let env: Envelope = serde_json::from_slice(body).unwrap();
    assert_eq!(env.event_type, EventType::WebhookTest);
    assert_eq!(env.session_id, "s1");

    // No dead letter on eventual success.
    assert!(fx.repo.list_dead_letters(&wh.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dead_letter_and_replay() {
    // Always failing until the replay round.
    let (url, server) = spawn_server(vec![500, 500]).await;
    let fx = fixture(2).await;

    let wh = fx
        .repo
        .create_endpoint(WebhookEndpoint::new(
            "dead",
            url,
            "secret",
            vec![EventType::WebhookTest],
        ))
        .await
        .unwrap();

    fx.publisher
        .emit(
            EventType::WebhookTest,
            "s1",
            &WebhookTestData {
                webhook_id: wh.id.clone(),
                message: "doomed".into(),
            },
        )
        .await
        .unwrap();

    let attempts = wait_for_deliveries(&fx.repo, &wh.id, 2).await;
    assert!(attempts.iter().all(|a| a.status == DeliveryStatus::Failed));

    let mut letters = Vec::new();
    for _ in 0..100 {
        letters = fx.repo.list_dead_letters(&wh.id).await.unwrap();
        if !letters.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(letters.len(), 1);
    let dl = &letters[0];
    assert!(dl.replayable);
    assert_eq!(dl.attempts, 2);

    // The payload is the exact envelope that was being delivered.
    let (_, first_body) = server.requests.lock()[0].clone();
    assert_eq!(dl.payload.as_bytes(), first_body.as_slice());

    // Replay re-emits the event (server now answers 200) and consumes the
    // letter.
    let replayed = replay_dead_letter(&fx.repo, &fx.publisher, &dl.id)
        .await
        .unwrap();
    assert_eq!(replayed.event_type, EventType::WebhookTest);

    let attempts = wait_for_deliveries(&fx.repo, &wh.id, 3).await;
    assert!(attempts
        .iter()
        .any(|a| a.status == DeliveryStatus::Success));

    assert!(fx.repo.list_dead_letters(&wh.id).await.unwrap().is_empty());
    assert!(matches!(
        replay_dead_letter(&fx.repo, &fx.publisher, &dl.id).await,
        Err(voicebridge_webhook::WebhookError::NotReplayable(_))
    ));
}

#[tokio::test]
async fn test_non_matching_events_not_delivered() {
    let (url, server) = spawn_server(vec![]).await;
    let fx = fixture(3).await;

    fx.repo
        .create_endpoint(WebhookEndpoint::new(
            "narrow",
            url,
            "secret",
            vec![EventType::CallStarted],
        ))
        .await
        .unwrap();

    fx.publisher
        .emit(EventType::WebhookTest, "s1", &serde_json::json!({}))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(server.requests.lock().is_empty());
}
