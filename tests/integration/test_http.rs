//! Integration tests over real sockets.
//!
//! A mock AI backend and the LessonLift API are both served on ephemeral
//! ports. The API is driven with `reqwest` while an editor listens on the
//! WebSocket event stream.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use lessonlift_pipeline::api::{ErrorResponse, PreviewResponse, SuggestionsResponse};
use lessonlift_pipeline::collaborator::{
    ApplyRequest, ApplyResponse, ConfirmRequest, ConfirmResponse, GenerateRequest,
    GenerateResponse, RateRequest, RateResponse, RawEnhancement, RawSuggestion,
};
use lessonlift_pipeline::{
    create_router, AppState, Config, ConfirmationStrategy, ConfirmedEnhancement,
    FrameworkPrinciple, HttpCollaborator, PipelineEvent, Selection,
};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

const BASE: &str = "Intro. Activity. Closing.";
const ENHANCED: &str = "Intro. Activity. Quick check: 2 questions. Closing.";
const API_KEY_VAR: &str = "LESSONLIFT_IT_API_KEY";

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Mock AI backend
// ============================================================================

#[derive(Debug, Clone, Default)]
struct MockBackend {
    authorizations: Arc<Mutex<Vec<String>>>,
    confirm_requests: Arc<Mutex<Vec<ConfirmRequest>>>,
}

impl MockBackend {
    fn record_auth(&self, headers: &HeaderMap) {
        if let Some(value) = headers.get("authorization") {
            self.authorizations
                .lock()
                .expect("lock poisoned")
                .push(value.to_str().unwrap_or_default().to_string());
        }
    }
}

async fn mock_generate(
    State(mock): State<MockBackend>,
    headers: HeaderMap,
    Json(request): Json<GenerateRequest>,
) -> Response {
    mock.record_auth(&headers);
    match request.lesson_id.as_str() {
        "broken" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        "locked" => (StatusCode::UNAUTHORIZED, "bad key").into_response(),
        _ => Json(GenerateResponse {
            suggestions: vec![RawSuggestion {
                id: Some("s1".to_string()),
                framework_principle: FrameworkPrinciple::AssessmentInformed,
                element: Some("formative assessment".to_string()),
                suggestion_text: "Add a formative check".to_string(),
                rationale: "Checks understanding before moving on".to_string(),
                implementation_hint: "Two quick questions".to_string(),
            }],
        })
        .into_response(),
    }
}

async fn mock_rate(Json(request): Json<RateRequest>) -> Json<RateResponse> {
    Json(RateResponse {
        ack: !request.suggestion_id.is_empty(),
    })
}

async fn mock_apply(Json(request): Json<ApplyRequest>) -> Json<ApplyResponse> {
    assert_eq!(request.original_lesson, BASE);
    Json(ApplyResponse {
        enhancements: vec![
            RawEnhancement {
                id: Some("e1".to_string()),
                original_text: "Activity.".to_string(),
                enhanced_text: "Activity. Quick check: 2 questions.".to_string(),
                rationale: "add formative check".to_string(),
                ..RawEnhancement::default()
            },
            RawEnhancement {
                id: Some("e2".to_string()),
                original_text: String::new(),
                enhanced_text: "Exit ticket.".to_string(),
                ..RawEnhancement::default()
            },
        ],
        preview_lesson: None,
    })
}

async fn mock_confirm(
    State(mock): State<MockBackend>,
    Json(request): Json<ConfirmRequest>,
) -> Json<ConfirmResponse> {
    mock.confirm_requests
        .lock()
        .expect("lock poisoned")
        .push(request);
    Json(ConfirmResponse {
        enhanced_lesson: ENHANCED.to_string(),
        statistics: Some(json!({ "changesApplied": 1 })),
    })
}

async fn spawn_mock_backend(mock: MockBackend) -> String {
    let router = Router::new()
        .route("/suggestions/generate", post(mock_generate))
        .route("/suggestions/rate", post(mock_rate))
        .route("/suggestions/apply", post(mock_apply))
        .route("/enhancements/confirm", post(mock_confirm))
        .with_state(mock);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Mock backend failed");
    });
    format!("http://{addr}")
}

// ============================================================================
// API server helpers
// ============================================================================

/// Spawns the API against `backend_url` and returns its address.
async fn spawn_api(backend_url: &str, strategy: ConfirmationStrategy) -> String {
    let mut config = Config {
        confirmation_strategy: strategy,
        ..Config::default()
    };
    config.backend.base_url = backend_url.to_string();
    config.backend.api_key_env = Some(API_KEY_VAR.to_string());
    config.backend.request_timeout_secs = 5;

    let collaborator = HttpCollaborator::new(&config.backend).expect("client builds");
    let router = create_router(AppState::new(Arc::new(collaborator), &config));

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });
    addr.to_string()
}

/// Receives the next text message from the WebSocket and parses it as an event.
/// Automatically handles ping frames by responding with pong.
async fn receive_event(client: &mut WsClient) -> PipelineEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            other => panic!("Unexpected message: {other:?}"),
        }
    }
}

fn lesson_json() -> serde_json::Value {
    json!({ "id": "l1", "title": "Fractions", "content": BASE })
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn editor_receives_confirmed_document() {
    std::env::set_var(API_KEY_VAR, "secret-token");
    let mock = MockBackend::default();
    let backend_url = spawn_mock_backend(mock.clone()).await;
    let api = spawn_api(&backend_url, ConfirmationStrategy::Remote).await;
    let http = reqwest::Client::new();

    let (mut editor, _) = connect_async(format!("ws://{api}/ws"))
        .await
        .expect("Failed to connect to WebSocket");
    match receive_event(&mut editor).await {
        PipelineEvent::Connected(payload) => assert_eq!(payload.overview.confirmed_count, 0),
        other => panic!("expected connected, got {}", other.event_name()),
    }

    // Generate
    let generated: SuggestionsResponse = http
        .post(format!("http://{api}/api/lessons/l1/suggestions"))
        .json(&json!({ "teacherResponses": ["Pacing felt rushed"] }))
        .send()
        .await
        .expect("request sent")
        .json()
        .await
        .expect("valid body");
    assert_eq!(generated.suggestions.len(), 1);
    assert_eq!(generated.suggestions[0].id, "s1");
    assert_eq!(receive_event(&mut editor).await.event_name(), "suggestions_generated");

    // Apply
    let opened: PreviewResponse = http
        .post(format!("http://{api}/api/suggestions/s1/apply"))
        .json(&json!({ "lesson": lesson_json() }))
        .send()
        .await
        .expect("request sent")
        .json()
        .await
        .expect("valid body");
    let preview_id = opened.preview.id.clone();
    assert_eq!(opened.preview.changes.len(), 2);
    assert!(opened.selection.is_empty());
    assert_eq!(receive_event(&mut editor).await.event_name(), "preview_ready");

    // Select e1 only
    let selection: Selection = http
        .post(format!("http://{api}/api/previews/{preview_id}/selection/toggle"))
        .json(&json!({ "changeId": "e1" }))
        .send()
        .await
        .expect("request sent")
        .json()
        .await
        .expect("valid body");
    assert_eq!(selection.selected_change_ids(), ["e1"]);

    // Confirm with the held selection
    let record: ConfirmedEnhancement = http
        .post(format!("http://{api}/api/previews/{preview_id}/confirm"))
        .json(&json!({ "lesson": lesson_json() }))
        .send()
        .await
        .expect("request sent")
        .json()
        .await
        .expect("valid body");
    assert_eq!(record.resulting_document.content, ENHANCED);
    assert_eq!(record.statistics.word_delta, 4);

    match receive_event(&mut editor).await {
        PipelineEvent::EnhancementConfirmed(confirmed) => {
            assert_eq!(confirmed.resulting_document.id, record.resulting_document.id);
            assert_eq!(confirmed.resulting_document.content, ENHANCED);
        }
        other => panic!("expected enhancement_confirmed, got {}", other.event_name()),
    }

    // The backend saw only the selected change and the bearer token.
    let confirms = mock.confirm_requests.lock().expect("lock poisoned").clone();
    assert_eq!(confirms.len(), 1);
    assert_eq!(confirms[0].selected_change_ids, ["e1"]);
    assert_eq!(confirms[0].original_lesson, BASE);
    assert!(mock
        .authorizations
        .lock()
        .expect("lock poisoned")
        .contains(&"Bearer secret-token".to_string()));

    // Report
    let markdown = http
        .get(format!(
            "http://{api}/api/enhancements/{preview_id}/report?format=markdown"
        ))
        .send()
        .await
        .expect("request sent")
        .text()
        .await
        .expect("valid body");
    assert!(markdown.contains("| Changes Applied | 1 of 2 |"));
    assert!(markdown.contains("## Declined Changes"));
}

#[tokio::test]
async fn backend_failures_map_to_bad_gateway() {
    let backend_url = spawn_mock_backend(MockBackend::default()).await;
    let api = spawn_api(&backend_url, ConfirmationStrategy::Local).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("http://{api}/api/lessons/broken/suggestions"))
        .json(&json!({}))
        .send()
        .await
        .expect("request sent");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    let error: ErrorResponse = response.json().await.expect("valid body");
    assert_eq!(error.kind, "generation_failure");
    assert!(error.error.contains("server"));

    let response = http
        .post(format!("http://{api}/api/lessons/locked/suggestions"))
        .json(&json!({}))
        .send()
        .await
        .expect("request sent");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    let error: ErrorResponse = response.json().await.expect("valid body");
    assert!(error.error.contains("authentication"));
}

#[tokio::test]
async fn unreachable_backend_is_a_network_failure() {
    // Nothing listens on the discard port.
    let api = spawn_api("http://127.0.0.1:9", ConfirmationStrategy::Local).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("http://{api}/api/lessons/l1/suggestions"))
        .json(&json!({}))
        .send()
        .await
        .expect("request sent");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    let error: ErrorResponse = response.json().await.expect("valid body");
    assert!(error.error.contains("network"));
}

#[tokio::test]
async fn unknown_preview_returns_not_found() {
    let backend_url = spawn_mock_backend(MockBackend::default()).await;
    let api = spawn_api(&backend_url, ConfirmationStrategy::Local).await;

    let response = reqwest::Client::new()
        .post(format!("http://{api}/api/previews/missing/confirm"))
        .json(&json!({ "lesson": lesson_json(), "changeIds": ["e1"] }))
        .send()
        .await
        .expect("request sent");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let error: ErrorResponse = response.json().await.expect("valid body");
    assert_eq!(error.kind, "not_found");
}

#[tokio::test]
async fn status_reports_connected_editors() {
    let backend_url = spawn_mock_backend(MockBackend::default()).await;
    let api = spawn_api(&backend_url, ConfirmationStrategy::Local).await;

    let (mut editor, _) = connect_async(format!("ws://{api}/ws"))
        .await
        .expect("Failed to connect to WebSocket");
    assert_eq!(receive_event(&mut editor).await.event_name(), "connected");

    let status: serde_json::Value = reqwest::get(format!("http://{api}/api/status"))
        .await
        .expect("request sent")
        .json()
        .await
        .expect("valid body");
    assert_eq!(status["connectedEditors"], 1);
    assert_eq!(status["overview"]["suggestionCount"], 0);
}
