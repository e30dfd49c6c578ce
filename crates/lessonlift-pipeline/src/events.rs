//! Editor event stream over WebSocket.
//!
//! The lesson editor connects to `/ws` and receives pipeline events as they
//! happen. `enhancement_confirmed` carries the resulting document; it is the
//! editor's signal to swap in the new lesson.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes a session overview
//! - `suggestions_generated` - Generation finished for a lesson
//! - `preview_ready` - A suggestion was expanded into a preview
//! - `preview_discarded` - A preview was cancelled
//! - `enhancement_confirmed` - A selection was confirmed into a new document
//! - `error` - A pipeline operation failed
//!
//! # Example
//!
//! ```no_run
//! use lessonlift_pipeline::events::{EventBroadcaster, PipelineEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(PipelineEvent::error("generate", "backend unavailable"));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {}", event.event_name());
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::confirmation::LessonEditor;
use crate::model::{ConfirmedEnhancement, Preview};
use crate::session::SessionOverview;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// Current session counters.
    pub overview: SessionOverview,
}

/// Payload for the `suggestions_generated` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionsGeneratedPayload {
    /// The lesson suggestions were generated for.
    pub lesson_id: String,
    /// Ids of the suggestions added by this generation.
    pub suggestion_ids: Vec<String>,
}

/// Payload for the `preview_ready` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewReadyPayload {
    /// The new preview.
    pub preview_id: String,
    /// The lesson it was built from.
    pub lesson_id: String,
    /// The suggestion that was expanded.
    pub suggestion_id: String,
    /// Number of proposed changes.
    pub change_count: usize,
}

/// Payload for the `preview_discarded` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewDiscardedPayload {
    /// The cancelled preview.
    pub preview_id: String,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// The operation that failed.
    pub operation: String,
    /// Human-readable error message.
    pub message: String,
    /// When the failure happened.
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Events pushed to connected editors.
///
/// Serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// Sent when generation completes.
    SuggestionsGenerated(SuggestionsGeneratedPayload),
    /// Sent when a preview is composed.
    PreviewReady(PreviewReadyPayload),
    /// Sent when a preview is cancelled.
    PreviewDiscarded(PreviewDiscardedPayload),
    /// Sent when a selection is confirmed.
    EnhancementConfirmed(Box<ConfirmedEnhancement>),
    /// Sent when an operation fails.
    Error(ErrorPayload),
}

impl PipelineEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(overview: SessionOverview) -> Self {
        Self::Connected(ConnectedPayload { overview })
    }

    /// Creates a `SuggestionsGenerated` event.
    #[must_use]
    pub fn suggestions_generated(lesson_id: impl Into<String>, suggestion_ids: Vec<String>) -> Self {
        Self::SuggestionsGenerated(SuggestionsGeneratedPayload {
            lesson_id: lesson_id.into(),
            suggestion_ids,
        })
    }

    /// Creates a `PreviewReady` event from a preview.
    #[must_use]
    pub fn preview_ready(preview: &Preview) -> Self {
        Self::PreviewReady(PreviewReadyPayload {
            preview_id: preview.id.clone(),
            lesson_id: preview.lesson_id.clone(),
            suggestion_id: preview.suggestion_id.clone(),
            change_count: preview.changes.len(),
        })
    }

    /// Creates a `PreviewDiscarded` event.
    #[must_use]
    pub fn preview_discarded(preview_id: impl Into<String>) -> Self {
        Self::PreviewDiscarded(PreviewDiscardedPayload {
            preview_id: preview_id.into(),
        })
    }

    /// Creates an `EnhancementConfirmed` event.
    #[must_use]
    pub fn enhancement_confirmed(enhancement: ConfirmedEnhancement) -> Self {
        Self::EnhancementConfirmed(Box::new(enhancement))
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            operation: operation.into(),
            message: message.into(),
            timestamp: Utc::now(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::SuggestionsGenerated(_) => "suggestions_generated",
            Self::PreviewReady(_) => "preview_ready",
            Self::PreviewDiscarded(_) => "preview_discarded",
            Self::EnhancementConfirmed(_) => "enhancement_confirmed",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts pipeline events to all connected WebSocket clients.
///
/// Events are not persisted for disconnected clients.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster with the given per-subscriber buffer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls behind receives a `Lagged` error and misses events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event and returns the number of receivers.
    pub fn send(&self, event: PipelineEvent) -> usize {
        // Err only means nobody is listening.
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

impl LessonEditor for EventBroadcaster {
    fn document_enhanced(&self, enhancement: &ConfirmedEnhancement) {
        let receivers = self.send(PipelineEvent::enhancement_confirmed(enhancement.clone()));
        debug!(
            preview_id = %enhancement.preview_id,
            receivers,
            "Notified editors of confirmed enhancement"
        );
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("New editor connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handles a single editor connection.
///
/// Sends `connected` immediately, then forwards every broadcast event.
/// Pings every 30 seconds and closes after 3 unanswered pings.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before sending `connected` so nothing falls in between.
    let mut event_receiver = state.broadcaster.subscribe();

    let connected = PipelineEvent::connected(state.session.overview());
    let connected_json = match serde_json::to_string(&connected) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize connected event: {}", e);
            return;
        }
    };

    if sender.send(Message::Text(connected_json)).await.is_err() {
        debug!("Client disconnected before receiving connected event");
        return;
    }

    info!("Editor connected");

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut missed_pongs = 0u8;

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                        debug!("Received pong from client");
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client requested close");
                        break;
                    }
                    Some(Ok(Message::Text(_) | Message::Binary(_))) => {
                        debug!("Ignoring client message");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            debug!("Failed to send pong, client disconnected");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }

            event = event_receiver.recv() => {
                match event {
                    Ok(event) => {
                        let json = match serde_json::to_string(&event) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize event: {}", e);
                                continue;
                            }
                        };

                        if sender.send(Message::Text(json)).await.is_err() {
                            debug!("Failed to send event, client disconnected");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client lagged, missed {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Broadcaster closed");
                        break;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    debug!("Failed to send ping, client disconnected");
                    break;
                }
                missed_pongs += 1;
                if missed_pongs >= MAX_MISSED_PONGS {
                    info!("Client missed {} pongs, closing connection", MAX_MISSED_PONGS);
                    break;
                }
            }
        }
    }

    info!("Editor disconnected");
}
