//! HTTP API endpoints for the lesson-enhancement pipeline.
//!
//! This module exposes an [`EnhancementSession`] as a REST API for the
//! lesson-planning front end, plus the `/ws` editor event stream.
//!
//! # Endpoints
//!
//! - `POST /api/lessons/:lesson_id/suggestions` - Generate suggestions
//! - `GET /api/lessons/:lesson_id/suggestions` - List suggestions
//! - `POST /api/suggestions/:id/rating` - Rate a suggestion
//! - `POST /api/suggestions/:id/apply` - Expand a suggestion into a preview
//! - `GET /api/previews/:id` - Get a preview and its selection
//! - `DELETE /api/previews/:id` - Cancel a preview
//! - `POST /api/previews/:id/selection/toggle` - Toggle one change
//! - `POST /api/previews/:id/selection/select-all` - Select every change
//! - `POST /api/previews/:id/selection/deselect-all` - Clear the selection
//! - `POST /api/previews/:id/confirm` - Confirm the selection
//! - `GET /api/enhancements/:preview_id/report` - Audit report (`?format=markdown|json`)
//! - `GET /api/status` - Session overview
//! - `GET /ws` - Editor event stream
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lessonlift_pipeline::{create_router, AppState, Config, HttpCollaborator};
//!
//! # async fn example() -> lessonlift_pipeline::Result<()> {
//! let config = Config::default();
//! let collaborator = Arc::new(HttpCollaborator::new(&config.backend)?);
//! let router = create_router(AppState::new(collaborator, &config));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lessonlift_report::json::JsonGenerator;
use lessonlift_report::MarkdownGenerator;
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::collaborator::Collaborator;
use crate::config::Config;
use crate::events::{ws_handler, EventBroadcaster};
use crate::model::{ConfirmedEnhancement, LessonDocument, Preview, Rating, Suggestion};
use crate::selection::Selection;
use crate::session::{EnhancementSession, SessionOverview};
use crate::{ErrorKind, PipelineError};

// ============================================================================
// Request/Response Types
// ============================================================================

/// A lesson as sent by the front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonInput {
    /// Lesson identifier.
    pub id: String,
    /// Lesson title.
    #[serde(default)]
    pub title: String,
    /// Full lesson text.
    pub content: String,
}

impl From<LessonInput> for LessonDocument {
    fn from(input: LessonInput) -> Self {
        Self::new(input.id, input.title, input.content)
    }
}

/// Request body for suggestion generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateBody {
    /// Opaque framework analysis, forwarded to the backend.
    #[serde(default)]
    pub framework_analysis: serde_json::Value,
    /// The teacher's answers to reflection prompts.
    #[serde(default)]
    pub teacher_responses: Vec<String>,
}

/// Response body listing suggestions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionsResponse {
    /// Suggestions in generation order.
    pub suggestions: Vec<Suggestion>,
}

/// Request body for rating a suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateBody {
    /// The teacher's rating.
    pub rating: Rating,
}

/// Request body for applying a suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyBody {
    /// The lesson to enhance.
    pub lesson: LessonInput,
}

/// A preview together with its current selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResponse {
    /// The composed preview.
    pub preview: Preview,
    /// Changes the teacher intends to keep.
    pub selection: Selection,
}

/// Response body for a cancelled preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscardResponse {
    /// Whether the preview was dropped.
    pub discarded: bool,
    /// The dropped preview.
    pub preview_id: String,
}

/// Request body for toggling a change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleBody {
    /// The change to flip.
    pub change_id: String,
}

/// Request body for confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmBody {
    /// The lesson as the teacher currently has it.
    pub lesson: LessonInput,
    /// Explicit change ids; the held selection is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_ids: Option<Vec<String>>,
}

/// Rendering of the audit report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Structured JSON.
    #[default]
    Json,
    /// Human-readable Markdown.
    Markdown,
}

/// Query string for the report endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQuery {
    /// Requested rendering.
    #[serde(default)]
    pub format: ReportFormat,
}

/// Response body for the status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Session counters.
    pub overview: SessionOverview,
    /// Connected editors.
    pub connected_editors: usize,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
    /// Error category.
    pub kind: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The pipeline session driven by every handler.
    pub session: Arc<EnhancementSession>,
    /// Fan-out of pipeline events to connected editors.
    pub broadcaster: EventBroadcaster,
}

impl AppState {
    /// Creates state whose session publishes to a fresh broadcaster.
    #[must_use]
    pub fn new(collaborator: Arc<dyn Collaborator>, config: &Config) -> Self {
        let broadcaster = EventBroadcaster::new(config.event_capacity);
        let session =
            EnhancementSession::new(collaborator, config).with_events(broadcaster.clone());
        Self {
            session: Arc::new(session),
            broadcaster,
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Pipeline errors rendered as HTTP responses.
#[derive(Debug)]
pub struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        Self(error)
    }
}

/// Maps an error category to its HTTP status.
#[must_use]
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict | ErrorKind::Busy => StatusCode::CONFLICT,
        ErrorKind::GenerationFailure => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            warn!(error = %self.0, %kind, "Request failed");
        } else {
            info!(error = %self.0, %kind, "Request rejected");
        }

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
            kind: kind.to_string(),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router carries:
/// - All API routes under `/api`
/// - The editor event stream at `/ws`
/// - CORS middleware for development
/// - Tracing middleware for request logging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/lessons/:lesson_id/suggestions",
            post(handle_generate).get(handle_list_suggestions),
        )
        .route("/suggestions/:id/rating", post(handle_rate))
        .route("/suggestions/:id/apply", post(handle_apply))
        .route(
            "/previews/:id",
            get(handle_get_preview).delete(handle_discard),
        )
        .route("/previews/:id/selection/toggle", post(handle_toggle))
        .route("/previews/:id/selection/select-all", post(handle_select_all))
        .route(
            "/previews/:id/selection/deselect-all",
            post(handle_deselect_all),
        )
        .route("/previews/:id/confirm", post(handle_confirm))
        .route("/enhancements/:preview_id/report", get(handle_report))
        .route("/status", get(handle_status));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `POST /api/lessons/:lesson_id/suggestions`.
async fn handle_generate(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<String>,
    Json(body): Json<GenerateBody>,
) -> ApiResult<Json<SuggestionsResponse>> {
    info!(%lesson_id, responses = body.teacher_responses.len(), "Generate request");
    let suggestions = state
        .session
        .generate(&lesson_id, body.framework_analysis, body.teacher_responses)
        .await?;
    Ok(Json(SuggestionsResponse { suggestions }))
}

/// Handler for `GET /api/lessons/:lesson_id/suggestions`.
async fn handle_list_suggestions(
    State(state): State<Arc<AppState>>,
    Path(lesson_id): Path<String>,
) -> Json<SuggestionsResponse> {
    Json(SuggestionsResponse {
        suggestions: state.session.suggestions(&lesson_id),
    })
}

/// Handler for `POST /api/suggestions/:id/rating`.
async fn handle_rate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<RateBody>,
) -> ApiResult<Json<Suggestion>> {
    info!(suggestion_id = %id, rating = %body.rating, "Rating request");
    Ok(Json(state.session.rate(&id, body.rating).await?))
}

/// Handler for `POST /api/suggestions/:id/apply`.
async fn handle_apply(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ApplyBody>,
) -> ApiResult<Json<PreviewResponse>> {
    let lesson = LessonDocument::from(body.lesson);
    let (preview, selection) = state.session.apply(&id, &lesson).await?;
    Ok(Json(PreviewResponse { preview, selection }))
}

/// Handler for `GET /api/previews/:id`.
async fn handle_get_preview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<PreviewResponse>> {
    Ok(Json(PreviewResponse {
        preview: state.session.preview(&id)?,
        selection: state.session.selection(&id)?,
    }))
}

/// Handler for `DELETE /api/previews/:id`.
async fn handle_discard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<DiscardResponse>> {
    let preview = state.session.discard(&id)?;
    Ok(Json(DiscardResponse {
        discarded: true,
        preview_id: preview.id,
    }))
}

/// Handler for `POST /api/previews/:id/selection/toggle`.
async fn handle_toggle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ToggleBody>,
) -> ApiResult<Json<Selection>> {
    Ok(Json(state.session.toggle(&id, &body.change_id)?))
}

/// Handler for `POST /api/previews/:id/selection/select-all`.
async fn handle_select_all(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Selection>> {
    Ok(Json(state.session.select_all(&id)?))
}

/// Handler for `POST /api/previews/:id/selection/deselect-all`.
async fn handle_deselect_all(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Selection>> {
    Ok(Json(state.session.deselect_all(&id)?))
}

/// Handler for `POST /api/previews/:id/confirm`.
async fn handle_confirm(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ConfirmBody>,
) -> ApiResult<Json<ConfirmedEnhancement>> {
    let lesson = LessonDocument::from(body.lesson);
    Ok(Json(
        state.session.confirm(&id, &lesson, body.change_ids).await?,
    ))
}

/// Handler for `GET /api/enhancements/:preview_id/report`.
async fn handle_report(
    State(state): State<Arc<AppState>>,
    Path(preview_id): Path<String>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Response> {
    let report = state.session.report(&preview_id)?;
    let response = match query.format {
        ReportFormat::Json => {
            let value = JsonGenerator::new(&report)
                .generate_value()
                .map_err(PipelineError::from)?;
            Json(value).into_response()
        }
        ReportFormat::Markdown => (
            [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
            MarkdownGenerator::new(&report).generate(),
        )
            .into_response(),
    };
    Ok(response)
}

/// Handler for `GET /api/status`.
async fn handle_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        overview: state.session.overview(),
        connected_editors: state.broadcaster.receiver_count(),
    })
}

// ============================================================================
// Tests
// ============================================================================
