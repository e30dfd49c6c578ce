//! LessonLift Enhancement Pipeline
//!
//! Generates improvement suggestions for a lesson, expands a chosen
//! suggestion into concrete changes, composes a previewable document from a
//! selectable subset of them and confirms the selection into a new lesson.
//! The pipeline is served over HTTP with a WebSocket event stream for the
//! lesson editor.

pub mod api;
pub mod catalog;
pub mod collaborator;
pub mod composer;
pub mod config;
pub mod confirmation;
pub mod error;
pub mod events;
pub mod expander;
pub mod flight;
pub mod model;
pub mod selection;
pub mod session;

pub use api::{create_router, status_for, ApiError, AppState, ErrorResponse, ReportFormat};
pub use catalog::SuggestionCatalog;
pub use collaborator::{CallPolicy, Collaborator, HttpCollaborator};
pub use composer::{compose, render, resolve, Composition, EnhancementPayload};
pub use config::{BackendConfig, Config, ConfirmationStrategy, RetryConfig};
pub use confirmation::{ConfirmationCoordinator, LessonEditor};
pub use error::{BackendErrorKind, ErrorKind, PipelineError, Result};
pub use events::{EventBroadcaster, PipelineEvent};
pub use expander::EnhancementExpander;
pub use flight::{RequestState, SingleFlight};
pub use model::{
    fingerprint, word_count, ChangeLocation, ChangeType, CompositionMode, ConfirmationStatistics,
    ConfirmedEnhancement, Enhancement, FeedbackState, FrameworkPrinciple, Impact, LessonDocument,
    Placement, Preview, PreviewStatistics, Rating, Suggestion,
};
pub use selection::Selection;
pub use session::{EnhancementSession, SessionOverview};
