//! Error types for the lesson-enhancement pipeline.
//!
//! This module defines the error hierarchy for all pipeline operations,
//! including configuration loading, local validation, collaborator calls,
//! stale previews, and duplicate in-flight requests.

use std::path::PathBuf;

/// A specialized `Result` type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while generating, previewing, or confirming enhancements.
///
/// Variants are organized by subsystem. The [`PipelineError::kind`] classifier
/// maps each variant onto the user-facing taxonomy so callers can tell
/// "try again" apart from "this is permanently invalid".
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your lessonlift.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Local Validation Errors
    // ========================================================================
    /// Malformed or missing local input. Never reaches the collaborator.
    #[error("Validation failed: {message}")]
    Validation {
        /// What was wrong with the input.
        message: String,
    },

    /// A rating would move a suggestion backwards or skip a step.
    #[error("Invalid rating: cannot go from {from} to {to}")]
    InvalidRating {
        /// The current feedback state.
        from: String,
        /// The rejected rating.
        to: String,
    },

    // ========================================================================
    // Lookup Errors
    // ========================================================================
    /// A suggestion, preview, or confirmation id is unknown.
    #[error("{entity} not found: '{id}'")]
    NotFound {
        /// The kind of entity that was looked up.
        entity: &'static str,
        /// The id that was not found.
        id: String,
    },

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    /// The AI collaborator failed, timed out, or returned an unusable response.
    #[error("Generation failed during {operation} ({kind}): {message}\n\nSuggestion: {suggestion}")]
    GenerationFailure {
        /// The collaborator operation that failed (e.g. "applySuggestion").
        operation: String,
        /// The category of failure.
        kind: BackendErrorKind,
        /// Detailed error message.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Consistency Errors
    // ========================================================================
    /// The preview no longer matches the document, or was already consumed.
    #[error("Conflict: {message}\n\nSuggestion: Regenerate the preview and try again")]
    Conflict {
        /// Why the request conflicts with current state.
        message: String,
    },

    /// Another request for the same key is still pending.
    #[error("A {operation} request for '{key}' is already in progress")]
    Busy {
        /// The guarded operation (e.g. "generate").
        operation: &'static str,
        /// The single-flight key.
        key: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Building or rendering an enhancement report failed.
    #[error("Report error: {0}")]
    Report(#[from] lessonlift_report::ReportError),
}

/// Categories of collaborator failures for structured error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// Authentication failure (invalid API key, expired credentials).
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// The call did not complete within the configured timeout.
    Timeout,
    /// The response could not be decoded or violated the contract.
    InvalidResponse,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::InvalidResponse => write!(f, "invalid_response"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl BackendErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check the backend API key configured in lessonlift.json",
            Self::RateLimit => "Wait a moment and retry",
            Self::Server => "Retry later; the suggestion service may be experiencing issues",
            Self::Network => "Check your network connection and the backend URL",
            Self::Timeout => "Retry, or raise backend.requestTimeoutSecs",
            Self::InvalidResponse => "Retry; if this persists the backend contract may have changed",
            Self::Other => "Retry the request",
        }
    }
}

/// User-facing classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input was rejected locally; fix it and resubmit.
    Validation,
    /// The referenced entity does not exist.
    NotFound,
    /// The collaborator failed; a retry may succeed.
    GenerationFailure,
    /// The preview is stale or already consumed; regenerate it.
    Conflict,
    /// The same request is already pending.
    Busy,
    /// Configuration or I/O failure.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::NotFound => write!(f, "not_found"),
            Self::GenerationFailure => write!(f, "generation_failure"),
            Self::Conflict => write!(f, "conflict"),
            Self::Busy => write!(f, "busy"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl PipelineError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRating` error.
    #[must_use]
    pub fn invalid_rating(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidRating {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates a new `GenerationFailure` with automatic suggestion based on error kind.
    #[must_use]
    pub fn generation(
        operation: impl Into<String>,
        kind: BackendErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::GenerationFailure {
            operation: operation.into(),
            kind,
            message: message.into(),
            suggestion: kind.suggestion().to_string(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `Busy` error.
    #[must_use]
    pub fn busy(operation: &'static str, key: impl Into<String>) -> Self {
        Self::Busy {
            operation,
            key: key.into(),
        }
    }

    /// Classifies this error into the user-facing taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::InvalidRating { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::GenerationFailure { .. } => ErrorKind::GenerationFailure,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Busy { .. } => ErrorKind::Busy,
            Self::ConfigParseError { .. }
            | Self::ConfigValidationError { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Report(_) => ErrorKind::Internal,
        }
    }

    /// Returns `true` if this error is transient and the call may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::GenerationFailure {
                kind: BackendErrorKind::RateLimit
                    | BackendErrorKind::Server
                    | BackendErrorKind::Network
                    | BackendErrorKind::Timeout,
                ..
            }
        )
    }

    /// Returns the short message surfaced inline to the teacher.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Validation => "Please check your input and try again.",
            ErrorKind::NotFound => "This item no longer exists.",
            ErrorKind::GenerationFailure => {
                "The suggestion service did not respond. Please try again."
            }
            ErrorKind::Conflict => {
                "The lesson changed since this preview was built. Please regenerate the preview."
            }
            ErrorKind::Busy => "This request is already being processed.",
            ErrorKind::Internal => "An unexpected error occurred.",
        }
    }
}
