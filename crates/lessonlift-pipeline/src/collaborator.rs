//! Boundary to the AI suggestion backend.
//!
//! The pipeline talks to the backend through the [`Collaborator`] trait.
//! [`HttpCollaborator`] is the production implementation; every call goes
//! through a [`CallPolicy`] that bounds it with a timeout and optionally
//! retries transient failures with exponential backoff.

use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{BackendConfig, Config, RetryConfig};
use crate::error::BackendErrorKind;
use crate::model::{ChangeLocation, ChangeType, FrameworkPrinciple, Impact, Rating, Suggestion};
use crate::{PipelineError, Result};

// ============================================================================
// Wire Types
// ============================================================================

/// Request body for `generateSuggestions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// The lesson to analyse.
    pub lesson_id: String,
    /// Framework analysis produced upstream; passed through opaquely.
    #[serde(default)]
    pub framework_analysis: serde_json::Value,
    /// Teacher answers to the reflection questions.
    #[serde(default)]
    pub teacher_responses: Vec<String>,
}

/// A suggestion as returned by the backend, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSuggestion {
    /// Backend-assigned id, if any.
    #[serde(default)]
    pub id: Option<String>,
    /// The pedagogical dimension.
    #[serde(default)]
    pub framework_principle: FrameworkPrinciple,
    /// Optional sub-topic.
    #[serde(default)]
    pub element: Option<String>,
    /// The recommendation text.
    #[serde(default)]
    pub suggestion_text: String,
    /// Why it helps.
    #[serde(default)]
    pub rationale: String,
    /// How to put it into practice.
    #[serde(default)]
    pub implementation_hint: String,
}

/// Response body for `generateSuggestions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Suggestions in backend order. Empty when nothing needs improving.
    #[serde(default)]
    pub suggestions: Vec<RawSuggestion>,
}

/// Request body for `rateSuggestion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRequest {
    /// The rated suggestion.
    pub suggestion_id: String,
    /// The submitted rating.
    pub rating: Rating,
}

/// Response body for `rateSuggestion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateResponse {
    /// `true` when the backend recorded the rating.
    pub ack: bool,
}

/// Request body for `applySuggestion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    /// The lesson being enhanced.
    pub lesson_id: String,
    /// The suggestion to expand.
    pub suggestion_id: String,
    /// Lesson content snapshot.
    pub original_lesson: String,
    /// The full suggestion record.
    pub suggestion: Suggestion,
}

/// A change as returned by the backend, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEnhancement {
    /// Backend-assigned id, if any.
    #[serde(default)]
    pub id: Option<String>,
    /// Originating suggestion, if reported.
    #[serde(default)]
    pub suggestion_id: Option<String>,
    /// Declared change type, if any.
    #[serde(default, rename = "type")]
    pub change_type: Option<ChangeType>,
    /// Positional hint, if any.
    #[serde(default)]
    pub location: Option<ChangeLocation>,
    /// Text being replaced.
    #[serde(default)]
    pub original_text: String,
    /// Replacement text.
    #[serde(default)]
    pub enhanced_text: String,
    /// Why the change helps.
    #[serde(default)]
    pub rationale: String,
    /// Declared impact, if any.
    #[serde(default)]
    pub impact: Option<Impact>,
}

/// Response body for `applySuggestion`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    /// Proposed changes, in backend order.
    #[serde(default)]
    pub enhancements: Vec<RawEnhancement>,
    /// The merged document, when the backend produced one.
    #[serde(default)]
    pub preview_lesson: Option<String>,
}

/// Request body for `confirmEnhancement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    /// The preview being confirmed.
    pub preview_id: String,
    /// The lesson the preview belongs to.
    pub lesson_id: String,
    /// Changes to apply, in preview order.
    pub selected_change_ids: Vec<String>,
    /// Base content of the preview.
    pub original_lesson: String,
}

/// Response body for `confirmEnhancement`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    /// The composed lesson text.
    pub enhanced_lesson: String,
    /// Statistics as reported by the backend. Word counts are recomputed locally.
    #[serde(default)]
    pub statistics: Option<serde_json::Value>,
}

// ============================================================================
// Collaborator Trait
// ============================================================================

/// The AI backend contract.
pub trait Collaborator: Send + Sync + std::fmt::Debug {
    /// Generates suggestions for a lesson.
    fn generate_suggestions(&self, request: GenerateRequest)
        -> BoxFuture<'_, Result<GenerateResponse>>;

    /// Records a rating.
    fn rate_suggestion(&self, request: RateRequest) -> BoxFuture<'_, Result<RateResponse>>;

    /// Expands a suggestion into concrete changes.
    fn apply_suggestion(&self, request: ApplyRequest) -> BoxFuture<'_, Result<ApplyResponse>>;

    /// Composes the confirmed selection remotely.
    fn confirm_enhancement(&self, request: ConfirmRequest)
        -> BoxFuture<'_, Result<ConfirmResponse>>;
}

// ============================================================================
// Call Policy
// ============================================================================

/// Timeout and retry budget applied to every collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    /// Upper bound on a single attempt.
    pub timeout: Duration,
    /// Retry budget for transient failures.
    pub retry: RetryConfig,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl CallPolicy {
    /// Builds the policy from configuration.
    #[must_use]
    pub const fn from_config(config: &Config) -> Self {
        Self {
            timeout: config.backend.request_timeout(),
            retry: config.retry,
        }
    }

    /// Runs `call` under the timeout, retrying transient failures.
    ///
    /// A timed-out attempt surfaces as [`BackendErrorKind::Timeout`].
    /// Non-transient failures are returned immediately.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let outcome = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::generation(
                    operation,
                    BackendErrorKind::Timeout,
                    format!("no response within {} ms", self.timeout.as_millis()),
                )),
            };

            match outcome {
                Err(e) if e.is_transient() && attempt < attempts => {
                    let backoff = self.retry.backoff_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Collaborator call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

// ============================================================================
// HTTP Collaborator
// ============================================================================

/// JSON-over-HTTP client for the AI backend.
#[derive(Debug, Clone)]
pub struct HttpCollaborator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCollaborator {
    /// Creates a client from backend configuration.
    ///
    /// The bearer token is read from the environment variable named by
    /// `api_key_env`. A configured but unset variable is logged and the
    /// client proceeds without a token.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let api_key = config.api_key_env.as_deref().and_then(|var| {
            let value = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
            if value.is_none() {
                warn!(env_var = var, "Backend API key variable is not set");
            }
            value
        });

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                PipelineError::config_validation(
                    format!("failed to create HTTP client: {e}"),
                    "Check the backend settings in lessonlift.json",
                )
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Returns the base URL endpoints are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<Req, Resp>(&self, operation: &'static str, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        debug!(operation, url = %url, "Calling collaborator");

        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(operation, &e))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(PipelineError::generation(
                operation,
                classify_status(status),
                format!("HTTP {status}: {}", detail.trim()),
            ));
        }

        response.json::<Resp>().await.map_err(|e| {
            PipelineError::generation(
                operation,
                BackendErrorKind::InvalidResponse,
                format!("could not decode response: {e}"),
            )
        })
    }
}

impl Collaborator for HttpCollaborator {
    fn generate_suggestions(
        &self,
        request: GenerateRequest,
    ) -> BoxFuture<'_, Result<GenerateResponse>> {
        Box::pin(async move {
            self.post("generateSuggestions", "/suggestions/generate", &request)
                .await
        })
    }

    fn rate_suggestion(&self, request: RateRequest) -> BoxFuture<'_, Result<RateResponse>> {
        Box::pin(async move { self.post("rateSuggestion", "/suggestions/rate", &request).await })
    }

    fn apply_suggestion(&self, request: ApplyRequest) -> BoxFuture<'_, Result<ApplyResponse>> {
        Box::pin(async move { self.post("applySuggestion", "/suggestions/apply", &request).await })
    }

    fn confirm_enhancement(
        &self,
        request: ConfirmRequest,
    ) -> BoxFuture<'_, Result<ConfirmResponse>> {
        Box::pin(async move {
            self.post("confirmEnhancement", "/enhancements/confirm", &request)
                .await
        })
    }
}

/// Maps a non-success HTTP status to a failure category.
#[must_use]
pub fn classify_status(status: StatusCode) -> BackendErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendErrorKind::Authentication,
        StatusCode::TOO_MANY_REQUESTS => BackendErrorKind::RateLimit,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => BackendErrorKind::Timeout,
        s if s.is_server_error() => BackendErrorKind::Server,
        _ => BackendErrorKind::Other,
    }
}

fn transport_error(operation: &'static str, error: &reqwest::Error) -> PipelineError {
    let kind = if error.is_timeout() {
        BackendErrorKind::Timeout
    } else if error.is_decode() {
        BackendErrorKind::InvalidResponse
    } else {
        BackendErrorKind::Network
    };
    PipelineError::generation(operation, kind, error.to_string())
}

// ============================================================================
// Test Double
// ============================================================================


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy(max_attempts: u32) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_millis(50),
            retry: RetryConfig {
                max_attempts,
                initial_backoff_ms: 1,
                max_backoff_ms: 4,
            },
        }
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            BackendErrorKind::Authentication
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN),
            BackendErrorKind::Authentication
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            BackendErrorKind::RateLimit
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            BackendErrorKind::Server
        );
        assert_eq!(
            classify_status(StatusCode::BAD_REQUEST),
            BackendErrorKind::Other
        );
    }

    #[test]
    fn test_default_policy_does_not_retry() {
        let policy = CallPolicy::default();
        assert_eq!(policy.retry.max_attempts, 1);
        assert_eq!(policy.timeout, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_policy_times_out_slow_calls() {
        let err = fast_policy(1)
            .run("applySuggestion", || async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok::<_, PipelineError>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::GenerationFailure {
                kind: BackendErrorKind::Timeout,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_policy_retries_transient_failures() {
        let attempts = AtomicU32::new(0);
        let result = fast_policy(3)
            .run("generateSuggestions", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(PipelineError::generation(
                            "generateSuggestions",
                            BackendErrorKind::Server,
                            "502",
                        ))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_policy_does_not_retry_permanent_failures() {
        let attempts = AtomicU32::new(0);
        let err = fast_policy(3)
            .run("rateSuggestion", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(PipelineError::generation(
                        "rateSuggestion",
                        BackendErrorKind::Authentication,
                        "401",
                    ))
                }
            })
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_http_collaborator_trims_base_url() {
        let config = BackendConfig {
            base_url: "http://localhost:9000/api/".to_string(),
            api_key_env: Some("LESSONLIFT_TEST_UNSET_KEY".to_string()),
            request_timeout_secs: 5,
        };
        let client = HttpCollaborator::new(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9000/api");
    }

    #[tokio::test]
    async fn test_http_collaborator_unreachable_backend_is_network_error() {
        let config = BackendConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key_env: None,
            request_timeout_secs: 5,
        };
        let client = HttpCollaborator::new(&config).unwrap();
        let err = client
            .generate_suggestions(GenerateRequest {
                lesson_id: "l1".to_string(),
                framework_analysis: serde_json::Value::Null,
                teacher_responses: vec![],
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::GenerationFailure {
                kind: BackendErrorKind::Network,
                ..
            }
        ));
    }

    #[test]
    fn test_apply_response_accepts_sparse_changes() {
        let json = r#"{
            "enhancements": [
                {"originalText": "Activity.", "enhancedText": "Activity. Quick check."}
            ]
        }"#;
        let response: ApplyResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.enhancements.len(), 1);
        assert!(response.enhancements[0].id.is_none());
        assert!(response.enhancements[0].change_type.is_none());
        assert!(response.preview_lesson.is_none());
    }
}
