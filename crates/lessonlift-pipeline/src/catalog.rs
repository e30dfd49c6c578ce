//! Generated suggestions and their feedback state.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::collaborator::{CallPolicy, Collaborator, GenerateRequest, RateRequest, RawSuggestion};
use crate::composer::normalize_whitespace;
use crate::error::BackendErrorKind;
use crate::flight::{RequestState, SingleFlight};
use crate::model::{FeedbackState, Rating, Suggestion};
use crate::{PipelineError, Result};

#[derive(Debug, Clone)]
struct Entry {
    lesson_id: String,
    suggestion: Suggestion,
}

/// Holds generated suggestions per lesson, in generation order.
///
/// Suggestions are never deleted. Rating is the only mutation.
#[derive(Debug)]
pub struct SuggestionCatalog {
    collaborator: Arc<dyn Collaborator>,
    policy: CallPolicy,
    entries: Mutex<IndexMap<String, Entry>>,
    flight: SingleFlight<String>,
}

impl SuggestionCatalog {
    /// Creates an empty catalog backed by `collaborator`.
    #[must_use]
    pub fn new(collaborator: Arc<dyn Collaborator>, policy: CallPolicy) -> Self {
        Self {
            collaborator,
            policy,
            entries: Mutex::new(IndexMap::new()),
            flight: SingleFlight::new("generate"),
        }
    }

    /// Requests suggestions for a lesson and appends them to the catalog.
    ///
    /// Returns only the suggestions added by this call, in collaborator
    /// order. An empty list means nothing needs improving. Suggestions whose
    /// text matches one the teacher already rated unhelpful are skipped.
    #[instrument(skip(self, framework_analysis, teacher_responses), fields(responses = teacher_responses.len()))]
    pub async fn generate(
        &self,
        lesson_id: &str,
        framework_analysis: serde_json::Value,
        teacher_responses: Vec<String>,
    ) -> Result<Vec<Suggestion>> {
        if lesson_id.trim().is_empty() {
            return Err(PipelineError::validation("lesson id is required"));
        }

        let guard = self.flight.begin(lesson_id.to_string())?;
        let request = GenerateRequest {
            lesson_id: lesson_id.to_string(),
            framework_analysis,
            teacher_responses,
        };
        let response = self
            .policy
            .run("generateSuggestions", || {
                self.collaborator.generate_suggestions(request.clone())
            })
            .await?;

        let added = self.store(lesson_id, response.suggestions);
        guard.succeed();

        info!(lesson_id, count = added.len(), "Suggestions generated");
        Ok(added)
    }

    fn store(&self, lesson_id: &str, raw: Vec<RawSuggestion>) -> Vec<Suggestion> {
        let mut entries = self.lock();
        let dismissed: HashSet<String> = entries
            .values()
            .filter(|e| e.lesson_id == lesson_id)
            .filter(|e| e.suggestion.feedback_state == FeedbackState::Unhelpful)
            .map(|e| normalize_whitespace(&e.suggestion.suggestion_text))
            .collect();

        let mut added = Vec::new();
        for item in raw {
            if item.suggestion_text.trim().is_empty() {
                debug!(lesson_id, "Skipping suggestion with no text");
                continue;
            }
            if dismissed.contains(&normalize_whitespace(&item.suggestion_text)) {
                debug!(lesson_id, "Skipping suggestion previously rated unhelpful");
                continue;
            }

            let id = item
                .id
                .filter(|id| !id.trim().is_empty() && !entries.contains_key(id))
                .unwrap_or_else(|| format!("sugg-{}", Uuid::new_v4()));

            let suggestion = Suggestion {
                id: id.clone(),
                framework_principle: item.framework_principle,
                element: item.element.filter(|e| !e.trim().is_empty()),
                suggestion_text: item.suggestion_text,
                rationale: item.rationale,
                implementation_hint: item.implementation_hint,
                feedback_state: FeedbackState::Unrated,
            };
            entries.insert(
                id,
                Entry {
                    lesson_id: lesson_id.to_string(),
                    suggestion: suggestion.clone(),
                },
            );
            added.push(suggestion);
        }
        added
    }

    /// Applies a rating.
    ///
    /// Re-rating with the current value is a no-op and does not reach the
    /// collaborator. A permitted transition is recorded with the collaborator
    /// before it is committed locally.
    #[instrument(skip(self))]
    pub async fn rate(&self, suggestion_id: &str, rating: Rating) -> Result<Suggestion> {
        let current = self.get(suggestion_id)?;
        if current.feedback_state == rating.target_state() {
            return Ok(current);
        }
        if !current.feedback_state.accepts(rating) {
            return Err(PipelineError::invalid_rating(current.feedback_state, rating));
        }

        let request = RateRequest {
            suggestion_id: suggestion_id.to_string(),
            rating,
        };
        let response = self
            .policy
            .run("rateSuggestion", || {
                self.collaborator.rate_suggestion(request.clone())
            })
            .await?;
        if !response.ack {
            return Err(PipelineError::generation(
                "rateSuggestion",
                BackendErrorKind::InvalidResponse,
                "backend did not acknowledge the rating",
            ));
        }

        let mut entries = self.lock();
        let entry = entries
            .get_mut(suggestion_id)
            .ok_or_else(|| PipelineError::not_found("suggestion", suggestion_id))?;
        let from = entry.suggestion.feedback_state;
        if from != rating.target_state() {
            if !from.accepts(rating) {
                return Err(PipelineError::invalid_rating(from, rating));
            }
            entry.suggestion.feedback_state = rating.target_state();
        }

        info!(suggestion_id, %from, to = %rating, "Suggestion rated");
        Ok(entry.suggestion.clone())
    }

    /// Returns a suggestion by id.
    pub fn get(&self, suggestion_id: &str) -> Result<Suggestion> {
        self.lock()
            .get(suggestion_id)
            .map(|e| e.suggestion.clone())
            .ok_or_else(|| PipelineError::not_found("suggestion", suggestion_id))
    }

    /// Returns every suggestion generated for a lesson, in generation order.
    #[must_use]
    pub fn list(&self, lesson_id: &str) -> Vec<Suggestion> {
        self.lock()
            .values()
            .filter(|e| e.lesson_id == lesson_id)
            .map(|e| e.suggestion.clone())
            .collect()
    }

    /// Total number of suggestions held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when no suggestions have been generated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Request state of generation for a lesson.
    #[must_use]
    pub fn generation_state(&self, lesson_id: &str) -> RequestState {
        self.flight.state(&lesson_id.to_string())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
