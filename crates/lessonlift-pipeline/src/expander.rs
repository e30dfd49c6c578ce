//! Expansion of a suggestion into a previewable set of changes.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::collaborator::{ApplyRequest, CallPolicy, Collaborator, RawEnhancement};
use crate::composer::{compose, resolve, EnhancementPayload};
use crate::flight::{RequestState, SingleFlight};
use crate::model::{ChangeType, CompositionMode, Enhancement, LessonDocument, Preview, Suggestion};
use crate::{PipelineError, Result};

/// Turns one suggestion into a [`Preview`].
#[derive(Debug)]
pub struct EnhancementExpander {
    collaborator: Arc<dyn Collaborator>,
    policy: CallPolicy,
    flight: SingleFlight<String>,
}

impl EnhancementExpander {
    /// Creates an expander backed by `collaborator`.
    #[must_use]
    pub fn new(collaborator: Arc<dyn Collaborator>, policy: CallPolicy) -> Self {
        Self {
            collaborator,
            policy,
            flight: SingleFlight::new("apply"),
        }
    }

    /// Requests concrete changes for `suggestion` and composes a preview
    /// against a snapshot of `lesson`.
    ///
    /// The preview always composes every proposed change. Zero changes yield
    /// a preview whose enhanced content equals the base content.
    #[instrument(skip_all, fields(suggestion_id = %suggestion.id, lesson_id = %lesson.id))]
    pub async fn apply(&self, suggestion: &Suggestion, lesson: &LessonDocument) -> Result<Preview> {
        if lesson.id.trim().is_empty() {
            return Err(PipelineError::validation("lesson id is required"));
        }
        if lesson.content.trim().is_empty() {
            return Err(PipelineError::validation(
                "lesson content is empty; add content before applying a suggestion",
            ));
        }
        if suggestion.suggestion_text.trim().is_empty() {
            return Err(PipelineError::validation("suggestion text is empty"));
        }

        let guard = self.flight.begin(suggestion.id.clone())?;
        let request = ApplyRequest {
            lesson_id: lesson.id.clone(),
            suggestion_id: suggestion.id.clone(),
            original_lesson: lesson.content.clone(),
            suggestion: suggestion.clone(),
        };
        let response = self
            .policy
            .run("applySuggestion", || {
                self.collaborator.apply_suggestion(request.clone())
            })
            .await?;

        let changes = normalize_changes(response.enhancements, &suggestion.id);
        let merged = response
            .preview_lesson
            .filter(|text| !text.trim().is_empty() && !changes.is_empty());
        let (payload, mode) = match merged {
            Some(text) => (EnhancementPayload::FullDocument(text), CompositionMode::Merged),
            None => (
                EnhancementPayload::FragmentList(changes.clone()),
                CompositionMode::Fragments,
            ),
        };

        let composition = compose(&lesson.content, &payload);
        let placements = match mode {
            CompositionMode::Fragments => composition.placements,
            CompositionMode::Merged => resolve(&lesson.content, &changes),
        };
        let preview = Preview {
            id: format!("preview-{}", Uuid::new_v4()),
            lesson_id: lesson.id.clone(),
            suggestion_id: suggestion.id.clone(),
            base_content: lesson.content.clone(),
            base_fingerprint: lesson.fingerprint(),
            enhanced_content: composition.enhanced_content,
            changes,
            statistics: composition.statistics,
            mode,
            placements,
            unplaced_change_ids: composition.unplaced,
            created_at: Utc::now(),
        };
        guard.succeed();

        info!(
            preview_id = %preview.id,
            changes = preview.changes.len(),
            unplaced = preview.unplaced_change_ids.len(),
            ?mode,
            "Preview composed"
        );
        Ok(preview)
    }

    /// Request state of expansion for a suggestion.
    #[must_use]
    pub fn apply_state(&self, suggestion_id: &str) -> RequestState {
        self.flight.state(&suggestion_id.to_string())
    }
}

/// Normalizes raw backend changes into [`Enhancement`] records.
///
/// Assigns `change-N` ids where the backend omitted or repeated one, infers
/// missing types, defaults impact and location, and drops changes that carry
/// no edit.
#[must_use]
pub fn normalize_changes(raw: Vec<RawEnhancement>, suggestion_id: &str) -> Vec<Enhancement> {
    let kept: Vec<RawEnhancement> = raw
        .into_iter()
        .filter(|change| {
            let empty =
                change.original_text.trim().is_empty() && change.enhanced_text.trim().is_empty();
            if empty {
                warn!(change_id = ?change.id, "Dropping change with no original or enhanced text");
            }
            !empty
        })
        .collect();

    let mut used: HashSet<String> = HashSet::new();
    let explicit: Vec<Option<String>> = kept
        .iter()
        .map(|change| {
            change
                .id
                .as_ref()
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty() && used.insert(id.clone()))
        })
        .collect();

    kept.into_iter()
        .zip(explicit)
        .enumerate()
        .map(|(index, (change, explicit_id))| {
            let id = explicit_id.unwrap_or_else(|| {
                let mut n = index + 1;
                while used.contains(&format!("change-{n}")) {
                    n += 1;
                }
                let id = format!("change-{n}");
                used.insert(id.clone());
                id
            });
            let change_type = change
                .change_type
                .unwrap_or_else(|| ChangeType::infer(&change.original_text, &change.enhanced_text));

            Enhancement {
                id,
                suggestion_id: change
                    .suggestion_id
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| Some(suggestion_id.to_string())),
                change_type,
                location: change.location.unwrap_or_default(),
                original_text: change.original_text,
                enhanced_text: change.enhanced_text,
                rationale: change.rationale,
                impact: change.impact.unwrap_or_default(),
            }
        })
        .collect()
}
