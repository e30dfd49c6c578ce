//! The interactive enhancement session.
//!
//! [`EnhancementSession`] wires the catalog, expander and coordinator
//! together and holds the teacher's current [`Selection`] for every open
//! preview. The HTTP API drives the pipeline exclusively through it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lessonlift_report::{
    ChangeEntry, ChangeImpact, ChangeKind, ChangeOutcome, EnhancementReport, ReportSummary,
    WordStatistics,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::catalog::SuggestionCatalog;
use crate::collaborator::{CallPolicy, Collaborator};
use crate::config::Config;
use crate::confirmation::ConfirmationCoordinator;
use crate::events::{EventBroadcaster, PipelineEvent};
use crate::expander::EnhancementExpander;
use crate::model::{
    ChangeType, ConfirmedEnhancement, Impact, LessonDocument, Preview, Rating, Suggestion,
};
use crate::selection::Selection;
use crate::{PipelineError, Result};

/// Counters describing the session, sent to editors on connect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOverview {
    /// Suggestions held in the catalog.
    pub suggestion_count: usize,
    /// Previews awaiting confirmation.
    pub open_preview_count: usize,
    /// Previews already confirmed.
    pub confirmed_count: usize,
}

/// One teacher's pass over their lessons.
#[derive(Debug)]
pub struct EnhancementSession {
    catalog: SuggestionCatalog,
    expander: EnhancementExpander,
    coordinator: ConfirmationCoordinator,
    selections: Mutex<HashMap<String, Selection>>,
    events: Option<EventBroadcaster>,
}

impl EnhancementSession {
    /// Creates a session whose components share one collaborator.
    #[must_use]
    pub fn new(collaborator: Arc<dyn Collaborator>, config: &Config) -> Self {
        let policy = CallPolicy::from_config(config);
        Self {
            catalog: SuggestionCatalog::new(collaborator.clone(), policy),
            expander: EnhancementExpander::new(collaborator.clone(), policy),
            coordinator: ConfirmationCoordinator::new(
                collaborator,
                policy,
                config.confirmation_strategy,
            ),
            selections: Mutex::new(HashMap::new()),
            events: None,
        }
    }

    /// Publishes pipeline events, including confirmed documents, on `broadcaster`.
    #[must_use]
    pub fn with_events(mut self, broadcaster: EventBroadcaster) -> Self {
        self.coordinator = self
            .coordinator
            .with_editor(Arc::new(broadcaster.clone()));
        self.events = Some(broadcaster);
        self
    }

    // ------------------------------------------------------------------------
    // Suggestions
    // ------------------------------------------------------------------------

    /// Generates suggestions for a lesson. See [`SuggestionCatalog::generate`].
    pub async fn generate(
        &self,
        lesson_id: &str,
        framework_analysis: serde_json::Value,
        teacher_responses: Vec<String>,
    ) -> Result<Vec<Suggestion>> {
        let added = self
            .catalog
            .generate(lesson_id, framework_analysis, teacher_responses)
            .await
            .map_err(|e| {
                self.emit_failure("generate", &e);
                e
            })?;

        self.emit(PipelineEvent::suggestions_generated(
            lesson_id,
            added.iter().map(|s| s.id.clone()).collect(),
        ));
        Ok(added)
    }

    /// Lists a lesson's suggestions in generation order.
    #[must_use]
    pub fn suggestions(&self, lesson_id: &str) -> Vec<Suggestion> {
        self.catalog.list(lesson_id)
    }

    /// Returns one suggestion.
    pub fn suggestion(&self, suggestion_id: &str) -> Result<Suggestion> {
        self.catalog.get(suggestion_id)
    }

    /// Records teacher feedback on a suggestion.
    pub async fn rate(&self, suggestion_id: &str, rating: Rating) -> Result<Suggestion> {
        self.catalog.rate(suggestion_id, rating).await
    }

    // ------------------------------------------------------------------------
    // Previews and selection
    // ------------------------------------------------------------------------

    /// Expands a suggestion against `lesson` and opens the resulting preview
    /// with an empty selection.
    #[instrument(skip(self, lesson), fields(lesson_id = %lesson.id))]
    pub async fn apply(
        &self,
        suggestion_id: &str,
        lesson: &LessonDocument,
    ) -> Result<(Preview, Selection)> {
        let suggestion = self.catalog.get(suggestion_id)?;
        let preview = self
            .expander
            .apply(&suggestion, lesson)
            .await
            .map_err(|e| {
                self.emit_failure("apply", &e);
                e
            })?;

        let selection = Selection::for_preview(&preview);
        self.coordinator.register(preview.clone());
        self.selections()
            .insert(preview.id.clone(), selection.clone());

        self.emit(PipelineEvent::preview_ready(&preview));
        Ok((preview, selection))
    }

    /// Returns an open preview.
    pub fn preview(&self, preview_id: &str) -> Result<Preview> {
        self.coordinator.preview(preview_id)
    }

    /// Returns the current selection for a preview.
    pub fn selection(&self, preview_id: &str) -> Result<Selection> {
        self.selections()
            .get(preview_id)
            .cloned()
            .ok_or_else(|| PipelineError::not_found("selection", preview_id))
    }

    /// Flips one change in or out of the selection.
    pub fn toggle(&self, preview_id: &str, change_id: &str) -> Result<Selection> {
        self.update_selection(preview_id, |selection| {
            selection.toggle(change_id).map(|_| ())
        })
    }

    /// Selects every change in the preview.
    pub fn select_all(&self, preview_id: &str) -> Result<Selection> {
        self.update_selection(preview_id, |selection| {
            selection.select_all();
            Ok(())
        })
    }

    /// Clears the selection.
    pub fn deselect_all(&self, preview_id: &str) -> Result<Selection> {
        self.update_selection(preview_id, |selection| {
            selection.deselect_all();
            Ok(())
        })
    }

    /// Cancels an unconfirmed preview and drops its selection.
    pub fn discard(&self, preview_id: &str) -> Result<Preview> {
        let preview = self.coordinator.discard(preview_id)?;
        self.selections().remove(preview_id);
        self.emit(PipelineEvent::preview_discarded(preview_id));
        Ok(preview)
    }

    // ------------------------------------------------------------------------
    // Confirmation
    // ------------------------------------------------------------------------

    /// Confirms a preview against `lesson`.
    ///
    /// With `change_ids` the given ids are applied; otherwise the held
    /// selection is used.
    pub async fn confirm(
        &self,
        preview_id: &str,
        lesson: &LessonDocument,
        change_ids: Option<Vec<String>>,
    ) -> Result<ConfirmedEnhancement> {
        let change_ids = match change_ids {
            Some(ids) => ids,
            None => self.selection(preview_id)?.selected_change_ids(),
        };

        self.coordinator
            .confirm(preview_id, &change_ids, lesson)
            .await
            .map_err(|e| {
                self.emit_failure("confirm", &e);
                e
            })
    }

    /// Returns the confirmation recorded for a preview.
    pub fn confirmed(&self, preview_id: &str) -> Result<ConfirmedEnhancement> {
        self.coordinator.confirmed(preview_id)
    }

    /// Builds the audit report of a confirmed preview.
    pub fn report(&self, preview_id: &str) -> Result<EnhancementReport> {
        let record = self.coordinator.confirmed(preview_id)?;
        let preview = self.coordinator.preview(preview_id)?;
        let suggestion_text = self
            .catalog
            .get(&preview.suggestion_id)
            .ok()
            .map(|s| s.suggestion_text);

        let changes = preview
            .changes
            .iter()
            .map(|change| {
                let outcome = if record.applied_change_ids.contains(&change.id) {
                    ChangeOutcome::Applied
                } else {
                    ChangeOutcome::Declined
                };
                ChangeEntry::new(
                    change.id.clone(),
                    change_kind(change.change_type),
                    change.original_text.clone(),
                    change.enhanced_text.clone(),
                    outcome,
                )
                .with_impact(change_impact(change.impact))
                .with_rationale(change.rationale.clone())
            })
            .collect();

        let stats = &record.statistics;
        let report = EnhancementReport::builder()
            .lesson_title(record.resulting_document.title.clone())
            .summary(ReportSummary {
                lesson_id: record.lesson_id.clone(),
                original_document_id: record.original_document_id.clone(),
                resulting_document_id: record.resulting_document.id.clone(),
                preview_id: record.preview_id.clone(),
                suggestion_id: preview.suggestion_id.clone(),
                suggestion_text,
                confirmed_at: record.applied_at,
            })
            .statistics(WordStatistics {
                original_word_count: stats.original_word_count,
                enhanced_word_count: stats.enhanced_word_count,
                changes_applied: stats.changes_applied,
                word_delta: stats.word_delta,
            })
            .changes(changes)
            .build()?;
        Ok(report)
    }

    /// Current session counters.
    #[must_use]
    pub fn overview(&self) -> SessionOverview {
        SessionOverview {
            suggestion_count: self.catalog.len(),
            open_preview_count: self.coordinator.pending_count(),
            confirmed_count: self.coordinator.confirmed_count(),
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn update_selection(
        &self,
        preview_id: &str,
        update: impl FnOnce(&mut Selection) -> Result<()>,
    ) -> Result<Selection> {
        let mut selections = self.selections();
        let selection = selections
            .get_mut(preview_id)
            .ok_or_else(|| PipelineError::not_found("selection", preview_id))?;
        update(selection)?;
        debug!(preview_id, selected = selection.len(), "Selection updated");
        Ok(selection.clone())
    }

    fn selections(&self) -> MutexGuard<'_, HashMap<String, Selection>> {
        self.selections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }

    fn emit_failure(&self, operation: &str, error: &PipelineError) {
        warn!(operation, kind = %error.kind(), error = %error, "Pipeline operation failed");
        self.emit(PipelineEvent::error(operation, error.user_message()));
    }
}

const fn change_kind(change_type: ChangeType) -> ChangeKind {
    match change_type {
        ChangeType::Addition => ChangeKind::Addition,
        ChangeType::Modification => ChangeKind::Modification,
        ChangeType::Removal => ChangeKind::Removal,
    }
}

const fn change_impact(impact: Impact) -> ChangeImpact {
    match impact {
        Impact::Low => ChangeImpact::Low,
        Impact::Medium => ChangeImpact::Medium,
        Impact::High => ChangeImpact::High,
    }
}
