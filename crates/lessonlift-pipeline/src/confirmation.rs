//! Idempotent finalization of a selection against a preview.
//!
//! The coordinator owns the open previews. Confirming a preview produces a
//! new [`LessonDocument`]; the original is never modified. Re-confirming the
//! same `(preview, selection)` pair returns the recorded result unchanged.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::collaborator::{CallPolicy, Collaborator, ConfirmRequest};
use crate::composer::{render, resolve};
use crate::config::ConfirmationStrategy;
use crate::error::BackendErrorKind;
use crate::flight::{RequestState, SingleFlight};
use crate::model::{
    CompositionMode, ConfirmationStatistics, ConfirmedEnhancement, LessonDocument, Placement,
    Preview,
};
use crate::{PipelineError, Result};

/// Receives finished documents. Notification is fire-and-forget.
pub trait LessonEditor: Send + Sync + std::fmt::Debug {
    /// Called once per successful confirmation.
    fn document_enhanced(&self, enhancement: &ConfirmedEnhancement);
}

type CacheKey = (String, Vec<String>);

#[derive(Debug, Default)]
struct Ledger {
    open: HashMap<String, Preview>,
    confirmed: HashMap<String, ConfirmedEnhancement>,
    replays: HashMap<CacheKey, ConfirmedEnhancement>,
}

/// Finalizes previews into confirmed enhancements.
#[derive(Debug)]
pub struct ConfirmationCoordinator {
    collaborator: Arc<dyn Collaborator>,
    policy: CallPolicy,
    strategy: ConfirmationStrategy,
    editor: Option<Arc<dyn LessonEditor>>,
    ledger: Mutex<Ledger>,
    flight: SingleFlight<String>,
}

impl ConfirmationCoordinator {
    /// Creates a coordinator with no open previews.
    #[must_use]
    pub fn new(
        collaborator: Arc<dyn Collaborator>,
        policy: CallPolicy,
        strategy: ConfirmationStrategy,
    ) -> Self {
        Self {
            collaborator,
            policy,
            strategy,
            editor: None,
            ledger: Mutex::new(Ledger::default()),
            flight: SingleFlight::new("confirm"),
        }
    }

    /// Sets the editor notified after each confirmation.
    #[must_use]
    pub fn with_editor(mut self, editor: Arc<dyn LessonEditor>) -> Self {
        self.editor = Some(editor);
        self
    }

    /// Opens a preview for confirmation.
    pub fn register(&self, preview: Preview) {
        debug!(preview_id = %preview.id, "Registering preview");
        self.lock().open.insert(preview.id.clone(), preview);
    }

    /// Returns an open or confirmed preview.
    pub fn preview(&self, preview_id: &str) -> Result<Preview> {
        self.lock()
            .open
            .get(preview_id)
            .cloned()
            .ok_or_else(|| PipelineError::not_found("preview", preview_id))
    }

    /// Drops an unconfirmed preview and forgets its confirmation state.
    ///
    /// Confirmed previews are kept for audit and cannot be discarded. A
    /// preview with a confirmation in flight is `Busy`.
    pub fn discard(&self, preview_id: &str) -> Result<Preview> {
        let key = preview_id.to_string();
        if self.flight.state(&key) == RequestState::Pending {
            return Err(PipelineError::busy("discard", preview_id));
        }
        let mut ledger = self.lock();
        if ledger.confirmed.contains_key(preview_id) {
            return Err(PipelineError::conflict(format!(
                "preview '{preview_id}' has already been confirmed"
            )));
        }
        let preview = ledger
            .open
            .remove(preview_id)
            .ok_or_else(|| PipelineError::not_found("preview", preview_id))?;
        drop(ledger);
        self.flight.reset(&key);

        info!(preview_id, "Preview discarded");
        Ok(preview)
    }

    /// Returns the confirmation recorded for a preview.
    pub fn confirmed(&self, preview_id: &str) -> Result<ConfirmedEnhancement> {
        self.lock()
            .confirmed
            .get(preview_id)
            .cloned()
            .ok_or_else(|| PipelineError::not_found("confirmed enhancement", preview_id))
    }

    /// Number of open previews that have not been confirmed.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        let ledger = self.lock();
        ledger
            .open
            .keys()
            .filter(|id| !ledger.confirmed.contains_key(*id))
            .count()
    }

    /// Number of confirmed previews.
    #[must_use]
    pub fn confirmed_count(&self) -> usize {
        self.lock().confirmed.len()
    }

    /// Request state of confirmation for a preview.
    #[must_use]
    pub fn confirm_state(&self, preview_id: &str) -> RequestState {
        self.flight.state(&preview_id.to_string())
    }

    /// Applies `selected_change_ids` from a preview to `lesson`.
    ///
    /// Checks run in this order: empty selection, replay of an earlier
    /// identical confirmation, in-flight duplicate, unknown preview, ids
    /// outside the preview, stale lesson. No partial application happens:
    /// if any selected change cannot be placed the confirmation fails.
    #[instrument(skip(self, selected_change_ids, lesson), fields(selected = selected_change_ids.len()))]
    pub async fn confirm(
        &self,
        preview_id: &str,
        selected_change_ids: &[String],
        lesson: &LessonDocument,
    ) -> Result<ConfirmedEnhancement> {
        if selected_change_ids.is_empty() {
            return Err(PipelineError::validation(
                "select at least one change before confirming",
            ));
        }

        let selection: BTreeSet<String> = selected_change_ids.iter().cloned().collect();
        let key: CacheKey = (preview_id.to_string(), selection.iter().cloned().collect());
        if let Some(recorded) = self.lock().replays.get(&key).cloned() {
            debug!(preview_id, "Returning recorded confirmation");
            return Ok(recorded);
        }

        let guard = self.flight.begin(preview_id.to_string())?;

        let preview = {
            let ledger = self.lock();
            if ledger.confirmed.contains_key(preview_id) {
                return Err(PipelineError::conflict(format!(
                    "preview '{preview_id}' was already confirmed with a different selection"
                )));
            }
            ledger
                .open
                .get(preview_id)
                .cloned()
                .ok_or_else(|| PipelineError::not_found("preview", preview_id))?
        };

        if let Some(unknown) = selection.iter().find(|id| !preview.has_change(id)) {
            return Err(PipelineError::validation(format!(
                "change '{unknown}' is not part of preview '{preview_id}'"
            )));
        }

        if lesson.id != preview.lesson_id {
            return Err(PipelineError::conflict(format!(
                "preview '{preview_id}' belongs to lesson '{}', not '{}'",
                preview.lesson_id, lesson.id
            )));
        }
        if lesson.fingerprint() != preview.base_fingerprint {
            return Err(PipelineError::conflict(format!(
                "lesson '{}' changed since preview '{preview_id}' was built",
                lesson.id
            )));
        }

        let applied: Vec<String> = preview
            .changes
            .iter()
            .filter(|c| selection.contains(&c.id))
            .map(|c| c.id.clone())
            .collect();
        let content = match self.strategy {
            ConfirmationStrategy::Local => compose_locally(&preview, &selection)?,
            ConfirmationStrategy::Remote => self.compose_remotely(&preview, &applied).await?,
        };

        let applied_at = Utc::now();
        let statistics = ConfirmationStatistics::between(&preview.base_content, &content, applied.len());
        let record = ConfirmedEnhancement {
            preview_id: preview.id.clone(),
            lesson_id: preview.lesson_id.clone(),
            original_document_id: lesson.id.clone(),
            applied_change_ids: applied,
            resulting_document: LessonDocument {
                id: Uuid::new_v4().to_string(),
                title: lesson.title.clone(),
                content,
                created_at: applied_at,
            },
            statistics,
            applied_at,
        };

        {
            let mut ledger = self.lock();
            ledger.replays.insert(key, record.clone());
            ledger.confirmed.insert(preview.id.clone(), record.clone());
        }
        guard.succeed();

        info!(
            preview_id,
            changes_applied = record.statistics.changes_applied,
            word_delta = record.statistics.word_delta,
            "Enhancement confirmed"
        );
        if let Some(editor) = &self.editor {
            editor.document_enhanced(&record);
        }
        Ok(record)
    }

    async fn compose_remotely(&self, preview: &Preview, applied: &[String]) -> Result<String> {
        let request = ConfirmRequest {
            preview_id: preview.id.clone(),
            lesson_id: preview.lesson_id.clone(),
            selected_change_ids: applied.to_vec(),
            original_lesson: preview.base_content.clone(),
        };
        let response = self
            .policy
            .run("confirmEnhancement", || {
                self.collaborator.confirm_enhancement(request.clone())
            })
            .await?;

        if response.enhanced_lesson.trim().is_empty() {
            return Err(PipelineError::generation(
                "confirmEnhancement",
                BackendErrorKind::InvalidResponse,
                "backend returned an empty lesson",
            ));
        }
        Ok(response.enhanced_lesson)
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Renders only the selected changes, each at the placement it had in the
/// preview.
fn compose_locally(preview: &Preview, selection: &BTreeSet<String>) -> Result<String> {
    if preview.mode == CompositionMode::Merged && selection.len() == preview.changes.len() {
        return Ok(preview.enhanced_content.clone());
    }

    let resolved;
    let placements: &[Placement] = if preview.placements.len() == preview.changes.len() {
        &preview.placements
    } else {
        resolved = resolve(&preview.base_content, &preview.changes);
        &resolved
    };

    let mut placed = Vec::new();
    let mut unplaced = Vec::new();
    for (change, placement) in preview.changes.iter().zip(placements.iter().copied()) {
        if !selection.contains(&change.id) {
            continue;
        }
        match placement {
            Placement::Unplaced => unplaced.push(change.id.as_str()),
            _ => placed.push((change, placement)),
        }
    }

    if !unplaced.is_empty() {
        return Err(PipelineError::conflict(format!(
            "selected changes could not be placed in the lesson: {}",
            unplaced.join(", ")
        )));
    }
    Ok(render(&preview.base_content, &placed))
}
