//! Which changes of an open preview the teacher intends to keep.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::Preview;
use crate::{PipelineError, Result};

/// A user-chosen subset of a preview's changes.
///
/// The selection remembers the preview's change ids so that it can enforce
/// `selected ⊆ changes` without holding the preview itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    /// The preview this selection belongs to.
    pub preview_id: String,
    change_ids: Vec<String>,
    selected: BTreeSet<String>,
}

impl Selection {
    /// Creates an empty selection for `preview`.
    #[must_use]
    pub fn for_preview(preview: &Preview) -> Self {
        Self {
            preview_id: preview.id.clone(),
            change_ids: preview.change_ids(),
            selected: BTreeSet::new(),
        }
    }

    /// Flips membership of `change_id`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the preview has no change with this id.
    pub fn toggle(&mut self, change_id: &str) -> Result<bool> {
        if !self.change_ids.iter().any(|id| id == change_id) {
            return Err(PipelineError::validation(format!(
                "preview '{}' has no change '{change_id}'",
                self.preview_id
            )));
        }
        if self.selected.remove(change_id) {
            Ok(false)
        } else {
            self.selected.insert(change_id.to_string());
            Ok(true)
        }
    }

    /// Selects every change in the preview.
    pub fn select_all(&mut self) {
        self.selected = self.change_ids.iter().cloned().collect();
    }

    /// Clears the selection.
    pub fn deselect_all(&mut self) {
        self.selected.clear();
    }

    /// Returns `true` when at least one change is selected.
    #[must_use]
    pub fn is_ready_to_confirm(&self) -> bool {
        !self.selected.is_empty()
    }

    /// Returns `true` if `change_id` is selected.
    #[must_use]
    pub fn is_selected(&self, change_id: &str) -> bool {
        self.selected.contains(change_id)
    }

    /// Selected ids, in preview order.
    #[must_use]
    pub fn selected_change_ids(&self) -> Vec<String> {
        self.change_ids
            .iter()
            .filter(|id| self.selected.contains(*id))
            .cloned()
            .collect()
    }

    /// Number of selected changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    /// Returns `true` when nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}
