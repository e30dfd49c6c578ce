//! LessonLift Enhancement Reports
//!
//! This crate provides types and utilities for auditing confirmed lesson
//! enhancements. A report records which proposed changes were applied and
//! which were declined, along with the word accounting of the result.
//! Reports can be serialized to JSON for programmatic access or rendered to
//! Markdown for teachers and reviewers.
//!
//! # Types
//!
//! - [`EnhancementReport`] - The complete audit record of one confirmation
//! - [`ReportSummary`] - Identifiers and timing of the confirmation
//! - [`WordStatistics`] - Word counts before and after
//! - [`ChangeEntry`] - One proposed change and what happened to it
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Generate JSON reports with compact or pretty formatting
//! - [`MarkdownGenerator`] - Generate human-readable Markdown reports
//!
//! # Example
//!
//! ```rust
//! use lessonlift_report::{ChangeEntry, ChangeKind, ChangeOutcome, EnhancementReport, WordStatistics};
//! use lessonlift_report::json::JsonGenerator;
//!
//! let report = EnhancementReport::builder()
//!     .lesson_title("Fractions")
//!     .statistics(WordStatistics::between(3, 7, 1))
//!     .change(ChangeEntry::new(
//!         "e1",
//!         ChangeKind::Modification,
//!         "Activity.",
//!         "Activity. Quick check: 2 questions.",
//!         ChangeOutcome::Applied,
//!     ))
//!     .build()
//!     .unwrap();
//!
//! let json = JsonGenerator::new(&report).generate_pretty().unwrap();
//! assert!(json.contains("\"wordDelta\": 4"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid report data.
    #[error("invalid report data: {0}")]
    InvalidData(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Change Vocabulary (local copies to keep this crate standalone)
// ============================================================================

/// The kind of textual edit a change performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// New text inserted.
    #[default]
    Addition,
    /// Existing text rewritten.
    Modification,
    /// Existing text deleted.
    Removal,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Addition => write!(f, "addition"),
            Self::Modification => write!(f, "modification"),
            Self::Removal => write!(f, "removal"),
        }
    }
}

/// Expected impact of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeImpact {
    /// Minor improvement.
    Low,
    /// Noticeable improvement.
    #[default]
    Medium,
    /// Substantial improvement.
    High,
}

impl std::fmt::Display for ChangeImpact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// What happened to a proposed change at confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOutcome {
    /// The teacher kept the change and it is in the resulting document.
    Applied,
    /// The teacher left the change out.
    #[default]
    Declined,
}

// ============================================================================
// EnhancementReport
// ============================================================================

/// Audit record of one confirmed enhancement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementReport {
    /// Title of the enhanced lesson.
    pub lesson_title: String,

    /// Identifiers and timing of the confirmation.
    pub summary: ReportSummary,

    /// Word accounting of the resulting document.
    pub statistics: WordStatistics,

    /// Every proposed change, in preview order.
    pub changes: Vec<ChangeEntry>,
}

impl EnhancementReport {
    /// Creates a new report builder.
    #[must_use]
    pub fn builder() -> ReportBuilder {
        ReportBuilder::default()
    }

    /// Serializes the report to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialization`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(ReportError::from)
    }

    /// Changes that made it into the resulting document.
    pub fn applied(&self) -> impl Iterator<Item = &ChangeEntry> {
        self.changes
            .iter()
            .filter(|c| c.outcome == ChangeOutcome::Applied)
    }

    /// Changes the teacher left out.
    pub fn declined(&self) -> impl Iterator<Item = &ChangeEntry> {
        self.changes
            .iter()
            .filter(|c| c.outcome == ChangeOutcome::Declined)
    }

    /// Counts changes by outcome.
    #[must_use]
    pub fn outcome_counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for change in &self.changes {
            match change.outcome {
                ChangeOutcome::Applied => counts.applied += 1,
                ChangeOutcome::Declined => counts.declined += 1,
            }
        }
        counts
    }
}

/// Change counts by outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    /// Number of applied changes.
    pub applied: usize,
    /// Number of declined changes.
    pub declined: usize,
}

impl OutcomeCounts {
    /// Returns the total number of proposed changes.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.applied + self.declined
    }
}

// ============================================================================
// ReportBuilder
// ============================================================================

/// Builder for constructing [`EnhancementReport`] instances.
#[derive(Debug, Clone, Default)]
pub struct ReportBuilder {
    lesson_title: Option<String>,
    summary: Option<ReportSummary>,
    statistics: Option<WordStatistics>,
    changes: Vec<ChangeEntry>,
}

impl ReportBuilder {
    /// Sets the lesson title.
    #[must_use]
    pub fn lesson_title(mut self, title: impl Into<String>) -> Self {
        self.lesson_title = Some(title.into());
        self
    }

    /// Sets the report summary.
    #[must_use]
    pub fn summary(mut self, summary: ReportSummary) -> Self {
        self.summary = Some(summary);
        self
    }

    /// Sets the word statistics.
    #[must_use]
    pub const fn statistics(mut self, statistics: WordStatistics) -> Self {
        self.statistics = Some(statistics);
        self
    }

    /// Adds a change entry.
    #[must_use]
    pub fn change(mut self, change: ChangeEntry) -> Self {
        self.changes.push(change);
        self
    }

    /// Sets all change entries at once.
    #[must_use]
    pub fn changes(mut self, changes: Vec<ChangeEntry>) -> Self {
        self.changes = changes;
        self
    }

    /// Builds the report.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidData` if the title or statistics are
    /// missing, or if the applied change count disagrees with the entries.
    pub fn build(self) -> Result<EnhancementReport> {
        let lesson_title = self
            .lesson_title
            .ok_or_else(|| ReportError::InvalidData("lesson_title is required".to_string()))?;

        let statistics = self
            .statistics
            .ok_or_else(|| ReportError::InvalidData("statistics are required".to_string()))?;

        let applied = self
            .changes
            .iter()
            .filter(|c| c.outcome == ChangeOutcome::Applied)
            .count();
        if applied != statistics.changes_applied {
            return Err(ReportError::InvalidData(format!(
                "statistics report {} applied changes but {applied} entries are applied",
                statistics.changes_applied
            )));
        }

        Ok(EnhancementReport {
            lesson_title,
            summary: self.summary.unwrap_or_default(),
            statistics,
            changes: self.changes,
        })
    }
}

// ============================================================================
// ReportSummary
// ============================================================================

/// Identifiers and timing of a confirmation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    /// The lesson that was enhanced.
    pub lesson_id: String,

    /// The original document, retained for undo.
    pub original_document_id: String,

    /// The document produced by confirmation.
    pub resulting_document_id: String,

    /// The confirmed preview.
    pub preview_id: String,

    /// The suggestion the changes came from.
    pub suggestion_id: String,

    /// Text of that suggestion, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion_text: Option<String>,

    /// When the confirmation happened.
    pub confirmed_at: DateTime<Utc>,
}

// ============================================================================
// WordStatistics
// ============================================================================

/// Word counts before and after confirmation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordStatistics {
    /// Words in the original document.
    pub original_word_count: usize,
    /// Words in the resulting document.
    pub enhanced_word_count: usize,
    /// Number of applied changes.
    pub changes_applied: usize,
    /// Signed difference between the two counts.
    pub word_delta: i64,
}

impl WordStatistics {
    /// Builds statistics from the two counts, deriving the delta.
    ///
    /// ```
    /// use lessonlift_report::WordStatistics;
    ///
    /// let stats = WordStatistics::between(10, 7, 2);
    /// assert_eq!(stats.word_delta, -3);
    /// ```
    #[must_use]
    pub fn between(original: usize, enhanced: usize, changes_applied: usize) -> Self {
        let word_delta = i64::try_from(enhanced).unwrap_or(i64::MAX)
            - i64::try_from(original).unwrap_or(i64::MAX);
        Self {
            original_word_count: original,
            enhanced_word_count: enhanced,
            changes_applied,
            word_delta,
        }
    }
}

// ============================================================================
// ChangeEntry
// ============================================================================

/// One proposed change and what happened to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEntry {
    /// Change identifier within the preview.
    pub id: String,

    /// The kind of edit.
    pub kind: ChangeKind,

    /// Expected impact.
    #[serde(default)]
    pub impact: ChangeImpact,

    /// Text that was (or would have been) replaced.
    pub original_text: String,

    /// Replacement text.
    pub enhanced_text: String,

    /// Why the change was proposed.
    #[serde(default)]
    pub rationale: String,

    /// Applied or declined.
    pub outcome: ChangeOutcome,
}

impl ChangeEntry {
    /// Creates an entry with medium impact and no rationale.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        kind: ChangeKind,
        original_text: impl Into<String>,
        enhanced_text: impl Into<String>,
        outcome: ChangeOutcome,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            impact: ChangeImpact::default(),
            original_text: original_text.into(),
            enhanced_text: enhanced_text.into(),
            rationale: String::new(),
            outcome,
        }
    }

    /// Sets the impact.
    #[must_use]
    pub const fn with_impact(mut self, impact: ChangeImpact) -> Self {
        self.impact = impact;
        self
    }

    /// Sets the rationale.
    #[must_use]
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
