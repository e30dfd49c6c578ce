//! Data model for the lesson-enhancement pipeline.
//!
//! This module defines the documents, suggestions, changes, previews, and
//! confirmation records that flow between the pipeline components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// Word accounting
// ============================================================================

/// Counts whitespace-separated tokens.
///
/// # Examples
///
/// ```
/// use lessonlift_pipeline::word_count;
///
/// assert_eq!(word_count("Intro. Activity. Closing."), 3);
/// assert_eq!(word_count("  spaced \n\t out  "), 2);
/// assert_eq!(word_count(""), 0);
/// ```
#[must_use]
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Returns the SHA-256 hex digest of a document's content.
#[must_use]
pub fn fingerprint(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

// ============================================================================
// LessonDocument
// ============================================================================

/// A lesson as owned by the lesson-authoring context.
///
/// The pipeline never mutates a `LessonDocument` in place; confirmation
/// produces a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonDocument {
    /// Lesson identifier.
    pub id: String,
    /// Lesson title.
    #[serde(default)]
    pub title: String,
    /// Plain-text lesson content.
    #[serde(default)]
    pub content: String,
    /// When this version of the document was created.
    pub created_at: DateTime<Utc>,
}

impl LessonDocument {
    /// Creates a document with the current timestamp.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Returns the whitespace token count of the content.
    #[must_use]
    pub fn word_count(&self) -> usize {
        word_count(&self.content)
    }

    /// Returns the content fingerprint used for staleness checks.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.content)
    }
}

// ============================================================================
// Suggestions
// ============================================================================

/// Pedagogical dimension a suggestion is tagged with.
///
/// The taxonomy belongs to the collaborator, so unknown tags are kept
/// verbatim in [`FrameworkPrinciple::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FrameworkPrinciple {
    /// Students investigate questions rather than receive answers.
    InquiryBased,
    /// Instruction adapts to evidence from formative checks.
    AssessmentInformed,
    /// Tasks vary by readiness, interest, or profile.
    Differentiated,
    /// Students learn through structured peer work.
    Collaborative,
    /// Content connects to students' cultural references.
    CulturallyResponsive,
    /// Content is anchored in authentic contexts.
    RealWorldConnection,
    /// Students reflect on their own learning.
    Metacognitive,
    /// A tag outside the known taxonomy.
    Other(String),
}

impl FrameworkPrinciple {
    /// Returns the wire tag for this principle.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::InquiryBased => "inquiry-based",
            Self::AssessmentInformed => "assessment-informed",
            Self::Differentiated => "differentiated",
            Self::Collaborative => "collaborative",
            Self::CulturallyResponsive => "culturally-responsive",
            Self::RealWorldConnection => "real-world-connection",
            Self::Metacognitive => "metacognitive",
            Self::Other(tag) => tag,
        }
    }

    /// Parses a wire tag, case-insensitively. Underscores and spaces are
    /// treated as hyphens.
    #[must_use]
    pub fn parse(tag: &str) -> Self {
        let normalized = tag.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "inquiry-based" | "inquiry" => Self::InquiryBased,
            "assessment-informed" | "assessment" => Self::AssessmentInformed,
            "differentiated" | "differentiation" => Self::Differentiated,
            "collaborative" | "collaboration" => Self::Collaborative,
            "culturally-responsive" => Self::CulturallyResponsive,
            "real-world-connection" | "real-world" => Self::RealWorldConnection,
            "metacognitive" | "metacognition" => Self::Metacognitive,
            _ => Self::Other(tag.trim().to_string()),
        }
    }
}

impl Default for FrameworkPrinciple {
    fn default() -> Self {
        Self::Other("general".to_string())
    }
}

impl std::fmt::Display for FrameworkPrinciple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FrameworkPrinciple {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

impl Serialize for FrameworkPrinciple {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Teacher feedback recorded against a suggestion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackState {
    /// No feedback yet.
    #[default]
    Unrated,
    /// Marked helpful.
    Helpful,
    /// Marked unhelpful. Kept for audit and to avoid re-surfacing.
    Unhelpful,
    /// Marked as implemented in the lesson.
    Implemented,
}

impl std::fmt::Display for FeedbackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unrated => write!(f, "unrated"),
            Self::Helpful => write!(f, "helpful"),
            Self::Unhelpful => write!(f, "unhelpful"),
            Self::Implemented => write!(f, "implemented"),
        }
    }
}

/// A rating a teacher can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    /// The suggestion is helpful.
    Helpful,
    /// The suggestion is not helpful.
    Unhelpful,
    /// The suggestion has been implemented.
    Implemented,
}

impl Rating {
    /// The feedback state this rating moves a suggestion into.
    #[must_use]
    pub const fn target_state(self) -> FeedbackState {
        match self {
            Self::Helpful => FeedbackState::Helpful,
            Self::Unhelpful => FeedbackState::Unhelpful,
            Self::Implemented => FeedbackState::Implemented,
        }
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.target_state().fmt(f)
    }
}

impl FeedbackState {
    /// Returns `true` if a suggestion in this state may be rated `rating`.
    ///
    /// Allowed: `unrated -> helpful`, `unrated -> unhelpful`,
    /// `helpful -> implemented`. Re-rating with the current value is always
    /// allowed and is a no-op.
    ///
    /// # Examples
    ///
    /// ```
    /// use lessonlift_pipeline::{FeedbackState, Rating};
    ///
    /// assert!(FeedbackState::Unrated.accepts(Rating::Helpful));
    /// assert!(FeedbackState::Helpful.accepts(Rating::Implemented));
    /// assert!(!FeedbackState::Unhelpful.accepts(Rating::Implemented));
    /// ```
    #[must_use]
    pub const fn accepts(self, rating: Rating) -> bool {
        matches!(
            (self, rating),
            (Self::Unrated, Rating::Helpful | Rating::Unhelpful)
                | (Self::Helpful, Rating::Implemented | Rating::Helpful)
                | (Self::Unhelpful, Rating::Unhelpful)
                | (Self::Implemented, Rating::Implemented)
        )
    }
}

/// An AI-generated, framework-tagged improvement recommendation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// Suggestion identifier.
    pub id: String,
    /// The pedagogical dimension this suggestion addresses.
    pub framework_principle: FrameworkPrinciple,
    /// Optional sub-topic within the principle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    /// The recommendation itself.
    pub suggestion_text: String,
    /// Why the recommendation helps.
    #[serde(default)]
    pub rationale: String,
    /// How a teacher might put it into practice.
    #[serde(default)]
    pub implementation_hint: String,
    /// Teacher feedback so far.
    #[serde(default)]
    pub feedback_state: FeedbackState,
}

// ============================================================================
// Enhancements
// ============================================================================

/// The kind of textual edit a change performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// New text is inserted.
    Addition,
    /// Existing text is rewritten.
    Modification,
    /// Existing text is deleted.
    Removal,
}

impl ChangeType {
    /// Infers the change type from the fragment texts.
    #[must_use]
    pub fn infer(original_text: &str, enhanced_text: &str) -> Self {
        if original_text.trim().is_empty() {
            Self::Addition
        } else if enhanced_text.trim().is_empty() {
            Self::Removal
        } else {
            Self::Modification
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Addition => write!(f, "addition"),
            Self::Modification => write!(f, "modification"),
            Self::Removal => write!(f, "removal"),
        }
    }
}

/// Expected impact of a change on the lesson.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    /// Minor improvement.
    Low,
    /// Noticeable improvement.
    #[default]
    Medium,
    /// Substantial improvement.
    High,
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Where in the base document a change should be applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeLocation {
    /// No positional hint; fragment order is the only signal.
    #[default]
    Unanchored,
    /// Apply at or after the first occurrence of `text`.
    Anchor {
        /// Text that precedes the change.
        text: String,
    },
    /// Character offsets into the base document.
    Range {
        /// Inclusive start offset, in characters.
        start: usize,
        /// Exclusive end offset, in characters.
        end: usize,
    },
}

/// A concrete proposed edit derived from a suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enhancement {
    /// Change identifier, unique within its preview.
    pub id: String,
    /// The suggestion this change came from, if any.
    #[serde(default)]
    pub suggestion_id: Option<String>,
    /// The kind of edit.
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    /// Positional hint for the composer.
    #[serde(default)]
    pub location: ChangeLocation,
    /// Text being replaced or removed (empty for pure additions).
    #[serde(default)]
    pub original_text: String,
    /// Replacement text (empty for removals).
    #[serde(default)]
    pub enhanced_text: String,
    /// Why this edit helps.
    #[serde(default)]
    pub rationale: String,
    /// Expected impact.
    #[serde(default)]
    pub impact: Impact,
}

// ============================================================================
// Preview
// ============================================================================

/// Word counts before and after composition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewStatistics {
    /// Words in the base content.
    pub original_word_count: usize,
    /// Words in the enhanced content.
    pub enhanced_word_count: usize,
}

/// How a preview's enhanced content was produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionMode {
    /// The collaborator supplied the merged document.
    Merged,
    /// The composer substituted fragments into the base content.
    #[default]
    Fragments,
}

/// Where a change landed when its preview was composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Placement {
    /// Replaces base content bytes `start..end`. Insertions have `start == end`.
    Span {
        /// Byte offset where the replaced text starts.
        start: usize,
        /// Byte offset just past the replaced text.
        end: usize,
    },
    /// Appended after the base content.
    Appended,
    /// Could not be placed; leaves the text untouched.
    Unplaced,
}

/// The composed result of applying a suggestion's changes to a document snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    /// Preview identifier.
    pub id: String,
    /// The lesson the preview was built from.
    pub lesson_id: String,
    /// The suggestion that was expanded.
    pub suggestion_id: String,
    /// Snapshot of the lesson content at expansion time. Never changes.
    pub base_content: String,
    /// Fingerprint of `base_content`.
    pub base_fingerprint: String,
    /// Content with every proposed change applied.
    pub enhanced_content: String,
    /// Proposed changes, in collaborator order.
    pub changes: Vec<Enhancement>,
    /// Word accounting for the composed content.
    pub statistics: PreviewStatistics,
    /// How `enhanced_content` was produced.
    pub mode: CompositionMode,
    /// Where each change sits in the base content, one per change in change order.
    #[serde(default)]
    pub placements: Vec<Placement>,
    /// Changes the composer could not place in the base content.
    #[serde(default)]
    pub unplaced_change_ids: Vec<String>,
    /// When the preview was built.
    pub created_at: DateTime<Utc>,
}

impl Preview {
    /// Returns `true` if the preview contains a change with this id.
    #[must_use]
    pub fn has_change(&self, change_id: &str) -> bool {
        self.changes.iter().any(|c| c.id == change_id)
    }

    /// Returns the change ids in preview order.
    #[must_use]
    pub fn change_ids(&self) -> Vec<String> {
        self.changes.iter().map(|c| c.id.clone()).collect()
    }
}

// ============================================================================
// ConfirmedEnhancement
// ============================================================================

/// Word accounting for a confirmed enhancement.
///
/// `original_word_count + word_delta == enhanced_word_count` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationStatistics {
    /// Words in the base content.
    pub original_word_count: usize,
    /// Words in the resulting document.
    pub enhanced_word_count: usize,
    /// Number of changes applied.
    pub changes_applied: usize,
    /// Signed difference between the two word counts.
    pub word_delta: i64,
}

impl ConfirmationStatistics {
    /// Computes statistics from the two texts and the applied change count.
    #[must_use]
    pub fn between(original: &str, enhanced: &str, changes_applied: usize) -> Self {
        let original_word_count = word_count(original);
        let enhanced_word_count = word_count(enhanced);
        let word_delta = i64::try_from(enhanced_word_count).unwrap_or(i64::MAX)
            - i64::try_from(original_word_count).unwrap_or(i64::MAX);
        Self {
            original_word_count,
            enhanced_word_count,
            changes_applied,
            word_delta,
        }
    }
}

/// The audited outcome of confirming a selection against a preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedEnhancement {
    /// The preview that was confirmed.
    pub preview_id: String,
    /// The lesson the preview was built from.
    pub lesson_id: String,
    /// The original document, retained unmodified.
    pub original_document_id: String,
    /// Applied change ids, in preview order.
    pub applied_change_ids: Vec<String>,
    /// The new document handed to the lesson editor.
    pub resulting_document: LessonDocument,
    /// Word accounting.
    pub statistics: ConfirmationStatistics,
    /// When the confirmation happened.
    pub applied_at: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count_and_fingerprint() {
        let doc = LessonDocument::new("l1", "Fractions", "Intro. Activity. Closing.");
        assert_eq!(doc.word_count(), 3);
        assert_eq!(doc.fingerprint().len(), 64);
        assert_eq!(doc.fingerprint(), fingerprint("Intro. Activity. Closing."));
        assert_ne!(doc.fingerprint(), fingerprint("Intro. Activity."));
    }

    #[test]
    fn test_framework_principle_parsing() {
        assert_eq!(
            FrameworkPrinciple::parse("Inquiry-Based"),
            FrameworkPrinciple::InquiryBased
        );
        assert_eq!(
            FrameworkPrinciple::parse("assessment_informed"),
            FrameworkPrinciple::AssessmentInformed
        );
        assert_eq!(
            FrameworkPrinciple::parse("Universal Design"),
            FrameworkPrinciple::Other("Universal Design".to_string())
        );
    }

    #[test]
    fn test_framework_principle_serde() {
        let json = serde_json::to_string(&FrameworkPrinciple::RealWorldConnection).unwrap();
        assert_eq!(json, r#""real-world-connection""#);

        let principle: FrameworkPrinciple = serde_json::from_str(r#""UDL""#).unwrap();
        assert_eq!(principle.to_string(), "UDL");
    }

    #[test]
    fn test_feedback_transitions() {
        use FeedbackState::{Helpful, Implemented, Unhelpful, Unrated};

        assert!(Unrated.accepts(Rating::Helpful));
        assert!(Unrated.accepts(Rating::Unhelpful));
        assert!(!Unrated.accepts(Rating::Implemented));

        assert!(Helpful.accepts(Rating::Implemented));
        assert!(Helpful.accepts(Rating::Helpful));
        assert!(!Helpful.accepts(Rating::Unhelpful));

        assert!(!Unhelpful.accepts(Rating::Implemented));
        assert!(!Unhelpful.accepts(Rating::Helpful));
        assert!(Unhelpful.accepts(Rating::Unhelpful));

        assert!(!Implemented.accepts(Rating::Helpful));
        assert!(Implemented.accepts(Rating::Implemented));
    }

    #[test]
    fn test_suggestion_deserialization_defaults() {
        let json = r#"{
            "id": "s1",
            "frameworkPrinciple": "assessment-informed",
            "suggestionText": "Add a formative check after the activity"
        }"#;

        let suggestion: Suggestion = serde_json::from_str(json).unwrap();
        assert_eq!(
            suggestion.framework_principle,
            FrameworkPrinciple::AssessmentInformed
        );
        assert_eq!(suggestion.feedback_state, FeedbackState::Unrated);
        assert!(suggestion.element.is_none());
        assert!(suggestion.rationale.is_empty());
    }

    #[test]
    fn test_change_type_inference() {
        assert_eq!(ChangeType::infer("", "New step."), ChangeType::Addition);
        assert_eq!(ChangeType::infer("Old step.", " "), ChangeType::Removal);
        assert_eq!(
            ChangeType::infer("Old step.", "Better step."),
            ChangeType::Modification
        );
    }

    #[test]
    fn test_change_location_serde() {
        let json = serde_json::to_string(&ChangeLocation::Range { start: 3, end: 9 }).unwrap();
        assert_eq!(json, r#"{"kind":"range","start":3,"end":9}"#);

        let location: ChangeLocation =
            serde_json::from_str(r#"{"kind":"anchor","text":"Activity."}"#).unwrap();
        assert_eq!(
            location,
            ChangeLocation::Anchor {
                text: "Activity.".to_string()
            }
        );
    }

    #[test]
    fn test_enhancement_serializes_type_field() {
        let change = Enhancement {
            id: "e1".to_string(),
            suggestion_id: Some("s1".to_string()),
            change_type: ChangeType::Modification,
            location: ChangeLocation::Unanchored,
            original_text: "Activity.".to_string(),
            enhanced_text: "Activity. Quick check: 2 questions.".to_string(),
            rationale: "add formative check".to_string(),
            impact: Impact::default(),
        };

        let json = serde_json::to_string(&change).unwrap();
        assert!(json.contains(r#""type":"modification""#));
        assert!(json.contains(r#""impact":"medium""#));
        assert!(json.contains(r#""originalText":"Activity.""#));
    }

    #[test]
    fn test_confirmation_statistics_word_accounting() {
        let stats = ConfirmationStatistics::between(
            "Intro. Activity. Closing.",
            "Intro. Activity. Quick check: 2 questions. Closing.",
            1,
        );
        assert_eq!(stats.original_word_count, 3);
        assert_eq!(stats.enhanced_word_count, 7);
        assert_eq!(stats.word_delta, 4);

        let shrink = ConfirmationStatistics::between("one two three", "one", 1);
        assert_eq!(shrink.word_delta, -2);
        assert_eq!(
            i64::try_from(shrink.original_word_count).unwrap() + shrink.word_delta,
            i64::try_from(shrink.enhanced_word_count).unwrap()
        );
    }
}
