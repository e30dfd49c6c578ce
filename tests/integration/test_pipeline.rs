//! End-to-end tests of the enhancement pipeline through [`EnhancementSession`].
//!
//! The AI backend is replaced by an in-process stub so that each scenario
//! controls exactly what the collaborator returns.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use lessonlift_pipeline::collaborator::{
    ApplyRequest, ApplyResponse, ConfirmRequest, ConfirmResponse, GenerateRequest,
    GenerateResponse, RateRequest, RateResponse, RawEnhancement, RawSuggestion,
};
use lessonlift_pipeline::{
    word_count, Collaborator, Config, ConfirmationStrategy, EnhancementSession, ErrorKind,
    FeedbackState, FrameworkPrinciple, LessonDocument, Rating, Result,
};

const BASE: &str = "Intro. Activity. Closing.";
const ENHANCED: &str = "Intro. Activity. Quick check: 2 questions. Closing.";

/// Scripted stand-in for the AI backend.
#[derive(Debug, Default)]
struct StubBackend {
    suggestions: Vec<RawSuggestion>,
    changes: Vec<RawEnhancement>,
    preview_lesson: Option<String>,
    enhanced_lesson: String,
    delay: Option<Duration>,
    generate_calls: AtomicUsize,
    confirm_calls: AtomicUsize,
}

impl StubBackend {
    fn formative_check() -> Self {
        Self {
            suggestions: vec![RawSuggestion {
                id: Some("s1".to_string()),
                framework_principle: FrameworkPrinciple::AssessmentInformed,
                element: None,
                suggestion_text: "Add a formative check".to_string(),
                rationale: "Checks understanding before moving on".to_string(),
                implementation_hint: "Two quick questions after the activity".to_string(),
            }],
            changes: vec![RawEnhancement {
                id: Some("e1".to_string()),
                original_text: "Activity.".to_string(),
                enhanced_text: "Activity. Quick check: 2 questions.".to_string(),
                ..RawEnhancement::default()
            }],
            enhanced_lesson: ENHANCED.to_string(),
            ..Self::default()
        }
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Collaborator for StubBackend {
    fn generate_suggestions(
        &self,
        _request: GenerateRequest,
    ) -> BoxFuture<'_, Result<GenerateResponse>> {
        Box::pin(async move {
            self.generate_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            Ok(GenerateResponse {
                suggestions: self.suggestions.clone(),
            })
        })
    }

    fn rate_suggestion(&self, _request: RateRequest) -> BoxFuture<'_, Result<RateResponse>> {
        Box::pin(async move { Ok(RateResponse { ack: true }) })
    }

    fn apply_suggestion(&self, _request: ApplyRequest) -> BoxFuture<'_, Result<ApplyResponse>> {
        Box::pin(async move {
            self.pause().await;
            Ok(ApplyResponse {
                enhancements: self.changes.clone(),
                preview_lesson: self.preview_lesson.clone(),
            })
        })
    }

    fn confirm_enhancement(
        &self,
        _request: ConfirmRequest,
    ) -> BoxFuture<'_, Result<ConfirmResponse>> {
        Box::pin(async move {
            self.confirm_calls.fetch_add(1, Ordering::SeqCst);
            self.pause().await;
            Ok(ConfirmResponse {
                enhanced_lesson: self.enhanced_lesson.clone(),
                statistics: None,
            })
        })
    }
}

fn session_with(backend: &Arc<StubBackend>, strategy: ConfirmationStrategy) -> EnhancementSession {
    let config = Config {
        confirmation_strategy: strategy,
        ..Config::default()
    };
    EnhancementSession::new(backend.clone(), &config)
}

fn lesson() -> LessonDocument {
    LessonDocument::new("l1", "Fractions", BASE)
}

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

// ============================================================================
// Literal scenarios
// ============================================================================

#[tokio::test]
async fn empty_generation_leaves_catalog_unchanged() {
    let backend = Arc::new(StubBackend::default());
    let session = session_with(&backend, ConfirmationStrategy::Local);

    let added = session
        .generate("l1", serde_json::json!({}), Vec::new())
        .await
        .expect("generation succeeds");

    assert!(added.is_empty());
    assert!(session.suggestions("l1").is_empty());
    assert_eq!(session.overview().suggestion_count, 0);
}

#[tokio::test]
async fn single_change_composes_into_preview() {
    let backend = Arc::new(StubBackend::formative_check());
    let session = session_with(&backend, ConfirmationStrategy::Local);
    session
        .generate("l1", serde_json::json!({}), Vec::new())
        .await
        .expect("generation succeeds");

    let (preview, selection) = session.apply("s1", &lesson()).await.expect("apply succeeds");

    assert_eq!(preview.enhanced_content, ENHANCED);
    assert_eq!(preview.statistics.original_word_count, 3);
    assert_eq!(preview.statistics.enhanced_word_count, 7);
    assert!(preview.unplaced_change_ids.is_empty());
    assert!(selection.is_empty());
}

#[tokio::test]
async fn double_confirm_returns_identical_result() {
    let backend = Arc::new(StubBackend::formative_check());
    let session = session_with(&backend, ConfirmationStrategy::Local);
    session
        .generate("l1", serde_json::json!({}), Vec::new())
        .await
        .expect("generation succeeds");
    let (preview, _) = session.apply("s1", &lesson()).await.expect("apply succeeds");
    session.toggle(&preview.id, "e1").expect("toggle succeeds");

    let first = session
        .confirm(&preview.id, &lesson(), None)
        .await
        .expect("first confirm succeeds");
    let second = session
        .confirm(&preview.id, &lesson(), None)
        .await
        .expect("second confirm succeeds");

    assert_eq!(first, second);
    assert_eq!(first.statistics.changes_applied, 1);
    assert_eq!(first.resulting_document.content, ENHANCED);
    assert_eq!(session.overview().confirmed_count, 1);
}

#[tokio::test]
async fn empty_selection_is_a_validation_error() {
    let backend = Arc::new(StubBackend::formative_check());
    let session = session_with(&backend, ConfirmationStrategy::Remote);
    session
        .generate("l1", serde_json::json!({}), Vec::new())
        .await
        .expect("generation succeeds");
    let (preview, _) = session.apply("s1", &lesson()).await.expect("apply succeeds");

    let err = session
        .confirm(&preview.id, &lesson(), Some(Vec::new()))
        .await
        .expect_err("empty selection is rejected");

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(backend.confirm_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stale_preview_is_a_conflict() {
    let backend = Arc::new(StubBackend::formative_check());
    let session = session_with(&backend, ConfirmationStrategy::Local);
    session
        .generate("l1", serde_json::json!({}), Vec::new())
        .await
        .expect("generation succeeds");
    let (preview, _) = session.apply("s1", &lesson()).await.expect("apply succeeds");

    let edited = LessonDocument::new("l1", "Fractions", "Intro. Activity. Closing. Homework.");
    let (fresh, _) = session.apply("s1", &edited).await.expect("re-apply succeeds");
    assert_ne!(fresh.id, preview.id);

    let err = session
        .confirm(&preview.id, &edited, Some(ids(&["e1"])))
        .await
        .expect_err("stale lesson is rejected");

    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(session.overview().confirmed_count, 0);

    let confirmed = session
        .confirm(&fresh.id, &edited, Some(ids(&["e1"])))
        .await
        .expect("fresh preview confirms");
    assert_eq!(
        confirmed.resulting_document.content,
        "Intro. Activity. Quick check: 2 questions. Closing. Homework."
    );
    assert_eq!(session.overview().confirmed_count, 1);
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn word_accounting_balances() {
    let mut backend = StubBackend::formative_check();
    backend.changes.push(RawEnhancement {
        id: Some("e2".to_string()),
        original_text: "Closing.".to_string(),
        enhanced_text: String::new(),
        ..RawEnhancement::default()
    });
    let backend = Arc::new(backend);
    let session = session_with(&backend, ConfirmationStrategy::Local);
    session
        .generate("l1", serde_json::json!({}), Vec::new())
        .await
        .expect("generation succeeds");
    let (preview, _) = session.apply("s1", &lesson()).await.expect("apply succeeds");
    session.select_all(&preview.id).expect("select all succeeds");

    let record = session
        .confirm(&preview.id, &lesson(), None)
        .await
        .expect("confirm succeeds");

    let stats = record.statistics;
    assert_eq!(
        i64::try_from(stats.original_word_count).unwrap_or_default() + stats.word_delta,
        i64::try_from(stats.enhanced_word_count).unwrap_or_default()
    );
    assert_eq!(stats.enhanced_word_count, word_count(&record.resulting_document.content));
    assert_eq!(stats.changes_applied, 2);
}

#[tokio::test]
async fn toggling_twice_restores_selection() {
    let backend = Arc::new(StubBackend::formative_check());
    let session = session_with(&backend, ConfirmationStrategy::Local);
    session
        .generate("l1", serde_json::json!({}), Vec::new())
        .await
        .expect("generation succeeds");
    let (preview, before) = session.apply("s1", &lesson()).await.expect("apply succeeds");

    session.toggle(&preview.id, "e1").expect("toggle succeeds");
    let after = session.toggle(&preview.id, "e1").expect("toggle succeeds");

    assert_eq!(before, after);
}

#[tokio::test]
async fn ratings_only_move_forward() {
    let backend = Arc::new(StubBackend::formative_check());
    let session = session_with(&backend, ConfirmationStrategy::Local);
    session
        .generate("l1", serde_json::json!({}), Vec::new())
        .await
        .expect("generation succeeds");

    let rated = session.rate("s1", Rating::Helpful).await.expect("rating succeeds");
    assert_eq!(rated.feedback_state, FeedbackState::Helpful);

    let err = session
        .rate("s1", Rating::Unhelpful)
        .await
        .expect_err("helpful cannot become unhelpful");
    assert_eq!(err.kind(), ErrorKind::Validation);

    let rated = session
        .rate("s1", Rating::Implemented)
        .await
        .expect("rating succeeds");
    assert_eq!(rated.feedback_state, FeedbackState::Implemented);
}

// ============================================================================
// Concurrency and strategies
// ============================================================================

#[tokio::test]
async fn concurrent_generation_is_rejected_as_busy() {
    let backend = Arc::new(StubBackend {
        delay: Some(Duration::from_millis(50)),
        ..StubBackend::formative_check()
    });
    let session = session_with(&backend, ConfirmationStrategy::Local);

    let (first, second) = tokio::join!(
        session.generate("l1", serde_json::json!({}), Vec::new()),
        session.generate("l1", serde_json::json!({}), Vec::new()),
    );

    assert!(first.is_ok());
    assert_eq!(second.expect_err("second call is busy").kind(), ErrorKind::Busy);
    assert_eq!(backend.generate_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn remote_confirmation_calls_backend_once() {
    let backend = Arc::new(StubBackend::formative_check());
    let session = session_with(&backend, ConfirmationStrategy::Remote);
    session
        .generate("l1", serde_json::json!({}), Vec::new())
        .await
        .expect("generation succeeds");
    let (preview, _) = session.apply("s1", &lesson()).await.expect("apply succeeds");

    let first = session
        .confirm(&preview.id, &lesson(), Some(ids(&["e1"])))
        .await
        .expect("confirm succeeds");
    let second = session
        .confirm(&preview.id, &lesson(), Some(ids(&["e1"])))
        .await
        .expect("replay succeeds");

    assert_eq!(first, second);
    assert_eq!(first.resulting_document.content, ENHANCED);
    assert_eq!(backend.confirm_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn full_document_preview_is_used_verbatim() {
    let backend = Arc::new(StubBackend {
        preview_lesson: Some("Intro. Activity. Quick check: 2 questions. Closing.".to_string()),
        ..StubBackend::formative_check()
    });
    let session = session_with(&backend, ConfirmationStrategy::Local);
    session
        .generate("l1", serde_json::json!({}), Vec::new())
        .await
        .expect("generation succeeds");

    let (preview, _) = session.apply("s1", &lesson()).await.expect("apply succeeds");
    assert_eq!(preview.enhanced_content, ENHANCED);

    let report_err = session.report(&preview.id).expect_err("no report before confirm");
    assert_eq!(report_err.kind(), ErrorKind::NotFound);

    session.select_all(&preview.id).expect("select all succeeds");
    session
        .confirm(&preview.id, &lesson(), None)
        .await
        .expect("confirm succeeds");

    let report = session.report(&preview.id).expect("report builds");
    let markdown = lessonlift_report::MarkdownGenerator::new(&report).generate();
    assert!(markdown.contains("| Changes Applied | 1 of 1 |"));
}
