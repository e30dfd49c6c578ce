//! Markdown report generation for confirmed enhancements.
//!
//! This module provides the [`MarkdownGenerator`] struct for converting an
//! [`EnhancementReport`] into a human-readable Markdown document. The
//! generated report includes:
//!
//! - A summary table with identifiers and word accounting
//! - The applied changes, with before and after text
//! - The declined changes, kept for reference
//!
//! # Example
//!
//! ```rust
//! use lessonlift_report::{EnhancementReport, MarkdownGenerator, WordStatistics};
//!
//! let report = EnhancementReport::builder()
//!     .lesson_title("Fractions")
//!     .statistics(WordStatistics::default())
//!     .build()
//!     .unwrap();
//!
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# Lesson Enhancement Report: Fractions"));
//! ```

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::{ChangeEntry, EnhancementReport};

/// Generates Markdown reports from confirmed enhancements.
pub struct MarkdownGenerator<'a> {
    report: &'a EnhancementReport,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a EnhancementReport) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        write_change_section(
            &mut output,
            "Applied Changes",
            "*No changes applied.*",
            &self.report.applied().collect::<Vec<_>>(),
        );
        write_change_section(
            &mut output,
            "Declined Changes",
            "*No changes declined.*",
            &self.report.declined().collect::<Vec<_>>(),
        );
        self.write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Lesson Enhancement Report: {}\n",
            escape_markdown(&self.report.lesson_title)
        );
    }

    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;
        let stats = &self.report.statistics;
        let counts = self.report.outcome_counts();
        let suggestion = summary
            .suggestion_text
            .as_deref()
            .unwrap_or(&summary.suggestion_id);

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Lesson | {} |", escape_markdown(&summary.lesson_id));
        let _ = writeln!(output, "| Preview | {} |", escape_markdown(&summary.preview_id));
        let _ = writeln!(output, "| Suggestion | {} |", escape_markdown(suggestion));
        let _ = writeln!(
            output,
            "| Confirmed | {} |",
            format_timestamp(&summary.confirmed_at)
        );
        let _ = writeln!(
            output,
            "| Changes Applied | {} of {} |",
            counts.applied,
            counts.total()
        );
        let _ = writeln!(
            output,
            "| Word Count | {} → {} ({:+}) |",
            stats.original_word_count, stats.enhanced_word_count, stats.word_delta
        );
        let _ = writeln!(output);
    }

    fn write_footer(&self, output: &mut String) {
        let summary = &self.report.summary;
        let _ = writeln!(output, "---");
        let _ = writeln!(
            output,
            "*Original document {} retained. Resulting document: {}*",
            escape_markdown(&summary.original_document_id),
            escape_markdown(&summary.resulting_document_id)
        );
    }
}

fn write_change_section(output: &mut String, title: &str, empty: &str, changes: &[&ChangeEntry]) {
    let _ = writeln!(output, "## {title}\n");

    if changes.is_empty() {
        let _ = writeln!(output, "{empty}\n");
        return;
    }

    for change in changes {
        write_change(output, change);
    }
}

fn write_change(output: &mut String, change: &ChangeEntry) {
    let _ = writeln!(
        output,
        "### {} ({}, {} impact)\n",
        escape_markdown(&change.id),
        change.kind,
        change.impact
    );
    let _ = writeln!(output, "**Before**: {}", quote_or_none(&change.original_text));
    let _ = writeln!(output, "**After**: {}", quote_or_none(&change.enhanced_text));
    if !change.rationale.trim().is_empty() {
        let _ = writeln!(output, "**Rationale**: {}", escape_markdown(&change.rationale));
    }
    let _ = writeln!(output);
}

// ============================================================================
// Helper Functions
// ============================================================================

fn quote_or_none(text: &str) -> String {
    if text.trim().is_empty() {
        "*(none)*".to_string()
    } else {
        escape_markdown(text.trim())
    }
}

/// Format: "YYYY-MM-DD HH:MM:SS UTC"
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes special Markdown characters so lesson text renders literally.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
