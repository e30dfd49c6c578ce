//! Deterministic composition of enhanced lesson text.
//!
//! The collaborator answers an apply request in one of two shapes: a fully
//! merged document, or a list of fragments to substitute into the base
//! content. [`compose`] handles both and never fails; fragments it cannot
//! place are reported in [`Composition::unplaced`] and leave the text untouched.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::model::{
    word_count, ChangeLocation, ChangeType, Enhancement, Placement, PreviewStatistics,
};

/// Matches runs of whitespace.
#[allow(clippy::expect_used)]
static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Lowercases `text` and collapses whitespace runs to single spaces.
///
/// ```
/// use lessonlift_pipeline::composer::normalize_whitespace;
///
/// assert_eq!(normalize_whitespace("  Add a\n\tQuick  Check "), "add a quick check");
/// ```
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RUN
        .replace_all(text.trim(), " ")
        .to_lowercase()
}

/// The two response shapes of an apply request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnhancementPayload {
    /// The collaborator already merged every change into this text.
    FullDocument(String),
    /// Changes to substitute into the base content.
    FragmentList(Vec<Enhancement>),
}

/// Output of [`compose`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    /// The enhanced document text.
    pub enhanced_content: String,
    /// Word counts of the base and enhanced text.
    pub statistics: PreviewStatistics,
    /// Where each fragment went, in fragment order. Empty for a full document.
    pub placements: Vec<Placement>,
    /// Ids of fragments that could not be placed, in fragment order.
    pub unplaced: Vec<String>,
}

/// Derives enhanced text and statistics from `base` and `payload`.
///
/// # Examples
///
/// ```
/// use lessonlift_pipeline::composer::{compose, EnhancementPayload};
///
/// let composition = compose("Intro.", &EnhancementPayload::FullDocument("Intro. More.".into()));
/// assert_eq!(composition.enhanced_content, "Intro. More.");
/// assert_eq!(composition.statistics.enhanced_word_count, 2);
/// ```
#[must_use]
pub fn compose(base: &str, payload: &EnhancementPayload) -> Composition {
    let (enhanced_content, placements, unplaced) = match payload {
        EnhancementPayload::FullDocument(text) => (text.clone(), Vec::new(), Vec::new()),
        EnhancementPayload::FragmentList(fragments) => substitute(base, fragments),
    };

    let statistics = PreviewStatistics {
        original_word_count: word_count(base),
        enhanced_word_count: word_count(&enhanced_content),
    };

    Composition {
        enhanced_content,
        statistics,
        placements,
        unplaced,
    }
}

// ============================================================================
// Placement
// ============================================================================

/// Resolves where each fragment goes in `base`, one [`Placement`] per
/// fragment in fragment order.
///
/// Placements are resolved against the untouched base text and never
/// overlap, so any subset of them can be rendered with [`render`] and each
/// change lands exactly where it did in the full composition.
#[must_use]
pub fn resolve(base: &str, fragments: &[Enhancement]) -> Vec<Placement> {
    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut cursor = 0;

    fragments
        .iter()
        .map(|fragment| {
            let placement = place(base, fragment, cursor, &claimed);
            match placement {
                Placement::Span { start, end } => {
                    cursor = end;
                    claimed.push((start, end));
                }
                Placement::Unplaced => {
                    debug!(change_id = %fragment.id, "Could not place change in base content");
                }
                Placement::Appended => {}
            }
            placement
        })
        .collect()
}

/// Renders `placed` fragments into `base` at their resolved placements.
///
/// Unplaced entries are skipped. Appended fragments follow the base text in
/// the order given.
#[must_use]
pub fn render(base: &str, placed: &[(&Enhancement, Placement)]) -> String {
    let mut edits: Vec<Edit> = Vec::new();
    let mut appended: Vec<&str> = Vec::new();

    for (order, (fragment, placement)) in placed.iter().enumerate() {
        match *placement {
            Placement::Span { start, end } if start <= end && end <= base.len() => {
                let replacement = match fragment.change_type {
                    ChangeType::Removal => fragment.enhanced_text.trim(),
                    _ => fragment.enhanced_text.as_str(),
                };
                edits.push(Edit {
                    start,
                    end,
                    replacement,
                    order,
                });
            }
            Placement::Appended => appended.push(fragment.enhanced_text.trim()),
            Placement::Span { .. } | Placement::Unplaced => {}
        }
    }

    edits.sort_by_key(|e| (e.start, !e.is_insertion(), e.order));
    let mut text = assemble(base, &edits);

    let separator = if base.contains('\n') { "\n\n" } else { " " };
    for addition in appended.into_iter().filter(|a| !a.is_empty()) {
        let kept = text.trim_end().len();
        text.truncate(kept);
        if !text.is_empty() {
            text.push_str(separator);
        }
        text.push_str(addition);
    }
    text
}

/// A resolved edit against the base text, in byte offsets.
#[derive(Debug, Clone)]
struct Edit<'a> {
    start: usize,
    end: usize,
    replacement: &'a str,
    order: usize,
}

impl Edit<'_> {
    const fn is_insertion(&self) -> bool {
        self.start == self.end
    }
}

const fn overlaps(a: (usize, usize), b: (usize, usize)) -> bool {
    match (a.0 == a.1, b.0 == b.1) {
        (true, true) => false,
        (true, false) => b.0 < a.0 && a.0 < b.1,
        (false, true) => a.0 < b.0 && b.0 < a.1,
        (false, false) => a.0 < b.1 && b.0 < a.1,
    }
}

fn substitute(base: &str, fragments: &[Enhancement]) -> (String, Vec<Placement>, Vec<String>) {
    let placements = resolve(base, fragments);
    let placed: Vec<(&Enhancement, Placement)> =
        fragments.iter().zip(placements.iter().copied()).collect();
    let unplaced = placed
        .iter()
        .filter(|(_, placement)| *placement == Placement::Unplaced)
        .map(|(fragment, _)| fragment.id.clone())
        .collect();
    (render(base, &placed), placements, unplaced)
}

fn place(base: &str, fragment: &Enhancement, cursor: usize, claimed: &[(usize, usize)]) -> Placement {
    let original = fragment.original_text.as_str();
    let is_free = |start: usize, end: usize| claimed.iter().all(|&span| !overlaps(span, (start, end)));

    if let ChangeLocation::Range { start, end } = fragment.location {
        if let Some((s, e)) = char_span_to_bytes(base, start, end) {
            let covered = &base[s..e];
            if (original.is_empty() || covered == original) && is_free(s, e) {
                return Placement::Span { start: s, end: e };
            }
        }
    }

    let mut search_from = cursor;
    if let ChangeLocation::Anchor { text } = &fragment.location {
        if let Some(found) = (!text.is_empty()).then(|| base.find(text.as_str())).flatten() {
            let after_anchor = found + text.len();
            if original.trim().is_empty() {
                return if is_free(after_anchor, after_anchor) {
                    Placement::Span {
                        start: after_anchor,
                        end: after_anchor,
                    }
                } else {
                    Placement::Unplaced
                };
            }
            search_from = found;
        }
    }

    if original.trim().is_empty() {
        return Placement::Appended;
    }

    let candidates = occurrences(base, original);
    if candidates.is_empty() {
        return match fragment.change_type {
            ChangeType::Removal => Placement::Unplaced,
            _ if fragment.enhanced_text.trim().is_empty() => Placement::Unplaced,
            _ => Placement::Appended,
        };
    }

    let (after, before): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|&(start, _)| start >= search_from);
    after
        .into_iter()
        .chain(before)
        .find(|&(start, end)| is_free(start, end))
        .map_or(Placement::Unplaced, |(start, end)| Placement::Span { start, end })
}

/// All matches of `needle` in `haystack`, exact first, then whitespace-insensitive.
fn occurrences(haystack: &str, needle: &str) -> Vec<(usize, usize)> {
    let exact: Vec<_> = haystack
        .match_indices(needle)
        .map(|(start, m)| (start, start + m.len()))
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    let pattern = needle
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    Regex::new(&pattern).map_or_else(
        |_| Vec::new(),
        |re| re.find_iter(haystack).map(|m| (m.start(), m.end())).collect(),
    )
}

fn char_span_to_bytes(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    if start > end {
        return None;
    }
    let byte_at = |index: usize| {
        text.char_indices()
            .map(|(b, _)| b)
            .chain(std::iter::once(text.len()))
            .nth(index)
    };
    Some((byte_at(start)?, byte_at(end)?))
}

fn assemble(base: &str, edits: &[Edit<'_>]) -> String {
    let mut out = String::with_capacity(base.len());
    let mut pos = 0;
    let mut collapse_space = false;

    for edit in edits {
        push_segment(&mut out, &base[pos..edit.start], collapse_space);
        collapse_space = false;

        if edit.is_insertion() {
            let insertion = edit.replacement.trim();
            if insertion.is_empty() {
                continue;
            }
            if out.chars().next_back().is_some_and(|c| !c.is_whitespace()) {
                out.push(' ');
            }
            out.push_str(insertion);
            if base[edit.start..].chars().next().is_some_and(|c| !c.is_whitespace()) {
                out.push(' ');
            }
        } else {
            out.push_str(edit.replacement);
            collapse_space = edit.replacement.is_empty();
        }
        pos = edit.end;
    }

    push_segment(&mut out, &base[pos..], collapse_space);
    out
}

/// Appends `segment`, dropping one leading space after a removal so the
/// removed text does not leave a double space behind.
fn push_segment(out: &mut String, segment: &str, collapse_space: bool) {
    let at_boundary = out.is_empty() || out.ends_with(char::is_whitespace);
    match segment.strip_prefix(' ') {
        Some(rest) if collapse_space && at_boundary => out.push_str(rest),
        _ => out.push_str(segment),
    }
}
