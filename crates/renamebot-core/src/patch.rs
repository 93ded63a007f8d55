//! Span-based batch edits for source rewriting.
//!
//! The renamer resolves every directive against the original source before
//! anything is rewritten, then hands the full batch of [`SourceEdit`]s to
//! [`apply_edits`]. Edits are applied from the end of the file toward the
//! start so earlier spans stay valid while later text shifts.
//!
//! Overlapping spans are rejected: two directives that touch the same bytes
//! indicate conflicting renames, and applying either would corrupt the other.

use serde::{Deserialize, Serialize};
use std::fmt;

use thiserror::Error;

// ============================================================================
// Span
// ============================================================================

/// Byte offsets into file content, half-open: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
}

impl Span {
    /// Create a new span.
    ///
    /// # Panics
    /// Panics if `start > end`.
    pub fn new(start: usize, end: usize) -> Self {
        assert!(start <= end, "span start ({start}) must be <= end ({end})");
        Span { start, end }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Check if the span is empty.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check if this span overlaps another.
    ///
    /// Adjacent spans (one ends where the other starts) do NOT overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

// ============================================================================
// Edits
// ============================================================================

/// A single replacement of a byte span with new text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEdit {
    /// The byte span to replace.
    pub span: Span,
    /// The replacement text.
    pub replacement: String,
}

impl SourceEdit {
    /// Create a new edit.
    pub fn new(span: Span, replacement: impl Into<String>) -> Self {
        SourceEdit {
            span,
            replacement: replacement.into(),
        }
    }
}

/// Errors from applying a batch of edits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// A span extends beyond the source length.
    #[error("edit span {span} is out of bounds for source of length {source_len}")]
    SpanOutOfBounds { span: Span, source_len: usize },

    /// Two edits overlap.
    #[error("overlapping edit spans {first} and {second}")]
    OverlappingSpans { first: Span, second: Span },
}

/// Apply a batch of edits to the source, returning the rewritten text.
///
/// An empty batch returns the source unchanged. Edits may be given in any
/// order; they are applied from the end of the source toward the start.
///
/// # Errors
///
/// Returns [`EditError::SpanOutOfBounds`] if any span extends beyond the
/// source and [`EditError::OverlappingSpans`] if any two spans overlap.
pub fn apply_edits(source: &str, mut edits: Vec<SourceEdit>) -> Result<String, EditError> {
    let source_len = source.len();
    for edit in &edits {
        if edit.span.end > source_len {
            return Err(EditError::SpanOutOfBounds {
                span: edit.span,
                source_len,
            });
        }
    }

    // Reverse order by start so applying an edit never shifts an earlier span.
    edits.sort_by(|a, b| b.span.start.cmp(&a.span.start));

    for pair in edits.windows(2) {
        // After the reverse sort, pair[0].start >= pair[1].start.
        if pair[1].span.end > pair[0].span.start {
            return Err(EditError::OverlappingSpans {
                first: pair[1].span,
                second: pair[0].span,
            });
        }
    }

    let mut result = source.to_string();
    for edit in &edits {
        result.replace_range(edit.span.start..edit.span.end, &edit.replacement);
    }
    Ok(result)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod span_tests {
        use super::*;

        #[test]
        fn overlap_detection() {
            let a = Span::new(0, 5);
            let b = Span::new(4, 8);
            let c = Span::new(5, 8);
            assert!(a.overlaps(&b));
            assert!(!a.overlaps(&c)); // adjacent, not overlapping
        }

        #[test]
        fn len_and_empty() {
            assert_eq!(Span::new(2, 7).len(), 5);
            assert!(Span::new(3, 3).is_empty());
        }

        #[test]
        #[should_panic(expected = "must be <=")]
        fn inverted_span_panics() {
            let _ = Span::new(5, 2);
        }
    }

    mod apply_tests {
        use super::*;

        #[test]
        fn single_edit() {
            let source = "rr := R{}";
            let edits = vec![SourceEdit::new(Span::new(0, 2), "r")];
            assert_eq!(apply_edits(source, edits).unwrap(), "r := R{}");
        }

        #[test]
        fn multiple_edits_any_order() {
            let source = "func g() { rr := R{}; _ = rr }";
            let edits = vec![
                SourceEdit::new(Span::new(26, 28), "r"),
                SourceEdit::new(Span::new(11, 13), "r"),
            ];
            assert_eq!(
                apply_edits(source, edits).unwrap(),
                "func g() { r := R{}; _ = r }"
            );
        }

        #[test]
        fn empty_batch_is_identity() {
            let source = "unchanged";
            assert_eq!(apply_edits(source, Vec::new()).unwrap(), "unchanged");
        }

        #[test]
        fn replacement_longer_than_original() {
            let source = "x := 1";
            let edits = vec![SourceEdit::new(Span::new(0, 1), "value")];
            assert_eq!(apply_edits(source, edits).unwrap(), "value := 1");
        }

        #[test]
        fn out_of_bounds_rejected() {
            let err = apply_edits("abc", vec![SourceEdit::new(Span::new(1, 10), "x")]);
            assert!(matches!(err, Err(EditError::SpanOutOfBounds { .. })));
        }

        #[test]
        fn overlapping_rejected() {
            let edits = vec![
                SourceEdit::new(Span::new(0, 4), "a"),
                SourceEdit::new(Span::new(2, 6), "b"),
            ];
            let err = apply_edits("abcdefgh", edits);
            assert!(matches!(err, Err(EditError::OverlappingSpans { .. })));
        }

        #[test]
        fn adjacent_edits_allowed() {
            let edits = vec![
                SourceEdit::new(Span::new(0, 2), "xy"),
                SourceEdit::new(Span::new(2, 4), "zw"),
            ];
            assert_eq!(apply_edits("abcd", edits).unwrap(), "xyzw");
        }
    }
}
