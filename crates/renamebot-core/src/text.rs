//! Text position utilities for byte offset and line:column conversions.
//!
//! Coordinate conventions:
//! - Lines and columns are **1-indexed** (matching editor and `go/token`
//!   conventions)
//! - Byte offsets are **0-indexed**
//! - Columns count bytes, which is exact for the ASCII-dominated source this
//!   engine rewrites and matches what the frontend records in spans

// ============================================================================
// Offset / Position Conversions
// ============================================================================

/// Convert a byte offset to 1-indexed line and column.
///
/// If `offset` exceeds the content length, returns the position just past the
/// end of the content.
pub fn offset_to_position(content: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(content.len());
    let mut line = 1u32;
    let mut col = 1u32;

    for (i, byte) in content.bytes().enumerate() {
        if i >= offset {
            break;
        }
        if byte == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }

    (line, col)
}

/// Convert 1-indexed line and column to a byte offset.
///
/// Zero line/column values are clamped to 1. Positions beyond a line end are
/// clamped to the line end; lines beyond the content clamp to the content
/// length.
pub fn position_to_offset(content: &str, line: u32, col: u32) -> usize {
    let line = line.max(1);
    let col = col.max(1);

    let mut current_line = 1u32;
    for (i, byte) in content.bytes().enumerate() {
        if current_line == line {
            let line_end = content[i..]
                .find('\n')
                .map(|p| i + p)
                .unwrap_or(content.len());
            let offset_in_line = (col as usize).saturating_sub(1);
            return i + offset_in_line.min(line_end - i);
        }
        if byte == b'\n' {
            current_line += 1;
        }
    }

    content.len()
}

// ============================================================================
// Line Extraction
// ============================================================================

/// Get the full line containing a byte offset, without the trailing newline.
pub fn line_at_offset(content: &str, offset: usize) -> &str {
    let offset = offset.min(content.len());
    let start = content[..offset].rfind('\n').map(|p| p + 1).unwrap_or(0);
    let end = content[offset..]
        .find('\n')
        .map(|p| offset + p)
        .unwrap_or(content.len());
    &content[start..end]
}

/// Get the 1-indexed line number containing a byte offset.
pub fn line_number_at_offset(content: &str, offset: usize) -> u32 {
    offset_to_position(content, offset).0
}

/// Get the content of a 1-indexed line, without the trailing newline.
///
/// Returns `None` if the line does not exist.
pub fn nth_line(content: &str, line: u32) -> Option<&str> {
    if line == 0 {
        return None;
    }
    content.lines().nth(line as usize - 1)
}

/// Count the number of lines in the content.
///
/// A trailing newline does not start a new line; empty content has zero lines.
pub fn line_count(content: &str) -> u32 {
    content.lines().count() as u32
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod conversions {
        use super::*;

        #[test]
        fn offset_to_position_simple() {
            let content = "line1\nline2\nline3\n";
            assert_eq!(offset_to_position(content, 0), (1, 1));
            assert_eq!(offset_to_position(content, 4), (1, 5));
            assert_eq!(offset_to_position(content, 5), (1, 6)); // newline char
            assert_eq!(offset_to_position(content, 6), (2, 1));
            assert_eq!(offset_to_position(content, 12), (3, 1));
        }

        #[test]
        fn position_to_offset_simple() {
            let content = "line1\nline2\nline3\n";
            assert_eq!(position_to_offset(content, 1, 1), 0);
            assert_eq!(position_to_offset(content, 1, 5), 4);
            assert_eq!(position_to_offset(content, 2, 1), 6);
            assert_eq!(position_to_offset(content, 3, 1), 12);
        }

        #[test]
        fn roundtrip() {
            let content = "func foo() {\n\tx := 1\n}\n";
            for offset in 0..content.len() {
                let (line, col) = offset_to_position(content, offset);
                assert_eq!(
                    position_to_offset(content, line, col),
                    offset,
                    "roundtrip failed for offset {offset} at {line}:{col}"
                );
            }
        }

        #[test]
        fn offset_beyond_content() {
            assert_eq!(offset_to_position("short", 100), (1, 6));
        }

        #[test]
        fn position_beyond_content() {
            assert_eq!(position_to_offset("short", 100, 1), 5);
        }

        #[test]
        fn zero_line_col_clamped() {
            assert_eq!(position_to_offset("test", 0, 0), 0);
        }

        #[test]
        fn col_beyond_line_end_clamps() {
            let content = "short\nline\n";
            assert_eq!(position_to_offset(content, 1, 100), 5); // position of \n
        }

        #[test]
        fn empty_content() {
            assert_eq!(offset_to_position("", 0), (1, 1));
            assert_eq!(position_to_offset("", 1, 1), 0);
        }
    }

    mod lines {
        use super::*;

        #[test]
        fn line_at_offset_middle() {
            let content = "func f() {\n\trr := R{}\n}\n";
            assert_eq!(line_at_offset(content, 12), "\trr := R{}");
        }

        #[test]
        fn line_at_offset_first_and_last() {
            let content = "first\nlast";
            assert_eq!(line_at_offset(content, 0), "first");
            assert_eq!(line_at_offset(content, 7), "last");
        }

        #[test]
        fn nth_line_lookup() {
            let content = "a\nb\nc\n";
            assert_eq!(nth_line(content, 1), Some("a"));
            assert_eq!(nth_line(content, 3), Some("c"));
            assert_eq!(nth_line(content, 4), None);
            assert_eq!(nth_line(content, 0), None);
        }

        #[test]
        fn line_count_tests() {
            assert_eq!(line_count(""), 0);
            assert_eq!(line_count("one line"), 1);
            assert_eq!(line_count("one line\n"), 1);
            assert_eq!(line_count("a\nb"), 2);
            assert_eq!(line_count("a\nb\n"), 2);
        }

        #[test]
        fn line_number_matches_position() {
            let content = "a\nb\nc";
            assert_eq!(line_number_at_offset(content, 0), 1);
            assert_eq!(line_number_at_offset(content, 2), 2);
            assert_eq!(line_number_at_offset(content, 4), 3);
        }
    }
}
