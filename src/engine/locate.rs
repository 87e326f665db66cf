//! Maps a document path back to a source range.
//!
//! This is a line scan driven by indentation. It understands block-style
//! YAML and pretty-printed JSON. When a segment cannot be found the range of
//! the deepest located ancestor is returned.

use super::path::Segment;
use super::{Position, Range};

struct Hit {
    range: Range,
    /// Column children must be indented past
    indent: usize,
    /// Line the next search starts on
    next_line: usize,
}

/// Locate `path` in `text`, falling back to the closest located ancestor
pub fn locate(text: &str, path: &[Segment]) -> Range {
    let lines: Vec<&str> = text.lines().collect();
    let mut best = Range::default();
    let mut from = 0;
    let mut parent: Option<usize> = None;

    for segment in path {
        let hit = match segment {
            Segment::Key(key) => find_key(&lines, from, parent, key),
            Segment::Index(index) => find_item(&lines, from, parent, *index),
        };
        match hit {
            Some(hit) => {
                best = hit.range;
                from = hit.next_line;
                parent = Some(hit.indent);
            }
            None => break,
        }
    }

    best
}

/// LSP character offset (UTF-16 code units) of byte offset `byte` in `line`
fn utf16_column(line: &str, byte: usize) -> u32 {
    line[..byte].encode_utf16().count() as u32
}

fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// True once a line leaves the parent's block
fn leaves_block(line: &str, line_idx: usize, from: usize, parent: Option<usize>) -> bool {
    match parent {
        Some(indent) => line_idx > from && leading_spaces(line) <= indent,
        None => false,
    }
}

/// Column where the mapping content of a line starts, skipping `- ` markers
fn content_column(line: &str) -> usize {
    let mut col = leading_spaces(line);
    let bytes = line.as_bytes();
    while col + 1 < bytes.len() && bytes[col] == b'-' && bytes[col + 1] == b' ' {
        col += 2;
        while col < bytes.len() && bytes[col] == b' ' {
            col += 1;
        }
    }
    col
}

fn key_at(rest: &str, key: &str) -> Option<usize> {
    for quote in ["", "\"", "'"] {
        let Some(after_open) = rest.strip_prefix(quote) else {
            continue;
        };
        let Some(after_key) = after_open.strip_prefix(key) else {
            continue;
        };
        let Some(after_close) = after_key.strip_prefix(quote) else {
            continue;
        };
        if after_close.trim_start_matches(' ').starts_with(':') {
            return Some(quote.len());
        }
    }
    None
}

fn find_key(lines: &[&str], from: usize, parent: Option<usize>, key: &str) -> Option<Hit> {
    for (idx, line) in lines.iter().enumerate().skip(from) {
        if is_blank_or_comment(line) {
            continue;
        }
        if leaves_block(line, idx, from, parent) {
            return None;
        }
        let col = content_column(line);
        if parent.is_some_and(|indent| col <= indent) {
            continue;
        }
        // Skip JSON's opening brace line and similar punctuation
        let rest = &line[col..];
        let rest_trimmed = rest.trim_start_matches(['{', '[', ' ']);
        let col = col + (rest.len() - rest_trimmed.len());
        if let Some(offset) = key_at(rest_trimmed, key) {
            let start = col + offset;
            let end = start + key.len();
            return Some(Hit {
                range: Range::new(
                    Position::new(idx as u32, utf16_column(line, start)),
                    Position::new(idx as u32, utf16_column(line, end)),
                ),
                indent: col,
                next_line: idx + 1,
            });
        }
    }
    None
}

fn find_item(lines: &[&str], from: usize, parent: Option<usize>, index: usize) -> Option<Hit> {
    let mut item_column: Option<usize> = None;
    let mut seen = 0;

    for (idx, line) in lines.iter().enumerate().skip(from) {
        if is_blank_or_comment(line) {
            continue;
        }
        if leaves_block(line, idx, from, parent) {
            return None;
        }
        let col = leading_spaces(line);
        let rest = &line[col..];
        if !(rest == "-" || rest.starts_with("- ")) {
            continue;
        }
        let column = *item_column.get_or_insert(col);
        if col != column {
            continue;
        }
        if seen == index {
            let end = line.trim_end().len();
            return Some(Hit {
                range: Range::new(
                    Position::new(idx as u32, utf16_column(line, col)),
                    Position::new(idx as u32, utf16_column(line, end)),
                ),
                indent: col,
                next_line: idx,
            });
        }
        seen += 1;
    }
    None
}
