//! Line-level classification: the first tokenization pass over raw
//! protocol source text.

use labflow_common::{Analysis, Range};

/// What a single physical line contributes to the document's structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// `key: value?` — `value` is `None` when the value is a nested block.
    DictEntry { key: (String, Range), inline_value: Option<(String, Range)> },
    /// `- value?` — a list item; `None` when the item's value is a nested
    /// block, or when the inline remainder is itself a `key: value` pair
    /// (in which case it is re-classified and stored in `inline_dict`).
    ListItem { inline_scalar: Option<(String, Range)>, inline_dict: Option<Box<LineKind>> },
    /// `| text` — a block-continuation line, concatenated onto the
    /// enclosing scalar.
    Continuation { text: String },
    /// A bare scalar occupying an entire line with no key or dash.
    Scalar { text: (String, Range) },
}

/// One classified line: its nesting level (`indentation / 2`) and content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// Nesting level; two spaces of indentation per level.
    pub level: usize,
    /// The full line's source range (including indentation).
    pub range: Range,
    /// What this line represents.
    pub kind: LineKind,
}

/// Tokenize `text` into classified lines, accumulating warnings for
/// non-ASCII characters and errors for odd indentation. Comment-only and
/// blank lines are dropped; every other line is classified best-effort so
/// that a later line's error does not block earlier or later lines from
/// parsing.
pub fn tokenize(text: &str) -> (Analysis, Vec<Line>) {
    let mut analysis = Analysis::empty();
    let mut lines = Vec::new();

    let mut offset = 0usize;
    for raw_line in text.split_inclusive('\n') {
        let line_start = offset;
        let trimmed_end = raw_line.trim_end_matches(['\n', '\r']);
        offset += raw_line.len();

        if trimmed_end.trim().is_empty() {
            continue;
        }

        if !trimmed_end.is_ascii() {
            analysis.merge_in_place(Analysis::from_warning(
                "non-ASCII character in protocol source",
                vec![doc_range(Range::new(line_start, line_start + trimmed_end.len()))],
            ));
        }

        let leading_ws = trimmed_end.len() - trimmed_end.trim_start_matches(' ').len();
        if leading_ws % 2 != 0 {
            analysis.merge_in_place(Analysis::from_error(
                "odd indentation",
                vec![doc_range(Range::new(line_start, line_start + leading_ws))],
            ));
        }
        let level = leading_ws / 2;

        let content = &trimmed_end[leading_ws..];
        if content.starts_with('#') {
            continue;
        }
        let content_start = line_start + leading_ws;
        let line_range = Range::new(line_start, line_start + trimmed_end.len());

        let kind = classify(content, content_start);
        lines.push(Line { level, range: line_range, kind });
    }

    (analysis, lines)
}

fn doc_range(range: Range) -> labflow_common::DocumentRange {
    labflow_common::DocumentRange { document_id: String::new(), range }
}

fn classify(content: &str, content_start: usize) -> LineKind {
    if let Some(rest) = content.strip_prefix('|') {
        let text = rest.strip_prefix(' ').unwrap_or(rest);
        return LineKind::Continuation { text: text.to_string() };
    }

    if content == "-" || content.starts_with("- ") {
        let inner = content.strip_prefix('-').unwrap().trim_start();
        if inner.is_empty() {
            return LineKind::ListItem { inline_scalar: None, inline_dict: None };
        }
        let inner_offset = content_start + (content.len() - inner.len());
        let inner_kind = classify(inner, inner_offset);
        return match inner_kind {
            LineKind::DictEntry { .. } => LineKind::ListItem { inline_scalar: None, inline_dict: Some(Box::new(inner_kind)) },
            LineKind::Scalar { text } => LineKind::ListItem { inline_scalar: Some(text), inline_dict: None },
            other => LineKind::ListItem { inline_scalar: None, inline_dict: Some(Box::new(other)) },
        };
    }

    if let Some(colon_idx) = find_key_separator(content) {
        let key_text = content[..colon_idx].trim();
        let key_range = Range::new(content_start, content_start + colon_idx);
        let rest = content[colon_idx + 1..].trim();
        let inline_value = if rest.is_empty() {
            None
        } else {
            let value_offset = content_start + content.rfind(rest).unwrap_or(colon_idx + 1);
            Some((rest.to_string(), Range::new(value_offset, value_offset + rest.len())))
        };
        return LineKind::DictEntry { key: (key_text.to_string(), key_range), inline_value };
    }

    LineKind::Scalar { text: (content.to_string(), Range::new(content_start, content_start + content.len())) }
}

/// Find the `:` that separates a dictionary key from its value: the first
/// colon followed by whitespace or end-of-line (so `http://` inside a
/// value on its own line is not mistaken for a key separator, since a bare
/// scalar line has no leading key at all).
fn find_key_separator(content: &str) -> Option<usize> {
    let bytes = content.as_bytes();
    for (idx, &b) in bytes.iter().enumerate() {
        if b == b':' && (idx + 1 == bytes.len() || bytes[idx + 1] == b' ') {
            return Some(idx);
        }
    }
    None
}
