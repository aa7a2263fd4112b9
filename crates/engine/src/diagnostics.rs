//! Source-range error rendering: renders a [`DocumentRange`] as
//! line-numbered source context with a caret underline, the way the CLI
//! presents diagnostics to a terminal.

use labflow_common::{Diagnostic, Document, DocumentRange};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Render `range` within `document` as numbered source lines with a caret
/// underline beneath the offending span. Out-of-bounds ranges are clamped
/// to the document's extent rather than panicking, since a buggy
/// diagnostic producer should still render *something* useful.
pub fn format_source(document: &Document, range: labflow_common::Range) -> String {
    let text = document.contents.as_ref();
    let start = range.start.min(text.len());
    let end = range.end.min(text.len());

    let line_start = text[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_number = text[..start].matches('\n').count() + 1;
    let line_end = text[start..].find('\n').map(|i| start + i).unwrap_or(text.len());
    let line_text = &text[line_start..line_end];

    let col = start - line_start;
    let underline_len = end.saturating_sub(start).max(1);

    let mut out = String::new();
    let gutter = format!("{line_number}");
    let _ = writeln!(out, "{gutter} | {line_text}");
    let _ = writeln!(out, "{} | {}{}", " ".repeat(gutter.len()), " ".repeat(col), "^".repeat(underline_len));
    out
}

/// Render every diagnostic's first range against the document it belongs
/// to, grouping documents by id so each is sliced from `documents` once.
pub fn format_diagnostics(diagnostics: &[Diagnostic], documents: &BTreeMap<String, Document>) -> String {
    let mut out = String::new();
    for diagnostic in diagnostics {
        let _ = writeln!(out, "{:?}: {}", diagnostic.kind, diagnostic.message);
        for DocumentRange { document_id, range } in &diagnostic.ranges {
            if let Some(document) = documents.get(document_id) {
                out.push_str(&format_source(document, *range));
            }
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use labflow_common::{Range, Severity};

    #[test]
    fn renders_a_caret_under_the_offending_span() {
        let document = Document::new("doc", "name: Test\nsteps:\n  wait: 30 sec\n");
        let rendered = format_source(&document, Range::new(11, 16));
        assert!(rendered.contains("steps:"));
        assert!(rendered.contains('^'));
    }

    #[test]
    fn clamps_out_of_bounds_ranges_instead_of_panicking() {
        let document = Document::new("doc", "short\n");
        let rendered = format_source(&document, Range::new(2, 9999));
        assert!(!rendered.is_empty());
    }

    #[test]
    fn format_diagnostics_renders_every_diagnostic_in_order() {
        let document = Document::new("doc", "name: Test\n");
        let mut documents = BTreeMap::new();
        documents.insert("doc".to_string(), document);

        let diagnostics = vec![
            Diagnostic::error("first", vec![DocumentRange { document_id: "doc".into(), range: Range::new(0, 4) }]),
            Diagnostic::warning("second", vec![DocumentRange { document_id: "doc".into(), range: Range::new(6, 10) }]),
        ];
        let rendered = format_diagnostics(&diagnostics, &documents);
        assert!(rendered.find("first").unwrap() < rendered.find("second").unwrap());
        let _ = Severity::Error;
    }
}
