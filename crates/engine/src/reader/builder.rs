//! Recursive-descent construction of a [`RawValue`] tree from the
//! classified lines produced by [`super::lines::tokenize`].

use super::lines::{Line, LineKind};
use super::RawValue;
use labflow_common::{Analysis, DocumentRange, Located, Range};

struct Cursor<'a> {
    lines: &'a [Line],
    pos: usize,
    document_id: String,
    analysis: Analysis,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<&'a Line> {
        self.lines.get(self.pos)
    }

    fn doc_range(&self, range: Range) -> DocumentRange {
        DocumentRange { document_id: self.document_id.clone(), range }
    }
}

/// Build the root [`RawValue`] from a full set of classified `lines`.
pub fn build(lines: &[Line], document_id: &str) -> (Analysis, Located<RawValue>) {
    let mut cursor = Cursor { lines, pos: 0, document_id: document_id.to_string(), analysis: Analysis::empty() };
    let value = parse_block(&mut cursor, 0);
    (cursor.analysis, value)
}

/// Parse every line at exactly `level`, starting at the cursor's current
/// position, stopping once a shallower line is seen (or input ends).
fn parse_block(cursor: &mut Cursor<'_>, level: usize) -> Located<RawValue> {
    match cursor.peek() {
        None => Located::new(RawValue::Mapping(Vec::new()), Range::point(0)),
        Some(line) if line.level < level => Located::new(RawValue::Mapping(Vec::new()), Range::point(line.range.start)),
        Some(line) => match &line.kind {
            LineKind::ListItem { .. } => parse_sequence(cursor, level),
            LineKind::Continuation { .. } => parse_continuation_block(cursor, level),
            LineKind::Scalar { text } => {
                let range = text.1;
                let value = text.0.clone();
                cursor.pos += 1;
                Located::new(RawValue::Scalar(value), range)
            }
            LineKind::DictEntry { .. } => parse_mapping(cursor, level),
        },
    }
}

fn parse_sequence(cursor: &mut Cursor<'_>, level: usize) -> Located<RawValue> {
    let start = cursor.peek().map(|l| l.range.start).unwrap_or(0);
    let mut items = Vec::new();
    let mut end = start;

    while let Some(line) = cursor.peek() {
        if line.level != level {
            break;
        }
        let LineKind::ListItem { inline_scalar, inline_dict } = &line.kind else { break };
        end = line.range.end;
        let item_range = line.range;
        cursor.pos += 1;

        let item = if let Some((text, range)) = inline_scalar {
            Located::new(RawValue::Scalar(text.clone()), *range)
        } else if let Some(inline_kind) = inline_dict {
            parse_inline_dict_item(cursor, level, item_range, inline_kind)
        } else {
            parse_block(cursor, level + 1)
        };
        items.push(item);
    }

    Located::new(RawValue::Sequence(items), Range::new(start, end.max(start)))
}

/// A list item whose dash was followed inline by `key: value` (or bare
/// `key:`). Any further `DictEntry` lines at `level + 1` extend the same
/// mapping, and a key with no inline value recurses into `level + 2` for
/// its nested value.
fn parse_inline_dict_item(
    cursor: &mut Cursor<'_>,
    level: usize,
    item_range: Range,
    inline_kind: &LineKind,
) -> Located<RawValue> {
    let mut entries = Vec::new();
    entries.push(resolve_dict_entry(cursor, level + 1, inline_kind, item_range));

    while let Some(line) = cursor.peek() {
        if line.level != level + 1 {
            break;
        }
        if matches!(line.kind, LineKind::ListItem { .. }) {
            break;
        }
        let kind = line.kind.clone();
        let range = line.range;
        cursor.pos += 1;
        entries.push(resolve_dict_entry(cursor, level + 1, &kind, range));
    }

    let end = entries.last().map(|(_, v): &(Located<String>, Located<RawValue>)| v.range().end).unwrap_or(item_range.end);
    Located::new(RawValue::Mapping(entries), Range::new(item_range.start, end.max(item_range.start)))
}

fn parse_mapping(cursor: &mut Cursor<'_>, level: usize) -> Located<RawValue> {
    let start = cursor.peek().map(|l| l.range.start).unwrap_or(0);
    let mut entries: Vec<(Located<String>, Located<RawValue>)> = Vec::new();
    let mut end = start;

    while let Some(line) = cursor.peek() {
        if line.level != level {
            break;
        }
        if !matches!(line.kind, LineKind::DictEntry { .. }) {
            break;
        }
        let kind = line.kind.clone();
        let range = line.range;
        end = range.end;
        cursor.pos += 1;

        let (key, value) = resolve_dict_entry(cursor, level, &kind, range);
        if let Some((previous_key, _)) = entries.iter().find(|(k, _)| **k == *key) {
            cursor.analysis.merge_in_place(Analysis::from_error(
                format!("duplicate key {:?}", *key),
                vec![cursor.doc_range(previous_key.range()), cursor.doc_range(key.range())],
            ));
        }
        end = value.range().end.max(end);
        entries.push((key, value));
    }

    Located::new(RawValue::Mapping(entries), Range::new(start, end.max(start)))
}

/// Resolve a single already-consumed `DictEntry` line into its
/// `(key, value)` pair, recursing into deeper lines when the key had no
/// inline value (or when deeper lines follow it regardless).
fn resolve_dict_entry(
    cursor: &mut Cursor<'_>,
    level: usize,
    kind: &LineKind,
    line_range: Range,
) -> (Located<String>, Located<RawValue>) {
    let LineKind::DictEntry { key, inline_value } = kind else {
        unreachable!("resolve_dict_entry called with non-DictEntry line");
    };
    let key_located = Located::new(key.0.clone(), key.1);

    let has_deeper = cursor.peek().map(|l| l.level > level).unwrap_or(false);
    let value = if has_deeper {
        parse_block(cursor, level + 1)
    } else if let Some((text, range)) = inline_value {
        Located::new(RawValue::Scalar(text.clone()), *range)
    } else {
        Located::new(RawValue::Scalar(String::new()), Range::point(line_range.end))
    };

    (key_located, value)
}

fn parse_continuation_block(cursor: &mut Cursor<'_>, level: usize) -> Located<RawValue> {
    let start = cursor.peek().map(|l| l.range.start).unwrap_or(0);
    let mut end = start;
    let mut text = String::new();

    while let Some(line) = cursor.peek() {
        if line.level != level {
            break;
        }
        let LineKind::Continuation { text: piece } = &line.kind else { break };
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(piece);
        end = line.range.end;
        cursor.pos += 1;
    }

    Located::new(RawValue::Scalar(text), Range::new(start, end.max(start)))
}

#[cfg(test)]
mod tests {
    use super::super::lines::tokenize;
    use super::*;

    fn build_source(text: &str) -> (Analysis, Located<RawValue>) {
        let (tok_analysis, lines) = tokenize(text);
        let (build_analysis, value) = build(&lines, "doc");
        (tok_analysis.merge(build_analysis), value)
    }

    #[test]
    fn builds_nested_mapping() {
        let (analysis, value) = build_source("name: Test\nsteps:\n  actions:\n    - wait: 30 sec\n");
        assert!(!analysis.has_errors());
        let RawValue::Mapping(root) = value.into_value() else { panic!() };
        assert_eq!(root.len(), 2);
        assert_eq!(*root[0].0, "name");
        assert_eq!(*root[1].0, "steps");
    }

    #[test]
    fn duplicate_keys_report_both_ranges() {
        let (analysis, _) = build_source("name: A\nname: B\n");
        assert!(analysis.has_errors());
        let diag = &analysis.diagnostics[0];
        assert_eq!(diag.ranges.len(), 2);
    }

    #[test]
    fn list_item_with_inline_dict_merges_following_keys() {
        let (analysis, value) = build_source("steps:\n  - wait: 30 sec\n    label: heat\n");
        assert!(!analysis.has_errors());
        let RawValue::Mapping(root) = value.into_value() else { panic!() };
        let RawValue::Sequence(items) = root[0].1.value() else { panic!() };
        let RawValue::Mapping(item) = items[0].value() else { panic!() };
        assert_eq!(item.len(), 2);
    }
}
