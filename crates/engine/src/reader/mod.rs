//! The protocol document reader: turns indented key-value source text into
//! a [`Located`] tree of [`RawValue`]s, ready for schema analysis.

mod builder;
mod lines;

use labflow_common::{Analysis, Document, DocumentRange, Located};

/// A raw, untyped value produced by tokenization — the input to the type
/// analyzer, before any namespace's schema has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawValue {
    /// A leaf scalar (string) value.
    Scalar(String),
    /// An ordered mapping of located keys to located values. Order is
    /// preserved so that error messages and exports read naturally.
    Mapping(Vec<(Located<String>, Located<RawValue>)>),
    /// An ordered list of values.
    Sequence(Vec<Located<RawValue>>),
}

impl RawValue {
    /// Look up a key in a `Mapping`; returns `None` for any other variant
    /// or if the key is absent.
    pub fn get(&self, key: &str) -> Option<&Located<RawValue>> {
        match self {
            RawValue::Mapping(entries) => entries.iter().find(|(k, _)| **k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// View this value as a sequence of items, if it is one.
    pub fn as_sequence(&self) -> Option<&[Located<RawValue>]> {
        match self {
            RawValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// View this value as a bare scalar string, if it is one.
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            RawValue::Scalar(s) => Some(s),
            _ => None,
        }
    }
}

/// Parse `document`'s text into a [`Located`] tree, attaching the
/// document's own id to every diagnostic and range produced.
pub fn parse_document(document: &Document) -> (Analysis, Located<RawValue>) {
    let (tokenize_analysis, classified) = lines::tokenize(&document.contents);
    let (build_analysis, value) = builder::build(&classified, &document.id);

    let mut analysis = retag_document_id(tokenize_analysis, &document.id);
    analysis.merge_in_place(build_analysis);
    (analysis, value)
}

/// The tokenizer doesn't know the owning document's id yet when it first
/// emits a diagnostic (it classifies lines before the builder is handed
/// the id); patch it in afterwards.
fn retag_document_id(mut analysis: Analysis, document_id: &str) -> Analysis {
    for diagnostic in &mut analysis.diagnostics {
        for range in &mut diagnostic.ranges {
            if range.document_id.is_empty() {
                range.document_id = document_id.to_string();
            }
        }
    }
    analysis
}

#[allow(dead_code)]
fn doc_range(document_id: &str, range: labflow_common::Range) -> DocumentRange {
    DocumentRange { document_id: document_id.to_string(), range }
}
