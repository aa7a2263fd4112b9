//! Shorthands: user-defined block macros, expanded by schema-level
//! dictionary merging before any namespace parser sees a block. Flat
//! namespace — a shorthand body is never itself expanded for further
//! shorthand references at definition time.

use crate::reader::RawValue;
use labflow_common::{Analysis, Diagnostic, DocumentRange, Located, Range, SemanticError};
use std::collections::BTreeMap;

/// Name-to-body table of every shorthand defined at the protocol root.
pub type Definitions = BTreeMap<String, Located<RawValue>>;

/// Read the root-level `shorthands: { name: { ... } }` mapping, if present,
/// into a flat definition table. Does not expand the bodies themselves —
/// that happens per-use, in [`expand`].
pub fn collect_definitions(root: &Located<RawValue>) -> Definitions {
    let mut definitions = Definitions::new();
    if let Some(section) = root.get("shorthands") {
        if let RawValue::Mapping(entries) = section.value() {
            for (key, value) in entries {
                definitions.insert(key.value().clone(), value.clone());
            }
        }
    }
    definitions
}

/// If `block`'s mapping mentions a key naming a registered shorthand, merge
/// that shorthand's body into the block (the block's own entries, other
/// than the shorthand key itself, take precedence over the shorthand's
/// defaults) and return the expanded mapping. Otherwise return `block`
/// unchanged.
pub fn expand(block: &Located<RawValue>, definitions: &Definitions, document_id: &str) -> (Analysis, Located<RawValue>) {
    let RawValue::Mapping(entries) = block.value() else {
        return (Analysis::empty(), block.clone());
    };

    let Some((shorthand_key, shorthand_value)) = entries.iter().find(|(key, _)| definitions.contains_key(key.value())) else {
        return (Analysis::empty(), block.clone());
    };

    let Some(definition) = definitions.get(shorthand_key.value()) else {
        return (
            Analysis::from_diagnostic(Diagnostic::error(
                SemanticError::UnknownShorthand {
                    name: shorthand_key.value().clone(),
                    range: doc_range(document_id, shorthand_key.range()),
                }
                .to_string(),
                vec![doc_range(document_id, shorthand_key.range())],
            )),
            block.clone(),
        );
    };

    let RawValue::Mapping(default_entries) = definition.value() else {
        return (Analysis::empty(), block.clone());
    };

    // The shorthand's own argument value (e.g. `foo: { activate: no }`)
    // overrides its defaults for keys it names directly, falling back to
    // the definition's body for everything else.
    let mut merged: Vec<(Located<String>, Located<RawValue>)> = default_entries.clone();
    if let RawValue::Mapping(arg_entries) = shorthand_value.value() {
        for (key, value) in arg_entries {
            if let Some(slot) = merged.iter_mut().find(|(k, _)| k.value() == key.value()) {
                slot.1 = value.clone();
            } else {
                merged.push((key.clone(), value.clone()));
            }
        }
    }
    for (key, value) in entries {
        if key.value() == shorthand_key.value() {
            continue;
        }
        if let Some(slot) = merged.iter_mut().find(|(k, _)| k.value() == key.value()) {
            slot.1 = value.clone();
        } else {
            merged.push((key.clone(), value.clone()));
        }
    }

    (Analysis::empty(), Located::new(RawValue::Mapping(merged), block.range()))
}

fn doc_range(document_id: &str, range: Range) -> DocumentRange {
    DocumentRange { document_id: document_id.to_string(), range }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::parse_document;
    use labflow_common::Document;

    #[test]
    fn a_shorthand_use_expands_to_its_definition() {
        let document = Document::new(
            "doc",
            "shorthands:\n  foo:\n    activate: no\nfoo:\n",
        );
        let (_, root) = parse_document(&document);
        let definitions = collect_definitions(&root);

        let step = Located::new(RawValue::Mapping(vec![(
            Located::new("foo".to_string(), Range::point(0)),
            Located::new(RawValue::Mapping(vec![]), Range::point(0)),
        )]), Range::point(0));

        let (analysis, expanded) = expand(&step, &definitions, "doc");
        assert!(!analysis.has_errors());
        assert_eq!(expanded.get("activate").and_then(|v| v.as_scalar()), Some("no"));
    }

    #[test]
    fn a_block_with_no_shorthand_key_is_unchanged() {
        let document = Document::new("doc", "wait: 1 sec\n");
        let (_, root) = parse_document(&document);
        let (analysis, expanded) = expand(&root, &Definitions::new(), "doc");
        assert!(!analysis.has_errors());
        assert_eq!(expanded.get("wait").and_then(|v| v.as_scalar()), Some("1 sec"));
    }
}
