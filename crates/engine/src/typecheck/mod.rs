//! The type analyzer: validates a [`Located`] raw value against an
//! [`AttributeSchema`]'s expected [`Type`], producing a typed [`AttrValue`]
//! tree plus an [`Analysis`] of whatever went wrong along the way.

use crate::expr::{self, Expression, Segment};
use crate::reader::RawValue;
use labflow_common::{
    Analysis, AttributeKey, AttributeSchema, Diagnostic, DocumentRange, Located, Quantity, Range,
    SchematicError, Type, Value,
};
use std::collections::BTreeMap;

/// A value produced by the type analyzer: either fully resolved at analysis
/// time, or an unevaluated expression (or literal text with expressions
/// embedded in it) deferred to a later compiler pass.
#[derive(Debug, Clone)]
pub enum AttrValue {
    /// A literal value, parsed directly from its source text.
    Value(Value),
    /// A single expression covering the attribute's entire value.
    Expr(Expression),
    /// Literal text with one or more expressions embedded in it.
    Interpolated(Vec<Segment>),
    /// A homogeneous list of analyzed element values.
    List(Vec<AttrValue>),
    /// A nested record of analyzed field values.
    Record(BTreeMap<String, AttrValue>),
}

/// Analyze `value` against `ty`, producing the typed result (if analysis
/// succeeded well enough to produce one) alongside any diagnostics raised.
pub fn analyze(value: &Located<RawValue>, ty: &Type, document_id: &str) -> (Analysis, Option<AttrValue>) {
    match ty {
        Type::List(elem_ty) => analyze_list(value, elem_ty, document_id),
        Type::Record(schema) => analyze_record(value, schema, document_id),
        _ => analyze_scalar(value, ty, document_id),
    }
}

/// Analyze `value` (a mapping of attribute keys) against every key
/// registered across `schema`'s namespaces. Namespaces are disjoint by
/// construction, so key lookup is flattened across all of them.
pub fn analyze_schema(
    value: &Located<RawValue>,
    schema: &AttributeSchema,
    document_id: &str,
) -> (Analysis, BTreeMap<String, AttrValue>) {
    let mut analysis = Analysis::empty();
    let mut results = BTreeMap::new();

    let entries: &[(Located<String>, Located<RawValue>)] = match value.value() {
        RawValue::Mapping(entries) => entries,
        _ => {
            analysis.merge_in_place(Analysis::from_error(
                "expected a mapping of attributes",
                vec![doc_range(document_id, value.range())],
            ));
            return (analysis, results);
        }
    };

    let all_keys: BTreeMap<&str, &AttributeKey> =
        schema.namespaces().flat_map(|(_, keys)| keys.iter().map(|(name, key)| (name.as_str(), key))).collect();

    for (key, key_value) in entries {
        match all_keys.get(key.value().as_str()) {
            Some(attr_key) => {
                let (value_analysis, parsed) = analyze(key_value, &attr_key.expected_type, document_id);
                analysis.merge_in_place(value_analysis);
                if let Some(parsed) = parsed {
                    results.insert(key.value().clone(), parsed);
                }
            }
            None => analysis.merge_in_place(Analysis::from_diagnostic(Diagnostic::error(
                SchematicError::UnexpectedAttribute {
                    key: key.value().clone(),
                    range: doc_range(document_id, key.range()),
                }
                .to_string(),
                vec![doc_range(document_id, key.range())],
            ))),
        }
    }

    for (name, attr_key) in &all_keys {
        if attr_key.required && !results.contains_key(*name) {
            analysis.merge_in_place(Analysis::from_diagnostic(Diagnostic::error(
                SchematicError::MissingAttribute { key: name.to_string(), range: doc_range(document_id, value.range()) }
                    .to_string(),
                vec![doc_range(document_id, value.range())],
            )));
        }
    }

    (analysis, results)
}

fn analyze_record(value: &Located<RawValue>, schema: &AttributeSchema, document_id: &str) -> (Analysis, Option<AttrValue>) {
    let (analysis, results) = analyze_schema(value, schema, document_id);
    let ok = !analysis.has_errors();
    (analysis, ok.then_some(AttrValue::Record(results)))
}

fn analyze_list(value: &Located<RawValue>, elem_ty: &Type, document_id: &str) -> (Analysis, Option<AttrValue>) {
    let Some(items) = value.as_sequence() else {
        return (
            Analysis::from_error("expected a list", vec![doc_range(document_id, value.range())]),
            None,
        );
    };

    let mut analysis = Analysis::empty();
    let mut out = Vec::with_capacity(items.len());
    let mut complete = true;
    for item in items {
        let (item_analysis, item_value) = analyze(item, elem_ty, document_id);
        analysis.merge_in_place(item_analysis);
        match item_value {
            Some(v) => out.push(v),
            None => complete = false,
        }
    }
    (analysis, complete.then_some(AttrValue::List(out)))
}

fn analyze_scalar(value: &Located<RawValue>, ty: &Type, document_id: &str) -> (Analysis, Option<AttrValue>) {
    let range = value.range();
    let Some(text) = value.as_scalar() else {
        return (
            Analysis::from_error("expected a scalar value", vec![doc_range(document_id, range)]),
            None,
        );
    };

    if expr::starts_with_expression(text) {
        return analyze_expression(text, range, document_id);
    }

    if matches!(ty, Type::Str) {
        if let Ok(segments) = expr::parse_mixed(text) {
            if segments.iter().any(|s| matches!(s, Segment::Expr(_))) {
                return (Analysis::empty(), Some(AttrValue::Interpolated(segments)));
            }
        }
    }

    match parse_literal(text, ty) {
        Some(literal) => (Analysis::empty(), Some(AttrValue::Value(literal))),
        None => (
            Analysis::from_error(
                format!("expected a {} value, found {text:?}", describe_type(ty)),
                vec![doc_range(document_id, range)],
            ),
            None,
        ),
    }
}

fn analyze_expression(text: &str, range: Range, document_id: &str) -> (Analysis, Option<AttrValue>) {
    match expr::parse_exact(text) {
        Ok(expression) => match expression.syntax_error() {
            Some(err) => (
                Analysis::from_error(err.message.clone(), vec![doc_range(document_id, offset_range(range, err.range))]),
                None,
            ),
            None => (Analysis::empty(), Some(AttrValue::Expr(expression))),
        },
        Err(err) => (
            Analysis::from_error(err.message, vec![doc_range(document_id, offset_range(range, err.range))]),
            None,
        ),
    }
}

fn offset_range(base: Range, relative: Range) -> Range {
    Range::new(base.start + relative.start, base.start + relative.end)
}

fn parse_literal(text: &str, ty: &Type) -> Option<Value> {
    match ty {
        Type::Bool => parse_bool(text).map(Value::Boolean),
        Type::Int => text.parse::<i64>().ok().map(Value::Integer),
        Type::Float => text.parse::<f64>().ok().map(Value::Float),
        Type::Str => Some(Value::String(text.to_string())),
        Type::Quantity(allowed_units) => parse_quantity(text, allowed_units).map(Value::Quantity),
        Type::Any => parse_any(text),
        Type::List(_) | Type::Record(_) => None,
    }
}

fn parse_any(text: &str) -> Option<Value> {
    parse_bool(text)
        .map(Value::Boolean)
        .or_else(|| text.parse::<i64>().ok().map(Value::Integer))
        .or_else(|| text.parse::<f64>().ok().map(Value::Float))
        .or_else(|| parse_quantity(text, &[]).map(Value::Quantity))
        .or_else(|| Some(Value::String(text.to_string())))
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "yes" | "true" => Some(true),
        "no" | "false" => Some(false),
        _ => None,
    }
}

fn parse_quantity(text: &str, allowed_units: &[String]) -> Option<Quantity> {
    let idx = text.find(|c: char| c.is_ascii_alphabetic())?;
    let (magnitude_part, unit_part) = text.split_at(idx);
    let magnitude: f64 = magnitude_part.trim().parse().ok()?;
    let unit = unit_part.trim();
    if unit.is_empty() {
        return None;
    }
    if !allowed_units.is_empty() && !allowed_units.iter().any(|u| u == unit) {
        return None;
    }
    Quantity::new(magnitude, unit).ok()
}

fn describe_type(ty: &Type) -> &'static str {
    match ty {
        Type::Bool => "boolean",
        Type::Int => "integer",
        Type::Float => "float",
        Type::Str => "string",
        Type::Quantity(_) => "quantity",
        Type::Any => "value",
        Type::List(_) => "list",
        Type::Record(_) => "record",
    }
}

fn doc_range(document_id: &str, range: Range) -> DocumentRange {
    DocumentRange { document_id: document_id.to_string(), range }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::parse_document;
    use labflow_common::Document;

    fn analyze_key(source: &str, key: &str, ty: Type) -> (Analysis, Option<AttrValue>) {
        let document = Document::new("doc", source);
        let (_, root) = parse_document(&document);
        let value = root.get(key).unwrap();
        analyze(value, &ty, "doc")
    }

    #[test]
    fn parses_a_quantity_literal_with_an_allowed_unit() {
        let (analysis, value) = analyze_key("duration: 30 sec\n", "duration", Type::Quantity(vec!["sec".into()]));
        assert!(!analysis.has_errors());
        let Some(AttrValue::Value(Value::Quantity(q))) = value else { panic!("expected a quantity") };
        assert_eq!(q.magnitude_as("sec").unwrap(), 30.0);
    }

    #[test]
    fn rejects_a_quantity_with_a_disallowed_unit() {
        let (analysis, value) = analyze_key("duration: 30 mL\n", "duration", Type::Quantity(vec!["sec".into()]));
        assert!(analysis.has_errors());
        assert!(value.is_none());
    }

    #[test]
    fn yes_and_no_parse_as_booleans() {
        let (analysis, value) = analyze_key("enabled: yes\n", "enabled", Type::Bool);
        assert!(!analysis.has_errors());
        assert!(matches!(value, Some(AttrValue::Value(Value::Boolean(true)))));
    }

    #[test]
    fn a_field_expression_is_deferred_rather_than_evaluated() {
        let (analysis, value) = analyze_key("count: {{ 1 + 1 }}\n", "count", Type::Int);
        assert!(!analysis.has_errors());
        assert!(matches!(value, Some(AttrValue::Expr(_))));
    }

    #[test]
    fn a_malformed_expression_produces_a_diagnostic_at_the_right_offset() {
        let (analysis, value) = analyze_key("count: {{ 1 + }}\n", "count", Type::Int);
        assert!(analysis.has_errors());
        assert!(value.is_none());
    }

    #[test]
    fn interpolated_strings_are_recognized_for_str_typed_attributes() {
        let (analysis, value) = analyze_key("label: step {{ index }}\n", "label", Type::Str);
        assert!(!analysis.has_errors());
        assert!(matches!(value, Some(AttrValue::Interpolated(_))));
    }

    #[test]
    fn missing_required_attribute_is_reported() {
        let document = Document::new("doc", "name: Test\n");
        let (_, root) = parse_document(&document);
        let mut schema = AttributeSchema::new();
        schema.add(
            "meta",
            BTreeMap::from([("author".to_string(), AttributeKey::required("author", Type::Str))]),
        );
        let (analysis, results) = analyze_schema(&root, &schema, "doc");
        assert!(analysis.has_errors());
        assert!(!results.contains_key("author"));
    }

    #[test]
    fn unexpected_attribute_is_reported() {
        let document = Document::new("doc", "unknown_key: 1\n");
        let (_, root) = parse_document(&document);
        let schema = AttributeSchema::new();
        let (analysis, _) = analyze_schema(&root, &schema, "doc");
        assert!(analysis.has_errors());
    }
}
