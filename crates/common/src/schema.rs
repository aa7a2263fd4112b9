//! Attribute schemas: the divisible composite mappings that every parser
//! contributes its recognized keys to.

use std::collections::BTreeMap;

/// A parser's namespace: a short, stable identifier (`"timer"`, `"record"`,
/// `"if"`, ...) under which its attributes and block-state live.
pub type Namespace = String;

/// Expected shape of an attribute's value, used by the type analyzer to
/// validate a located value before expression evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// Any boolean literal or expression producing one.
    Bool,
    /// Any integer literal or expression producing one.
    Int,
    /// Any float literal or expression producing one.
    Float,
    /// Any string literal or expression producing one.
    Str,
    /// A quantity with one of the listed acceptable units (empty = any unit).
    Quantity(Vec<String>),
    /// Accepts anything.
    Any,
    /// A homogeneous list of the given element type.
    List(Box<Type>),
    /// A record with its own nested schema.
    Record(AttributeSchema),
}

/// Description of a single recognized attribute key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeKey {
    /// Short human label, used in completions and hovers.
    pub label: String,
    /// Longer description, used in hovers.
    pub description: String,
    /// Whether this key must be present.
    pub required: bool,
    /// Whether this attribute participates in editor code-folding.
    pub foldable: bool,
    /// The expected type of this attribute's value.
    pub expected_type: Type,
}

impl AttributeKey {
    /// Build a required attribute key.
    pub fn required(label: impl Into<String>, expected_type: Type) -> Self {
        Self {
            label: label.into(),
            description: String::new(),
            required: true,
            foldable: false,
            expected_type,
        }
    }

    /// Build an optional attribute key.
    pub fn optional(label: impl Into<String>, expected_type: Type) -> Self {
        Self {
            label: label.into(),
            description: String::new(),
            required: false,
            foldable: false,
            expected_type,
        }
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A divisible composite mapping: a set of recognized keys grouped by
/// namespace. "Divisible" because [`AttributeSchema::add`] lets independent
/// parsers each contribute their own slice without knowledge of the others,
/// and the composite is built by concatenation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeSchema {
    namespaces: BTreeMap<Namespace, BTreeMap<String, AttributeKey>>,
}

impl AttributeSchema {
    /// An empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `attrs` under `namespace`. Panics if the namespace was
    /// already registered — namespaces must be disjoint by construction.
    pub fn add(&mut self, namespace: impl Into<Namespace>, attrs: BTreeMap<String, AttributeKey>) {
        let namespace = namespace.into();
        let previous = self.namespaces.insert(namespace.clone(), attrs);
        assert!(previous.is_none(), "namespace {namespace:?} registered twice");
    }

    /// All keys registered under `namespace`, if any.
    pub fn namespace(&self, namespace: &str) -> Option<&BTreeMap<String, AttributeKey>> {
        self.namespaces.get(namespace)
    }

    /// Iterate all namespaces and their attribute keys.
    pub fn namespaces(&self) -> impl Iterator<Item = (&Namespace, &BTreeMap<String, AttributeKey>)> {
        self.namespaces.iter()
    }

    /// Every recognized key name across every namespace, for duplicate
    /// detection when composing schemas from independently-authored
    /// parsers.
    pub fn all_key_names(&self) -> impl Iterator<Item = &str> {
        self.namespaces.values().flat_map(|attrs| attrs.keys().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_registers_under_namespace() {
        let mut schema = AttributeSchema::new();
        let mut attrs = BTreeMap::new();
        attrs.insert("duration".to_string(), AttributeKey::required("duration", Type::Quantity(vec!["sec".into()])));
        schema.add("timer", attrs);

        assert!(schema.namespace("timer").is_some());
        assert!(schema.namespace("record").is_none());
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn add_rejects_duplicate_namespace() {
        let mut schema = AttributeSchema::new();
        schema.add("timer", BTreeMap::new());
        schema.add("timer", BTreeMap::new());
    }
}
