//! The runtime value type produced by expression evaluation and consumed
//! throughout the block tree and state instances.

use crate::units::Quantity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A fully-evaluated value.
///
/// `Ellipsis` represents "unresolved / omitted" — the same placeholder the
/// evaluator returns for an expression that failed to evaluate, letting
/// callers short-circuit on failure without threading a separate `Option`
/// through every call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// A boolean.
    Boolean(bool),
    /// A 64-bit integer.
    Integer(i64),
    /// A 64-bit float.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// The "unresolved" placeholder.
    Ellipsis,
    /// A magnitude with a unit.
    Quantity(Quantity),
    /// A composite record (ordered by key for deterministic export).
    Record(BTreeMap<String, Value>),
    /// An ordered list of values.
    List(Vec<Value>),
}

impl Value {
    /// Whether this value is the unresolved placeholder.
    pub fn is_ellipsis(&self) -> bool {
        matches!(self, Value::Ellipsis)
    }

    /// Coerce to `bool`, if this value is a `Boolean`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Coerce to `&str`, if this value is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Coerce to `Quantity`, if this value is a `Quantity`.
    pub fn as_quantity(&self) -> Option<Quantity> {
        match self {
            Value::Quantity(q) => Some(*q),
            _ => None,
        }
    }

    /// Coerce to a field of a `Record`, if this value is a `Record`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Record(map) => map.get(key),
            _ => None,
        }
    }
}

/// Anything exportable to a JSON-shaped [`serde_json::Value`], matching the
/// `export()` contract every block, transform and state record implements.
pub trait Exportable {
    /// Produce the JSON-shaped external representation.
    fn export(&self) -> serde_json::Value;
}

impl Exportable for Value {
    fn export(&self) -> serde_json::Value {
        match self {
            Value::Boolean(b) => serde_json::json!(b),
            Value::Integer(i) => serde_json::json!(i),
            Value::Float(f) => serde_json::json!(f),
            Value::String(s) => serde_json::json!(s),
            Value::Ellipsis => serde_json::Value::Null,
            Value::Quantity(q) => serde_json::json!({
                "magnitude": q.base_magnitude(),
                "dimension": q.dimension().to_string(),
            }),
            Value::Record(map) => {
                serde_json::Value::Object(map.iter().map(|(k, v)| (k.clone(), v.export())).collect())
            }
            Value::List(items) => serde_json::Value::Array(items.iter().map(Exportable::export).collect()),
        }
    }
}
