//! `BlockState`: the per-namespace resource-reservation state threaded
//! alongside the block tree, with the `|` (override merge) and `&` (split)
//! operators described by the protocol compilation model.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A namespace's private view of accumulated reservation state (e.g. "this
/// node is claimed with priority N", "this file handle is open"). Parsers
/// define their own concrete types and box them as `Arc<dyn UnitState>`.
pub trait UnitState: fmt::Debug + Send + Sync + std::any::Any {
    /// JSON-shaped external representation, for debugging and the
    /// compiled-protocol export.
    fn export(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Narrow back to the concrete type, so a state instance constructor
    /// that knows its own namespace's `UnitState` type can recover it from
    /// the type-erased [`BlockState`] map.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// A mapping from namespace to that namespace's unit state, or to `None`
/// (the merge identity, "no reservation contributed in this namespace").
#[derive(Debug, Clone, Default)]
pub struct BlockState {
    namespaces: BTreeMap<String, Option<Arc<dyn UnitState>>>,
}

impl BlockState {
    /// The empty state: every namespace absent, the identity of `|`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set a namespace's unit state.
    pub fn with(mut self, namespace: impl Into<String>, state: Arc<dyn UnitState>) -> Self {
        self.namespaces.insert(namespace.into(), Some(state));
        self
    }

    /// Read a namespace's unit state, if present.
    pub fn get(&self, namespace: &str) -> Option<&Arc<dyn UnitState>> {
        self.namespaces.get(namespace).and_then(|entry| entry.as_ref())
    }

    /// Override-merge `self` with `other`: for every namespace, the later
    /// (`other`) value wins when both sides have one; `null` (an absent
    /// namespace) acts as the identity.
    pub fn override_merge(&self, other: &BlockState) -> BlockState {
        let mut namespaces = self.namespaces.clone();
        for (namespace, value) in &other.namespaces {
            match value {
                Some(v) => {
                    namespaces.insert(namespace.clone(), Some(v.clone()));
                }
                None => {
                    namespaces.entry(namespace.clone()).or_insert(None);
                }
            }
        }
        BlockState { namespaces }
    }

    /// Split `self` into the pair of states that two divergent children
    /// (e.g. branches of a condition) each retain. Every namespace present
    /// in `self` is visible, unmodified, to both branches.
    pub fn split(&self) -> (BlockState, BlockState) {
        (self.clone(), self.clone())
    }

    /// Iterate every present (non-null) namespace and its unit state.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn UnitState>)> {
        self.namespaces.iter().filter_map(|(k, v)| v.as_ref().map(|v| (k.as_str(), v)))
    }
}

impl std::ops::BitOr for &BlockState {
    type Output = BlockState;

    fn bitor(self, rhs: &BlockState) -> BlockState {
        self.override_merge(rhs)
    }
}

/// A namespace's unit state reconstructed from an already-exported JSON
/// value, rather than from a live parser. `import_value` uses this so a
/// re-exported [`BlockState`] matches the value it was imported from,
/// without needing a generic `UnitState` deserializer per namespace.
#[derive(Debug, Clone)]
pub struct ImportedUnitState(pub serde_json::Value);

impl UnitState for ImportedUnitState {
    fn export(&self) -> serde_json::Value {
        self.0.clone()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
