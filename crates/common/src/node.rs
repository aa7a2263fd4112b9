//! The node-tree contract: the interface the core expects from whatever
//! supplies live device data (real drivers are out of scope; an in-memory
//! reference tree is provided for tests and the CLI's `run` command).

use crate::value::Value;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;

/// A dotted path identifying a node, e.g. `["reactor", "temperature"]`.
pub type NodePath = Vec<String>;

/// Error produced by a node write.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum NodeError {
    /// The node does not accept writes.
    #[error("node is read-only")]
    ReadOnly,
}

/// A single resource node: readable, optionally writable, optionally
/// subscribable to change notifications.
pub trait Node: fmt::Debug + Send + Sync {
    /// The node's current value, or `None` if it has never been set.
    fn value(&self) -> Option<Value>;

    /// Write a new value. Nodes that are read-only return
    /// [`NodeError::ReadOnly`].
    fn write(&self, value: Value) -> Result<(), NodeError> {
        let _ = value;
        Err(NodeError::ReadOnly)
    }

    /// Whether this node pushes change notifications (vs. needing to be
    /// polled by the caller on its own interval).
    fn is_subscribable(&self) -> bool {
        false
    }

    /// Obtain a [`Notify`] that fires whenever this node's value changes.
    /// Only meaningful when [`Node::is_subscribable`] is `true`.
    fn change_notifier(&self) -> Option<Arc<Notify>> {
        None
    }
}

/// A tree of [`Node`]s, addressed by [`NodePath`].
pub trait NodeTree: fmt::Debug + Send + Sync {
    /// Resolve `path` to a node, if it exists.
    fn find(&self, path: &[String]) -> Option<Arc<dyn Node>>;
}

#[derive(Debug)]
struct InMemoryNode {
    value: Mutex<Option<Value>>,
    subscribable: bool,
    notifier: Arc<Notify>,
    writable: bool,
}

impl Node for InMemoryNode {
    fn value(&self) -> Option<Value> {
        self.value.lock().clone()
    }

    fn write(&self, value: Value) -> Result<(), NodeError> {
        if !self.writable {
            return Err(NodeError::ReadOnly);
        }
        *self.value.lock() = Some(value);
        self.notifier.notify_waiters();
        Ok(())
    }

    fn is_subscribable(&self) -> bool {
        self.subscribable
    }

    fn change_notifier(&self) -> Option<Arc<Notify>> {
        self.subscribable.then(|| self.notifier.clone())
    }
}

/// A small in-memory [`NodeTree`] for tests and for driving the runtime
/// without real hardware attached. Every node is a flat scalar; there is no
/// nested namespace beyond the path used to register it.
#[derive(Debug, Default)]
pub struct InMemoryNodeTree {
    nodes: Mutex<BTreeMap<NodePath, Arc<InMemoryNode>>>,
}

impl InMemoryNodeTree {
    /// A tree with no registered nodes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a polled, read-only node (the caller polls `value()` on its
    /// own interval; no change notifications are pushed).
    pub fn register_polled(&self, path: NodePath, initial: Option<Value>) {
        self.nodes.lock().insert(
            path,
            Arc::new(InMemoryNode {
                value: Mutex::new(initial),
                subscribable: false,
                notifier: Arc::new(Notify::new()),
                writable: false,
            }),
        );
    }

    /// Register a subscribable, writable node: writes notify any watcher.
    pub fn register_subscribable(&self, path: NodePath, initial: Option<Value>) {
        self.nodes.lock().insert(
            path,
            Arc::new(InMemoryNode {
                value: Mutex::new(initial),
                subscribable: true,
                notifier: Arc::new(Notify::new()),
                writable: true,
            }),
        );
    }
}

impl NodeTree for InMemoryNodeTree {
    fn find(&self, path: &[String]) -> Option<Arc<dyn Node>> {
        self.nodes.lock().get(path).map(|n| n.clone() as Arc<dyn Node>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_resolves_to_none() {
        let tree = InMemoryNodeTree::new();
        assert!(tree.find(&["missing".to_string()]).is_none());
    }

    #[test]
    fn polled_node_is_read_only() {
        let tree = InMemoryNodeTree::new();
        tree.register_polled(vec!["temp".to_string()], Some(Value::Float(21.0)));
        let node = tree.find(&["temp".to_string()]).unwrap();
        assert_eq!(node.value(), Some(Value::Float(21.0)));
        assert!(!node.is_subscribable());
        assert_eq!(node.write(Value::Float(22.0)), Err(NodeError::ReadOnly));
    }

    #[test]
    fn subscribable_node_accepts_writes_and_notifies() {
        let tree = InMemoryNodeTree::new();
        tree.register_subscribable(vec!["valve".to_string()], None);
        let node = tree.find(&["valve".to_string()]).unwrap();
        assert!(node.is_subscribable());
        node.write(Value::Boolean(true)).unwrap();
        assert_eq!(node.value(), Some(Value::Boolean(true)));
    }
}
