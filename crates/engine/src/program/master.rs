//! The scheduler shared by every program and state instance in a single
//! run: owns the live node tree and the claim registry, and mediates the
//! bookkeeping a state program uses to hand its reservation to a sibling.

use labflow_common::{ClaimRegistry, NodePath, NodeTree};
use std::sync::Arc;

/// The cooperative scheduler. One instance is shared (via `Arc`) by the
/// whole program tree produced for a single compiled protocol run.
pub trait Master: Send + Sync {
    /// The live resource tree this run is driving.
    fn node_tree(&self) -> &Arc<dyn NodeTree>;

    /// The claim registry nodes are reserved against.
    fn claims(&self) -> &ClaimRegistry<NodePath>;

    /// Ask the master to persist whichever state instance currently needs
    /// flushing — called after a state program's child transitions in or
    /// out of being stopped or state-terminated. The default
    /// implementation only traces; a bridge wiring a
    /// real output sink overrides it.
    fn write_state(&self) {
        tracing::trace!("write_state");
    }

    /// Ask the master to transfer a state instance's reservation to
    /// whichever sibling program should now own it, because the child
    /// paused itself out from under its state wrapper.
    fn transfer_state(&self) {
        tracing::trace!("transfer_state");
    }
}

/// The default [`Master`]: a live node tree plus an empty claim registry,
/// with `write_state`/`transfer_state` left at their tracing-only default.
#[derive(Debug)]
pub struct DefaultMaster {
    node_tree: Arc<dyn NodeTree>,
    claims: ClaimRegistry<NodePath>,
}

impl DefaultMaster {
    /// A master driving `node_tree`.
    pub fn new(node_tree: Arc<dyn NodeTree>) -> Self {
        Self { node_tree, claims: ClaimRegistry::new() }
    }
}

impl Master for DefaultMaster {
    fn node_tree(&self) -> &Arc<dyn NodeTree> {
        &self.node_tree
    }

    fn claims(&self) -> &ClaimRegistry<NodePath> {
        &self.claims
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labflow_common::InMemoryNodeTree;

    #[test]
    fn default_master_exposes_an_empty_claim_registry() {
        let master = DefaultMaster::new(Arc::new(InMemoryNodeTree::new()));
        let symbol = master.claims().root_symbol();
        assert!(master.claims().active(&vec!["x".to_string()]).is_none());
        let _ = symbol;
    }
}
