//! State-instance lifecycle: `prepare -> apply -> 0+ notify -> suspend ->
//! close`, fanned out across namespaces by [`StateInstanceCollection`],
//! plus `record`'s concrete implementation.

use super::Master;
use crate::parser::record::RecordUnitState;
use async_trait::async_trait;
use labflow_common::{Analysis, BlockState, ClaimOutcome, ClaimSymbol, DocumentRange, Node, NodeTree, RuntimeError, StateEvent, StateRecord, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// One namespace's running reservation, coupled to its state-wrapped
/// block's program. Implementations validate against the live resource
/// topology in `prepare`, register watches/reservations in `apply`, push
/// zero or more [`StateEvent`]s through their own `notify` channel between
/// `apply` and the next `suspend`, and flush any accumulated output in
/// `close`.
#[async_trait]
pub trait StateInstance: Send + Sync {
    /// Validate against the live resource topology. `resume` is `true`
    /// when this is a re-validation after a prior `suspend` rather than
    /// the instance's original construction — the node topology may have
    /// changed while this reservation was dormant, so the same checks run
    /// either way. An error here is fatal; `apply` must not be called
    /// afterward.
    async fn prepare(&mut self, resume: bool) -> Analysis;

    /// Register watches/reservations/timers; return the initial snapshot.
    /// Must tolerate `resume = true` (re-applying after a prior
    /// `suspend` with the same configuration).
    async fn apply(&mut self, resume: bool) -> StateRecord;

    /// Release watches/reservations; return the final snapshot.
    async fn suspend(&mut self) -> StateRecord;

    /// Flush accumulated output. Terminal; no further calls follow.
    async fn close(&mut self);
}

/// Fans out the state-wrapped block's lifecycle across every namespace
/// contributing a [`StateInstance`], aggregating their records into one
/// namespace-keyed [`Value::Record`].
pub struct StateInstanceCollection {
    instances: Vec<(&'static str, Box<dyn StateInstance>)>,
    applied: bool,
}

impl StateInstanceCollection {
    /// Build the collection backing `state`'s namespaces. `master` gives
    /// instances both the resource topology to watch against and the
    /// claim registry to reserve nodes on, under `symbol` — this
    /// state-wrapped block's own claim identity; `notify` is the channel
    /// state events are delivered on.
    pub fn new(state: &BlockState, master: Arc<dyn Master>, symbol: ClaimSymbol, notify: UnboundedSender<StateEvent>) -> Self {
        let mut instances: Vec<(&'static str, Box<dyn StateInstance>)> = Vec::new();

        if let Some(unit) = state.get("record") {
            if let Some(record_state) = unit.as_any().downcast_ref::<RecordUnitState>() {
                instances.push((
                    "record",
                    Box::new(RecordStateInstance::new(record_state.path.clone(), record_state.origin.clone(), master.clone(), symbol, notify.clone())),
                ));
            }
        }

        Self { instances, applied: false }
    }

    /// Run every instance's `prepare`, merging their analyses.
    pub async fn prepare(&mut self, resume: bool) -> Analysis {
        let mut analysis = Analysis::empty();
        for (_, instance) in &mut self.instances {
            analysis.merge_in_place(instance.prepare(resume).await);
        }
        analysis
    }

    /// Run every instance's `apply`, aggregating into one namespace-keyed
    /// [`StateRecord`].
    pub async fn apply(&mut self, resume: bool) -> StateRecord {
        let record = self.fan_out(|instance| instance.apply(resume)).await;
        self.applied = true;
        record
    }

    /// Run every instance's `suspend`, aggregating as [`Self::apply`]
    /// does.
    pub async fn suspend(&mut self) -> StateRecord {
        let record = self.fan_out(|instance| instance.suspend()).await;
        self.applied = false;
        record
    }

    async fn fan_out<'a, F, Fut>(&'a mut self, mut call: F) -> StateRecord
    where
        F: FnMut(&'a mut Box<dyn StateInstance>) -> Fut,
        Fut: std::future::Future<Output = StateRecord>,
    {
        let mut fields = BTreeMap::new();
        let mut analysis = Analysis::empty();
        for (namespace, instance) in &mut self.instances {
            let record = call(instance).await;
            analysis.merge_in_place(record.analysis);
            fields.insert((*namespace).to_string(), record.location);
        }
        StateRecord { location: Value::Record(fields), analysis }
    }

    /// Close every instance.
    pub async fn close(&mut self) {
        for (_, instance) in &mut self.instances {
            instance.close().await;
        }
    }

    /// Whether `apply` has run since the last `suspend` (or construction).
    pub fn applied(&self) -> bool {
        self.applied
    }
}

/// `record`'s state instance: claims its watched node for the lifetime of
/// `apply`/`suspend`, polls it on every change notification, and
/// accumulates one row per reading. `close` is the point at which a
/// complete implementation would flush to an output sink; this one logs
/// the accumulated row count through the ambient logging layer, since the
/// protocol surface has no `output`/`format` attributes.
struct RecordStateInstance {
    path: Vec<String>,
    origin: DocumentRange,
    master: Arc<dyn Master>,
    symbol: ClaimSymbol,
    notify: UnboundedSender<StateEvent>,
    node: Option<Arc<dyn Node>>,
    holding_claim: bool,
    rows: Vec<Value>,
    watcher: Option<(Arc<Notify>, JoinHandle<()>)>,
}

impl RecordStateInstance {
    fn new(path: Vec<String>, origin: DocumentRange, master: Arc<dyn Master>, symbol: ClaimSymbol, notify: UnboundedSender<StateEvent>) -> Self {
        Self { path, origin, master, symbol, notify, node: None, holding_claim: false, rows: Vec::new(), watcher: None }
    }

    fn read_once(&mut self) {
        if let Some(value) = self.node.as_ref().and_then(|node| node.value()) {
            self.rows.push(value);
        }
    }
}

#[async_trait]
impl StateInstance for RecordStateInstance {
    async fn prepare(&mut self, resume: bool) -> Analysis {
        if resume {
            tracing::debug!(path = ?self.path, "re-validating watched node on resume");
        }
        match self.master.node_tree().find(&self.path) {
            Some(node) => {
                self.node = Some(node);
                Analysis::empty()
            }
            None => Analysis::from_error(RuntimeError::MissingNode(self.origin.clone()).to_string(), vec![self.origin.clone()]),
        }
    }

    async fn apply(&mut self, _resume: bool) -> StateRecord {
        if !self.holding_claim {
            match self.master.claims().attempt(self.path.clone(), self.symbol) {
                ClaimOutcome::Granted | ClaimOutcome::Preempted => self.holding_claim = true,
                ClaimOutcome::Waiting => {
                    return StateRecord::new(Value::Integer(self.rows.len() as i64))
                        .with_analysis(Analysis::from_error(RuntimeError::ClaimPreempted.to_string(), vec![self.origin.clone()]));
                }
            }
        }

        self.read_once();
        let _ = self.notify.send(StateEvent::new(Value::Integer(self.rows.len() as i64)));

        if let Some(node) = self.node.clone().filter(|node| node.is_subscribable()) {
            if let Some(notifier) = node.change_notifier() {
                let tx = self.notify.clone();
                let rows_so_far = self.rows.len();
                let node_for_task = node.clone();
                let stop = Arc::new(Notify::new());
                let stop_for_task = stop.clone();
                let handle = tokio::spawn(async move {
                    let mut count = rows_so_far;
                    loop {
                        tokio::select! {
                            _ = notifier.notified() => {
                                if let Some(value) = node_for_task.value() {
                                    count += 1;
                                    let _ = tx.send(StateEvent::new(value).settled());
                                    let _ = count;
                                }
                            }
                            _ = stop_for_task.notified() => break,
                        }
                    }
                });
                self.watcher = Some((stop, handle));
            }
        }

        StateRecord::new(Value::Integer(self.rows.len() as i64))
    }

    async fn suspend(&mut self) -> StateRecord {
        if let Some((stop, handle)) = self.watcher.take() {
            stop.notify_waiters();
            let _ = handle.await;
        }
        if self.holding_claim {
            self.master.claims().release(&self.path, self.symbol);
            self.holding_claim = false;
        }
        self.read_once();
        let _ = self.notify.send(StateEvent::new(Value::Integer(self.rows.len() as i64)).settled());
        StateRecord::new(Value::Integer(self.rows.len() as i64))
    }

    async fn close(&mut self) {
        if self.holding_claim {
            self.master.claims().release(&self.path, self.symbol);
            self.holding_claim = false;
        }
        tracing::info!(path = ?self.path, rows = self.rows.len(), "record state instance closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::master::DefaultMaster;
    use labflow_common::InMemoryNodeTree;

    fn test_origin() -> DocumentRange {
        DocumentRange { document_id: "doc".to_string(), range: labflow_common::Range::new(0, 1) }
    }

    fn master_over(tree: InMemoryNodeTree) -> Arc<dyn Master> {
        Arc::new(DefaultMaster::new(Arc::new(tree)))
    }

    #[tokio::test]
    async fn prepare_fails_when_the_node_path_is_missing() {
        let master = master_over(InMemoryNodeTree::new());
        let symbol = master.claims().root_symbol();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut instance = RecordStateInstance::new(vec!["missing".to_string()], test_origin(), master, symbol, tx);
        let analysis = instance.prepare(false).await;
        assert!(analysis.has_errors());
    }

    #[tokio::test]
    async fn apply_reads_the_current_value_into_the_row_buffer() {
        let tree = InMemoryNodeTree::new();
        tree.register_polled(vec!["temp".to_string()], Some(Value::Float(21.5)));
        let master = master_over(tree);
        let symbol = master.claims().root_symbol();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut instance = RecordStateInstance::new(vec!["temp".to_string()], test_origin(), master, symbol, tx);
        assert!(!instance.prepare(false).await.has_errors());
        let record = instance.apply(false).await;
        assert_eq!(record.location, Value::Integer(1));
        assert_eq!(instance.rows.len(), 1);
    }

    #[tokio::test]
    async fn apply_claims_the_watched_node_and_suspend_releases_it() {
        let tree = InMemoryNodeTree::new();
        tree.register_polled(vec!["temp".to_string()], Some(Value::Float(1.0)));
        let master = master_over(tree);
        let symbol = master.claims().root_symbol();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let path = vec!["temp".to_string()];
        let mut instance = RecordStateInstance::new(path.clone(), test_origin(), master.clone(), symbol, tx);

        instance.prepare(false).await;
        assert!(master.claims().active(&path).is_none());
        instance.apply(false).await;
        assert_eq!(master.claims().active(&path), Some(symbol));
        instance.suspend().await;
        assert!(master.claims().active(&path).is_none());
    }

    #[tokio::test]
    async fn a_weaker_instance_waits_instead_of_reading_while_another_holds_the_claim() {
        let tree = InMemoryNodeTree::new();
        tree.register_polled(vec!["temp".to_string()], Some(Value::Float(1.0)));
        let master = master_over(tree);
        let root = master.claims().root_symbol();
        // `holder` is allocated after `waiter`, so it dominates: a later
        // sibling outranks an earlier one at the same depth.
        let waiter = master.claims().child_symbol(root);
        let holder = master.claims().child_symbol(root);
        let path = vec!["temp".to_string()];

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let mut holding = RecordStateInstance::new(path.clone(), test_origin(), master.clone(), holder, tx.clone());
        holding.prepare(false).await;
        holding.apply(false).await;

        let mut waiting = RecordStateInstance::new(path.clone(), test_origin(), master.clone(), waiter, tx);
        waiting.prepare(false).await;
        let record = waiting.apply(false).await;

        assert!(record.analysis.has_errors());
        assert!(waiting.rows.is_empty());
        assert_eq!(master.claims().active(&path), Some(holder));
    }

    #[tokio::test]
    async fn a_collection_reports_applied_only_between_apply_and_suspend() {
        let tree = InMemoryNodeTree::new();
        tree.register_polled(vec!["temp".to_string()], Some(Value::Float(1.0)));
        let master = master_over(tree);
        let symbol = master.claims().root_symbol();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        let state = BlockState::empty().with("record", Arc::new(RecordUnitState { path: vec!["temp".to_string()], origin: test_origin() }));
        let mut collection = StateInstanceCollection::new(&state, master, symbol, tx);
        assert!(!collection.applied());
        collection.prepare(false).await;
        collection.apply(false).await;
        assert!(collection.applied());
        collection.suspend().await;
        assert!(!collection.applied());
    }
}
