//! The companion program for a [`Block::Condition`](crate::block::Block::Condition):
//! evaluates its predicate once, at program start, and either runs the
//! wrapped child or terminates immediately.

use super::{make_program, Master, Program};
use crate::block::{Block, Point};
use crate::expr::EvalStack;
use futures::stream::BoxStream;
use futures::StreamExt;
use labflow_common::{ClaimSymbol, ProgramExecEvent};
use parking_lot::Mutex;
use std::sync::Arc;

/// Gates a child block on a predicate evaluated once, at program start.
pub struct ConditionProgram {
    block: Arc<Block>,
    master: Arc<dyn Master>,
    parent: Option<Arc<dyn Program>>,
    active: Mutex<Option<Arc<dyn Program>>>,
}

impl ConditionProgram {
    /// A fresh program for `block`, which must be a [`Block::Condition`].
    pub fn new(block: Arc<Block>, master: Arc<dyn Master>, parent: Option<Arc<dyn Program>>) -> Self {
        Self { block, master, parent, active: Mutex::new(None) }
    }
}

impl Program for ConditionProgram {
    fn run(self: Arc<Self>, initial_point: Option<Point>, stack: EvalStack, symbol: ClaimSymbol) -> BoxStream<'static, ProgramExecEvent> {
        let (tx, rx) = futures::channel::mpsc::unbounded();

        tokio::spawn(async move {
            let Block::Condition(condition) = self.block.as_ref() else {
                unreachable!("ConditionProgram constructed over a non-condition block");
            };

            let holds = condition.predicate.evaluate(&stack).ok().and_then(|value| value.as_bool()).unwrap_or(false);

            if !holds {
                let _ = tx.unbounded_send(ProgramExecEvent::terminal(serde_json::json!({"taken": false})));
                return;
            }

            let child_point = match initial_point {
                Some(Point::Condition { child }) => Some(*child),
                _ => None,
            };

            let child_program = make_program(Arc::new((*condition.child).clone()), self.master.clone(), Some(self.clone() as Arc<dyn Program>));
            *self.active.lock() = Some(child_program.clone());

            let child_symbol = self.master.claims().child_symbol(symbol);
            let mut child_events = child_program.run(child_point, stack, child_symbol);
            while let Some(event) = child_events.next().await {
                let done = event.terminated;
                let out = ProgramExecEvent {
                    location: serde_json::json!({"taken": true, "child": event.location}),
                    errors: event.errors,
                    stopped: event.stopped,
                    terminated: done,
                    state_terminated: event.state_terminated,
                };
                let _ = tx.unbounded_send(out);
                if done {
                    break;
                }
            }
            *self.active.lock() = None;
        });

        Box::pin(rx)
    }

    fn busy(&self) -> bool {
        self.active.lock().as_ref().is_some_and(|child| child.busy())
    }

    fn halt(&self) {
        if let Some(child) = self.active.lock().clone() {
            child.halt();
        }
    }

    fn pause(&self) {
        if let Some(child) = self.active.lock().clone() {
            child.pause();
        }
    }

    fn resume(&self) {
        if let Some(child) = self.active.lock().clone() {
            child.resume();
        }
    }

    fn call_resume(&self) {
        if let Some(parent) = &self.parent {
            parent.call_resume();
        }
    }

    fn get_child(&self) -> Option<Arc<dyn Program>> {
        self.active.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ConditionBlock, ProcessKind, SegmentBlock, TimerSpec};
    use crate::expr::parse_exact;
    use crate::program::master::DefaultMaster;
    use labflow_common::{InMemoryNodeTree, Quantity};

    fn claim_symbol() -> ClaimSymbol {
        let registry: labflow_common::ClaimRegistry<String> = labflow_common::ClaimRegistry::new();
        registry.root_symbol()
    }

    #[tokio::test]
    async fn a_false_predicate_terminates_without_running_the_child() {
        let block = Arc::new(Block::Condition(ConditionBlock {
            predicate: parse_exact("${{ false }}").unwrap(),
            child: Box::new(Block::Segment(SegmentBlock { process: ProcessKind::Timer(TimerSpec::Literal(Quantity::new(10.0, "sec").unwrap())) })),
        }));
        let master: Arc<dyn Master> = Arc::new(DefaultMaster::new(Arc::new(InMemoryNodeTree::new())));
        let program = Arc::new(ConditionProgram::new(block, master, None));

        let mut events = program.run(None, EvalStack::new(), claim_symbol());
        let event = events.next().await.unwrap();
        assert!(event.terminated);
        assert_eq!(event.location["taken"], false);
    }

    #[tokio::test]
    async fn a_true_predicate_runs_the_child_to_completion() {
        let block = Arc::new(Block::Condition(ConditionBlock {
            predicate: parse_exact("${{ true }}").unwrap(),
            child: Box::new(Block::Segment(SegmentBlock { process: ProcessKind::Timer(TimerSpec::Literal(Quantity::new(0.01, "sec").unwrap())) })),
        }));
        let master: Arc<dyn Master> = Arc::new(DefaultMaster::new(Arc::new(InMemoryNodeTree::new())));
        let program = Arc::new(ConditionProgram::new(block, master, None));

        let mut events = program.run(None, EvalStack::new(), claim_symbol());
        let mut last = None;
        while let Some(event) = events.next().await {
            last = Some(event);
        }
        let last = last.unwrap();
        assert!(last.terminated);
        assert_eq!(last.location["taken"], true);
    }
}
