//! The companion program for a [`Block::Sequence`](crate::block::Block::Sequence):
//! runs its children in order, emitting each child's terminal event
//! passthrough until the last child's is promoted to the sequence's own.

use super::{make_program, Master, Program};
use crate::block::{Block, Point};
use crate::expr::EvalStack;
use futures::stream::BoxStream;
use futures::StreamExt;
use labflow_common::{ClaimSymbol, ProgramExecEvent};
use parking_lot::Mutex;
use std::sync::Arc;

/// Steps a [`Block::Sequence`]'s children one at a time.
pub struct SequenceProgram {
    block: Arc<Block>,
    master: Arc<dyn Master>,
    parent: Option<Arc<dyn Program>>,
    active: Mutex<Option<Arc<dyn Program>>>,
}

impl SequenceProgram {
    /// A fresh program for `block`, which must be a [`Block::Sequence`].
    pub fn new(block: Arc<Block>, master: Arc<dyn Master>, parent: Option<Arc<dyn Program>>) -> Self {
        Self { block, master, parent, active: Mutex::new(None) }
    }
}

impl Program for SequenceProgram {
    fn run(self: Arc<Self>, initial_point: Option<Point>, stack: EvalStack, symbol: ClaimSymbol) -> BoxStream<'static, ProgramExecEvent> {
        let (tx, rx) = futures::channel::mpsc::unbounded();

        tokio::spawn(async move {
            let Block::Sequence(seq) = self.block.as_ref() else {
                unreachable!("SequenceProgram constructed over a non-sequence block");
            };

            if seq.children.is_empty() {
                let _ = tx.unbounded_send(ProgramExecEvent::terminal(serde_json::json!({"index": null})));
                return;
            }

            let (start_index, mut start_child_point) = match initial_point {
                Some(Point::Sequence { index, child }) => (index, Some(*child)),
                _ => (0, None),
            };

            let last_index = seq.children.len() - 1;

            for (index, child_block) in seq.children.iter().enumerate().skip(start_index) {
                let child_program = make_program(Arc::new(child_block.clone()), self.master.clone(), Some(self.clone() as Arc<dyn Program>));
                *self.active.lock() = Some(child_program.clone());

                let point = if index == start_index { start_child_point.take() } else { None };
                let child_symbol = self.master.claims().child_symbol(symbol);
                let mut child_events = child_program.run(point, stack.clone(), child_symbol);

                while let Some(event) = child_events.next().await {
                    let done = event.terminated;
                    let out = ProgramExecEvent {
                        location: serde_json::json!({"index": index, "child": event.location}),
                        errors: event.errors,
                        stopped: event.stopped,
                        terminated: done && index == last_index,
                        state_terminated: event.state_terminated,
                    };
                    let _ = tx.unbounded_send(out);
                    if done {
                        break;
                    }
                }

                *self.active.lock() = None;
            }
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
    use crate::block::{ProcessKind, SegmentBlock, TimerSpec};
    use crate::program::master::DefaultMaster;
    use labflow_common::{InMemoryNodeTree, Quantity};

    fn claim_symbol() -> ClaimSymbol {
        let registry: labflow_common::ClaimRegistry<String> = labflow_common::ClaimRegistry::new();
        registry.root_symbol()
    }

    fn timer_block(seconds: f64) -> Block {
        Block::Segment(SegmentBlock { process: ProcessKind::Timer(TimerSpec::Literal(Quantity::new(seconds, "sec").unwrap())) })
    }

    #[tokio::test]
    async fn runs_every_child_and_promotes_the_last_terminal_event() {
        let block = Arc::new(Block::Sequence(crate::block::SequenceBlock { children: vec![timer_block(0.01), timer_block(0.01)] }));
        let master: Arc<dyn Master> = Arc::new(DefaultMaster::new(Arc::new(InMemoryNodeTree::new())));
        let program = Arc::new(SequenceProgram::new(block, master, None));

        let mut events = program.run(None, EvalStack::new(), claim_symbol());
        let mut terminated_count = 0;
        let mut seen_indices = std::collections::BTreeSet::new();
        while let Some(event) = events.next().await {
            seen_indices.insert(event.location["index"].as_u64());
            if event.terminated {
                terminated_count += 1;
            }
        }
        assert_eq!(terminated_count, 1);
        assert!(seen_indices.contains(&Some(0)));
        assert!(seen_indices.contains(&Some(1)));
    }

    #[tokio::test]
    async fn an_empty_sequence_terminates_immediately() {
        let block = Arc::new(Block::Sequence(crate::block::SequenceBlock { children: vec![] }));
        let master: Arc<dyn Master> = Arc::new(DefaultMaster::new(Arc::new(InMemoryNodeTree::new())));
        let program = Arc::new(SequenceProgram::new(block, master, None));

        let mut events = program.run(None, EvalStack::new(), claim_symbol());
        let event = events.next().await.unwrap();
        assert!(event.terminated);
        assert!(events.next().await.is_none());
    }
}
