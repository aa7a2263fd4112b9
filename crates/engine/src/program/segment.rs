//! The companion program for a [`Block::Segment`](crate::block::Block::Segment):
//! drives one leaf process to completion. Currently the only leaf process
//! is `timer`'s fixed or computed wait.

use super::{Master, Program};
use crate::block::{Block, ProcessKind, TimerSpec};
use crate::expr::EvalStack;
use futures::stream::BoxStream;
use labflow_common::{ClaimSymbol, ProgramExecEvent, Quantity};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// The bounded granularity at which a running segment re-checks its mode,
/// so a `pause`/`halt` call is observed promptly without busy-polling.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentMode {
    Running,
    Paused,
    Halting,
}

/// Drives a single leaf process (currently just `timer`) to completion.
pub struct SegmentProgram {
    block: Arc<Block>,
    #[allow(dead_code)]
    master: Arc<dyn Master>,
    parent: Option<Arc<dyn Program>>,
    mode: Mutex<SegmentMode>,
    notify: Notify,
}

impl SegmentProgram {
    /// A fresh program for `block`, which must be a [`Block::Segment`].
    pub fn new(block: Arc<Block>, master: Arc<dyn Master>, parent: Option<Arc<dyn Program>>) -> Self {
        Self { block, master, parent, mode: Mutex::new(SegmentMode::Running), notify: Notify::new() }
    }

    fn duration(&self, stack: &EvalStack) -> Duration {
        let Block::Segment(segment) = self.block.as_ref() else {
            unreachable!("SegmentProgram constructed over a non-segment block");
        };
        let seconds = match &segment.process {
            ProcessKind::Timer(TimerSpec::Literal(quantity)) => quantity.base_magnitude(),
            ProcessKind::Timer(TimerSpec::Expr(expr)) => expr
                .evaluate(stack)
                .ok()
                .and_then(|value| value.as_quantity())
                .map(|q: Quantity| q.base_magnitude())
                .unwrap_or(0.0),
        };
        Duration::from_secs_f64(seconds.max(0.0))
    }
}

impl Program for SegmentProgram {
    fn run(self: Arc<Self>, _initial_point: Option<crate::block::Point>, stack: EvalStack, _symbol: ClaimSymbol) -> BoxStream<'static, ProgramExecEvent> {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        let total = self.duration(&stack);

        tokio::spawn(async move {
            let _ = tx.unbounded_send(ProgramExecEvent::running(serde_json::json!({"elapsed": 0.0}), false));

            let mut elapsed = Duration::ZERO;
            loop {
                match *self.mode.lock() {
                    SegmentMode::Halting => break,
                    SegmentMode::Paused => {
                        self.notify.notified().await;
                        continue;
                    }
                    SegmentMode::Running => {}
                }

                let remaining = total.saturating_sub(elapsed);
                if remaining.is_zero() {
                    break;
                }

                let tick = remaining.min(POLL_INTERVAL);
                tokio::select! {
                    _ = tokio::time::sleep(tick) => { elapsed += tick; }
                    _ = self.notify.notified() => {}
                }
            }

            let _ = tx.unbounded_send(ProgramExecEvent::terminal(serde_json::json!({"elapsed": elapsed.as_secs_f64()})));
        });

        Box::pin(rx)
    }

    fn busy(&self) -> bool {
        false
    }

    fn halt(&self) {
        *self.mode.lock() = SegmentMode::Halting;
        self.notify.notify_waiters();
    }

    fn pause(&self) {
        let mut mode = self.mode.lock();
        assert_eq!(*mode, SegmentMode::Running, "pause() called while not running");
        *mode = SegmentMode::Paused;
    }

    fn resume(&self) {
        let mut mode = self.mode.lock();
        assert_eq!(*mode, SegmentMode::Paused, "resume() called while not paused");
        *mode = SegmentMode::Running;
        drop(mode);
        self.notify.notify_waiters();
        self.call_resume();
    }

    fn call_resume(&self) {
        if let Some(parent) = &self.parent {
            parent.call_resume();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::SegmentBlock;
    use crate::program::master::DefaultMaster;
    use futures::StreamExt;
    use labflow_common::InMemoryNodeTree;

    fn claim_symbol() -> ClaimSymbol {
        let registry: labflow_common::ClaimRegistry<String> = labflow_common::ClaimRegistry::new();
        registry.root_symbol()
    }

    #[tokio::test]
    async fn a_literal_timer_segment_runs_to_completion() {
        let block = Arc::new(Block::Segment(SegmentBlock {
            process: ProcessKind::Timer(TimerSpec::Literal(Quantity::new(0.01, "sec").unwrap())),
        }));
        let master: Arc<dyn Master> = Arc::new(DefaultMaster::new(Arc::new(InMemoryNodeTree::new())));
        let program = Arc::new(SegmentProgram::new(block, master, None));

        let mut events = program.run(None, EvalStack::new(), claim_symbol());
        let first = events.next().await.unwrap();
        assert!(!first.terminated);
        let last = events.next().await.unwrap();
        assert!(last.terminated);
        assert!(events.next().await.is_none());
    }
}
