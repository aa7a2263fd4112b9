//! The block-program runtime: every compiled [`Block`](crate::block::Block)
//! has a companion program type driving it as a cooperatively-scheduled
//! async stream of [`ProgramExecEvent`]s. Programs form a tree mirroring
//! the block tree; a single [`Master`] is shared by the whole tree.

pub mod condition;
pub mod master;
pub mod segment;
pub mod sequence;
pub mod state_instance;
pub mod state_program;

pub use master::{DefaultMaster, Master};

use crate::block::{Block, Point};
use crate::expr::EvalStack;
use futures::stream::BoxStream;
use labflow_common::{ClaimSymbol, ProgramExecEvent};
use std::sync::Arc;

/// A client-driven command targeting one running program. An illegal
/// transition is rejected by the target program's
/// own `pause`/`resume`/`halt`, matching the source's assertion-style
/// legality checks rather than returning a `Result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Request a pause.
    Pause,
    /// Resume from a pause.
    Resume,
    /// Request termination.
    Halt,
}

/// The contract every block's companion program satisfies.
pub trait Program: Send + Sync {
    /// Drive execution to completion, yielding [`ProgramExecEvent`]s until
    /// exactly one terminal event (`terminated = true`) has been emitted.
    fn run(self: Arc<Self>, initial_point: Option<Point>, stack: EvalStack, symbol: ClaimSymbol) -> BoxStream<'static, ProgramExecEvent>;

    /// Whether this program is mid-transition and cannot legally accept
    /// `halt`/`pause`/`resume` right now.
    fn busy(&self) -> bool;

    /// Request termination. Legal only when `!busy()`.
    fn halt(&self);

    /// Request a pause. Legal only when `!busy()` and in a pausable mode.
    fn pause(&self);

    /// Resume from a pause. Legal only when `!busy()` and paused.
    fn resume(&self);

    /// Apply a client-driven command.
    fn import_message(&self, message: ClientMessage) {
        match message {
            ClientMessage::Pause => self.pause(),
            ClientMessage::Resume => self.resume(),
            ClientMessage::Halt => self.halt(),
        }
    }

    /// Upward notification that a descendant resumed. The default action
    /// forwards nowhere; programs with a parent link override this to
    /// forward the call up the tree.
    fn call_resume(&self) {}

    /// Resolve this program's currently running child, for external
    /// addressing. Leaf programs have none.
    fn get_child(&self) -> Option<Arc<dyn Program>> {
        None
    }
}

/// Construct the companion program for `block`.
pub fn make_program(block: Arc<Block>, master: Arc<dyn Master>, parent: Option<Arc<dyn Program>>) -> Arc<dyn Program> {
    match block.as_ref() {
        Block::Sequence(_) => Arc::new(sequence::SequenceProgram::new(block, master, parent)),
        Block::Condition(_) => Arc::new(condition::ConditionProgram::new(block, master, parent)),
        Block::Segment(_) => Arc::new(segment::SegmentProgram::new(block, master, parent)),
        Block::StateWrapped(_) => Arc::new(state_program::StateProgram::new(block, master, parent)),
    }
}
