//! The companion program for a [`Block::StateWrapped`](crate::block::Block::StateWrapped):
//! mediates between a single child program and the
//! [`StateInstanceCollection`] backing its reservation, joining child
//! events with state events in lockstep so the reservation is suspended
//! exactly when the child is stopped and re-applied exactly when it
//! resumes.

use super::state_instance::StateInstanceCollection;
use super::{make_program, Master, Program};
use crate::block::{Block, Point};
use crate::expr::EvalStack;
use futures::stream::BoxStream;
use futures::StreamExt;
use labflow_common::{Analysis, ClaimSymbol, ProgramExecEvent, Severity, StateEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

/// The state program's internal mode, totally ordered in declaration order
/// so the assertion-style legality checks on `pause`/`resume`/`halt` can
/// compare modes directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum StateProgramMode {
    Starting,
    Normal,
    PausingChild,
    PausingState,
    Paused,
    Resuming,
    HaltingChild,
    HaltingState,
    Halted,
}

impl StateProgramMode {
    fn as_str(self) -> &'static str {
        match self {
            StateProgramMode::Starting => "starting",
            StateProgramMode::Normal => "normal",
            StateProgramMode::PausingChild => "pausing_child",
            StateProgramMode::PausingState => "pausing_state",
            StateProgramMode::Paused => "paused",
            StateProgramMode::Resuming => "resuming",
            StateProgramMode::HaltingChild => "halting_child",
            StateProgramMode::HaltingState => "halting_state",
            StateProgramMode::Halted => "halted",
        }
    }
}

fn error_messages(analysis: &Analysis) -> Vec<String> {
    analysis.diagnostics.iter().filter(|d| d.kind == Severity::Error).map(|d| d.message.clone()).collect()
}

/// Drives a [`Block::StateWrapped`] block: runs its child program while a
/// [`StateInstanceCollection`] holds the reservation the child runs under,
/// keeping both halves paused, running, or halted in lockstep.
pub struct StateProgram {
    block: Arc<Block>,
    master: Arc<dyn Master>,
    parent: Option<Arc<dyn Program>>,
    mode: Mutex<StateProgramMode>,
    child: Mutex<Option<Arc<dyn Program>>>,
    child_stopped: Mutex<bool>,
    state_instance: Mutex<Option<Arc<tokio::sync::Mutex<StateInstanceCollection>>>>,
    trigger: Notify,
}

impl StateProgram {
    /// A fresh program for `block`, which must be a [`Block::StateWrapped`].
    pub fn new(block: Arc<Block>, master: Arc<dyn Master>, parent: Option<Arc<dyn Program>>) -> Self {
        Self {
            block,
            master,
            parent,
            mode: Mutex::new(StateProgramMode::Starting),
            child: Mutex::new(None),
            child_stopped: Mutex::new(false),
            state_instance: Mutex::new(None),
            trigger: Notify::new(),
        }
    }
}

impl Program for StateProgram {
    fn run(self: Arc<Self>, initial_point: Option<Point>, stack: EvalStack, symbol: ClaimSymbol) -> BoxStream<'static, ProgramExecEvent> {
        let (tx, rx) = futures::channel::mpsc::unbounded();

        tokio::spawn(async move {
            let Block::StateWrapped(wrapped) = self.block.as_ref() else {
                unreachable!("StateProgram constructed over a non-state block");
            };

            let child_point = match initial_point {
                Some(Point::StateWrapped { child }) => Some(*child),
                _ => None,
            };

            let (state_tx, mut state_rx) = tokio::sync::mpsc::unbounded_channel::<StateEvent>();
            let state_instance = Arc::new(tokio::sync::Mutex::new(StateInstanceCollection::new(
                &wrapped.state,
                self.master.clone(),
                symbol,
                state_tx.clone(),
            )));
            *self.state_instance.lock() = Some(state_instance.clone());

            // `spawn_suspend` backgrounds `suspend()`, running it off the
            // main loop, and wakes the coupled loop with the resulting
            // record once it completes, so the loop isn't blocked waiting
            // for a namespace's watchers to unwind.
            let spawn_suspend = {
                let state_instance = state_instance.clone();
                let state_tx = state_tx.clone();
                move || {
                    let state_instance = state_instance.clone();
                    let state_tx = state_tx.clone();
                    tokio::spawn(async move {
                        let record = state_instance.lock().await.suspend().await;
                        let _ = state_tx.send(StateEvent::new(record.location).settled().with_analysis(record.analysis));
                    });
                }
            };

            let mut carried_errors = error_messages(&state_instance.lock().await.prepare(false).await);

            let child_program = make_program(Arc::new((*wrapped.child).clone()), self.master.clone(), Some(self.clone() as Arc<dyn Program>));
            *self.child.lock() = Some(child_program.clone());
            *self.mode.lock() = StateProgramMode::Normal;

            let child_symbol = self.master.claims().child_symbol(symbol);
            let mut child_events = child_program.run(child_point, stack, child_symbol);
            let mut child_done = false;
            let mut child_stopped_flag = false;
            let mut child_state_terminated = false;
            let mut state_buffer: Vec<StateEvent> = Vec::new();
            let mut state_location: Option<serde_json::Value> = None;
            let mut last_child_location = serde_json::Value::Null;

            loop {
                enum Next {
                    Child(Option<ProgramExecEvent>),
                    Trigger,
                }

                // A state event is itself a delivery (matching the "coupled
                // iterator" semantics): it wakes the loop for processing with
                // `event = None`, just like an external trigger, after
                // draining any further already-queued state events so they
                // batch into the same delivery.
                let next = tokio::select! {
                    ev = child_events.next(), if !child_done => Next::Child(ev),
                    Some(se) = state_rx.recv() => {
                        state_buffer.push(se);
                        while let Ok(se) = state_rx.try_recv() {
                            state_buffer.push(se);
                        }
                        Next::Trigger
                    }
                    _ = self.trigger.notified() => Next::Trigger,
                };

                let event = match next {
                    Next::Child(Some(ev)) => Some(ev),
                    Next::Child(None) => {
                        child_done = true;
                        None
                    }
                    Next::Trigger => None,
                };

                let mut errors = std::mem::take(&mut carried_errors);
                for state_event in state_buffer.drain(..) {
                    errors.extend(error_messages(&state_event.analysis));
                    state_location = Some(state_event.location);
                }

                let mut mode = *self.mode.lock();

                if let Some(event) = &event {
                    if mode == StateProgramMode::Normal && child_state_terminated && !event.state_terminated {
                        self.master.write_state();
                    } else if mode == StateProgramMode::Normal && child_stopped_flag && !event.stopped {
                        self.master.write_state();
                    }

                    if mode == StateProgramMode::Normal && event.stopped && !child_stopped_flag && !event.state_terminated {
                        self.master.transfer_state();
                        self.master.write_state();
                    }

                    child_stopped_flag = event.stopped;
                    child_state_terminated = event.state_terminated;
                    *self.child_stopped.lock() = child_stopped_flag;
                    last_child_location = event.location.clone();
                    errors.extend(event.errors.clone());

                    if event.terminated {
                        if state_instance.lock().await.applied() {
                            mode = StateProgramMode::HaltingState;
                            let state_instance = state_instance.clone();
                            tokio::spawn(async move {
                                let record = state_instance.lock().await.suspend().await;
                                let _ = record;
                            });
                        } else {
                            mode = StateProgramMode::Halted;
                        }
                    }
                }

                if mode == StateProgramMode::PausingChild && child_stopped_flag {
                    mode = StateProgramMode::PausingState;
                    let state_instance = state_instance.clone();
                    tokio::spawn(async move {
                        let record = state_instance.lock().await.suspend().await;
                        let _ = record;
                    });
                }

                if mode == StateProgramMode::PausingState && !state_instance.lock().await.applied() {
                    mode = StateProgramMode::Paused;
                }

                if mode == StateProgramMode::HaltingState && !state_instance.lock().await.applied() {
                    mode = StateProgramMode::Halted;
                }

                let resuming = (mode == StateProgramMode::Paused && !child_stopped_flag) || mode == StateProgramMode::Resuming;
                if resuming {
                    mode = StateProgramMode::Normal;
                }

                if mode == StateProgramMode::Normal && !state_instance.lock().await.applied() {
                    let record = state_instance.lock().await.apply(resuming).await;
                    errors.extend(error_messages(&record.analysis));
                    state_location = Some(labflow_common::Exportable::export(&record.location));
                }

                if mode == StateProgramMode::Halted {
                    state_instance.lock().await.close().await;
                }

                *self.mode.lock() = mode;

                let display_mode = if mode == StateProgramMode::Halted { StateProgramMode::HaltingState } else { mode };
                let out = ProgramExecEvent {
                    location: serde_json::json!({
                        "child": last_child_location,
                        "mode": display_mode.as_str(),
                        "state": state_location,
                    }),
                    errors,
                    stopped: matches!(mode, StateProgramMode::Paused | StateProgramMode::Halted),
                    terminated: mode == StateProgramMode::Halted,
                    state_terminated: mode == StateProgramMode::Halted,
                };
                let _ = tx.unbounded_send(out);

                if mode == StateProgramMode::Halted {
                    break;
                }
            }

            *self.child.lock() = None;
        });

        Box::pin(rx)
    }

    fn busy(&self) -> bool {
        let mode = *self.mode.lock();
        if !matches!(mode, StateProgramMode::Normal | StateProgramMode::Paused) {
            return true;
        }
        self.child.lock().as_ref().is_some_and(|child| child.busy())
    }

    fn halt(&self) {
        assert!(!self.busy(), "halt() called while busy");
        *self.mode.lock() = StateProgramMode::HaltingChild;
        if let Some(child) = self.child.lock().clone() {
            child.halt();
        }
    }

    fn pause(&self) {
        assert!(!self.busy(), "pause() called while busy");
        assert_eq!(*self.mode.lock(), StateProgramMode::Normal, "pause() called outside Normal mode");
        *self.mode.lock() = StateProgramMode::PausingChild;

        if *self.child_stopped.lock() {
            self.trigger.notify_waiters();
        } else if let Some(child) = self.child.lock().clone() {
            child.pause();
        }
    }

    fn resume(&self) {
        assert!(!self.busy(), "resume() called while busy");
        assert_eq!(*self.mode.lock(), StateProgramMode::Paused, "resume() called outside Paused mode");
        *self.mode.lock() = StateProgramMode::Resuming;

        if *self.child_stopped.lock() {
            if let Some(child) = self.child.lock().clone() {
                child.resume();
            }
        }

        self.call_resume();
        self.trigger.notify_waiters();
    }

    fn call_resume(&self) {
        if *self.mode.lock() == StateProgramMode::Normal {
            self.master.transfer_state();
        } else {
            if let Some(state_instance) = self.state_instance.lock().clone() {
                tokio::spawn(async move {
                    state_instance.lock().await.prepare(true).await;
                });
            }
            if let Some(parent) = &self.parent {
                parent.call_resume();
            }
        }
    }

    fn get_child(&self) -> Option<Arc<dyn Program>> {
        self.child.lock().clone()
    }
}
