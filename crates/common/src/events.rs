//! Event types emitted by programs and state instances as they run.

use crate::analysis::Analysis;
use crate::value::{Exportable, Value};
use serde::{Deserialize, Serialize};

/// Emitted by every program at each transition, and forwarded up the
/// program tree (wrapped with the parent's own bookkeeping) until it
/// reaches the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramExecEvent {
    /// Opaque location snapshot, e.g. "which child is active" for a
    /// sequence, exported as a JSON value so each block kind can shape its
    /// own location payload.
    pub location: serde_json::Value,
    /// Errors observed on this transition (non-fatal; the program keeps
    /// running unless its own logic decides to halt).
    pub errors: Vec<String>,
    /// Whether the program is currently stopped (paused or about to halt).
    pub stopped: bool,
    /// Whether this is the program's terminal event. Exactly one event in
    /// a program's lifetime has `terminated = true`, and it is the last.
    pub terminated: bool,
    /// Whether the owning state instance (if any) has terminated —
    /// discarded its reservation — independent of the program itself
    /// terminating.
    pub state_terminated: bool,
}

impl ProgramExecEvent {
    /// A non-terminal event carrying no errors.
    pub fn running(location: serde_json::Value, stopped: bool) -> Self {
        Self { location, errors: Vec::new(), stopped, terminated: false, state_terminated: false }
    }

    /// The terminal event for a program.
    pub fn terminal(location: serde_json::Value) -> Self {
        Self { location, errors: Vec::new(), stopped: true, terminated: true, state_terminated: true }
    }
}

/// A snapshot emitted by a state instance, either on `apply`/`suspend` or
/// via an asynchronous `notify` call in between.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEvent {
    /// The namespace-specific location payload (e.g. `RecordStateLocation`).
    pub location: serde_json::Value,
    /// Whether the instance has reached steady state since its last event.
    pub settled: bool,
    /// Analysis accumulated producing this event (usually just runtime
    /// errors; state instances rarely contribute completions/hovers).
    #[serde(skip)]
    pub analysis: Analysis,
}

impl StateEvent {
    /// A non-settled event with the given location payload.
    pub fn new(location: impl Exportable) -> Self {
        Self { location: location.export(), settled: false, analysis: Analysis::empty() }
    }

    /// Mark this event as having reached steady state.
    pub fn settled(mut self) -> Self {
        self.settled = true;
        self
    }

    /// Attach an analysis (typically carrying runtime errors).
    pub fn with_analysis(mut self, analysis: Analysis) -> Self {
        self.analysis = analysis;
        self
    }
}

/// The record returned by `apply` and `suspend`: a location snapshot plus
/// whatever value the namespace wants to hand back to its caller (e.g. the
/// initial row count for the `record` namespace).
#[derive(Debug, Clone)]
pub struct StateRecord {
    /// Location payload at the moment this record was produced.
    pub location: Value,
    /// Analysis accumulated while producing this record.
    pub analysis: Analysis,
}

impl StateRecord {
    /// A record with no diagnostics attached.
    pub fn new(location: Value) -> Self {
        Self { location, analysis: Analysis::empty() }
    }

    /// Attach an analysis.
    pub fn with_analysis(mut self, analysis: Analysis) -> Self {
        self.analysis = analysis;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_event_is_marked_terminated_and_stopped() {
        let event = ProgramExecEvent::terminal(serde_json::json!({"done": true}));
        assert!(event.terminated);
        assert!(event.stopped);
        assert!(event.state_terminated);
    }

    #[test]
    fn running_event_is_not_terminal() {
        let event = ProgramExecEvent::running(serde_json::Value::Null, false);
        assert!(!event.terminated);
        assert!(!event.stopped);
    }

    #[test]
    fn state_event_settled_builder_sets_flag() {
        let event = StateEvent::new(Value::Integer(3)).settled();
        assert!(event.settled);
    }
}
