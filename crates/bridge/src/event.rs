//! The wire shape of events forwarded to connected clients:
//! `{type: "state", data: ...}`, tagged with the id of the
//! program the event belongs to so a client watching several running
//! protocols can tell them apart.

use labflow_common::{ProgramExecEvent, StateEvent};
use serde::{Deserialize, Serialize};

/// A single outbound message: a program's own exec event, or a state
/// instance's snapshot, each carrying the id of its owning program.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// A program transitioned; delivered as `{type: "state", data: ...}`.
    #[serde(rename = "state")]
    Program {
        /// Id of the program this event belongs to.
        program_id: String,
        /// The event itself.
        data: ProgramExecEvent,
    },
    /// A state instance produced a snapshot.
    StateInstance {
        /// Id of the owning program.
        program_id: String,
        /// The snapshot itself.
        data: StateEvent,
    },
}

impl BridgeEvent {
    /// Wrap a program's exec event.
    pub fn program(program_id: impl Into<String>, data: ProgramExecEvent) -> Self {
        Self::Program { program_id: program_id.into(), data }
    }

    /// Wrap a state instance's snapshot.
    pub fn state_instance(program_id: impl Into<String>, data: StateEvent) -> Self {
        Self::StateInstance { program_id: program_id.into(), data }
    }
}

/// A client-driven command targeting one running program:
/// `{program_id, message: {type: "pause"|"resume"|"halt"}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientCommand {
    /// Id of the program the command targets.
    pub program_id: String,
    /// The command itself.
    pub message: labflow_engine::program::ClientMessage,
}
