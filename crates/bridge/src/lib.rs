// Copyright (C) 2024 Aline Forsythe and Dmitri Kowalski
// SPDX-License-Identifier: AGPL-3.0
//! labflow-bridge - The minimal client-facing collaborator the core needs:
//! a callback for broadcasting program events, and a websocket/JSON
//! server forwarding them to connected clients while routing their
//! inbound pause/resume/halt commands back to the running program tree.
//!
//! Everything else a production bridge would carry - authentication,
//! zero-conf advertisement, multiple transport protocols - is out of
//! scope.

pub mod event;
pub mod server;
pub mod sink;

pub use event::{BridgeEvent, ClientCommand};
pub use server::{start_bridge_server, BridgeServerHandle, ProgramRegistry};
pub use sink::{BroadcastEventSink, EventSink};
