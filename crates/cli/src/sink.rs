//! The default event sink for `labflow run`: every event is printed to
//! stdout as a JSON line, matching the pluggable-sink hook the run command exposes.

use labflow_bridge::{BridgeEvent, EventSink};

/// Prints every published event as a single line of JSON on stdout.
#[derive(Debug, Default)]
pub struct StdoutEventSink;

impl EventSink for StdoutEventSink {
    fn publish(&self, event: BridgeEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::warn!("failed to serialize event: {err}"),
        }
    }
}
