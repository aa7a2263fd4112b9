//! `labflow run <path>`: compile a protocol document, then drive its
//! compiled program tree to completion, forwarding every
//! `ProgramExecEvent` to a pluggable sink — stdout always, and a
//! websocket bridge if `--serve` was given.

use crate::sink::StdoutEventSink;
use eyre::{eyre, Context, Result};
use futures::StreamExt;
use labflow_bridge::{start_bridge_server, BridgeEvent, BroadcastEventSink, EventSink, ProgramRegistry};
use labflow_common::{Document, InMemoryNodeTree, NodeTree};
use labflow_engine::diagnostics::format_diagnostics;
use labflow_engine::draft::{compile_draft_with_node_tree, Draft};
use labflow_engine::expr::EvalStack;
use labflow_engine::parser::compile::default_parsers;
use labflow_engine::program::{make_program, DefaultMaster, Master, Program};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

const PROGRAM_ID: &str = "root";

struct SingleProgramRegistry {
    program: Mutex<Option<Arc<dyn Program>>>,
}

impl ProgramRegistry for SingleProgramRegistry {
    fn get(&self, program_id: &str) -> Option<Arc<dyn Program>> {
        if program_id == PROGRAM_ID {
            self.program.lock().clone()
        } else {
            None
        }
    }
}

/// Compile `path` and run its program tree to completion. Returns an error
/// if compilation failed; diagnostics are printed to stderr in that case.
pub async fn run(path: &Path, serve: Option<SocketAddr>) -> Result<()> {
    let contents = std::fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?;
    let document = Document::new(path.display().to_string(), contents);
    let draft = Draft::single(path.display().to_string(), document.clone());

    let node_tree = Arc::new(InMemoryNodeTree::new());
    let node_tree_dyn: Arc<dyn NodeTree> = node_tree.clone();
    let result = compile_draft_with_node_tree(draft, &default_parsers(), Some(node_tree_dyn));
    if !result.valid() {
        let mut documents = std::collections::BTreeMap::new();
        documents.insert(document.id.clone(), document);
        eprint!("{}", format_diagnostics(&result.analysis.diagnostics, &documents));
        return Err(eyre!("protocol document failed to compile"));
    }

    let protocol = result.protocol.expect("valid compilation result always carries a protocol");
    tracing::info!(name = %protocol.name, "compiled protocol, starting run");

    let master: Arc<dyn Master> = Arc::new(DefaultMaster::new(node_tree));
    let registry = Arc::new(SingleProgramRegistry { program: Mutex::new(None) });

    let mut bridge_handle = None;
    let sinks: Vec<Arc<dyn EventSink>> = if let Some(addr) = serve {
        let broadcast = Arc::new(BroadcastEventSink::default());
        let handle = start_bridge_server(addr, broadcast.clone(), registry.clone()).await?;
        tracing::info!(addr = %handle.addr(), "bridge server listening");
        bridge_handle = Some(handle);
        vec![Arc::new(StdoutEventSink), broadcast]
    } else {
        vec![Arc::new(StdoutEventSink)]
    };

    let root_block = Arc::new(protocol.root.clone());
    let program = make_program(root_block, master.clone(), None);
    *registry.program.lock() = Some(program.clone());

    let claim_symbol = master.claims().root_symbol();
    let mut events = program.run(None, EvalStack::new(), claim_symbol);

    while let Some(event) = events.next().await {
        let terminated = event.terminated;
        let bridge_event = BridgeEvent::program(PROGRAM_ID, event);
        for sink in &sinks {
            sink.publish(bridge_event.clone());
        }
        if terminated {
            break;
        }
    }

    if let Some(handle) = bridge_handle {
        handle.shutdown();
    }

    tracing::info!("run complete");
    Ok(())
}
