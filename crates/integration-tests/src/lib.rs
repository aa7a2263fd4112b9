//! Shared helpers for the crate-level integration tests: compiling a
//! protocol source string to a [`CompilationResult`], driving the result's
//! program tree to completion, and a test logging initializer so every test
//! suite can log without double-installing a subscriber.

use labflow_common::{Document, InMemoryNodeTree, NodeTree, ProgramExecEvent};
use labflow_engine::block::Block;
use labflow_engine::draft::{compile_draft_with_node_tree, CompilationResult, Draft};
use labflow_engine::expr::EvalStack;
use labflow_engine::parser::compile::default_parsers;
use labflow_engine::program::{make_program, DefaultMaster, Master, Program};
use std::sync::Arc;

/// Install a console-only `tracing` subscriber exactly once per test
/// process.
pub fn ensure_test_logging() {
    labflow_common::logging::ensure_test_logging(None);
}

/// Compile `source` with no concrete node tree, matching editor-time
/// analysis (`record` path validation is skipped).
pub fn compile(source: &str) -> CompilationResult {
    compile_against(source, None)
}

/// Compile `source` against `tree`, so namespaces like `record` validate
/// watched paths as they would at CLI-run time.
pub fn compile_against(source: &str, tree: Option<Arc<dyn NodeTree>>) -> CompilationResult {
    let document = Document::new("test-entry", source.to_string());
    let draft = Draft::single("test-draft", document);
    compile_draft_with_node_tree(draft, &default_parsers(), tree)
}

/// A fresh in-memory node tree with nothing registered, for compiling
/// protocols with no `record` blocks.
pub fn empty_node_tree() -> Arc<dyn NodeTree> {
    Arc::new(InMemoryNodeTree::new())
}

/// Build the companion program for a compiled root block, driven by a
/// fresh [`DefaultMaster`] over `node_tree`.
pub fn program_for(root: &Block, node_tree: Arc<dyn NodeTree>) -> (Arc<dyn Program>, Arc<dyn Master>) {
    let master: Arc<dyn Master> = Arc::new(DefaultMaster::new(node_tree));
    let program = make_program(Arc::new(root.clone()), master.clone(), None);
    (program, master)
}

/// Run `program` to completion (no pause/halt in between) and collect
/// every emitted event.
pub async fn run_to_completion(program: Arc<dyn Program>, master: &Arc<dyn Master>) -> Vec<ProgramExecEvent> {
    use futures::StreamExt;

    let symbol = master.claims().root_symbol();
    let mut events = program.run(None, EvalStack::new(), symbol);
    let mut collected = Vec::new();
    while let Some(event) = events.next().await {
        let terminated = event.terminated;
        collected.push(event);
        if terminated {
            break;
        }
    }
    collected
}
