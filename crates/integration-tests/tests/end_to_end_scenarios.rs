//! End-to-end compilation and execution scenarios covering the full
//! compile-then-run path: sequences, conditions, pause/resume, and
//! `record` node-path validation.

use futures::StreamExt;
use labflow_common::NodePath;
use labflow_engine::block::Block;
use labflow_integration_tests::{compile, compile_against, empty_node_tree, program_for, run_to_completion};

#[test]
fn a_single_wait_segment_compiles_to_a_root_sequence() {
    let result = compile("name: Test\nsteps:\n  actions:\n    - wait: 30 sec\n");
    assert!(result.valid(), "{:?}", result.analysis.diagnostics);

    let protocol = result.protocol.unwrap();
    assert_eq!(protocol.name, "Test");
    let Block::Sequence(seq) = &protocol.root else { panic!("expected a root sequence block") };
    assert_eq!(seq.children.len(), 1);
    let Block::Segment(segment) = &seq.children[0] else { panic!("expected a segment child") };
    match &segment.process {
        labflow_engine::block::ProcessKind::Timer(labflow_engine::block::TimerSpec::Literal(quantity)) => {
            assert_eq!(quantity.base_magnitude(), 30.0);
        }
        other => panic!("expected a literal timer spec, got {other:?}"),
    }
}

#[test]
fn empty_steps_fails_to_compile_with_a_null_protocol() {
    let result = compile("name: Test\nsteps:\n");
    assert!(!result.valid());
    assert!(result.protocol.is_none());
    assert!(result.analysis.has_errors());
}

#[test]
fn a_shorthand_compiles_to_the_same_block_as_its_expansion() {
    let shorthand = compile(
        "name: Test\nshorthands:\n  wait_a_bit:\n    wait: 30 sec\nsteps:\n  actions:\n    - wait_a_bit:\n",
    );
    let direct = compile("name: Test\nsteps:\n  actions:\n    - wait: 30 sec\n");

    assert!(shorthand.valid(), "{:?}", shorthand.analysis.diagnostics);
    assert!(direct.valid(), "{:?}", direct.analysis.diagnostics);
    assert_eq!(shorthand.protocol.unwrap().root.export(), direct.protocol.unwrap().root.export());
}

#[tokio::test]
async fn a_false_condition_terminates_with_exactly_one_terminal_event() {
    let result = compile("name: Test\nsteps:\n  if: ${{ 1 + 1 == 3 }}\n  then:\n    wait: 1 sec\n");
    assert!(result.valid(), "{:?}", result.analysis.diagnostics);
    let protocol = result.protocol.unwrap();

    let (program, master) = program_for(&protocol.root, empty_node_tree());
    let events = run_to_completion(program, &master).await;

    let terminal_count = events.iter().filter(|e| e.terminated).count();
    assert_eq!(terminal_count, 1);
    assert!(events.last().unwrap().terminated);
}

#[tokio::test]
async fn a_true_condition_runs_its_wrapped_segment() {
    let result = compile("name: Test\nsteps:\n  if: ${{ 1 + 1 == 2 }}\n  then:\n    wait: 0.01 sec\n");
    assert!(result.valid(), "{:?}", result.analysis.diagnostics);
    let protocol = result.protocol.unwrap();

    let (program, master) = program_for(&protocol.root, empty_node_tree());
    let events = run_to_completion(program, &master).await;

    assert!(events.iter().any(|e| e.location["taken"] == true));
    assert_eq!(events.iter().filter(|e| e.terminated).count(), 1);
}

#[tokio::test]
async fn pausing_mid_sequence_emits_stopped_once_then_resumes_without_rerunning_the_first_sibling() {
    let result = compile("name: Test\nsteps:\n  actions:\n    - wait: 0.01 sec\n    - wait: 1 sec\n");
    assert!(result.valid(), "{:?}", result.analysis.diagnostics);
    let protocol = result.protocol.unwrap();

    let (program, master) = program_for(&protocol.root, empty_node_tree());
    let symbol = master.claims().root_symbol();
    let mut events = program.clone().run(None, labflow_engine::expr::EvalStack::new(), symbol);

    // Let the first sibling finish and the second sibling start.
    let first = events.next().await.unwrap();
    assert_eq!(first.location["index"], 0);

    while events.next().await.unwrap().location["index"] != 1 {}

    program.pause();
    program.resume();

    let mut stopped_count = 0;
    let mut saw_index_zero_again = false;
    while let Some(event) = events.next().await {
        if event.stopped {
            stopped_count += 1;
        }
        if event.location["index"] == 0 {
            saw_index_zero_again = true;
        }
        if event.terminated {
            break;
        }
    }

    assert_eq!(stopped_count, 1, "expected exactly one stopped event across the pause/resume round trip");
    assert!(!saw_index_zero_again, "must not re-run the first sibling");
    assert!(events.next().await.is_none());
}

#[test]
fn a_record_block_watching_an_unregistered_path_fails_to_compile() {
    let source = "name: Test\nsteps:\n  record: sensors.temperature\n  body:\n    wait: 1 sec\n";
    let result = compile_against(source, Some(empty_node_tree()));
    assert!(!result.valid());
    assert!(result.protocol.is_none());
}

#[test]
fn a_record_block_watching_a_registered_path_compiles() {
    let path: NodePath = vec!["sensors".into(), "temperature".into()];
    let concrete = std::sync::Arc::new(labflow_common::InMemoryNodeTree::new());
    concrete.register_polled(path, None);
    let tree: std::sync::Arc<dyn labflow_common::NodeTree> = concrete;

    let source = "name: Test\nsteps:\n  record: sensors.temperature\n  body:\n    wait: 1 sec\n";
    let result = compile_against(source, Some(tree));
    assert!(result.valid(), "{:?}", result.analysis.diagnostics);
    assert!(result.protocol.is_some());
}
