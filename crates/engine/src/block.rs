//! The compiled block tree: the recursive structure transforms fold into,
//! and the position ("point") type used to resume a paused program.

use crate::expr::{ExprKind, Expression};
use labflow_common::{BlockState, ImportedUnitState, Quantity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// A node of the compiled protocol tree. Every variant knows how to export
/// itself to a JSON-shaped value and how a runtime position within it is
/// represented.
#[derive(Debug, Clone)]
pub enum Block {
    /// An ordered list of child blocks, stepped one at a time.
    Sequence(SequenceBlock),
    /// A child block gated by a predicate evaluated at program start.
    Condition(ConditionBlock),
    /// A leaf process.
    Segment(SegmentBlock),
    /// A child block wrapped with accumulated per-namespace reservation
    /// state.
    StateWrapped(StateWrappedBlock),
}

/// [`Block::Sequence`]'s payload.
#[derive(Debug, Clone)]
pub struct SequenceBlock {
    /// Children, run in order; each child's terminal event precedes the
    /// next child's start.
    pub children: Vec<Block>,
}

/// [`Block::Condition`]'s payload.
#[derive(Debug, Clone)]
pub struct ConditionBlock {
    /// Predicate evaluated once, at program start.
    pub predicate: Expression,
    /// The block run if the predicate evaluates true.
    pub child: Box<Block>,
}

/// A leaf process: the concrete unit of work a segment performs. New
/// namespaces contributing leaf processes add a variant here.
#[derive(Debug, Clone)]
pub enum ProcessKind {
    /// `timer`'s `wait: <duration>` leaf: sleeps for a fixed quantity.
    Timer(TimerSpec),
}

/// `timer`'s process spec: either a literal duration known at compile
/// time, or an expression evaluated at program instantiation.
#[derive(Debug, Clone)]
pub enum TimerSpec {
    /// A duration already known at compile time.
    Literal(Quantity),
    /// A duration computed when the program starts.
    Expr(Expression),
}

/// [`Block::Segment`]'s payload.
#[derive(Debug, Clone)]
pub struct SegmentBlock {
    /// The process this segment runs.
    pub process: ProcessKind,
}

/// [`Block::StateWrapped`]'s payload.
#[derive(Debug, Clone)]
pub struct StateWrappedBlock {
    /// Accumulated per-namespace unit state for this block and its
    /// ancestors.
    pub state: BlockState,
    /// The wrapped child block.
    pub child: Box<Block>,
}

/// An error reconstructing a [`Block`] from a previously [`Block::export`]ed
/// value — either the shape doesn't match any variant, or a field within it
/// is malformed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("malformed block export at {path}: {message}")]
pub struct BlockImportError {
    /// Dotted path within the exported value where the problem was found.
    pub path: String,
    /// Description of the problem.
    pub message: String,
}

impl BlockImportError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into() }
    }
}

impl Block {
    /// JSON-shaped external representation of this block and its subtree.
    /// The root invariant this feeds into: `export(import_value(export(b)))
    /// == export(b)`.
    pub fn export(&self) -> serde_json::Value {
        match self {
            Block::Sequence(seq) => serde_json::json!({
                "namespace": "sequence",
                "children": seq.children.iter().map(Block::export).collect::<Vec<_>>(),
            }),
            Block::Condition(cond) => serde_json::json!({
                "namespace": "if",
                "predicate": export_expr(&cond.predicate),
                "child": cond.child.export(),
            }),
            Block::Segment(seg) => serde_json::json!({
                "namespace": "segment",
                "process": seg.process.export(),
            }),
            Block::StateWrapped(wrapped) => serde_json::json!({
                "namespace": "state",
                "state": export_block_state(&wrapped.state),
                "child": wrapped.child.export(),
            }),
        }
    }

    /// Reconstruct a [`Block`] from a value previously produced by
    /// [`Block::export`]. Reservation state is carried back as an opaque
    /// [`ImportedUnitState`] per namespace (its own `export` just replays
    /// the stored JSON), since a generic external representation has no
    /// way to recover a namespace's original concrete `UnitState` type —
    /// only the re-export equality invariant is promised, not identity.
    pub fn import_value(value: &serde_json::Value) -> Result<Block, BlockImportError> {
        import_block(value, "$")
    }
}

fn export_expr(expr: &Expression) -> serde_json::Value {
    serde_json::json!({ "kind": expr_kind_name(expr.kind), "raw": expr.raw })
}

fn expr_kind_name(kind: ExprKind) -> &'static str {
    match kind {
        ExprKind::Field => "field",
        ExprKind::Static => "static",
        ExprKind::Dynamic => "dynamic",
        ExprKind::Binding => "binding",
    }
}

fn import_expr(value: &serde_json::Value, path: &str) -> Result<Expression, BlockImportError> {
    let kind = match value.get("kind").and_then(|v| v.as_str()) {
        Some("field") => ExprKind::Field,
        Some("static") => ExprKind::Static,
        Some("dynamic") => ExprKind::Dynamic,
        Some("binding") => ExprKind::Binding,
        _ => return Err(BlockImportError::new(format!("{path}.kind"), "expected a valid expression kind")),
    };
    let raw = value
        .get("raw")
        .and_then(|v| v.as_str())
        .ok_or_else(|| BlockImportError::new(format!("{path}.raw"), "expected a string"))?;
    Ok(Expression::from_raw(kind, raw))
}

impl ProcessKind {
    fn export(&self) -> serde_json::Value {
        match self {
            ProcessKind::Timer(TimerSpec::Literal(q)) => {
                serde_json::json!({"namespace": "timer", "duration": q.base_magnitude()})
            }
            ProcessKind::Timer(TimerSpec::Expr(expr)) => {
                serde_json::json!({"namespace": "timer", "duration_expr": export_expr(expr)})
            }
        }
    }

    fn import(value: &serde_json::Value, path: &str) -> Result<ProcessKind, BlockImportError> {
        match value.get("namespace").and_then(|v| v.as_str()) {
            Some("timer") => {
                if let Some(duration) = value.get("duration").and_then(|v| v.as_f64()) {
                    let quantity = Quantity::new(duration, "sec")
                        .map_err(|e| BlockImportError::new(format!("{path}.duration"), e.to_string()))?;
                    Ok(ProcessKind::Timer(TimerSpec::Literal(quantity)))
                } else if let Some(expr) = value.get("duration_expr") {
                    Ok(ProcessKind::Timer(TimerSpec::Expr(import_expr(expr, &format!("{path}.duration_expr"))?)))
                } else {
                    Err(BlockImportError::new(path, "timer process missing duration/duration_expr"))
                }
            }
            _ => Err(BlockImportError::new(format!("{path}.namespace"), "unrecognized process namespace")),
        }
    }
}

fn export_block_state(state: &BlockState) -> serde_json::Value {
    serde_json::Value::Object(state.iter().map(|(ns, unit)| (ns.to_string(), unit.export())).collect())
}

fn import_block_state(value: &serde_json::Value, path: &str) -> Result<BlockState, BlockImportError> {
    let object = value
        .as_object()
        .ok_or_else(|| BlockImportError::new(path, "expected an object"))?;
    let mut state = BlockState::empty();
    for (namespace, exported) in object {
        state = state.with(namespace.clone(), Arc::new(ImportedUnitState(exported.clone())));
    }
    Ok(state)
}

fn import_block(value: &serde_json::Value, path: &str) -> Result<Block, BlockImportError> {
    let namespace = value
        .get("namespace")
        .and_then(|v| v.as_str())
        .ok_or_else(|| BlockImportError::new(format!("{path}.namespace"), "expected a string tag"))?;

    match namespace {
        "sequence" => {
            let children = value
                .get("children")
                .and_then(|v| v.as_array())
                .ok_or_else(|| BlockImportError::new(format!("{path}.children"), "expected an array"))?;
            let children = children
                .iter()
                .enumerate()
                .map(|(i, child)| import_block(child, &format!("{path}.children[{i}]")))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Block::Sequence(SequenceBlock { children }))
        }
        "if" => {
            let predicate = value
                .get("predicate")
                .ok_or_else(|| BlockImportError::new(format!("{path}.predicate"), "missing predicate"))?;
            let predicate = import_expr(predicate, &format!("{path}.predicate"))?;
            let child = value
                .get("child")
                .ok_or_else(|| BlockImportError::new(format!("{path}.child"), "missing child"))?;
            let child = import_block(child, &format!("{path}.child"))?;
            Ok(Block::Condition(ConditionBlock { predicate, child: Box::new(child) }))
        }
        "segment" => {
            let process = value
                .get("process")
                .ok_or_else(|| BlockImportError::new(format!("{path}.process"), "missing process"))?;
            let process = ProcessKind::import(process, &format!("{path}.process"))?;
            Ok(Block::Segment(SegmentBlock { process }))
        }
        "state" => {
            let state = value
                .get("state")
                .ok_or_else(|| BlockImportError::new(format!("{path}.state"), "missing state"))?;
            let state = import_block_state(state, &format!("{path}.state"))?;
            let child = value
                .get("child")
                .ok_or_else(|| BlockImportError::new(format!("{path}.child"), "missing child"))?;
            let child = import_block(child, &format!("{path}.child"))?;
            Ok(Block::StateWrapped(StateWrappedBlock { state, child: Box::new(child) }))
        }
        other => Err(BlockImportError::new(format!("{path}.namespace"), format!("unrecognized block namespace {other:?}"))),
    }
}

/// A resumable position within a block tree, imported from a previously
/// exported location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Point {
    /// Position within a [`Block::Sequence`]: the active child's index and
    /// its own position.
    Sequence { index: usize, child: Box<Point> },
    /// Position within a [`Block::Condition`]'s child.
    Condition { child: Box<Point> },
    /// A segment has no internal position.
    Segment,
    /// Position within a [`Block::StateWrapped`]'s child.
    StateWrapped { child: Box<Point> },
}

impl Point {
    /// The starting position for a fresh run of `block`.
    pub fn start(block: &Block) -> Point {
        match block {
            Block::Sequence(seq) => {
                let first = seq.children.first().map(Point::start).unwrap_or(Point::Segment);
                Point::Sequence { index: 0, child: Box::new(first) }
            }
            Block::Condition(cond) => Point::Condition { child: Box::new(Point::start(&cond.child)) },
            Block::Segment(_) => Point::Segment,
            Block::StateWrapped(wrapped) => Point::StateWrapped { child: Box::new(Point::start(&wrapped.child)) },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_a_segment_block() {
        let block = Block::Segment(SegmentBlock { process: ProcessKind::Timer(TimerSpec::Literal(Quantity::new(30.0, "sec").unwrap())) });
        let exported = block.export();
        assert_eq!(exported["namespace"], "segment");
    }

    #[test]
    fn import_value_of_export_reexports_identically_for_a_segment() {
        let block = Block::Segment(SegmentBlock { process: ProcessKind::Timer(TimerSpec::Literal(Quantity::new(30.0, "sec").unwrap())) });
        let exported = block.export();
        let imported = Block::import_value(&exported).unwrap();
        assert_eq!(imported.export(), exported);
    }

    #[test]
    fn import_value_round_trips_a_nested_sequence_condition_and_state_tree() {
        let leaf = Block::Segment(SegmentBlock { process: ProcessKind::Timer(TimerSpec::Literal(Quantity::new(5.0, "sec").unwrap())) });
        let condition = Block::Condition(ConditionBlock {
            predicate: Expression::from_raw(ExprKind::Static, " 1 + 1 == 2 "),
            child: Box::new(leaf.clone()),
        });
        let wrapped = Block::StateWrapped(StateWrappedBlock {
            state: BlockState::empty().with("record", Arc::new(ImportedUnitState(serde_json::json!({"path": ["a", "b"]})))),
            child: Box::new(leaf),
        });
        let block = Block::Sequence(SequenceBlock { children: vec![condition, wrapped] });

        let exported = block.export();
        let imported = Block::import_value(&exported).unwrap();
        assert_eq!(imported.export(), exported);
    }

    #[test]
    fn import_value_rejects_an_unrecognized_namespace_tag() {
        let err = Block::import_value(&serde_json::json!({"namespace": "bogus"})).unwrap_err();
        assert!(err.message.contains("unrecognized"));
    }

    #[test]
    fn start_point_for_a_sequence_points_at_its_first_child() {
        let block = Block::Sequence(SequenceBlock {
            children: vec![
                Block::Segment(SegmentBlock { process: ProcessKind::Timer(TimerSpec::Literal(Quantity::new(1.0, "sec").unwrap())) }),
                Block::Segment(SegmentBlock { process: ProcessKind::Timer(TimerSpec::Literal(Quantity::new(2.0, "sec").unwrap())) }),
            ],
        });
        let Point::Sequence { index, .. } = Point::start(&block) else { panic!("expected a sequence point") };
        assert_eq!(index, 0);
    }
}
