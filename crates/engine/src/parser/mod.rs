//! The parser pipeline: registered namespace [`Parser`]s contribute
//! attribute schemas and fold analyzed attributes into [`Transform`] chains,
//! which in turn fold into the compiled [`crate::block::Block`] tree.

pub mod compile;
pub mod condition;
pub mod record;
pub mod sequence;
pub mod shorthands;
pub mod timer;

use crate::block::Block;
use crate::expr::{EvalEnv, EvalEnvFactory, EvalStack};
use crate::reader::RawValue;
use crate::typecheck::AttrValue;
use labflow_common::{
    Analysis, AttributeKey, AttributeSchema, BlockState, Diagnostic, DocumentRange, Located, NodeTree, SemanticError, UnitState,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything a parser needs to recurse into a nested block: the full
/// registered parser set and composite segment schema (so a namespace like
/// `sequence` can compile its children the same way the core compiles the
/// root), the owning document's id, the current adoption stack and
/// environment factory, and the current recursion depth.
pub struct CompileContext<'a> {
    /// Every registered parser, in the order schemas were composed from
    /// them.
    pub parsers: &'a [Arc<dyn Parser>],
    /// The composite segment schema every block is analyzed against.
    pub segment_schema: &'a AttributeSchema,
    /// The id of the document being compiled, for diagnostic ranges.
    pub document_id: &'a str,
    /// Nesting depth of the block currently being compiled, checked
    /// against [`MAX_RECURSION_DEPTH`] before recursing further.
    pub depth: usize,
    /// Allocates fresh [`EvalEnv`] tokens for environments introduced while
    /// compiling.
    pub factory: &'a mut EvalEnvFactory,
    /// The adoption stack visible to expressions in the block currently
    /// being compiled.
    pub stack: EvalStack,
    /// Reservation state accumulated by this block's ancestors, visible to
    /// a namespace (like `sequence` or `if`) that recurses into a child
    /// block before this block's own state is finalized.
    pub ambient_state: BlockState,
    /// The node tree this protocol will run against, if known at compile
    /// time. `record` uses this to validate watched paths exist, reporting
    /// a missing-node diagnostic instead of waiting to fail at runtime.
    /// `None` when compiling without a concrete tree (e.g. editor-time
    /// analysis of a document not yet bound to hardware).
    pub node_tree: Option<Arc<dyn NodeTree>>,
}

/// A namespace's analyzed attributes, flattened to the keys it registered.
pub type Attrs = BTreeMap<String, AttrValue>;

/// What one parser contributes to a block being assembled: the lexical
/// environments it introduces, the reservation state it claims, and the
/// transforms that get folded into the block's transform chain.
#[derive(Default)]
pub struct BlockUnitData {
    /// Environments this namespace introduces into the adoption stack for
    /// this block's descendants.
    pub envs: Vec<EvalEnv>,
    /// This namespace's contribution to the block's accumulated state.
    pub state: Option<Arc<dyn UnitState>>,
    /// Transforms this namespace adds to the block's transform chain, in
    /// the order they should execute.
    pub transforms: Vec<Box<dyn Transform>>,
}

/// A registered namespace. Each parser owns a disjoint slice of the
/// attribute schema (its `root_attributes` compile-time keys and its
/// per-segment `segment_attributes`) and decides, from the analyzed
/// attributes of one block, what that namespace contributes to it.
pub trait Parser: Send + Sync {
    /// Short, stable namespace identifier (`"timer"`, `"sequence"`, ...).
    fn namespace(&self) -> &str;

    /// Folding order among sibling parsers contributing to the same block;
    /// lower runs first. Parsers that must see another's transform output
    /// (e.g. `state`, which wraps whatever the rest of the chain produces)
    /// use a higher priority.
    fn priority(&self) -> i32 {
        0
    }

    /// Attributes recognized once, at the protocol's root.
    fn root_attributes(&self) -> BTreeMap<String, AttributeKey> {
        BTreeMap::new()
    }

    /// Attributes recognized on every block segment.
    fn segment_attributes(&self) -> BTreeMap<String, AttributeKey> {
        BTreeMap::new()
    }

    /// Validate and act on this namespace's root-level attributes. Most
    /// parsers have none and accept the default no-op.
    fn enter_protocol(&self, _attrs: &Attrs) -> Analysis {
        Analysis::empty()
    }

    /// First pass over a block's attributes: a chance to register fresh
    /// lexical environments (e.g. a loop variable) before any expression in
    /// this block or its descendants is evaluated. Returning `None` means
    /// this namespace does not apply to this block at all.
    fn prepare_block(&self, attrs: &Attrs) -> (Analysis, Option<Vec<EvalEnv>>) {
        let _ = attrs;
        (Analysis::empty(), Some(Vec::new()))
    }

    /// Second pass: contribute this namespace's state and transforms for
    /// one block, now that every namespace's environments are registered.
    /// `raw` is the block's own un-flattened value, for namespaces (like
    /// `sequence`) whose attributes are themselves nested blocks rather
    /// than scalars the type analyzer already resolved.
    fn parse_block(&self, attrs: &Attrs, raw: &Located<RawValue>, ctx: &mut CompileContext) -> (Analysis, Option<BlockUnitData>);
}

/// A single link in a block's transform chain. Transforms execute in
/// priority order; each one either produces the block directly (a leaf, the
/// common case for the last transform in a chain) or builds its child by
/// recursing into the remaining tail and wraps the result.
pub trait Transform: Send + Sync {
    /// Build this transform's contribution to the block tree. `tail` is
    /// every transform still to run after this one; implementations that
    /// wrap a child call [`execute_transforms`] on `tail` themselves.
    fn execute(&self, state: &BlockState, tail: &[Box<dyn Transform>], origin: DocumentRange) -> (Analysis, Option<Block>);
}

/// Depth limit matching the source's own recursion guard, preventing a
/// pathological or self-referential shorthand expansion from overflowing
/// the stack.
pub const MAX_RECURSION_DEPTH: usize = 50;

/// Run a block's transform chain: the head transform executes, handed the
/// rest of the chain as its tail. An empty chain means no namespace
/// produced a process for this block, which is an error — every block must
/// bottom out in exactly one leaf process.
pub fn execute_transforms(state: &BlockState, transforms: &[Box<dyn Transform>], origin: DocumentRange) -> (Analysis, Option<Block>) {
    match transforms.split_first() {
        None => (
            Analysis::from_diagnostic(Diagnostic::error(
                SemanticError::MissingProcess(origin.clone()).to_string(),
                vec![origin],
            )),
            None,
        ),
        Some((head, tail)) => head.execute(state, tail, origin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labflow_common::Range;

    struct LeafTransform;
    impl Transform for LeafTransform {
        fn execute(&self, _state: &BlockState, _tail: &[Box<dyn Transform>], _origin: DocumentRange) -> (Analysis, Option<Block>) {
            (Analysis::empty(), Some(Block::Segment(crate::block::SegmentBlock {
                process: crate::block::ProcessKind::Timer(crate::block::TimerSpec::Literal(
                    labflow_common::Quantity::new(1.0, "sec").unwrap(),
                )),
            })))
        }
    }

    fn origin() -> DocumentRange {
        DocumentRange { document_id: "doc".into(), range: Range::new(0, 1) }
    }

    #[test]
    fn empty_chain_is_a_missing_process_error() {
        let (analysis, block) = execute_transforms(&BlockState::empty(), &[], origin());
        assert!(analysis.has_errors());
        assert!(block.is_none());
    }

    #[test]
    fn a_single_leaf_transform_produces_a_block() {
        let transforms: Vec<Box<dyn Transform>> = vec![Box::new(LeafTransform)];
        let (analysis, block) = execute_transforms(&BlockState::empty(), &transforms, origin());
        assert!(!analysis.has_errors());
        assert!(matches!(block, Some(Block::Segment(_))));
    }
}
