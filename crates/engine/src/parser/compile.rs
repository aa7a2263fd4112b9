//! Top-level compile orchestration: composes every registered parser's
//! schema, analyzes the root document against it, and recursively folds
//! each block's transforms into the compiled block tree.

use super::shorthands::{self, Definitions};
use super::{execute_transforms, CompileContext, Parser, MAX_RECURSION_DEPTH};
use crate::block::Block;
use crate::expr::{Binding, EvalEnvFactory, EvalStack};
use crate::reader::RawValue;
use crate::typecheck::{self, AttrValue};
use labflow_common::{
    Analysis, AttributeKey, AttributeSchema, Diagnostic, DocumentRange, Located, NodeTree, Range, SemanticError, Type, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The fixed set of parsers making up this crate's protocol language.
/// Namespace-disjoint by construction; see each module for its namespace.
pub fn default_parsers() -> Vec<Arc<dyn Parser>> {
    vec![
        Arc::new(super::sequence::SequenceParser),
        Arc::new(super::condition::ConditionParser),
        Arc::new(super::timer::TimerParser),
        Arc::new(super::record::RecordParser),
    ]
}

/// One compiled protocol: its declared name and root block.
#[derive(Debug, Clone)]
pub struct CompiledProtocol {
    /// The protocol's `name` attribute.
    pub name: String,
    /// The compiled root block.
    pub root: Block,
}

/// Compile `root` (the whole document's top-level value) against `parsers`,
/// with no concrete node tree to validate watched paths against.
pub fn compile(root: &Located<RawValue>, parsers: &[Arc<dyn Parser>], document_id: &str) -> (Analysis, Option<CompiledProtocol>) {
    compile_with_node_tree(root, parsers, document_id, None)
}

/// Compile `root` against `parsers`, validating any node path a namespace
/// like `record` watches against `node_tree` when one is supplied. Passing
/// `None` skips that validation entirely (editor-time analysis of a
/// document not yet bound to a concrete tree).
pub fn compile_with_node_tree(
    root: &Located<RawValue>,
    parsers: &[Arc<dyn Parser>],
    document_id: &str,
    node_tree: Option<Arc<dyn NodeTree>>,
) -> (Analysis, Option<CompiledProtocol>) {
    let mut analysis = Analysis::empty();

    // Pass 1: schema composition.
    let mut root_schema = AttributeSchema::new();
    let mut segment_schema = AttributeSchema::new();
    root_schema.add(
        "protocol",
        BTreeMap::from([
            ("name".to_string(), AttributeKey::required("name", Type::Str)),
            ("steps".to_string(), AttributeKey::optional("steps", Type::Any)),
            ("shorthands".to_string(), AttributeKey::optional("shorthands", Type::Any)),
        ]),
    );
    for parser in parsers {
        let root_attrs = parser.root_attributes();
        if !root_attrs.is_empty() {
            root_schema.add(parser.namespace(), root_attrs);
        }
        let segment_attrs = parser.segment_attributes();
        if !segment_attrs.is_empty() {
            segment_schema.add(parser.namespace(), segment_attrs);
        }
    }

    // Pass 2: protocol entry.
    let (root_analysis, root_attrs) = typecheck::analyze_schema(root, &root_schema, document_id);
    analysis.merge_in_place(root_analysis);

    let name = match root_attrs.get("name") {
        Some(AttrValue::Value(Value::String(s))) => s.clone(),
        _ => String::new(),
    };

    for parser in parsers {
        analysis.merge_in_place(parser.enter_protocol(&root_attrs));
    }

    let definitions = shorthands::collect_definitions(root);

    let Some(steps) = root.get("steps") else {
        analysis.merge_in_place(Analysis::from_diagnostic(Diagnostic::error(
            "protocol has no steps",
            vec![doc_range(document_id, root.range())],
        )));
        return (analysis, None);
    };

    let mut factory = EvalEnvFactory::new();
    let global_env = factory.fresh();
    let stack = EvalStack::new().pushed(global_env, Binding::Deferred);

    let mut ctx = CompileContext {
        parsers,
        segment_schema: &segment_schema,
        document_id,
        depth: 0,
        factory: &mut factory,
        stack,
        ambient_state: labflow_common::BlockState::empty(),
        node_tree,
    };

    let (block_analysis, root_block) = compile_block_with_definitions(steps, &mut ctx, &definitions);
    analysis.merge_in_place(block_analysis);

    (analysis, root_block.map(|root| CompiledProtocol { name, root }))
}

/// Compile one block value: expand shorthands, analyze it against the
/// composite segment schema, fold every applicable parser's contribution
/// into a transform chain, and execute that chain. Namespaces recursing
/// into nested blocks (`sequence`, `if`, `record`) call this directly with
/// no shorthand table, since shorthands only ever apply once, at each
/// block's own top level, and recursing through [`compile`]'s entry point
/// would re-run protocol-entry logic that only makes sense once per
/// document.
pub fn compile_block(raw: &Located<RawValue>, ctx: &mut CompileContext) -> (Analysis, Option<Block>) {
    compile_block_with_definitions(raw, ctx, &Definitions::new())
}

fn compile_block_with_definitions(raw: &Located<RawValue>, ctx: &mut CompileContext, definitions: &Definitions) -> (Analysis, Option<Block>) {
    let origin = doc_range(ctx.document_id, raw.range());

    if ctx.depth > MAX_RECURSION_DEPTH {
        return (
            Analysis::from_diagnostic(Diagnostic::error(
                SemanticError::RecursionLimitExceeded(origin.clone()).to_string(),
                vec![origin],
            )),
            None,
        );
    }

    let mut analysis = Analysis::empty();

    let (expand_analysis, expanded) = if definitions.is_empty() {
        (Analysis::empty(), raw.clone())
    } else {
        shorthands::expand(raw, definitions, ctx.document_id)
    };
    analysis.merge_in_place(expand_analysis);

    let (schema_analysis, attrs) = typecheck::analyze_schema(&expanded, ctx.segment_schema, ctx.document_id);
    analysis.merge_in_place(schema_analysis);

    let mut transforms: Vec<(i32, Box<dyn super::Transform>)> = Vec::new();
    let mut state = ctx.ambient_state.clone();
    let outer_ambient = ctx.ambient_state.clone();

    ctx.depth += 1;
    for parser in ctx.parsers.to_vec() {
        ctx.ambient_state = state.clone();
        let (unit_analysis, unit) = parser.parse_block(&attrs, &expanded, ctx);
        analysis.merge_in_place(unit_analysis);
        if let Some(unit) = unit {
            if let Some(unit_state) = unit.state {
                state = state.with(parser.namespace(), unit_state);
            }
            for transform in unit.transforms {
                transforms.push((parser.priority(), transform));
            }
        }
    }
    ctx.depth -= 1;
    ctx.ambient_state = outer_ambient;

    if analysis.has_errors() {
        return (analysis, None);
    }

    transforms.sort_by_key(|(priority, _)| *priority);
    let ordered: Vec<Box<dyn super::Transform>> = transforms.into_iter().map(|(_, t)| t).collect();

    let (exec_analysis, block) = execute_transforms(&state, &ordered, origin);
    analysis.merge_in_place(exec_analysis);
    (analysis, block)
}

fn doc_range(document_id: &str, range: Range) -> DocumentRange {
    DocumentRange { document_id: document_id.to_string(), range }
}
