//! `record`: the sole concrete state namespace. Watches one or more node
//! paths while a wrapped child block runs, accumulating rows that the
//! runtime flushes to an output sink on `close`.

use super::{compile::compile_block, Attrs, BlockUnitData, CompileContext, Parser, Transform};
use crate::block::{Block, StateWrappedBlock};
use crate::reader::RawValue;
use crate::typecheck::AttrValue;
use labflow_common::{Analysis, AttributeKey, BlockState, Diagnostic, DocumentRange, Located, RuntimeError, Type, UnitState, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// `record`'s contribution to [`BlockState`]: the node path it watches.
/// Carried alongside the compiled block so the runtime program can
/// instantiate the matching state instance without re-parsing attributes.
#[derive(Debug, Clone)]
pub struct RecordUnitState {
    pub path: Vec<String>,
    /// Where `record: <path>` was declared, so a runtime error resolving
    /// the node (e.g. a missing path) can still point back to source.
    pub origin: DocumentRange,
}

impl UnitState for RecordUnitState {
    fn export(&self) -> serde_json::Value {
        serde_json::json!({ "path": self.path })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Recognizes a `record: <node path>` block with a nested `body` block to
/// run while that path is watched, and contributes the state wrapping
/// around the compiled body.
pub struct RecordParser;

impl Parser for RecordParser {
    fn namespace(&self) -> &str {
        "record"
    }

    fn segment_attributes(&self) -> BTreeMap<String, AttributeKey> {
        BTreeMap::from([
            (
                "record".to_string(),
                AttributeKey::optional("record", Type::Str).with_description("dotted path of the node to watch"),
            ),
            (
                "body".to_string(),
                AttributeKey::optional("body", Type::Any).with_description("block run while the node is watched"),
            ),
        ])
    }

    fn parse_block(&self, attrs: &Attrs, raw: &Located<RawValue>, ctx: &mut CompileContext) -> (Analysis, Option<BlockUnitData>) {
        let Some(attr) = attrs.get("record") else {
            return (Analysis::empty(), None);
        };

        let path = match attr {
            AttrValue::Value(Value::String(s)) => s.split('.').map(str::to_string).collect::<Vec<_>>(),
            _ => return (Analysis::from_error("record expects a node path", vec![]), None),
        };

        let Some(body) = raw.get("body") else {
            return (
                Analysis::from_diagnostic(Diagnostic::error(
                    "record requires a body block",
                    vec![doc_range(ctx.document_id, raw.range())],
                )),
                None,
            );
        };

        if let Some(tree) = &ctx.node_tree {
            if tree.find(&path).is_none() {
                let origin = doc_range(ctx.document_id, raw.range());
                return (
                    Analysis::from_diagnostic(Diagnostic::error(RuntimeError::MissingNode(origin.clone()).to_string(), vec![origin])),
                    None,
                );
            }
        }

        let (analysis, child) = compile_block(body, ctx);
        let Some(child) = child else {
            return (analysis, None);
        };

        let origin = doc_range(ctx.document_id, raw.range());
        (
            analysis,
            Some(BlockUnitData {
                state: Some(Arc::new(RecordUnitState { path: path.clone(), origin })),
                transforms: vec![Box::new(RecordTransform { path, child })],
                ..Default::default()
            }),
        )
    }
}

struct RecordTransform {
    path: Vec<String>,
    child: Block,
}

impl Transform for RecordTransform {
    fn execute(&self, state: &BlockState, _tail: &[Box<dyn Transform>], origin: DocumentRange) -> (Analysis, Option<Block>) {
        let _ = &self.path;
        let _ = &origin;
        (
            Analysis::empty(),
            Some(Block::StateWrapped(StateWrappedBlock { state: state.clone(), child: Box::new(self.child.clone()) })),
        )
    }
}

fn doc_range(document_id: &str, range: labflow_common::Range) -> DocumentRange {
    DocumentRange { document_id: document_id.to_string(), range }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::EvalEnvFactory;
    use crate::parser::compile::default_parsers;
    use crate::reader::parse_document;
    use crate::typecheck::analyze_schema;
    use labflow_common::{AttributeSchema, Document};

    #[test]
    fn a_record_block_wraps_its_compiled_body() {
        let parsers = default_parsers();
        let mut segment_schema = AttributeSchema::new();
        for parser in &parsers {
            let attrs = parser.segment_attributes();
            if !attrs.is_empty() {
                segment_schema.add(parser.namespace(), attrs);
            }
        }

        let document = Document::new("doc", "record: sensors.temperature\nbody:\n  wait: 5 sec\n");
        let (_, root) = parse_document(&document);
        let (analysis, attrs) = analyze_schema(&root, &segment_schema, "doc");
        assert!(!analysis.has_errors());

        let mut factory = EvalEnvFactory::new();
        let mut ctx = CompileContext {
            parsers: &parsers,
            segment_schema: &segment_schema,
            document_id: "doc",
            depth: 0,
            factory: &mut factory,
            stack: crate::expr::EvalStack::new(),
            ambient_state: labflow_common::BlockState::empty(),
            node_tree: None,
        };

        let (unit_analysis, unit) = RecordParser.parse_block(&attrs, &root, &mut ctx);
        assert!(!unit_analysis.has_errors(), "{:?}", unit_analysis.diagnostics);
        let unit = unit.unwrap();
        assert!(unit.state.is_some());
        assert_eq!(unit.transforms.len(), 1);
    }
}
