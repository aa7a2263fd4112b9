//! `timer`: the `wait: <duration>` leaf process.

use super::{Attrs, BlockUnitData, CompileContext, Parser, Transform};
use crate::block::{Block, ProcessKind, SegmentBlock, TimerSpec};
use crate::reader::RawValue;
use crate::typecheck::AttrValue;
use labflow_common::{Analysis, AttributeKey, BlockState, DocumentRange, Located, Type, Value};
use std::collections::BTreeMap;

/// Recognizes `wait: <quantity>` (or `wait: {{ expr }}`) segments and
/// contributes the leaf process that sleeps for that duration.
pub struct TimerParser;

impl Parser for TimerParser {
    fn namespace(&self) -> &str {
        "timer"
    }

    fn segment_attributes(&self) -> BTreeMap<String, AttributeKey> {
        BTreeMap::from([(
            "wait".to_string(),
            AttributeKey::optional("wait", Type::Quantity(vec!["ms".into(), "sec".into(), "min".into(), "hr".into()]))
                .with_description("how long this segment waits before completing"),
        )])
    }

    fn parse_block(&self, attrs: &Attrs, _raw: &Located<RawValue>, _ctx: &mut CompileContext) -> (Analysis, Option<BlockUnitData>) {
        let Some(attr) = attrs.get("wait") else {
            return (Analysis::empty(), None);
        };

        let spec = match attr {
            AttrValue::Value(Value::Quantity(q)) => TimerSpec::Literal(q.clone()),
            AttrValue::Expr(expr) => TimerSpec::Expr(expr.clone()),
            _ => return (Analysis::from_error("wait expects a duration", vec![]), None),
        };

        (
            Analysis::empty(),
            Some(BlockUnitData {
                transforms: vec![Box::new(TimerTransform { spec })],
                ..Default::default()
            }),
        )
    }
}

struct TimerTransform {
    spec: TimerSpec,
}

impl Transform for TimerTransform {
    fn execute(&self, _state: &BlockState, _tail: &[Box<dyn Transform>], _origin: DocumentRange) -> (Analysis, Option<Block>) {
        (
            Analysis::empty(),
            Some(Block::Segment(SegmentBlock { process: ProcessKind::Timer(self.spec.clone()) })),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::EvalEnvFactory;
    use crate::reader::parse_document;
    use crate::typecheck::analyze_schema;
    use labflow_common::{AttributeSchema, Document};

    fn context<'a>(schema: &'a AttributeSchema, factory: &'a mut EvalEnvFactory) -> CompileContext<'a> {
        CompileContext {
            parsers: &[],
            segment_schema: schema,
            document_id: "doc",
            depth: 0,
            factory,
            stack: crate::expr::EvalStack::new(),
            ambient_state: labflow_common::BlockState::empty(),
            node_tree: None,
        }
    }

    #[test]
    fn a_literal_wait_attribute_produces_a_timer_transform() {
        let mut schema = AttributeSchema::new();
        schema.add("timer", TimerParser.segment_attributes());

        let document = Document::new("doc", "wait: 30 sec\n");
        let (_, root) = parse_document(&document);
        let (analysis, attrs) = analyze_schema(&root, &schema, "doc");
        assert!(!analysis.has_errors());

        let mut factory = EvalEnvFactory::new();
        let mut ctx = context(&schema, &mut factory);
        let (unit_analysis, unit) = TimerParser.parse_block(&attrs, &root, &mut ctx);
        assert!(!unit_analysis.has_errors());
        assert_eq!(unit.unwrap().transforms.len(), 1);
    }

    #[test]
    fn a_block_without_wait_is_untouched() {
        let schema = AttributeSchema::new();
        let document = Document::new("doc", "name: x\n");
        let (_, root) = parse_document(&document);
        let mut factory = EvalEnvFactory::new();
        let mut ctx = context(&schema, &mut factory);
        let (_, unit) = TimerParser.parse_block(&Attrs::new(), &root, &mut ctx);
        assert!(unit.is_none());
    }
}
