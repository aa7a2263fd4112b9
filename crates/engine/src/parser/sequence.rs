//! `sequence`: collects an ordered list of child blocks under `actions` and
//! emits a [`Block::Sequence`] whose program steps them in order.

use super::{compile::compile_block, Attrs, BlockUnitData, CompileContext, Parser, Transform};
use crate::block::{Block, SequenceBlock};
use crate::reader::RawValue;
use crate::typecheck::AttrValue;
use labflow_common::{Analysis, AttributeKey, BlockState, DocumentRange, Located, Type};
use std::collections::BTreeMap;

/// Recognizes an `actions: [...]` block list and compiles each item as a
/// child block via the same composite segment schema.
pub struct SequenceParser;

impl Parser for SequenceParser {
    fn namespace(&self) -> &str {
        "sequence"
    }

    fn segment_attributes(&self) -> BTreeMap<String, AttributeKey> {
        BTreeMap::from([(
            "actions".to_string(),
            AttributeKey::optional("actions", Type::Any).with_description("ordered list of child blocks"),
        )])
    }

    fn parse_block(&self, attrs: &Attrs, raw: &Located<RawValue>, ctx: &mut CompileContext) -> (Analysis, Option<BlockUnitData>) {
        if !attrs.contains_key("actions") {
            return (Analysis::empty(), None);
        }
        let Some(items_raw) = raw.get("actions") else {
            return (Analysis::empty(), None);
        };
        let Some(items) = items_raw.as_sequence() else {
            return (
                Analysis::from_error("actions expects a list of blocks", vec![]),
                None,
            );
        };

        let mut analysis = Analysis::empty();
        let mut children = Vec::with_capacity(items.len());
        let mut ok = true;
        for item in items {
            let (item_analysis, child) = compile_block(item, ctx);
            analysis.merge_in_place(item_analysis);
            match child {
                Some(child) => children.push(child),
                None => ok = false,
            }
        }

        if !ok {
            return (analysis, None);
        }

        (
            analysis,
            Some(BlockUnitData {
                transforms: vec![Box::new(SequenceTransform { children })],
                ..Default::default()
            }),
        )
    }
}

struct SequenceTransform {
    children: Vec<Block>,
}

impl Transform for SequenceTransform {
    fn execute(&self, _state: &BlockState, _tail: &[Box<dyn Transform>], _origin: DocumentRange) -> (Analysis, Option<Block>) {
        (Analysis::empty(), Some(Block::Sequence(SequenceBlock { children: self.children.clone() })))
    }
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
    fn compiles_each_action_as_a_child_block() {
        let parsers = default_parsers();
        let mut segment_schema = AttributeSchema::new();
        for parser in &parsers {
            let attrs = parser.segment_attributes();
            if !attrs.is_empty() {
                segment_schema.add(parser.namespace(), attrs);
            }
        }

        let document = Document::new("doc", "actions:\n  - wait: 1 sec\n  - wait: 2 sec\n");
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

        let (unit_analysis, unit) = SequenceParser.parse_block(&attrs, &root, &mut ctx);
        assert!(!unit_analysis.has_errors(), "{:?}", unit_analysis.diagnostics);
        assert_eq!(unit.unwrap().transforms.len(), 1);
    }
}
