//! `if`: wraps a child block with a predicate evaluated once, at program
//! start. A false predicate skips the child and terminates immediately.
//! There is deliberately no `unless` inverse.

use super::{compile::compile_block, Attrs, BlockUnitData, CompileContext, Parser, Transform};
use crate::block::{Block, ConditionBlock};
use crate::expr::{self, Expression};
use crate::reader::RawValue;
use crate::typecheck::AttrValue;
use labflow_common::{Analysis, AttributeKey, BlockState, Diagnostic, DocumentRange, Located, Type, Value};
use std::collections::BTreeMap;

/// Recognizes an `if: <bool-or-expr>` block with a nested `then` child.
pub struct ConditionParser;

impl Parser for ConditionParser {
    fn namespace(&self) -> &str {
        "if"
    }

    fn segment_attributes(&self) -> BTreeMap<String, AttributeKey> {
        BTreeMap::from([
            ("if".to_string(), AttributeKey::optional("if", Type::Bool).with_description("predicate gating the child block")),
            ("then".to_string(), AttributeKey::optional("then", Type::Any).with_description("block run when the predicate holds")),
        ])
    }

    fn parse_block(&self, attrs: &Attrs, raw: &Located<RawValue>, ctx: &mut CompileContext) -> (Analysis, Option<BlockUnitData>) {
        let Some(attr) = attrs.get("if") else {
            return (Analysis::empty(), None);
        };

        let predicate = match attr {
            AttrValue::Value(Value::Boolean(b)) => Expression::literal_bool(*b),
            AttrValue::Expr(expr) => expr.clone(),
            _ => return (Analysis::from_error("if expects a boolean or expression", vec![]), None),
        };

        let Some(then) = raw.get("then") else {
            return (
                Analysis::from_diagnostic(Diagnostic::error("if requires a then block", vec![doc_range(ctx.document_id, raw.range())])),
                None,
            );
        };

        let (child_analysis, child) = compile_block(then, ctx);
        let Some(child) = child else {
            return (child_analysis, None);
        };

        (
            child_analysis,
            Some(BlockUnitData {
                transforms: vec![Box::new(ConditionTransform { predicate, child })],
                ..Default::default()
            }),
        )
    }
}

struct ConditionTransform {
    predicate: Expression,
    child: Block,
}

impl Transform for ConditionTransform {
    fn execute(&self, _state: &BlockState, _tail: &[Box<dyn Transform>], _origin: DocumentRange) -> (Analysis, Option<Block>) {
        (
            Analysis::empty(),
            Some(Block::Condition(ConditionBlock { predicate: self.predicate.clone(), child: Box::new(self.child.clone()) })),
        )
    }
}

fn doc_range(document_id: &str, range: labflow_common::Range) -> DocumentRange {
    DocumentRange { document_id: document_id.to_string(), range }
}

impl Expression {
    /// Build a `Static` expression that always evaluates to a fixed boolean,
    /// for when the type analyzer already resolved `if` to a plain literal
    /// rather than an embedded expression.
    fn literal_bool(value: bool) -> Expression {
        expr::parse_exact(&format!("${{{{ {value} }}}}")).expect("literal boolean always parses")
    }
}
