//! Evaluating a parsed expression AST against a variable environment.

use super::ast::{BinOp, Node, Spanned, UnOp};
use labflow_common::{Quantity, UnitError, Value};

/// An error raised while evaluating an expression's AST against concrete
/// values. Distinct from [`super::ast::SyntaxError`], which is raised while
/// parsing the AST itself.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// An identifier had no binding in any visible environment.
    NameError(String),
    /// An operator was applied to operands of an incompatible type.
    TypeError(String),
    /// A quantity operation mixed incompatible units.
    Dimensionality(String),
}

impl From<UnitError> for EvalError {
    fn from(err: UnitError) -> Self {
        EvalError::Dimensionality(err.to_string())
    }
}

/// Evaluate `spanned` against `resolve`, a callback mapping identifier names
/// to bound values (already flattened across every visible [`super::EvalEnv`]
/// with later environments shadowing earlier ones).
pub fn eval(spanned: &Spanned, resolve: &impl Fn(&str) -> Option<Value>) -> Result<Value, EvalError> {
    eval_node(&spanned.node, resolve)
}

fn eval_node(node: &Node, resolve: &impl Fn(&str) -> Option<Value>) -> Result<Value, EvalError> {
    match node {
        Node::Bool(b) => Ok(Value::Boolean(*b)),
        Node::Int(i) => Ok(Value::Integer(*i)),
        Node::Float(f) => Ok(Value::Float(*f)),
        Node::Str(s) => Ok(Value::String(s.clone())),
        Node::Ellipsis => Ok(Value::Ellipsis),
        Node::Quantity(magnitude, unit) => Ok(Value::Quantity(Quantity::new(*magnitude, unit)?)),
        Node::Ident(name) => resolve(name).ok_or_else(|| EvalError::NameError(name.clone())),
        Node::Unary(op, inner) => eval_unary(*op, eval_node(&inner.node, resolve)?),
        Node::Binary(op, left, right) => {
            let left = eval_node(&left.node, resolve)?;
            let right = eval_node(&right.node, resolve)?;
            eval_binary(*op, left, right)
        }
    }
}

fn eval_unary(op: UnOp, value: Value) -> Result<Value, EvalError> {
    match (op, value) {
        (UnOp::Neg, Value::Integer(i)) => Ok(Value::Integer(-i)),
        (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnOp::Neg, Value::Quantity(q)) => Ok(Value::Quantity(q.scale(-1.0))),
        (UnOp::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (op, value) => Err(EvalError::TypeError(format!("cannot apply {op:?} to {value:?}"))),
    }
}

fn eval_binary(op: BinOp, left: Value, right: Value) -> Result<Value, EvalError> {
    use BinOp::*;

    if matches!(op, Eq | Ne) {
        let equal = values_equal(&left, &right);
        return Ok(Value::Boolean(if op == Eq { equal } else { !equal }));
    }

    if matches!(op, And | Or) {
        let (Value::Boolean(l), Value::Boolean(r)) = (&left, &right) else {
            return Err(EvalError::TypeError(format!("{op:?} requires booleans, got {left:?} and {right:?}")));
        };
        return Ok(Value::Boolean(if op == And { *l && *r } else { *l || *r }));
    }

    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => eval_numeric_ints(op, l, r),
        (Value::Quantity(l), Value::Quantity(r)) => eval_quantity(op, l, r),
        (l, r) => eval_numeric_floats(op, as_f64(&l)?, as_f64(&r)?),
    }
}

fn as_f64(value: &Value) -> Result<f64, EvalError> {
    match value {
        Value::Integer(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        other => Err(EvalError::TypeError(format!("expected a number, got {other:?}"))),
    }
}

fn eval_numeric_ints(op: BinOp, l: i64, r: i64) -> Result<Value, EvalError> {
    use BinOp::*;
    match op {
        Add => Ok(Value::Integer(l + r)),
        Sub => Ok(Value::Integer(l - r)),
        Mul => Ok(Value::Integer(l * r)),
        Div => Ok(Value::Float(l as f64 / r as f64)),
        Lt => Ok(Value::Boolean(l < r)),
        Le => Ok(Value::Boolean(l <= r)),
        Gt => Ok(Value::Boolean(l > r)),
        Ge => Ok(Value::Boolean(l >= r)),
        other => Err(EvalError::TypeError(format!("unsupported integer operator {other:?}"))),
    }
}

fn eval_numeric_floats(op: BinOp, l: f64, r: f64) -> Result<Value, EvalError> {
    use BinOp::*;
    match op {
        Add => Ok(Value::Float(l + r)),
        Sub => Ok(Value::Float(l - r)),
        Mul => Ok(Value::Float(l * r)),
        Div => Ok(Value::Float(l / r)),
        Lt => Ok(Value::Boolean(l < r)),
        Le => Ok(Value::Boolean(l <= r)),
        Gt => Ok(Value::Boolean(l > r)),
        Ge => Ok(Value::Boolean(l >= r)),
        other => Err(EvalError::TypeError(format!("unsupported float operator {other:?}"))),
    }
}

fn eval_quantity(op: BinOp, l: Quantity, r: Quantity) -> Result<Value, EvalError> {
    use BinOp::*;
    match op {
        Add => Ok(Value::Quantity(l.add(r)?)),
        Sub => Ok(Value::Quantity(l.sub(r)?)),
        Lt => Ok(Value::Boolean(same_dim(l, r)? && l.base_magnitude() < r.base_magnitude())),
        Le => Ok(Value::Boolean(same_dim(l, r)? && l.base_magnitude() <= r.base_magnitude())),
        Gt => Ok(Value::Boolean(same_dim(l, r)? && l.base_magnitude() > r.base_magnitude())),
        Ge => Ok(Value::Boolean(same_dim(l, r)? && l.base_magnitude() >= r.base_magnitude())),
        other => Err(EvalError::TypeError(format!("unsupported quantity operator {other:?}"))),
    }
}

fn same_dim(l: Quantity, r: Quantity) -> Result<bool, EvalError> {
    if l.dimension() != r.dimension() {
        return Err(EvalError::Dimensionality(format!("{} vs {}", l.dimension(), r.dimension())));
    }
    Ok(true)
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Integer(l), Value::Float(r)) | (Value::Float(r), Value::Integer(l)) => (*l as f64) == *r,
        (Value::Quantity(l), Value::Quantity(r)) => {
            l.dimension() == r.dimension() && l.base_magnitude() == r.base_magnitude()
        }
        _ => left == right,
    }
}

#[cfg(test)]
mod tests {
    use super::super::ast::parse;
    use super::*;

    fn no_vars(_: &str) -> Option<Value> {
        None
    }

    #[test]
    fn arithmetic_folds_to_a_value() {
        let expr = parse("1 + 1 == 2").unwrap();
        assert_eq!(eval(&expr, &no_vars).unwrap(), Value::Boolean(true));
    }

    #[test]
    fn false_condition_evaluates_to_false() {
        let expr = parse("1 + 1 == 3").unwrap();
        assert_eq!(eval(&expr, &no_vars).unwrap(), Value::Boolean(false));
    }

    #[test]
    fn quantity_addition_normalizes_units() {
        let expr = parse("90 sec").unwrap();
        let Value::Quantity(q) = eval(&expr, &no_vars).unwrap() else { panic!("expected quantity") };
        assert_eq!(q.magnitude_as("min").unwrap(), 1.5);
    }

    #[test]
    fn unbound_identifier_is_a_name_error() {
        let expr = parse("missing_var").unwrap();
        assert_eq!(eval(&expr, &no_vars), Err(EvalError::NameError("missing_var".to_string())));
    }

    #[test]
    fn incompatible_dimensions_are_rejected() {
        let expr = parse("1 sec == 1 mL").unwrap();
        assert!(matches!(eval(&expr, &no_vars), Err(EvalError::Dimensionality(_))));
    }

    #[test]
    fn variables_resolve_through_the_callback() {
        let expr = parse("x + 1").unwrap();
        let resolve = |name: &str| if name == "x" { Some(Value::Integer(41)) } else { None };
        assert_eq!(eval(&expr, &resolve).unwrap(), Value::Integer(42));
    }
}
