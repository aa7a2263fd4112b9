//! Embedded expressions: the `{{ }}` / `${{ }}` / `%{{ }}` / `@{{ }}`
//! surface forms, the variable-scope stack they evaluate against, and the
//! boundary between compile-time (`Static`) and instantiation-time
//! (`Field`/`Dynamic`) evaluation.

pub mod ast;
pub mod eval;

use labflow_common::{Range, Value};
use std::collections::HashMap;

pub use ast::{Node, SyntaxError as AstSyntaxError};
pub use eval::EvalError;

/// Which of the four surface forms produced an [`Expression`], and when it
/// is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprKind {
    /// `{{ … }}` — evaluated against the adoption stack when a program is
    /// instantiated.
    Field,
    /// `${{ … }}` — evaluated once, at compile time, against an
    /// environment of constants.
    Static,
    /// `%{{ … }}` — evaluated against the adoption stack when a program is
    /// instantiated; distinguished from `Field` only by its surface form.
    Dynamic,
    /// `@{{ … }}` — names an assignable location rather than a value; only
    /// accepted where a binding target is expected.
    Binding,
}

impl ExprKind {
    fn delimiter_prefix(self) -> &'static str {
        match self {
            ExprKind::Field => "",
            ExprKind::Static => "$",
            ExprKind::Dynamic => "%",
            ExprKind::Binding => "@",
        }
    }
}

/// A syntax error raised scanning or parsing an embedded expression, with
/// the offending range relative to the start of the text handed to
/// [`parse_exact`] or [`parse_mixed`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExprSyntaxError {
    /// Human-readable message.
    pub message: String,
    /// Offending range within the scanned text.
    pub range: Range,
}

impl From<ast::SyntaxError> for ExprSyntaxError {
    fn from(err: ast::SyntaxError) -> Self {
        Self { message: err.message, range: err.range }
    }
}

/// One parsed expression: its kind, raw (still-escaped) source text, and
/// the AST it compiled to, or the error it produced.
#[derive(Debug, Clone)]
pub struct Expression {
    pub kind: ExprKind,
    /// Raw source text between the delimiting braces, before unescaping.
    pub raw: String,
    ast: Result<ast::Spanned, ast::SyntaxError>,
}

impl Expression {
    fn new(kind: ExprKind, raw: &str) -> Self {
        let unescaped = unescape(raw);
        let ast = ast::parse(&unescaped);
        Self { kind, raw: raw.to_string(), ast }
    }

    /// Rebuild an expression from its `kind` and already-escaped `raw`
    /// source text, as recorded by a prior [`Expression::export`]-style
    /// round trip (e.g. [`crate::block::Block::import_value`]).
    pub fn from_raw(kind: ExprKind, raw: impl AsRef<str>) -> Self {
        Self::new(kind, raw.as_ref())
    }

    /// The syntax error produced while parsing this expression's inner
    /// content, if any.
    pub fn syntax_error(&self) -> Option<&ast::SyntaxError> {
        self.ast.as_ref().err()
    }

    /// Evaluate this expression against `stack`. Valid for `Field`,
    /// `Static` and `Dynamic` kinds; a `Binding` expression has no value,
    /// only a [`Expression::binding_target`].
    pub fn evaluate(&self, stack: &EvalStack) -> Result<Value, EvalError> {
        let spanned = self
            .ast
            .as_ref()
            .map_err(|err| EvalError::TypeError(format!("expression failed to parse: {}", err.message)))?;
        eval::eval(spanned, &|name| stack.resolve(name))
    }

    /// The identifier this expression names, if it is a bare `Binding`
    /// expression (the only shape a binding target is accepted in).
    pub fn binding_target(&self) -> Option<&str> {
        if self.kind != ExprKind::Binding {
            return None;
        }
        match self.ast.as_ref().ok()?.node {
            ast::Node::Ident(ref name) => Some(name),
            _ => None,
        }
    }
}

/// A piece of a mixed (literal text + embedded expressions) string.
#[derive(Debug, Clone)]
pub enum Segment {
    /// Literal text, already unescaped.
    Literal(String),
    /// An embedded expression.
    Expr(Expression),
}

/// Parse `text` as a single expression with no surrounding literal text:
/// the whole string must be one `prefix{{ … }}` form.
pub fn parse_exact(text: &str) -> Result<Expression, ExprSyntaxError> {
    let (kind, open_at) = detect_open_at_start(text).ok_or_else(|| ExprSyntaxError {
        message: "expected an expression".into(),
        range: Range::point(0),
    })?;
    let content_start = open_at + kind.delimiter_prefix().len() + 2;
    let close = find_closing(text, content_start).ok_or_else(|| ExprSyntaxError {
        message: "unterminated expression".into(),
        range: Range::new(open_at, text.len()),
    })?;
    if close + 2 != text.len() {
        return Err(ExprSyntaxError {
            message: "unexpected text after expression".into(),
            range: Range::new(close + 2, text.len()),
        });
    }
    Ok(Expression::new(kind, &text[content_start..close]))
}

/// Parse `text` as literal text interleaved with embedded expressions.
/// Always succeeds with at least one segment unless an expression inside
/// is malformed (unterminated `{{`); a string with no expressions at all
/// comes back as a single `Literal` segment.
pub fn parse_mixed(text: &str) -> Result<Vec<Segment>, ExprSyntaxError> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    while cursor < text.len() {
        match find_next_open(text, cursor) {
            Some((open_at, kind)) => {
                if open_at > cursor {
                    segments.push(Segment::Literal(unescape(&text[cursor..open_at])));
                }
                let content_start = open_at + kind.delimiter_prefix().len() + 2;
                let close = find_closing(text, content_start).ok_or_else(|| ExprSyntaxError {
                    message: "unterminated expression".into(),
                    range: Range::new(open_at, text.len()),
                })?;
                segments.push(Segment::Expr(Expression::new(kind, &text[content_start..close])));
                cursor = close + 2;
            }
            None => {
                segments.push(Segment::Literal(unescape(&text[cursor..])));
                cursor = text.len();
            }
        }
    }

    if segments.is_empty() {
        segments.push(Segment::Literal(String::new()));
    }
    Ok(segments)
}

/// Whether `text` begins with one of the four expression delimiters. Used
/// by the type analyzer to decide whether a scalar is a literal or an
/// expression before attempting to parse it as either.
pub fn starts_with_expression(text: &str) -> bool {
    detect_open_at_start(text).is_some()
}

fn detect_open_at_start(text: &str) -> Option<(ExprKind, usize)> {
    for kind in [ExprKind::Static, ExprKind::Dynamic, ExprKind::Binding, ExprKind::Field] {
        let delim = format!("{}{{{{", kind.delimiter_prefix());
        if text.starts_with(&delim) {
            return Some((kind, 0));
        }
    }
    None
}

/// Find the next occurrence of one of the four opening delimiters at or
/// after byte offset `from`, returning its kind and the offset of its
/// first character (the prefix character, or the first `{` if there is
/// none).
fn find_next_open(text: &str, from: usize) -> Option<(usize, ExprKind)> {
    let bytes = text.as_bytes();
    let mut i = from;
    while i + 1 < bytes.len() {
        if bytes[i] == b'{' && bytes[i + 1] == b'{' {
            return Some(match i.checked_sub(1).map(|p| bytes[p]) {
                Some(b'$') => (i - 1, ExprKind::Static),
                Some(b'%') => (i - 1, ExprKind::Dynamic),
                Some(b'@') => (i - 1, ExprKind::Binding),
                _ => (i, ExprKind::Field),
            });
        }
        i += 1;
    }
    None
}

/// Find the byte offset of the first `}` of the closing `}}`, starting the
/// scan from `from` and treating a backslash as escaping the next byte.
fn find_closing(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Undo backslash-escaping: `\X` becomes `X` for any character `X`,
/// including `\\`, `\{` and `\}`.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Identity token for one lexical variable scope. Opaque and cheap to
/// copy; two tokens are equal only if one was cloned from the other,
/// never by comparing the variables they happen to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EvalEnv(usize);

/// Allocates fresh, mutually distinct [`EvalEnv`] tokens.
#[derive(Debug, Default)]
pub struct EvalEnvFactory {
    next: usize,
}

impl EvalEnvFactory {
    /// A fresh factory, starting from token zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new, previously unused environment token.
    pub fn fresh(&mut self) -> EvalEnv {
        let id = self.next;
        self.next += 1;
        EvalEnv(id)
    }
}

/// One environment's contribution to an [`EvalStack`]: either a concrete
/// set of named values, or a marker that this scope's names are not yet
/// bound (used for environments registered ahead of the values that will
/// populate them, e.g. a state's own variables before `apply` runs).
#[derive(Debug, Clone)]
pub enum Binding {
    /// Concrete name-to-value bindings.
    Values(HashMap<String, Value>),
    /// Names in this scope exist but are not yet resolvable.
    Deferred,
}

/// An ordered stack of visible environments, outer first. Resolution walks
/// from the innermost (most recently pushed) environment outward, so a
/// later environment shadows an earlier one that defines the same name.
#[derive(Debug, Clone, Default)]
pub struct EvalStack {
    frames: Vec<(EvalEnv, Binding)>,
}

impl EvalStack {
    /// An empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new stack with `binding` pushed as the innermost
    /// environment. The receiver is left unchanged.
    pub fn pushed(&self, env: EvalEnv, binding: Binding) -> Self {
        let mut frames = self.frames.clone();
        frames.push((env, binding));
        Self { frames }
    }

    /// Resolve `name` against the innermost environment that defines it.
    pub fn resolve(&self, name: &str) -> Option<Value> {
        for (_, binding) in self.frames.iter().rev() {
            if let Binding::Values(values) = binding {
                if let Some(value) = values.get(name) {
                    return Some(value.clone());
                }
            }
        }
        None
    }

    /// Whether `env` has been pushed onto this stack.
    pub fn contains(&self, env: EvalEnv) -> bool {
        self.frames.iter().any(|(e, _)| *e == env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_surface_form() {
        for (text, expected) in [
            ("{{ 1 + 1 }}", ExprKind::Field),
            ("${{ 1 + 1 }}", ExprKind::Static),
            ("%{{ 1 + 1 }}", ExprKind::Dynamic),
            ("@{{ x }}", ExprKind::Binding),
        ] {
            let expr = parse_exact(text).unwrap();
            assert_eq!(expr.kind, expected);
        }
    }

    #[test]
    fn exact_rejects_trailing_text() {
        assert!(parse_exact("{{ 1 }} extra").is_err());
    }

    #[test]
    fn escaped_closing_braces_do_not_end_the_expression() {
        let expr = parse_exact(r#"{{ "a\}\}b" }}"#).unwrap();
        assert_eq!(expr.evaluate(&EvalStack::new()).unwrap(), Value::String("a}}b".to_string()));
    }

    #[test]
    fn mixed_parsing_interleaves_literal_and_expression_segments() {
        let segments = parse_mixed("wait {{ 1 + 1 }} seconds").unwrap();
        assert_eq!(segments.len(), 3);
        assert!(matches!(&segments[0], Segment::Literal(s) if s == "wait "));
        assert!(matches!(&segments[1], Segment::Expr(_)));
        assert!(matches!(&segments[2], Segment::Literal(s) if s == " seconds"));
    }

    #[test]
    fn mixed_parsing_with_no_expressions_is_one_literal_segment() {
        let segments = parse_mixed("plain text").unwrap();
        assert_eq!(segments.len(), 1);
        assert!(matches!(&segments[0], Segment::Literal(s) if s == "plain text"));
    }

    #[test]
    fn unterminated_expression_is_a_syntax_error() {
        assert!(parse_mixed("prefix {{ 1 + 1 ").is_err());
    }

    #[test]
    fn binding_expression_names_its_target() {
        let expr = parse_exact("@{{ output_volume }}").unwrap();
        assert_eq!(expr.binding_target(), Some("output_volume"));
    }

    #[test]
    fn eval_stack_resolves_through_shadowing() {
        let mut factory = EvalEnvFactory::new();
        let outer = factory.fresh();
        let inner = factory.fresh();

        let stack = EvalStack::new()
            .pushed(outer, Binding::Values(HashMap::from([("x".to_string(), Value::Integer(1))])))
            .pushed(inner, Binding::Values(HashMap::from([("x".to_string(), Value::Integer(2))])));

        assert_eq!(stack.resolve("x"), Some(Value::Integer(2)));
    }

    #[test]
    fn eval_stack_skips_deferred_frames() {
        let mut factory = EvalEnvFactory::new();
        let deferred = factory.fresh();
        let stack = EvalStack::new().pushed(deferred, Binding::Deferred);
        assert_eq!(stack.resolve("x"), None);
    }
}
