//! Lexer and recursive-descent parser for the small expression language
//! embedded inside `{{ }}` / `${{ }}` / `%{{ }}` / `@{{ }}` forms.
//!
//! This is not a general-purpose scripting language: it covers the
//! arithmetic, comparison and boolean operators a protocol author needs to
//! write a condition or compute a quantity, nothing more.

use labflow_common::Range;

/// A parsed expression AST node. Ranges are relative to the start of the
/// expression's inner content (the text between the delimiting braces);
/// callers offset them by the expression's absolute start when attaching
/// diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// `true` / `false`.
    Bool(bool),
    /// An integer literal.
    Int(i64),
    /// A floating point literal.
    Float(f64),
    /// A double-quoted string literal.
    Str(String),
    /// `...`, the "unresolved / omitted" placeholder.
    Ellipsis,
    /// A magnitude immediately followed by a unit name, e.g. `30 sec`.
    Quantity(f64, String),
    /// A bare identifier, resolved against the eval stack at evaluation time.
    Ident(String),
    /// A unary operation.
    Unary(UnOp, Box<Spanned>),
    /// A binary operation.
    Binary(BinOp, Box<Spanned>, Box<Spanned>),
}

/// A unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Arithmetic negation.
    Neg,
    /// Boolean negation.
    Not,
}

/// A binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
}

/// A node together with the byte range (relative to the expression's inner
/// content) it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    /// The parsed node.
    pub node: Node,
    /// The range within the inner content this node spans.
    pub range: Range,
}

/// A syntax error while parsing the inner expression content, with the
/// offending range relative to the inner content's start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Human-readable message.
    pub message: String,
    /// Range (relative to the inner content) of the offending text.
    pub range: Range,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tok<'a> {
    Int(i64),
    Float(f64),
    Str(&'a str),
    Ident(&'a str),
    Sym(&'static str),
    Eof,
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    tok: Tok<'a>,
    range: Range,
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, bytes: src.as_bytes(), pos: 0 }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek_byte(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn next_token(&mut self) -> Result<Token<'a>, SyntaxError> {
        self.skip_ws();
        let start = self.pos;

        let Some(b) = self.peek_byte() else {
            return Ok(Token { tok: Tok::Eof, range: Range::point(start) });
        };

        if b.is_ascii_digit() {
            return self.lex_number(start);
        }

        if b == b'"' {
            return self.lex_string(start);
        }

        if b == b'_' || b.is_ascii_alphabetic() {
            while matches!(self.peek_byte(), Some(c) if c == b'_' || c.is_ascii_alphanumeric()) {
                self.pos += 1;
            }
            let text = &self.src[start..self.pos];
            return Ok(Token { tok: Tok::Ident(text), range: Range::new(start, self.pos) });
        }

        for sym in ["&&", "||", "==", "!=", "<=", ">="] {
            if self.src[self.pos..].starts_with(sym) {
                self.pos += sym.len();
                return Ok(Token { tok: Tok::Sym(sym), range: Range::new(start, self.pos) });
            }
        }

        for sym in ["+", "-", "*", "/", "(", ")", "<", ">", "!"] {
            if self.src[self.pos..].starts_with(sym) {
                self.pos += sym.len();
                return Ok(Token { tok: Tok::Sym(sym), range: Range::new(start, self.pos) });
            }
        }

        Err(SyntaxError { message: format!("unexpected character {:?}", b as char), range: Range::new(start, start + 1) })
    }

    fn lex_number(&mut self, start: usize) -> Result<Token<'a>, SyntaxError> {
        while matches!(self.peek_byte(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        let mut is_float = false;
        if self.peek_byte() == Some(b'.') && matches!(self.bytes.get(self.pos + 1), Some(b) if b.is_ascii_digit()) {
            is_float = true;
            self.pos += 1;
            while matches!(self.peek_byte(), Some(b) if b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = &self.src[start..self.pos];
        let range = Range::new(start, self.pos);
        if is_float {
            let value: f64 =
                text.parse().map_err(|_| SyntaxError { message: format!("invalid number {text:?}"), range })?;
            Ok(Token { tok: Tok::Float(value), range })
        } else {
            let value: i64 =
                text.parse().map_err(|_| SyntaxError { message: format!("invalid number {text:?}"), range })?;
            Ok(Token { tok: Tok::Int(value), range })
        }
    }

    fn lex_string(&mut self, start: usize) -> Result<Token<'a>, SyntaxError> {
        self.pos += 1; // opening quote
        let content_start = self.pos;
        loop {
            match self.peek_byte() {
                None => {
                    return Err(SyntaxError {
                        message: "unterminated string literal".into(),
                        range: Range::new(start, self.pos),
                    })
                }
                Some(b'"') => {
                    let text = &self.src[content_start..self.pos];
                    self.pos += 1;
                    return Ok(Token { tok: Tok::Str(text), range: Range::new(start, self.pos) });
                }
                Some(b'\\') => {
                    self.pos += 2;
                }
                _ => {
                    self.pos += 1;
                }
            }
        }
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token<'a>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Result<Self, SyntaxError> {
        let mut lexer = Lexer::new(src);
        let current = lexer.next_token()?;
        Ok(Self { lexer, current })
    }

    fn bump(&mut self) -> Result<Token<'a>, SyntaxError> {
        let previous = self.current;
        self.current = self.lexer.next_token()?;
        Ok(previous)
    }

    fn expect_sym(&mut self, sym: &'static str) -> Result<(), SyntaxError> {
        if let Tok::Sym(s) = self.current.tok {
            if s == sym {
                self.bump()?;
                return Ok(());
            }
        }
        Err(SyntaxError { message: format!("expected {sym:?}"), range: self.current.range })
    }

    fn parse_expr(&mut self) -> Result<Spanned, SyntaxError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Spanned, SyntaxError> {
        let mut left = self.parse_and()?;
        while matches!(self.current.tok, Tok::Sym("||")) {
            self.bump()?;
            let right = self.parse_and()?;
            left = combine(BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Spanned, SyntaxError> {
        let mut left = self.parse_eq()?;
        while matches!(self.current.tok, Tok::Sym("&&")) {
            self.bump()?;
            let right = self.parse_eq()?;
            left = combine(BinOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_eq(&mut self) -> Result<Spanned, SyntaxError> {
        let mut left = self.parse_rel()?;
        loop {
            let op = match self.current.tok {
                Tok::Sym("==") => BinOp::Eq,
                Tok::Sym("!=") => BinOp::Ne,
                _ => break,
            };
            self.bump()?;
            let right = self.parse_rel()?;
            left = combine(op, left, right);
        }
        Ok(left)
    }

    fn parse_rel(&mut self) -> Result<Spanned, SyntaxError> {
        let mut left = self.parse_add()?;
        loop {
            let op = match self.current.tok {
                Tok::Sym("<") => BinOp::Lt,
                Tok::Sym("<=") => BinOp::Le,
                Tok::Sym(">") => BinOp::Gt,
                Tok::Sym(">=") => BinOp::Ge,
                _ => break,
            };
            self.bump()?;
            let right = self.parse_add()?;
            left = combine(op, left, right);
        }
        Ok(left)
    }

    fn parse_add(&mut self) -> Result<Spanned, SyntaxError> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.current.tok {
                Tok::Sym("+") => BinOp::Add,
                Tok::Sym("-") => BinOp::Sub,
                _ => break,
            };
            self.bump()?;
            let right = self.parse_mul()?;
            left = combine(op, left, right);
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> Result<Spanned, SyntaxError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current.tok {
                Tok::Sym("*") => BinOp::Mul,
                Tok::Sym("/") => BinOp::Div,
                _ => break,
            };
            self.bump()?;
            let right = self.parse_unary()?;
            left = combine(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Spanned, SyntaxError> {
        match self.current.tok {
            Tok::Sym("-") => {
                let start = self.current.range;
                self.bump()?;
                let inner = self.parse_unary()?;
                let range = Range::new(start.start, inner.range.end);
                Ok(Spanned { node: Node::Unary(UnOp::Neg, Box::new(inner)), range })
            }
            Tok::Sym("!") => {
                let start = self.current.range;
                self.bump()?;
                let inner = self.parse_unary()?;
                let range = Range::new(start.start, inner.range.end);
                Ok(Spanned { node: Node::Unary(UnOp::Not, Box::new(inner)), range })
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Spanned, SyntaxError> {
        let token = self.bump()?;
        match token.tok {
            Tok::Int(value) => {
                if let Tok::Ident(unit) = self.current.tok {
                    let unit_range = self.current.range;
                    self.bump()?;
                    let range = Range::new(token.range.start, unit_range.end);
                    return Ok(Spanned { node: Node::Quantity(value as f64, unit.to_string()), range });
                }
                Ok(Spanned { node: Node::Int(value), range: token.range })
            }
            Tok::Float(value) => {
                if let Tok::Ident(unit) = self.current.tok {
                    let unit_range = self.current.range;
                    self.bump()?;
                    let range = Range::new(token.range.start, unit_range.end);
                    return Ok(Spanned { node: Node::Quantity(value, unit.to_string()), range });
                }
                Ok(Spanned { node: Node::Float(value), range: token.range })
            }
            Tok::Str(text) => Ok(Spanned { node: Node::Str(unescape_string(text)), range: token.range }),
            Tok::Ident("true") => Ok(Spanned { node: Node::Bool(true), range: token.range }),
            Tok::Ident("false") => Ok(Spanned { node: Node::Bool(false), range: token.range }),
            Tok::Ident(name) => Ok(Spanned { node: Node::Ident(name.to_string()), range: token.range }),
            Tok::Sym("(") => {
                let inner = self.parse_expr()?;
                self.expect_sym(")")?;
                Ok(inner)
            }
            _ => Err(SyntaxError { message: "expected an expression".into(), range: token.range }),
        }
    }
}

fn combine(op: BinOp, left: Spanned, right: Spanned) -> Spanned {
    let range = Range::new(left.range.start, right.range.end);
    Spanned { node: Node::Binary(op, Box::new(left), Box::new(right)), range }
}

fn unescape_string(text: &str) -> String {
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

/// Parse `content` (the trimmed, unescaped text between an expression's
/// delimiting braces) into an AST. Ranges in the result and in any error are
/// relative to the start of `content`.
pub fn parse(content: &str) -> Result<Spanned, SyntaxError> {
    let mut parser = Parser::new(content)?;
    let expr = parser.parse_expr()?;
    if !matches!(parser.current.tok, Tok::Eof) {
        return Err(SyntaxError {
            message: "unexpected trailing input".into(),
            range: parser.current.range,
        });
    }
    Ok(expr)
}
