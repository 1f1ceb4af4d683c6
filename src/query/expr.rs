// Copyright 2021 Datafuse Labs
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Boolean WHERE expressions: `AND`/`OR` trees over comparisons.

use std::fmt;
use std::ops::Range;

use crate::errors::UnsupportedQuery;

/// Byte range of a node in the text it was parsed from.
pub type Span = Range<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    RegexMatch,
    RegexNotMatch,
    In,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
            CompareOp::RegexMatch => "=~",
            CompareOp::RegexNotMatch => "!~",
            CompareOp::In => "IN",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A single-quoted string literal, unquoted.
    Str(String),
    /// A numeric literal as written.
    Number(String),
    Bool(bool),
    Ident(String),
    Regex(String),
    /// The string literals of an `IN (...)` list.
    List(Vec<String>),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Operand::Str(s) => write!(f, "'{}'", s),
            Operand::Number(n) => write!(f, "{}", n),
            Operand::Bool(b) => write!(f, "{}", b),
            Operand::Ident(i) => write!(f, "{}", i),
            Operand::Regex(r) => write!(f, "/{}/", r),
            Operand::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "'{}'", item)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A leaf comparison `lhs op rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// Left-hand identifier with quotes removed.
    pub lhs: String,
    pub op: CompareOp,
    pub rhs: Operand,
    pub span: Span,
}

impl Comparison {
    pub fn is_time(&self) -> bool {
        self.lhs.eq_ignore_ascii_case("time")
    }

    /// The string values this comparison pins `lhs` to, for `=` and `IN`.
    pub fn pinned_values(&self) -> Option<Vec<String>> {
        match (&self.op, &self.rhs) {
            (CompareOp::Eq, Operand::Str(s)) => Some(vec![s.clone()]),
            (CompareOp::In, Operand::List(items)) => Some(items.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for Comparison {
    /// Compact form without spaces, such as `usage_user>90.0`.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.lhs, self.op, self.rhs)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Leaf(Comparison),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    /// Includes enclosing parentheses.
    pub span: Span,
}

impl Expr {
    /// Operands of the top-level `AND` chain, looking through parentheses.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::And(l, r) => {
                let mut v = l.conjuncts();
                v.extend(r.conjuncts());
                v
            }
            _ => vec![self],
        }
    }

    pub fn leaves(&self) -> Vec<&Comparison> {
        match &self.kind {
            ExprKind::And(l, r) | ExprKind::Or(l, r) => {
                let mut v = l.leaves();
                v.extend(r.leaves());
                v
            }
            ExprKind::Leaf(c) => vec![c],
        }
    }

    pub fn has_and(&self) -> bool {
        match &self.kind {
            ExprKind::And(..) => true,
            ExprKind::Or(l, r) => l.has_and() || r.has_and(),
            ExprKind::Leaf(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Number(String),
    Regex(String),
    Op(CompareOp),
    LParen,
    RParen,
    Comma,
    And,
    Or,
    In,
}

fn lex(src: &str, base: usize) -> Result<Vec<(Tok, Span)>, UnsupportedQuery> {
    let b = src.as_bytes();
    let mut toks = vec![];
    let mut i = 0;

    while i < b.len() {
        let c = b[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let tok = match c {
            b'(' => {
                i += 1;
                Tok::LParen
            }
            b')' => {
                i += 1;
                Tok::RParen
            }
            b',' => {
                i += 1;
                Tok::Comma
            }
            b'\'' | b'"' => {
                let end = src[i + 1..]
                    .find(c as char)
                    .ok_or_else(|| UnsupportedQuery::new(format!("unterminated quote at {}", base + i)))?;
                let s = src[i + 1..i + 1 + end].to_string();
                i += end + 2;
                if c == b'\'' {
                    Tok::Str(s)
                } else {
                    Tok::Ident(s)
                }
            }
            b'/' => {
                let end = src[i + 1..]
                    .find('/')
                    .ok_or_else(|| UnsupportedQuery::new(format!("unterminated regex at {}", base + i)))?;
                let s = src[i + 1..i + 1 + end].to_string();
                i += end + 2;
                Tok::Regex(s)
            }
            b'=' | b'!' | b'<' | b'>' => {
                let next = b.get(i + 1).copied();
                let (op, n) = match (c, next) {
                    (b'=', Some(b'~')) => (CompareOp::RegexMatch, 2),
                    (b'=', _) => (CompareOp::Eq, 1),
                    (b'!', Some(b'=')) => (CompareOp::NotEq, 2),
                    (b'!', Some(b'~')) => (CompareOp::RegexNotMatch, 2),
                    (b'<', Some(b'=')) => (CompareOp::LtEq, 2),
                    (b'<', Some(b'>')) => (CompareOp::NotEq, 2),
                    (b'<', _) => (CompareOp::Lt, 1),
                    (b'>', Some(b'=')) => (CompareOp::GtEq, 2),
                    (b'>', _) => (CompareOp::Gt, 1),
                    _ => {
                        return Err(UnsupportedQuery::new(format!(
                            "unexpected '{}' at {}",
                            c as char,
                            base + i
                        )))
                    }
                };
                i += n;
                Tok::Op(op)
            }
            c if c.is_ascii_digit() || c == b'-' || c == b'+' => {
                i += 1;
                while i < b.len() && (b[i].is_ascii_alphanumeric() || b[i] == b'.') {
                    i += 1;
                }
                Tok::Number(src[start..i].to_string())
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < b.len() && (b[i].is_ascii_alphanumeric() || b[i] == b'_' || b[i] == b'.') {
                    i += 1;
                }
                let word = &src[start..i];
                match word.to_ascii_uppercase().as_str() {
                    "AND" => Tok::And,
                    "OR" => Tok::Or,
                    "IN" => Tok::In,
                    _ => Tok::Ident(word.to_string()),
                }
            }
            _ => {
                return Err(UnsupportedQuery::new(format!(
                    "unexpected '{}' at {}",
                    c as char,
                    base + i
                )))
            }
        };

        toks.push((tok, base + start..base + i));
    }

    Ok(toks)
}

struct Parser {
    toks: Vec<(Tok, Span)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Result<(Tok, Span), UnsupportedQuery> {
        let t = self
            .toks
            .get(self.pos)
            .cloned()
            .ok_or_else(|| UnsupportedQuery::new("unexpected end of WHERE clause"))?;
        self.pos += 1;
        Ok(t)
    }

    fn expect(&mut self, want: Tok) -> Result<Span, UnsupportedQuery> {
        let (t, span) = self.next()?;
        if t != want {
            return Err(UnsupportedQuery::new(format!(
                "expected {:?}, found {:?} at {}",
                want, t, span.start
            )));
        }
        Ok(span)
    }

    fn or_expr(&mut self) -> Result<Expr, UnsupportedQuery> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&Tok::Or) {
            self.pos += 1;
            let right = self.and_expr()?;
            let span = left.span.start..right.span.end;
            left = Expr {
                kind: ExprKind::Or(Box::new(left), Box::new(right)),
                span,
            };
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, UnsupportedQuery> {
        let mut left = self.primary()?;
        while self.peek() == Some(&Tok::And) {
            self.pos += 1;
            let right = self.primary()?;
            let span = left.span.start..right.span.end;
            left = Expr {
                kind: ExprKind::And(Box::new(left), Box::new(right)),
                span,
            };
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Expr, UnsupportedQuery> {
        if self.peek() == Some(&Tok::LParen) {
            let (_, open) = self.next()?;
            let mut inner = self.or_expr()?;
            let close = self.expect(Tok::RParen)?;
            inner.span = open.start..close.end;
            return Ok(inner);
        }

        let c = self.comparison()?;
        Ok(Expr {
            span: c.span.clone(),
            kind: ExprKind::Leaf(c),
        })
    }

    fn comparison(&mut self) -> Result<Comparison, UnsupportedQuery> {
        let (lhs, lspan) = match self.next()? {
            (Tok::Ident(s), span) => (s, span),
            (t, span) => {
                return Err(UnsupportedQuery::new(format!(
                    "expected identifier, found {:?} at {}",
                    t, span.start
                )))
            }
        };

        let (op_tok, op_span) = self.next()?;

        if op_tok == Tok::In {
            self.expect(Tok::LParen)?;
            let mut items = vec![];
            loop {
                match self.next()? {
                    (Tok::Str(s), _) => items.push(s),
                    (t, span) => {
                        return Err(UnsupportedQuery::new(format!(
                            "IN list only supports string literals, found {:?} at {}",
                            t, span.start
                        )))
                    }
                }
                let (t, span) = self.next()?;
                match t {
                    Tok::Comma => continue,
                    Tok::RParen => {
                        return Ok(Comparison {
                            lhs,
                            op: CompareOp::In,
                            rhs: Operand::List(items),
                            span: lspan.start..span.end,
                        })
                    }
                    t => {
                        return Err(UnsupportedQuery::new(format!(
                            "expected ',' or ')', found {:?} at {}",
                            t, span.start
                        )))
                    }
                }
            }
        }

        let op = match op_tok {
            Tok::Op(op) => op,
            t => {
                return Err(UnsupportedQuery::new(format!(
                    "expected comparison operator, found {:?} at {}",
                    t, op_span.start
                )))
            }
        };

        let (rhs, rspan) = match self.next()? {
            (Tok::Str(s), span) => (Operand::Str(s), span),
            (Tok::Number(n), span) => (Operand::Number(n), span),
            (Tok::Regex(r), span) => (Operand::Regex(r), span),
            (Tok::Ident(i), span) => match i.to_ascii_lowercase().as_str() {
                "true" => (Operand::Bool(true), span),
                "false" => (Operand::Bool(false), span),
                _ => (Operand::Ident(i), span),
            },
            (t, span) => {
                return Err(UnsupportedQuery::new(format!(
                    "expected literal, found {:?} at {}",
                    t, span.start
                )))
            }
        };

        Ok(Comparison {
            lhs,
            op,
            rhs,
            span: lspan.start..rspan.end,
        })
    }
}

/// Parse a WHERE clause. `base` is the offset of `src` in the full query, added to every span.
pub fn parse_expr(src: &str, base: usize) -> Result<Expr, UnsupportedQuery> {
    let toks = lex(src, base)?;
    if toks.is_empty() {
        return Err(UnsupportedQuery::new("empty WHERE clause"));
    }

    let mut p = Parser { toks, pos: 0 };
    let expr = p.or_expr()?;

    if let Some((t, span)) = p.toks.get(p.pos) {
        return Err(UnsupportedQuery::new(format!(
            "unexpected {:?} at {}",
            t, span.start
        )));
    }

    Ok(expr)
}
