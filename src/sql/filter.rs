//! Filter expressions for retrieve/update/delete.
//!
//! ```text
//! expr    := and ( OR and )*
//! and     := term ( AND term )*
//! term    := NOT term | '(' expr ')' | field op value
//!          | field IS [NOT] NULL | field [NOT] IN ( value, ... )
//! op      := = | != | <> | < | <= | > | >= | LIKE
//! value   := 'string' | number | true | false | null
//! ```
//!
//! Field names are resolved against the table descriptor when rendered; values are always
//! bound as parameters.

use super::{BindValue, QueryBuf};
use crate::config::TableDescriptor;
use crate::dialect::SqlDialect;
use crate::error::AppError;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl CompareOp {
    fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Like => "LIKE",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
    Compare { field: String, op: CompareOp, value: Value },
    IsNull { field: String, negated: bool },
    In { field: String, values: Vec<Value>, negated: bool },
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(String),
    Op(CompareOp),
    LParen,
    RParen,
    Comma,
}

fn invalid(msg: impl Into<String>) -> AppError {
    AppError::Validation(format!("invalid filter: {}", msg.into()))
}

fn tokenize(input: &str) -> Result<Vec<Token>, AppError> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                out.push(Token::LParen);
                i += 1;
            }
            ')' => {
                out.push(Token::RParen);
                i += 1;
            }
            ',' => {
                out.push(Token::Comma);
                i += 1;
            }
            '\'' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(invalid("unterminated string")),
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            s.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                out.push(Token::Str(s));
            }
            '=' => {
                out.push(Token::Op(CompareOp::Eq));
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                out.push(Token::Op(CompareOp::Ne));
                i += 2;
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    out.push(Token::Op(CompareOp::Le));
                    i += 2;
                }
                Some('>') => {
                    out.push(Token::Op(CompareOp::Ne));
                    i += 2;
                }
                _ => {
                    out.push(Token::Op(CompareOp::Lt));
                    i += 1;
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    out.push(Token::Op(CompareOp::Ge));
                    i += 2;
                } else {
                    out.push(Token::Op(CompareOp::Gt));
                    i += 1;
                }
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                out.push(Token::Num(chars[start..i].iter().collect()));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if word.eq_ignore_ascii_case("like") {
                    out.push(Token::Op(CompareOp::Like));
                } else {
                    out.push(Token::Ident(word));
                }
            }
            other => return Err(invalid(format!("unexpected character '{}'", other))),
        }
    }
    Ok(out)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn keyword(&mut self, kw: &str) -> bool {
        match self.peek() {
            Some(Token::Ident(w)) if w.eq_ignore_ascii_case(kw) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, t: Token) -> Result<(), AppError> {
        match self.next() {
            Some(ref got) if *got == t => Ok(()),
            got => Err(invalid(format!("expected {:?}, found {:?}", t, got))),
        }
    }

    fn expr(&mut self) -> Result<Filter, AppError> {
        let mut left = self.and()?;
        while self.keyword("or") {
            let right = self.and()?;
            left = Filter::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Filter, AppError> {
        let mut left = self.term()?;
        while self.keyword("and") {
            let right = self.term()?;
            left = Filter::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Filter, AppError> {
        if self.keyword("not") {
            return Ok(Filter::Not(Box::new(self.term()?)));
        }
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.expr()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }
        let field = match self.next() {
            Some(Token::Ident(name)) => name,
            other => return Err(invalid(format!("expected field name, found {:?}", other))),
        };
        if self.keyword("is") {
            let negated = self.keyword("not");
            if !self.keyword("null") {
                return Err(invalid("expected NULL after IS"));
            }
            return Ok(Filter::IsNull { field, negated });
        }
        let negated = self.keyword("not");
        if self.keyword("in") {
            self.expect(Token::LParen)?;
            let mut values = vec![self.value()?];
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                values.push(self.value()?);
            }
            self.expect(Token::RParen)?;
            return Ok(Filter::In { field, values, negated });
        }
        if negated {
            return Err(invalid("expected IN after NOT"));
        }
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            other => return Err(invalid(format!("expected operator after '{}', found {:?}", field, other))),
        };
        let value = self.value()?;
        match (op, &value) {
            (CompareOp::Eq, Value::Null) => Ok(Filter::IsNull { field, negated: false }),
            (CompareOp::Ne, Value::Null) => Ok(Filter::IsNull { field, negated: true }),
            (_, Value::Null) => Err(invalid(format!("operator {} cannot compare with null", op.as_sql()))),
            _ => Ok(Filter::Compare { field, op, value }),
        }
    }

    fn value(&mut self) -> Result<Value, AppError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Num(n)) => {
                if let Ok(i) = n.parse::<i64>() {
                    Ok(Value::from(i))
                } else {
                    n.parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .ok_or_else(|| invalid(format!("bad number '{}'", n)))
                }
            }
            Some(Token::Ident(w)) if w.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Some(Token::Ident(w)) if w.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            Some(Token::Ident(w)) if w.eq_ignore_ascii_case("null") => Ok(Value::Null),
            other => Err(invalid(format!("expected value, found {:?}", other))),
        }
    }
}

impl Filter {
    pub fn parse(input: &str) -> Result<Filter, AppError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(invalid("empty expression"));
        }
        let mut p = Parser { tokens, pos: 0 };
        let f = p.expr()?;
        if p.pos < p.tokens.len() {
            return Err(invalid(format!("unexpected {:?}", p.tokens[p.pos])));
        }
        Ok(f)
    }

    /// Render as a WHERE-clause body, pushing values onto `q`.
    pub fn render(&self, d: &dyn SqlDialect, table: &TableDescriptor, q: &mut QueryBuf) -> Result<String, AppError> {
        Ok(match self {
            Filter::And(a, b) => format!("({} AND {})", a.render(d, table, q)?, b.render(d, table, q)?),
            Filter::Or(a, b) => format!("({} OR {})", a.render(d, table, q)?, b.render(d, table, q)?),
            Filter::Not(inner) => format!("NOT ({})", inner.render(d, table, q)?),
            Filter::Compare { field, op, value } => {
                let f = table.resolve_field(field)?;
                let n = q.push_param(BindValue::from_json(value)?);
                let ph = if *op == CompareOp::Like {
                    d.placeholder(n)
                } else {
                    d.bind_placeholder(n, Some(f))
                };
                format!("{} {} {}", d.quote_ident(&f.name), op.as_sql(), ph)
            }
            Filter::IsNull { field, negated } => {
                let f = table.resolve_field(field)?;
                let not = if *negated { " NOT" } else { "" };
                format!("{} IS{} NULL", d.quote_ident(&f.name), not)
            }
            Filter::In { field, values, negated } => {
                let f = table.resolve_field(field)?;
                let mut phs = Vec::with_capacity(values.len());
                for v in values {
                    let n = q.push_param(BindValue::from_json(v)?);
                    phs.push(d.bind_placeholder(n, Some(f)));
                }
                let not = if *negated { " NOT" } else { "" };
                format!("{}{} IN ({})", d.quote_ident(&f.name), not, phs.join(", "))
            }
        })
    }
}

/// `field [ASC|DESC], ...` → `(field, descending)` pairs; field names are resolved by the caller.
pub fn parse_order(spec: &str) -> Result<Vec<(String, bool)>, AppError> {
    let mut out = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let mut words = part.split_whitespace();
        let field = words.next().unwrap_or_default().to_string();
        let desc = match words.next() {
            None => false,
            Some(w) if w.eq_ignore_ascii_case("asc") => false,
            Some(w) if w.eq_ignore_ascii_case("desc") => true,
            Some(w) => return Err(AppError::Validation(format!("invalid order direction '{}'", w))),
        };
        if words.next().is_some() {
            return Err(AppError::Validation(format!("invalid order clause '{}'", part)));
        }
        out.push((field, desc));
    }
    Ok(out)
}
