// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Restricted expression evaluator.
//!
//! The only scripting surface the daemon exposes. Supports arithmetic,
//! comparison, boolean operators, member access, list/map literals, and a
//! closed set of safe built-ins. No host filesystem or network access; an
//! operation budget bounds evaluation. Implicit numeric/string coercion is
//! allowed here and nowhere else.
//!
//! Grammar (Pratt, lowest to highest binding):
//!
//! ```text
//! expr    := or
//! or      := and ("||" and)*
//! and     := cmp ("&&" cmp)*
//! cmp     := add (("=="|"!="|"<"|"<="|">"|">=") add)?
//! add     := mul (("+"|"-") mul)*
//! mul     := unary (("*"|"/"|"%") unary)*
//! unary   := ("!"|"-") unary | postfix
//! postfix := primary ("." ident | "[" expr "]")*
//! primary := literal | ident | call | "(" expr ")" | list | map
//! ```
//!
//! A leading `return` keyword is accepted and ignored so `script` bodies
//! read naturally.

use gaffer_core::Value;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Resolves root identifiers (parameters, variables, `nodes`, loop locals).
pub trait Resolver {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl Resolver for BTreeMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Evaluation budget: a hard operation count plus a wall-clock deadline.
pub struct EvalBudget {
    ops: Cell<u64>,
    deadline: Option<Instant>,
}

impl EvalBudget {
    /// Default budget: generous for config-sized expressions, tight enough
    /// to stop runaway nesting.
    pub fn standard() -> Self {
        Self { ops: Cell::new(100_000), deadline: Some(Instant::now() + Duration::from_millis(250)) }
    }

    pub fn with_ops(ops: u64) -> Self {
        Self { ops: Cell::new(ops), deadline: None }
    }

    fn spend(&self) -> Result<(), ExprError> {
        let left = self.ops.get();
        if left == 0 {
            return Err(ExprError::BudgetExhausted);
        }
        self.ops.set(left - 1);
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(ExprError::BudgetExhausted);
            }
        }
        Ok(())
    }
}

/// Expression failures. Engine maps these to `node.expression_error`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExprError {
    #[error("syntax error at byte {pos}: {message}")]
    Syntax { pos: usize, message: String },

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("evaluation budget exhausted")]
    BudgetExhausted,
}

/// Parse and evaluate `source` against `resolver`.
pub fn evaluate(
    source: &str,
    resolver: &dyn Resolver,
    budget: &EvalBudget,
) -> Result<Value, ExprError> {
    let tokens = lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    // Optional leading `return`.
    if matches!(parser.peek(), Some(Token::Ident(word)) if word == "return") {
        parser.pos += 1;
    }
    let expr = parser.parse_expr(0)?;
    if let Some(tok) = parser.peek() {
        return Err(ExprError::Syntax {
            pos: parser.pos,
            message: format!("unexpected trailing token {tok:?}"),
        });
    }
    eval(&expr, resolver, budget)
}

// ---------------------------------------------------------------- lexer

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    // Punctuation and operators
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
}

fn lex(source: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '=' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(ExprError::Syntax { pos: i, message: "'=' is not assignment; use '=='".into() });
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&b'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '&' => {
                if bytes.get(i + 1) == Some(&b'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(ExprError::Syntax { pos: i, message: "expected '&&'".into() });
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&b'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(ExprError::Syntax { pos: i, message: "expected '||'".into() });
                }
            }
            '\'' | '"' => {
                // Find the unescaped closing quote. Quote and backslash are
                // ASCII, so a byte scan is UTF-8 safe.
                let quote = bytes[i];
                let mut j = i + 1;
                loop {
                    match bytes.get(j) {
                        None => {
                            return Err(ExprError::Syntax {
                                pos: i,
                                message: "unterminated string".into(),
                            })
                        }
                        Some(&b) if b == quote => break,
                        Some(&b'\\') => {
                            if bytes.get(j + 1).is_none() {
                                return Err(ExprError::Syntax {
                                    pos: j,
                                    message: "dangling escape".into(),
                                });
                            }
                            j += 2;
                        }
                        Some(_) => j += 1,
                    }
                }
                let mut text = String::new();
                let mut chars = source[i + 1..j].chars();
                while let Some(ch) = chars.next() {
                    if ch != '\\' {
                        text.push(ch);
                        continue;
                    }
                    match chars.next() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some(other) => text.push(other),
                        None => {}
                    }
                }
                tokens.push(Token::Str(text));
                i = j + 1;
            }
            '0'..='9' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    // A dot followed by a non-digit is member access, not a decimal.
                    if bytes[i] == b'.' && !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) {
                        break;
                    }
                    i += 1;
                }
                let text = &source[start..i];
                let n: f64 = text.parse().map_err(|_| ExprError::Syntax {
                    pos: start,
                    message: format!("bad number '{text}'"),
                })?;
                tokens.push(Token::Number(n));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(source[start..i].to_string()));
            }
            other => {
                return Err(ExprError::Syntax {
                    pos: i,
                    message: format!("unexpected character '{other}'"),
                })
            }
        }
    }
    Ok(tokens)
}

// --------------------------------------------------------------- parser

#[derive(Debug, Clone)]
enum Expr {
    Lit(Value),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    ListLit(Vec<Expr>),
    MapLit(Vec<(String, Expr)>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

fn binding_power(token: &Token) -> Option<(BinOp, u8)> {
    Some(match token {
        Token::OrOr => (BinOp::Or, 1),
        Token::AndAnd => (BinOp::And, 2),
        Token::EqEq => (BinOp::Eq, 3),
        Token::NotEq => (BinOp::Ne, 3),
        Token::Lt => (BinOp::Lt, 3),
        Token::Le => (BinOp::Le, 3),
        Token::Gt => (BinOp::Gt, 3),
        Token::Ge => (BinOp::Ge, 3),
        Token::Plus => (BinOp::Add, 4),
        Token::Minus => (BinOp::Sub, 4),
        Token::Star => (BinOp::Mul, 5),
        Token::Slash => (BinOp::Div, 5),
        Token::Percent => (BinOp::Rem, 5),
        _ => return None,
    })
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
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, token: Token) -> Result<(), ExprError> {
        match self.next() {
            Some(ref t) if *t == token => Ok(()),
            other => Err(ExprError::Syntax {
                pos: self.pos,
                message: format!("expected {token:?}, found {other:?}"),
            }),
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        while let Some(tok) = self.peek() {
            let Some((op, bp)) = binding_power(tok) else { break };
            if bp < min_bp {
                break;
            }
            self.pos += 1;
            let rhs = self.parse_expr(bp + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::Bang) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Ident(name)) => {
                            expr = Expr::Member(Box::new(expr), name);
                        }
                        Some(Token::Number(n)) if n.fract() == 0.0 => {
                            // list.0 style index
                            expr = Expr::Member(Box::new(expr), format!("{}", n as i64));
                        }
                        other => {
                            return Err(ExprError::Syntax {
                                pos: self.pos,
                                message: format!("expected member name, found {other:?}"),
                            })
                        }
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.parse_expr(0)?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Lit(Value::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Lit(Value::String(s))),
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Ok(Expr::Lit(Value::Bool(true))),
                "false" => Ok(Expr::Lit(Value::Bool(false))),
                "null" => Ok(Expr::Lit(Value::Null)),
                _ => {
                    if matches!(self.peek(), Some(Token::LParen)) {
                        self.pos += 1;
                        let mut args = Vec::new();
                        if !matches!(self.peek(), Some(Token::RParen)) {
                            loop {
                                args.push(self.parse_expr(0)?);
                                match self.peek() {
                                    Some(Token::Comma) => self.pos += 1,
                                    _ => break,
                                }
                            }
                        }
                        self.expect(Token::RParen)?;
                        Ok(Expr::Call(word, args))
                    } else {
                        Ok(Expr::Ident(word))
                    }
                }
            },
            Some(Token::LParen) => {
                let inner = self.parse_expr(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !matches!(self.peek(), Some(Token::RBracket)) {
                    loop {
                        items.push(self.parse_expr(0)?);
                        match self.peek() {
                            Some(Token::Comma) => self.pos += 1,
                            _ => break,
                        }
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::ListLit(items))
            }
            Some(Token::LBrace) => {
                let mut entries = Vec::new();
                if !matches!(self.peek(), Some(Token::RBrace)) {
                    loop {
                        let key = match self.next() {
                            Some(Token::Ident(name)) => name,
                            Some(Token::Str(s)) => s,
                            other => {
                                return Err(ExprError::Syntax {
                                    pos: self.pos,
                                    message: format!("expected map key, found {other:?}"),
                                })
                            }
                        };
                        self.expect(Token::Colon)?;
                        entries.push((key, self.parse_expr(0)?));
                        match self.peek() {
                            Some(Token::Comma) => self.pos += 1,
                            _ => break,
                        }
                    }
                }
                self.expect(Token::RBrace)?;
                Ok(Expr::MapLit(entries))
            }
            other => Err(ExprError::Syntax {
                pos: self.pos,
                message: format!("unexpected token {other:?}"),
            }),
        }
    }
}

// ------------------------------------------------------------ evaluator

fn eval(expr: &Expr, resolver: &dyn Resolver, budget: &EvalBudget) -> Result<Value, ExprError> {
    budget.spend()?;
    match expr {
        Expr::Lit(value) => Ok(value.clone()),
        Expr::Ident(name) => {
            resolver.lookup(name).ok_or_else(|| ExprError::UnknownIdentifier(name.clone()))
        }
        Expr::Member(base, key) => {
            let base = eval(base, resolver, budget)?;
            base.member(key)
                .cloned()
                .ok_or_else(|| ExprError::Type(format!("no member '{key}' on {}", base.type_name())))
        }
        Expr::Index(base, index) => {
            let base = eval(base, resolver, budget)?;
            let index = eval(index, resolver, budget)?;
            let key = index.coerce_string();
            base.member(&key)
                .cloned()
                .ok_or_else(|| ExprError::Type(format!("no element '{key}' in {}", base.type_name())))
        }
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, resolver, budget)?.is_truthy())),
        Expr::Neg(inner) => {
            let value = eval(inner, resolver, budget)?;
            let n = value
                .coerce_number()
                .ok_or_else(|| ExprError::Type(format!("cannot negate {}", value.type_name())))?;
            Ok(Value::Number(-n))
        }
        Expr::Binary(op, lhs, rhs) => eval_binary(*op, lhs, rhs, resolver, budget),
        Expr::Call(name, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, resolver, budget)?);
            }
            call_builtin(name, &values)
        }
        Expr::ListLit(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, resolver, budget)?);
            }
            Ok(Value::List(values))
        }
        Expr::MapLit(entries) => {
            let mut map = BTreeMap::new();
            for (key, value_expr) in entries {
                map.insert(key.clone(), eval(value_expr, resolver, budget)?);
            }
            Ok(Value::Map(map))
        }
    }
}

fn eval_binary(
    op: BinOp,
    lhs: &Expr,
    rhs: &Expr,
    resolver: &dyn Resolver,
    budget: &EvalBudget,
) -> Result<Value, ExprError> {
    // Short-circuit boolean operators.
    match op {
        BinOp::And => {
            let left = eval(lhs, resolver, budget)?;
            if !left.is_truthy() {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(eval(rhs, resolver, budget)?.is_truthy()));
        }
        BinOp::Or => {
            let left = eval(lhs, resolver, budget)?;
            if left.is_truthy() {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(eval(rhs, resolver, budget)?.is_truthy()));
        }
        _ => {}
    }

    let left = eval(lhs, resolver, budget)?;
    let right = eval(rhs, resolver, budget)?;
    match op {
        BinOp::Add => {
            // String concatenation wins when either side is a string.
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                return Ok(Value::String(format!(
                    "{}{}",
                    left.coerce_string(),
                    right.coerce_string()
                )));
            }
            arith(left, right, "+", |a, b| Ok(a + b))
        }
        BinOp::Sub => arith(left, right, "-", |a, b| Ok(a - b)),
        BinOp::Mul => arith(left, right, "*", |a, b| Ok(a * b)),
        BinOp::Div => arith(left, right, "/", |a, b| {
            if b == 0.0 {
                Err(ExprError::Type("division by zero".into()))
            } else {
                Ok(a / b)
            }
        }),
        BinOp::Rem => arith(left, right, "%", |a, b| {
            if b == 0.0 {
                Err(ExprError::Type("modulo by zero".into()))
            } else {
                Ok(a % b)
            }
        }),
        BinOp::Eq => Ok(Value::Bool(loose_eq(&left, &right))),
        BinOp::Ne => Ok(Value::Bool(!loose_eq(&left, &right))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = compare(&left, &right)?;
            let result = match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                BinOp::Ge => ordering.is_ge(),
                _ => unreachable!("comparison op"),
            };
            Ok(Value::Bool(result))
        }
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

fn arith(
    left: Value,
    right: Value,
    op: &str,
    f: impl Fn(f64, f64) -> Result<f64, ExprError>,
) -> Result<Value, ExprError> {
    let a = left
        .coerce_number()
        .ok_or_else(|| ExprError::Type(format!("'{op}' needs numbers, got {}", left.type_name())))?;
    let b = right.coerce_number().ok_or_else(|| {
        ExprError::Type(format!("'{op}' needs numbers, got {}", right.type_name()))
    })?;
    Ok(Value::Number(f(a, b)?))
}

/// Equality with expression-time coercion: numbers compare numerically even
/// against numeric strings; otherwise structural.
fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    if let (Some(a), Some(b)) = (left.coerce_number(), right.coerce_number()) {
        return a == b;
    }
    match (left, right) {
        (Value::String(_), _) | (_, Value::String(_)) => {
            left.coerce_string() == right.coerce_string()
        }
        _ => false,
    }
}

fn compare(left: &Value, right: &Value) -> Result<std::cmp::Ordering, ExprError> {
    if let (Some(a), Some(b)) = (left.coerce_number(), right.coerce_number()) {
        return a.partial_cmp(&b).ok_or_else(|| ExprError::Type("NaN comparison".into()));
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(ExprError::Type(format!(
            "cannot order {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn call_builtin(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    let arity = |n: usize| -> Result<(), ExprError> {
        if args.len() != n {
            return Err(ExprError::Type(format!("{name}() takes {n} argument(s), got {}", args.len())));
        }
        Ok(())
    };
    match name {
        "abs" => {
            arity(1)?;
            num_fn(name, &args[0], f64::abs)
        }
        "floor" => {
            arity(1)?;
            num_fn(name, &args[0], f64::floor)
        }
        "ceil" => {
            arity(1)?;
            num_fn(name, &args[0], f64::ceil)
        }
        "round" => {
            arity(1)?;
            num_fn(name, &args[0], f64::round)
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(ExprError::Type(format!("{name}() needs at least one argument")));
            }
            let mut best: Option<f64> = None;
            for arg in args {
                let n = arg.coerce_number().ok_or_else(|| {
                    ExprError::Type(format!("{name}() needs numbers, got {}", arg.type_name()))
                })?;
                best = Some(match best {
                    None => n,
                    Some(b) if name == "min" => b.min(n),
                    Some(b) => b.max(n),
                });
            }
            Ok(Value::Number(best.unwrap_or(0.0)))
        }
        "len" => {
            arity(1)?;
            let n = match &args[0] {
                Value::String(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(entries) => entries.len(),
                other => {
                    return Err(ExprError::Type(format!("len() of {}", other.type_name())))
                }
            };
            Ok(Value::Number(n as f64))
        }
        "upper" => {
            arity(1)?;
            Ok(Value::String(args[0].coerce_string().to_uppercase()))
        }
        "lower" => {
            arity(1)?;
            Ok(Value::String(args[0].coerce_string().to_lowercase()))
        }
        "trim" => {
            arity(1)?;
            Ok(Value::String(args[0].coerce_string().trim().to_string()))
        }
        "contains" => {
            arity(2)?;
            let found = match &args[0] {
                Value::List(items) => items.iter().any(|i| loose_eq(i, &args[1])),
                Value::Map(entries) => entries.contains_key(&args[1].coerce_string()),
                other => other.coerce_string().contains(&args[1].coerce_string()),
            };
            Ok(Value::Bool(found))
        }
        "starts_with" => {
            arity(2)?;
            Ok(Value::Bool(args[0].coerce_string().starts_with(&args[1].coerce_string())))
        }
        "ends_with" => {
            arity(2)?;
            Ok(Value::Bool(args[0].coerce_string().ends_with(&args[1].coerce_string())))
        }
        "replace" => {
            arity(3)?;
            Ok(Value::String(args[0].coerce_string().replace(
                &args[1].coerce_string(),
                &args[2].coerce_string(),
            )))
        }
        "split" => {
            arity(2)?;
            let parts = args[0]
                .coerce_string()
                .split(&args[1].coerce_string())
                .map(|p| Value::String(p.to_string()))
                .collect();
            Ok(Value::List(parts))
        }
        "join" => {
            arity(2)?;
            let items = args[0]
                .as_list()
                .ok_or_else(|| ExprError::Type("join() needs a list".into()))?;
            let sep = args[1].coerce_string();
            let joined =
                items.iter().map(Value::coerce_string).collect::<Vec<_>>().join(&sep);
            Ok(Value::String(joined))
        }
        "str" => {
            arity(1)?;
            Ok(Value::String(args[0].coerce_string()))
        }
        "num" => {
            arity(1)?;
            args[0]
                .coerce_number()
                .map(Value::Number)
                .ok_or_else(|| ExprError::Type(format!("num() of '{}'", args[0].coerce_string())))
        }
        "range" => {
            arity(1)?;
            let n = args[0]
                .coerce_number()
                .ok_or_else(|| ExprError::Type("range() needs a number".into()))?;
            if !(0.0..=1_000_000.0).contains(&n) {
                return Err(ExprError::Type("range() bound out of range".into()));
            }
            Ok(Value::List((0..n as i64).map(|i| Value::Number(i as f64)).collect()))
        }
        "keys" => {
            arity(1)?;
            let entries = args[0]
                .as_map()
                .ok_or_else(|| ExprError::Type("keys() needs a map".into()))?;
            Ok(Value::List(entries.keys().map(|k| Value::String(k.clone())).collect()))
        }
        "values" => {
            arity(1)?;
            let entries = args[0]
                .as_map()
                .ok_or_else(|| ExprError::Type("values() needs a map".into()))?;
            Ok(Value::List(entries.values().cloned().collect()))
        }
        "json_encode" => {
            arity(1)?;
            serde_json::to_string(&args[0].to_json())
                .map(Value::String)
                .map_err(|e| ExprError::Type(format!("json_encode: {e}")))
        }
        "json_decode" => {
            arity(1)?;
            let text = args[0].coerce_string();
            let json: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| ExprError::Type(format!("json_decode: {e}")))?;
            Ok(Value::from_json(&json))
        }
        "list" => Ok(Value::List(args.to_vec())),
        "object" => {
            if args.len() % 2 != 0 {
                return Err(ExprError::Type("object() needs key/value pairs".into()));
            }
            let mut map = BTreeMap::new();
            for pair in args.chunks(2) {
                map.insert(pair[0].coerce_string(), pair[1].clone());
            }
            Ok(Value::Map(map))
        }
        _ => Err(ExprError::UnknownFunction(name.to_string())),
    }
}

fn num_fn(name: &str, arg: &Value, f: impl Fn(f64) -> f64) -> Result<Value, ExprError> {
    arg.coerce_number()
        .map(|n| Value::Number(f(n)))
        .ok_or_else(|| ExprError::Type(format!("{name}() needs a number, got {}", arg.type_name())))
}

#[cfg(test)]
#[path = "expr_tests.rs"]
mod tests;
