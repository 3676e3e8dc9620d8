// /////////////////////////////////////////////////////////////////////////////
// Durable Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Expression Evaluator
//!
//! A small pure language for pulling values out of the planning context
//! (`trigger`, `stages`, and, during scatter planning, `item`): dotted
//! paths, bracket indexing, wildcard projection, boolean combinators,
//! comparisons, and a ternary. See §4.3.
//!
//! `Expression::compile` parses a source string once into an AST;
//! [`CompiledExpression::eval`] is then pure and side-effect free. Callers
//! that evaluate the same source repeatedly (every scatter element, every
//! retry of a `when` check) should compile once and reuse the result —
//! `services::expression::ExpressionCache` does this for the orchestrator.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{OrchestratorError, Result};
use crate::value_objects::{CompareOp, Value};

/// A parsed, reusable expression.
#[derive(Debug, Clone)]
pub struct CompiledExpression {
    source: String,
    ast: Expr,
}

impl CompiledExpression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn eval(&self, context: &Value) -> Value {
        eval_expr(&self.ast, context)
    }

    /// Convenience for `when`/scatter-condition callers: truthiness per
    /// `Value::is_truthy`.
    pub fn eval_bool(&self, context: &Value) -> bool {
        self.eval(context).is_truthy()
    }
}

/// Namespace for the free functions that make up the evaluator's public
/// surface; kept as a unit struct so call sites read `Expression::compile`
/// rather than a bare free function, matching the factory-style naming
/// used elsewhere in the domain (`ActorFactory`, `StageExecutor`).
pub struct Expression;

impl Expression {
    pub fn compile(source: &str) -> Result<CompiledExpression> {
        let ast = parse(source)?;
        Ok(CompiledExpression { source: source.to_string(), ast })
    }
}

/// Parses and evaluates in one step; prefer [`Expression::compile`] plus a
/// cache when the same source is evaluated more than once.
pub fn eval_once(source: &str, context: &Value) -> Result<Value> {
    Ok(Expression::compile(source)?.eval(context))
}

/// Caches compiled expressions by source text so the planner never
/// re-parses the same `when`/`input`/`groupBy` string for every task.
#[derive(Default)]
pub struct ExpressionCache {
    entries: RwLock<HashMap<String, CompiledExpression>>,
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(&self, source: &str) -> Result<CompiledExpression> {
        if let Some(hit) = self.entries.read().unwrap().get(source) {
            return Ok(hit.clone());
        }
        let compiled = Expression::compile(source)?;
        self.entries.write().unwrap().insert(source.to_string(), compiled.clone());
        Ok(compiled)
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Path(Vec<PathSegment>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone)]
enum PathSegment {
    Field(String),
    Index(usize),
    Key(String),
    Wildcard,
}

fn eval_expr(expr: &Expr, context: &Value) -> Value {
    match expr {
        Expr::Literal(v) => v.clone(),
        Expr::Path(segments) => eval_path(segments, context),
        Expr::Not(inner) => Value::Bool(!eval_expr(inner, context).is_truthy()),
        Expr::And(a, b) => Value::Bool(eval_expr(a, context).is_truthy() && eval_expr(b, context).is_truthy()),
        Expr::Or(a, b) => Value::Bool(eval_expr(a, context).is_truthy() || eval_expr(b, context).is_truthy()),
        Expr::Compare(op, a, b) => Value::Bool(eval_expr(a, context).compare(*op, &eval_expr(b, context))),
        Expr::Ternary(cond, then_branch, else_branch) => {
            if eval_expr(cond, context).is_truthy() {
                eval_expr(then_branch, context)
            } else {
                eval_expr(else_branch, context)
            }
        }
    }
}

/// Walks `segments` against `root`. A missing field, an out-of-range
/// index, or indexing into a non-container yields `Value::Null` rather
/// than an error — per §4.3, a missing path is simply empty.
///
/// A `Wildcard` segment projects the remaining path over every element of
/// the current list, flattening one level so `stages["detect"][*].pages`
/// reads naturally as "every page across every detect output".
fn eval_path(segments: &[PathSegment], root: &Value) -> Value {
    eval_path_on(segments, root)
}

fn eval_path_on(segments: &[PathSegment], current: &Value) -> Value {
    let Some((head, rest)) = segments.split_first() else {
        return current.clone();
    };
    match head {
        PathSegment::Field(name) => match current.as_map().and_then(|m| m.get(name)) {
            Some(v) => eval_path_on(rest, v),
            None => Value::Null,
        },
        PathSegment::Key(key) => match current.as_map().and_then(|m| m.get(key)) {
            Some(v) => eval_path_on(rest, v),
            None => Value::Null,
        },
        PathSegment::Index(i) => match current.as_list().and_then(|l| l.get(*i)) {
            Some(v) => eval_path_on(rest, v),
            None => Value::Null,
        },
        PathSegment::Wildcard => match current.as_list() {
            Some(items) => {
                let projected: Vec<Value> = items
                    .iter()
                    .map(|item| eval_path_on(rest, item))
                    .flat_map(|v| match v {
                        Value::List(inner) if rest.iter().any(|s| matches!(s, PathSegment::Wildcard)) => inner,
                        other => vec![other],
                    })
                    .collect();
                Value::List(projected)
            }
            None => Value::Null,
        },
    }
}

// --- Parser -----------------------------------------------------------

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self { chars: source.chars().collect(), pos: 0, source }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.chars[self.pos..].iter().collect::<String>().starts_with(s)
    }

    fn consume(&mut self, s: &str) -> bool {
        self.skip_ws();
        if self.starts_with(s) {
            self.pos += s.chars().count();
            true
        } else {
            false
        }
    }

    fn err(&self, message: impl Into<String>) -> OrchestratorError {
        OrchestratorError::Expression(format!("{} (in `{}`)", message.into(), self.source))
    }

    fn parse_ternary(&mut self) -> Result<Expr> {
        let cond = self.parse_or()?;
        self.skip_ws();
        if self.consume("?") {
            let then_branch = self.parse_ternary()?;
            if !self.consume(":") {
                return Err(self.err("expected ':' in ternary expression"));
            }
            let else_branch = self.parse_ternary()?;
            Ok(Expr::Ternary(Box::new(cond), Box::new(then_branch), Box::new(else_branch)))
        } else {
            Ok(cond)
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.consume("||") {
                let rhs = self.parse_and()?;
                lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_not()?;
        loop {
            self.skip_ws();
            if self.consume("&&") {
                let rhs = self.parse_not()?;
                lhs = Expr::And(Box::new(lhs), Box::new(rhs));
            } else {
                break;
            }
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        self.skip_ws();
        if self.consume("!") {
            let inner = self.parse_not()?;
            Ok(Expr::Not(Box::new(inner)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_primary()?;
        self.skip_ws();
        let op = if self.consume("==") {
            Some(CompareOp::Eq)
        } else if self.consume("!=") {
            Some(CompareOp::Ne)
        } else if self.consume("<=") {
            Some(CompareOp::Le)
        } else if self.consume(">=") {
            Some(CompareOp::Ge)
        } else if self.consume("<") {
            Some(CompareOp::Lt)
        } else if self.consume(">") {
            Some(CompareOp::Gt)
        } else {
            None
        };
        match op {
            Some(op) => {
                let rhs = self.parse_primary()?;
                Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
            }
            None => Ok(lhs),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let inner = self.parse_ternary()?;
                self.skip_ws();
                if !self.consume(")") {
                    return Err(self.err("expected ')'"));
                }
                Ok(inner)
            }
            Some('`') => self.parse_literal(),
            Some(c) if c.is_alphabetic() || c == '_' => self.parse_path(),
            other => Err(self.err(format!("unexpected token near {other:?}"))),
        }
    }

    fn parse_literal(&mut self) -> Result<Expr> {
        self.pos += 1; // opening backtick
        let start = self.pos;
        while self.peek().is_some_and(|c| c != '`') {
            self.pos += 1;
        }
        if self.peek() != Some('`') {
            return Err(self.err("unterminated literal"));
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        self.pos += 1; // closing backtick
        let json: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| self.err(format!("invalid literal `{raw}`: {e}")))?;
        Ok(Expr::Literal(Value::from_json(json)))
    }

    fn parse_path(&mut self) -> Result<Expr> {
        let mut segments = Vec::new();
        segments.push(PathSegment::Field(self.parse_ident()));
        loop {
            match self.peek() {
                Some('.') => {
                    self.pos += 1;
                    segments.push(PathSegment::Field(self.parse_ident()));
                }
                Some('[') => {
                    self.pos += 1;
                    self.skip_ws();
                    if self.peek() == Some('*') {
                        self.pos += 1;
                        segments.push(PathSegment::Wildcard);
                    } else if self.peek() == Some('"') {
                        self.pos += 1;
                        let start = self.pos;
                        while self.peek().is_some_and(|c| c != '"') {
                            self.pos += 1;
                        }
                        let key: String = self.chars[start..self.pos].iter().collect();
                        self.pos += 1;
                        segments.push(PathSegment::Key(key));
                    } else {
                        let start = self.pos;
                        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                            self.pos += 1;
                        }
                        let digits: String = self.chars[start..self.pos].iter().collect();
                        let index: usize = digits.parse().map_err(|_| self.err("expected index or \"key\" or *"))?;
                        segments.push(PathSegment::Index(index));
                    }
                    self.skip_ws();
                    if !self.consume("]") {
                        return Err(self.err("expected ']'"));
                    }
                }
                _ => break,
            }
        }
        Ok(Expr::Path(segments))
    }

    fn parse_ident(&mut self) -> String {
        self.skip_ws();
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }
}

fn parse(source: &str) -> Result<Expr> {
    let mut parser = Parser::new(source);
    let expr = parser.parse_ternary()?;
    parser.skip_ws();
    if parser.pos != parser.chars.len() {
        return Err(parser.err("trailing input after expression"));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        Value::from_json(json!({
            "trigger": {"documents": ["a.pdf", "b.pdf"]},
            "stages": {
                "detect": [
                    {"pages": [1, 2]},
                    {"pages": [3]}
                ]
            },
            "item": "a.pdf"
        }))
    }

    #[test]
    fn dotted_path_resolves() {
        let expr = Expression::compile("trigger.documents").unwrap();
        assert_eq!(expr.eval(&ctx()), Value::List(vec![Value::String("a.pdf".into()), Value::String("b.pdf".into())]));
    }

    #[test]
    fn bracket_index_and_key_resolve() {
        let expr = Expression::compile(r#"stages["detect"][0]"#).unwrap();
        let result = expr.eval(&ctx());
        assert_eq!(result.as_map().unwrap().get("pages").unwrap().as_list().unwrap().len(), 2);
    }

    #[test]
    fn wildcard_projects_and_flattens() {
        let expr = Expression::compile(r#"stages["detect"][*].pages[*]"#).unwrap();
        let result = expr.eval(&ctx());
        assert_eq!(result, Value::List(vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]));
    }

    #[test]
    fn missing_path_is_null() {
        let expr = Expression::compile("trigger.nonexistent").unwrap();
        assert_eq!(expr.eval(&ctx()), Value::Null);
    }

    #[test]
    fn comparisons_and_combinators() {
        let expr = Expression::compile(r#"item == `"a.pdf"` && `true`"#).unwrap();
        assert!(expr.eval_bool(&ctx()));
    }

    #[test]
    fn ternary_selects_branch() {
        let expr = Expression::compile(r#"item == `"a.pdf"` ? `"match"` : `"no-match"`"#).unwrap();
        assert_eq!(expr.eval(&ctx()), Value::String("match".to_string()));
    }

    #[test]
    fn incompatible_comparison_is_false() {
        let expr = Expression::compile("item == `42`").unwrap();
        assert!(!expr.eval_bool(&ctx()));
    }
}
