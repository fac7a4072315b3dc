// SPDX-License-Identifier: MIT OR Apache-2.0
//! Restricted verification-expression language.
//!
//! Chain verification expressions are evaluated over exactly three roots:
//! `context`, `source`, and `dest`. The language is a bounded interpreter
//! over a small AST, comparisons, boolean combinators, membership, dotted
//! attribute access, and literals. There is no call syntax, no indexing,
//! and no clock: evaluation runs under a deterministic node budget, so a
//! hostile contract can neither escape nor stall the pipeline.
//!
//! Expressions are parsed at contract-load time; anything outside the
//! grammar is rejected before it can ever run.

use serde_json::Value;
use std::fmt;

/// Evaluation step budget. Generous for real contracts, tiny for attacks.
const NODE_BUDGET: u32 = 4096;

/// Errors from parsing or evaluating an expression.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExprError {
    /// The expression is not in the restricted grammar.
    #[error("parse error: {0}")]
    Parse(String),
    /// An identifier other than `context`/`source`/`dest` was used.
    #[error("unknown root '{0}' (only context, source, dest are in scope)")]
    UnknownRoot(String),
    /// Operands had incompatible types for the operator.
    #[error("type error: {0}")]
    Type(String),
    /// The evaluation budget was exhausted.
    #[error("expression exceeded the evaluation budget")]
    BudgetExhausted,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
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
    /// `in` (membership in a list, or substring of a string)
    In,
}

/// The three value roots in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Root {
    /// The whole workflow context.
    Context,
    /// The chain's resolved source value.
    Source,
    /// The chain's resolved destination value.
    Dest,
}

/// An operand: a literal or a dotted path from a root.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Literal value (string, number, bool).
    Lit(Value),
    /// `root(.segment)*` attribute access.
    Path {
        /// Which root the path starts from.
        root: Root,
        /// Dotted segments below the root (possibly empty).
        segments: Vec<String>,
    },
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical or.
    Or(Box<Expr>, Box<Expr>),
    /// Logical and.
    And(Box<Expr>, Box<Expr>),
    /// Logical negation.
    Not(Box<Expr>),
    /// Binary comparison.
    Cmp {
        /// Operator.
        op: CmpOp,
        /// Left operand.
        lhs: Operand,
        /// Right operand.
        rhs: Operand,
    },
    /// Bare operand, evaluated for truthiness.
    Truthy(Operand),
}

impl Expr {
    /// Parse an expression, rejecting anything outside the grammar.
    pub fn parse(text: &str) -> Result<Self, ExprError> {
        let tokens = lex(text)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(ExprError::Parse(format!(
                "unexpected trailing input at token {}",
                parser.pos
            )));
        }
        Ok(expr)
    }

    /// Evaluate against the three roots under the node budget.
    pub fn eval(&self, context: &Value, source: &Value, dest: &Value) -> Result<bool, ExprError> {
        let mut budget = NODE_BUDGET;
        self.eval_inner(context, source, dest, &mut budget)
    }

    fn eval_inner(
        &self,
        context: &Value,
        source: &Value,
        dest: &Value,
        budget: &mut u32,
    ) -> Result<bool, ExprError> {
        spend(budget)?;
        match self {
            Self::Or(lhs, rhs) => Ok(lhs.eval_inner(context, source, dest, budget)?
                || rhs.eval_inner(context, source, dest, budget)?),
            Self::And(lhs, rhs) => Ok(lhs.eval_inner(context, source, dest, budget)?
                && rhs.eval_inner(context, source, dest, budget)?),
            Self::Not(inner) => Ok(!inner.eval_inner(context, source, dest, budget)?),
            Self::Cmp { op, lhs, rhs } => {
                let left = resolve(lhs, context, source, dest, budget)?;
                let right = resolve(rhs, context, source, dest, budget)?;
                compare(*op, &left, &right)
            }
            Self::Truthy(operand) => {
                let value = resolve(operand, context, source, dest, budget)?;
                Ok(truthy(&value))
            }
        }
    }
}

fn spend(budget: &mut u32) -> Result<(), ExprError> {
    if *budget == 0 {
        return Err(ExprError::BudgetExhausted);
    }
    *budget -= 1;
    Ok(())
}

fn resolve(
    operand: &Operand,
    context: &Value,
    source: &Value,
    dest: &Value,
    budget: &mut u32,
) -> Result<Value, ExprError> {
    spend(budget)?;
    match operand {
        Operand::Lit(value) => Ok(value.clone()),
        Operand::Path { root, segments } => {
            let mut current = match root {
                Root::Context => context,
                Root::Source => source,
                Root::Dest => dest,
            };
            for segment in segments {
                spend(budget)?;
                current = match current.as_object().and_then(|o| o.get(segment)) {
                    Some(value) => value,
                    None => return Ok(Value::Null),
                };
            }
            Ok(current.clone())
        }
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ExprError> {
    match op {
        CmpOp::Eq => Ok(left == right),
        CmpOp::Ne => Ok(left != right),
        CmpOp::In => match right {
            Value::Array(items) => Ok(items.contains(left)),
            Value::String(haystack) => match left {
                Value::String(needle) => Ok(haystack.contains(needle.as_str())),
                other => Err(ExprError::Type(format!(
                    "'in' over a string needs a string needle, got {other}"
                ))),
            },
            other => Err(ExprError::Type(format!(
                "'in' needs a list or string on the right, got {other}"
            ))),
        },
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
            let ordering = if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
                a.partial_cmp(&b)
            } else if let (Value::String(a), Value::String(b)) = (left, right) {
                Some(a.cmp(b))
            } else {
                None
            };
            let Some(ordering) = ordering else {
                return Err(ExprError::Type(format!(
                    "cannot order {left} against {right}"
                )));
            };
            Ok(match op {
                CmpOp::Lt => ordering == std::cmp::Ordering::Less,
                CmpOp::Le => ordering != std::cmp::Ordering::Greater,
                CmpOp::Gt => ordering == std::cmp::Ordering::Greater,
                CmpOp::Ge => ordering != std::cmp::Ordering::Less,
                _ => false,
            })
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Int(i64),
    Bool(bool),
    And,
    Or,
    Not,
    In,
    Op(CmpOp),
    Dot,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{s}"),
            Token::Str(s) => write!(f, "'{s}'"),
            Token::Num(n) => write!(f, "{n}"),
            Token::Int(i) => write!(f, "{i}"),
            Token::Bool(b) => write!(f, "{b}"),
            Token::And => f.write_str("and"),
            Token::Or => f.write_str("or"),
            Token::Not => f.write_str("not"),
            Token::In => f.write_str("in"),
            Token::Op(_) => f.write_str("<op>"),
            Token::Dot => f.write_str("."),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn lex(text: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
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
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(ExprError::Parse("unterminated string literal".into()));
                }
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Eq));
                    i += 2;
                } else {
                    return Err(ExprError::Parse("single '=' is not an operator".into()));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Ne));
                    i += 2;
                } else {
                    return Err(ExprError::Parse("'!' is not an operator (use 'not')".into()));
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Le));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CmpOp::Lt));
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(CmpOp::Ge));
                    i += 2;
                } else {
                    tokens.push(Token::Op(CmpOp::Gt));
                    i += 1;
                }
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) =>
            {
                let start = i;
                let mut end = i + 1;
                let mut is_float = false;
                while end < chars.len()
                    && (chars[end].is_ascii_digit()
                        || (chars[end] == '.'
                            && chars.get(end + 1).is_some_and(char::is_ascii_digit)
                            && !is_float))
                {
                    if chars[end] == '.' {
                        is_float = true;
                    }
                    end += 1;
                }
                let literal: String = chars[start..end].iter().collect();
                if is_float {
                    let n = literal
                        .parse::<f64>()
                        .map_err(|_| ExprError::Parse(format!("bad number '{literal}'")))?;
                    tokens.push(Token::Num(n));
                } else {
                    let n = literal
                        .parse::<i64>()
                        .map_err(|_| ExprError::Parse(format!("bad number '{literal}'")))?;
                    tokens.push(Token::Int(n));
                }
                i = end;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                let mut end = i;
                while end < chars.len()
                    && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                {
                    end += 1;
                }
                let word: String = chars[start..end].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Ident(word),
                });
                i = end;
            }
            other => {
                return Err(ExprError::Parse(format!("unexpected character '{other}'")));
            }
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let rhs = self.parse_and()?;
            expr = Expr::Or(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let rhs = self.parse_not()?;
            expr = Expr::And(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let inner = self.parse_or()?;
            match self.next() {
                Some(Token::RParen) => return Ok(inner),
                _ => return Err(ExprError::Parse("expected ')'".into())),
            }
        }

        let lhs = self.parse_operand()?;
        let op = match self.peek() {
            Some(Token::Op(op)) => {
                let op = *op;
                self.next();
                op
            }
            Some(Token::In) => {
                self.next();
                CmpOp::In
            }
            _ => return Ok(Expr::Truthy(lhs)),
        };
        let rhs = self.parse_operand()?;
        Ok(Expr::Cmp { op, lhs, rhs })
    }

    fn parse_operand(&mut self) -> Result<Operand, ExprError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Operand::Lit(Value::String(s))),
            Some(Token::Int(i)) => Ok(Operand::Lit(Value::from(i))),
            Some(Token::Num(n)) => serde_json::Number::from_f64(n)
                .map(|n| Operand::Lit(Value::Number(n)))
                .ok_or_else(|| ExprError::Parse(format!("non-finite number {n}"))),
            Some(Token::Bool(b)) => Ok(Operand::Lit(Value::Bool(b))),
            Some(Token::Ident(root)) => {
                let root = match root.as_str() {
                    "context" => Root::Context,
                    "source" => Root::Source,
                    "dest" => Root::Dest,
                    other => return Err(ExprError::UnknownRoot(other.to_string())),
                };
                let mut segments = Vec::new();
                while self.peek() == Some(&Token::Dot) {
                    self.next();
                    match self.next() {
                        Some(Token::Ident(segment)) => segments.push(segment),
                        Some(other) => {
                            return Err(ExprError::Parse(format!(
                                "expected attribute name after '.', got {other}"
                            )))
                        }
                        None => {
                            return Err(ExprError::Parse(
                                "expected attribute name after '.'".into(),
                            ))
                        }
                    }
                }
                Ok(Operand::Path { root, segments })
            }
            Some(other) => Err(ExprError::Parse(format!("unexpected token {other}"))),
            None => Err(ExprError::Parse("unexpected end of expression".into())),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(text: &str, context: Value, source: Value, dest: Value) -> Result<bool, ExprError> {
        Expr::parse(text).unwrap().eval(&context, &source, &dest)
    }

    #[test]
    fn equality_over_roots() {
        assert_eq!(
            eval("source == dest", json!({}), json!("web"), json!("web")),
            Ok(true)
        );
        assert_eq!(
            eval("source != dest", json!({}), json!("web"), json!("api")),
            Ok(true)
        );
    }

    #[test]
    fn dotted_context_access() {
        let ctx = json!({"plan": {"score": 87}});
        assert_eq!(
            eval("context.plan.score >= 80", ctx.clone(), json!(null), json!(null)),
            Ok(true)
        );
        // Missing paths resolve to null, which never satisfies ordering.
        assert!(eval("context.plan.missing > 1", ctx, json!(null), json!(null)).is_err());
    }

    #[test]
    fn boolean_combinators_and_grouping() {
        assert_eq!(
            eval(
                "(source == 'a' or source == 'b') and not dest == ''",
                json!({}),
                json!("b"),
                json!("x")
            ),
            Ok(true)
        );
    }

    #[test]
    fn membership() {
        assert_eq!(
            eval("source in context.allowed", json!({"allowed": ["web", "api"]}), json!("web"), json!(null)),
            Ok(true)
        );
        assert_eq!(
            eval("'ab' in source", json!({}), json!("drab text"), json!(null)),
            Ok(true)
        );
    }

    #[test]
    fn truthiness_of_bare_operands() {
        assert_eq!(eval("dest", json!({}), json!(null), json!("set")), Ok(true));
        assert_eq!(eval("dest", json!({}), json!(null), json!("")), Ok(false));
    }

    #[test]
    fn unknown_roots_are_rejected_at_parse_time() {
        assert_eq!(
            Expr::parse("payload == 1"),
            Err(ExprError::UnknownRoot("payload".to_string()))
        );
    }

    #[test]
    fn call_like_syntax_is_rejected() {
        assert!(Expr::parse("context.get('x')").is_err());
        assert!(Expr::parse("__import__('os')").is_err());
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(Expr::parse("source == dest extra").is_err());
    }

    #[test]
    fn ordering_type_mismatch_is_an_error() {
        assert!(matches!(
            eval("source > dest", json!({}), json!("a"), json!(1)),
            Err(ExprError::Type(_))
        ));
    }
}
