//! Boolean logic expressions
//!
//! Readonly, display and mandatory rules are written as small boolean
//! expressions over field values, e.g. `@Qty@>10 & @IsSOTrx@='Y'`.
//!
//! ```text
//! expr     := term (('&' | '|') term)*        evaluated left to right
//! term     := 'true' | 'false' | '(' expr ')' | operand (op operand)?
//! operand  := '@' Name '@' | 'text' | "text" | number | word
//! op       := '=' | '!' | '!=' | '<' | '>' | '<=' | '>='
//! ```
//!
//! `!` on its own means "not equal". A bare `@Name@` term is true when the
//! value is truthy (see [`Value::is_truthy`]).

use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, StateError};
use crate::types::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Field(String),
    Text(String),
    Number(f64),
}

#[derive(Clone, Debug, PartialEq)]
enum LogicNode {
    Constant(bool),
    Truthy(Operand),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    And(Box<LogicNode>, Box<LogicNode>),
    Or(Box<LogicNode>, Box<LogicNode>),
}

/// A parsed logic expression
#[derive(Clone, Debug, PartialEq)]
pub struct LogicExpression {
    source: String,
    node: LogicNode,
    parameters: Vec<String>,
}

impl LogicExpression {
    pub fn constant(value: bool) -> Self {
        Self {
            source: value.to_string(),
            node: LogicNode::Constant(value),
            parameters: Vec::new(),
        }
    }

    /// Parse an expression; malformed input is a configuration error
    pub fn parse(source: &str) -> Result<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(StateError::configuration("empty logic expression"));
        }

        let tokens = tokenize(trimmed)?;
        let mut parser = Parser { tokens, pos: 0 };
        let node = parser.parse_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(StateError::configuration(format!(
                "unexpected trailing input in logic expression '{}'",
                trimmed
            )));
        }

        let mut parameters = Vec::new();
        collect_parameters(&node, &mut parameters);

        Ok(Self {
            source: trimmed.to_string(),
            node,
            parameters,
        })
    }

    /// Field names referenced by this expression, in first-seen order
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn constant_value(&self) -> Option<bool> {
        match self.node {
            LogicNode::Constant(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for LogicExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for LogicExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

fn collect_parameters(node: &LogicNode, out: &mut Vec<String>) {
    match node {
        LogicNode::Constant(_) => {}
        LogicNode::Truthy(operand) => push_parameter(operand, out),
        LogicNode::Compare { left, right, .. } => {
            push_parameter(left, out);
            push_parameter(right, out);
        }
        LogicNode::And(a, b) | LogicNode::Or(a, b) => {
            collect_parameters(a, out);
            collect_parameters(b, out);
        }
    }
}

fn push_parameter(operand: &Operand, out: &mut Vec<String>) {
    if let Operand::Field(name) = operand {
        if !out.contains(name) {
            out.push(name.clone());
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Field(String),
    Text(String),
    Number(f64),
    Word(String),
    Op(CompareOp),
    And,
    Or,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            c if c.is_whitespace() => i += 1,
            '@' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&c| c == '@')
                    .map(|p| i + 1 + p)
                    .ok_or_else(|| {
                        StateError::configuration(format!("unterminated parameter in '{}'", input))
                    })?;
                let name: String = chars[i + 1..end].iter().collect();
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(StateError::configuration(format!(
                        "empty parameter name in '{}'",
                        input
                    )));
                }
                tokens.push(Token::Field(name));
                i = end + 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&c| c == ch)
                    .map(|p| i + 1 + p)
                    .ok_or_else(|| {
                        StateError::configuration(format!("unterminated string in '{}'", input))
                    })?;
                tokens.push(Token::Text(chars[i + 1..end].iter().collect()));
                i = end + 1;
            }
            '&' => {
                tokens.push(Token::And);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Or);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Op(CompareOp::Eq));
                i += 1;
            }
            '!' => {
                // "!" and "!=" are both "not equal"
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
                tokens.push(Token::Op(CompareOp::Ne));
            }
            '<' | '>' => {
                let or_equal = chars.get(i + 1) == Some(&'=');
                let op = match (ch, or_equal) {
                    ('<', false) => CompareOp::Lt,
                    ('<', true) => CompareOp::Le,
                    ('>', false) => CompareOp::Gt,
                    _ => CompareOp::Ge,
                };
                tokens.push(Token::Op(op));
                i += if or_equal { 2 } else { 1 };
            }
            _ => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                if start == i {
                    return Err(StateError::configuration(format!(
                        "unexpected character '{}' in '{}'",
                        ch, input
                    )));
                }
                let word: String = chars[start..i].iter().collect();
                match word.parse::<f64>() {
                    Ok(n) => tokens.push(Token::Number(n)),
                    Err(_) => tokens.push(Token::Word(word)),
                }
            }
        }
    }

    Ok(tokens)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.' || c == '-'
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
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_expr(&mut self) -> Result<LogicNode> {
        let mut node = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::And) => {
                    self.pos += 1;
                    let rhs = self.parse_term()?;
                    node = LogicNode::And(Box::new(node), Box::new(rhs));
                }
                Some(Token::Or) => {
                    self.pos += 1;
                    let rhs = self.parse_term()?;
                    node = LogicNode::Or(Box::new(node), Box::new(rhs));
                }
                _ => return Ok(node),
            }
        }
    }

    fn parse_term(&mut self) -> Result<LogicNode> {
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(StateError::configuration("missing closing parenthesis")),
                }
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("true") => {
                self.pos += 1;
                Ok(LogicNode::Constant(true))
            }
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("false") => {
                self.pos += 1;
                Ok(LogicNode::Constant(false))
            }
            _ => {
                let left = self.parse_operand()?;
                if let Some(Token::Op(op)) = self.peek() {
                    let op = *op;
                    self.pos += 1;
                    let right = self.parse_operand()?;
                    Ok(LogicNode::Compare { left, op, right })
                } else {
                    match left {
                        Operand::Field(_) => Ok(LogicNode::Truthy(left)),
                        other => Err(StateError::configuration(format!(
                            "constant {:?} used without comparison",
                            other
                        ))),
                    }
                }
            }
        }
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        match self.next() {
            Some(Token::Field(name)) => Ok(Operand::Field(name)),
            Some(Token::Text(s)) | Some(Token::Word(s)) => Ok(Operand::Text(s)),
            Some(Token::Number(n)) => Ok(Operand::Number(n)),
            Some(other) => Err(StateError::configuration(format!(
                "expected operand, found {:?}",
                other
            ))),
            None => Err(StateError::configuration("unexpected end of logic expression")),
        }
    }
}

/// Name → value environment a logic expression is evaluated against
pub trait FieldValues {
    fn field_value(&self, name: &str) -> Option<&Value>;
}

impl FieldValues for HashMap<String, Value> {
    fn field_value(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Evaluates logic expressions; the seam for plugging in another evaluator
pub trait LogicEvaluator: Send + Sync {
    fn evaluate(&self, expression: &LogicExpression, values: &dyn FieldValues) -> bool;
}

/// Evaluator for the expression language parsed by [`LogicExpression::parse`]
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultLogicEvaluator;

impl LogicEvaluator for DefaultLogicEvaluator {
    fn evaluate(&self, expression: &LogicExpression, values: &dyn FieldValues) -> bool {
        eval_node(&expression.node, values)
    }
}

fn eval_node(node: &LogicNode, values: &dyn FieldValues) -> bool {
    match node {
        LogicNode::Constant(b) => *b,
        LogicNode::Truthy(operand) => resolve(operand, values).is_truthy(),
        LogicNode::Compare { left, op, right } => {
            compare(&resolve(left, values), *op, &resolve(right, values))
        }
        LogicNode::And(a, b) => eval_node(a, values) && eval_node(b, values),
        LogicNode::Or(a, b) => eval_node(a, values) || eval_node(b, values),
    }
}

fn resolve(operand: &Operand, values: &dyn FieldValues) -> Value {
    match operand {
        Operand::Field(name) => values.field_value(name).cloned().unwrap_or(Value::Null),
        Operand::Text(s) => Value::Text(s.clone()),
        Operand::Number(n) => Value::Number(*n),
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (numeric(left), numeric(right)) {
        return match op {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            CompareOp::Lt => a < b,
            CompareOp::Gt => a > b,
            CompareOp::Le => a <= b,
            CompareOp::Ge => a >= b,
        };
    }

    let a = left.as_comparable_text();
    let b = right.as_comparable_text();
    match op {
        CompareOp::Eq => a == b,
        CompareOp::Ne => a != b,
        // ordering between a missing value and anything else is undefined
        _ if a.is_empty() || b.is_empty() => false,
        CompareOp::Lt => a < b,
        CompareOp::Gt => a > b,
        CompareOp::Le => a <= b,
        CompareOp::Ge => a >= b,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(_) | Value::Number(_) => value.as_f64(),
        Value::Text(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
