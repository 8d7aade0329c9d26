//! Syntax tree handed over by the front end.
//!
//! The tree is assumed to be well formed; names are not assumed to be
//! declared and numeric literals are kept as text until lowering.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub data: Vec<Declaration>,
    pub main: Block,
}

pub type Block = Vec<Statement>;

/// Literal text as written in the source, e.g. `"42"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Numeric(pub String);

impl Numeric {
    pub fn new(text: impl Into<String>) -> Self {
        Numeric(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Declaration {
    // `var x`
    Variable { name: String },
    // `array xs[10]`
    Array { name: String, size: Numeric },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Equal,
    Less,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Numeric { value: Numeric },
    Variable { name: String },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    // `xs[i + 1]`
    Element { name: String, subscript: Box<Expr> },
}

impl Expr {
    pub fn num(text: impl Into<String>) -> Self {
        Expr::Numeric { value: Numeric::new(text) }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Variable { name: name.into() }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn element(name: impl Into<String>, subscript: Expr) -> Self {
        Expr::Element {
            name: name.into(),
            subscript: Box::new(subscript),
        }
    }
}

/// Condition of an `if` or `while`. Only usable in those positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub op: CompareOp,
    pub left: Expr,
    pub right: Expr,
}

impl Comparison {
    pub fn new(op: CompareOp, left: Expr, right: Expr) -> Self {
        Self { op, left, right }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    // `x = expr`
    AssignVariable { name: String, value: Expr },
    // `xs[i] = expr`
    AssignElement { name: String, subscript: Expr, value: Expr },
    // `x++`
    Increment { name: String },
    // `x--`
    Decrement { name: String },
    If {
        cond: Comparison,
        then_block: Block,
        // `None` when the source has no else branch at all
        #[serde(default)]
        else_block: Option<Block>,
    },
    While { cond: Comparison, body: Block },
    PenUp,
    PenDown,
    SetPosition { x: Expr, y: Expr },
    SetColor { color: Expr },
    Forward { distance: Expr },
    Back { distance: Expr },
    Rotate { angle: Expr },
}
