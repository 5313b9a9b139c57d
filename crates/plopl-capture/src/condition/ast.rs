//! Condition AST.

use std::fmt;

/// Comparison operators of `x <op> <literal>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    StrictEq,
    StrictNe,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::StrictEq => "===",
            CompareOp::StrictNe => "!==",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
        }
    }
}

/// String-only method calls on the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringOp {
    Includes,
    StartsWith,
    EndsWith,
}

impl StringOp {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "includes" => Some(StringOp::Includes),
            "startsWith" => Some(StringOp::StartsWith),
            "endsWith" => Some(StringOp::EndsWith),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StringOp::Includes => "includes",
            StringOp::StartsWith => "startsWith",
            StringOp::EndsWith => "endsWith",
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{n}"),
            Literal::Str(s) => write!(f, "'{s}'"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Null => f.write_str("null"),
        }
    }
}

/// A parsed condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Empty condition: the field is extracted but never constrains validity.
    Always,
    Compare { op: CompareOp, literal: Literal },
    Call { op: StringOp, argument: String },
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Always => Ok(()),
            Condition::Compare { op, literal } => write!(f, "x {} {literal}", op.symbol()),
            Condition::Call { op, argument } => write!(f, "x.{}('{argument}')", op.name()),
        }
    }
}
