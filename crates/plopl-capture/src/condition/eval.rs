//! Condition evaluation.

use super::ast::{CompareOp, Condition, Literal, StringOp};
use crate::path::PathExpr;
use serde_json::Value;
use std::cmp::Ordering;
use tracing::warn;

impl Condition {
    /// Evaluate this condition against a single extracted value.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Condition::Always => true,
            Condition::Compare { op, literal } => compare(value, *op, literal),
            Condition::Call { op, argument } => match value.as_str() {
                Some(s) => match op {
                    StringOp::Includes => s.contains(argument.as_str()),
                    StringOp::StartsWith => s.starts_with(argument.as_str()),
                    StringOp::EndsWith => s.ends_with(argument.as_str()),
                },
                None => false,
            },
        }
    }
}

/// Evaluate a compiled `(path, condition)` pair.
///
/// A `.find(prop)` path tested with `=== 'literal'` asks whether *any* array
/// element carries `prop === literal`; extraction only reports the first
/// element that has `prop`, which is the wrong element to compare against.
pub fn evaluate_rule(path: &PathExpr, condition: &Condition, value: &Value, document: &Value) -> bool {
    if let (
        Some(prop),
        Condition::Compare {
            op: CompareOp::StrictEq,
            literal: Literal::Str(expected),
        },
    ) = (path.find_property(), condition)
    {
        return path.find_candidates(document).is_some_and(|items| {
            items.iter().any(|item| {
                item.as_object()
                    .and_then(|obj| obj.get(prop))
                    .is_some_and(|v| display_string(v) == *expected)
            })
        });
    }

    condition.matches(value)
}

/// Parse and evaluate a condition string against `value` extracted from
/// `document` at `path`. Malformed conditions evaluate to `false`.
pub fn evaluate(value: &Value, condition: &str, path: &str, document: &Value) -> bool {
    match Condition::parse(condition) {
        Ok(parsed) => evaluate_rule(&PathExpr::parse(path), &parsed, value, document),
        Err(e) => {
            warn!(path, "Rejecting malformed condition: {}", e);
            false
        }
    }
}

fn compare(value: &Value, op: CompareOp, literal: &Literal) -> bool {
    match op {
        CompareOp::StrictEq => strict_equals(value, literal),
        CompareOp::StrictNe => !strict_equals(value, literal),
        CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le => {
            let ordering = match literal {
                Literal::Number(n) => as_number(value).and_then(|v| v.partial_cmp(n)),
                Literal::Str(s) => value.as_str().map(|v| v.cmp(s.as_str())),
                Literal::Bool(_) | Literal::Null => None,
            };
            match ordering {
                Some(ord) => match op {
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::Ge => ord != Ordering::Less,
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Le => ord != Ordering::Greater,
                    CompareOp::StrictEq | CompareOp::StrictNe => false,
                },
                None => false,
            }
        }
    }
}

fn strict_equals(value: &Value, literal: &Literal) -> bool {
    match literal {
        Literal::Number(n) => value.as_f64() == Some(*n),
        Literal::Str(s) => value.as_str() == Some(s.as_str()),
        Literal::Bool(b) => value.as_bool() == Some(*b),
        Literal::Null => value.is_null(),
    }
}

/// Numbers compare as-is, numeric strings are coerced.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// String form used for `.find` existence checks: strings verbatim, integral
/// floats without a trailing `.0`, everything else as compact JSON.
fn display_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}
