//! Parser for the condition grammar.

use super::ast::{CompareOp, Condition, Literal, StringOp};

/// Reasons a condition string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    #[error("condition must start with the subject 'x': '{0}'")]
    MissingSubject(String),
    #[error("unsupported operator in condition '{0}'")]
    UnknownOperator(String),
    #[error("loose equality is not supported in condition '{0}', use '===' or '!=='")]
    LooseEquality(String),
    #[error("unsupported method '{method}' in condition '{condition}'")]
    UnknownMethod { condition: String, method: String },
    #[error("invalid literal in condition '{0}'")]
    InvalidLiteral(String),
    #[error("unexpected trailing input in condition '{0}'")]
    TrailingInput(String),
}

// Operators are tried longest first so that `>=` is not read as `>`.
const OPERATORS: [(&str, CompareOp); 6] = [
    ("===", CompareOp::StrictEq),
    ("!==", CompareOp::StrictNe),
    (">=", CompareOp::Ge),
    ("<=", CompareOp::Le),
    (">", CompareOp::Gt),
    ("<", CompareOp::Lt),
];

impl Condition {
    /// Parse a condition string. Empty or whitespace-only input is `Always`.
    pub fn parse(input: &str) -> Result<Self, ConditionError> {
        let text = input.trim();
        if text.is_empty() {
            return Ok(Condition::Always);
        }

        let rest = text
            .strip_prefix('x')
            .ok_or_else(|| ConditionError::MissingSubject(input.to_string()))?;

        if let Some(call) = rest.strip_prefix('.') {
            return parse_call(input, call);
        }

        // `xs === 1` must not parse as `x` followed by garbage
        if !rest.starts_with(|c: char| c.is_whitespace() || "=!<>".contains(c)) {
            return Err(ConditionError::MissingSubject(input.to_string()));
        }

        let rest = rest.trim_start();
        let loose_eq = rest.starts_with("==") && !rest.starts_with("===");
        let loose_ne = rest.starts_with("!=") && !rest.starts_with("!==");
        if loose_eq || loose_ne {
            return Err(ConditionError::LooseEquality(input.to_string()));
        }

        let (op, after) = OPERATORS
            .iter()
            .find_map(|(symbol, op)| rest.strip_prefix(symbol).map(|after| (*op, after)))
            .ok_or_else(|| ConditionError::UnknownOperator(input.to_string()))?;

        let (literal, remaining) = parse_literal(input, after.trim_start())?;
        if !remaining.trim().is_empty() {
            return Err(ConditionError::TrailingInput(input.to_string()));
        }

        Ok(Condition::Compare { op, literal })
    }
}

fn parse_call(input: &str, call: &str) -> Result<Condition, ConditionError> {
    let open = call
        .find('(')
        .ok_or_else(|| ConditionError::UnknownOperator(input.to_string()))?;
    let method = call[..open].trim();
    let op = StringOp::from_name(method).ok_or_else(|| ConditionError::UnknownMethod {
        condition: input.to_string(),
        method: method.to_string(),
    })?;

    let args = call[open + 1..].trim_start();
    let (argument, remaining) = parse_quoted(args)
        .ok_or_else(|| ConditionError::InvalidLiteral(input.to_string()))?;

    let remaining = remaining.trim_start();
    let remaining = remaining
        .strip_prefix(')')
        .ok_or_else(|| ConditionError::TrailingInput(input.to_string()))?;
    if !remaining.trim().is_empty() {
        return Err(ConditionError::TrailingInput(input.to_string()));
    }

    Ok(Condition::Call { op, argument })
}

fn parse_literal<'a>(input: &str, text: &'a str) -> Result<(Literal, &'a str), ConditionError> {
    if text.starts_with(['\'', '"']) {
        let (s, rest) =
            parse_quoted(text).ok_or_else(|| ConditionError::InvalidLiteral(input.to_string()))?;
        return Ok((Literal::Str(s), rest));
    }

    let end = text
        .find(|c: char| c.is_whitespace() || c == ')')
        .unwrap_or(text.len());
    let (token, rest) = text.split_at(end);

    let literal = match token {
        "true" => Literal::Bool(true),
        "false" => Literal::Bool(false),
        "null" => Literal::Null,
        _ if is_numeric_token(token) => match token.parse::<f64>() {
            Ok(n) if n.is_finite() => Literal::Number(n),
            _ => return Err(ConditionError::InvalidLiteral(input.to_string())),
        },
        _ => return Err(ConditionError::InvalidLiteral(input.to_string())),
    };

    Ok((literal, rest))
}

/// Numeric tokens are restricted to decimal notation with an optional sign,
/// fraction and exponent, so `inf`/`NaN` never sneak through `f64::parse`.
fn is_numeric_token(token: &str) -> bool {
    let digits = token.strip_prefix(['-', '+']).unwrap_or(token);
    !digits.is_empty()
        && digits.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && digits
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
}

/// Parse a single- or double-quoted string with backslash escapes.
/// Returns the unescaped content and the input after the closing quote.
fn parse_quoted(text: &str) -> Option<(String, &str)> {
    let mut chars = text.char_indices();
    let (_, quote) = chars.next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }

    let mut out = String::new();
    let mut escaped = false;
    for (idx, c) in chars {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some((out, &text[idx + c.len_utf8()..]));
        } else {
            out.push(c);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compare(op: CompareOp, literal: Literal) -> Condition {
        Condition::Compare { op, literal }
    }

    #[test]
    fn test_parse_empty_is_always() {
        assert_eq!(Condition::parse("").unwrap(), Condition::Always);
        assert_eq!(Condition::parse("   ").unwrap(), Condition::Always);
    }

    #[test]
    fn test_parse_comparisons() {
        assert_eq!(
            Condition::parse("x >= 3").unwrap(),
            compare(CompareOp::Ge, Literal::Number(3.0))
        );
        assert_eq!(
            Condition::parse("x<=-2.5").unwrap(),
            compare(CompareOp::Le, Literal::Number(-2.5))
        );
        assert_eq!(
            Condition::parse("x > 10").unwrap(),
            compare(CompareOp::Gt, Literal::Number(10.0))
        );
        assert_eq!(
            Condition::parse("x < 1e3").unwrap(),
            compare(CompareOp::Lt, Literal::Number(1000.0))
        );
        assert_eq!(
            Condition::parse("x === 'admin'").unwrap(),
            compare(CompareOp::StrictEq, Literal::Str("admin".to_string()))
        );
        assert_eq!(
            Condition::parse(r#"x !== "ETHGlobal Singapore""#).unwrap(),
            compare(
                CompareOp::StrictNe,
                Literal::Str("ETHGlobal Singapore".to_string())
            )
        );
    }

    #[test]
    fn test_parse_keyword_literals() {
        assert_eq!(
            Condition::parse("x === true").unwrap(),
            compare(CompareOp::StrictEq, Literal::Bool(true))
        );
        assert_eq!(
            Condition::parse("x !== false").unwrap(),
            compare(CompareOp::StrictNe, Literal::Bool(false))
        );
        assert_eq!(
            Condition::parse("x === null").unwrap(),
            compare(CompareOp::StrictEq, Literal::Null)
        );
    }

    #[test]
    fn test_parse_string_calls() {
        assert_eq!(
            Condition::parse("x.includes('Singapore')").unwrap(),
            Condition::Call {
                op: StringOp::Includes,
                argument: "Singapore".to_string()
            }
        );
        assert_eq!(
            Condition::parse(r#"x.startsWith("eth")"#).unwrap(),
            Condition::Call {
                op: StringOp::StartsWith,
                argument: "eth".to_string()
            }
        );
        assert_eq!(
            Condition::parse("x.endsWith( 'pore' )").unwrap(),
            Condition::Call {
                op: StringOp::EndsWith,
                argument: "pore".to_string()
            }
        );
    }

    #[test]
    fn test_parse_escaped_quote() {
        assert_eq!(
            Condition::parse(r"x === 'it\'s'").unwrap(),
            compare(CompareOp::StrictEq, Literal::Str("it's".to_string()))
        );
    }

    #[test]
    fn test_reject_loose_equality() {
        assert!(matches!(
            Condition::parse("x == 1"),
            Err(ConditionError::LooseEquality(_))
        ));
        assert!(matches!(
            Condition::parse("x != 'a'"),
            Err(ConditionError::LooseEquality(_))
        ));
        assert!(matches!(
            Condition::parse("x == 'ETHGlobal Singapore'"),
            Err(ConditionError::LooseEquality(_))
        ));
    }

    #[test]
    fn test_reject_arbitrary_code() {
        for input in [
            "x >= 3 && process.exit()",
            "x.constructor('return 1')()",
            "alert(1)",
            "x >= 3; 1",
            "x === y",
            "x >= Infinity",
            "x >= NaN",
            "xs === 1",
            "x.includes(1)",
            "x.includes('a'",
            "x === 'unterminated",
        ] {
            assert!(
                Condition::parse(input).is_err(),
                "expected '{input}' to be rejected"
            );
        }
    }

    #[test]
    fn test_unknown_method_reported() {
        let err = Condition::parse("x.matches('a')").unwrap_err();
        assert_eq!(
            err,
            ConditionError::UnknownMethod {
                condition: "x.matches('a')".to_string(),
                method: "matches".to_string()
            }
        );
    }

    #[test]
    fn test_display_round_trip() {
        let cond = Condition::parse("x >= 5").unwrap();
        assert_eq!(cond.to_string(), "x >= 5");
        assert_eq!(Condition::parse(&cond.to_string()).unwrap(), cond);
    }
}
