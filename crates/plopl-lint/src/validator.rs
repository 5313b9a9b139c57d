//! Core validation logic for capture schemas.
//!
//! Ingestion itself is delegated to `plopl_capture::schema` so the linter
//! reports exactly what the runtime would accept, reject or silently ignore.

use crate::types::{LintIssue, LintOptions, LintResult};
use once_cell::sync::Lazy;
use plopl_capture::schema::{DiagnosticKind, MatchRule, RawSchema, Schema, SchemaError};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

static LOOSE_EQUALITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(^|[^=!<>])(==|!=)([^=]|$)").expect("static regex"));

static HTTP_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://\S+$").expect("static regex"));

/// Validate one schema document. Returns the schema id when one was found.
pub fn validate_schema(
    file: &Path,
    document: &Value,
    result: &mut LintResult,
    options: &LintOptions,
) -> Option<String> {
    if !document.is_object() {
        result.add_issue(
            LintIssue::error("E003", "Schema document must be a JSON object", file)
                .with_suggestion("Wrap the schema in { \"id\": ..., \"request\": ..., \"response\": ... }"),
        );
        return None;
    }

    let raw: RawSchema = match serde_json::from_value(document.clone()) {
        Ok(raw) => raw,
        Err(e) => {
            result.add_issue(LintIssue::error(
                "E004",
                format!("Unrecognized schema shape: {e}"),
                file,
            ));
            return None;
        }
    };

    let id = raw.id_string();
    check_request_section(file, &raw, id.as_deref(), result);
    check_prepare_url(file, &raw, id.as_deref(), result);

    match Schema::from_raw(raw.clone()) {
        Ok(schema) => {
            check_diagnostics(file, &raw, &schema, result, options);
            check_rules(file, &schema, result);
        }
        Err(SchemaError::MissingId) => {
            result.add_issue(
                LintIssue::error("E005", "Missing schema id", file)
                    .with_location("id")
                    .with_suggestion("Give the schema a non-empty string or numeric id"),
            );
        }
        // Already reported by the request section check.
        Err(SchemaError::MissingRequest(_)) => {}
        Err(e) => {
            result.add_issue(LintIssue::error("E004", e.to_string(), file).with_schema(id.as_deref()));
        }
    }

    id
}

fn check_request_section(file: &Path, raw: &RawSchema, id: Option<&str>, result: &mut LintResult) {
    let Some(request) = raw.request() else {
        result.add_issue(
            LintIssue::error("E006", "Missing request section", file)
                .with_schema(id)
                .with_location("request")
                .with_suggestion("Add \"request\": { \"url\": ..., \"method\": ... }"),
        );
        return;
    };

    if request.url.is_none() {
        result.add_issue(
            LintIssue::error("E007", "Missing request url", file)
                .with_schema(id)
                .with_location("request.url")
                .with_suggestion("Set a url substring identifying the API call"),
        );
    }
    if request.method.is_none() {
        result.add_issue(
            LintIssue::warning("W003", "Missing request method, GET is assumed", file)
                .with_schema(id)
                .with_location("request.method"),
        );
    }
}

fn check_prepare_url(file: &Path, raw: &RawSchema, id: Option<&str>, result: &mut LintResult) {
    if let Some(url) = raw.prepare_url() {
        if !HTTP_URL.is_match(url) {
            result.add_issue(
                LintIssue::warning("W007", format!("prepareUrl is not an http(s) URL: {url}"), file)
                    .with_schema(id)
                    .with_location("prepareUrl"),
            );
        }
    }
}

/// Map ingestion diagnostics onto lint codes. Per-rule problems are reported
/// by `check_rules`, where the offending condition text is at hand.
fn check_diagnostics(
    file: &Path,
    raw: &RawSchema,
    schema: &Schema,
    result: &mut LintResult,
    options: &LintOptions,
) {
    let id = Some(schema.id.as_str());
    let url_missing = raw.request().is_some_and(|r| r.url.is_none());

    for diagnostic in &schema.diagnostics {
        let issue = match diagnostic.kind {
            DiagnosticKind::InvalidPath | DiagnosticKind::InvalidCondition => continue,
            DiagnosticKind::EmptyUrl if url_missing => continue,
            DiagnosticKind::EmptyUrl => LintIssue::warning("W001", &diagnostic.message, file)
                .with_suggestion("Use a distinctive part of the API URL, e.g. 'api.example.com/graphql'"),
            DiagnosticKind::UnknownMethod => LintIssue::error("E008", &diagnostic.message, file)
                .with_suggestion("Use one of GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS"),
            DiagnosticKind::BodyQueryOnGet => LintIssue::warning("W002", &diagnostic.message, file)
                .with_suggestion("Switch the method to POST or drop request.args.json.query"),
            DiagnosticKind::PairingMismatch => LintIssue::error("E012", &diagnostic.message, file)
                .with_suggestion("Give every field exactly one expected entry"),
            DiagnosticKind::LegacyNestedFields if options.verbose => {
                LintIssue::info("I001", &diagnostic.message, file)
            }
            DiagnosticKind::LegacyNestedFields => continue,
        };
        result.add_issue(issue.with_schema(id).with_location(&diagnostic.location));
    }
}

fn check_rules(file: &Path, schema: &Schema, result: &mut LintResult) {
    let id = Some(schema.id.as_str());

    let Some(rules) = &schema.rules else {
        result.add_issue(
            LintIssue::warning("W004", "No response.match section; responses never validate", file)
                .with_schema(id)
                .with_location("response.match"),
        );
        return;
    };
    if rules.is_empty() {
        result.add_issue(
            LintIssue::warning("W005", "response.match has no fields", file)
                .with_schema(id)
                .with_location("response.match.fields"),
        );
        return;
    }

    let mut names: HashMap<String, usize> = HashMap::new();
    for (idx, rule) in rules.iter().enumerate() {
        check_rule(file, id, idx, rule, result);

        if rule.path.is_valid() {
            let name = rule.path.field_name();
            if let Some(first) = names.get(&name) {
                result.add_issue(
                    LintIssue::warning(
                        "W006",
                        format!(
                            "Field name '{name}' is also produced by fields[{first}]; the later value wins"
                        ),
                        file,
                    )
                    .with_schema(id)
                    .with_location(format!("response.match.fields[{idx}]")),
                );
            } else {
                names.insert(name, idx);
            }
        }
    }
}

/// Validate a single `(path, condition)` rule.
pub fn check_rule(
    file: &Path,
    schema_id: Option<&str>,
    idx: usize,
    rule: &MatchRule,
    result: &mut LintResult,
) {
    if let Some(err) = rule.path.error() {
        result.add_issue(
            LintIssue::error("E010", format!("Invalid path: {err}"), file)
                .with_schema(schema_id)
                .with_location(format!("response.match.fields[{idx}]"))
                .with_suggestion("Paths look like 'data.user.name', 'items[].length()' or 'users[].find(role)'"),
        );
    }

    if let Err(err) = &rule.condition {
        let mut issue = LintIssue::error("E011", format!("Invalid condition: {err}"), file)
            .with_schema(schema_id)
            .with_location(format!("response.match.expected[{idx}]"));
        if LOOSE_EQUALITY.is_match(&rule.raw_condition) {
            issue = issue.with_suggestion("Use strict equality: '===' or '!=='");
        } else {
            issue = issue.with_suggestion(
                "Conditions look like 'x > 5', \"x === 'admin'\" or \"x.includes('foo')\"",
            );
        }
        result.add_issue(issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lint(document: Value) -> LintResult {
        let mut result = LintResult::new();
        validate_schema(
            Path::new("schema.json"),
            &document,
            &mut result,
            &LintOptions { verbose: true },
        );
        result
    }

    #[test]
    fn test_clean_schema() {
        let result = lint(json!({
            "id": "followers",
            "request": {"url": "api.example.com/graphql", "method": "POST",
                        "args": {"json": {"query": "{ viewer { followers { totalCount } } }"}}},
            "response": {"match": {
                "fields": ["data.viewer.followers.totalCount"],
                "expected": ["x > 10"]
            }}
        }));
        assert!(result.issues.is_empty(), "{:?}", result.issues);
    }

    #[test]
    fn test_not_an_object() {
        let result = lint(json!([1, 2]));
        assert_eq!(result.codes(), vec!["E003"]);
    }

    #[test]
    fn test_missing_id_and_request() {
        let result = lint(json!({"name": "x"}));
        assert_eq!(result.codes(), vec!["E006", "E005"]);
    }

    #[test]
    fn test_request_shape() {
        let result = lint(json!({"id": 1, "request": {"args": {"json": {"query": "{ a }"}}},
                                 "response": {"match": {"fields": ["a"], "expected": [""]}}}));
        let codes = result.codes();
        assert!(codes.contains(&"E007"));
        assert!(codes.contains(&"W003"));
        assert!(codes.contains(&"W002"));
        assert!(!codes.contains(&"W001"));
    }

    #[test]
    fn test_empty_url_and_unknown_method() {
        let result = lint(json!({"id": 1, "request": {"url": "", "method": "FETCH"},
                                 "response": {"match": {"fields": ["a"], "expected": [""]}}}));
        assert_eq!(result.codes(), vec!["W001", "E008"]);
    }

    #[test]
    fn test_rule_errors() {
        let result = lint(json!({
            "id": "s",
            "request": {"url": "a", "method": "GET"},
            "response": {"match": {
                "fields": ["data..name", "data.role", "data.count"],
                "expected": ["", "x == 'admin'", "x >> 3"]
            }}
        }));
        assert_eq!(result.codes(), vec!["E010", "E011", "E011"]);
        assert_eq!(
            result.issues[1].suggestion.as_deref(),
            Some("Use strict equality: '===' or '!=='")
        );
        assert_ne!(
            result.issues[2].suggestion.as_deref(),
            Some("Use strict equality: '===' or '!=='")
        );
    }

    #[test]
    fn test_pairing_mismatch() {
        let result = lint(json!({
            "id": "s",
            "request": {"url": "a", "method": "GET"},
            "response": {"match": {"fields": ["a", "b"], "expected": ["x > 1"]}}
        }));
        assert_eq!(result.codes(), vec!["E012"]);
    }

    #[test]
    fn test_missing_match_section() {
        let result = lint(json!({"id": "s", "request": {"url": "a", "method": "GET"}}));
        assert_eq!(result.codes(), vec!["W004"]);
        assert!(result.is_valid());
    }

    #[test]
    fn test_duplicate_field_names() {
        let result = lint(json!({
            "id": "s",
            "request": {"url": "a", "method": "GET"},
            "response": {"match": {
                "fields": ["data.a.name", "data.b.name"],
                "expected": ["", ""]
            }}
        }));
        assert_eq!(result.codes(), vec!["W006"]);
    }

    #[test]
    fn test_prepare_url() {
        let result = lint(json!({
            "id": "s",
            "schema": {
                "request": {"url": "a", "method": "GET"},
                "response": {"match": {"fields": ["a"], "expected": [""]}},
                "prepareUrl": "example.com/login"
            }
        }));
        assert_eq!(result.codes(), vec!["W007"]);
    }
}
