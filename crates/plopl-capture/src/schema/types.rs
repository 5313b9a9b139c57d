//! Canonical schema representation and ingestion.

use super::raw::{ExpectedEntry, FieldGroup, FieldSpec, RawMatch, RawSchema};
use crate::condition::{Condition, ConditionError};
use crate::path::PathExpr;
use serde_json::Value;
use std::fmt;

const KNOWN_METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Errors that make a schema document unusable.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid schema JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("schema has no id")]
    MissingId,
    #[error("schema '{0}' has no request section")]
    MissingRequest(String),
}

/// Request half of a schema: what the target call looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    pub url_substring: String,
    pub method: String,
    /// GraphQL query text used for fuzzy body matching.
    pub body_query: Option<String>,
}

/// One `(path, condition)` pair of the match section.
#[derive(Debug, Clone)]
pub struct MatchRule {
    pub path: PathExpr,
    pub condition: Result<Condition, ConditionError>,
    pub raw_condition: String,
}

impl MatchRule {
    pub fn new(path: &str, condition: &str) -> Self {
        Self {
            path: PathExpr::parse(path),
            condition: Condition::parse(condition),
            raw_condition: condition.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    InvalidPath,
    InvalidCondition,
    PairingMismatch,
    EmptyUrl,
    UnknownMethod,
    LegacyNestedFields,
    BodyQueryOnGet,
}

/// A problem found while ingesting a schema. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub location: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// A schema resolved into its canonical form.
#[derive(Debug, Clone)]
pub struct Schema {
    pub id: String,
    pub name: String,
    pub request: RequestSpec,
    /// `None` when the schema carries no `response.match` section.
    pub rules: Option<Vec<MatchRule>>,
    pub prepare_url: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Schema {
    pub fn from_json(text: &str) -> Result<Self, SchemaError> {
        let raw: RawSchema = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    pub fn from_value(value: Value) -> Result<Self, SchemaError> {
        let raw: RawSchema = serde_json::from_value(value)?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawSchema) -> Result<Self, SchemaError> {
        let id = raw.id_string().ok_or(SchemaError::MissingId)?;
        let raw_request = raw
            .request()
            .ok_or_else(|| SchemaError::MissingRequest(id.clone()))?;

        let mut diagnostics = Vec::new();

        let request = RequestSpec {
            url_substring: raw_request.url.clone().unwrap_or_default(),
            method: raw_request
                .method
                .clone()
                .unwrap_or_else(|| "GET".to_string()),
            body_query: raw_request
                .body_query()
                .filter(|q| !q.trim().is_empty())
                .map(str::to_string),
        };

        if request.url_substring.trim().is_empty() {
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::EmptyUrl,
                location: "request.url".to_string(),
                message: "empty url substring matches every request".to_string(),
            });
        }
        if !KNOWN_METHODS.contains(&request.method.as_str()) {
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::UnknownMethod,
                location: "request.method".to_string(),
                message: format!("unrecognized HTTP method '{}'", request.method),
            });
        }
        if request.method == "GET" && request.body_query.is_some() {
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::BodyQueryOnGet,
                location: "request.args.json.query".to_string(),
                message: "GET requests carry no body; the body query is never checked"
                    .to_string(),
            });
        }

        let rules = raw
            .response()
            .and_then(|r| r.match_spec.as_ref())
            .map(|m| flatten_rules(m, &mut diagnostics));

        if let Some(rules) = &rules {
            for (idx, rule) in rules.iter().enumerate() {
                if let Some(err) = rule.path.error() {
                    diagnostics.push(Diagnostic {
                        kind: DiagnosticKind::InvalidPath,
                        location: format!("response.match.fields[{idx}]"),
                        message: err.to_string(),
                    });
                }
                if let Err(err) = &rule.condition {
                    diagnostics.push(Diagnostic {
                        kind: DiagnosticKind::InvalidCondition,
                        location: format!("response.match.expected[{idx}]"),
                        message: err.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            name: raw.display_name(),
            prepare_url: raw.prepare_url().map(str::to_string),
            id,
            request,
            rules,
            diagnostics,
        })
    }

    /// Build a schema directly, mainly for tests and embedding.
    pub fn new(id: &str, url_substring: &str, method: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            request: RequestSpec {
                url_substring: url_substring.to_string(),
                method: method.to_string(),
                body_query: None,
            },
            rules: None,
            prepare_url: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_body_query(mut self, query: &str) -> Self {
        self.request.body_query = Some(query.to_string());
        self
    }

    /// Conditions written with `==`/`!=`, which never match.
    pub fn loose_equality_conditions(&self) -> Vec<&str> {
        self.rules
            .iter()
            .flatten()
            .filter(|rule| matches!(rule.condition, Err(ConditionError::LooseEquality(_))))
            .map(|rule| rule.raw_condition.as_str())
            .collect()
    }

    pub fn with_rules(mut self, pairs: &[(&str, &str)]) -> Self {
        self.rules = Some(
            pairs
                .iter()
                .map(|(path, cond)| MatchRule::new(path, cond))
                .collect(),
        );
        self
    }
}

/// Resolve flat or nested `fields`/`expected` into one ordered rule list.
fn flatten_rules(section: &RawMatch, diagnostics: &mut Vec<Diagnostic>) -> Vec<MatchRule> {
    let mut rules = Vec::new();

    match &section.fields {
        FieldSpec::Flat(paths) => {
            if section.expected.len() > paths.len() {
                diagnostics.push(pairing(format!(
                    "{} conditions for {} fields; extra conditions are ignored",
                    section.expected.len(),
                    paths.len()
                )));
            }
            for (idx, path) in paths.iter().enumerate() {
                let condition = match section.expected.get(idx) {
                    Some(Some(ExpectedEntry::Condition(c))) => c.clone(),
                    Some(Some(ExpectedEntry::Group(group))) => {
                        diagnostics.push(pairing(format!(
                            "expected[{idx}] is a group but fields[{idx}] is a single path"
                        )));
                        first_condition(group)
                    }
                    Some(None) => String::new(),
                    None => {
                        if idx == section.expected.len() {
                            diagnostics.push(pairing(format!(
                                "{} fields but only {} conditions; the rest are extract-only",
                                paths.len(),
                                section.expected.len()
                            )));
                        }
                        String::new()
                    }
                };
                rules.push(MatchRule::new(path, &condition));
            }
        }
        FieldSpec::Nested(groups) => {
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::LegacyNestedFields,
                location: "response.match.fields".to_string(),
                message: "nested field groups are flattened pairwise".to_string(),
            });
            for (idx, group) in groups.iter().enumerate() {
                let expected = section.expected.get(idx).cloned().flatten();
                match group {
                    FieldGroup::Path(path) => {
                        let condition = match expected {
                            Some(ExpectedEntry::Condition(c)) => c,
                            Some(ExpectedEntry::Group(group)) => {
                                diagnostics.push(pairing(format!(
                                    "expected[{idx}] is a group but fields[{idx}] is a single path"
                                )));
                                first_condition(&group)
                            }
                            None => String::new(),
                        };
                        rules.push(MatchRule::new(path, &condition));
                    }
                    FieldGroup::Group(paths) => {
                        if let Some(ExpectedEntry::Group(conds)) = &expected {
                            if conds.len() != paths.len() {
                                diagnostics.push(pairing(format!(
                                    "field group {idx} has {} paths but {} conditions",
                                    paths.len(),
                                    conds.len()
                                )));
                            }
                        }
                        for (j, path) in paths.iter().enumerate() {
                            let condition = match &expected {
                                Some(ExpectedEntry::Condition(c)) => c.clone(),
                                Some(ExpectedEntry::Group(conds)) => {
                                    conds.get(j).cloned().flatten().unwrap_or_default()
                                }
                                None => String::new(),
                            };
                            rules.push(MatchRule::new(path, &condition));
                        }
                    }
                }
            }
        }
    }

    rules
}

fn first_condition(group: &[Option<String>]) -> String {
    group.first().cloned().flatten().unwrap_or_default()
}

fn pairing(message: String) -> Diagnostic {
    Diagnostic {
        kind: DiagnosticKind::PairingMismatch,
        location: "response.match".to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kinds(schema: &Schema) -> Vec<DiagnosticKind> {
        schema.diagnostics.iter().map(|d| d.kind).collect()
    }

    fn pairs(schema: &Schema) -> Vec<(String, String)> {
        schema
            .rules
            .as_ref()
            .unwrap()
            .iter()
            .map(|r| (r.path.raw().to_string(), r.raw_condition.clone()))
            .collect()
    }

    #[test]
    fn test_canonical_schema() {
        let schema = Schema::from_value(json!({
            "id": "s1",
            "request": {
                "url": "api.example.com/gql",
                "method": "POST",
                "args": {"json": {"query": "{ me { id } }"}}
            },
            "response": {"match": {
                "fields": ["data.items[].length()"],
                "expected": ["x >= 3"]
            }},
            "prepareUrl": "https://example.com"
        }))
        .unwrap();

        assert_eq!(schema.id, "s1");
        assert_eq!(schema.request.method, "POST");
        assert_eq!(schema.request.body_query.as_deref(), Some("{ me { id } }"));
        assert_eq!(schema.prepare_url.as_deref(), Some("https://example.com"));
        assert_eq!(
            pairs(&schema),
            vec![("data.items[].length()".to_string(), "x >= 3".to_string())]
        );
        assert!(schema.diagnostics.is_empty());
    }

    #[test]
    fn test_wrapped_schema_defaults() {
        let schema = Schema::from_value(json!({
            "id": 7,
            "name": "Attendance",
            "schema": {"request": {"url": "lu.ma/api"}}
        }))
        .unwrap();
        assert_eq!(schema.id, "7");
        assert_eq!(schema.name, "Attendance");
        assert_eq!(schema.request.method, "GET");
        assert!(schema.rules.is_none());
    }

    #[test]
    fn test_missing_id_and_request() {
        assert!(matches!(
            Schema::from_value(json!({"request": {"url": "a"}})),
            Err(SchemaError::MissingId)
        ));
        assert!(matches!(
            Schema::from_value(json!({"id": "s"})),
            Err(SchemaError::MissingRequest(_))
        ));
        assert!(matches!(Schema::from_json("{"), Err(SchemaError::Json(_))));
    }

    #[test]
    fn test_missing_conditions_are_extract_only() {
        let schema = Schema::from_value(json!({
            "id": "s",
            "request": {"url": "a", "method": "GET"},
            "response": {"match": {"fields": ["a", "b"], "expected": ["x > 1"]}}
        }))
        .unwrap();
        assert_eq!(
            pairs(&schema),
            vec![
                ("a".to_string(), "x > 1".to_string()),
                ("b".to_string(), String::new())
            ]
        );
        assert_eq!(kinds(&schema), vec![DiagnosticKind::PairingMismatch]);
    }

    #[test]
    fn test_nested_groups_flatten_pairwise() {
        let schema = Schema::from_value(json!({
            "id": "s",
            "request": {"url": "a", "method": "GET"},
            "response": {"match": {
                "fields": [["a", "b"], ["c", "d"], "e"],
                "expected": [["x > 1", "x < 2"], "x !== null", ""]
            }}
        }))
        .unwrap();
        assert_eq!(
            pairs(&schema),
            vec![
                ("a".to_string(), "x > 1".to_string()),
                ("b".to_string(), "x < 2".to_string()),
                ("c".to_string(), "x !== null".to_string()),
                ("d".to_string(), "x !== null".to_string()),
                ("e".to_string(), String::new()),
            ]
        );
        assert_eq!(kinds(&schema), vec![DiagnosticKind::LegacyNestedFields]);
    }

    #[test]
    fn test_invalid_rules_become_diagnostics() {
        let schema = Schema::from_value(json!({
            "id": "s",
            "request": {"url": "a", "method": "GET"},
            "response": {"match": {"fields": ["a..b", "c"], "expected": ["", "x == 1"]}}
        }))
        .unwrap();
        assert_eq!(
            kinds(&schema),
            vec![DiagnosticKind::InvalidPath, DiagnosticKind::InvalidCondition]
        );
        assert_eq!(schema.diagnostics[1].location, "response.match.expected[1]");
    }

    #[test]
    fn test_request_diagnostics() {
        let schema = Schema::from_value(json!({
            "id": "s",
            "request": {"url": "", "method": "FETCH"}
        }))
        .unwrap();
        assert_eq!(
            kinds(&schema),
            vec![DiagnosticKind::EmptyUrl, DiagnosticKind::UnknownMethod]
        );

        let schema = Schema::from_value(json!({
            "id": "s",
            "request": {"url": "a", "args": {"json": {"query": "{ a }"}}}
        }))
        .unwrap();
        assert_eq!(kinds(&schema), vec![DiagnosticKind::BodyQueryOnGet]);
    }

    #[test]
    fn test_builder_helpers() {
        let schema = Schema::new("s", "api", "POST")
            .with_body_query("{ me }")
            .with_rules(&[("a.b", "x === 1")]);
        assert_eq!(schema.request.body_query.as_deref(), Some("{ me }"));
        assert_eq!(schema.rules.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_loose_equality_conditions() {
        let schema = Schema::new("s", "a", "GET").with_rules(&[
            ("data.events[].find(name)", "x == 'ETHGlobal Singapore'"),
            ("data.count", "x > 1"),
            ("data.role", "x != 'guest'"),
            ("data.name", "x === 'ada'"),
        ]);
        assert_eq!(
            schema.loose_equality_conditions(),
            vec!["x == 'ETHGlobal Singapore'", "x != 'guest'"]
        );
    }
}
