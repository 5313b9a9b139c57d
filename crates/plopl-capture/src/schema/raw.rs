//! Loosely-typed schema payloads as they arrive from the schema backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level schema document.
///
/// Two shapes are accepted: the canonical one where `request`/`response`
/// sit at the top level, and the wrapped one where they live under `schema`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<RawSchemaBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RawRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<RawResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepare_url: Option<String>,
}

/// Body of a wrapped schema document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSchemaBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RawRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<RawResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepare_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<RawArgs>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<RawJsonArgs>,
}

/// GraphQL request arguments.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawJsonArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawResponse {
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_spec: Option<RawMatch>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawMatch {
    #[serde(default)]
    pub fields: FieldSpec,
    #[serde(default)]
    pub expected: Vec<Option<ExpectedEntry>>,
}

/// `fields` is either a flat list of paths or, for legacy schemas, a list
/// whose entries may themselves be groups of paths.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FieldSpec {
    Flat(Vec<String>),
    Nested(Vec<FieldGroup>),
}

impl Default for FieldSpec {
    fn default() -> Self {
        FieldSpec::Flat(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FieldGroup {
    Path(String),
    Group(Vec<String>),
}

/// One entry of `expected`: a single condition, or one condition per path of
/// the matching field group.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ExpectedEntry {
    Condition(String),
    Group(Vec<Option<String>>),
}

impl RawSchema {
    /// Request section, wherever the document keeps it.
    pub fn request(&self) -> Option<&RawRequest> {
        self.request
            .as_ref()
            .or_else(|| self.schema.as_ref().and_then(|s| s.request.as_ref()))
    }

    pub fn response(&self) -> Option<&RawResponse> {
        self.response
            .as_ref()
            .or_else(|| self.schema.as_ref().and_then(|s| s.response.as_ref()))
    }

    pub fn prepare_url(&self) -> Option<&str> {
        self.prepare_url
            .as_deref()
            .or_else(|| self.schema.as_ref().and_then(|s| s.prepare_url.as_deref()))
    }

    /// Identifier as a string. Numeric ids are stringified.
    pub fn id_string(&self) -> Option<String> {
        match self.id.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn display_name(&self) -> String {
        self.slug
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| "Unknown Schema".to_string())
    }
}

impl RawRequest {
    pub fn body_query(&self) -> Option<&str> {
        self.args
            .as_ref()
            .and_then(|a| a.json.as_ref())
            .and_then(|j| j.query.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_fields() {
        let m: RawMatch = serde_json::from_value(json!({
            "fields": ["a.b", "c"],
            "expected": ["x > 1", ""]
        }))
        .unwrap();
        assert_eq!(
            m.fields,
            FieldSpec::Flat(vec!["a.b".to_string(), "c".to_string()])
        );
        assert_eq!(m.expected.len(), 2);
    }

    #[test]
    fn test_nested_fields_mixed_with_paths() {
        let m: RawMatch = serde_json::from_value(json!({
            "fields": [["a", "b"], "c"],
            "expected": [["x > 1", null], "x === 'c'"]
        }))
        .unwrap();
        assert_eq!(
            m.fields,
            FieldSpec::Nested(vec![
                FieldGroup::Group(vec!["a".to_string(), "b".to_string()]),
                FieldGroup::Path("c".to_string()),
            ])
        );
        assert_eq!(
            m.expected[0],
            Some(ExpectedEntry::Group(vec![Some("x > 1".to_string()), None]))
        );
    }

    #[test]
    fn test_wrapped_shape_accessors() {
        let raw: RawSchema = serde_json::from_value(json!({
            "id": 42,
            "slug": "github-stars",
            "schema": {
                "request": {"url": "api.github.com", "method": "GET"},
                "prepareUrl": "https://github.com"
            }
        }))
        .unwrap();
        assert_eq!(raw.id_string().as_deref(), Some("42"));
        assert_eq!(raw.display_name(), "github-stars");
        assert_eq!(raw.request().unwrap().url.as_deref(), Some("api.github.com"));
        assert_eq!(raw.prepare_url(), Some("https://github.com"));
    }

    #[test]
    fn test_body_query() {
        let req: RawRequest = serde_json::from_value(json!({
            "url": "x",
            "args": {"json": {"query": "{ me { id } }", "variables": {}}}
        }))
        .unwrap();
        assert_eq!(req.body_query(), Some("{ me { id } }"));
    }

    #[test]
    fn test_display_name_default() {
        assert_eq!(RawSchema::default().display_name(), "Unknown Schema");
    }
}
