//! Document traversal for parsed path expressions.

use super::expr::{Accessor, PathExpr, Segment};
use once_cell::sync::Lazy;
use serde_json::Value;

static EMPTY_ARRAY: Lazy<Value> = Lazy::new(|| Value::Array(Vec::new()));

/// Extract the value addressed by `path` from `document`.
///
/// Never fails: malformed paths, missing keys and `null` intermediates all
/// produce `Value::Null`.
pub fn extract(document: &Value, path: &PathExpr) -> Value {
    if !path.is_valid() {
        return Value::Null;
    }

    match path.accessor() {
        None => resolve(document, path.segments())
            .cloned()
            .unwrap_or(Value::Null),
        Some(Accessor::Length) => {
            let len = resolve(document, path.segments())
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            Value::from(len)
        }
        Some(Accessor::Find(prop)) => path
            .find_candidates(document)
            .and_then(|items| {
                items
                    .iter()
                    .find_map(|item| item.as_object().and_then(|obj| obj.get(prop)))
            })
            .cloned()
            .unwrap_or(Value::Null),
    }
}

impl PathExpr {
    /// The array a `.find(prop)` path searches, if it resolves to one.
    pub fn find_candidates<'a>(&self, document: &'a Value) -> Option<&'a [Value]> {
        if !self.is_valid() {
            return None;
        }
        match self.accessor() {
            Some(Accessor::Find(_)) => resolve(document, self.segments())
                .and_then(Value::as_array)
                .map(Vec::as_slice),
            _ => None,
        }
    }
}

/// Walk the segments. `key[]` steps fall back to an empty array when the
/// field is absent or falsy; plain steps stop at the first missing key.
fn resolve<'a>(document: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    let mut current = document;
    for segment in segments {
        let next = lookup(current, &segment.key);
        current = if segment.array {
            match next {
                Some(value) if is_truthy(value) => value,
                _ => &EMPTY_ARRAY,
            }
        } else {
            match next {
                Some(Value::Null) | None => return None,
                Some(value) => value,
            }
        };
    }
    Some(current)
}

fn lookup<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|idx| items.get(idx)),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn get(doc: &Value, path: &str) -> Value {
        extract(doc, &PathExpr::parse(path))
    }

    #[test]
    fn test_extract_nested_field() {
        let doc = json!({"data": {"viewer": {"login": "octocat", "age": 12}}});
        assert_eq!(get(&doc, "data.viewer.login"), json!("octocat"));
        assert_eq!(get(&doc, "data.viewer.age"), json!(12));
        assert_eq!(get(&doc, "data.viewer"), json!({"login": "octocat", "age": 12}));
    }

    #[test]
    fn test_extract_missing_is_null() {
        let doc = json!({"data": {"viewer": null}});
        assert_eq!(get(&doc, "data.viewer.login"), Value::Null);
        assert_eq!(get(&doc, "data.missing"), Value::Null);
        assert_eq!(get(&doc, "data.viewer"), Value::Null);
        assert_eq!(get(&json!("scalar"), "a.b"), Value::Null);
    }

    #[test]
    fn test_extract_array_index_key() {
        let doc = json!({"items": [{"id": 1}, {"id": 2}]});
        assert_eq!(get(&doc, "items.1.id"), json!(2));
        assert_eq!(get(&doc, "items.5.id"), Value::Null);
    }

    #[test]
    fn test_array_marker_defaults_to_empty() {
        let doc = json!({"data": {"items": null}});
        assert_eq!(get(&doc, "data.items[]"), json!([]));
        assert_eq!(get(&doc, "data.other[]"), json!([]));
        assert_eq!(get(&doc, "data.items[].length()"), json!(0));
    }

    #[test]
    fn test_array_marker_then_key_is_null() {
        let doc = json!({"data": {"users": [{"name": "a"}]}});
        assert_eq!(get(&doc, "data.users[].name"), Value::Null);
    }

    #[test]
    fn test_length() {
        let doc = json!({"data": {"items": [1, 2, 3, 4]}});
        assert_eq!(get(&doc, "data.items[].length()"), json!(4));
        assert_eq!(get(&doc, "data.items.length()"), json!(4));
        assert_eq!(get(&json!({"data": {"items": "abc"}}), "data.items.length()"), json!(0));
        assert_eq!(get(&json!({}), "data.items.length()"), json!(0));
    }

    #[test]
    fn test_find_first_element_with_property() {
        let doc = json!({"data": {"users": [
            {"name": "a"},
            {"name": "b", "role": "user"},
            {"name": "c", "role": "admin"}
        ]}});
        assert_eq!(get(&doc, "data.users[].find(role)"), json!("user"));
        assert_eq!(get(&doc, "data.users[].find(email)"), Value::Null);
    }

    #[test]
    fn test_find_counts_explicit_null_as_present() {
        let doc = json!({"users": [{"role": null}, {"role": "admin"}]});
        assert_eq!(get(&doc, "users[].find(role)"), Value::Null);
    }

    #[test]
    fn test_find_on_non_array() {
        let doc = json!({"users": {"role": "admin"}});
        assert_eq!(get(&doc, "users[].find(role)"), Value::Null);
        let path = PathExpr::parse("users[].find(role)");
        assert!(path.find_candidates(&doc).is_none());
    }

    #[test]
    fn test_malformed_path_is_null() {
        let doc = json!({"a": {"b": 1}});
        assert_eq!(get(&doc, "a..b"), Value::Null);
        assert_eq!(get(&doc, "a.b.length().c"), Value::Null);
    }
}
