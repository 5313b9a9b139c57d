//! Request matching against the active schema.
//!
//! Pure predicates only; safe to call from any thread without coordination.

use crate::schema::Schema;
use serde_json::Value;

/// Prefix length compared when neither query contains the other.
const QUERY_PREFIX_CHARS: usize = 30;

/// Outcome of matching a request against a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchVerdict {
    Rejected,
    /// URL and method match but the body query could not be checked yet.
    Provisional,
    Confirmed,
}

impl MatchVerdict {
    pub fn is_match(self) -> bool {
        !matches!(self, MatchVerdict::Rejected)
    }
}

/// Decide whether an intercepted request is the call `schema` describes.
pub fn matches(url: &str, method: &str, body: Option<&Value>, schema: &Schema) -> bool {
    verdict(url, method, body, schema).is_match()
}

pub fn verdict(url: &str, method: &str, body: Option<&Value>, schema: &Schema) -> MatchVerdict {
    let request = &schema.request;

    if method != request.method || !url_matches(url, &request.url_substring) {
        return MatchVerdict::Rejected;
    }

    let Some(target) = request.body_query.as_deref() else {
        return MatchVerdict::Confirmed;
    };

    match body {
        None | Some(Value::Null) => MatchVerdict::Provisional,
        Some(body) => match body.get("query").and_then(Value::as_str) {
            Some(actual) if !queries_match(target, actual) => MatchVerdict::Rejected,
            _ => MatchVerdict::Confirmed,
        },
    }
}

/// Containment in either direction. Case-sensitive.
pub fn url_matches(url: &str, url_substring: &str) -> bool {
    url.contains(url_substring) || url_substring.contains(url)
}

/// Collapse whitespace runs to a single space and trim.
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fuzzy GraphQL query comparison.
///
/// Normalized queries match when one contains the other, or when both are
/// longer than 30 characters and share the same first 30.
pub fn queries_match(target: &str, actual: &str) -> bool {
    let target = normalize_query(target);
    let actual = normalize_query(actual);

    if actual.contains(&target) || target.contains(&actual) {
        return true;
    }

    let target_len = target.chars().count();
    let actual_len = actual.chars().count();
    target_len > QUERY_PREFIX_CHARS
        && actual_len > QUERY_PREFIX_CHARS
        && target.chars().take(QUERY_PREFIX_CHARS).eq(actual.chars().take(QUERY_PREFIX_CHARS))
}
