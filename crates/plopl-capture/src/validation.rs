//! Response validation against a schema's match rules.

use crate::condition::evaluate_rule;
use crate::metrics;
use crate::path::extract;
use crate::schema::Schema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Verdict for one response body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub is_valid: bool,
    pub extracted_fields: BTreeMap<String, Value>,
}

/// Extract every rule's field and AND the conditions together.
///
/// Extraction continues past a failing rule so the full field map is always
/// available. A schema without match rules is never valid.
pub fn validate(schema: &Schema, body: &Value) -> MatchResult {
    let Some(rules) = schema.rules.as_ref() else {
        debug!(schema_id = %schema.id, "Schema has no match rules");
        metrics::record_validation(false);
        return MatchResult::default();
    };

    let mut result = MatchResult {
        is_valid: true,
        extracted_fields: BTreeMap::new(),
    };

    for rule in rules {
        let value = extract(body, &rule.path);

        let passed = match &rule.condition {
            Ok(condition) => evaluate_rule(&rule.path, condition, &value, body),
            Err(e) => {
                warn!(
                    schema_id = %schema.id,
                    path = %rule.path,
                    "Rejecting malformed condition: {}",
                    e
                );
                false
            }
        };

        if !passed {
            debug!(
                schema_id = %schema.id,
                path = %rule.path,
                condition = %rule.raw_condition,
                "Condition failed"
            );
            result.is_valid = false;
        }

        result.extracted_fields.insert(rule.path.field_name(), value);
    }

    metrics::record_validation(result.is_valid);
    result
}
