//! Decoding of raw request/response payloads.

use serde_json::{json, Value};

/// Characters of a non-JSON text body kept in the fallback value.
const TEXT_PREVIEW_CHARS: usize = 1000;

/// Decode a captured body.
///
/// JSON bodies decode as-is. Anything else becomes a tagged fallback,
/// `{type: "text", content}` (truncated) or `{type: "binary", size}`, so an
/// odd payload never fails the exchange. Empty bodies are `null`.
pub fn decode_body(raw: &[u8]) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }

    if let Ok(value) = serde_json::from_slice::<Value>(raw) {
        return value;
    }

    match std::str::from_utf8(raw) {
        Ok(text) if text.trim().is_empty() => Value::Null,
        Ok(text) => json!({
            "type": "text",
            "content": text.chars().take(TEXT_PREVIEW_CHARS).collect::<String>(),
        }),
        Err(_) => json!({
            "type": "binary",
            "size": raw.len(),
        }),
    }
}
