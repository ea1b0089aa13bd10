//! Locating the JSON object inside raw model output.

use crate::contract::field::json_kind;
use crate::provider::RawOutput;
use serde_json::{Map, Value};

/// Returns the JSON object carried by `raw`, or a reason why there is none.
///
/// Text output may be bare JSON, a fenced code block, or JSON surrounded by
/// prose. The outermost `{ ... }` span is tried when direct parsing fails.
pub fn extract_object(raw: &RawOutput) -> Result<Map<String, Value>, String> {
    match raw {
        RawOutput::Structured(value) => into_object(value.clone()),
        RawOutput::Text(text) => parse_text(text),
    }
}

fn into_object(value: Value) -> Result<Map<String, Value>, String> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected a JSON object, got {}", json_kind(&other))),
    }
}

fn parse_text(text: &str) -> Result<Map<String, Value>, String> {
    let trimmed = strip_code_fence(text.trim());
    if trimmed.is_empty() {
        return Err("output was empty".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return into_object(value);
    }

    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str::<Value>(&trimmed[start..=end])
                .map_err(|e| format!("invalid JSON object: {}", e))
                .and_then(into_object)
        }
        _ => Err("no JSON object found in text output".to_string()),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (`json`, `JSON`, ...) on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
