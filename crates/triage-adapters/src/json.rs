//! Lenient JSON extraction from model output.
//!
//! Local models wrap answers in prose or code fences, leave trailing
//! commas, and occasionally drop the quotes around a string value. These
//! helpers recover the first JSON object before handing it to serde.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{AdapterError, Result};

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("static regex"));
static OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("static regex"));
static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("static regex"));
static UNQUOTED_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(\w+)":\s+([A-Za-z][^",\n{}\[\]]*[^",\s{}\[\]])(\s*[,}\n])"#)
        .expect("static regex")
});

/// Find and parse the JSON object in `text`.
pub fn extract_object(text: &str) -> Result<Value> {
    let body = FENCE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);
    let candidate = OBJECT_RE
        .find(body)
        .map(|m| m.as_str())
        .ok_or_else(|| AdapterError::decode("model output", "no JSON object found"))?;

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        return Ok(value);
    }
    let repaired = repair(candidate);
    serde_json::from_str(&repaired).map_err(|e| AdapterError::decode("model output", e))
}

/// Drop trailing commas and quote bare word values.
fn repair(raw: &str) -> String {
    let without_commas = TRAILING_COMMA_RE.replace_all(raw, "$1");
    UNQUOTED_VALUE_RE
        .replace_all(&without_commas, |caps: &regex::Captures<'_>| {
            let value = &caps[2];
            if matches!(value, "true" | "false" | "null") {
                caps[0].to_string()
            } else {
                format!("\"{}\": \"{}\"{}", &caps[1], value, &caps[3])
            }
        })
        .into_owned()
}

/// String field, trimmed; `None` when absent, null or blank.
pub(crate) fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// String array field. Non-string entries are skipped.
pub(crate) fn str_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Number field, also accepting numeric strings like `"0.8"`.
pub(crate) fn f64_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn bool_field(value: &Value, key: &str) -> bool {
    match value.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}
