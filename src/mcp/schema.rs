//! Input validation against the JSON Schemas advertised in `tools/list`.
//!
//! Only the keywords used by this server's schemas are understood:
//! `type`, `properties`, `required`, `additionalProperties: false`, `enum`,
//! `pattern`, `minimum` and `items`. Anything else is ignored, so opaque
//! payloads such as feature definitions (`"type": "object"` with no
//! properties) pass through untouched.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};

use regex::Regex;
use serde_json::Value;

/// Checks `value` against `schema`.
///
/// # Errors
///
/// Returns a message naming the first offending location, e.g.
/// `"stateId: expected string"`.
pub fn validate(schema: &Value, value: &Value) -> Result<(), String> {
    validate_at("arguments", schema, value)
}

fn validate_at(location: &str, schema: &Value, value: &Value) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(expected, value) {
            return Err(format!(
                "{location}: expected {expected}, got {}",
                type_name(value)
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let choices: Vec<String> = allowed.iter().map(Value::to_string).collect();
            return Err(format!(
                "{location}: must be one of {}",
                choices.join(", ")
            ));
        }
    }

    if let (Some(pattern), Some(text)) = (schema.get("pattern").and_then(Value::as_str), value.as_str())
    {
        let re = compiled(pattern)
            .map_err(|e| format!("{location}: schema pattern is invalid: {e}"))?;
        if !re.is_match(text) {
            return Err(format!("{location}: does not match pattern {pattern}"));
        }
    }

    if let (Some(minimum), Some(number)) = (
        schema.get("minimum").and_then(Value::as_f64),
        value.as_f64(),
    ) {
        if number < minimum {
            return Err(format!("{location}: must be at least {minimum}"));
        }
    }

    if let Some(object) = value.as_object() {
        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for name in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(name) {
                    return Err(format!("missing required parameter: {name}"));
                }
            }
        }

        let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
        for (name, field) in object {
            match properties.and_then(|p| p.get(name)) {
                Some(field_schema) => validate_at(name, field_schema, field)?,
                None if closed => return Err(format!("unknown parameter: {name}")),
                None => {}
            }
        }
    }

    if let (Some(items), Some(array)) = (schema.get("items"), value.as_array()) {
        for (index, item) in array.iter().enumerate() {
            validate_at(&format!("{location}[{index}]"), items, item)?;
        }
    }

    Ok(())
}

/// Compiled `pattern` keywords, shared by every call.
fn pattern_cache() -> &'static Mutex<HashMap<String, Regex>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Regex>>> = OnceLock::new();
    CACHE.get_or_init(Mutex::default)
}

fn compiled(pattern: &str) -> Result<Regex, regex::Error> {
    let mut cache = pattern_cache()
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if let Some(re) = cache.get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern)?;
    cache.insert(pattern.to_string(), re.clone());
    Ok(re)
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
