//! Structured-output helpers: pulling a JSON object out of free-form model
//! text and checking it against a small JSON-schema subset.
//!
//! Models frequently wrap JSON in prose or code fences. The scanner returns
//! the first *top-level* balanced `{...}` span, tracking string and escape
//! state so braces inside string literals are ignored.
//!
//! Schemas are derived from the serde types the output is decoded into
//! ([`schema_for`]), so the two cannot drift apart.

use schemars::JsonSchema;
use schemars::generate::SchemaSettings;
use serde_json::Value;

/// JSON schema of `T` with every subschema inlined (no `$ref`), in the
/// shape [`validate`] understands.
pub fn schema_for<T: JsonSchema>() -> Value {
    SchemaSettings::draft2020_12()
        .with(|settings| settings.inline_subschemas = true)
        .into_generator()
        .into_root_schema_for::<T>()
        .to_value()
}

/// Return the first balanced top-level `{...}` span in `text`.
///
/// Braces inside JSON string literals (including escaped quotes) do not
/// count. Returns `None` when no opening brace exists or the first object
/// never closes.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract and parse the first JSON object in `text`.
pub fn parse_json_object(text: &str) -> Result<Value, String> {
    let span = extract_json_object(text).ok_or_else(|| "no JSON object found".to_string())?;
    serde_json::from_str(span).map_err(|e| format!("invalid JSON: {e}"))
}

/// Validate `value` against a JSON-schema subset.
///
/// Supported keywords: `type` (object, array, string, number, integer,
/// boolean, null, or an array of those), `required`, `properties`, `items`,
/// `enum`, `minimum`, `maximum`. Unknown keywords are ignored.
pub fn validate(value: &Value, schema: &Value) -> Result<(), String> {
    validate_at("$", value, schema)
}

fn validate_at(path: &str, value: &Value, schema: &Value) -> Result<(), String> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        let ok = match expected {
            Value::String(t) => type_matches(t, value),
            Value::Array(types) => types
                .iter()
                .filter_map(Value::as_str)
                .any(|t| type_matches(t, value)),
            _ => true,
        };
        if !ok {
            return Err(format!("{path}: expected type {expected}, got {}", type_name(value)));
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            return Err(format!("{path}: value {value} not in enum"));
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if n < min {
                return Err(format!("{path}: {n} is below minimum {min}"));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if n > max {
                return Err(format!("{path}: {n} is above maximum {max}"));
            }
        }
    }

    if let Value::Object(map) = value {
        if let Some(Value::Array(required)) = schema.get("required") {
            for key in required.iter().filter_map(Value::as_str) {
                if !map.contains_key(key) {
                    return Err(format!("{path}: missing required field '{key}'"));
                }
            }
        }
        if let Some(Value::Object(props)) = schema.get("properties") {
            for (key, prop_schema) in props {
                if let Some(child) = map.get(key) {
                    validate_at(&format!("{path}.{key}"), child, prop_schema)?;
                }
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            validate_at(&format!("{path}[{i}]"), item, item_schema)?;
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
