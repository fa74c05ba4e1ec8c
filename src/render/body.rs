//! Example value synthesis
//!
//! Builds literal example values from schema bodies. Precedence per node:
//! declared `example`, then `default`, then a deterministic placeholder
//! derived from type and format. References resolve through a lookup
//! callback up to a bounded depth, so cyclic schema graphs terminate.

use serde_json::{json, Map, Value};

use crate::openapi::reference_target;

/// How many `$ref` hops to follow while synthesizing a body.
pub const MAX_REF_DEPTH: u32 = 2;

/// Structural nesting bound, separate from the reference bound.
const MAX_NESTING: u32 = 16;

/// Synthesize an example value for `schema`. `resolve` maps a component name
/// to its schema body; it returns `None` for unresolved references.
pub fn example_value<F>(schema: &Value, resolve: &F) -> Value
where
    F: Fn(&str) -> Option<Value>,
{
    build(schema, resolve, 0, 0)
}

fn build<F>(schema: &Value, resolve: &F, ref_depth: u32, nesting: u32) -> Value
where
    F: Fn(&str) -> Option<Value>,
{
    if nesting > MAX_NESTING {
        return Value::Null;
    }

    if let Some(reference) = schema.get("$ref").and_then(|r| r.as_str()) {
        if ref_depth >= MAX_REF_DEPTH {
            return Value::Null;
        }
        let name = reference_target(reference);
        return match resolve(&name) {
            Some(resolved) => build(&resolved, resolve, ref_depth + 1, nesting + 1),
            None => Value::Null,
        };
    }

    if let Some(example) = schema.get("example") {
        return example.clone();
    }
    if let Some(default) = schema.get("default") {
        return default.clone();
    }
    if let Some(first) = schema
        .get("enum")
        .and_then(|e| e.as_array())
        .and_then(|arr| arr.first())
    {
        return first.clone();
    }

    let schema_type = schema.get("type").and_then(|t| t.as_str());
    let format = schema.get("format").and_then(|f| f.as_str());

    match schema_type {
        Some("object") | None if schema.get("properties").is_some() => {
            let mut object = Map::new();
            if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
                for (name, property) in properties {
                    object.insert(
                        name.clone(),
                        build(property, resolve, ref_depth, nesting + 1),
                    );
                }
            }
            Value::Object(object)
        }
        Some("object") => json!({}),
        Some("array") => match schema.get("items") {
            Some(items) => json!([build(items, resolve, ref_depth, nesting + 1)]),
            None => json!([]),
        },
        Some("string") => Value::String(string_placeholder(format)),
        Some("integer") => json!(1),
        Some("number") => json!(1.0),
        Some("boolean") => json!(true),
        _ => Value::Null,
    }
}

/// Deterministic placeholder for a string by format.
pub fn string_placeholder(format: Option<&str>) -> String {
    match format {
        Some("uuid") => "00000000-0000-0000-0000-000000000000".to_string(),
        Some("date-time") => "2024-01-01T00:00:00Z".to_string(),
        Some("date") => "2024-01-01".to_string(),
        Some("email") => "user@example.com".to_string(),
        Some("uri") | Some("url") => "https://example.com".to_string(),
        _ => "example".to_string(),
    }
}

/// Placeholder for a path or query parameter from its schema.
pub fn parameter_placeholder(schema: Option<&Value>, example: Option<&Value>) -> String {
    if let Some(example) = example {
        return scalar_to_string(example);
    }
    let Some(schema) = schema else {
        return "example".to_string();
    };
    if let Some(example) = schema.get("example") {
        return scalar_to_string(example);
    }

    let format = schema.get("format").and_then(|f| f.as_str());
    match schema.get("type").and_then(|t| t.as_str()) {
        Some("integer") => "1".to_string(),
        Some("number") => "1.0".to_string(),
        Some("boolean") => "true".to_string(),
        _ => string_placeholder(format),
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
