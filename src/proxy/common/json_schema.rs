//! Reshapes caller-supplied JSON Schema into the restricted dialect the
//! upstream accepts. The transformation is total: unknown structures are
//! copied through, never rejected.

use serde_json::{Map, Value};
use std::collections::HashSet;

const DROP_KEYS: &[&str] = &[
    "$defs",
    "definitions",
    "$schema",
    "$id",
    "const",
    "oneOf",
    "strict",
];

const PASSTHROUGH_KEYS: &[&str] = &["required", "description", "enum", "format", "nullable"];

pub fn sanitize_schema(schema: &Value) -> Value {
    let mut visited = HashSet::new();
    sanitize_inner(schema, &mut visited)
}

/// `visited` holds node addresses, not structural hashes: identity is what
/// breaks self-referential schemas without penalizing repeated subtrees.
fn sanitize_inner(schema: &Value, visited: &mut HashSet<usize>) -> Value {
    let Value::Object(map) = schema else {
        return schema.clone();
    };

    let id = schema as *const Value as usize;
    if !visited.insert(id) {
        return schema.clone();
    }

    let mut result = Map::new();

    for (key, value) in map {
        match key.as_str() {
            "type" => {
                result.insert("type".to_string(), Value::String(convert_type(value)));
            }
            "properties" => {
                if let Value::Object(props) = value {
                    let mut cleaned = Map::new();
                    for (name, prop) in props {
                        let out = if prop.is_object() {
                            sanitize_inner(prop, visited)
                        } else {
                            prop.clone()
                        };
                        cleaned.insert(name.clone(), out);
                    }
                    result.insert("properties".to_string(), Value::Object(cleaned));
                }
            }
            "items" => {
                if value.is_object() {
                    result.insert("items".to_string(), sanitize_inner(value, visited));
                }
            }
            "allOf" => {
                if let Value::Array(members) = value {
                    for (k, v) in merge_all_of(members, visited) {
                        result.insert(k, v);
                    }
                }
            }
            "anyOf" => {
                if let Value::Array(members) = value {
                    if let Some(values) = enum_from_any_of(members) {
                        result.insert("enum".to_string(), Value::Array(values));
                    }
                }
            }
            // Folded into the description after the walk.
            "default" => {}
            k if DROP_KEYS.contains(&k) => {}
            k if PASSTHROUGH_KEYS.contains(&k) => {
                result.insert(key.clone(), value.clone());
            }
            _ => {
                result.insert(key.clone(), value.clone());
            }
        }
    }

    if let Some(default) = map.get("default") {
        let suffix = format!("(Default: {})", render_default(default));
        let description = match result.get("description").and_then(Value::as_str) {
            Some(existing) => format!("{} {}", existing, suffix),
            None => suffix,
        };
        result.insert("description".to_string(), Value::String(description));
    }

    Value::Object(result)
}

fn convert_type(value: &Value) -> String {
    match value {
        Value::String(name) => type_name_upper(name),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .find(|s| *s != "null")
            .map(type_name_upper)
            .unwrap_or_else(|| "STRING".to_string()),
        _ => "STRING".to_string(),
    }
}

fn type_name_upper(name: &str) -> String {
    match name.to_ascii_lowercase().as_str() {
        "string" => "STRING",
        "number" => "NUMBER",
        "integer" => "INTEGER",
        "boolean" => "BOOLEAN",
        "array" => "ARRAY",
        "object" => "OBJECT",
        _ => "STRING",
    }
    .to_string()
}

/// Element-wise merge: properties are unioned, required lists concatenated,
/// every other key is last-writer-wins.
fn merge_all_of(members: &[Value], visited: &mut HashSet<usize>) -> Map<String, Value> {
    let mut merged = Map::new();
    let mut properties = Map::new();
    let mut required = Vec::new();

    for member in members {
        if !member.is_object() {
            continue;
        }
        let cleaned = sanitize_inner(member, visited);
        let Value::Object(cleaned) = cleaned else {
            continue;
        };
        for (key, value) in cleaned {
            match key.as_str() {
                "properties" => {
                    if let Value::Object(props) = value {
                        for (name, prop) in props {
                            properties.insert(name, prop);
                        }
                    }
                }
                "required" => {
                    if let Value::Array(names) = value {
                        required.extend(names);
                    }
                }
                _ => {
                    merged.insert(key, value);
                }
            }
        }
    }

    if !properties.is_empty() {
        merged.insert("properties".to_string(), Value::Object(properties));
    }
    if !required.is_empty() {
        merged.insert("required".to_string(), Value::Array(required));
    }

    merged
}

/// `anyOf` collapses to an enum only when every member is an object carrying
/// a `const`; anything else drops the key entirely.
fn enum_from_any_of(members: &[Value]) -> Option<Vec<Value>> {
    let mut values = Vec::with_capacity(members.len());
    for member in members {
        let constant = member.as_object()?.get("const")?;
        values.push(constant.clone());
    }
    Some(values)
}

fn render_default(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uppercases_scalar_types() {
        let out = sanitize_schema(&json!({"type": "object"}));
        assert_eq!(out["type"], "OBJECT");
    }

    #[test]
    fn type_array_picks_first_non_null() {
        let out = sanitize_schema(&json!({"type": ["null", "integer"]}));
        assert_eq!(out["type"], "INTEGER");

        let out = sanitize_schema(&json!({"type": ["null"]}));
        assert_eq!(out["type"], "STRING");
    }

    #[test]
    fn unknown_type_defaults_to_string() {
        let out = sanitize_schema(&json!({"type": "date-time"}));
        assert_eq!(out["type"], "STRING");
    }

    #[test]
    fn recurses_into_properties_and_items() {
        let out = sanitize_schema(&json!({
            "type": "object",
            "properties": {
                "tags": {"type": "array", "items": {"type": "string"}}
            }
        }));
        assert_eq!(out["properties"]["tags"]["type"], "ARRAY");
        assert_eq!(out["properties"]["tags"]["items"]["type"], "STRING");
    }

    #[test]
    fn drops_unsupported_keys() {
        let out = sanitize_schema(&json!({
            "type": "object",
            "$defs": {"x": {}},
            "$schema": "http://json-schema.org/draft-07/schema#",
            "oneOf": [{"type": "string"}],
            "strict": true
        }));
        assert!(out.get("$defs").is_none());
        assert!(out.get("$schema").is_none());
        assert!(out.get("oneOf").is_none());
        assert!(out.get("strict").is_none());
    }

    #[test]
    fn unknown_keys_are_copied_verbatim() {
        let out = sanitize_schema(&json!({"type": "number", "minimum": 3}));
        assert_eq!(out["minimum"], 3);
    }

    #[test]
    fn all_of_merges_properties_and_required() {
        let out = sanitize_schema(&json!({
            "allOf": [
                {"type": "object", "properties": {"a": {"type": "string"}}, "required": ["a"]},
                {"type": "object", "properties": {"b": {"type": "integer"}}, "required": ["b"]}
            ]
        }));
        assert_eq!(out["type"], "OBJECT");
        assert_eq!(out["properties"]["a"]["type"], "STRING");
        assert_eq!(out["properties"]["b"]["type"], "INTEGER");
        assert_eq!(out["required"], json!(["a", "b"]));
    }

    #[test]
    fn any_of_with_all_consts_collapses_to_enum() {
        let out = sanitize_schema(&json!({
            "anyOf": [{"const": "red"}, {"const": "green"}, {"const": "blue"}]
        }));
        assert_eq!(out["enum"], json!(["red", "green", "blue"]));
    }

    #[test]
    fn any_of_with_missing_const_is_dropped() {
        let out = sanitize_schema(&json!({
            "anyOf": [{"const": "red"}, {"type": "string"}]
        }));
        assert!(out.get("anyOf").is_none());
        assert!(out.get("enum").is_none());
    }

    #[test]
    fn default_creates_description_when_absent() {
        let out = sanitize_schema(&json!({
            "type": "object",
            "properties": {
                "x": {"type": ["string", "null"], "default": "hi"}
            },
            "$defs": {},
            "oneOf": [{"type": "string"}]
        }));
        assert_eq!(out["type"], "OBJECT");
        assert_eq!(out["properties"]["x"]["type"], "STRING");
        assert_eq!(out["properties"]["x"]["description"], "(Default: hi)");
        assert!(out.get("$defs").is_none());
        assert!(out.get("oneOf").is_none());
    }

    #[test]
    fn default_appends_to_existing_description() {
        let out = sanitize_schema(&json!({
            "type": "integer",
            "description": "retry count",
            "default": 5
        }));
        assert_eq!(out["description"], "retry count (Default: 5)");
    }

    #[test]
    fn sanitize_is_idempotent_on_clean_schemas() {
        let clean = sanitize_schema(&json!({
            "type": "object",
            "description": "payload",
            "properties": {
                "kind": {"type": "string", "enum": ["a", "b"], "format": "uuid"},
                "count": {"type": "integer", "nullable": true}
            },
            "required": ["kind"]
        }));
        let twice = sanitize_schema(&clean);
        assert_eq!(clean, twice);
    }

    #[test]
    fn non_object_input_is_returned_unchanged() {
        assert_eq!(sanitize_schema(&json!(true)), json!(true));
        assert_eq!(sanitize_schema(&json!(null)), json!(null));
    }
}
