//! Normalization of provider input schemas into function-calling parameters.
//!
//! Some completion backends reject schemas that the providers consider
//! valid. Normalization walks every schema node and:
//!
//! - gives an object node with no properties a single placeholder string
//!   property, so it is still a valid parameter object;
//! - recurses into declared properties (and array `items`);
//! - strips `format` from string nodes unless it is `date-time` or `enum`.

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::tool::{FunctionTool, ToolDefinition};

/// Name of the synthetic property added to empty object schemas.
pub const PLACEHOLDER_PROPERTY: &str = "dummy";

/// String formats the completion backend accepts.
pub const ALLOWED_STRING_FORMATS: [&str; 2] = ["date-time", "enum"];

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Input schema must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("'properties' at {path} must be an object")]
    InvalidProperties { path: String },
}

fn placeholder_property() -> Value {
    json!({
        "type": "string",
        "description": "Placeholder parameter"
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Normalize a schema in place. The root must be a JSON object.
pub fn normalize_schema(schema: &mut Value) -> Result<(), SchemaError> {
    match schema {
        Value::Object(node) => normalize_node(node, "$"),
        other => Err(SchemaError::NotAnObject(kind(other))),
    }
}

fn normalize_node(node: &mut Map<String, Value>, path: &str) -> Result<(), SchemaError> {
    match node.get("type").and_then(Value::as_str) {
        Some("object") => {
            let has_properties = match node.get_mut("properties") {
                None | Some(Value::Null) => false,
                Some(Value::Object(props)) if props.is_empty() => false,
                Some(Value::Object(props)) => {
                    for (key, prop) in props.iter_mut() {
                        if let Value::Object(child) = prop {
                            normalize_node(child, &format!("{}.{}", path, key))?;
                        }
                    }
                    true
                }
                Some(_) => {
                    return Err(SchemaError::InvalidProperties {
                        path: path.to_string(),
                    })
                }
            };
            if !has_properties {
                let mut props = Map::new();
                props.insert(PLACEHOLDER_PROPERTY.to_string(), placeholder_property());
                node.insert("properties".to_string(), Value::Object(props));
            }
        }
        Some("array") => {
            if let Some(Value::Object(items)) = node.get_mut("items") {
                normalize_node(items, &format!("{}[]", path))?;
            }
        }
        Some("string") => {
            let keep = match node.get("format") {
                None => true,
                Some(format) => format
                    .as_str()
                    .is_some_and(|f| ALLOWED_STRING_FORMATS.contains(&f)),
            };
            if !keep {
                debug!(path, "Stripping unsupported string format");
                node.remove("format");
            }
        }
        _ => {}
    }
    Ok(())
}

/// Convert one tool definition into a function-calling entry.
pub fn to_function_tool(def: &ToolDefinition) -> Result<FunctionTool, SchemaError> {
    let mut parameters = def.input_schema.clone();
    normalize_schema(&mut parameters)?;
    Ok(FunctionTool {
        name: def.name.clone(),
        description: def.description.clone(),
        parameters,
    })
}

/// Convert every definition, skipping (and logging) any that fail.
pub fn to_function_tools(defs: &[ToolDefinition]) -> Vec<FunctionTool> {
    defs.iter()
        .filter_map(|def| match to_function_tool(def) {
            Ok(tool) => Some(tool),
            Err(e) => {
                warn!(tool = %def.name, provider = %def.provider, error = %e, "Could not convert tool schema, skipping");
                None
            }
        })
        .collect()
}
