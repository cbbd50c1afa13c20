use conduit_mcp::ToolInfo;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A tool advertised by a provider, stamped with the provider that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, unique across the catalog
    pub name: String,
    /// Human-readable description for the model
    pub description: String,
    /// JSON Schema describing the expected input, as the provider sent it
    pub input_schema: Value,
    /// Identifier of the provider that serves this tool
    pub provider: String,
}

impl ToolDefinition {
    pub fn from_info(info: ToolInfo, provider: &str) -> Self {
        Self {
            name: info.name,
            description: info.description,
            input_schema: info.input_schema,
            provider: provider.to_string(),
        }
    }
}

impl fmt::Display for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}({})", self.name, self.provider, self.description)
    }
}

/// A tool in the completion service's function-calling format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionTool {
    pub name: String,
    pub description: String,
    /// Normalized parameter schema
    pub parameters: Value,
}

/// A tool call as the model emitted it: arguments are still a JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedToolCall {
    /// Correlation id linking this call to its tool-role reply
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

impl RequestedToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Decode the argument string into a `ToolCall`. An empty string is an
    /// empty argument mapping; anything else must be a JSON object.
    pub fn parse(&self) -> Result<ToolCall, ToolCallError> {
        let arguments = if self.arguments.trim().is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(&self.arguments)? {
                Value::Object(map) => map,
                Value::Null => Map::new(),
                other => return Err(ToolCallError::NotAnObject(other.to_string())),
            }
        };
        Ok(ToolCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments,
        })
    }
}

/// A decoded tool call, ready for the permission gate and the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolCallError {
    #[error("Invalid tool arguments: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Tool arguments must be a JSON object, got {0}")]
    NotAnObject(String),
}
