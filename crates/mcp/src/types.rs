//! JSON-RPC 2.0 and MCP protocol types.
//!
//! Implements the wire format spoken with tool providers: one JSON-RPC
//! envelope per line over the provider's standard streams.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::McpError;

// ── JSON-RPC 2.0 Base Types ─────────────────────────────────────────

/// A JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RpcId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A JSON-RPC 2.0 response message (success or error).
///
/// Providers are not required to echo `jsonrpc`, and error replies may carry
/// a null id, so both are lenient on the way in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RpcId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC 2.0 notification (no id, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC request ID. Can be a number or a string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RpcId {
    Number(i64),
    String(String),
}

impl fmt::Display for RpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcId::Number(n) => write!(f, "{}", n),
            RpcId::String(s) => write!(f, "{}", s),
        }
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)?;
        if let Some(data) = &self.data {
            write!(f, ": {}", data)?;
        }
        Ok(())
    }
}

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

// ── Method names ────────────────────────────────────────────────────

pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

/// The MCP protocol version sent during the optional initialize handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ── MCP tools/list ──────────────────────────────────────────────────

/// Result of `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolInfo>,
}

/// Describes a single tool as advertised by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    Value::Object(serde_json::Map::new())
}

// ── MCP tools/call ──────────────────────────────────────────────────

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Result of `tools/call`.
///
/// `content` stays optional: a reply without it is still a valid result and
/// is rendered verbatim by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ToolContent>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

/// Content block within a tool call result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    Text {
        #[serde(default)]
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType", default = "default_image_mime")]
        mime_type: String,
    },
    /// Any block type this client does not understand (audio, resources, ...).
    #[serde(other)]
    Unknown,
}

fn default_image_mime() -> String {
    "image/png".to_string()
}

// ── Helpers ─────────────────────────────────────────────────────────

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request.
    pub fn new(id: RpcId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

impl JsonRpcResponse {
    /// Create a successful response.
    pub fn success(id: RpcId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: RpcId, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Unwrap the envelope: the `result` payload, or the provider's error.
    pub fn into_result(self) -> Result<Value, McpError> {
        if let Some(err) = self.error {
            return Err(McpError::RemoteToolError(err));
        }
        self.result
            .ok_or_else(|| McpError::MalformedResponse("response has neither result nor error".to_string()))
    }
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC 2.0 notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_shape() {
        let req = JsonRpcRequest::new(RpcId::Number(1), methods::TOOLS_LIST, Some(json!({})));
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list", "params": {}})
        );
    }

    #[test]
    fn test_response_without_jsonrpc_field() {
        let resp: JsonRpcResponse =
            serde_json::from_str(r#"{"id":2,"result":{"content":[]}}"#).unwrap();
        assert_eq!(resp.id, Some(RpcId::Number(2)));
        assert!(resp.error.is_none());
        assert_eq!(resp.into_result().unwrap(), json!({"content": []}));
    }

    #[test]
    fn test_error_response_into_result() {
        let resp = JsonRpcResponse::error(RpcId::Number(3), error_codes::METHOD_NOT_FOUND, "nope");
        match resp.into_result() {
            Err(McpError::RemoteToolError(err)) => {
                assert_eq!(err.code, error_codes::METHOD_NOT_FOUND);
                assert_eq!(err.message, "nope");
            }
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_envelope_is_malformed() {
        let resp: JsonRpcResponse = serde_json::from_str(r#"{"id":4}"#).unwrap();
        assert!(matches!(resp.into_result(), Err(McpError::MalformedResponse(_))));
    }

    #[test]
    fn test_rpc_id_forms() {
        assert_eq!(serde_json::to_string(&RpcId::Number(42)).unwrap(), "42");
        let parsed: RpcId = serde_json::from_str("\"req-1\"").unwrap();
        assert_eq!(parsed, RpcId::String("req-1".to_string()));
    }

    #[test]
    fn test_tool_info_defaults() {
        let info: ToolInfo = serde_json::from_value(json!({"name": "ping"})).unwrap();
        assert_eq!(info.description, "");
        assert_eq!(info.input_schema, json!({}));
    }

    #[test]
    fn test_call_result_content_kinds() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "hello"},
                {"type": "image", "data": "aGk=", "mimeType": "image/jpeg"},
                {"type": "resource", "uri": "file:///tmp/x"}
            ],
            "isError": true
        }))
        .unwrap();
        let content = result.content.unwrap();
        assert_eq!(content[0], ToolContent::Text { text: "hello".to_string() });
        assert_eq!(
            content[1],
            ToolContent::Image {
                data: "aGk=".to_string(),
                mime_type: "image/jpeg".to_string()
            }
        );
        assert_eq!(content[2], ToolContent::Unknown);
        assert!(result.is_error);
    }

    #[test]
    fn test_call_result_without_content() {
        let result: CallToolResult = serde_json::from_value(json!({"status": "ok"})).unwrap();
        assert!(result.content.is_none());
        assert!(!result.is_error);
    }
}
