//! Translation between conversation types and the chat-completions wire format.

use serde_json::{json, Value};

use conduit_tool_runtime::{
    CompletionError, CompletionRequest, CompletionResponse, ContentPart, ConversationMessage,
    FunctionTool, RequestedToolCall, ToolChoice, UserContent,
};

/// Translate a [`FunctionTool`] into a `tools` array entry.
pub(super) fn function_tool_to_openai(tool: &FunctionTool) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

/// Translate a [`ConversationMessage`] into a chat message object.
pub(super) fn message_to_openai(msg: &ConversationMessage) -> Value {
    match msg {
        ConversationMessage::User { content } => json!({
            "role": "user",
            "content": user_content_to_openai(content),
        }),
        ConversationMessage::Assistant { content, tool_calls } => {
            let mut message = json!({
                "role": "assistant",
                "content": content,
            });
            if !tool_calls.is_empty() {
                message["tool_calls"] = tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments,
                            }
                        })
                    })
                    .collect();
            }
            message
        }
        ConversationMessage::Tool {
            tool_call_id,
            content,
        } => json!({
            "role": "tool",
            "tool_call_id": tool_call_id,
            "content": content,
        }),
    }
}

fn user_content_to_openai(content: &UserContent) -> Value {
    match content {
        UserContent::Text(text) => json!(text),
        UserContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({"type": "text", "text": text}),
                ContentPart::ImageUrl { url } => json!({
                    "type": "image_url",
                    "image_url": {"url": url},
                }),
            })
            .collect(),
    }
}

fn tool_choice_to_openai(choice: ToolChoice) -> &'static str {
    match choice {
        ToolChoice::Auto => "auto",
        ToolChoice::None => "none",
        ToolChoice::Required => "required",
    }
}

/// Build the request body. `tools` and `tool_choice` are omitted when no
/// tools are attached.
pub(super) fn request_body(request: &CompletionRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": request.messages.iter().map(message_to_openai).collect::<Vec<_>>(),
    });
    if !request.tools.is_empty() {
        body["tools"] = request.tools.iter().map(function_tool_to_openai).collect();
        body["tool_choice"] = json!(tool_choice_to_openai(request.tool_choice));
    }
    body
}

/// Extract `choices[0].message` from a response body.
pub(super) fn parse_response(body: &Value) -> Result<CompletionResponse, CompletionError> {
    let message = body["choices"][0]["message"]
        .as_object()
        .ok_or_else(|| CompletionError::InvalidResponse("missing choices[0].message".into()))?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .map(str::to_string);

    let tool_calls = match message.get("tool_calls") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(calls)) => calls
            .iter()
            .enumerate()
            .map(|(index, call)| parse_tool_call(index, call))
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(CompletionError::InvalidResponse(format!(
                "tool_calls must be an array, got {}",
                other
            )))
        }
    };

    Ok(CompletionResponse {
        content,
        tool_calls,
    })
}

fn parse_tool_call(index: usize, call: &Value) -> Result<RequestedToolCall, CompletionError> {
    let id = call["id"]
        .as_str()
        .ok_or_else(|| CompletionError::InvalidResponse(format!("tool_calls[{}] has no id", index)))?;
    let name = call["function"]["name"].as_str().ok_or_else(|| {
        CompletionError::InvalidResponse(format!("tool_calls[{}] has no function name", index))
    })?;
    // Some servers send arguments as an object instead of a JSON string.
    let arguments = match &call["function"]["arguments"] {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    Ok(RequestedToolCall::new(id, name, arguments))
}
