use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::tool::RequestedToolCall;

/// A message in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ConversationMessage {
    /// User input, text or multimodal
    User { content: UserContent },
    /// Assistant reply; may carry text and/or tool calls
    Assistant {
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<RequestedToolCall>,
    },
    /// Reply to one assistant tool call
    Tool { tool_call_id: String, content: String },
}

impl ConversationMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User {
            content: UserContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Assistant {
            content: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<RequestedToolCall>) -> Self {
        Self::Assistant {
            content: None,
            tool_calls,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }
}

/// User message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One part of a multimodal user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// An image by URL; tool images are sent as `data:` URIs
    ImageUrl { url: String },
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConversationError {
    #[error("tool message references unknown or already answered call '{0}'")]
    UnmatchedToolCall(String),
    #[error("duplicate tool call id '{0}'")]
    DuplicateToolCall(String),
}

/// Append-only conversation history.
///
/// Every tool message must answer exactly one earlier assistant tool call;
/// `push` rejects anything else.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<ConversationMessage>,
    issued: HashSet<String>,
    outstanding: HashSet<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ConversationMessage) -> Result<(), ConversationError> {
        match &message {
            ConversationMessage::Assistant { tool_calls, .. } => {
                let mut seen = HashSet::new();
                for call in tool_calls {
                    if self.issued.contains(&call.id) || !seen.insert(call.id.as_str()) {
                        return Err(ConversationError::DuplicateToolCall(call.id.clone()));
                    }
                }
                for call in tool_calls {
                    self.issued.insert(call.id.clone());
                    self.outstanding.insert(call.id.clone());
                }
            }
            ConversationMessage::Tool { tool_call_id, .. } => {
                if !self.outstanding.remove(tool_call_id) {
                    return Err(ConversationError::UnmatchedToolCall(tool_call_id.clone()));
                }
            }
            ConversationMessage::User { .. } => {}
        }
        self.messages.push(message);
        Ok(())
    }

    /// Rename calls whose id was issued earlier, or repeats within `calls`,
    /// to `<id>#<n>`. Returns how many were renamed.
    pub fn assign_unique_ids(&self, calls: &mut [RequestedToolCall]) -> usize {
        let original: HashSet<String> = calls.iter().map(|c| c.id.clone()).collect();
        let mut taken: HashSet<String> = HashSet::new();
        let mut renamed = 0;
        for call in calls.iter_mut() {
            if self.issued.contains(&call.id) || taken.contains(&call.id) {
                let fresh = (1..)
                    .map(|n| format!("{}#{}", call.id, n))
                    .find(|candidate| {
                        !self.issued.contains(candidate)
                            && !taken.contains(candidate)
                            && !original.contains(candidate)
                    })
                    .unwrap_or_default();
                call.id = fresh;
                renamed += 1;
            }
            taken.insert(call.id.clone());
        }
        renamed
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(ConversationMessage::user(text));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(ConversationMessage::assistant(text));
    }

    pub fn push_user_parts(&mut self, parts: Vec<ContentPart>) {
        self.messages.push(ConversationMessage::User {
            content: UserContent::Parts(parts),
        });
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ConversationMessage> {
        self.messages.last()
    }

    /// Tool call ids that have no tool reply yet.
    pub fn unanswered(&self) -> impl Iterator<Item = &str> {
        self.outstanding.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
