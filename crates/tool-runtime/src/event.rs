use serde_json::{Map, Value};
use std::path::PathBuf;

/// Something that happened during a turn, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// The model produced text
    AssistantText(String),
    /// The model asked for a tool call; arguments are decoded
    ToolRequested {
        id: String,
        name: String,
        arguments: Map<String, Value>,
    },
    /// The permission gate said no
    ToolRejected { id: String, name: String },
    /// A tool message was appended for this call
    ToolResult {
        id: String,
        name: String,
        content: String,
        is_error: bool,
    },
    ImageSaved { path: PathBuf, mime_type: String },
    /// The turn stopped issuing follow-up requests
    FollowUpLimitReached { limit: usize },
}

/// Receives turn events as they happen.
pub trait TurnObserver: Send + Sync {
    fn on_event(&self, event: &TurnEvent);
}

/// Ignores every event.
pub struct NoopObserver;

impl TurnObserver for NoopObserver {
    fn on_event(&self, _event: &TurnEvent) {}
}

/// Everything one turn produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnReport {
    pub events: Vec<TurnEvent>,
    /// Follow-up completion requests issued after tool batches
    pub follow_ups: usize,
}

impl TurnReport {
    /// Assistant text in the order it arrived.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|e| match e {
            TurnEvent::AssistantText(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// The last thing the assistant said this turn.
    pub fn final_text(&self) -> Option<&str> {
        self.texts().last()
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &TurnEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, TurnEvent::ToolResult { .. }))
    }

    pub fn hit_follow_up_limit(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, TurnEvent::FollowUpLimitReached { .. }))
    }
}
