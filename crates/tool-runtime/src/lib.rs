pub mod tool;
pub mod schema;
pub mod catalog;
pub mod result;
pub mod permission;
pub mod conversation;
pub mod provider;
pub mod event;
pub mod runtime;

pub use tool::{FunctionTool, RequestedToolCall, ToolCall, ToolCallError, ToolDefinition};
pub use schema::{normalize_schema, to_function_tool, to_function_tools, SchemaError};
pub use catalog::ToolCatalog;
pub use result::{
    AdaptedResult, ExecutionError, ImagePersistError, ImageStore, PendingImage, ResultAdapter,
    ToolOutcome,
};
pub use permission::{AllowAll, DenyAll, PermissionGate, PermissionLevel, PermissionPolicy, PolicyGate};
pub use conversation::{ContentPart, Conversation, ConversationError, ConversationMessage, UserContent};
pub use provider::{CompletionError, CompletionRequest, CompletionResponse, CompletionService, ToolChoice};
pub use event::{NoopObserver, TurnEvent, TurnObserver, TurnReport};
pub use runtime::{Orchestrator, TurnError, DEFAULT_MAX_FOLLOW_UPS};
