use crate::catalog::ToolCatalog;
use crate::conversation::{ContentPart, Conversation, ConversationError, ConversationMessage};
use crate::event::{NoopObserver, TurnEvent, TurnObserver, TurnReport};
use crate::permission::PermissionGate;
use crate::provider::{CompletionError, CompletionRequest, CompletionResponse, CompletionService, ToolChoice};
use crate::result::{ExecutionError, PendingImage, ResultAdapter, ToolOutcome};
use crate::tool::{RequestedToolCall, ToolCall};
use conduit_mcp::ProcessManager;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Tool message content for a call the user declined.
pub const REJECTION_MESSAGE: &str = "Tool call was rejected by the user.";

/// Assistant line inserted before a staged image is shown to the model.
pub const IMAGE_ACK_MESSAGE: &str = "I've captured the screenshot. Can you show it to me?";

/// Text part accompanying a staged image.
pub const IMAGE_PROMPT: &str = "Here is the screenshot that was captured:";

/// Follow-up completions allowed per turn before the turn is cut short.
pub const DEFAULT_MAX_FOLLOW_UPS: usize = 16;

/// Drives one interactive session: model turns interleaved with gated tool
/// execution.
///
/// Flow: User → Model → ToolCalls → Gate → Execute → Results → Model → ... → Text
///
/// The orchestrator owns the conversation history, the provider processes
/// and the single pending-image slot. Nothing here is global; the CLI holds
/// one `Orchestrator` per session.
pub struct Orchestrator {
    model: String,
    completion: Arc<dyn CompletionService>,
    gate: Arc<dyn PermissionGate>,
    processes: ProcessManager,
    adapter: ResultAdapter,
    catalog: Option<ToolCatalog>,
    conversation: Conversation,
    pending_image: Option<PendingImage>,
    observer: Arc<dyn TurnObserver>,
    max_follow_ups: usize,
}

impl Orchestrator {
    pub fn new(
        model: impl Into<String>,
        completion: Arc<dyn CompletionService>,
        gate: Arc<dyn PermissionGate>,
        processes: ProcessManager,
        adapter: ResultAdapter,
    ) -> Self {
        Self {
            model: model.into(),
            completion,
            gate,
            processes,
            adapter,
            catalog: None,
            conversation: Conversation::new(),
            pending_image: None,
            observer: Arc::new(NoopObserver),
            max_follow_ups: DEFAULT_MAX_FOLLOW_UPS,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_max_follow_ups(mut self, max: usize) -> Self {
        self.max_follow_ups = max;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn catalog(&self) -> Option<&ToolCatalog> {
        self.catalog.as_ref()
    }

    pub fn pending_image(&self) -> Option<&PendingImage> {
        self.pending_image.as_ref()
    }

    pub fn processes(&self) -> &ProcessManager {
        &self.processes
    }

    /// Discover tools once and cache the catalog for the session.
    pub async fn discover_tools(&mut self) -> &ToolCatalog {
        if self.catalog.is_none() {
            let catalog = ToolCatalog::discover(&mut self.processes).await;
            info!(tools = catalog.len(), "Tool catalog ready");
            self.catalog = Some(catalog);
        }
        self.catalog.get_or_insert_with(ToolCatalog::default)
    }

    /// Run one user turn until the model answers without tool calls or the
    /// follow-up limit is reached.
    ///
    /// A completion failure aborts the turn; the session stays usable.
    pub async fn run_turn(&mut self, input: &str) -> Result<TurnReport, TurnError> {
        self.discover_tools().await;
        let mut report = TurnReport::default();

        // An image left over from a cut-short turn is shown before the new input.
        self.flush_pending_image();
        self.conversation.push_user(input);

        let response = self.request_completion().await?;
        let mut queue: VecDeque<RequestedToolCall> = self.record_response(response, &mut report)?.into();

        while !queue.is_empty() {
            debug!(pending = queue.len(), "Resolving tool call batch");
            while let Some(call) = queue.pop_front() {
                self.resolve(call, &mut report).await?;
            }

            if report.follow_ups >= self.max_follow_ups {
                warn!(limit = self.max_follow_ups, "Follow-up limit reached, ending turn");
                self.emit(
                    &mut report,
                    TurnEvent::FollowUpLimitReached {
                        limit: self.max_follow_ups,
                    },
                );
                break;
            }

            report.follow_ups += 1;
            let response = self.request_completion().await?;
            queue.extend(self.record_response(response, &mut report)?);
        }

        Ok(report)
    }

    /// Terminate every provider process.
    pub async fn shutdown(&mut self) {
        self.processes.shutdown().await;
    }

    async fn request_completion(&mut self) -> Result<CompletionResponse, CompletionError> {
        self.flush_pending_image();
        let tools = self
            .catalog
            .as_ref()
            .map(|c| c.functions().to_vec())
            .unwrap_or_default();
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: self.conversation.messages().to_vec(),
            tools,
            tool_choice: ToolChoice::Auto,
        };
        debug!(
            service = self.completion.service_name(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Requesting completion"
        );
        self.completion.complete(request).await
    }

    /// Show a staged image to the model as an assistant/user exchange.
    fn flush_pending_image(&mut self) {
        if let Some(image) = self.pending_image.take() {
            debug!(path = %image.path.display(), "Attaching staged image");
            self.conversation.push_assistant(IMAGE_ACK_MESSAGE);
            self.conversation.push_user_parts(vec![
                ContentPart::Text {
                    text: IMAGE_PROMPT.to_string(),
                },
                ContentPart::ImageUrl {
                    url: image.data_url(),
                },
            ]);
        }
    }

    /// Append the model's reply to history and return its tool calls.
    fn record_response(
        &mut self,
        response: CompletionResponse,
        report: &mut TurnReport,
    ) -> Result<Vec<RequestedToolCall>, TurnError> {
        if let Some(text) = response.text_content() {
            self.conversation.push_assistant(text);
            self.emit(report, TurnEvent::AssistantText(text.to_string()));
        }
        let mut tool_calls = response.tool_calls;
        if !tool_calls.is_empty() {
            info!(count = tool_calls.len(), "Model requested tool calls");
            let renamed = self.conversation.assign_unique_ids(&mut tool_calls);
            if renamed > 0 {
                warn!(renamed, "Model reused tool call ids, assigned fresh ones");
            }
            self.conversation
                .push(ConversationMessage::assistant_tool_calls(tool_calls.clone()))?;
        }
        Ok(tool_calls)
    }

    /// Answer one tool call with exactly one tool message.
    async fn resolve(&mut self, requested: RequestedToolCall, report: &mut TurnReport) -> Result<(), TurnError> {
        let call = match requested.parse() {
            Ok(call) => call,
            Err(e) => {
                warn!(tool = %requested.name, error = %e, "Undecodable tool arguments");
                let content = format!("Error executing tool: {}", e);
                return self.answer(report, &requested.id, &requested.name, content, true);
            }
        };

        self.emit(
            report,
            TurnEvent::ToolRequested {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        );

        let known = self
            .catalog
            .as_ref()
            .is_some_and(|c| c.provider_for(&call.name).is_some());
        if !known {
            let outcome = ToolOutcome::Failed(ExecutionError::UnknownTool(call.name.clone()));
            let adapted = self.adapter.adapt(&call.id, outcome).await;
            return self.append(report, &call.name, adapted.message, adapted.is_error);
        }

        if !self.gate.authorize(&call).await {
            info!(tool = %call.name, "Tool call rejected");
            self.emit(
                report,
                TurnEvent::ToolRejected {
                    id: call.id.clone(),
                    name: call.name.clone(),
                },
            );
            return self.answer(report, &call.id, &call.name, REJECTION_MESSAGE.to_string(), false);
        }

        let outcome = self.execute(&call).await;
        let adapted = self.adapter.adapt(&call.id, outcome).await;
        if let Some(image) = adapted.pending_image {
            if let Some(previous) = self.pending_image.replace(image.clone()) {
                warn!(
                    path = %previous.path.display(),
                    "Replacing staged image that was never shown"
                );
            }
            self.emit(
                report,
                TurnEvent::ImageSaved {
                    path: image.path,
                    mime_type: image.mime_type,
                },
            );
        }
        self.append(report, &call.name, adapted.message, adapted.is_error)
    }

    async fn execute(&mut self, call: &ToolCall) -> ToolOutcome {
        let provider = match self.catalog.as_ref().and_then(|c| c.provider_for(&call.name)) {
            Some(provider) => provider.to_string(),
            None => return ToolOutcome::Failed(ExecutionError::UnknownTool(call.name.clone())),
        };
        let arguments = Value::Object(call.arguments.clone());
        let result = match self.processes.acquire(&provider).await {
            Ok(process) => process.call_tool(&call.name, arguments).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(raw) => ToolOutcome::Completed(raw),
            Err(e) => {
                warn!(tool = %call.name, provider = %provider, error = %e, "Tool execution failed");
                ToolOutcome::Failed(e.into())
            }
        }
    }

    fn answer(
        &mut self,
        report: &mut TurnReport,
        id: &str,
        name: &str,
        content: String,
        is_error: bool,
    ) -> Result<(), TurnError> {
        self.append(report, name, ConversationMessage::tool(id, content), is_error)
    }

    fn append(
        &mut self,
        report: &mut TurnReport,
        name: &str,
        message: ConversationMessage,
        is_error: bool,
    ) -> Result<(), TurnError> {
        if let ConversationMessage::Tool { tool_call_id, content } = &message {
            self.emit(
                report,
                TurnEvent::ToolResult {
                    id: tool_call_id.clone(),
                    name: name.to_string(),
                    content: content.clone(),
                    is_error,
                },
            );
        }
        self.conversation.push(message)?;
        Ok(())
    }

    fn emit(&self, report: &mut TurnReport, event: TurnEvent) {
        self.observer.on_event(&event);
        report.events.push(event);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Completion failed: {0}")]
    Completion(#[from] CompletionError),
    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),
}
