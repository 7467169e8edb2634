// The agent turn executor. Runs one user turn to completion: route, enrich,
// stream the model, execute tool calls (with a confirmation gate on
// high-risk tools), parse widgets, persist, and emit ordered events ending
// with a terminal `done`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};

use crate::audit::{AuditEvent, AuditEventType, AuditRepository};
use crate::auth::UserSession;
use crate::catalog::CatalogRepository;
use crate::conversation::{ConversationRepository, Message, MessageRole};
use crate::error::{DeskError, Result};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, StreamEvent, ToolCall};
use crate::tools::builtin::BuiltinTools;
use crate::tools::factory::ToolDefinition;
use crate::tools::invoker::ToolInvoker;
use crate::tools::sandbox::SandboxExecutor;
use crate::widgets::WidgetParser;

use super::context::{ContextEnricher, EnrichmentOptions};
use super::events::{event_type, AgentEventSink};
use super::prompt::SystemPromptBuilder;
use super::router::ModelRouter;

const STREAM_CHANNEL_CAPACITY: usize = 64;
const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_TURN_DEADLINE: Duration = Duration::from_secs(300);

/// Pending user confirmations, keyed by widget id. The runner suspends on
/// the receiver; the confirmation API route resolves it.
#[derive(Default)]
pub struct ConfirmationBroker {
    pending: DashMap<String, oneshot::Sender<bool>>,
}

impl ConfirmationBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, widget_id: &str) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(widget_id.to_string(), tx);
        rx
    }

    /// Resolve a pending confirmation. Returns false for unknown ids.
    pub fn resolve(&self, widget_id: &str, approved: bool) -> bool {
        match self.pending.remove(widget_id) {
            Some((_, tx)) => tx.send(approved).is_ok(),
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub conversation_id: String,
    pub content: String,
    pub model_override: Option<String>,
    pub file_context: String,
}

impl TurnRequest {
    pub fn new(conversation_id: &str, content: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            model_override: None,
            file_context: String::new(),
        }
    }
}

#[derive(Debug)]
pub struct TurnOutcome {
    pub turn_id: String,
    pub assistant_text: String,
    pub widget_count: usize,
}

pub struct AgentRunnerConfig {
    pub max_tools_per_turn: u32,
    pub turn_deadline: Duration,
    pub default_model: String,
}

impl Default for AgentRunnerConfig {
    fn default() -> Self {
        Self {
            max_tools_per_turn: 10,
            turn_deadline: DEFAULT_TURN_DEADLINE,
            default_model: String::new(),
        }
    }
}

pub struct AgentRunner {
    conversations: ConversationRepository,
    router: Option<ModelRouter>,
    enricher: ContextEnricher,
    prompt_builder: SystemPromptBuilder,
    provider: Arc<dyn LlmProvider>,
    invoker: Arc<ToolInvoker>,
    sandbox: SandboxExecutor,
    builtins: Arc<BuiltinTools>,
    catalog: CatalogRepository,
    audit: AuditRepository,
    confirmations: Arc<ConfirmationBroker>,
    config: AgentRunnerConfig,
    /// Serializes turns per conversation. Turns on different conversations
    /// proceed in parallel.
    turn_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AgentRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conversations: ConversationRepository,
        router: Option<ModelRouter>,
        enricher: ContextEnricher,
        prompt_builder: SystemPromptBuilder,
        provider: Arc<dyn LlmProvider>,
        invoker: Arc<ToolInvoker>,
        sandbox: SandboxExecutor,
        builtins: Arc<BuiltinTools>,
        catalog: CatalogRepository,
        audit: AuditRepository,
        confirmations: Arc<ConfirmationBroker>,
        config: AgentRunnerConfig,
    ) -> Self {
        Self {
            conversations,
            router,
            enricher,
            prompt_builder,
            provider,
            invoker,
            sandbox,
            builtins,
            catalog,
            audit,
            confirmations,
            config,
            turn_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, conversation_id: &str) -> Arc<Mutex<()>> {
        self.turn_locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run one turn, emitting events to `sink`. The terminal `done` event is
    /// always emitted, error or not.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        session: &UserSession,
        sink: &dyn AgentEventSink,
    ) -> Result<TurnOutcome> {
        let lock = self.lock_for(&request.conversation_id);
        let _guard = lock.lock().await;

        let deadline = self.config.turn_deadline;
        let result = tokio::time::timeout(deadline, self.run_turn_inner(&request, session, sink))
            .await
            .unwrap_or_else(|_| {
                Err(DeskError::Provider(format!(
                    "turn deadline of {}s exceeded",
                    deadline.as_secs()
                )))
            });

        if let Err(e) = &result {
            sink.emit(
                event_type::ERROR,
                json!({"message": e.to_string(), "kind": error_kind(e)}),
            )
            .await;
        }
        sink.emit(event_type::DONE, json!({})).await;
        result
    }

    async fn run_turn_inner(
        &self,
        request: &TurnRequest,
        session: &UserSession,
        sink: &dyn AgentEventSink,
    ) -> Result<TurnOutcome> {
        let turn_id = uuid::Uuid::new_v4().to_string();

        // 1. Persist the user message.
        let user_message = Message::new(&request.conversation_id, MessageRole::User, &request.content)
            .with_turn(&turn_id);
        self.conversations.append_message(&user_message).await?;

        let history = self.conversations.list_messages(&request.conversation_id).await?;
        let turn_count = history.iter().filter(|m| m.role == MessageRole::User).count();

        // 2. Enrich context and build the tool manifest.
        let options = EnrichmentOptions {
            file_context: request.file_context.clone(),
            conversation_summary: String::new(),
            top_k: 0,
        };
        let context = self.enricher.enrich(session, &request.content, &options).await?;
        let tool_names = context.tool_names();

        // 3. Routing decision, emitted before any token.
        let mut model = request
            .model_override
            .clone()
            .unwrap_or_else(|| effective_default(&self.config.default_model, &*self.provider));
        if request.model_override.is_none() {
            if let Some(router) = &self.router {
                if let Some(decision) = router
                    .route(&request.content, tool_names.len(), &tool_names, turn_count)
                    .await
                {
                    sink.emit(
                        event_type::ROUTING,
                        json!({
                            "tier": decision.tier,
                            "model": decision.model_string,
                            "confidence": decision.confidence,
                            "reasoning": decision.reasoning,
                            "classifier_latency_ms": decision.classifier_latency_ms,
                        }),
                    )
                    .await;
                    model = decision.model_string;
                }
            }
        }

        // 4. Prompt synthesis.
        let system_prompt = self.prompt_builder.build(&context.prompt_context)?;
        let mut messages = vec![ChatMessage::system(system_prompt)];
        messages.extend(history.iter().map(|m| ChatMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
            tool_calls: None,
            tool_call_id: None,
        }));

        // 5. Stream loop with tool feedback.
        let mut tool_iterations: u32 = 0;
        let raw_text = loop {
            let (tx, mut rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
            let completion_request =
                CompletionRequest::new(model.clone(), messages.clone()).with_tools(context.tool_specs.clone());
            let provider = self.provider.clone();
            let handle =
                tokio::spawn(async move { provider.complete_stream(completion_request, tx).await });

            while let Some(event) = rx.recv().await {
                if let StreamEvent::Token(token) = event {
                    sink.emit(event_type::TOKEN, json!({"content": token})).await;
                }
            }
            let completion = handle
                .await
                .map_err(|e| DeskError::Provider(format!("stream task failed: {e}")))??;

            if completion.tool_calls.is_empty() {
                break completion.content;
            }

            messages.push(ChatMessage {
                role: "assistant".to_string(),
                content: completion.content.clone(),
                tool_calls: Some(completion.tool_calls.clone()),
                tool_call_id: None,
            });

            for call in &completion.tool_calls {
                tool_iterations += 1;
                if tool_iterations > self.config.max_tools_per_turn {
                    return Err(DeskError::tool(
                        &call.function.name,
                        format!(
                            "tool call limit of {} exceeded",
                            self.config.max_tools_per_turn
                        ),
                    ));
                }
                let result = self
                    .execute_tool_call(call, session, &context.catalog_tools, &turn_id, request, sink)
                    .await?;
                messages.push(ChatMessage::tool(&call.id, result.to_string()));
            }
        };

        // 6. Widget directives are parsed out before persistence.
        let parsed = WidgetParser::parse(&raw_text);
        for widget in &parsed.widgets {
            sink.emit(event_type::WIDGET, serde_json::to_value(widget)?).await;
        }
        let assistant_text = parsed.stripped_text();

        // 7. Persist the assistant message and audit the turn.
        let assistant_message = Message::new(
            &request.conversation_id,
            MessageRole::Assistant,
            &assistant_text,
        )
        .with_turn(&turn_id)
        .with_metadata(json!({"raw_content": raw_text, "model": model}));
        self.conversations.append_message(&assistant_message).await?;

        self.audit
            .record(
                &AuditEvent::new(AuditEventType::AgentResponse, &session.user_id, "agent_response")
                    .with_conversation(&request.conversation_id)
                    .with_detail(json!({"turn_id": turn_id, "widgets": parsed.widgets.len()})),
            )
            .await?;

        Ok(TurnOutcome {
            turn_id,
            assistant_text,
            widget_count: parsed.widgets.len(),
        })
    }

    /// Execute one tool call. Tool failures come back as a structured value
    /// fed to the model; unknown tools abort the turn.
    async fn execute_tool_call(
        &self,
        call: &ToolCall,
        session: &UserSession,
        catalog_tools: &[ToolDefinition],
        turn_id: &str,
        request: &TurnRequest,
        sink: &dyn AgentEventSink,
    ) -> Result<Value> {
        let name = call.function.name.as_str();
        let arguments = call.parsed_arguments();

        sink.emit(
            event_type::TOOL_START,
            json!({"tool": name, "args": arguments, "call_id": call.id}),
        )
        .await;
        self.audit
            .record(
                &AuditEvent::new(AuditEventType::ToolCall, &session.user_id, name)
                    .with_conversation(&request.conversation_id)
                    .with_detail(json!({"turn_id": turn_id, "args": arguments})),
            )
            .await?;

        let result = self
            .dispatch_tool(name, &arguments, session, catalog_tools, sink)
            .await;

        let (value, outcome) = match result {
            Ok(value) => (value, "ok"),
            // Unknown tools abort the turn; other failures are recoverable.
            Err(DeskError::NotFound(message)) => {
                return Err(DeskError::tool(name, message));
            }
            Err(e) => {
                sink.emit(
                    event_type::ERROR,
                    json!({"message": e.to_string(), "kind": "tool"}),
                )
                .await;
                (json!({"success": false, "error": e.to_string()}), "error")
            }
        };

        sink.emit(
            event_type::TOOL_END,
            json!({"tool": name, "result": value, "call_id": call.id}),
        )
        .await;
        self.audit
            .record(
                &AuditEvent::new(AuditEventType::ToolResult, &session.user_id, name)
                    .with_conversation(&request.conversation_id)
                    .with_detail(json!({"turn_id": turn_id, "outcome": outcome})),
            )
            .await?;
        Ok(value)
    }

    async fn dispatch_tool(
        &self,
        name: &str,
        arguments: &Value,
        session: &UserSession,
        catalog_tools: &[ToolDefinition],
        sink: &dyn AgentEventSink,
    ) -> Result<Value> {
        if BuiltinTools::is_builtin(name) {
            return self.builtins.execute(name, arguments, session).await;
        }

        if let Some(definition) = catalog_tools.iter().find(|t| t.name == name) {
            if definition.requires_confirmation() {
                let approved = self
                    .await_confirmation(definition, arguments, session, sink)
                    .await?;
                if !approved {
                    return Ok(json!({
                        "success": false,
                        "error": "user declined the action",
                    }));
                }
            }
            let system = self
                .catalog
                .get_system(&definition.system_id)
                .await?
                .ok_or_else(|| {
                    DeskError::tool(name, format!("system {} not found", definition.system_id))
                })?;
            return self.invoker.invoke(definition, &system, session, arguments).await;
        }

        if let Some(custom) = self.enricher.custom_tool_by_name(name).await? {
            let result = self
                .sandbox
                .execute(
                    &custom.code,
                    arguments,
                    Duration::from_secs(u64::from(custom.timeout_seconds)),
                )
                .await;
            return Ok(result.to_json());
        }

        Err(DeskError::NotFound(format!("unknown tool {name:?}")))
    }

    async fn await_confirmation(
        &self,
        definition: &ToolDefinition,
        arguments: &Value,
        session: &UserSession,
        sink: &dyn AgentEventSink,
    ) -> Result<bool> {
        let widget_id = uuid::Uuid::new_v4().to_string();
        let receiver = self.confirmations.register(&widget_id);

        sink.emit(
            event_type::CONFIRMATION,
            json!({
                "widget_id": widget_id,
                "action": definition.name,
                "args": arguments,
                "risk_level": definition.risk_level,
            }),
        )
        .await;
        self.audit
            .record(
                &AuditEvent::new(
                    AuditEventType::ConfirmationRequested,
                    &session.user_id,
                    &definition.name,
                )
                .with_risk_level(definition.risk_level.as_str()),
            )
            .await?;

        let approved = match tokio::time::timeout(CONFIRMATION_TIMEOUT, receiver).await {
            Ok(Ok(approved)) => approved,
            // Dropped sender or timeout both count as a decline.
            Ok(Err(_)) | Err(_) => false,
        };
        self.audit
            .record(
                &AuditEvent::new(
                    AuditEventType::ConfirmationResponse,
                    &session.user_id,
                    &definition.name,
                )
                .with_detail(json!({"approved": approved})),
            )
            .await?;
        Ok(approved)
    }
}

fn effective_default(configured: &str, provider: &dyn LlmProvider) -> String {
    if configured.is_empty() {
        provider.default_model().to_string()
    } else {
        configured.to_string()
    }
}

fn error_kind(error: &DeskError) -> &'static str {
    match error {
        DeskError::Tool { message, .. } if message.contains("limit") => "limit_exceeded",
        DeskError::Tool { .. } => "tool",
        DeskError::Provider(message) if message.contains("deadline") => "limit_exceeded",
        DeskError::Provider(_) => "llm_transport",
        DeskError::NotFound(_) => "not_found",
        _ => "internal",
    }
}
