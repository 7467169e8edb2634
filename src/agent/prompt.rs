// System prompt builder. Sections are handlebars templates registered by
// name; the builder renders them in a fixed order and joins with blank lines.

use handlebars::Handlebars;
use serde_json::json;

use crate::error::{DeskError, Result};

const IDENTITY_TEMPLATE: &str = "You are {{agent_name}}, the backoffice assistant{{#if company_name}} for {{company_name}}{{/if}}. \
You help employees get answers and take action across internal systems. Be precise, \
cite the systems you used, and never invent data you did not retrieve.";

const USER_CONTEXT_TEMPLATE: &str = "## Current User
Name: {{user_name}}
{{#if user_roles}}Roles: {{#each user_roles}}{{this}}{{#unless @last}}, {{/unless}}{{/each}}
{{/if}}{{#if user_department}}Department: {{user_department}}
{{/if}}{{#if user_title}}Title: {{user_title}}
{{/if}}";

const AVAILABLE_TOOLS_TEMPLATE: &str = "## Available Tools
{{#if tool_summaries}}{{#each tool_summaries}}- {{name}}: {{description}}
{{/each}}{{else}}No tools are available for this turn.
{{/if}}";

const WIDGET_INSTRUCTIONS_TEMPLATE: &str = "## Widgets
To render a UI widget, emit a directive block on its own lines:
:::widget{type=<widget_type> panel=true|inline=true action=<action>}
{ ...JSON props... }
:::
The JSON body must be a single object. Use widgets sparingly, only when a \
table, chart, form, or confirmation helps more than prose.";

const BEHAVIORAL_GUIDELINES_TEMPLATE: &str = "## Guidelines
- Prefer retrieved knowledge over recollection; quote titles when citing.
- Ask before any destructive or high-risk action.
- Keep answers short; expand only on request.
- Save a memory when the user states a durable preference or fact.";

const KNOWLEDGE_CONTEXT_TEMPLATE: &str = "## Relevant Knowledge
{{knowledge_context}}";

const FILE_CONTEXT_TEMPLATE: &str = "## Attached Files
{{file_context}}";

const CONVERSATION_HISTORY_TEMPLATE: &str = "## Conversation So Far
{{conversation_summary}}";

const FEEDBACK_SUMMARY_TEMPLATE: &str = "## Recent Feedback
{{feedback_summary}}";

const USER_MEMORIES_TEMPLATE: &str = "## What You Remember About This User
{{#each memories}}- {{this}}
{{/each}}";

/// Context needed to build the system prompt.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    pub agent_name: String,
    pub company_name: Option<String>,
    pub user_name: String,
    pub user_roles: Vec<String>,
    pub user_department: String,
    pub user_title: String,
    /// `(name, description)` pairs for the available-tools section.
    pub tool_summaries: Vec<(String, String)>,
    pub knowledge_context: String,
    pub file_context: String,
    pub conversation_summary: String,
    pub feedback_summary: String,
    pub memories: Vec<String>,
}

/// Named template registry backing the prompt builder.
pub struct PromptRegistry {
    handlebars: Handlebars<'static>,
}

impl PromptRegistry {
    pub fn with_defaults() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        // Prompts are plain text; HTML escaping would mangle user content.
        handlebars.register_escape_fn(handlebars::no_escape);
        let mut registry = Self { handlebars };
        registry.register("identity", IDENTITY_TEMPLATE)?;
        registry.register("user_context", USER_CONTEXT_TEMPLATE)?;
        registry.register("available_tools", AVAILABLE_TOOLS_TEMPLATE)?;
        registry.register("widget_instructions", WIDGET_INSTRUCTIONS_TEMPLATE)?;
        registry.register("behavioral_guidelines", BEHAVIORAL_GUIDELINES_TEMPLATE)?;
        registry.register("knowledge_context", KNOWLEDGE_CONTEXT_TEMPLATE)?;
        registry.register("file_context", FILE_CONTEXT_TEMPLATE)?;
        registry.register("conversation_history", CONVERSATION_HISTORY_TEMPLATE)?;
        registry.register("feedback_summary", FEEDBACK_SUMMARY_TEMPLATE)?;
        registry.register("user_memories", USER_MEMORIES_TEMPLATE)?;
        Ok(registry)
    }

    pub fn register(&mut self, name: &str, template: &str) -> Result<()> {
        self.handlebars
            .register_template_string(name, template)
            .map_err(|e| DeskError::Configuration(format!("invalid prompt template {name}: {e}")))
    }

    pub fn render(&self, name: &str, data: &serde_json::Value) -> Result<String> {
        self.handlebars
            .render(name, data)
            .map_err(|e| DeskError::Configuration(format!("prompt template {name} failed: {e}")))
    }
}

pub struct SystemPromptBuilder {
    registry: PromptRegistry,
}

impl SystemPromptBuilder {
    pub fn new(registry: PromptRegistry) -> Self {
        Self { registry }
    }

    pub fn with_defaults() -> Result<Self> {
        Ok(Self::new(PromptRegistry::with_defaults()?))
    }

    /// Assemble the full system prompt. Deterministic for identical inputs.
    pub fn build(&self, context: &PromptContext) -> Result<String> {
        let mut sections = vec![
            self.registry.render(
                "identity",
                &json!({
                    "agent_name": context.agent_name,
                    "company_name": context.company_name,
                }),
            )?,
            self.registry.render(
                "user_context",
                &json!({
                    "user_name": context.user_name,
                    "user_roles": context.user_roles,
                    "user_department": context.user_department,
                    "user_title": context.user_title,
                }),
            )?,
            self.registry.render(
                "available_tools",
                &json!({
                    "tool_summaries": context
                        .tool_summaries
                        .iter()
                        .map(|(name, description)| json!({
                            "name": name,
                            "description": description,
                        }))
                        .collect::<Vec<_>>(),
                }),
            )?,
            self.registry.render("widget_instructions", &json!({}))?,
            self.registry.render("behavioral_guidelines", &json!({}))?,
        ];

        if !context.knowledge_context.is_empty() {
            sections.push(self.registry.render(
                "knowledge_context",
                &json!({"knowledge_context": context.knowledge_context}),
            )?);
        }
        if !context.file_context.is_empty() {
            sections.push(
                self.registry
                    .render("file_context", &json!({"file_context": context.file_context}))?,
            );
        }
        if !context.conversation_summary.is_empty() {
            sections.push(self.registry.render(
                "conversation_history",
                &json!({"conversation_summary": context.conversation_summary}),
            )?);
        }
        if !context.feedback_summary.is_empty() {
            sections.push(self.registry.render(
                "feedback_summary",
                &json!({"feedback_summary": context.feedback_summary}),
            )?);
        }
        if !context.memories.is_empty() {
            sections.push(
                self.registry
                    .render("user_memories", &json!({"memories": context.memories}))?,
            );
        }

        Ok(sections
            .iter()
            .map(|s| s.trim())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
