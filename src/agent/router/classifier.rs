// LLM-based complexity classifier. One short call on the cheap classifier
// model, parsed as strict JSON.

use std::sync::Arc;

use serde::Deserialize;

use super::{ClassificationResult, ComplexityTier};
use crate::error::Result;
use crate::llm::openai_compatible::strip_code_fences;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

const CLASSIFIER_PROMPT: &str = "You are a task complexity classifier for an AI assistant. Analyze the user's \
message and context to determine which model tier should handle this request.

## Tiers
- FAST: Simple greetings, yes/no questions, basic lookups, factual recall, \
short confirmations, status checks. No tools needed or single simple tool.
- BALANCED: Standard conversations, moderate reasoning, 1-3 tool calls, \
summarization, standard Q&A with context.
- POWERFUL: Complex reasoning chains, multi-step tool orchestration (4+ tools), \
code generation/review, mathematical analysis, creative writing with specific \
constraints, ambiguous requests requiring deep analysis.

## Context
- Available tools: {tool_count}
- Tool names: {tool_names_summary}
- Conversation turns so far: {turn_count}
- Message length: {char_count} characters

## User Message
{message}

Return ONLY valid JSON (no markdown, no extra text):
{\"tier\": \"fast|balanced|powerful\", \"confidence\": 0.0-1.0, \"reasoning\": \"brief explanation\"}";

const MESSAGE_PREVIEW_CHARS: usize = 500;
const TOOL_NAMES_SHOWN: usize = 15;

#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    tier: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    reasoning: Option<String>,
}

pub struct ComplexityClassifier {
    provider: Arc<dyn LlmProvider>,
    classifier_model: Option<String>,
}

impl ComplexityClassifier {
    pub fn new(provider: Arc<dyn LlmProvider>, classifier_model: Option<String>) -> Self {
        Self {
            provider,
            classifier_model,
        }
    }

    pub async fn classify(
        &self,
        message: &str,
        tool_count: usize,
        tool_names: &[String],
        turn_count: usize,
    ) -> Result<ClassificationResult> {
        let tool_names_summary = if tool_names.is_empty() {
            "none".to_string()
        } else {
            tool_names
                .iter()
                .take(TOOL_NAMES_SHOWN)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        };
        let preview: String = message.chars().take(MESSAGE_PREVIEW_CHARS).collect();
        let prompt = CLASSIFIER_PROMPT
            .replace("{tool_count}", &tool_count.to_string())
            .replace("{tool_names_summary}", &tool_names_summary)
            .replace("{turn_count}", &turn_count.to_string())
            .replace("{char_count}", &message.chars().count().to_string())
            .replace("{message}", &preview);

        let model = self
            .classifier_model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string());
        let request = CompletionRequest::new(
            model,
            vec![
                ChatMessage::system("You are a JSON-only classifier. Return only valid JSON."),
                ChatMessage::user(prompt),
            ],
        );

        let completion = self.provider.complete(request).await?;
        let raw = strip_code_fences(&completion.content);
        let parsed: RawClassification = serde_json::from_str(&raw)?;

        let tier = parsed
            .tier
            .as_deref()
            .map(str::to_lowercase)
            .and_then(|t| ComplexityTier::parse(&t))
            .unwrap_or(ComplexityTier::Balanced);
        let confidence = parsed.confidence.unwrap_or(0.5).clamp(0.0, 1.0);

        Ok(ClassificationResult {
            tier,
            confidence,
            reasoning: parsed.reasoning.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedProvider;

    fn classifier(provider: Arc<ScriptedProvider>) -> ComplexityClassifier {
        ComplexityClassifier::new(provider, Some("m-cheap".to_string()))
    }

    #[tokio::test]
    async fn parses_plain_json_reply() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text(r#"{"tier": "powerful", "confidence": 0.8, "reasoning": "code"}"#);
        let result = classifier(provider.clone())
            .classify("write a parser", 5, &["a".to_string()], 2)
            .await
            .unwrap();
        assert_eq!(result.tier, ComplexityTier::Powerful);
        assert!((result.confidence - 0.8).abs() < 1e-6);

        // The classifier call goes to the configured cheap model.
        assert_eq!(provider.requests()[0].model, "m-cheap");
    }

    #[tokio::test]
    async fn strips_code_fences_before_parsing() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text("```json\n{\"tier\": \"fast\", \"confidence\": 1.0}\n```");
        let result = classifier(provider).classify("hi", 0, &[], 0).await.unwrap();
        assert_eq!(result.tier, ComplexityTier::Fast);
    }

    #[tokio::test]
    async fn unknown_tier_defaults_to_balanced_and_confidence_is_clamped() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text(r#"{"tier": "galactic", "confidence": 7.5}"#);
        let result = classifier(provider).classify("hi", 0, &[], 0).await.unwrap();
        assert_eq!(result.tier, ComplexityTier::Balanced);
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn garbage_reply_is_an_error() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text("sure, that looks balanced to me");
        assert!(classifier(provider).classify("hi", 0, &[], 0).await.is_err());
    }

    #[tokio::test]
    async fn prompt_carries_context_counts() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_text(r#"{"tier": "fast", "confidence": 0.9}"#);
        let names = vec!["lookup_customer".to_string()];
        classifier(provider.clone())
            .classify("hello there", 1, &names, 4)
            .await
            .unwrap();
        let prompt = &provider.requests()[0].messages[1].content;
        assert!(prompt.contains("Available tools: 1"));
        assert!(prompt.contains("lookup_customer"));
        assert!(prompt.contains("Conversation turns so far: 4"));
    }
}
