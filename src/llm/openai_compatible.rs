// OpenAI-compatible chat client. Works against any server speaking the
// /chat/completions wire format.

use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::types::{
    ChatMessage, Completion, CompletionRequest, FunctionCall, StreamEvent, ToolCall, ToolSpec,
};
use super::LlmProvider;
use crate::error::{DeskError, Result};

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolSpec,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    choices: Vec<WireStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: WireDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    content: Option<String>,
    tool_calls: Option<Vec<WireDeltaToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireDeltaToolCall {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<WireDeltaFunction>,
}

#[derive(Debug, Deserialize)]
struct WireDeltaFunction {
    name: Option<String>,
    arguments: Option<String>,
}

pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    name: String,
    default_model: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            name: name.into(),
            default_model: default_model.into(),
        }
    }

    fn wire_request<'a>(&self, request: &'a CompletionRequest, stream: bool) -> WireRequest<'a> {
        WireRequest {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: request
                .tools
                .iter()
                .map(|t| WireTool {
                    kind: "function",
                    function: t,
                })
                .collect(),
            stream,
        }
    }

    async fn post(&self, body: &WireRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DeskError::Provider(format!(
                "chat completion failed with {status}: {detail}"
            )));
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_type(&self) -> &str {
        "openai_compatible"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let body = self.wire_request(&request, false);
        let response: WireResponse = self.post(&body).await?.json().await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| DeskError::Provider("empty choices in completion".into()))?;
        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
            finish_reason: choice.finish_reason,
        })
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<Completion> {
        let body = self.wire_request(&request, true);
        let response = self.post(&body).await?;

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut completion = Completion::default();
        // Tool call deltas arrive fragmented and are assembled by index.
        let mut pending_calls: Vec<(String, String, String)> = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DeskError::Provider(format!("stream error: {e}")))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find('\n') {
                let line = buffer.drain(..=pos).collect::<String>();
                let line = line.trim();
                let Some(data) = line.strip_prefix("data: ") else {
                    continue;
                };
                if data == "[DONE]" {
                    continue;
                }
                let Ok(parsed) = serde_json::from_str::<WireStreamChunk>(data) else {
                    continue;
                };
                let Some(choice) = parsed.choices.into_iter().next() else {
                    continue;
                };

                if let Some(content) = choice.delta.content {
                    if !content.is_empty() {
                        completion.content.push_str(&content);
                        if events.send(StreamEvent::Token(content)).await.is_err() {
                            return Ok(completion);
                        }
                    }
                }
                for delta in choice.delta.tool_calls.unwrap_or_default() {
                    if pending_calls.len() <= delta.index {
                        pending_calls.resize(delta.index + 1, Default::default());
                    }
                    let slot = &mut pending_calls[delta.index];
                    if let Some(id) = delta.id {
                        slot.0 = id;
                    }
                    if let Some(function) = delta.function {
                        if let Some(name) = function.name {
                            slot.1 = name;
                        }
                        if let Some(arguments) = function.arguments {
                            slot.2.push_str(&arguments);
                        }
                    }
                }
                if let Some(reason) = choice.finish_reason {
                    completion.finish_reason = Some(reason);
                }
            }
        }

        for (id, name, arguments) in pending_calls {
            if name.is_empty() {
                continue;
            }
            let call = ToolCall {
                id,
                function: FunctionCall { name, arguments },
            };
            completion.tool_calls.push(call.clone());
            if events.send(StreamEvent::ToolCall(call)).await.is_err() {
                break;
            }
        }

        Ok(completion)
    }
}

/// Parse a classifier reply that may be wrapped in markdown code fences.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    trimmed
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fences() {
        let fenced = "```json\n{\"tier\": \"fast\"}\n```";
        assert_eq!(strip_code_fences(fenced), "{\"tier\": \"fast\"}");
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }
}
