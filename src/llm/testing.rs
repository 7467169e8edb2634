// Scripted provider for tests and dev mode. Each call pops the next queued
// completion; tokens are streamed word by word.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::mpsc;

use super::types::{Completion, CompletionRequest, StreamEvent, ToolCall};
use super::LlmProvider;
use crate::error::{DeskError, Result};

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    /// Tokens emitted exactly as given, then joined for the final content.
    Tokens(Vec<String>),
    ToolCalls(Vec<ToolCall>),
    Error(String),
}

#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn push_text(&self, text: &str) {
        self.push(ScriptedReply::Text(text.to_string()));
    }

    /// Requests seen so far, for assertions.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_reply(&self, request: &CompletionRequest) -> Result<ScriptedReply> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| DeskError::Provider("scripted provider exhausted".into()))
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn provider_type(&self) -> &str {
        "test"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        match self.next_reply(&request)? {
            ScriptedReply::Text(text) => Ok(Completion {
                content: text,
                tool_calls: Vec::new(),
                finish_reason: Some("stop".to_string()),
            }),
            ScriptedReply::Tokens(tokens) => Ok(Completion {
                content: tokens.concat(),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".to_string()),
            }),
            ScriptedReply::ToolCalls(calls) => Ok(Completion {
                content: String::new(),
                tool_calls: calls,
                finish_reason: Some("tool_calls".to_string()),
            }),
            ScriptedReply::Error(message) => Err(DeskError::Provider(message)),
        }
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<Completion> {
        match self.next_reply(&request)? {
            ScriptedReply::Text(text) => {
                let _ = events.send(StreamEvent::Token(text.clone())).await;
                Ok(Completion {
                    content: text,
                    tool_calls: Vec::new(),
                    finish_reason: Some("stop".to_string()),
                })
            }
            ScriptedReply::Tokens(tokens) => {
                for token in &tokens {
                    let _ = events.send(StreamEvent::Token(token.clone())).await;
                }
                Ok(Completion {
                    content: tokens.concat(),
                    tool_calls: Vec::new(),
                    finish_reason: Some("stop".to_string()),
                })
            }
            ScriptedReply::ToolCalls(calls) => {
                for call in &calls {
                    let _ = events.send(StreamEvent::ToolCall(call.clone())).await;
                }
                Ok(Completion {
                    content: String::new(),
                    tool_calls: calls,
                    finish_reason: Some("tool_calls".to_string()),
                })
            }
            ScriptedReply::Error(message) => Err(DeskError::Provider(message)),
        }
    }
}
