// LLM provider abstraction. Vendor wire formats stay behind the trait; the
// agent only sees chat messages, tool specs, and a token stream.

pub mod openai_compatible;
pub mod testing;
pub mod types;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
pub use types::{
    ChatMessage, Completion, CompletionRequest, FunctionCall, LlmStatus, StreamEvent, ToolCall,
    ToolSpec,
};

/// A chat-capable model provider.
///
/// `complete` is a single-shot call used by the complexity classifier.
/// `complete_stream` pushes events into `events` as they arrive; awaiting the
/// channel send gives the transport backpressure. The accumulated completion
/// (final text plus any tool calls) is returned once the stream ends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    fn provider_type(&self) -> &str;

    fn default_model(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    async fn complete_stream(
        &self,
        request: CompletionRequest,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<Completion>;
}
