// The agent execution pipeline: routing, context enrichment, prompt
// synthesis, and the streaming turn runner.

pub mod context;
pub mod events;
pub mod prompt;
pub mod router;
pub mod runner;

pub use events::{AgentEventSink, RecordingEventSink};
pub use prompt::{PromptContext, PromptRegistry, SystemPromptBuilder};
pub use runner::{AgentRunner, AgentRunnerConfig, ConfirmationBroker, TurnOutcome, TurnRequest};
