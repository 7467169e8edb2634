// Protocol-neutral event emission. The API layer provides an SSE adapter;
// tests use the recording sink.

use async_trait::async_trait;
use serde_json::Value;

/// SSE event names, shared between the runner and the transport adapters.
pub mod event_type {
    pub const TOKEN: &str = "token";
    pub const WIDGET: &str = "widget";
    pub const TOOL_START: &str = "tool_start";
    pub const TOOL_END: &str = "tool_end";
    pub const CONFIRMATION: &str = "confirmation";
    pub const ROUTING: &str = "routing";
    pub const ERROR: &str = "error";
    pub const DONE: &str = "done";
}

#[async_trait]
pub trait AgentEventSink: Send + Sync {
    /// Emit one event. Ordering within a sink is FIFO; emit suspends when the
    /// transport cannot accept more.
    async fn emit(&self, event_type: &str, data: Value);
}

/// Records events for assertions.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: std::sync::Mutex<Vec<(String, Value)>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }
}

#[async_trait]
impl AgentEventSink for RecordingEventSink {
    async fn emit(&self, event_type: &str, data: Value) {
        self.events
            .lock()
            .unwrap()
            .push((event_type.to_string(), data));
    }
}

/// Sink adapter over an mpsc channel; the SSE transport drains the receiver.
pub struct ChannelEventSink {
    sender: tokio::sync::mpsc::Sender<(String, Value)>,
}

impl ChannelEventSink {
    pub fn new(sender: tokio::sync::mpsc::Sender<(String, Value)>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl AgentEventSink for ChannelEventSink {
    async fn emit(&self, event_type: &str, data: Value) {
        // A closed receiver means the client went away; events are dropped.
        let _ = self.sender.send((event_type.to_string(), data)).await;
    }
}
