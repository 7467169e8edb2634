// Concrete channel adapters registered at startup.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{normalize_inbound_email, ChannelPort, ChannelResponse, InboundMessage, Notification};
use crate::callbacks::CallbackDispatcher;
use crate::error::{DeskError, Result};

/// Web chat. Live turns stream over the per-connection SSE sink, so outbound
/// delivery here only covers notifications, which fan out through the signed
/// callback dispatcher.
pub struct ChatChannelAdapter {
    callbacks: Arc<CallbackDispatcher>,
}

impl ChatChannelAdapter {
    pub fn new(callbacks: Arc<CallbackDispatcher>) -> Self {
        Self { callbacks }
    }
}

#[async_trait]
impl ChannelPort for ChatChannelAdapter {
    fn channel_type(&self) -> &str {
        "chat"
    }

    async fn receive(&self, raw_event: Value) -> Result<InboundMessage> {
        Ok(InboundMessage {
            channel: "chat".to_string(),
            user_id: raw_event["user_id"].as_str().unwrap_or_default().to_string(),
            conversation_id: raw_event["conversation_id"].as_str().map(str::to_string),
            content: raw_event["content"].as_str().unwrap_or_default().to_string(),
            metadata: Value::Object(Default::default()),
            received_at: Some(chrono::Utc::now()),
        })
    }

    async fn send(&self, conversation_id: &str, _response: &ChannelResponse) {
        tracing::debug!(conversation_id, "chat responses are delivered over the live SSE stream");
    }

    async fn send_notification(&self, user_id: &str, notification: &Notification) {
        self.callbacks
            .dispatch(
                "notification",
                serde_json::json!({
                    "user_id": user_id,
                    "title": notification.title,
                    "summary": notification.summary,
                    "workflow_id": notification.workflow_id,
                }),
            )
            .await;
    }
}

/// Inbound email webhooks, normalised per provider. Outbound mail rendering
/// belongs to the provider adapters and stays out of this crate.
#[derive(Debug, Default)]
pub struct EmailChannelAdapter;

#[async_trait]
impl ChannelPort for EmailChannelAdapter {
    fn channel_type(&self) -> &str {
        "email"
    }

    /// `raw_event` carries `{provider, payload}` as posted by the provider
    /// webhook route.
    async fn receive(&self, raw_event: Value) -> Result<InboundMessage> {
        let provider = raw_event["provider"]
            .as_str()
            .ok_or_else(|| DeskError::Validation("missing email provider".into()))?;
        Ok(normalize_inbound_email(provider, &raw_event["payload"]))
    }

    async fn send(&self, conversation_id: &str, _response: &ChannelResponse) {
        tracing::info!(conversation_id, "outbound email delivery is handled by the provider adapter");
    }

    async fn send_notification(&self, user_id: &str, notification: &Notification) {
        tracing::info!(user_id, title = %notification.title, "email notification queued");
    }
}
