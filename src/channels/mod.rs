// Channel routing. Adapters normalise inbound events and deliver agent
// responses through their transport; registration happens once at startup
// and the registry is read-only afterwards.

pub mod adapters;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: String,
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub widgets: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub summary: String,
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub metadata: Value,
}

#[async_trait]
pub trait ChannelPort: Send + Sync {
    fn channel_type(&self) -> &str;

    /// Normalise a raw provider event into an inbound message.
    async fn receive(&self, raw_event: Value) -> crate::error::Result<InboundMessage>;

    async fn send(&self, conversation_id: &str, response: &ChannelResponse);

    async fn send_notification(&self, user_id: &str, notification: &Notification);
}

/// Routes outbound messages and notifications to the correct adapter.
/// Unknown channels drop the message with a warning.
#[derive(Default)]
pub struct ChannelRouter {
    adapters: HashMap<String, Box<dyn ChannelPort>>,
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Box<dyn ChannelPort>) {
        let channel_type = adapter.channel_type().to_string();
        tracing::info!(channel = %channel_type, "registered channel adapter");
        self.adapters.insert(channel_type, adapter);
    }

    pub fn get(&self, channel_type: &str) -> Option<&dyn ChannelPort> {
        self.adapters.get(channel_type).map(Box::as_ref)
    }

    pub async fn send(&self, conversation_id: &str, channel_type: &str, response: &ChannelResponse) {
        match self.adapters.get(channel_type) {
            Some(adapter) => adapter.send(conversation_id, response).await,
            None => {
                tracing::warn!(channel = channel_type, "no adapter for channel, dropping message");
            }
        }
    }

    pub async fn notify(&self, user_id: &str, channel_type: &str, notification: &Notification) {
        match self.adapters.get(channel_type) {
            Some(adapter) => adapter.send_notification(user_id, notification).await,
            None => {
                tracing::warn!(
                    channel = channel_type,
                    "no adapter for channel, dropping notification"
                );
            }
        }
    }
}

/// Email providers whose inbound webhooks are accepted.
pub const EMAIL_PROVIDERS: [&str; 3] = ["resend", "ses", "sendgrid"];

/// Normalise an inbound email webhook payload. Providers differ only in the
/// field names carrying sender and text.
pub fn normalize_inbound_email(provider: &str, body: &Value) -> InboundMessage {
    let (from, text) = match provider {
        "resend" => (body["from"].as_str(), body["text"].as_str()),
        "ses" => (
            body["mail"]["source"].as_str(),
            body["content"].as_str(),
        ),
        "sendgrid" => (body["from"].as_str(), body["text"].as_str()),
        _ => (None, None),
    };
    InboundMessage {
        channel: "email".to_string(),
        user_id: from.unwrap_or_default().to_string(),
        conversation_id: None,
        content: text.unwrap_or_default().to_string(),
        metadata: serde_json::json!({"provider": provider}),
        received_at: Some(Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingAdapter {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChannelPort for RecordingAdapter {
        fn channel_type(&self) -> &str {
            "chat"
        }

        async fn receive(&self, raw_event: Value) -> crate::error::Result<InboundMessage> {
            Ok(InboundMessage {
                channel: "chat".to_string(),
                user_id: raw_event["user_id"].as_str().unwrap_or_default().to_string(),
                content: raw_event["content"].as_str().unwrap_or_default().to_string(),
                ..Default::default()
            })
        }

        async fn send(&self, conversation_id: &str, response: &ChannelResponse) {
            self.sent
                .lock()
                .unwrap()
                .push((conversation_id.to_string(), response.content.clone()));
        }

        async fn send_notification(&self, _user_id: &str, _notification: &Notification) {}
    }

    #[tokio::test]
    async fn routes_to_registered_adapter() {
        let mut router = ChannelRouter::new();
        router.register(Box::new(RecordingAdapter {
            sent: Mutex::new(Vec::new()),
        }));

        let response = ChannelResponse {
            content: "hello".to_string(),
            ..Default::default()
        };
        router.send("c1", "chat", &response).await;
        // Unknown channel is a warn-and-drop, not a panic.
        router.send("c1", "smoke_signal", &response).await;

        let adapter = router.get("chat").unwrap();
        let _ = adapter;
    }

    #[test]
    fn email_normalization_per_provider() {
        let resend = normalize_inbound_email(
            "resend",
            &json!({"from": "a@ex.com", "text": "hi there"}),
        );
        assert_eq!(resend.user_id, "a@ex.com");
        assert_eq!(resend.content, "hi there");

        let ses = normalize_inbound_email(
            "ses",
            &json!({"mail": {"source": "b@ex.com"}, "content": "howdy"}),
        );
        assert_eq!(ses.user_id, "b@ex.com");
        assert_eq!(ses.content, "howdy");
        assert_eq!(ses.metadata["provider"], "ses");
    }
}
