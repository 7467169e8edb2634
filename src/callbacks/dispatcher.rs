// Fire-and-forget signed webhooks. Each request carries an HMAC-SHA256
// signature over the exact body; attempts run at fixed offsets and every
// attempt is logged.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use tokio::sync::RwLock;

use crate::callbacks::repository::CallbackDeliveryRepository;

const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(0),
    Duration::from_secs(30),
    Duration::from_secs(300),
];
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

pub const SIGNATURE_HEADER: &str = "X-Flydesk-Signature";
pub const EVENT_HEADER: &str = "X-Flydesk-Event";

/// A user-configured callback endpoint. An empty `events` list subscribes to
/// everything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundCallback {
    pub id: String,
    pub url: String,
    pub secret: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Hex HMAC-SHA256 over the body. Deterministic for identical inputs.
pub fn sign(secret: &str, body: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub struct CallbackDispatcher {
    client: Client,
    deliveries: CallbackDeliveryRepository,
    callbacks: RwLock<Vec<OutboundCallback>>,
    retry_delays: Vec<Duration>,
}

impl CallbackDispatcher {
    pub fn new(deliveries: CallbackDeliveryRepository, callbacks: Vec<OutboundCallback>) -> Self {
        Self {
            client: Client::new(),
            deliveries,
            callbacks: RwLock::new(callbacks),
            retry_delays: RETRY_DELAYS.to_vec(),
        }
    }

    /// Shrink the retry offsets; test-only.
    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    pub async fn register(&self, callback: OutboundCallback) {
        self.callbacks.write().await.push(callback);
    }

    /// Send `event` to every matching callback as detached tasks; the caller
    /// never blocks on delivery.
    pub async fn dispatch(self: &Arc<Self>, event: &str, data: Value) {
        let callbacks = self.callbacks.read().await.clone();
        for callback in callbacks {
            if !callback.enabled {
                continue;
            }
            if !callback.events.is_empty() && !callback.events.iter().any(|e| e == event) {
                continue;
            }
            if callback.url.is_empty() {
                continue;
            }

            let dispatcher = self.clone();
            let event = event.to_string();
            let data = data.clone();
            tokio::spawn(async move {
                dispatcher.deliver_with_retries(&callback, &event, data).await;
            });
        }
    }

    /// POST a signed payload, retrying on transport errors per the fixed
    /// schedule. An attempt that reaches the server counts as delivered no
    /// matter the HTTP status.
    pub async fn deliver_with_retries(&self, callback: &OutboundCallback, event: &str, data: Value) {
        let payload = json!({
            "event": event,
            "timestamp": Utc::now().to_rfc3339(),
            "data": data,
        });
        let body = payload.to_string();
        let signature = sign(&callback.secret, &body);

        for (index, delay) in self.retry_delays.iter().enumerate() {
            let attempt = (index + 1) as i64;
            if !delay.is_zero() {
                tokio::time::sleep(*delay).await;
            }

            let sent = self
                .client
                .post(&callback.url)
                .header("Content-Type", "application/json")
                .header(SIGNATURE_HEADER, &signature)
                .header(EVENT_HEADER, event)
                .timeout(ATTEMPT_TIMEOUT)
                .body(body.clone())
                .send()
                .await;

            match sent {
                Ok(response) => {
                    let status_code = i64::from(response.status().as_u16());
                    if let Err(e) = self
                        .deliveries
                        .record(&callback.id, event, &callback.url, attempt, "success", Some(status_code), None)
                        .await
                    {
                        tracing::warn!(error = %e, "failed to record callback delivery");
                    }
                    tracing::info!(
                        event,
                        url = %callback.url,
                        attempt,
                        status_code,
                        "callback delivered"
                    );
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        event,
                        url = %callback.url,
                        attempt,
                        error = %e,
                        "callback attempt failed"
                    );
                    if let Err(log_err) = self
                        .deliveries
                        .record(
                            &callback.id,
                            event,
                            &callback.url,
                            attempt,
                            "failed",
                            None,
                            Some(&e.to_string()),
                        )
                        .await
                    {
                        tracing::warn!(error = %log_err, "failed to record callback delivery");
                    }
                }
            }
        }

        tracing::error!(event, url = %callback.url, "callback delivery exhausted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[test]
    fn retry_schedule_is_immediate_then_backoff() {
        assert_eq!(
            RETRY_DELAYS,
            [
                Duration::from_secs(0),
                Duration::from_secs(30),
                Duration::from_secs(300)
            ]
        );
    }

    #[test]
    fn signature_is_deterministic_hex_hmac() {
        let a = sign("secret", "{\"event\":\"x\"}");
        let b = sign("secret", "{\"event\":\"x\"}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));

        // Known vector: different secret or body changes the signature.
        assert_ne!(a, sign("other", "{\"event\":\"x\"}"));
        assert_ne!(a, sign("secret", "{\"event\":\"y\"}"));
    }

    #[tokio::test]
    async fn unreachable_url_exhausts_all_attempts() {
        let deliveries = CallbackDeliveryRepository::new(test_pool().await);
        let dispatcher = CallbackDispatcher::new(deliveries.clone(), Vec::new())
            .with_retry_delays(vec![Duration::ZERO; 3]);

        let callback = OutboundCallback {
            id: "cb1".to_string(),
            // Nothing listens on this port.
            url: "http://127.0.0.1:9/hook".to_string(),
            secret: "s".to_string(),
            events: Vec::new(),
            enabled: true,
        };
        dispatcher
            .deliver_with_retries(&callback, "workflow.completed", serde_json::json!({"id": 1}))
            .await;

        let attempts = deliveries.list_for_callback("cb1").await.unwrap();
        assert_eq!(attempts.len(), 3);
        for (i, attempt) in attempts.iter().enumerate() {
            assert_eq!(attempt.attempt, (i + 1) as i64);
            assert_eq!(attempt.status, "failed");
            assert!(attempt.error.is_some());
        }
    }

    #[tokio::test]
    async fn successful_delivery_stops_retrying() {
        // A local listener that accepts one request and replies 500; the
        // transport-level success still ends the retry loop.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                use tokio::io::{AsyncReadExt, AsyncWriteExt};
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\n\r\n")
                    .await;
            }
        });

        let deliveries = CallbackDeliveryRepository::new(test_pool().await);
        let dispatcher = CallbackDispatcher::new(deliveries.clone(), Vec::new())
            .with_retry_delays(vec![Duration::ZERO; 3]);
        let callback = OutboundCallback {
            id: "cb2".to_string(),
            url: format!("http://{addr}/hook"),
            secret: "s".to_string(),
            events: Vec::new(),
            enabled: true,
        };
        dispatcher
            .deliver_with_retries(&callback, "doc.indexed", serde_json::json!({}))
            .await;

        let attempts = deliveries.list_for_callback("cb2").await.unwrap();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, "success");
        assert_eq!(attempts[0].status_code, Some(500));
    }

    #[tokio::test]
    async fn dispatch_filters_by_event_subscription() {
        let deliveries = CallbackDeliveryRepository::new(test_pool().await);
        let dispatcher = Arc::new(
            CallbackDispatcher::new(deliveries.clone(), Vec::new())
                .with_retry_delays(vec![Duration::ZERO]),
        );
        dispatcher
            .register(OutboundCallback {
                id: "subscribed".to_string(),
                url: "http://127.0.0.1:9/hook".to_string(),
                secret: "s".to_string(),
                events: vec!["workflow.completed".to_string()],
                enabled: true,
            })
            .await;
        dispatcher
            .register(OutboundCallback {
                id: "other".to_string(),
                url: "http://127.0.0.1:9/hook".to_string(),
                secret: "s".to_string(),
                events: vec!["doc.indexed".to_string()],
                enabled: true,
            })
            .await;

        dispatcher
            .dispatch("workflow.completed", serde_json::json!({}))
            .await;
        // Wait for the detached delivery task to finish its single attempt.
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(deliveries.list_for_callback("subscribed").await.unwrap().len(), 1);
        assert!(deliveries.list_for_callback("other").await.unwrap().is_empty());
    }
}
