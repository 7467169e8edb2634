// Chat endpoints: message ingestion with an SSE reply stream, conversation
// hydration, and confirmation replies.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::auth::{require_permission, Session};
use super::state::AppState;
use super::{ApiError, ApiResult};
use crate::agent::events::ChannelEventSink;
use crate::agent::TurnRequest;
use crate::conversation::ConversationWithMessages;
use crate::error::DeskError;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// POST /api/chat/messages. Appends the user message and streams the
/// assistant turn as SSE frames, `done` always last.
pub async fn post_message(
    State(state): State<AppState>,
    Session(session): Session,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>> {
    require_permission(&session, "chat:send")?;
    if !state.rate_limiter.allow(&session.user_id) {
        return Err(ApiError(DeskError::RateLimited));
    }
    if request.content.trim().is_empty() {
        return Err(ApiError(DeskError::Validation("content must not be empty".into())));
    }

    let conversation_id = match &request.conversation_id {
        Some(id) => {
            let conversation = state
                .conversations
                .get(id)
                .await
                .map_err(ApiError)?
                .ok_or_else(|| ApiError(DeskError::NotFound(format!("conversation {id}"))))?;
            if conversation.user_id != session.user_id {
                return Err(ApiError(DeskError::Forbidden("not your conversation".into())));
            }
            conversation.id
        }
        None => {
            let title: String = request.content.chars().take(80).collect();
            state
                .conversations
                .create(&session.user_id, Some(&title))
                .await
                .map_err(ApiError)?
                .id
        }
    };

    let (tx, rx) = mpsc::channel::<(String, Value)>(64);
    let sink = ChannelEventSink::new(tx);
    let runner = state.runner.clone();
    let turn = TurnRequest {
        conversation_id: conversation_id.clone(),
        content: request.content.clone(),
        model_override: request.model.clone(),
        file_context: String::new(),
    };
    tokio::spawn(async move {
        if let Err(e) = runner.run_turn(turn, &session, &sink).await {
            tracing::warn!(error = %e, conversation_id, "turn ended with error");
        }
    });

    let stream = async_stream_from(rx);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn async_stream_from(
    mut rx: mpsc::Receiver<(String, Value)>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    futures::stream::poll_fn(move |cx| {
        rx.poll_recv(cx).map(|item| {
            item.map(|(event_type, data)| {
                Ok(Event::default()
                    .event(event_type)
                    .data(data.to_string()))
            })
        })
    })
}

/// GET /api/chat/conversations/{id}
pub async fn get_conversation(
    State(state): State<AppState>,
    Session(session): Session,
    Path(id): Path<String>,
) -> ApiResult<Json<ConversationWithMessages>> {
    let hydrated = state
        .conversations
        .get_with_messages(&id)
        .await
        .map_err(ApiError)?
        .ok_or_else(|| ApiError(DeskError::NotFound(format!("conversation {id}"))))?;
    if hydrated.conversation.user_id != session.user_id && !session.is_admin() {
        return Err(ApiError(DeskError::Forbidden("not your conversation".into())));
    }
    Ok(Json(hydrated))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmationReply {
    pub approved: bool,
}

/// POST /api/chat/confirmations/{widget_id}. Resolves a pending high-risk
/// tool confirmation.
pub async fn post_confirmation(
    State(state): State<AppState>,
    Session(session): Session,
    Path(widget_id): Path<String>,
    Json(reply): Json<ConfirmationReply>,
) -> ApiResult<Json<Value>> {
    require_permission(&session, "chat:send")?;
    if !state.confirmations.resolve(&widget_id, reply.approved) {
        return Err(ApiError(DeskError::NotFound(format!(
            "confirmation {widget_id}"
        ))));
    }
    Ok(Json(json!({"status": "accepted"})))
}
