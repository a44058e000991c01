//! Per-conversation message channel over WebSocket.
//!
//! A client connects to `/ws?conversationId=<id>`. Each text frame it sends is
//! stored as a user message, echoed back, answered by the reply generator, and
//! the stored reply is sent after it. Frames are handled one at a time in
//! arrival order.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message as Frame, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::chat::core::errors::ChatResult;
use crate::chat::core::ids::ConversationId;
use crate::chat::core::records::Sender;

use super::protocol::{
    EMPTY_CONTENT, Envelope, INTERNAL_ERROR, Inbound, MISSING_CONVERSATION, PROCESSING_FAILED,
    UNKNOWN_CONVERSATION,
};
use super::state::AppState;

type FrameSink = SplitSink<WebSocket, Frame>;

/// Query parameters accepted at connect time.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Conversation the channel is scoped to.
    #[serde(rename = "conversationId")]
    pub conversation_id: Option<String>,
}

/// Upgrade handler for `GET /ws`.
pub async fn channel_upgrade(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    match headers.get(header::ORIGIN) {
        Some(origin) => {
            let origin = origin.to_str().unwrap_or_default();
            if !origin_allowed(origin, &state.allowed_origin) {
                warn!(origin, "channel refused: origin not allowed");
                return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
            }
        }
        None if state.require_origin => {
            warn!("channel refused: origin header missing");
            return (StatusCode::FORBIDDEN, "origin required").into_response();
        }
        None => {}
    }

    ws.on_upgrade(move |socket| run_channel(socket, params.conversation_id, state))
}

/// Whether a browser `Origin` may open a channel.
///
/// The configured origin is accepted, as is any origin served from localhost.
#[must_use]
pub fn origin_allowed(origin: &str, allowed: &str) -> bool {
    if origin == allowed {
        return true;
    }
    Url::parse(origin)
        .ok()
        .and_then(|url| url.host_str().map(|host| host == "localhost" || host == "127.0.0.1"))
        .unwrap_or(false)
}

async fn run_channel(socket: WebSocket, requested: Option<String>, state: Arc<AppState>) {
    let Some(raw_id) = requested.filter(|id| !id.trim().is_empty()) else {
        warn!("channel refused: missing conversation id");
        refuse(socket, close_code::POLICY, MISSING_CONVERSATION).await;
        return;
    };

    let conversation_id = match verify(&state, &raw_id).await {
        Ok(id) => id,
        Err((code, reason)) => {
            refuse(socket, code, reason).await;
            return;
        }
    };

    let handle = state.channels.open_handle();
    let connection_id = handle.connection_id();
    let token = handle.token().clone();
    state.channels.register(conversation_id, handle);

    // a delete may have landed between the lookup and the registration
    if let Err((code, reason)) = verify(&state, &raw_id).await {
        state.channels.unregister(conversation_id, connection_id);
        refuse(socket, code, reason).await;
        return;
    }
    info!(%conversation_id, connection_id, "channel established");

    let (mut sink, stream) = socket.split();
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
    tokio::spawn(read_frames(stream, inbound_tx, token.clone()));

    if send_envelope(&mut sink, &Envelope::connected()).await.is_ok() {
        loop {
            let payload = tokio::select! {
                biased;
                () = token.cancelled() => break,
                payload = inbound_rx.recv() => match payload {
                    Some(payload) => payload,
                    None => break,
                },
            };

            if let Err(e) = handle_frame(&state, conversation_id, &payload, &mut sink, &token).await
            {
                debug!(error = %e, %conversation_id, "channel write failed");
                break;
            }
        }
    }

    token.cancel();
    if let Err(e) = sink.send(Frame::Close(None)).await {
        debug!(error = %e, %conversation_id, "close frame not delivered");
    }
    state.channels.unregister(conversation_id, connection_id);
    info!(%conversation_id, connection_id, "channel closed");
}

/// Resolve the requested conversation, or the close code and reason to refuse with.
async fn verify(state: &AppState, raw_id: &str) -> Result<ConversationId, (u16, &'static str)> {
    match lookup(state, raw_id).await {
        Ok(Some(id)) => Ok(id),
        Ok(None) => {
            warn!(conversation_id = %raw_id, "channel refused: conversation not found");
            Err((close_code::POLICY, UNKNOWN_CONVERSATION))
        }
        Err(e) => {
            error!(error = %e, conversation_id = %raw_id, "channel refused: lookup failed");
            Err((close_code::ERROR, INTERNAL_ERROR))
        }
    }
}

async fn lookup(state: &AppState, raw_id: &str) -> ChatResult<Option<ConversationId>> {
    let Ok(id) = raw_id.parse::<ConversationId>() else {
        return Ok(None);
    };
    Ok(state
        .conversations
        .get_conversation(id)
        .await?
        .map(|conversation| conversation.id))
}

async fn refuse(mut socket: WebSocket, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(e) = socket.send(Frame::Close(Some(frame))).await {
        debug!(error = %e, "close frame not delivered");
    }
}

/// Forward text frames to the processing loop until the peer goes away.
async fn read_frames(
    mut stream: SplitStream<WebSocket>,
    inbound: mpsc::UnboundedSender<String>,
    token: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            () = token.cancelled() => break,
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Frame::Text(text))) => {
                if inbound.send(text.as_str().to_owned()).is_err() {
                    break;
                }
            }
            Some(Ok(Frame::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!(error = %e, "channel read failed");
                break;
            }
        }
    }
    token.cancel();
}

/// Handle one inbound frame. Only socket failures are returned as errors;
/// everything else is reported to the client.
async fn handle_frame(
    state: &AppState,
    conversation_id: ConversationId,
    payload: &str,
    sink: &mut FrameSink,
    token: &CancellationToken,
) -> Result<(), axum::Error> {
    let content = match serde_json::from_str::<Inbound>(payload) {
        Ok(inbound) => match inbound.into_content() {
            Some(content) => content,
            None => return send_envelope(sink, &Envelope::error(EMPTY_CONTENT)).await,
        },
        Err(e) => {
            warn!(error = %e, %conversation_id, "malformed channel frame");
            return send_envelope(sink, &Envelope::error(PROCESSING_FAILED)).await;
        }
    };

    let Ok(user_message) = state
        .conversations
        .save_message(conversation_id, Sender::User, content.clone())
        .await
    else {
        return send_envelope(sink, &Envelope::error(PROCESSING_FAILED)).await;
    };
    debug!(%conversation_id, record_id = user_message.id, "user message stored");
    send_envelope(sink, &Envelope::Message { data: user_message }).await?;

    let reply = tokio::select! {
        biased;
        () = token.cancelled() => {
            debug!(%conversation_id, "channel closed during generation, reply dropped");
            return Ok(());
        }
        reply = state.generator.generate(&content) => reply,
    };

    match state
        .conversations
        .save_message(conversation_id, Sender::Agent, reply)
        .await
    {
        Ok(agent_message) => {
            debug!(%conversation_id, record_id = agent_message.id, "agent reply stored");
            send_envelope(sink, &Envelope::Message { data: agent_message }).await
        }
        Err(_) => send_envelope(sink, &Envelope::error(PROCESSING_FAILED)).await,
    }
}

async fn send_envelope(sink: &mut FrameSink, envelope: &Envelope) -> Result<(), axum::Error> {
    let text = serde_json::to_string(envelope).map_err(axum::Error::new)?;
    sink.send(Frame::Text(text.into())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_allowed() {
        let allowed = "http://localhost:3001";
        assert!(origin_allowed("http://localhost:3001", allowed));
        assert!(origin_allowed("http://localhost:5173", allowed));
        assert!(origin_allowed("http://127.0.0.1:8080", allowed));
        assert!(!origin_allowed("https://evil.example", allowed));
        assert!(!origin_allowed("not a url", allowed));
    }

    #[test]
    fn test_configured_remote_origin_allowed() {
        assert!(origin_allowed(
            "https://chat.example.com",
            "https://chat.example.com"
        ));
    }

    #[test]
    fn test_connect_params_use_camel_case_key() {
        let params: ConnectParams =
            serde_json::from_str(r#"{"conversationId":"abc"}"#).unwrap();
        assert_eq!(params.conversation_id.as_deref(), Some("abc"));
    }
}
