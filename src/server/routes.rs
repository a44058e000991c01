//! HTTP route handlers for the chat API.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;

use crate::chat::core::ids::ConversationId;
use crate::chat::core::records::{Conversation, Message};

use super::channel::channel_upgrade;
use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/ping", get(ping))
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route("/api/conversations/{id}", delete(delete_conversation))
        .route("/api/conversations/{id}/history", get(conversation_history))
        .route("/ws", get(channel_upgrade))
        .with_state(state)
}

/// Error returned by the HTTP routes as `{ "error": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Server-side failure, with a fixed client-facing message.
    Internal(&'static str),
    /// Request could not be understood.
    BadRequest(&'static str),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "ai-chat-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Liveness check.
async fn ping() -> &'static str {
    "pong"
}

/// Body of `POST /api/conversations`. The whole body is optional.
#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationRequest {
    /// Optional display title.
    pub title: Option<String>,
}

async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    let conversations = state
        .conversations
        .list_conversations()
        .await
        .map_err(|_| ApiError::Internal("failed to list conversations"))?;
    Ok(Json(conversations))
}

async fn create_conversation(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let request: CreateConversationRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateConversationRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|_| ApiError::BadRequest("invalid request body"))?
    };

    let conversation = state
        .conversations
        .create_conversation(request.title)
        .await
        .map_err(|_| ApiError::Internal("failed to create conversation"))?;
    tracing::info!(conversation_id = %conversation.id, "conversation created");

    Ok((StatusCode::CREATED, Json(conversation)))
}

async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let Some(id) = parse_id(&id) else {
        return Ok(StatusCode::NO_CONTENT);
    };
    state
        .conversations
        .delete_conversation(id)
        .await
        .map_err(|_| ApiError::Internal("failed to delete conversation"))?;

    if state.channels.close(id) {
        tracing::info!(conversation_id = %id, "closed channel of deleted conversation");
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn conversation_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let Some(id) = parse_id(&id) else {
        return Ok(Json(Vec::new()));
    };
    let history = state
        .conversations
        .history(id)
        .await
        .map_err(|_| ApiError::Internal("failed to load conversation history"))?;
    Ok(Json(history))
}

/// Ids that do not parse can never name a stored conversation.
fn parse_id(raw: &str) -> Option<ConversationId> {
    let parsed = raw.parse().ok();
    if parsed.is_none() {
        tracing::debug!(conversation_id = raw, "unparseable conversation id treated as unknown");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::chat::core::errors::{ChatError, ChatResult};
    use crate::chat::core::records::Sender;
    use crate::chat::generator::TemplateResponder;
    use crate::chat::storage::{ChatStore, SqliteChatStore, StoreFuture};

    async fn test_state() -> Arc<AppState> {
        let store = SqliteChatStore::open_in_memory().await.unwrap();
        AppState::new(
            Arc::new(store),
            Arc::new(TemplateResponder::instant()),
            "http://localhost:3001",
        )
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_conversation(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/conversations")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let app = create_router(test_state().await);
        let response = app.oneshot(get_request("/api/ping")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"pong");
    }

    #[tokio::test]
    async fn test_create_and_list_conversations() {
        let app = create_router(test_state().await);

        let response = app
            .clone()
            .oneshot(post_conversation(r#"{"title":"first"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let first = body_json(response).await;
        assert_eq!(first["conversation_title"], "first");

        let response = app
            .clone()
            .oneshot(post_conversation(""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let second = body_json(response).await;
        assert!(second["conversation_title"].is_null());

        let response = app.oneshot(get_request("/api/conversations")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listed = body_json(response).await;
        let ids: Vec<_> = listed
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["conversation_id"].clone())
            .collect();
        assert_eq!(
            ids,
            vec![
                second["conversation_id"].clone(),
                first["conversation_id"].clone()
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_removes_conversation_and_history() {
        let state = test_state().await;
        let conversation = state.conversations.create_conversation(None).await.unwrap();
        state
            .conversations
            .save_message(conversation.id, Sender::User, "hi".to_string())
            .await
            .unwrap();
        let handle = state.channels.open_handle();
        state.channels.register(conversation.id, handle.clone());
        let app = create_router(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/conversations/{}", conversation.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(handle.is_closed());
        assert!(state.channels.is_empty());

        let response = app
            .clone()
            .oneshot(get_request(&format!("/api/conversations/{}/history", conversation.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));

        let response = app.oneshot(get_request("/api/conversations")).await.unwrap();
        assert_eq!(body_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_history_in_send_order() {
        let state = test_state().await;
        let conversation = state.conversations.create_conversation(None).await.unwrap();
        for content in ["one", "two", "three"] {
            state
                .conversations
                .save_message(conversation.id, Sender::User, content.to_string())
                .await
                .unwrap();
        }
        let app = create_router(state);

        let response = app
            .oneshot(get_request(&format!("/api/conversations/{}/history", conversation.id)))
            .await
            .unwrap();
        let history = body_json(response).await;
        let contents: Vec<_> = history
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["message_content"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_unparseable_id_is_unknown_conversation() {
        let state = test_state().await;
        let kept = state.conversations.create_conversation(None).await.unwrap();
        let app = create_router(state.clone());

        let response = app
            .clone()
            .oneshot(get_request("/api/conversations/c1/history"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!([]));

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/conversations/c1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let listed = state.conversations.list_conversations().await.unwrap();
        assert_eq!(listed, vec![kept]);
    }

    #[tokio::test]
    async fn test_invalid_create_body_is_bad_request() {
        let app = create_router(test_state().await);
        let response = app.oneshot(post_conversation("{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "invalid request body");
    }

    struct FailingStore;

    fn unavailable<T>() -> ChatResult<T> {
        Err(ChatError::InvalidRecord("store unavailable".to_string()))
    }

    impl ChatStore for FailingStore {
        fn create_conversation(
            &self,
            _title: Option<String>,
        ) -> StoreFuture<'_, ChatResult<Conversation>> {
            Box::pin(async { unavailable() })
        }

        fn list_conversations(&self) -> StoreFuture<'_, ChatResult<Vec<Conversation>>> {
            Box::pin(async { unavailable() })
        }

        fn get_conversation(
            &self,
            _id: ConversationId,
        ) -> StoreFuture<'_, ChatResult<Option<Conversation>>> {
            Box::pin(async { unavailable() })
        }

        fn delete_conversation(&self, _id: ConversationId) -> StoreFuture<'_, ChatResult<bool>> {
            Box::pin(async { unavailable() })
        }

        fn append_message(
            &self,
            _conversation_id: ConversationId,
            _sender: Sender,
            _content: String,
        ) -> StoreFuture<'_, ChatResult<Message>> {
            Box::pin(async { unavailable() })
        }

        fn list_messages(
            &self,
            _conversation_id: ConversationId,
        ) -> StoreFuture<'_, ChatResult<Vec<Message>>> {
            Box::pin(async { unavailable() })
        }
    }

    #[tokio::test]
    async fn test_store_failures_map_to_500() {
        let state = AppState::new(
            Arc::new(FailingStore),
            Arc::new(TemplateResponder::instant()),
            "http://localhost:3001",
        );
        let app = create_router(state);

        let response = app.clone().oneshot(get_request("/api/conversations")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"],
            "failed to list conversations"
        );

        let response = app.clone().oneshot(post_conversation("{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"],
            "failed to create conversation"
        );

        let id = ConversationId::new();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/conversations/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"],
            "failed to delete conversation"
        );

        let response = app
            .oneshot(get_request(&format!("/api/conversations/{id}/history")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await["error"],
            "failed to load conversation history"
        );
    }
}
