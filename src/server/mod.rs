//! HTTP server for the chat API.
//!
//! Provides:
//! - REST endpoints for conversation management and history
//! - A WebSocket message channel per conversation

pub mod channel;
pub mod protocol;
pub mod registry;
pub mod routes;
pub mod state;

pub use registry::{ChannelHandle, ChannelRegistry};
pub use routes::create_router;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build the full application: routes plus CORS and request tracing.
///
/// # Errors
/// Returns an error if the allowed origin is not a valid header value.
pub fn build_app(state: Arc<AppState>) -> Result<Router, Box<dyn std::error::Error + Send + Sync>> {
    let origin: HeaderValue = state.allowed_origin.parse()?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Ok(create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

/// Start the HTTP server.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run_server(state: Arc<AppState>, port: u16) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    run_server_with_shutdown(state, port, std::future::pending()).await
}

/// Start the HTTP server with graceful shutdown support.
///
/// The server will stop accepting new connections when `shutdown_signal` completes.
///
/// # Errors
/// Returns an error if the server fails to start.
pub async fn run_server_with_shutdown<F>(
    state: Arc<AppState>,
    port: u16,
    shutdown_signal: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_app(state.clone())?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Chat server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    let closed = state.channels.close_all();
    tracing::info!(closed, "Chat server stopped");
    Ok(())
}
