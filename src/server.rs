use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::timeout::TimeoutLayer;

use crate::auth::Authenticator;
use crate::chat::ChatService;
use crate::handlers;
use crate::registry::ConnectionRegistry;
use crate::store::ChatStore;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub chat: ChatService,
    pub connections: Arc<ConnectionRegistry>,
    pub auth: Arc<dyn Authenticator>,
    pub keep_alive_interval_seconds: u64,
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    // Streaming routes - no request timeout (SSE and WebSocket outlive it)
    let streaming_routes = Router::new()
        .route("/chat/stream", post(handlers::v1::stream_chat))
        .route("/sessions/{session_id}/ws", get(handlers::v1::session_ws))
        .with_state(state.clone());

    // Regular API routes - with request timeout
    let api_routes = Router::new()
        .route("/chat", post(handlers::v1::chat))
        .route("/chat/stop", post(handlers::v1::stop_chat))
        .route(
            "/sessions",
            get(handlers::v1::list_sessions).post(handlers::v1::create_session),
        )
        .route(
            "/sessions/{session_id}",
            get(handlers::v1::get_session)
                .put(handlers::v1::update_session)
                .delete(handlers::v1::delete_session),
        )
        .route(
            "/sessions/{session_id}/messages",
            get(handlers::v1::get_messages),
        )
        .route(
            "/configs",
            get(handlers::v1::list_configs).post(handlers::v1::create_config),
        )
        .route(
            "/configs/{config_id}",
            get(handlers::v1::get_config)
                .put(handlers::v1::update_config)
                .delete(handlers::v1::delete_config),
        )
        .route("/providers", get(handlers::v1::provider_catalog))
        .with_state(state.clone())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ));

    let api_v1 = Router::new()
        .merge(streaming_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024)); // 2 MB

    Router::new()
        .route("/livez", get(handlers::livez))
        .nest("/api/v1", api_v1)
}
