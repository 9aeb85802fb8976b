//! Chat turn handlers: single response, SSE stream, advisory stop.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use tracing::debug;

use crate::api::{ChatTurnRequest, StopRequest, StopResponse};
use crate::auth::Principal;
use crate::server::AppState;

/// POST /api/v1/chat
pub async fn chat(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<ChatTurnRequest>,
) -> Response {
    match state.chat.chat(&principal, req).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /api/v1/chat/stream
///
/// SSE endpoint. One JSON object per event, in order: `{"session_id"}`,
/// `{"chunk"}`*, then `{"done": true}` or `{"error"}`. Business errors
/// (not found, no configuration, invalid input) surface as a
/// problem-details response before any event is sent.
pub async fn stream_chat(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<ChatTurnRequest>,
) -> Response {
    let events = match state.chat.stream(&principal, req).await {
        Ok(events) => events,
        Err(e) => return e.into_response(),
    };

    let sse_stream = events.map(|event| {
        Ok::<_, Infallible>(
            Event::default()
                .json_data(&event)
                .unwrap_or_else(|_| Event::default().data("{}")),
        )
    });

    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.keep_alive_interval_seconds))
        .text("keep-alive");

    Sse::new(sse_stream).keep_alive(keep_alive).into_response()
}

/// POST /api/v1/chat/stop
///
/// Advisory: requests that chunk delivery for the session stop. Always
/// reports success, whether or not a stream is in flight.
pub async fn stop_chat(
    State(state): State<AppState>,
    _principal: Principal,
    Json(req): Json<StopRequest>,
) -> Json<StopResponse> {
    debug!(session_id = %req.session_id, "stop requested");
    state.chat.stop(req.session_id);
    Json(StopResponse {
        success: true,
        message: "stop signal delivered".to_string(),
    })
}
