//! Session CRUD and message listing, owner-scoped.

use axum::Json;
use axum::extract::{Path as PathExtract, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;
use uuid::Uuid;

use crate::api::{
    CreateSessionRequest, ListMessagesResponse, ListSessionsResponse, MessageResponse, PageQuery,
    SessionResponse, UpdateSessionRequest,
};
use crate::auth::Principal;
use crate::error::ChatError;
use crate::handlers::problem_details;
use crate::server::AppState;
use crate::store::NewSession;

/// GET /api/v1/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    principal: Principal,
    Query(page): Query<PageQuery>,
) -> Response {
    let sessions = match state
        .store
        .sessions_by_owner(&principal.id, page.skip, page.limit)
        .await
    {
        Ok(sessions) => sessions,
        Err(e) => return ChatError::from(e).into_response(),
    };

    Json(ListSessionsResponse {
        sessions: sessions.iter().map(SessionResponse::from).collect(),
    })
    .into_response()
}

/// POST /api/v1/sessions
///
/// Creates an empty session with an explicit title, bound to the owner's
/// current default configuration (if any).
pub async fn create_session(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<CreateSessionRequest>,
) -> Response {
    let title = req.title.trim();
    if title.is_empty() {
        return problem_details::unprocessable("title must not be empty").into_response();
    }

    let config_id = match state.store.default_config(&principal.id).await {
        Ok(config) => config.map(|c| c.id),
        Err(e) => return ChatError::from(e).into_response(),
    };

    match state
        .store
        .create_session(NewSession {
            owner: principal.id,
            title: title.to_string(),
            config_id,
        })
        .await
    {
        Ok(session) => {
            (StatusCode::CREATED, Json(SessionResponse::from(&session))).into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to create session");
            ChatError::from(e).into_response()
        }
    }
}

/// GET /api/v1/sessions/{session_id}
pub async fn get_session(
    State(state): State<AppState>,
    principal: Principal,
    PathExtract(session_id): PathExtract<Uuid>,
) -> Response {
    match owned_session(&state, &principal, session_id).await {
        Ok(session) => Json(SessionResponse::from(&session)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// PUT /api/v1/sessions/{session_id}
pub async fn update_session(
    State(state): State<AppState>,
    principal: Principal,
    PathExtract(session_id): PathExtract<Uuid>,
    Json(req): Json<UpdateSessionRequest>,
) -> Response {
    let title = req.title.trim();
    if title.is_empty() {
        return problem_details::unprocessable("title must not be empty").into_response();
    }

    if let Err(e) = owned_session(&state, &principal, session_id).await {
        return e.into_response();
    }

    match state.store.rename_session(session_id, title).await {
        Ok(session) => Json(SessionResponse::from(&session)).into_response(),
        Err(e) => ChatError::from(e).into_response(),
    }
}

/// DELETE /api/v1/sessions/{session_id}
pub async fn delete_session(
    State(state): State<AppState>,
    principal: Principal,
    PathExtract(session_id): PathExtract<Uuid>,
) -> Response {
    if let Err(e) = owned_session(&state, &principal, session_id).await {
        return e.into_response();
    }

    match state.store.delete_session(session_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!(error = %e, "failed to delete session");
            ChatError::from(e).into_response()
        }
    }
}

/// GET /api/v1/sessions/{session_id}/messages
pub async fn get_messages(
    State(state): State<AppState>,
    principal: Principal,
    PathExtract(session_id): PathExtract<Uuid>,
    Query(page): Query<PageQuery>,
) -> Response {
    if let Err(e) = owned_session(&state, &principal, session_id).await {
        return e.into_response();
    }

    match state.store.messages(session_id, page.skip, page.limit).await {
        Ok(messages) => Json(ListMessagesResponse {
            messages: messages.iter().map(MessageResponse::from).collect(),
        })
        .into_response(),
        Err(e) => ChatError::from(e).into_response(),
    }
}

/// Ownership gate: a session that exists but belongs to someone else is
/// reported exactly like one that does not exist.
async fn owned_session(
    state: &AppState,
    principal: &Principal,
    session_id: Uuid,
) -> Result<crate::store::Session, ChatError> {
    let session = state
        .store
        .session(session_id)
        .await?
        .ok_or(ChatError::NotFound)?;
    if session.owner != principal.id {
        return Err(ChatError::NotFound);
    }
    Ok(session)
}
