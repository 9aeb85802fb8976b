//! The business error taxonomy and its HTTP mapping.

use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::agent::AgentError;
use crate::handlers::problem_details;
use crate::llm::ProviderError;
use crate::store::StoreError;

/// Errors a chat operation can surface to a caller.
///
/// Ownership failures deliberately map to `NotFound` so callers cannot
/// probe which session ids exist.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no provider configuration available")]
    NoConfiguration,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("internal failure: {0}")]
    Internal(String),
}

impl From<StoreError> for ChatError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Self::NotFound,
            StoreError::Backend(msg) => Self::Internal(msg),
        }
    }
}

impl From<AgentError> for ChatError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::NoConfiguration => Self::NoConfiguration,
            AgentError::Provider(e) => Self::Provider(e),
            AgentError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => problem_details::not_found("not found"),
            Self::Forbidden => problem_details::forbidden("forbidden"),
            Self::InvalidInput(detail) => problem_details::unprocessable(detail),
            Self::NoConfiguration => {
                problem_details::bad_request("no provider configuration available")
            }
            Self::Provider(e) => {
                tracing::error!(error = %e, "provider failure");
                problem_details::bad_gateway("provider request failed")
            }
            Self::Internal(detail) => {
                tracing::error!(detail = %detail, "internal failure");
                problem_details::internal_error("internal failure")
            }
        }
        .into_response()
    }
}
