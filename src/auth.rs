//! Token authentication.
//!
//! Authentication is a capability the server consumes, not something it
//! implements in depth: `authenticate(token) -> Principal` behind a trait,
//! with a static token table loaded from configuration as the reference
//! implementation. Handlers get the principal through an axum extractor
//! that reads `Authorization: Bearer <token>` or, for WebSocket upgrades
//! where browsers cannot set headers, a `token` query parameter.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::config::AuthConfig;
use crate::handlers::problem_details;
use crate::server::AppState;

// ============================================================================
// Principal
// ============================================================================

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: String,
    pub is_active: bool,
    pub is_superuser: bool,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid authentication credential")]
    InvalidCredential,

    #[error("account is inactive")]
    InactiveAccount,
}

/// The seam a real identity backend would implement.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError>;
}

// ============================================================================
// Static Token Table
// ============================================================================

/// Token table from the config file. Inactive principals authenticate but
/// are rejected with a distinct error so the response can be a 403.
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenAuthenticator {
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        let tokens = config
            .tokens
            .iter()
            .map(|entry| {
                (
                    entry.token.clone(),
                    Principal {
                        id: entry.principal.clone(),
                        is_active: entry.active,
                        is_superuser: entry.superuser,
                    },
                )
            })
            .collect();
        Self { tokens }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let principal = self
            .tokens
            .get(token)
            .ok_or(AuthError::InvalidCredential)?;
        if !principal.is_active {
            return Err(AuthError::InactiveAccount);
        }
        Ok(principal.clone())
    }
}

// ============================================================================
// Extractor
// ============================================================================

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn query_token(parts: &Parts) -> Option<&str> {
    parts
        .uri
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts).or_else(|| query_token(parts)) else {
            return Err(
                problem_details::unauthorized("missing authentication credential").into_response(),
            );
        };

        state.auth.authenticate(token).await.map_err(|e| match e {
            AuthError::InvalidCredential => {
                problem_details::unauthorized("invalid authentication credential").into_response()
            }
            AuthError::InactiveAccount => {
                problem_details::forbidden("account is inactive").into_response()
            }
        })
    }
}
