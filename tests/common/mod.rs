#![allow(dead_code)]
//! Common test utilities.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use tower::ServiceExt;

use parley::agent::{Agent, AgentKind};
use parley::auth::StaticTokenAuthenticator;
use parley::chat::ChatService;
use parley::config::{AuthConfig, TokenEntry};
use parley::llm::{FallbackPolicy, ProviderFactory};
use parley::registry::ConnectionRegistry;
use parley::server::{self, AppState};
use parley::store::MemoryStore;

pub const ALICE: &str = "alice-token";
pub const BOB: &str = "bob-token";
pub const ADMIN: &str = "admin-token";
pub const DORMANT: &str = "dormant-token";

fn token(token: &str, principal: &str, active: bool, superuser: bool) -> TokenEntry {
    TokenEntry {
        token: token.to_string(),
        principal: principal.to_string(),
        active,
        superuser,
    }
}

/// Create a test `AppState` over a fresh in-memory store, with a
/// zero-delay mock and a fixed token table.
pub fn test_app_state() -> AppState {
    let store = Arc::new(MemoryStore::new());
    let factory = Arc::new(
        ProviderFactory::new(FallbackPolicy::AvailabilityOverStrictness)
            .with_mock_delay(Duration::ZERO),
    );
    let agent = Agent::new(AgentKind::CustomerService, factory, store.clone());
    let chat = ChatService::new(store.clone(), agent);

    let auth = StaticTokenAuthenticator::from_config(&AuthConfig {
        tokens: vec![
            token(ALICE, "alice", true, false),
            token(BOB, "bob", true, false),
            token(ADMIN, "admin", true, true),
            token(DORMANT, "dormant", false, false),
        ],
    });

    AppState {
        store,
        chat,
        connections: Arc::new(ConnectionRegistry::new()),
        auth: Arc::new(auth),
        keep_alive_interval_seconds: 15,
    }
}

pub fn test_app() -> Router {
    server::build_app(test_app_state(), 300)
}

// ============================================================================
// Request Builders
// ============================================================================

pub fn get(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub fn post_json(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn put_json(uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::put(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn delete(uri: &str, token: &str) -> Request<Body> {
    Request::delete(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

pub async fn text_body(response: axum::response::Response) -> String {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(body.to_vec()).unwrap()
}

/// Create a default mock configuration for the given token's principal.
pub async fn seed_mock_config(app: &Router, token: &str) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/configs",
            token,
            serde_json::json!({
                "name": "mock",
                "provider": "mock",
                "model": "mock",
                "is_default": true,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    json_body(response).await
}
