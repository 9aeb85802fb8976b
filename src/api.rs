//! API request/response types shared between handlers, clients, and tests.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{Message, ProviderConfig, Session};

// ============================================================================
// Chat
// ============================================================================

/// Body of `POST /api/v1/chat` and `POST /api/v1/chat/stream`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatTurnRequest {
    pub message: String,
    /// Omit to start a new session.
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatTurnResponse {
    pub message: String,
    pub session_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopRequest {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopResponse {
    pub success: bool,
    pub message: String,
}

/// One SSE event on the streaming chat endpoint, serialized as a bare
/// JSON object per event: `{"session_id": ...}`, `{"chunk": ...}`,
/// `{"done": true}`, `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamEvent {
    SessionId { session_id: Uuid },
    Chunk { chunk: String },
    Done { done: bool },
    Error { error: String },
}

impl StreamEvent {
    #[must_use]
    pub fn done() -> Self {
        Self::Done { done: true }
    }
}

// ============================================================================
// Sessions
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateSessionRequest {
    pub title: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub title: String,
    pub config_id: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            title: session.title.clone(),
            config_id: session.config_id,
            created_at: session.created_at.to_rfc3339(),
            updated_at: session.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

impl From<&Message> for MessageResponse {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListMessagesResponse {
    pub messages: Vec<MessageResponse>,
}

// ============================================================================
// Provider Configurations
// ============================================================================

use crate::llm::ProviderKind;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateConfigRequest {
    pub name: String,
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateConfigRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub is_default: Option<bool>,
}

/// Config as exposed over the API. The API key is write-only and never
/// echoed back.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub id: Uuid,
    pub name: String,
    pub provider: ProviderKind,
    pub model: String,
    pub base_url: Option<String>,
    pub is_default: bool,
    pub created_at: String,
}

impl From<&ProviderConfig> for ConfigResponse {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            id: config.id,
            name: config.name.clone(),
            provider: config.provider,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            is_default: config.is_default,
            created_at: config.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListConfigsResponse {
    pub configs: Vec<ConfigResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderCatalogEntry {
    pub provider: ProviderKind,
    pub requires_api_key: bool,
    pub example_models: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderCatalogResponse {
    pub providers: Vec<ProviderCatalogEntry>,
}

// ============================================================================
// Pagination
// ============================================================================

fn default_limit() -> usize {
    100
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

// ============================================================================
// WebSocket Frames
// ============================================================================

/// Inbound client frame on the per-session socket.
#[derive(Debug, Serialize, Deserialize)]
pub struct WsInbound {
    pub content: String,
}

/// Outbound frame pushed to every connection registered for a session.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum WsEvent {
    Message {
        user_message: MessageResponse,
        assistant_message: MessageResponse,
    },
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_event_shapes() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(StreamEvent::SessionId { session_id: id }).unwrap();
        assert_eq!(json, serde_json::json!({ "session_id": id }));

        let json = serde_json::to_value(StreamEvent::Chunk {
            chunk: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "chunk": "hi" }));

        let json = serde_json::to_value(StreamEvent::done()).unwrap();
        assert_eq!(json, serde_json::json!({ "done": true }));

        let json = serde_json::to_value(StreamEvent::Error {
            error: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({ "error": "boom" }));
    }

    #[test]
    fn stream_event_round_trip() {
        let event: StreamEvent = serde_json::from_str(r#"{"chunk":"hello"}"#).unwrap();
        assert_eq!(
            event,
            StreamEvent::Chunk {
                chunk: "hello".to_string()
            }
        );
        let event: StreamEvent = serde_json::from_str(r#"{"done":true}"#).unwrap();
        assert_eq!(event, StreamEvent::done());
    }

    #[test]
    fn ws_event_message_shape() {
        let message = MessageResponse {
            id: Uuid::new_v4(),
            role: "user".to_string(),
            content: "hi".to_string(),
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
        };
        let event = WsEvent::Message {
            user_message: message.clone(),
            assistant_message: message,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["data"]["user_message"]["content"], "hi");
    }

    #[test]
    fn ws_event_error_shape() {
        let json = serde_json::to_value(WsEvent::Error("bad frame".to_string())).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["data"], "bad frame");
    }
}
