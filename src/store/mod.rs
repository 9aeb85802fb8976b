//! Persistence seam for sessions, messages, and provider configurations.
//!
//! One trait, one in-memory reference implementation. The trait is the
//! unit other backends (SQL, KV) would implement; everything above it is
//! storage-agnostic.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::llm::{ProviderKind, ProviderSettings};

// ============================================================================
// Entities
// ============================================================================

/// A persistent conversation owned by one principal.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub owner: String,
    pub title: String,
    /// The owner's default configuration at creation time. Not repointed
    /// when defaults change later; turns fall back to the current default
    /// if this config has been deleted.
    pub config_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role of a stored message. Stored history never contains system
/// messages; the persona prompt is prepended at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One immutable message in a session.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A stored provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub id: Uuid,
    pub owner: String,
    pub name: String,
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl ProviderConfig {
    /// The per-call settings a provider is built from.
    #[must_use]
    pub fn settings(&self) -> ProviderSettings {
        ProviderSettings {
            kind: self.provider,
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            temperature: None,
            max_tokens: None,
        }
    }
}

// ============================================================================
// Inputs
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewSession {
    pub owner: String,
    pub title: String,
    pub config_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: Uuid,
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct NewProviderConfig {
    pub owner: String,
    pub name: String,
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub is_default: bool,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfigUpdate {
    pub name: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub is_default: Option<bool>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Trait
// ============================================================================

/// Persistence operations for the chat domain.
///
/// Invariants implementations must uphold:
/// - message order per session is stable insertion order (creation time,
///   ties broken by insertion sequence);
/// - deleting a session cascades to its messages;
/// - at most one default configuration per owner, and `default_config`
///   promotes the owner's first configuration when none is flagged;
/// - configuration names are unique per owner (collisions get a numeric
///   suffix).
#[async_trait]
pub trait ChatStore: Send + Sync {
    // Sessions
    async fn create_session(&self, new: NewSession) -> StoreResult<Session>;
    async fn session(&self, id: Uuid) -> StoreResult<Option<Session>>;
    /// Owner's sessions ordered by `updated_at` descending.
    async fn sessions_by_owner(
        &self,
        owner: &str,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<Session>>;
    async fn rename_session(&self, id: Uuid, title: &str) -> StoreResult<Session>;
    /// Bump `updated_at` after a completed turn.
    async fn touch_session(&self, id: Uuid) -> StoreResult<()>;
    async fn delete_session(&self, id: Uuid) -> StoreResult<()>;

    // Messages
    async fn append_message(&self, new: NewMessage) -> StoreResult<Message>;
    /// Session messages in insertion order.
    async fn messages(
        &self,
        session_id: Uuid,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<Message>>;

    // Provider configurations
    async fn create_config(&self, new: NewProviderConfig) -> StoreResult<ProviderConfig>;
    async fn config(&self, id: Uuid) -> StoreResult<Option<ProviderConfig>>;
    async fn configs_by_owner(
        &self,
        owner: &str,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<ProviderConfig>>;
    /// The owner's effective default, promoting the first configuration
    /// when none is flagged. `None` only when the owner has no
    /// configurations at all.
    async fn default_config(&self, owner: &str) -> StoreResult<Option<ProviderConfig>>;
    async fn update_config(
        &self,
        id: Uuid,
        update: ProviderConfigUpdate,
    ) -> StoreResult<ProviderConfig>;
    async fn delete_config(&self, id: Uuid) -> StoreResult<()>;
}
