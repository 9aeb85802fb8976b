//! The per-turn state machine.
//!
//! Every turn walks the same sequence: resolve the session (creating one
//! when no id is given), resolve the effective provider configuration,
//! persist the user message, stream the reply over a bounded history
//! window, and persist exactly one assistant message. `chat`, `stream`,
//! and `turn` are three delivery views over that one sequence.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};
use uuid::Uuid;

use super::stop::StopSignals;
use crate::agent::Agent;
use crate::api::{ChatTurnRequest, ChatTurnResponse, StreamEvent};
use crate::auth::Principal;
use crate::error::ChatError;
use crate::llm::{ChatMessage, Role};
use crate::store::{
    ChatStore, Message, MessageRole, NewMessage, NewSession, ProviderConfig, Session,
};

/// Messages sent upstream per turn, most recent last. The just-persisted
/// user message counts toward the window.
const HISTORY_WINDOW: usize = 10;

/// New sessions are titled with the start of the first message.
const TITLE_MAX_CHARS: usize = 20;

// ============================================================================
// Service
// ============================================================================

#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    agent: Agent,
    stops: StopSignals,
}

impl ChatService {
    #[must_use]
    pub fn new(store: Arc<dyn ChatStore>, agent: Agent) -> Self {
        Self {
            store,
            agent,
            stops: StopSignals::new(),
        }
    }

    /// Full turn, non-streaming view.
    pub async fn chat(
        &self,
        principal: &Principal,
        req: ChatTurnRequest,
    ) -> Result<ChatTurnResponse, ChatError> {
        let prepared = self.prepare_turn(principal, &req).await?;
        let assistant = self.complete(&prepared).await?;
        Ok(ChatTurnResponse {
            message: assistant.content,
            session_id: prepared.session.id,
        })
    }

    /// Full turn, streaming view.
    ///
    /// Events arrive in order: the session id, zero or more chunks, then
    /// a terminal done or error. The turn runs in a spawned task, so a
    /// client disconnect or an advisory stop suppresses delivery without
    /// interrupting the drain or the final persist.
    pub async fn stream(
        &self,
        principal: &Principal,
        req: ChatTurnRequest,
    ) -> Result<ReceiverStream<StreamEvent>, ChatError> {
        let prepared = self.prepare_turn(principal, &req).await?;
        let session_id = prepared.session.id;
        let stop = self.stops.watch(session_id);
        let (tx, rx) = mpsc::channel::<StreamEvent>(32);

        let service = self.clone();
        tokio::spawn(async move {
            // Send failures mean the client went away; the turn still
            // runs to completion and persists.
            let _ = tx.send(StreamEvent::SessionId { session_id }).await;

            let outcome = match service
                .agent
                .chat_stream(
                    prepared.history.clone(),
                    &prepared.session.owner,
                    Some(&prepared.config),
                )
                .await
            {
                Ok(mut stream) => {
                    let mut full = String::new();
                    while let Some(fragment) = stream.next().await {
                        full.push_str(&fragment);
                        if !stop.is_cancelled() {
                            let _ = tx
                                .send(StreamEvent::Chunk { chunk: fragment })
                                .await;
                        }
                    }
                    service.persist_assistant(&prepared, full).await
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "stream start failed, falling back to ask");
                    match service.fallback_reply(&prepared).await {
                        Ok(text) => {
                            if !stop.is_cancelled() {
                                let _ = tx
                                    .send(StreamEvent::Chunk { chunk: text.clone() })
                                    .await;
                            }
                            service.persist_assistant(&prepared, text).await
                        }
                        Err(message) => {
                            // Diagnostic assistant message keeps the turn's slot.
                            let _ = service
                                .persist_assistant(&prepared, format!("error: {message}"))
                                .await;
                            let _ = tx.send(StreamEvent::Error { error: message }).await;
                            service.stops.clear(session_id);
                            return;
                        }
                    }
                }
            };

            match outcome {
                Ok(_) => {
                    let _ = tx.send(StreamEvent::done()).await;
                }
                Err(e) => {
                    let _ = tx
                        .send(StreamEvent::Error {
                            error: e.to_string(),
                        })
                        .await;
                }
            }
            service.stops.clear(session_id);
        });

        Ok(ReceiverStream::new(rx))
    }

    /// Full turn against an existing session, returning both persisted
    /// messages for WebSocket broadcast.
    pub async fn turn(
        &self,
        principal: &Principal,
        session_id: Uuid,
        content: &str,
    ) -> Result<(Message, Message), ChatError> {
        let req = ChatTurnRequest {
            message: content.to_string(),
            session_id: Some(session_id),
        };
        let prepared = self.prepare_turn(principal, &req).await?;
        let assistant = self.complete(&prepared).await?;
        Ok((prepared.user_message, assistant))
    }

    /// Advisory stop for an in-flight stream. Always succeeds.
    pub fn stop(&self, session_id: Uuid) {
        self.stops.stop(session_id);
    }

    /// Whether `principal` owns an existing session with this id.
    pub async fn owns_session(
        &self,
        principal: &Principal,
        session_id: Uuid,
    ) -> Result<bool, ChatError> {
        Ok(self
            .store
            .session(session_id)
            .await?
            .is_some_and(|s| s.owner == principal.id))
    }

    // ========================================================================
    // Turn Internals
    // ========================================================================

    async fn prepare_turn(
        &self,
        principal: &Principal,
        req: &ChatTurnRequest,
    ) -> Result<PreparedTurn, ChatError> {
        let content = req.message.trim();
        if content.is_empty() {
            return Err(ChatError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }

        // Configuration is resolved before anything is persisted, so a
        // turn without any configuration leaves no trace.
        let (session, config) = match req.session_id {
            Some(id) => {
                let session = self
                    .store
                    .session(id)
                    .await?
                    .ok_or(ChatError::NotFound)?;
                if session.owner != principal.id {
                    // Reported identically to absence.
                    return Err(ChatError::NotFound);
                }
                let config = self.resolve_config(&session).await?;
                (session, config)
            }
            None => {
                let config = self
                    .store
                    .default_config(&principal.id)
                    .await?
                    .ok_or(ChatError::NoConfiguration)?;
                let session = self
                    .store
                    .create_session(NewSession {
                        owner: principal.id.clone(),
                        title: derive_title(content),
                        config_id: Some(config.id),
                    })
                    .await?;
                debug!(session_id = %session.id, owner = %session.owner, "created session");
                (session, config)
            }
        };

        let user_message = self
            .store
            .append_message(NewMessage {
                session_id: session.id,
                role: MessageRole::User,
                content: content.to_string(),
            })
            .await?;

        let stored = self.store.messages(session.id, 0, usize::MAX).await?;
        let history = history_window(&stored);

        Ok(PreparedTurn {
            session,
            config,
            user_content: content.to_string(),
            user_message,
            history,
        })
    }

    /// The session's bound configuration, falling back to the owner's
    /// current default when the bound one was deleted.
    async fn resolve_config(&self, session: &Session) -> Result<ProviderConfig, ChatError> {
        if let Some(config_id) = session.config_id
            && let Some(config) = self.store.config(config_id).await?
        {
            return Ok(config);
        }
        self.store
            .default_config(&session.owner)
            .await?
            .ok_or(ChatError::NoConfiguration)
    }

    /// Produce the assistant text and persist it. Pre-stream provider
    /// failures fall back to `ask`, then to a diagnostic message, so the
    /// turn never loses its assistant slot once the user message exists.
    async fn complete(&self, prepared: &PreparedTurn) -> Result<Message, ChatError> {
        let text = match self
            .agent
            .chat_stream(
                prepared.history.clone(),
                &prepared.session.owner,
                Some(&prepared.config),
            )
            .await
        {
            Ok(mut stream) => {
                let mut full = String::new();
                while let Some(fragment) = stream.next().await {
                    full.push_str(&fragment);
                }
                full
            }
            Err(e) => {
                warn!(session_id = %prepared.session.id, error = %e, "stream start failed, falling back to ask");
                match self.fallback_reply(prepared).await {
                    Ok(text) => text,
                    Err(message) => format!("error: {message}"),
                }
            }
        };
        self.persist_assistant(prepared, text).await
    }

    async fn fallback_reply(&self, prepared: &PreparedTurn) -> Result<String, String> {
        // History minus the just-persisted user message; ask re-appends it.
        let prior = prepared.history[..prepared.history.len().saturating_sub(1)].to_vec();
        self.agent
            .ask(
                &prepared.user_content,
                prior,
                &prepared.session.owner,
                Some(&prepared.config),
            )
            .await
            .map_err(|e| e.to_string())
    }

    async fn persist_assistant(
        &self,
        prepared: &PreparedTurn,
        content: String,
    ) -> Result<Message, ChatError> {
        let assistant = self
            .store
            .append_message(NewMessage {
                session_id: prepared.session.id,
                role: MessageRole::Assistant,
                content,
            })
            .await?;
        self.store.touch_session(prepared.session.id).await?;
        Ok(assistant)
    }
}

struct PreparedTurn {
    session: Session,
    config: ProviderConfig,
    user_content: String,
    user_message: Message,
    history: Vec<ChatMessage>,
}

// ============================================================================
// Pure Helpers
// ============================================================================

fn derive_title(message: &str) -> String {
    let mut title: String = message.chars().take(TITLE_MAX_CHARS).collect();
    if message.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

fn history_window(messages: &[Message]) -> Vec<ChatMessage> {
    let start = messages.len().saturating_sub(HISTORY_WINDOW);
    messages[start..]
        .iter()
        .map(|m| {
            let role = match m.role {
                MessageRole::User => Role::User,
                MessageRole::Assistant => Role::Assistant,
            };
            ChatMessage::new(role, m.content.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentKind;
    use crate::llm::{FallbackPolicy, ProviderFactory, ProviderKind};
    use crate::store::{MemoryStore, NewProviderConfig};
    use chrono::Utc;
    use std::time::Duration;

    fn principal(id: &str) -> Principal {
        Principal {
            id: id.to_string(),
            is_active: true,
            is_superuser: false,
        }
    }

    fn service(store: Arc<MemoryStore>) -> ChatService {
        let factory = Arc::new(
            ProviderFactory::new(FallbackPolicy::AvailabilityOverStrictness)
                .with_mock_delay(Duration::ZERO),
        );
        let agent = Agent::new(AgentKind::CustomerService, factory, store.clone());
        ChatService::new(store, agent)
    }

    fn strict_service(store: Arc<MemoryStore>) -> ChatService {
        let factory = Arc::new(ProviderFactory::new(FallbackPolicy::Strict));
        let agent = Agent::new(AgentKind::CustomerService, factory, store.clone());
        ChatService::new(store, agent)
    }

    /// A config the strict factory refuses to build a provider for.
    async fn seed_keyless_openai_config(store: &MemoryStore, owner: &str) {
        store
            .create_config(NewProviderConfig {
                owner: owner.to_string(),
                name: "openai".to_string(),
                provider: ProviderKind::OpenAi,
                model: "gpt-4o".to_string(),
                api_key: None,
                base_url: None,
                is_default: true,
            })
            .await
            .unwrap();
    }

    async fn seed_mock_config(store: &MemoryStore, owner: &str) {
        store
            .create_config(NewProviderConfig {
                owner: owner.to_string(),
                name: "mock".to_string(),
                provider: ProviderKind::Mock,
                model: "mock".to_string(),
                api_key: None,
                base_url: None,
                is_default: true,
            })
            .await
            .unwrap();
    }

    fn stored_message(i: usize) -> Message {
        Message {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            role: if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            },
            content: format!("msg-{i}"),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn title_short_message_kept() {
        assert_eq!(derive_title("hello"), "hello");
    }

    #[test]
    fn title_long_message_ellipsized() {
        let title = derive_title("this message is definitely longer than twenty characters");
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn title_exactly_at_limit_not_ellipsized() {
        let message: String = "x".repeat(TITLE_MAX_CHARS);
        assert_eq!(derive_title(&message), message);
    }

    #[test]
    fn title_multibyte_boundary() {
        let message = "héllo wörld with ünïcode characters over twenty";
        let title = derive_title(message);
        assert!(title.ends_with("..."));
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
    }

    #[test]
    fn window_keeps_last_ten_in_order() {
        let messages: Vec<Message> = (0..15).map(stored_message).collect();
        let window = history_window(&messages);
        assert_eq!(window.len(), HISTORY_WINDOW);
        assert_eq!(window[0].content, "msg-5");
        assert_eq!(window[9].content, "msg-14");
    }

    #[test]
    fn window_short_history_unchanged() {
        let messages: Vec<Message> = (0..3).map(stored_message).collect();
        assert_eq!(history_window(&messages).len(), 3);
    }

    #[tokio::test]
    async fn chat_turn_persists_user_and_assistant() {
        let store = Arc::new(MemoryStore::new());
        seed_mock_config(&store, "alice").await;
        let service = service(store.clone());

        let response = service
            .chat(
                &principal("alice"),
                ChatTurnRequest {
                    message: "where is my order?".to_string(),
                    session_id: None,
                },
            )
            .await
            .unwrap();

        assert!(!response.message.is_empty());

        let messages = store.messages(response.session_id, 0, 100).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "where is my order?");
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].content, response.message);

        let session = store.session(response.session_id).await.unwrap().unwrap();
        assert_eq!(session.title, "where is my order?");
    }

    #[tokio::test]
    async fn second_turn_reuses_session() {
        let store = Arc::new(MemoryStore::new());
        seed_mock_config(&store, "alice").await;
        let service = service(store.clone());
        let alice = principal("alice");

        let first = service
            .chat(
                &alice,
                ChatTurnRequest {
                    message: "hi".to_string(),
                    session_id: None,
                },
            )
            .await
            .unwrap();
        let second = service
            .chat(
                &alice,
                ChatTurnRequest {
                    message: "and my refund?".to_string(),
                    session_id: Some(first.session_id),
                },
            )
            .await
            .unwrap();

        assert_eq!(second.session_id, first.session_id);
        let messages = store.messages(first.session_id, 0, 100).await.unwrap();
        assert_eq!(messages.len(), 4);
    }

    #[tokio::test]
    async fn no_configuration_persists_nothing() {
        let store = Arc::new(MemoryStore::new());
        let service = service(store.clone());

        let err = service
            .chat(
                &principal("alice"),
                ChatTurnRequest {
                    message: "hello".to_string(),
                    session_id: None,
                },
            )
            .await
            .err()
            .unwrap();

        assert!(matches!(err, ChatError::NoConfiguration));
        assert!(store
            .sessions_by_owner("alice", 0, 100)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn empty_message_rejected() {
        let store = Arc::new(MemoryStore::new());
        seed_mock_config(&store, "alice").await;
        let service = service(store);

        let err = service
            .chat(
                &principal("alice"),
                ChatTurnRequest {
                    message: "   ".to_string(),
                    session_id: None,
                },
            )
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChatError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn foreign_session_reported_as_absent() {
        let store = Arc::new(MemoryStore::new());
        seed_mock_config(&store, "alice").await;
        seed_mock_config(&store, "bob").await;
        let service = service(store.clone());

        let alice_turn = service
            .chat(
                &principal("alice"),
                ChatTurnRequest {
                    message: "private".to_string(),
                    session_id: None,
                },
            )
            .await
            .unwrap();

        let err = service
            .chat(
                &principal("bob"),
                ChatTurnRequest {
                    message: "peek".to_string(),
                    session_id: Some(alice_turn.session_id),
                },
            )
            .await
            .err()
            .unwrap();

        assert!(matches!(err, ChatError::NotFound));
        // The probe left no trace in the session.
        let messages = store.messages(alice_turn.session_id, 0, 100).await.unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn stream_events_in_order_and_equivalent_to_chat() {
        let store = Arc::new(MemoryStore::new());
        seed_mock_config(&store, "alice").await;
        let service = service(store.clone());
        let alice = principal("alice");

        let events: Vec<StreamEvent> = service
            .stream(
                &alice,
                ChatTurnRequest {
                    message: "compare me".to_string(),
                    session_id: None,
                },
            )
            .await
            .unwrap()
            .collect()
            .await;

        let StreamEvent::SessionId { session_id } = events[0].clone() else {
            panic!("first event must carry the session id");
        };
        assert_eq!(*events.last().unwrap(), StreamEvent::done());

        let streamed: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Chunk { chunk } => Some(chunk.as_str()),
                _ => None,
            })
            .collect();
        assert!(!streamed.is_empty());

        let messages = store.messages(session_id, 0, 100).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, streamed);

        // Same input through the non-streaming view produces the same
        // reply (the mock is deterministic given equal history).
        let chat = service
            .chat(
                &alice,
                ChatTurnRequest {
                    message: "compare me".to_string(),
                    session_id: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(chat.message, streamed);
    }

    #[tokio::test]
    async fn stopped_stream_suppresses_chunks_but_persists() {
        let store = Arc::new(MemoryStore::new());
        seed_mock_config(&store, "alice").await;
        let service = service(store.clone());
        let alice = principal("alice");

        let first = service
            .chat(
                &alice,
                ChatTurnRequest {
                    message: "hi".to_string(),
                    session_id: None,
                },
            )
            .await
            .unwrap();

        // Cancel before the stream starts; delivery is suppressed while
        // the turn still drains and persists.
        service.stops.watch(first.session_id);
        service.stop(first.session_id);

        let events: Vec<StreamEvent> = service
            .stream(
                &alice,
                ChatTurnRequest {
                    message: "stop this".to_string(),
                    session_id: Some(first.session_id),
                },
            )
            .await
            .unwrap()
            .collect()
            .await;

        assert!(
            events
                .iter()
                .all(|e| !matches!(e, StreamEvent::Chunk { .. }))
        );
        assert_eq!(*events.last().unwrap(), StreamEvent::done());

        let messages = store.messages(first.session_id, 0, 100).await.unwrap();
        assert_eq!(messages.len(), 4);
    }

    #[tokio::test]
    async fn turn_returns_both_messages() {
        let store = Arc::new(MemoryStore::new());
        seed_mock_config(&store, "alice").await;
        let service = service(store.clone());
        let alice = principal("alice");

        let first = service
            .chat(
                &alice,
                ChatTurnRequest {
                    message: "hi".to_string(),
                    session_id: None,
                },
            )
            .await
            .unwrap();

        let (user, assistant) = service
            .turn(&alice, first.session_id, "next question")
            .await
            .unwrap();

        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.content, "next question");
        assert_eq!(assistant.role, MessageRole::Assistant);
        assert!(!assistant.content.is_empty());
    }

    #[tokio::test]
    async fn fallback_exhaustion_persists_diagnostic_assistant() {
        let store = Arc::new(MemoryStore::new());
        seed_keyless_openai_config(&store, "alice").await;
        let service = strict_service(store.clone());

        // Provider construction fails, ask fails the same way; the turn
        // still completes and keeps its assistant slot.
        let response = service
            .chat(
                &principal("alice"),
                ChatTurnRequest {
                    message: "hello".to_string(),
                    session_id: None,
                },
            )
            .await
            .unwrap();

        assert!(response.message.starts_with("error: "));

        let messages = store.messages(response.session_id, 0, 100).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert!(messages[1].content.starts_with("error: "));
    }

    #[tokio::test]
    async fn stream_fallback_exhaustion_emits_error_event() {
        let store = Arc::new(MemoryStore::new());
        seed_keyless_openai_config(&store, "alice").await;
        let service = strict_service(store.clone());

        let events: Vec<StreamEvent> = service
            .stream(
                &principal("alice"),
                ChatTurnRequest {
                    message: "hello".to_string(),
                    session_id: None,
                },
            )
            .await
            .unwrap()
            .collect()
            .await;

        let StreamEvent::SessionId { session_id } = events[0].clone() else {
            panic!("first event must carry the session id");
        };
        assert!(matches!(events.last(), Some(StreamEvent::Error { .. })));
        assert!(
            events
                .iter()
                .all(|e| !matches!(e, StreamEvent::Chunk { .. }))
        );

        // The diagnostic assistant message is persisted before the error
        // event goes out.
        let messages = store.messages(session_id, 0, 100).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.starts_with("error: "));
    }

    #[tokio::test]
    async fn deleted_bound_config_falls_back_to_default() {
        let store = Arc::new(MemoryStore::new());
        seed_mock_config(&store, "alice").await;
        let service = service(store.clone());
        let alice = principal("alice");

        let first = service
            .chat(
                &alice,
                ChatTurnRequest {
                    message: "hi".to_string(),
                    session_id: None,
                },
            )
            .await
            .unwrap();

        // Delete the bound config, add a replacement default.
        let session = store.session(first.session_id).await.unwrap().unwrap();
        store.delete_config(session.config_id.unwrap()).await.unwrap();
        seed_mock_config(&store, "alice").await;

        let second = service
            .chat(
                &alice,
                ChatTurnRequest {
                    message: "still works?".to_string(),
                    session_id: Some(first.session_id),
                },
            )
            .await
            .unwrap();
        assert!(!second.message.is_empty());
    }
}
