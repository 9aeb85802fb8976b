//! Agent layer: persona prompt + streaming chat over the provider seam.

use std::str::FromStr;
use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;

use crate::llm::{ChatMessage, ProviderError, ProviderFactory, Role, TokenStream};
use crate::store::{ChatStore, ProviderConfig, StoreError};

// ============================================================================
// Personas
// ============================================================================

const CUSTOMER_SERVICE_PROMPT: &str = "\
You are a professional customer service assistant. Be friendly, patient, \
and concise. Answer questions about products, orders, shipping, and \
returns. When you do not know the answer, say so and offer to connect \
the customer with a human agent. Never invent order details.";

const GENERAL_PROMPT: &str = "You are a helpful assistant.";

/// Built-in personas. The persona only affects the system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentKind {
    #[default]
    CustomerService,
    General,
}

impl AgentKind {
    #[must_use]
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::CustomerService => CUSTOMER_SERVICE_PROMPT,
            Self::General => GENERAL_PROMPT,
        }
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer-service" => Ok(Self::CustomerService),
            "general" => Ok(Self::General),
            other => Err(format!("unknown agent persona '{other}'")),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum AgentError {
    /// The principal has no provider configuration at all.
    #[error("no provider configuration available")]
    NoConfiguration,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// Agent
// ============================================================================

/// Persona plus provider plumbing. Providers are built per call so
/// configuration changes apply on the next turn, never mid-stream.
#[derive(Clone)]
pub struct Agent {
    kind: AgentKind,
    factory: Arc<ProviderFactory>,
    store: Arc<dyn ChatStore>,
}

impl Agent {
    #[must_use]
    pub fn new(kind: AgentKind, factory: Arc<ProviderFactory>, store: Arc<dyn ChatStore>) -> Self {
        Self {
            kind,
            factory,
            store,
        }
    }

    /// Start a streaming reply for `history`.
    ///
    /// With `config: None` the principal's current default configuration
    /// is resolved at call time.
    pub async fn chat_stream(
        &self,
        history: Vec<ChatMessage>,
        principal: &str,
        config: Option<&ProviderConfig>,
    ) -> Result<TokenStream, AgentError> {
        let settings = match config {
            Some(config) => config.settings(),
            None => self
                .store
                .default_config(principal)
                .await?
                .ok_or(AgentError::NoConfiguration)?
                .settings(),
        };

        let provider = self.factory.build(&settings)?;
        Ok(provider.stream(history, self.kind.system_prompt()).await?)
    }

    /// Ask a single question and drain the stream into one string.
    pub async fn ask(
        &self,
        query: &str,
        mut history: Vec<ChatMessage>,
        principal: &str,
        config: Option<&ProviderConfig>,
    ) -> Result<String, AgentError> {
        history.push(ChatMessage::new(Role::User, query));
        let mut stream = self.chat_stream(history, principal, config).await?;

        let mut reply = String::new();
        while let Some(fragment) = stream.next().await {
            reply.push_str(&fragment);
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FallbackPolicy, ProviderKind};
    use crate::store::{MemoryStore, NewProviderConfig};
    use std::time::Duration;

    fn agent_over(store: Arc<MemoryStore>) -> Agent {
        let factory =
            Arc::new(ProviderFactory::new(FallbackPolicy::AvailabilityOverStrictness)
                .with_mock_delay(Duration::ZERO));
        Agent::new(AgentKind::CustomerService, factory, store)
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

    #[test]
    fn persona_parsing() {
        assert_eq!(
            "customer-service".parse::<AgentKind>().unwrap(),
            AgentKind::CustomerService
        );
        assert_eq!("general".parse::<AgentKind>().unwrap(), AgentKind::General);
        assert!("pirate".parse::<AgentKind>().is_err());
    }

    #[tokio::test]
    async fn ask_equals_drained_stream() {
        let store = Arc::new(MemoryStore::new());
        seed_mock_config(&store, "alice").await;
        let agent = agent_over(store);

        let history = vec![ChatMessage::new(Role::User, "hello there")];
        let mut stream = agent
            .chat_stream(history.clone(), "alice", None)
            .await
            .unwrap();
        let mut streamed = String::new();
        while let Some(fragment) = stream.next().await {
            streamed.push_str(&fragment);
        }

        let asked = agent.ask("hello there", vec![], "alice", None).await.unwrap();
        assert_eq!(streamed, asked);
    }

    #[tokio::test]
    async fn no_configuration_fails() {
        let store = Arc::new(MemoryStore::new());
        let agent = agent_over(store);

        let err = agent
            .chat_stream(vec![], "alice", None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::NoConfiguration));
    }
}
