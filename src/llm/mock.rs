//! Deterministic mock provider.
//!
//! Used directly when a configuration selects `mock`, and as the
//! availability fallback when a real backend has no credential. Echoes
//! the last user message word by word with a small typing delay, so
//! streaming behavior is exercised end to end without a real backend.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;

use super::error::ProviderError;
use super::provider::LlmProvider;
use super::types::{ChatMessage, ProviderKind, Role, TokenStream};

#[derive(Debug)]
pub struct MockProvider {
    delay: Duration,
}

impl MockProvider {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// The full reply the mock produces for a given history.
    #[must_use]
    pub fn response_for(history: &[ChatMessage]) -> String {
        let last_user = history
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map_or("hello", |m| m.content.as_str());

        format!(
            "[mock reply] You said: \"{last_user}\". I am running in mock mode \
             because no real backend is reachable. Configure an API key or check \
             the service connection to talk to a real model."
        )
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mock
    }

    async fn stream(
        &self,
        history: Vec<ChatMessage>,
        _system_prompt: &str,
    ) -> Result<TokenStream, ProviderError> {
        let response = Self::response_for(&history);
        let words: Vec<String> = response
            .split_whitespace()
            .map(|w| format!("{w} "))
            .collect();
        let delay = self.delay;

        // First fragment goes out immediately; the delay simulates typing
        // between fragments.
        let stream = stream::iter(words.into_iter().enumerate()).then(move |(i, word)| async move {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            word
        });

        Ok(Box::pin(stream))
    }
}
