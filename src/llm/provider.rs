//! The provider seam every backend implements.

use async_trait::async_trait;

use super::error::ProviderError;
use super::types::{ChatMessage, ProviderKind, TokenStream};

/// One streaming interface over heterogeneous backends.
#[async_trait]
pub trait LlmProvider: Send + Sync + std::fmt::Debug {
    /// Which backend this provider talks to.
    fn kind(&self) -> ProviderKind;

    /// Start a streaming completion for the given history.
    ///
    /// The system prompt is prepended ahead of `history`. Errors returned
    /// here happened before any fragment was produced (connect failure,
    /// non-2xx status); once the stream exists, failures arrive in-band
    /// as a final diagnostic fragment.
    async fn stream(
        &self,
        history: Vec<ChatMessage>,
        system_prompt: &str,
    ) -> Result<TokenStream, ProviderError>;
}
