//! OpenAI-compatible streaming provider.
//!
//! Works with OpenAI and any API that speaks the `/chat/completions`
//! SSE streaming format.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use reqwest::Client;

use super::error::ProviderError;
use super::provider::LlmProvider;
use super::types::{ChatMessage, ProviderKind, ProviderSettings, Role, TokenStream};
use crate::sse_parser::SseDataStream;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible provider.
#[derive(Debug)]
pub struct OpenAiCompatProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAiCompatProvider {
    #[must_use]
    pub fn new(client: Client, settings: &ProviderSettings, api_key: String) -> Self {
        Self {
            client,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn stream(
        &self,
        history: Vec<ChatMessage>,
        system_prompt: &str,
    ) -> Result<TokenStream, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::new(Role::System, system_prompt));
        messages.extend(history);

        let request = StreamRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: true,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let sse_stream = SseDataStream::new(response.bytes_stream());
        Ok(Box::pin(OpenAiStreamAdapter::new(sse_stream)))
    }
}

// ============================================================================
// Streaming Types
// ============================================================================

#[derive(serde::Serialize)]
struct StreamRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

/// OpenAI SSE stream chunk.
#[derive(serde::Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(serde::Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(serde::Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// Adapter that turns SSE data payloads into reply fragments.
///
/// Transport errors after the stream started are converted into one final
/// diagnostic fragment so the accumulated turn still completes.
pub(crate) struct OpenAiStreamAdapter<S> {
    inner: SseDataStream<S>,
    done: bool,
}

impl<S> OpenAiStreamAdapter<S> {
    pub(crate) fn new(inner: SseDataStream<S>) -> Self {
        Self { inner, done: false }
    }
}

impl<S, E> Stream for OpenAiStreamAdapter<S>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(data))) => {
                    if data.is_empty() {
                        continue;
                    }

                    if data == "[DONE]" {
                        self.done = true;
                        return Poll::Ready(None);
                    }

                    match serde_json::from_str::<StreamChunk>(&data) {
                        Ok(chunk) => {
                            if let Some(choice) = chunk.choices.first()
                                && let Some(ref content) = choice.delta.content
                                && !content.is_empty()
                            {
                                return Poll::Ready(Some(content.clone()));
                            }
                            // Chunks without content (role deltas, finish markers).
                        }
                        Err(e) => {
                            tracing::debug!(data = %data, error = %e, "failed to parse stream chunk");
                        }
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(format!("error: {e}")));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
