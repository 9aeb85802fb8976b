//! Ollama native streaming provider.
//!
//! Talks to the `/api/chat` endpoint, which streams newline-delimited
//! JSON objects rather than SSE.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use reqwest::Client;

use super::error::ProviderError;
use super::provider::LlmProvider;
use super::types::{ChatMessage, ProviderKind, ProviderSettings, Role, TokenStream};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama provider. Needs no credential.
#[derive(Debug)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaProvider {
    #[must_use]
    pub fn new(client: Client, settings: &ProviderSettings) -> Self {
        Self {
            client,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: settings.model.clone(),
            temperature: settings.temperature,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    async fn stream(
        &self,
        history: Vec<ChatMessage>,
        system_prompt: &str,
    ) -> Result<TokenStream, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::new(Role::System, system_prompt));
        messages.extend(history);

        let request = ChatStreamRequest {
            model: &self.model,
            messages,
            stream: true,
            options: self.temperature.map(|temperature| Options { temperature }),
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        Ok(Box::pin(OllamaStreamAdapter::new(response.bytes_stream())))
    }
}

// ============================================================================
// Streaming Types
// ============================================================================

#[derive(serde::Serialize)]
struct ChatStreamRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<Options>,
}

#[derive(serde::Serialize)]
struct Options {
    temperature: f32,
}

#[derive(serde::Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(serde::Deserialize)]
struct ChunkMessage {
    content: String,
}

/// Adapter over the NDJSON byte stream: buffers, splits lines, decodes
/// one `ChatChunk` per line. Transport errors after the stream started
/// become one final diagnostic fragment.
pub(crate) struct OllamaStreamAdapter<S> {
    inner: S,
    buffer: String,
    done: bool,
}

impl<S> OllamaStreamAdapter<S> {
    pub(crate) fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: String::new(),
            done: false,
        }
    }

    fn next_line(&mut self) -> Option<String> {
        let line_end = self.buffer.find('\n')?;
        let mut line = self.buffer[..line_end].to_string();
        self.buffer = self.buffer[line_end + 1..].to_string();
        if line.ends_with('\r') {
            line.pop();
        }
        Some(line)
    }
}

impl<S, E> Stream for OllamaStreamAdapter<S>
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
            while let Some(line) = self.next_line() {
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ChatChunk>(&line) {
                    Ok(chunk) => {
                        if chunk.done {
                            self.done = true;
                            // The final chunk may still carry content.
                            if let Some(message) = chunk.message
                                && !message.content.is_empty()
                            {
                                return Poll::Ready(Some(message.content));
                            }
                            return Poll::Ready(None);
                        }
                        if let Some(message) = chunk.message
                            && !message.content.is_empty()
                        {
                            return Poll::Ready(Some(message.content));
                        }
                    }
                    Err(e) => {
                        tracing::debug!(line = %line, error = %e, "failed to parse chat chunk");
                    }
                }
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    if let Ok(text) = std::str::from_utf8(&bytes) {
                        self.buffer.push_str(text);
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
