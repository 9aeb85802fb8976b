//! SSE (Server-Sent Events) data extraction for upstream provider streams.
//!
//! Handles byte buffering, UTF-8 conversion, line splitting (`\n` and
//! `\r\n`), and event assembly: consecutive `data:` lines are joined with
//! newlines until a blank line marks the event boundary. `event:`, `id:`,
//! `retry:` and comment lines are ignored since the OpenAI-compatible
//! streaming format only carries `data:` payloads.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

enum SseLine {
    Data(String),
    Empty,
    Ignored,
}

fn parse_line(line: &str) -> SseLine {
    if line.is_empty() {
        return SseLine::Empty;
    }

    if let Some(data) = line.strip_prefix("data:") {
        let data = data.strip_prefix(' ').unwrap_or(data);
        return SseLine::Data(data.to_string());
    }

    // Comments and fields we do not consume (event:, id:, retry:).
    SseLine::Ignored
}

/// A stream adapter that assembles SSE `data:` payloads from a byte stream.
///
/// Yields one `String` per event. Upstream transport errors pass through
/// so callers decide how to surface them.
pub struct SseDataStream<S> {
    inner: S,
    buffer: String,
    data_lines: Vec<String>,
    done: bool,
}

impl<S> SseDataStream<S> {
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: String::new(),
            data_lines: Vec::new(),
            done: false,
        }
    }

    fn take_event(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data_lines).join("\n"))
    }
}

impl<S, E> Stream for SseDataStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<String, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }

        loop {
            // Drain complete lines from the buffer first.
            if let Some(line_end) = self.buffer.find('\n') {
                let mut line = self.buffer[..line_end].to_string();
                self.buffer = self.buffer[line_end + 1..].to_string();
                if line.ends_with('\r') {
                    line.pop();
                }

                match parse_line(&line) {
                    SseLine::Data(data) => self.data_lines.push(data),
                    SseLine::Empty => {
                        if let Some(event) = self.take_event() {
                            return Poll::Ready(Some(Ok(event)));
                        }
                    }
                    SseLine::Ignored => {}
                }
                continue;
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    if let Ok(text) = std::str::from_utf8(&bytes) {
                        self.buffer.push_str(text);
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    self.done = true;
                    // Flush a final event missing its trailing blank line.
                    if let Some(event) = self.take_event() {
                        return Poll::Ready(Some(Ok(event)));
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::stream;

    fn byte_stream(parts: Vec<&str>) -> impl Stream<Item = Result<Bytes, &'static str>> + Unpin {
        stream::iter(
            parts
                .into_iter()
                .map(|p| Ok(Bytes::from(p.as_bytes().to_vec())))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect(parts: Vec<&str>) -> Vec<String> {
        SseDataStream::new(byte_stream(parts))
            .map(|r| r.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn single_event() {
        let events = collect(vec!["data: hello\n\n"]).await;
        assert_eq!(events, vec!["hello"]);
    }

    #[tokio::test]
    async fn multiple_events() {
        let events = collect(vec!["data: a\n\ndata: b\n\ndata: [DONE]\n\n"]).await;
        assert_eq!(events, vec!["a", "b", "[DONE]"]);
    }

    #[tokio::test]
    async fn event_split_across_chunks() {
        let events = collect(vec!["data: hel", "lo\n", "\n"]).await;
        assert_eq!(events, vec!["hello"]);
    }

    #[tokio::test]
    async fn multi_line_data_joined() {
        let events = collect(vec!["data: one\ndata: two\n\n"]).await;
        assert_eq!(events, vec!["one\ntwo"]);
    }

    #[tokio::test]
    async fn crlf_line_endings() {
        let events = collect(vec!["data: hello\r\n\r\n"]).await;
        assert_eq!(events, vec!["hello"]);
    }

    #[tokio::test]
    async fn comments_and_fields_ignored() {
        let events = collect(vec![": keep-alive\n\nevent: token\ndata: x\n\n"]).await;
        assert_eq!(events, vec!["x"]);
    }

    #[tokio::test]
    async fn final_event_without_trailing_blank_line() {
        let events = collect(vec!["data: tail\n"]).await;
        assert_eq!(events, vec!["tail"]);
    }

    #[tokio::test]
    async fn upstream_error_passes_through() {
        let parts: Vec<Result<Bytes, &'static str>> =
            vec![Ok(Bytes::from_static(b"data: a\n\n")), Err("boom")];
        let mut stream = SseDataStream::new(stream::iter(parts));
        assert_eq!(stream.next().await.unwrap().unwrap(), "a");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }
}
