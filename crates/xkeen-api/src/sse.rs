// Server-sent event streams
//
// The panel pushes state over two `text/event-stream` endpoints. This module
// holds the incremental frame decoder, the stream type handed to consumers,
// and the `EventTransport` seam through which `xkeen-core` opens streams
// (the real `ApiClient`, or a scripted transport in tests).

use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use tracing::trace;

use crate::error::Error;

/// Event name used when a frame carries no `event:` field.
const DEFAULT_EVENT: &str = "message";

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
        }
    }
}

/// Decoded event stream. Ends when the server closes the response body.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<SseEvent, Error>> + Send>>;

/// The two push endpoints of the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum StreamEndpoint {
    /// Persistent channel: `status`, `log`, `restart`.
    #[strum(serialize = "events")]
    Events,
    /// Ephemeral latency check: `latency`, then `done` and `close`.
    #[strum(serialize = "latency-check")]
    LatencyCheck,
}

impl StreamEndpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::Events => "api/events",
            Self::LatencyCheck => "api/servers/check",
        }
    }
}

/// Opens event streams. The handshake (HTTP status) is checked before the
/// returned future resolves; frame errors surface as stream items.
pub trait EventTransport: Send + Sync {
    fn open(&self, endpoint: StreamEndpoint) -> BoxFuture<'_, Result<EventStream, Error>>;
}

// ── Decoder ──────────────────────────────────────────────────────────

/// Incremental `text/event-stream` decoder.
///
/// Feed raw body chunks in arrival order; complete events come out as soon
/// as their terminating blank line has been seen. Chunk boundaries may fall
/// anywhere, including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.feed_line(line) {
                out.push(event);
            }
        }
        out
    }

    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_owned()),
            "data" => self.data.push(value.to_owned()),
            "id" => self.id = Some(value.to_owned()),
            other => trace!(field = other, "ignoring SSE field"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let id = self.id.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| DEFAULT_EVENT.to_owned()),
            data,
            id,
        })
    }
}

/// Turn a response body into an [`EventStream`].
pub(crate) fn decode_body<S>(body: S) -> EventStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut decoder = SseDecoder::new();
        let mut body = std::pin::pin!(body);
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => {
                    for event in decoder.push(&chunk) {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    yield Err(Error::Transport(e));
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn decodes_named_events() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"event: status\ndata: {\"connected\":true}\n\nevent: log\ndata: line one\n\n");
        assert_eq!(
            events,
            vec![
                SseEvent::new("status", "{\"connected\":true}"),
                SseEvent::new("log", "line one"),
            ]
        );
    }

    #[test]
    fn frames_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"event: lat").is_empty());
        assert!(decoder.push(b"ency\r\ndata: {\"id\":3,").is_empty());
        let events = decoder.push(b"\"latency_ms\":80}\r\n\r\n");
        assert_eq!(events, vec![SseEvent::new("latency", "{\"id\":3,\"latency_ms\":80}")]);
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        let frame = "event: log\ndata: перезапуск\n\n".as_bytes();
        let (a, b) = frame.split_at(20);
        assert!(decoder.push(a).is_empty());
        assert_eq!(decoder.push(b)[0].data, "перезапуск");
    }

    #[test]
    fn comments_and_empty_frames_are_skipped() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keepalive\n\nevent: done\n\ndata: plain\n\n");
        assert_eq!(events, vec![SseEvent::new("message", "plain")]);
    }

    #[test]
    fn multiple_data_lines_are_joined() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"event: log\nid: 7\ndata: a\ndata: b\n\n");
        assert_eq!(events[0].data, "a\nb");
        assert_eq!(events[0].id.as_deref(), Some("7"));
    }

    #[test]
    fn endpoint_paths() {
        assert_eq!(StreamEndpoint::Events.path(), "api/events");
        assert_eq!(StreamEndpoint::LatencyCheck.path(), "api/servers/check");
    }
}
