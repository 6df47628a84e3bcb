//! Consumer side of streamed responses.
//!
//! [`EventStream`] reads a server-sent-events body on a background task and
//! hands parsed events to the caller through a bounded channel. A full channel
//! stalls the reader instead of dropping events, and [`EventStream::close`]
//! stops the reader and releases the connection.

use crate::error::ClientError;
use crate::sse::SseEvent;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default number of buffered events.
pub const DEFAULT_CAPACITY: usize = 16;

/// Incremental SSE parser.
///
/// Accepts arbitrary byte slices and yields complete events. Events end at a
/// blank line; `\r\n` line endings are accepted. Comment lines and unknown
/// fields are ignored.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every event they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>, ClientError> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some((end, sep_len)) = find_event_end(&self.buffer) {
            let raw: Vec<u8> = self.buffer.drain(..end + sep_len).take(end).collect();
            let text = String::from_utf8(raw).map_err(|_| ClientError::InvalidUtf8)?;
            if let Some(event) = parse_event(&text) {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Parse whatever is left once the body has ended.
    pub fn finish(&mut self) -> Result<Option<SseEvent>, ClientError> {
        let raw = std::mem::take(&mut self.buffer);
        let text = String::from_utf8(raw).map_err(|_| ClientError::InvalidUtf8)?;
        Ok(parse_event(&text))
    }
}

/// Position of the first blank line and the length of the separator.
fn find_event_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_event(text: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => data_lines.push(value),
            "event" => event.event = Some(value.to_string()),
            "id" => event.id = Some(value.to_string()),
            _ => {}
        }
    }

    if data_lines.is_empty() && event.event.is_none() {
        return None;
    }
    event.data = data_lines.join("\n");
    Some(event)
}

/// Events of one streamed response, delivered in order.
pub struct EventStream {
    rx: mpsc::Receiver<Result<SseEvent, ClientError>>,
    reader: JoinHandle<()>,
}

impl EventStream {
    /// Send `request` and stream the events of its response.
    pub async fn connect(
        request: reqwest::RequestBuilder,
        capacity: usize,
    ) -> Result<Self, ClientError> {
        let response = request.send().await?;
        Self::from_response(response, capacity).await
    }

    /// Stream the events of an already received response.
    ///
    /// Non-success statuses are returned as [`ClientError::Status`] with the
    /// body text.
    pub async fn from_response(
        response: reqwest::Response,
        capacity: usize,
    ) -> Result<Self, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let (tx, rx) = mpsc::channel(capacity.max(1));
        let reader = tokio::spawn(read_events(response, tx));
        Ok(Self { rx, reader })
    }

    /// Next event, or `None` once the server has closed the stream.
    pub async fn next(&mut self) -> Option<Result<SseEvent, ClientError>> {
        self.rx.recv().await
    }

    /// Stop reading. Events already buffered are discarded.
    pub fn close(mut self) {
        self.rx.close();
        self.reader.abort();
    }

    /// Read until the end of the stream, collecting every event.
    pub async fn collect(mut self) -> Result<Vec<SseEvent>, ClientError> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event?);
        }
        Ok(events)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_events(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<SseEvent, ClientError>>,
) {
    let mut parser = SseParser::new();
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let events = match chunk {
            Ok(bytes) => parser.push(&bytes),
            Err(e) => Err(ClientError::Http(e)),
        };
        match events {
            Ok(events) => {
                for event in events {
                    if tx.send(Ok(event)).await.is_err() {
                        debug!("Event consumer went away");
                        return;
                    }
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        }
    }

    match parser.finish() {
        Ok(Some(event)) => {
            let _ = tx.send(Ok(event)).await;
        }
        Ok(None) => {}
        Err(e) => {
            let _ = tx.send(Err(e)).await;
        }
    }
}
