//! Response specifications attached to expectations.
//!
//! Specs are plain data: everything a response will ever send, including every
//! chunk of a streamed response, is fixed when the stub is registered. This
//! keeps repeated matches byte-for-byte identical.

use crate::error::ConfigError;
use crate::sse::SseEvent;
use axum::http::header::{HeaderName, HeaderValue};
use bytes::Bytes;
use std::time::Duration;

/// What an expectation answers with.
#[derive(Debug, Clone)]
pub enum ResponseSpec {
    Fixed(FixedResponse),
    Streamed(StreamedResponse),
    /// Intentional failure-path stub, reported separately from `Fixed`.
    Error(ErrorResponse),
}

impl ResponseSpec {
    pub fn status(&self) -> u16 {
        match self {
            ResponseSpec::Fixed(r) => r.status,
            ResponseSpec::Streamed(r) => r.status,
            ResponseSpec::Error(r) => r.status,
        }
    }

    /// Short label used in logs and verification output.
    pub fn kind(&self) -> &'static str {
        match self {
            ResponseSpec::Fixed(_) => "fixed",
            ResponseSpec::Streamed(_) => "streamed",
            ResponseSpec::Error(_) => "error",
        }
    }

    /// Check the spec can be served. Called at registration time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let status = self.status();
        if !(100..=599).contains(&status) {
            return Err(ConfigError::InvalidStatus(status));
        }

        let headers = match self {
            ResponseSpec::Fixed(r) => &r.headers,
            ResponseSpec::Streamed(r) => {
                if r.chunks.is_empty() {
                    return Err(ConfigError::EmptyStream);
                }
                &r.headers
            }
            ResponseSpec::Error(r) => {
                if status < 400 {
                    return Err(ConfigError::SuccessStatusForError(status));
                }
                &r.headers
            }
        };
        validate_headers(headers)
    }
}

impl From<FixedResponse> for ResponseSpec {
    fn from(r: FixedResponse) -> Self {
        ResponseSpec::Fixed(r)
    }
}

impl From<StreamedResponse> for ResponseSpec {
    fn from(r: StreamedResponse) -> Self {
        ResponseSpec::Streamed(r)
    }
}

impl From<ErrorResponse> for ResponseSpec {
    fn from(r: ErrorResponse) -> Self {
        ResponseSpec::Error(r)
    }
}

fn validate_headers(headers: &[(String, String)]) -> Result<(), ConfigError> {
    for (name, value) in headers {
        HeaderName::from_bytes(name.as_bytes()).map_err(|e| ConfigError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        HeaderValue::from_str(value).map_err(|e| ConfigError::InvalidHeader {
            name: name.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

/// Delay applied before a fixed response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Delay {
    #[default]
    None,
    Fixed(Duration),
    /// Uniformly random within the inclusive range, drawn per request.
    Jitter { min: Duration, max: Duration },
}

impl Delay {
    /// Calculate the actual delay to apply.
    pub fn calculate(&self) -> Duration {
        match *self {
            Delay::None => Duration::ZERO,
            Delay::Fixed(d) => d,
            Delay::Jitter { min, max } if max > min => {
                use rand::Rng;
                let ms = rand::thread_rng().gen_range(min.as_millis()..=max.as_millis());
                Duration::from_millis(u64::try_from(ms).unwrap_or(u64::MAX))
            }
            Delay::Jitter { min, .. } => min,
        }
    }
}

/// A complete response written at once.
#[derive(Debug, Clone)]
pub struct FixedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub delay: Delay,
    /// Render `body` as a Handlebars template against the request.
    pub template: bool,
    /// Content type implied by how the body was set. An explicit
    /// `content-type` header wins.
    pub content_type: Option<String>,
}

impl FixedResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
            delay: Delay::None,
            template: false,
            content_type: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn text(self, text: impl Into<String>) -> Self {
        let mut this = self.body(text.into());
        this.content_type = Some("text/plain".to_string());
        this
    }

    #[must_use]
    pub fn json(mut self, value: &serde_json::Value) -> Self {
        self.body = Bytes::from(value.to_string());
        self.content_type = Some("application/json".to_string());
        self
    }

    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Delay::Fixed(delay);
        self
    }

    #[must_use]
    pub fn jitter(mut self, min: Duration, max: Duration) -> Self {
        self.delay = Delay::Jitter { min, max };
        self
    }

    #[must_use]
    pub fn template(mut self) -> Self {
        self.template = true;
        self
    }
}

/// One piece of a streamed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data: Bytes,
    /// Wait before writing this chunk. `None` falls back to the response's
    /// default chunk delay.
    pub delay: Option<Duration>,
}

impl Chunk {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            delay: None,
        }
    }

    pub fn after(delay: Duration, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            delay: Some(delay),
        }
    }
}

/// A response body written chunk by chunk, flushing after each one.
#[derive(Debug, Clone)]
pub struct StreamedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub chunks: Vec<Chunk>,
    /// Written right after the last chunk, e.g. `data: [DONE]\n\n`.
    pub terminal: Option<Bytes>,
    /// Delay before the first chunk when it has no delay of its own.
    pub initial_delay: Duration,
    /// Delay before every later chunk that has no delay of its own.
    pub chunk_delay: Duration,
    pub content_type: Option<String>,
}

impl Default for StreamedResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamedResponse {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            chunks: Vec::new(),
            terminal: None,
            initial_delay: Duration::ZERO,
            chunk_delay: Duration::ZERO,
            content_type: None,
        }
    }

    /// A server-sent-events stream built from events.
    pub fn sse<I>(events: I) -> Self
    where
        I: IntoIterator<Item = SseEvent>,
    {
        let mut this = Self::new().content_type("text/event-stream");
        this.chunks = events.into_iter().map(|e| Chunk::new(e.to_bytes())).collect();
        this
    }

    /// A newline-delimited JSON stream, one chunk per value.
    pub fn ndjson<I>(values: I) -> Self
    where
        I: IntoIterator<Item = serde_json::Value>,
    {
        let mut this = Self::new().content_type("application/x-ndjson");
        this.chunks = values
            .into_iter()
            .map(|v| Chunk::new(format!("{v}\n")))
            .collect();
        this
    }

    #[must_use]
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn chunk(mut self, data: impl Into<Bytes>) -> Self {
        self.chunks.push(Chunk::new(data));
        self
    }

    #[must_use]
    pub fn chunk_after(mut self, delay: Duration, data: impl Into<Bytes>) -> Self {
        self.chunks.push(Chunk::after(delay, data));
        self
    }

    #[must_use]
    pub fn event(mut self, event: SseEvent) -> Self {
        self.chunks.push(Chunk::new(event.to_bytes()));
        self
    }

    #[must_use]
    pub fn terminal(mut self, marker: impl Into<Bytes>) -> Self {
        self.terminal = Some(marker.into());
        self
    }

    #[must_use]
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub fn delay_between_chunks(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Chunks in write order, each paired with the delay that precedes it.
    /// The terminal marker, if any, comes last with no delay.
    pub fn schedule(&self) -> Vec<(Duration, Bytes)> {
        let mut plan: Vec<(Duration, Bytes)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let fallback = if i == 0 {
                    self.initial_delay
                } else {
                    self.chunk_delay
                };
                (chunk.delay.unwrap_or(fallback), chunk.data.clone())
            })
            .collect();
        if let Some(marker) = &self.terminal {
            plan.push((Duration::ZERO, marker.clone()));
        }
        plan
    }
}

/// Non-success response written immediately.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub content_type: Option<String>,
}

impl ErrorResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
            content_type: None,
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn json(mut self, value: &serde_json::Value) -> Self {
        self.body = Bytes::from(value.to_string());
        self.content_type = Some("application/json".to_string());
        self
    }
}
