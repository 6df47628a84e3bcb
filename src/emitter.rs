//! Turns a matched response spec into an HTTP response.
//!
//! Fixed and error responses are built in one piece. Streamed responses get a
//! body stream that sleeps before each chunk and hands it to hyper as its own
//! frame, so a reader sees every chunk before the next delay starts. Nothing in
//! here holds a registry lock.

use crate::matcher::MatchContext;
use crate::request::RequestDescriptor;
use crate::response::{ErrorResponse, FixedResponse, ResponseSpec, StreamedResponse};
use crate::template::TemplateEngine;
use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use std::io;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Header set on every response produced for an unmatched request.
pub const UNMATCHED_HEADER: &str = "x-mock-unmatched";

/// Writes responses for one server.
pub struct Emitter {
    templates: TemplateEngine,
    default_content_type: String,
    shutdown: CancellationToken,
}

impl Emitter {
    pub fn new(default_content_type: impl Into<String>, shutdown: CancellationToken) -> Self {
        Self {
            templates: TemplateEngine::new(),
            default_content_type: default_content_type.into(),
            shutdown,
        }
    }

    /// Build the response for `spec`. `label` identifies the stub in logs.
    pub async fn emit(
        &self,
        label: &str,
        spec: &ResponseSpec,
        req: &RequestDescriptor,
        ctx: &MatchContext,
    ) -> Response {
        match spec {
            ResponseSpec::Fixed(fixed) => self.emit_fixed(label, fixed, req, ctx).await,
            ResponseSpec::Streamed(streamed) => self.emit_streamed(label, streamed),
            ResponseSpec::Error(error) => self.emit_error(error),
        }
    }

    async fn emit_fixed(
        &self,
        label: &str,
        fixed: &FixedResponse,
        req: &RequestDescriptor,
        ctx: &MatchContext,
    ) -> Response {
        let delay = fixed.delay.calculate();
        if !delay.is_zero() {
            debug!(stub = %label, delay_ms = delay.as_millis() as u64, "Applying delay");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => {
                    debug!(stub = %label, "Delayed response cancelled by shutdown");
                    return plain_text(StatusCode::SERVICE_UNAVAILABLE, "mock server is shutting down");
                }
            }
        }

        let body = if fixed.template {
            let source = String::from_utf8_lossy(&fixed.body);
            match self.templates.render(&source, req, ctx) {
                Ok(rendered) => Bytes::from(rendered),
                Err(e) => {
                    warn!(stub = %label, error = %e, "Template rendering failed");
                    return plain_text(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &format!("template rendering failed: {e}"),
                    );
                }
            }
        } else {
            fixed.body.clone()
        };

        self.build(
            fixed.status,
            &fixed.headers,
            fixed.content_type.as_deref(),
            Body::from(body),
        )
    }

    fn emit_streamed(&self, label: &str, streamed: &StreamedResponse) -> Response {
        let body = stream_body(label, streamed.schedule(), self.shutdown.clone());
        self.build(
            streamed.status,
            &streamed.headers,
            streamed.content_type.as_deref(),
            body,
        )
    }

    fn emit_error(&self, error: &ErrorResponse) -> Response {
        self.build(
            error.status,
            &error.headers,
            error.content_type.as_deref(),
            Body::from(error.body.clone()),
        )
    }

    /// Response for a request no stub accepted.
    ///
    /// Uses the configured default response when there is one, otherwise a 404
    /// JSON error. Either way the response carries [`UNMATCHED_HEADER`].
    pub async fn emit_unmatched(
        &self,
        default: Option<&ResponseSpec>,
        req: &RequestDescriptor,
    ) -> Response {
        let mut response = match default {
            Some(spec) => self.emit("default", spec, req, &MatchContext::default()).await,
            None => {
                let body = serde_json::json!({
                    "error": "no_matching_stub",
                    "message": "No matching stub found",
                    "method": req.method().as_str(),
                    "path": req.path(),
                });
                self.build(404, &[], Some("application/json"), Body::from(body.to_string()))
            }
        };
        response
            .headers_mut()
            .insert(UNMATCHED_HEADER, HeaderValue::from_static("true"));
        response
    }

    /// Assemble status and headers.
    ///
    /// Content type precedence: explicit header, then the type implied by the
    /// body, then the configured default.
    fn build(
        &self,
        status: u16,
        headers: &[(String, String)],
        content_type: Option<&str>,
        body: Body,
    ) -> Response {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    map.append(name, value);
                }
                _ => warn!(header = %name, "Skipping invalid response header"),
            }
        }
        if !map.contains_key(CONTENT_TYPE) {
            let fallback = content_type.unwrap_or(&self.default_content_type);
            if let Ok(value) = HeaderValue::from_str(fallback) {
                map.insert(CONTENT_TYPE, value);
            }
        }

        let mut response = Response::new(body);
        *response.status_mut() =
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        *response.headers_mut() = map;
        response
    }
}

fn plain_text(status: StatusCode, message: &str) -> Response {
    let mut response = Response::new(Body::from(message.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Tracks progress of one streamed body and logs when it ends early.
struct StreamProgress {
    label: String,
    sent: usize,
    total: usize,
    finished: bool,
}

impl Drop for StreamProgress {
    fn drop(&mut self) {
        if self.finished {
            debug!(stub = %self.label, chunks = self.total, "Stream completed");
        } else {
            debug!(
                stub = %self.label,
                sent = self.sent,
                total = self.total,
                "Stream ended before the last chunk"
            );
        }
    }
}

struct StreamState {
    plan: std::vec::IntoIter<(Duration, Bytes)>,
    progress: StreamProgress,
    shutdown: CancellationToken,
}

/// Body that writes `plan` in order, sleeping before each chunk.
///
/// Server shutdown ends the body with an error so the connection is torn down
/// instead of looking like a complete response. A client that goes away drops
/// the body, which the progress guard reports.
fn stream_body(label: &str, plan: Vec<(Duration, Bytes)>, shutdown: CancellationToken) -> Body {
    let state = StreamState {
        progress: StreamProgress {
            label: label.to_string(),
            sent: 0,
            total: plan.len(),
            finished: false,
        },
        plan: plan.into_iter(),
        shutdown,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        let Some((delay, data)) = state.plan.next() else {
            state.progress.finished = true;
            return None;
        };

        let cancelled = if delay.is_zero() {
            state.shutdown.is_cancelled()
        } else {
            tokio::select! {
                _ = tokio::time::sleep(delay) => false,
                _ = state.shutdown.cancelled() => true,
            }
        };
        if cancelled {
            debug!(stub = %state.progress.label, "Stream aborted by shutdown");
            state.plan = Vec::new().into_iter();
            let err = io::Error::new(io::ErrorKind::Interrupted, "mock server stopped");
            return Some((Err(err), state));
        }

        state.progress.sent += 1;
        Some((Ok::<Bytes, io::Error>(data), state))
    });

    Body::from_stream(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{Chunk, StreamedResponse};
    use crate::sse::SseEvent;
    use axum::http::Method;
    use futures::StreamExt;
    use std::time::Instant;

    fn emitter() -> Emitter {
        Emitter::new("application/json", CancellationToken::new())
    }

    fn request() -> RequestDescriptor {
        RequestDescriptor::new(Method::POST, "/chat", None, HeaderMap::new(), "{\"model\":\"m\"}")
    }

    async fn body_bytes(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fixed_response() {
        let spec = ResponseSpec::from(FixedResponse::ok().text("Hello").header("x-id", "1"));
        let response = emitter()
            .emit("t", &spec, &request(), &MatchContext::default())
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(response.headers()["x-id"], "1");
        assert_eq!(body_bytes(response).await, Bytes::from("Hello"));
    }

    #[tokio::test]
    async fn test_explicit_content_type_header_wins() {
        let spec = ResponseSpec::from(
            FixedResponse::ok()
                .text("{}")
                .header("Content-Type", "application/vnd.test+json"),
        );
        let response = emitter()
            .emit("t", &spec, &request(), &MatchContext::default())
            .await;
        assert_eq!(response.headers()["content-type"], "application/vnd.test+json");
        assert_eq!(response.headers().get_all("content-type").iter().count(), 1);
    }

    #[tokio::test]
    async fn test_default_content_type() {
        let spec = ResponseSpec::from(FixedResponse::ok().body("raw"));
        let response = emitter()
            .emit("t", &spec, &request(), &MatchContext::default())
            .await;
        assert_eq!(response.headers()["content-type"], "application/json");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_is_applied() {
        let spec = ResponseSpec::from(FixedResponse::ok().delay(Duration::from_secs(2)));
        let start = tokio::time::Instant::now();
        emitter()
            .emit("t", &spec, &request(), &MatchContext::default())
            .await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_template_body() {
        let spec = ResponseSpec::from(
            FixedResponse::ok()
                .body("model={{json.model}}")
                .template(),
        );
        let response = emitter()
            .emit("t", &spec, &request(), &MatchContext::default())
            .await;
        assert_eq!(body_bytes(response).await, Bytes::from("model=m"));
    }

    #[tokio::test]
    async fn test_broken_template_yields_500() {
        let spec = ResponseSpec::from(FixedResponse::ok().body("{{#if}}").template());
        let response = emitter()
            .emit("t", &spec, &request(), &MatchContext::default())
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }

    #[tokio::test]
    async fn test_invalid_time_format_yields_500() {
        let spec = ResponseSpec::from(FixedResponse::ok().body("{{now \"%Q\"}}").template());
        let response = emitter()
            .emit("t", &spec, &request(), &MatchContext::default())
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_bytes(response).await;
        assert!(String::from_utf8_lossy(&body).contains("invalid time format"));
    }

    #[tokio::test]
    async fn test_error_response() {
        let body = serde_json::json!({"type": "rate_limit_error"});
        let spec = ResponseSpec::from(ErrorResponse::new(429).json(&body));
        let response = emitter()
            .emit("t", &spec, &request(), &MatchContext::default())
            .await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body_bytes(response).await, Bytes::from(body.to_string()));
    }

    #[tokio::test]
    async fn test_streamed_chunks_in_order() {
        let spec = ResponseSpec::from(
            StreamedResponse::sse([SseEvent::data("a"), SseEvent::data("b")])
                .terminal(SseEvent::done().to_bytes()),
        );
        let response = emitter()
            .emit("t", &spec, &request(), &MatchContext::default())
            .await;
        assert_eq!(response.headers()["content-type"], "text/event-stream");

        let mut frames = response.into_body().into_data_stream();
        let mut seen = Vec::new();
        while let Some(frame) = frames.next().await {
            seen.push(frame.unwrap());
        }
        assert_eq!(
            seen,
            vec![
                Bytes::from("data: a\n\n"),
                Bytes::from("data: b\n\n"),
                Bytes::from("data: [DONE]\n\n"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_delays_between_chunks() {
        let spec = ResponseSpec::from(
            StreamedResponse::new()
                .chunk("first")
                .chunk_after(Duration::from_millis(300), "second"),
        );
        let response = emitter()
            .emit("t", &spec, &request(), &MatchContext::default())
            .await;

        let start = tokio::time::Instant::now();
        let mut frames = response.into_body().into_data_stream();
        assert_eq!(frames.next().await.unwrap().unwrap(), Bytes::from("first"));
        assert!(start.elapsed() < Duration::from_millis(300));
        assert_eq!(frames.next().await.unwrap().unwrap(), Bytes::from("second"));
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_aborts_stream() {
        let shutdown = CancellationToken::new();
        let emitter = Emitter::new("application/json", shutdown.clone());
        let mut spec = StreamedResponse::new().chunk("first");
        spec.chunks.push(Chunk::after(Duration::from_secs(60), "never"));
        let response = emitter
            .emit("t", &ResponseSpec::from(spec), &request(), &MatchContext::default())
            .await;

        let mut frames = response.into_body().into_data_stream();
        assert_eq!(frames.next().await.unwrap().unwrap(), Bytes::from("first"));

        let started = Instant::now();
        shutdown.cancel();
        assert!(frames.next().await.unwrap().is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unmatched_default_body() {
        let response = emitter().emit_unmatched(None, &request()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[UNMATCHED_HEADER], "true");

        let body: serde_json::Value =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["error"], "no_matching_stub");
        assert_eq!(body["method"], "POST");
        assert_eq!(body["path"], "/chat");
    }

    #[tokio::test]
    async fn test_unmatched_uses_configured_default() {
        let default = ResponseSpec::from(FixedResponse::new(501).text("not mocked"));
        let response = emitter().emit_unmatched(Some(&default), &request()).await;
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(response.headers()[UNMATCHED_HEADER], "true");
        assert_eq!(body_bytes(response).await, Bytes::from("not mocked"));
    }
}
