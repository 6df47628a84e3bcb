//! Mock server runtime.
//!
//! A [`MockServer`] owns its registries, listener and statistics. Instances
//! share nothing, so tests can run any number of them side by side.
//!
//! ```no_run
//! use ai_mock_server::{FixedResponse, MockServer, Predicate};
//! use axum::http::Method;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MockServer::new();
//! server.start().await?;
//!
//! server
//!     .route(Method::POST, "/v1/chat/completions")
//!     .and(Predicate::model("gpt-4o-mini"))
//!     .responds(FixedResponse::ok().text("Hello"))?;
//!
//! let base_url = server.base_url()?;
//! // ... run the client under test against `base_url` ...
//!
//! server.verify_no_unmatched_expectations()?;
//! server.stop().await;
//! # Ok(())
//! # }
//! ```

use crate::config::{GlobalSettings, MockServerConfig, ServerSettings, StubDefinition};
use crate::emitter::Emitter;
use crate::error::{ConfigError, ServerError};
use crate::matcher::{PathTemplate, Predicate};
use crate::registry::{ExpectationDraft, ExpectationHandle, RouteKey, Routes};
use crate::request::RequestDescriptor;
use crate::response::{ErrorResponse, FixedResponse, ResponseSpec, StreamedResponse};
use crate::verify::{self, UnmatchedRequest, VerificationError};
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State shared between the handle and the request handlers.
struct Shared {
    routes: Routes,
    emitter: Emitter,
    settings: GlobalSettings,
    default_response: Option<ResponseSpec>,
    max_body_bytes: usize,
    unmatched: Mutex<Vec<UnmatchedRequest>>,
    requests_total: AtomicU64,
    requests_matched: AtomicU64,
    requests_unmatched: AtomicU64,
}

enum Lifecycle {
    Created,
    Started {
        addr: SocketAddr,
        task: JoinHandle<()>,
    },
    Stopped,
}

/// Programmable HTTP mock server.
///
/// Lifecycle is `Created -> Started -> Stopped`. A stopped server cannot be
/// started again. Dropping the server cancels its listener.
pub struct MockServer {
    shared: Arc<Shared>,
    server: ServerSettings,
    shutdown: CancellationToken,
    lifecycle: Lifecycle,
}

impl MockServer {
    /// Server on an ephemeral loopback port with no stubs.
    pub fn new() -> Self {
        Self::build(
            ServerSettings::default(),
            GlobalSettings::default(),
            None,
        )
    }

    /// Server with the given listener settings.
    pub fn with_settings(server: ServerSettings) -> Self {
        Self::build(server, GlobalSettings::default(), None)
    }

    /// Server configured from a [`MockServerConfig`], with its stubs registered.
    pub fn with_config(config: MockServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let default_response = config
            .default_response
            .as_ref()
            .map(|d| d.to_spec())
            .transpose()?;

        let server = Self::build(config.server, config.settings, default_response);
        for stub in &config.stubs {
            server
                .register_definition(stub)
                .map_err(|e| ConfigError::Stub {
                    id: stub.id.clone(),
                    source: Box::new(e),
                })?;
        }

        info!(stubs = config.stubs.len(), "Mock server configured");
        Ok(server)
    }

    fn build(
        server: ServerSettings,
        settings: GlobalSettings,
        default_response: Option<ResponseSpec>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let shared = Arc::new(Shared {
            routes: Routes::new(),
            emitter: Emitter::new(settings.default_content_type.clone(), shutdown.clone()),
            settings,
            default_response,
            max_body_bytes: server.max_body_bytes,
            unmatched: Mutex::new(Vec::new()),
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
        });
        Self {
            shared,
            server,
            shutdown,
            lifecycle: Lifecycle::Created,
        }
    }

    fn register_definition(&self, stub: &StubDefinition) -> Result<ExpectationHandle, ConfigError> {
        let route = RouteKey::new(stub.route.method()?, stub.route.template()?);
        let draft = ExpectationDraft {
            name: Some(stub.name.clone().unwrap_or_else(|| stub.id.clone())),
            predicates: Predicate::compile_all(&stub.request)?,
            response: stub.response.to_spec()?,
            priority: stub.priority,
            max_matches: stub.max_matches,
        };
        Ok(self.shared.routes.register(route, draft))
    }

    /// Bind the listener and start serving.
    ///
    /// Port 0 picks an ephemeral port; the bound address is returned.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        match self.lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Started { .. } => return Err(ServerError::AlreadyStarted),
            Lifecycle::Stopped => return Err(ServerError::Stopped),
        }

        let requested = format!("{}:{}", self.server.host, self.server.port);
        let listener = TcpListener::bind((self.server.host.as_str(), self.server.port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: requested.clone(),
                source,
            })?;
        let addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind {
                addr: requested,
                source,
            })?;

        let app = Router::new()
            .fallback(handle_request)
            .with_state(Arc::clone(&self.shared));
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "Mock server terminated with error");
            }
        });

        info!(addr = %addr, "Mock server started");
        self.lifecycle = Lifecycle::Started { addr, task };
        Ok(addr)
    }

    /// Stop serving and release the listener.
    ///
    /// In-flight streams are aborted. Connections still open after the
    /// configured shutdown timeout are dropped. Calling `stop` on a server
    /// that never started or already stopped only marks it stopped.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        let previous = std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped);
        let Lifecycle::Started { addr, mut task } = previous else {
            return;
        };

        let timeout = Duration::from_millis(self.server.shutdown_timeout_ms);
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(_) => info!(addr = %addr, "Mock server stopped"),
            Err(_) => {
                warn!(
                    addr = %addr,
                    timeout_ms = self.server.shutdown_timeout_ms,
                    "Graceful shutdown timed out, aborting connections"
                );
                task.abort();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Started { .. })
    }

    /// Bound address.
    pub fn addr(&self) -> Result<SocketAddr, ServerError> {
        match &self.lifecycle {
            Lifecycle::Started { addr, .. } => Ok(*addr),
            Lifecycle::Created => Err(ServerError::NotStarted),
            Lifecycle::Stopped => Err(ServerError::Stopped),
        }
    }

    pub fn port(&self) -> Result<u16, ServerError> {
        self.addr().map(|a| a.port())
    }

    /// `http://host:port`, without a trailing slash.
    pub fn base_url(&self) -> Result<String, ServerError> {
        self.addr().map(|a| format!("http://{a}"))
    }

    /// Start registering a stub for `method` and the path template `path`.
    ///
    /// Errors in the template surface when the builder is finished.
    pub fn route(&self, method: Method, path: &str) -> StubBuilder {
        StubBuilder {
            shared: Arc::clone(&self.shared),
            method,
            template: PathTemplate::parse(path),
            draft_name: None,
            predicates: Vec::new(),
            priority: 0,
            max_matches: 0,
        }
    }

    /// Stubs registered but never matched, in registration order.
    pub fn unmatched_expectations(&self) -> Vec<ExpectationHandle> {
        self.shared
            .routes
            .unmatched_expectations()
            .into_iter()
            .map(ExpectationHandle::from)
            .collect()
    }

    /// Fail if any registered stub has never been matched.
    pub fn verify_no_unmatched_expectations(&self) -> Result<(), VerificationError> {
        let all = self.shared.routes.expectations();
        verify::check_expectations(all.iter().map(|e| e.as_ref()))
    }

    /// Same check as [`verify_no_unmatched_expectations`](Self::verify_no_unmatched_expectations).
    pub fn verify_no_unmatched_requests(&self) -> Result<(), VerificationError> {
        self.verify_no_unmatched_expectations()
    }

    /// Requests that no stub accepted, oldest first.
    pub fn unmatched_requests(&self) -> Vec<UnmatchedRequest> {
        self.shared.unmatched.lock().clone()
    }

    /// Fail if any request went unmatched.
    pub fn verify_all_requests_matched(&self) -> Result<(), VerificationError> {
        let unmatched = self.unmatched_requests();
        if unmatched.is_empty() {
            Ok(())
        } else {
            Err(VerificationError::UnmatchedRequests(unmatched))
        }
    }

    /// Remove every stub and forget unmatched requests.
    pub fn reset(&self) {
        self.shared.routes.reset();
        self.shared.unmatched.lock().clear();
        debug!("Mock server reset");
    }

    /// Zero every stub's match count so the same stubs can be verified
    /// again for the next scenario. Stubs and the journal are kept.
    pub fn reset_match_counts(&self) {
        self.shared.routes.reset_match_counts();
        debug!("Match counts reset");
    }

    /// Number of registered stubs.
    pub fn expectation_count(&self) -> usize {
        self.shared.routes.len()
    }

    /// Requests received since start, matched or not.
    pub fn total_requests(&self) -> u64 {
        self.shared.requests_total.load(Ordering::Relaxed)
    }

    /// Requests answered by a stub.
    pub fn total_matched(&self) -> u64 {
        self.shared.requests_matched.load(Ordering::Relaxed)
    }

    /// Requests that got the no-match response.
    pub fn total_unmatched(&self) -> u64 {
        self.shared.requests_unmatched.load(Ordering::Relaxed)
    }
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Lifecycle::Started { task, .. } = &self.lifecycle {
            task.abort();
        }
    }
}

/// Builder returned by [`MockServer::route`].
#[must_use = "a stub is only registered by one of the `responds*` methods"]
pub struct StubBuilder {
    shared: Arc<Shared>,
    method: Method,
    template: Result<PathTemplate, ConfigError>,
    draft_name: Option<String>,
    predicates: Vec<Predicate>,
    priority: i32,
    max_matches: u32,
}

impl StubBuilder {
    /// Add a predicate. All predicates must hold for the stub to match.
    pub fn and(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Name shown in logs and verification failures.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.draft_name = Some(name.into());
        self
    }

    /// Higher priority wins over specificity and registration order.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Stop matching after `n` requests (0 = unlimited).
    pub fn max_matches(mut self, n: u32) -> Self {
        self.max_matches = n;
        self
    }

    pub fn responds(self, response: FixedResponse) -> Result<ExpectationHandle, ConfigError> {
        self.respond_with(response)
    }

    pub fn responds_error(self, response: ErrorResponse) -> Result<ExpectationHandle, ConfigError> {
        self.respond_with(response)
    }

    pub fn responds_stream(
        self,
        response: StreamedResponse,
    ) -> Result<ExpectationHandle, ConfigError> {
        self.respond_with(response)
    }

    /// Register the stub with any response kind.
    pub fn respond_with(
        self,
        response: impl Into<ResponseSpec>,
    ) -> Result<ExpectationHandle, ConfigError> {
        let template = self.template?;
        let response = response.into();
        response.validate()?;

        let route = RouteKey::new(self.method, template);
        let draft = ExpectationDraft {
            name: self.draft_name,
            predicates: self.predicates,
            response,
            priority: self.priority,
            max_matches: self.max_matches,
        };
        let handle = self.shared.routes.register(route, draft);
        debug!(stub = %handle.describe(), "Registered stub");
        Ok(handle)
    }
}

async fn handle_request(State(shared): State<Arc<Shared>>, request: Request) -> Response {
    shared.requests_total.fetch_add(1, Ordering::Relaxed);

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, shared.max_body_bytes).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, path = %parts.uri.path(), "Failed to read request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response();
        }
    };
    let req = RequestDescriptor::new(
        parts.method,
        parts.uri.path(),
        parts.uri.query(),
        parts.headers,
        body,
    );

    match shared.routes.resolve(&req) {
        Some(found) => {
            shared.requests_matched.fetch_add(1, Ordering::Relaxed);
            let expectation = found.expectation;
            let label = expectation
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{}", expectation.id()));

            if shared.settings.log_matches {
                info!(
                    stub = %label,
                    method = %req.method(),
                    path = %req.path(),
                    kind = expectation.response().kind(),
                    "Request matched stub"
                );
            }

            shared
                .emitter
                .emit(&label, expectation.response(), &req, &found.context)
                .await
        }
        None => {
            shared.requests_unmatched.fetch_add(1, Ordering::Relaxed);
            if shared.settings.log_unmatched {
                warn!(
                    method = %req.method(),
                    path = %req.path(),
                    body = %req.body_preview(verify::BODY_PREVIEW_CHARS),
                    "No matching stub found"
                );
            }
            shared
                .unmatched
                .lock()
                .push(UnmatchedRequest::from_request(&req));

            shared
                .emitter
                .emit_unmatched(shared.default_response.as_ref(), &req)
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[tokio::test]
    async fn test_lifecycle() {
        let mut server = MockServer::new();
        assert!(matches!(server.base_url(), Err(ServerError::NotStarted)));

        let addr = server.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.port().unwrap(), addr.port());
        assert_eq!(server.base_url().unwrap(), format!("http://{addr}"));
        assert!(server.is_running());
        assert!(matches!(server.start().await, Err(ServerError::AlreadyStarted)));

        server.stop().await;
        assert!(!server.is_running());
        assert!(matches!(server.base_url(), Err(ServerError::Stopped)));
        assert!(matches!(server.start().await, Err(ServerError::Stopped)));
    }

    #[tokio::test]
    async fn test_stop_releases_listener() {
        let mut server = MockServer::new();
        let addr = server.start().await.unwrap();
        server.stop().await;

        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_template_surfaces_on_register() {
        let server = MockServer::new();
        let result = server
            .route(Method::POST, "no-slash")
            .responds(FixedResponse::ok());
        assert!(matches!(result, Err(ConfigError::InvalidTemplate { .. })));
        assert_eq!(server.expectation_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_response_rejected_at_registration() {
        let server = MockServer::new();
        assert!(matches!(
            server
                .route(Method::POST, "/chat")
                .responds_stream(StreamedResponse::new()),
            Err(ConfigError::EmptyStream)
        ));
        assert!(matches!(
            server
                .route(Method::POST, "/chat")
                .responds_error(ErrorResponse::new(200)),
            Err(ConfigError::SuccessStatusForError(200))
        ));
        assert_eq!(server.expectation_count(), 0);
    }

    #[tokio::test]
    async fn test_with_config_registers_stubs() {
        let config = MockServerConfig::from_yaml(crate::config::DEFAULT_CONFIG_YAML).unwrap();
        let count = config.stubs.len();
        let server = MockServer::with_config(config).unwrap();

        assert_eq!(server.expectation_count(), count);
        let err = server.verify_no_unmatched_expectations().unwrap_err();
        assert_eq!(err.expectations().len(), count);
        let names: Vec<_> = err
            .expectations()
            .iter()
            .map(|e| e.name.as_deref())
            .collect();
        assert_eq!(names[0], Some("Any chat completion"));
        assert_eq!(names[1], Some("chat-stream"));
    }

    #[tokio::test]
    async fn test_reset_clears_stubs_and_journal() {
        let server = MockServer::new();
        server
            .route(Method::POST, "/chat")
            .responds(FixedResponse::ok())
            .unwrap();
        server.shared.unmatched.lock().push(UnmatchedRequest {
            method: "GET".to_string(),
            path: "/".to_string(),
            query: Vec::new(),
            body_preview: String::new(),
        });

        server.reset();
        assert_eq!(server.expectation_count(), 0);
        assert!(server.unmatched_requests().is_empty());
        assert!(server.verify_no_unmatched_expectations().is_ok());
    }

    #[tokio::test]
    async fn test_reset_match_counts_restarts_verification() {
        let server = MockServer::new();
        let stub = server
            .route(Method::POST, "/chat")
            .named("chat")
            .responds(FixedResponse::ok())
            .unwrap();
        let req = RequestDescriptor::new(Method::POST, "/chat", None, HeaderMap::new(), "");
        assert!(server.shared.routes.resolve(&req).is_some());
        assert!(server.verify_no_unmatched_expectations().is_ok());

        server.reset_match_counts();
        assert_eq!(stub.match_count(), 0);
        assert_eq!(server.expectation_count(), 1);
        let err = server.verify_no_unmatched_expectations().unwrap_err();
        assert_eq!(err.expectations()[0].name.as_deref(), Some("chat"));

        assert!(server.shared.routes.resolve(&req).is_some());
        assert!(server.verify_no_unmatched_expectations().is_ok());
    }
}
