//! Configuration for the mock server.
//!
//! Defines server settings and declarative stubs that can be loaded from YAML
//! instead of being registered in code.

use crate::error::ConfigError;
use crate::matcher::{PathTemplate, Predicate};
use crate::response::{
    Chunk, Delay, ErrorResponse, FixedResponse, ResponseSpec, StreamedResponse,
};
use crate::sse::SseEvent;
use axum::http::Method;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Sample configuration printed by `--print-config`.
pub const DEFAULT_CONFIG_YAML: &str = include_str!("../config/default-config.yaml");

/// Main configuration for the mock server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockServerConfig {
    /// Listener settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,

    /// Response when no stub matches
    #[serde(default)]
    pub default_response: Option<ResponseDefinition>,

    /// List of stub definitions
    #[serde(default)]
    pub stubs: Vec<StubDefinition>,
}

impl MockServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for stub in &self.stubs {
            stub.validate().map_err(|e| ConfigError::Stub {
                id: stub.id.clone(),
                source: Box::new(e),
            })?;
            if !seen.insert(stub.id.as_str()) {
                return Err(ConfigError::DuplicateStubId(stub.id.clone()));
            }
        }
        if let Some(default) = &self.default_response {
            default.to_spec()?;
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind (0 = ephemeral)
    #[serde(default)]
    pub port: u16,

    /// How long `stop()` waits for in-flight responses before aborting them
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Largest request body accepted
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_shutdown_timeout_ms() -> u64 {
    1000
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

/// A single stub definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StubDefinition {
    /// Unique identifier for this stub
    pub id: String,

    /// Optional name/description
    #[serde(default)]
    pub name: Option<String>,

    /// Method and path template the stub is registered under
    pub route: RouteDefinition,

    /// Additional request predicates
    #[serde(default)]
    pub request: RequestMatcher,

    /// Response to return
    pub response: ResponseDefinition,

    /// Priority (higher = matched first)
    #[serde(default)]
    pub priority: i32,

    /// Maximum number of times this stub can be matched (0 = unlimited)
    #[serde(default)]
    pub max_matches: u32,
}

impl StubDefinition {
    /// Validate the stub definition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::EmptyStubId);
        }
        self.route.method()?;
        self.route.template()?;
        Predicate::compile_all(&self.request)?;
        self.response.to_spec()?;
        Ok(())
    }
}

/// Route key of a stub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteDefinition {
    #[serde(default = "default_method")]
    pub method: String,
    /// Path template, e.g. `/v1/chat/completions` or `/users/{id}`
    pub path: String,
}

fn default_method() -> String {
    "POST".to_string()
}

impl RouteDefinition {
    pub fn method(&self) -> Result<Method, ConfigError> {
        Method::from_bytes(self.method.to_uppercase().as_bytes())
            .map_err(|_| ConfigError::InvalidMethod(self.method.clone()))
    }

    pub fn template(&self) -> Result<PathTemplate, ConfigError> {
        PathTemplate::parse(&self.path)
    }
}

/// Request matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RequestMatcher {
    /// Path matching, on top of the route template
    #[serde(default)]
    pub path: Option<PathMatcher>,

    /// Query parameter matching
    #[serde(default)]
    pub query: HashMap<String, QueryMatcher>,

    /// Header matching
    #[serde(default)]
    pub headers: HashMap<String, HeaderMatcher>,

    /// Body matching; all entries must hold
    #[serde(default)]
    pub body: Vec<BodyMatcher>,
}

/// Path matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathMatcher {
    /// Exact path match
    Exact { value: String },
    /// Path prefix match
    Prefix { value: String },
    /// Regex pattern match
    Regex { pattern: String },
    /// Glob pattern match
    Glob { pattern: String },
}

/// Query parameter matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueryMatcher {
    /// Exact value match
    Exact { value: String },
    /// Regex pattern match
    Regex { pattern: String },
    /// Parameter must be present (any value)
    Present,
    /// Parameter must be absent
    Absent,
}

/// Header matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeaderMatcher {
    /// Exact value match
    Exact { value: String },
    /// Regex pattern match
    Regex { pattern: String },
    /// Header must be present (any value)
    Present,
    /// Header must be absent
    Absent,
    /// Value must contain substring
    Contains { value: String },
}

/// Body matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BodyMatcher {
    /// Exact body match
    Exact { value: String },
    /// Regex pattern match
    Regex { pattern: String },
    /// Body must contain substring
    Contains { value: String },
    /// Body must not contain substring
    NotContains { value: String },
    /// Body must contain substring, ignoring case
    ContainsIgnoringCase { value: String },
    /// Body must be JSON structurally equal to the value
    EqualsJson { value: serde_json::Value },
    /// JSON path expressions and expected values (`null` = must exist)
    JsonPath {
        expressions: HashMap<String, serde_json::Value>,
    },
    /// Field at a JSON pointer must equal the value
    JsonPointer {
        pointer: String,
        value: serde_json::Value,
    },
    /// Body must be valid JSON (any structure)
    Json,
    /// Body must be empty
    Empty,
}

/// Response definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseDefinition {
    Fixed(FixedDefinition),
    Stream(StreamDefinition),
    Error(ErrorDefinition),
}

impl ResponseDefinition {
    /// Build the response spec. Files and base64 bodies are read here, once.
    pub fn to_spec(&self) -> Result<ResponseSpec, ConfigError> {
        let spec = match self {
            ResponseDefinition::Fixed(def) => def.to_spec()?,
            ResponseDefinition::Stream(def) => def.to_spec()?,
            ResponseDefinition::Error(def) => def.to_spec()?,
        };
        spec.validate()?;
        Ok(spec)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixedDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response body
    #[serde(default)]
    pub body: Option<ResponseBody>,

    /// Latency simulation
    #[serde(default)]
    pub delay: Option<DelayConfig>,

    /// Whether this is a template response
    #[serde(default)]
    pub template: bool,
}

impl FixedDefinition {
    fn to_spec(&self) -> Result<ResponseSpec, ConfigError> {
        let mut fixed = FixedResponse::new(self.status);
        fixed.headers = sorted_headers(&self.headers);
        if let Some(body) = &self.body {
            fixed.body = body.to_bytes()?.into();
            fixed.content_type = Some(body.content_type().to_string());
        }
        fixed.delay = self.delay.as_ref().map(DelayConfig::to_delay).unwrap_or_default();
        fixed.template = self.template;
        Ok(ResponseSpec::Fixed(fixed))
    }
}

fn default_status() -> u16 {
    200
}

/// Wire framing of streamed chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFormat {
    /// Each chunk written as-is
    Raw,
    /// Each chunk wrapped as a server-sent event
    #[default]
    Sse,
    /// Each chunk followed by a newline
    Ndjson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamDefinition {
    #[serde(default = "default_status")]
    pub status: u16,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub format: StreamFormat,

    /// Delay before the first chunk
    #[serde(default)]
    pub initial_delay_ms: u64,

    /// Delay before each later chunk, unless the chunk sets its own
    #[serde(default)]
    pub chunk_delay_ms: u64,

    pub chunks: Vec<ChunkDefinition>,

    /// Terminal marker written after the last chunk (e.g. `[DONE]`), framed
    /// like the chunks
    #[serde(default)]
    pub done: Option<String>,
}

impl StreamDefinition {
    fn to_spec(&self) -> Result<ResponseSpec, ConfigError> {
        let mut streamed = StreamedResponse::new()
            .status(self.status)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
            .delay_between_chunks(Duration::from_millis(self.chunk_delay_ms));
        streamed.headers = sorted_headers(&self.headers);
        streamed.content_type = match self.format {
            StreamFormat::Sse => Some("text/event-stream".to_string()),
            StreamFormat::Ndjson => Some("application/x-ndjson".to_string()),
            StreamFormat::Raw => None,
        };

        for chunk in &self.chunks {
            let data = self.frame(&chunk.text(), chunk.event.as_deref());
            streamed.chunks.push(Chunk {
                data,
                delay: chunk.delay_ms.map(Duration::from_millis),
            });
        }
        if let Some(done) = &self.done {
            streamed.terminal = Some(self.frame(done, None));
        }
        Ok(ResponseSpec::Streamed(streamed))
    }

    fn frame(&self, text: &str, event: Option<&str>) -> bytes::Bytes {
        match self.format {
            StreamFormat::Raw => bytes::Bytes::from(text.to_string()),
            StreamFormat::Ndjson => bytes::Bytes::from(format!("{text}\n")),
            StreamFormat::Sse => {
                let mut sse = SseEvent::data(text);
                if let Some(event) = event {
                    sse = sse.named(event);
                }
                sse.to_bytes()
            }
        }
    }
}

/// One streamed chunk. String data is written verbatim; any other JSON value
/// is written in its compact serialized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkDefinition {
    pub data: serde_json::Value,

    /// SSE event name
    #[serde(default)]
    pub event: Option<String>,

    #[serde(default)]
    pub delay_ms: Option<u64>,
}

impl ChunkDefinition {
    fn text(&self) -> String {
        match &self.data {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorDefinition {
    pub status: u16,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub body: Option<ResponseBody>,
}

impl ErrorDefinition {
    fn to_spec(&self) -> Result<ResponseSpec, ConfigError> {
        let mut error = ErrorResponse::new(self.status);
        error.headers = sorted_headers(&self.headers);
        if let Some(body) = &self.body {
            error.body = body.to_bytes()?.into();
            error.content_type = Some(body.content_type().to_string());
        }
        Ok(ResponseSpec::Error(error))
    }
}

fn sorted_headers(headers: &HashMap<String, String>) -> Vec<(String, String)> {
    let mut pairs: Vec<_> = headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    pairs.sort();
    pairs
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Plain text body
    Text { content: String },
    /// JSON body
    Json { content: serde_json::Value },
    /// Base64 encoded binary
    Base64 { content: String },
    /// Load from file
    File { path: String },
}

impl ResponseBody {
    /// Get the body content as bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        match self {
            ResponseBody::Text { content } => Ok(content.as_bytes().to_vec()),
            ResponseBody::Json { content } => Ok(content.to_string().into_bytes()),
            ResponseBody::Base64 { content } => {
                use base64::Engine;
                Ok(base64::engine::general_purpose::STANDARD.decode(content)?)
            }
            ResponseBody::File { path } => std::fs::read(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            }),
        }
    }

    /// Get content type for this body.
    pub fn content_type(&self) -> &'static str {
        match self {
            ResponseBody::Text { .. } => "text/plain",
            ResponseBody::Json { .. } => "application/json",
            ResponseBody::Base64 { .. } | ResponseBody::File { .. } => "application/octet-stream",
        }
    }
}

/// Delay/latency simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayConfig {
    /// Fixed delay in milliseconds
    #[serde(default)]
    pub fixed_ms: u64,

    /// Minimum delay for random range (ms)
    #[serde(default)]
    pub min_ms: u64,

    /// Maximum delay for random range (ms)
    #[serde(default)]
    pub max_ms: u64,
}

impl DelayConfig {
    pub fn to_delay(&self) -> Delay {
        if self.fixed_ms > 0 {
            Delay::Fixed(Duration::from_millis(self.fixed_ms))
        } else if self.max_ms > 0 || self.min_ms > 0 {
            Delay::Jitter {
                min: Duration::from_millis(self.min_ms),
                max: Duration::from_millis(self.max_ms.max(self.min_ms)),
            }
        } else {
            Delay::None
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log all matched stubs
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Default content type for responses
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
            default_content_type: default_content_type(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_content_type() -> String {
    "application/json".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_parse_simple_stub() {
        let yaml = r#"
stubs:
  - id: hello-world
    route:
      method: GET
      path: /hello
    response:
      type: fixed
      status: 200
      body:
        type: text
        content: "Hello, World!"
"#;
        let config = MockServerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.stubs.len(), 1);
        assert_eq!(config.stubs[0].id, "hello-world");
        assert_eq!(config.stubs[0].route.method().unwrap(), Method::GET);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 0);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = MockServerConfig::from_yaml(DEFAULT_CONFIG_YAML).unwrap();
        assert!(!config.stubs.is_empty());
    }

    #[test]
    fn test_parse_json_response() {
        let yaml = r#"
stubs:
  - id: json-response
    route:
      path: /v1/chat/completions
    response:
      type: fixed
      headers:
        x-request-id: req-1
      body:
        type: json
        content:
          message: "success"
          code: 0
"#;
        let config = MockServerConfig::from_yaml(yaml).unwrap();
        let ResponseSpec::Fixed(fixed) = config.stubs[0].response.to_spec().unwrap() else {
            panic!("Expected fixed response");
        };
        assert_eq!(fixed.content_type.as_deref(), Some("application/json"));
        assert_eq!(fixed.headers, vec![("x-request-id".into(), "req-1".into())]);
        let body: serde_json::Value = serde_json::from_slice(&fixed.body).unwrap();
        assert_eq!(body["message"], "success");
    }

    #[test]
    fn test_parse_stream_response() {
        let yaml = r#"
stubs:
  - id: stream
    route:
      path: /v1/chat/completions
    request:
      body:
        - type: json_pointer
          pointer: /stream
          value: true
    response:
      type: stream
      chunk_delay_ms: 25
      chunks:
        - data: {"choices": [{"delta": {"content": "Hi"}}]}
        - data: plain
          event: note
          delay_ms: 5
      done: "[DONE]"
"#;
        let config = MockServerConfig::from_yaml(yaml).unwrap();
        let ResponseSpec::Streamed(streamed) = config.stubs[0].response.to_spec().unwrap() else {
            panic!("Expected streamed response");
        };
        assert_eq!(streamed.content_type.as_deref(), Some("text/event-stream"));
        assert_eq!(
            streamed.chunks[0].data,
            Bytes::from("data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n")
        );
        assert_eq!(streamed.chunks[1].data, Bytes::from("event: note\ndata: plain\n\n"));
        assert_eq!(streamed.chunks[1].delay, Some(Duration::from_millis(5)));
        assert_eq!(streamed.chunk_delay, Duration::from_millis(25));
        assert_eq!(streamed.terminal, Some(Bytes::from("data: [DONE]\n\n")));
    }

    #[test]
    fn test_parse_ndjson_stream() {
        let yaml = r#"
type: stream
format: ndjson
chunks:
  - data: {"done": false}
  - data: {"done": true}
"#;
        let def: ResponseDefinition = serde_yaml::from_str(yaml).unwrap();
        let ResponseSpec::Streamed(streamed) = def.to_spec().unwrap() else {
            panic!("Expected streamed response");
        };
        assert_eq!(streamed.chunks[1].data, Bytes::from("{\"done\":true}\n"));
    }

    #[test]
    fn test_empty_stream_fails_validation() {
        let yaml = r#"
stubs:
  - id: empty
    route:
      path: /stream
    response:
      type: stream
      chunks: []
"#;
        let err = MockServerConfig::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::Stub { ref id, .. } if id == "empty"));
    }

    #[test]
    fn test_conflicting_variant_fields_rejected() {
        let yaml = r#"
type: fixed
status: 200
chunks:
  - data: nope
"#;
        assert!(serde_yaml::from_str::<ResponseDefinition>(yaml).is_err());
    }

    #[test]
    fn test_parse_error_response() {
        let yaml = r#"
stubs:
  - id: rate-limited
    route:
      path: /v1/messages
    response:
      type: error
      status: 429
      body:
        type: json
        content:
          type: rate_limit_error
"#;
        let config = MockServerConfig::from_yaml(yaml).unwrap();
        let spec = config.stubs[0].response.to_spec().unwrap();
        assert_eq!(spec.kind(), "error");
        assert_eq!(spec.status(), 429);
    }

    #[test]
    fn test_error_with_success_status_rejected() {
        let yaml = r#"
type: error
status: 200
"#;
        let def: ResponseDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(
            def.to_spec(),
            Err(ConfigError::SuccessStatusForError(200))
        ));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let yaml = r#"
stubs:
  - id: same
    route: { path: /a }
    response: { type: fixed }
  - id: same
    route: { path: /b }
    response: { type: fixed }
"#;
        assert!(matches!(
            MockServerConfig::from_yaml(yaml),
            Err(ConfigError::DuplicateStubId(_))
        ));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let yaml = r#"
stubs:
  - id: bad-regex
    route: { path: /a }
    request:
      headers:
        authorization:
          type: regex
          pattern: "(unclosed"
    response: { type: fixed }
"#;
        assert!(MockServerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_invalid_route_rejected() {
        let yaml = r#"
stubs:
  - id: bad-route
    route: { method: "NOT A METHOD", path: /a }
    response: { type: fixed }
"#;
        assert!(MockServerConfig::from_yaml(yaml).is_err());

        let yaml = r#"
stubs:
  - id: bad-route
    route: { path: "no-slash" }
    response: { type: fixed }
"#;
        assert!(MockServerConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_delay_config() {
        let fixed = DelayConfig {
            fixed_ms: 100,
            min_ms: 0,
            max_ms: 0,
        };
        assert_eq!(fixed.to_delay(), Delay::Fixed(Duration::from_millis(100)));

        let range = DelayConfig {
            fixed_ms: 0,
            min_ms: 50,
            max_ms: 150,
        };
        let delay = range.to_delay().calculate();
        assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(150));

        let none = DelayConfig {
            fixed_ms: 0,
            min_ms: 0,
            max_ms: 0,
        };
        assert_eq!(none.to_delay(), Delay::None);
    }

    #[test]
    fn test_response_body_to_bytes() {
        let text = ResponseBody::Text {
            content: "hello".to_string(),
        };
        assert_eq!(text.to_bytes().unwrap(), b"hello");

        let b64 = ResponseBody::Base64 {
            content: "aGVsbG8=".to_string(),
        };
        assert_eq!(b64.to_bytes().unwrap(), b"hello");

        let bad = ResponseBody::Base64 {
            content: "!!!".to_string(),
        };
        assert!(matches!(bad.to_bytes(), Err(ConfigError::InvalidBase64(_))));

        let missing = ResponseBody::File {
            path: "/definitely/not/here.json".to_string(),
        };
        assert!(matches!(missing.to_bytes(), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "server:\n  port: 0\nstubs:\n  - id: a\n    route: {{ path: /a }}\n    response: {{ type: fixed }}"
        )
        .unwrap();

        let config = MockServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.stubs.len(), 1);

        let err = MockServerConfig::from_file(Path::new("/no/such/config.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
