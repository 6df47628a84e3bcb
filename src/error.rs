//! Error types for the mock server.
//!
//! Only configuration errors (raised at registration time) and verification
//! failures are meant to fail a test. Everything that goes wrong while serving
//! a single request is turned into an HTTP response or a log line instead.

use thiserror::Error;

/// A stub or configuration file is malformed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Status code outside of the HTTP range.
    #[error("invalid status code: {0}")]
    InvalidStatus(u16),

    /// An error stub was configured with a success status.
    #[error("error responses need a non-success status, got {0}")]
    SuccessStatusForError(u16),

    /// A streamed response without any chunk.
    #[error("streamed response has no chunks")]
    EmptyStream,

    /// A header name or value that cannot go on the wire.
    #[error("invalid header {name:?}: {reason}")]
    InvalidHeader { name: String, reason: String },

    /// Unknown HTTP method in a route.
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Route or path template that does not start with `/` or has an
    /// unterminated parameter.
    #[error("invalid path template {template:?}: {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid glob {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("invalid JSON path {expression:?}: {reason}")]
    InvalidJsonPath { expression: String, reason: String },

    #[error("invalid JSON in {context}: {source}")]
    InvalidJson {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base64 body: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Wraps the error of one stub in a configuration file.
    #[error("stub {id:?}: {source}")]
    Stub {
        id: String,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("stub id cannot be empty")]
    EmptyStubId,

    #[error("duplicate stub id {0:?}")]
    DuplicateStubId(String),
}

/// Lifecycle and transport errors of the server runtime.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// `start()` called on a server that is already running.
    #[error("server is already started")]
    AlreadyStarted,

    /// `start()` called after `stop()`. A stopped server cannot be restarted.
    #[error("server was stopped and cannot be restarted")]
    Stopped,

    /// Address accessors used before `start()`.
    #[error("server is not started")]
    NotStarted,
}

/// Errors raised by the streaming client helper.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("stream is not valid UTF-8")]
    InvalidUtf8,
}
