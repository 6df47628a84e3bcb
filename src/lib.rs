//! AI Mock Server
//!
//! A programmable HTTP mock server for integration-testing clients of AI
//! provider APIs. Tests register stubs, point the client under test at the
//! server, and afterwards verify that every stub was exercised.
//!
//! # Features
//!
//! - **Request Matching**: Match by route, path, headers, query params, body,
//!   JSON fields (`model`, `temperature`, ...) or custom predicates
//! - **Fixed Responses**: Return a complete body, optionally after a delay
//! - **Streamed Responses**: Emit chunks one by one (SSE, NDJSON or raw) with
//!   per-chunk delays
//! - **Error Responses**: Simulate provider failures such as rate limits
//! - **Dynamic Templates**: Use Handlebars templates for dynamic responses
//! - **Verification**: Fail a test on stubs that were never matched
//!
//! # Example Configuration
//!
//! ```yaml
//! stubs:
//!   - id: hello
//!     route:
//!       method: POST
//!       path: /v1/chat/completions
//!     request:
//!       body:
//!         - type: json_pointer
//!           pointer: /model
//!           value: gpt-4o-mini
//!     response:
//!       type: fixed
//!       body:
//!         type: text
//!         content: Hello
//! ```

pub mod client;
pub mod config;
pub mod emitter;
pub mod error;
pub mod matcher;
pub mod registry;
pub mod request;
pub mod response;
pub mod server;
pub mod sse;
pub mod template;
pub mod verify;

pub use client::{EventStream, SseParser};
pub use config::MockServerConfig;
pub use error::{ClientError, ConfigError, ServerError};
pub use matcher::{PathTemplate, Predicate, ValueRule};
pub use registry::{Expectation, ExpectationHandle};
pub use request::RequestDescriptor;
pub use response::{Chunk, Delay, ErrorResponse, FixedResponse, ResponseSpec, StreamedResponse};
pub use server::{MockServer, StubBuilder};
pub use sse::SseEvent;
pub use verify::{UnmatchedExpectation, UnmatchedRequest, VerificationError};
