//! Incoming request snapshot handed to predicates.

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use std::fmt;
use std::sync::OnceLock;

/// Immutable view of one inbound HTTP request.
///
/// Built once per request by the server and shared read-only with every
/// predicate evaluated for it. The structured body is decoded lazily on first
/// access and memoized, so any number of JSON predicates parse it at most once.
pub struct RequestDescriptor {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
    json: OnceLock<Option<serde_json::Value>>,
}

impl RequestDescriptor {
    /// Create a descriptor from its raw parts.
    ///
    /// `query` is the raw query string without the leading `?`.
    pub fn new(
        method: Method,
        path: impl Into<String>,
        query: Option<&str>,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            query: parse_query_string(query.unwrap_or("")),
            headers,
            body: body.into(),
            json: OnceLock::new(),
        }
    }

    /// Add a header. Meant for building descriptors in tests; invalid names or
    /// values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Replace the body. Meant for building descriptors in tests.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self.json = OnceLock::new();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// First value of a query parameter.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of a query parameter, in request order.
    pub fn query_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.query
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every decoded query pair, in request order.
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, looked up case-insensitively. Values that are
    /// not visible ASCII are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All textual values of a header.
    pub fn header_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .get_all(name)
            .into_iter()
            .filter_map(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as text, if it is valid UTF-8.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Body decoded as JSON. `None` when the body is empty or not JSON.
    pub fn json(&self) -> Option<&serde_json::Value> {
        self.json
            .get_or_init(|| serde_json::from_slice(&self.body).ok())
            .as_ref()
    }

    /// Short printable form of the body for logs and diagnostics.
    pub fn body_preview(&self, max_chars: usize) -> String {
        let text = String::from_utf8_lossy(&self.body);
        let mut preview: String = text.chars().take(max_chars).collect();
        if text.chars().count() > max_chars {
            preview.push_str("...");
        }
        preview
    }
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Parse a query string into ordered, possibly repeated, key-value pairs.
pub(crate) fn parse_query_string(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, value)) => (percent_decode(key), percent_decode(value)),
            None => (percent_decode(part), String::new()),
        })
        .collect()
}

/// Form-style URL decoding (`+` is a space). Malformed escapes are kept as-is.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match hex {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(body: &str) -> RequestDescriptor {
        RequestDescriptor::new(
            Method::POST,
            "/v1/chat/completions",
            None,
            HeaderMap::new(),
            body.to_string(),
        )
    }

    #[test]
    fn test_headers_are_case_insensitive_and_multi_valued() {
        let req = post("")
            .with_header("X-Trace", "a")
            .with_header("x-trace", "b");

        assert_eq!(req.header("x-TRACE"), Some("a"));
        assert_eq!(req.header_all("X-Trace").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(req.header("missing"), None);
    }

    #[test]
    fn test_query_is_multi_valued() {
        let req = RequestDescriptor::new(
            Method::GET,
            "/models",
            Some("tag=a&tag=b&name=John%20Doe&q=x+y&flag"),
            HeaderMap::new(),
            Bytes::new(),
        );

        assert_eq!(req.query("tag"), Some("a"));
        assert_eq!(req.query_all("tag").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(req.query("name"), Some("John Doe"));
        assert_eq!(req.query("q"), Some("x y"));
        assert_eq!(req.query("flag"), Some(""));
    }

    #[test]
    fn test_query_value_outlives_lookup_key() {
        let req = RequestDescriptor::new(
            Method::GET,
            "/models",
            Some("tag=a&tag=b"),
            HeaderMap::new(),
            Bytes::new(),
        );

        let first = {
            let name = String::from("tag");
            req.query(&name)
        };
        assert_eq!(first, Some("a"));
        assert_eq!(req.query("missing"), None);
    }

    #[test]
    fn test_json_body_is_decoded_once() {
        let req = post(r#"{"model":"gpt-4o","temperature":0.7}"#);
        let first = req.json().unwrap() as *const serde_json::Value;
        let second = req.json().unwrap() as *const serde_json::Value;
        assert_eq!(first, second);
        assert_eq!(req.json().unwrap()["model"], "gpt-4o");
    }

    #[test]
    fn test_non_json_body() {
        let req = post("plain text");
        assert!(req.json().is_none());
        assert_eq!(req.body_str(), Some("plain text"));
    }

    #[test]
    fn test_body_preview_truncates() {
        let req = post("abcdefghij");
        assert_eq!(req.body_preview(4), "abcd...");
        assert_eq!(req.body_preview(20), "abcdefghij");
    }

    #[test]
    fn test_malformed_escape_is_kept() {
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
        assert_eq!(percent_decode("%41"), "A");
    }
}
