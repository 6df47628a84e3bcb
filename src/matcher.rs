//! Request predicates and path templates.
//!
//! A [`Predicate`] is a pure test over a [`RequestDescriptor`]. Expectations
//! hold a list of them and match only when all hold. [`PathTemplate`] is used
//! for route keys such as `/v1beta/models/{model}:generateContent`.

use crate::config::{BodyMatcher, HeaderMatcher, PathMatcher, QueryMatcher, RequestMatcher};
use crate::error::ConfigError;
use crate::request::RequestDescriptor;
use globset::GlobMatcher;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied test over the whole request.
pub type RequestTest = Arc<dyn Fn(&RequestDescriptor) -> bool + Send + Sync>;

/// Caller-supplied test over the decoded JSON body.
pub type JsonTest = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Rule applied to a single header or query value.
#[derive(Clone, Debug)]
pub enum ValueRule {
    Equals(String),
    Contains(String),
    Regex(Regex),
    Present,
    Absent,
}

impl ValueRule {
    fn check<'a>(&self, mut values: impl Iterator<Item = &'a str>) -> bool {
        match self {
            ValueRule::Equals(expected) => values.any(|v| v == expected),
            ValueRule::Contains(needle) => values.any(|v| v.contains(needle.as_str())),
            ValueRule::Regex(re) => values.any(|v| re.is_match(v)),
            ValueRule::Present => values.next().is_some(),
            ValueRule::Absent => values.next().is_none(),
        }
    }
}

impl fmt::Display for ValueRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueRule::Equals(v) => write!(f, "== {v:?}"),
            ValueRule::Contains(v) => write!(f, "contains {v:?}"),
            ValueRule::Regex(re) => write!(f, "=~ /{}/", re.as_str()),
            ValueRule::Present => f.write_str("present"),
            ValueRule::Absent => f.write_str("absent"),
        }
    }
}

/// One condition an incoming request must satisfy.
#[derive(Clone)]
pub enum Predicate {
    PathEquals(String),
    PathPrefix(String),
    PathRegex(Regex),
    PathGlob { pattern: String, matcher: GlobMatcher },
    Query { name: String, rule: ValueRule },
    Header { name: String, rule: ValueRule },
    BodyEquals(String),
    BodyContains(String),
    BodyNotContains(String),
    /// Needle is stored lowercased.
    BodyContainsIgnoringCase(String),
    /// Needle is stored lowercased.
    BodyNotContainsIgnoringCase(String),
    BodyRegex(Regex),
    /// Structural JSON equality; numbers compare by value.
    BodyEqualsJson(Value),
    BodyIsJson,
    BodyEmpty,
    /// Field at an RFC 6901 pointer equals the expected value.
    JsonField { pointer: String, expected: Value },
    /// JSONPath expression; a `null` expectation only requires a hit.
    JsonPath { expression: String, expected: Value },
    Json { description: String, test: JsonTest },
    Custom { description: String, test: RequestTest },
}

impl Predicate {
    pub fn path(path: impl Into<String>) -> Self {
        Predicate::PathEquals(path.into())
    }

    pub fn path_prefix(prefix: impl Into<String>) -> Self {
        Predicate::PathPrefix(prefix.into())
    }

    pub fn path_regex(pattern: &str) -> Result<Self, ConfigError> {
        compile_regex(pattern).map(Predicate::PathRegex)
    }

    pub fn path_glob(pattern: &str) -> Result<Self, ConfigError> {
        let glob = globset::Glob::new(pattern).map_err(|source| ConfigError::InvalidGlob {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Predicate::PathGlob {
            pattern: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::header_rule(name, ValueRule::Equals(value.into()))
    }

    pub fn header_contains(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::header_rule(name, ValueRule::Contains(value.into()))
    }

    pub fn header_present(name: impl Into<String>) -> Self {
        Self::header_rule(name, ValueRule::Present)
    }

    pub fn header_absent(name: impl Into<String>) -> Self {
        Self::header_rule(name, ValueRule::Absent)
    }

    pub fn header_rule(name: impl Into<String>, rule: ValueRule) -> Self {
        Predicate::Header {
            name: name.into().to_ascii_lowercase(),
            rule,
        }
    }

    pub fn query(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::query_rule(name, ValueRule::Equals(value.into()))
    }

    pub fn query_rule(name: impl Into<String>, rule: ValueRule) -> Self {
        Predicate::Query {
            name: name.into(),
            rule,
        }
    }

    pub fn body_equals(body: impl Into<String>) -> Self {
        Predicate::BodyEquals(body.into())
    }

    pub fn body_contains(needle: impl Into<String>) -> Self {
        Predicate::BodyContains(needle.into())
    }

    pub fn body_not_contains(needle: impl Into<String>) -> Self {
        Predicate::BodyNotContains(needle.into())
    }

    pub fn body_contains_ignoring_case(needle: &str) -> Self {
        Predicate::BodyContainsIgnoringCase(needle.to_lowercase())
    }

    pub fn body_not_contains_ignoring_case(needle: &str) -> Self {
        Predicate::BodyNotContainsIgnoringCase(needle.to_lowercase())
    }

    pub fn body_regex(pattern: &str) -> Result<Self, ConfigError> {
        compile_regex(pattern).map(Predicate::BodyRegex)
    }

    /// Body must be JSON structurally equal to `payload`.
    pub fn body_equals_json(payload: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(payload)
            .map(Predicate::BodyEqualsJson)
            .map_err(|source| ConfigError::InvalidJson {
                context: "expected request body".to_string(),
                source,
            })
    }

    /// Field at `pointer` (e.g. `/messages/0/role`) equals `expected`.
    pub fn json_field(pointer: impl Into<String>, expected: impl Into<Value>) -> Self {
        Predicate::JsonField {
            pointer: pointer.into(),
            expected: expected.into(),
        }
    }

    pub fn json_path(expression: &str, expected: Value) -> Result<Self, ConfigError> {
        parse_json_path(expression)?;
        Ok(Predicate::JsonPath {
            expression: expression.to_string(),
            expected,
        })
    }

    pub fn model(model: impl Into<String>) -> Self {
        let model: String = model.into();
        Self::json_field("/model", model)
    }

    pub fn temperature(temperature: f64) -> Self {
        Self::json_field("/temperature", temperature)
    }

    pub fn max_tokens(value: u64) -> Self {
        Self::json_field("/max_tokens", value)
    }

    pub fn max_completion_tokens(value: u64) -> Self {
        Self::json_field("/max_completion_tokens", value)
    }

    pub fn top_p(value: f64) -> Self {
        Self::json_field("/top_p", value)
    }

    pub fn top_k(value: u64) -> Self {
        Self::json_field("/top_k", value)
    }

    pub fn seed(value: i64) -> Self {
        Self::json_field("/seed", value)
    }

    /// Custom test over the decoded JSON body. Fails on non-JSON bodies.
    pub fn json<F>(description: impl Into<String>, test: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Predicate::Json {
            description: description.into(),
            test: Arc::new(test),
        }
    }

    /// Custom test over the whole request.
    pub fn custom<F>(description: impl Into<String>, test: F) -> Self
    where
        F: Fn(&RequestDescriptor) -> bool + Send + Sync + 'static,
    {
        Predicate::Custom {
            description: description.into(),
            test: Arc::new(test),
        }
    }

    /// Evaluate against a request. Never mutates the request.
    pub fn matches(&self, req: &RequestDescriptor) -> bool {
        match self {
            Predicate::PathEquals(path) => req.path() == path,
            Predicate::PathPrefix(prefix) => req.path().starts_with(prefix.as_str()),
            Predicate::PathRegex(re) => re.is_match(req.path()),
            Predicate::PathGlob { matcher, .. } => matcher.is_match(req.path()),
            Predicate::Query { name, rule } => rule.check(req.query_all(name)),
            Predicate::Header { name, rule } => rule.check(req.header_all(name)),
            Predicate::BodyEquals(expected) => req.body_str() == Some(expected.as_str()),
            Predicate::BodyContains(needle) => {
                req.body_str().is_some_and(|b| b.contains(needle.as_str()))
            }
            Predicate::BodyNotContains(needle) => {
                !req.body_str().is_some_and(|b| b.contains(needle.as_str()))
            }
            Predicate::BodyContainsIgnoringCase(needle) => req
                .body_str()
                .is_some_and(|b| b.to_lowercase().contains(needle.as_str())),
            Predicate::BodyNotContainsIgnoringCase(needle) => !req
                .body_str()
                .is_some_and(|b| b.to_lowercase().contains(needle.as_str())),
            Predicate::BodyRegex(re) => req.body_str().is_some_and(|b| re.is_match(b)),
            Predicate::BodyEqualsJson(expected) => {
                req.json().is_some_and(|json| json_eq(json, expected))
            }
            Predicate::BodyIsJson => req.json().is_some(),
            Predicate::BodyEmpty => req.body().is_empty(),
            Predicate::JsonField { pointer, expected } => req
                .json()
                .and_then(|json| json.pointer(pointer))
                .is_some_and(|actual| json_eq(actual, expected)),
            Predicate::JsonPath {
                expression,
                expected,
            } => req
                .json()
                .is_some_and(|json| matches_json_path(json, expression, expected)),
            Predicate::Json { test, .. } => req.json().is_some_and(|json| test(json)),
            Predicate::Custom { test, .. } => test(req),
        }
    }

    /// Compile a declarative matcher from configuration into predicates.
    pub fn compile_all(matcher: &RequestMatcher) -> Result<Vec<Predicate>, ConfigError> {
        let mut predicates = Vec::new();

        if let Some(path) = &matcher.path {
            predicates.push(match path {
                PathMatcher::Exact { value } => Predicate::path(value.as_str()),
                PathMatcher::Prefix { value } => Predicate::path_prefix(value.as_str()),
                PathMatcher::Regex { pattern } => Predicate::path_regex(pattern)?,
                PathMatcher::Glob { pattern } => Predicate::path_glob(pattern)?,
            });
        }

        // Sorted so that verification output is stable across runs.
        let mut query: Vec<_> = matcher.query.iter().collect();
        query.sort_by(|a, b| a.0.cmp(b.0));
        for (name, qm) in query {
            let rule = match qm {
                QueryMatcher::Exact { value } => ValueRule::Equals(value.clone()),
                QueryMatcher::Regex { pattern } => ValueRule::Regex(compile_regex(pattern)?),
                QueryMatcher::Present => ValueRule::Present,
                QueryMatcher::Absent => ValueRule::Absent,
            };
            predicates.push(Predicate::query_rule(name.as_str(), rule));
        }

        let mut headers: Vec<_> = matcher.headers.iter().collect();
        headers.sort_by(|a, b| a.0.cmp(b.0));
        for (name, hm) in headers {
            let rule = match hm {
                HeaderMatcher::Exact { value } => ValueRule::Equals(value.clone()),
                HeaderMatcher::Regex { pattern } => ValueRule::Regex(compile_regex(pattern)?),
                HeaderMatcher::Present => ValueRule::Present,
                HeaderMatcher::Absent => ValueRule::Absent,
                HeaderMatcher::Contains { value } => ValueRule::Contains(value.clone()),
            };
            predicates.push(Predicate::header_rule(name.as_str(), rule));
        }

        for bm in &matcher.body {
            match bm {
                BodyMatcher::Exact { value } => predicates.push(Predicate::body_equals(value)),
                BodyMatcher::Regex { pattern } => predicates.push(Predicate::body_regex(pattern)?),
                BodyMatcher::Contains { value } => {
                    predicates.push(Predicate::body_contains(value))
                }
                BodyMatcher::NotContains { value } => {
                    predicates.push(Predicate::body_not_contains(value))
                }
                BodyMatcher::ContainsIgnoringCase { value } => {
                    predicates.push(Predicate::body_contains_ignoring_case(value))
                }
                BodyMatcher::EqualsJson { value } => {
                    predicates.push(Predicate::BodyEqualsJson(value.clone()))
                }
                BodyMatcher::JsonPath { expressions } => {
                    let mut exprs: Vec<_> = expressions.iter().collect();
                    exprs.sort_by(|a, b| a.0.cmp(b.0));
                    for (expr, expected) in exprs {
                        predicates.push(Predicate::json_path(expr, expected.clone())?);
                    }
                }
                BodyMatcher::JsonPointer { pointer, value } => {
                    predicates.push(Predicate::json_field(pointer.as_str(), value.clone()))
                }
                BodyMatcher::Json => predicates.push(Predicate::BodyIsJson),
                BodyMatcher::Empty => predicates.push(Predicate::BodyEmpty),
            }
        }

        Ok(predicates)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::PathEquals(p) => write!(f, "path == {p:?}"),
            Predicate::PathPrefix(p) => write!(f, "path starts with {p:?}"),
            Predicate::PathRegex(re) => write!(f, "path =~ /{}/", re.as_str()),
            Predicate::PathGlob { pattern, .. } => write!(f, "path glob {pattern:?}"),
            Predicate::Query { name, rule } => write!(f, "query {name} {rule}"),
            Predicate::Header { name, rule } => write!(f, "header {name} {rule}"),
            Predicate::BodyEquals(b) => write!(f, "body == {b:?}"),
            Predicate::BodyContains(b) => write!(f, "body contains {b:?}"),
            Predicate::BodyNotContains(b) => write!(f, "body does not contain {b:?}"),
            Predicate::BodyContainsIgnoringCase(b) => {
                write!(f, "body contains (ignoring case) {b:?}")
            }
            Predicate::BodyNotContainsIgnoringCase(b) => {
                write!(f, "body does not contain (ignoring case) {b:?}")
            }
            Predicate::BodyRegex(re) => write!(f, "body =~ /{}/", re.as_str()),
            Predicate::BodyEqualsJson(v) => write!(f, "body json == {v}"),
            Predicate::BodyIsJson => f.write_str("body is json"),
            Predicate::BodyEmpty => f.write_str("body is empty"),
            Predicate::JsonField { pointer, expected } => write!(f, "json {pointer} == {expected}"),
            Predicate::JsonPath {
                expression,
                expected,
            } => {
                if expected.is_null() {
                    write!(f, "json path {expression} exists")
                } else {
                    write!(f, "json path {expression} == {expected}")
                }
            }
            Predicate::Json { description, .. } | Predicate::Custom { description, .. } => {
                f.write_str(description)
            }
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({self})")
    }
}

fn compile_regex(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

fn parse_json_path(expression: &str) -> Result<jsonpath_rust::JsonPath, ConfigError> {
    jsonpath_rust::JsonPath::try_from(expression).map_err(|e| ConfigError::InvalidJsonPath {
        expression: expression.to_string(),
        reason: e.to_string(),
    })
}

fn matches_json_path(json: &Value, expression: &str, expected: &Value) -> bool {
    let Ok(path) = parse_json_path(expression) else {
        return false;
    };

    let hits = match path.find(json) {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        other => vec![other],
    };

    if expected.is_null() {
        return !hits.is_empty();
    }
    hits.iter().any(|hit| json_eq(hit, expected))
        || json_eq(&Value::Array(hits.clone()), expected)
}

/// JSON equality where `1` and `1.0` are the same number.
pub(crate) fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_eq(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_eq(x, y)))
        }
        _ => a == b,
    }
}

/// Context captured while resolving the route (for template variables).
#[derive(Debug, Clone, Default)]
pub struct MatchContext {
    /// Path parameters extracted from the route template
    pub path_params: HashMap<String, String>,
}

/// Route path with `{name}` placeholders.
///
/// A placeholder matches a non-empty run of characters within one segment,
/// up to the literal that follows it, so both `/users/{id}` and
/// `/models/{model}:generateContent` work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Vec<Piece>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Piece {
    Literal(String),
    Param(String),
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        let rest = template
            .strip_prefix('/')
            .ok_or_else(|| invalid("must start with '/'"))?;

        let mut segments = Vec::new();
        for raw in rest.split('/') {
            let mut pieces = Vec::new();
            let mut current = String::new();
            let mut in_param = false;

            for ch in raw.chars() {
                match ch {
                    '{' if !in_param => {
                        if !current.is_empty() {
                            pieces.push(Piece::Literal(std::mem::take(&mut current)));
                        } else if matches!(pieces.last(), Some(Piece::Param(_))) {
                            return Err(invalid("adjacent parameters are ambiguous"));
                        }
                        in_param = true;
                    }
                    '}' if in_param => {
                        if current.is_empty() {
                            return Err(invalid("empty parameter name"));
                        }
                        pieces.push(Piece::Param(std::mem::take(&mut current)));
                        in_param = false;
                    }
                    '{' | '}' => return Err(invalid("unbalanced braces")),
                    _ => current.push(ch),
                }
            }
            if in_param {
                return Err(invalid("unterminated parameter"));
            }
            if !current.is_empty() {
                pieces.push(Piece::Literal(current));
            }
            segments.push(pieces);
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn param_count(&self) -> usize {
        self.segments
            .iter()
            .flatten()
            .filter(|p| matches!(p, Piece::Param(_)))
            .count()
    }

    /// Match a request path, returning the captured parameters.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let rest = path.strip_prefix('/')?;
        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (pieces, part) in self.segments.iter().zip(parts) {
            match_segment(pieces, part, &mut params)?;
        }
        Some(params)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn match_segment(pieces: &[Piece], part: &str, params: &mut HashMap<String, String>) -> Option<()> {
    let mut remaining = part;

    for (i, piece) in pieces.iter().enumerate() {
        match piece {
            Piece::Literal(lit) => {
                remaining = remaining.strip_prefix(lit.as_str())?;
            }
            Piece::Param(name) => {
                let end = match pieces.get(i + 1) {
                    Some(Piece::Literal(next)) => remaining.find(next.as_str())?,
                    _ => remaining.len(),
                };
                if end == 0 {
                    return None;
                }
                params.insert(name.clone(), remaining[..end].to_string());
                remaining = &remaining[end..];
            }
        }
    }

    remaining.is_empty().then_some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, Method};
    use serde_json::json;

    fn request(path: &str, body: &str) -> RequestDescriptor {
        RequestDescriptor::new(Method::POST, path, None, HeaderMap::new(), body.to_string())
    }

    #[test]
    fn test_path_predicates() {
        let req = request("/v1/chat/completions", "");

        assert!(Predicate::path("/v1/chat/completions").matches(&req));
        assert!(!Predicate::path("/v1/chat").matches(&req));
        assert!(Predicate::path_prefix("/v1/").matches(&req));
        assert!(Predicate::path_regex(r"^/v\d+/chat").unwrap().matches(&req));
        assert!(Predicate::path_glob("/v1/**").unwrap().matches(&req));
    }

    #[test]
    fn test_invalid_patterns_fail_fast() {
        assert!(matches!(
            Predicate::path_regex("(unclosed"),
            Err(ConfigError::InvalidRegex { .. })
        ));
        assert!(matches!(
            Predicate::path_glob("a[b"),
            Err(ConfigError::InvalidGlob { .. })
        ));
        assert!(matches!(
            Predicate::body_equals_json("{not json"),
            Err(ConfigError::InvalidJson { .. })
        ));
    }

    #[test]
    fn test_header_predicates() {
        let req = request("/", "").with_header("Authorization", "Bearer sk-test");

        assert!(Predicate::header("authorization", "Bearer sk-test").matches(&req));
        assert!(Predicate::header_contains("AUTHORIZATION", "sk-").matches(&req));
        assert!(Predicate::header_present("Authorization").matches(&req));
        assert!(!Predicate::header_absent("authorization").matches(&req));
        assert!(Predicate::header_absent("x-api-key").matches(&req));
        assert!(!Predicate::header("authorization", "Bearer other").matches(&req));
    }

    #[test]
    fn test_query_predicates() {
        let req = RequestDescriptor::new(
            Method::GET,
            "/models",
            Some("page=2&tag=a&tag=b"),
            HeaderMap::new(),
            bytes::Bytes::new(),
        );

        assert!(Predicate::query("page", "2").matches(&req));
        assert!(Predicate::query("tag", "b").matches(&req));
        assert!(Predicate::query_rule("page", ValueRule::Present).matches(&req));
        assert!(Predicate::query_rule("limit", ValueRule::Absent).matches(&req));
        assert!(!Predicate::query("page", "1").matches(&req));
    }

    #[test]
    fn test_body_string_predicates() {
        let req = request("/", r#"{"messages":[{"role":"user","content":"Tell me a JOKE"}]}"#);

        assert!(Predicate::body_contains("JOKE").matches(&req));
        assert!(!Predicate::body_contains("joke").matches(&req));
        assert!(Predicate::body_contains_ignoring_case("joke").matches(&req));
        assert!(Predicate::body_not_contains("poem").matches(&req));
        assert!(!Predicate::body_not_contains_ignoring_case("Joke").matches(&req));
        assert!(Predicate::body_regex(r#""role":"user""#).unwrap().matches(&req));
        assert!(Predicate::BodyIsJson.matches(&req));
        assert!(!Predicate::BodyEmpty.matches(&req));
    }

    #[test]
    fn test_provider_field_predicates() {
        let req = request(
            "/v1/chat/completions",
            r#"{"model":"gpt-4o-mini","temperature":0.7,"max_tokens":100,"seed":42,"top_p":1}"#,
        );

        assert!(Predicate::model("gpt-4o-mini").matches(&req));
        assert!(!Predicate::model("gpt-4o").matches(&req));
        assert!(Predicate::temperature(0.7).matches(&req));
        assert!(!Predicate::temperature(0.2).matches(&req));
        assert!(Predicate::max_tokens(100).matches(&req));
        assert!(Predicate::seed(42).matches(&req));
        // integer 1 in the body equals 1.0
        assert!(Predicate::top_p(1.0).matches(&req));
        assert!(!Predicate::top_k(5).matches(&req));
    }

    #[test]
    fn test_json_structural_equality() {
        let req = request("/", r#"{"b":[1,2],"a":"x"}"#);
        assert!(Predicate::body_equals_json(r#"{"a":"x","b":[1.0,2]}"#)
            .unwrap()
            .matches(&req));
        assert!(!Predicate::body_equals_json(r#"{"a":"x"}"#).unwrap().matches(&req));
    }

    #[test]
    fn test_json_path_predicate() {
        let req = request("/", r#"{"messages":[{"role":"system","content":"Be brief"}]}"#);

        assert!(Predicate::json_path("$.messages[0].role", json!("system"))
            .unwrap()
            .matches(&req));
        assert!(Predicate::json_path("$.messages[0].content", Value::Null)
            .unwrap()
            .matches(&req));
        assert!(!Predicate::json_path("$.messages[0].role", json!("user"))
            .unwrap()
            .matches(&req));
    }

    #[test]
    fn test_custom_predicates() {
        let req = request("/", r#"{"stream":true}"#);

        let streaming = Predicate::json("stream is true", |json| json["stream"] == true);
        assert!(streaming.matches(&req));
        assert_eq!(streaming.to_string(), "stream is true");

        let post = Predicate::custom("method is POST", |r| r.method() == Method::POST);
        assert!(post.matches(&req));

        let non_json = request("/", "nope");
        assert!(!streaming.matches(&non_json));
    }

    #[test]
    fn test_describe() {
        assert_eq!(Predicate::model("m").to_string(), r#"json /model == "m""#);
        assert_eq!(
            Predicate::header_present("X-Key").to_string(),
            "header x-key present"
        );
    }

    #[test]
    fn test_path_template_matching() {
        let t = PathTemplate::parse("/users/{id}").unwrap();
        let params = t.matches("/users/123").unwrap();
        assert_eq!(params.get("id"), Some(&"123".to_string()));
        assert!(t.matches("/users/").is_none());
        assert!(t.matches("/users/1/posts").is_none());
        assert_eq!(t.param_count(), 1);
    }

    #[test]
    fn test_path_template_inline_param() {
        let t = PathTemplate::parse("/v1beta/models/{model}:generateContent").unwrap();
        let params = t.matches("/v1beta/models/gemini-2.0-flash:generateContent").unwrap();
        assert_eq!(params["model"], "gemini-2.0-flash");
        assert!(t
            .matches("/v1beta/models/gemini:streamGenerateContent")
            .is_none());
    }

    #[test]
    fn test_literal_template() {
        let t = PathTemplate::parse("/v1/chat/completions").unwrap();
        assert!(t.matches("/v1/chat/completions").unwrap().is_empty());
        assert!(t.matches("/v1/chat/completions/").is_none());
        assert_eq!(t.param_count(), 0);
    }

    #[test]
    fn test_invalid_templates() {
        assert!(PathTemplate::parse("users/{id}").is_err());
        assert!(PathTemplate::parse("/users/{id").is_err());
        assert!(PathTemplate::parse("/users/{}").is_err());
        assert!(PathTemplate::parse("/users/{a}{b}").is_err());
        assert!(PathTemplate::parse("/users/id}").is_err());
    }

    #[test]
    fn test_compile_from_config() {
        let yaml = r#"
path:
  type: prefix
  value: /v1
headers:
  authorization:
    type: contains
    value: Bearer
body:
  - type: json_pointer
    pointer: /model
    value: gpt-4o
  - type: contains
    value: hello
"#;
        let matcher: RequestMatcher = serde_yaml::from_str(yaml).unwrap();
        let predicates = Predicate::compile_all(&matcher).unwrap();
        assert_eq!(predicates.len(), 4);

        let req = request("/v1/chat/completions", r#"{"model":"gpt-4o","prompt":"hello"}"#)
            .with_header("Authorization", "Bearer x");
        assert!(predicates.iter().all(|p| p.matches(&req)));
    }
}
