//! Post-scenario verification.
//!
//! A test calls [`MockServer::verify_no_unmatched_expectations`] once the client
//! under test is done. Any stub that was registered but never hit means the
//! test setup and the client have drifted apart.
//!
//! [`MockServer::verify_no_unmatched_expectations`]: crate::MockServer::verify_no_unmatched_expectations

use crate::registry::Expectation;
use crate::request::RequestDescriptor;
use std::fmt;
use thiserror::Error;

/// Maximum characters of a request body kept in the unmatched journal.
pub const BODY_PREVIEW_CHARS: usize = 256;

/// A stub that was never exercised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedExpectation {
    /// Registration order
    pub id: u64,
    pub name: Option<String>,
    /// `METHOD /path/template`
    pub route: String,
    /// `fixed`, `streamed` or `error`
    pub kind: &'static str,
    pub status: u16,
    pub predicates: Vec<String>,
}

impl UnmatchedExpectation {
    pub fn from_expectation(expectation: &Expectation) -> Self {
        Self {
            id: expectation.id(),
            name: expectation.name().map(str::to_string),
            route: expectation.route().to_string(),
            kind: expectation.response().kind(),
            status: expectation.response().status(),
            predicates: expectation
                .predicates()
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl fmt::Display for UnmatchedExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id)?;
        if let Some(name) = &self.name {
            write!(f, " {name:?}")?;
        }
        write!(f, " {}", self.route)?;
        if self.predicates.is_empty() {
            f.write_str(" [any request]")?;
        } else {
            write!(f, " [{}]", self.predicates.join(", "))?;
        }
        write!(f, " -> {} {}", self.kind, self.status)
    }
}

/// A request that no stub accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmatchedRequest {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body_preview: String,
}

impl UnmatchedRequest {
    pub fn from_request(req: &RequestDescriptor) -> Self {
        Self {
            method: req.method().to_string(),
            path: req.path().to_string(),
            query: req.query_pairs().to_vec(),
            body_preview: req.body_preview(BODY_PREVIEW_CHARS),
        }
    }
}

impl fmt::Display for UnmatchedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)?;
        if !self.query.is_empty() {
            let query: Vec<String> = self.query.iter().map(|(k, v)| format!("{k}={v}")).collect();
            write!(f, "?{}", query.join("&"))?;
        }
        if !self.body_preview.is_empty() {
            write!(f, " body={:?}", self.body_preview)?;
        }
        Ok(())
    }
}

/// Verification failure, meant to fail the test.
#[derive(Debug, Clone, Error)]
pub enum VerificationError {
    #[error("{} stub(s) were never matched:{}", .0.len(), bullet_list(.0))]
    UnmatchedExpectations(Vec<UnmatchedExpectation>),

    #[error("{} request(s) matched no stub:{}", .0.len(), bullet_list(.0))]
    UnmatchedRequests(Vec<UnmatchedRequest>),
}

impl VerificationError {
    /// Unused stubs named by this failure, if any.
    pub fn expectations(&self) -> &[UnmatchedExpectation] {
        match self {
            VerificationError::UnmatchedExpectations(list) => list,
            VerificationError::UnmatchedRequests(_) => &[],
        }
    }
}

fn bullet_list<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|item| format!("\n  - {item}")).collect()
}

/// Fail if any expectation has never been matched.
pub fn check_expectations<'a, I>(expectations: I) -> Result<(), VerificationError>
where
    I: IntoIterator<Item = &'a Expectation>,
{
    let unmatched: Vec<UnmatchedExpectation> = expectations
        .into_iter()
        .filter(|e| e.match_count() == 0)
        .map(UnmatchedExpectation::from_expectation)
        .collect();
    if unmatched.is_empty() {
        Ok(())
    } else {
        Err(VerificationError::UnmatchedExpectations(unmatched))
    }
}
