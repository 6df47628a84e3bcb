//! Expectation registry.
//!
//! Expectations are grouped by route (method + path template). Each route owns
//! one [`Registry`]; [`Routes`] resolves an incoming request to the registry of
//! its route and asks it for the best expectation.
//!
//! Selection among satisfied expectations of one registry:
//! 1. highest `priority`
//! 2. most predicates (most specific)
//! 3. most recently registered

use crate::matcher::{MatchContext, PathTemplate, Predicate};
use crate::request::RequestDescriptor;
use crate::response::ResponseSpec;
use axum::http::Method;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Method and path template under which expectations are grouped.
#[derive(Debug, Clone)]
pub struct RouteKey {
    pub method: Method,
    pub template: PathTemplate,
}

impl RouteKey {
    pub fn new(method: Method, template: PathTemplate) -> Self {
        Self { method, template }
    }

    fn same_route(&self, other: &RouteKey) -> bool {
        self.method == other.method && self.template.as_str() == other.template.as_str()
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.template.as_str())
    }
}

/// Everything needed to create an expectation, minus its id.
#[derive(Debug, Clone)]
pub struct ExpectationDraft {
    pub name: Option<String>,
    pub predicates: Vec<Predicate>,
    pub response: ResponseSpec,
    pub priority: i32,
    /// 0 = unlimited
    pub max_matches: u32,
}

impl ExpectationDraft {
    pub fn new(predicates: Vec<Predicate>, response: ResponseSpec) -> Self {
        Self {
            name: None,
            predicates,
            response,
            priority: 0,
            max_matches: 0,
        }
    }
}

/// One registered stub.
#[derive(Debug)]
pub struct Expectation {
    id: u64,
    name: Option<String>,
    route: RouteKey,
    predicates: Vec<Predicate>,
    response: ResponseSpec,
    priority: i32,
    max_matches: u32,
    match_count: AtomicU64,
}

impl Expectation {
    /// Monotonic per server. Doubles as registration order.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn route(&self) -> &RouteKey {
        &self.route
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn response(&self) -> &ResponseSpec {
        &self.response
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn max_matches(&self) -> u32 {
        self.max_matches
    }

    pub fn match_count(&self) -> u64 {
        self.match_count.load(Ordering::Acquire)
    }

    /// Whether every predicate holds. Does not touch the counter.
    pub fn accepts(&self, req: &RequestDescriptor) -> bool {
        self.predicates.iter().all(|p| p.matches(req))
    }

    /// Atomically take one match, failing if the limit is reached.
    fn try_claim(&self) -> bool {
        let limit = u64::from(self.max_matches);
        self.match_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (limit == 0 || n < limit).then_some(n + 1)
            })
            .is_ok()
    }

    fn rank(&self) -> (i32, usize, u64) {
        (self.priority, self.predicates.len(), self.id)
    }

    /// One-line summary used in logs and verification output.
    pub fn describe(&self) -> String {
        let mut out = format!("#{}", self.id);
        if let Some(name) = &self.name {
            out.push_str(&format!(" {name:?}"));
        }
        out.push_str(&format!(" {}", self.route));
        if self.predicates.is_empty() {
            out.push_str(" [any request]");
        } else {
            let preds: Vec<String> = self.predicates.iter().map(ToString::to_string).collect();
            out.push_str(&format!(" [{}]", preds.join(", ")));
        }
        out.push_str(&format!(
            " -> {} {}",
            self.response.kind(),
            self.response.status()
        ));
        out
    }
}

/// Handle returned to the caller on registration.
#[derive(Debug, Clone)]
pub struct ExpectationHandle {
    inner: Arc<Expectation>,
}

impl ExpectationHandle {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name()
    }

    /// Number of requests served by this expectation so far.
    pub fn match_count(&self) -> u64 {
        self.inner.match_count()
    }

    pub fn is_matched(&self) -> bool {
        self.match_count() > 0
    }

    pub fn describe(&self) -> String {
        self.inner.describe()
    }

    pub fn expectation(&self) -> &Expectation {
        &self.inner
    }
}

impl From<Arc<Expectation>> for ExpectationHandle {
    fn from(inner: Arc<Expectation>) -> Self {
        Self { inner }
    }
}

/// Expectations of one route, in registration order.
#[derive(Debug)]
pub struct Registry {
    route: RouteKey,
    expectations: RwLock<Vec<Arc<Expectation>>>,
}

impl Registry {
    pub fn new(route: RouteKey) -> Self {
        Self {
            route,
            expectations: RwLock::new(Vec::new()),
        }
    }

    pub fn route(&self) -> &RouteKey {
        &self.route
    }

    /// Append an expectation. Never fails.
    pub fn register(&self, id: u64, draft: ExpectationDraft) -> ExpectationHandle {
        let expectation = Arc::new(Expectation {
            id,
            name: draft.name,
            route: self.route.clone(),
            predicates: draft.predicates,
            response: draft.response,
            priority: draft.priority,
            max_matches: draft.max_matches,
            match_count: AtomicU64::new(0),
        });
        self.expectations.write().push(Arc::clone(&expectation));
        ExpectationHandle { inner: expectation }
    }

    /// Select the best satisfied expectation and count the match.
    ///
    /// Exhausted expectations are skipped in favour of the next best one.
    pub fn match_request(&self, req: &RequestDescriptor) -> Option<Arc<Expectation>> {
        let mut candidates: Vec<Arc<Expectation>> = self
            .expectations
            .read()
            .iter()
            .filter(|e| e.accepts(req))
            .cloned()
            .collect();
        candidates.sort_by_key(|e| std::cmp::Reverse(e.rank()));

        candidates.into_iter().find(|e| e.try_claim())
    }

    /// Expectations that have never been matched.
    pub fn unmatched_expectations(&self) -> Vec<Arc<Expectation>> {
        self.expectations
            .read()
            .iter()
            .filter(|e| e.match_count() == 0)
            .cloned()
            .collect()
    }

    pub fn expectations(&self) -> Vec<Arc<Expectation>> {
        self.expectations.read().clone()
    }

    pub fn reset(&self) {
        self.expectations.write().clear();
    }

    /// Zero every counter, keeping the expectations.
    pub fn reset_match_counts(&self) {
        for expectation in self.expectations.read().iter() {
            expectation.match_count.store(0, Ordering::Release);
        }
    }

    pub fn len(&self) -> usize {
        self.expectations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.expectations.read().is_empty()
    }
}

/// Successful resolution of a request.
#[derive(Debug)]
pub struct RouteMatch {
    pub expectation: Arc<Expectation>,
    pub context: MatchContext,
}

/// All registries of one server.
#[derive(Debug, Default)]
pub struct Routes {
    registries: RwLock<Vec<Arc<Registry>>>,
    next_id: AtomicU64,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry for `route`, created on first use.
    pub fn registry(&self, route: RouteKey) -> Arc<Registry> {
        if let Some(existing) = self
            .registries
            .read()
            .iter()
            .find(|r| r.route.same_route(&route))
        {
            return Arc::clone(existing);
        }

        let mut registries = self.registries.write();
        // Another thread may have created it between the two locks
        if let Some(existing) = registries.iter().find(|r| r.route.same_route(&route)) {
            return Arc::clone(existing);
        }
        let registry = Arc::new(Registry::new(route));
        registries.push(Arc::clone(&registry));
        registry
    }

    pub fn register(&self, route: RouteKey, draft: ExpectationDraft) -> ExpectationHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.registry(route).register(id, draft)
    }

    /// Resolve a request to an expectation.
    ///
    /// Routes whose method and template fit the request are tried with
    /// literal templates (fewest parameters) first, then in creation order.
    /// The first route with a satisfied expectation wins.
    pub fn resolve(&self, req: &RequestDescriptor) -> Option<RouteMatch> {
        let mut candidates: Vec<(Arc<Registry>, MatchContext)> = self
            .registries
            .read()
            .iter()
            .filter(|r| r.route.method == *req.method())
            .filter_map(|r| {
                r.route.template.matches(req.path()).map(|path_params| {
                    (Arc::clone(r), MatchContext { path_params })
                })
            })
            .collect();
        candidates.sort_by_key(|(r, _)| r.route.template.param_count());

        candidates.into_iter().find_map(|(registry, context)| {
            registry
                .match_request(req)
                .map(|expectation| RouteMatch {
                    expectation,
                    context,
                })
        })
    }

    /// Never-matched expectations across every route, in registration order.
    pub fn unmatched_expectations(&self) -> Vec<Arc<Expectation>> {
        let mut all: Vec<Arc<Expectation>> = self
            .registries
            .read()
            .iter()
            .flat_map(|r| r.unmatched_expectations())
            .collect();
        all.sort_by_key(|e| e.id);
        all
    }

    pub fn expectations(&self) -> Vec<Arc<Expectation>> {
        let mut all: Vec<Arc<Expectation>> = self
            .registries
            .read()
            .iter()
            .flat_map(|r| r.expectations())
            .collect();
        all.sort_by_key(|e| e.id);
        all
    }

    /// Drop every expectation of every route. Ids keep increasing.
    pub fn reset(&self) {
        self.registries.write().clear();
    }

    pub fn reset_match_counts(&self) {
        for registry in self.registries.read().iter() {
            registry.reset_match_counts();
        }
    }

    pub fn len(&self) -> usize {
        self.registries.read().iter().map(|r| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
