use super::response::CannedResponse;
use crate::common::Dispatcher;
use crate::record::RecordedRequest;
use crate::{MockError, Result};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Exact path to response mapping entry
///
/// Parses from the `PATH=STATUS[:BODY]` form used on the command line:
///
/// ```
/// use mocksrv::RouteRule;
///
/// let rule: RouteRule = "/api/v1/hello-world=200:Hello, World!".parse().unwrap();
/// assert_eq!(rule.path, "/api/v1/hello-world");
/// assert_eq!(rule.response.status.as_u16(), 200);
/// assert_eq!(&rule.response.body[..], b"Hello, World!");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    /// Request path, matched exactly and case-sensitively
    pub path: String,
    /// Response returned on a match
    pub response: CannedResponse,
}

impl RouteRule {
    pub fn new(path: impl Into<String>, response: CannedResponse) -> Self {
        Self {
            path: path.into(),
            response,
        }
    }
}

impl FromStr for RouteRule {
    type Err = MockError;

    fn from_str(s: &str) -> Result<Self> {
        let (path, reply) = s
            .split_once('=')
            .ok_or_else(|| MockError::Config(format!("Route '{s}' is not of the form PATH=STATUS[:BODY]")))?;
        if !path.starts_with('/') {
            return Err(MockError::Config(format!("Route path '{path}' must start with '/'")));
        }

        let (code, body) = match reply.split_once(':') {
            Some((code, body)) => (code, body),
            None => (reply, ""),
        };
        let code = code
            .trim()
            .parse::<u16>()
            .map_err(|e| MockError::Config(format!("Invalid status '{code}' in route '{s}': {e}")))?;

        let response = CannedResponse::from_code(code)?.with_body(body.to_string());
        Ok(Self::new(path, response))
    }
}

impl fmt::Display for RouteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.path, self.response.status)
    }
}

/// Set of route rules keyed by exact path
///
/// Lookup is a plain map hit: no prefix, wildcard or case folding. Inserting
/// a rule for a path that already has one replaces it.
///
/// # Examples
///
/// ```
/// use mocksrv::{CannedResponse, RouteRule, RouteTable};
///
/// let table: RouteTable = [
///     RouteRule::new("/ping", CannedResponse::ok("pong")),
///     RouteRule::new("/ping", CannedResponse::ok("PONG")),
/// ]
/// .into_iter()
/// .collect();
///
/// assert_eq!(table.len(), 1);
/// assert_eq!(&table.lookup("/ping").unwrap().body[..], b"PONG");
/// assert!(table.lookup("/PING").is_none());
/// ```
///
/// Requests without a rule go to the fallback [`Dispatcher`] when one is set,
/// and get `404` with an empty body otherwise.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: HashMap<String, CannedResponse>,
    fallback: Option<Arc<dyn Dispatcher>>,
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.routes)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, returning the response it replaced
    pub fn insert(&mut self, rule: RouteRule) -> Option<CannedResponse> {
        self.routes.insert(rule.path, rule.response)
    }

    pub fn remove(&mut self, path: &str) -> Option<CannedResponse> {
        self.routes.remove(path)
    }

    pub fn lookup(&self, path: &str) -> Option<&CannedResponse> {
        self.routes.get(path)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Removes every rule; the fallback stays
    pub fn clear(&mut self) {
        self.routes.clear();
    }

    /// Replaces every rule with `rules`, keeping the fallback
    pub fn replace_rules(&mut self, rules: impl IntoIterator<Item = RouteRule>) {
        self.routes.clear();
        self.extend(rules);
    }

    /// Sets the dispatcher consulted for paths without a rule
    pub fn set_fallback(&mut self, dispatcher: impl Dispatcher + 'static) {
        self.fallback = Some(Arc::new(dispatcher));
    }

    pub fn with_fallback(mut self, dispatcher: impl Dispatcher + 'static) -> Self {
        self.set_fallback(dispatcher);
        self
    }

    pub fn clear_fallback(&mut self) {
        self.fallback = None;
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

impl FromIterator<RouteRule> for RouteTable {
    fn from_iter<I: IntoIterator<Item = RouteRule>>(iter: I) -> Self {
        let mut table = Self::new();
        table.extend(iter);
        table
    }
}

impl Extend<RouteRule> for RouteTable {
    fn extend<I: IntoIterator<Item = RouteRule>>(&mut self, iter: I) {
        for rule in iter {
            self.insert(rule);
        }
    }
}

impl Dispatcher for RouteTable {
    fn dispatch(&self, request: &RecordedRequest) -> CannedResponse {
        match (self.lookup(&request.path), &self.fallback) {
            (Some(response), _) => response.clone(),
            (None, Some(fallback)) => fallback.dispatch(request),
            (None, None) => CannedResponse::not_found(),
        }
    }
}
