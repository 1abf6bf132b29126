//! Per-request state the rule pipeline reads and mutates.
//!
//! A [`RewriteContext`] is built by the host for exactly one request, handed
//! to [`Engine::apply`](crate::Engine::apply) and inspected afterwards to decide
//! whether to rewrite the request, answer it directly, or pass it through.

use std::collections::HashMap;
use std::path::Path;

use percent_encoding::percent_decode_str;
use unicase::UniCase;

pub mod variables;

pub use variables::{ContextProvider, DateCtx, EnvCtx, RequestCtx, ServerCtx};

use crate::extra;

/// Continuation signal produced by a rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RuleResult {
    /// Advance to the next rule
    #[default]
    Continue,
    /// Halt the pipeline, the current context is final
    Stop,
    /// Halt the pipeline, the response has already been decided
    Terminate,
}

/// Response decided by a terminating action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Redirect { status: u16, location: String },
    Status { status: u16, reason: Option<String> },
    Abort,
}

/// Mutable per-request state.
#[derive(Debug)]
pub struct RewriteContext {
    scheme: String,
    host: String,
    port: Option<u16>,
    method: String,
    request_uri: String,
    path: String,
    query: String,
    headers: HashMap<UniCase<String>, String>,
    variables: HashMap<UniCase<String>, String>,
    providers: Vec<Box<dyn ContextProvider>>,
    response: Option<Response>,
    result: RuleResult,
}

impl RewriteContext {
    /// Create a context for the given request path, optionally followed by
    /// `?query`.
    pub fn new(path_and_query: &str) -> Self {
        let (path, query) = extra::split_query(path_and_query);
        Self {
            scheme: "http".to_owned(),
            host: String::new(),
            port: None,
            method: "GET".to_owned(),
            request_uri: path_and_query.to_owned(),
            path,
            query: query.to_owned(),
            headers: HashMap::new(),
            variables: HashMap::new(),
            providers: Vec::new(),
            response: None,
            result: RuleResult::Continue,
        }
    }

    pub fn with_scheme<S: Into<String>>(mut self, scheme: S) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Assign the host, a `host:port` value also assigns the port.
    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        let host = host.into();
        match split_host(&host) {
            Some((name, port)) => {
                self.host = name.to_owned();
                self.port = Some(port);
            }
            None => self.host = host,
        }
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    pub fn with_method<S: Into<String>>(mut self, method: S) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(UniCase::new(key.into()), value.into());
        self
    }

    /// Override a server variable, taking precedence over every other source.
    pub fn with_variable<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.variables.insert(UniCase::new(key.into()), value.into());
        self
    }

    /// Attach an additional server variable provider.
    pub fn with_provider(mut self, provider: impl ContextProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    /// Attach [`EnvCtx`] and [`DateCtx`] providers.
    pub fn with_defaults(self) -> Self {
        self.with_provider(EnvCtx).with_provider(DateCtx::new())
    }

    #[inline]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[inline]
    pub fn is_https(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("https")
    }

    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[inline]
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Current (possibly rewritten) request path.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current query string without the leading `?`.
    #[inline]
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&UniCase::new(key.to_owned()))
            .map(|v| v.as_str())
    }

    pub fn set_path<S: Into<String>>(&mut self, path: S) {
        self.path = path.into();
    }

    /// Replace the query string; a leading `?` is stripped.
    pub fn set_query<S: Into<String>>(&mut self, query: S) {
        let query = query.into();
        self.query = match query.strip_prefix('?') {
            Some(stripped) => stripped.to_owned(),
            None => query,
        };
    }

    pub fn set_scheme<S: Into<String>>(&mut self, scheme: S) {
        self.scheme = scheme.into();
    }

    pub fn set_host<S: Into<String>>(&mut self, host: S, port: Option<u16>) {
        self.host = host.into();
        self.port = port;
    }

    /// Current path joined with the current query.
    pub fn path_and_query(&self) -> String {
        extra::join_query(self.path.clone(), &self.query)
    }

    /// Answer the request with a redirect to `location`.
    pub fn redirect<S: Into<String>>(&mut self, status: u16, location: S) {
        self.response = Some(Response::Redirect {
            status,
            location: location.into(),
        });
    }

    /// Answer the request with a bare status code.
    pub fn respond(&mut self, status: u16, reason: Option<String>) {
        self.response = Some(Response::Status { status, reason });
    }

    /// Drop the request without a response.
    pub fn abort(&mut self) {
        self.response = Some(Response::Abort);
    }

    #[inline]
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    #[inline]
    pub fn result(&self) -> RuleResult {
        self.result
    }

    /// Report the continuation signal, used by delegate rules.
    #[inline]
    pub fn set_result(&mut self, result: RuleResult) {
        self.result = result;
    }

    /// Resolve a server variable by name, case-insensitively.
    ///
    /// Unknown variables resolve to an empty string.
    pub fn server_variable(&self, name: &str) -> String {
        let key = UniCase::new(name.to_owned());
        if let Some(value) = self.variables.get(&key) {
            return value.clone();
        }
        if let Some(value) = self.builtin(name) {
            return value;
        }
        if let Some(value) = self.header_variable(name) {
            return value.to_owned();
        }
        self.providers
            .iter()
            .find_map(|p| p.fill(name))
            .unwrap_or_default()
    }

    fn builtin(&self, name: &str) -> Option<String> {
        let value = match name.to_ascii_uppercase().as_str() {
            "HTTPS" => match self.is_https() {
                true => "on".to_owned(),
                false => "off".to_owned(),
            },
            "HTTP_HOST" => match self.port {
                Some(port) if Some(port) != default_port(&self.scheme) => {
                    format!("{}:{port}", self.host)
                }
                _ => self.host.clone(),
            },
            "SERVER_NAME" => self.host.clone(),
            "SERVER_PORT" => self
                .port
                .or_else(|| default_port(&self.scheme))
                .map(|p| p.to_string())
                .unwrap_or_default(),
            "REQUEST_SCHEME" => self.scheme.clone(),
            "REQUEST_METHOD" => self.method.clone(),
            "REQUEST_URI" => self.request_uri.clone(),
            "QUERY_STRING" => self.query.clone(),
            "URL" => self.path.clone(),
            "REQUEST_FILENAME" => self.request_filename(),
            _ => return None,
        };
        Some(value)
    }

    /// Physical path of the current url below `DOCUMENT_ROOT`, or the url
    /// path itself when no document root is known.
    fn request_filename(&self) -> String {
        let root = self
            .variables
            .get(&UniCase::new("DOCUMENT_ROOT".to_owned()))
            .cloned()
            .or_else(|| self.providers.iter().find_map(|p| p.fill("DOCUMENT_ROOT")))
            .filter(|root| !root.is_empty());
        let Some(root) = root else {
            return self.path.clone();
        };
        let relative = percent_decode_str(self.path.trim_start_matches('/')).decode_utf8_lossy();
        Path::new(&root)
            .join(relative.as_ref())
            .to_string_lossy()
            .into_owned()
    }

    fn header_variable(&self, name: &str) -> Option<&str> {
        if let Some((prefix, header)) = name.split_once(':') {
            return match prefix.eq_ignore_ascii_case("http") {
                true => self.header(header),
                false => None,
            };
        }
        let header = name
            .get(..5)
            .filter(|p| p.eq_ignore_ascii_case("HTTP_"))
            .map(|_| name[5..].replace('_', "-"))?;
        self.header(&header)
    }
}

#[inline]
fn default_port(scheme: &str) -> Option<u16> {
    match scheme.to_ascii_lowercase().as_str() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

fn split_host(host: &str) -> Option<(&str, u16)> {
    let (name, port) = host.rsplit_once(':')?;
    if name.starts_with('[') && !name.ends_with(']') {
        return None;
    }
    Some((name, port.parse().ok()?))
}
