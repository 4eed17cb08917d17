use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::AuthFailure;
use crate::http::{header, Bytes, Extensions, HeaderMap, Method, Uri};
use crate::identity::Principal;
use crate::validation::ValidationFailure;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Identifies the compiled route a request was dispatched to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub controller: String,
    pub handler: String,
    pub method: Method,
    /// Full registered path pattern, e.g. `/web/v1/users/{id}`.
    pub path: String,
}

impl RouteInfo {
    pub fn new(
        controller: impl Into<String>,
        handler: impl Into<String>,
        method: Method,
        path: impl Into<String>,
    ) -> Self {
        Self {
            controller: controller.into(),
            handler: handler.into(),
            method,
            path: path.into(),
        }
    }
}

/// Per-request state threaded explicitly through middleware, guards, the
/// parameter resolver and the handler.
///
/// Nothing about the current request is ever stored on a controller; code
/// that needs request data receives this context.
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    path_params: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Bytes,
    parsed_body: Option<Value>,
    principal: Option<Principal>,
    request_id: String,
    route: Arc<RouteInfo>,
    extensions: Extensions,
}

impl RequestContext {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        let query = parse_query_string(uri.query());
        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let route = Arc::new(RouteInfo::new("", "", method.clone(), uri.path()));
        Self {
            method,
            uri,
            headers,
            path_params: Vec::new(),
            query,
            body,
            parsed_body: None,
            principal: None,
            request_id,
            route,
            extensions: Extensions::new(),
        }
    }

    pub fn with_path_params(mut self, params: Vec<(String, String)>) -> Self {
        self.path_params = params;
        self
    }

    pub fn with_route(mut self, route: Arc<RouteInfo>) -> Self {
        self.route = route;
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn path_params(&self) -> &[(String, String)] {
        &self.path_params
    }

    /// The last value for a query key.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .rev()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Parse the body as JSON once and cache the result.
    ///
    /// An empty body parses to `null`.
    pub fn body_json(&mut self) -> Result<&Value, ValidationFailure> {
        if self.parsed_body.is_none() {
            let value = if self.body.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&self.body)
                    .map_err(|e| ValidationFailure::single("body", e.to_string(), "invalid_json"))?
            };
            self.parsed_body = Some(value);
        }
        Ok(self.parsed_body.get_or_insert(Value::Null))
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn set_principal(&mut self, principal: Principal) {
        self.principal = Some(principal);
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    /// The bearer token from the `Authorization` header.
    pub fn bearer_token(&self) -> Result<&str, AuthFailure> {
        let value = self
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthFailure::Missing)?
            .to_str()
            .map_err(|_| AuthFailure::Malformed)?;
        match value.split_once(' ') {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => {
                let token = token.trim();
                if token.is_empty() {
                    Err(AuthFailure::Malformed)
                } else {
                    Ok(token)
                }
            }
            _ => Err(AuthFailure::Malformed),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn route(&self) -> &RouteInfo {
        &self.route
    }

    /// Typed per-request storage (rate-limit decision, cache status, ...).
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("request_id", &self.request_id)
            .field("route", &self.route)
            .field("authenticated", &self.principal.is_some())
            .finish()
    }
}

/// Parse a query string into key-value pairs.
pub fn parse_query_string(query: Option<&str>) -> Vec<(String, String)> {
    match query {
        Some(q) => form_urlencoded::parse(q.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        None => Vec::new(),
    }
}
