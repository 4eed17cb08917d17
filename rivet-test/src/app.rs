use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use rivet_core::http::{Body, Router};
use rivet_core::{AppBuilder, CACHE_STATUS_HEADER, REQUEST_ID_HEADER};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tower::util::ServiceExt;

/// In-process HTTP test client wrapping a built Rivet `Router`.
///
/// Uses `tower::ServiceExt::oneshot` to dispatch requests without binding
/// to a TCP port.
///
/// ```ignore
/// let app = TestApp::from_builder(AppBuilder::new(compiler).controller(users)?);
/// app.get("/users").bearer(&jwt.token("u1", &["admin"])).send().await
///     .assert_ok()
///     .assert_json("/data/0/name", "Alice");
/// ```
#[derive(Clone)]
pub struct TestApp {
    router: Router,
    default_token: Option<String>,
}

impl TestApp {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            default_token: None,
        }
    }

    pub fn from_builder(builder: AppBuilder) -> Self {
        Self::new(builder.build())
    }

    /// A client that sends `token` as bearer credentials unless a request
    /// overrides it.
    pub fn authenticated(&self, token: impl Into<String>) -> Self {
        Self {
            router: self.router.clone(),
            default_token: Some(token.into()),
        }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn get(&self, path: &str) -> TestRequest<'_> {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: &str) -> TestRequest<'_> {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: &str) -> TestRequest<'_> {
        self.request(Method::PUT, path)
    }

    pub fn patch(&self, path: &str) -> TestRequest<'_> {
        self.request(Method::PATCH, path)
    }

    pub fn delete(&self, path: &str) -> TestRequest<'_> {
        self.request(Method::DELETE, path)
    }

    pub fn request(&self, method: Method, path: &str) -> TestRequest<'_> {
        let mut req = TestRequest {
            app: self,
            method,
            path: path.to_string(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        };
        if let Some(token) = &self.default_token {
            req = req.bearer(token);
        }
        req
    }
}

/// Builder for one request against a [`TestApp`].
pub struct TestRequest<'a> {
    app: &'a TestApp,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl<'a> TestRequest<'a> {
    /// Bearer credentials, replacing any default token.
    pub fn bearer(self, token: &str) -> Self {
        self.header(AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }

    /// Drop the `Authorization` header, e.g. on an [`authenticated`](TestApp::authenticated) client.
    pub fn anonymous(mut self) -> Self {
        self.headers.remove(AUTHORIZATION);
        self
    }

    /// Set a header, replacing an earlier value. Panics on invalid input.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        let name: HeaderName = name.parse().expect("invalid header name");
        let value = HeaderValue::from_str(value).expect("invalid header value");
        self.headers.insert(name, value);
        self
    }

    /// The client address rate limiting falls back to for anonymous callers.
    pub fn client_ip(self, ip: &str) -> Self {
        self.header("x-forwarded-for", ip)
    }

    pub fn request_id(self, id: &str) -> Self {
        self.header(REQUEST_ID_HEADER, id)
    }

    /// Append a query pair; pairs are percent-encoded on send.
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// JSON body with `Content-Type: application/json`.
    pub fn json(self, body: &impl Serialize) -> Self {
        let bytes = serde_json::to_vec(body).expect("body is not serializable");
        let mut req = self.header(CONTENT_TYPE.as_str(), "application/json");
        req.body = Some(Bytes::from(bytes));
        req
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    fn uri(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let encoded: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect();
        let sep = if self.path.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.path, sep, encoded.join("&"))
    }

    pub async fn send(self) -> TestResponse {
        let mut request = Request::builder()
            .method(self.method.clone())
            .uri(self.uri())
            .body(self.body.map(Body::from).unwrap_or_else(Body::empty))
            .expect("invalid request");
        *request.headers_mut() = self.headers;

        let response = self
            .app
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router failed");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("failed to read response body")
            .to_bytes();

        TestResponse { status, headers, body }
    }
}

fn encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

/// A buffered response with assertion helpers for Rivet's JSON envelopes.
///
/// Assertions consume and return `self` so they chain; on failure they
/// panic with the body attached.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.status,
            expected,
            "Expected {expected}, got {}\nBody: {}",
            self.status,
            self.text()
        );
        self
    }

    pub fn assert_ok(self) -> Self {
        self.assert_status(StatusCode::OK)
    }

    pub fn assert_created(self) -> Self {
        self.assert_status(StatusCode::CREATED)
    }

    pub fn assert_no_content(self) -> Self {
        self.assert_status(StatusCode::NO_CONTENT)
    }

    pub fn assert_bad_request(self) -> Self {
        self.assert_status(StatusCode::BAD_REQUEST)
    }

    pub fn assert_unauthorized(self) -> Self {
        self.assert_status(StatusCode::UNAUTHORIZED)
    }

    pub fn assert_forbidden(self) -> Self {
        self.assert_status(StatusCode::FORBIDDEN)
    }

    pub fn assert_not_found(self) -> Self {
        self.assert_status(StatusCode::NOT_FOUND)
    }

    pub fn assert_too_many_requests(self) -> Self {
        self.assert_status(StatusCode::TOO_MANY_REQUESTS)
    }

    /// Assert an error envelope carrying `code`.
    pub fn assert_error_code(self, code: &str) -> Self {
        self.assert_json("/status", "error")
            .assert_json("/error/code", code)
    }

    /// Assert a 400 validation envelope naming `field` among its violations.
    pub fn assert_violation(self, field: &str) -> Self {
        let root: Value = self.json();
        let fields: Vec<&str> = root
            .pointer("/error/details")
            .and_then(Value::as_array)
            .map(|details| {
                details
                    .iter()
                    .filter_map(|d| d.get("field").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        assert!(
            fields.contains(&field),
            "No violation for field \"{field}\" (got {fields:?})\n  Body: {root}"
        );
        self.assert_bad_request()
    }

    /// Assert the `x-cache` header, `"HIT"` or `"MISS"`.
    pub fn assert_cache(self, expected: &str) -> Self {
        assert_eq!(
            self.header(CACHE_STATUS_HEADER),
            Some(expected),
            "Unexpected {CACHE_STATUS_HEADER} header"
        );
        self
    }

    /// Assert the value at a JSON pointer (`/data/0/name`).
    pub fn assert_json(self, pointer: &str, expected: impl Into<Value>) -> Self {
        let root: Value = self.json();
        let actual = root.pointer(pointer).cloned().unwrap_or(Value::Null);
        let expected = expected.into();
        assert_eq!(
            actual, expected,
            "JSON pointer \"{pointer}\" assertion failed\n  Expected: {expected}\n  Actual:   {actual}\n  Body: {root}",
        );
        self
    }

    /// The `data` member of a success envelope.
    pub fn data(&self) -> Value {
        let root: Value = self.json();
        assert_eq!(
            root.get("status").and_then(Value::as_str),
            Some("success"),
            "Expected a success envelope\n  Body: {root}"
        );
        root.get("data").cloned().unwrap_or(Value::Null)
    }

    /// Deserialize the `data` member of a success envelope.
    pub fn data_as<T: DeserializeOwned>(&self) -> T {
        let data = self.data();
        serde_json::from_value(data.clone())
            .unwrap_or_else(|e| panic!("Failed to deserialize data: {e}\n  Data: {data}"))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|e| panic!("Failed to parse JSON: {e}\nBody: {}", self.text()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}
