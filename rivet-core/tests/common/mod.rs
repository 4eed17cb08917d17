#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use http_body_util::BodyExt;
use rivet_core::http::{Body, HeaderMap, HttpRequest, Method, Router, StatusCode};
use rivet_core::{BoxFuture, Identity, Principal, TokenError, TokenVerifier};
use serde_json::Value;
use tower::ServiceExt;

pub struct TestIdentity {
    pub sub: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl TestIdentity {
    pub fn new(sub: &str) -> Self {
        Self {
            sub: sub.to_string(),
            roles: Vec::new(),
            permissions: Vec::new(),
        }
    }

    pub fn roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn permissions(mut self, permissions: &[&str]) -> Self {
        self.permissions = permissions.iter().map(|p| p.to_string()).collect();
        self
    }
}

impl Identity for TestIdentity {
    fn sub(&self) -> &str {
        &self.sub
    }

    fn roles(&self) -> &[String] {
        &self.roles
    }

    fn permissions(&self) -> &[String] {
        &self.permissions
    }
}

/// Maps fixed bearer tokens to identities. `expired` is always expired.
#[derive(Default)]
pub struct StaticVerifier {
    tokens: HashMap<String, Principal>,
}

impl StaticVerifier {
    pub fn with(mut self, token: &str, identity: TestIdentity) -> Self {
        self.tokens.insert(token.to_string(), Arc::new(identity));
        self
    }
}

impl TokenVerifier for StaticVerifier {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Principal, TokenError>> {
        let result = match token {
            "expired" => Err(TokenError::Expired),
            other => self
                .tokens
                .get(other)
                .cloned()
                .ok_or_else(|| TokenError::Invalid("unknown token".into())),
        };
        Box::pin(std::future::ready(result))
    }
}

pub fn verifier() -> Arc<StaticVerifier> {
    Arc::new(
        StaticVerifier::default()
            .with("user-token", TestIdentity::new("user-1").roles(&["user"]))
            .with(
                "admin-token",
                TestIdentity::new("admin-1")
                    .roles(&["user", "admin"])
                    .permissions(&["regions:write", "regions:read"]),
            ),
    )
}

pub struct Sent {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Sent {
    let mut builder = HttpRequest::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    Sent {
        status,
        headers,
        body,
    }
}
