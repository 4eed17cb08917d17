use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::context::RequestContext;
use crate::descriptor::RateLimitDescriptor;
use crate::error::{error_response, RouteError};
use crate::http::{header, HeaderValue, Response, StatusCode};
use crate::middleware::{Middleware, Next};
use crate::types::BoxFuture;

/// Outcome of recording one hit against a rate-limit key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Time until the oldest hit leaves the window.
    pub reset_after: Duration,
}

/// Pluggable rate-limit backend (in-memory, Redis, ...).
///
/// `hit` records one request for `key` and reports whether it fits within
/// `max` requests per `window`.
pub trait RateLimitStore: Send + Sync + 'static {
    fn hit<'a>(
        &'a self,
        key: &'a str,
        max: u64,
        window: Duration,
    ) -> BoxFuture<'a, RateLimitDecision>;
}

/// Enforces a handler's [`RateLimitDescriptor`].
pub struct RateLimitMiddleware {
    store: Arc<dyn RateLimitStore>,
    descriptor: RateLimitDescriptor,
}

impl RateLimitMiddleware {
    pub fn new(store: Arc<dyn RateLimitStore>, descriptor: RateLimitDescriptor) -> Self {
        Self { store, descriptor }
    }

    /// `{prefix}:{handler}:{client}`; the client part comes from the custom
    /// key function when one is declared.
    pub fn key_for(&self, ctx: &RequestContext) -> String {
        let client = match &self.descriptor.key_fn {
            Some(f) => f(ctx),
            None => default_client_key(ctx),
        };
        format!("{}:{}:{}", self.descriptor.key_prefix, ctx.route().handler, client)
    }
}

/// Principal subject, else the first `x-forwarded-for` hop, else `anonymous`.
pub fn default_client_key(ctx: &RequestContext) -> String {
    if let Some(principal) = ctx.principal() {
        return format!("user:{}", principal.sub());
    }
    ctx.header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(|ip| format!("ip:{}", ip.trim()))
        .unwrap_or_else(|| "anonymous".to_string())
}

impl Middleware for RateLimitMiddleware {
    fn handle<'a>(
        &'a self,
        mut ctx: RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, RouteError>> {
        Box::pin(async move {
            let key = self.key_for(&ctx);
            let decision = self
                .store
                .hit(&key, self.descriptor.max, self.descriptor.window)
                .await;
            ctx.extensions_mut().insert(decision);

            if !decision.allowed {
                debug!(key = %key, "Rate limit exceeded");
                let mut resp = error_response(
                    StatusCode::TOO_MANY_REQUESTS,
                    "RATE_LIMITED",
                    self.descriptor.message.clone(),
                );
                let retry = decision.reset_after.as_secs_f64().ceil().max(1.0) as u64;
                resp.headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry));
                apply_headers(&mut resp, &decision);
                return Ok(resp);
            }

            let mut resp = next.run(ctx).await?;
            apply_headers(&mut resp, &decision);
            Ok(resp)
        })
    }
}

fn apply_headers(resp: &mut Response, decision: &RateLimitDecision) {
    let headers = resp.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
}
