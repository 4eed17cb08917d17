use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::descriptor::CacheDescriptor;
use crate::error::{AppError, RouteError};
use crate::http::{
    header, to_bytes, Body, Bytes, HeaderMap, HeaderName, HeaderValue, Method, Response,
    StatusCode,
};
use crate::middleware::{Middleware, Next};
use crate::types::BoxFuture;

pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Pluggable cache backend trait.
///
/// Implement this to back [`CacheDescriptor`] routes with Redis, Memcached,
/// etc. `rivet-cache` ships an in-memory implementation.
pub trait CacheStore: Send + Sync + 'static {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Bytes>>;
    fn set<'a>(&'a self, key: &'a str, value: Bytes, ttl: Duration) -> BoxFuture<'a, ()>;
    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()>;
    fn remove_by_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, ()>;
}

/// Whether a response was replayed from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

/// Replays cached `200 OK` JSON bodies for `GET` requests.
///
/// Sits inside the guard middleware, so only callers that passed the
/// route's guards ever see a cached body.
pub struct CacheMiddleware {
    store: Arc<dyn CacheStore>,
    descriptor: CacheDescriptor,
}

impl CacheMiddleware {
    pub fn new(store: Arc<dyn CacheStore>, descriptor: CacheDescriptor) -> Self {
        Self { store, descriptor }
    }

    /// `cache:{key}` when declared, else `cache:{METHOD} {path}?{query}`.
    pub fn key_for(&self, ctx: &RequestContext) -> String {
        match &self.descriptor.key {
            Some(key) => format!("cache:{key}"),
            None => {
                let target = ctx
                    .uri()
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or_else(|| ctx.path());
                format!("cache:{} {}", ctx.method(), target)
            }
        }
    }
}

impl Middleware for CacheMiddleware {
    fn handle<'a>(
        &'a self,
        mut ctx: RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, RouteError>> {
        Box::pin(async move {
            if *ctx.method() != Method::GET {
                return next.run(ctx).await;
            }

            let key = self.key_for(&ctx);
            if let Some(entry) = self.store.get(&key).await {
                match decode_entry(entry) {
                    Some((headers, body)) => {
                        debug!(key = %key, "Cache hit");
                        ctx.extensions_mut().insert(CacheStatus::Hit);
                        return Ok(cached_response(headers, body));
                    }
                    None => warn!(key = %key, "Unreadable cache entry, treating as miss"),
                }
            }
            ctx.extensions_mut().insert(CacheStatus::Miss);

            let resp = next.run(ctx).await?;
            if resp.status() != StatusCode::OK {
                return Ok(resp);
            }

            let (mut parts, body) = resp.into_parts();
            let bytes = to_bytes(body, usize::MAX).await.map_err(|e| {
                warn!(error = %e, "Failed to buffer response for caching");
                RouteError::Handler(AppError::Internal("Failed to read response body".into()))
            })?;
            self.store
                .set(
                    &key,
                    encode_entry(&parts.headers, &bytes),
                    Duration::from_secs(self.descriptor.ttl_seconds),
                )
                .await;
            parts
                .headers
                .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("MISS"));
            Ok(Response::from_parts(parts, Body::from(bytes)))
        })
    }
}

fn cached_response(headers: HeaderMap, body: Bytes) -> Response {
    let mut resp = Response::new(Body::from(body));
    *resp.headers_mut() = headers;
    resp.headers_mut()
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("HIT"));
    resp
}

/// Stored entry layout: `name: value\n` per response header, a blank line,
/// then the body. Header values cannot contain a newline.
fn encode_entry(headers: &HeaderMap, body: &Bytes) -> Bytes {
    let mut buf = BytesMut::with_capacity(body.len() + 64);
    for (name, value) in headers {
        if name == header::CONTENT_LENGTH || name.as_str() == CACHE_STATUS_HEADER {
            continue;
        }
        buf.put_slice(name.as_str().as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_u8(b'\n');
    }
    buf.put_u8(b'\n');
    buf.put_slice(body);
    buf.freeze()
}

fn decode_entry(entry: Bytes) -> Option<(HeaderMap, Bytes)> {
    let mut headers = HeaderMap::new();
    let mut pos = 0;
    loop {
        let end = pos + entry[pos..].iter().position(|&b| b == b'\n')?;
        if end == pos {
            return Some((headers, entry.slice(end + 1..)));
        }
        let line = &entry[pos..end];
        let split = line.windows(2).position(|w| w == b": ")?;
        let name = HeaderName::from_bytes(&line[..split]).ok()?;
        let value = HeaderValue::from_bytes(&line[split + 2..]).ok()?;
        headers.append(name, value);
        pos = end + 1;
    }
}
