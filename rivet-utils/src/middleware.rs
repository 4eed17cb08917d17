use std::sync::Arc;
use std::time::Instant;

use rivet_core::http::Response;
use rivet_core::{BoxFuture, CacheStore, Middleware, Next, RequestContext, RouteError};

/// Log level for `Logged` and `Timed` middleware.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Log a message at the given level using `tracing`.
pub fn log_at_level(level: LogLevel, handler: &str, msg: &str) {
    match level {
        LogLevel::Trace => tracing::trace!(handler = handler, "{}", msg),
        LogLevel::Debug => tracing::debug!(handler = handler, "{}", msg),
        LogLevel::Info => tracing::info!(handler = handler, "{}", msg),
        LogLevel::Warn => tracing::warn!(handler = handler, "{}", msg),
        LogLevel::Error => tracing::error!(handler = handler, "{}", msg),
    }
}

fn handler_label(ctx: &RequestContext) -> String {
    let route = ctx.route();
    format!("{}::{}", route.controller, route.handler)
}

// ---------------------------------------------------------------------------
// Logged
// ---------------------------------------------------------------------------

/// Logs entry and exit of a handler at the specified level.
pub struct Logged {
    pub level: LogLevel,
}

impl Logged {
    pub fn new() -> Self {
        Logged { level: LogLevel::Info }
    }
    pub fn debug() -> Self {
        Logged { level: LogLevel::Debug }
    }
    pub fn trace() -> Self {
        Logged { level: LogLevel::Trace }
    }
    pub fn level(level: LogLevel) -> Self {
        Logged { level }
    }
}

impl Default for Logged {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for Logged {
    fn handle<'a>(
        &'a self,
        ctx: RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, RouteError>> {
        Box::pin(async move {
            let label = handler_label(&ctx);
            log_at_level(self.level, &label, "entering");
            let result = next.run(ctx).await;
            match &result {
                Ok(resp) => log_at_level(
                    self.level,
                    &label,
                    &format!("exiting status={}", resp.status().as_u16()),
                ),
                Err(err) => log_at_level(
                    self.level,
                    &label,
                    &format!("exiting status={} error={err}", err.status().as_u16()),
                ),
            }
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Timed
// ---------------------------------------------------------------------------

/// Measures and logs the latency of the rest of the chain.
///
/// If `threshold_ms` is set, only logs when execution exceeds the threshold.
pub struct Timed {
    pub level: LogLevel,
    pub threshold_ms: Option<u64>,
}

impl Timed {
    pub fn new() -> Self {
        Timed { level: LogLevel::Info, threshold_ms: None }
    }
    pub fn debug() -> Self {
        Timed { level: LogLevel::Debug, threshold_ms: None }
    }
    pub fn threshold(ms: u64) -> Self {
        Timed { level: LogLevel::Info, threshold_ms: Some(ms) }
    }
    pub fn threshold_warn(ms: u64) -> Self {
        Timed { level: LogLevel::Warn, threshold_ms: Some(ms) }
    }

    /// Whether an execution of `elapsed_ms` is worth logging.
    pub fn should_log(&self, elapsed_ms: u64) -> bool {
        self.threshold_ms.map_or(true, |threshold| elapsed_ms > threshold)
    }
}

impl Default for Timed {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for Timed {
    fn handle<'a>(
        &'a self,
        ctx: RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, RouteError>> {
        Box::pin(async move {
            let label = handler_label(&ctx);
            let start = Instant::now();
            let result = next.run(ctx).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            if self.should_log(elapsed_ms) {
                log_at_level(self.level, &label, &format!("elapsed_ms={elapsed_ms}"));
            }
            result
        })
    }
}

// ---------------------------------------------------------------------------
// CacheInvalidate
// ---------------------------------------------------------------------------

/// Clears cached responses under a key prefix after a successful write.
///
/// ```ignore
/// b.put("/{id}", "update", Self::update)
///     .middleware(CacheInvalidate::new(store.clone(), "cache:GET /users"));
/// ```
pub struct CacheInvalidate {
    store: Arc<dyn CacheStore>,
    prefix: String,
}

impl CacheInvalidate {
    pub fn new(store: Arc<dyn CacheStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }
}

impl Middleware for CacheInvalidate {
    fn handle<'a>(
        &'a self,
        ctx: RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, RouteError>> {
        Box::pin(async move {
            let resp = next.run(ctx).await?;
            if resp.status().is_success() {
                self.store.remove_by_prefix(&self.prefix).await;
                tracing::debug!(prefix = %self.prefix, "Invalidated cached responses");
            }
            Ok(resp)
        })
    }
}
