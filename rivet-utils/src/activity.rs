use std::sync::{Arc, Mutex};

use rivet_core::http::Response;
use rivet_core::{BoxFuture, Middleware, Next, RequestContext, RouteError};
use serde::Serialize;

/// One handled request, as seen by [`ActivityLog`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityRecord {
    pub request_id: String,
    pub user: Option<String>,
    pub controller: String,
    pub handler: String,
    pub method: String,
    pub path: String,
    pub status: u16,
}

/// Destination for activity records (database table, audit log, ...).
pub trait ActivitySink: Send + Sync + 'static {
    fn record(&self, record: ActivityRecord) -> BoxFuture<'_, ()>;
}

/// Writes each record as a structured `tracing` event on the `activity` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingActivitySink;

impl ActivitySink for TracingActivitySink {
    fn record(&self, record: ActivityRecord) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match serde_json::to_string(&record) {
                Ok(json) => tracing::info!(target: "activity", record = %json, "Request handled"),
                Err(e) => tracing::warn!(target: "activity", error = %e, "Unserializable activity record"),
            }
        })
    }
}

/// Keeps records in memory. Mostly useful in tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryActivitySink {
    records: Arc<Mutex<Vec<ActivityRecord>>>,
}

impl MemoryActivitySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ActivityRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ActivitySink for MemoryActivitySink {
    fn record(&self, record: ActivityRecord) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            match self.records.lock() {
                Ok(mut records) => records.push(record),
                Err(poisoned) => poisoned.into_inner().push(record),
            }
        })
    }
}

/// Records every request that reaches it, whatever the outcome.
///
/// The record is built from the explicit request context, so concurrent
/// requests on one controller instance never see each other's data. The
/// `user` is whoever was authenticated when the request reached this
/// middleware: place it after `AuthMiddleware` to capture callers.
pub struct ActivityLog {
    sink: Arc<dyn ActivitySink>,
}

impl ActivityLog {
    pub fn new(sink: Arc<dyn ActivitySink>) -> Self {
        Self { sink }
    }

    pub fn tracing() -> Self {
        Self::new(Arc::new(TracingActivitySink))
    }
}

impl Middleware for ActivityLog {
    fn handle<'a>(
        &'a self,
        ctx: RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, RouteError>> {
        Box::pin(async move {
            let route = ctx.route();
            let mut record = ActivityRecord {
                request_id: ctx.request_id().to_string(),
                user: ctx.principal().map(|p| p.sub().to_string()),
                controller: route.controller.clone(),
                handler: route.handler.clone(),
                method: ctx.method().to_string(),
                path: ctx.path().to_string(),
                status: 0,
            };

            let result = next.run(ctx).await;
            record.status = match &result {
                Ok(resp) => resp.status().as_u16(),
                Err(err) => err.status().as_u16(),
            };
            self.sink.record(record).await;
            result
        })
    }
}
