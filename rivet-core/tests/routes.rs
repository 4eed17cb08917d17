mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use common::{send, verifier, StaticVerifier};
use rivet_core::http::{Bytes, IntoResponse, Method, StatusCode};
use rivet_core::prelude::*;
use rivet_core::{
    AppBuilder, BoxFuture, CacheStore, CompileError, GuardEvaluator, RateLimitDecision,
    RateLimitStore, RouteCompiler, TokenVerifier, UnknownGuardPolicy,
};
use serde::{Deserialize, Serialize};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

// ── Fixtures ────────────────────────────────────────────────────────────────

/// Populates the principal when a valid bearer token is present, otherwise
/// lets the request through anonymously.
struct OptionalAuth(Arc<StaticVerifier>);

impl Middleware for OptionalAuth {
    fn handle<'a>(
        &'a self,
        mut ctx: RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, RouteError>> {
        Box::pin(async move {
            let token = ctx.bearer_token().ok().map(str::to_string);
            if let Some(token) = token {
                if let Ok(principal) = self.0.verify(&token).await {
                    ctx.set_principal(principal);
                }
            }
            next.run(ctx).await
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Validate)]
struct NewItem {
    #[garde(length(min = 1, max = 20))]
    name: String,
}

#[derive(Default)]
struct ItemController {
    listed: AtomicUsize,
}

impl Controller for ItemController {
    fn register(b: &mut ControllerBuilder<Self>) {
        b.controller("/items")
            .version("v1")
            .middleware(OptionalAuth(verifier()));
        b.get("/", "list", Self::list);
        b.post("/", "create", Self::create)
            .require_roles(["admin"])
            .param(ParameterDescriptor::body(0));
        b.post("/{id}/echo", "echo", Self::echo)
            .param(ParameterDescriptor::path(0, "id"))
            .param(ParameterDescriptor::body(1));
        b.get("/nearby", "nearby", Self::nearby)
            .platform(Platform::Mobile);
        b.get("/secret", "secret", Self::secret).private();
        b.post("/validated", "validated", Self::create)
            .param(ParameterDescriptor::body(0).validate::<NewItem>());
        b.get("/boom", "boom", Self::boom);
    }
}

impl ItemController {
    async fn list(self: Arc<Self>, _ctx: RequestContext, _args: Args) -> Result<Reply, AppError> {
        self.listed.fetch_add(1, Ordering::SeqCst);
        Reply::ok(json!(["a", "b"]))
    }

    async fn create(self: Arc<Self>, _ctx: RequestContext, args: Args) -> Result<Reply, AppError> {
        let item: serde_json::Value = args.get(0)?;
        Reply::ok(item)
    }

    async fn echo(self: Arc<Self>, _ctx: RequestContext, args: Args) -> Result<Reply, AppError> {
        Reply::ok(json!([args.value(0), args.value(1)]))
    }

    async fn nearby(self: Arc<Self>, _ctx: RequestContext, _args: Args) -> Result<Reply, AppError> {
        Reply::ok(json!([]))
    }

    async fn secret(self: Arc<Self>, ctx: RequestContext, _args: Args) -> Result<Reply, AppError> {
        let sub = ctx.principal().map(|p| p.sub().to_string());
        Reply::ok(json!({ "sub": sub }))
    }

    async fn boom(self: Arc<Self>, _ctx: RequestContext, _args: Args) -> Result<Reply, AppError> {
        Err(AppError::Internal("database unavailable".into()))
    }
}

fn compiler() -> RouteCompiler {
    RouteCompiler::new(GuardEvaluator::new(Some(verifier())))
}

fn app(platform: Option<Platform>) -> rivet_core::http::Router {
    AppBuilder::new(compiler())
        .for_platform(platform)
        .controller(Arc::new(ItemController::default()))
        .unwrap()
        .build()
}

// ── Guards through the compiled route ───────────────────────────────────────

#[tokio::test]
async fn class_auth_with_admin_only_post() {
    let app = app(Some(Platform::Web));

    let open = send(&app, Method::GET, "/v1/items", None, None).await;
    assert_eq!(open.status, StatusCode::OK);
    assert_eq!(open.body, json!({ "status": "success", "data": ["a", "b"] }));

    let body = Some(json!({ "name": "x" }));
    let anonymous = send(&app, Method::POST, "/v1/items", None, body.clone()).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.body["error"]["code"], "UNAUTHORIZED");

    let user = send(&app, Method::POST, "/v1/items", Some("user-token"), body.clone()).await;
    assert_eq!(user.status, StatusCode::FORBIDDEN);
    assert_eq!(user.body["status"], "error");
    assert_eq!(user.body["error"]["code"], "FORBIDDEN");

    let admin = send(&app, Method::POST, "/v1/items", Some("admin-token"), body).await;
    assert_eq!(admin.status, StatusCode::OK);
    assert_eq!(admin.body["data"], json!({ "name": "x" }));
}

#[tokio::test]
async fn private_route_classifies_credentials() {
    let app = app(None);

    let missing = send(&app, Method::GET, "/v1/items/secret", None, None).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing.body["error"]["code"], "UNAUTHORIZED");

    let expired = send(&app, Method::GET, "/v1/items/secret", Some("expired"), None).await;
    assert_eq!(expired.status, StatusCode::UNAUTHORIZED);
    assert_eq!(expired.body["error"]["code"], "TOKEN_EXPIRED");

    let unknown = send(&app, Method::GET, "/v1/items/secret", Some("nope"), None).await;
    assert_eq!(unknown.body["error"]["code"], "INVALID_TOKEN");

    let ok = send(&app, Method::GET, "/v1/items/secret", Some("user-token"), None).await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body["data"]["sub"], "user-1");
}

// ── Parameters and validation ───────────────────────────────────────────────

#[tokio::test]
async fn path_and_body_arrive_in_declared_order() {
    let app = app(None);
    let resp = send(&app, Method::POST, "/v1/items/abc/echo", None, Some(json!({ "x": 1 }))).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"], json!(["abc", { "x": 1 }]));
}

#[tokio::test]
async fn oversized_body_is_413() {
    let app = AppBuilder::new(compiler().with_body_limit(16))
        .controller(Arc::new(ItemController::default()))
        .unwrap()
        .build();
    let body = json!({ "padding": "x".repeat(64) });
    let resp = send(&app, Method::POST, "/v1/items/abc/echo", None, Some(body)).await;
    assert_eq!(resp.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(resp.body["error"]["code"], "PAYLOAD_TOO_LARGE");

    let small = send(&app, Method::POST, "/v1/items/abc/echo", None, Some(json!(1))).await;
    assert_eq!(small.status, StatusCode::OK);
}

#[tokio::test]
async fn undecodable_path_capture_is_400() {
    let app = app(None);
    let resp = send(&app, Method::POST, "/v1/items/%FF/echo", None, Some(json!({}))).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn invalid_body_is_a_structured_400() {
    let app = app(None);

    let resp = send(&app, Method::POST, "/v1/items/validated", None, Some(json!({ "name": "" }))).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(resp.body["error"]["details"][0]["field"], "name");

    let wrong_type = send(&app, Method::POST, "/v1/items/validated", None, Some(json!({ "name": 5 }))).await;
    assert_eq!(wrong_type.status, StatusCode::BAD_REQUEST);
    assert_eq!(wrong_type.body["error"]["details"][0]["field"], "body");

    let ok = send(&app, Method::POST, "/v1/items/validated", None, Some(json!({ "name": "lamp" }))).await;
    assert_eq!(ok.status, StatusCode::OK);
}

// ── Platform filtering ──────────────────────────────────────────────────────

#[tokio::test]
async fn mobile_route_is_absent_from_web_build() {
    let web = app(Some(Platform::Web));
    let resp = send(&web, Method::GET, "/v1/items/nearby", None, None).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.body["error"]["code"], "NOT_FOUND");

    let mobile = app(Some(Platform::Mobile));
    let resp = send(&mobile, Method::GET, "/v1/items/nearby", None, None).await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[test]
fn skipped_routes_are_reported() {
    let compiled = compiler()
        .compile(Arc::new(ItemController::default()), Some(Platform::Web))
        .unwrap();
    assert_eq!(compiled.skipped.len(), 1);
    assert_eq!(compiled.skipped[0].handler_name, "nearby");
    assert!(compiled.routes.iter().all(|r| r.handler != "nearby"));
    assert_eq!(compiled.descriptor.unwrap().base_path, "/v1/items");
}

// ── Error translation ───────────────────────────────────────────────────────

#[tokio::test]
async fn handler_errors_go_to_the_error_handler() {
    let app = app(None);
    let resp = send(&app, Method::GET, "/v1/items/boom", None, None).await;
    assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.body["error"]["code"], "INTERNAL_ERROR");

    let custom = compiler().with_error_handler(|err, route| {
        AppError::Custom {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "UNAVAILABLE".into(),
            message: format!("{} failed: {}", route.handler, err.message()),
        }
        .into_response()
    });
    let app = AppBuilder::new(custom)
        .controller(Arc::new(ItemController::default()))
        .unwrap()
        .build();
    let resp = send(&app, Method::GET, "/v1/items/boom", None, None).await;
    assert_eq!(resp.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(resp.body["error"]["message"], "boom failed: database unavailable");
}

// ── Compile-time checks ─────────────────────────────────────────────────────

struct Undeclared;

impl Controller for Undeclared {
    fn register(b: &mut ControllerBuilder<Self>) {
        b.get("/", "list", |_: Arc<Self>, _: RequestContext, _: Args| async { Reply::no_content() });
    }
}

#[test]
fn types_without_controller_metadata_register_nothing() {
    let compiled = compiler().compile(Arc::new(Undeclared), None).unwrap();
    assert!(compiled.descriptor.is_none());
    assert!(compiled.is_empty());
}

struct Broken;

impl Controller for Broken {
    fn register(b: &mut ControllerBuilder<Self>) {
        b.controller("/broken");
        b.route(Method::GET, "/", "missing");
    }
}

#[test]
fn unbound_handler_is_a_compile_error() {
    let err = compiler().compile(Arc::new(Broken), None).err().unwrap();
    assert_eq!(
        err,
        CompileError::HandlerNotFound {
            controller: "Broken".into(),
            handler: "missing".into()
        }
    );
}

struct Gapped;

impl Controller for Gapped {
    fn register(b: &mut ControllerBuilder<Self>) {
        b.controller("/gapped");
        b.get("/{id}", "get", |_: Arc<Self>, _: RequestContext, _: Args| async { Reply::no_content() })
            .param(ParameterDescriptor::path(1, "id"));
    }
}

#[test]
fn parameter_gaps_fail_compilation() {
    let err = compiler().compile(Arc::new(Gapped), None).err().unwrap();
    assert!(matches!(err, CompileError::ParameterGap { index: 0, .. }));
}

struct NoStore;

impl Controller for NoStore {
    fn register(b: &mut ControllerBuilder<Self>) {
        b.controller("/no-store");
        b.get("/", "list", |_: Arc<Self>, _: RequestContext, _: Args| async { Reply::no_content() })
            .rate_limit(RateLimitDescriptor::new(1, Duration::from_secs(1)));
    }
}

#[test]
fn rate_limited_routes_need_a_store() {
    let err = compiler().compile(Arc::new(NoStore), None).err().unwrap();
    assert_eq!(err, CompileError::MissingRateLimitStore { handler: "list".into() });
}

struct Twice;

impl Controller for Twice {
    fn register(b: &mut ControllerBuilder<Self>) {
        b.controller("/twice");
        b.get("/", "a", |_: Arc<Self>, _: RequestContext, _: Args| async { Reply::no_content() });
        b.get("", "b", |_: Arc<Self>, _: RequestContext, _: Args| async { Reply::no_content() });
    }
}

#[test]
fn duplicate_routes_fail_compilation() {
    let err = compiler().compile(Arc::new(Twice), None).err().unwrap();
    assert!(matches!(err, CompileError::DuplicateRoute { .. }));
}

struct Shadow;

impl Controller for Shadow {
    fn register(b: &mut ControllerBuilder<Self>) {
        b.controller("/v1/items");
        b.get("/", "list", |_: Arc<Self>, _: RequestContext, _: Args| async { Reply::no_content() });
        b.get("/other", "other", |_: Arc<Self>, _: RequestContext, _: Args| async { Reply::no_content() });
    }
}

#[test]
fn routes_clashing_across_controllers_fail_compilation() {
    let err = AppBuilder::new(compiler())
        .controller(Arc::new(ItemController::default()))
        .unwrap()
        .controller(Arc::new(Shadow))
        .err()
        .unwrap();
    assert_eq!(
        err,
        CompileError::DuplicateRoute { method: Method::GET, path: "/v1/items".into() }
    );
}

// ── Chain order and guard short-circuit ─────────────────────────────────────

/// Steps a request passed through, carried in the context extensions.
#[derive(Clone, Default)]
struct Trail(Vec<&'static str>);

fn mark(ctx: &mut RequestContext, step: &'static str) {
    let mut trail = ctx.extensions().get::<Trail>().cloned().unwrap_or_default();
    trail.0.push(step);
    ctx.extensions_mut().insert(trail);
}

struct Record(&'static str);

impl Middleware for Record {
    fn handle<'a>(
        &'a self,
        mut ctx: RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, RouteError>> {
        Box::pin(async move {
            mark(&mut ctx, self.0);
            next.run(ctx).await
        })
    }
}

struct CountingGuard {
    name: &'static str,
    pass: bool,
    calls: Arc<AtomicUsize>,
}

impl rivet_core::Guard for CountingGuard {
    fn check<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        _options: &'a rivet_core::GuardOptions,
    ) -> BoxFuture<'a, Result<(), rivet_core::GuardError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        mark(ctx, self.name);
        let result = if self.pass {
            Ok(())
        } else {
            Err(rivet_core::GuardError::Forbidden("nope".into()))
        };
        Box::pin(std::future::ready(result))
    }
}

struct Ordered;

impl Controller for Ordered {
    fn register(b: &mut ControllerBuilder<Self>) {
        b.controller("/ordered").middleware(Record("class"));
        b.get("/", "run", Self::run)
            .middleware(Record("method"))
            .guard(GuardDescriptor::new("allow"));
        b.get("/denied", "denied", Self::run)
            .guard(GuardDescriptor::new("deny"))
            .guard(GuardDescriptor::new("allow"));
        b.get("/mystery", "mystery", Self::run)
            .guard(GuardDescriptor::new("not-registered"));
    }
}

impl Ordered {
    async fn run(self: Arc<Self>, mut ctx: RequestContext, _args: Args) -> Result<Reply, AppError> {
        mark(&mut ctx, "handler");
        let trail = ctx.extensions().get::<Trail>().cloned().unwrap_or_default();
        Reply::ok(trail.0)
    }
}

struct OrderedApp {
    router: rivet_core::http::Router,
    allow_calls: Arc<AtomicUsize>,
    deny_calls: Arc<AtomicUsize>,
}

fn ordered_app(policy: UnknownGuardPolicy) -> OrderedApp {
    let allow_calls = Arc::new(AtomicUsize::new(0));
    let deny_calls = Arc::new(AtomicUsize::new(0));
    let evaluator = GuardEvaluator::new(None)
        .with_guard(
            "allow",
            CountingGuard {
                name: "guard",
                pass: true,
                calls: allow_calls.clone(),
            },
        )
        .with_guard(
            "deny",
            CountingGuard {
                name: "deny",
                pass: false,
                calls: deny_calls.clone(),
            },
        )
        .with_unknown_policy(policy);
    let router = RouteCompiler::new(evaluator)
        .compile(Arc::new(Ordered), None)
        .unwrap()
        .into_router();
    OrderedApp {
        router,
        allow_calls,
        deny_calls,
    }
}

#[tokio::test]
async fn chain_runs_class_then_method_then_guards_then_handler() {
    let app = ordered_app(UnknownGuardPolicy::Deny);
    let resp = send(&app.router, Method::GET, "/ordered", None, None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"], json!(["class", "method", "guard", "handler"]));
}

#[tokio::test]
async fn compiler_middleware_wraps_class_middleware() {
    let router = RouteCompiler::new(GuardEvaluator::new(None).with_guard(
        "allow",
        CountingGuard {
            name: "guard",
            pass: true,
            calls: Arc::new(AtomicUsize::new(0)),
        },
    ))
    .with_middleware(Record("app"))
    .compile(Arc::new(Ordered), None)
    .unwrap()
    .into_router();
    let resp = send(&router, Method::GET, "/ordered", None, None).await;
    assert_eq!(resp.body["data"], json!(["app", "class", "method", "guard", "handler"]));
}

#[tokio::test]
async fn first_failing_guard_stops_evaluation() {
    let app = ordered_app(UnknownGuardPolicy::Deny);
    let resp = send(&app.router, Method::GET, "/ordered/denied", None, None).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(app.deny_calls.load(Ordering::SeqCst), 1);
    assert_eq!(app.allow_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_guards_follow_the_configured_policy() {
    let deny = ordered_app(UnknownGuardPolicy::Deny);
    let resp = send(&deny.router, Method::GET, "/ordered/mystery", None, None).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.body["error"]["code"], "FORBIDDEN");

    let allow = ordered_app(UnknownGuardPolicy::Allow);
    let resp = send(&allow.router, Method::GET, "/ordered/mystery", None, None).await;
    assert_eq!(resp.status, StatusCode::OK);
}

// ── Rate limiting and caching through the chain ─────────────────────────────

#[derive(Default)]
struct FixedWindow {
    hits: Mutex<HashMap<String, u64>>,
}

impl RateLimitStore for FixedWindow {
    fn hit<'a>(&'a self, key: &'a str, max: u64, window: Duration) -> BoxFuture<'a, RateLimitDecision> {
        let mut hits = self.hits.lock().unwrap();
        let count = hits.entry(key.to_string()).or_insert(0);
        *count += 1;
        let decision = RateLimitDecision {
            allowed: *count <= max,
            limit: max,
            remaining: max.saturating_sub(*count),
            reset_after: window,
        };
        Box::pin(std::future::ready(decision))
    }
}

#[derive(Default)]
struct MapCache {
    entries: Mutex<HashMap<String, Bytes>>,
}

impl CacheStore for MapCache {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Option<Bytes>> {
        let hit = self.entries.lock().unwrap().get(key).cloned();
        Box::pin(std::future::ready(hit))
    }

    fn set<'a>(&'a self, key: &'a str, value: Bytes, _ttl: Duration) -> BoxFuture<'a, ()> {
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Box::pin(std::future::ready(()))
    }

    fn remove<'a>(&'a self, key: &'a str) -> BoxFuture<'a, ()> {
        self.entries.lock().unwrap().remove(key);
        Box::pin(std::future::ready(()))
    }

    fn remove_by_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, ()> {
        self.entries.lock().unwrap().retain(|k, _| !k.starts_with(prefix));
        Box::pin(std::future::ready(()))
    }
}

#[derive(Default)]
struct Limited {
    calls: AtomicUsize,
}

impl Controller for Limited {
    fn register(b: &mut ControllerBuilder<Self>) {
        b.controller("/limited");
        b.get("/", "list", Self::list)
            .rate_limit(RateLimitDescriptor::new(2, Duration::from_secs(60)).message("Slow down"));
        b.get("/cached", "cached", Self::list)
            .cache(CacheDescriptor::ttl(30));
        b.get("/raw", "raw", Self::raw).cache(CacheDescriptor::ttl(30));
    }
}

impl Limited {
    async fn list(self: Arc<Self>, _ctx: RequestContext, _args: Args) -> Result<Reply, AppError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Reply::ok(json!({ "call": n }))
    }

    async fn raw(self: Arc<Self>, _ctx: RequestContext, _args: Args) -> Result<Reply, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Reply::raw(([("content-type", "text/plain"), ("x-version", "7")], "pong"))
    }
}

fn limited_app(controller: Arc<Limited>) -> rivet_core::http::Router {
    compiler()
        .with_rate_limit_store(Arc::new(FixedWindow::default()))
        .with_cache_store(Arc::new(MapCache::default()))
        .compile(controller, None)
        .unwrap()
        .into_router()
}

#[tokio::test]
async fn rate_limit_rejects_with_429_and_headers() {
    let app = limited_app(Arc::new(Limited::default()));

    let first = send(&app, Method::GET, "/limited", None, None).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.headers["x-ratelimit-limit"], "2");
    assert_eq!(first.headers["x-ratelimit-remaining"], "1");

    send(&app, Method::GET, "/limited", None, None).await;
    let third = send(&app, Method::GET, "/limited", None, None).await;
    assert_eq!(third.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(third.body["error"]["code"], "RATE_LIMITED");
    assert_eq!(third.body["error"]["message"], "Slow down");
    assert_eq!(third.headers["retry-after"], "60");
}

#[tokio::test]
async fn cached_get_is_replayed_without_calling_the_handler() {
    let controller = Arc::new(Limited::default());
    let app = limited_app(controller.clone());

    let miss = send(&app, Method::GET, "/limited/cached", None, None).await;
    assert_eq!(miss.headers["x-cache"], "MISS");
    let hit = send(&app, Method::GET, "/limited/cached", None, None).await;
    assert_eq!(hit.headers["x-cache"], "HIT");
    assert_eq!(hit.body, miss.body);
    assert_eq!(controller.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cache_hits_keep_the_handler_headers() {
    let controller = Arc::new(Limited::default());
    let app = limited_app(controller.clone());

    for expected in ["MISS", "HIT"] {
        let resp = app
            .clone()
            .oneshot(
                rivet_core::http::HttpRequest::builder()
                    .uri("/limited/raw")
                    .body(rivet_core::http::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.headers()["x-cache"], expected);
        assert_eq!(resp.headers()["content-type"], "text/plain");
        assert_eq!(resp.headers()["x-version"], "7");
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"pong");
    }
    assert_eq!(controller.calls.load(Ordering::SeqCst), 1);
}
