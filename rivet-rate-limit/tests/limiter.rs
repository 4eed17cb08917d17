use http_body_util::BodyExt;
use rivet_core::http::{Body, HttpRequest, Method, Router, StatusCode};
use rivet_core::prelude::*;
use rivet_core::{AppBuilder, GuardEvaluator, RouteCompiler};
use rivet_rate_limit::SlidingWindowLimiter;
use serde_json::{json, Value};
use tower::ServiceExt;

struct Search;

impl Controller for Search {
    fn register(b: &mut ControllerBuilder<Self>) {
        b.controller("/search");
        b.get("/", "search", Self::search).rate_limit(
            RateLimitDescriptor::new(2, std::time::Duration::from_secs(60))
                .key_prefix("search")
                .message("Search quota exhausted"),
        );
        b.get("/tenant", "by_tenant", Self::search).rate_limit(
            RateLimitDescriptor::per_ms(1, 60_000)
                .key_fn(|ctx| ctx.header("x-tenant").unwrap_or("none").to_string()),
        );
    }
}

impl Search {
    async fn search(self: Arc<Self>, _ctx: RequestContext, _args: Args) -> Result<Reply, AppError> {
        Reply::ok(json!([]))
    }
}

fn app(limiter: &SlidingWindowLimiter) -> Router {
    let compiler = RouteCompiler::new(GuardEvaluator::default())
        .with_rate_limit_store(Arc::new(limiter.clone()));
    AppBuilder::new(compiler)
        .controller(Arc::new(Search))
        .unwrap()
        .build()
}

async fn call(app: &Router, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, Response) {
    let mut req = HttpRequest::builder().method(Method::GET).uri(uri);
    for (name, value) in headers {
        req = req.header(*name, *value);
    }
    let resp = app
        .clone()
        .oneshot(req.body(Body::empty()).unwrap())
        .await
        .unwrap();
    (resp.status(), resp)
}

async fn json_body(resp: Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn third_request_in_the_window_is_rejected() {
    let limiter = SlidingWindowLimiter::new();
    let app = app(&limiter);
    let ip = [("x-forwarded-for", "10.0.0.1, 172.16.0.1")];

    let (status, first) = call(&app, "/search", &ip).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first.headers()["x-ratelimit-limit"], "2");
    assert_eq!(first.headers()["x-ratelimit-remaining"], "1");

    let (status, _) = call(&app, "/search", &ip).await;
    assert_eq!(status, StatusCode::OK);

    let (status, rejected) = call(&app, "/search", &ip).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(rejected.headers()["retry-after"], "60");
    let body = json_body(rejected).await;
    assert_eq!(body["error"]["code"], "RATE_LIMITED");
    assert_eq!(body["error"]["message"], "Search quota exhausted");

    // Another client has its own window.
    let (status, _) = call(&app, "/search", &[("x-forwarded-for", "10.0.0.2")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(limiter.tracked_keys(), 2);
}

#[tokio::test]
async fn custom_key_function_partitions_clients() {
    let limiter = SlidingWindowLimiter::new();
    let app = app(&limiter);

    let (status, _) = call(&app, "/search/tenant", &[("x-tenant", "acme")]).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app, "/search/tenant", &[("x-tenant", "acme")]).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let (status, _) = call(&app, "/search/tenant", &[("x-tenant", "globex")]).await;
    assert_eq!(status, StatusCode::OK);
}
