use rivet_core::prelude::*;
use rivet_core::{AppBuilder, GuardEvaluator, RouteCompiler, TokenVerifier};
use rivet_security::SecurityError;
use rivet_test::{TestApp, TestJwt};
use serde_json::json;

struct Accounts;

impl Controller for Accounts {
    fn register(b: &mut ControllerBuilder<Self>) {
        b.controller("/accounts");
        b.get("/me", "me", Self::me)
            .private()
            .param(ParameterDescriptor::user(0));
        b.get("/search", "search", Self::search)
            .param(ParameterDescriptor::query(0, "q"));
        b.delete("/{id}", "close", Self::close)
            .require_permissions(["accounts:close"]);
    }
}

impl Accounts {
    async fn me(self: Arc<Self>, _ctx: RequestContext, args: Args) -> Result<Reply, AppError> {
        Reply::ok(args.value(0).cloned())
    }

    async fn search(self: Arc<Self>, _ctx: RequestContext, args: Args) -> Result<Reply, AppError> {
        Reply::ok(json!({ "q": args.value(0) }))
    }

    async fn close(self: Arc<Self>, _ctx: RequestContext, _args: Args) -> Result<Reply, AppError> {
        Reply::no_content()
    }
}

fn app(jwt: &TestJwt) -> TestApp {
    let verifier: Arc<dyn TokenVerifier> = jwt.verifier();
    let compiler = RouteCompiler::new(GuardEvaluator::new(Some(verifier)));
    TestApp::from_builder(AppBuilder::new(compiler).controller(Arc::new(Accounts)).unwrap())
}

#[tokio::test]
async fn minted_tokens_pass_the_verifier() {
    let jwt = TestJwt::new();
    let app = app(&jwt);

    let token = jwt.claims("u-1").roles(&["user"]).email("u1@example.com").build();
    let resp = app.get("/accounts/me").bearer(&token).send().await.assert_ok();
    assert_eq!(resp.data()["sub"], "u-1");
    assert_eq!(resp.data()["email"], "u1@example.com");

    app.get("/accounts/me")
        .bearer(&jwt.claims("u-1").expired().build())
        .send()
        .await
        .assert_unauthorized()
        .assert_error_code("TOKEN_EXPIRED");

    app.get("/accounts/me")
        .send()
        .await
        .assert_unauthorized()
        .assert_error_code("UNAUTHORIZED");
}

#[tokio::test]
async fn tokens_from_another_secret_are_rejected() {
    let jwt = TestJwt::new();
    let forged = TestJwt::with_secret("other").token("u-1", &["admin"]);
    assert!(matches!(
        jwt.verifier().validate(&forged),
        Err(SecurityError::InvalidToken(_))
    ));
    app(&jwt)
        .get("/accounts/me")
        .bearer(&forged)
        .send()
        .await
        .assert_error_code("INVALID_TOKEN");
}

#[tokio::test]
async fn authenticated_client_and_permissions() {
    let jwt = TestJwt::new();
    let closer = jwt.claims("ops").permissions(&["accounts:close"]).build();
    let app = app(&jwt).authenticated(closer);

    app.delete("/accounts/42").send().await.assert_no_content();
    app.delete("/accounts/42")
        .bearer(&jwt.token("u-2", &["user"]))
        .send()
        .await
        .assert_forbidden()
        .assert_error_code("FORBIDDEN");
    app.delete("/accounts/42")
        .anonymous()
        .send()
        .await
        .assert_unauthorized();
}

#[tokio::test]
async fn query_values_round_trip() {
    let app = app(&TestJwt::new());
    app.get("/accounts/search")
        .query("q", "rust & axum")
        .send()
        .await
        .assert_ok()
        .assert_json("/data/q", "rust & axum");
}
