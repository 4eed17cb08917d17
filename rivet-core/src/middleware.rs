use std::sync::Arc;

use crate::context::RequestContext;
use crate::descriptor::GuardDescriptor;
use crate::error::RouteError;
use crate::guards::GuardEvaluator;
use crate::http::Response;
use crate::types::BoxFuture;

/// A step of a route's middleware chain.
///
/// Each middleware wraps the rest of the chain: it may inspect or modify the
/// context, short-circuit with its own response or error, or call
/// [`Next::run`] and post-process the result.
///
/// ```ignore
/// struct Stamp;
///
/// impl Middleware for Stamp {
///     fn handle<'a>(&'a self, ctx: RequestContext, next: Next<'a>) -> BoxFuture<'a, Result<Response, RouteError>> {
///         Box::pin(async move {
///             let mut resp = next.run(ctx).await?;
///             resp.headers_mut().insert("x-stamp", HeaderValue::from_static("1"));
///             Ok(resp)
///         })
///     }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` does not implement `Middleware`",
    label = "this type cannot be used as route middleware",
    note = "implement `Middleware` for your type and attach it with `.middleware(..)`"
)]
pub trait Middleware: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        ctx: RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, RouteError>>;
}

/// Terminal step of a chain: parameter resolution, handler invocation and
/// response serialization.
pub trait Endpoint: Send + Sync + 'static {
    fn call(&self, ctx: RequestContext) -> BoxFuture<'_, Result<Response, RouteError>>;
}

/// The remainder of a chain, handed to each middleware.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Endpoint) -> Self {
        Self { chain, endpoint }
    }

    /// Run the next middleware, or the endpoint when the chain is exhausted.
    pub async fn run(self, ctx: RequestContext) -> Result<Response, RouteError> {
        match self.chain.split_first() {
            Some((first, rest)) => {
                first
                    .handle(
                        ctx,
                        Next {
                            chain: rest,
                            endpoint: self.endpoint,
                        },
                    )
                    .await
            }
            None => self.endpoint.call(ctx).await,
        }
    }
}

/// An ordered middleware chain ending in an endpoint.
#[derive(Clone)]
pub struct Chain {
    middleware: Vec<Arc<dyn Middleware>>,
    endpoint: Arc<dyn Endpoint>,
}

impl Chain {
    pub fn new(middleware: Vec<Arc<dyn Middleware>>, endpoint: Arc<dyn Endpoint>) -> Self {
        Self { middleware, endpoint }
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    pub async fn run(&self, ctx: RequestContext) -> Result<Response, RouteError> {
        Next::new(&self.middleware, self.endpoint.as_ref()).run(ctx).await
    }
}

/// Runs a handler's guard list before the rest of the chain.
pub struct GuardMiddleware {
    evaluator: Arc<GuardEvaluator>,
    guards: Vec<GuardDescriptor>,
}

impl GuardMiddleware {
    pub fn new(evaluator: Arc<GuardEvaluator>, guards: Vec<GuardDescriptor>) -> Self {
        Self { evaluator, guards }
    }
}

impl Middleware for GuardMiddleware {
    fn handle<'a>(
        &'a self,
        mut ctx: RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, RouteError>> {
        Box::pin(async move {
            self.evaluator.evaluate(&mut ctx, &self.guards).await?;
            next.run(ctx).await
        })
    }
}
