//! Turns controller metadata into axum routes.
//!
//! For each declared route the compiler resolves the bound handler, checks
//! its parameter list, assembles the middleware chain and registers a
//! dispatch closure with the router. Chain order, outermost first:
//!
//! 0. compiler-wide middleware ([`RouteCompiler::with_middleware`])
//! 1. class-level middleware
//! 2. method-level middleware
//! 3. rate limiting
//! 4. guards
//! 5. caching
//! 6. the endpoint (parameter resolution, handler, serialization)

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use axum::extract::rejection::RawPathParamsRejection;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tracing::{debug, error, info, info_span, Instrument};

use crate::cache::{CacheMiddleware, CacheStore};
use crate::context::{RequestContext, RouteInfo};
use crate::controller::{
    join_paths, Controller, ControllerBuilder, Handler, HandlerSlot, MiddlewareSlot,
};
use crate::descriptor::{
    guard_names, CacheDescriptor, ControllerDescriptor, GuardDescriptor, ParameterDescriptor,
    Platform, RateLimitDescriptor, RouteDescriptor,
};
use crate::error::{AppError, CompileError, RouteError};
use crate::guards::GuardEvaluator;
use crate::http::{
    IntoResponse, Method, MethodFilter, MethodRouter, RawPathParams, Request, Response,
    Router,
};
use crate::meta::Target;
use crate::middleware::{Chain, Endpoint, GuardMiddleware, Middleware};
use crate::params::ParameterResolver;
use crate::rate_limit::{RateLimitMiddleware, RateLimitStore};
use crate::types::BoxFuture;

/// Translates handler errors into responses. Receives the route that failed.
pub type ErrorHandler = Arc<dyn Fn(AppError, &RouteInfo) -> Response + Send + Sync>;

/// Default request body limit (2 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Logs server errors, then renders the error envelope.
pub fn default_error_handler(err: AppError, route: &RouteInfo) -> Response {
    if err.status().is_server_error() {
        error!(
            controller = %route.controller,
            handler = %route.handler,
            error = %err,
            "Handler failed"
        );
    }
    err.into_response()
}

/// One route that made it into the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredRoute {
    pub method: Method,
    pub path: String,
    pub handler: String,
    /// Number of middleware wrapping the endpoint.
    pub chain_len: usize,
}

/// Output of [`RouteCompiler::compile`].
pub struct CompiledController {
    /// `None` when the type declared no controller metadata.
    pub descriptor: Option<ControllerDescriptor>,
    pub routes: Vec<RegisteredRoute>,
    /// Routes filtered out by the platform selection.
    pub skipped: Vec<RouteDescriptor>,
    router: Router,
}

impl CompiledController {
    fn empty() -> Self {
        Self {
            descriptor: None,
            routes: Vec::new(),
            skipped: Vec::new(),
            router: Router::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

/// Compiles controllers against shared guard, rate-limit and cache backends.
#[derive(Clone)]
pub struct RouteCompiler {
    evaluator: Arc<GuardEvaluator>,
    resolver: ParameterResolver,
    rate_limits: Option<Arc<dyn RateLimitStore>>,
    cache: Option<Arc<dyn CacheStore>>,
    middleware: Vec<Arc<dyn Middleware>>,
    error_handler: ErrorHandler,
    body_limit: usize,
}

impl RouteCompiler {
    pub fn new(evaluator: GuardEvaluator) -> Self {
        Self {
            evaluator: Arc::new(evaluator),
            resolver: ParameterResolver::new(),
            rate_limits: None,
            cache: None,
            middleware: Vec::new(),
            error_handler: Arc::new(default_error_handler),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_rate_limit_store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.rate_limits = Some(store);
        self
    }

    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(store);
        self
    }

    /// Middleware wrapped around every compiled route, outside class
    /// middleware. Runs in registration order.
    pub fn with_middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn with_error_handler(
        mut self,
        handler: impl Fn(AppError, &RouteInfo) -> Response + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn evaluator(&self) -> &Arc<GuardEvaluator> {
        &self.evaluator
    }

    /// Compile `controller`'s routes.
    ///
    /// With `platform = Some(p)`, only routes whose platform filter matches
    /// `p` are registered; `None` registers everything. A type without
    /// controller metadata compiles to an empty result.
    pub fn compile<C: Controller>(
        &self,
        controller: Arc<C>,
        platform: Option<Platform>,
    ) -> Result<CompiledController, CompileError> {
        let mut builder = ControllerBuilder::<C>::new();
        C::register(&mut builder);
        self.compile_builder(controller, &builder, platform)
    }

    /// Compile from an already-populated builder.
    pub fn compile_builder<C: Send + Sync + 'static>(
        &self,
        controller: Arc<C>,
        builder: &ControllerBuilder<C>,
        platform: Option<Platform>,
    ) -> Result<CompiledController, CompileError> {
        let Some(descriptor) = builder.descriptor() else {
            debug!(controller = builder.name(), "No controller metadata, skipping");
            return Ok(CompiledController::empty());
        };
        let meta = builder.meta();

        let class_middleware: Vec<Arc<dyn Middleware>> = meta
            .list::<MiddlewareSlot>(&Target::Controller)
            .iter()
            .map(|slot| slot.0.clone())
            .collect();

        let mut seen = HashSet::new();
        let mut routers: BTreeMap<String, MethodRouter> = BTreeMap::new();
        let mut routes = Vec::new();
        let mut skipped = Vec::new();

        for route in &descriptor.routes {
            if let Some(requested) = platform {
                if !route.platform.matches(requested) {
                    debug!(
                        controller = %descriptor.name,
                        handler = %route.handler_name,
                        route_platform = %route.platform,
                        requested = %requested,
                        "Route skipped for platform"
                    );
                    skipped.push(route.clone());
                    continue;
                }
            }

            let path = join_paths(&[descriptor.base_path.as_str(), route.path.as_str()]);
            if !seen.insert((route.method.clone(), path.clone())) {
                return Err(CompileError::DuplicateRoute {
                    method: route.method.clone(),
                    path,
                });
            }
            let filter = MethodFilter::try_from(route.method.clone()).map_err(|_| {
                CompileError::UnsupportedMethod {
                    method: route.method.clone(),
                }
            })?;

            let target = Target::handler(route.handler_name.as_str());
            let handler = meta
                .get::<HandlerSlot<C>>(&target)
                .map(|slot| slot.0.clone())
                .ok_or_else(|| CompileError::HandlerNotFound {
                    controller: descriptor.name.clone(),
                    handler: route.handler_name.clone(),
                })?;
            let params = meta.list::<ParameterDescriptor>(&target).to_vec();
            check_parameters(&route.handler_name, &params)?;

            let mut chain: Vec<Arc<dyn Middleware>> = self.middleware.clone();
            chain.extend(class_middleware.iter().cloned());
            chain.extend(
                meta.list::<MiddlewareSlot>(&target)
                    .iter()
                    .map(|slot| slot.0.clone()),
            );
            if let Some(limit) = meta.get::<RateLimitDescriptor>(&target) {
                let store = self.rate_limits.clone().ok_or_else(|| {
                    CompileError::MissingRateLimitStore {
                        handler: route.handler_name.clone(),
                    }
                })?;
                chain.push(Arc::new(RateLimitMiddleware::new(store, limit.clone())));
            }
            let guards = route_guards(route, meta.list::<GuardDescriptor>(&target));
            if !guards.is_empty() {
                chain.push(Arc::new(GuardMiddleware::new(self.evaluator.clone(), guards)));
            }
            if let Some(cache) = meta.get::<CacheDescriptor>(&target) {
                let store = self.cache.clone().ok_or_else(|| CompileError::MissingCacheStore {
                    handler: route.handler_name.clone(),
                })?;
                chain.push(Arc::new(CacheMiddleware::new(store, cache.clone())));
            }

            let endpoint = HandlerEndpoint {
                controller: controller.clone(),
                handler,
                params,
                resolver: self.resolver.clone(),
            };
            let chain_len = chain.len();
            let compiled = Arc::new(CompiledRoute {
                info: Arc::new(RouteInfo::new(
                    descriptor.name.clone(),
                    route.handler_name.clone(),
                    route.method.clone(),
                    path.clone(),
                )),
                chain: Chain::new(chain, Arc::new(endpoint)),
                error_handler: self.error_handler.clone(),
                body_limit: self.body_limit,
            });

            let dispatch = move |params: Result<RawPathParams, RawPathParamsRejection>,
                                 request: Request| {
                let compiled = compiled.clone();
                async move {
                    match params {
                        Ok(params) => {
                            let params = params
                                .iter()
                                .map(|(k, v)| (k.to_string(), v.to_string()))
                                .collect();
                            compiled.dispatch(params, request).await
                        }
                        Err(rejection) => compiled.reject_path(rejection),
                    }
                }
            };
            let method_router = routers.remove(&path).unwrap_or_default();
            routers.insert(path.clone(), method_router.on(filter, dispatch));

            info!(
                controller = %descriptor.name,
                method = %route.method,
                path = %path,
                handler = %route.handler_name,
                "Registered route"
            );
            routes.push(RegisteredRoute {
                method: route.method.clone(),
                path,
                handler: route.handler_name.clone(),
                chain_len,
            });
        }

        let router = routers
            .into_iter()
            .fold(Router::new(), |router, (path, method_router)| {
                router.route(&path, method_router)
            });

        Ok(CompiledController {
            descriptor: Some(descriptor),
            routes,
            skipped,
            router,
        })
    }
}

/// Indices must be unique and contiguous from 0.
fn check_parameters(handler: &str, params: &[ParameterDescriptor]) -> Result<(), CompileError> {
    let mut indices: Vec<usize> = params.iter().map(|p| p.index).collect();
    indices.sort_unstable();
    for (expected, &index) in indices.iter().enumerate() {
        if index < expected {
            return Err(CompileError::DuplicateParameterIndex {
                handler: handler.to_string(),
                index,
            });
        }
        if index > expected {
            return Err(CompileError::ParameterGap {
                handler: handler.to_string(),
                index: expected,
            });
        }
    }
    Ok(())
}

/// Declared guards, with an implicit leading `auth` guard for private routes
/// and for routes checking roles or permissions, which need a principal.
fn route_guards(route: &RouteDescriptor, declared: &[GuardDescriptor]) -> Vec<GuardDescriptor> {
    let mut guards = Vec::with_capacity(declared.len() + 1);
    let needs_principal = route.is_private
        || declared
            .iter()
            .any(|g| g.name == guard_names::ROLE || g.name == guard_names::PERMISSION);
    if needs_principal && !declared.iter().any(|g| g.name == guard_names::AUTH) {
        guards.push(GuardDescriptor::auth());
    }
    guards.extend(declared.iter().cloned());
    guards
}

struct HandlerEndpoint<C> {
    controller: Arc<C>,
    handler: Arc<dyn Handler<C>>,
    params: Vec<ParameterDescriptor>,
    resolver: ParameterResolver,
}

impl<C: Send + Sync + 'static> Endpoint for HandlerEndpoint<C> {
    fn call(&self, mut ctx: RequestContext) -> BoxFuture<'_, Result<Response, RouteError>> {
        Box::pin(async move {
            let args = self.resolver.resolve(&self.params, &mut ctx).await?;
            let reply = self
                .handler
                .call(self.controller.clone(), ctx, args)
                .await?;
            Ok(reply.into_response())
        })
    }
}

struct CompiledRoute {
    info: Arc<RouteInfo>,
    chain: Chain,
    error_handler: ErrorHandler,
    body_limit: usize,
}

impl CompiledRoute {
    /// Captures that could not be decoded (e.g. invalid UTF-8) are a 400.
    fn reject_path(&self, rejection: RawPathParamsRejection) -> Response {
        debug!(handler = %self.info.handler, error = %rejection, "Rejected path captures");
        (self.error_handler)(
            AppError::BadRequest(format!("Invalid path parameters: {}", rejection.body_text())),
            &self.info,
        )
    }

    async fn dispatch(&self, params: Vec<(String, String)>, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        let body = match Limited::new(body, self.body_limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return (self.error_handler)(
                    AppError::PayloadTooLarge(format!(
                        "Request body exceeds {} bytes",
                        self.body_limit
                    )),
                    &self.info,
                )
            }
            Err(e) => {
                return (self.error_handler)(
                    AppError::BadRequest(format!("Failed to read request body: {e}")),
                    &self.info,
                )
            }
        };

        let ctx = RequestContext::new(parts.method, parts.uri, parts.headers, body)
            .with_path_params(params)
            .with_route(self.info.clone());
        let span = info_span!(
            "route",
            controller = %self.info.controller,
            handler = %self.info.handler,
            request_id = %ctx.request_id(),
        );

        match self.chain.run(ctx).instrument(span).await {
            Ok(resp) => resp,
            Err(RouteError::Guard(err)) => err.into_response(),
            Err(RouteError::Validation(failure)) => failure.into_response(),
            Err(RouteError::Handler(err)) => (self.error_handler)(err, &self.info),
        }
    }
}
