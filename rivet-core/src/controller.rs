use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::context::RequestContext;
use crate::descriptor::{
    CacheDescriptor, ControllerDescriptor, GuardDescriptor, ParameterDescriptor, Platform,
    RateLimitDescriptor, RouteDescriptor,
};
use crate::error::AppError;
use crate::http::{IntoResponse, Json, Method, Response, StatusCode};
use crate::meta::{MetaStore, Target};
use crate::middleware::Middleware;
use crate::params::Args;
use crate::types::{short_type_name, BoxFuture};

/// A type that declares routes through a [`ControllerBuilder`].
///
/// Registration replaces decorator scanning: the compiler calls
/// `register` once, then reads the metadata it produced.
///
/// ```ignore
/// impl Controller for UserController {
///     fn register(b: &mut ControllerBuilder<Self>) {
///         b.controller("/users").platform(Platform::Web).version("v1");
///         b.get("/", "list", Self::list);
///         b.post("/", "create", Self::create)
///             .require_roles(["admin"])
///             .param(ParameterDescriptor::body(0).validate::<CreateUser>());
///     }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a controller",
    label = "this type does not register any routes",
    note = "implement `Controller::register` for your type"
)]
pub trait Controller: Send + Sync + Sized + 'static {
    fn register(builder: &mut ControllerBuilder<Self>);
}

/// Route handler bound to a controller instance.
///
/// Implemented for any `Fn(Arc<C>, RequestContext, Args) -> impl Future<Output = Result<Reply, AppError>>`,
/// so `async fn list(self: Arc<Self>, ctx: RequestContext, args: Args)`
/// methods can be passed as `Self::list`.
pub trait Handler<C>: Send + Sync + 'static {
    fn call(
        &self,
        controller: Arc<C>,
        ctx: RequestContext,
        args: Args,
    ) -> BoxFuture<'static, Result<Reply, AppError>>;
}

impl<C, F, Fut> Handler<C> for F
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, RequestContext, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Reply, AppError>> + Send + 'static,
{
    fn call(
        &self,
        controller: Arc<C>,
        ctx: RequestContext,
        args: Args,
    ) -> BoxFuture<'static, Result<Reply, AppError>> {
        Box::pin((self)(controller, ctx, args))
    }
}

/// What a handler returns. Serialized by the compiled route.
pub enum Reply {
    /// Wrapped as `{ "status": "success", "data": body }`.
    Json { status: StatusCode, body: Value },
    /// Status only, no body.
    Empty(StatusCode),
    /// Escape hatch: sent as-is.
    Raw(Response),
}

impl Reply {
    pub fn json(status: StatusCode, data: impl Serialize) -> Result<Self, AppError> {
        Ok(Reply::Json {
            status,
            body: serde_json::to_value(data)?,
        })
    }

    pub fn ok(data: impl Serialize) -> Result<Self, AppError> {
        Self::json(StatusCode::OK, data)
    }

    pub fn created(data: impl Serialize) -> Result<Self, AppError> {
        Self::json(StatusCode::CREATED, data)
    }

    pub fn no_content() -> Result<Self, AppError> {
        Ok(Reply::Empty(StatusCode::NO_CONTENT))
    }

    pub fn raw(response: impl IntoResponse) -> Result<Self, AppError> {
        Ok(Reply::Raw(response.into_response()))
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Json { status, body } => {
                let envelope = serde_json::json!({ "status": "success", "data": body });
                (status, Json(envelope)).into_response()
            }
            Reply::Empty(status) => status.into_response(),
            Reply::Raw(resp) => resp,
        }
    }
}

// ── Metadata slots ──────────────────────────────────────────────────────────

/// Declared path segment; its presence marks a type as a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerPath(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiVersion(pub String);

pub(crate) struct HandlerSlot<C>(pub(crate) Arc<dyn Handler<C>>);

#[derive(Clone)]
pub(crate) struct MiddlewareSlot(pub(crate) Arc<dyn Middleware>);

// ── Builder ─────────────────────────────────────────────────────────────────

/// Collects a controller's declarations into its [`MetaStore`].
pub struct ControllerBuilder<C> {
    name: String,
    meta: MetaStore,
    _controller: PhantomData<fn() -> C>,
}

impl<C: Send + Sync + 'static> ControllerBuilder<C> {
    pub fn new() -> Self {
        Self {
            name: short_type_name::<C>().to_string(),
            meta: MetaStore::new(),
            _controller: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare controller metadata with the given path segment.
    pub fn controller(&mut self, path: impl Into<String>) -> &mut Self {
        self.meta.set(Target::Controller, ControllerPath(path.into()));
        self
    }

    /// Platform tag; prefixes the base path unless `All`.
    pub fn platform(&mut self, platform: Platform) -> &mut Self {
        self.meta.set(Target::Controller, platform);
        self
    }

    pub fn version(&mut self, version: impl Into<String>) -> &mut Self {
        self.meta.set(Target::Controller, ApiVersion(version.into()));
        self
    }

    /// Class-level middleware, applied to every route, outermost first.
    pub fn middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.meta
            .append(Target::Controller, MiddlewareSlot(Arc::new(middleware)));
        self
    }

    /// Bind a handler under `name`.
    pub fn handle(&mut self, name: impl Into<String>, handler: impl Handler<C>) -> &mut Self {
        self.meta
            .set(Target::Handler(name.into()), HandlerSlot::<C>(Arc::new(handler)));
        self
    }

    /// Declare a route pointing at the handler named `handler_name`.
    pub fn route(
        &mut self,
        method: Method,
        path: impl Into<String>,
        handler_name: impl Into<String>,
    ) -> RouteBuilder<'_, C> {
        let handler_name = handler_name.into();
        self.meta.append(
            Target::Controller,
            RouteDescriptor {
                method,
                path: path.into(),
                handler_name: handler_name.clone(),
                platform: Platform::All,
                is_private: false,
            },
        );
        let index = self.meta.list::<RouteDescriptor>(&Target::Controller).len() - 1;
        RouteBuilder {
            builder: self,
            index,
            target: Target::Handler(handler_name),
        }
    }

    /// Declare a route and bind its handler in one step.
    pub fn on(
        &mut self,
        method: Method,
        path: impl Into<String>,
        name: impl Into<String>,
        handler: impl Handler<C>,
    ) -> RouteBuilder<'_, C> {
        let name = name.into();
        self.handle(name.clone(), handler);
        self.route(method, path, name)
    }

    pub fn get(&mut self, path: impl Into<String>, name: impl Into<String>, handler: impl Handler<C>) -> RouteBuilder<'_, C> {
        self.on(Method::GET, path, name, handler)
    }

    pub fn post(&mut self, path: impl Into<String>, name: impl Into<String>, handler: impl Handler<C>) -> RouteBuilder<'_, C> {
        self.on(Method::POST, path, name, handler)
    }

    pub fn put(&mut self, path: impl Into<String>, name: impl Into<String>, handler: impl Handler<C>) -> RouteBuilder<'_, C> {
        self.on(Method::PUT, path, name, handler)
    }

    pub fn patch(&mut self, path: impl Into<String>, name: impl Into<String>, handler: impl Handler<C>) -> RouteBuilder<'_, C> {
        self.on(Method::PATCH, path, name, handler)
    }

    pub fn delete(&mut self, path: impl Into<String>, name: impl Into<String>, handler: impl Handler<C>) -> RouteBuilder<'_, C> {
        self.on(Method::DELETE, path, name, handler)
    }

    pub fn meta(&self) -> &MetaStore {
        &self.meta
    }

    /// The controller descriptor, or `None` when `controller(..)` was never called.
    pub fn descriptor(&self) -> Option<ControllerDescriptor> {
        let path = self.meta.get::<ControllerPath>(&Target::Controller)?;
        let platform = self
            .meta
            .get::<Platform>(&Target::Controller)
            .copied()
            .unwrap_or(Platform::All);
        let version = self
            .meta
            .get::<ApiVersion>(&Target::Controller)
            .map(|v| v.0.as_str());
        Some(ControllerDescriptor {
            name: self.name.clone(),
            base_path: base_path(platform, version, &path.0),
            platform,
            routes: self.meta.list::<RouteDescriptor>(&Target::Controller).to_vec(),
        })
    }
}

impl<C: Send + Sync + 'static> Default for ControllerBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-route declarations. Handler-level metadata is keyed by handler name,
/// so routes sharing a handler share its guards and parameters.
pub struct RouteBuilder<'b, C> {
    builder: &'b mut ControllerBuilder<C>,
    index: usize,
    target: Target,
}

impl<'b, C: Send + Sync + 'static> RouteBuilder<'b, C> {
    fn descriptor_mut(&mut self) -> Option<&mut RouteDescriptor> {
        self.builder
            .meta
            .list_mut::<RouteDescriptor>(&Target::Controller)
            .and_then(|routes| routes.get_mut(self.index))
    }

    /// Restrict this route to one platform.
    pub fn platform(mut self, platform: Platform) -> Self {
        if let Some(route) = self.descriptor_mut() {
            route.platform = platform;
        }
        self
    }

    /// Require authentication (an implicit leading `auth` guard).
    pub fn private(mut self) -> Self {
        if let Some(route) = self.descriptor_mut() {
            route.is_private = true;
        }
        self
    }

    /// Method-level middleware, applied after class-level middleware.
    pub fn middleware(self, middleware: impl Middleware) -> Self {
        self.builder
            .meta
            .append(self.target.clone(), MiddlewareSlot(Arc::new(middleware)));
        self
    }

    pub fn guard(self, guard: GuardDescriptor) -> Self {
        self.builder.meta.append(self.target.clone(), guard);
        self
    }

    pub fn require_auth(self) -> Self {
        self.guard(GuardDescriptor::auth())
    }

    /// Any one of `roles`.
    pub fn require_roles<I, R>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.guard(GuardDescriptor::roles(roles, false))
    }

    /// Every one of `roles`.
    pub fn require_all_roles<I, R>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.guard(GuardDescriptor::roles(roles, true))
    }

    /// Every one of `permissions`.
    pub fn require_permissions<I, P>(self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.guard(GuardDescriptor::permissions(permissions, None))
    }

    /// Any one of `permissions`.
    pub fn require_any_permission<I, P>(self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.guard(GuardDescriptor::permissions(permissions, Some(false)))
    }

    pub fn rate_limit(self, rate_limit: RateLimitDescriptor) -> Self {
        self.builder.meta.set(self.target.clone(), rate_limit);
        self
    }

    pub fn cache(self, cache: CacheDescriptor) -> Self {
        self.builder.meta.set(self.target.clone(), cache);
        self
    }

    pub fn param(self, param: ParameterDescriptor) -> Self {
        self.builder.meta.append(self.target.clone(), param);
        self
    }
}

/// `/{platform}/{version}/{path}`; the platform segment is omitted for
/// `All`, the version segment when unset.
pub fn base_path(platform: Platform, version: Option<&str>, path: &str) -> String {
    let platform = match platform {
        Platform::All => None,
        other => Some(other.as_str()),
    };
    join_paths(&[platform.unwrap_or(""), version.unwrap_or(""), path])
}

/// Join path fragments, collapsing duplicate and trailing slashes.
pub fn join_paths(parts: &[&str]) -> String {
    let segments: Vec<&str> = parts
        .iter()
        .flat_map(|p| p.split('/'))
        .filter(|s| !s.is_empty())
        .collect();
    format!("/{}", segments.join("/"))
}
