use std::time::Duration;

use rivet_core::prelude::*;
use rivet_utils::{ActivityLog, Timed};

use crate::app::ResponseCache;
use crate::controllers::id_arg;
use crate::models::{CreateUserRequest, UpdateUserRequest};
use crate::services::UserService;

pub struct UserController {
    users: Arc<UserService>,
    cache: Arc<ResponseCache>,
}

impl Injectable for UserController {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::of::<UserService>(), Dependency::of::<ResponseCache>()]
    }

    fn construct(deps: &Resolved) -> Result<Self, DiError> {
        Ok(Self {
            users: deps.get()?,
            cache: deps.get()?,
        })
    }
}

impl Controller for UserController {
    fn register(b: &mut ControllerBuilder<Self>) {
        b.controller("/users")
            .version("v1")
            .middleware(ActivityLog::tracing())
            .middleware(Timed::threshold_warn(250));

        b.get("/", "list", Self::list).rate_limit(
            RateLimitDescriptor::new(100, Duration::from_secs(60))
                .key_prefix("users")
                .message("Too many user listings, slow down"),
        );
        b.get("/me", "me", Self::me)
            .private()
            .param(ParameterDescriptor::user(0));
        b.get("/{id}", "get", Self::get)
            .cache(CacheDescriptor::ttl(30))
            .param(ParameterDescriptor::path(0, "id"));
        b.post("/", "create", Self::create)
            .require_roles(["admin"])
            .param(ParameterDescriptor::body(0).validate::<CreateUserRequest>());
        b.put("/{id}", "update", Self::update)
            .require_roles(["admin"])
            .param(ParameterDescriptor::path(0, "id"))
            .param(ParameterDescriptor::body(1).validate::<UpdateUserRequest>());
        b.delete("/{id}", "delete", Self::delete)
            .require_roles(["admin"])
            .param(ParameterDescriptor::path(0, "id"));
    }
}

impl UserController {
    async fn list(self: Arc<Self>, _ctx: RequestContext, _args: Args) -> Result<Reply, AppError> {
        Reply::ok(self.users.list().await)
    }

    async fn me(self: Arc<Self>, _ctx: RequestContext, args: Args) -> Result<Reply, AppError> {
        Reply::ok(args.value(0))
    }

    async fn get(self: Arc<Self>, _ctx: RequestContext, args: Args) -> Result<Reply, AppError> {
        let id = id_arg(&args, 0)?;
        Reply::ok(self.users.get(id).await?)
    }

    async fn create(self: Arc<Self>, _ctx: RequestContext, args: Args) -> Result<Reply, AppError> {
        let req: CreateUserRequest = args.get(0)?;
        Reply::created(self.users.create(req).await?)
    }

    async fn update(self: Arc<Self>, ctx: RequestContext, args: Args) -> Result<Reply, AppError> {
        let id = id_arg(&args, 0)?;
        let user = self.users.update(id, args.get(1)?).await?;
        self.cache.evict_get(ctx.path()).await;
        Reply::ok(user)
    }

    async fn delete(self: Arc<Self>, ctx: RequestContext, args: Args) -> Result<Reply, AppError> {
        self.users.delete(id_arg(&args, 0)?).await?;
        self.cache.evict_get(ctx.path()).await;
        Reply::no_content()
    }
}
