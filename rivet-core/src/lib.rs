pub mod builder;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod container;
pub mod context;
pub mod controller;
pub mod descriptor;
pub mod error;
pub mod guards;
pub mod http;
pub mod identity;
pub mod layers;
pub mod meta;
pub mod middleware;
pub mod params;
pub mod prelude;
pub mod rate_limit;
pub mod types;
pub mod validation;

pub use builder::AppBuilder;
pub use cache::{CacheMiddleware, CacheStatus, CacheStore, CACHE_STATUS_HEADER};
pub use compiler::{
    default_error_handler, CompiledController, ErrorHandler, RegisteredRoute, RouteCompiler,
};
pub use config::{ConfigError, ConfigValue, FromConfigValue, RivetConfig};
pub use container::{Container, DiError, Dependency, Injectable, Lifetime, Resolved, Resolver};
pub use context::{RequestContext, RouteInfo, REQUEST_ID_HEADER};
pub use controller::{Controller, ControllerBuilder, Handler, Reply, RouteBuilder};
pub use descriptor::{
    guard_names, CacheDescriptor, ControllerDescriptor, GuardDescriptor, GuardOptions,
    ParamSource, ParameterDescriptor, Platform, RateLimitDescriptor, RouteDescriptor,
};
pub use error::{error_response, AppError, AuthFailure, CompileError, GuardError, RouteError};
pub use guards::{Guard, GuardEvaluator, UnknownGuardPolicy};
pub use identity::{Identity, Principal, TokenError, TokenVerifier};
pub use layers::{catch_panic_layer, default_trace, init_tracing, init_tracing_with, LogFormat};
pub use meta::{MetaStore, Target};
pub use middleware::{Chain, Endpoint, GuardMiddleware, Middleware, Next};
pub use params::{Arg, Args, ParameterResolver};
pub use rate_limit::{RateLimitDecision, RateLimitMiddleware, RateLimitStore};
pub use types::BoxFuture;
pub use validation::{FieldViolation, GardeSchema, Schema, ValidationFailure};
