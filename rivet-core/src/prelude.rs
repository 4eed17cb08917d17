//! Everything a controller module usually needs.
//!
//! ```ignore
//! use rivet_core::prelude::*;
//!
//! pub struct HealthController;
//!
//! impl Controller for HealthController {
//!     fn register(b: &mut ControllerBuilder<Self>) {
//!         b.controller("/health");
//!         b.get("/", "status", Self::status);
//!     }
//! }
//!
//! impl HealthController {
//!     async fn status(self: Arc<Self>, _ctx: RequestContext, _args: Args) -> Result<Reply, AppError> {
//!         Reply::ok(serde_json::json!({ "up": true }))
//!     }
//! }
//! ```

pub use std::sync::Arc;

pub use crate::container::{Container, DiError, Dependency, Injectable, Lifetime, Resolved};
pub use crate::context::RequestContext;
pub use crate::controller::{Controller, ControllerBuilder, Reply};
pub use crate::descriptor::{
    CacheDescriptor, GuardDescriptor, ParameterDescriptor, Platform, RateLimitDescriptor,
};
pub use crate::error::{AppError, RouteError};
pub use crate::http::{HeaderValue, Method, Response, StatusCode};
pub use crate::middleware::{Middleware, Next};
pub use crate::params::Args;
pub use crate::types::BoxFuture;
pub use crate::validation::Validate;
