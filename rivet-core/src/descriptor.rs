//! Plain records describing what a controller declared.
//!
//! Descriptors are produced by [`ControllerBuilder`](crate::controller::ControllerBuilder)
//! at registration time and read once by the [`RouteCompiler`](crate::compiler::RouteCompiler).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::http::Method;
use crate::validation::{GardeSchema, Schema};

/// Client platform a controller or route targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Mobile,
    Web,
    All,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Mobile => "mobile",
            Platform::Web => "web",
            Platform::All => "all",
        }
    }

    /// A route filter matches when it is `All` or equals the requested platform.
    pub fn matches(self, requested: Platform) -> bool {
        self == Platform::All || self == requested
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mobile" => Ok(Platform::Mobile),
            "web" => Ok(Platform::Web),
            "all" => Ok(Platform::All),
            other => Err(format!("unknown platform '{other}'")),
        }
    }
}

/// One declared route of a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub method: Method,
    pub path: String,
    pub handler_name: String,
    pub platform: Platform,
    pub is_private: bool,
}

/// Controller-level declaration plus its routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerDescriptor {
    pub name: String,
    pub base_path: String,
    pub platform: Platform,
    pub routes: Vec<RouteDescriptor>,
}

/// Where a handler argument comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSource {
    Body,
    Path,
    Query,
    Header,
    User,
    Request,
    Response,
    Next,
}

impl ParamSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamSource::Body => "body",
            ParamSource::Path => "path",
            ParamSource::Query => "query",
            ParamSource::Header => "header",
            ParamSource::User => "user",
            ParamSource::Request => "request",
            ParamSource::Response => "response",
            ParamSource::Next => "next",
        }
    }
}

/// Declares one positional handler argument.
#[derive(Clone)]
pub struct ParameterDescriptor {
    pub source: ParamSource,
    pub index: usize,
    pub name: Option<String>,
    pub schema: Option<Arc<dyn Schema>>,
}

impl ParameterDescriptor {
    pub fn new(source: ParamSource, index: usize) -> Self {
        Self {
            source,
            index,
            name: None,
            schema: None,
        }
    }

    pub fn body(index: usize) -> Self {
        Self::new(ParamSource::Body, index)
    }

    pub fn path(index: usize, name: impl Into<String>) -> Self {
        Self::new(ParamSource::Path, index).named(name)
    }

    /// All path captures as one object.
    pub fn path_all(index: usize) -> Self {
        Self::new(ParamSource::Path, index)
    }

    pub fn query(index: usize, name: impl Into<String>) -> Self {
        Self::new(ParamSource::Query, index).named(name)
    }

    pub fn query_all(index: usize) -> Self {
        Self::new(ParamSource::Query, index)
    }

    pub fn header(index: usize, name: impl Into<String>) -> Self {
        Self::new(ParamSource::Header, index).named(name)
    }

    pub fn headers_all(index: usize) -> Self {
        Self::new(ParamSource::Header, index)
    }

    pub fn user(index: usize) -> Self {
        Self::new(ParamSource::User, index)
    }

    pub fn request(index: usize) -> Self {
        Self::new(ParamSource::Request, index)
    }

    pub fn response(index: usize) -> Self {
        Self::new(ParamSource::Response, index)
    }

    pub fn next(index: usize) -> Self {
        Self::new(ParamSource::Next, index)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Schema) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    /// Validate this argument against a `garde`-annotated type.
    pub fn validate<T>(self) -> Self
    where
        GardeSchema<T>: Schema,
    {
        self.with_schema(GardeSchema::<T>::new())
    }

    /// Field name reported in validation violations.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(self.source.as_str())
    }
}

impl fmt::Debug for ParameterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterDescriptor")
            .field("source", &self.source)
            .field("index", &self.index)
            .field("name", &self.name)
            .field("validated", &self.schema.is_some())
            .finish()
    }
}

/// Well-known guard names.
pub mod guard_names {
    pub const AUTH: &str = "auth";
    pub const ROLE: &str = "role";
    pub const PERMISSION: &str = "permission";
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardOptions {
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    /// `None` lets each guard apply its own default.
    pub require_all: Option<bool>,
}

/// A named authorization check attached to a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardDescriptor {
    pub name: String,
    pub options: GuardOptions,
}

impl GuardDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: GuardOptions::default(),
        }
    }

    pub fn auth() -> Self {
        Self::new(guard_names::AUTH)
    }

    pub fn roles<I, R>(roles: I, require_all: bool) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            name: guard_names::ROLE.to_string(),
            options: GuardOptions {
                roles: roles.into_iter().map(Into::into).collect(),
                permissions: Vec::new(),
                require_all: Some(require_all),
            },
        }
    }

    pub fn permissions<I, P>(permissions: I, require_all: Option<bool>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            name: guard_names::PERMISSION.to_string(),
            options: GuardOptions {
                roles: Vec::new(),
                permissions: permissions.into_iter().map(Into::into).collect(),
                require_all,
            },
        }
    }
}

/// Derives the client part of a rate-limit key from the request.
pub type RateLimitKeyFn = Arc<dyn Fn(&RequestContext) -> String + Send + Sync>;

/// At most one per handler.
#[derive(Clone)]
pub struct RateLimitDescriptor {
    pub max: u64,
    pub window: Duration,
    pub key_prefix: String,
    pub message: String,
    pub key_fn: Option<RateLimitKeyFn>,
}

impl RateLimitDescriptor {
    pub fn new(max: u64, window: Duration) -> Self {
        Self {
            max,
            window,
            key_prefix: "rl".to_string(),
            message: "Too many requests, please try again later".to_string(),
            key_fn: None,
        }
    }

    pub fn per_ms(max: u64, window_ms: u64) -> Self {
        Self::new(max, Duration::from_millis(window_ms))
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn key_fn(mut self, f: impl Fn(&RequestContext) -> String + Send + Sync + 'static) -> Self {
        self.key_fn = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for RateLimitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitDescriptor")
            .field("max", &self.max)
            .field("window", &self.window)
            .field("key_prefix", &self.key_prefix)
            .field("message", &self.message)
            .field("custom_key", &self.key_fn.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDescriptor {
    pub ttl_seconds: u64,
    pub key: Option<String>,
}

impl CacheDescriptor {
    pub fn ttl(ttl_seconds: u64) -> Self {
        Self { ttl_seconds, key: None }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}
