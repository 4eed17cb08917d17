use std::fmt;
use std::sync::Arc;

use rivet_cache::InMemoryStore;
use rivet_core::{
    AppBuilder, CacheStore, CompileError, ConfigError, Container, DiError, GuardEvaluator,
    RivetConfig, RouteCompiler, TokenVerifier,
};
use rivet_rate_limit::SlidingWindowLimiter;
use rivet_security::{AuthMiddleware, JwtVerifier, SecurityConfig};

use crate::controllers::region_controller::RegionController;
use crate::controllers::user_controller::UserController;
use crate::repositories::{RegionRepository, UserRepository};
use crate::services::{RegionService, UserService};

/// The response cache, injectable into controllers that invalidate entries.
pub struct ResponseCache(Arc<dyn CacheStore>);

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self(store)
    }

    /// Drop the cached `GET` responses for `path`, with or without a query.
    pub async fn evict_get(&self, path: &str) {
        let key = format!("cache:GET {path}");
        self.0.remove(&key).await;
        self.0.remove_by_prefix(&format!("{key}?")).await;
    }
}

/// A wired application plus the stores that need background upkeep.
pub struct Assembled {
    pub app: AppBuilder,
    pub limiter: SlidingWindowLimiter,
    pub cache: InMemoryStore,
}

#[derive(Debug)]
pub enum StartupError {
    Config(ConfigError),
    Di(DiError),
    Compile(CompileError),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::Config(e) => write!(f, "configuration error: {e}"),
            StartupError::Di(e) => write!(f, "dependency injection error: {e}"),
            StartupError::Compile(e) => write!(f, "route compilation error: {e}"),
        }
    }
}

impl std::error::Error for StartupError {}

impl From<ConfigError> for StartupError {
    fn from(e: ConfigError) -> Self {
        StartupError::Config(e)
    }
}

impl From<DiError> for StartupError {
    fn from(e: DiError) -> Self {
        StartupError::Di(e)
    }
}

impl From<CompileError> for StartupError {
    fn from(e: CompileError) -> Self {
        StartupError::Compile(e)
    }
}

/// Wire stores, guards and controllers from `config`.
pub fn build(config: &RivetConfig) -> Result<Assembled, StartupError> {
    let verifier: Arc<dyn TokenVerifier> =
        Arc::new(JwtVerifier::new(SecurityConfig::from_config(config)?));
    let evaluator = GuardEvaluator::new(Some(verifier.clone()))
        .with_unknown_policy(config.unknown_guard_policy()?);

    let cache = InMemoryStore::new();
    let limiter = SlidingWindowLimiter::new();
    let compiler = RouteCompiler::new(evaluator)
        .with_rate_limit_store(Arc::new(limiter.clone()))
        .with_cache_store(Arc::new(cache.clone()))
        .with_middleware(AuthMiddleware::new(verifier));

    let mut container = Container::new();
    container
        .register::<UserRepository>()
        .register::<RegionRepository>()
        .register::<UserService>()
        .register::<RegionService>()
        .register_singleton(ResponseCache::new(Arc::new(cache.clone())))
        .register::<UserController>()
        .register::<RegionController>();

    let app = AppBuilder::new(compiler)
        .for_platform(config.platform()?)
        .controller(container.resolve::<UserController>()?)?
        .controller(container.resolve::<RegionController>()?)?
        .with_tracing()
        .with_error_handling();

    Ok(Assembled {
        app,
        limiter,
        cache,
    })
}
