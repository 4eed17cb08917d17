use std::sync::Arc;

use tracing::{error, info};

use crate::compiler::{RegisteredRoute, RouteCompiler};
use crate::controller::Controller;
use crate::descriptor::Platform;
use crate::error::{AppError, CompileError};
use crate::http::{IntoResponse, Response, Router, Uri};

type LayerFn = Box<dyn FnOnce(Router) -> Router + Send>;

/// Assembles compiled controllers, raw routes and tower layers into one
/// router, then serves it.
///
/// ```ignore
/// AppBuilder::new(compiler)
///     .for_platform(config.platform()?)
///     .controller(container.resolve::<UserController>()?)?
///     .with_tracing()
///     .with_error_handling()
///     .serve("0.0.0.0:3000")
///     .await?;
/// ```
pub struct AppBuilder {
    compiler: RouteCompiler,
    platform: Option<Platform>,
    routers: Vec<Router>,
    routes: Vec<RegisteredRoute>,
    layers: Vec<LayerFn>,
}

impl AppBuilder {
    pub fn new(compiler: RouteCompiler) -> Self {
        Self {
            compiler,
            platform: None,
            routers: Vec::new(),
            routes: Vec::new(),
            layers: Vec::new(),
        }
    }

    /// Compile subsequent controllers for one platform only.
    pub fn for_platform(mut self, platform: Option<Platform>) -> Self {
        self.platform = platform;
        self
    }

    /// Compile `controller` and merge its routes. A method and path already
    /// registered by an earlier controller is a [`CompileError::DuplicateRoute`].
    pub fn controller<C: Controller>(mut self, controller: Arc<C>) -> Result<Self, CompileError> {
        let compiled = self.compiler.compile(controller, self.platform)?;
        if let Some(clash) = compiled
            .routes
            .iter()
            .find(|r| self.routes.iter().any(|e| e.method == r.method && e.path == r.path))
        {
            return Err(CompileError::DuplicateRoute {
                method: clash.method.clone(),
                path: clash.path.clone(),
            });
        }
        if compiled.descriptor.is_none() {
            info!(
                controller = crate::types::short_type_name::<C>(),
                "Type declares no controller metadata, nothing registered"
            );
        }
        self.routes.extend(compiled.routes.iter().cloned());
        self.routers.push(compiled.into_router());
        Ok(self)
    }

    /// Merge a raw router alongside controllers. Raw routes get the global
    /// layers but no guards or parameter resolution.
    pub fn merge_router(mut self, router: Router) -> Self {
        self.routers.push(router);
        self
    }

    /// Apply a router transformation at build time, in registration order.
    pub fn with_layer_fn<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Router) -> Router + Send + 'static,
    {
        self.layers.push(Box::new(f));
        self
    }

    /// Request/response tracing via tower-http.
    pub fn with_tracing(self) -> Self {
        self.with_layer_fn(|router| router.layer(crate::layers::default_trace()))
    }

    /// Panics become JSON 500 responses.
    pub fn with_error_handling(self) -> Self {
        self.with_layer_fn(|router| router.layer(crate::layers::catch_panic_layer()))
    }

    pub fn routes(&self) -> &[RegisteredRoute] {
        &self.routes
    }

    pub fn compiler(&self) -> &RouteCompiler {
        &self.compiler
    }

    /// Merge everything into a router with a JSON 404 fallback.
    pub fn build(self) -> Router {
        let mut app = self
            .routers
            .into_iter()
            .fold(Router::new(), Router::merge)
            .fallback(not_found);
        for layer in self.layers {
            app = layer(app);
        }
        app
    }

    /// Build and serve on `addr` until Ctrl-C or SIGTERM.
    pub async fn serve(self, addr: &str) -> Result<(), Box<dyn std::error::Error>> {
        let route_count = self.routes.len();
        let app = self.build();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(%addr, routes = route_count, "Rivet server listening");
        crate::http::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("Rivet server stopped");
        Ok(())
    }
}

async fn not_found(uri: Uri) -> Response {
    AppError::NotFound(format!("No route for {}", uri.path())).into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
