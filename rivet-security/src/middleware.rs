use std::sync::Arc;

use rivet_core::http::{header, Response};
use rivet_core::{
    BoxFuture, GuardError, Middleware, Next, RequestContext, RouteError, TokenVerifier,
};
use tracing::debug;

/// Class-level authentication.
///
/// Verifies the bearer token when one is present and stores the principal
/// on the request context, so handlers and guards further down the chain
/// see the caller. Requests without an `Authorization` header pass through
/// anonymously; routes that need a caller declare an auth guard.
///
/// A token that fails verification is ignored by default, leaving the auth
/// guard to report the precise reason. [`strict`](Self::strict) rejects it
/// here instead.
pub struct AuthMiddleware {
    verifier: Arc<dyn TokenVerifier>,
    strict: bool,
}

impl AuthMiddleware {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            verifier,
            strict: false,
        }
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

impl Middleware for AuthMiddleware {
    fn handle<'a>(
        &'a self,
        mut ctx: RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Response, RouteError>> {
        Box::pin(async move {
            if ctx.is_authenticated() || !ctx.headers().contains_key(header::AUTHORIZATION) {
                return next.run(ctx).await;
            }

            let verified = match ctx.bearer_token() {
                Ok(token) => self.verifier.verify(token).await.map_err(|e| e.failure()),
                Err(failure) => Err(failure),
            };
            match verified {
                Ok(principal) => {
                    debug!(sub = principal.sub(), "Request authenticated");
                    ctx.set_principal(principal);
                }
                Err(failure) if self.strict => {
                    return Err(GuardError::Unauthorized(failure).into());
                }
                Err(failure) => {
                    debug!(reason = failure.message(), "Ignoring unverifiable credentials");
                }
            }
            next.run(ctx).await
        })
    }
}
