use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::descriptor::{guard_names, GuardDescriptor, GuardOptions};
use crate::error::{AuthFailure, GuardError};
use crate::identity::TokenVerifier;
use crate::types::BoxFuture;

/// A named authorization check. Runs before the handler body.
///
/// Returns `Ok(())` to proceed or a typed [`GuardError`] to short-circuit.
/// Guards receive the context mutably so an authentication guard can store
/// the principal it verified for the guards that follow.
#[diagnostic::on_unimplemented(
    message = "`{Self}` does not implement `Guard`",
    label = "this type cannot be used as a guard",
    note = "implement `Guard` for your type and register it with `GuardEvaluator::with_guard`"
)]
pub trait Guard: Send + Sync + 'static {
    fn check<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        options: &'a GuardOptions,
    ) -> BoxFuture<'a, Result<(), GuardError>>;
}

/// What to do with a guard name that has no registered implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownGuardPolicy {
    /// Reject with 403.
    #[default]
    Deny,
    /// Let the request through.
    Allow,
}

impl FromStr for UnknownGuardPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deny" | "fail-closed" => Ok(UnknownGuardPolicy::Deny),
            "allow" | "fail-open" => Ok(UnknownGuardPolicy::Allow),
            other => Err(format!("unknown guard policy '{other}'")),
        }
    }
}

/// Evaluates ordered guard lists against a request.
///
/// Built-in guards: `auth`, `role`, `permission`. Additional named guards
/// can be registered with [`with_guard`](Self::with_guard).
pub struct GuardEvaluator {
    guards: HashMap<String, Arc<dyn Guard>>,
    unknown_policy: UnknownGuardPolicy,
}

impl GuardEvaluator {
    /// Evaluator with the built-in guards. `verifier` is used by the `auth`
    /// guard when no principal was populated upstream.
    pub fn new(verifier: Option<Arc<dyn TokenVerifier>>) -> Self {
        let mut guards: HashMap<String, Arc<dyn Guard>> = HashMap::new();
        guards.insert(guard_names::AUTH.to_string(), Arc::new(AuthGuard { verifier }));
        guards.insert(guard_names::ROLE.to_string(), Arc::new(RoleGuard));
        guards.insert(guard_names::PERMISSION.to_string(), Arc::new(PermissionGuard));
        Self {
            guards,
            unknown_policy: UnknownGuardPolicy::default(),
        }
    }

    pub fn with_guard(mut self, name: impl Into<String>, guard: impl Guard) -> Self {
        self.guards.insert(name.into(), Arc::new(guard));
        self
    }

    pub fn with_unknown_policy(mut self, policy: UnknownGuardPolicy) -> Self {
        self.unknown_policy = policy;
        self
    }

    pub fn unknown_policy(&self) -> UnknownGuardPolicy {
        self.unknown_policy
    }

    /// Evaluate `guards` in declaration order, stopping at the first failure.
    pub async fn evaluate(
        &self,
        ctx: &mut RequestContext,
        guards: &[GuardDescriptor],
    ) -> Result<bool, GuardError> {
        for descriptor in guards {
            match self.guards.get(&descriptor.name) {
                Some(guard) => {
                    if let Err(err) = guard.check(ctx, &descriptor.options).await {
                        debug!(
                            guard = %descriptor.name,
                            handler = %ctx.route().handler,
                            error = %err,
                            "Guard rejected request"
                        );
                        return Err(err);
                    }
                }
                None => match self.unknown_policy {
                    UnknownGuardPolicy::Allow => {
                        warn!(guard = %descriptor.name, "Unknown guard, allowing request");
                    }
                    UnknownGuardPolicy::Deny => {
                        warn!(guard = %descriptor.name, "Unknown guard, denying request");
                        return Err(GuardError::Forbidden(format!(
                            "Unknown guard '{}'",
                            descriptor.name
                        )));
                    }
                },
            }
        }
        Ok(true)
    }
}

impl Default for GuardEvaluator {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Requires an authenticated principal, verifying the bearer token inline
/// when none was populated upstream.
pub struct AuthGuard {
    pub verifier: Option<Arc<dyn TokenVerifier>>,
}

impl Guard for AuthGuard {
    fn check<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        _options: &'a GuardOptions,
    ) -> BoxFuture<'a, Result<(), GuardError>> {
        Box::pin(async move {
            if ctx.is_authenticated() {
                return Ok(());
            }
            let token = ctx
                .bearer_token()
                .map_err(GuardError::Unauthorized)?
                .to_string();
            let Some(verifier) = &self.verifier else {
                warn!("Bearer token presented but no token verifier is configured");
                return Err(GuardError::Unauthorized(AuthFailure::Invalid));
            };
            match verifier.verify(&token).await {
                Ok(principal) => {
                    ctx.set_principal(principal);
                    Ok(())
                }
                Err(err) => {
                    debug!(error = %err, "Inline token verification failed");
                    Err(GuardError::Unauthorized(err.failure()))
                }
            }
        })
    }
}

/// Checks the principal's roles. ANY by default, ALL when `require_all`.
pub struct RoleGuard;

impl Guard for RoleGuard {
    fn check<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        options: &'a GuardOptions,
    ) -> BoxFuture<'a, Result<(), GuardError>> {
        let result = (|| {
            let principal = ctx
                .principal()
                .ok_or(GuardError::Unauthorized(AuthFailure::Missing))?;
            let require_all = options.require_all.unwrap_or(false);
            check_membership(principal.roles(), &options.roles, require_all)
                .map_err(|missing| GuardError::Forbidden(denial("roles", &missing, require_all)))
        })();
        Box::pin(std::future::ready(result))
    }
}

/// Checks the principal's permissions. ALL by default, ANY when
/// `require_all` is explicitly `false`.
pub struct PermissionGuard;

impl Guard for PermissionGuard {
    fn check<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        options: &'a GuardOptions,
    ) -> BoxFuture<'a, Result<(), GuardError>> {
        let result = (|| {
            let principal = ctx
                .principal()
                .ok_or(GuardError::Unauthorized(AuthFailure::Missing))?;
            let require_all = options.require_all.unwrap_or(true);
            check_membership(principal.permissions(), &options.permissions, require_all).map_err(
                |missing| GuardError::Forbidden(denial("permissions", &missing, require_all)),
            )
        })();
        Box::pin(std::future::ready(result))
    }
}

/// `Ok` when `held` satisfies `required`; otherwise the entries to report.
///
/// An empty requirement always passes.
pub fn check_membership(
    held: &[String],
    required: &[String],
    require_all: bool,
) -> Result<(), Vec<String>> {
    if required.is_empty() {
        return Ok(());
    }
    let has = |item: &String| held.iter().any(|h| h == item);
    if require_all {
        let missing: Vec<String> = required.iter().filter(|r| !has(r)).cloned().collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    } else if required.iter().any(has) {
        Ok(())
    } else {
        Err(required.to_vec())
    }
}

fn denial(kind: &str, entries: &[String], require_all: bool) -> String {
    if require_all {
        format!("Missing required {kind}: {}", entries.join(", "))
    } else {
        format!("Requires one of {kind}: {}", entries.join(", "))
    }
}
