use std::sync::Arc;

use serde_json::Value;

use crate::error::AuthFailure;
use crate::types::BoxFuture;

/// Trait representing an authenticated principal (user, service account, etc.).
///
/// Guards only see principals through this trait, so any identity type can
/// be stored in the request context.
#[diagnostic::on_unimplemented(
    message = "`{Self}` does not implement `Identity`",
    label = "this type cannot be used as an identity",
    note = "implement `Identity` for your type, or use `AuthenticatedUser` from `rivet-security`"
)]
pub trait Identity: Send + Sync + 'static {
    /// Unique subject identifier (e.g. JWT "sub" claim).
    fn sub(&self) -> &str;

    /// Normalized role set.
    fn roles(&self) -> &[String];

    /// Normalized permission set.
    fn permissions(&self) -> &[String] {
        &[]
    }

    fn email(&self) -> Option<&str> {
        None
    }

    /// Raw token claims, if the identity came from a token.
    fn claims(&self) -> Option<&Value> {
        None
    }

    /// JSON view handed to handlers declaring a `user` parameter.
    fn to_json(&self) -> Value {
        serde_json::json!({
            "sub": self.sub(),
            "email": self.email(),
            "roles": self.roles(),
            "permissions": self.permissions(),
        })
    }
}

/// Shared handle to the principal stored on a request.
pub type Principal = Arc<dyn Identity>;

/// Token verification failure, classified for the 401 response code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Malformed(String),
    Invalid(String),
}

impl TokenError {
    pub fn failure(&self) -> AuthFailure {
        match self {
            TokenError::Expired => AuthFailure::Expired,
            TokenError::Malformed(_) => AuthFailure::Malformed,
            TokenError::Invalid(_) => AuthFailure::Invalid,
        }
    }
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Expired => write!(f, "token expired"),
            TokenError::Malformed(msg) => write!(f, "malformed token: {msg}"),
            TokenError::Invalid(msg) => write!(f, "invalid token: {msg}"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Verifies a bearer token and builds the principal it represents.
pub trait TokenVerifier: Send + Sync + 'static {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Principal, TokenError>>;
}

/// Extract a string array claim. Non-string entries are ignored.
pub fn string_list_claim(claims: &Value, key: &str) -> Option<Vec<String>> {
    claims.get(key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}

/// Normalize roles from token claims.
///
/// Prefers the plural `roles` array; a singular `role` string becomes a
/// one-element set when the plural form is absent.
pub fn roles_from_claims(claims: &Value) -> Vec<String> {
    if let Some(roles) = string_list_claim(claims, "roles") {
        return roles;
    }
    claims
        .get("role")
        .and_then(Value::as_str)
        .map(|role| vec![role.to_string()])
        .unwrap_or_default()
}

/// Normalize permissions from token claims (`permissions` array, or a
/// space-separated `scope` string).
pub fn permissions_from_claims(claims: &Value) -> Vec<String> {
    if let Some(perms) = string_list_claim(claims, "permissions") {
        return perms;
    }
    claims
        .get("scope")
        .and_then(Value::as_str)
        .map(|scope| scope.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}
