use rivet_core::identity::{permissions_from_claims, roles_from_claims};
use rivet_core::Identity;
use serde::{Deserialize, Serialize};

/// The principal a verified bearer token resolves to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// `sub`; empty when the token carries none.
    pub sub: String,

    pub email: Option<String>,

    /// Roles from `roles`, or the singular `role` claim.
    pub roles: Vec<String>,

    /// Permissions from `permissions`, or the space-separated `scope` claim.
    pub permissions: Vec<String>,

    /// Every claim of the token, verbatim.
    pub claims: serde_json::Value,
}

impl Identity for AuthenticatedUser {
    fn sub(&self) -> &str {
        &self.sub
    }
    fn roles(&self) -> &[String] {
        &self.roles
    }
    fn permissions(&self) -> &[String] {
        &self.permissions
    }
    fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
    fn claims(&self) -> Option<&serde_json::Value> {
        Some(&self.claims)
    }
}

impl AuthenticatedUser {
    /// Map verified claims; role and permission shapes are normalized by core.
    pub fn from_claims(claims: serde_json::Value) -> Self {
        let sub = claims
            .get("sub")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let email = claims
            .get("email")
            .and_then(|v| v.as_str())
            .map(String::from);

        AuthenticatedUser {
            sub,
            email,
            roles: roles_from_claims(&claims),
            permissions: permissions_from_claims(&claims),
            claims,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        roles.iter().any(|role| self.has_role(role))
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}
