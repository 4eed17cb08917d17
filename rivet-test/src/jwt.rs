use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rivet_security::{JwtVerifier, SecurityConfig};
use serde_json::{json, Map, Value};

/// Mints HS256 tokens that a matching [`JwtVerifier`] accepts.
///
/// ```ignore
/// let jwt = TestJwt::new();
/// let compiler = RouteCompiler::new(GuardEvaluator::new(Some(jwt.verifier())));
/// let admin = jwt.token("admin-1", &["admin"]);
/// let expired = jwt.claims("u1").expired().build();
/// ```
#[derive(Clone)]
pub struct TestJwt {
    secret: String,
    issuer: String,
    audience: String,
}

impl TestJwt {
    pub fn new() -> Self {
        Self::with_secret("rivet-test-secret-do-not-use-in-production")
    }

    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: "rivet-test".into(),
            audience: "rivet-test-api".into(),
        }
    }

    /// Configuration a verifier needs to accept these tokens.
    pub fn security_config(&self) -> SecurityConfig {
        SecurityConfig::new(self.secret.clone())
            .with_issuer(self.issuer.clone())
            .with_audience(self.audience.clone())
    }

    pub fn verifier(&self) -> Arc<JwtVerifier> {
        Arc::new(JwtVerifier::new(self.security_config()))
    }

    /// A one-hour token for `sub` with `roles`.
    pub fn token(&self, sub: &str, roles: &[&str]) -> String {
        self.claims(sub).roles(roles).build()
    }

    pub fn claims(&self, sub: &str) -> TokenBuilder<'_> {
        TokenBuilder {
            jwt: self,
            claims: Map::new(),
            expires_in: 3600,
        }
        .claim("sub", sub)
    }
}

impl Default for TestJwt {
    fn default() -> Self {
        Self::new()
    }
}

/// Claims for one token. `iss`, `aud` and `exp` are filled in on build.
pub struct TokenBuilder<'a> {
    jwt: &'a TestJwt,
    claims: Map<String, Value>,
    expires_in: i64,
}

impl<'a> TokenBuilder<'a> {
    pub fn roles(self, roles: &[&str]) -> Self {
        self.claim("roles", json!(roles))
    }

    pub fn permissions(self, permissions: &[&str]) -> Self {
        self.claim("permissions", json!(permissions))
    }

    pub fn email(self, email: &str) -> Self {
        self.claim("email", email)
    }

    pub fn claim(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.claims.insert(key.to_string(), value.into());
        self
    }

    /// Lifetime in seconds from now; negative values mint expired tokens.
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.expires_in = seconds;
        self
    }

    /// Expired an hour ago, well outside any leeway.
    pub fn expired(self) -> Self {
        self.expires_in(-3600)
    }

    pub fn build(self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before epoch")
            .as_secs() as i64;
        let mut claims = self.claims;
        claims
            .entry("iss")
            .or_insert_with(|| self.jwt.issuer.clone().into());
        claims
            .entry("aud")
            .or_insert_with(|| self.jwt.audience.clone().into());
        claims.insert("exp".into(), json!(now + self.expires_in));

        encode(
            &Header::new(Algorithm::HS256),
            &Value::Object(claims),
            &EncodingKey::from_secret(self.jwt.secret.as_bytes()),
        )
        .expect("failed to encode test token")
    }
}
