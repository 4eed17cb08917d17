use jsonwebtoken::Algorithm;
use rivet_core::config::keys;
use rivet_core::{ConfigError, RivetConfig};

/// Security configuration for JWT verification.
#[derive(Clone)]
pub struct SecurityConfig {
    /// Shared HMAC secret used to verify signatures.
    pub secret: String,

    /// Expected issuer in the "iss" claim. Unchecked when `None`.
    pub issuer: Option<String>,

    /// Expected audience in the "aud" claim. Unchecked when `None`.
    pub audience: Option<String>,

    /// Allowed JWT algorithms. Tokens using other algorithms are rejected.
    /// Default: HS256 only.
    pub allowed_algorithms: Vec<Algorithm>,

    /// Clock skew tolerated on `exp`/`nbf`, in seconds (default: 0).
    pub leeway_secs: u64,
}

impl SecurityConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            issuer: None,
            audience: None,
            allowed_algorithms: vec![Algorithm::HS256],
            leeway_secs: 0,
        }
    }

    /// Read `security.jwt.secret`, `security.jwt.issuer` and
    /// `security.jwt.audience`. Only the secret is required.
    pub fn from_config(config: &RivetConfig) -> Result<Self, ConfigError> {
        let secret: String = config.get(keys::JWT_SECRET)?;
        if secret.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: keys::JWT_SECRET.to_string(),
                message: "secret must not be empty".into(),
            });
        }
        Ok(Self {
            issuer: config.get_or(keys::JWT_ISSUER, None)?,
            audience: config.get_or(keys::JWT_AUDIENCE, None)?,
            leeway_secs: config.get_or("security.jwt.leeway-secs", 0u64)?,
            ..Self::new(secret)
        })
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Set the allowed JWT algorithms. Empty lists will cause verification to fail.
    pub fn with_allowed_algorithms(
        mut self,
        algorithms: impl IntoIterator<Item = Algorithm>,
    ) -> Self {
        self.allowed_algorithms = algorithms.into_iter().collect();
        self
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("allowed_algorithms", &self.allowed_algorithms)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}
