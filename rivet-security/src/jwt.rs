use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use rivet_core::{BoxFuture, Principal, TokenError, TokenVerifier};
use tracing::{debug, warn};

use crate::config::SecurityConfig;
use crate::error::SecurityError;
use crate::identity::AuthenticatedUser;

/// JWT verifier backed by a shared HMAC secret.
///
/// Validates signature, algorithm, `exp`/`nbf`, and, when configured, the
/// issuer and audience. As a [`TokenVerifier`] it produces
/// [`AuthenticatedUser`] principals for the guard evaluator and
/// [`AuthMiddleware`](crate::AuthMiddleware).
///
/// ```ignore
/// let verifier = Arc::new(JwtVerifier::new(SecurityConfig::from_config(&config)?));
/// let evaluator = GuardEvaluator::new(Some(verifier.clone()));
/// ```
pub struct JwtVerifier {
    key: DecodingKey,
    config: SecurityConfig,
}

impl JwtVerifier {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            config,
        }
    }

    /// Returns the security configuration.
    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    /// Validate a JWT token and return the raw claims.
    pub fn validate_claims(&self, token: &str) -> Result<serde_json::Value, SecurityError> {
        let header = decode_header(token)
            .map_err(|e| SecurityError::MalformedToken(format!("Failed to decode header: {e}")))?;

        if !self.config.allowed_algorithms.contains(&header.alg) {
            return Err(SecurityError::InvalidToken(format!(
                "Disallowed JWT algorithm: {:?}",
                header.alg
            )));
        }

        let mut validation = Validation::new(header.alg);
        validation.algorithms = self.config.allowed_algorithms.clone();
        validation.leeway = self.config.leeway_secs;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        if let Some(issuer) = &self.config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        let token_data =
            decode::<serde_json::Value>(token, &self.key, &validation).map_err(|e| {
                let err = match e.kind() {
                    ErrorKind::ExpiredSignature => SecurityError::TokenExpired,
                    ErrorKind::InvalidToken
                    | ErrorKind::Base64(_)
                    | ErrorKind::Json(_)
                    | ErrorKind::Utf8(_) => SecurityError::MalformedToken(e.to_string()),
                    ErrorKind::InvalidIssuer => {
                        SecurityError::ValidationFailed("Invalid issuer".into())
                    }
                    ErrorKind::InvalidAudience => {
                        SecurityError::ValidationFailed("Invalid audience".into())
                    }
                    ErrorKind::ImmatureSignature => {
                        SecurityError::ValidationFailed("Token not yet valid".into())
                    }
                    _ => SecurityError::InvalidToken(e.to_string()),
                };
                warn!(error = %err, "JWT validation failed");
                err
            })?;

        debug!(
            sub = token_data.claims.get("sub").and_then(|v| v.as_str()).unwrap_or("unknown"),
            "JWT validated"
        );
        Ok(token_data.claims)
    }

    /// Validate a JWT token and build the user it represents.
    pub fn validate(&self, token: &str) -> Result<AuthenticatedUser, SecurityError> {
        self.validate_claims(token).map(AuthenticatedUser::from_claims)
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<Principal, TokenError>> {
        let result = self
            .validate(token)
            .map(|user| Arc::new(user) as Principal)
            .map_err(TokenError::from);
        Box::pin(std::future::ready(result))
    }
}
