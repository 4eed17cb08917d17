use rivet_core::{AppError, TokenError};

/// Why a bearer token was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// The token could not be decoded (bad segments, base64 or JSON).
    MalformedToken(String),

    /// The token decoded but its signature or algorithm was rejected.
    InvalidToken(String),

    /// The JWT token has expired.
    TokenExpired,

    /// Claim validation failed (issuer, audience, not-before).
    ValidationFailed(String),
}

impl std::fmt::Display for SecurityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityError::MalformedToken(msg) => write!(f, "Malformed token: {msg}"),
            SecurityError::InvalidToken(msg) => write!(f, "Invalid token: {msg}"),
            SecurityError::TokenExpired => write!(f, "Token expired"),
            SecurityError::ValidationFailed(msg) => write!(f, "Token validation failed: {msg}"),
        }
    }
}

impl std::error::Error for SecurityError {}

impl From<SecurityError> for TokenError {
    fn from(err: SecurityError) -> Self {
        match err {
            SecurityError::TokenExpired => TokenError::Expired,
            SecurityError::MalformedToken(msg) => TokenError::Malformed(msg),
            SecurityError::InvalidToken(msg) | SecurityError::ValidationFailed(msg) => {
                TokenError::Invalid(msg)
            }
        }
    }
}

impl From<SecurityError> for AppError {
    fn from(err: SecurityError) -> Self {
        AppError::Unauthorized(err.to_string())
    }
}
