use crate::http::{Json, Method, StatusCode};
use crate::http::{IntoResponse, Response};
use crate::validation::ValidationFailure;

/// Build the standard error envelope:
/// `{ "status": "error", "error": { "code": .., "message": .. } }`.
pub fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    let body = serde_json::json!({
        "status": "error",
        "error": {
            "code": code,
            "message": message.into(),
        }
    });
    (status, Json(body)).into_response()
}

/// Application-level error returned by handlers and services.
///
/// Anything that is not a guard or validation failure travels as an
/// `AppError` to the global error handler.
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    PayloadTooLarge(String),
    TooManyRequests(String),
    Internal(String),
    Custom {
        status: StatusCode,
        code: String,
        message: String,
    },
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Custom { status, .. } => *status,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::Conflict(_) => "CONFLICT",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::TooManyRequests(_) => "RATE_LIMITED",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Custom { code, .. } => code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::TooManyRequests(msg)
            | AppError::Internal(msg) => msg,
            AppError::Custom { message, .. } => message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error_response(self.status(), self.code(), self.message())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not Found: {msg}"),
            AppError::BadRequest(msg) => write!(f, "Bad Request: {msg}"),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            AppError::Conflict(msg) => write!(f, "Conflict: {msg}"),
            AppError::PayloadTooLarge(msg) => write!(f, "Payload Too Large: {msg}"),
            AppError::TooManyRequests(msg) => write!(f, "Too Many Requests: {msg}"),
            AppError::Internal(msg) => write!(f, "Internal Error: {msg}"),
            AppError::Custom { status, code, message } => {
                write!(f, "Custom Error ({status}, {code}): {message}")
            }
        }
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Generate `From<E> for AppError` implementations that map error types to
/// a specific `AppError` variant.
///
/// ```ignore
/// rivet_core::map_error! {
///     std::num::ParseIntError => BadRequest,
/// }
/// ```
#[macro_export]
macro_rules! map_error {
    ( $( $err_ty:ty => $variant:ident ),* $(,)? ) => {
        $(
            impl From<$err_ty> for $crate::AppError {
                fn from(err: $err_ty) -> Self {
                    $crate::AppError::$variant(err.to_string())
                }
            }
        )*
    };
}

// ── Guard errors ────────────────────────────────────────────────────────────

/// Why a request could not be authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No credential was presented.
    Missing,
    /// The token was well-formed but past its expiry.
    Expired,
    /// The credential could not be parsed as a token.
    Malformed,
    /// Signature, issuer, audience or another claim did not verify.
    Invalid,
}

impl AuthFailure {
    pub fn code(&self) -> &'static str {
        match self {
            AuthFailure::Missing => "UNAUTHORIZED",
            AuthFailure::Expired => "TOKEN_EXPIRED",
            AuthFailure::Malformed | AuthFailure::Invalid => "INVALID_TOKEN",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::Missing => "Authentication required",
            AuthFailure::Expired => "Token has expired",
            AuthFailure::Malformed => "Malformed token",
            AuthFailure::Invalid => "Invalid token",
        }
    }
}

/// Typed guard failure. Translated to 401/403 by the route error wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    Unauthorized(AuthFailure),
    Forbidden(String),
}

impl GuardError {
    pub fn status(&self) -> StatusCode {
        match self {
            GuardError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GuardError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl std::fmt::Display for GuardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardError::Unauthorized(reason) => write!(f, "Unauthorized: {}", reason.message()),
            GuardError::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
        }
    }
}

impl std::error::Error for GuardError {}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        match self {
            GuardError::Unauthorized(reason) => {
                error_response(StatusCode::UNAUTHORIZED, reason.code(), reason.message())
            }
            GuardError::Forbidden(msg) => error_response(StatusCode::FORBIDDEN, "FORBIDDEN", msg),
        }
    }
}

// ── Route chain errors ──────────────────────────────────────────────────────

/// Error type flowing out of a compiled middleware chain.
///
/// The compiler's error-translation wrapper turns `Guard` and `Validation`
/// into their wire shapes and hands `Handler` to the global error handler.
#[derive(Debug)]
pub enum RouteError {
    Guard(GuardError),
    Validation(ValidationFailure),
    Handler(AppError),
}

impl RouteError {
    /// Status the error translates to, before any custom error handler.
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::Guard(err) => err.status(),
            RouteError::Validation(_) => StatusCode::BAD_REQUEST,
            RouteError::Handler(err) => err.status(),
        }
    }
}

impl From<GuardError> for RouteError {
    fn from(err: GuardError) -> Self {
        RouteError::Guard(err)
    }
}

impl From<ValidationFailure> for RouteError {
    fn from(err: ValidationFailure) -> Self {
        RouteError::Validation(err)
    }
}

impl From<AppError> for RouteError {
    fn from(err: AppError) -> Self {
        RouteError::Handler(err)
    }
}

impl std::fmt::Display for RouteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteError::Guard(err) => write!(f, "{err}"),
            RouteError::Validation(err) => write!(f, "{err}"),
            RouteError::Handler(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RouteError {}

// ── Compile errors ──────────────────────────────────────────────────────────

/// Programmer errors detected while compiling a controller. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A declared route names a handler that was never bound.
    HandlerNotFound { controller: String, handler: String },
    /// Two parameters of one handler share a positional index.
    DuplicateParameterIndex { handler: String, index: usize },
    /// Parameter indices are not contiguous from 0.
    ParameterGap { handler: String, index: usize },
    /// Two routes resolve to the same method and path.
    DuplicateRoute { method: Method, path: String },
    /// The HTTP method cannot be routed by the engine.
    UnsupportedMethod { method: Method },
    /// A route declares a rate limit but the compiler has no store.
    MissingRateLimitStore { handler: String },
    /// A route declares caching but the compiler has no store.
    MissingCacheStore { handler: String },
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::HandlerNotFound { controller, handler } => {
                write!(f, "Route handler '{handler}' is not bound on controller '{controller}'")
            }
            CompileError::DuplicateParameterIndex { handler, index } => {
                write!(f, "Handler '{handler}' declares parameter index {index} twice")
            }
            CompileError::ParameterGap { handler, index } => {
                write!(f, "Handler '{handler}' has no parameter at index {index}")
            }
            CompileError::DuplicateRoute { method, path } => {
                write!(f, "Route {method} {path} is registered twice")
            }
            CompileError::UnsupportedMethod { method } => {
                write!(f, "HTTP method {method} cannot be routed")
            }
            CompileError::MissingRateLimitStore { handler } => {
                write!(f, "Handler '{handler}' is rate limited but no rate-limit store is configured")
            }
            CompileError::MissingCacheStore { handler } => {
                write!(f, "Handler '{handler}' is cached but no cache store is configured")
            }
        }
    }
}

impl std::error::Error for CompileError {}
