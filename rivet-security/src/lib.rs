pub mod config;
pub mod error;
pub mod identity;
pub mod jwt;
pub mod middleware;

// Re-export primary public types for convenience.
pub use config::SecurityConfig;
pub use error::SecurityError;
pub use identity::AuthenticatedUser;
pub use jwt::JwtVerifier;
pub use middleware::AuthMiddleware;

pub mod prelude {
    //! Re-exports of the most commonly used security types.
    pub use crate::{AuthMiddleware, AuthenticatedUser, JwtVerifier, SecurityConfig};
}
