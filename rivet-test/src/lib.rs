mod app;
mod jwt;

pub use app::{TestApp, TestRequest, TestResponse};
pub use jwt::{TestJwt, TokenBuilder};
