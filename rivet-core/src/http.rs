//! Re-exports of the HTTP engine primitives Rivet builds on.
//!
//! Downstream crates should import from here rather than depending on
//! `axum` directly, so the engine stays swappable in one place.

pub use axum::body::{to_bytes, Body};
pub use axum::extract::{RawPathParams, Request};
pub use axum::http::Request as HttpRequest;
pub use axum::http::{header, Extensions, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
pub use axum::response::{IntoResponse, Response};
pub use axum::routing::{MethodFilter, MethodRouter};
pub use axum::{serve, Json, Router};
pub use bytes::Bytes;
