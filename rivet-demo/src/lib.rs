//! A small Rivet service: users and regions behind JWT guards, with
//! cached reads, rate-limited listings and a mobile-only geo search.

pub mod app;
pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use app::{build, Assembled, ResponseCache, StartupError};
