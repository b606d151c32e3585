//! HTTP server implementation
//!
//! This module contains the HTTP server implementation using Axum framework.

pub mod app;
pub mod handlers;

pub use app::{AppState, create_app};
pub use handlers::{ApiError, X_CACHE, X_RESOLVER_CLIENT};
