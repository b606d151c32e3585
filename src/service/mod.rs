//! Resolve service
//!
//! Instance-scoped orchestration shared by the HTTP server and the CLI.

pub mod manager;

pub use manager::{CachedFormats, Resolution, ResolverService, ServiceStats};
