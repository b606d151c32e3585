//! Result caching
//!
//! Keyed TTL storage for resolved listings and URLs, with coalescing of
//! concurrent identical requests.

pub mod key;
pub mod store;
pub mod ttl;

pub use key::{CacheKey, CacheKind};
pub use store::{CacheStats, CacheStatus, ResultCache};
pub use ttl::{unix_now, url_expiry, url_ttl};
