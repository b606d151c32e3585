//! yt-dlp stream resolver
//!
//! Resolves short video identifiers into ranked playable stream locators by
//! orchestrating the external `yt-dlp` resolver: bounded concurrency,
//! parallel probing across client profiles, request coalescing and adaptive
//! TTL caching of both format listings and direct URLs.
//!
//! # Architecture
//!
//! - [`resolver`]: concurrency gate, process invocation and multi-profile probing
//! - [`formats`]: normalization and best-stream selection
//! - [`cache`]: coalescing result cache with URL-derived TTLs
//! - [`credentials`]: cookie jar materialization and health
//! - [`service`]: the orchestration shared by both front ends
//! - [`server`] and [`cli`]: HTTP and one-shot front ends
//!
//! # Usage
//!
//! ## HTTP Server Mode
//!
//! ```bash
//! stream-resolver server --port 8787 --host 0.0.0.0
//! ```
//!
//! ## One-shot Mode
//!
//! ```bash
//! stream-resolver --video-id dQw4w9WgXcQ
//! ```
//!
//! # Examples
//!
//! ```rust
//! use ytdlp_stream_resolver::{ResolverService, Settings};
//!
//! # fn example() -> anyhow::Result<()> {
//! let service = ResolverService::new(Settings::default())?;
//! assert_eq!(service.default_profiles()[0].as_str(), "tv");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod formats;
pub mod resolver;
pub mod server;
pub mod service;
pub mod types;
pub mod utils;

pub use config::{ConfigLoader, Settings};
pub use error::{Error, ResolveError, Result};
pub use service::ResolverService;
pub use types::{ErrorResponse, FormatDescriptor, NormalizedResult, PingResponse, VideoId};
