//! Type definitions for the resolver service
//!
//! This module contains the main data structures used for requests and responses.

pub mod internal;
pub mod request;
pub mod response;

pub use internal::FormatDescriptor;
pub(crate) use internal::parse_document;
pub use request::{
    ClientProfile, ResolveOptions, ResolveQuery, VideoId, clamp_max_height, parse_flag,
};
pub use response::{
    AudioFormat, CacheSummary, ErrorResponse, HealthResponse, NormalizedResult, PingResponse,
    VideoFormat,
};
