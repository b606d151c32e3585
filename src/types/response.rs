//! Response type definitions
//!
//! Normalized format listings plus the introspection and error bodies
//! returned by the HTTP service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{cache::CacheStats, credentials::CredentialHealth, resolver::GateStats};

/// Normalized format listing for one video
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResult {
    /// Video-bearing formats, ascending by height
    pub video_formats: Vec<VideoFormat>,
    /// Audio-only formats, descending by bitrate
    pub audio_formats: Vec<AudioFormat>,
}

impl NormalizedResult {
    /// True when neither list has entries
    pub fn is_empty(&self) -> bool {
        self.video_formats.is_empty() && self.audio_formats.is_empty()
    }
}

/// Video-bearing format entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoFormat {
    pub format_id: String,
    pub ext: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub protocol: String,
    pub has_audio: bool,
    /// Total bitrate in kbit/s
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcodec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acodec: Option<String>,
    pub url: String,
}

/// Audio-only format entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioFormat {
    pub format_id: String,
    pub ext: String,
    /// Bitrate in kbit/s
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<f64>,
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acodec: Option<String>,
    pub url: String,
}

/// Ping response for liveness checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    /// Server uptime in seconds
    pub server_uptime: u64,

    /// Server version
    pub version: String,
}

impl PingResponse {
    /// Create a new ping response
    pub fn new(server_uptime: u64, version: impl Into<String>) -> Self {
        Self {
            server_uptime,
            version: version.into(),
        }
    }
}

/// Introspection snapshot served by `/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub uptime_secs: u64,
    /// Resident set size, when the platform exposes it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_rss_bytes: Option<u64>,
    pub gate: GateStats,
    pub cache: CacheSummary,
    pub credentials: CredentialHealth,
}

/// Entry counts for both result caches
#[derive(Debug, Clone, Serialize)]
pub struct CacheSummary {
    pub formats: CacheStats,
    pub urls: CacheStats,
}

/// Error response for API errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short error message, never raw resolver output
    pub error: String,

    /// Machine-readable error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Error timestamp
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: None,
            timestamp: Utc::now(),
        }
    }

    /// Create error response with a code
    pub fn with_code(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: Some(code.into()),
            timestamp: Utc::now(),
        }
    }
}
