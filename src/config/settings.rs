//! Configuration settings
//!
//! Provides configuration loading from environment variables,
//! configuration files, and command-line overrides.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// Helper functions for serde defaults
fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "::".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(90)
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

fn default_clients() -> Vec<String> {
    ["tv", "android", "ios", "web"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_credential_clients() -> Vec<String> {
    ["tv", "tv_embedded", "web", "web_safari", "web_embedded", "mweb"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_resolver_timeout() -> u64 {
    45
}

fn default_socket_timeout() -> u64 {
    15
}

fn default_retries() -> u32 {
    1
}

fn default_stderr_tail_lines() -> usize {
    6
}

fn default_single_url_format() -> String {
    "best[ext=mp4][vcodec!=none][acodec!=none]/best".to_string()
}

fn default_min_concurrent() -> usize {
    2
}

fn default_max_concurrent_cap() -> usize {
    8
}

fn default_max_queue() -> usize {
    32
}

fn default_retry_after() -> u64 {
    5
}

fn default_merge_window_ms() -> u64 {
    1500
}

fn default_height_weight() -> u64 {
    1000
}

fn default_url_prefix_len() -> usize {
    120
}

fn default_formats_ttl() -> u64 {
    300
}

fn default_url_ttl_floor() -> u64 {
    30
}

fn default_url_ttl_ceiling() -> u64 {
    3 * 3600
}

fn default_url_safety_margin() -> u64 {
    300
}

fn default_url_default_ttl() -> u64 {
    600
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_allowed_domains() -> Vec<String> {
    ["youtube.com", "google.com", "googlevideo.com", "youtu.be"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_credentials_dir() -> PathBuf {
    std::env::temp_dir().join("ytdlp-stream-resolver")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// Duration serialization module
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Main configuration settings for the resolver service
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerSettings,
    /// External resolver process configuration
    #[serde(default)]
    pub resolver: ResolverSettings,
    /// Concurrency gate configuration
    #[serde(default)]
    pub gate: GateSettings,
    /// Multi-profile prober configuration
    #[serde(default)]
    pub prober: ProberSettings,
    /// Cache configuration
    #[serde(default)]
    pub cache: CacheSettings,
    /// Credential jar configuration
    #[serde(default)]
    pub credentials: CredentialSettings,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Overall request timeout
    #[serde(with = "duration_secs", default = "default_request_timeout")]
    pub timeout: Duration,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

/// External resolver process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Path or name of the yt-dlp executable
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,
    /// Client profiles in probing priority order
    #[serde(default = "default_clients")]
    pub clients: Vec<String>,
    /// Profiles permitted to run with the credential jar
    #[serde(default = "default_credential_clients")]
    pub credential_clients: Vec<String>,
    /// Hard wall-clock timeout per invocation, in seconds
    #[serde(default = "default_resolver_timeout")]
    pub timeout_secs: u64,
    /// `--socket-timeout` passed to the resolver
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_secs: u64,
    /// `--retries` passed to the resolver
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Number of trailing stderr lines kept in error messages
    #[serde(default = "default_stderr_tail_lines")]
    pub stderr_tail_lines: usize,
    /// Format selector used in single-URL mode
    #[serde(default = "default_single_url_format")]
    pub single_url_format: String,
}

/// Concurrency gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateSettings {
    /// Fixed concurrency ceiling; derived from CPU count when unset
    #[serde(default)]
    pub max_concurrent: Option<usize>,
    /// Lower clamp for the derived ceiling
    #[serde(default = "default_min_concurrent")]
    pub min_concurrent: usize,
    /// Upper clamp for the derived ceiling
    #[serde(default = "default_max_concurrent_cap")]
    pub max_concurrent_cap: usize,
    /// Queue length above which new requests are turned away
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,
    /// `Retry-After` advertised when turning requests away, in seconds
    #[serde(default = "default_retry_after")]
    pub retry_after_secs: u64,
}

/// Multi-profile prober configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProberSettings {
    /// Extra wait after the first success to gather late results
    #[serde(default = "default_merge_window_ms")]
    pub merge_window_ms: u64,
    /// Weight of the tallest video track in the winner score
    #[serde(default = "default_height_weight")]
    pub height_weight: u64,
    /// URL characters considered when deduplicating merged descriptors
    #[serde(default = "default_url_prefix_len")]
    pub url_prefix_len: usize,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// TTL for normalized format lists, in seconds
    #[serde(default = "default_formats_ttl")]
    pub formats_ttl_secs: u64,
    /// Minimum TTL for direct URLs
    #[serde(default = "default_url_ttl_floor")]
    pub url_ttl_floor_secs: u64,
    /// Maximum TTL for direct URLs
    #[serde(default = "default_url_ttl_ceiling")]
    pub url_ttl_ceiling_secs: u64,
    /// Subtracted from the URL's embedded expiry
    #[serde(default = "default_url_safety_margin")]
    pub url_safety_margin_secs: u64,
    /// TTL for direct URLs without a parseable expiry
    #[serde(default = "default_url_default_ttl")]
    pub url_default_ttl_secs: u64,
    /// Interval between expired-entry sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Credential jar configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSettings {
    /// Path to a Netscape cookie file
    #[serde(default)]
    pub cookies_path: Option<PathBuf>,
    /// Gzip-compressed, base64-encoded cookie file
    #[serde(default)]
    pub cookies_gz_b64: Option<String>,
    /// Base64-encoded cookie file
    #[serde(default)]
    pub cookies_b64: Option<String>,
    /// Drop cookie lines outside `allowed_domains`
    #[serde(default = "default_true")]
    pub filter_domains: bool,
    /// Domains retained when filtering
    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,
    /// Directory receiving the working copy of the jar
    #[serde(default = "default_credentials_dir")]
    pub output_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
    /// Log format (text, compact)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout: default_request_timeout(),
            enable_cors: default_true(),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            ytdlp_path: default_ytdlp_path(),
            clients: default_clients(),
            credential_clients: default_credential_clients(),
            timeout_secs: default_resolver_timeout(),
            socket_timeout_secs: default_socket_timeout(),
            retries: default_retries(),
            stderr_tail_lines: default_stderr_tail_lines(),
            single_url_format: default_single_url_format(),
        }
    }
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            max_concurrent: None,
            min_concurrent: default_min_concurrent(),
            max_concurrent_cap: default_max_concurrent_cap(),
            max_queue: default_max_queue(),
            retry_after_secs: default_retry_after(),
        }
    }
}

impl Default for ProberSettings {
    fn default() -> Self {
        Self {
            merge_window_ms: default_merge_window_ms(),
            height_weight: default_height_weight(),
            url_prefix_len: default_url_prefix_len(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            formats_ttl_secs: default_formats_ttl(),
            url_ttl_floor_secs: default_url_ttl_floor(),
            url_ttl_ceiling_secs: default_url_ttl_ceiling(),
            url_safety_margin_secs: default_url_safety_margin(),
            url_default_ttl_secs: default_url_default_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            cookies_path: None,
            cookies_gz_b64: None,
            cookies_b64: None,
            filter_domains: default_true(),
            allowed_domains: default_allowed_domains(),
            output_dir: default_credentials_dir(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            verbose: false,
            format: default_log_format(),
        }
    }
}

impl GateSettings {
    /// Effective concurrency ceiling
    ///
    /// An explicit `max_concurrent` wins; otherwise twice the logical core
    /// count, clamped to `[min_concurrent, max_concurrent_cap]`.
    pub fn effective_max_concurrent(&self) -> usize {
        match self.max_concurrent {
            Some(n) => n.max(1),
            None => (num_cpus::get() * 2).clamp(
                self.min_concurrent.max(1),
                self.max_concurrent_cap.max(self.min_concurrent.max(1)),
            ),
        }
    }
}

impl ProberSettings {
    /// Merge window as a duration
    pub fn merge_window(&self) -> Duration {
        Duration::from_millis(self.merge_window_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> crate::Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| crate::Error::config(name, &format!("Invalid value '{}': {}", raw, e))),
        Err(_) => Ok(None),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Settings {
    /// Create new settings with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from configuration file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::Error::config("file", &format!("Failed to read config file: {}", e))
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|e| {
            crate::Error::config("file", &format!("Failed to parse config file: {}", e))
        })?;

        Ok(settings)
    }

    /// Apply environment variable overrides
    ///
    /// Only variables that are present override; absent ones keep the
    /// current value.
    pub fn merge_with_env(mut self) -> crate::Result<Self> {
        if let Ok(host) = std::env::var("RESOLVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_env("RESOLVER_PORT")? {
            self.server.port = port;
        }

        if let Ok(path) = std::env::var("YTDLP_PATH") {
            self.resolver.ytdlp_path = path;
        }
        if let Some(timeout) = parse_env("RESOLVER_TIMEOUT")? {
            self.resolver.timeout_secs = timeout;
        }
        if let Ok(clients) = std::env::var("RESOLVER_CLIENTS") {
            self.resolver.clients = parse_list(&clients);
        }

        if let Some(max) = parse_env("MAX_CONCURRENT")? {
            self.gate.max_concurrent = Some(max);
        }
        if let Some(max_queue) = parse_env("MAX_QUEUE")? {
            self.gate.max_queue = max_queue;
        }

        if let Some(window) = parse_env("MERGE_WINDOW_MS")? {
            self.prober.merge_window_ms = window;
        }

        if let Some(ttl) = parse_env("FORMATS_TTL")? {
            self.cache.formats_ttl_secs = ttl;
        }

        if let Ok(path) = std::env::var("COOKIES_PATH") {
            self.credentials.cookies_path = Some(PathBuf::from(path));
        }
        if let Ok(blob) = std::env::var("COOKIES_GZ_B64") {
            self.credentials.cookies_gz_b64 = Some(blob);
        }
        if let Ok(blob) = std::env::var("COOKIES_B64") {
            self.credentials.cookies_b64 = Some(blob);
        }
        if let Some(filter) = parse_env("COOKIES_FILTER")? {
            self.credentials.filter_domains = filter;
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(verbose) = std::env::var("VERBOSE") {
            self.logging.verbose = verbose.parse().unwrap_or(false);
        }

        Ok(self)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.port == 0 {
            return Err(crate::Error::config(
                "port",
                "Invalid server port: cannot be 0",
            ));
        }

        if self.resolver.ytdlp_path.trim().is_empty() {
            return Err(crate::Error::config(
                "ytdlp_path",
                "Resolver executable path cannot be empty",
            ));
        }

        if self.resolver.clients.is_empty() {
            return Err(crate::Error::config(
                "clients",
                "At least one client profile is required",
            ));
        }

        for client in &self.resolver.clients {
            if crate::types::ClientProfile::new(client).is_err() {
                return Err(crate::Error::config(
                    "clients",
                    &format!("Invalid client profile name: {}", client),
                ));
            }
        }

        if self.resolver.timeout_secs == 0 {
            return Err(crate::Error::config(
                "timeout_secs",
                "Resolver timeout cannot be 0",
            ));
        }

        if self.gate.min_concurrent > self.gate.max_concurrent_cap {
            return Err(crate::Error::config(
                "min_concurrent",
                "min_concurrent cannot exceed max_concurrent_cap",
            ));
        }

        if self.cache.url_ttl_floor_secs > self.cache.url_ttl_ceiling_secs {
            return Err(crate::Error::config(
                "url_ttl_floor_secs",
                "URL TTL floor cannot exceed the ceiling",
            ));
        }

        // Validate log level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(crate::Error::config(
                    "log_level",
                    &format!("Invalid log level: {}", self.logging.level),
                ));
            }
        }

        match self.logging.format.to_lowercase().as_str() {
            "text" | "compact" => {}
            _ => {
                return Err(crate::Error::config(
                    "log_format",
                    format!("Invalid log format: {}", self.logging.format),
                ));
            }
        }

        Ok(())
    }
}
