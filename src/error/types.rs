//! Error types
//!
//! Two layers: [`ResolveError`] is the taxonomy of a single resolution attempt
//! and is `Clone` so that coalesced callers can share one outcome; [`Error`]
//! is the crate-wide error wrapping it together with configuration, I/O and
//! boundary failures.

use thiserror::Error;

/// Outcome classification of a resolver invocation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// The external process could not be started
    #[error("failed to start resolver: {reason}")]
    SpawnFailure {
        /// Why the spawn failed
        reason: String,
    },

    /// The process exceeded its wall-clock deadline and was killed
    #[error("resolver timed out after {duration_secs} seconds")]
    Timeout {
        /// Deadline that was exceeded
        duration_secs: u64,
    },

    /// Output could not be interpreted, or the process exited non-zero
    #[error("resolver produced invalid output: {details}")]
    InvalidOutput {
        /// Parse error or stderr tail
        details: String,
    },

    /// The process succeeded but nothing resolvable came back
    #[error("no usable result: {details}")]
    NoUsableResult {
        /// What was missing
        details: String,
    },

    /// Output matched an authorization-wall signature
    #[error("authorization required: {details}")]
    AuthRequired {
        /// stderr tail that matched
        details: String,
    },

    /// The process was killed because the service is shutting down
    #[error("resolver terminated during shutdown")]
    Terminated,
}

impl ResolveError {
    /// Create a spawn failure
    pub fn spawn_failure(reason: impl Into<String>) -> Self {
        Self::SpawnFailure {
            reason: reason.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(duration_secs: u64) -> Self {
        Self::Timeout { duration_secs }
    }

    /// Create an invalid output error
    pub fn invalid_output(details: impl Into<String>) -> Self {
        Self::InvalidOutput {
            details: details.into(),
        }
    }

    /// Create a no usable result error
    pub fn no_usable_result(details: impl Into<String>) -> Self {
        Self::NoUsableResult {
            details: details.into(),
        }
    }

    /// Create an authorization-wall error
    pub fn auth_required(details: impl Into<String>) -> Self {
        Self::AuthRequired {
            details: details.into(),
        }
    }

    /// Whether this is an authorization-wall failure
    pub fn is_auth_required(&self) -> bool {
        matches!(self, Self::AuthRequired { .. })
    }

    /// Stable machine-readable code exposed to clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::SpawnFailure { .. } => "SPAWN_FAILURE",
            Self::Timeout { .. } => "TIMEOUT",
            Self::InvalidOutput { .. } => "INVALID_OUTPUT",
            Self::NoUsableResult { .. } => "NO_USABLE_RESULT",
            Self::AuthRequired { .. } => "AUTH_REQUIRED",
            Self::Terminated => "TERMINATED",
        }
    }

    /// Rank used when several non-auth failures compete for the aggregate error
    pub fn specificity(&self) -> u8 {
        match self {
            Self::SpawnFailure { .. } => 4,
            Self::Timeout { .. } => 3,
            Self::InvalidOutput { .. } => 2,
            Self::NoUsableResult { .. } => 1,
            Self::Terminated => 0,
            Self::AuthRequired { .. } => 5,
        }
    }

    /// Whether a fresh request may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::InvalidOutput { .. } | Self::NoUsableResult { .. }
        )
    }
}

/// Main error type for the application
#[derive(Debug, Error)]
pub enum Error {
    /// Resolution failures
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// Base64 decoding errors
    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error in {field}: {message}")]
    Config {
        /// The configuration field that has an error
        field: String,
        /// Error message describing the issue
        message: String,
    },

    /// Credential jar decoding or persistence errors
    #[error("Credential error ({source_label}): {message}")]
    Credential {
        /// Provenance of the credential source
        source_label: String,
        /// What went wrong
        message: String,
    },

    /// Validation errors
    #[error("Validation failed for {field}: {message}")]
    Validation {
        /// The field that failed validation
        field: String,
        /// Error message describing the validation failure
        message: String,
        /// The invalid value that caused the validation to fail
        value: Option<String>,
    },

    /// Queue above its ceiling, the caller should retry later
    #[error("Resolver queue is full ({queued} waiting), retry later")]
    Overloaded {
        /// Queue length observed at admission
        queued: usize,
        /// Seconds to wait before retrying
        retry_after: u64,
    },

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal issue
        message: String,
    },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a credential error
    pub fn credential(source_label: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Credential {
            source_label: source_label.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
            value: None,
        }
    }

    /// Create a validation error carrying the rejected value
    pub fn validation_with_value(
        field: impl Into<String>,
        message: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
            value: Some(value.into()),
        }
    }

    /// Create an overload error
    pub fn overloaded(queued: usize, retry_after: u64) -> Self {
        Self::Overloaded {
            queued,
            retry_after,
        }
    }

    /// Create a new server error
    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Resolve(e) => e.is_retryable(),
            Error::Overloaded { .. } => true,
            _ => false,
        }
    }

    /// Stable client-facing code, if the error has one
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Error::Resolve(e) => Some(e.code()),
            Error::Validation { .. } => Some("INVALID_REQUEST"),
            Error::Overloaded { .. } => Some("OVERLOADED"),
            _ => None,
        }
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            Error::Resolve(..) => "resolve",
            Error::Json(..) => "json",
            Error::Toml(..) => "toml",
            Error::Url(..) => "url",
            Error::Base64(..) => "base64",
            Error::Io(..) => "io",
            Error::Config { .. } => "config",
            Error::Credential { .. } => "credential",
            Error::Validation { .. } => "validation",
            Error::Overloaded { .. } => "overloaded",
            Error::Server(..) => "server",
            Error::Internal { .. } => "internal",
        }
    }
}
