//! Error formatting utilities
//!
//! Client-facing messages are deliberately short: resolver stderr is logged,
//! never echoed back over HTTP.

use crate::{Error, error::ResolveError};
use std::error::Error as StdError;

/// Format error for display, including nested causes
pub fn format_error(error: &Error) -> String {
    let formatted = match error {
        Error::Config { field, message } => {
            format!("Configuration error in {}: {}", field, message)
        }

        Error::Validation {
            field,
            message,
            value,
        } => match value {
            Some(val) => format!(
                "Validation failed for {} (value: '{}'): {}",
                field, val, message
            ),
            None => format!("Validation failed for {}: {}", field, message),
        },

        // For standard errors, use their Display implementation
        _ => error.to_string(),
    };

    let mut result = formatted;
    let mut source = error.source();

    while let Some(cause) = source {
        if !result.contains(&cause.to_string()) {
            result = format!("{} (caused by {})", result, cause);
        }
        source = cause.source();
    }

    result
}

/// Short diagnostic safe to return to HTTP clients
pub fn public_message(error: &Error) -> String {
    match error {
        Error::Resolve(e) => match e {
            ResolveError::SpawnFailure { .. } => "Resolver is unavailable".to_string(),
            ResolveError::Timeout { duration_secs } => {
                format!("Resolver timed out after {} seconds", duration_secs)
            }
            ResolveError::InvalidOutput { .. } => "Resolver returned an invalid response".to_string(),
            ResolveError::NoUsableResult { .. } => "No playable formats found".to_string(),
            ResolveError::AuthRequired { .. } => {
                "Authorization required: fresh credentials are needed for this video".to_string()
            }
            ResolveError::Terminated => "Service is shutting down".to_string(),
        },
        Error::Validation { .. } | Error::Overloaded { .. } => format_error(error),
        _ => "Internal server error".to_string(),
    }
}

/// Format error for logging with structured data
pub fn format_error_for_logging(error: &Error) -> serde_json::Value {
    let mut log_data = serde_json::json!({
        "message": format_error(error),
        "category": error.category(),
        "retryable": error.is_retryable(),
    });

    match error {
        Error::Resolve(ResolveError::Timeout { duration_secs }) => {
            log_data["timeout_duration"] = serde_json::Value::Number((*duration_secs).into());
        }
        Error::Overloaded {
            queued,
            retry_after,
        } => {
            log_data["queued"] = serde_json::Value::Number((*queued).into());
            log_data["retry_after"] = serde_json::Value::Number((*retry_after).into());
        }
        _ => {}
    }

    log_data
}
