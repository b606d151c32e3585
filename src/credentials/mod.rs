//! Credential jar management
//!
//! Cookie jars are materialized once at startup and never change afterwards;
//! individual requests only decide whether an invocation may use the jar.

pub mod jar;
pub mod source;

pub use jar::{
    AUTH_TOKENS, BASIC_TOKENS, CredentialHealth, CredentialJar, CredentialManager,
    filter_domains, scan_tokens,
};
pub use source::CredentialSource;
