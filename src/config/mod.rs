//! Configuration management for the resolver service
//!
//! This module handles loading and managing configuration settings
//! for both HTTP server and one-shot modes.

pub mod loader;
pub mod settings;

pub use loader::ConfigLoader;
pub use settings::{
    CacheSettings, CredentialSettings, GateSettings, LoggingSettings, ProberSettings,
    ResolverSettings, ServerSettings, Settings,
};

// Serializes tests that mutate process environment variables
#[cfg(test)]
pub(crate) static ENV_TEST_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
