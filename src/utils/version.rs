//! Version information utilities

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the current application version
pub fn get_version() -> &'static str {
    VERSION
}

/// Version with build provenance, logged once at startup
pub fn get_detailed_version() -> String {
    let git_hash = option_env!("GIT_HASH").unwrap_or("unknown");
    let build_date = option_env!("BUILD_DATE").unwrap_or("unknown");

    format!("{} ({}@{})", VERSION, git_hash, build_date)
}
