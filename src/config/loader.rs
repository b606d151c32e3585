//! Configuration discovery and layering
//!
//! Settings are built from defaults, then an optional TOML file, then the
//! environment. Command-line flags are applied by each front end on top.

use crate::{Result, config::Settings};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming a configuration file
pub const CONFIG_ENV: &str = "RESOLVER_CONFIG";

/// Builds validated [`Settings`] from file and environment
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn new() -> Self {
        Self
    }

    /// Config file to use when none was passed on the command line
    ///
    /// `RESOLVER_CONFIG` wins when it names an existing file; otherwise the
    /// per-user `ytdlp-stream-resolver/config.toml` is used if present.
    pub fn discover() -> Option<PathBuf> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        if let Some(path) = from_env.as_deref().filter(|p| !p.is_file()) {
            warn!("{} names a missing file: {}", CONFIG_ENV, path.display());
        }

        let per_user =
            dirs::config_dir().map(|d| d.join("ytdlp-stream-resolver").join("config.toml"));
        let found = from_env
            .into_iter()
            .chain(per_user)
            .find(|path| path.is_file());
        match &found {
            Some(path) => debug!("Configuration file: {}", path.display()),
            None => debug!("No configuration file, using defaults and environment"),
        }
        found
    }

    /// Layer `config_file` (if it exists) and the environment over defaults
    pub fn load(&self, config_file: Option<&Path>) -> Result<Settings> {
        let base = match config_file {
            Some(path) if path.is_file() => {
                info!("Loading configuration from {}", path.display());
                Settings::from_file(path)?
            }
            Some(path) => {
                warn!("Configuration file {} not found, using defaults", path.display());
                Settings::default()
            }
            None => Settings::default(),
        };

        let settings = base.merge_with_env()?;
        settings.validate()?;

        debug!(
            clients = ?settings.resolver.clients,
            timeout_secs = settings.resolver.timeout_secs,
            merge_window_ms = settings.prober.merge_window_ms,
            "Configuration ready"
        );
        Ok(settings)
    }
}
