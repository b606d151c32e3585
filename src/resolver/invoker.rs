//! Resolver invocation
//!
//! Builds the argument list for one resolver run, executes it through the
//! concurrency gate and interprets the captured output. Runs that hit an
//! anti-automation wall while using credentials are repeated once without
//! them.

use async_trait::async_trait;
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ResolverSettings;
use crate::error::ResolveError;
use crate::resolver::{ConcurrencyGate, ProcessOutput, ProcessRunner};
use crate::types::{ClientProfile, FormatDescriptor, VideoId, parse_document};

static AUTH_WALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(sign in to confirm|confirm you.?re not a bot|use --cookies|cookies are no longer valid|login required|please sign in|not a bot)",
    )
    .unwrap()
});

/// What the resolver is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Full JSON document with the format list (`-J`)
    StructuredInfo,
    /// One direct media URL (`-f <selector> -g`)
    SingleUrl,
}

/// One planned resolver run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub video_id: VideoId,
    pub profile: ClientProfile,
    pub allow_credentials: bool,
    pub mode: Mode,
}

impl Invocation {
    pub fn structured(video_id: VideoId, profile: ClientProfile, allow_credentials: bool) -> Self {
        Self {
            video_id,
            profile,
            allow_credentials,
            mode: Mode::StructuredInfo,
        }
    }

    pub fn single_url(video_id: VideoId, profile: ClientProfile, allow_credentials: bool) -> Self {
        Self {
            video_id,
            profile,
            allow_credentials,
            mode: Mode::SingleUrl,
        }
    }
}

/// Parsed result of a successful run
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Formats(Vec<FormatDescriptor>),
    Url(String),
}

/// Seam between the prober and the resolver process
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, invocation: &Invocation) -> Result<Extraction, ResolveError>;
}

/// Runs the resolver binary for individual invocations
pub struct ResolverInvoker {
    runner: Arc<dyn ProcessRunner>,
    gate: Arc<ConcurrencyGate>,
    settings: ResolverSettings,
    cookies: Option<PathBuf>,
}

impl ResolverInvoker {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        gate: Arc<ConcurrencyGate>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            runner,
            gate,
            settings,
            cookies: None,
        }
    }

    /// Use the materialized credential jar at `path` where allowed
    pub fn with_cookies(mut self, path: Option<PathBuf>) -> Self {
        self.cookies = path;
        self
    }

    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    /// Run one invocation, retrying once without credentials on an auth wall
    pub async fn invoke(&self, invocation: &Invocation) -> Result<Extraction, ResolveError> {
        let credentialed = self.uses_credentials(invocation);

        match self.run_once(invocation, credentialed).await {
            Err(e) if credentialed && e.is_auth_required() => {
                warn!(
                    "Auth wall for {} with profile {} using credentials, retrying without",
                    invocation.video_id, invocation.profile
                );
                self.run_once(invocation, false).await
            }
            other => other,
        }
    }

    fn uses_credentials(&self, invocation: &Invocation) -> bool {
        invocation.allow_credentials
            && self.cookies.is_some()
            && self
                .settings
                .credential_clients
                .iter()
                .any(|c| c == invocation.profile.as_str())
    }

    async fn run_once(
        &self,
        invocation: &Invocation,
        credentialed: bool,
    ) -> Result<Extraction, ResolveError> {
        let args = self.build_args(invocation, credentialed);
        let limit = Duration::from_secs(self.settings.timeout_secs);

        debug!(
            "Invoking resolver for {} (profile={}, mode={:?}, cookies={})",
            invocation.video_id, invocation.profile, invocation.mode, credentialed
        );

        let output = self
            .gate
            .run(self.runner.run(&self.settings.ytdlp_path, &args, limit))
            .await??;

        let result = self.interpret(&output, invocation.mode);
        match &result {
            Ok(_) => info!(
                "Resolver succeeded for {} with profile {}",
                invocation.video_id, invocation.profile
            ),
            Err(e) => debug!(
                "Resolver failed for {} with profile {}: {}",
                invocation.video_id, invocation.profile, e
            ),
        }
        result
    }

    pub(crate) fn build_args(&self, invocation: &Invocation, credentialed: bool) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--ignore-config".into(),
            "--no-warnings".into(),
            "--no-playlist".into(),
            "--socket-timeout".into(),
            self.settings.socket_timeout_secs.to_string(),
            "--retries".into(),
            self.settings.retries.to_string(),
            "--extractor-args".into(),
            format!("youtube:player_client={}", invocation.profile),
        ];

        if credentialed {
            if let Some(path) = &self.cookies {
                args.push("--cookies".into());
                args.push(path.to_string_lossy().into_owned());
            }
        }

        match invocation.mode {
            Mode::StructuredInfo => args.push("-J".into()),
            Mode::SingleUrl => {
                args.push("-f".into());
                args.push(self.settings.single_url_format.clone());
                args.push("-g".into());
            }
        }

        args.push(invocation.video_id.watch_url());
        args
    }

    fn interpret(&self, output: &ProcessOutput, mode: Mode) -> Result<Extraction, ResolveError> {
        if !output.success() {
            let tail = stderr_tail(&output.stderr_lossy(), self.settings.stderr_tail_lines);
            return Err(classify_failure(output.code, &tail));
        }

        match mode {
            Mode::StructuredInfo => {
                let descriptors = parse_document(&output.stdout).map_err(|e| {
                    ResolveError::invalid_output(format!("resolver output is not JSON: {e}"))
                })?;
                Ok(Extraction::Formats(descriptors))
            }
            Mode::SingleUrl => output
                .stdout_lossy()
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .last()
                .filter(|line| line.starts_with("http"))
                .map(|line| Extraction::Url(line.to_string()))
                .ok_or_else(|| ResolveError::no_usable_result("resolver printed no URL")),
        }
    }
}

#[async_trait]
impl Extractor for ResolverInvoker {
    async fn extract(&self, invocation: &Invocation) -> Result<Extraction, ResolveError> {
        self.invoke(invocation).await
    }
}

/// Last `lines` non-empty lines of stderr
pub(crate) fn stderr_tail(stderr: &str, lines: usize) -> String {
    let kept: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let start = kept.len().saturating_sub(lines.max(1));
    kept[start..].join("\n")
}

/// Map a non-zero exit to an error kind
pub(crate) fn classify_failure(code: Option<i32>, tail: &str) -> ResolveError {
    if AUTH_WALL.is_match(tail) {
        return ResolveError::auth_required(tail.to_string());
    }

    let status = match code {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".to_string(),
    };
    if tail.is_empty() {
        ResolveError::invalid_output(status)
    } else {
        ResolveError::invalid_output(format!("{status}: {tail}"))
    }
}
