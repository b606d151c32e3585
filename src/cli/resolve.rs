//! One-shot resolve mode
//!
//! Resolves a single video and prints the result to stdout: the normalized
//! formats as JSON, or the best URL with `--url-only`. Any failure prints
//! `{}` and exits with status 1, so callers can always parse stdout.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

use crate::{
    Settings,
    cli::{env_filter, init_logging},
    config::ConfigLoader,
    service::ResolverService,
    types::{ResolveOptions, ResolveQuery, VideoId, clamp_max_height},
};

/// Arguments for one-shot mode
#[derive(Debug, Default)]
pub struct ResolveArgs {
    pub video_id: Option<String>,
    pub clients: Option<String>,
    pub max_height: Option<u32>,
    pub url_only: bool,
    pub no_cookies: bool,
    pub config: Option<String>,
    pub verbose: bool,
}

/// Run one-shot mode with the given arguments
pub async fn run_resolve_mode(args: ResolveArgs) -> Result<()> {
    init_logging(
        env_filter(args.verbose, "error"),
        &Settings::default().logging,
        true,
    );

    match resolve(&args).await {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            error!("Resolution failed: {:#}", e);
            println!("{{}}");
            std::process::exit(1);
        }
    }
}

async fn resolve(args: &ResolveArgs) -> Result<String> {
    let raw_id = args
        .video_id
        .as_deref()
        .context("--video-id is required")?;
    let video_id = VideoId::parse(raw_id)?;

    let config_path = args
        .config
        .as_ref()
        .map(PathBuf::from)
        .or_else(ConfigLoader::discover);
    let settings = ConfigLoader::new()
        .load(config_path.as_deref())
        .context("failed to load configuration")?;

    let service = Arc::new(ResolverService::new(settings)?);
    let options = ResolveOptions::from_query(&query_for(args), service.default_profiles())?;
    debug!(
        "Resolving {} with profiles {:?} (credentials: {})",
        video_id, options.profiles, options.allow_credentials
    );

    let output: Result<String> = async {
        if args.url_only {
            let max_height = clamp_max_height(args.max_height.map(|h| h.to_string()).as_deref());
            Ok(service.redirect_url(&video_id, max_height, &options).await?.value)
        } else {
            let resolution = service.formats(&video_id, &options).await?;
            Ok(serde_json::to_string_pretty(
                resolution.value.normalized.as_ref(),
            )?)
        }
    }
    .await;

    service.shutdown().await;
    output
}

fn query_for(args: &ResolveArgs) -> ResolveQuery {
    ResolveQuery {
        clients: args.clients.clone(),
        no_cookies: args.no_cookies.then(|| "1".to_string()),
        max_height: None,
    }
}
