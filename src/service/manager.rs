//! # Resolve Service
//!
//! This module provides the orchestration layer shared by the HTTP server
//! and the one-shot CLI. It owns every stateful component and answers the
//! two questions clients ask:
//!
//! - which formats exist for a video ([`ResolverService::formats`])
//! - which single URL best plays it under a height ceiling
//!   ([`ResolverService::redirect_url`])
//!
//! ## Architecture
//!
//! ```text
//! request → ResultCache (coalescing) → MultiProfileProber
//!         → ResolverInvoker → ConcurrencyGate → resolver process
//! ```
//!
//! Listings are cached for a fixed TTL. Direct URLs are cached until shortly
//! before the expiry embedded in the URL itself.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ytdlp_stream_resolver::config::Settings;
//! use ytdlp_stream_resolver::service::ResolverService;
//! use ytdlp_stream_resolver::types::{ResolveOptions, VideoId};
//!
//! # tokio_test::block_on(async {
//! let service = Arc::new(ResolverService::new(Settings::default())?);
//! let id = VideoId::parse("dQw4w9WgXcQ")?;
//! let options = ResolveOptions::new(service.default_profiles().to_vec());
//!
//! let resolution = service.redirect_url(&id, 480, &options).await?;
//! println!("{} via {}", resolution.value, resolution.profile);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    Result,
    cache::{CacheKey, CacheStatus, ResultCache, unix_now, url_ttl},
    config::Settings,
    credentials::{CredentialHealth, CredentialJar, CredentialManager},
    error::ResolveError,
    formats::{normalize, pick_best_merged_under},
    resolver::{
        ConcurrencyGate, Extraction, Extractor, GateStats, Invocation, MultiProfileProber,
        ProcessTracker, ResolverInvoker, TokioProcessRunner, prober::aggregate_failure,
    },
    types::{CacheSummary, ClientProfile, FormatDescriptor, NormalizedResult, ResolveOptions, VideoId},
};

/// Upper bound on waiting for children to exit during shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Cached outcome of probing one video
#[derive(Debug, Clone)]
pub struct CachedFormats {
    /// Raw descriptors, kept for URL selection
    pub descriptors: Arc<Vec<FormatDescriptor>>,
    pub normalized: Arc<NormalizedResult>,
    pub profile: ClientProfile,
    pub direct_url: Option<String>,
}

#[derive(Debug, Clone)]
struct ResolvedUrl {
    url: String,
    profile: ClientProfile,
}

/// A value together with how it was obtained
#[derive(Debug, Clone)]
pub struct Resolution<T> {
    pub value: T,
    pub cache: CacheStatus,
    /// Profile whose answer produced the value
    pub profile: ClientProfile,
}

/// Introspection snapshot
#[derive(Debug, Clone)]
pub struct ServiceStats {
    pub gate: GateStats,
    pub cache: CacheSummary,
    pub credentials: CredentialHealth,
    pub active_processes: usize,
}

/// Orchestrates probing, caching and URL selection
pub struct ResolverService {
    settings: Arc<Settings>,
    gate: Arc<ConcurrencyGate>,
    extractor: Arc<dyn Extractor>,
    prober: MultiProfileProber,
    formats_cache: ResultCache<CachedFormats>,
    url_cache: ResultCache<ResolvedUrl>,
    credentials: Option<CredentialJar>,
    tracker: ProcessTracker,
    default_profiles: Vec<ClientProfile>,
    shutdown: CancellationToken,
}

impl ResolverService {
    /// Creates the service backed by the real resolver binary.
    ///
    /// Materializes the credential jar, sizes the concurrency gate and
    /// wires the invoker into the prober.
    ///
    /// # Errors
    ///
    /// Fails when a configured client profile name is invalid.
    pub fn new(settings: Settings) -> Result<Self> {
        let credentials = CredentialManager::materialize(&settings.credentials);
        let tracker = ProcessTracker::new();
        let gate = Arc::new(ConcurrencyGate::new(settings.gate.effective_max_concurrent()));
        info!(
            "Resolver concurrency: {} slots, queue ceiling {}",
            gate.max_concurrent(),
            settings.gate.max_queue
        );

        let invoker = ResolverInvoker::new(
            Arc::new(TokioProcessRunner::new(tracker.clone())),
            gate.clone(),
            settings.resolver.clone(),
        )
        .with_cookies(credentials.as_ref().map(|jar| jar.path().to_path_buf()));

        Self::from_parts(settings, Arc::new(invoker), gate, tracker, credentials)
    }

    /// Creates the service around an arbitrary extractor.
    ///
    /// The gate and tracker should be the ones the extractor uses, so that
    /// backpressure and shutdown see its work.
    pub fn from_parts(
        settings: Settings,
        extractor: Arc<dyn Extractor>,
        gate: Arc<ConcurrencyGate>,
        tracker: ProcessTracker,
        credentials: Option<CredentialJar>,
    ) -> Result<Self> {
        let default_profiles = settings
            .resolver
            .clients
            .iter()
            .map(ClientProfile::new)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            prober: MultiProfileProber::new(extractor.clone(), settings.prober.clone()),
            settings: Arc::new(settings),
            gate,
            extractor,
            formats_cache: ResultCache::new("formats"),
            url_cache: ResultCache::new("url"),
            credentials,
            tracker,
            default_profiles,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Configured profiles in priority order
    pub fn default_profiles(&self) -> &[ClientProfile] {
        &self.default_profiles
    }

    /// Normalized listing for a video, probing on a cache miss
    pub async fn formats(
        self: &Arc<Self>,
        video_id: &VideoId,
        options: &ResolveOptions,
    ) -> std::result::Result<Resolution<CachedFormats>, ResolveError> {
        let key = CacheKey::formats(video_id, options);
        let ttl = Duration::from_secs(self.settings.cache.formats_ttl_secs);

        let this = self.clone();
        let id = video_id.clone();
        let opts = options.clone();
        let (value, status) = self
            .formats_cache
            .get_or_resolve(
                key,
                move |_| ttl,
                move || async move { this.probe_formats(&id, &opts).await },
            )
            .await?;

        Ok(Resolution {
            profile: value.profile.clone(),
            value,
            cache: status,
        })
    }

    async fn probe_formats(
        &self,
        video_id: &VideoId,
        options: &ResolveOptions,
    ) -> std::result::Result<CachedFormats, ResolveError> {
        let outcome = self
            .prober
            .probe(video_id, &options.profiles, options.allow_credentials)
            .await?;
        let normalized = normalize(&outcome.descriptors);
        debug!(
            "Normalized {} into {} video / {} audio formats",
            video_id,
            normalized.video_formats.len(),
            normalized.audio_formats.len()
        );

        Ok(CachedFormats {
            descriptors: Arc::new(outcome.descriptors),
            normalized: Arc::new(normalized),
            profile: outcome.winning_profile,
            direct_url: outcome.direct_url,
        })
    }

    /// Best muxed URL at or under `max_height`
    ///
    /// Falls back to the probe's direct URL, then to single-URL resolution
    /// over the requested profiles.
    pub async fn redirect_url(
        self: &Arc<Self>,
        video_id: &VideoId,
        max_height: u32,
        options: &ResolveOptions,
    ) -> std::result::Result<Resolution<String>, ResolveError> {
        let key = CacheKey::url(video_id, max_height, options);
        let policy = self.settings.cache.clone();

        let this = self.clone();
        let id = video_id.clone();
        let opts = options.clone();
        let (resolved, status) = self
            .url_cache
            .get_or_resolve(
                key,
                move |r: &ResolvedUrl| url_ttl(&r.url, unix_now(), &policy),
                move || async move { this.select_url(&id, max_height, &opts).await },
            )
            .await?;

        Ok(Resolution {
            value: resolved.url,
            cache: status,
            profile: resolved.profile,
        })
    }

    async fn select_url(
        self: &Arc<Self>,
        video_id: &VideoId,
        max_height: u32,
        options: &ResolveOptions,
    ) -> std::result::Result<ResolvedUrl, ResolveError> {
        let formats = self.formats(video_id, options).await?.value;

        if let Some(url) = pick_best_merged_under(&formats.descriptors, max_height)
            .and_then(FormatDescriptor::locator)
        {
            return Ok(ResolvedUrl {
                url: url.to_string(),
                profile: formats.profile,
            });
        }

        if let Some(url) = formats.direct_url {
            return Ok(ResolvedUrl {
                url,
                profile: formats.profile,
            });
        }

        debug!(
            "No muxed stream under {}p for {}, trying single-URL mode",
            max_height, video_id
        );
        self.single_url(video_id, options).await
    }

    async fn single_url(
        &self,
        video_id: &VideoId,
        options: &ResolveOptions,
    ) -> std::result::Result<ResolvedUrl, ResolveError> {
        let mut failures = Vec::new();
        for profile in &options.profiles {
            let invocation =
                Invocation::single_url(video_id.clone(), profile.clone(), options.allow_credentials);
            match self.extractor.extract(&invocation).await {
                Ok(Extraction::Url(url)) => {
                    return Ok(ResolvedUrl {
                        url,
                        profile: profile.clone(),
                    });
                }
                Ok(Extraction::Formats(_)) => failures.push(ResolveError::no_usable_result(
                    "single-URL mode returned a format list",
                )),
                Err(e) => failures.push(e),
            }
        }
        Err(aggregate_failure(failures))
    }

    /// True when a formats request is answerable without new resolver work
    pub fn formats_warm(&self, video_id: &VideoId, options: &ResolveOptions) -> bool {
        self.formats_cache
            .is_warm(&CacheKey::formats(video_id, options))
    }

    /// True when a redirect is answerable without new resolver work
    pub fn url_warm(&self, video_id: &VideoId, max_height: u32, options: &ResolveOptions) -> bool {
        self.url_cache
            .is_warm(&CacheKey::url(video_id, max_height, options))
    }

    /// True when the resolver queue is above its ceiling
    pub fn is_overloaded(&self) -> bool {
        self.gate.is_overloaded(self.settings.gate.max_queue)
    }

    pub fn queued(&self) -> usize {
        self.gate.stats().queued
    }

    /// Drop every cached listing and URL
    pub fn invalidate(&self) -> usize {
        let removed = self.formats_cache.clear() + self.url_cache.clear();
        info!("Invalidated {} cache entries", removed);
        removed
    }

    /// Drop expired entries from both caches
    pub fn sweep(&self) -> usize {
        self.formats_cache.sweep() + self.url_cache.sweep()
    }

    /// Periodically sweep the caches until shutdown
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        let period = Duration::from_secs(self.settings.cache.sweep_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = this.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = this.sweep();
                        if removed > 0 {
                            debug!("Cache sweep removed {} entries", removed);
                        }
                    }
                }
            }
            debug!("Cache sweeper stopped");
        })
    }

    pub fn credential_health(&self) -> CredentialHealth {
        self.credentials
            .as_ref()
            .map(CredentialJar::health)
            .unwrap_or_else(CredentialHealth::absent)
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            gate: self.gate.stats(),
            cache: CacheSummary {
                formats: self.formats_cache.stats(),
                urls: self.url_cache.stats(),
            },
            credentials: self.credential_health(),
            active_processes: self.tracker.active(),
        }
    }

    /// Stop admitting work and kill every running resolver process
    pub async fn shutdown(&self) {
        info!("Shutting down resolver service");
        self.shutdown.cancel();
        self.gate.close();
        self.tracker.terminate_all();

        if !self.tracker.drained(DRAIN_TIMEOUT).await {
            warn!(
                "{} resolver process(es) still running after {:?}",
                self.tracker.active(),
                DRAIN_TIMEOUT
            );
        }
    }
}
