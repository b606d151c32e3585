//! Multi-profile probing
//!
//! Races one structured invocation per client profile. The first usable
//! answer wins unless the remaining profiles all settle inside the merge
//! window, in which case every successful answer is merged. When every
//! structured call fails, single-URL mode is tried profile by profile.

use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ProberSettings;
use crate::error::ResolveError;
use crate::resolver::{Extraction, Extractor, Invocation};
use crate::types::{ClientProfile, FormatDescriptor, VideoId};

/// Result of probing a video across profiles
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub descriptors: Vec<FormatDescriptor>,
    pub winning_profile: ClientProfile,
    /// True when answers from several profiles were combined
    pub merged: bool,
    /// Set when the result came from single-URL fallback
    pub direct_url: Option<String>,
}

struct Success {
    profile: ClientProfile,
    descriptors: Vec<FormatDescriptor>,
}

pub struct MultiProfileProber {
    extractor: Arc<dyn Extractor>,
    settings: ProberSettings,
}

impl MultiProfileProber {
    pub fn new(extractor: Arc<dyn Extractor>, settings: ProberSettings) -> Self {
        Self {
            extractor,
            settings,
        }
    }

    pub async fn probe(
        &self,
        video_id: &VideoId,
        profiles: &[ClientProfile],
        allow_credentials: bool,
    ) -> Result<ProbeOutcome, ResolveError> {
        if profiles.is_empty() {
            return Err(ResolveError::no_usable_result("no client profiles configured"));
        }

        let started = Instant::now();
        let mut failures: Vec<ResolveError> = Vec::new();

        let mut pending: FuturesUnordered<_> = profiles
            .iter()
            .map(|profile| {
                let invocation =
                    Invocation::structured(video_id.clone(), profile.clone(), allow_credentials);
                async move {
                    let result = self.extractor.extract(&invocation).await;
                    (invocation.profile, result)
                }
            })
            .collect();

        let mut first: Option<Success> = None;
        while let Some((profile, result)) = pending.next().await {
            match usable(result) {
                Ok(descriptors) => {
                    first = Some(Success {
                        profile,
                        descriptors,
                    });
                    break;
                }
                Err(e) => {
                    debug!("Profile {} failed for {}: {}", profile, video_id, e);
                    failures.push(e);
                }
            }
        }

        if let Some(first) = first {
            let outcome = if pending.is_empty() {
                single(first)
            } else {
                self.merge_window(first, &mut pending).await
            };
            info!(
                "Probed {} in {:?}: winner={}, merged={}, {} descriptors",
                video_id,
                started.elapsed(),
                outcome.winning_profile,
                outcome.merged,
                outcome.descriptors.len()
            );
            return Ok(outcome);
        }
        drop(pending);

        warn!(
            "All structured probes failed for {}, falling back to single-URL mode",
            video_id
        );
        for profile in profiles {
            let invocation =
                Invocation::single_url(video_id.clone(), profile.clone(), allow_credentials);
            match self.extractor.extract(&invocation).await {
                Ok(Extraction::Url(url)) => {
                    info!("Single-URL fallback succeeded for {} with {}", video_id, profile);
                    return Ok(ProbeOutcome {
                        descriptors: vec![FormatDescriptor::direct(url.clone())],
                        winning_profile: profile.clone(),
                        merged: false,
                        direct_url: Some(url),
                    });
                }
                Ok(Extraction::Formats(_)) => failures.push(ResolveError::no_usable_result(
                    "single-URL mode returned a format list",
                )),
                Err(e) => {
                    debug!("Single-URL fallback failed for {} with {}: {}", video_id, profile, e);
                    failures.push(e);
                }
            }
        }

        Err(aggregate_failure(failures))
    }

    async fn merge_window<S>(&self, first: Success, pending: &mut S) -> ProbeOutcome
    where
        S: futures::Stream<Item = (ClientProfile, Result<Extraction, ResolveError>)> + Unpin,
    {
        let window = self.settings.merge_window();
        let settled = tokio::time::timeout(window, async {
            let mut late = Vec::new();
            while let Some((profile, result)) = pending.next().await {
                if let Ok(descriptors) = usable(result) {
                    late.push(Success {
                        profile,
                        descriptors,
                    });
                }
            }
            late
        })
        .await;

        match settled {
            Ok(late) if !late.is_empty() => {
                let mut successes = Vec::with_capacity(late.len() + 1);
                successes.push(first);
                successes.extend(late);
                self.merge(successes)
            }
            Ok(_) => single(first),
            Err(_) => {
                debug!("Merge window of {:?} expired, using first result", window);
                single(first)
            }
        }
    }

    fn merge(&self, successes: Vec<Success>) -> ProbeOutcome {
        let mut winner = 0;
        let mut best_score = 0;
        for (index, success) in successes.iter().enumerate() {
            let score = self.score(&success.descriptors);
            if index == 0 || score > best_score {
                winner = index;
                best_score = score;
            }
        }

        let winning_profile = successes[winner].profile.clone();
        let mut seen = HashSet::new();
        let mut descriptors = Vec::new();
        for success in successes {
            for descriptor in success.descriptors {
                if seen.insert(self.dedup_key(&descriptor)) {
                    descriptors.push(descriptor);
                }
            }
        }

        ProbeOutcome {
            descriptors,
            winning_profile,
            merged: true,
            direct_url: None,
        }
    }

    /// Highest video height weighted, plus the number of video-only tracks
    pub(crate) fn score(&self, descriptors: &[FormatDescriptor]) -> u64 {
        let max_height = descriptors
            .iter()
            .filter(|d| d.has_video())
            .filter_map(|d| d.height)
            .max()
            .unwrap_or(0);
        let adaptive = descriptors.iter().filter(|d| d.is_video_only()).count();

        u64::from(max_height) * self.settings.height_weight + adaptive as u64
    }

    fn dedup_key(&self, d: &FormatDescriptor) -> DedupKey {
        (
            d.format_id.clone(),
            d.ext.clone(),
            d.protocol.clone(),
            d.height,
            d.locator()
                .map(|l| l.chars().take(self.settings.url_prefix_len).collect())
                .unwrap_or_default(),
        )
    }
}

type DedupKey = (
    Option<String>,
    Option<String>,
    Option<String>,
    Option<u32>,
    String,
);

fn single(first: Success) -> ProbeOutcome {
    ProbeOutcome {
        descriptors: first.descriptors,
        winning_profile: first.profile,
        merged: false,
        direct_url: None,
    }
}

/// Keep descriptors with a locator; an empty list is a failure
fn usable(
    result: Result<Extraction, ResolveError>,
) -> Result<Vec<FormatDescriptor>, ResolveError> {
    let descriptors = match result? {
        Extraction::Formats(descriptors) => descriptors,
        Extraction::Url(url) => vec![FormatDescriptor::direct(url)],
    };

    let usable: Vec<FormatDescriptor> = descriptors
        .into_iter()
        .filter(|d| d.locator().is_some())
        .collect();
    if usable.is_empty() {
        return Err(ResolveError::no_usable_result("no resolvable formats"));
    }
    Ok(usable)
}

/// Auth failures dominate; otherwise the most specific failure wins
pub(crate) fn aggregate_failure(failures: Vec<ResolveError>) -> ResolveError {
    if let Some(auth) = failures.iter().find(|e| e.is_auth_required()) {
        return auth.clone();
    }

    let mut worst: Option<ResolveError> = None;
    for failure in failures {
        let replace = worst
            .as_ref()
            .is_none_or(|w| failure.specificity() > w.specificity());
        if replace {
            worst = Some(failure);
        }
    }
    worst.unwrap_or_else(|| ResolveError::no_usable_result("all profiles failed"))
}
