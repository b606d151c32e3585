//! Expiry-aware TTL for direct media URLs
//!
//! Signed media URLs carry their own expiry, either as an `expire` query
//! parameter or as an `/expire/<ts>/` path segment on manifest URLs.

use std::time::Duration;
use url::Url;

use crate::config::CacheSettings;

/// Unix timestamp embedded in a signed URL, if any
pub fn url_expiry(raw: &str) -> Option<i64> {
    let url = Url::parse(raw).ok()?;

    if let Some((_, value)) = url.query_pairs().find(|(k, _)| k == "expire") {
        return value.parse().ok();
    }

    let mut segments = url.path_segments()?;
    while let Some(segment) = segments.next() {
        if segment == "expire" {
            return segments.next().and_then(|v| v.parse().ok());
        }
    }
    None
}

/// Time to keep a resolved URL, `now` being the current Unix time
///
/// `expire - now - margin`, clamped to the configured floor and ceiling.
/// URLs without a readable expiry get the default TTL.
pub fn url_ttl(raw: &str, now: i64, policy: &CacheSettings) -> Duration {
    let Some(expire) = url_expiry(raw) else {
        return Duration::from_secs(policy.url_default_ttl_secs);
    };

    let remaining = expire
        .saturating_sub(now)
        .saturating_sub(policy.url_safety_margin_secs as i64);
    let floor = policy.url_ttl_floor_secs as i64;
    let ceiling = policy.url_ttl_ceiling_secs as i64;

    Duration::from_secs(remaining.clamp(floor, ceiling.max(floor)) as u64)
}

/// Current Unix time in seconds
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
