//! Request type definitions
//!
//! Validated inbound values: the video identifier, client profiles and the
//! per-request resolve options parsed from query parameters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a video identifier
pub const VIDEO_ID_LEN: usize = 11;

/// Default height ceiling for ranked redirects
pub const DEFAULT_MAX_HEIGHT: u32 = 720;

/// Accepted range for the `max_height` parameter
pub const MAX_HEIGHT_RANGE: (u32, u32) = (144, 4320);

/// Validated 11-character video identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Parse and validate an identifier
    ///
    /// Accepts exactly 11 characters from `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let valid = raw.len() == VIDEO_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

        if !valid {
            return Err(crate::Error::validation_with_value(
                "video_id",
                "expected 11 characters of [A-Za-z0-9_-]",
                raw.chars().take(32).collect::<String>(),
            ));
        }

        Ok(Self(raw.to_string()))
    }

    /// The identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Watch page URL handed to the resolver
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named extraction persona passed to the resolver (`player_client`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientProfile(String);

impl ClientProfile {
    /// Create a profile, rejecting names that are not `[a-z0-9_]{1,32}`
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into().trim().to_ascii_lowercase();
        let valid = !name.is_empty()
            && name.len() <= 32
            && name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_');

        if !valid {
            return Err(crate::Error::validation_with_value(
                "clients",
                "client names must match [a-z0-9_]{1,32}",
                name,
            ));
        }

        Ok(Self(name))
    }

    /// Parse a comma-separated list, dropping duplicates but keeping order
    pub fn parse_list(raw: &str) -> crate::Result<Vec<Self>> {
        let mut profiles: Vec<Self> = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let profile = Self::new(part)?;
            if !profiles.contains(&profile) {
                profiles.push(profile);
            }
        }

        if profiles.is_empty() {
            return Err(crate::Error::validation("clients", "no client names given"));
        }

        Ok(profiles)
    }

    /// Profile name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Query parameters accepted by the resolve endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveQuery {
    /// Comma-separated profile override, e.g. `tv,android`
    pub clients: Option<String>,
    /// Skip the credential jar for this request (`1`/`true`)
    pub no_cookies: Option<String>,
    /// Height ceiling for ranked redirects
    pub max_height: Option<String>,
}

/// Per-request resolution options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Profiles to probe, in priority order
    pub profiles: Vec<ClientProfile>,
    /// Whether invocations may use the credential jar
    pub allow_credentials: bool,
    /// Set when `profiles` came from the request instead of configuration
    pub profiles_overridden: bool,
}

impl ResolveOptions {
    /// Options using the configured profiles and credentials
    pub fn new(profiles: Vec<ClientProfile>) -> Self {
        Self {
            profiles,
            allow_credentials: true,
            profiles_overridden: false,
        }
    }

    /// Build options from query parameters on top of the configured defaults
    ///
    /// An override may name at most as many profiles as are configured, so
    /// one request never fans out wider than a default probe.
    pub fn from_query(query: &ResolveQuery, defaults: &[ClientProfile]) -> crate::Result<Self> {
        let (profiles, overridden) = match query.clients.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                let profiles = ClientProfile::parse_list(raw)?;
                let limit = defaults.len().max(1);
                if profiles.len() > limit {
                    return Err(crate::Error::validation_with_value(
                        "clients",
                        format!("at most {limit} client profiles may be requested"),
                        raw,
                    ));
                }
                (profiles, true)
            }
            _ => (defaults.to_vec(), false),
        };

        Ok(Self {
            profiles,
            allow_credentials: !parse_flag(query.no_cookies.as_deref()),
            profiles_overridden: overridden,
        })
    }

    /// Discriminator appended to cache keys
    ///
    /// Requests with the configured profiles and credentials share entries;
    /// overrides get their own.
    pub fn cache_suffix(&self) -> String {
        let mut suffix = String::new();
        if self.profiles_overridden {
            let names: Vec<&str> = self.profiles.iter().map(ClientProfile::as_str).collect();
            suffix.push_str(":c=");
            suffix.push_str(&names.join(","));
        }
        if !self.allow_credentials {
            suffix.push_str(":nc");
        }
        suffix
    }
}

/// Interpret a boolean-ish query flag
pub fn parse_flag(raw: Option<&str>) -> bool {
    matches!(
        raw.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes") | Some("on") | Some("")
    )
}

/// Parse `max_height`, clamping to the accepted range
///
/// Missing or non-numeric values fall back to [`DEFAULT_MAX_HEIGHT`].
pub fn clamp_max_height(raw: Option<&str>) -> u32 {
    raw.and_then(|v| v.trim().parse::<u32>().ok())
        .map(|h| h.clamp(MAX_HEIGHT_RANGE.0, MAX_HEIGHT_RANGE.1))
        .unwrap_or(DEFAULT_MAX_HEIGHT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("dQw4w9WgXcQ")]
    #[case("-6OjhRWNLfk")]
    #[case("abc_def-123")]
    fn test_video_id_accepts_valid(#[case] raw: &str) {
        let id = VideoId::parse(raw).unwrap();
        assert_eq!(id.as_str(), raw);
    }

    #[rstest]
    #[case("")]
    #[case("short")]
    #[case("dQw4w9WgXcQQ")]
    #[case("dQw4w9WgXc!")]
    #[case("dQw4w9 gXcQ")]
    #[case("../../etc/p")]
    fn test_video_id_rejects_invalid(#[case] raw: &str) {
        assert!(VideoId::parse(raw).is_err());
    }

    #[test]
    fn test_watch_url() {
        let id = VideoId::parse("dQw4w9WgXcQ").unwrap();
        assert_eq!(id.watch_url(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
    }

    #[test]
    fn test_profile_list_parsing() {
        let profiles = ClientProfile::parse_list("tv, Android,tv,,web").unwrap();
        let names: Vec<&str> = profiles.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["tv", "android", "web"]);

        assert!(ClientProfile::parse_list(" , ").is_err());
        assert!(ClientProfile::parse_list("tv;rm -rf").is_err());
    }

    #[test]
    fn test_options_from_query() {
        let defaults = ClientProfile::parse_list("tv,web").unwrap();

        let options = ResolveOptions::from_query(&ResolveQuery::default(), &defaults).unwrap();
        assert_eq!(options.profiles, defaults);
        assert!(options.allow_credentials);
        assert_eq!(options.cache_suffix(), "");

        let query = ResolveQuery {
            clients: Some("ios".to_string()),
            no_cookies: Some("1".to_string()),
            max_height: None,
        };
        let options = ResolveOptions::from_query(&query, &defaults).unwrap();
        assert_eq!(options.profiles[0].as_str(), "ios");
        assert!(!options.allow_credentials);
        assert_eq!(options.cache_suffix(), ":c=ios:nc");
    }

    #[test]
    fn test_override_is_capped_at_configured_width() {
        let defaults = ClientProfile::parse_list("tv,web").unwrap();
        let query = |clients: &str| ResolveQuery {
            clients: Some(clients.to_string()),
            ..Default::default()
        };

        assert!(ResolveOptions::from_query(&query("ios,android"), &defaults).is_ok());
        assert!(ResolveOptions::from_query(&query("ios,ios,ios,web"), &defaults).is_ok());

        let err = ResolveOptions::from_query(&query("a1,a2,a3"), &defaults).unwrap_err();
        assert!(matches!(err, crate::Error::Validation { .. }));
    }

    #[rstest]
    #[case(None, 720)]
    #[case(Some("480"), 480)]
    #[case(Some("10"), 144)]
    #[case(Some("99999"), 4320)]
    #[case(Some("tall"), 720)]
    fn test_clamp_max_height(#[case] raw: Option<&str>, #[case] expected: u32) {
        assert_eq!(clamp_max_height(raw), expected);
    }

    #[rstest]
    #[case(Some("1"), true)]
    #[case(Some("TRUE"), true)]
    #[case(Some("0"), false)]
    #[case(Some("false"), false)]
    #[case(None, false)]
    fn test_parse_flag(#[case] raw: Option<&str>, #[case] expected: bool) {
        assert_eq!(parse_flag(raw), expected);
    }
}
