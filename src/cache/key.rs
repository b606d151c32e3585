//! Cache keys

use std::fmt;

use crate::types::{ResolveOptions, VideoId};

/// What a cached value answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Probed descriptors plus their normalized listing
    Formats,
    /// Direct URL for the fixed 480p redirect
    Redirect480,
    /// Direct URL for a caller-chosen height ceiling
    Best(u32),
}

/// Identifier plus everything that changes the answer for it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: CacheKind,
    pub video_id: VideoId,
    /// Profile override and credential bypass, empty for defaults
    pub variant: String,
}

impl CacheKey {
    pub fn new(kind: CacheKind, video_id: &VideoId, options: &ResolveOptions) -> Self {
        Self {
            kind,
            video_id: video_id.clone(),
            variant: options.cache_suffix(),
        }
    }

    pub fn formats(video_id: &VideoId, options: &ResolveOptions) -> Self {
        Self::new(CacheKind::Formats, video_id, options)
    }

    /// URL key for a height ceiling; 480 maps to the redirect entry
    pub fn url(video_id: &VideoId, max_height: u32, options: &ResolveOptions) -> Self {
        let kind = if max_height == 480 {
            CacheKind::Redirect480
        } else {
            CacheKind::Best(max_height)
        };
        Self::new(kind, video_id, options)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            CacheKind::Formats => write!(f, "formats:{}", self.video_id)?,
            CacheKind::Redirect480 => write!(f, "redirect480:{}", self.video_id)?,
            CacheKind::Best(max) => write!(f, "best{}:{}", max, self.video_id)?,
        }
        f.write_str(&self.variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClientProfile, ResolveQuery};

    #[test]
    fn test_variants_do_not_collide() {
        let id = VideoId::parse("dQw4w9WgXcQ").unwrap();
        let defaults = ClientProfile::parse_list("tv,web").unwrap();
        let plain = ResolveOptions::new(defaults.clone());
        let bypass = ResolveOptions::from_query(
            &ResolveQuery {
                no_cookies: Some("true".to_string()),
                ..Default::default()
            },
            &defaults,
        )
        .unwrap();

        assert_ne!(CacheKey::formats(&id, &plain), CacheKey::formats(&id, &bypass));
        assert_ne!(CacheKey::formats(&id, &plain), CacheKey::url(&id, 480, &plain));
        assert_eq!(CacheKey::url(&id, 480, &plain).kind, CacheKind::Redirect480);
        assert_eq!(CacheKey::url(&id, 720, &plain).kind, CacheKind::Best(720));
        assert_eq!(
            CacheKey::url(&id, 720, &bypass).to_string(),
            "best720:dQw4w9WgXcQ:nc"
        );
    }
}
