//! Internal data structures
//!
//! Raw format descriptors as emitted by the resolver and the helpers the
//! prober and normalizer use to classify them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocols that indicate an adaptive manifest rather than a progressive file
const MANIFEST_PROTOCOLS: &[&str] = &["m3u8", "m3u8_native", "http_dash_segments", "dash"];

/// One raw format entry from the resolver's structured output
///
/// Every field is optional; the resolver omits or nulls fields freely
/// depending on the profile and the stream type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatDescriptor {
    pub format_id: Option<String>,
    pub ext: Option<String>,
    pub protocol: Option<String>,
    pub height: Option<u32>,
    pub width: Option<u32>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    /// Total bitrate in kbit/s
    pub tbr: Option<f64>,
    /// Audio bitrate in kbit/s
    pub abr: Option<f64>,
    pub format_note: Option<String>,
    pub resolution: Option<String>,
    pub url: Option<String>,
    pub manifest_url: Option<String>,
    pub fragment_base_url: Option<String>,
}

impl FormatDescriptor {
    /// Descriptor for a bare URL obtained from single-URL mode
    ///
    /// Codecs are unknown, so it is treated as a muxed mp4 stream.
    pub fn direct(url: impl Into<String>) -> Self {
        Self {
            format_id: Some("direct".to_string()),
            ext: Some("mp4".to_string()),
            protocol: Some("https".to_string()),
            vcodec: Some("unknown".to_string()),
            acodec: Some("unknown".to_string()),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// First non-empty locator: direct URL, then manifest, then fragment base
    pub fn locator(&self) -> Option<&str> {
        [&self.url, &self.manifest_url, &self.fragment_base_url]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .find(|value| !value.trim().is_empty())
    }

    /// True when the video codec is present and not `none`
    pub fn has_video(&self) -> bool {
        is_real_codec(self.vcodec.as_deref())
    }

    /// True when the audio codec is present and not `none`
    pub fn has_audio(&self) -> bool {
        is_real_codec(self.acodec.as_deref())
    }

    /// Video track without audio, typical of adaptive formats
    pub fn is_video_only(&self) -> bool {
        self.has_video() && !self.has_audio()
    }

    /// Audio track without video
    pub fn is_audio_only(&self) -> bool {
        self.has_audio() && !self.has_video()
    }

    /// Preview-thumbnail tracks that carry no playable media
    pub fn is_storyboard(&self) -> bool {
        let id_match = self
            .format_id
            .as_deref()
            .is_some_and(|id| id.starts_with("sb"));
        let ext_match = self.ext.as_deref() == Some("mhtml");
        let note_match = self
            .format_note
            .as_deref()
            .is_some_and(|note| note.to_ascii_lowercase().contains("storyboard"));

        id_match || ext_match || note_match
    }

    /// True when the locator points at an HLS or DASH manifest
    pub fn is_manifest(&self) -> bool {
        if let Some(protocol) = self.protocol.as_deref() {
            if MANIFEST_PROTOCOLS
                .iter()
                .any(|p| protocol.eq_ignore_ascii_case(p))
            {
                return true;
            }
        }

        self.locator().is_some_and(|locator| {
            let path = locator.split('?').next().unwrap_or(locator);
            path.ends_with(".m3u8") || path.ends_with(".mpd")
        })
    }

    /// Audio bitrate, preferring `abr` over `tbr`
    pub fn audio_bitrate(&self) -> Option<f64> {
        self.abr.or(self.tbr).filter(|b| b.is_finite() && *b > 0.0)
    }

    /// Resolution label, derived from dimensions when absent
    pub fn resolution_label(&self) -> Option<String> {
        if let Some(label) = self
            .resolution
            .as_deref()
            .filter(|r| !r.is_empty() && *r != "audio only")
        {
            return Some(label.to_string());
        }

        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(format!("{w}x{h}")),
            (None, Some(h)) => Some(format!("{h}p")),
            _ => None,
        }
    }
}

fn is_real_codec(codec: Option<&str>) -> bool {
    codec.is_some_and(|c| !c.trim().is_empty() && !c.eq_ignore_ascii_case("none"))
}

/// Extract descriptors from the resolver's structured JSON document
///
/// Takes the `formats` array, or the top-level entry when it has no format
/// list but carries a locator. Entries that do not fit the descriptor shape
/// are skipped rather than failing the whole document.
pub(crate) fn parse_document(raw: &[u8]) -> Result<Vec<FormatDescriptor>, serde_json::Error> {
    let document: Value = serde_json::from_slice(raw)?;

    let descriptors = match document.get("formats").and_then(Value::as_array) {
        Some(entries) => entries
            .iter()
            .filter_map(|entry| FormatDescriptor::deserialize(entry).ok())
            .collect(),
        None => FormatDescriptor::deserialize(&document)
            .ok()
            .filter(|top| top.locator().is_some())
            .into_iter()
            .collect(),
    };

    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(value: serde_json::Value) -> FormatDescriptor {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_deserialize_with_nulls_and_extra_fields() {
        let d = descriptor(json!({
            "format_id": "137",
            "ext": "mp4",
            "height": 1080,
            "width": null,
            "vcodec": "avc1.640028",
            "acodec": "none",
            "tbr": 4400.5,
            "url": "https://cdn.example/video?expire=1",
            "http_headers": {"User-Agent": "x"},
            "fragments": []
        }));

        assert_eq!(d.format_id.as_deref(), Some("137"));
        assert_eq!(d.height, Some(1080));
        assert!(d.width.is_none());
        assert!(d.is_video_only());
        assert!(!d.is_audio_only());
    }

    #[test]
    fn test_locator_order() {
        let d = descriptor(json!({
            "url": "",
            "manifest_url": "https://cdn.example/master.m3u8",
            "fragment_base_url": "https://cdn.example/frag/"
        }));
        assert_eq!(d.locator(), Some("https://cdn.example/master.m3u8"));
        assert!(d.is_manifest());

        let empty = FormatDescriptor::default();
        assert!(empty.locator().is_none());
    }

    #[test]
    fn test_storyboard_detection() {
        assert!(descriptor(json!({"format_id": "sb0", "ext": "mhtml"})).is_storyboard());
        assert!(descriptor(json!({"format_id": "x", "ext": "mhtml"})).is_storyboard());
        assert!(descriptor(json!({"format_id": "x", "format_note": "storyboard"})).is_storyboard());
        assert!(!descriptor(json!({"format_id": "18", "ext": "mp4"})).is_storyboard());
    }

    #[test]
    fn test_direct_descriptor() {
        let d = FormatDescriptor::direct("https://cdn.example/v.mp4");
        assert_eq!(d.format_id.as_deref(), Some("direct"));
        assert_eq!(d.locator(), Some("https://cdn.example/v.mp4"));
        assert!(d.has_video());
        assert!(d.has_audio());
        assert!(d.height.is_none());
    }

    #[test]
    fn test_document_without_format_list() {
        let raw = br#"{"id": "dQw4w9WgXcQ", "url": "https://cdn.example/only.mp4", "ext": "mp4"}"#;
        let descriptors = parse_document(raw).unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].ext.as_deref(), Some("mp4"));

        assert!(parse_document(br#"{"id": "x"}"#).unwrap().is_empty());
        assert!(parse_document(b"not json").is_err());
    }

    #[test]
    fn test_document_skips_malformed_entries() {
        let raw = br#"{"formats": [
            {"format_id": "18", "height": 360, "url": "https://cdn/18"},
            {"format_id": "bad", "height": "tall"},
            {"format_id": "140", "abr": 128, "url": "https://cdn/140"}
        ]}"#;
        let descriptors = parse_document(raw).unwrap();
        let ids: Vec<&str> = descriptors.iter().filter_map(|d| d.format_id.as_deref()).collect();
        assert_eq!(ids, vec!["18", "140"]);
        assert_eq!(descriptors[1].abr, Some(128.0));
    }

    #[test]
    fn test_resolution_label() {
        let d = descriptor(json!({"width": 1280, "height": 720}));
        assert_eq!(d.resolution_label().as_deref(), Some("1280x720"));
        let d = descriptor(json!({"height": 360}));
        assert_eq!(d.resolution_label().as_deref(), Some("360p"));
        let d = descriptor(json!({"resolution": "audio only"}));
        assert!(d.resolution_label().is_none());
    }
}
