//! Format normalization
//!
//! Splits raw descriptors into deduplicated video and audio listings.
//! Normalizing the descriptors recovered from a listing yields the same
//! listing again.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::types::{AudioFormat, FormatDescriptor, NormalizedResult, VideoFormat};

const DEFAULT_PROTOCOL: &str = "https";
const UNKNOWN_EXT: &str = "unknown";

/// Build the video and audio listings for a set of descriptors
pub fn normalize(descriptors: &[FormatDescriptor]) -> NormalizedResult {
    let mut video_formats = Vec::new();
    let mut audio_formats = Vec::new();
    let mut video_seen = HashSet::new();
    let mut audio_seen = HashSet::new();

    for descriptor in descriptors.iter().filter(|d| !d.is_storyboard()) {
        let Some(url) = descriptor.locator() else {
            continue;
        };

        if is_video(descriptor) {
            let format = video_format(descriptor, url);
            if video_seen.insert((format.resolution.clone(), format.protocol.clone())) {
                video_formats.push(format);
            }
        } else if descriptor.has_audio() {
            let format = audio_format(descriptor, url);
            let kbps = format.bitrate.map(|b| b.round() as i64);
            if audio_seen.insert((kbps, format.protocol.clone())) {
                audio_formats.push(format);
            }
        }
    }

    // Entries without a height sort after every sized entry
    video_formats.sort_by_key(|f| f.height.unwrap_or(u32::MAX));
    audio_formats.sort_by(|a, b| match (a.bitrate, b.bitrate) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    NormalizedResult {
        video_formats,
        audio_formats,
    }
}

/// Recover descriptors from a normalized listing
pub fn to_descriptors(result: &NormalizedResult) -> Vec<FormatDescriptor> {
    result
        .video_formats
        .iter()
        .map(FormatDescriptor::from)
        .chain(result.audio_formats.iter().map(FormatDescriptor::from))
        .collect()
}

fn is_video(d: &FormatDescriptor) -> bool {
    d.has_video() || d.height.is_some() || d.is_manifest()
}

fn video_format(d: &FormatDescriptor, url: &str) -> VideoFormat {
    VideoFormat {
        format_id: d.format_id.clone().unwrap_or_default(),
        ext: d.ext.clone().unwrap_or_else(|| UNKNOWN_EXT.to_string()),
        resolution: d.resolution_label(),
        height: d.height,
        protocol: protocol(d),
        has_audio: d.has_audio() || d.is_manifest(),
        bandwidth: d.tbr.filter(|b| b.is_finite()),
        vcodec: d.vcodec.clone(),
        acodec: d.acodec.clone(),
        url: url.to_string(),
    }
}

fn audio_format(d: &FormatDescriptor, url: &str) -> AudioFormat {
    AudioFormat {
        format_id: d.format_id.clone().unwrap_or_default(),
        ext: d.ext.clone().unwrap_or_else(|| UNKNOWN_EXT.to_string()),
        bitrate: d.audio_bitrate(),
        protocol: protocol(d),
        acodec: d.acodec.clone(),
        url: url.to_string(),
    }
}

fn protocol(d: &FormatDescriptor) -> String {
    d.protocol
        .clone()
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string())
}

impl From<&VideoFormat> for FormatDescriptor {
    fn from(f: &VideoFormat) -> Self {
        Self {
            format_id: Some(f.format_id.clone()),
            ext: Some(f.ext.clone()),
            protocol: Some(f.protocol.clone()),
            height: f.height,
            vcodec: f.vcodec.clone(),
            acodec: f.acodec.clone(),
            tbr: f.bandwidth,
            resolution: f.resolution.clone(),
            url: Some(f.url.clone()),
            ..Default::default()
        }
    }
}

impl From<&AudioFormat> for FormatDescriptor {
    fn from(f: &AudioFormat) -> Self {
        Self {
            format_id: Some(f.format_id.clone()),
            ext: Some(f.ext.clone()),
            protocol: Some(f.protocol.clone()),
            vcodec: Some("none".to_string()),
            acodec: f.acodec.clone(),
            abr: f.bitrate,
            url: Some(f.url.clone()),
            ..Default::default()
        }
    }
}
