//! Height-ceiling selection over muxed streams

use crate::types::FormatDescriptor;

/// Best progressive mp4 carrying both video and audio under a height ceiling
///
/// Picks the tallest entry at or below `max_height`; when none fits, the
/// shortest entry above it. Entries without a height or a locator never
/// qualify. Ties go to the earliest entry.
pub fn pick_best_merged_under(
    descriptors: &[FormatDescriptor],
    max_height: u32,
) -> Option<&FormatDescriptor> {
    let mut under: Option<(u32, &FormatDescriptor)> = None;
    let mut over: Option<(u32, &FormatDescriptor)> = None;

    for descriptor in descriptors.iter().filter(|d| is_merged_mp4(d)) {
        let Some(height) = descriptor.height else {
            continue;
        };

        if height <= max_height {
            if under.is_none_or(|(best, _)| height > best) {
                under = Some((height, descriptor));
            }
        } else if over.is_none_or(|(best, _)| height < best) {
            over = Some((height, descriptor));
        }
    }

    under.or(over).map(|(_, descriptor)| descriptor)
}

fn is_merged_mp4(d: &FormatDescriptor) -> bool {
    d.ext.as_deref() == Some("mp4") && d.has_video() && d.has_audio() && d.locator().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn muxed(id: &str, height: u32) -> FormatDescriptor {
        serde_json::from_value(json!({
            "format_id": id, "ext": "mp4", "height": height,
            "vcodec": "avc1", "acodec": "mp4a", "url": format!("https://cdn/{id}")
        }))
        .unwrap()
    }

    fn ladder() -> Vec<FormatDescriptor> {
        let mut formats = vec![muxed("18", 360), muxed("59", 480), muxed("22", 720)];
        formats.push(
            serde_json::from_value(json!({
                "format_id": "137", "ext": "mp4", "height": 1080,
                "vcodec": "avc1", "acodec": "none", "url": "https://cdn/137"
            }))
            .unwrap(),
        );
        formats.push(
            serde_json::from_value(json!({
                "format_id": "43", "ext": "webm", "height": 400,
                "vcodec": "vp8", "acodec": "vorbis", "url": "https://cdn/43"
            }))
            .unwrap(),
        );
        formats
    }

    #[rstest]
    #[case(480, Some("59"))]
    #[case(200, Some("18"))]
    #[case(720, Some("22"))]
    #[case(4320, Some("22"))]
    #[case(479, Some("18"))]
    fn test_pick_best(#[case] max_height: u32, #[case] expected: Option<&str>) {
        let formats = ladder();
        let picked = pick_best_merged_under(&formats, max_height);
        assert_eq!(picked.and_then(|d| d.format_id.as_deref()), expected);
    }

    #[test]
    fn test_no_candidates() {
        assert!(pick_best_merged_under(&[], 720).is_none());

        let direct = vec![FormatDescriptor::direct("https://cdn/direct")];
        assert!(pick_best_merged_under(&direct, 720).is_none());
    }

    #[test]
    fn test_ties_keep_first() {
        let formats = vec![muxed("a", 360), muxed("b", 360)];
        let picked = pick_best_merged_under(&formats, 480).unwrap();
        assert_eq!(picked.format_id.as_deref(), Some("a"));
    }
}
